//! API route handlers for the gateway.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use jobtrail_core::error::JobtrailError;
use jobtrail_scheduler::DispatchMode;
use jobtrail_scheduler::engine::{run_and_record, run_manual_and_record};
use serde::Deserialize;
use std::sync::Arc;

use crate::server::{AppState, authorize_trigger};

type ApiResponse = (StatusCode, Json<serde_json::Value>);

#[derive(Debug, Default, Deserialize)]
pub struct DispatchQuery {
    /// `scheduled` (default) or `manual`.
    pub mode: Option<String>,
    /// Recipient id or email; required for `manual`.
    pub user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticsQuery {
    pub user: Option<String>,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    (status, Json(serde_json::json!({"success": false, "error": message.into()})))
}

fn error_response(e: &JobtrailError) -> ApiResponse {
    let status = match e {
        JobtrailError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        JobtrailError::NotFound(_) => StatusCode::NOT_FOUND,
        JobtrailError::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> ApiResponse {
    match serde_json::to_value(value) {
        Ok(v) => (StatusCode::OK, Json(v)),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "jobtrail-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Trigger endpoint: `GET /dispatch?mode=scheduled|manual&user=...`.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DispatchQuery>,
) -> ApiResponse {
    let mode = match query.mode.as_deref().unwrap_or("scheduled") {
        "scheduled" => DispatchMode::Scheduled,
        "manual" => DispatchMode::Manual,
        other => {
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("Unknown mode '{other}', expected 'scheduled' or 'manual'"),
            );
        }
    };
    // Both modes send mail, so both need the trigger credential.
    if !authorize_trigger(&headers, &state.config.trigger) {
        tracing::warn!("🚫 Rejected unauthenticated {} dispatch", mode.as_str());
        return error_body(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    match mode {
        DispatchMode::Scheduled => {
            match run_and_record(&state.dispatcher, &state.history, Utc::now()).await {
                Ok(report) => to_json(&report),
                Err(e) => error_response(&e),
            }
        }
        DispatchMode::Manual => {
            let Some(user) = query.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
                return error_body(StatusCode::BAD_REQUEST, "Missing required parameter: user");
            };
            tracing::info!("🔧 Manual dispatch requested for {user}");
            match run_manual_and_record(&state.dispatcher, &state.history, user, Utc::now()).await {
                Ok(report) => to_json(&report),
                Err(e) => error_response(&e),
            }
        }
    }
}

/// Read-only precondition report: `GET /api/v1/diagnostics?user=...`.
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiagnosticsQuery>,
) -> ApiResponse {
    let Some(user) = query.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return error_body(StatusCode::BAD_REQUEST, "Missing required parameter: user");
    };
    match state.dispatcher.diagnose(user, Utc::now()).await {
        Ok(report) => to_json(&report),
        Err(e) => error_response(&e),
    }
}

/// Recent invocations, newest first.
pub async fn dispatch_history(State(state): State<Arc<AppState>>) -> ApiResponse {
    let entries = state.history.lock().await.recent();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "count": entries.len(),
            "entries": entries,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use jobtrail_channels::DeliveryAdapter;
    use jobtrail_core::config::JobtrailConfig;
    use jobtrail_core::error::Result;
    use jobtrail_core::traits::Mailer;
    use jobtrail_core::types::{DailyTarget, Recipient, RenderedMessage, Schedule};
    use jobtrail_scheduler::store::Snapshot;
    use jobtrail_scheduler::{Dispatcher, JsonStore};
    use tower::ServiceExt;

    struct NullMailer;

    #[async_trait]
    impl Mailer for NullMailer {
        fn name(&self) -> &str {
            "null"
        }
        async fn send(&self, _: &RenderedMessage) -> Result<()> {
            Ok(())
        }
    }

    fn snapshot() -> Snapshot {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut s = Snapshot::default();
        for (id, with_target) in [("ready", true), ("untargeted", false)] {
            s.recipients.push(Recipient {
                id: id.into(),
                email: format!("{id}@example.com"),
                display_name: None,
                notifications_enabled: true,
            });
            s.schedules.push(Schedule {
                recipient_id: id.into(),
                reminder_time: Some("09:00".into()),
                summary_time: Some("18:00".into()),
                ..Default::default()
            });
            if with_target {
                s.daily_targets.push(DailyTarget { recipient_id: id.into(), date: today.clone(), target: 3 });
            }
        }
        s
    }

    fn app_state(config: JobtrailConfig) -> AppState {
        let dispatcher = Dispatcher::new(
            Arc::new(JsonStore::from_snapshot(snapshot())),
            DeliveryAdapter::new(Arc::new(NullMailer)),
            &config,
        )
        .unwrap();
        AppState::new(config, Arc::new(dispatcher))
    }

    fn test_state() -> State<Arc<AppState>> {
        State(Arc::new(app_state(JobtrailConfig::default())))
    }

    fn local_state() -> State<Arc<AppState>> {
        let mut config = JobtrailConfig::default();
        config.trigger.allow_local = true;
        State(Arc::new(app_state(config)))
    }

    fn query(mode: Option<&str>, user: Option<&str>) -> Query<DispatchQuery> {
        Query(DispatchQuery { mode: mode.map(str::to_string), user: user.map(str::to_string) })
    }

    // ---- Health ----

    #[tokio::test]
    async fn test_health_check() {
        let json = health_check(test_state()).await.0;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "jobtrail-gateway");
    }

    // ---- Dispatch ----

    #[tokio::test]
    async fn test_scheduled_requires_authorization() {
        let (status, json) = dispatch(test_state(), HeaderMap::new(), query(None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json.0["success"], false);
    }

    #[tokio::test]
    async fn test_scheduled_with_bearer_secret() {
        let mut config = JobtrailConfig::default();
        config.trigger.secret = Some("cron-secret".into());
        let state = State(Arc::new(app_state(config)));
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer cron-secret".parse().unwrap());

        let (status, json) = dispatch(state.clone(), headers, query(Some("scheduled"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.0["success"], true);
        assert_eq!(json.0["recipientsChecked"], 2);
        assert_eq!(json.0["skipped"]["missingTarget"], 1);

        let history = dispatch_history(state).await.1;
        assert_eq!(history.0["count"], 1);
    }

    #[tokio::test]
    async fn test_scheduled_local_override() {
        let (status, json) = dispatch(local_state(), HeaderMap::new(), query(None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.0["mode"], "scheduled");
        assert!(json.0["results"].is_array());
    }

    #[tokio::test]
    async fn test_manual_force_sends_both_kinds() {
        let (status, json) =
            dispatch(local_state(), HeaderMap::new(), query(Some("manual"), Some("ready@example.com"))).await;
        assert_eq!(status, StatusCode::OK);
        let results = json.0["results"].as_array().unwrap().clone();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["type"], "reminder");
        assert_eq!(results[1]["type"], "summary");
        assert!(results.iter().all(|r| r["success"] == true));
    }

    #[tokio::test]
    async fn test_manual_requires_authorization() {
        let (status, _) =
            dispatch(test_state(), HeaderMap::new(), query(Some("manual"), Some("ready@example.com"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut config = JobtrailConfig::default();
        config.trigger.secret = Some("cron-secret".into());
        let state = State(Arc::new(app_state(config)));
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer cron-secret".parse().unwrap());
        let (status, json) =
            dispatch(state.clone(), headers, query(Some("manual"), Some("ready@example.com"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.0["mode"], "manual");

        let history = dispatch_history(state).await.1;
        assert_eq!(history.0["count"], 1);
    }

    #[tokio::test]
    async fn test_manual_status_codes() {
        let (status, _) = dispatch(local_state(), HeaderMap::new(), query(Some("manual"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = dispatch(local_state(), HeaderMap::new(), query(Some("manual"), Some("nobody"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) =
            dispatch(local_state(), HeaderMap::new(), query(Some("manual"), Some("untargeted"))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json.0["error"].as_str().unwrap().contains("daily target"));
    }

    #[tokio::test]
    async fn test_unknown_mode_is_bad_request() {
        let (status, _) = dispatch(local_state(), HeaderMap::new(), query(Some("burst"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // ---- Diagnostics ----

    #[tokio::test]
    async fn test_diagnostics() {
        let (status, json) =
            diagnostics(test_state(), Query(DiagnosticsQuery { user: Some("untargeted".into()) })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.0["recipientExists"], true);
        assert_eq!(json.0["targetExists"], false);
        assert_eq!(json.0["transportConfigured"], true);

        let (status, _) = diagnostics(test_state(), Query(DiagnosticsQuery::default())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // ---- Router ----

    #[tokio::test]
    async fn test_router_rejects_unauthenticated_trigger() {
        let app = build_router(app_state(JobtrailConfig::default()));
        let response = app
            .oneshot(Request::builder().uri("/dispatch?mode=scheduled").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_router_health() {
        let app = build_router(app_state(JobtrailConfig::default()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
