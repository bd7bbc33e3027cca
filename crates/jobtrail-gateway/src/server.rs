//! HTTP server implementation using Axum.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::{Router, routing::get};
use jobtrail_core::config::{JobtrailConfig, TriggerConfig};
use jobtrail_scheduler::{DispatchHistory, Dispatcher, engine};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Comma-separated allowed origins; unset allows any.
pub const CORS_ORIGINS_ENV: &str = "JOBTRAIL_CORS_ORIGINS";

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<JobtrailConfig>,
    pub dispatcher: Arc<Dispatcher>,
    /// Recent invocation reports.
    pub history: Arc<tokio::sync::Mutex<DispatchHistory>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: JobtrailConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let history = DispatchHistory::new(config.dispatch.history_size);
        Self {
            config: Arc::new(config),
            dispatcher,
            history: Arc::new(tokio::sync::Mutex::new(history)),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Whether a `/dispatch` call (either mode) comes from the periodic trigger
/// or an operator holding its secret.
///
/// The caller presents `Authorization: Bearer <secret>`. With no secret
/// configured only the local-testing override lets calls through.
pub fn authorize_trigger(headers: &HeaderMap, trigger: &TriggerConfig) -> bool {
    if trigger.allow_local {
        return true;
    }
    let Some(secret) = trigger.secret.as_deref().filter(|s| !s.is_empty()) else {
        return false;
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    constant_time_eq(presented.as_bytes(), secret.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/dispatch", get(super::routes::dispatch))
        .route("/api/v1/diagnostics", get(super::routes::diagnostics))
        .route("/api/v1/dispatch/history", get(super::routes::dispatch_history))
        .layer({
            let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
            // Example: JOBTRAIL_CORS_ORIGINS=https://jobtrail.app,https://admin.jobtrail.app
            if let Ok(origins_str) = std::env::var(CORS_ORIGINS_ENV) {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server, plus the in-process ticker when enabled.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let server = &state.config.server;
    let addr = format!("{}:{}", server.host, server.port);

    if state.config.trigger.secret.is_none() && !state.config.trigger.allow_local {
        tracing::warn!("⚠️ No trigger secret configured: /dispatch calls will be rejected");
    }
    if state.config.trigger.allow_local {
        tracing::warn!("⚠️ Local trigger override enabled: /dispatch accepts unauthenticated calls");
    }

    let state = Arc::new(state);
    if state.config.dispatch.tick {
        let _ticker = engine::spawn_ticker(state.dispatcher.clone(), state.history.clone());
    }

    let app = build_router_from_arc(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
