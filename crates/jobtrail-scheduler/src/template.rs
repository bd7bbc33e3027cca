//! Message templates: placeholder substitution and the HTML email shell.
//!
//! Substitution is purely textual over four fixed tokens. Unknown `{{...}}`
//! sequences pass through untouched. Custom templates are user-authored, so
//! the substituted text is HTML-escaped before it is placed in the shell.
//! Rendering is pure: the footer timestamp is supplied by the caller.

use jobtrail_core::types::MessageKind;

use crate::progress::Progress;

/// The fixed placeholder set. Tokens are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    DailyTarget,
    ApplicationsToday,
    ProgressPercentage,
    MotivationalMessage,
}

impl Placeholder {
    pub const ALL: [Placeholder; 4] = [
        Placeholder::DailyTarget,
        Placeholder::ApplicationsToday,
        Placeholder::ProgressPercentage,
        Placeholder::MotivationalMessage,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::DailyTarget => "{{daily_target}}",
            Self::ApplicationsToday => "{{applications_today}}",
            Self::ProgressPercentage => "{{progress_percentage}}",
            Self::MotivationalMessage => "{{motivational_message}}",
        }
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateVars {
    pub daily_target: u32,
    pub applications_today: u32,
    pub progress_percentage: f64,
    pub motivational_message: String,
}

impl TemplateVars {
    pub fn new(daily_target: u32, applications_today: u32, progress: &Progress) -> Self {
        Self {
            daily_target,
            applications_today,
            progress_percentage: progress.percentage,
            motivational_message: progress.tier.message().to_string(),
        }
    }

    /// Percentage rounded half away from zero.
    pub fn rounded_percentage(&self) -> i64 {
        self.progress_percentage.round() as i64
    }

    fn value(&self, placeholder: Placeholder) -> String {
        match placeholder {
            Placeholder::DailyTarget => self.daily_target.to_string(),
            Placeholder::ApplicationsToday => self.applications_today.to_string(),
            Placeholder::ProgressPercentage => self.rounded_percentage().to_string(),
            Placeholder::MotivationalMessage => self.motivational_message.clone(),
        }
    }
}

/// Replace every occurrence of the fixed tokens. Single left-to-right pass,
/// so substituted values are never rescanned.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match Placeholder::ALL.iter().find(|p| candidate.starts_with(p.token())) {
            Some(p) => {
                out.push_str(&vars.value(*p));
                rest = &candidate[p.token().len()..];
            }
            None => {
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Built-in template used when a recipient has no custom text for a kind.
pub fn default_template(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Reminder => {
            "Good morning!\n\
             Your goal today is {{daily_target}} applications. So far you've sent {{applications_today}} ({{progress_percentage}}%).\n\n\
             {{motivational_message}}"
        }
        MessageKind::Summary => {
            "Here's how your job search went today.\n\
             You sent {{applications_today}} of {{daily_target}} planned applications ({{progress_percentage}}%).\n\n\
             {{motivational_message}}"
        }
    }
}

pub fn subject(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Reminder => "Your daily job search reminder",
        MessageKind::Summary => "Your daily job search summary",
    }
}

fn heading(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Reminder => "⏰ Daily Reminder",
        MessageKind::Summary => "📊 Daily Summary",
    }
}

/// Header band colour per kind.
pub fn header_color(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Reminder => "#4f46e5",
        MessageKind::Summary => "#059669",
    }
}

/// Subject plus finished HTML body for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBody {
    pub subject: String,
    /// Substituted plain text, before HTML wrapping.
    pub text: String,
    pub html: String,
}

/// Render a message of `kind`. `custom` is the recipient's template, if any;
/// only the default path gets stat cards and the progress bar.
pub fn render_message(
    kind: MessageKind,
    custom: Option<&str>,
    vars: &TemplateVars,
    footer_stamp: &str,
) -> RenderedBody {
    let text = render(custom.unwrap_or(default_template(kind)), vars);
    let stats = match custom {
        Some(_) => String::new(),
        None => stat_cards(kind, vars),
    };
    let html = wrap_html(kind, &text_to_html(&text), &stats, footer_stamp);
    RenderedBody { subject: subject(kind).to_string(), text, html }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape, then turn newlines into explicit `<br>` breaks.
pub fn text_to_html(text: &str) -> String {
    escape_html(text).replace("\r\n", "\n").replace('\n', "<br>")
}

fn stat_cards(kind: MessageKind, vars: &TemplateVars) -> String {
    let color = header_color(kind);
    let pct = vars.rounded_percentage();
    let bar = pct.clamp(0, 100);
    let card = |label: &str, value: String| {
        format!(
            "<td align=\"center\" style=\"padding:12px;background:#f9fafb;border-radius:8px;\">\
             <div style=\"font-size:24px;font-weight:bold;color:{color};\">{value}</div>\
             <div style=\"font-size:12px;color:#6b7280;text-transform:uppercase;\">{label}</div></td>"
        )
    };
    format!(
        "<tr><td style=\"padding:24px 24px 0 24px;\">\
         <table role=\"presentation\" width=\"100%\" cellspacing=\"8\" cellpadding=\"0\"><tr>{}{}{}</tr></table>\
         <div class=\"progress-track\" style=\"margin-top:16px;background:#e5e7eb;border-radius:999px;height:12px;\">\
         <div class=\"progress-fill\" style=\"width:{bar}%;background:{color};border-radius:999px;height:12px;\"></div>\
         </div></td></tr>",
        card("Daily target", vars.daily_target.to_string()),
        card("Sent today", vars.applications_today.to_string()),
        card("Progress", format!("{pct}%")),
    )
}

fn wrap_html(kind: MessageKind, body_html: &str, stats_html: &str, footer_stamp: &str) -> String {
    let color = header_color(kind);
    let title = escape_html(subject(kind));
    let heading = heading(kind);
    let stamp = escape_html(footer_stamp);
    format!(
        "<!DOCTYPE html>\
         <html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title}</title></head>\
         <body style=\"margin:0;padding:0;background:#f3f4f6;font-family:Arial,Helvetica,sans-serif;\">\
         <table role=\"presentation\" width=\"100%\" cellspacing=\"0\" cellpadding=\"0\"><tr><td align=\"center\" style=\"padding:24px;\">\
         <table role=\"presentation\" width=\"600\" cellspacing=\"0\" cellpadding=\"0\" style=\"max-width:600px;background:#ffffff;border-radius:12px;\">\
         <tr><td style=\"background:{color};padding:24px;color:#ffffff;font-size:22px;font-weight:bold;border-radius:12px 12px 0 0;\">{heading}</td></tr>\
         {stats_html}\
         <tr><td style=\"padding:24px;font-size:16px;line-height:1.6;color:#111827;\">{body_html}</td></tr>\
         <tr><td style=\"padding:16px 24px;font-size:12px;color:#6b7280;border-top:1px solid #e5e7eb;\">Sent by Jobtrail &middot; {stamp}</td></tr>\
         </table></td></tr></table></body></html>"
    )
}
