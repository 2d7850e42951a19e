//! Transactional email templates

use serde::{Deserialize, Serialize};

/// Which email to send, with the data it needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmailKind {
    Verification { token: String },
    PasswordReset { token: String },
    Welcome { first_name: String },
    EmailChange { token: String },
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verification { .. } => "verification",
            Self::PasswordReset { .. } => "password_reset",
            Self::Welcome { .. } => "welcome",
            Self::EmailChange { .. } => "email_change",
        }
    }
}

/// A rendered message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Values shared by every template
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub project_name: String,
    pub frontend_url: String,
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

const STYLE: &str = "body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; margin: 0; padding: 20px; background-color: #f8f9fa; } \
.container { background-color: #ffffff; border: 1px solid #dee2e6; border-radius: 8px; max-width: 600px; margin: auto; padding: 40px; } \
.header { font-size: 24px; font-weight: 600; color: #212529; text-align: center; margin-bottom: 20px; } \
.text { color: #495057; line-height: 1.6; } \
.button { background-color: #28a745; color: #ffffff; padding: 14px 28px; text-decoration: none; border-radius: 6px; font-weight: 500; display: inline-block; } \
.footer { font-size: 12px; color: #6c757d; text-align: center; margin-top: 30px; }";

struct Body<'a> {
    header: String,
    paragraphs: Vec<String>,
    button: Option<(&'a str, String)>,
    footer: &'a str,
}

fn layout(body: &Body<'_>) -> String {
    let mut html = format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"UTF-8\"><style>{}</style></head><body><div class=\"container\"><div class=\"header\">{}</div>",
        STYLE, body.header
    );
    if let Some(first) = body.paragraphs.first() {
        html.push_str(&format!("<p class=\"text\">{}</p>", first));
    }
    if let Some((label, url)) = &body.button {
        html.push_str(&format!(
            "<div style=\"text-align: center; margin: 30px 0;\"><a href=\"{}\" class=\"button\" style=\"color: #ffffff;\">{}</a></div>",
            escape_html(url),
            label
        ));
    }
    for p in body.paragraphs.iter().skip(1) {
        html.push_str(&format!("<p class=\"text\">{}</p>", p));
    }
    html.push_str(&format!(
        "<div class=\"footer\">{}</div></div></body></html>",
        body.footer
    ));
    html
}

fn plain(body: &Body<'_>) -> String {
    let mut lines = vec![body.header.clone(), String::new()];
    lines.extend(body.paragraphs.iter().cloned());
    if let Some((label, url)) = &body.button {
        lines.push(String::new());
        lines.push(format!("{}: {}", label, url));
    }
    lines.join("\n")
}

/// Render a message for `to`
pub fn render(kind: &EmailKind, to: &str, ctx: &TemplateContext) -> EmailMessage {
    let project = &ctx.project_name;
    let base = ctx.frontend_url.trim_end_matches('/');

    let (subject, body) = match kind {
        EmailKind::Verification { token } => (
            "Verify Your Email for GreenSpark".to_string(),
            Body {
                header: "One Last Step to Activate Your Account".to_string(),
                paragraphs: vec![
                    "Welcome to GreenSpark! We're excited to help you gain clarity and control over your energy usage. Please verify your email address.".to_string(),
                    "This verification link will expire in 24 hours.".to_string(),
                    "If you did not sign up for a GreenSpark account, you can safely ignore this email.".to_string(),
                ],
                button: Some(("Verify My Account", format!("{}/verify-email?token={}", base, token))),
                footer: "You received this email because you signed up for GreenSpark.",
            },
        ),
        EmailKind::PasswordReset { token } => (
            "Reset Your GreenSpark Password".to_string(),
            Body {
                header: "Password Reset Request".to_string(),
                paragraphs: vec![
                    "We received a request to reset the password for your GreenSpark account. Use the link below to set a new password.".to_string(),
                    "This password reset link will expire in 1 hour.".to_string(),
                    "If you did not request a password reset, you can safely ignore this email. Your password will not be changed.".to_string(),
                ],
                button: Some(("Reset My Password", format!("{}/reset-password?token={}", base, token))),
                footer: "You received this email because a password reset was requested for your account.",
            },
        ),
        EmailKind::Welcome { first_name } => (
            format!("Welcome to GreenSpark, {}!", first_name),
            Body {
                header: format!(
                    "Welcome to a Smarter Way to Use Energy, {}!",
                    escape_html(first_name)
                ),
                paragraphs: vec![
                    "Your GreenSpark account is active and ready to go.".to_string(),
                    "The next step is to upload your first electricity bill to start seeing your personalized insights.".to_string(),
                    format!("- The {} Team", escape_html(project)),
                ],
                button: Some(("Upload Your First Bill", format!("{}/dashboard", base))),
                footer: "You received this email because your GreenSpark account was activated.",
            },
        ),
        EmailKind::EmailChange { token } => (
            "Confirm Your New Email Address for GreenSpark".to_string(),
            Body {
                header: "Confirm Your New Email Address".to_string(),
                paragraphs: vec![
                    "You requested to change the email address for your GreenSpark account. Confirm this is your new email to complete the change.".to_string(),
                    "This confirmation link will expire in 24 hours.".to_string(),
                    "If you did not request this change, you can safely ignore this email.".to_string(),
                ],
                button: Some(("Confirm New Email", format!("{}/confirm-email-change?token={}", base, token))),
                footer: "You received this email because an email change was requested for your account.",
            },
        ),
    };

    EmailMessage {
        to: to.to_string(),
        subject,
        html: layout(&body),
        text: plain(&body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        TemplateContext {
            project_name: "GreenSpark API".to_string(),
            frontend_url: "https://app.example.com/".to_string(),
        }
    }

    #[test]
    fn test_reset_link() {
        let msg = render(
            &EmailKind::PasswordReset { token: "abc.def".into() },
            "a@example.com",
            &ctx(),
        );
        assert_eq!(msg.subject, "Reset Your GreenSpark Password");
        assert!(msg.html.contains("https://app.example.com/reset-password?token=abc.def"));
        assert!(msg.text.contains("expire in 1 hour"));
    }

    #[test]
    fn test_welcome_escapes_name() {
        let msg = render(
            &EmailKind::Welcome { first_name: "<b>Asha</b>".into() },
            "a@example.com",
            &ctx(),
        );
        assert!(msg.html.contains("&lt;b&gt;Asha&lt;/b&gt;"));
        assert!(!msg.html.contains("<b>Asha"));
    }

    #[test]
    fn test_kind_serializes_tagged() {
        let kind = EmailKind::EmailChange { token: "t".into() };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "email_change");
        assert_eq!(kind.as_str(), "email_change");
    }
}
