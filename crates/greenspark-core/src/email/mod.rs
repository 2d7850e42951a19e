//! Transactional email delivery
//!
//! - `HttpMailer`: posts JSON to a mail relay (`MAIL_API_URL`) with a bearer key
//! - `LogMailer`: logs and records messages; used when no relay is configured
//!   and in tests
//!
//! # Configuration
//!
//! - `MAIL_API_URL` - relay endpoint accepting `{from, to, subject, html, text}`
//! - `MAIL_API_KEY` - bearer token for the relay
//! - `MAIL_FROM` - sender address (default: no-reply@greenspark.local)

pub mod templates;

pub use templates::{render, EmailKind, EmailMessage, TemplateContext};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const DEFAULT_FROM: &str = "no-reply@greenspark.local";

/// Mail relay client
#[derive(Clone)]
pub struct HttpMailer {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: Option<&str>, from: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.map(str::to_string),
            from: from.to_string(),
        }
    }

    /// Returns None unless `MAIL_API_URL` is set
    pub fn from_env() -> Option<Self> {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        let api_url = var("MAIL_API_URL")?;
        let from = var("MAIL_FROM").unwrap_or_else(|| DEFAULT_FROM.to_string());
        Some(Self::new(&api_url, var("MAIL_API_KEY").as_deref(), &from))
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<()> {
        let body = serde_json::json!({
            "from": self.from,
            "to": message.to,
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
        });

        let mut request = self.http.post(&self.api_url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(to = %message.to, "Email accepted by relay");
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        // 4xx means the message itself was rejected; retrying will not help
        if status.is_client_error() {
            Err(Error::InvalidData(format!(
                "Mail relay rejected message ({}): {}",
                status, detail
            )))
        } else {
            Err(Error::Email(format!("Mail relay error ({}): {}", status, detail)))
        }
    }
}

/// Records messages instead of sending them
#[derive(Clone, Default)]
pub struct LogMailer {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(to = %message.to, subject = %message.subject, "Email (not sent, no relay configured)");
        self.sent
            .lock()
            .map_err(|_| Error::Email("mail log lock poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }

    /// Messages recorded so far
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[derive(Clone)]
pub enum Mailer {
    Http(HttpMailer),
    Log(LogMailer),
}

impl Mailer {
    /// HTTP relay when configured, otherwise the log mailer
    pub fn from_env() -> Self {
        match HttpMailer::from_env() {
            Some(http) => Mailer::Http(http),
            None => Mailer::Log(LogMailer::new()),
        }
    }

    pub fn log() -> Self {
        Mailer::Log(LogMailer::new())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mailer::Http(_) => "http",
            Mailer::Log(_) => "log",
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<()> {
        match self {
            Mailer::Http(m) => m.send(message).await,
            Mailer::Log(m) => m.send(message),
        }
    }

    /// Recorded messages of a log mailer (empty for the relay)
    pub fn sent(&self) -> Vec<EmailMessage> {
        match self {
            Mailer::Http(_) => Vec::new(),
            Mailer::Log(m) => m.sent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "asha@example.com".to_string(),
            subject: "Hello".to_string(),
            html: "<p>Hi</p>".to_string(),
            text: "Hi".to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_mailer_records() {
        let mailer = Mailer::log();
        mailer.send(&message()).await.unwrap();
        mailer.send(&message()).await.unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "asha@example.com");
        assert_eq!(mailer.name(), "log");
    }

    #[test]
    fn test_log_mailer_clones_share_log() {
        let mailer = LogMailer::new();
        let clone = mailer.clone();
        clone.send(&message()).unwrap();
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_http_mailer_unreachable_is_transient() {
        let mailer = HttpMailer::new("http://127.0.0.1:1/send", None, DEFAULT_FROM);
        let err = mailer.send(&message()).await.unwrap_err();
        assert!(err.is_transient());
    }
}
