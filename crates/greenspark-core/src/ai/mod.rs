//! Pluggable AI backend abstraction
//!
//! This module provides a backend-agnostic interface for the two AI tasks:
//! extracting a normalized bill from a document, and generating savings
//! recommendations from a bill context.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (gemini, mock). Default: gemini
//! - `GEMINI_API_KEY`: API key (required for gemini backend)
//! - `GEMINI_MODEL`: Model name (default: gemini-1.5-flash)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)

mod gemini;
mod mock;
pub mod parsing;
pub mod prompts;

pub use gemini::GeminiBackend;
pub use mock::{mock_bill_json, MockBackend};

use async_trait::async_trait;

use crate::error::Result;
use crate::insights::Recommendation;
use crate::normalized::NormalizedBill;

/// Trait defining the interface for all AI backends
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Extract a validated bill from a PDF or image
    async fn parse_bill(&self, data: &[u8], mime_type: &str) -> Result<NormalizedBill>;

    /// Suggest savings from a report context
    async fn generate_recommendations(
        &self,
        context: &serde_json::Value,
    ) -> Result<Vec<Recommendation>>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
#[derive(Clone)]
pub enum AIClient {
    Gemini(GeminiBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `gemini` (default): Uses GEMINI_API_KEY, GEMINI_MODEL and GEMINI_HOST
    /// - `mock`: Creates a mock backend
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" | "google" => GeminiBackend::from_env().map(AIClient::Gemini),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(AIClient::Gemini)
            }
        }
    }

    pub fn gemini(host: &str, model: &str, api_key: &str) -> Self {
        AIClient::Gemini(GeminiBackend::new(host, model, api_key))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

#[async_trait]
impl AIBackend for AIClient {
    async fn parse_bill(&self, data: &[u8], mime_type: &str) -> Result<NormalizedBill> {
        match self {
            AIClient::Gemini(b) => b.parse_bill(data, mime_type).await,
            AIClient::Mock(b) => b.parse_bill(data, mime_type).await,
        }
    }

    async fn generate_recommendations(
        &self,
        context: &serde_json::Value,
    ) -> Result<Vec<Recommendation>> {
        match self {
            AIClient::Gemini(b) => b.generate_recommendations(context).await,
            AIClient::Mock(b) => b.generate_recommendations(context).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Gemini(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

/// Guess a MIME type from a file name
pub fn mime_from_name(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    match lower.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/pdf",
    }
}
