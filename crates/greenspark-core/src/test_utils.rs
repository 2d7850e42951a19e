//! Test utilities for greenspark-core
//!
//! This module provides a mock Gemini server that speaks enough of the
//! Generative Language REST API for the real `GeminiBackend` to be exercised
//! end to end in tests.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    extract::{Json, Path, Query},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::mock_bill_json;
use crate::ai::prompts::{EXTRACTION_MARKER, RECOMMENDATIONS_MARKER};

/// API key the mock server accepts
pub const MOCK_API_KEY: &str = "test-key";

/// Mock Gemini server for testing and development
pub struct MockGeminiServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGeminiServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new().route(
            "/v1beta/models/:model",
            get(handle_model).post(handle_generate),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGeminiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn authorized(params: &HashMap<String, String>) -> bool {
    params.get("key").map(String::as_str) == Some(MOCK_API_KEY)
}

/// Model metadata endpoint (health check)
async fn handle_model(
    Path(model): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&params) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "API key not valid"}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"name": format!("models/{}", model), "displayName": model})),
    )
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Deserialize)]
struct RequestContent {
    parts: Vec<Value>,
}

fn candidate(text: String) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

/// `{model}:generateContent`
async fn handle_generate(
    Path(model): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    Json(request): Json<GenerateRequest>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&params) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": {"code": 403, "message": "API key not valid"}})),
        );
    }
    if !model.ends_with(":generateContent") {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": 404, "message": "unknown method"}})),
        );
    }

    let parts: Vec<&Value> = request.contents.iter().flat_map(|c| &c.parts).collect();
    let prompt: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    let has_document = parts.iter().any(|p| p.get("inline_data").is_some());

    let text = if prompt.contains(EXTRACTION_MARKER) {
        if !has_document {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {"code": 400, "message": "missing document"}})),
            );
        }
        // Models tend to wrap JSON in fences even when asked not to
        format!("```json\n{}\n```", mock_bill_json())
    } else if prompt.contains(RECOMMENDATIONS_MARKER) {
        json!({
            "recommendations": [{
                "id": "",
                "title": "Shift Geyser Use",
                "description": "Heat water once in the morning instead of keeping the geyser on.",
                "potential_savings_kwh": 18.5,
                "potential_savings_cost": 148.0,
                "priority": "medium",
                "difficulty": "easy",
                "action_type": "behavioral"
            }]
        })
        .to_string()
    } else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": "unrecognised prompt"}})),
        );
    };

    (StatusCode::OK, Json(candidate(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIBackend, AIClient};

    #[tokio::test]
    async fn test_mock_server_health_check() {
        let server = MockGeminiServer::start().await;
        let client = AIClient::gemini(&server.url(), "gemini-1.5-flash", MOCK_API_KEY);
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_server_rejects_bad_key() {
        let server = MockGeminiServer::start().await;
        let client = AIClient::gemini(&server.url(), "gemini-1.5-flash", "wrong");
        assert!(!client.health_check().await);
        let err = client
            .parse_bill(b"%PDF", "application/pdf")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_mock_server_parses_bill() {
        let server = MockGeminiServer::start().await;
        let client = AIClient::gemini(&server.url(), "gemini-1.5-flash", MOCK_API_KEY);
        let bill = client.parse_bill(b"%PDF-1.4", "application/pdf").await.unwrap();
        assert_eq!(bill.discom, "MSEDCL");
        assert_eq!(bill.totals.cost, 2560.0);
    }

    #[tokio::test]
    async fn test_mock_server_recommendations() {
        let server = MockGeminiServer::start().await;
        let client = AIClient::gemini(&server.url(), "gemini-1.5-flash", MOCK_API_KEY);
        let recs = client
            .generate_recommendations(&json!({"kpis": {"kwh_total": 320.0}}))
            .await
            .unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].title, "Shift Geyser Use");
    }
}
