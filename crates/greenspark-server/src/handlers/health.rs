//! Health check

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use greenspark_core::AIBackend;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub backend: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub database: &'static str,
    pub cache: ComponentHealth,
    pub storage: ComponentHealth,
    pub ai: ComponentHealth,
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// GET /health - Liveness plus the state of each dependency
///
/// The AI backend is optional and never degrades the overall status.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database_ok = state.db.ping().is_ok();
    let cache_ok = state.cache.ping().await;
    let storage_ok = state.storage.health_check().await;

    let ai = match &state.ai {
        Some(client) => ComponentHealth {
            backend: client.model().to_string(),
            status: status(client.health_check().await),
        },
        None => ComponentHealth {
            backend: "none".to_string(),
            status: "disabled",
        },
    };

    let healthy = database_ok && cache_ok && storage_ok;
    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        service: state.settings.project_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        database: status(database_ok),
        cache: ComponentHealth {
            backend: state.cache.backend_name().to_string(),
            status: status(cache_ok),
        },
        storage: ComponentHealth {
            backend: state.storage.name().to_string(),
            status: status(storage_ok),
        },
        ai,
    })
}
