//! Insight report handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use greenspark_core::{
    models::{InsightStatus, ParseStatus},
    CacheSchema, InsightReport, Job,
};

use super::{bills::load_bill, AppPath};
use crate::{AppError, AppState, CurrentUser};

#[derive(Debug, Serialize)]
pub struct InsightStatusResponse {
    pub bill_id: Uuid,
    pub status: InsightStatus,
}

async fn current_status(state: &AppState, bill_id: Uuid) -> Result<InsightStatus, AppError> {
    Ok(state
        .db
        .get_insight(bill_id)?
        .map(|i| i.status)
        .unwrap_or(InsightStatus::Pending))
}

/// GET /insights/status/:bill_id - Generation status, starting it if needed
pub async fn insight_status(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(bill_id): AppPath<Uuid>,
) -> Result<Json<InsightStatusResponse>, AppError> {
    let bill = load_bill(&state, &current, bill_id)?;

    let (insight, created) = state.db.create_pending_insight(bill_id, bill.user_id)?;
    if !created {
        return Ok(Json(InsightStatusResponse {
            bill_id,
            status: insight.status,
        }));
    }

    state.queue.enqueue(Job::GenerateInsight { bill_id }).await?;
    info!(bill_id = %bill_id, "Insight generation queued");
    Ok(Json(InsightStatusResponse {
        bill_id,
        status: current_status(&state, bill_id).await?,
    }))
}

/// GET /insights/report/:bill_id - The finished report (cached)
pub async fn insight_report(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(bill_id): AppPath<Uuid>,
) -> Result<Json<InsightReport>, AppError> {
    load_bill(&state, &current, bill_id)?;

    let pk = bill_id.to_string();
    if let Some(report) = state
        .cache
        .get::<InsightReport>(CacheSchema::InsightReport, &pk)
        .await
    {
        return Ok(Json(report));
    }

    let insight = state
        .db
        .get_insight(bill_id)?
        .ok_or_else(|| AppError::not_found("No insight has been requested for this bill"))?;

    let data = match (insight.status, insight.structured_data) {
        (InsightStatus::Completed, Some(data)) => data,
        (status, _) => {
            return Err(AppError::unavailable(format!(
                "Insight generation is still {}. Please check back later.",
                status.as_str()
            )));
        }
    };

    let report: InsightReport = serde_json::from_value(data)
        .map_err(|e| AppError::from(greenspark_core::Error::Json(e)))?;
    state.cache.set(CacheSchema::InsightReport, &pk, &report).await;
    Ok(Json(report))
}

/// POST /insights/report/:bill_id/refresh - Regenerate the report
pub async fn refresh_insight(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(bill_id): AppPath<Uuid>,
) -> Result<(StatusCode, Json<InsightStatusResponse>), AppError> {
    let bill = load_bill(&state, &current, bill_id)?;
    if bill.parse_status != ParseStatus::Success {
        return Err(AppError::business(
            "Insights can only be generated for successfully parsed bills",
        ));
    }

    let (_, created) = state.db.create_pending_insight(bill_id, bill.user_id)?;
    if !created {
        state
            .db
            .set_insight_status(bill_id, InsightStatus::Pending)?;
    }
    state
        .cache
        .invalidate(CacheSchema::InsightReport, &bill_id.to_string())
        .await;

    state.queue.enqueue(Job::GenerateInsight { bill_id }).await?;
    info!(bill_id = %bill_id, "Insight refresh queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(InsightStatusResponse {
            bill_id,
            status: current_status(&state, bill_id).await?,
        }),
    ))
}
