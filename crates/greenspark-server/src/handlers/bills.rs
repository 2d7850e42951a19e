//! Bill handlers: uploads, manual entry, listing and estimation

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use greenspark_core::{
    models::{Bill, BillDetail, NewManualBill, Page, ParseStatus, SourceType},
    storage::{key_belongs_to, object_key, PRESIGN_EXPIRY},
    BillFilter, CacheSchema, Job,
};

use super::{check_pagination, default_limit, AppJson, AppPath, AppQuery};
use crate::{AppError, AppState, CurrentUser, ErrorCode, MessageResponse, MAX_UPLOAD_SIZE};

/// Content types accepted for bill documents
const ALLOWED_CONTENT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png", "image/webp"];

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct BillListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub source_type: Option<SourceType>,
    pub parse_status: Option<ParseStatus>,
    pub provider: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub order_by: Option<String>,
    #[serde(default = "default_true")]
    pub order_desc: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub upload_url: String,
    pub file_uri: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmUploadRequest {
    pub file_uri: String,
}

#[derive(Debug, Serialize)]
pub struct DirectUploadResponse {
    pub file_uri: String,
}

fn check_content_type(content_type: &str) -> Result<(), AppError> {
    let base = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if ALLOWED_CONTENT_TYPES.contains(&base.as_str()) {
        Ok(())
    } else {
        Err(AppError::new(
            ErrorCode::ValidationError,
            format!(
                "Unsupported content type '{}'. Allowed: {}",
                content_type,
                ALLOWED_CONTENT_TYPES.join(", ")
            ),
        ))
    }
}

/// Load a bill the caller may see
pub(crate) fn load_bill(
    state: &AppState,
    current: &CurrentUser,
    id: Uuid,
) -> Result<Bill, AppError> {
    let bill = state
        .db
        .get_bill(id)?
        .ok_or_else(|| AppError::not_found("Bill not found"))?;
    if !current.can_access(bill.user_id) {
        return Err(AppError::forbidden("Not authorized to access this bill"));
    }
    Ok(bill)
}

/// GET /bills/all - Bills of the caller, or of everyone for admins
pub async fn list_bills(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(params): AppQuery<BillListParams>,
) -> Result<Json<Page<Bill>>, AppError> {
    check_pagination(params.skip, params.limit)?;

    let filter = BillFilter {
        user_id: (!current.user.is_admin()).then_some(current.user.id),
        source_type: params.source_type,
        parse_status: params.parse_status,
        provider: params.provider.filter(|p| !p.trim().is_empty()),
        created_after: params.created_after,
        created_before: params.created_before,
        order_by: params.order_by,
        order_desc: params.order_desc,
        skip: params.skip,
        limit: params.limit,
    };
    let bills = state.db.list_bills(&filter)?;
    let total = state.db.count_bills(&filter)?;
    Ok(Json(Page::from_offset(bills, total, params.skip, params.limit)))
}

/// GET /bills/:id - Bill with its appliance breakdown (cached)
pub async fn get_bill(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<BillDetail>, AppError> {
    let pk = id.to_string();
    if let Some(detail) = state
        .cache
        .get::<BillDetail>(CacheSchema::BillDetail, &pk)
        .await
    {
        if !current.can_access(detail.bill.user_id) {
            return Err(AppError::forbidden("Not authorized to access this bill"));
        }
        return Ok(Json(detail));
    }

    let bill = load_bill(&state, &current, id)?;
    let estimates = state.db.list_estimates(id)?;
    let detail = BillDetail { bill, estimates };
    state.cache.set(CacheSchema::BillDetail, &pk, &detail).await;
    Ok(Json(detail))
}

/// DELETE /bills/:id - Delete a bill and its stored document
pub async fn delete_bill(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let bill = load_bill(&state, &current, id)?;

    if let Some(uri) = &bill.file_uri {
        match state.storage.key_from_uri(uri) {
            Ok(key) => {
                if let Err(e) = state.storage.delete_object(&key).await {
                    warn!(bill_id = %id, error = %e, "Failed to delete stored bill document");
                }
            }
            Err(e) => warn!(bill_id = %id, error = %e, "Bill has an unrecognised file URI"),
        }
    }

    state.db.delete_bill(id)?;
    let pk = id.to_string();
    state.cache.invalidate(CacheSchema::BillDetail, &pk).await;
    state.cache.invalidate(CacheSchema::InsightReport, &pk).await;

    info!(bill_id = %id, user_id = %current.user.id, "Bill deleted");
    Ok(Json(MessageResponse::new("Bill deleted successfully.")))
}

/// POST /bills/upload - Presigned URL for uploading a bill document
pub async fn request_upload_url(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    check_content_type(&body.content_type)?;
    if body.filename.trim().is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "filename is required"));
    }

    state.storage.ensure_bucket().await?;
    let key = object_key(current.user.id, &body.filename);
    let upload_url = state.storage.presign_put(&key, PRESIGN_EXPIRY)?;

    Ok(Json(UploadResponse {
        upload_url,
        file_uri: state.storage.file_uri(&key),
    }))
}

/// POST /bills/confirm - Register an uploaded document and queue parsing
pub async fn confirm_upload(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<ConfirmUploadRequest>,
) -> Result<(StatusCode, Json<Bill>), AppError> {
    let key = state.storage.key_from_uri(&body.file_uri)?;
    if !key_belongs_to(&key, current.user.id) {
        return Err(AppError::forbidden("File does not belong to the current user"));
    }

    let bill = state
        .db
        .create_placeholder_bill(current.user.id, &body.file_uri)?;
    state.queue.enqueue(Job::ParseBill { bill_id: bill.id }).await?;

    info!(bill_id = %bill.id, user_id = %current.user.id, "Bill upload confirmed");
    Ok((StatusCode::ACCEPTED, Json(bill)))
}

/// POST /bills/direct-upload - Store a multipart document server-side
pub async fn direct_upload(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DirectUploadResponse>, AppError> {
    let mut multipart = multipart?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "bill".to_string());
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        check_content_type(&content_type)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("Failed to read upload: {}", e)))?;
        if data.is_empty() {
            return Err(AppError::new(ErrorCode::ValidationError, "Uploaded file is empty"));
        }
        if data.len() > MAX_UPLOAD_SIZE {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!("File too large (max {} MB)", MAX_UPLOAD_SIZE / 1024 / 1024),
            ));
        }

        let key = object_key(current.user.id, &filename);
        state
            .storage
            .put_object(&key, data.to_vec(), &content_type)
            .await?;

        info!(user_id = %current.user.id, size = data.len(), "Bill document uploaded");
        return Ok(Json(DirectUploadResponse {
            file_uri: state.storage.file_uri(&key),
        }));
    }

    Err(AppError::new(
        ErrorCode::ValidationError,
        "Multipart field 'file' is required",
    ))
}

/// POST /bills/manual - Enter a bill by hand and queue estimation
pub async fn create_manual_bill(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<NewManualBill>,
) -> Result<(StatusCode, Json<Bill>), AppError> {
    let bill = state
        .db
        .create_manual_bill(current.user.id, &body.validate()?)?;
    state
        .queue
        .enqueue(Job::EstimateBill { bill_id: bill.id })
        .await?;

    info!(bill_id = %bill.id, user_id = %current.user.id, "Manual bill created");
    Ok((StatusCode::CREATED, Json(bill)))
}

/// POST /bills/:id/estimate - Recompute the appliance breakdown
pub async fn trigger_estimation(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let bill = load_bill(&state, &current, id)?;
    if bill.parse_status != ParseStatus::Success {
        return Err(AppError::business(
            "Bill must be successfully parsed before estimating appliance usage",
        ));
    }

    state.queue.enqueue(Job::EstimateBill { bill_id: id }).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Appliance estimation has been queued.")),
    ))
}
