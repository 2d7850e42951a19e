//! Appliance handlers: catalog, CRUD, bulk operations and usage figures

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use greenspark_core::{
    models::{
        ApplianceCatalog, ApplianceUpdate, ApplianceView, NewAppliance, Page, UserAppliance,
    },
    usage::{
        appliance_statistics, appliance_view, bill_impact, consumption_report,
        system_statistics, ApplianceStatistics, BillImpact, ConsumptionReport, SystemStatistics,
    },
    validation::{validate_bulk_appliances, MAX_BULK_APPLIANCES},
    ApplianceFilter, CacheSchema,
};

use super::{AppJson, AppPath, AppQuery};
use crate::{AppError, AppState, CurrentUser, ErrorCode, MessageResponse, MAX_PAGE_LIMIT};

const CATALOG_CACHE_KEY: &str = "all";

/// Longest period accepted by the bill impact calculator
const MAX_IMPACT_DAYS: i64 = 365;

fn default_billing_days() -> i64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct CatalogParams {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateRequest {
    pub appliances: Vec<NewAppliance>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateItem {
    pub id: Uuid,
    #[serde(flatten)]
    pub update: ApplianceUpdate,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateRequest {
    pub updates: Vec<BulkUpdateItem>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

/// Outcome of a bulk update or delete
#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub requested: usize,
    pub succeeded: Vec<Uuid>,
    /// Missing or owned by someone else
    pub not_found: Vec<Uuid>,
}

impl BulkResult {
    fn new(requested: &[Uuid], succeeded: Vec<Uuid>) -> Self {
        let not_found = requested
            .iter()
            .filter(|id| !succeeded.contains(id))
            .copied()
            .collect();
        Self {
            requested: requested.len(),
            succeeded,
            not_found,
        }
    }
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ApplianceListParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    pub search: Option<String>,
    pub appliance_catalog_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    /// Admin listing only
    pub user_id: Option<Uuid>,
}

impl ApplianceListParams {
    fn filter(self, user_id: Option<Uuid>) -> Result<ApplianceFilter, AppError> {
        if self.page < 1 {
            return Err(AppError::new(ErrorCode::ValidationError, "page must be at least 1"));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&self.page_size) {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                format!("page_size must be between 1 and {}", MAX_PAGE_LIMIT),
            ));
        }
        if let Some(order) = &self.sort_order {
            if !matches!(order.to_lowercase().as_str(), "asc" | "desc") {
                return Err(AppError::new(
                    ErrorCode::ValidationError,
                    "sort_order must be 'asc' or 'desc'",
                ));
            }
        }

        let skip = (self.page - 1)
            .checked_mul(self.page_size)
            .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "page is out of range"))?;

        Ok(ApplianceFilter {
            user_id,
            search: self.search.filter(|s| !s.trim().is_empty()),
            appliance_catalog_id: self.appliance_catalog_id,
            created_after: self.created_after,
            created_before: self.created_before,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            skip,
            limit: self.page_size,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ConsumptionParams {
    pub electricity_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BillImpactRequest {
    pub bill_amount: f64,
    #[serde(default = "default_billing_days")]
    pub billing_days: i64,
}

#[derive(Debug, Serialize)]
pub struct BillImpactResponse {
    pub bill_amount: f64,
    pub billing_days: i64,
    pub appliances: Vec<BillImpact>,
}

fn load_appliance(
    state: &AppState,
    current: &CurrentUser,
    id: Uuid,
) -> Result<UserAppliance, AppError> {
    let appliance = state
        .db
        .get_appliance(id)?
        .ok_or_else(|| AppError::not_found("Appliance not found"))?;
    if !current.can_access(appliance.user_id) {
        return Err(AppError::forbidden("Not authorized to access this appliance"));
    }
    Ok(appliance)
}

/// Reject catalog ids that do not exist
fn check_catalog_ids<'a>(
    state: &AppState,
    ids: impl IntoIterator<Item = &'a Option<String>>,
) -> Result<(), AppError> {
    for id in ids.into_iter().flatten() {
        if state.db.get_catalog_entry(id)?.is_none() {
            return Err(AppError::not_found(format!(
                "Appliance catalog entry '{}' not found",
                id
            )));
        }
    }
    Ok(())
}

fn views(appliances: Vec<UserAppliance>, rate: f64) -> Vec<ApplianceView> {
    appliances
        .into_iter()
        .map(|a| appliance_view(a, rate))
        .collect()
}

fn page_of(
    state: &AppState,
    filter: &ApplianceFilter,
    page: i64,
) -> Result<Page<ApplianceView>, AppError> {
    let items = state.db.list_appliances(filter)?;
    let total = state.db.count_appliances(filter)?;
    Ok(Page::from_page(
        views(items, state.settings.electricity_rate),
        total,
        page,
        filter.limit,
    ))
}

/// GET /appliances/catalog - Catalog entries, optionally filtered
pub async fn list_catalog(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<CatalogParams>,
) -> Result<Json<Vec<ApplianceCatalog>>, AppError> {
    let search = params.search.filter(|s| !s.trim().is_empty());
    if let Some(search) = search {
        return Ok(Json(state.db.list_catalog(Some(&search))?));
    }

    let db = state.db.clone();
    let catalog = state
        .cache
        .get_or_set(CacheSchema::CatalogList, CATALOG_CACHE_KEY, || async move {
            db.list_catalog(None)
        })
        .await?;
    Ok(Json(catalog))
}

/// POST /appliances - Add an appliance
pub async fn create_appliance(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<NewAppliance>,
) -> Result<(StatusCode, Json<ApplianceView>), AppError> {
    let item = body.validate()?;
    check_catalog_ids(&state, [&item.appliance_catalog_id])?;

    let appliance = state.db.create_appliance(current.user.id, &item)?;
    info!(appliance_id = %appliance.id, user_id = %current.user.id, "Appliance created");
    Ok((
        StatusCode::CREATED,
        Json(appliance_view(appliance, state.settings.electricity_rate)),
    ))
}

/// POST /appliances/bulk - Add up to 50 appliances atomically
pub async fn bulk_create_appliances(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<BulkCreateRequest>,
) -> Result<(StatusCode, Json<Vec<ApplianceView>>), AppError> {
    let items = validate_bulk_appliances(body.appliances)?;
    check_catalog_ids(&state, items.iter().map(|i| &i.appliance_catalog_id))?;

    let created = state.db.create_appliances(current.user.id, &items)?;
    info!(count = created.len(), user_id = %current.user.id, "Appliances created in bulk");
    Ok((
        StatusCode::CREATED,
        Json(views(created, state.settings.electricity_rate)),
    ))
}

/// GET /appliances/my - All of the caller's appliances
pub async fn list_my_appliances(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<ApplianceView>>, AppError> {
    let appliances = state.db.list_user_appliances(current.user.id)?;
    Ok(Json(views(appliances, state.settings.electricity_rate)))
}

/// GET /appliances/list - The caller's appliances, paginated and filtered
pub async fn list_appliances_paginated(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(params): AppQuery<ApplianceListParams>,
) -> Result<Json<Page<ApplianceView>>, AppError> {
    let page = params.page;
    let filter = params.filter(Some(current.user.id))?;
    Ok(Json(page_of(&state, &filter, page)?))
}

/// GET /appliances/statistics - Totals and tips for the caller
pub async fn my_appliance_statistics(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApplianceStatistics>, AppError> {
    let appliances = state.db.list_user_appliances(current.user.id)?;
    Ok(Json(appliance_statistics(
        &appliances,
        state.settings.electricity_rate,
    )))
}

/// GET /appliances/:id (cached)
pub async fn get_appliance(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApplianceView>, AppError> {
    let pk = id.to_string();
    if let Some(view) = state
        .cache
        .get::<ApplianceView>(CacheSchema::ApplianceView, &pk)
        .await
    {
        if current.can_access(view.appliance.user_id) {
            return Ok(Json(view));
        }
        return Err(AppError::forbidden("Not authorized to access this appliance"));
    }

    let appliance = load_appliance(&state, &current, id)?;
    let view = appliance_view(appliance, state.settings.electricity_rate);
    state.cache.set(CacheSchema::ApplianceView, &pk, &view).await;
    Ok(Json(view))
}

/// Drop cached views of these appliances and of bills estimated from them
async fn forget_appliances(state: &AppState, ids: &[Uuid], bills: &[Uuid]) {
    for id in ids {
        state
            .cache
            .invalidate(CacheSchema::ApplianceView, &id.to_string())
            .await;
    }
    for bill_id in bills {
        state
            .cache
            .invalidate(CacheSchema::BillDetail, &bill_id.to_string())
            .await;
    }
}

/// PUT /appliances/:id - Partial update
pub async fn update_appliance(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<ApplianceUpdate>,
) -> Result<Json<ApplianceView>, AppError> {
    let update = body.validate()?;
    load_appliance(&state, &current, id)?;

    let appliance = state.db.update_appliance(id, &update)?;
    let bills = state.db.bills_estimating(&[id])?;
    forget_appliances(&state, &[id], &bills).await;
    Ok(Json(appliance_view(appliance, state.settings.electricity_rate)))
}

/// DELETE /appliances/:id
pub async fn delete_appliance(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    load_appliance(&state, &current, id)?;

    // Estimates cascade with the appliance, so find their bills first
    let bills = state.db.bills_estimating(&[id])?;
    state.db.delete_appliance(id)?;
    forget_appliances(&state, &[id], &bills).await;
    Ok(Json(MessageResponse::new("Appliance deleted successfully.")))
}

fn check_bulk_size(len: usize) -> Result<(), AppError> {
    if len == 0 {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "At least one appliance is required",
        ));
    }
    if len > MAX_BULK_APPLIANCES {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("At most {} appliances per request", MAX_BULK_APPLIANCES),
        ));
    }
    Ok(())
}

/// Admins may touch anyone's appliances, users only their own
fn bulk_owner(current: &CurrentUser) -> Option<Uuid> {
    (!current.user.is_admin()).then_some(current.user.id)
}

/// PUT /appliances/bulk/update
pub async fn bulk_update_appliances(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<BulkUpdateRequest>,
) -> Result<Json<BulkResult>, AppError> {
    check_bulk_size(body.updates.len())?;

    let mut ids = Vec::with_capacity(body.updates.len());
    let mut updates = Vec::with_capacity(body.updates.len());
    for item in body.updates {
        ids.push(item.id);
        updates.push((item.id, item.update.validate()?));
    }

    let updated = state
        .db
        .bulk_update_appliances(bulk_owner(&current), &updates)?;
    let bills = state.db.bills_estimating(&updated)?;
    forget_appliances(&state, &updated, &bills).await;
    Ok(Json(BulkResult::new(&ids, updated)))
}

/// POST /appliances/bulk/delete
pub async fn bulk_delete_appliances(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<BulkDeleteRequest>,
) -> Result<Json<BulkResult>, AppError> {
    check_bulk_size(body.ids.len())?;

    let bills = state.db.bills_estimating(&body.ids)?;
    let deleted = state
        .db
        .bulk_delete_appliances(bulk_owner(&current), &body.ids)?;
    forget_appliances(&state, &deleted, &bills).await;
    Ok(Json(BulkResult::new(&body.ids, deleted)))
}

/// GET /appliances/:id/consumption - Daily to annual figures and savings ideas
pub async fn appliance_consumption(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(id): AppPath<Uuid>,
    AppQuery(params): AppQuery<ConsumptionParams>,
) -> Result<Json<ConsumptionReport>, AppError> {
    let rate = match params.electricity_rate {
        Some(rate) if !rate.is_finite() || rate <= 0.0 => {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "electricity_rate must be greater than 0",
            ));
        }
        Some(rate) => rate,
        None => state.settings.electricity_rate,
    };

    let appliance = load_appliance(&state, &current, id)?;
    Ok(Json(consumption_report(&appliance, rate)))
}

/// POST /appliances/estimate-bill - Split a hypothetical bill across appliances
pub async fn estimate_bill_impact(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<BillImpactRequest>,
) -> Result<Json<BillImpactResponse>, AppError> {
    if !body.bill_amount.is_finite() || body.bill_amount <= 0.0 {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            "bill_amount must be greater than 0",
        ));
    }
    if !(1..=MAX_IMPACT_DAYS).contains(&body.billing_days) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("billing_days must be between 1 and {}", MAX_IMPACT_DAYS),
        ));
    }

    let appliances = state.db.list_user_appliances(current.user.id)?;
    if appliances.is_empty() {
        return Err(AppError::business("No appliances registered"));
    }

    Ok(Json(BillImpactResponse {
        bill_amount: body.bill_amount,
        billing_days: body.billing_days,
        appliances: bill_impact(&appliances, body.bill_amount, body.billing_days),
    }))
}

/// GET /appliances/admin/all - Every user's appliances, paginated
pub async fn admin_list_appliances(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(params): AppQuery<ApplianceListParams>,
) -> Result<Json<Page<ApplianceView>>, AppError> {
    current.require_admin()?;
    let page = params.page;
    let user_id = params.user_id;
    let filter = params.filter(user_id)?;
    Ok(Json(page_of(&state, &filter, page)?))
}

/// GET /appliances/admin/statistics - System-wide appliance figures
pub async fn admin_appliance_statistics(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<SystemStatistics>, AppError> {
    current.require_admin()?;
    let appliances = state.db.list_all_appliances()?;
    let catalog = state.db.list_catalog(None)?;
    Ok(Json(system_statistics(
        &appliances,
        &catalog,
        state.settings.electricity_rate,
    )))
}
