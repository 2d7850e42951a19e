//! Administrator handlers: user management and the appliance catalog

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use greenspark_core::{
    models::{
        ApplianceCatalog, ApplianceView, NewCatalogEntry, Page, User, UserFilter, UserRole,
    },
    usage::appliance_view,
    CacheSchema,
};

use super::{auth::revoke_all_tokens, check_pagination, default_limit, AppJson, AppPath, AppQuery};
use crate::{AppError, AppState, CurrentUser, MessageResponse};

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: UserRole,
}

fn load_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .db
        .get_user(id)?
        .ok_or_else(|| AppError::not_found(format!("User {} not found", id)))
}

/// GET /admin/users/all - Paginated user listing with filters
pub async fn list_all_users(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(params): AppQuery<UserListParams>,
) -> Result<Json<Page<User>>, AppError> {
    current.require_admin()?;
    check_pagination(params.skip, params.limit)?;

    let filter = UserFilter {
        search: params.search.filter(|s| !s.trim().is_empty()),
        role: params.role,
        is_active: params.is_active,
        is_verified: params.is_verified,
    };
    let users = state.db.list_users(&filter, params.skip, params.limit)?;
    let total = state.db.count_users(&filter)?;
    Ok(Json(Page::from_offset(users, total, params.skip, params.limit)))
}

/// GET /admin/:user_id - Any user's profile
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<User>, AppError> {
    current.require_admin()?;
    Ok(Json(load_user(&state, user_id)?))
}

/// POST /admin/:user_id/change-role
pub async fn change_role(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
    AppJson(body): AppJson<ChangeRoleRequest>,
) -> Result<Json<User>, AppError> {
    current.require_admin()?;
    if user_id == current.user.id {
        return Err(AppError::not_allowed("You cannot change your own role"));
    }
    load_user(&state, user_id)?;

    state.db.set_user_role(user_id, body.role)?;
    info!(admin_id = %current.user.id, user_id = %user_id, role = %body.role, "Role changed");
    Ok(Json(load_user(&state, user_id)?))
}

/// POST /admin/:user_id/activate
pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    current.require_admin()?;
    let user = load_user(&state, user_id)?;
    if user.is_active {
        return Err(AppError::business("User is already active"));
    }

    state.db.set_user_active(user_id, true)?;
    info!(admin_id = %current.user.id, user_id = %user_id, "User activated");
    Ok(Json(MessageResponse::new(format!(
        "User {} has been activated.",
        user.email
    ))))
}

/// POST /admin/:user_id/deactivate - Disable an account and revoke its sessions
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    current.require_admin()?;
    if user_id == current.user.id {
        return Err(AppError::not_allowed("You cannot deactivate your own account"));
    }
    let user = load_user(&state, user_id)?;
    if !user.is_active {
        return Err(AppError::business("User is already inactive"));
    }

    state.db.set_user_active(user_id, false)?;
    state.db.set_user_verified(user_id, false)?;
    revoke_all_tokens(&state, user_id)?;

    info!(admin_id = %current.user.id, user_id = %user_id, "User deactivated");
    Ok(Json(MessageResponse::new(format!(
        "User {} has been deactivated.",
        user.email
    ))))
}

/// DELETE /admin/:user_id/delete - Remove an account and everything it owns
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    current.require_admin()?;
    if user_id == current.user.id {
        return Err(AppError::not_allowed("You cannot delete your own account"));
    }
    let user = load_user(&state, user_id)?;
    if user.is_admin() && user.is_active && state.db.count_active_admins()? <= 1 {
        return Err(AppError::not_allowed("Cannot delete the last active admin"));
    }

    state.db.delete_user(user_id)?;
    state.cache.invalidate_schema(CacheSchema::BillDetail).await;
    state.cache.invalidate_schema(CacheSchema::InsightReport).await;
    state.cache.invalidate_schema(CacheSchema::ApplianceView).await;

    info!(admin_id = %current.user.id, user_id = %user_id, "User deleted");
    Ok(Json(MessageResponse::new(format!(
        "User {} has been deleted.",
        user.email
    ))))
}

/// GET /admin/:user_id/appliances
///
/// Also served at /appliances/admin/user/:user_id/appliances.
pub async fn admin_user_appliances(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(user_id): AppPath<Uuid>,
) -> Result<Json<Vec<ApplianceView>>, AppError> {
    current.require_admin()?;
    load_user(&state, user_id)?;

    let rate = state.settings.electricity_rate;
    let appliances = state
        .db
        .list_user_appliances(user_id)?
        .into_iter()
        .map(|a| appliance_view(a, rate))
        .collect();
    Ok(Json(appliances))
}

/// POST /admin/catalog - Add a catalog entry
pub async fn create_catalog_entry(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<NewCatalogEntry>,
) -> Result<(StatusCode, Json<ApplianceCatalog>), AppError> {
    current.require_admin()?;
    let entry = state.db.create_catalog_entry(&body.validate()?)?;
    state.cache.invalidate_schema(CacheSchema::CatalogList).await;

    info!(category_id = %entry.category_id, "Catalog entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// DELETE /admin/catalog/:catalog_id
pub async fn delete_catalog_entry(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppPath(catalog_id): AppPath<String>,
) -> Result<Json<MessageResponse>, AppError> {
    current.require_admin()?;
    if !state.db.delete_catalog_entry(&catalog_id)? {
        return Err(AppError::not_found(format!(
            "Catalog entry '{}' not found",
            catalog_id
        )));
    }
    // Appliances linked to the entry lost their catalog id
    state.cache.invalidate_schema(CacheSchema::CatalogList).await;
    state.cache.invalidate_schema(CacheSchema::ApplianceView).await;

    Ok(Json(MessageResponse::new(format!(
        "Catalog entry '{}' deleted.",
        catalog_id
    ))))
}
