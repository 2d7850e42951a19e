//! Handlers for the caller's own account

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use tracing::info;

use greenspark_core::{
    models::{Bill, Page, User, UserUpdate},
    security::{hash_password, verify_password},
    validation::validate_password_change,
    AuthFailure, BillFilter,
};

use super::{auth::revoke_all_tokens, check_pagination, default_limit, AppJson, AppQuery};
use crate::{AppError, AppState, CurrentUser, MessageResponse};

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// GET /users/me - Current profile
pub async fn get_me(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.user)
}

/// PATCH /users/me - Update profile fields
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<UserUpdate>,
) -> Result<Json<User>, AppError> {
    let update = body.validate()?;
    let user = state.db.update_user_profile(current.user.id, &update)?;
    Ok(Json(user))
}

/// DELETE /users/me - Deactivate the account and sign out everywhere
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = current.user.id;
    state.db.set_user_active(id, false)?;
    revoke_all_tokens(&state, id)?;
    state
        .db
        .revoke_token(&current.claims.jti, current.claims.exp)?;

    info!(user_id = %id, "User deactivated own account");
    Ok(Json(MessageResponse::new("Account deactivated successfully.")))
}

/// POST /users/change-password - Change password and revoke existing sessions
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<ChangePasswordRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    validate_password_change(&body.current_password, &body.new_password)?;
    if !verify_password(&body.current_password, &current.user.hashed_password) {
        return Err(AuthFailure::InvalidCredentials.into());
    }

    let hashed = hash_password(&body.new_password)?;
    state.db.set_user_password(current.user.id, &hashed)?;
    revoke_all_tokens(&state, current.user.id)?;
    state
        .db
        .revoke_token(&current.claims.jti, current.claims.exp)?;

    info!(user_id = %current.user.id, "Password changed");
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "Password changed successfully. Please log in again.",
        )),
    ))
}

/// GET /users/me/bills - The caller's bills, newest first
pub async fn list_my_bills(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppQuery(params): AppQuery<PageParams>,
) -> Result<Json<Page<Bill>>, AppError> {
    check_pagination(params.skip, params.limit)?;
    let filter = BillFilter {
        skip: params.skip,
        limit: params.limit,
        ..BillFilter::for_user(current.user.id)
    };
    let bills = state.db.list_bills(&filter)?;
    let total = state.db.count_bills(&filter)?;
    Ok(Json(Page::from_offset(bills, total, params.skip, params.limit)))
}
