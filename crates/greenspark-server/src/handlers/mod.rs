//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod admin;
pub mod appliances;
pub mod auth;
pub mod bills;
pub mod health;
pub mod insights;
pub mod users;

// Re-export all handlers for use in router
pub use admin::*;
pub use appliances::*;
pub use auth::*;
pub use bills::*;
pub use health::*;
pub use insights::*;
pub use users::*;

use axum::extract::{FromRequest, FromRequestParts};
use tracing::warn;

use greenspark_core::{EmailKind, Job};

use crate::{AppError, AppState, MAX_PAGE_LIMIT};

/// JSON body whose rejections use the API error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// URL-encoded form body
#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(AppError))]
pub struct AppForm<T>(pub T);

/// Query string
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Path parameters
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

pub(crate) fn default_limit() -> i64 {
    MAX_PAGE_LIMIT
}

/// Validate skip/limit pagination
pub(crate) fn check_pagination(skip: i64, limit: i64) -> Result<(), AppError> {
    if skip < 0 {
        return Err(AppError::new(
            crate::ErrorCode::ValidationError,
            "skip cannot be negative",
        ));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(AppError::new(
            crate::ErrorCode::ValidationError,
            format!("limit must be between 1 and {}", MAX_PAGE_LIMIT),
        ));
    }
    Ok(())
}

/// Queue an email; delivery problems never fail the request
pub(crate) async fn queue_email(state: &AppState, to: &str, email: EmailKind) {
    let kind = email.as_str();
    let job = Job::SendEmail {
        to: to.to_string(),
        email,
    };
    if let Err(e) = state.queue.enqueue(job).await {
        warn!(kind, error = %e, "Failed to queue email");
    }
}
