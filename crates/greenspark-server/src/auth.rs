//! Bearer-token authentication middleware

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use greenspark_core::{
    models::User, AuthFailure, Claims, Database, Result as CoreResult, TokenType,
};

use crate::{AppError, AppState};

/// The authenticated caller, inserted into request extensions
#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
    pub claims: Claims,
}

impl CurrentUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.user.is_admin() {
            Ok(())
        } else {
            Err(AppError::auth(AuthFailure::NotAuthorized))
        }
    }

    /// Owners and admins may touch a resource
    pub fn can_access(&self, owner: uuid::Uuid) -> bool {
        self.user.id == owner || self.user.is_admin()
    }
}

/// Extract the token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Check a token against the denylist and its user's revocation cut-off
pub fn check_not_revoked(db: &Database, claims: &Claims, user: &User) -> CoreResult<()> {
    if db.is_token_revoked(&claims.jti)? || claims.revoked_by(user.tokens_valid_from) {
        return Err(AuthFailure::TokenRevoked.into());
    }
    Ok(())
}

/// Resolve an access token to an active, verified user
pub fn authenticate(state: &AppState, token: &str) -> CoreResult<CurrentUser> {
    let claims = state.tokens.verify(token, TokenType::Access)?;
    let user = state
        .db
        .get_user(claims.user_id()?)?
        .ok_or(AuthFailure::InvalidToken)?;
    check_not_revoked(&state.db, &claims, &user)?;
    if !user.is_active {
        return Err(AuthFailure::InactiveUser.into());
    }
    if !user.is_verified {
        return Err(AuthFailure::UnverifiedUser.into());
    }
    Ok(CurrentUser { user, claims })
}

/// Authentication middleware - rejects requests without a valid access token
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AuthFailure::InvalidToken)?;
    let current = authenticate(&state, token)?;
    debug!(user_id = %current.user.id, path = %request.uri().path(), "Authenticated request");
    request.extensions_mut().insert(current);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }
}
