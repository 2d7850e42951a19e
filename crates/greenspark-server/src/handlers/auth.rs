//! Authentication handlers: signup, login, token refresh and the email flows

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use greenspark_core::{
    models::{NewUser, User, UserRole},
    security::{hash_password, needs_rehash, verify_password},
    validation::{validate_email, validate_password_reset},
    AuthFailure, EmailKind, TokenPair, TokenType,
};

use super::{queue_email, AppForm, AppJson};
use crate::auth::check_not_revoked;
use crate::{get_client_ip, AppError, AppState, CurrentUser, MessageResponse};

/// Login form, `username` accepts an email or a username
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailChangeRequest {
    pub new_email: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

fn peer_ip(
    state: &AppState,
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> IpAddr {
    get_client_ip(headers, connect_info, &state.trusted_proxies)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Load the user a single-purpose token was issued for
fn token_user(state: &AppState, token: &str, token_type: TokenType) -> Result<(User, greenspark_core::Claims), AppError> {
    let claims = state.tokens.verify(token, token_type)?;
    let user = state
        .db
        .get_user(claims.user_id()?)?
        .ok_or(AuthFailure::InvalidToken)?;
    check_not_revoked(&state.db, &claims, &user)?;
    Ok((user, claims))
}

async fn send_verification(state: &AppState, user: &User) -> Result<(), AppError> {
    let token = state
        .tokens
        .issue(user.id, TokenType::EmailVerification, None)?;
    queue_email(state, &user.email, EmailKind::Verification { token }).await;
    Ok(())
}

async fn login_user(
    state: &AppState,
    ip: IpAddr,
    form: LoginForm,
    admin_only: bool,
) -> Result<TokenPair, AppError> {
    if state.limits.login_locked(ip) {
        warn!(ip = %ip, "Login rejected: too many failed attempts");
        return Err(AppError::auth(AuthFailure::InvalidCredentials)
            .with_context(json!({ "reason": "too_many_failed_attempts" })));
    }

    let user = match state.db.get_user_by_login(form.username.trim())? {
        Some(user) if verify_password(&form.password, &user.hashed_password) => user,
        _ => {
            state.limits.record_failed_login(ip);
            info!(ip = %ip, "Failed login attempt");
            return Err(AuthFailure::InvalidCredentials.into());
        }
    };

    if !user.is_active {
        return Err(AuthFailure::InactiveUser.into());
    }
    if !user.is_verified {
        return Err(AuthFailure::UnverifiedUser.into());
    }
    if admin_only && !user.is_admin() {
        return Err(AuthFailure::NotAuthorized.into());
    }

    state.limits.failed_logins.clear(ip);

    if needs_rehash(&user.hashed_password) {
        match hash_password(&form.password) {
            Ok(hash) => {
                if let Err(e) = state.db.set_user_password(user.id, &hash) {
                    warn!(user_id = %user.id, error = %e, "Failed to store rehashed password");
                }
            }
            Err(e) => warn!(user_id = %user.id, error = %e, "Password rehash failed"),
        }
    }

    info!(user_id = %user.id, admin = admin_only, "User logged in");
    Ok(state.tokens.issue_pair(user.id)?)
}

/// Invalidate every token issued to a user so far
pub(crate) fn revoke_all_tokens(state: &AppState, user_id: uuid::Uuid) -> Result<(), AppError> {
    state
        .db
        .set_tokens_valid_from(user_id, Utc::now().timestamp_millis())?;
    Ok(())
}

/// POST /auth/signup - Register a new account
pub async fn signup(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let body = body.validate()?;
    let hashed = hash_password(&body.password)?;
    let user = state
        .db
        .create_user(&body, &hashed, UserRole::User, false)?;

    send_verification(&state, &user).await?;
    info!(user_id = %user.id, "User signed up");

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login - Exchange credentials for a token pair
pub async fn login(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    AppForm(form): AppForm<LoginForm>,
) -> Result<Json<TokenPair>, AppError> {
    let ip = peer_ip(&state, &headers, connect_info.as_ref());
    Ok(Json(login_user(&state, ip, form, false).await?))
}

/// POST /auth/admin/login - Login restricted to administrators
pub async fn admin_login(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    AppForm(form): AppForm<LoginForm>,
) -> Result<Json<TokenPair>, AppError> {
    let ip = peer_ip(&state, &headers, connect_info.as_ref());
    Ok(Json(login_user(&state, ip, form, true).await?))
}

/// POST /auth/logout - Revoke the access token and an optional refresh token
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    body: Option<AppJson<LogoutRequest>>,
) -> Result<StatusCode, AppError> {
    state
        .db
        .revoke_token(&current.claims.jti, current.claims.exp)?;

    let body = body.map(|AppJson(b)| b).unwrap_or_default();
    if let Some(refresh) = body.refresh_token {
        // A bad refresh token does not undo the logout
        match state.tokens.verify(&refresh, TokenType::Refresh) {
            Ok(claims) if claims.sub == current.claims.sub => {
                state.db.revoke_token(&claims.jti, claims.exp)?;
            }
            _ => warn!(user_id = %current.user.id, "Ignoring invalid refresh token on logout"),
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/refresh - Rotate a refresh token into a new pair
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let (user, claims) = token_user(&state, &body.refresh_token, TokenType::Refresh)?;
    if !user.is_active {
        return Err(AuthFailure::InactiveUser.into());
    }

    state.db.revoke_token(&claims.jti, claims.exp)?;
    Ok(Json(state.tokens.issue_pair(user.id)?))
}

/// POST /auth/password-reset-request - Email a reset link if the account exists
pub async fn password_reset_request(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<EmailRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    // Same answer either way so the endpoint cannot probe for accounts
    if let Ok(email) = validate_email(&body.email) {
        if let Some(user) = state.db.get_user_by_email(&email)? {
            if user.is_active {
                let token = state.tokens.issue(user.id, TokenType::PasswordReset, None)?;
                queue_email(&state, &user.email, EmailKind::PasswordReset { token }).await;
            }
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "If an account with that email exists, a password reset link has been sent.",
        )),
    ))
}

/// POST /auth/password-reset-confirm - Set a new password from a reset token
pub async fn password_reset_confirm(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<PasswordResetConfirm>,
) -> Result<Json<MessageResponse>, AppError> {
    let (user, claims) = token_user(&state, &body.token, TokenType::PasswordReset)?;
    validate_password_reset(&body.new_password, &body.confirm_password)?;

    let hashed = hash_password(&body.new_password)?;
    state.db.set_user_password(user.id, &hashed)?;
    state.db.revoke_token(&claims.jti, claims.exp)?;
    revoke_all_tokens(&state, user.id)?;

    info!(user_id = %user.id, "Password reset");
    Ok(Json(MessageResponse::new("Password has been reset successfully.")))
}

/// POST /auth/email - Start an email address change
pub async fn request_email_change(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    AppJson(body): AppJson<EmailChangeRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let new_email = validate_email(&body.new_email)?;
    if new_email == current.user.email {
        return Err(AppError::bad_request("New email matches the current email"));
    }
    if state.db.get_user_by_email(&new_email)?.is_some() {
        return Err(AppError::conflict("Email already registered"));
    }

    let token = state
        .tokens
        .issue(current.user.id, TokenType::EmailChange, Some(&new_email))?;
    queue_email(&state, &new_email, EmailKind::EmailChange { token }).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "A confirmation link has been sent to the new email address.",
        )),
    ))
}

/// POST /auth/email/confirm-change - Apply an email change token
pub async fn confirm_email_change(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<TokenRequest>,
) -> Result<Json<User>, AppError> {
    let (user, claims) = token_user(&state, &body.token, TokenType::EmailChange)?;
    let new_email = claims
        .new_email
        .clone()
        .ok_or(AuthFailure::InvalidToken)?;

    if let Some(other) = state.db.get_user_by_email(&new_email)? {
        if other.id != user.id {
            return Err(AppError::conflict("Email already registered"));
        }
    }

    state.db.set_user_email(user.id, &new_email)?;
    state.db.revoke_token(&claims.jti, claims.exp)?;

    let user = state
        .db
        .get_user(user.id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    info!(user_id = %user.id, "Email address changed");
    Ok(Json(user))
}

/// POST /auth/email/request-verification-email - Resend the verification link
pub async fn request_verification_email(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<EmailRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    if let Ok(email) = validate_email(&body.email) {
        if let Some(user) = state.db.get_user_by_email(&email)? {
            if user.is_active && !user.is_verified {
                send_verification(&state, &user).await?;
            }
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new(
            "If the account exists and is unverified, a verification email has been sent.",
        )),
    ))
}

/// POST /auth/email/verify-email - Mark the account verified
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<TokenRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let (user, claims) = token_user(&state, &body.token, TokenType::EmailVerification)?;
    state.db.revoke_token(&claims.jti, claims.exp)?;

    if user.is_verified {
        return Ok(Json(MessageResponse::new("Email is already verified.")));
    }

    state.db.set_user_verified(user.id, true)?;
    queue_email(
        &state,
        &user.email,
        EmailKind::Welcome {
            first_name: user.first_name.clone(),
        },
    )
    .await;

    info!(user_id = %user.id, "Email verified");
    Ok(Json(MessageResponse::new("Email verified successfully.")))
}
