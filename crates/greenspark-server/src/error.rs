//! HTTP error mapping
//!
//! Every failure leaves the API as
//! `{"error": {"code", "message", "status_code", "context"}}`.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::error;

use greenspark_core::{AuthFailure, Error};

/// Machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidCredentials,
    InvalidToken,
    TokenExpired,
    TokenTypeInvalid,
    TokenRevoked,
    NotAuthorized,
    InactiveUser,
    UnverifiedUser,
    BadRequest,
    InvalidInput,
    BusinessLogicError,
    OperationNotAllowed,
    ResourceNotFound,
    ResourceAlreadyExists,
    ValidationError,
    RateLimitExceeded,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenTypeInvalid => "TOKEN_TYPE_INVALID",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::InactiveUser => "INACTIVE_USER",
            Self::UnverifiedUser => "UNVERIFIED_USER",
            Self::BadRequest => "BAD_REQUEST",
            Self::InvalidInput => "INVALID_INPUT",
            Self::BusinessLogicError => "BUSINESS_LOGIC_ERROR",
            Self::OperationNotAllowed => "OPERATION_NOT_ALLOWED",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::ResourceAlreadyExists => "RESOURCE_ALREADY_EXISTS",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::TokenTypeInvalid
            | Self::TokenRevoked => StatusCode::UNAUTHORIZED,
            Self::NotAuthorized | Self::InactiveUser | Self::UnverifiedUser => {
                StatusCode::FORBIDDEN
            }
            Self::BadRequest
            | Self::InvalidInput
            | Self::BusinessLogicError
            | Self::OperationNotAllowed => StatusCode::BAD_REQUEST,
            Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::ResourceAlreadyExists => StatusCode::CONFLICT,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthFailure> for ErrorCode {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::InvalidCredentials => Self::InvalidCredentials,
            AuthFailure::InvalidToken => Self::InvalidToken,
            AuthFailure::TokenExpired => Self::TokenExpired,
            AuthFailure::TokenTypeInvalid => Self::TokenTypeInvalid,
            AuthFailure::TokenRevoked => Self::TokenRevoked,
            AuthFailure::InactiveUser => Self::InactiveUser,
            AuthFailure::UnverifiedUser => Self::UnverifiedUser,
            AuthFailure::NotAuthorized => Self::NotAuthorized,
        }
    }
}

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    code: ErrorCode,
    message: String,
    context: Option<Value>,
    retry_after: Option<u64>,
    internal: Option<Error>,
}

impl AppError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            context: None,
            retry_after: None,
            internal: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceAlreadyExists, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotAuthorized, msg)
    }

    pub fn business(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::BusinessLogicError, msg)
    }

    pub fn not_allowed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::OperationNotAllowed, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, msg)
    }

    pub fn auth(failure: AuthFailure) -> Self {
        Self::new(failure.into(), failure.message())
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self {
            retry_after: Some(retry_after_secs.max(1)),
            ..Self::new(
                ErrorCode::RateLimitExceeded,
                "Too many requests, please try again later",
            )
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, code = self.code.as_str(), "Internal error");
        }

        let status = self.code.status();
        let body = Json(serde_json::json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "status_code": status.as_u16(),
                "context": self.context,
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::Auth(failure) => return Self::auth(*failure),
            Error::InvalidData(_) => ErrorCode::BadRequest,
            Error::NotFound(_) => ErrorCode::ResourceNotFound,
            Error::Validation(_) => ErrorCode::ValidationError,
            Error::Conflict(_) => ErrorCode::ResourceAlreadyExists,
            Error::Forbidden(_) => ErrorCode::NotAuthorized,
            Error::BusinessRule(_) => ErrorCode::BusinessLogicError,
            Error::OperationNotAllowed(_) => ErrorCode::OperationNotAllowed,
            Error::Storage(_) | Error::Ai(_) | Error::Unavailable(_) | Error::Email(_) => {
                ErrorCode::ServiceUnavailable
            }
            Error::Database(_)
            | Error::Pool(_)
            | Error::Encryption(_)
            | Error::Io(_)
            | Error::Http(_)
            | Error::Json(_)
            | Error::Cache(_)
            | Error::Password(_) => ErrorCode::InternalError,
        };

        let message = match &err {
            Error::InvalidData(m)
            | Error::NotFound(m)
            | Error::Validation(m)
            | Error::Conflict(m)
            | Error::Forbidden(m)
            | Error::BusinessRule(m)
            | Error::OperationNotAllowed(m) => m.clone(),
            Error::Storage(_) | Error::Ai(_) | Error::Unavailable(_) | Error::Email(_) => {
                "Service temporarily unavailable".to_string()
            }
            // Generic message to client
            _ => "An internal error occurred".to_string(),
        };

        let internal = matches!(
            code,
            ErrorCode::InternalError | ErrorCode::ServiceUnavailable
        )
        .then_some(err);

        Self {
            code,
            message,
            context: None,
            retry_after: None,
            internal,
        }
    }
}

impl From<AuthFailure> for AppError {
    fn from(failure: AuthFailure) -> Self {
        Self::auth(failure)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let code = if rejection.status() == StatusCode::UNPROCESSABLE_ENTITY {
            ErrorCode::ValidationError
        } else {
            ErrorCode::InvalidInput
        };
        Self::new(code, rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        Self::new(ErrorCode::InvalidInput, rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(ErrorCode::InvalidInput, rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(ErrorCode::InvalidInput, rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::new(ErrorCode::InvalidInput, rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_codes() {
        let cases = [
            (Error::NotFound("bill".into()), ErrorCode::ResourceNotFound),
            (Error::Validation("bad".into()), ErrorCode::ValidationError),
            (Error::Conflict("dup".into()), ErrorCode::ResourceAlreadyExists),
            (Error::BusinessRule("no".into()), ErrorCode::BusinessLogicError),
            (Error::Unavailable("ai".into()), ErrorCode::ServiceUnavailable),
            (Error::Auth(AuthFailure::TokenExpired), ErrorCode::TokenExpired),
            (Error::Auth(AuthFailure::InactiveUser), ErrorCode::InactiveUser),
            (Error::Password("boom".into()), ErrorCode::InternalError),
        ];
        for (err, code) in cases {
            assert_eq!(AppError::from(err).code(), code);
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorCode::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::UnverifiedUser.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ValidationError.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ErrorCode::ResourceAlreadyExists.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::RateLimitExceeded.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = AppError::from(Error::Password("argon2 exploded".into()));
        assert_eq!(err.message, "An internal error occurred");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::rate_limited(30).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    }
}
