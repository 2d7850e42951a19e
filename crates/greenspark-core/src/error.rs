//! Error types for GreenSpark

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Authentication failed: {0}")]
    Auth(AuthFailure),

    #[error("Business rule violated: {0}")]
    BusinessRule(String),

    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("AI error: {0}")]
    Ai(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Password hashing error: {0}")]
    Password(String),
}

/// Reasons an authentication or token check can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    InvalidToken,
    TokenExpired,
    TokenTypeInvalid,
    TokenRevoked,
    InactiveUser,
    UnverifiedUser,
    NotAuthorized,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Incorrect email or password",
            Self::InvalidToken => "Could not validate credentials",
            Self::TokenExpired => "Token has expired",
            Self::TokenTypeInvalid => "Invalid token type",
            Self::TokenRevoked => "Token has been revoked",
            Self::InactiveUser => "User account is inactive",
            Self::UnverifiedUser => "Email address has not been verified",
            Self::NotAuthorized => "Not authorized to perform this action",
        }
    }
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl From<AuthFailure> for Error {
    fn from(failure: AuthFailure) -> Self {
        Error::Auth(failure)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Error::Auth(AuthFailure::TokenExpired),
            _ => Error::Auth(AuthFailure::InvalidToken),
        }
    }
}

impl Error {
    /// Whether retrying the same operation later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Io(_) | Error::Pool(_) | Error::Unavailable(_) | Error::Email(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
