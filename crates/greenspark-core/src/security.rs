//! Password hashing and signed tokens
//!
//! Passwords are stored as Argon2id PHC strings. Access, refresh and
//! single-purpose tokens (password reset, email verification, email change)
//! are HS256 JWTs carrying a `token_type` claim so one kind can never be
//! replayed as another.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenLifetimes;
use crate::error::{AuthFailure, Error, Result};

/// Hash a password with Argon2id and a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Password(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Whether a stored hash was produced with different parameters than today's defaults
pub fn needs_rehash(stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return true;
    };
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        return true;
    }
    if parsed.version != Some(Version::V0x13.into()) {
        return true;
    }
    let Ok(params) = Params::try_from(&parsed) else {
        return true;
    };
    let current = Params::default();
    params.m_cost() != current.m_cost()
        || params.t_cost() != current.t_cost()
        || params.p_cost() != current.p_cost()
}

/// Purpose of a signed token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    PasswordReset,
    EmailVerification,
    EmailChange,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
            Self::EmailChange => "email_change",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    /// Issue time in unix milliseconds, compared against revocation cut-offs
    #[serde(default)]
    pub iat_ms: i64,
    /// Unique token id, used by the revocation denylist
    pub jti: String,
    pub token_type: TokenType,
    /// Target address of an email change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_email: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| Error::Auth(AuthFailure::InvalidToken))
    }

    fn issued_at_ms(&self) -> i64 {
        if self.iat_ms > 0 {
            self.iat_ms
        } else {
            self.iat.saturating_mul(1000)
        }
    }

    /// Whether a `tokens_valid_from` cut-off (unix ms) revokes this token.
    /// Tokens minted in the same millisecond as the cut-off are revoked too.
    pub fn revoked_by(&self, cutoff_ms: Option<i64>) -> bool {
        cutoff_ms.is_some_and(|c| self.issued_at_ms() <= c)
    }
}

/// Access and refresh token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

/// Issues and verifies HS256 tokens
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetimes: TokenLifetimes,
}

impl TokenService {
    pub fn new(secret: &str, lifetimes: TokenLifetimes) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Validation("JWT secret must not be empty".to_string()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetimes,
        })
    }

    fn lifetime_secs(&self, token_type: TokenType) -> i64 {
        let d = match token_type {
            TokenType::Access => self.lifetimes.access,
            TokenType::Refresh => self.lifetimes.refresh,
            TokenType::PasswordReset => self.lifetimes.password_reset,
            TokenType::EmailVerification | TokenType::EmailChange => self.lifetimes.email,
        };
        d.as_secs() as i64
    }

    /// Sign a token of the given type for a user
    pub fn issue(
        &self,
        user_id: Uuid,
        token_type: TokenType,
        new_email: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();
        let iat = now.timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: iat + self.lifetime_secs(token_type),
            iat,
            iat_ms: now.timestamp_millis(),
            jti: Uuid::new_v4().to_string(),
            token_type,
            new_email: new_email.map(str::to_string),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::InvalidData(format!("Failed to sign token: {}", e)))?;
        Ok(token)
    }

    /// Issue a fresh access/refresh pair
    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue(user_id, TokenType::Access, None)?,
            refresh_token: self.issue(user_id, TokenType::Refresh, None)?,
            token_type: "bearer".to_string(),
        })
    }

    /// Verify signature, expiry and purpose
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if data.claims.token_type != expected {
            return Err(Error::Auth(AuthFailure::TokenTypeInvalid));
        }
        Ok(data.claims)
    }
}
