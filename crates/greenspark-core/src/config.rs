//! Runtime settings read from the environment
//!
//! Every value has a default suitable for local development except the JWT
//! secret, which `serve` refuses to run without. Sub-systems that talk to
//! external services (S3, Redis, mail relay, Gemini) own their own `from_env`
//! constructors and are simply disabled or replaced by in-process fallbacks
//! when their variables are missing.

use std::collections::HashMap;
use std::time::Duration;

/// Environment variable holding the JWT signing secret
pub const JWT_SECRET_ENV: &str = "GREENSPARK_JWT_SECRET";

/// Token lifetimes
#[derive(Debug, Clone)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
    pub password_reset: Duration,
    pub email: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(15 * 60),
            refresh: Duration::from_secs(7 * 24 * 3600),
            password_reset: Duration::from_secs(60 * 60),
            email: Duration::from_secs(24 * 3600),
        }
    }
}

/// Cache key layout and expiry
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub namespace: Option<String>,
    pub version: Option<u32>,
    pub default_ttl: Duration,
    /// Per-schema TTL overrides keyed by schema name
    pub ttl_overrides: HashMap<String, Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            namespace: Some("greenspark".to_string()),
            version: Some(1),
            default_ttl: Duration::from_secs(300),
            ttl_overrides: HashMap::new(),
        }
    }
}

/// Per-IP request quotas
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub auth_per_minute: u32,
    pub api_per_minute: u32,
    pub max_failed_logins: usize,
    pub failed_login_window: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth_per_minute: 10,
            api_per_minute: 120,
            max_failed_logins: 5,
            failed_login_window: Duration::from_secs(15 * 60),
        }
    }
}

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_name: String,
    pub api_prefix: String,
    pub frontend_url: String,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub tokens: TokenLifetimes,
    /// Price per kWh used for appliance cost figures
    pub electricity_rate: f64,
    pub rate_limits: RateLimitSettings,
    pub cache: CacheSettings,
    pub workers: usize,
    pub stuck_parse_after: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: "GreenSpark API".to_string(),
            api_prefix: "/api/v1".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            cors_origins: vec![],
            jwt_secret: String::new(),
            tokens: TokenLifetimes::default(),
            electricity_rate: 8.0,
            rate_limits: RateLimitSettings::default(),
            cache: CacheSettings::default(),
            workers: 2,
            stuck_parse_after: Duration::from_secs(30 * 60),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

impl Settings {
    /// Read settings from `GREENSPARK_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = env_string("GREENSPARK_CORS_ORIGINS")
            .map(|s| parse_list(&s))
            .unwrap_or_default();

        let tokens = TokenLifetimes {
            access: env_parse::<u64>("GREENSPARK_ACCESS_TOKEN_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.tokens.access),
            refresh: env_parse::<u64>("GREENSPARK_REFRESH_TOKEN_DAYS")
                .map(|d| Duration::from_secs(d * 24 * 3600))
                .unwrap_or(defaults.tokens.refresh),
            password_reset: env_parse::<u64>("GREENSPARK_PASSWORD_RESET_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.tokens.password_reset),
            email: env_parse::<u64>("GREENSPARK_EMAIL_TOKEN_HOURS")
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.tokens.email),
        };

        let rate_limits = RateLimitSettings {
            auth_per_minute: env_parse("GREENSPARK_AUTH_RATE_PER_MINUTE")
                .unwrap_or(defaults.rate_limits.auth_per_minute),
            api_per_minute: env_parse("GREENSPARK_API_RATE_PER_MINUTE")
                .unwrap_or(defaults.rate_limits.api_per_minute),
            max_failed_logins: env_parse("GREENSPARK_MAX_FAILED_LOGINS")
                .unwrap_or(defaults.rate_limits.max_failed_logins),
            failed_login_window: defaults.rate_limits.failed_login_window,
        };

        let cache = CacheSettings {
            namespace: env_string("GREENSPARK_CACHE_NAMESPACE").or(defaults.cache.namespace),
            version: env_parse("GREENSPARK_CACHE_VERSION").or(defaults.cache.version),
            default_ttl: env_parse::<u64>("GREENSPARK_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache.default_ttl),
            ttl_overrides: env_string("GREENSPARK_CACHE_TTL_OVERRIDES")
                .map(|s| parse_ttl_overrides(&s))
                .unwrap_or_default(),
        };

        Self {
            project_name: env_string("GREENSPARK_PROJECT_NAME").unwrap_or(defaults.project_name),
            api_prefix: env_string("GREENSPARK_API_PREFIX").unwrap_or(defaults.api_prefix),
            frontend_url: env_string("GREENSPARK_FRONTEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.frontend_url),
            cors_origins,
            jwt_secret: env_string(JWT_SECRET_ENV).unwrap_or_default(),
            tokens,
            electricity_rate: env_parse("GREENSPARK_ELECTRICITY_RATE")
                .filter(|r: &f64| *r > 0.0)
                .unwrap_or(defaults.electricity_rate),
            rate_limits,
            cache,
            workers: env_parse("GREENSPARK_WORKERS")
                .filter(|w: &usize| *w > 0)
                .unwrap_or(defaults.workers),
            stuck_parse_after: env_parse::<u64>("GREENSPARK_STUCK_PARSE_MINUTES")
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.stuck_parse_after),
        }
    }

    /// Settings for tests: fixed secret, everything else default
    pub fn for_tests() -> Self {
        Self {
            jwt_secret: "test-secret-do-not-use-in-production".to_string(),
            ..Self::default()
        }
    }
}

/// Split a comma-separated list, dropping empty entries
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `schema=seconds` pairs, e.g. `bill_detail=60,catalog=3600`
fn parse_ttl_overrides(input: &str) -> HashMap<String, Duration> {
    parse_list(input)
        .into_iter()
        .filter_map(|pair| {
            let (name, secs) = pair.split_once('=')?;
            let secs: u64 = secs.trim().parse().ok()?;
            Some((name.trim().to_string(), Duration::from_secs(secs)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.api_prefix, "/api/v1");
        assert_eq!(settings.tokens.access, Duration::from_secs(900));
        assert_eq!(settings.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(settings.electricity_rate, 8.0);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("http://a.test, ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn test_parse_ttl_overrides() {
        let overrides = parse_ttl_overrides("bill_detail=60, catalog=3600, broken, x=abc");
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides["bill_detail"], Duration::from_secs(60));
        assert_eq!(overrides["catalog"], Duration::from_secs(3600));
    }
}
