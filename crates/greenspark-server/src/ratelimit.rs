//! Per-IP request quotas and failed-login lockout

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{clock::Clock, clock::DefaultClock, DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::warn;

use greenspark_core::config::RateLimitSettings;

use crate::{client_ip, AppError, AppState};

fn per_minute(n: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
}

/// Recent failed logins per client IP
#[derive(Default)]
pub struct FailedLogins {
    attempts: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl FailedLogins {
    fn prune(entries: &mut Vec<Instant>, window: Duration, now: Instant) {
        entries.retain(|t| now.duration_since(*t) < window);
    }

    /// Whether `ip` has reached `max` failures inside `window`
    pub fn is_locked(&self, ip: IpAddr, max: usize, window: Duration) -> bool {
        let Ok(mut attempts) = self.attempts.lock() else {
            return false;
        };
        let now = Instant::now();
        let Some(entries) = attempts.get_mut(&ip) else {
            return false;
        };
        Self::prune(entries, window, now);
        let locked = entries.len() >= max;
        if entries.is_empty() {
            attempts.remove(&ip);
        }
        locked
    }

    pub fn record(&self, ip: IpAddr, window: Duration) {
        if let Ok(mut attempts) = self.attempts.lock() {
            let now = Instant::now();
            let entries = attempts.entry(ip).or_default();
            Self::prune(entries, window, now);
            entries.push(now);
        }
    }

    pub fn clear(&self, ip: IpAddr) {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.remove(&ip);
        }
    }

    /// Forget IPs whose failures have all aged out; returns how many went
    pub fn sweep(&self, window: Duration) -> usize {
        let Ok(mut attempts) = self.attempts.lock() else {
            return 0;
        };
        let now = Instant::now();
        let before = attempts.len();
        attempts.retain(|_, entries| {
            Self::prune(entries, window, now);
            !entries.is_empty()
        });
        attempts.shrink_to_fit();
        before - attempts.len()
    }

    pub fn tracked_ips(&self) -> usize {
        self.attempts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

/// Request quotas shared by every handler
pub struct RateLimits {
    auth: DefaultKeyedRateLimiter<IpAddr>,
    api: DefaultKeyedRateLimiter<IpAddr>,
    pub failed_logins: FailedLogins,
    pub settings: RateLimitSettings,
}

impl RateLimits {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            auth: RateLimiter::keyed(per_minute(settings.auth_per_minute)),
            api: RateLimiter::keyed(per_minute(settings.api_per_minute)),
            failed_logins: FailedLogins::default(),
            settings,
        }
    }

    fn check(limiter: &DefaultKeyedRateLimiter<IpAddr>, ip: IpAddr) -> Result<(), AppError> {
        limiter.check_key(&ip).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            warn!(ip = %ip, wait_secs = wait.as_secs(), "Rate limit exceeded");
            AppError::rate_limited(wait.as_secs())
        })
    }

    pub fn check_auth(&self, ip: IpAddr) -> Result<(), AppError> {
        Self::check(&self.auth, ip)
    }

    pub fn check_api(&self, ip: IpAddr) -> Result<(), AppError> {
        Self::check(&self.api, ip)
    }

    pub fn login_locked(&self, ip: IpAddr) -> bool {
        self.failed_logins.is_locked(
            ip,
            self.settings.max_failed_logins,
            self.settings.failed_login_window,
        )
    }

    pub fn record_failed_login(&self, ip: IpAddr) {
        self.failed_logins
            .record(ip, self.settings.failed_login_window);
    }

    /// Number of IPs currently held by the quota limiters
    pub fn tracked_ips(&self) -> usize {
        self.auth.len() + self.api.len()
    }

    /// Drop per-IP state that no longer affects any decision
    pub fn sweep(&self) -> usize {
        let before = self.tracked_ips();
        for limiter in [&self.auth, &self.api] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
        let dropped = before.saturating_sub(self.tracked_ips());
        dropped + self.failed_logins.sweep(self.settings.failed_login_window)
    }
}

/// Quota for the `/auth` routes
pub async fn auth_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    state.limits.check_auth(client_ip(&state, &request))?;
    Ok(next.run(request).await)
}

/// Quota for everything else under the API prefix
pub async fn api_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    state.limits.check_api(client_ip(&state, &request))?;
    Ok(next.run(request).await)
}
