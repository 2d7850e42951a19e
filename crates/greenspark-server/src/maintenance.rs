//! Background maintenance sweep
//!
//! Runs on a fixed interval while the server is up:
//!
//! - purges expired entries from the revoked-token denylist
//! - marks bills stuck in `processing` longer than
//!   `GREENSPARK_STUCK_PARSE_MINUTES` as failed and drops their cached views
//! - drops expired in-memory cache entries and idle per-IP rate-limit state
//!
//! `GREENSPARK_MAINTENANCE_MINUTES` sets the interval (default 10, 0 disables).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use greenspark_core::{CacheSchema, CacheService, Database};

use crate::ratelimit::RateLimits;
use crate::AppState;

/// Configuration for the maintenance sweep
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub interval: Duration,
    pub stuck_after: Duration,
}

impl MaintenanceConfig {
    /// Parse the interval from the environment
    ///
    /// Returns None when the sweep is disabled.
    pub fn from_env(stuck_after: Duration) -> Option<Self> {
        let minutes: u64 = std::env::var("GREENSPARK_MAINTENANCE_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        if minutes == 0 {
            warn!("GREENSPARK_MAINTENANCE_MINUTES is 0, maintenance sweep disabled");
            return None;
        }

        Some(Self {
            interval: Duration::from_secs(minutes * 60),
            stuck_after,
        })
    }
}

/// Outcome of one sweep
#[derive(Debug, Default, PartialEq)]
pub struct SweepResult {
    pub purged_tokens: usize,
    pub failed_bills: usize,
    pub expired_cache_entries: u64,
    pub idle_client_ips: usize,
}

/// Run a single sweep
pub async fn run_sweep(
    db: &Database,
    cache: &CacheService,
    limits: &RateLimits,
    stuck_after: Duration,
) -> greenspark_core::Result<SweepResult> {
    let now = Utc::now();
    let purged_tokens = db.purge_expired_tokens(now.timestamp())?;

    let stuck_after = chrono::Duration::from_std(stuck_after)
        .unwrap_or_else(|_| chrono::Duration::minutes(30));
    let failed = db.fail_stuck_bills(now - stuck_after)?;
    for bill_id in &failed {
        cache
            .invalidate(CacheSchema::BillDetail, &bill_id.to_string())
            .await;
    }
    if !failed.is_empty() {
        warn!(count = failed.len(), "Marked stuck bills as failed");
    }

    Ok(SweepResult {
        purged_tokens,
        failed_bills: failed.len(),
        expired_cache_entries: cache.purge_expired().await,
        idle_client_ips: limits.sweep(),
    })
}

/// Start the maintenance sweep as a background task
pub fn start_maintenance(state: Arc<AppState>, config: MaintenanceConfig) {
    info!(
        "Starting maintenance sweep: every {} minutes, stuck bills after {} minutes",
        config.interval.as_secs() / 60,
        config.stuck_after.as_secs() / 60
    );

    tokio::spawn(async move {
        let mut ticker = interval(config.interval);

        loop {
            ticker.tick().await;

            match run_sweep(&state.db, &state.cache, &state.limits, config.stuck_after).await {
                Ok(result) => {
                    if result != SweepResult::default() {
                        info!(
                            purged_tokens = result.purged_tokens,
                            failed_bills = result.failed_bills,
                            expired_cache_entries = result.expired_cache_entries,
                            idle_client_ips = result.idle_client_ips,
                            "Maintenance sweep completed"
                        );
                    }
                }
                Err(e) => {
                    error!("Maintenance sweep failed: {}", e);
                }
            }
        }
    });
}
