//! Server command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use greenspark_core::{config::JWT_SECRET_ENV, AIBackend, JobQueue, Settings};
use greenspark_server::AppState;

use super::{open_db, task_context};

pub async fn cmd_serve(db_path: &Path, host: &str, port: u16, no_encrypt: bool) -> Result<()> {
    let settings = Settings::from_env();
    if settings.jwt_secret.is_empty() {
        bail!(
            "{} must be set to sign authentication tokens",
            JWT_SECRET_ENV
        );
    }

    println!("🚀 Starting GreenSpark API...");
    println!("   Database: {}", db_path.display());
    println!(
        "   Listening: http://{}:{}{}",
        host, port, settings.api_prefix
    );

    // Real client IPs behind reverse proxies
    let trusted_proxies_str = std::env::var("GREENSPARK_TRUSTED_PROXIES").unwrap_or_default();
    let trusted_proxies = greenspark_server::parse_trusted_networks(&trusted_proxies_str);
    if !trusted_proxies.is_empty() {
        println!(
            "   🔀 Trusted proxies: {} (GREENSPARK_TRUSTED_PROXIES)",
            trusted_proxies
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }

    let db = open_db(db_path, no_encrypt)?;
    db.seed_default_catalog()
        .context("Failed to seed appliance catalog")?;

    let ctx = task_context(db, &settings).await?;
    println!("   Cache: {}", ctx.cache.backend_name());
    println!("   Storage: {} ({})", ctx.storage.name(), ctx.storage.bucket());
    match &ctx.ai {
        Some(ai) => println!("   🤖 AI parser: {}", ai.model()),
        None => println!("   💡 AI parser disabled: set GEMINI_API_KEY to parse uploads"),
    }
    println!("   Mailer: {}", ctx.mailer.name());
    println!("   Workers: {}", settings.workers);
    println!();
    println!("   Press Ctrl+C to stop");

    let queue = JobQueue::start(ctx.clone(), settings.workers);
    let state = AppState::new(settings, &ctx, queue, trusted_proxies)
        .context("Failed to build application state")?;

    greenspark_server::serve(Arc::new(state), host, port).await
}
