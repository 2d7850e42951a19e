//! Core command implementations and shared utilities
//!
//! - `open_db` - open the database (encrypted unless --no-encrypt)
//! - `task_context` - wire backends from the environment for job handlers
//! - `cmd_init` - initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use greenspark_core::{
    db::Database, AIClient, CacheService, Mailer, RetryPolicy, Settings, Storage, TaskContext,
    TemplateContext,
};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Backends for job handlers, chosen from the environment
pub async fn task_context(db: Database, settings: &Settings) -> Result<TaskContext> {
    Ok(TaskContext {
        db,
        ai: AIClient::from_env(),
        cache: CacheService::from_env(settings.cache.clone()).await,
        storage: Storage::from_env().context("Failed to configure storage")?,
        mailer: Mailer::from_env(),
        templates: TemplateContext {
            project_name: settings.project_name.clone(),
            frontend_url: settings.frontend_url.clone(),
        },
        retry: RetryPolicy::default(),
    })
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    let seeded = db
        .seed_default_catalog()
        .context("Failed to seed appliance catalog")?;
    println!("   Seeded {} catalog entries", seeded);

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Create an admin: greenspark users create-admin --email ... --username ...");
    println!("  2. Start the API: GREENSPARK_JWT_SECRET=... greenspark serve");

    Ok(())
}
