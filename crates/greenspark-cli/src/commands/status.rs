//! Status command implementation

use std::path::Path;

use anyhow::Result;
use greenspark_core::{
    config::JWT_SECRET_ENV,
    db::{Database, DB_KEY_ENV},
    models::{ParseStatus, UserFilter},
    ApplianceFilter, BillFilter,
};

use super::open_db;

/// Row counts shown by `greenspark status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCounts {
    pub users: i64,
    pub bills: i64,
    pub bills_processing: i64,
    pub bills_failed: i64,
    pub appliances: i64,
    pub catalog_entries: usize,
}

pub fn database_counts(db: &Database) -> Result<DatabaseCounts> {
    let bills_with = |status: ParseStatus| {
        db.count_bills(&BillFilter {
            parse_status: Some(status),
            ..BillFilter::default()
        })
    };
    Ok(DatabaseCounts {
        users: db.count_users(&UserFilter::default())?,
        bills: db.count_bills(&BillFilter::default())?,
        bills_processing: bills_with(ParseStatus::Processing)?,
        bills_failed: bills_with(ParseStatus::Failed)?,
        appliances: db.count_appliances(&ApplianceFilter::default())?,
        catalog_entries: db.list_catalog(None)?.len(),
    })
}

fn env_set(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 GreenSpark Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = env_set(DB_KEY_ENV);
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt).and_then(|db| database_counts(&db)) {
            Ok(counts) => {
                println!();
                println!("   Users: {}", counts.users);
                println!(
                    "   Bills: {} ({} processing, {} failed)",
                    counts.bills, counts.bills_processing, counts.bills_failed
                );
                println!("   Appliances: {}", counts.appliances);
                println!("   Catalog entries: {}", counts.catalog_entries);
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    println!("   Configuration");
    let check = |ok: bool| if ok { "✅" } else { "➖" };
    println!("   {} JWT secret ({})", check(env_set(JWT_SECRET_ENV)), JWT_SECRET_ENV);
    println!("   {} Gemini parser (GEMINI_API_KEY)", check(env_set("GEMINI_API_KEY")));
    println!("   {} Redis cache (REDIS_URL)", check(env_set("REDIS_URL")));
    println!("   {} S3 storage (S3_ENDPOINT_URL)", check(env_set("S3_ENDPOINT_URL")));
    println!("   {} Email relay (MAIL_API_URL)", check(env_set("MAIL_API_URL")));
    println!();
    Ok(())
}
