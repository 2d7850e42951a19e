//! Appliance catalog commands

use anyhow::{Context, Result};
use greenspark_core::db::Database;

use super::truncate;

pub fn cmd_catalog_seed(db: &Database) -> Result<()> {
    let inserted = db
        .seed_default_catalog()
        .context("Failed to seed appliance catalog")?;
    if inserted == 0 {
        println!("Catalog already contains every default entry.");
    } else {
        println!("✅ Added {} catalog entries", inserted);
    }
    Ok(())
}

pub fn cmd_catalog_list(db: &Database, search: Option<&str>) -> Result<()> {
    let entries = db.list_catalog(search)?;
    if entries.is_empty() {
        println!("No catalog entries. Run 'greenspark catalog seed'.");
        return Ok(());
    }

    println!();
    println!("   {:<24} {:<28} {:>8}", "ID", "LABEL", "WATTS");
    println!("   ─────────────────────────────────────────────────────────────");
    for entry in &entries {
        println!(
            "   {:<24} {} {:<25} {:>8}",
            truncate(&entry.category_id, 24),
            entry.icon_emoji,
            truncate(&entry.label, 25),
            entry.typical_wattage
        );
    }
    println!();
    println!("   {} entries", entries.len());
    Ok(())
}
