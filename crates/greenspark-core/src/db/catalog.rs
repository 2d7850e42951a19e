//! Appliance catalog operations

use rusqlite::{params, OptionalExtension};

use super::{is_unique_violation, Database};
use crate::error::{Error, Result};
use crate::models::{ApplianceCatalog, NewCatalogEntry};

/// Built-in catalog seeded by `greenspark catalog seed` and `init`
pub fn default_catalog() -> Vec<ApplianceCatalog> {
    [
        ("refrigerator", "Refrigerator", "🧊", 150),
        ("air_conditioner", "Air Conditioner", "❄️", 1500),
        ("ceiling_fan", "Ceiling Fan", "🌀", 75),
        ("led_bulb", "LED Bulb", "💡", 9),
        ("tube_light", "Tube Light", "🔦", 40),
        ("television", "Television", "📺", 100),
        ("washing_machine", "Washing Machine", "🧺", 500),
        ("water_heater", "Water Heater", "🚿", 2000),
        ("microwave", "Microwave Oven", "🍲", 1200),
        ("water_pump", "Water Pump", "💧", 750),
        ("laptop", "Laptop", "💻", 65),
        ("desktop_computer", "Desktop Computer", "🖥️", 200),
        ("air_cooler", "Air Cooler", "🌬️", 200),
        ("iron", "Electric Iron", "👔", 1000),
        ("induction_cooktop", "Induction Cooktop", "🍳", 1800),
        ("wifi_router", "Wi-Fi Router", "📶", 10),
    ]
    .into_iter()
    .map(|(id, label, icon, watts)| ApplianceCatalog {
        category_id: id.to_string(),
        label: label.to_string(),
        icon_emoji: icon.to_string(),
        typical_wattage: watts,
    })
    .collect()
}

impl Database {
    fn row_to_catalog(row: &rusqlite::Row) -> rusqlite::Result<ApplianceCatalog> {
        Ok(ApplianceCatalog {
            category_id: row.get(0)?,
            label: row.get(1)?,
            icon_emoji: row.get(2)?,
            typical_wattage: row.get(3)?,
        })
    }

    /// List catalog entries, optionally filtered by label or category id
    pub fn list_catalog(&self, search: Option<&str>) -> Result<Vec<ApplianceCatalog>> {
        let conn = self.conn()?;
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let entries = match search {
            Some(q) => {
                let pattern = format!("%{}%", q);
                let mut stmt = conn.prepare(
                    r#"
                    SELECT category_id, label, icon_emoji, typical_wattage
                    FROM appliance_catalog
                    WHERE label LIKE ?1 COLLATE NOCASE OR category_id LIKE ?1 COLLATE NOCASE
                    ORDER BY label
                    "#,
                )?;
                let rows = stmt
                    .query_map(params![pattern], Self::row_to_catalog)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT category_id, label, icon_emoji, typical_wattage FROM appliance_catalog ORDER BY label",
                )?;
                let rows = stmt
                    .query_map([], Self::row_to_catalog)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };

        Ok(entries)
    }

    pub fn get_catalog_entry(&self, category_id: &str) -> Result<Option<ApplianceCatalog>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT category_id, label, icon_emoji, typical_wattage FROM appliance_catalog WHERE category_id = ?",
                params![category_id],
                Self::row_to_catalog,
            )
            .optional()?;
        Ok(entry)
    }

    /// Create a catalog entry; `Error::Conflict` on a duplicate id or label
    pub fn create_catalog_entry(&self, entry: &NewCatalogEntry) -> Result<ApplianceCatalog> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO appliance_catalog (category_id, label, icon_emoji, typical_wattage) VALUES (?, ?, ?, ?)",
            params![
                entry.category_id,
                entry.label,
                entry.icon_emoji,
                entry.typical_wattage
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict(format!(
                    "Catalog entry '{}' or label '{}' already exists",
                    entry.category_id, entry.label
                ))
            } else {
                Error::Database(e)
            }
        })?;

        Ok(ApplianceCatalog {
            category_id: entry.category_id.clone(),
            label: entry.label.clone(),
            icon_emoji: entry.icon_emoji.clone(),
            typical_wattage: entry.typical_wattage,
        })
    }

    /// Delete a catalog entry; linked appliances keep their custom wattage
    pub fn delete_catalog_entry(&self, category_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM appliance_catalog WHERE category_id = ?",
            params![category_id],
        )?;
        Ok(deleted > 0)
    }

    /// Insert the built-in catalog, skipping entries that already exist
    ///
    /// Returns the number of entries inserted.
    pub fn seed_default_catalog(&self) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for entry in default_catalog() {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO appliance_catalog (category_id, label, icon_emoji, typical_wattage) VALUES (?, ?, ?, ?)",
                params![
                    entry.category_id,
                    entry.label,
                    entry.icon_emoji,
                    entry.typical_wattage
                ],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }
}
