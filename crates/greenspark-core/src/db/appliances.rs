//! User appliance inventory operations

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{is_unique_violation, now_ts, parse_datetime, uuid_col, ApplianceFilter, Database};
use crate::error::{Error, Result};
use crate::models::{ApplianceUpdate, NewAppliance, UserAppliance};

const APPLIANCE_SELECT: &str = r#"
    SELECT ua.id, ua.user_id, ua.appliance_catalog_id, ua.custom_name, ua.count,
           ua.custom_wattage, ua.hours_per_day, ua.days_per_week, ua.brand, ua.model,
           ua.star_rating, ua.purchase_year, ua.notes, c.typical_wattage,
           ua.created_at, ua.updated_at
    FROM user_appliances ua
    LEFT JOIN appliance_catalog c ON c.category_id = ua.appliance_catalog_id
"#;

fn name_conflict(err: rusqlite::Error, name: &str) -> Error {
    if is_unique_violation(&err) {
        Error::Conflict(format!("You already have an appliance named '{}'", name))
    } else {
        Error::Database(err)
    }
}

impl Database {
    /// Helper to convert a row to UserAppliance
    /// Column order matches `APPLIANCE_SELECT`
    fn row_to_appliance(row: &rusqlite::Row) -> rusqlite::Result<UserAppliance> {
        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;
        Ok(UserAppliance {
            id: uuid_col(row, 0)?,
            user_id: uuid_col(row, 1)?,
            appliance_catalog_id: row.get(2)?,
            custom_name: row.get(3)?,
            count: row.get(4)?,
            custom_wattage: row.get(5)?,
            hours_per_day: row.get(6)?,
            days_per_week: row.get(7)?,
            brand: row.get(8)?,
            model: row.get(9)?,
            star_rating: row.get(10)?,
            purchase_year: row.get(11)?,
            notes: row.get(12)?,
            catalog_wattage: row.get(13)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }

    fn insert_appliance(conn: &Connection, user_id: Uuid, item: &NewAppliance) -> Result<Uuid> {
        if let Some(ref catalog_id) = item.appliance_catalog_id {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM appliance_catalog WHERE category_id = ?",
                params![catalog_id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(Error::NotFound(format!(
                    "Appliance catalog entry '{}'",
                    catalog_id
                )));
            }
        }

        let id = Uuid::new_v4();
        let now = now_ts();
        conn.execute(
            r#"
            INSERT INTO user_appliances (id, user_id, appliance_catalog_id, custom_name, count,
                                         custom_wattage, hours_per_day, days_per_week, brand, model,
                                         star_rating, purchase_year, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id.to_string(),
                user_id.to_string(),
                item.appliance_catalog_id,
                item.custom_name,
                item.count,
                item.custom_wattage,
                item.hours_per_day,
                item.days_per_week,
                item.brand,
                item.model,
                item.star_rating,
                item.purchase_year,
                item.notes,
                now,
                now,
            ],
        )
        .map_err(|e| name_conflict(e, &item.custom_name))?;

        Ok(id)
    }

    /// Create one appliance from a validated payload
    pub fn create_appliance(&self, user_id: Uuid, item: &NewAppliance) -> Result<UserAppliance> {
        let conn = self.conn()?;
        let id = Self::insert_appliance(&conn, user_id, item)?;
        drop(conn);
        self.get_appliance(id)?
            .ok_or_else(|| Error::NotFound(format!("Appliance {}", id)))
    }

    /// Create several appliances atomically: all are stored or none
    pub fn create_appliances(
        &self,
        user_id: Uuid,
        items: &[NewAppliance],
    ) -> Result<Vec<UserAppliance>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(Self::insert_appliance(&tx, user_id, item)?);
        }
        tx.commit()?;
        drop(conn);

        let mut created = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(appliance) = self.get_appliance(id)? {
                created.push(appliance);
            }
        }
        Ok(created)
    }

    pub fn get_appliance(&self, id: Uuid) -> Result<Option<UserAppliance>> {
        let conn = self.conn()?;
        let sql = format!("{} WHERE ua.id = ?", APPLIANCE_SELECT);
        let appliance = conn
            .query_row(&sql, params![id.to_string()], Self::row_to_appliance)
            .optional()?;
        Ok(appliance)
    }

    /// All appliances of one user, by name
    pub fn list_user_appliances(&self, user_id: Uuid) -> Result<Vec<UserAppliance>> {
        let conn = self.conn()?;
        let sql = format!(
            "{} WHERE ua.user_id = ? ORDER BY ua.custom_name",
            APPLIANCE_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        let appliances = stmt
            .query_map(params![user_id.to_string()], Self::row_to_appliance)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(appliances)
    }

    /// Every appliance in the system (admin statistics)
    pub fn list_all_appliances(&self) -> Result<Vec<UserAppliance>> {
        let conn = self.conn()?;
        let sql = format!("{} ORDER BY ua.user_id, ua.custom_name", APPLIANCE_SELECT);
        let mut stmt = conn.prepare(&sql)?;
        let appliances = stmt
            .query_map([], Self::row_to_appliance)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(appliances)
    }

    /// Paginated listing (skip/limit from the filter)
    pub fn list_appliances(&self, filter: &ApplianceFilter) -> Result<Vec<UserAppliance>> {
        let conn = self.conn()?;
        let built = filter.build();
        let sql = format!(
            "{} {} {} LIMIT ? OFFSET ?",
            APPLIANCE_SELECT, built.where_clause, built.order_clause
        );

        let limit = filter.limit;
        let skip = filter.skip;
        let mut params = built.params_refs();
        params.push(&limit);
        params.push(&skip);

        let mut stmt = conn.prepare(&sql)?;
        let appliances = stmt
            .query_map(params.as_slice(), Self::row_to_appliance)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(appliances)
    }

    pub fn count_appliances(&self, filter: &ApplianceFilter) -> Result<i64> {
        let conn = self.conn()?;
        let built = filter.build();
        let sql = format!(
            "SELECT COUNT(*) FROM user_appliances ua {}",
            built.where_clause
        );
        let count: i64 = conn.query_row(&sql, built.params_refs().as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn apply_appliance_update(conn: &Connection, id: Uuid, update: &ApplianceUpdate) -> Result<usize> {
        let name_for_error = update.custom_name.clone().unwrap_or_default();
        let changed = conn
            .execute(
                r#"
                UPDATE user_appliances SET
                    custom_name = COALESCE(?, custom_name),
                    count = COALESCE(?, count),
                    custom_wattage = COALESCE(?, custom_wattage),
                    hours_per_day = COALESCE(?, hours_per_day),
                    days_per_week = COALESCE(?, days_per_week),
                    brand = COALESCE(?, brand),
                    model = COALESCE(?, model),
                    star_rating = COALESCE(?, star_rating),
                    purchase_year = COALESCE(?, purchase_year),
                    notes = COALESCE(?, notes),
                    updated_at = ?
                WHERE id = ?
                "#,
                params![
                    update.custom_name,
                    update.count,
                    update.custom_wattage,
                    update.hours_per_day,
                    update.days_per_week,
                    update.brand,
                    update.model,
                    update.star_rating,
                    update.purchase_year,
                    update.notes,
                    now_ts(),
                    id.to_string(),
                ],
            )
            .map_err(|e| name_conflict(e, &name_for_error))?;
        Ok(changed)
    }

    /// Apply a validated partial update
    pub fn update_appliance(&self, id: Uuid, update: &ApplianceUpdate) -> Result<UserAppliance> {
        let conn = self.conn()?;
        let changed = Self::apply_appliance_update(&conn, id, update)?;
        drop(conn);
        if changed == 0 {
            return Err(Error::NotFound(format!("Appliance {}", id)));
        }
        self.get_appliance(id)?
            .ok_or_else(|| Error::NotFound(format!("Appliance {}", id)))
    }

    pub fn delete_appliance(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM user_appliances WHERE id = ?",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn owned_by(conn: &Connection, id: Uuid, owner: Option<Uuid>) -> Result<bool> {
        let sql = "SELECT user_id FROM user_appliances WHERE id = ?";
        let user_id: Option<String> = conn
            .query_row(sql, params![id.to_string()], |row| row.get(0))
            .optional()?;
        Ok(match (user_id, owner) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(uid), Some(owner)) => uid == owner.to_string(),
        })
    }

    /// Update several appliances in one transaction
    ///
    /// With `owner` set, appliances belonging to anyone else are skipped as if
    /// missing. Returns the ids that were updated.
    pub fn bulk_update_appliances(
        &self,
        owner: Option<Uuid>,
        updates: &[(Uuid, ApplianceUpdate)],
    ) -> Result<Vec<Uuid>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut updated = Vec::new();
        for (id, update) in updates {
            if !Self::owned_by(&tx, *id, owner)? {
                continue;
            }
            if Self::apply_appliance_update(&tx, *id, update)? > 0 {
                updated.push(*id);
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// Delete several appliances in one transaction, scoped like bulk update
    pub fn bulk_delete_appliances(&self, owner: Option<Uuid>, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut deleted = Vec::new();
        for id in ids {
            if !Self::owned_by(&tx, *id, owner)? {
                continue;
            }
            if tx.execute(
                "DELETE FROM user_appliances WHERE id = ?",
                params![id.to_string()],
            )? > 0
            {
                deleted.push(*id);
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Number of distinct users owning at least one appliance
    pub fn count_users_with_appliances(&self) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM user_appliances",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
