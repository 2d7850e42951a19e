//! Insight report operations

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{json_col, now_ts, parse_datetime, uuid_col, Database};
use crate::error::{Error, Result};
use crate::models::{Insight, InsightStatus};

impl Database {
    fn row_to_insight(row: &rusqlite::Row) -> rusqlite::Result<Insight> {
        let status_str: String = row.get(3)?;
        let generated_at: Option<String> = row.get(5)?;
        Ok(Insight {
            id: uuid_col(row, 0)?,
            bill_id: uuid_col(row, 1)?,
            user_id: uuid_col(row, 2)?,
            status: status_str.parse().unwrap_or(InsightStatus::Failed),
            structured_data: json_col(row, 4)?,
            generated_at: generated_at.as_deref().map(parse_datetime),
        })
    }

    pub fn get_insight(&self, bill_id: Uuid) -> Result<Option<Insight>> {
        let conn = self.conn()?;
        let insight = conn
            .query_row(
                "SELECT id, bill_id, user_id, status, structured_data, generated_at FROM insights WHERE bill_id = ?",
                params![bill_id.to_string()],
                Self::row_to_insight,
            )
            .optional()?;
        Ok(insight)
    }

    /// Create a pending insight unless one exists
    ///
    /// Returns the insight and whether it was newly created.
    pub fn create_pending_insight(&self, bill_id: Uuid, user_id: Uuid) -> Result<(Insight, bool)> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT OR IGNORE INTO insights (id, bill_id, user_id, status, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            "#,
            params![
                Uuid::new_v4().to_string(),
                bill_id.to_string(),
                user_id.to_string(),
                now_ts()
            ],
        )?;
        drop(conn);

        let insight = self
            .get_insight(bill_id)?
            .ok_or_else(|| Error::NotFound(format!("Insight for bill {}", bill_id)))?;
        Ok((insight, inserted > 0))
    }

    pub fn set_insight_status(&self, bill_id: Uuid, status: InsightStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE insights SET status = ? WHERE bill_id = ?",
            params![status.as_str(), bill_id.to_string()],
        )?;
        Ok(())
    }

    /// Store a finished report, creating the row if generation was triggered directly
    pub fn complete_insight(
        &self,
        bill_id: Uuid,
        user_id: Uuid,
        data: &serde_json::Value,
    ) -> Result<Insight> {
        let conn = self.conn()?;
        let now = now_ts();
        conn.execute(
            r#"
            INSERT INTO insights (id, bill_id, user_id, status, structured_data, generated_at, created_at)
            VALUES (?, ?, ?, 'completed', ?, ?, ?)
            ON CONFLICT(bill_id) DO UPDATE SET
                status = 'completed',
                structured_data = excluded.structured_data,
                generated_at = excluded.generated_at
            "#,
            params![
                Uuid::new_v4().to_string(),
                bill_id.to_string(),
                user_id.to_string(),
                serde_json::to_string(data)?,
                now,
                now,
            ],
        )?;
        drop(conn);

        self.get_insight(bill_id)?
            .ok_or_else(|| Error::NotFound(format!("Insight for bill {}", bill_id)))
    }

    pub fn fail_insight(&self, bill_id: Uuid) -> Result<()> {
        self.set_insight_status(bill_id, InsightStatus::Failed)
    }
}
