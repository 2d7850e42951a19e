//! Bill operations and parse lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::{date_col, format_ts, json_col, now_ts, parse_datetime, uuid_col, BillFilter, Database};
use crate::error::{Error, Result};
use crate::models::{Bill, NewManualBill, ParseStatus, SourceType};
use crate::normalized::NormalizedBill;

const BILL_COLUMNS: &str = "b.id, b.user_id, b.billing_period_start, b.billing_period_end, \
     b.kwh_total, b.cost_total, b.provider, b.normalized_json, b.parse_status, b.source_type, \
     b.file_uri, b.parser_version, b.checksum, b.created_at";

/// Placeholder values stored until the parser fills in the real bill
pub const PLACEHOLDER_PROVIDER: &str = "Pending Parse";

impl Database {
    /// Helper to convert a row to Bill
    /// Column order matches `BILL_COLUMNS`
    fn row_to_bill(row: &rusqlite::Row) -> rusqlite::Result<Bill> {
        let status_str: String = row.get(8)?;
        let source_str: String = row.get(9)?;
        let created_at: String = row.get(13)?;
        Ok(Bill {
            id: uuid_col(row, 0)?,
            user_id: uuid_col(row, 1)?,
            billing_period_start: date_col(row, 2)?,
            billing_period_end: date_col(row, 3)?,
            kwh_total: row.get(4)?,
            cost_total: row.get(5)?,
            provider: row.get(6)?,
            normalized_json: json_col(row, 7)?,
            parse_status: status_str.parse().unwrap_or(ParseStatus::Failed),
            source_type: source_str.parse().unwrap_or(SourceType::Pdf),
            file_uri: row.get(10)?,
            parser_version: row.get(11)?,
            checksum: row.get(12)?,
            created_at: parse_datetime(&created_at),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_bill(
        &self,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        kwh_total: f64,
        cost_total: f64,
        provider: &str,
        status: ParseStatus,
        source: SourceType,
        file_uri: Option<&str>,
    ) -> Result<Bill> {
        let id = Uuid::new_v4();
        let now = now_ts();
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO bills (id, user_id, billing_period_start, billing_period_end, kwh_total,
                               cost_total, provider, parse_status, source_type, file_uri,
                               created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id.to_string(),
                user_id.to_string(),
                start.to_string(),
                end.to_string(),
                kwh_total,
                cost_total,
                provider,
                status.as_str(),
                source.as_str(),
                file_uri,
                now,
                now,
            ],
        )?;

        self.get_bill(id)?
            .ok_or_else(|| Error::NotFound(format!("Bill {}", id)))
    }

    /// Create the processing row for an uploaded file awaiting parse
    pub fn create_placeholder_bill(&self, user_id: Uuid, file_uri: &str) -> Result<Bill> {
        let start = NaiveDate::from_ymd_opt(1970, 1, 1)
            .ok_or_else(|| Error::InvalidData("placeholder date".to_string()))?;
        let end = NaiveDate::from_ymd_opt(1970, 2, 2)
            .ok_or_else(|| Error::InvalidData("placeholder date".to_string()))?;
        self.insert_bill(
            user_id,
            start,
            end,
            10.0,
            10.0,
            PLACEHOLDER_PROVIDER,
            ParseStatus::Processing,
            SourceType::Pdf,
            Some(file_uri),
        )
    }

    /// Store a validated manual bill; it is immediately `success`
    pub fn create_manual_bill(&self, user_id: Uuid, bill: &NewManualBill) -> Result<Bill> {
        self.insert_bill(
            user_id,
            bill.billing_period_start,
            bill.billing_period_end,
            bill.kwh_total,
            bill.cost_total,
            &bill.provider,
            ParseStatus::Success,
            SourceType::Manual,
            None,
        )
    }

    pub fn get_bill(&self, id: Uuid) -> Result<Option<Bill>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM bills b WHERE b.id = ?", BILL_COLUMNS);
        let bill = conn
            .query_row(&sql, params![id.to_string()], Self::row_to_bill)
            .optional()?;
        Ok(bill)
    }

    /// List bills matching a filter (skip/limit from the filter)
    pub fn list_bills(&self, filter: &BillFilter) -> Result<Vec<Bill>> {
        let conn = self.conn()?;
        let built = filter.build();
        let sql = format!(
            "SELECT {} FROM bills b {} {} LIMIT ? OFFSET ?",
            BILL_COLUMNS, built.where_clause, built.order_clause
        );

        let limit = filter.limit;
        let skip = filter.skip;
        let mut params = built.params_refs();
        params.push(&limit);
        params.push(&skip);

        let mut stmt = conn.prepare(&sql)?;
        let bills = stmt
            .query_map(params.as_slice(), Self::row_to_bill)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bills)
    }

    pub fn count_bills(&self, filter: &BillFilter) -> Result<i64> {
        let conn = self.conn()?;
        let built = filter.build();
        let sql = format!("SELECT COUNT(*) FROM bills b {}", built.where_clause);
        let count: i64 = conn.query_row(&sql, built.params_refs().as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Record a successful parse: real period, totals and the normalized document
    pub fn complete_bill_parse(
        &self,
        id: Uuid,
        parsed: &NormalizedBill,
        checksum: &str,
    ) -> Result<Bill> {
        let conn = self.conn()?;
        let json = serde_json::to_string(parsed)?;
        let changed = conn.execute(
            r#"
            UPDATE bills SET
                billing_period_start = ?,
                billing_period_end = ?,
                kwh_total = ?,
                cost_total = ?,
                provider = ?,
                normalized_json = ?,
                parser_version = ?,
                checksum = ?,
                parse_status = 'success',
                updated_at = ?
            WHERE id = ?
            "#,
            params![
                parsed.period.start.to_string(),
                parsed.period.end.to_string(),
                parsed.consumption.total_kwh,
                parsed.totals.cost,
                parsed.discom,
                json,
                parsed.version,
                checksum,
                now_ts(),
                id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Bill {}", id)));
        }

        self.get_bill(id)?
            .ok_or_else(|| Error::NotFound(format!("Bill {}", id)))
    }

    pub fn set_bill_status(&self, id: Uuid, status: ParseStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE bills SET parse_status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), now_ts(), id.to_string()],
        )?;
        Ok(())
    }

    /// Delete a bill; estimates and insight cascade
    pub fn delete_bill(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM bills WHERE id = ?", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    /// Most recent successful bill of a user whose period starts before `before`
    pub fn previous_successful_bill(
        &self,
        user_id: Uuid,
        before: NaiveDate,
        exclude: Uuid,
    ) -> Result<Option<Bill>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM bills b
            WHERE b.user_id = ? AND b.parse_status = 'success'
              AND b.billing_period_start < ? AND b.id != ?
            ORDER BY b.billing_period_start DESC, b.created_at DESC
            LIMIT 1
            "#,
            BILL_COLUMNS
        );
        let bill = conn
            .query_row(
                &sql,
                params![user_id.to_string(), before.to_string(), exclude.to_string()],
                Self::row_to_bill,
            )
            .optional()?;
        Ok(bill)
    }

    /// Mark bills stuck in `processing` since before `cutoff` as failed
    ///
    /// Returns the ids that were changed so callers can invalidate caches.
    pub fn fail_stuck_bills(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let cutoff = format_ts(&cutoff);

        let ids = {
            let mut stmt = tx.prepare(
                "SELECT id FROM bills WHERE parse_status = 'processing' AND updated_at < ?",
            )?;
            let ids = stmt
                .query_map(params![cutoff], |row| uuid_col(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };

        let now = now_ts();
        for id in &ids {
            tx.execute(
                "UPDATE bills SET parse_status = 'failed', updated_at = ? WHERE id = ?",
                params![now, id.to_string()],
            )?;
        }
        tx.commit()?;

        Ok(ids)
    }
}
