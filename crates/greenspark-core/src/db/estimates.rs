//! Appliance estimate operations

use rusqlite::params;
use uuid::Uuid;

use super::{now_ts, uuid_col, Database};
use crate::error::Result;
use crate::models::{ApplianceEstimate, EstimateView};

impl Database {
    /// Replace every estimate of a bill in a single transaction
    pub fn replace_estimates(&self, bill_id: Uuid, estimates: &[ApplianceEstimate]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM appliance_estimates WHERE bill_id = ?",
            params![bill_id.to_string()],
        )?;

        let now = now_ts();
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO appliance_estimates (id, bill_id, user_appliance_id, estimated_kwh,
                                                 estimated_cost, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for estimate in estimates {
                stmt.execute(params![
                    estimate.id.to_string(),
                    bill_id.to_string(),
                    estimate.user_appliance_id.to_string(),
                    estimate.estimated_kwh,
                    estimate.estimated_cost,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Estimates for a bill with appliance names, largest first
    pub fn list_estimates(&self, bill_id: Uuid) -> Result<Vec<EstimateView>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT e.id, e.bill_id, e.user_appliance_id, e.estimated_kwh, e.estimated_cost,
                   ua.custom_name
            FROM appliance_estimates e
            JOIN user_appliances ua ON ua.id = e.user_appliance_id
            WHERE e.bill_id = ?
            ORDER BY e.estimated_kwh DESC, ua.custom_name
            "#,
        )?;

        let estimates = stmt
            .query_map(params![bill_id.to_string()], |row| {
                Ok(EstimateView {
                    estimate: ApplianceEstimate {
                        id: uuid_col(row, 0)?,
                        bill_id: uuid_col(row, 1)?,
                        user_appliance_id: uuid_col(row, 2)?,
                        estimated_kwh: row.get(3)?,
                        estimated_cost: row.get(4)?,
                    },
                    appliance_name: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(estimates)
    }

    /// Bills holding an estimate for any of these appliances
    pub fn bills_estimating(&self, appliance_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT bill_id FROM appliance_estimates WHERE user_appliance_id = ?",
        )?;
        let mut bills = Vec::new();
        for id in appliance_ids {
            for bill_id in stmt.query_map(params![id.to_string()], |row| uuid_col(row, 0))? {
                let bill_id = bill_id?;
                if !bills.contains(&bill_id) {
                    bills.push(bill_id);
                }
            }
        }
        Ok(bills)
    }

    pub fn delete_estimates(&self, bill_id: Uuid) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM appliance_estimates WHERE bill_id = ?",
            params![bill_id.to_string()],
        )?;
        Ok(deleted)
    }
}
