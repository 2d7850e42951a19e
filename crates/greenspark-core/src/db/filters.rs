//! Filter builders for constructing dynamic SQL queries
//!
//! Bill and appliance listings share the same shape: optional conditions,
//! a whitelisted sort column and skip/limit pagination. The builders keep
//! the list and count queries in sync.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::format_ts;
use crate::models::{ParseStatus, SourceType};

/// Filters for bill listings
#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub user_id: Option<Uuid>,
    pub source_type: Option<SourceType>,
    pub parse_status: Option<ParseStatus>,
    /// Substring match on provider
    pub provider: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// created_at, billing_period_start, billing_period_end, kwh_total, cost_total
    pub order_by: Option<String>,
    pub order_desc: bool,
    pub skip: i64,
    pub limit: i64,
}

/// Filters for appliance listings
#[derive(Debug, Clone, Default)]
pub struct ApplianceFilter {
    pub user_id: Option<Uuid>,
    /// Substring match on name, brand and model
    pub search: Option<String>,
    pub appliance_catalog_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// custom_name, brand, created_at, updated_at
    pub sort_by: Option<String>,
    /// asc or desc
    pub sort_order: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl FilterResult {
    fn new(
        conditions: Vec<String>,
        params: Vec<Box<dyn rusqlite::ToSql>>,
        order_clause: String,
    ) -> Self {
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        Self {
            where_clause,
            order_clause,
            params,
        }
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

fn push_created_range(
    conditions: &mut Vec<String>,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
    column: &str,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
) {
    if let Some(after) = after {
        conditions.push(format!("{} >= ?", column));
        params.push(Box::new(format_ts(&after)));
    }
    if let Some(before) = before {
        conditions.push(format!("{} <= ?", column));
        params.push(Box::new(format_ts(&before)));
    }
}

impl BillFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            limit: 100,
            order_desc: true,
            ..Self::default()
        }
    }

    /// Build the filter components
    pub fn build(&self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(uid) = self.user_id {
            conditions.push("b.user_id = ?".to_string());
            params.push(Box::new(uid.to_string()));
        }

        if let Some(source) = self.source_type {
            conditions.push("b.source_type = ?".to_string());
            params.push(Box::new(source.as_str()));
        }

        if let Some(status) = self.parse_status {
            conditions.push("b.parse_status = ?".to_string());
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref provider) = self.provider {
            if !provider.trim().is_empty() {
                conditions.push("b.provider LIKE ? COLLATE NOCASE".to_string());
                params.push(Box::new(format!("%{}%", provider.trim())));
            }
        }

        push_created_range(
            &mut conditions,
            &mut params,
            "b.created_at",
            self.created_after,
            self.created_before,
        );

        let order_column = match self.order_by.as_deref() {
            Some("billing_period_start") => "b.billing_period_start",
            Some("billing_period_end") => "b.billing_period_end",
            Some("kwh_total") => "b.kwh_total",
            Some("cost_total") => "b.cost_total",
            _ => "b.created_at",
        };
        let order_dir = if self.order_desc { "DESC" } else { "ASC" };
        let order_clause = format!("ORDER BY {} {}, b.id {}", order_column, order_dir, order_dir);

        FilterResult::new(conditions, params, order_clause)
    }
}

impl ApplianceFilter {
    /// Build the filter components
    pub fn build(&self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(uid) = self.user_id {
            conditions.push("ua.user_id = ?".to_string());
            params.push(Box::new(uid.to_string()));
        }

        if let Some(ref q) = self.search {
            if !q.trim().is_empty() {
                conditions.push(
                    "(ua.custom_name LIKE ? OR ua.brand LIKE ? COLLATE NOCASE OR ua.model LIKE ? COLLATE NOCASE)"
                        .to_string(),
                );
                let pattern = format!("%{}%", q.trim());
                params.push(Box::new(pattern.clone()));
                params.push(Box::new(pattern.clone()));
                params.push(Box::new(pattern));
            }
        }

        if let Some(ref catalog_id) = self.appliance_catalog_id {
            conditions.push("ua.appliance_catalog_id = ?".to_string());
            params.push(Box::new(catalog_id.clone()));
        }

        push_created_range(
            &mut conditions,
            &mut params,
            "ua.created_at",
            self.created_after,
            self.created_before,
        );

        let order_column = match self.sort_by.as_deref() {
            Some("custom_name") => "ua.custom_name",
            Some("brand") => "ua.brand",
            Some("updated_at") => "ua.updated_at",
            _ => "ua.created_at",
        };
        let order_dir = match self.sort_order.as_deref() {
            Some("asc") => "ASC",
            _ => "DESC",
        };
        let order_clause = format!("ORDER BY {} {}, ua.id {}", order_column, order_dir, order_dir);

        FilterResult::new(conditions, params, order_clause)
    }
}
