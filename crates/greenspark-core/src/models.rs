//! Domain models for GreenSpark

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default timezone assigned to new accounts
pub const DEFAULT_TIMEZONE: &str = "Asia/Mumbai";

/// Account role. Ordering matters: `Admin` outranks `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub role: UserRole,
    pub timezone: String,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    /// Tokens issued at or before this unix millisecond are rejected
    #[serde(skip_serializing, default)]
    pub tokens_valid_from: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role >= UserRole::Admin
    }
}

/// Signup payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Profile update payload (PATCH /users/me)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub timezone: Option<String>,
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

/// Bill parse lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    Processing,
    Success,
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ParseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown parse status: {}", s)),
        }
    }
}

/// How a bill entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown source type: {}", s)),
        }
    }
}

/// One billing-period electricity statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub user_id: Uuid,
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub kwh_total: f64,
    pub cost_total: f64,
    pub provider: String,
    pub normalized_json: Option<serde_json::Value>,
    pub parse_status: ParseStatus,
    pub source_type: SourceType,
    pub file_uri: Option<String>,
    pub parser_version: Option<String>,
    pub checksum: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bill {
    /// Days covered by the billing period
    pub fn billing_days(&self) -> i64 {
        (self.billing_period_end - self.billing_period_start).num_days()
    }
}

/// Manual bill entry payload
#[derive(Debug, Clone, Deserialize)]
pub struct NewManualBill {
    pub billing_period_start: NaiveDate,
    pub billing_period_end: NaiveDate,
    pub kwh_total: f64,
    pub cost_total: f64,
    pub provider: String,
}

/// Bill with its parsed document and appliance breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDetail {
    #[serde(flatten)]
    pub bill: Bill,
    pub estimates: Vec<EstimateView>,
}

/// Catalog entry describing a kind of appliance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplianceCatalog {
    pub category_id: String,
    pub label: String,
    pub icon_emoji: String,
    pub typical_wattage: i64,
}

/// Admin payload for a new catalog entry
#[derive(Debug, Clone, Deserialize)]
pub struct NewCatalogEntry {
    pub category_id: String,
    pub label: String,
    pub icon_emoji: String,
    pub typical_wattage: i64,
}

/// An appliance owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAppliance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub appliance_catalog_id: Option<String>,
    pub custom_name: String,
    pub count: i64,
    pub custom_wattage: Option<i64>,
    pub hours_per_day: f64,
    pub days_per_week: i64,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub star_rating: Option<String>,
    pub purchase_year: Option<i64>,
    pub notes: Option<String>,
    /// Typical wattage of the linked catalog entry (joined, not stored)
    #[serde(skip)]
    pub catalog_wattage: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAppliance {
    /// Custom wattage when set, otherwise the catalog's typical wattage
    pub fn effective_wattage(&self) -> Option<i64> {
        self.custom_wattage.or(self.catalog_wattage)
    }
}

fn default_count() -> i64 {
    1
}

/// Create payload for an appliance
#[derive(Debug, Clone, Deserialize)]
pub struct NewAppliance {
    pub appliance_catalog_id: Option<String>,
    pub custom_name: String,
    #[serde(default = "default_count")]
    pub count: i64,
    pub custom_wattage: Option<i64>,
    pub hours_per_day: f64,
    pub days_per_week: i64,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub star_rating: Option<String>,
    pub purchase_year: Option<i64>,
    pub notes: Option<String>,
}

/// Partial update payload for an appliance
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplianceUpdate {
    pub custom_name: Option<String>,
    pub count: Option<i64>,
    pub custom_wattage: Option<i64>,
    pub hours_per_day: Option<f64>,
    pub days_per_week: Option<i64>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub star_rating: Option<String>,
    pub purchase_year: Option<i64>,
    pub notes: Option<String>,
}

/// Appliance plus derived consumption figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceView {
    #[serde(flatten)]
    pub appliance: UserAppliance,
    pub effective_wattage: i64,
    pub estimated_daily_kwh: f64,
    pub estimated_monthly_kwh: f64,
    pub estimated_monthly_cost: f64,
}

/// kWh and cost attributed to one appliance for one bill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplianceEstimate {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub user_appliance_id: Uuid,
    pub estimated_kwh: f64,
    pub estimated_cost: f64,
}

/// Estimate joined with the appliance name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateView {
    #[serde(flatten)]
    pub estimate: ApplianceEstimate,
    pub appliance_name: String,
}

/// Insight generation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightStatus {
    Pending,
    Completed,
    Failed,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for InsightStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown insight status: {}", s)),
        }
    }
}

/// Recommendation report tied to one bill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub user_id: Uuid,
    pub status: InsightStatus,
    pub structured_data: Option<serde_json::Value>,
    pub generated_at: Option<DateTime<Utc>>,
}

/// Paginated response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
    pub size: i64,
}

impl<T> Page<T> {
    /// Build a page from skip/limit style parameters
    pub fn from_offset(items: Vec<T>, total: i64, skip: i64, limit: i64) -> Self {
        let limit = limit.max(1);
        Self {
            items,
            total,
            page: (skip / limit).saturating_add(1),
            pages: (total + limit - 1) / limit,
            size: limit,
        }
    }

    /// Build a page from 1-based page numbers
    pub fn from_page(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let page_size = page_size.max(1);
        Self {
            items,
            total,
            page: page.max(1),
            pages: (total + page_size - 1) / page_size,
            size: page_size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            pages: self.pages,
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(UserRole::Admin > UserRole::User);
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_page_from_offset() {
        let page = Page::from_offset(vec![1, 2, 3], 23, 20, 10);
        assert_eq!(page.page, 3);
        assert_eq!(page.pages, 3);
        assert_eq!(page.size, 10);

        let empty: Page<i32> = Page::from_offset(vec![], 0, 0, 10);
        assert_eq!(empty.page, 1);
        assert_eq!(empty.pages, 0);

        let far: Page<i32> = Page::from_offset(vec![], 5, i64::MAX, 1);
        assert_eq!(far.page, i64::MAX);
    }

    #[test]
    fn test_effective_wattage_prefers_custom() {
        let now = Utc::now();
        let mut appliance = UserAppliance {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            appliance_catalog_id: Some("fan".into()),
            custom_name: "Fan".into(),
            count: 1,
            custom_wattage: None,
            hours_per_day: 8.0,
            days_per_week: 7,
            brand: None,
            model: None,
            star_rating: None,
            purchase_year: None,
            notes: None,
            catalog_wattage: Some(75),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(appliance.effective_wattage(), Some(75));
        appliance.custom_wattage = Some(60);
        assert_eq!(appliance.effective_wattage(), Some(60));
    }
}
