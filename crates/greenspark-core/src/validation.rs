//! Input validation and normalization for request payloads
//!
//! Validators take ownership of the payload and hand back a cleaned copy
//! (trimmed names, lower-cased usernames and emails) so callers never store
//! un-normalized input.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{
    ApplianceUpdate, NewAppliance, NewCatalogEntry, NewManualBill, NewUser, UserUpdate,
};

/// Maximum appliances accepted by a single bulk create
pub const MAX_BULK_APPLIANCES: usize = 50;

/// Longest billing period accepted for manual bills
pub const MAX_BILLING_PERIOD_DAYS: i64 = 90;

const PASSWORD_SPECIALS: &str = "!@#$%^&*(),.?\":{}|<>";

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("valid regex")
    })
}

fn star_rating_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[1-5](\.5)?$").expect("valid regex"))
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::Validation(msg.into())
}

/// Collapse runs of whitespace and trim
pub fn clean_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(invalid(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

fn check_max_len(field: &str, value: &Option<String>, max: usize) -> Result<()> {
    if let Some(v) = value {
        if v.chars().count() > max {
            return Err(invalid(format!("{} must be at most {} characters", field, max)));
        }
    }
    Ok(())
}

pub fn validate_person_name(field: &str, name: &str) -> Result<String> {
    let cleaned = clean_name(name);
    check_len(field, &cleaned, 2, 25)?;
    Ok(cleaned)
}

pub fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    check_len("username", username, 3, 25)?;
    if !username_re().is_match(username) {
        return Err(invalid(
            "Username can only contain letters, numbers, underscores and hyphens",
        ));
    }
    Ok(username.to_lowercase())
}

pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.len() > 254 || !email_re().is_match(&email) {
        return Err(invalid("Invalid email address"));
    }
    Ok(email)
}

/// Strength rules shared by signup, password change and reset
pub fn validate_password_strength(password: &str, min_len: usize) -> Result<()> {
    let len = password.chars().count();
    if len < min_len || len > 30 {
        return Err(invalid(format!(
            "Password must be between {} and 30 characters",
            min_len
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(invalid("Password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid("Password must contain at least one digit"));
    }
    if !password.chars().any(|c| PASSWORD_SPECIALS.contains(c)) {
        return Err(invalid("Password must contain at least one special character"));
    }
    Ok(())
}

pub fn validate_password_change(current: &str, new: &str) -> Result<()> {
    validate_password_strength(new, 6)?;
    if current == new {
        return Err(invalid("New password must be different from the current one"));
    }
    Ok(())
}

pub fn validate_password_reset(new: &str, confirm: &str) -> Result<()> {
    validate_password_strength(new, 8)?;
    if new != confirm {
        return Err(invalid("Passwords do not match"));
    }
    Ok(())
}

fn validate_timezone(tz: &str) -> Result<String> {
    let tz = tz.trim();
    check_len("timezone", tz, 1, 64)?;
    Ok(tz.to_string())
}

impl NewUser {
    pub fn validate(self) -> Result<Self> {
        validate_password_strength(&self.password, 6)?;
        Ok(Self {
            email: validate_email(&self.email)?,
            first_name: validate_person_name("first_name", &self.first_name)?,
            last_name: validate_person_name("last_name", &self.last_name)?,
            username: validate_username(&self.username)?,
            password: self.password,
            timezone: self.timezone.as_deref().map(validate_timezone).transpose()?,
        })
    }
}

impl UserUpdate {
    pub fn validate(self) -> Result<Self> {
        if self.first_name.is_none()
            && self.last_name.is_none()
            && self.username.is_none()
            && self.timezone.is_none()
        {
            return Err(invalid("At least one field must be provided for update"));
        }
        Ok(Self {
            first_name: self
                .first_name
                .as_deref()
                .map(|n| validate_person_name("first_name", n))
                .transpose()?,
            last_name: self
                .last_name
                .as_deref()
                .map(|n| validate_person_name("last_name", n))
                .transpose()?,
            username: self.username.as_deref().map(validate_username).transpose()?,
            timezone: self.timezone.as_deref().map(validate_timezone).transpose()?,
        })
    }
}

fn check_count(count: i64) -> Result<()> {
    if !(1..=100).contains(&count) {
        return Err(invalid("count must be between 1 and 100"));
    }
    Ok(())
}

fn check_wattage(wattage: i64) -> Result<()> {
    if !(1..=10_000).contains(&wattage) {
        return Err(invalid("custom_wattage must be between 1 and 10000"));
    }
    Ok(())
}

fn check_hours(hours: f64) -> Result<()> {
    if !hours.is_finite() || !(0.0..=24.0).contains(&hours) {
        return Err(invalid("hours_per_day must be between 0 and 24"));
    }
    Ok(())
}

fn check_days(days: i64) -> Result<()> {
    if !(0..=7).contains(&days) {
        return Err(invalid("days_per_week must be between 0 and 7"));
    }
    Ok(())
}

fn check_star_rating(rating: &Option<String>) -> Result<()> {
    if let Some(r) = rating {
        if !star_rating_re().is_match(r) {
            return Err(invalid("star_rating must look like 1-5 with optional .5"));
        }
    }
    Ok(())
}

fn check_purchase_year(year: Option<i64>) -> Result<()> {
    if let Some(y) = year {
        if !(1990..=2030).contains(&y) {
            return Err(invalid("purchase_year must be between 1990 and 2030"));
        }
    }
    Ok(())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NewAppliance {
    pub fn validate(self) -> Result<Self> {
        let custom_name = self.custom_name.trim().to_string();
        check_len("custom_name", &custom_name, 1, 100)?;
        check_count(self.count)?;
        if let Some(w) = self.custom_wattage {
            check_wattage(w)?;
        }
        check_hours(self.hours_per_day)?;
        check_days(self.days_per_week)?;

        let brand = clean_optional(self.brand);
        let model = clean_optional(self.model);
        let notes = clean_optional(self.notes);
        let star_rating = clean_optional(self.star_rating);
        check_max_len("brand", &brand, 50)?;
        check_max_len("model", &model, 100)?;
        check_max_len("notes", &notes, 500)?;
        check_star_rating(&star_rating)?;
        check_purchase_year(self.purchase_year)?;

        let appliance_catalog_id = clean_optional(self.appliance_catalog_id);
        if appliance_catalog_id.is_none() && self.custom_wattage.is_none() {
            return Err(invalid(
                "Either appliance_catalog_id or custom_wattage must be provided",
            ));
        }

        Ok(Self {
            appliance_catalog_id,
            custom_name,
            count: self.count,
            custom_wattage: self.custom_wattage,
            hours_per_day: self.hours_per_day,
            days_per_week: self.days_per_week,
            brand,
            model,
            star_rating,
            purchase_year: self.purchase_year,
            notes,
        })
    }
}

/// Validate a bulk create request: size limit, per-item rules, unique names
pub fn validate_bulk_appliances(items: Vec<NewAppliance>) -> Result<Vec<NewAppliance>> {
    if items.is_empty() {
        return Err(invalid("At least one appliance is required"));
    }
    if items.len() > MAX_BULK_APPLIANCES {
        return Err(invalid(format!(
            "Cannot create more than {} appliances at once",
            MAX_BULK_APPLIANCES
        )));
    }

    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(items.len());
    for item in items {
        let item = item.validate()?;
        if !seen.insert(item.custom_name.to_lowercase()) {
            return Err(invalid(format!(
                "Appliance names must be unique: '{}' appears more than once",
                item.custom_name
            )));
        }
        cleaned.push(item);
    }
    Ok(cleaned)
}

impl ApplianceUpdate {
    pub fn is_empty(&self) -> bool {
        self.custom_name.is_none()
            && self.count.is_none()
            && self.custom_wattage.is_none()
            && self.hours_per_day.is_none()
            && self.days_per_week.is_none()
            && self.brand.is_none()
            && self.model.is_none()
            && self.star_rating.is_none()
            && self.purchase_year.is_none()
            && self.notes.is_none()
    }

    pub fn validate(self) -> Result<Self> {
        if self.is_empty() {
            return Err(invalid("At least one field must be provided for update"));
        }

        let custom_name = match self.custom_name {
            Some(name) => {
                let name = name.trim().to_string();
                check_len("custom_name", &name, 1, 100)?;
                Some(name)
            }
            None => None,
        };
        if let Some(c) = self.count {
            check_count(c)?;
        }
        if let Some(w) = self.custom_wattage {
            check_wattage(w)?;
        }
        if let Some(h) = self.hours_per_day {
            check_hours(h)?;
        }
        if let Some(d) = self.days_per_week {
            check_days(d)?;
        }
        check_max_len("brand", &self.brand, 50)?;
        check_max_len("model", &self.model, 100)?;
        check_max_len("notes", &self.notes, 500)?;
        check_star_rating(&self.star_rating)?;
        check_purchase_year(self.purchase_year)?;

        Ok(Self {
            custom_name,
            ..self
        })
    }
}

/// Check a billing period: end strictly after start, at most 90 days long
pub fn validate_billing_period(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end <= start {
        return Err(invalid("billing_period_end must be after billing_period_start"));
    }
    if (end - start).num_days() > MAX_BILLING_PERIOD_DAYS {
        return Err(invalid(format!(
            "Billing period cannot exceed {} days",
            MAX_BILLING_PERIOD_DAYS
        )));
    }
    Ok(())
}

impl NewManualBill {
    pub fn validate(self) -> Result<Self> {
        if !self.kwh_total.is_finite() || self.kwh_total <= 0.0 {
            return Err(invalid("kwh_total must be greater than 0"));
        }
        if !self.cost_total.is_finite() || self.cost_total < 0.0 {
            return Err(invalid("cost_total cannot be negative"));
        }
        let provider = self.provider.trim().to_string();
        check_len("provider", &provider, 1, 100)?;
        validate_billing_period(self.billing_period_start, self.billing_period_end)?;
        Ok(Self { provider, ..self })
    }
}

impl NewCatalogEntry {
    pub fn validate(self) -> Result<Self> {
        let category_id = self.category_id.trim().to_lowercase();
        let label = self.label.trim().to_string();
        let icon_emoji = self.icon_emoji.trim().to_string();
        check_len("category_id", &category_id, 1, 50)?;
        check_len("label", &label, 1, 100)?;
        check_len("icon_emoji", &icon_emoji, 1, 10)?;
        if !(1..=10_000).contains(&self.typical_wattage) {
            return Err(invalid("typical_wattage must be between 1 and 10000"));
        }
        Ok(Self {
            category_id,
            label,
            icon_emoji,
            typical_wattage: self.typical_wattage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appliance(name: &str) -> NewAppliance {
        NewAppliance {
            appliance_catalog_id: None,
            custom_name: name.to_string(),
            count: 1,
            custom_wattage: Some(100),
            hours_per_day: 4.0,
            days_per_week: 7,
            brand: None,
            model: None,
            star_rating: None,
            purchase_year: None,
            notes: None,
        }
    }

    #[test]
    fn test_username_normalized() {
        assert_eq!(validate_username("  John_Doe-21 ").unwrap(), "john_doe-21");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("john doe").is_err());
        assert!(validate_username("a".repeat(26).as_str()).is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password_strength("SecurePass123!", 6).is_ok());
        assert!(validate_password_strength("securepass123!", 6).is_err());
        assert!(validate_password_strength("SECUREPASS123!", 6).is_err());
        assert!(validate_password_strength("SecurePass!", 6).is_err());
        assert!(validate_password_strength("SecurePass123", 6).is_err());
        assert!(validate_password_strength("Ab1!", 6).is_err());
        assert!(validate_password_change("SecurePass123!", "SecurePass123!").is_err());
        assert!(validate_password_reset("SecurePass123!", "SecurePass123?").is_err());
    }

    #[test]
    fn test_email() {
        assert_eq!(validate_email(" User@Example.COM ").unwrap(), "user@example.com");
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("a@b").is_err());
    }

    #[test]
    fn test_names_collapse_whitespace() {
        assert_eq!(
            validate_person_name("first_name", "  Mary   Ann ").unwrap(),
            "Mary Ann"
        );
        assert!(validate_person_name("first_name", "J").is_err());
    }

    #[test]
    fn test_appliance_requires_wattage_source() {
        let mut a = appliance("Fan");
        a.custom_wattage = None;
        assert!(a.clone().validate().is_err());

        a.appliance_catalog_id = Some("fan".to_string());
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_appliance_ranges() {
        let mut a = appliance("  Fridge  ");
        a.star_rating = Some("4.5".to_string());
        let cleaned = a.clone().validate().unwrap();
        assert_eq!(cleaned.custom_name, "Fridge");

        a.star_rating = Some("4.3".to_string());
        assert!(a.clone().validate().is_err());

        let mut b = appliance("AC");
        b.hours_per_day = 25.0;
        assert!(b.validate().is_err());

        let mut c = appliance("AC");
        c.days_per_week = 8;
        assert!(c.validate().is_err());

        let mut d = appliance("AC");
        d.purchase_year = Some(1985);
        assert!(d.validate().is_err());

        let mut e = appliance("AC");
        e.count = 0;
        assert!(e.validate().is_err());
    }

    #[test]
    fn test_bulk_limits() {
        let too_many: Vec<_> = (0..51).map(|i| appliance(&format!("A{}", i))).collect();
        assert!(validate_bulk_appliances(too_many).is_err());

        let dupes = vec![appliance("Fan"), appliance("fan")];
        assert!(validate_bulk_appliances(dupes).is_err());

        assert!(validate_bulk_appliances(vec![]).is_err());
        assert_eq!(
            validate_bulk_appliances(vec![appliance("Fan"), appliance("TV")])
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(ApplianceUpdate::default().validate().is_err());
        assert!(UserUpdate::default().validate().is_err());
    }

    #[test]
    fn test_manual_bill_rules() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bill = NewManualBill {
            billing_period_start: start,
            billing_period_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            kwh_total: 250.0,
            cost_total: 2000.0,
            provider: "  BESCOM ".to_string(),
        };
        assert_eq!(bill.clone().validate().unwrap().provider, "BESCOM");

        let mut zero = bill.clone();
        zero.kwh_total = 0.0;
        assert!(zero.validate().is_err());

        let mut backwards = bill.clone();
        backwards.billing_period_end = start;
        assert!(backwards.validate().is_err());

        let mut long = bill;
        long.billing_period_end = NaiveDate::from_ymd_opt(2024, 4, 15).unwrap();
        assert!(long.validate().is_err());
    }
}
