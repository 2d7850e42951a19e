//! Proportional appliance estimation
//!
//! Each appliance has a theoretical consumption for the billing period
//! (wattage × hours/day × days/week ÷ 7 × days × count ÷ 1000). Those figures
//! rarely add up to what the meter recorded, so every appliance is scaled by
//! the same factor `bill kWh / Σ theoretical kWh`. The scaled estimates then
//! sum to the bill's total, and cost follows from the bill's effective
//! price per kWh.

use uuid::Uuid;

use crate::models::{ApplianceEstimate, Bill, UserAppliance};

/// Period assumed when a bill's start and end fall on the same day
pub const DEFAULT_BILLING_DAYS: i64 = 30;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Billing period length used for estimation
pub fn billing_days(bill: &Bill) -> i64 {
    match bill.billing_days() {
        d if d <= 0 => DEFAULT_BILLING_DAYS,
        d => d,
    }
}

/// Consumption an appliance would draw over `days` at its declared usage
///
/// `None` when neither a custom nor a catalog wattage is known.
pub fn theoretical_kwh(appliance: &UserAppliance, days: i64) -> Option<f64> {
    let watts = appliance.effective_wattage()? as f64;
    let active_fraction = appliance.days_per_week as f64 / 7.0;
    Some(
        watts * appliance.hours_per_day * active_fraction * days as f64 * appliance.count as f64
            / 1000.0,
    )
}

/// Result of estimating a bill
#[derive(Debug, Clone, PartialEq)]
pub enum EstimationOutcome {
    /// Scaled per-appliance estimates
    Estimated(Vec<ApplianceEstimate>),
    /// The user has no appliances; nothing should be written
    NoAppliances,
    /// Appliances exist but none draws any power; stale estimates should be cleared
    ZeroUsage,
}

/// Distribute a bill's metered kWh and cost across the user's appliances
pub fn estimate_bill(bill: &Bill, appliances: &[UserAppliance]) -> EstimationOutcome {
    if appliances.is_empty() {
        return EstimationOutcome::NoAppliances;
    }

    let days = billing_days(bill);
    let theoretical: Vec<(&UserAppliance, f64)> = appliances
        .iter()
        .filter_map(|a| theoretical_kwh(a, days).map(|kwh| (a, kwh)))
        .collect();

    let total: f64 = theoretical.iter().map(|(_, kwh)| kwh).sum();
    if total <= 0.0 {
        return EstimationOutcome::ZeroUsage;
    }

    let scaling = bill.kwh_total / total;
    let cost_per_kwh = if bill.kwh_total > 0.0 {
        bill.cost_total / bill.kwh_total
    } else {
        0.0
    };

    let estimates = theoretical
        .into_iter()
        .map(|(appliance, kwh)| {
            let estimated_kwh = kwh * scaling;
            ApplianceEstimate {
                id: Uuid::new_v4(),
                bill_id: bill.id,
                user_appliance_id: appliance.id,
                estimated_kwh: round2(estimated_kwh),
                estimated_cost: round2(estimated_kwh * cost_per_kwh),
            }
        })
        .collect();

    EstimationOutcome::Estimated(estimates)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{ParseStatus, SourceType};
    use chrono::{NaiveDate, Utc};

    pub(crate) fn bill(kwh: f64, cost: f64, start: (i32, u32, u32), end: (i32, u32, u32)) -> Bill {
        Bill {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            billing_period_start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            billing_period_end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            kwh_total: kwh,
            cost_total: cost,
            provider: "BESCOM".into(),
            normalized_json: None,
            parse_status: ParseStatus::Success,
            source_type: SourceType::Manual,
            file_uri: None,
            parser_version: None,
            checksum: None,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn appliance(name: &str, watts: Option<i64>, hours: f64, days: i64) -> UserAppliance {
        let now = Utc::now();
        UserAppliance {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            appliance_catalog_id: None,
            custom_name: name.into(),
            count: 1,
            custom_wattage: watts,
            hours_per_day: hours,
            days_per_week: days,
            brand: None,
            model: None,
            star_rating: None,
            purchase_year: None,
            notes: None,
            catalog_wattage: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn estimates(outcome: EstimationOutcome) -> Vec<ApplianceEstimate> {
        match outcome {
            EstimationOutcome::Estimated(e) => e,
            other => panic!("expected estimates, got {:?}", other),
        }
    }

    #[test]
    fn test_scaled_estimates_sum_to_bill() {
        let bill = bill(300.0, 2400.0, (2024, 1, 1), (2024, 1, 31));
        let appliances = vec![
            appliance("Fridge", Some(150), 24.0, 7),
            appliance("AC", Some(1500), 6.0, 5),
            appliance("Fan", Some(75), 10.0, 7),
        ];
        let result = estimates(estimate_bill(&bill, &appliances));
        assert_eq!(result.len(), 3);

        let kwh: f64 = result.iter().map(|e| e.estimated_kwh).sum();
        let cost: f64 = result.iter().map(|e| e.estimated_cost).sum();
        assert!((kwh - 300.0).abs() < 0.05, "kwh sum was {}", kwh);
        assert!((cost - 2400.0).abs() < 0.05, "cost sum was {}", cost);
    }

    #[test]
    fn test_proportions_follow_theoretical_usage() {
        // 30 days, two appliances with a 1:3 theoretical ratio
        let bill = bill(100.0, 800.0, (2024, 3, 1), (2024, 3, 31));
        let appliances = vec![
            appliance("Small", Some(100), 1.0, 7),
            appliance("Large", Some(300), 1.0, 7),
        ];
        let result = estimates(estimate_bill(&bill, &appliances));
        assert_eq!(result[0].estimated_kwh, 25.0);
        assert_eq!(result[1].estimated_kwh, 75.0);
        assert_eq!(result[0].estimated_cost, 200.0);
        assert_eq!(result[1].estimated_cost, 600.0);
    }

    #[test]
    fn test_count_and_catalog_wattage() {
        let bill = bill(90.0, 900.0, (2024, 3, 1), (2024, 3, 31));
        let mut bulbs = appliance("Bulbs", None, 5.0, 7);
        bulbs.catalog_wattage = Some(10);
        bulbs.count = 2;
        let lamp = appliance("Lamp", Some(10), 5.0, 7);
        let result = estimates(estimate_bill(&bill, &[bulbs, lamp]));
        assert_eq!(result[0].estimated_kwh, 60.0);
        assert_eq!(result[1].estimated_kwh, 30.0);
    }

    #[test]
    fn test_no_appliances() {
        let bill = bill(100.0, 800.0, (2024, 1, 1), (2024, 1, 31));
        assert_eq!(estimate_bill(&bill, &[]), EstimationOutcome::NoAppliances);
    }

    #[test]
    fn test_zero_usage() {
        let bill = bill(100.0, 800.0, (2024, 1, 1), (2024, 1, 31));
        let appliances = vec![
            appliance("Idle", Some(100), 0.0, 7),
            appliance("Unknown", None, 5.0, 7),
        ];
        assert_eq!(estimate_bill(&bill, &appliances), EstimationOutcome::ZeroUsage);
    }

    #[test]
    fn test_zero_kwh_bill_has_zero_cost() {
        let bill = bill(0.0, 150.0, (2024, 1, 1), (2024, 1, 31));
        let result = estimates(estimate_bill(&bill, &[appliance("Fan", Some(75), 8.0, 7)]));
        assert_eq!(result[0].estimated_kwh, 0.0);
        assert_eq!(result[0].estimated_cost, 0.0);
    }

    #[test]
    fn test_same_day_period_uses_default_days() {
        let same_day = bill(100.0, 800.0, (2024, 1, 1), (2024, 1, 1));
        assert_eq!(billing_days(&same_day), DEFAULT_BILLING_DAYS);
        let a = appliance("Fan", Some(100), 10.0, 7);
        assert_eq!(theoretical_kwh(&a, billing_days(&same_day)), Some(30.0));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(2.344), 2.34);
    }
}
