//! Consumption figures for appliances
//!
//! Monthly figures assume a 30-day month; costs use a flat price per kWh
//! (the configured electricity rate unless the caller supplies one).

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::estimation::{round2, theoretical_kwh};
use crate::models::{ApplianceCatalog, ApplianceView, UserAppliance};

const DAYS_PER_MONTH: f64 = 30.0;
const MONTHS_PER_YEAR: f64 = 12.0;

/// Daily kWh averaged over the week, including `count`
pub fn daily_kwh(appliance: &UserAppliance) -> f64 {
    let watts = appliance.effective_wattage().unwrap_or(0) as f64;
    watts * appliance.hours_per_day * (appliance.days_per_week as f64 / 7.0)
        * appliance.count as f64
        / 1000.0
}

pub fn monthly_kwh(appliance: &UserAppliance) -> f64 {
    daily_kwh(appliance) * DAYS_PER_MONTH
}

/// Attach derived consumption figures to an appliance
pub fn appliance_view(appliance: UserAppliance, rate: f64) -> ApplianceView {
    let daily = daily_kwh(&appliance);
    let monthly = daily * DAYS_PER_MONTH;
    ApplianceView {
        effective_wattage: appliance.effective_wattage().unwrap_or(0),
        estimated_daily_kwh: round2(daily),
        estimated_monthly_kwh: round2(monthly),
        estimated_monthly_cost: round2(monthly * rate),
        appliance,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavingsAction {
    pub action: String,
    pub description: String,
    pub savings_kwh: f64,
    pub savings_cost: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavingsPotential {
    pub potential_actions: Vec<SavingsAction>,
    pub estimated_savings_kwh: f64,
    pub estimated_savings_cost: f64,
}

/// Consumption of one appliance at a given rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionReport {
    pub appliance_id: Uuid,
    pub name: String,
    pub effective_wattage: i64,
    pub electricity_rate: f64,
    pub daily_kwh: f64,
    pub monthly_kwh: f64,
    pub annual_kwh: f64,
    pub daily_cost: f64,
    pub monthly_cost: f64,
    pub annual_cost: f64,
    pub savings_potential: SavingsPotential,
}

/// Usage and replacement savings for one appliance
///
/// Usage over 8 h/day suggests trimming 20% (at most 2 h); appliances more
/// than ten years old are assumed 30% less efficient than a new model.
pub fn savings_potential(appliance: &UserAppliance, rate: f64, current_year: i32) -> SavingsPotential {
    let mut savings = SavingsPotential::default();
    let watts = appliance.effective_wattage().unwrap_or(0) as f64;

    if appliance.hours_per_day > 8.0 {
        let reduction_hours = (appliance.hours_per_day * 0.2).min(2.0);
        let kwh = watts * reduction_hours * DAYS_PER_MONTH * appliance.count as f64 / 1000.0;
        savings.potential_actions.push(SavingsAction {
            action: "Reduce usage time".to_string(),
            description: format!("Reduce daily usage by {:.1} hours", reduction_hours),
            savings_kwh: round2(kwh),
            savings_cost: round2(kwh * rate),
        });
        savings.estimated_savings_kwh += kwh;
    }

    if let Some(year) = appliance.purchase_year {
        if year < i64::from(current_year) - 10 {
            let kwh = monthly_kwh(appliance) * 0.3;
            savings.potential_actions.push(SavingsAction {
                action: "Replace with energy-efficient model".to_string(),
                description: "Consider upgrading to a newer, more efficient model".to_string(),
                savings_kwh: round2(kwh),
                savings_cost: round2(kwh * rate),
            });
            savings.estimated_savings_kwh += kwh;
        }
    }

    savings.estimated_savings_cost = round2(savings.estimated_savings_kwh * rate);
    savings.estimated_savings_kwh = round2(savings.estimated_savings_kwh);
    savings
}

pub fn consumption_report(appliance: &UserAppliance, rate: f64) -> ConsumptionReport {
    let daily = daily_kwh(appliance);
    let monthly = daily * DAYS_PER_MONTH;
    let annual = monthly * MONTHS_PER_YEAR;
    ConsumptionReport {
        appliance_id: appliance.id,
        name: appliance.custom_name.clone(),
        effective_wattage: appliance.effective_wattage().unwrap_or(0),
        electricity_rate: rate,
        daily_kwh: round2(daily),
        monthly_kwh: round2(monthly),
        annual_kwh: round2(annual),
        daily_cost: round2(daily * rate),
        monthly_cost: round2(monthly * rate),
        annual_cost: round2(annual * rate),
        savings_potential: savings_potential(appliance, rate, chrono::Utc::now().year()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopConsumer {
    pub appliance_id: Uuid,
    pub name: String,
    pub monthly_kwh: f64,
    pub monthly_cost: f64,
}

/// Aggregates over a user's appliances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplianceStatistics {
    pub total_appliances: i64,
    pub total_units: i64,
    pub estimated_monthly_kwh: f64,
    pub estimated_monthly_cost: f64,
    pub estimated_annual_cost: f64,
    pub brands: BTreeMap<String, i64>,
    pub categories: BTreeMap<String, i64>,
    pub top_consumers: Vec<TopConsumer>,
    pub recommendations: Vec<String>,
}

const CUSTOM_CATEGORY: &str = "custom";

fn top_consumers(appliances: &[UserAppliance], rate: f64, n: usize) -> Vec<TopConsumer> {
    let mut consumers: Vec<TopConsumer> = appliances
        .iter()
        .map(|a| {
            let kwh = monthly_kwh(a);
            TopConsumer {
                appliance_id: a.id,
                name: a.custom_name.clone(),
                monthly_kwh: round2(kwh),
                monthly_cost: round2(kwh * rate),
            }
        })
        .collect();
    consumers.sort_by(|a, b| b.monthly_kwh.total_cmp(&a.monthly_kwh));
    consumers.truncate(n);
    consumers
}

fn statistics_recommendations(monthly_kwh: f64, brands: &BTreeMap<String, i64>) -> Vec<String> {
    let mut recommendations = Vec::new();

    if monthly_kwh > 500.0 {
        recommendations.push(
            "Your monthly consumption is high. Consider reviewing high-usage appliances."
                .to_string(),
        );
    }

    for (brand, count) in brands {
        if *count > 3 {
            recommendations.push(format!(
                "You have {} {} appliances. Consider consolidating if possible.",
                count, brand
            ));
        }
    }

    recommendations.extend(
        [
            "Use appliances during off-peak hours to save on electricity costs",
            "Regular maintenance can improve appliance efficiency by up to 20%",
            "Consider smart power strips to eliminate standby power consumption",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    recommendations.truncate(5);
    recommendations
}

pub fn appliance_statistics(appliances: &[UserAppliance], rate: f64) -> ApplianceStatistics {
    let mut brands = BTreeMap::new();
    let mut categories = BTreeMap::new();
    for a in appliances {
        if let Some(ref brand) = a.brand {
            *brands.entry(brand.clone()).or_insert(0) += 1;
        }
        let category = a
            .appliance_catalog_id
            .clone()
            .unwrap_or_else(|| CUSTOM_CATEGORY.to_string());
        *categories.entry(category).or_insert(0) += 1;
    }

    let monthly: f64 = appliances.iter().map(monthly_kwh).sum();

    ApplianceStatistics {
        total_appliances: appliances.len() as i64,
        total_units: appliances.iter().map(|a| a.count).sum(),
        estimated_monthly_kwh: round2(monthly),
        estimated_monthly_cost: round2(monthly * rate),
        estimated_annual_cost: round2(monthly * rate * MONTHS_PER_YEAR),
        recommendations: statistics_recommendations(monthly, &brands),
        top_consumers: top_consumers(appliances, rate, 5),
        brands,
        categories,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogUsage {
    pub category_id: String,
    pub label: String,
    pub count: i64,
}

/// System-wide aggregates for administrators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatistics {
    pub total_appliances: i64,
    pub total_units: i64,
    pub users_with_appliances: i64,
    pub average_appliances_per_user: f64,
    pub estimated_monthly_kwh: f64,
    pub estimated_monthly_cost: f64,
    pub most_common_appliances: Vec<CatalogUsage>,
}

pub fn system_statistics(
    appliances: &[UserAppliance],
    catalog: &[ApplianceCatalog],
    rate: f64,
) -> SystemStatistics {
    let mut owners = std::collections::HashSet::new();
    let mut per_category: HashMap<&str, i64> = HashMap::new();
    for a in appliances {
        owners.insert(a.user_id);
        if let Some(ref id) = a.appliance_catalog_id {
            *per_category.entry(id.as_str()).or_insert(0) += 1;
        }
    }

    let labels: HashMap<&str, &str> = catalog
        .iter()
        .map(|c| (c.category_id.as_str(), c.label.as_str()))
        .collect();

    let mut most_common: Vec<CatalogUsage> = per_category
        .into_iter()
        .map(|(id, count)| CatalogUsage {
            category_id: id.to_string(),
            label: labels.get(id).copied().unwrap_or(id).to_string(),
            count,
        })
        .collect();
    most_common.sort_by(|a, b| b.count.cmp(&a.count).then(a.category_id.cmp(&b.category_id)));
    most_common.truncate(5);

    let users = owners.len() as i64;
    let monthly: f64 = appliances.iter().map(monthly_kwh).sum();

    SystemStatistics {
        total_appliances: appliances.len() as i64,
        total_units: appliances.iter().map(|a| a.count).sum(),
        users_with_appliances: users,
        average_appliances_per_user: if users > 0 {
            round2(appliances.len() as f64 / users as f64)
        } else {
            0.0
        },
        estimated_monthly_kwh: round2(monthly),
        estimated_monthly_cost: round2(monthly * rate),
        most_common_appliances: most_common,
    }
}

/// One appliance's share of a hypothetical bill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillImpact {
    pub user_appliance_id: Uuid,
    pub name: String,
    pub estimated_kwh: f64,
    pub estimated_cost: f64,
}

/// Split a bill amount across appliances in proportion to theoretical kWh
///
/// Appliances without wattage are left out; an empty list means nothing
/// draws power. Sorted by cost, highest first.
pub fn bill_impact(appliances: &[UserAppliance], bill_amount: f64, billing_days: i64) -> Vec<BillImpact> {
    let usage: Vec<(&UserAppliance, f64)> = appliances
        .iter()
        .filter_map(|a| theoretical_kwh(a, billing_days).map(|kwh| (a, kwh)))
        .collect();

    let total: f64 = usage.iter().map(|(_, kwh)| kwh).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let cost_per_kwh = bill_amount / total;
    let mut impacts: Vec<BillImpact> = usage
        .into_iter()
        .map(|(a, kwh)| BillImpact {
            user_appliance_id: a.id,
            name: a.custom_name.clone(),
            estimated_kwh: round2(kwh),
            estimated_cost: round2(kwh * cost_per_kwh),
        })
        .collect();
    impacts.sort_by(|a, b| b.estimated_cost.total_cmp(&a.estimated_cost));
    impacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::tests::appliance;

    #[test]
    fn test_appliance_view_figures() {
        // 100 W, 10 h/day, 7 days: 1 kWh/day, 30 kWh/month
        let view = appliance_view(appliance("Fan", Some(100), 10.0, 7), 8.0);
        assert_eq!(view.effective_wattage, 100);
        assert_eq!(view.estimated_daily_kwh, 1.0);
        assert_eq!(view.estimated_monthly_kwh, 30.0);
        assert_eq!(view.estimated_monthly_cost, 240.0);
    }

    #[test]
    fn test_weekday_only_usage() {
        let a = appliance("PC", Some(700), 1.0, 5);
        assert_eq!(round2(monthly_kwh(&a)), 15.0);
    }

    #[test]
    fn test_savings_for_heavy_old_appliance() {
        let mut a = appliance("AC", Some(1000), 10.0, 7);
        a.purchase_year = Some(2010);
        let savings = savings_potential(&a, 8.0, 2024);
        assert_eq!(savings.potential_actions.len(), 2);
        // 2 h/day less at 1 kW for 30 days
        assert_eq!(savings.potential_actions[0].savings_kwh, 60.0);
        // 30% of 300 kWh/month
        assert_eq!(savings.potential_actions[1].savings_kwh, 90.0);
        assert_eq!(savings.estimated_savings_kwh, 150.0);
        assert_eq!(savings.estimated_savings_cost, 1200.0);
    }

    #[test]
    fn test_no_savings_for_light_new_appliance() {
        let mut a = appliance("Fan", Some(75), 4.0, 7);
        a.purchase_year = Some(2022);
        let savings = savings_potential(&a, 8.0, 2024);
        assert!(savings.potential_actions.is_empty());
        assert_eq!(savings.estimated_savings_cost, 0.0);
    }

    #[test]
    fn test_statistics() {
        let mut a = appliance("Fridge", Some(150), 24.0, 7);
        a.brand = Some("LG".into());
        a.appliance_catalog_id = Some("refrigerator".into());
        let mut b = appliance("Bulbs", Some(9), 6.0, 7);
        b.count = 4;
        let stats = appliance_statistics(&[a, b], 8.0);
        assert_eq!(stats.total_appliances, 2);
        assert_eq!(stats.total_units, 5);
        assert_eq!(stats.brands.get("LG"), Some(&1));
        assert_eq!(stats.categories.get("custom"), Some(&1));
        assert_eq!(stats.top_consumers[0].name, "Fridge");
        assert!(stats.recommendations.len() <= 5);
    }

    #[test]
    fn test_bill_impact_sorted_and_complete() {
        let appliances = vec![
            appliance("Small", Some(100), 1.0, 7),
            appliance("Large", Some(300), 1.0, 7),
            appliance("Unknown", None, 1.0, 7),
        ];
        let impact = bill_impact(&appliances, 1200.0, 30);
        assert_eq!(impact.len(), 2);
        assert_eq!(impact[0].name, "Large");
        assert_eq!(impact[0].estimated_cost, 900.0);
        assert_eq!(impact[1].estimated_cost, 300.0);
    }

    #[test]
    fn test_bill_impact_empty_without_usage() {
        assert!(bill_impact(&[appliance("Off", Some(100), 0.0, 7)], 500.0, 30).is_empty());
    }
}
