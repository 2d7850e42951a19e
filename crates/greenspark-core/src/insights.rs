//! Insight reports
//!
//! A report summarises one bill: headline KPIs, the change against the
//! user's previous successful bill, the per-appliance breakdown from the
//! estimation step and a list of recommendations. Recommendations come from
//! a small rule set; an AI backend may replace them with its own list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::estimation::round2;
use crate::models::{Bill, EstimateView};

/// Consumption above this many kWh in one bill is flagged
pub const HIGH_CONSUMPTION_KWH: f64 = 400.0;
/// Percent change against the previous bill that counts as a trend
pub const TREND_THRESHOLD_PERCENT: f64 = 10.0;
/// Share of the bill above which the top appliance is flagged
pub const DOMINANT_APPLIANCE_SHARE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Behavioral,
    Upgrade,
    Maintenance,
}

/// An energy-saving suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub potential_savings_kwh: f64,
    #[serde(default)]
    pub potential_savings_cost: f64,
    pub priority: Priority,
    pub difficulty: Difficulty,
    pub action_type: ActionType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub kwh_total: f64,
    pub cost_total: f64,
    pub kwh_change_percent: Option<f64>,
    pub cost_change_percent: Option<f64>,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownItem {
    pub appliance_id: Uuid,
    pub name: String,
    pub estimated_kwh: f64,
    pub estimated_cost: f64,
    pub percent_of_bill: f64,
}

/// Where the recommendations of a report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    Rules,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub bill_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub kpis: Kpis,
    pub consumption_breakdown: Vec<BreakdownItem>,
    pub recommendations: Vec<Recommendation>,
    pub source: ReportSource,
}

/// Everything the rule engine looks at
pub struct InsightContext<'a> {
    pub bill: &'a Bill,
    pub previous: Option<&'a Bill>,
    pub estimates: &'a [EstimateView],
}

fn percent_change(current: f64, previous: f64) -> Option<f64> {
    if previous > 0.0 {
        Some(round2((current - previous) / previous * 100.0))
    } else {
        None
    }
}

fn price_per_kwh(bill: &Bill) -> f64 {
    if bill.kwh_total > 0.0 {
        bill.cost_total / bill.kwh_total
    } else {
        0.0
    }
}

fn breakdown(bill: &Bill, estimates: &[EstimateView]) -> Vec<BreakdownItem> {
    let mut items: Vec<BreakdownItem> = estimates
        .iter()
        .map(|e| BreakdownItem {
            appliance_id: e.estimate.user_appliance_id,
            name: e.appliance_name.clone(),
            estimated_kwh: e.estimate.estimated_kwh,
            estimated_cost: e.estimate.estimated_cost,
            percent_of_bill: if bill.kwh_total > 0.0 {
                round2(e.estimate.estimated_kwh / bill.kwh_total * 100.0)
            } else {
                0.0
            },
        })
        .collect();
    items.sort_by(|a, b| b.estimated_kwh.total_cmp(&a.estimated_kwh));
    items
}

fn kpis(bill: &Bill, previous: Option<&Bill>) -> Kpis {
    let kwh_change = previous.and_then(|p| percent_change(bill.kwh_total, p.kwh_total));
    let cost_change = previous.and_then(|p| percent_change(bill.cost_total, p.cost_total));
    let trend = match kwh_change {
        Some(c) if c > TREND_THRESHOLD_PERCENT => Trend::Increasing,
        Some(c) if c < -TREND_THRESHOLD_PERCENT => Trend::Decreasing,
        _ => Trend::Stable,
    };
    Kpis {
        kwh_total: bill.kwh_total,
        cost_total: bill.cost_total,
        kwh_change_percent: kwh_change,
        cost_change_percent: cost_change,
        trend,
    }
}

fn rule_recommendations(ctx: &InsightContext<'_>, kpis: &Kpis, items: &[BreakdownItem]) -> Vec<Recommendation> {
    let bill = ctx.bill;
    let rate = price_per_kwh(bill);
    let mut recommendations = Vec::new();

    if bill.kwh_total > HIGH_CONSUMPTION_KWH {
        let kwh = bill.kwh_total * 0.1;
        recommendations.push(Recommendation {
            id: "high-consumption".to_string(),
            title: "High Overall Consumption".to_string(),
            description: "Your energy usage this month was high. Review your top appliances to find savings opportunities.".to_string(),
            potential_savings_kwh: round2(kwh),
            potential_savings_cost: round2(kwh * rate),
            priority: Priority::High,
            difficulty: Difficulty::Easy,
            action_type: ActionType::Behavioral,
        });
    }

    if kpis.trend == Trend::Increasing {
        let change = kpis.kwh_change_percent.unwrap_or_default();
        let increase = ctx
            .previous
            .map(|p| (bill.kwh_total - p.kwh_total).max(0.0))
            .unwrap_or_default();
        recommendations.push(Recommendation {
            id: "usage-increasing".to_string(),
            title: "Usage Increasing".to_string(),
            description: format!(
                "Your consumption increased by {:.0}% compared to your previous bill. Look for appliances you have been running longer.",
                change
            ),
            potential_savings_kwh: round2(increase),
            potential_savings_cost: round2(increase * rate),
            priority: Priority::Medium,
            difficulty: Difficulty::Easy,
            action_type: ActionType::Behavioral,
        });
    }

    if let Some(top) = items.first() {
        if bill.kwh_total > 0.0 && top.estimated_kwh / bill.kwh_total > DOMINANT_APPLIANCE_SHARE {
            let kwh = top.estimated_kwh * 0.15;
            recommendations.push(Recommendation {
                id: format!("check-appliance-{}", top.appliance_id),
                title: format!("Check Your {}", top.name),
                description: format!(
                    "Your '{}' is responsible for a large portion of your bill. Ensure it's running efficiently.",
                    top.name
                ),
                potential_savings_kwh: round2(kwh),
                potential_savings_cost: round2(kwh * rate),
                priority: Priority::High,
                difficulty: Difficulty::Medium,
                action_type: ActionType::Maintenance,
            });
        }
    }

    recommendations
}

/// Build a report from the rule set
pub fn build_report(ctx: &InsightContext<'_>) -> InsightReport {
    let kpis = kpis(ctx.bill, ctx.previous);
    let items = breakdown(ctx.bill, ctx.estimates);
    let recommendations = rule_recommendations(ctx, &kpis, &items);
    InsightReport {
        bill_id: ctx.bill.id,
        generated_at: Utc::now(),
        kpis,
        consumption_breakdown: items,
        recommendations,
        source: ReportSource::Rules,
    }
}

impl InsightReport {
    /// JSON context handed to the AI backend
    pub fn ai_context(&self, bill: &Bill) -> serde_json::Value {
        serde_json::json!({
            "bill": {
                "provider": bill.provider,
                "billing_period_start": bill.billing_period_start,
                "billing_period_end": bill.billing_period_end,
                "billing_days": bill.billing_days(),
                "kwh_total": bill.kwh_total,
                "cost_total": bill.cost_total,
            },
            "kpis": self.kpis,
            "consumption_breakdown": self.consumption_breakdown,
            "rule_recommendations": self.recommendations,
        })
    }

    /// Replace the rule list with AI output unless the AI produced nothing
    pub fn with_ai_recommendations(mut self, recommendations: Vec<Recommendation>) -> Self {
        let recommendations: Vec<Recommendation> = recommendations
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .map(|mut r| {
                if r.id.trim().is_empty() {
                    r.id = Uuid::new_v4().to_string();
                }
                r
            })
            .collect();
        if !recommendations.is_empty() {
            self.recommendations = recommendations;
            self.source = ReportSource::Ai;
        }
        self
    }
}
