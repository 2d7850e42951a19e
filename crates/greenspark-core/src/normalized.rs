//! Normalized bill document
//!
//! The structured shape the AI parser is asked to produce for an electricity
//! bill. It is stored verbatim on the bill row after validation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

fn default_version() -> String {
    "1.1".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

/// Parsers emit `null` for absent adjustments
fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(d)?.unwrap_or(0.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBill {
    #[serde(default = "default_version")]
    pub version: String,
    pub discom: String,
    pub account: BillAccount,
    pub period: BillPeriod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_details: Option<serde_json::Map<String, serde_json::Value>>,
    pub consumption: Consumption,
    #[serde(default)]
    pub charges_breakdown: Vec<ChargeItem>,
    pub billing_summary: BillingSummary,
    pub totals: Totals,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tariff: Option<Tariff>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillAccount {
    pub consumer_id: String,
    #[serde(default)]
    pub meter_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub bill_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterReadings {
    #[serde(default)]
    pub previous: Option<f64>,
    #[serde(default)]
    pub current: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumption {
    #[serde(default)]
    pub readings: MeterReadings,
    pub total_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeItem {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub net_current_demand: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub subsidy: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub arrears: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub adjustments: f64,
    pub total_payable: f64,
}

/// Bill totals; unknown keys the parser adds are kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub cost: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    #[serde(default)]
    pub plan_code: Option<String>,
    #[serde(default)]
    pub slabs: Vec<TariffSlab>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffSlab {
    pub description: String,
    pub rate: f64,
}

impl NormalizedBill {
    /// Parse and validate a JSON value produced by the AI parser
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let bill: Self = serde_json::from_value(value)
            .map_err(|e| Error::InvalidData(format!("Bill does not match schema: {}", e)))?;
        bill.validate()?;
        Ok(bill)
    }

    /// Check the fields the rest of the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.discom.trim().is_empty() {
            return Err(Error::InvalidData("discom is empty".to_string()));
        }
        if self.account.consumer_id.trim().is_empty() {
            return Err(Error::InvalidData("account.consumer_id is empty".to_string()));
        }
        if self.period.end <= self.period.start {
            return Err(Error::InvalidData(format!(
                "period end {} is not after start {}",
                self.period.end, self.period.start
            )));
        }
        if !self.consumption.total_kwh.is_finite() || self.consumption.total_kwh < 0.0 {
            return Err(Error::InvalidData(
                "consumption.total_kwh must be a non-negative number".to_string(),
            ));
        }
        if !self.totals.cost.is_finite() || self.totals.cost < 0.0 {
            return Err(Error::InvalidData(
                "totals.cost must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_bill_json() -> serde_json::Value {
    serde_json::json!({
        "version": "1.1",
        "discom": "BESCOM",
        "account": { "consumer_id": "1234567890", "meter_id": "M-42", "name": "A. Kumar" },
        "period": { "start": "2024-01-01", "end": "2024-01-31", "due_date": "2024-02-15" },
        "technical_details": { "sanctioned_load_kw": 3 },
        "consumption": { "readings": { "previous": 10500.0, "current": 10750.0 }, "total_kwh": 250.0 },
        "charges_breakdown": [
            { "name": "Energy Charges", "amount": 1650.0 },
            { "name": "Fixed Charges", "amount": 250.0 }
        ],
        "billing_summary": { "net_current_demand": 1900.0, "total_payable": 1900.0 },
        "totals": { "cost": 1900.0, "currency": "INR", "rounded": true },
        "tariff": { "plan_code": "LT-2a", "slabs": [ { "description": "0-100 kWh", "rate": 4.15 } ] }
    })
}
