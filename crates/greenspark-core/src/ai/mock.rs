//! Mock backend for testing
//!
//! Returns a fixed, valid bill for every document and a configurable list
//! of recommendations. Useful for unit tests and for running the pipeline
//! without an API key.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::insights::Recommendation;
use crate::normalized::NormalizedBill;

use super::AIBackend;

/// Bill returned by the mock parser
pub fn mock_bill_json() -> serde_json::Value {
    serde_json::json!({
        "version": "1.1",
        "discom": "MSEDCL",
        "account": { "consumer_id": "170012345678", "meter_id": "MH-0091", "name": "Mock Consumer" },
        "period": { "start": "2024-02-01", "end": "2024-02-29", "bill_date": "2024-03-02", "due_date": "2024-03-20" },
        "consumption": { "readings": { "previous": 8120.0, "current": 8440.0 }, "total_kwh": 320.0 },
        "charges_breakdown": [
            { "name": "Energy Charge", "amount": 2240.0 },
            { "name": "Fixed Charge", "amount": 320.0 }
        ],
        "billing_summary": { "net_current_demand": 2560.0, "subsidy": 0.0, "arrears": 0.0, "adjustments": 0.0, "total_payable": 2560.0 },
        "totals": { "cost": 2560.0, "currency": "INR" },
        "tariff": { "plan_code": "LT-I(B)", "slabs": [ { "description": "101-300 kWh", "rate": 7.0 } ] }
    })
}

/// Mock AI backend for testing
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    bill: serde_json::Value,
    recommendations: Vec<Recommendation>,
    fail: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            bill: mock_bill_json(),
            recommendations: Vec::new(),
            fail: false,
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Every call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Return this document from `parse_bill`
    pub fn with_bill(mut self, bill: serde_json::Value) -> Self {
        self.bill = bill;
        self
    }

    /// Return these from `generate_recommendations`
    pub fn with_recommendations(mut self, recommendations: Vec<Recommendation>) -> Self {
        self.recommendations = recommendations;
        self
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn parse_bill(&self, data: &[u8], _mime_type: &str) -> Result<NormalizedBill> {
        if self.fail {
            return Err(Error::Ai("mock backend configured to fail".to_string()));
        }
        if data.is_empty() {
            return Err(Error::Ai("empty document".to_string()));
        }
        NormalizedBill::from_value(self.bill.clone())
    }

    async fn generate_recommendations(
        &self,
        _context: &serde_json::Value,
    ) -> Result<Vec<Recommendation>> {
        if self.fail {
            return Err(Error::Ai("mock backend configured to fail".to_string()));
        }
        Ok(self.recommendations.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_parse_bill() {
        let backend = MockBackend::new();
        let bill = backend.parse_bill(b"%PDF-1.4", "application/pdf").await.unwrap();
        assert_eq!(bill.discom, "MSEDCL");
        assert_eq!(bill.consumption.total_kwh, 320.0);
    }

    #[tokio::test]
    async fn test_mock_rejects_invalid_bill() {
        let backend = MockBackend::new().with_bill(serde_json::json!({"discom": ""}));
        assert!(backend.parse_bill(b"x", "application/pdf").await.is_err());
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let backend = MockBackend::failing();
        assert!(backend.parse_bill(b"x", "application/pdf").await.is_err());
        assert!(backend
            .generate_recommendations(&serde_json::json!({}))
            .await
            .is_err());
    }
}
