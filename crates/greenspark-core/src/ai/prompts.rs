//! Prompts sent to the generative model

/// Marker the mock server uses to tell extraction requests apart
pub const EXTRACTION_MARKER: &str = "Indian electricity bill";

/// Bill field extraction
pub const BILL_EXTRACTION_PROMPT: &str = r#"You are an expert document analysis AI. Analyze the provided image or PDF of an Indian electricity bill and extract the key information into a structured JSON format.

The required JSON output schema is:
{
  "version": "1.1",
  "discom": "Name of the electricity provider",
  "account": {
    "consumer_id": "The Consumer or Account ID",
    "meter_id": "The Meter Number (if available)",
    "name": "The name on the bill",
    "address": "The service address on the bill"
  },
  "period": {
    "start": "YYYY-MM-DD",
    "end": "YYYY-MM-DD",
    "bill_date": "YYYY-MM-DD",
    "due_date": "YYYY-MM-DD"
  },
  "technical_details": {"sanctioned_load_kw": 3.0, "connection_type": "LT-2a"},
  "consumption": {
    "readings": {"previous": 1234.0, "current": 1345.0},
    "total_kwh": 111.0
  },
  "charges_breakdown": [
    {"name": "Fixed Charge", "amount": 150.0},
    {"name": "Energy Charge", "amount": 800.50}
  ],
  "billing_summary": {
    "net_current_demand": 1200.0,
    "subsidy": 0.0,
    "arrears": 0.0,
    "adjustments": 0.0,
    "total_payable": 1200.0
  },
  "totals": {"cost": 1200.0, "currency": "INR"},
  "tariff": {
    "plan_code": "The tariff plan code/name",
    "slabs": [
      {"description": "0-100 kWh", "rate": 3.50},
      {"description": "101-200 kWh", "rate": 5.50}
    ]
  }
}

List every charge on the bill in charges_breakdown. Use null for values that are not printed on the bill.

Analyze the document and provide ONLY the JSON object. Do not include any explanatory text or markdown formatting."#;

/// Marker the mock server uses to tell recommendation requests apart
pub const RECOMMENDATIONS_MARKER: &str = "energy efficiency advisor";

/// Recommendation generation from a bill context
pub fn recommendations_prompt(context: &serde_json::Value) -> String {
    format!(
        r#"You are an energy efficiency advisor for Indian households. Based on the electricity bill context below, suggest up to five concrete ways this household can reduce consumption.

Context:
{}

Respond with ONLY a JSON object of the form:
{{"recommendations": [{{"id": "short-slug", "title": "...", "description": "...", "potential_savings_kwh": 0.0, "potential_savings_cost": 0.0, "priority": "high|medium|low", "difficulty": "easy|medium|hard", "action_type": "behavioral|upgrade|maintenance"}}]}}

Savings are per billing period and must be consistent with the bill's price per kWh."#,
        serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_carry_markers() {
        assert!(BILL_EXTRACTION_PROMPT.contains(EXTRACTION_MARKER));
        let prompt = recommendations_prompt(&serde_json::json!({"kpis": {"kwh_total": 320.0}}));
        assert!(prompt.contains(RECOMMENDATIONS_MARKER));
        assert!(prompt.contains("\"kwh_total\": 320.0"));
    }
}
