//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap their JSON in markdown fences or add a sentence before
//! or after it, even when asked not to.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::insights::Recommendation;
use crate::normalized::NormalizedBill;

fn truncate(raw: &str) -> String {
    if raw.chars().count() > 200 {
        format!("{}...", raw.chars().take(200).collect::<String>())
    } else {
        raw.to_string()
    }
}

/// Remove ```json / ``` fences around a payload
pub fn strip_code_fences(response: &str) -> &str {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // drop the language tag on the opening fence
        text = match rest.find('\n') {
            Some(i) => &rest[i + 1..],
            None => rest.trim_start_matches("json"),
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Find the outermost balanced JSON object in a response
///
/// Braces inside string literals are ignored.
pub fn extract_json_object(response: &str) -> Result<&str> {
    let text = strip_code_fences(response);
    let start = text.find('{').ok_or_else(|| {
        Error::Ai(format!("No JSON found in AI response | Raw: {}", truncate(text)))
    })?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    Err(Error::Ai(format!(
        "Unterminated JSON in AI response | Raw: {}",
        truncate(text)
    )))
}

/// Parse an extraction response into a validated bill
pub fn parse_normalized_bill(response: &str) -> Result<NormalizedBill> {
    let json_str = extract_json_object(response)?;
    let value: serde_json::Value = serde_json::from_str(json_str).map_err(|e| {
        Error::Ai(format!("Invalid JSON from AI: {} | Raw: {}", e, truncate(json_str)))
    })?;
    NormalizedBill::from_value(value)
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    recommendations: Vec<Recommendation>,
}

/// Parse a recommendations response
///
/// Accepts `{"recommendations": [...]}` or a bare array.
pub fn parse_recommendations(response: &str) -> Result<Vec<Recommendation>> {
    let text = strip_code_fences(response);
    if text.starts_with('[') {
        return serde_json::from_str(text)
            .map_err(|e| Error::Ai(format!("Invalid recommendations JSON: {}", e)));
    }
    let json_str = extract_json_object(text)?;
    let parsed: RecommendationsResponse = serde_json::from_str(json_str)
        .map_err(|e| Error::Ai(format!("Invalid recommendations JSON: {}", e)))?;
    Ok(parsed.recommendations)
}
