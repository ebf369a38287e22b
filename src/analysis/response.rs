//! Turning raw model output into an [`AnalysisResult`]

use crate::analysis::error::AnalysisError;
use crate::models::{AnalysisIssue, AnalysisResult, Severity};
use serde_json::Value;

/// Remove markdown code fences the model sometimes wraps its JSON in
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json\n", "")
        .replace("```json", "")
        .replace("```\n", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse and validate model output. Requires a numeric `overallScore` and
/// an array `issues`; everything else is normalized leniently.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let cleaned = strip_code_fences(text);
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| AnalysisError::MalformedJson(e.to_string()))?;

    if !value["overallScore"].is_number() || !value["issues"].is_array() {
        return Err(AnalysisError::MissingFields);
    }

    Ok(AnalysisResult {
        overall_score: score(&value["overallScore"]),
        cleanliness: score(&value["cleanliness"]),
        organization: score(&value["organization"]),
        safety: score(&value["safety"]),
        assessment: value["assessment"].as_str().unwrap_or_default().to_string(),
        issues: value["issues"]
            .as_array()
            .map(|issues| issues.iter().filter_map(issue).collect())
            .unwrap_or_default(),
        recommendations: value["recommendations"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// Clamp a number (or numeric string) into 0..=100
fn score(value: &Value) -> u8 {
    let number = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .unwrap_or(0.0);
    number.round().clamp(0.0, 100.0) as u8
}

fn issue(value: &Value) -> Option<AnalysisIssue> {
    let object = value.as_object()?;
    Some(AnalysisIssue {
        issue_type: object
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("General")
            .to_string(),
        description: object
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        severity: object
            .get("severity")
            .and_then(Value::as_str)
            .map(Severity::from_label)
            .unwrap_or(Severity::Medium),
        confidence: object.get("confidence").map(score).unwrap_or(0),
    })
}
