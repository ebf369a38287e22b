//! Wire types shared by the analysis wrapper and the HTTP layer

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Issue type used by the synthetic entry of a fallback result
pub const ANALYSIS_ERROR_TYPE: &str = "Analysis Error";

/// Severity of an inspection finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a severity label case-insensitively; unknown labels map to Medium
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        };
        f.write_str(label)
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Severity::from_label(&label))
    }
}

/// One finding reported by the inspector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisIssue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub description: String,
    pub severity: Severity,
    /// 0-100
    pub confidence: u8,
}

/// Result of a hygiene analysis. Always well-formed, including on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub overall_score: u8,
    pub cleanliness: u8,
    pub organization: u8,
    pub safety: u8,
    pub assessment: String,
    pub issues: Vec<AnalysisIssue>,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    /// Degraded result returned when analysis ultimately fails
    pub fn fallback(message: &str) -> Self {
        Self {
            overall_score: 0,
            cleanliness: 0,
            organization: 0,
            safety: 0,
            assessment: "AI analysis failed. Please check the image or system logs.".to_string(),
            issues: vec![AnalysisIssue {
                issue_type: ANALYSIS_ERROR_TYPE.to_string(),
                description: format!("Failed to analyze image. Error: {}", message),
                severity: Severity::Critical,
                confidence: 100,
            }],
            recommendations: vec![
                "Retry analysis".to_string(),
                "Check AI service status".to_string(),
            ],
        }
    }

    /// True for results produced by [`AnalysisResult::fallback`]
    pub fn is_fallback(&self) -> bool {
        self.overall_score == 0
            && self
                .issues
                .first()
                .is_some_and(|issue| issue.issue_type == ANALYSIS_ERROR_TYPE)
    }
}
