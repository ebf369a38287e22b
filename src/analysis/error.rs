//! Per-attempt failures of the vision call

use thiserror::Error;

/// Substrings marking failures that retrying cannot fix. Matched exactly as
/// written, so "Invalid JSON payload" stays retryable while an appended
/// `API_KEY_INVALID` reason does not.
const NON_RETRYABLE_MARKERS: [&str; 4] = ["API_KEY", "invalid", "quota", "permission"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("Analysis request timed out after {0}ms")]
    Timeout(u64),

    #[error("Request to vision service failed: {0}")]
    Transport(String),

    #[error("Vision service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Vision service returned no content: {0}")]
    EmptyResponse(String),

    #[error("Model output is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("Model output lacks a numeric overallScore or an issues array")]
    MissingFields,
}

impl AnalysisError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Transport(message) | AnalysisError::Service { message, .. } => {
                !has_non_retryable_marker(message)
            }
            AnalysisError::Timeout(_)
            | AnalysisError::EmptyResponse(_)
            | AnalysisError::MalformedJson(_)
            | AnalysisError::MissingFields => true,
        }
    }

    /// User-facing message embedded in the fallback result
    pub fn user_message(&self) -> String {
        let text = self.to_string().to_ascii_lowercase();
        match self {
            AnalysisError::Timeout(_) => {
                "AI analysis timed out. Please try again with a smaller image.".to_string()
            }
            AnalysisError::MalformedJson(_) | AnalysisError::MissingFields => {
                "AI returned an invalid response format.".to_string()
            }
            _ if text.contains("json") => "AI returned an invalid response format.".to_string(),
            _ if text.contains("quota") => {
                "AI service quota exceeded. Please try again later.".to_string()
            }
            other => other.to_string(),
        }
    }
}

fn has_non_retryable_marker(message: &str) -> bool {
    NON_RETRYABLE_MARKERS.iter().any(|marker| message.contains(marker))
}
