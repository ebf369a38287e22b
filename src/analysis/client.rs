//! Vision API clients

use crate::analysis::error::AnalysisError;
use crate::config::settings::{AnalysisConfig, API_KEY_ENV};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, warn};

/// Instructions sent alongside every image
const INSPECTOR_PROMPT: &str = r#"You are an expert hygiene and safety inspector for commercial spaces (kitchens, washrooms, etc.).
Analyze the provided image and return a JSON object with your findings.

You MUST adhere to the following JSON schema:
{
  "overallScore": "number (0-100)",
  "cleanliness": "number (0-100)",
  "organization": "number (0-100)",
  "safety": "number (0-100)",
  "assessment": "string (A brief, 1-2 sentence summary of your findings)",
  "issues": [
    {
      "type": "string (e.g., 'Surface Cleanliness', 'Organization', 'Safety Hazard', 'Contamination')",
      "description": "string (A specific description of the issue found)",
      "severity": "string ('Low', 'Medium', 'High', 'Critical')",
      "confidence": "number (0-100)"
    }
  ],
  "recommendations": [
    "string (A list of actionable recommendations based on the issues)"
  ]
}

Guidelines for your analysis:
1. Scoring:
   - 90-100 (Excellent): Near perfect, minimal issues.
   - 75-89 (Good): Generally clean, some minor areas for improvement.
   - 60-74 (Fair): Multiple issues noted that require attention.
   - 0-59 (Poor/Critical): Significant, urgent issues, potential health hazards.
2. Overall Score: This should be an average of the cleanliness, organization, and safety scores.
3. Issues: Identify 2-5 of the MOST IMPORTANT issues. If the space is excellent, list 1-2 minor maintenance or improvement points.
4. Assessment: Summarize the "why" behind the score.
5. Recommendations: Provide clear, actionable steps to fix the identified issues.

Return ONLY the JSON object. Do not include ```json or any other text."#;

/// An external image-analysis capability: image in, raw model text out
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Model identifier, for logs and the health endpoint
    fn model_name(&self) -> &str;

    /// Fails when the client cannot make any call at all (missing credentials)
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }

    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> std::result::Result<String, AnalysisError>;
}

/// Google Gemini client using the generativelanguage REST API
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_base_url: String,
}

impl GeminiClient {
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("hygiene-gateway/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            warn!("⚠️ {} is not defined. AI analysis will fail until it is set.", API_KEY_ENV);
        }

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base_url, self.model)
    }

    fn request_body(image: &[u8], mime_type: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": INSPECTOR_PROMPT },
                    { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(image) } }
                ]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        })
    }
}

#[async_trait]
impl VisionClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn ensure_configured(&self) -> Result<()> {
        match &self.api_key {
            Some(_) => Ok(()),
            None => Err(Error::MissingCredentials(API_KEY_ENV.to_string())),
        }
    }

    async fn analyze_image(&self, image: &[u8], mime_type: &str) -> std::result::Result<String, AnalysisError> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let start = Instant::now();

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&Self::request_body(image, mime_type))
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;
        debug!(status, latency_ms = start.elapsed().as_millis() as u64, model = %self.model, "Vision service responded");

        if !(200..300).contains(&status) {
            return Err(service_error(status, &body));
        }

        extract_text(&body)
    }
}

/// Build an error from the service's `{error: {message, status, details}}` body
fn service_error(status: u16, body: &str) -> AnalysisError {
    let parsed: Value = serde_json::from_str(body).unwrap_or_default();
    let error = &parsed["error"];

    let mut labels: Vec<&str> = Vec::new();
    if let Some(code) = error["status"].as_str() {
        labels.push(code);
    }
    if let Some(details) = error["details"].as_array() {
        labels.extend(details.iter().filter_map(|d| d["reason"].as_str()));
    }

    let base = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(500).collect());

    let message = if labels.is_empty() {
        base
    } else {
        format!("{} [{}]", base, labels.join(", "))
    };

    AnalysisError::Service { status, message }
}

/// Concatenate the text parts of the first candidate
fn extract_text(body: &str) -> std::result::Result<String, AnalysisError> {
    let parsed: Value =
        serde_json::from_str(body).map_err(|e| AnalysisError::MalformedJson(e.to_string()))?;

    let text: String = parsed["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = parsed["promptFeedback"]["blockReason"]
            .as_str()
            .or_else(|| parsed["candidates"][0]["finishReason"].as_str())
            .unwrap_or("no candidates");
        return Err(AnalysisError::EmptyResponse(reason.to_string()));
    }

    Ok(text)
}
