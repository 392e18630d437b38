//! Client for the generative model service (Gemini `generateContent`).
//!
//! One request per call, no retries. Every call carries its own timeout and
//! all failures are mapped onto [`AnalysisError`] so callers can tell which
//! stage failed.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

use crate::config::GeminiCapability;
use crate::error::{AnalysisError, Service};

/// Sampling temperature for structured extraction.
pub const DETERMINISTIC_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user"),
            parts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub response_mime_type: &'static str,
}

impl GenerationConfig {
    /// Low temperature, JSON-only output.
    pub fn json() -> Self {
        Self {
            temperature: DETERMINISTIC_TEMPERATURE,
            response_mime_type: "application/json",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Pull the text payload out of a `generateContent` response body.
pub fn extract_text(service: Service, body: &str) -> Result<String, AnalysisError> {
    let envelope: GenerateContentResponse = serde_json::from_str(body).map_err(|e| {
        malformed(service, format!("response envelope is not valid JSON: {e}"))
    })?;

    let text: String = envelope
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse { service });
    }
    Ok(text)
}

pub(crate) fn malformed(service: Service, message: String) -> AnalysisError {
    match service {
        Service::Vision => AnalysisError::MalformedAnalysis(message),
        Service::Narrative => AnalysisError::MalformedNarrative(message),
    }
}

/// Client bound to one model capability.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    capability: GeminiCapability,
}

impl GeminiClient {
    pub fn new(client: Client, capability: GeminiCapability) -> Self {
        tracing::info!(
            base_url = %capability.base_url,
            model = %capability.model,
            "Model client initialized"
        );
        Self { client, capability }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.capability.base_url.as_str().trim_end_matches('/'),
            self.capability.model
        )
    }

    /// Send one request and return the text payload of the first candidate.
    #[instrument(skip(self, request), fields(model = %self.capability.model))]
    pub async fn generate(
        &self,
        service: Service,
        request: &GenerateContentRequest,
        timeout: Duration,
    ) -> Result<String, AnalysisError> {
        let url = self.endpoint();
        debug!(url = %url, "Model service request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.capability.api_key)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(service, timeout, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(service, timeout, e))?;

        if !status.is_success() {
            error!(status = %status, service = %service, "Model service error");
            return Err(AnalysisError::Upstream {
                service,
                status: Some(status.as_u16()),
                body,
            });
        }

        extract_text(service, &body)
    }
}

fn transport_error(service: Service, timeout: Duration, e: reqwest::Error) -> AnalysisError {
    if e.is_timeout() {
        error!(service = %service, "Model service request timed out");
        return AnalysisError::timed_out(service, timeout);
    }
    error!(error = %e, service = %service, "Model service request failed");
    AnalysisError::Upstream {
        service,
        status: None,
        body: e.to_string(),
    }
}

/// Strip a Markdown code fence some models wrap JSON in.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_to_wire_shape() {
        let request = GenerateContentRequest {
            system_instruction: Some(Content::system("segment the roof")),
            contents: vec![Content::user(vec![
                Part::InlineData(InlineData {
                    mime_type: "image/png".to_string(),
                    data: "aGVsbG8=".to_string(),
                }),
                Part::Text("return JSON".to_string()),
            ])],
            generation_config: GenerationConfig::json(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "segment the roof");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json["contents"][0]["parts"][1]["text"], "return JSON");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert!(json["generationConfig"]["temperature"].as_f64().unwrap() < 0.2);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"facets\":"},{"text":"[]}"}]}}]}"#;
        assert_eq!(extract_text(Service::Vision, body).unwrap(), "{\"facets\":[]}");
    }

    #[test]
    fn test_extract_text_empty_envelope() {
        for body in [
            r#"{}"#,
            r#"{"candidates":[]}"#,
            r#"{"candidates":[{"finishReason":"SAFETY"}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"   "}]}}]}"#,
        ] {
            assert!(matches!(
                extract_text(Service::Narrative, body),
                Err(AnalysisError::EmptyResponse { service: Service::Narrative })
            ));
        }
    }

    #[test]
    fn test_extract_text_invalid_envelope() {
        assert!(matches!(
            extract_text(Service::Vision, "<html>bad gateway</html>"),
            Err(AnalysisError::MalformedAnalysis(_))
        ));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
