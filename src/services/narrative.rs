//! Narrative assessment from aggregate roof numbers.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::Write;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::GeminiCapability;
use crate::domain::narrative::{NarrativeReport, SolarSummary};
use crate::error::{AnalysisError, AnalysisResult, Service};
use crate::services::gemini::{
    strip_code_fence, Content, GeminiClient, GenerateContentRequest, GenerationConfig, Part,
};

pub const MAX_SUMMARY_WORDS: usize = 80;

/// Anything that can turn a [`SolarSummary`] into a narrative report.
///
/// `Ok(None)` means no text capability is configured.
#[async_trait]
pub trait NarrativeSource: Send + Sync {
    async fn generate(&self, summary: &SolarSummary) -> AnalysisResult<Option<NarrativeReport>>;
}

pub struct NarrativeReporter {
    gemini: Option<GeminiClient>,
    timeout: Duration,
}

impl NarrativeReporter {
    pub fn new(http: Client, capability: Option<GeminiCapability>, timeout: Duration) -> Self {
        Self {
            gemini: capability.map(|c| GeminiClient::new(http, c)),
            timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gemini.is_some()
    }
}

#[async_trait]
impl NarrativeSource for NarrativeReporter {
    #[instrument(skip_all, fields(segments = summary.segments.len()))]
    async fn generate(&self, summary: &SolarSummary) -> AnalysisResult<Option<NarrativeReport>> {
        let Some(gemini) = &self.gemini else {
            info!("No model capability configured; skipping narrative");
            return Ok(None);
        };

        let request = GenerateContentRequest {
            system_instruction: None,
            contents: vec![Content::user(vec![Part::Text(build_prompt(summary))])],
            generation_config: GenerationConfig::json(),
        };
        let payload = gemini
            .generate(Service::Narrative, &request, self.timeout)
            .await?;
        let report = parse_narrative(&payload)?;

        info!(difficulty = report.difficulty_score, "Generated narrative report");
        Ok(Some(report))
    }
}

/// One free-text prompt carrying the numeric summary.
pub fn build_prompt(summary: &SolarSummary) -> String {
    let mut prompt = String::from(
        "You are an experienced roofing contractor. Assess this roof from the \
         measurements below.\n\n",
    );

    let _ = writeln!(prompt, "Total roof area: {:.0} sq ft", summary.total_area_sqft);
    let _ = writeln!(
        prompt,
        "Maximum sunshine: {:.0} hours per year",
        summary.max_sunshine_hours_per_year
    );
    let _ = writeln!(prompt, "Roof segments: {}", summary.segments.len());
    for (i, segment) in summary.segments.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "  Segment {}: pitch {:.1} degrees, facing {:.0} degrees, {:.0} sq ft",
            i + 1,
            segment.pitch_degrees,
            segment.azimuth_degrees,
            segment.area_sqft
        );
    }

    prompt.push_str(
        "\nRespond with a JSON object with exactly these keys:\n\
         - \"summary\": a plain-language assessment of the roof, at most 80 words\n\
         - \"materialSuggestion\": the roofing material you would recommend and why\n\
         - \"difficultyScore\": an integer from 1 (easy) to 10 (very difficult)\n\
         - \"estimatedCostRange\": a replacement cost range such as \"$12,000 - $16,000\"\n",
    );
    prompt
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNarrative {
    summary: Option<String>,
    material_suggestion: Option<String>,
    difficulty_score: Option<serde_json::Value>,
    estimated_cost_range: Option<String>,
}

fn required(field: &str, value: Option<String>) -> AnalysisResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AnalysisError::MalformedNarrative(format!("missing or empty {field}")))
}

/// Parse and validate the model's narrative payload.
pub fn parse_narrative(payload: &str) -> AnalysisResult<NarrativeReport> {
    let raw: RawNarrative = serde_json::from_str(strip_code_fence(payload)).map_err(|e| {
        AnalysisError::MalformedNarrative(format!("payload is not a valid narrative object: {e}"))
    })?;

    let difficulty_score = raw
        .difficulty_score
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .filter(|d| (1..=10).contains(d))
        .ok_or_else(|| {
            AnalysisError::MalformedNarrative(format!(
                "difficultyScore must be an integer from 1 to 10, got {}",
                raw.difficulty_score
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "nothing".to_string())
            ))
        })? as u8;

    let summary = required("summary", raw.summary)?;
    let words = summary.split_whitespace().count();
    if words > MAX_SUMMARY_WORDS {
        warn!(words, "Narrative summary exceeds word limit");
    }

    Ok(NarrativeReport {
        summary,
        material_suggestion: required("materialSuggestion", raw.material_suggestion)?,
        difficulty_score,
        estimated_cost_range: required("estimatedCostRange", raw.estimated_cost_range)?,
    })
}
