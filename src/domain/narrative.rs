//! Narrative assessment types.

use serde::{Deserialize, Serialize};

/// One roof segment as reported by the solar/geospatial provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub pitch_degrees: f64,
    pub azimuth_degrees: f64,
    pub area_sqft: f64,
}

/// Aggregate numbers handed to the text model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarSummary {
    pub total_area_sqft: f64,
    pub max_sunshine_hours_per_year: f64,
    pub segments: Vec<SegmentSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeReport {
    pub summary: String,
    pub material_suggestion: String,
    /// 1–10.
    pub difficulty_score: u8,
    pub estimated_cost_range: String,
}
