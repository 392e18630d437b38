//! Imagery metadata and data-quality assessment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::measurements::GroundScale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageryQuality {
    High,
    Medium,
    Low,
    Base,
    Unknown,
}

impl ImageryQuality {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Self::High,
            "MEDIUM" => Self::Medium,
            "LOW" => Self::Low,
            "BASE" => Self::Base,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Base => "BASE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Geospatial facts about the image, supplied by the caller alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageryMetadata {
    pub image_url: String,
    pub ground_scale: GroundScale,
    pub quality: ImageryQuality,
    pub captured_on: Option<NaiveDate>,
}

/// A single reason the confidence score was reduced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityConcern {
    StaleImagery { age_days: i64 },
    MissingImageryDate,
    ReducedImageryQuality { quality: ImageryQuality },
    TooFewFacets { facet_count: usize },
    MissingPitch { facet_ids: Vec<String> },
    ImplausibleMultiplier { multiplier: f64 },
}

impl QualityConcern {
    /// Points removed from the confidence score.
    pub fn deduction(&self) -> u8 {
        match self {
            Self::StaleImagery { .. } => 15,
            Self::MissingImageryDate => 5,
            Self::ReducedImageryQuality { quality } => match quality {
                ImageryQuality::High => 0,
                ImageryQuality::Medium => 10,
                _ => 20,
            },
            Self::TooFewFacets { .. } => 25,
            Self::MissingPitch { .. } => 20,
            Self::ImplausibleMultiplier { .. } => 20,
        }
    }

    /// Geometry concerns force field verification regardless of score.
    pub fn is_geometric(&self) -> bool {
        matches!(
            self,
            Self::TooFewFacets { .. } | Self::MissingPitch { .. } | Self::ImplausibleMultiplier { .. }
        )
    }

    pub fn note(&self) -> String {
        match self {
            Self::StaleImagery { age_days } => format!(
                "Imagery is {age_days} days old; the roof may have changed since capture."
            ),
            Self::MissingImageryDate => "Imagery capture date is unknown.".to_string(),
            Self::ReducedImageryQuality { quality } => format!(
                "Imagery quality is {}. HIGH quality recommended for exact material orders.",
                quality.as_str()
            ),
            Self::TooFewFacets { facet_count } => format!(
                "Only {facet_count} facet(s) detected; the building model may be incomplete."
            ),
            Self::MissingPitch { facet_ids } => format!(
                "No pitch reported for facet(s) {}; treated as flat.",
                facet_ids.join(", ")
            ),
            Self::ImplausibleMultiplier { multiplier } => format!(
                "Area multiplier {multiplier:.3} is outside the plausible range."
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub imagery_quality: ImageryQuality,
    pub imagery_date: Option<NaiveDate>,
    /// 0–100.
    pub confidence_score: u8,
    pub field_verification_recommended: bool,
    pub concerns: Vec<QualityConcern>,
    pub notes: Vec<String>,
}
