//! Confidence scoring and the field-verification recommendation.

use chrono::NaiveDate;

use crate::domain::geometry::GeometricAnalysis;
use crate::domain::measurements::AreaFigures;
use crate::domain::quality::{DataQuality, ImageryMetadata, ImageryQuality, QualityConcern};

pub const VERIFICATION_THRESHOLD: u8 = 70;
pub const IMAGERY_FRESHNESS_DAYS: i64 = 3 * 365;
pub const MIN_FACET_COUNT: usize = 3;
pub const MAX_PLAUSIBLE_MULTIPLIER: f64 = 2.5;

/// Collect every data-quality concern for a derived analysis.
pub fn find_concerns(
    analysis: &GeometricAnalysis,
    areas: &AreaFigures,
    imagery: &ImageryMetadata,
    as_of: NaiveDate,
) -> Vec<QualityConcern> {
    let mut concerns = Vec::new();

    match imagery.captured_on {
        Some(captured_on) => {
            let age_days = (as_of - captured_on).num_days();
            if age_days > IMAGERY_FRESHNESS_DAYS {
                concerns.push(QualityConcern::StaleImagery { age_days });
            }
        }
        None => concerns.push(QualityConcern::MissingImageryDate),
    }

    if imagery.quality != ImageryQuality::High {
        concerns.push(QualityConcern::ReducedImageryQuality {
            quality: imagery.quality,
        });
    }

    if analysis.facets.len() < MIN_FACET_COUNT {
        concerns.push(QualityConcern::TooFewFacets {
            facet_count: analysis.facets.len(),
        });
    }

    let missing_pitch: Vec<String> = analysis
        .facets
        .iter()
        .filter(|f| f.pitch.is_none())
        .map(|f| f.id.clone())
        .collect();
    if !missing_pitch.is_empty() {
        concerns.push(QualityConcern::MissingPitch {
            facet_ids: missing_pitch,
        });
    }

    if areas.area_multiplier > MAX_PLAUSIBLE_MULTIPLIER {
        concerns.push(QualityConcern::ImplausibleMultiplier {
            multiplier: areas.area_multiplier,
        });
    }

    concerns
}

/// Score concerns: start at 100, deduct, clamp to [0, 100].
pub fn score(concerns: Vec<QualityConcern>, imagery: &ImageryMetadata) -> DataQuality {
    let deducted: u32 = concerns.iter().map(|c| u32::from(c.deduction())).sum();
    let confidence_score = 100u32.saturating_sub(deducted).min(100) as u8;

    let geometric = concerns.iter().any(QualityConcern::is_geometric);
    let field_verification_recommended = confidence_score < VERIFICATION_THRESHOLD || geometric;

    DataQuality {
        imagery_quality: imagery.quality,
        imagery_date: imagery.captured_on,
        confidence_score,
        field_verification_recommended,
        notes: concerns.iter().map(QualityConcern::note).collect(),
        concerns,
    }
}

pub fn assess_quality(
    analysis: &GeometricAnalysis,
    areas: &AreaFigures,
    imagery: &ImageryMetadata,
    as_of: NaiveDate,
) -> DataQuality {
    let quality = score(find_concerns(analysis, areas, imagery, as_of), imagery);

    if quality.field_verification_recommended {
        tracing::info!(
            confidence = quality.confidence_score,
            concerns = quality.concerns.len(),
            "Field verification recommended"
        );
    }

    quality
}
