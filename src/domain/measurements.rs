//! Measurements derived from a geometric analysis.

use serde::{Deserialize, Serialize};

use crate::domain::geometry::EdgeType;
use crate::error::AnalysisError;

pub const SQFT_PER_SQM: f64 = 10.7639;

/// Ground distance covered by one normalized coordinate unit.
///
/// Comes from the geospatial metadata that accompanies the image, never from
/// the vision model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct GroundScale {
    feet_per_unit: f64,
}

impl GroundScale {
    pub fn from_feet_per_unit(feet_per_unit: f64) -> Result<Self, AnalysisError> {
        if !feet_per_unit.is_finite() || feet_per_unit <= 0.0 {
            return Err(AnalysisError::DegenerateGeometry(format!(
                "ground scale must be a positive number of feet per unit, got {feet_per_unit}"
            )));
        }
        Ok(Self { feet_per_unit })
    }

    pub fn from_meters_per_unit(meters_per_unit: f64) -> Result<Self, AnalysisError> {
        Self::from_feet_per_unit(meters_per_unit * SQFT_PER_SQM.sqrt())
    }

    pub fn feet_per_unit(&self) -> f64 {
        self.feet_per_unit
    }

    pub fn length_ft(&self, units: f64) -> f64 {
        units * self.feet_per_unit
    }

    pub fn area_sqft(&self, square_units: f64) -> f64 {
        square_units * self.feet_per_unit * self.feet_per_unit
    }
}

impl TryFrom<f64> for GroundScale {
    type Error = AnalysisError;

    fn try_from(feet_per_unit: f64) -> Result<Self, Self::Error> {
        Self::from_feet_per_unit(feet_per_unit)
    }
}

impl From<GroundScale> for f64 {
    fn from(scale: GroundScale) -> f64 {
        scale.feet_per_unit
    }
}

/// Summed plan length per edge type, in feet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgeTotals {
    pub ridge_ft: f64,
    pub hip_ft: f64,
    pub valley_ft: f64,
    pub eave_ft: f64,
    pub rake_ft: f64,
}

impl EdgeTotals {
    pub fn add(&mut self, edge_type: EdgeType, length_ft: f64) {
        match edge_type {
            EdgeType::Ridge => self.ridge_ft += length_ft,
            EdgeType::Hip => self.hip_ft += length_ft,
            EdgeType::Valley => self.valley_ft += length_ft,
            EdgeType::Eave => self.eave_ft += length_ft,
            EdgeType::Rake => self.rake_ft += length_ft,
        }
    }

    pub fn get(&self, edge_type: EdgeType) -> f64 {
        match edge_type {
            EdgeType::Ridge => self.ridge_ft,
            EdgeType::Hip => self.hip_ft,
            EdgeType::Valley => self.valley_ft,
            EdgeType::Eave => self.eave_ft,
            EdgeType::Rake => self.rake_ft,
        }
    }

    pub fn total_ft(&self) -> f64 {
        EdgeType::ALL.iter().map(|t| self.get(*t)).sum()
    }

    pub fn hip_and_valley_ft(&self) -> f64 {
        self.hip_ft + self.valley_ft
    }
}

/// Per-facet breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetMeasurement {
    pub id: String,
    pub footprint_sqft: f64,
    pub true_area_sqft: f64,
    pub pitch_degrees: f64,
    pub pitch_ratio: String,
    pub azimuth_degrees: Option<f64>,
    pub direction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaFigures {
    pub footprint_sqft: f64,
    pub footprint_sqm: f64,
    pub true_area_sqft: f64,
    pub true_area_sqm: f64,
    /// `true_area_sqft / footprint_sqft`, never below 1.0.
    pub area_multiplier: f64,
    /// Pitch of the largest facet.
    pub pitch_degrees: f64,
    /// Pitch of the largest facet as "rise:12".
    pub pitch_ratio: String,
    /// Mean pitch weighted by true area.
    pub weighted_pitch_degrees: f64,
    pub facets: Vec<FacetMeasurement>,
}

/// Everything the deriver produces from one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedGeometry {
    pub areas: AreaFigures,
    pub edges: EdgeTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_scale_rejects_non_positive() {
        assert!(GroundScale::from_feet_per_unit(0.0).is_err());
        assert!(GroundScale::from_feet_per_unit(-1.0).is_err());
        assert!(GroundScale::from_feet_per_unit(f64::INFINITY).is_err());

        let scale = GroundScale::from_feet_per_unit(0.5).unwrap();
        assert_eq!(scale.length_ft(10.0), 5.0);
        assert_eq!(scale.area_sqft(100.0), 25.0);
    }

    #[test]
    fn test_ground_scale_deserialize_validates() {
        let scale: GroundScale = serde_json::from_str("0.25").unwrap();
        assert_eq!(scale.feet_per_unit(), 0.25);
        assert!(serde_json::from_str::<GroundScale>("0").is_err());
        assert_eq!(serde_json::to_string(&scale).unwrap(), "0.25");
    }

    #[test]
    fn test_meters_conversion() {
        let scale = GroundScale::from_meters_per_unit(1.0).unwrap();
        assert!((scale.feet_per_unit() - 3.2808).abs() < 1e-3);
    }

    #[test]
    fn test_edge_totals_accumulate() {
        let mut totals = EdgeTotals::default();
        totals.add(EdgeType::Hip, 10.0);
        totals.add(EdgeType::Hip, 5.0);
        totals.add(EdgeType::Valley, 2.5);
        totals.add(EdgeType::Eave, 40.0);

        assert_eq!(totals.hip_ft, 15.0);
        assert_eq!(totals.hip_and_valley_ft(), 17.5);
        assert_eq!(totals.total_ft(), 57.5);
    }
}
