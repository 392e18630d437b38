//! The result set owned by one report record.

use serde::{Deserialize, Serialize};

use crate::domain::estimate::MaterialEstimate;
use crate::domain::geometry::GeometricAnalysis;
use crate::domain::measurements::{AreaFigures, EdgeTotals};
use crate::domain::narrative::NarrativeReport;
use crate::domain::quality::DataQuality;

/// Everything a successful attempt persists, written as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResults {
    pub analysis: GeometricAnalysis,
    pub areas: AreaFigures,
    pub edges: EdgeTotals,
    pub estimate: MaterialEstimate,
    pub quality: DataQuality,
    pub narrative: Option<NarrativeReport>,
}
