//! Roof geometry as segmented by the vision model.
//!
//! Coordinates are normalized to a 0–1000 grid over the source image.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AnalysisError;

/// Upper bound of the normalized coordinate grid.
pub const COORDINATE_MAX: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn in_bounds(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && (0.0..=COORDINATE_MAX).contains(&self.x)
            && (0.0..=COORDINATE_MAX).contains(&self.y)
    }
}

/// A single planar roof surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub id: String,
    /// Closed ring; the last point connects back to the first.
    pub points: Vec<Point>,
    /// Degrees from horizontal, `None` when the model did not report one.
    pub pitch: Option<f64>,
    /// Compass degrees the facet faces.
    pub azimuth: Option<f64>,
}

impl Facet {
    /// Pitch used for area math; a missing pitch counts as flat.
    pub fn effective_pitch(&self) -> f64 {
        self.pitch.unwrap_or(0.0)
    }
}

/// Drop repeated consecutive vertices and an explicit closing vertex, leaving
/// each corner of the ring exactly once.
pub fn open_ring(points: &[Point]) -> Vec<Point> {
    let mut ring: Vec<Point> = Vec::with_capacity(points.len());
    for &point in points {
        if ring.last() != Some(&point) {
            ring.push(point);
        }
    }
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    ring
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Ridge,
    Hip,
    Valley,
    Eave,
    Rake,
}

impl EdgeType {
    pub const ALL: [EdgeType; 5] = [
        EdgeType::Ridge,
        EdgeType::Hip,
        EdgeType::Valley,
        EdgeType::Eave,
        EdgeType::Rake,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Ridge => "ridge",
            EdgeType::Hip => "hip",
            EdgeType::Valley => "valley",
            EdgeType::Eave => "eave",
            EdgeType::Rake => "rake",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ridge" => Ok(EdgeType::Ridge),
            "hip" => Ok(EdgeType::Hip),
            "valley" => Ok(EdgeType::Valley),
            "eave" => Ok(EdgeType::Eave),
            "rake" => Ok(EdgeType::Rake),
            _ => Err(AnalysisError::UnknownEdgeType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub start: Point,
    pub end: Point,
}

impl LineSegment {
    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstructionType {
    Chimney,
    Vent,
    Skylight,
    Hvac,
    Other,
}

impl ObstructionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chimney" => Some(Self::Chimney),
            "vent" => Some(Self::Vent),
            "skylight" => Some(Self::Skylight),
            "hvac" => Some(Self::Hvac),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point,
    pub max: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstruction {
    #[serde(rename = "type")]
    pub obstruction_type: ObstructionType,
    #[serde(rename = "boundingBox")]
    pub bounding_box: BoundingBox,
}

/// The complete output of one extraction call.
///
/// Never mutated after construction; re-analysis replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometricAnalysis {
    pub facets: Vec<Facet>,
    pub lines: Vec<LineSegment>,
    pub obstructions: Vec<Obstruction>,
}

impl GeometricAnalysis {
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty() && self.lines.is_empty() && self.obstructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_parsing() {
        assert_eq!("Ridge".parse::<EdgeType>().unwrap(), EdgeType::Ridge);
        assert_eq!(" valley ".parse::<EdgeType>().unwrap(), EdgeType::Valley);

        let err = "gutter".parse::<EdgeType>().unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownEdgeType(ref t) if t == "gutter"));
    }

    #[test]
    fn test_open_ring_drops_closing_and_repeated_vertices() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(0.0, 0.0),
        ];
        assert_eq!(
            open_ring(&square),
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ]
        );

        let collapsed = [Point::new(5.0, 5.0); 4];
        assert_eq!(open_ring(&collapsed), vec![Point::new(5.0, 5.0)]);
        assert!(open_ring(&[]).is_empty());
    }

    #[test]
    fn test_point_bounds() {
        assert!(Point::new(0.0, 1000.0).in_bounds());
        assert!(!Point::new(-0.5, 10.0).in_bounds());
        assert!(!Point::new(10.0, 1000.1).in_bounds());
        assert!(!Point::new(f64::NAN, 10.0).in_bounds());
    }

    #[test]
    fn test_serialized_shape_matches_wire_names() {
        let analysis = GeometricAnalysis {
            facets: vec![],
            lines: vec![LineSegment {
                edge_type: EdgeType::Eave,
                start: Point::new(0.0, 0.0),
                end: Point::new(3.0, 4.0),
            }],
            obstructions: vec![Obstruction {
                obstruction_type: ObstructionType::Hvac,
                bounding_box: BoundingBox {
                    min: Point::new(1.0, 1.0),
                    max: Point::new(2.0, 2.0),
                },
            }],
        };

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["lines"][0]["type"], "eave");
        assert_eq!(json["obstructions"][0]["type"], "hvac");
        assert!(json["obstructions"][0]["boundingBox"]["min"].is_object());
        assert_eq!(analysis.lines[0].length(), 5.0);
    }
}
