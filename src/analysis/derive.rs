//! Geometry derivation: footprint and true area, pitch ratio, edge totals.
//!
//! Pure and deterministic. Inputs are normalized coordinates plus the ground
//! scale supplied by the caller.

use crate::domain::geometry::{open_ring, Facet, GeometricAnalysis, LineSegment, Point};
use crate::domain::measurements::{
    AreaFigures, DerivedGeometry, EdgeTotals, FacetMeasurement, GroundScale, SQFT_PER_SQM,
};
use crate::error::AnalysisError;

/// Pitches at or above this have a vanishing cosine.
pub const MAX_PITCH_DEGREES: f64 = 89.9;

const CARDINALS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Derive areas and edge totals from one analysis.
pub fn derive(
    analysis: &GeometricAnalysis,
    scale: GroundScale,
) -> Result<DerivedGeometry, AnalysisError> {
    let areas = area_figures(&analysis.facets, scale)?;
    let edges = edge_totals(&analysis.lines, scale);

    tracing::debug!(
        facets = analysis.facets.len(),
        lines = analysis.lines.len(),
        footprint_sqft = areas.footprint_sqft,
        true_area_sqft = areas.true_area_sqft,
        area_multiplier = areas.area_multiplier,
        pitch_ratio = %areas.pitch_ratio,
        total_edge_ft = edges.total_ft(),
        "Derived roof geometry"
    );

    Ok(DerivedGeometry { areas, edges })
}

/// Footprint, true area and pitch figures for a set of facets.
pub fn area_figures(facets: &[Facet], scale: GroundScale) -> Result<AreaFigures, AnalysisError> {
    let mut measurements = Vec::with_capacity(facets.len());

    for facet in facets {
        let pitch = facet.effective_pitch();
        if !pitch.is_finite() || pitch < 0.0 {
            return Err(AnalysisError::DegenerateGeometry(format!(
                "facet {} has invalid pitch {pitch}",
                facet.id
            )));
        }
        if pitch >= MAX_PITCH_DEGREES {
            return Err(AnalysisError::DegenerateGeometry(format!(
                "facet {} pitch {pitch}° is too close to vertical",
                facet.id
            )));
        }
        let ring = open_ring(&facet.points);
        if ring.len() < 3 {
            return Err(AnalysisError::DegenerateGeometry(format!(
                "facet {} has {} distinct points, need at least 3",
                facet.id,
                ring.len()
            )));
        }
        if is_self_intersecting(&ring) {
            return Err(AnalysisError::DegenerateGeometry(format!(
                "facet {} polygon is self-intersecting",
                facet.id
            )));
        }

        let footprint_sqft = scale.area_sqft(polygon_area(&ring));
        if footprint_sqft <= 0.0 {
            return Err(AnalysisError::DegenerateGeometry(format!(
                "facet {} has zero area",
                facet.id
            )));
        }

        measurements.push(FacetMeasurement {
            id: facet.id.clone(),
            footprint_sqft,
            true_area_sqft: true_area_from_footprint(footprint_sqft, pitch),
            pitch_degrees: pitch,
            pitch_ratio: pitch_to_ratio(pitch),
            azimuth_degrees: facet.azimuth,
            direction: facet.azimuth.map(|a| degrees_to_cardinal(a).to_string()),
        });
    }

    let footprint_sqft: f64 = measurements.iter().map(|m| m.footprint_sqft).sum();
    let true_area_sqft: f64 = measurements.iter().map(|m| m.true_area_sqft).sum();

    if footprint_sqft <= 0.0 {
        return Err(AnalysisError::DegenerateGeometry(
            "analysis contains no roof facets".to_string(),
        ));
    }

    let area_multiplier = true_area_sqft / footprint_sqft;
    if area_multiplier < 1.0 {
        return Err(AnalysisError::DegenerateGeometry(format!(
            "area multiplier {area_multiplier} is below 1.0"
        )));
    }

    let weighted_pitch_degrees = measurements
        .iter()
        .map(|m| m.pitch_degrees * m.true_area_sqft)
        .sum::<f64>()
        / true_area_sqft;

    // Largest facet wins; ties go to the first one listed.
    let dominant = measurements
        .iter()
        .fold(None::<&FacetMeasurement>, |best, m| match best {
            Some(b) if b.footprint_sqft >= m.footprint_sqft => Some(b),
            _ => Some(m),
        });
    let pitch_degrees = dominant.map(|m| m.pitch_degrees).unwrap_or(0.0);

    Ok(AreaFigures {
        footprint_sqft,
        footprint_sqm: footprint_sqft / SQFT_PER_SQM,
        true_area_sqft,
        true_area_sqm: true_area_sqft / SQFT_PER_SQM,
        area_multiplier,
        pitch_degrees,
        pitch_ratio: pitch_to_ratio(pitch_degrees),
        weighted_pitch_degrees,
        facets: measurements,
    })
}

/// Sum plan lengths per edge type. An empty list gives all zeros.
pub fn edge_totals(lines: &[LineSegment], scale: GroundScale) -> EdgeTotals {
    lines.iter().fold(EdgeTotals::default(), |mut totals, line| {
        totals.add(line.edge_type, scale.length_ft(line.length()));
        totals
    })
}

/// Shoelace area of a closed ring, in square coordinate units.
/// Independent of winding direction.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_signed: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum();
    twice_signed.abs() / 2.0
}

/// Whether any two non-adjacent edges of the ring touch or cross.
pub fn is_self_intersecting(points: &[Point]) -> bool {
    let n = points.len();
    if n < 4 {
        return false;
    }
    let edge = |i: usize| (points[i], points[(i + 1) % n]);

    for i in 0..n {
        for j in (i + 2)..n {
            // First and last edges share the closing vertex.
            if i == 0 && j == n - 1 {
                continue;
            }
            let (a, b) = edge(i);
            let (c, d) = edge(j);
            if segments_intersect(a, b, c, d) {
                return true;
            }
        }
    }
    false
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn within_box(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);

    if ((o1 > 0.0 && o2 < 0.0) || (o1 < 0.0 && o2 > 0.0))
        && ((o3 > 0.0 && o4 < 0.0) || (o3 < 0.0 && o4 > 0.0))
    {
        return true;
    }

    (o1 == 0.0 && within_box(a, b, c))
        || (o2 == 0.0 && within_box(a, b, d))
        || (o3 == 0.0 && within_box(c, d, a))
        || (o4 == 0.0 && within_box(c, d, b))
}

/// Surface area of a plane whose horizontal projection is `footprint`.
pub fn true_area_from_footprint(footprint: f64, pitch_degrees: f64) -> f64 {
    footprint / pitch_degrees.to_radians().cos()
}

/// Contractor pitch notation: whole-inch rise per 12 of run.
pub fn pitch_to_ratio(pitch_degrees: f64) -> String {
    if pitch_degrees <= 0.0 || pitch_degrees >= 90.0 {
        return "0:12".to_string();
    }
    let rise = (12.0 * pitch_degrees.to_radians().tan()).round() as i64;
    format!("{rise}:12")
}

/// 16-point compass direction for an azimuth in degrees.
pub fn degrees_to_cardinal(degrees: f64) -> &'static str {
    let normalized = degrees.rem_euclid(360.0);
    let index = (normalized / 22.5).round() as usize % 16;
    CARDINALS[index]
}
