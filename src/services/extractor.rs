//! Geometry extraction: satellite image in, validated [`GeometricAnalysis`] out.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::{GeminiCapability, Timeouts};
use crate::domain::geometry::{
    open_ring, BoundingBox, EdgeType, Facet, GeometricAnalysis, LineSegment, Obstruction,
    ObstructionType, Point,
};
use crate::error::{AnalysisError, AnalysisResult, Service};
use crate::services::gemini::{
    strip_code_fence, Content, GeminiClient, GenerateContentRequest, GenerationConfig, InlineData,
    Part,
};

const DEFAULT_IMAGE_MIME: &str = "image/png";

pub const SEGMENTATION_INSTRUCTION: &str = "\
You are a roof measurement analyst. You receive one top-down satellite image of a \
single building and segment its roof.

Report three things:
1. facets: every planar roof surface, as a closed polygon of image points, with its \
pitch in degrees from horizontal (0 to 90) and the compass azimuth in degrees (0 to 360) \
it faces downslope.
2. lines: every structural roof line, classified as exactly one of:
   - ridge: the horizontal line where two facets meet at the top
   - hip: a sloped external line where two facets meet at an outside corner
   - valley: a sloped internal line where two facets meet at an inside corner
   - eave: the horizontal bottom edge of a facet, over the gutter line
   - rake: the sloped outer edge of a gable end
3. obstructions: chimneys, vents, skylights, HVAC units, or other objects on the roof, \
each as an axis-aligned bounding box. Use type chimney, vent, skylight, hvac, or other.

Coordinates are normalized: x and y run from 0 to 1000 across the image width and \
height, with (0, 0) at the top-left corner. Residential roofs usually have between 2 \
and 8 facets. Do not invent geometry that is not visible.";

pub const EXTRACTION_PROMPT: &str = "\
Segment the roof in this image. Respond with a single JSON object with keys \
\"facets\" (array of {\"id\", \"points\": [{\"x\", \"y\"}], \"pitch\", \"azimuth\"}), \
\"lines\" (array of {\"type\", \"start\": {\"x\", \"y\"}, \"end\": {\"x\", \"y\"}}) and \
\"obstructions\" (array of {\"type\", \"boundingBox\": {\"min\": {\"x\", \"y\"}, \
\"max\": {\"x\", \"y\"}}}).";

/// Anything that can turn an image URL into roof geometry.
///
/// `Ok(None)` means analysis was skipped because no model capability is
/// configured; it is not a failure.
#[async_trait]
pub trait GeometrySource: Send + Sync {
    async fn extract(&self, image_url: &str) -> AnalysisResult<Option<GeometricAnalysis>>;
}

/// Image bytes ready for the model request.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub struct GeometryExtractor {
    http: Client,
    gemini: Option<GeminiClient>,
    timeouts: Timeouts,
}

impl GeometryExtractor {
    pub fn new(http: Client, capability: Option<GeminiCapability>, timeouts: Timeouts) -> Self {
        let gemini = capability.map(|c| GeminiClient::new(http.clone(), c));
        Self {
            http,
            gemini,
            timeouts,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gemini.is_some()
    }

    /// Download the image. Anything short of a complete 2xx transfer fails.
    #[instrument(skip(self))]
    pub async fn fetch_image(&self, url: &str) -> AnalysisResult<FetchedImage> {
        let fetch_error = |reason: String| AnalysisError::Fetch {
            url: url.to_string(),
            reason,
        };
        let timeout = self.timeouts.image_fetch;

        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| fetch_error(describe_transport(e, timeout)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {status}")));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(describe_transport(e, timeout)))?;

        if bytes.is_empty() {
            return Err(fetch_error("empty response body".to_string()));
        }

        Ok(FetchedImage {
            mime_type,
            bytes: bytes.to_vec(),
        })
    }
}

#[async_trait]
impl GeometrySource for GeometryExtractor {
    #[instrument(skip(self))]
    async fn extract(&self, image_url: &str) -> AnalysisResult<Option<GeometricAnalysis>> {
        let Some(gemini) = &self.gemini else {
            info!("No model capability configured; skipping geometry extraction");
            return Ok(None);
        };

        let image = self.fetch_image(image_url).await?;
        let request = build_request(&image);
        let payload = gemini
            .generate(Service::Vision, &request, self.timeouts.vision)
            .await?;
        let analysis = parse_analysis(&payload)?;

        info!(
            facets = analysis.facets.len(),
            lines = analysis.lines.len(),
            obstructions = analysis.obstructions.len(),
            "Extracted roof geometry"
        );
        Ok(Some(analysis))
    }
}

fn describe_transport(e: reqwest::Error, timeout: Duration) -> String {
    if e.is_timeout() {
        format!("timed out after {}s", timeout.as_secs())
    } else {
        e.to_string()
    }
}

/// The single structured request sent for one image.
pub fn build_request(image: &FetchedImage) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Some(Content::system(SEGMENTATION_INSTRUCTION)),
        contents: vec![Content::user(vec![
            Part::InlineData(InlineData {
                mime_type: image.mime_type.clone(),
                data: BASE64.encode(&image.bytes),
            }),
            Part::Text(EXTRACTION_PROMPT.to_string()),
        ])],
        generation_config: GenerationConfig::json(),
    }
}

// ============================================================================
// Untrusted payload
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    facets: Option<Vec<RawFacet>>,
    #[serde(default)]
    lines: Option<Vec<RawLine>>,
    #[serde(default)]
    obstructions: Option<Vec<RawObstruction>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct RawFacet {
    id: RawId,
    points: Vec<Point>,
    #[serde(default)]
    pitch: Option<f64>,
    #[serde(default)]
    azimuth: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(rename = "type")]
    kind: String,
    start: Point,
    end: Point,
}

#[derive(Debug, Deserialize)]
struct RawObstruction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "boundingBox")]
    bounding_box: BoundingBox,
}

/// Parse and validate the model's text payload.
///
/// Missing or null arrays become empty. Out-of-range values and unknown
/// obstruction types are rejected, unknown line types fail with
/// [`AnalysisError::UnknownEdgeType`].
pub fn parse_analysis(payload: &str) -> AnalysisResult<GeometricAnalysis> {
    let raw: RawAnalysis = serde_json::from_str(strip_code_fence(payload))
        .map_err(|e| AnalysisError::MalformedAnalysis(format!("payload is not a valid analysis object: {e}")))?;

    let facets = raw
        .facets
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, f)| validate_facet(i, f))
        .collect::<AnalysisResult<Vec<_>>>()?;

    let mut seen = HashSet::new();
    if let Some(dup) = facets.iter().find(|f| !seen.insert(f.id.as_str())) {
        return Err(AnalysisError::MalformedAnalysis(format!(
            "duplicate facet id {:?}",
            dup.id
        )));
    }

    let lines = raw
        .lines
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, l)| validate_line(i, l))
        .collect::<AnalysisResult<Vec<_>>>()?;

    let obstructions = raw
        .obstructions
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, o)| validate_obstruction(i, o))
        .collect::<AnalysisResult<Vec<_>>>()?;

    if facets.is_empty() {
        warn!("Model returned no facets");
    }

    Ok(GeometricAnalysis {
        facets,
        lines,
        obstructions,
    })
}

fn check_point(point: &Point, what: impl FnOnce() -> String) -> AnalysisResult<()> {
    if point.in_bounds() {
        Ok(())
    } else {
        Err(AnalysisError::MalformedAnalysis(format!(
            "{} has point ({}, {}) outside the 0-1000 grid",
            what(),
            point.x,
            point.y
        )))
    }
}

fn validate_facet(index: usize, raw: RawFacet) -> AnalysisResult<Facet> {
    let id = match raw.id {
        RawId::Text(s) if !s.trim().is_empty() => s,
        RawId::Text(_) => {
            return Err(AnalysisError::MalformedAnalysis(format!(
                "facet #{index} has an empty id"
            )))
        }
        RawId::Number(n) => n.to_string(),
    };

    for point in &raw.points {
        check_point(point, || format!("facet {id}"))?;
    }
    // Models often echo the first vertex to close the ring
    let points = open_ring(&raw.points);
    if points.len() < 3 {
        return Err(AnalysisError::MalformedAnalysis(format!(
            "facet {id} has {} distinct points, need at least 3",
            points.len()
        )));
    }

    if let Some(pitch) = raw.pitch {
        if !(0.0..90.0).contains(&pitch) {
            return Err(AnalysisError::MalformedAnalysis(format!(
                "facet {id} pitch {pitch} is outside [0, 90)"
            )));
        }
    }
    if let Some(azimuth) = raw.azimuth {
        if !(0.0..360.0).contains(&azimuth) {
            return Err(AnalysisError::MalformedAnalysis(format!(
                "facet {id} azimuth {azimuth} is outside [0, 360)"
            )));
        }
    }

    Ok(Facet {
        id,
        points,
        pitch: raw.pitch,
        azimuth: raw.azimuth,
    })
}

fn validate_line(index: usize, raw: RawLine) -> AnalysisResult<LineSegment> {
    let edge_type: EdgeType = raw.kind.parse()?;
    check_point(&raw.start, || format!("line #{index}"))?;
    check_point(&raw.end, || format!("line #{index}"))?;

    Ok(LineSegment {
        edge_type,
        start: raw.start,
        end: raw.end,
    })
}

fn validate_obstruction(index: usize, raw: RawObstruction) -> AnalysisResult<Obstruction> {
    let obstruction_type = ObstructionType::parse(&raw.kind).ok_or_else(|| {
        AnalysisError::MalformedAnalysis(format!(
            "obstruction #{index} has unknown type {:?}",
            raw.kind
        ))
    })?;

    let BoundingBox { min, max } = raw.bounding_box;
    check_point(&min, || format!("obstruction #{index}"))?;
    check_point(&max, || format!("obstruction #{index}"))?;
    if min.x > max.x || min.y > max.y {
        return Err(AnalysisError::MalformedAnalysis(format!(
            "obstruction #{index} bounding box min exceeds max"
        )));
    }

    Ok(Obstruction {
        obstruction_type,
        bounding_box: raw.bounding_box,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::derive::area_figures;
    use crate::domain::measurements::GroundScale;
    use url::Url;

    const VALID: &str = r#"{
        "facets": [
            {"id": "f1", "points": [{"x": 100, "y": 100}, {"x": 500, "y": 100}, {"x": 500, "y": 400}], "pitch": 22.6, "azimuth": 180},
            {"id": 2, "points": [{"x": 100, "y": 400}, {"x": 500, "y": 400}, {"x": 300, "y": 700}], "pitch": 22.6}
        ],
        "lines": [
            {"type": "ridge", "start": {"x": 100, "y": 400}, "end": {"x": 500, "y": 400}},
            {"type": "Eave", "start": {"x": 100, "y": 100}, "end": {"x": 500, "y": 100}}
        ],
        "obstructions": [
            {"type": "chimney", "boundingBox": {"min": {"x": 200, "y": 200}, "max": {"x": 240, "y": 230}}}
        ]
    }"#;

    #[test]
    fn test_parse_valid_payload() {
        let analysis = parse_analysis(VALID).unwrap();
        assert_eq!(analysis.facets.len(), 2);
        assert_eq!(analysis.facets[1].id, "2");
        assert_eq!(analysis.facets[1].azimuth, None);
        assert_eq!(analysis.lines[1].edge_type, EdgeType::Eave);
        assert_eq!(
            analysis.obstructions[0].obstruction_type,
            ObstructionType::Chimney
        );
    }

    #[test]
    fn test_missing_arrays_become_empty() {
        let analysis = parse_analysis(r#"{"facets": null}"#).unwrap();
        assert!(analysis.facets.is_empty());
        assert!(analysis.lines.is_empty());
        assert!(analysis.obstructions.is_empty());
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_fenced_payload_accepted() {
        let fenced = format!("```json\n{VALID}\n```");
        assert_eq!(parse_analysis(&fenced).unwrap().facets.len(), 2);
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(
            parse_analysis("I could not see a roof."),
            Err(AnalysisError::MalformedAnalysis(_))
        ));
        assert!(matches!(
            parse_analysis("[1, 2, 3]"),
            Err(AnalysisError::MalformedAnalysis(_))
        ));
    }

    #[test]
    fn test_unknown_line_type_rejected() {
        let payload = r#"{"lines": [{"type": "gutter", "start": {"x": 0, "y": 0}, "end": {"x": 1, "y": 1}}]}"#;
        assert!(matches!(
            parse_analysis(payload),
            Err(AnalysisError::UnknownEdgeType(t)) if t == "gutter"
        ));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let cases = [
            r#"{"facets": [{"id": "a", "points": [{"x": 0, "y": 0}, {"x": 1001, "y": 0}, {"x": 0, "y": 5}]}]}"#,
            r#"{"facets": [{"id": "a", "points": [{"x": 0, "y": 0}, {"x": 5, "y": 0}]}]}"#,
            r#"{"facets": [{"id": "a", "points": [{"x": 0, "y": 0}, {"x": 5, "y": 0}, {"x": 0, "y": 5}], "pitch": 95}]}"#,
            r#"{"facets": [{"id": "a", "points": [{"x": 0, "y": 0}, {"x": 5, "y": 0}, {"x": 0, "y": 5}], "azimuth": 360}]}"#,
            r#"{"facets": [{"points": [{"x": 0, "y": 0}, {"x": 5, "y": 0}, {"x": 0, "y": 5}]}]}"#,
            r#"{"facets": [{"id": "a", "points": [{"x": "left", "y": 0}, {"x": 5, "y": 0}, {"x": 0, "y": 5}]}]}"#,
            r#"{"obstructions": [{"type": "satellite_dish", "boundingBox": {"min": {"x": 0, "y": 0}, "max": {"x": 1, "y": 1}}}]}"#,
            r#"{"obstructions": [{"type": "vent", "boundingBox": {"min": {"x": 5, "y": 0}, "max": {"x": 1, "y": 1}}}]}"#,
        ];
        for payload in cases {
            assert!(
                matches!(parse_analysis(payload), Err(AnalysisError::MalformedAnalysis(_))),
                "{payload}"
            );
        }
    }

    #[test]
    fn test_closed_ring_is_accepted_and_measured() {
        let payload = r#"{"facets": [{"id": "a", "pitch": 20, "points": [
            {"x": 0, "y": 0}, {"x": 10, "y": 0}, {"x": 10, "y": 10}, {"x": 0, "y": 10}, {"x": 0, "y": 0}
        ]}]}"#;
        let analysis = parse_analysis(payload).unwrap();
        assert_eq!(analysis.facets[0].points.len(), 4);

        let scale = GroundScale::from_feet_per_unit(1.0).unwrap();
        let figures = area_figures(&analysis.facets, scale).unwrap();
        assert_eq!(figures.footprint_sqft, 100.0);

        let sliver = r#"{"facets": [{"id": "b", "points": [
            {"x": 0, "y": 0}, {"x": 10, "y": 0}, {"x": 10, "y": 0}, {"x": 0, "y": 0}
        ]}]}"#;
        assert!(matches!(
            parse_analysis(sliver),
            Err(AnalysisError::MalformedAnalysis(msg)) if msg.contains("2 distinct points")
        ));
    }

    #[test]
    fn test_duplicate_facet_ids_rejected() {
        let payload = r#"{"facets": [
            {"id": "a", "points": [{"x": 0, "y": 0}, {"x": 5, "y": 0}, {"x": 0, "y": 5}]},
            {"id": "a", "points": [{"x": 10, "y": 0}, {"x": 15, "y": 0}, {"x": 10, "y": 5}]}
        ]}"#;
        assert!(matches!(
            parse_analysis(payload),
            Err(AnalysisError::MalformedAnalysis(msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_request_carries_image_and_instruction() {
        let image = FetchedImage {
            mime_type: "image/jpeg".to_string(),
            bytes: b"roof".to_vec(),
        };
        let json = serde_json::to_value(build_request(&image)).unwrap();

        let system = json["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
        assert!(system.contains("valley"));
        assert!(system.contains("0 to 1000"));
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["data"], "cm9vZg==");
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
    }

    #[tokio::test]
    async fn test_extract_without_capability_skips() {
        let extractor = GeometryExtractor::new(Client::new(), None, Timeouts::default());
        assert!(!extractor.is_enabled());

        // Never touches the network.
        let result = extractor.extract("http://127.0.0.1:9/unreachable.png").await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_extractor_with_capability_is_enabled() {
        let capability = GeminiCapability::new(
            "key",
            "model",
            Url::parse("http://127.0.0.1:9").unwrap(),
        );
        let extractor = GeometryExtractor::new(Client::new(), Some(capability), Timeouts::default());
        assert!(extractor.is_enabled());
    }
}
