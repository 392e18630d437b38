//! Unified pipeline error handling
//!
//! Every stage of report generation fails with an [`AnalysisError`]; the
//! coordinator records its message verbatim on the report.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::generation::GenerationStatus;

/// External service an upstream failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Vision,
    Narrative,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Vision => write!(f, "vision"),
            Service::Narrative => write!(f, "narrative"),
        }
    }
}

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Vision,
    Derive,
    Narrative,
    Coordination,
    Storage,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Vision => "vision",
            Stage::Derive => "derive",
            Stage::Narrative => "narrative",
            Stage::Coordination => "coordination",
            Stage::Storage => "storage",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Image fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("{service} service error{}: {body}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Upstream {
        service: Service,
        status: Option<u16>,
        body: String,
    },

    #[error("{service} service returned no text payload")]
    EmptyResponse { service: Service },

    #[error("Malformed geometric analysis: {0}")]
    MalformedAnalysis(String),

    #[error("Malformed narrative report: {0}")]
    MalformedNarrative(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Unknown edge type: {0:?}")]
    UnknownEdgeType(String),

    #[error("Report {report_id} already has an analysis in progress")]
    ConcurrentAttempt { report_id: Uuid },

    #[error("Invalid generation transition from {from} to {to}")]
    InvalidTransition {
        from: GenerationStatus,
        to: GenerationStatus,
    },

    #[error("Report store error: {0}")]
    Storage(String),
}

impl AnalysisError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Fetch { .. } => Stage::Fetch,
            Self::Upstream { service, .. } | Self::EmptyResponse { service } => match service {
                Service::Vision => Stage::Vision,
                Service::Narrative => Stage::Narrative,
            },
            Self::MalformedAnalysis(_) | Self::UnknownEdgeType(_) => Stage::Vision,
            Self::MalformedNarrative(_) => Stage::Narrative,
            Self::DegenerateGeometry(_) => Stage::Derive,
            Self::ConcurrentAttempt { .. } | Self::InvalidTransition { .. } => Stage::Coordination,
            Self::Storage(_) => Stage::Storage,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "FETCH_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::EmptyResponse { .. } => "EMPTY_RESPONSE",
            Self::MalformedAnalysis(_) => "MALFORMED_ANALYSIS",
            Self::MalformedNarrative(_) => "MALFORMED_NARRATIVE",
            Self::DegenerateGeometry(_) => "DEGENERATE_GEOMETRY",
            Self::UnknownEdgeType(_) => "UNKNOWN_EDGE_TYPE",
            Self::ConcurrentAttempt { .. } => "CONCURRENT_ATTEMPT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Timed-out model calls fail like any other upstream error.
    pub(crate) fn timed_out(service: Service, after: std::time::Duration) -> Self {
        Self::Upstream {
            service,
            status: None,
            body: format!("request timed out after {}s", after.as_secs()),
        }
    }
}

impl From<sqlx::Error> for AnalysisError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = ?e, "Database error");
        Self::Storage(e.to_string())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_keeps_body() {
        let err = AnalysisError::Upstream {
            service: Service::Vision,
            status: Some(500),
            body: "{\"error\":\"boom\"}".to_string(),
        };
        assert_eq!(err.to_string(), "vision service error (HTTP 500): {\"error\":\"boom\"}");
        assert_eq!(err.stage(), Stage::Vision);
        assert_eq!(err.error_code(), "UPSTREAM_ERROR");
    }

    #[test]
    fn test_timeout_has_no_status() {
        let err = AnalysisError::timed_out(Service::Narrative, std::time::Duration::from_secs(30));
        assert_eq!(err.to_string(), "narrative service error: request timed out after 30s");
        assert_eq!(err.stage(), Stage::Narrative);
    }

    #[test]
    fn test_stage_mapping() {
        assert_eq!(
            AnalysisError::UnknownEdgeType("gutter".into()).stage(),
            Stage::Vision
        );
        assert_eq!(
            AnalysisError::DegenerateGeometry("x".into()).stage(),
            Stage::Derive
        );
        assert_eq!(
            AnalysisError::ConcurrentAttempt { report_id: Uuid::nil() }.stage(),
            Stage::Coordination
        );
    }
}
