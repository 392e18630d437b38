//! Roof geometry extraction and measurement.
//!
//! A satellite image goes to a vision model, which segments the roof into
//! facets, structural lines and obstructions. Those are turned into areas,
//! pitch and edge lengths, then a material estimate and a confidence score.
//! [`services::GenerationCoordinator`] runs one attempt per report and keeps
//! its persisted generation status.

pub mod analysis;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod services;

pub use config::{GeminiCapability, Settings, Timeouts};
pub use error::{AnalysisError, AnalysisResult, Stage};
pub use services::{
    build_coordinator, connect_store, GenerationCoordinator, GenerationOutcome, GenerationRequest,
    GeometryExtractor, InMemoryReportStore, NarrativeReporter, PgReportStore, ReportStore,
};
