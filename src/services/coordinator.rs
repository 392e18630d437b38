//! Drives one generation attempt for a report and owns its persisted status.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::analysis::{assess_quality, derive, estimate_materials, EstimateInputs};
use crate::domain::estimate::ShingleType;
use crate::domain::generation::GenerationState;
use crate::domain::narrative::SolarSummary;
use crate::domain::quality::ImageryMetadata;
use crate::domain::report::ReportResults;
use crate::error::AnalysisResult;
use crate::services::extractor::GeometrySource;
use crate::services::narrative::NarrativeSource;
use crate::services::report_store::ReportStore;

/// Everything one attempt needs besides the stored state.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub report_id: Uuid,
    pub imagery: ImageryMetadata,
    pub shingle_type: Option<ShingleType>,
    /// When present, the narrative stage runs in the same attempt.
    pub solar_summary: Option<SolarSummary>,
}

/// How a completed attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Completed(Box<ReportResults>),
    /// No model capability was configured; the report is completed with no
    /// results rather than failed.
    Skipped,
}

pub struct GenerationCoordinator {
    store: Arc<dyn ReportStore>,
    geometry: Arc<dyn GeometrySource>,
    narrative: Arc<dyn NarrativeSource>,
    default_shingle_type: ShingleType,
}

impl GenerationCoordinator {
    pub fn new(
        store: Arc<dyn ReportStore>,
        geometry: Arc<dyn GeometrySource>,
        narrative: Arc<dyn NarrativeSource>,
    ) -> Self {
        Self {
            store,
            geometry,
            narrative,
            default_shingle_type: ShingleType::default(),
        }
    }

    /// Shingle type used when a request does not name one.
    pub fn with_default_shingle_type(mut self, shingle_type: ShingleType) -> Self {
        self.default_shingle_type = shingle_type;
        self
    }

    /// Run exactly one attempt. Retries and staleness of stuck attempts are
    /// the caller's business.
    #[instrument(skip_all, fields(report_id = %request.report_id))]
    pub async fn attempt(&self, request: &GenerationRequest) -> AnalysisResult<GenerationOutcome> {
        let current = self.store.load(request.report_id).await?;
        let analyzing = current.begin_attempt(Utc::now())?;
        self.store.transition(&current, &analyzing).await?;

        info!(
            attempt = analyzing.attempt_count(),
            status = %analyzing.status(),
            "Generation attempt started"
        );

        match self.run_pipeline(request).await {
            Ok(results) => self.finish(&analyzing, results).await,
            Err(e) => {
                let failed = analyzing.fail(Utc::now(), e.to_string())?;
                error!(
                    attempt = failed.attempt_count(),
                    status = %failed.status(),
                    stage = %e.stage(),
                    error = %e,
                    "Generation attempt failed"
                );
                if let Err(store_err) = self.store.fail(&failed).await {
                    error!(error = %store_err, "Failed to record failed attempt");
                }
                Err(e)
            }
        }
    }

    /// Reopen a completed report so the next [`attempt`](Self::attempt) runs
    /// a fresh analysis.
    #[instrument(skip(self))]
    pub async fn request_reanalysis(&self, report_id: Uuid) -> AnalysisResult<GenerationState> {
        let current = self.store.load(report_id).await?;
        let reopened = current.request_reanalysis()?;
        self.store
            .transition(&current, &reopened)
            .await?;

        info!(attempt = reopened.attempt_count(), "Report reopened for re-analysis");
        Ok(reopened)
    }

    async fn run_pipeline(
        &self,
        request: &GenerationRequest,
    ) -> AnalysisResult<Option<ReportResults>> {
        let imagery = &request.imagery;
        let Some(analysis) = self.geometry.extract(&imagery.image_url).await? else {
            return Ok(None);
        };

        let derived = derive(&analysis, imagery.ground_scale)?;
        let estimate = estimate_materials(
            &derived.areas,
            &derived.edges,
            EstimateInputs {
                facet_count: analysis.facets.len(),
                obstruction_count: analysis.obstructions.len(),
                shingle_type: Some(request.shingle_type.unwrap_or(self.default_shingle_type)),
            },
        );
        let quality = assess_quality(
            &analysis,
            &derived.areas,
            imagery,
            Utc::now().date_naive(),
        );

        let narrative = match &request.solar_summary {
            Some(summary) => self.narrative.generate(summary).await?,
            None => None,
        };

        Ok(Some(ReportResults {
            analysis,
            areas: derived.areas,
            edges: derived.edges,
            estimate,
            quality,
            narrative,
        }))
    }

    async fn finish(
        &self,
        analyzing: &GenerationState,
        results: Option<ReportResults>,
    ) -> AnalysisResult<GenerationOutcome> {
        let completed = analyzing.complete(Utc::now())?;
        self.store.complete(&completed, results.as_ref()).await?;

        match results {
            Some(results) => {
                info!(
                    attempt = completed.attempt_count(),
                    status = %completed.status(),
                    confidence = results.quality.confidence_score,
                    gross_squares = results.estimate.gross_squares,
                    "Generation attempt completed"
                );
                Ok(GenerationOutcome::Completed(Box::new(results)))
            }
            None => {
                warn!(
                    attempt = completed.attempt_count(),
                    status = %completed.status(),
                    "Generation completed without analysis"
                );
                Ok(GenerationOutcome::Skipped)
            }
        }
    }
}
