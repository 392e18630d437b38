//! PostgreSQL-backed report store.
//!
//! Every write is a single conditional UPDATE, so the status check and the
//! write cannot interleave with another caller's.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Settings;
use crate::db;

use crate::domain::estimate::MaterialEstimate;
use crate::domain::geometry::GeometricAnalysis;
use crate::domain::generation::{GenerationState, GenerationStatus};
use crate::domain::measurements::{AreaFigures, EdgeTotals};
use crate::domain::narrative::NarrativeReport;
use crate::domain::quality::DataQuality;
use crate::domain::report::ReportResults;
use crate::error::{AnalysisError, AnalysisResult};
use crate::services::report_store::{not_found, precondition_failed, unchanged_since, ReportStore};

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StateRow {
    id: Uuid,
    generation_status: String,
    attempt_count: i32,
    generation_started_at: Option<DateTime<Utc>>,
    generation_completed_at: Option<DateTime<Utc>>,
    generation_error: Option<String>,
}

impl StateRow {
    fn into_state(self) -> AnalysisResult<GenerationState> {
        let status = GenerationStatus::parse(&self.generation_status).ok_or_else(|| {
            AnalysisError::Storage(format!(
                "report {} has unknown generation status {:?}",
                self.id, self.generation_status
            ))
        })?;
        let attempt_count = u32::try_from(self.attempt_count).map_err(|_| {
            AnalysisError::Storage(format!(
                "report {} has negative attempt count {}",
                self.id, self.attempt_count
            ))
        })?;

        GenerationState::restore(
            self.id,
            status,
            attempt_count,
            self.generation_started_at,
            self.generation_completed_at,
            self.generation_error,
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResultsRow {
    geometric_analysis: Option<Json<GeometricAnalysis>>,
    area_figures: Option<Json<AreaFigures>>,
    edge_totals: Option<Json<EdgeTotals>>,
    material_estimate: Option<Json<MaterialEstimate>>,
    data_quality: Option<Json<DataQuality>>,
    narrative: Option<Json<NarrativeReport>>,
}

impl ResultsRow {
    fn into_results(self) -> Option<ReportResults> {
        Some(ReportResults {
            analysis: self.geometric_analysis?.0,
            areas: self.area_figures?.0,
            edges: self.edge_totals?.0,
            estimate: self.material_estimate?.0,
            quality: self.data_quality?.0,
            narrative: self.narrative.map(|n| n.0),
        })
    }
}

/// Scalar columns kept beside the JSONB results for listing and filtering.
#[derive(Debug, Clone, PartialEq)]
struct ReportSummary {
    confidence_score: i16,
    field_verification_recommended: bool,
    gross_squares: i32,
    bundle_count: i32,
    total_material_cost: Decimal,
    complexity_class: String,
    area_multiplier: f64,
    pitch_ratio: String,
    imagery_quality: &'static str,
    imagery_date: Option<NaiveDate>,
}

impl ReportSummary {
    fn of(results: &ReportResults) -> AnalysisResult<Self> {
        let to_i32 = |value: u32, column: &str| {
            i32::try_from(value)
                .map_err(|_| AnalysisError::Storage(format!("{column} {value} overflows INTEGER")))
        };

        Ok(Self {
            confidence_score: i16::from(results.quality.confidence_score),
            field_verification_recommended: results.quality.field_verification_recommended,
            gross_squares: to_i32(results.estimate.gross_squares, "gross_squares")?,
            bundle_count: to_i32(results.estimate.bundle_count, "bundle_count")?,
            total_material_cost: results.estimate.total_material_cost.round_dp(2),
            complexity_class: results.estimate.complexity_class.to_string(),
            area_multiplier: results.areas.area_multiplier,
            pitch_ratio: results.areas.pitch_ratio.clone(),
            imagery_quality: results.quality.imagery_quality.as_str(),
            imagery_date: results.quality.imagery_date,
        })
    }
}

const SELECT_STATE: &str = r#"
    SELECT id, generation_status, attempt_count, generation_started_at,
           generation_completed_at, generation_error
    FROM roof_reports WHERE id = $1
"#;

pub struct PgReportStore {
    pool: PgPool,
}

impl PgReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool, apply migrations and confirm the database answers.
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = db::create_pool(database_url, max_connections).await?;
        db::run_migrations(&pool).await?;
        anyhow::ensure!(
            db::health_check(&pool).await,
            "report store did not answer a health check"
        );
        Ok(Self::new(pool))
    }

    /// Connect using `DATABASE_URL` from settings.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let url = settings
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        Self::connect(url, settings.database_max_connections).await
    }

    /// Insert a new pending report.
    pub async fn create(&self, report_id: Uuid) -> AnalysisResult<GenerationState> {
        let state = GenerationState::new(report_id);
        sqlx::query(
            r#"
            INSERT INTO roof_reports (id, generation_status, attempt_count)
            VALUES ($1, $2, 0)
            "#,
        )
        .bind(report_id)
        .bind(state.status().as_str())
        .execute(&self.pool)
        .await?;

        Ok(state)
    }

    async fn fetch_state(&self, report_id: Uuid) -> AnalysisResult<Option<GenerationState>> {
        sqlx::query_as::<_, StateRow>(SELECT_STATE)
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?
            .map(StateRow::into_state)
            .transpose()
    }

    /// Explain why a conditional write matched no row.
    async fn rejected(&self, current: &GenerationState) -> AnalysisError {
        let report_id = current.report_id();
        match self.fetch_state(report_id).await {
            Ok(Some(actual)) if unchanged_since(&actual, current) => AnalysisError::Storage(
                format!("report {report_id} changed while being updated"),
            ),
            Ok(Some(actual)) => precondition_failed(current, &actual),
            Ok(None) => not_found(report_id),
            Err(e) => e,
        }
    }

    async fn finish(
        &self,
        state: &GenerationState,
        results: Option<&ReportResults>,
    ) -> AnalysisResult<()> {
        let summary = results.map(ReportSummary::of).transpose()?;
        let summary = summary.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE roof_reports SET
                generation_status = $3,
                generation_completed_at = $4,
                generation_error = $5,
                geometric_analysis = $6,
                area_figures = $7,
                edge_totals = $8,
                material_estimate = $9,
                data_quality = $10,
                narrative = $11,
                confidence_score = $12,
                field_verification_recommended = $13,
                gross_squares = $14,
                total_material_cost = $15,
                bundle_count = $16,
                complexity_class = $17,
                area_multiplier = $18,
                pitch_ratio = $19,
                imagery_quality = $20,
                imagery_date = $21,
                updated_at = NOW()
            WHERE id = $1 AND generation_status = 'analyzing' AND attempt_count = $2
            "#,
        )
        .bind(state.report_id())
        .bind(attempt_count(state)?)
        .bind(state.status().as_str())
        .bind(state.completed_at())
        .bind(state.last_error())
        .bind(results.map(|r| Json(&r.analysis)))
        .bind(results.map(|r| Json(&r.areas)))
        .bind(results.map(|r| Json(&r.edges)))
        .bind(results.map(|r| Json(&r.estimate)))
        .bind(results.map(|r| Json(&r.quality)))
        .bind(results.and_then(|r| r.narrative.as_ref()).map(Json))
        .bind(summary.map(|s| s.confidence_score))
        .bind(summary.map(|s| s.field_verification_recommended))
        .bind(summary.map(|s| s.gross_squares))
        .bind(summary.map(|s| s.total_material_cost))
        .bind(summary.map(|s| s.bundle_count))
        .bind(summary.map(|s| s.complexity_class.as_str()))
        .bind(summary.map(|s| s.area_multiplier))
        .bind(summary.map(|s| s.pitch_ratio.as_str()))
        .bind(summary.map(|s| s.imagery_quality))
        .bind(summary.and_then(|s| s.imagery_date))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AnalysisError::Storage(format!(
                "attempt {} of report {} is no longer in flight",
                state.attempt_count(),
                state.report_id()
            )));
        }
        Ok(())
    }
}

fn attempt_count(state: &GenerationState) -> AnalysisResult<i32> {
    i32::try_from(state.attempt_count())
        .map_err(|_| AnalysisError::Storage("attempt count overflow".to_string()))
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn load(&self, report_id: Uuid) -> AnalysisResult<GenerationState> {
        self.fetch_state(report_id)
            .await?
            .ok_or_else(|| not_found(report_id))
    }

    async fn results(&self, report_id: Uuid) -> AnalysisResult<Option<ReportResults>> {
        let row = sqlx::query_as::<_, ResultsRow>(
            r#"
            SELECT geometric_analysis, area_figures, edge_totals,
                   material_estimate, data_quality, narrative
            FROM roof_reports WHERE id = $1
            "#,
        )
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| not_found(report_id))?;

        Ok(row.into_results())
    }

    async fn transition(
        &self,
        current: &GenerationState,
        next: &GenerationState,
    ) -> AnalysisResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE roof_reports SET
                generation_status = $3,
                attempt_count = $4,
                generation_started_at = $5,
                generation_completed_at = $6,
                generation_error = $7,
                geometric_analysis = NULL,
                area_figures = NULL,
                edge_totals = NULL,
                material_estimate = NULL,
                data_quality = NULL,
                narrative = NULL,
                confidence_score = NULL,
                field_verification_recommended = NULL,
                gross_squares = NULL,
                total_material_cost = NULL,
                bundle_count = NULL,
                complexity_class = NULL,
                area_multiplier = NULL,
                pitch_ratio = NULL,
                imagery_quality = NULL,
                imagery_date = NULL,
                updated_at = NOW()
            WHERE id = $1 AND generation_status = $2 AND attempt_count = $8
            "#,
        )
        .bind(next.report_id())
        .bind(current.status().as_str())
        .bind(next.status().as_str())
        .bind(attempt_count(next)?)
        .bind(next.started_at())
        .bind(next.completed_at())
        .bind(next.last_error())
        .bind(attempt_count(current)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.rejected(current).await);
        }

        tracing::debug!(
            report_id = %next.report_id(),
            from = %current.status(),
            to = %next.status(),
            "Generation status updated"
        );
        Ok(())
    }

    async fn complete(
        &self,
        state: &GenerationState,
        results: Option<&ReportResults>,
    ) -> AnalysisResult<()> {
        self.finish(state, results).await
    }

    async fn fail(&self, state: &GenerationState) -> AnalysisResult<()> {
        self.finish(state, None).await
    }
}
