//! External integrations and orchestration.
//!
//! Contains the model-service client, the geometry extractor and narrative
//! reporter built on it, report persistence, and the generation coordinator.

pub mod coordinator;
pub mod extractor;
pub mod gemini;
pub mod narrative;
pub mod pg_store;
pub mod report_store;

pub use coordinator::{GenerationCoordinator, GenerationOutcome, GenerationRequest};
pub use extractor::{GeometryExtractor, GeometrySource};
pub use gemini::GeminiClient;
pub use narrative::{NarrativeReporter, NarrativeSource};
pub use pg_store::PgReportStore;
pub use report_store::{InMemoryReportStore, ReportStore};

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;

use crate::config::Settings;

/// Pick the report store from settings: Postgres when `DATABASE_URL` is set,
/// otherwise a process-local store.
pub async fn connect_store(settings: &Settings) -> Result<Arc<dyn ReportStore>> {
    if settings.database_url.is_none() {
        tracing::warn!("DATABASE_URL not set; generation state will not survive a restart");
        return Ok(Arc::new(InMemoryReportStore::new()));
    }

    let store = PgReportStore::from_settings(settings).await?;
    Ok(Arc::new(store))
}

/// Wire the extractor, reporter and coordinator from settings.
///
/// Without `GEMINI_API_KEY` the coordinator still runs, completing every
/// attempt as skipped.
pub fn build_coordinator(
    settings: &Settings,
    store: Arc<dyn ReportStore>,
) -> Result<GenerationCoordinator> {
    let http = Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    let capability = settings.gemini_capability();
    if capability.is_none() {
        tracing::warn!("GEMINI_API_KEY not set; roof analysis will be skipped");
    }

    let extractor = GeometryExtractor::new(http.clone(), capability.clone(), settings.timeouts);
    let reporter = NarrativeReporter::new(http, capability, settings.timeouts.narrative);

    Ok(
        GenerationCoordinator::new(store, Arc::new(extractor), Arc::new(reporter))
            .with_default_shingle_type(settings.shingle_type),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, Timeouts};
    use crate::domain::estimate::ShingleType;
    use crate::error::AnalysisError;
    use url::Url;
    use uuid::Uuid;

    fn settings(database_url: Option<&str>) -> Settings {
        Settings {
            env: Environment::Dev,
            database_url: database_url.map(str::to_string),
            database_max_connections: 2,
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_base_url: Url::parse("http://127.0.0.1:9/v1beta/").unwrap(),
            timeouts: Timeouts::default(),
            shingle_type: ShingleType::default(),
        }
    }

    #[tokio::test]
    async fn test_store_without_database_is_in_memory() {
        let store = connect_store(&settings(None)).await.unwrap();
        assert!(matches!(
            store.load(Uuid::new_v4()).await,
            Err(AnalysisError::Storage(msg)) if msg.contains("not found")
        ));
    }

    #[tokio::test]
    async fn test_bad_database_url_fails_startup() {
        let err = connect_store(&settings(Some("not a database url")))
            .await
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("Invalid DATABASE_URL"));
    }

    #[tokio::test]
    async fn test_coordinator_builds_without_key() {
        let store = connect_store(&settings(None)).await.unwrap();
        assert!(build_coordinator(&settings(None), store).is_ok());
    }
}
