//! Persistence seam for report generation state and results.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::generation::{GenerationState, GenerationStatus};
use crate::domain::report::ReportResults;
use crate::error::{AnalysisError, AnalysisResult};

/// Where generation state lives between attempts.
///
/// Every write is conditional on the stored status so that two callers racing
/// on the same report cannot both enter `analyzing`, and a finished attempt
/// cannot overwrite a newer one.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn load(&self, report_id: Uuid) -> AnalysisResult<GenerationState>;

    async fn results(&self, report_id: Uuid) -> AnalysisResult<Option<ReportResults>>;

    /// Replace `current` by `next`, clearing any stored results.
    ///
    /// Only succeeds while the stored report still has the status and attempt
    /// count of `current`, so a caller acting on a stale read loses.
    async fn transition(
        &self,
        current: &GenerationState,
        next: &GenerationState,
    ) -> AnalysisResult<()>;

    /// Finish the in-flight attempt as completed, writing results in the same
    /// step. `None` records a completed attempt with nothing to show.
    async fn complete(
        &self,
        state: &GenerationState,
        results: Option<&ReportResults>,
    ) -> AnalysisResult<()>;

    /// Finish the in-flight attempt as failed.
    async fn fail(&self, state: &GenerationState) -> AnalysisResult<()>;
}

pub(crate) fn not_found(report_id: Uuid) -> AnalysisError {
    AnalysisError::Storage(format!("report {report_id} not found"))
}

/// Error for a conditional write whose precondition no longer holds.
pub(crate) fn precondition_failed(
    expected: &GenerationState,
    actual: &GenerationState,
) -> AnalysisError {
    let report_id = expected.report_id();
    if actual.status() == GenerationStatus::Analyzing {
        AnalysisError::ConcurrentAttempt { report_id }
    } else {
        AnalysisError::Storage(format!(
            "report {report_id} is {} after {} attempt(s), expected {} after {}",
            actual.status(),
            actual.attempt_count(),
            expected.status(),
            expected.attempt_count()
        ))
    }
}

/// Whether `stored` is still the state a caller read as `current`.
pub(crate) fn unchanged_since(stored: &GenerationState, current: &GenerationState) -> bool {
    stored.status() == current.status() && stored.attempt_count() == current.attempt_count()
}

#[derive(Debug, Clone)]
struct StoredReport {
    state: GenerationState,
    results: Option<ReportResults>,
}

/// Process-local store, used by tests and single-node deployments.
#[derive(Clone, Default)]
pub struct InMemoryReportStore {
    inner: Arc<Mutex<HashMap<Uuid, StoredReport>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending report.
    pub fn create(&self, report_id: Uuid) -> GenerationState {
        let state = GenerationState::new(report_id);
        self.inner.lock().insert(
            report_id,
            StoredReport {
                state: state.clone(),
                results: None,
            },
        );
        state
    }

    /// Seed a report in an arbitrary state.
    pub fn insert(&self, state: GenerationState) {
        self.inner.lock().insert(
            state.report_id(),
            StoredReport {
                state,
                results: None,
            },
        );
    }

    pub fn snapshot(&self, report_id: Uuid) -> Option<(GenerationState, Option<ReportResults>)> {
        self.inner
            .lock()
            .get(&report_id)
            .map(|r| (r.state.clone(), r.results.clone()))
    }

    fn finish(
        &self,
        state: &GenerationState,
        results: Option<ReportResults>,
    ) -> AnalysisResult<()> {
        let mut reports = self.inner.lock();
        let stored = reports
            .get_mut(&state.report_id())
            .ok_or_else(|| not_found(state.report_id()))?;

        if stored.state.status() != GenerationStatus::Analyzing
            || stored.state.attempt_count() != state.attempt_count()
        {
            return Err(AnalysisError::Storage(format!(
                "attempt {} of report {} is no longer in flight",
                state.attempt_count(),
                state.report_id()
            )));
        }

        stored.state = state.clone();
        stored.results = results;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn load(&self, report_id: Uuid) -> AnalysisResult<GenerationState> {
        self.inner
            .lock()
            .get(&report_id)
            .map(|r| r.state.clone())
            .ok_or_else(|| not_found(report_id))
    }

    async fn results(&self, report_id: Uuid) -> AnalysisResult<Option<ReportResults>> {
        self.inner
            .lock()
            .get(&report_id)
            .map(|r| r.results.clone())
            .ok_or_else(|| not_found(report_id))
    }

    async fn transition(
        &self,
        current: &GenerationState,
        next: &GenerationState,
    ) -> AnalysisResult<()> {
        let mut reports = self.inner.lock();
        let stored = reports
            .get_mut(&next.report_id())
            .ok_or_else(|| not_found(next.report_id()))?;

        if !unchanged_since(&stored.state, current) {
            return Err(precondition_failed(current, &stored.state));
        }

        stored.state = next.clone();
        stored.results = None;
        Ok(())
    }

    async fn complete(
        &self,
        state: &GenerationState,
        results: Option<&ReportResults>,
    ) -> AnalysisResult<()> {
        self.finish(state, results.cloned())
    }

    async fn fail(&self, state: &GenerationState) -> AnalysisResult<()> {
        self.finish(state, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let store = InMemoryReportStore::new();
        let id = Uuid::new_v4();
        let pending = store.create(id);

        let analyzing = pending.begin_attempt(Utc::now()).unwrap();
        store
            .transition(&pending, &analyzing)
            .await
            .unwrap();

        // A second caller that read the same pending state loses the race.
        let err = store
            .transition(&pending, &analyzing)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ConcurrentAttempt { report_id } if report_id == id));
    }

    #[tokio::test]
    async fn test_stale_attempt_cannot_finish() {
        let store = InMemoryReportStore::new();
        let id = Uuid::new_v4();
        let pending = store.create(id);
        let first = pending.begin_attempt(Utc::now()).unwrap();
        store.transition(&pending, &first).await.unwrap();

        let failed = first.fail(Utc::now(), "boom").unwrap();
        store.fail(&failed).await.unwrap();

        let second = failed.begin_attempt(Utc::now()).unwrap();
        store.transition(&failed, &second).await.unwrap();

        // The first attempt finishing late must not clobber the second.
        let late = first.complete(Utc::now()).unwrap();
        assert!(matches!(
            store.complete(&late, None).await,
            Err(AnalysisError::Storage(_))
        ));
        assert_eq!(store.load(id).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_stale_read_cannot_start_attempt() {
        let store = InMemoryReportStore::new();
        let id = Uuid::new_v4();
        let pending = store.create(id);
        let first = pending.begin_attempt(Utc::now()).unwrap();
        store.transition(&pending, &first).await.unwrap();
        let failed_once = first.fail(Utc::now(), "first").unwrap();
        store.fail(&failed_once).await.unwrap();

        // Caller A reads failed(1) and stalls; caller B runs and fails attempt 2.
        let stale_read = store.load(id).await.unwrap();
        let b = stale_read.begin_attempt(Utc::now()).unwrap();
        store.transition(&stale_read, &b).await.unwrap();
        let failed_twice = b.fail(Utc::now(), "second").unwrap();
        store.fail(&failed_twice).await.unwrap();

        // A resumes with the same status but an outdated attempt count.
        let a = stale_read.begin_attempt(Utc::now()).unwrap();
        assert_eq!(a.attempt_count(), 2);
        assert!(matches!(
            store.transition(&stale_read, &a).await,
            Err(AnalysisError::Storage(msg)) if msg.contains("after 2 attempt(s), expected failed after 1")
        ));

        let fresh = store.load(id).await.unwrap();
        assert_eq!(fresh, failed_twice);
        let third = fresh.begin_attempt(Utc::now()).unwrap();
        store.transition(&fresh, &third).await.unwrap();
        assert_eq!(store.load(id).await.unwrap().attempt_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_report() {
        let store = InMemoryReportStore::new();
        assert!(matches!(
            store.load(Uuid::new_v4()).await,
            Err(AnalysisError::Storage(msg)) if msg.contains("not found")
        ));
    }
}
