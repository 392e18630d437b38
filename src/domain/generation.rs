//! Generation attempt state machine.
//!
//! `pending → analyzing → {completed, failed}`, `failed → analyzing` on retry.
//! `completed` is left only through an explicit [`GenerationState::request_reanalysis`].
//! Transitions return a new state; fields cannot be updated independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Analyzing => "analyzing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "analyzing" => Some(Self::Analyzing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Built only through [`GenerationState::new`], the transition methods, or
/// [`GenerationState::restore`], so every value is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationState {
    report_id: Uuid,
    status: GenerationStatus,
    attempt_count: u32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl GenerationState {
    /// A fresh report: pending, no attempts.
    pub fn new(report_id: Uuid) -> Self {
        Self {
            report_id,
            status: GenerationStatus::Pending,
            attempt_count: 0,
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    /// Rebuild a state read back from storage, rejecting combinations no
    /// sequence of transitions can produce.
    pub fn restore(
        report_id: Uuid,
        status: GenerationStatus,
        attempt_count: u32,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> Result<Self, AnalysisError> {
        let consistent = match status {
            GenerationStatus::Pending => completed_at.is_none() && last_error.is_none(),
            GenerationStatus::Analyzing => {
                attempt_count > 0 && started_at.is_some() && completed_at.is_none()
            }
            GenerationStatus::Completed => {
                attempt_count > 0 && started_at.is_some() && completed_at.is_some()
            }
            GenerationStatus::Failed => {
                attempt_count > 0
                    && started_at.is_some()
                    && completed_at.is_some()
                    && last_error.is_some()
            }
        };

        if !consistent {
            return Err(AnalysisError::Storage(format!(
                "inconsistent generation state for report {report_id}: status {status} with \
                 {attempt_count} attempt(s), started_at {started_at:?}, completed_at {completed_at:?}"
            )));
        }

        Ok(Self {
            report_id,
            status,
            attempt_count,
            started_at,
            completed_at,
            last_error,
        })
    }

    pub fn report_id(&self) -> Uuid {
        self.report_id
    }

    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `pending | failed → analyzing`.
    pub fn begin_attempt(&self, now: DateTime<Utc>) -> Result<Self, AnalysisError> {
        match self.status {
            GenerationStatus::Pending | GenerationStatus::Failed => Ok(Self {
                report_id: self.report_id,
                status: GenerationStatus::Analyzing,
                attempt_count: self.attempt_count + 1,
                started_at: Some(now),
                completed_at: None,
                last_error: None,
            }),
            GenerationStatus::Analyzing => Err(AnalysisError::ConcurrentAttempt {
                report_id: self.report_id,
            }),
            GenerationStatus::Completed => Err(self.invalid(GenerationStatus::Analyzing)),
        }
    }

    /// `analyzing → completed`.
    pub fn complete(&self, now: DateTime<Utc>) -> Result<Self, AnalysisError> {
        self.finish(GenerationStatus::Completed, now, None)
    }

    /// `analyzing → failed`, keeping the error message verbatim.
    pub fn fail(&self, now: DateTime<Utc>, message: impl Into<String>) -> Result<Self, AnalysisError> {
        self.finish(GenerationStatus::Failed, now, Some(message.into()))
    }

    /// `completed → pending`, the caller's explicit request for a new analysis.
    /// The attempt count is kept as the audit trail.
    pub fn request_reanalysis(&self) -> Result<Self, AnalysisError> {
        if self.status != GenerationStatus::Completed {
            return Err(self.invalid(GenerationStatus::Pending));
        }
        Ok(Self {
            report_id: self.report_id,
            status: GenerationStatus::Pending,
            attempt_count: self.attempt_count,
            started_at: self.started_at,
            completed_at: None,
            last_error: None,
        })
    }

    fn finish(
        &self,
        to: GenerationStatus,
        now: DateTime<Utc>,
        last_error: Option<String>,
    ) -> Result<Self, AnalysisError> {
        if self.status != GenerationStatus::Analyzing {
            return Err(self.invalid(to));
        }
        Ok(Self {
            report_id: self.report_id,
            status: to,
            attempt_count: self.attempt_count,
            started_at: self.started_at,
            completed_at: Some(now),
            last_error,
        })
    }

    fn invalid(&self, to: GenerationStatus) -> AnalysisError {
        AnalysisError::InvalidTransition {
            from: self.status,
            to,
        }
    }
}
