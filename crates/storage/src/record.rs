use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Surrogate key of a progress row, assigned by the store in insertion order.
pub type ProgressId = i64;

/// Identifier of a case (dossier).
pub type CaseId = String;

/// Identifier of the user performing an operation.
pub type UserId = String;

/// Lifecycle status of a progress row.
///
/// ```text
/// pending -> in_progress -> completed
///            in_progress <-> blocked
///            completed   -> in_progress   (rollback only)
/// pending     -> skipped                  (optional steps)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
            StepStatus::Skipped => "skipped",
        }
    }

    /// The step is currently being worked on (possibly paused).
    pub fn is_active(&self) -> bool {
        matches!(self, StepStatus::InProgress | StepStatus::Blocked)
    }

    /// Routing has moved past this row.
    pub fn is_finished(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One case's record of having entered a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub id: ProgressId,
    pub case_id: CaseId,
    pub step_id: String,
    pub status: StepStatus,
    /// Opaque form submission, saved independently of completion.
    #[serde(default)]
    pub form_data: Option<serde_json::Value>,
    /// Set only on completed decision steps.
    #[serde(default)]
    pub decision_taken: Option<bool>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub rolled_back_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub rolled_back_by: Option<UserId>,
    #[serde(default)]
    pub rollback_reason: Option<String>,
    #[serde(default)]
    pub rollback_count: u32,
    #[serde(default)]
    pub notes: Option<String>,
    /// The row whose completion (or skip) auto-entered this one.
    #[serde(default)]
    pub entered_from: Option<ProgressId>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

/// The fields a caller chooses when inserting a row; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStepProgress {
    pub case_id: CaseId,
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: Option<OffsetDateTime>,
    pub entered_from: Option<ProgressId>,
}

impl NewStepProgress {
    /// A row entering `step_id` now.
    pub fn entered(
        case_id: impl Into<CaseId>,
        step_id: impl Into<String>,
        started_at: OffsetDateTime,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            step_id: step_id.into(),
            status: StepStatus::InProgress,
            started_at: Some(started_at),
            entered_from: None,
        }
    }

    /// A row recording that the case routed past `step_id` without entering it.
    pub fn skipped(case_id: impl Into<CaseId>, step_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            started_at: None,
            entered_from: None,
        }
    }

    pub fn with_entered_from(mut self, source: ProgressId) -> Self {
        self.entered_from = Some(source);
        self
    }

    /// Materialize the row under the id assigned by the store.
    pub fn into_record(self, id: ProgressId) -> StepProgress {
        StepProgress {
            id,
            case_id: self.case_id,
            step_id: self.step_id,
            status: self.status,
            form_data: None,
            decision_taken: None,
            started_at: self.started_at,
            completed_at: None,
            rolled_back_at: None,
            rolled_back_by: None,
            rollback_reason: None,
            rollback_count: 0,
            notes: None,
            entered_from: self.entered_from,
            blocked_reason: None,
        }
    }
}
