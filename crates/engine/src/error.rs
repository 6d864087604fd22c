use caseflow_graph::GraphError;
use caseflow_storage::{StepStatus, StorageError};

use crate::events::EventSourceError;
use crate::rollback::RollbackDenial;

/// Errors surfaced by [`WorkflowEngine`](crate::WorkflowEngine) operations.
///
/// All variants except `Storage` and `EventSource` are deterministic
/// validation failures: the operation was rejected before anything was
/// written, and retrying it unchanged will fail the same way.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Graph lookup failed (unknown step or world, missing decision).
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The step already has an in_progress (or blocked) row for this case.
    #[error("step '{step_id}' is already active for case '{case_id}'")]
    AlreadyActive { case_id: String, step_id: String },

    /// `start_case` on a case that already has progress.
    #[error("case '{case_id}' has already been started")]
    AlreadyStarted { case_id: String },

    /// No active progress row to operate on.
    #[error("no active progress for step '{step_id}' in case '{case_id}'")]
    NotFound { case_id: String, step_id: String },

    /// Decision operation on a linear step, or the reverse.
    #[error("wrong step type for '{step_id}': {detail}")]
    WrongStepType {
        step_id: String,
        detail: &'static str,
    },

    /// Skip requested for a step that is not optional.
    #[error("step '{step_id}' is not optional and cannot be skipped")]
    NotOptional { step_id: String },

    /// The row exists but its status does not allow the requested action.
    #[error("cannot {action} step '{step_id}' in case '{case_id}' while it is {status}")]
    InvalidTransition {
        case_id: String,
        step_id: String,
        status: StepStatus,
        action: &'static str,
    },

    /// Rollback eligibility check failed.
    #[error("rollback of step '{step_id}' in case '{case_id}' not allowed: {denial}")]
    RollbackNotAllowed {
        case_id: String,
        step_id: String,
        denial: RollbackDenial,
    },

    /// The step belongs to a different world than the case's existing progress.
    #[error("step '{step_id}' is not part of world '{case_world}' used by case '{case_id}'")]
    WorldMismatch {
        case_id: String,
        case_world: String,
        step_id: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    EventSource(#[from] EventSourceError),
}

impl EngineError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Graph(GraphError::UnknownStep { .. })
            | EngineError::Graph(GraphError::UnknownStepId { .. }) => "unknown_step",
            EngineError::Graph(GraphError::UnknownWorld { .. }) => "unknown_world",
            EngineError::Graph(GraphError::DecisionRequired { .. }) => "decision_required",
            EngineError::Graph(_) => "invalid_graph",
            EngineError::AlreadyActive { .. } => "already_active",
            EngineError::AlreadyStarted { .. } => "already_started",
            EngineError::NotFound { .. } => "not_found",
            EngineError::WrongStepType { .. } => "wrong_step_type",
            EngineError::NotOptional { .. } => "not_optional",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::RollbackNotAllowed { .. } => "rollback_not_allowed",
            EngineError::WorldMismatch { .. } => "world_mismatch",
            EngineError::Storage(_) => "storage_error",
            EngineError::EventSource(_) => "event_source_error",
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
