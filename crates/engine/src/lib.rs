//! caseflow-engine: executes per-case progress through a world's step graph.
//!
//! - [`WorkflowEngine`] advances, decides, blocks, skips and rolls back
//!   steps. Every operation runs inside one [`ProgressStore`] snapshot:
//!   read, validate, write, auto-advance, commit. Any error aborts the
//!   snapshot, so no operation partially applies.
//! - [`RollbackPolicy`] decides whether a completed step may be reverted
//!   and which auto-advanced rows revert with it.
//! - [`timeline::assemble`] merges progress rows with ancillary events
//!   (comments, tasks, appointments, documents) into one ordered timeline.

mod case;
pub mod clock;
mod engine;
mod error;
pub mod events;
pub mod rollback;
pub mod timeline;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::WorkflowEngine;
pub use error::{EngineError, EngineResult};
pub use events::{AncillaryEvent, EventKind, EventSource, EventSourceError, InMemoryEventSource};
pub use rollback::{
    RollbackDenial, RollbackEligibility, RollbackEvent, RollbackObserver, RollbackPlan,
    RollbackPolicy,
};
pub use timeline::{Timeline, TimelineEntry, TimelineStep};

pub use caseflow_graph::{StepCatalog, StepTemplate, WorldGraph};
pub use caseflow_storage::{InMemoryProgressStore, ProgressStore, StepProgress, StepStatus};
