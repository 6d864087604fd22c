//! caseflow-storage: persistence abstraction for per-case step progress.
//!
//! Progress rows are append-friendly: each entry into a step creates a row
//! keyed by a surrogate [`ProgressId`], so a step visited twice through a
//! loop-back owns two rows. Rows are never deleted; rollback is a status
//! transition.
//!
//! All writes go through a snapshot (transaction) scoped to one case. See
//! [`ProgressStore`] for the lifecycle.

pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{InMemoryProgressStore, MemorySnapshot};
pub use record::{CaseId, NewStepProgress, ProgressId, StepProgress, StepStatus, UserId};
pub use traits::ProgressStore;
