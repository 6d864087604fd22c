use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{NewStepProgress, ProgressId, StepProgress};

/// The storage trait for step-progress backends.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a transaction scoped
/// to a single case:
///
/// 1. `begin_snapshot(case_id)`: start a transaction and take the case's
///    lock. Concurrent snapshots for the same case wait; snapshots for
///    different cases proceed in parallel.
/// 2. Read with `list_progress_for_update`, write with `insert_progress` /
///    `update_progress`. Reads inside the snapshot see its own writes.
/// 3. `commit_snapshot(snapshot)`: make all writes durable and release the
///    lock, OR `abort_snapshot(snapshot)`: discard them.
///
/// If a `Snapshot` is dropped without committing, its writes MUST be
/// discarded and the case lock released.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared across
/// request handlers and async tasks.
#[async_trait]
pub trait ProgressStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a snapshot for `case_id`, serializing against other writers of
    /// the same case.
    async fn begin_snapshot(&self, case_id: &str) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all writes durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort a snapshot, discarding all writes.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Progress operations (within snapshot) ─────────────────────────────────

    /// All rows of the snapshot's case, ascending by id, including writes
    /// made earlier in the same snapshot.
    async fn list_progress_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
    ) -> Result<Vec<StepProgress>, StorageError>;

    /// Insert a new row and return it with its assigned id.
    ///
    /// Fails with `CaseMismatch` if `record.case_id` is not the snapshot's case.
    async fn insert_progress(
        &self,
        snapshot: &mut Self::Snapshot,
        record: NewStepProgress,
    ) -> Result<StepProgress, StorageError>;

    /// Overwrite an existing row, matched by `record.id`.
    ///
    /// Returns `Err(StorageError::ProgressNotFound)` if no such row exists,
    /// `Err(StorageError::CaseMismatch)` if it belongs to another case.
    async fn update_progress(
        &self,
        snapshot: &mut Self::Snapshot,
        record: StepProgress,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    /// Committed rows of a case, ascending by id. Empty for unknown cases.
    async fn list_progress(&self, case_id: &str) -> Result<Vec<StepProgress>, StorageError>;

    /// Read a committed row by id.
    ///
    /// Returns `Err(StorageError::ProgressNotFound)` if not found.
    async fn get_progress(&self, id: ProgressId) -> Result<StepProgress, StorageError>;

    /// Ids of every case with at least one committed row, sorted.
    async fn list_cases(&self) -> Result<Vec<String>, StorageError>;
}
