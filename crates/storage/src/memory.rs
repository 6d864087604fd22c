//! In-memory `ProgressStore` backend.
//!
//! Committed rows live in a map keyed by case. A snapshot stages its writes
//! locally and holds the case's lock until it is committed, aborted or
//! dropped, which gives the same guarantees a relational backend gets from
//! `SELECT ... FOR UPDATE` on the case. A case's lock is forgotten once the
//! last snapshot on it is committed or aborted; a snapshot that is merely
//! dropped leaves its entry behind until the next one on that case finishes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::StorageError;
use crate::record::{CaseId, NewStepProgress, ProgressId, StepProgress};
use crate::traits::ProgressStore;

type CaseRows = BTreeMap<ProgressId, StepProgress>;

/// Process-local progress store. Cheap to create; used by the server and tests.
#[derive(Debug)]
pub struct InMemoryProgressStore {
    committed: RwLock<HashMap<CaseId, CaseRows>>,
    case_locks: Mutex<HashMap<CaseId, Arc<Mutex<()>>>>,
    next_id: AtomicI64,
}

/// An open transaction on one case.
#[derive(Debug)]
pub struct MemorySnapshot {
    case_id: CaseId,
    staged: CaseRows,
    _case_lock: OwnedMutexGuard<()>,
}

impl MemorySnapshot {
    pub fn case_id(&self) -> &str {
        &self.case_id
    }
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(HashMap::new()),
            case_locks: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Drop a snapshot's hold on its case lock and forget the lock once no
    /// snapshot holds or awaits it.
    async fn release(&self, case_id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.case_locks.lock().await;
        if locks
            .get(case_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(case_id);
        }
    }

    fn check_case(
        snapshot: &MemorySnapshot,
        id: ProgressId,
        case_id: &str,
    ) -> Result<(), StorageError> {
        if case_id != snapshot.case_id {
            return Err(StorageError::CaseMismatch {
                id,
                expected: snapshot.case_id.clone(),
                actual: case_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self, case_id: &str) -> Result<MemorySnapshot, StorageError> {
        let lock = {
            let mut locks = self.case_locks.lock().await;
            locks.entry(case_id.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        tracing::debug!(case_id, "snapshot opened");
        Ok(MemorySnapshot {
            case_id: case_id.to_string(),
            staged: BTreeMap::new(),
            _case_lock: guard,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot {
            case_id,
            staged,
            _case_lock: guard,
        } = snapshot;
        let written = staged.len();
        if written > 0 {
            let mut committed = self.committed.write().await;
            committed.entry(case_id.clone()).or_default().extend(staged);
        }
        self.release(&case_id, guard).await;
        tracing::debug!(case_id = %case_id, written, "snapshot committed");
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot {
            case_id,
            staged,
            _case_lock: guard,
        } = snapshot;
        self.release(&case_id, guard).await;
        tracing::debug!(case_id = %case_id, discarded = staged.len(), "snapshot aborted");
        Ok(())
    }

    async fn list_progress_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
    ) -> Result<Vec<StepProgress>, StorageError> {
        let committed = self.committed.read().await;
        let mut rows = committed
            .get(&snapshot.case_id)
            .cloned()
            .unwrap_or_default();
        rows.extend(snapshot.staged.iter().map(|(id, row)| (*id, row.clone())));
        Ok(rows.into_values().collect())
    }

    async fn insert_progress(
        &self,
        snapshot: &mut MemorySnapshot,
        record: NewStepProgress,
    ) -> Result<StepProgress, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Self::check_case(snapshot, id, &record.case_id)?;
        let row = record.into_record(id);
        snapshot.staged.insert(id, row.clone());
        Ok(row)
    }

    async fn update_progress(
        &self,
        snapshot: &mut MemorySnapshot,
        record: StepProgress,
    ) -> Result<(), StorageError> {
        Self::check_case(snapshot, record.id, &record.case_id)?;
        let exists = snapshot.staged.contains_key(&record.id) || {
            let committed = self.committed.read().await;
            committed
                .get(&snapshot.case_id)
                .is_some_and(|rows| rows.contains_key(&record.id))
        };
        if !exists {
            return Err(StorageError::ProgressNotFound { id: record.id });
        }
        snapshot.staged.insert(record.id, record);
        Ok(())
    }

    async fn list_progress(&self, case_id: &str) -> Result<Vec<StepProgress>, StorageError> {
        let committed = self.committed.read().await;
        Ok(committed
            .get(case_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_progress(&self, id: ProgressId) -> Result<StepProgress, StorageError> {
        let committed = self.committed.read().await;
        committed
            .values()
            .find_map(|rows| rows.get(&id))
            .cloned()
            .ok_or(StorageError::ProgressNotFound { id })
    }

    async fn list_cases(&self) -> Result<Vec<String>, StorageError> {
        let committed = self.committed.read().await;
        let mut cases: Vec<String> = committed.keys().cloned().collect();
        cases.sort();
        Ok(cases)
    }
}
