use std::future::Future;
use std::sync::Arc;

use super::{make_entry, TestResult};
use crate::{ProgressStore, StepStatus, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "same_case_check_then_insert_exactly_one_wins",
        same_case_check_then_insert_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "different_cases_all_succeed",
        different_cases_all_succeed(factory).await,
    ));

    results
}

// ── Same case: snapshots serialize ──────────────────────────────────────────

/// N tasks each open a snapshot on the same case, look for an active row of
/// step "intake", and insert one only if none exists. Because snapshots of a
/// case serialize, exactly one row may result.
///
/// This is the pattern the engine relies on to keep at most one in_progress
/// row per (case, step).
async fn same_case_check_then_insert_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot("case-1").await?;
            let rows = s.list_progress_for_update(&mut snap).await?;
            let active = rows
                .iter()
                .any(|r| r.step_id == "intake" && r.status == StepStatus::InProgress);
            if active {
                s.abort_snapshot(snap).await?;
                return Ok::<bool, StorageError>(false);
            }
            tokio::task::yield_now().await;
            s.insert_progress(&mut snap, make_entry("case-1", "intake"))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok(true)
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {}", winners));
    }
    let rows = storage
        .list_progress("case-1")
        .await
        .map_err(|e| e.to_string())?;
    if rows.len() != 1 {
        return Err(format!("expected 1 row, got {}", rows.len()));
    }
    Ok(())
}

// ── Different cases: independent ────────────────────────────────────────────

async fn different_cases_all_succeed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let case_id = format!("case-{i}");
            let mut snap = s.begin_snapshot(&case_id).await?;
            s.insert_progress(&mut snap, make_entry(&case_id, "intake"))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<(), StorageError>(())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
    }

    let cases = storage.list_cases().await.map_err(|e| e.to_string())?;
    if cases.len() != N {
        return Err(format!("expected {} cases, got {}", N, cases.len()));
    }
    Ok(())
}
