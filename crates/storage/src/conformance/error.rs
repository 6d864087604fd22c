use std::future::Future;

use super::{make_entry, seed, TestResult};
use crate::{ProgressStore, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_progress_nonexistent",
        get_progress_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_progress_nonexistent",
        update_progress_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_progress_other_case",
        update_progress_other_case(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "insert_progress_other_case",
        insert_progress_other_case(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_progress_empty_for_unknown_case",
        list_progress_empty_for_unknown_case(factory).await,
    ));

    results
}

async fn get_progress_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_progress(999).await {
        Err(StorageError::ProgressNotFound { id: 999 }) => Ok(()),
        other => Err(format!("expected ProgressNotFound, got {:?}", other)),
    }
}

async fn update_progress_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    let ghost = make_entry("case-1", "intake").into_record(999);
    let result = s.update_progress(&mut snap, ghost).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::ProgressNotFound { id: 999 }) => Ok(()),
        other => Err(format!("expected ProgressNotFound, got {:?}", other)),
    }
}

async fn update_progress_other_case<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let foreign = seed(&s, "case-2", "intake").await?;
    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    let result = s.update_progress(&mut snap, foreign).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::CaseMismatch {
            expected, actual, ..
        }) if expected == "case-1" && actual == "case-2" => Ok(()),
        other => Err(format!("expected CaseMismatch, got {:?}", other)),
    }
}

async fn insert_progress_other_case<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    let result = s
        .insert_progress(&mut snap, make_entry("case-2", "intake"))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::CaseMismatch { .. }) => Ok(()),
        other => Err(format!("expected CaseMismatch, got {:?}", other)),
    }
}

async fn list_progress_empty_for_unknown_case<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rows = s
        .list_progress("case-404")
        .await
        .map_err(|e| e.to_string())?;
    if !rows.is_empty() {
        return Err(format!("expected no rows, got {}", rows.len()));
    }
    Ok(())
}
