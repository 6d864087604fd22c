//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! visible inside it, and that aborted or dropped snapshots are discarded.

use std::future::Future;

use super::{make_entry, seed, TestResult};
use crate::{ProgressStore, StepStatus};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "empty_snapshot_commits",
        empty_snapshot_commits(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_insert_invisible",
        uncommitted_insert_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_its_own_writes",
        snapshot_reads_its_own_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_inserts_and_updates",
        abort_discards_inserts_and_updates(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_is_discarded",
        dropped_snapshot_is_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "commit_applies_all_writes",
        commit_applies_all_writes(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "cases_are_isolated",
        cases_are_isolated(factory).await,
    ));

    results
}

async fn empty_snapshot_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let rows = s.list_progress("case-1").await.map_err(|e| e.to_string())?;
    if !rows.is_empty() {
        return Err(format!("expected no rows, got {}", rows.len()));
    }
    Ok(())
}

async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    let row = s
        .insert_progress(&mut snap, make_entry("case-1", "intake"))
        .await
        .map_err(|e| e.to_string())?;

    let listed = s.list_progress("case-1").await.map_err(|e| e.to_string())?;
    let fetched = s.get_progress(row.id).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if !listed.is_empty() {
        return Err("uncommitted insert visible to list_progress".to_string());
    }
    if fetched.is_ok() {
        return Err("uncommitted insert visible to get_progress".to_string());
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut row = seed(&s, "case-1", "intake").await?;

    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    row.status = StepStatus::Completed;
    s.update_progress(&mut snap, row.clone())
        .await
        .map_err(|e| e.to_string())?;
    let outside = s.get_progress(row.id).await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if outside.status != StepStatus::InProgress {
        return Err(format!(
            "uncommitted update visible: status {}",
            outside.status
        ));
    }
    let after = s.get_progress(row.id).await.map_err(|e| e.to_string())?;
    if after.status != StepStatus::Completed {
        return Err(format!("committed update lost: status {}", after.status));
    }
    Ok(())
}

async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut existing = seed(&s, "case-1", "intake").await?;

    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    existing.status = StepStatus::Completed;
    s.update_progress(&mut snap, existing.clone())
        .await
        .map_err(|e| e.to_string())?;
    let added = s
        .insert_progress(&mut snap, make_entry("case-1", "assess"))
        .await
        .map_err(|e| e.to_string())?;
    let rows = s
        .list_progress_for_update(&mut snap)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if rows.len() != 2 {
        return Err(format!("expected 2 rows in snapshot, got {}", rows.len()));
    }
    if rows[0].id != existing.id || rows[0].status != StepStatus::Completed {
        return Err(format!("staged update not visible: {:?}", rows[0]));
    }
    if rows[1].id != added.id {
        return Err(format!("staged insert not visible: {:?}", rows[1]));
    }
    Ok(())
}

async fn abort_discards_inserts_and_updates<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let original = seed(&s, "case-1", "intake").await?;

    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    let mut changed = original.clone();
    changed.status = StepStatus::Blocked;
    changed.blocked_reason = Some("missing police report".to_string());
    s.update_progress(&mut snap, changed)
        .await
        .map_err(|e| e.to_string())?;
    s.insert_progress(&mut snap, make_entry("case-1", "assess"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rows = s.list_progress("case-1").await.map_err(|e| e.to_string())?;
    if rows != [original] {
        return Err(format!("abort left changes behind: {:?}", rows));
    }
    Ok(())
}

async fn dropped_snapshot_is_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
        s.insert_progress(&mut snap, make_entry("case-1", "intake"))
            .await
            .map_err(|e| e.to_string())?;
    }

    // The case lock must have been released by the drop.
    let snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rows = s.list_progress("case-1").await.map_err(|e| e.to_string())?;
    if !rows.is_empty() {
        return Err(format!("dropped snapshot left {} rows", rows.len()));
    }
    Ok(())
}

async fn commit_applies_all_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut first = seed(&s, "case-1", "intake").await?;

    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    first.status = StepStatus::Completed;
    s.update_progress(&mut snap, first.clone())
        .await
        .map_err(|e| e.to_string())?;
    let next = s
        .insert_progress(
            &mut snap,
            make_entry("case-1", "assess").with_entered_from(first.id),
        )
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rows = s.list_progress("case-1").await.map_err(|e| e.to_string())?;
    if rows != [first.clone(), next.clone()] {
        return Err(format!("commit incomplete: {:?}", rows));
    }
    if rows[1].entered_from != Some(first.id) {
        return Err("entered_from not persisted".to_string());
    }
    Ok(())
}

async fn cases_are_isolated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "case-1", "intake").await?;
    seed(&s, "case-2", "intake").await?;
    seed(&s, "case-2", "assess").await?;

    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    let rows = s
        .list_progress_for_update(&mut snap)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    if rows.len() != 1 || rows[0].case_id != "case-1" {
        return Err(format!("snapshot saw rows of other cases: {:?}", rows));
    }
    Ok(())
}
