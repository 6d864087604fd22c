use std::future::Future;

use super::{fixed_time, make_entry, seed, TestResult};
use crate::{ProgressStore, StepStatus};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "insert",
        "insert_returns_entered_row",
        insert_returns_entered_row(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "insert_assigns_increasing_ids",
        insert_assigns_increasing_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "same_step_twice_creates_two_rows",
        same_step_twice_creates_two_rows(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "update_round_trips_all_fields",
        update_round_trips_all_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "get_progress_reads_committed_row",
        get_progress_reads_committed_row(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "list_cases_reports_committed_cases",
        list_cases_reports_committed_cases(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// The inserted row carries the requested fields and empty audit fields.
async fn insert_returns_entered_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let row = seed(&s, "case-1", "intake").await?;
    if row.case_id != "case-1" || row.step_id != "intake" {
        return Err(format!("unexpected keys: {}/{}", row.case_id, row.step_id));
    }
    if row.status != StepStatus::InProgress {
        return Err(format!("expected in_progress, got {}", row.status));
    }
    if row.started_at != Some(fixed_time()) {
        return Err(format!("unexpected started_at {:?}", row.started_at));
    }
    if row.completed_at.is_some() || row.decision_taken.is_some() || row.rollback_count != 0 {
        return Err(format!("fresh row has audit fields set: {:?}", row));
    }
    Ok(())
}

/// Ids grow in insertion order, within and across snapshots.
async fn insert_assigns_increasing_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    let a = s
        .insert_progress(&mut snap, make_entry("case-1", "intake"))
        .await
        .map_err(|e| e.to_string())?;
    let b = s
        .insert_progress(&mut snap, make_entry("case-1", "assess"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let c = seed(&s, "case-1", "pay").await?;

    if !(a.id < b.id && b.id < c.id) {
        return Err(format!("ids not increasing: {} {} {}", a.id, b.id, c.id));
    }
    let listed: Vec<_> = s
        .list_progress("case-1")
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|r| r.id)
        .collect();
    if listed != [a.id, b.id, c.id] {
        return Err(format!("list not in id order: {:?}", listed));
    }
    Ok(())
}

/// Rows are keyed by surrogate id, never by (case, step).
async fn same_step_twice_creates_two_rows<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let first = seed(&s, "case-1", "review").await?;
    let second = seed(&s, "case-1", "review").await?;
    if first.id == second.id {
        return Err("second insert reused the first id".to_string());
    }
    let rows = s.list_progress("case-1").await.map_err(|e| e.to_string())?;
    if rows.len() != 2 {
        return Err(format!("expected 2 rows, got {}", rows.len()));
    }
    Ok(())
}

/// Every mutable field survives update + commit + read.
async fn update_round_trips_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut row = seed(&s, "case-1", "assess").await?;

    row.status = StepStatus::Completed;
    row.form_data = Some(serde_json::json!({"x": 1, "nested": {"ok": true}}));
    row.decision_taken = Some(false);
    row.completed_at = Some(fixed_time());
    row.rolled_back_at = Some(fixed_time());
    row.rolled_back_by = Some("adjuster-7".to_string());
    row.rollback_reason = Some("wrong branch".to_string());
    row.rollback_count = 2;
    row.notes = Some("checked".to_string());
    row.entered_from = Some(42);
    row.blocked_reason = Some("waiting".to_string());

    let mut snap = s.begin_snapshot("case-1").await.map_err(|e| e.to_string())?;
    s.update_progress(&mut snap, row.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let read = s.get_progress(row.id).await.map_err(|e| e.to_string())?;
    if read != row {
        return Err(format!("round-trip mismatch:\n  wrote {:?}\n  read  {:?}", row, read));
    }
    Ok(())
}

async fn get_progress_reads_committed_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed(&s, "case-1", "intake").await?;
    let b = seed(&s, "case-2", "intake").await?;
    let read = s.get_progress(b.id).await.map_err(|e| e.to_string())?;
    if read.case_id != "case-2" {
        return Err(format!("expected case-2, got {}", read.case_id));
    }
    let read = s.get_progress(a.id).await.map_err(|e| e.to_string())?;
    if read.case_id != "case-1" {
        return Err(format!("expected case-1, got {}", read.case_id));
    }
    Ok(())
}

async fn list_cases_reports_committed_cases<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, "case-b", "intake").await?;
    seed(&s, "case-a", "intake").await?;
    seed(&s, "case-b", "assess").await?;

    // An aborted snapshot leaves no trace.
    let mut snap = s.begin_snapshot("case-c").await.map_err(|e| e.to_string())?;
    s.insert_progress(&mut snap, make_entry("case-c", "intake"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let cases = s.list_cases().await.map_err(|e| e.to_string())?;
    if cases != ["case-a", "case-b"] {
        return Err(format!("unexpected cases: {:?}", cases));
    }
    Ok(())
}
