//! Conformance test suite for `ProgressStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `ProgressStore` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Insert**: id assignment, append-only rows, field round-trip
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes
//!   visible, aborted and dropped snapshots discarded
//! - **Error handling**: correct error variants for invalid operations
//! - **Concurrency**: writers of one case serialize, different cases don't block
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use caseflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod insert;
mod snapshot;

use std::fmt;
use std::future::Future;

use time::OffsetDateTime;

use crate::record::NewStepProgress;
use crate::ProgressStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "insert", "snapshot").
    pub category: String,
    /// Test name (e.g. "insert_assigns_increasing_ids").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ProgressStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// A fixed, second-precision timestamp so RFC 3339 round-trips compare equal.
fn fixed_time() -> OffsetDateTime {
    time::macros::datetime!(2025-01-01 09:00:00 UTC)
}

fn make_entry(case_id: &str, step_id: &str) -> NewStepProgress {
    NewStepProgress::entered(case_id, step_id, fixed_time())
}

/// Insert one entry for `case_id` in its own committed snapshot.
async fn seed<S: ProgressStore>(
    s: &S,
    case_id: &str,
    step_id: &str,
) -> Result<crate::StepProgress, String> {
    let mut snap = s
        .begin_snapshot(case_id)
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let row = s
        .insert_progress(&mut snap, make_entry(case_id, step_id))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(row)
}
