use std::sync::Arc;

use futures::future::try_join_all;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use caseflow_graph::{StepCatalog, StepTemplate};
use caseflow_storage::{NewStepProgress, ProgressStore, StepProgress, StepStatus};

use crate::case::latest_for_step;
use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, EngineResult};
use crate::events::{AncillaryEvent, EventSource};
use crate::rollback::{RollbackEligibility, RollbackEvent, RollbackObserver, RollbackPolicy};
use crate::timeline::{self, Timeline, TimelineStep};

/// Drives cases through their world's step graph.
///
/// Each mutating operation opens one snapshot on the case, reads its rows,
/// validates, writes, auto-advances and commits. An error at any point
/// aborts the snapshot. Snapshots serialize per case, which is what keeps
/// at most one active row per `(case, step)`.
pub struct WorkflowEngine<S: ProgressStore> {
    catalog: Arc<StepCatalog>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    observers: Vec<Arc<dyn RollbackObserver>>,
    event_sources: Vec<Arc<dyn EventSource>>,
}

impl<S: ProgressStore> WorkflowEngine<S> {
    pub fn new(catalog: Arc<StepCatalog>, store: Arc<S>) -> Self {
        Self {
            catalog,
            store,
            clock: Arc::new(SystemClock),
            observers: Vec::new(),
            event_sources: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rollback_observer(mut self, observer: Arc<dyn RollbackObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.event_sources.push(source);
        self
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn steps(&self, world_id: &str) -> EngineResult<&[StepTemplate]> {
        Ok(self.catalog.steps_for_world(world_id)?)
    }

    /// Every committed row of the case, ascending by id.
    pub async fn progress(&self, case_id: &str) -> EngineResult<Vec<StepProgress>> {
        Ok(self.store.list_progress(case_id).await?)
    }

    pub async fn rollback_eligibility(
        &self,
        case_id: &str,
        step_id: &str,
    ) -> EngineResult<RollbackEligibility> {
        let world = self.catalog.world_of(step_id)?;
        let rows = self.store.list_progress(case_id).await?;
        Ok(RollbackPolicy::eligibility(world, &rows, step_id))
    }

    /// Assemble the case's timeline, ascending by position.
    ///
    /// Progress rows and every registered event source are read concurrently.
    pub async fn timeline(&self, case_id: &str) -> EngineResult<Timeline> {
        let rows = async {
            self.store
                .list_progress(case_id)
                .await
                .map_err(EngineError::from)
        };
        let batches = async {
            try_join_all(self.event_sources.iter().map(|s| s.events_for_case(case_id)))
                .await
                .map_err(EngineError::from)
        };
        let (rows, batches) = futures::try_join!(rows, batches)?;
        let events: Vec<AncillaryEvent> = batches.into_iter().flatten().collect();

        let steps = match rows.first() {
            Some(first) => {
                let world = self.catalog.world_of(&first.step_id)?;
                TimelineStep::from_world(world, rows)?
            }
            None => Vec::new(),
        };
        debug!(case_id, rows = steps.len(), events = events.len(), "Assembling timeline");
        Ok(timeline::assemble(steps, events))
    }

    // ── Transitions ───────────────────────────────────────────────────────────

    /// Enter the first step of `world_id` for a case with no progress yet.
    pub async fn start_case(&self, case_id: &str, world_id: &str) -> EngineResult<StepProgress> {
        let first = self.catalog.first_step(world_id)?;
        let now = self.clock.now();

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            if !rows.is_empty() {
                return Err(EngineError::AlreadyStarted {
                    case_id: case_id.to_string(),
                });
            }
            let entry = NewStepProgress::entered(case_id, first.id.as_str(), now);
            Ok::<_, EngineError>(self.store.insert_progress(&mut snapshot, entry).await?)
        }
        .await;
        let row = self.finish(snapshot, outcome).await?;

        info!(case_id, world_id, step_id = %row.step_id, progress_id = row.id, "Case started");
        Ok(row)
    }

    /// Make `step_id` in_progress for the case.
    ///
    /// A pending row left behind by a rollback is reused; otherwise a new row
    /// is inserted.
    pub async fn enter_step(&self, case_id: &str, step_id: &str) -> EngineResult<StepProgress> {
        let template = self.catalog.step(step_id)?;
        let now = self.clock.now();

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            self.check_world(case_id, &rows, template)?;
            match latest_for_step(&rows, step_id) {
                Some(row) if row.status.is_active() => Err(EngineError::AlreadyActive {
                    case_id: case_id.to_string(),
                    step_id: step_id.to_string(),
                }),
                Some(row) if row.status == StepStatus::Pending => {
                    let mut row = row.clone();
                    row.status = StepStatus::InProgress;
                    row.started_at = Some(now);
                    self.store.update_progress(&mut snapshot, row.clone()).await?;
                    Ok(row)
                }
                _ => {
                    let entry = NewStepProgress::entered(case_id, step_id, now);
                    Ok::<_, EngineError>(self.store.insert_progress(&mut snapshot, entry).await?)
                }
            }
        }
        .await;
        let row = self.finish(snapshot, outcome).await?;

        info!(case_id, step_id, progress_id = row.id, "Step entered");
        Ok(row)
    }

    /// Store form data on the active row without changing its status.
    pub async fn save_form_data(
        &self,
        case_id: &str,
        step_id: &str,
        data: serde_json::Value,
    ) -> EngineResult<StepProgress> {
        self.catalog.step(step_id)?;

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            let mut row = in_progress_row(&rows, case_id, step_id, "save form data for")?;
            row.form_data = Some(data);
            self.store.update_progress(&mut snapshot, row.clone()).await?;
            Ok::<_, EngineError>(row)
        }
        .await;
        let row = self.finish(snapshot, outcome).await?;

        debug!(case_id, step_id, progress_id = row.id, "Form data saved");
        Ok(row)
    }

    /// Complete a linear step and enter its successor.
    pub async fn complete_step(
        &self,
        case_id: &str,
        step_id: &str,
        notes: Option<String>,
    ) -> EngineResult<StepProgress> {
        let template = self.catalog.step(step_id)?;
        if template.requires_decision {
            return Err(EngineError::WrongStepType {
                step_id: step_id.to_string(),
                detail: "step requires a decision",
            });
        }
        self.finish_step(case_id, template, None, notes).await
    }

    /// Record the yes/no outcome of a decision step and enter the chosen branch.
    pub async fn decide_step(
        &self,
        case_id: &str,
        step_id: &str,
        decision: bool,
        notes: Option<String>,
    ) -> EngineResult<StepProgress> {
        let template = self.catalog.step(step_id)?;
        if !template.requires_decision {
            return Err(EngineError::WrongStepType {
                step_id: step_id.to_string(),
                detail: "step does not take a decision",
            });
        }
        self.finish_step(case_id, template, Some(decision), notes)
            .await
    }

    pub async fn block_step(
        &self,
        case_id: &str,
        step_id: &str,
        reason: &str,
    ) -> EngineResult<StepProgress> {
        self.catalog.step(step_id)?;

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            let mut row = in_progress_row(&rows, case_id, step_id, "block")?;
            row.status = StepStatus::Blocked;
            row.blocked_reason = Some(reason.to_string());
            self.store.update_progress(&mut snapshot, row.clone()).await?;
            Ok::<_, EngineError>(row)
        }
        .await;
        let row = self.finish(snapshot, outcome).await?;

        info!(case_id, step_id, progress_id = row.id, reason, "Step blocked");
        Ok(row)
    }

    pub async fn unblock_step(&self, case_id: &str, step_id: &str) -> EngineResult<StepProgress> {
        self.catalog.step(step_id)?;

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            let mut row = match latest_for_step(&rows, step_id) {
                Some(row) if row.status == StepStatus::Blocked => row.clone(),
                Some(row) => return Err(invalid(case_id, step_id, row.status, "unblock")),
                None => return Err(not_found(case_id, step_id)),
            };
            row.status = StepStatus::InProgress;
            row.blocked_reason = None;
            self.store.update_progress(&mut snapshot, row.clone()).await?;
            Ok::<_, EngineError>(row)
        }
        .await;
        let row = self.finish(snapshot, outcome).await?;

        info!(case_id, step_id, progress_id = row.id, "Step unblocked");
        Ok(row)
    }

    /// Route a started case past an optional step it has not begun.
    ///
    /// The step's latest row must be pending, or the step must not have been
    /// entered yet, in which case a skipped row is recorded for it.
    pub async fn skip_step(
        &self,
        case_id: &str,
        step_id: &str,
        notes: Option<String>,
    ) -> EngineResult<StepProgress> {
        let template = self.catalog.step(step_id)?;
        if template.requires_decision {
            return Err(EngineError::WrongStepType {
                step_id: step_id.to_string(),
                detail: "decision steps cannot be skipped",
            });
        }
        if !template.is_optional {
            return Err(EngineError::NotOptional {
                step_id: step_id.to_string(),
            });
        }
        let now = self.clock.now();

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            if rows.is_empty() {
                return Err(not_found(case_id, step_id));
            }
            self.check_world(case_id, &rows, template)?;
            let mut row = match latest_for_step(&rows, step_id) {
                Some(row) if row.status == StepStatus::Pending => row.clone(),
                Some(row) => return Err(invalid(case_id, step_id, row.status, "skip")),
                None => {
                    let entry = NewStepProgress::skipped(case_id, step_id);
                    self.store.insert_progress(&mut snapshot, entry).await?
                }
            };
            row.status = StepStatus::Skipped;
            if notes.is_some() {
                row.notes = notes;
            }
            self.store.update_progress(&mut snapshot, row.clone()).await?;
            self.advance(&mut snapshot, template, &row, None, now).await?;
            Ok::<_, EngineError>(row)
        }
        .await;
        let row = self.finish(snapshot, outcome).await?;

        info!(case_id, step_id, progress_id = row.id, "Step skipped");
        Ok(row)
    }

    /// Revert the latest completed row of `step_id` to in_progress.
    ///
    /// Rows auto-entered from it go back to pending. Eligibility is checked
    /// against the snapshot before anything is written.
    pub async fn rollback(
        &self,
        case_id: &str,
        step_id: &str,
        reason: &str,
        actor: &str,
    ) -> EngineResult<StepProgress> {
        let world = self.catalog.world_of(step_id)?;
        let now = self.clock.now();

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            let plan = RollbackPolicy::plan(world, &rows, step_id).map_err(|denial| {
                EngineError::RollbackNotAllowed {
                    case_id: case_id.to_string(),
                    step_id: step_id.to_string(),
                    denial,
                }
            })?;
            let reset = plan.reset_ids();
            let (target, cascade) = plan.apply(reason, actor, now);
            self.store.update_progress(&mut snapshot, target.clone()).await?;
            for row in cascade {
                self.store.update_progress(&mut snapshot, row).await?;
            }
            Ok::<_, EngineError>((target, reset))
        }
        .await;
        let (row, reset) = match self.finish(snapshot, outcome).await {
            Ok(done) => done,
            Err(err) => {
                if let EngineError::RollbackNotAllowed { denial, .. } = &err {
                    warn!(case_id, step_id, %denial, "Rollback refused");
                }
                return Err(err);
            }
        };

        info!(
            case_id,
            step_id,
            progress_id = row.id,
            actor,
            reset = reset.len(),
            rollback_count = row.rollback_count,
            "Step rolled back"
        );

        let event = RollbackEvent {
            case_id: case_id.to_string(),
            step_id: step_id.to_string(),
            progress_id: row.id,
            reset_progress_ids: reset,
            actor: actor.to_string(),
            reason: reason.to_string(),
            rolled_back_at: now,
            rollback_count: row.rollback_count,
        };
        for observer in &self.observers {
            observer.step_rolled_back(&event);
        }
        Ok(row)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Shared body of complete and decide.
    async fn finish_step(
        &self,
        case_id: &str,
        template: &StepTemplate,
        decision: Option<bool>,
        notes: Option<String>,
    ) -> EngineResult<StepProgress> {
        let step_id = template.id.as_str();
        let action = if decision.is_some() { "decide" } else { "complete" };
        let now = self.clock.now();

        let mut snapshot = self.store.begin_snapshot(case_id).await?;
        let outcome = async {
            let rows = self.store.list_progress_for_update(&mut snapshot).await?;
            let mut row = in_progress_row(&rows, case_id, step_id, action)?;
            row.status = StepStatus::Completed;
            row.completed_at = Some(now);
            row.decision_taken = decision;
            if notes.is_some() {
                row.notes = notes;
            }
            self.store.update_progress(&mut snapshot, row.clone()).await?;
            self.advance(&mut snapshot, template, &row, decision, now)
                .await?;
            Ok::<_, EngineError>(row)
        }
        .await;
        let row = self.finish(snapshot, outcome).await?;

        info!(
            case_id,
            step_id,
            progress_id = row.id,
            decision = ?row.decision_taken,
            "Step completed"
        );
        Ok(row)
    }

    /// Enter the successors of `source` selected by `decision`.
    ///
    /// A successor whose latest row is finished gets a new row only on a loop
    /// edge, or when the source itself is on a repeated pass and the
    /// successor's row predates it. Rows are re-read for each successor so a
    /// step that routes to itself sees the row just finished.
    async fn advance(
        &self,
        snapshot: &mut S::Snapshot,
        source: &StepTemplate,
        source_row: &StepProgress,
        decision: Option<bool>,
        now: OffsetDateTime,
    ) -> EngineResult<Vec<StepProgress>> {
        let successors = self.catalog.successors_of(&source.id, decision)?;
        if successors.is_empty() {
            debug!(case_id = %source_row.case_id, step_id = %source.id, "Terminal step, nothing to enter");
        }

        let mut entered = Vec::new();
        for target_id in successors {
            let target = self.catalog.step(&target_id)?;
            let rows = self.store.list_progress_for_update(snapshot).await?;
            let latest = latest_for_step(&rows, &target_id);

            let row = match latest {
                None => {
                    let entry = NewStepProgress::entered(&source_row.case_id, &target_id, now)
                        .with_entered_from(source_row.id);
                    self.store.insert_progress(snapshot, entry).await?
                }
                Some(pending) if pending.status == StepStatus::Pending => {
                    let mut row = pending.clone();
                    row.status = StepStatus::InProgress;
                    row.started_at = Some(now);
                    row.entered_from = Some(source_row.id);
                    self.store.update_progress(snapshot, row.clone()).await?;
                    row
                }
                Some(existing) if existing.status.is_active() => {
                    debug!(step_id = %target_id, status = %existing.status, "Successor already active");
                    continue;
                }
                Some(finished) => {
                    let loop_edge = source.can_loop_back && target.order <= source.order;
                    let repeat_pass = finished.id < source_row.id
                        && rows
                            .iter()
                            .any(|r| r.step_id == source.id && r.id < source_row.id);
                    if !(loop_edge || repeat_pass) {
                        debug!(step_id = %target_id, status = %finished.status, "Successor already finished");
                        continue;
                    }
                    debug!(from = %source.id, to = %target_id, "Re-entering finished step");
                    let entry = NewStepProgress::entered(&source_row.case_id, &target_id, now)
                        .with_entered_from(source_row.id);
                    self.store.insert_progress(snapshot, entry).await?
                }
            };
            debug!(
                from = %source.id,
                to = %row.step_id,
                progress_id = row.id,
                "Auto-advanced"
            );
            entered.push(row);
        }
        Ok(entered)
    }

    /// Commit on success, abort on failure.
    async fn finish<T>(&self, snapshot: S::Snapshot, outcome: EngineResult<T>) -> EngineResult<T> {
        match outcome {
            Ok(value) => {
                self.store.commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = self.store.abort_snapshot(snapshot).await {
                    warn!(error = %abort_err, "Failed to abort snapshot");
                }
                Err(err)
            }
        }
    }

    fn check_world(
        &self,
        case_id: &str,
        rows: &[StepProgress],
        template: &StepTemplate,
    ) -> EngineResult<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let case_world = self.catalog.world_of(&first.step_id)?;
        if case_world.id() != template.world_id {
            return Err(EngineError::WorldMismatch {
                case_id: case_id.to_string(),
                case_world: case_world.id().to_string(),
                step_id: template.id.clone(),
            });
        }
        Ok(())
    }
}

/// The latest row of `step_id`, which must be in_progress for `action`.
fn in_progress_row(
    rows: &[StepProgress],
    case_id: &str,
    step_id: &str,
    action: &'static str,
) -> EngineResult<StepProgress> {
    match latest_for_step(rows, step_id) {
        Some(row) if row.status == StepStatus::InProgress => Ok(row.clone()),
        Some(row) if row.status == StepStatus::Blocked => {
            Err(invalid(case_id, step_id, row.status, action))
        }
        _ => Err(not_found(case_id, step_id)),
    }
}

fn not_found(case_id: &str, step_id: &str) -> EngineError {
    EngineError::NotFound {
        case_id: case_id.to_string(),
        step_id: step_id.to_string(),
    }
}

fn invalid(case_id: &str, step_id: &str, status: StepStatus, action: &'static str) -> EngineError {
    EngineError::InvalidTransition {
        case_id: case_id.to_string(),
        step_id: step_id.to_string(),
        status,
        action,
    }
}
