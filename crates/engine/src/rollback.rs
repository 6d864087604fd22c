//! Rollback eligibility and planning.
//!
//! Planning is pure: it reads a case's rows against the world graph and
//! either returns the exact set of rows a rollback would touch, or the
//! reason it is refused. The engine applies a plan inside the same snapshot
//! it was computed in, so a refused rollback writes nothing.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use time::OffsetDateTime;

use caseflow_graph::{Routing, StepTemplate, WorldGraph};
use caseflow_storage::{ProgressId, StepProgress, StepStatus, UserId};

use crate::case::latest_for_step;

/// Why a rollback is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "denial", rename_all = "snake_case")]
pub enum RollbackDenial {
    #[error("the step has no progress")]
    NoProgress,

    #[error("the step is {status}, not completed")]
    NotCompleted { status: StepStatus },

    /// A step reachable from the target has work of its own.
    #[error("downstream step '{step_id}' is {status}")]
    DownstreamActivity { step_id: String, status: StepStatus },
}

/// The rows a rollback will rewrite, captured before any write.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackPlan {
    pub target: StepProgress,
    /// Rows auto-entered from the target's completion; they revert to pending.
    pub cascade: Vec<StepProgress>,
}

impl RollbackPlan {
    /// Produce the rewritten rows: the target first, then the cascade.
    pub fn apply(
        self,
        reason: &str,
        actor: &str,
        now: OffsetDateTime,
    ) -> (StepProgress, Vec<StepProgress>) {
        let mut target = self.target;
        target.status = StepStatus::InProgress;
        target.completed_at = None;
        target.decision_taken = None;
        target.rollback_count += 1;
        target.rolled_back_at = Some(now);
        target.rolled_back_by = Some(UserId::from(actor));
        target.rollback_reason = Some(reason.to_string());

        let cascade = self
            .cascade
            .into_iter()
            .map(|mut row| {
                row.status = StepStatus::Pending;
                row.started_at = None;
                row.entered_from = None;
                row.blocked_reason = None;
                row
            })
            .collect();

        (target, cascade)
    }

    pub fn reset_ids(&self) -> Vec<ProgressId> {
        self.cascade.iter().map(|r| r.id).collect()
    }
}

/// Eligibility answer as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackEligibility {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub struct RollbackPolicy;

impl RollbackPolicy {
    /// Plan a rollback of the latest row of `step_id`.
    ///
    /// The target must be completed. Rows auto-entered from it may still be
    /// pending, in_progress or blocked and revert with it. Beyond those, no
    /// step reachable from the target along its taken branch may carry an
    /// active or finished row: that is work built on top of the target.
    pub fn plan(
        world: &WorldGraph,
        rows: &[StepProgress],
        step_id: &str,
    ) -> Result<RollbackPlan, RollbackDenial> {
        let target = latest_for_step(rows, step_id).ok_or(RollbackDenial::NoProgress)?;
        if target.status != StepStatus::Completed {
            return Err(RollbackDenial::NotCompleted {
                status: target.status,
            });
        }

        let mut cascade = Vec::new();
        for row in rows.iter().filter(|r| r.entered_from == Some(target.id)) {
            if row.status.is_finished() {
                return Err(RollbackDenial::DownstreamActivity {
                    step_id: row.step_id.clone(),
                    status: row.status,
                });
            }
            cascade.push(row.clone());
        }
        check_downstream(world, rows, target)?;

        Ok(RollbackPlan {
            target: target.clone(),
            cascade,
        })
    }

    pub fn can_rollback(world: &WorldGraph, rows: &[StepProgress], step_id: &str) -> bool {
        Self::plan(world, rows, step_id).is_ok()
    }

    pub fn eligibility(
        world: &WorldGraph,
        rows: &[StepProgress],
        step_id: &str,
    ) -> RollbackEligibility {
        match Self::plan(world, rows, step_id) {
            Ok(_) => RollbackEligibility {
                allowed: true,
                reason: None,
            },
            Err(denial) => RollbackEligibility {
                allowed: false,
                reason: Some(denial.to_string()),
            },
        }
    }
}

/// Breadth-first walk over the steps reachable from `target`.
///
/// Loop edges (to a step of equal or lower order) end the walk. Past the
/// target, undecided branches are followed both ways.
fn check_downstream(
    world: &WorldGraph,
    rows: &[StepProgress],
    target: &StepProgress,
) -> Result<(), RollbackDenial> {
    let Ok(start) = world.step(&target.step_id) else {
        return Ok(());
    };
    let mut seen: HashSet<&str> = HashSet::from([start.id.as_str()]);
    let mut queue = VecDeque::from([(start, target.decision_taken)]);

    while let Some((from, decision)) = queue.pop_front() {
        for next_id in branch(from, decision) {
            let Ok(next) = world.step(next_id) else {
                continue;
            };
            if next.order <= from.order || !seen.insert(next.id.as_str()) {
                continue;
            }
            let latest = latest_for_step(rows, &next.id)
                .filter(|row| !from_earlier_pass(rows, target, row));
            if let Some(row) = latest {
                let reverts = row.entered_from == Some(target.id);
                if row.status.is_finished() || (row.status.is_active() && !reverts) {
                    return Err(RollbackDenial::DownstreamActivity {
                        step_id: row.step_id.clone(),
                        status: row.status,
                    });
                }
            }
            queue.push_back((next, None));
        }
    }
    Ok(())
}

fn branch(step: &StepTemplate, decision: Option<bool>) -> Vec<&str> {
    match (step.routing(), decision) {
        (Routing::Decision { yes, .. }, Some(true)) => yes.into_iter().collect(),
        (Routing::Decision { no, .. }, Some(false)) => no.into_iter().collect(),
        _ => step.successor_ids().collect(),
    }
}

/// `row` predates the target but follows an earlier visit of the target's
/// step, so it was produced by a previous pass through a loop.
fn from_earlier_pass(rows: &[StepProgress], target: &StepProgress, row: &StepProgress) -> bool {
    row.id < target.id
        && rows
            .iter()
            .any(|r| r.step_id == target.step_id && r.id < row.id)
}

/// Published after a rollback commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackEvent {
    pub case_id: String,
    pub step_id: String,
    pub progress_id: ProgressId,
    pub reset_progress_ids: Vec<ProgressId>,
    pub actor: String,
    pub reason: String,
    #[serde(with = "time::serde::rfc3339")]
    pub rolled_back_at: OffsetDateTime,
    pub rollback_count: u32,
}

/// Notified of committed rollbacks, e.g. to supersede generated documents.
pub trait RollbackObserver: Send + Sync {
    fn step_rolled_back(&self, event: &RollbackEvent);
}
