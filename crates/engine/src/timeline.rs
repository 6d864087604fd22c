//! Timeline assembly: progress rows interleaved with ancillary events.
//!
//! [`assemble`] is a pure function. Given the same rows and events it always
//! produces the same timeline, whatever order the inputs arrive in.

use std::cmp::Ordering;

use serde::Serialize;

use caseflow_graph::{GraphError, WorldGraph};
use caseflow_storage::StepProgress;

use crate::events::AncillaryEvent;

/// A progress row paired with the template fields the timeline displays.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineStep {
    pub order: u32,
    pub name: String,
    pub progress: StepProgress,
}

impl TimelineStep {
    /// Pair each row with its step template in `world`.
    pub fn from_world(
        world: &WorldGraph,
        rows: Vec<StepProgress>,
    ) -> Result<Vec<TimelineStep>, GraphError> {
        rows.into_iter()
            .map(|progress| {
                let template = world.step(&progress.step_id)?;
                Ok(TimelineStep {
                    order: template.order,
                    name: template.name.clone(),
                    progress,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    /// Dense 1-based display position over the rows that exist.
    pub position: usize,
    pub order: u32,
    pub step_name: String,
    pub progress: StepProgress,
    /// Newest first.
    pub events: Vec<AncillaryEvent>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Timeline {
    pub entries: Vec<TimelineEntry>,
    /// Events of a case that has no progress rows yet.
    pub unassigned: Vec<AncillaryEvent>,
}

impl Timeline {
    /// Display direction: most recent step first.
    pub fn recent_first(mut self) -> Self {
        self.entries.reverse();
        self
    }

    pub fn event_count(&self) -> usize {
        self.entries.iter().map(|e| e.events.len()).sum::<usize>() + self.unassigned.len()
    }
}

pub fn assemble(mut steps: Vec<TimelineStep>, events: Vec<AncillaryEvent>) -> Timeline {
    steps.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then(a.progress.started_at.cmp(&b.progress.started_at))
            .then(a.progress.id.cmp(&b.progress.id))
    });

    let mut groups: Vec<Vec<AncillaryEvent>> = vec![Vec::new(); steps.len()];
    let mut unassigned = Vec::new();

    for event in events {
        match assign(&steps, &event) {
            Some(idx) => groups[idx].push(event),
            None => unassigned.push(event),
        }
    }

    for group in &mut groups {
        group.sort_by(newest_first);
    }
    unassigned.sort_by(newest_first);

    let entries = steps
        .into_iter()
        .zip(groups)
        .enumerate()
        .map(|(idx, (step, events))| TimelineEntry {
            position: idx + 1,
            order: step.order,
            step_name: step.name,
            progress: step.progress,
            events,
        })
        .collect();

    Timeline {
        entries,
        unassigned,
    }
}

/// Index of the row an event belongs to, or `None` when there are no rows.
fn assign(steps: &[TimelineStep], event: &AncillaryEvent) -> Option<usize> {
    if steps.is_empty() {
        return None;
    }
    let at = event.created_at();

    if let Some(hint) = event.workflow_step_id() {
        let candidates: Vec<usize> = (0..steps.len())
            .filter(|&i| steps[i].progress.step_id == hint)
            .collect();
        if let Some(&earliest) = candidates.first() {
            return Some(latest_started_before(steps, candidates, at).unwrap_or(earliest));
        }
    }

    Some(latest_started_before(steps, 0..steps.len(), at).unwrap_or(0))
}

/// The candidate with the greatest `started_at <= at`; ties go to the later one.
fn latest_started_before(
    steps: &[TimelineStep],
    candidates: impl IntoIterator<Item = usize>,
    at: time::OffsetDateTime,
) -> Option<usize> {
    let mut best: Option<(usize, time::OffsetDateTime)> = None;
    for i in candidates {
        let Some(started) = steps[i].progress.started_at else {
            continue;
        };
        if started > at {
            continue;
        }
        match best {
            Some((_, b)) if started < b => {}
            _ => best = Some((i, started)),
        }
    }
    best.map(|(i, _)| i)
}

fn newest_first(a: &AncillaryEvent, b: &AncillaryEvent) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| a.id().cmp(b.id()))
        .then_with(|| a.kind().cmp(&b.kind()))
}
