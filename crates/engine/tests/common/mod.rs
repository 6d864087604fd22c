//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use caseflow_engine::{
    InMemoryProgressStore, ManualClock, RollbackEvent, RollbackObserver, StepCatalog,
    StepTemplate, WorkflowEngine, WorldGraph,
};
use time::macros::datetime;
use time::OffsetDateTime;

pub const T0: OffsetDateTime = datetime!(2024-03-01 09:00 UTC);

/// Two worlds:
///
/// ```text
/// claims: intake(1) -> documents(2, optional) -> assess(3, decision)
///         assess yes -> payout(4), no -> refusal(5)
/// repair: inspect(1) -> quote(2) -> approve(3, decision, loops)
///         approve yes -> work(4), no -> quote
///         work(4, loops) -> work
/// ```
pub fn catalog() -> Arc<StepCatalog> {
    let claims = WorldGraph::new(
        "claims",
        "Claims",
        vec![
            StepTemplate::new("intake", 1, "Intake").with_next("documents"),
            StepTemplate::new("documents", 2, "Collect documents")
                .with_next("assess")
                .optional(),
            StepTemplate::new("assess", 3, "Assess claim")
                .with_decision(Some("payout"), Some("refusal")),
            StepTemplate::new("payout", 4, "Pay out"),
            StepTemplate::new("refusal", 5, "Send refusal"),
        ],
    )
    .unwrap();

    let repair = WorldGraph::new(
        "repair",
        "Repairs",
        vec![
            StepTemplate::new("inspect", 1, "Inspect").with_next("quote"),
            StepTemplate::new("quote", 2, "Quote").with_next("approve"),
            StepTemplate::new("approve", 3, "Approve quote")
                .with_decision(Some("work"), Some("quote"))
                .looping(),
            StepTemplate::new("work", 4, "Carry out work")
                .with_next("work")
                .looping(),
        ],
    )
    .unwrap();

    Arc::new(StepCatalog::from_worlds([claims, repair]).unwrap())
}

pub fn engine() -> (WorkflowEngine<InMemoryProgressStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let engine = WorkflowEngine::new(catalog(), Arc::new(InMemoryProgressStore::new()))
        .with_clock(clock.clone());
    (engine, clock)
}

/// Records every rollback it is told about.
#[derive(Default)]
pub struct RecordingObserver {
    pub events: Mutex<Vec<RollbackEvent>>,
}

impl RollbackObserver for RecordingObserver {
    fn step_rolled_back(&self, event: &RollbackEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
