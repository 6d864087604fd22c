//! Ancillary events: comments, tasks, appointments and documents.
//!
//! These records are owned by their own subsystems. The engine reads them
//! through [`EventSource`] and only orders them on the timeline.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::rollback::{RollbackEvent, RollbackObserver};

/// Fields shared by every ancillary event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventHeader {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub created_by: String,
    /// Step the creator attached the event to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_step_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(flatten)]
    pub header: EventHeader,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub header: EventHeader,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    #[serde(flatten)]
    pub header: EventHeader,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_for: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub header: EventHeader,
    pub filename: String,
    /// Produced as a side effect of a step rather than uploaded.
    #[serde(default)]
    pub generated: bool,
    /// Set by the document subsystem after the producing step was rolled back.
    #[serde(default)]
    pub superseded: bool,
}

/// A non-step activity attributed to a point in a case's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AncillaryEvent {
    Comment(Comment),
    Task(Task),
    Appointment(Appointment),
    Document(Document),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Comment,
    Task,
    Appointment,
    Document,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Comment => "comment",
            EventKind::Task => "task",
            EventKind::Appointment => "appointment",
            EventKind::Document => "document",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AncillaryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AncillaryEvent::Comment(_) => EventKind::Comment,
            AncillaryEvent::Task(_) => EventKind::Task,
            AncillaryEvent::Appointment(_) => EventKind::Appointment,
            AncillaryEvent::Document(_) => EventKind::Document,
        }
    }

    pub fn header(&self) -> &EventHeader {
        match self {
            AncillaryEvent::Comment(e) => &e.header,
            AncillaryEvent::Task(e) => &e.header,
            AncillaryEvent::Appointment(e) => &e.header,
            AncillaryEvent::Document(e) => &e.header,
        }
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.header().created_at
    }

    pub fn workflow_step_id(&self) -> Option<&str> {
        self.header().workflow_step_id.as_deref()
    }
}

/// A collaborator read failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("event source '{source_name}' failed: {message}")]
pub struct EventSourceError {
    pub source_name: String,
    pub message: String,
}

impl EventSourceError {
    pub fn new(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Read access to one collaborator's events for a case.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn events_for_case(&self, case_id: &str) -> Result<Vec<AncillaryEvent>, EventSourceError>;
}

/// Event source backed by a map in memory.
///
/// Also acts as the document collaborator for rollbacks: registered as a
/// [`RollbackObserver`], it marks documents generated by a rolled-back step
/// as superseded.
#[derive(Debug, Default)]
pub struct InMemoryEventSource {
    events: RwLock<HashMap<String, Vec<AncillaryEvent>>>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(events: HashMap<String, Vec<AncillaryEvent>>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn record(&self, case_id: &str, event: AncillaryEvent) {
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(case_id.to_string())
            .or_default()
            .push(event);
    }

    /// Mark generated documents of `step_id` in a case as superseded.
    /// Returns how many documents changed.
    pub fn supersede_generated(&self, case_id: &str, step_id: &str) -> usize {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        let Some(case_events) = events.get_mut(case_id) else {
            return 0;
        };
        let mut changed = 0;
        for event in case_events.iter_mut() {
            if let AncillaryEvent::Document(doc) = event {
                if doc.generated
                    && !doc.superseded
                    && doc.header.workflow_step_id.as_deref() == Some(step_id)
                {
                    doc.superseded = true;
                    changed += 1;
                }
            }
        }
        changed
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn events_for_case(&self, case_id: &str) -> Result<Vec<AncillaryEvent>, EventSourceError> {
        Ok(self
            .events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(case_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl RollbackObserver for InMemoryEventSource {
    fn step_rolled_back(&self, event: &RollbackEvent) {
        let superseded = self.supersede_generated(&event.case_id, &event.step_id);
        debug!(
            case_id = %event.case_id,
            step_id = %event.step_id,
            superseded,
            "Superseded generated documents"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_tagged_events() {
        let raw = json!([
            {
                "kind": "comment",
                "id": "c1",
                "created_at": "2024-03-01T10:30:00Z",
                "created_by": "alice",
                "body": "called the client"
            },
            {
                "kind": "document",
                "id": "d1",
                "created_at": "2024-03-01T11:00:00Z",
                "created_by": "system",
                "workflow_step_id": "offer",
                "filename": "offer.pdf",
                "generated": true
            }
        ]);
        let events: Vec<AncillaryEvent> = serde_json::from_value(raw).unwrap();
        assert_eq!(events[0].kind(), EventKind::Comment);
        assert_eq!(events[0].workflow_step_id(), None);
        assert_eq!(events[1].kind(), EventKind::Document);
        assert_eq!(events[1].workflow_step_id(), Some("offer"));
        match &events[1] {
            AncillaryEvent::Document(d) => {
                assert!(d.generated);
                assert!(!d.superseded);
            }
            other => panic!("expected document, got {:?}", other),
        }
    }

    #[test]
    fn serializes_kind_tag() {
        let event = AncillaryEvent::Task(Task {
            header: EventHeader {
                id: "t1".into(),
                created_at: time::macros::datetime!(2024-03-01 09:00 UTC),
                created_by: "bob".into(),
                workflow_step_id: None,
            },
            title: "request invoice".into(),
            done: false,
            due_at: None,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "task");
        assert_eq!(value["id"], "t1");
        assert!(value.get("workflow_step_id").is_none());
    }

    fn generated_doc(id: &str, step: &str) -> AncillaryEvent {
        AncillaryEvent::Document(Document {
            header: EventHeader {
                id: id.into(),
                created_at: time::macros::datetime!(2024-03-01 09:00 UTC),
                created_by: "system".into(),
                workflow_step_id: Some(step.into()),
            },
            filename: format!("{id}.pdf"),
            generated: true,
            superseded: false,
        })
    }

    #[tokio::test]
    async fn in_memory_source_scopes_by_case() {
        let source = InMemoryEventSource::new();
        let event: AncillaryEvent = serde_json::from_value(json!({
            "kind": "comment",
            "id": "c1",
            "created_at": "2024-03-01T10:30:00Z",
            "created_by": "alice",
            "body": "hi"
        }))
        .unwrap();
        source.record("case-1", event);

        assert_eq!(source.events_for_case("case-1").await.unwrap().len(), 1);
        assert!(source.events_for_case("case-2").await.unwrap().is_empty());
    }

    #[test]
    fn supersedes_only_matching_generated_documents() {
        let source = InMemoryEventSource::new();
        source.record("case-1", generated_doc("offer", "assess"));
        source.record("case-1", generated_doc("letter", "intake"));
        source.record("case-2", generated_doc("offer-2", "assess"));

        assert_eq!(source.supersede_generated("case-1", "assess"), 1);
        assert_eq!(source.supersede_generated("case-1", "assess"), 0);
        assert_eq!(source.supersede_generated("case-9", "assess"), 0);

        let events = source.events.read().unwrap();
        let superseded: Vec<bool> = events["case-1"]
            .iter()
            .map(|e| matches!(e, AncillaryEvent::Document(d) if d.superseded))
            .collect();
        assert_eq!(superseded, vec![true, false]);
    }
}
