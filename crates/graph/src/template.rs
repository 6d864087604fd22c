use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Identifier of a step template. Unique across a loaded catalog.
pub type StepId = String;

/// Identifier of a world (product line).
pub type WorldId = String;

/// Informational classification of a step. Never changes routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    #[default]
    Action,
    Decision,
    DocumentGeneration,
    DataEntry,
    Appointment,
    Approval,
    Notification,
    #[serde(other)]
    Other,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Action => "action",
            StepType::Decision => "decision",
            StepType::DocumentGeneration => "document_generation",
            StepType::DataEntry => "data_entry",
            StepType::Appointment => "appointment",
            StepType::Approval => "approval",
            StepType::Notification => "notification",
            StepType::Other => "other",
        }
    }
}

/// One entry of a step's form schema.
///
/// The engine stores and returns form data but never interprets it; the
/// schema is handed to callers so they can validate submissions themselves.
/// Attributes other than the ones named here (options, placeholder, ...)
/// are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_field_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_field_kind() -> String {
    "text".to_string()
}

/// A node of a world's step graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub id: StepId,
    /// Filled in from the enclosing world when loaded from a catalog document.
    #[serde(default)]
    pub world_id: WorldId,
    /// 1-based position within the world.
    pub order: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub step_type: StepType,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
    #[serde(default)]
    pub requires_decision: bool,
    #[serde(default)]
    pub next_step_id: Option<StepId>,
    #[serde(default)]
    pub decision_yes_next_step_id: Option<StepId>,
    #[serde(default)]
    pub decision_no_next_step_id: Option<StepId>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub can_loop_back: bool,
    #[serde(default)]
    pub parallel_step_ids: BTreeSet<StepId>,
}

/// Routing mode of a step, derived from its successor pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing<'a> {
    Linear {
        next: Option<&'a str>,
    },
    Decision {
        yes: Option<&'a str>,
        no: Option<&'a str>,
    },
}

impl StepTemplate {
    /// Minimal linear step, mostly useful for building graphs in code.
    pub fn new(id: impl Into<StepId>, order: u32, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            world_id: WorldId::new(),
            order,
            name: name.into(),
            description: String::new(),
            step_type: StepType::Action,
            form_fields: Vec::new(),
            requires_decision: false,
            next_step_id: None,
            decision_yes_next_step_id: None,
            decision_no_next_step_id: None,
            is_optional: false,
            can_loop_back: false,
            parallel_step_ids: BTreeSet::new(),
        }
    }

    pub fn with_next(mut self, next: impl Into<StepId>) -> Self {
        self.next_step_id = Some(next.into());
        self
    }

    /// Turn this step into a decision step with the given branch targets.
    pub fn with_decision(mut self, yes: Option<&str>, no: Option<&str>) -> Self {
        self.requires_decision = true;
        self.step_type = StepType::Decision;
        self.decision_yes_next_step_id = yes.map(str::to_string);
        self.decision_no_next_step_id = no.map(str::to_string);
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn looping(mut self) -> Self {
        self.can_loop_back = true;
        self
    }

    pub fn routing(&self) -> Routing<'_> {
        if self.requires_decision {
            Routing::Decision {
                yes: self.decision_yes_next_step_id.as_deref(),
                no: self.decision_no_next_step_id.as_deref(),
            }
        } else {
            Routing::Linear {
                next: self.next_step_id.as_deref(),
            }
        }
    }

    /// Every step id this step may route to, regardless of branch.
    pub fn successor_ids(&self) -> impl Iterator<Item = &str> {
        [
            self.next_step_id.as_deref(),
            self.decision_yes_next_step_id.as_deref(),
            self.decision_no_next_step_id.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}
