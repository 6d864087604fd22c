use crate::{StepId, WorldId};

/// Errors raised while building or querying a step graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A step id (or a successor pointer) does not resolve inside the world.
    #[error("unknown step '{step_id}' in world '{world_id}'")]
    UnknownStep { world_id: WorldId, step_id: StepId },

    /// A step id is not part of any loaded world.
    #[error("unknown step '{step_id}'")]
    UnknownStepId { step_id: StepId },

    /// No world with this id is loaded.
    #[error("unknown world '{world_id}'")]
    UnknownWorld { world_id: WorldId },

    /// The world declares no steps at all.
    #[error("world '{world_id}' has no steps")]
    EmptyWorld { world_id: WorldId },

    /// Two steps share an id (within a world or across the catalog).
    #[error("duplicate step id '{step_id}'")]
    DuplicateStep { step_id: StepId },

    /// Two worlds share an id.
    #[error("duplicate world id '{world_id}'")]
    DuplicateWorld { world_id: WorldId },

    /// Two steps in one world share an `order` value, or an order is zero.
    #[error("invalid order {order} for step '{step_id}' in world '{world_id}'")]
    InvalidOrder {
        world_id: WorldId,
        step_id: StepId,
        order: u32,
    },

    /// A decision step also sets a linear successor.
    #[error("step '{step_id}' requires a decision but also sets next_step_id")]
    ConflictingRouting { step_id: StepId },

    /// A successor points backwards without the source allowing loops.
    #[error("step '{step_id}' routes back to '{target}' but does not allow loop-back")]
    UndeclaredLoop { step_id: StepId, target: StepId },

    /// Routing a decision step without saying which branch was taken.
    #[error("step '{step_id}' requires a decision to resolve its successor")]
    DecisionRequired { step_id: StepId },

    /// The catalog document could not be parsed.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
}
