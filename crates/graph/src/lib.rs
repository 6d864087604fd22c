//! caseflow-graph: immutable step templates and per-world step graphs.
//!
//! A *world* is a product line with its own ordered set of process steps.
//! Steps route to each other either linearly (`next_step_id`) or through a
//! yes/no decision (`decision_yes_next_step_id` / `decision_no_next_step_id`).
//!
//! Graphs are validated once, at construction. A [`WorldGraph`] that exists
//! is well-formed: every successor pointer resolves inside its world, and
//! decision steps never also carry a linear successor. Callers load a
//! [`StepCatalog`] at startup and refuse to serve a world whose graph fails
//! validation.

mod catalog;
mod error;
mod template;
mod world;

pub use catalog::StepCatalog;
pub use error::GraphError;
pub use template::{FormField, Routing, StepId, StepTemplate, StepType, WorldId};
pub use world::WorldGraph;
