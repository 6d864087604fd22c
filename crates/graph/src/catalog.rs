//! The set of all loaded worlds.
//!
//! Catalog documents are JSON:
//!
//! ```json
//! {
//!   "worlds": [
//!     {
//!       "id": "auto",
//!       "name": "Auto claims",
//!       "steps": [
//!         { "id": "intake", "order": 1, "name": "Intake", "next_step_id": "assess" },
//!         { "id": "assess", "order": 2, "name": "Assess", "requires_decision": true,
//!           "decision_yes_next_step_id": "pay", "decision_no_next_step_id": null },
//!         { "id": "pay", "order": 3, "name": "Pay out" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::error::GraphError;
use crate::template::{StepId, StepTemplate, WorldId};
use crate::world::WorldGraph;

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    worlds: Vec<WorldDocument>,
}

#[derive(Debug, Deserialize)]
struct WorldDocument {
    id: WorldId,
    #[serde(default)]
    name: String,
    steps: Vec<StepTemplate>,
}

/// All worlds known to the engine, with a global step-id index.
///
/// Step ids are unique across the catalog so that an operation naming only
/// `(case_id, step_id)` can resolve the world it belongs to.
#[derive(Debug, Clone, Default)]
pub struct StepCatalog {
    worlds: BTreeMap<WorldId, WorldGraph>,
    step_worlds: HashMap<StepId, WorldId>,
}

impl StepCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from already validated worlds.
    pub fn from_worlds(worlds: impl IntoIterator<Item = WorldGraph>) -> Result<Self, GraphError> {
        let mut catalog = Self::new();
        for world in worlds {
            catalog.insert(world)?;
        }
        Ok(catalog)
    }

    /// Parse and validate a catalog document.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, GraphError> {
        let doc = CatalogDocument::deserialize(value)
            .map_err(|e| GraphError::InvalidCatalog(e.to_string()))?;
        let worlds = doc
            .worlds
            .into_iter()
            .map(|w| WorldGraph::new(w.id, w.name, w.steps))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_worlds(worlds)
    }

    /// Read, parse and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::InvalidCatalog(format!("could not read '{}': {}", path.display(), e))
        })?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            GraphError::InvalidCatalog(format!("could not parse '{}': {}", path.display(), e))
        })?;
        Self::from_json(&value)
    }

    /// Add a world. Fails if the world id or any of its step ids is taken.
    pub fn insert(&mut self, world: WorldGraph) -> Result<(), GraphError> {
        if self.worlds.contains_key(world.id()) {
            return Err(GraphError::DuplicateWorld {
                world_id: world.id().to_string(),
            });
        }
        if let Some(taken) = world
            .steps()
            .iter()
            .find(|s| self.step_worlds.contains_key(&s.id))
        {
            return Err(GraphError::DuplicateStep {
                step_id: taken.id.clone(),
            });
        }
        for step in world.steps() {
            self.step_worlds
                .insert(step.id.clone(), world.id().to_string());
        }
        self.worlds.insert(world.id().to_string(), world);
        Ok(())
    }

    /// Worlds ordered by id.
    pub fn worlds(&self) -> impl Iterator<Item = &WorldGraph> {
        self.worlds.values()
    }

    pub fn world(&self, world_id: &str) -> Result<&WorldGraph, GraphError> {
        self.worlds
            .get(world_id)
            .ok_or_else(|| GraphError::UnknownWorld {
                world_id: world_id.to_string(),
            })
    }

    /// Steps of a world ordered by `order`.
    pub fn steps_for_world(&self, world_id: &str) -> Result<&[StepTemplate], GraphError> {
        self.world(world_id).map(WorldGraph::steps)
    }

    pub fn first_step(&self, world_id: &str) -> Result<&StepTemplate, GraphError> {
        self.world(world_id).map(WorldGraph::first_step)
    }

    /// The world a step belongs to.
    pub fn world_of(&self, step_id: &str) -> Result<&WorldGraph, GraphError> {
        let world_id = self
            .step_worlds
            .get(step_id)
            .ok_or_else(|| GraphError::UnknownStepId {
                step_id: step_id.to_string(),
            })?;
        self.world(world_id)
    }

    pub fn step(&self, step_id: &str) -> Result<&StepTemplate, GraphError> {
        self.world_of(step_id)?.step(step_id)
    }

    pub fn successors_of(
        &self,
        step_id: &str,
        decision: Option<bool>,
    ) -> Result<Vec<StepId>, GraphError> {
        self.world_of(step_id)?.successors_of(step_id, decision)
    }

    pub fn step_count(&self) -> usize {
        self.step_worlds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog_json() -> serde_json::Value {
        json!({
            "worlds": [
                {
                    "id": "auto",
                    "name": "Auto claims",
                    "steps": [
                        { "id": "auto_intake", "order": 1, "name": "Intake",
                          "next_step_id": "auto_assess",
                          "form_fields": [{ "key": "plate", "label": "Licence plate", "required": true }] },
                        { "id": "auto_assess", "order": 2, "name": "Assess",
                          "step_type": "decision", "requires_decision": true,
                          "decision_yes_next_step_id": "auto_pay" },
                        { "id": "auto_pay", "order": 3, "name": "Pay out",
                          "step_type": "document_generation" }
                    ]
                },
                {
                    "id": "home",
                    "name": "Home claims",
                    "steps": [
                        { "id": "home_intake", "order": 1, "name": "Intake",
                          "step_type": "site_visit" }
                    ]
                }
            ]
        })
    }

    #[test]
    fn loads_worlds_and_indexes_steps() {
        let catalog = StepCatalog::from_json(&catalog_json()).unwrap();
        assert_eq!(catalog.worlds().count(), 2);
        assert_eq!(catalog.step_count(), 4);
        assert_eq!(catalog.world_of("auto_pay").unwrap().id(), "auto");
        assert_eq!(catalog.first_step("home").unwrap().id, "home_intake");

        let intake = catalog.step("auto_intake").unwrap();
        assert_eq!(intake.world_id, "auto");
        assert_eq!(intake.form_fields[0].key, "plate");
        assert!(intake.form_fields[0].required);
        assert_eq!(intake.form_fields[0].kind, "text");
    }

    #[test]
    fn unrecognized_step_type_maps_to_other() {
        let catalog = StepCatalog::from_json(&catalog_json()).unwrap();
        assert_eq!(
            catalog.step("home_intake").unwrap().step_type,
            crate::StepType::Other
        );
        assert_eq!(
            catalog.step("auto_pay").unwrap().step_type,
            crate::StepType::DocumentGeneration
        );
    }

    #[test]
    fn successors_resolve_through_catalog() {
        let catalog = StepCatalog::from_json(&catalog_json()).unwrap();
        assert_eq!(
            catalog.successors_of("auto_assess", Some(true)).unwrap(),
            ["auto_pay"]
        );
        assert!(catalog
            .successors_of("auto_assess", Some(false))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn step_ids_must_be_unique_across_worlds() {
        let doc = json!({
            "worlds": [
                { "id": "a", "steps": [{ "id": "intake", "order": 1, "name": "Intake" }] },
                { "id": "b", "steps": [{ "id": "intake", "order": 1, "name": "Intake" }] }
            ]
        });
        assert_eq!(
            StepCatalog::from_json(&doc).unwrap_err(),
            GraphError::DuplicateStep {
                step_id: "intake".to_string()
            }
        );
    }

    #[test]
    fn unknown_lookups_fail_loudly() {
        let catalog = StepCatalog::from_json(&catalog_json()).unwrap();
        assert!(matches!(
            catalog.world("marine"),
            Err(GraphError::UnknownWorld { .. })
        ));
        assert!(matches!(
            catalog.step("nope"),
            Err(GraphError::UnknownStepId { .. })
        ));
    }

    #[test]
    fn malformed_document_is_invalid_catalog() {
        let doc = json!({ "worlds": [{ "id": "a", "steps": [{ "id": "x" }] }] });
        assert!(matches!(
            StepCatalog::from_json(&doc),
            Err(GraphError::InvalidCatalog(_))
        ));
    }
}
