use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::GraphError;
use crate::template::{Routing, StepId, StepTemplate, WorldId};

/// The validated step graph of one world.
///
/// Steps are kept sorted by `order`; lookups by id go through an index.
#[derive(Debug, Clone, Serialize)]
pub struct WorldGraph {
    id: WorldId,
    name: String,
    steps: Vec<StepTemplate>,
    #[serde(skip)]
    index: HashMap<StepId, usize>,
}

impl WorldGraph {
    /// Build and validate a world graph.
    ///
    /// Every step's `world_id` is overwritten with `id`. Validation covers:
    /// non-empty world, unique step ids, unique non-zero orders, successor
    /// and parallel pointers resolving inside the world, decision steps not
    /// carrying a linear successor, and backward pointers only from steps
    /// that allow loop-back.
    pub fn new(
        id: impl Into<WorldId>,
        name: impl Into<String>,
        mut steps: Vec<StepTemplate>,
    ) -> Result<Self, GraphError> {
        let id = id.into();
        if steps.is_empty() {
            return Err(GraphError::EmptyWorld { world_id: id });
        }

        steps.sort_by_key(|s| s.order);

        let mut index = HashMap::with_capacity(steps.len());
        let mut orders = HashSet::with_capacity(steps.len());
        for (i, step) in steps.iter_mut().enumerate() {
            step.world_id = id.clone();
            if step.order == 0 || !orders.insert(step.order) {
                return Err(GraphError::InvalidOrder {
                    world_id: id,
                    step_id: step.id.clone(),
                    order: step.order,
                });
            }
            if index.insert(step.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateStep {
                    step_id: step.id.clone(),
                });
            }
        }

        let graph = Self {
            id,
            name: name.into(),
            steps,
            index,
        };
        graph.validate_routing()?;
        Ok(graph)
    }

    fn validate_routing(&self) -> Result<(), GraphError> {
        for step in &self.steps {
            if step.requires_decision && step.next_step_id.is_some() {
                return Err(GraphError::ConflictingRouting {
                    step_id: step.id.clone(),
                });
            }

            for target_id in step.successor_ids() {
                let target = self.step(target_id)?;
                if target.order <= step.order && !step.can_loop_back {
                    return Err(GraphError::UndeclaredLoop {
                        step_id: step.id.clone(),
                        target: target.id.clone(),
                    });
                }
            }

            for parallel in &step.parallel_step_ids {
                self.step(parallel)?;
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps ordered by `order` ascending.
    pub fn steps(&self) -> &[StepTemplate] {
        &self.steps
    }

    /// The step with the lowest `order`.
    pub fn first_step(&self) -> &StepTemplate {
        // `new` rejects empty worlds.
        &self.steps[0]
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.index.contains_key(step_id)
    }

    pub fn step(&self, step_id: &str) -> Result<&StepTemplate, GraphError> {
        self.index
            .get(step_id)
            .map(|&i| &self.steps[i])
            .ok_or_else(|| GraphError::UnknownStep {
                world_id: self.id.clone(),
                step_id: step_id.to_string(),
            })
    }

    /// Resolve the successor set of a step.
    ///
    /// Linear steps yield `{next_step_id}` or nothing; `decision` is ignored.
    /// Decision steps yield the branch selected by `decision`, or nothing for
    /// a terminal branch, and fail with [`GraphError::DecisionRequired`] when
    /// no decision is given.
    pub fn successors_of(
        &self,
        step_id: &str,
        decision: Option<bool>,
    ) -> Result<Vec<StepId>, GraphError> {
        let step = self.step(step_id)?;
        let target = match (step.routing(), decision) {
            (Routing::Linear { next }, _) => next,
            (Routing::Decision { yes, .. }, Some(true)) => yes,
            (Routing::Decision { no, .. }, Some(false)) => no,
            (Routing::Decision { .. }, None) => {
                return Err(GraphError::DecisionRequired {
                    step_id: step.id.clone(),
                })
            }
        };
        Ok(target.map(str::to_string).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim_steps() -> Vec<StepTemplate> {
        vec![
            StepTemplate::new("intake", 1, "Intake").with_next("assess"),
            StepTemplate::new("assess", 2, "Assess").with_decision(Some("pay"), Some("reject")),
            StepTemplate::new("pay", 3, "Pay out"),
            StepTemplate::new("reject", 4, "Reject"),
        ]
    }

    #[test]
    fn steps_are_sorted_by_order() {
        let mut steps = claim_steps();
        steps.reverse();
        let world = WorldGraph::new("auto", "Auto claims", steps).unwrap();
        let ids: Vec<_> = world.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["intake", "assess", "pay", "reject"]);
        assert_eq!(world.first_step().id, "intake");
        assert!(world.steps().iter().all(|s| s.world_id == "auto"));
    }

    #[test]
    fn linear_successor_ignores_decision() {
        let world = WorldGraph::new("auto", "Auto claims", claim_steps()).unwrap();
        assert_eq!(world.successors_of("intake", None).unwrap(), ["assess"]);
        assert_eq!(world.successors_of("intake", Some(false)).unwrap(), ["assess"]);
        assert!(world.successors_of("pay", None).unwrap().is_empty());
    }

    #[test]
    fn decision_successor_follows_branch() {
        let world = WorldGraph::new("auto", "Auto claims", claim_steps()).unwrap();
        assert_eq!(world.successors_of("assess", Some(true)).unwrap(), ["pay"]);
        assert_eq!(world.successors_of("assess", Some(false)).unwrap(), ["reject"]);
        assert_eq!(
            world.successors_of("assess", None),
            Err(GraphError::DecisionRequired {
                step_id: "assess".to_string()
            })
        );
    }

    #[test]
    fn terminal_decision_branch_is_empty() {
        let steps = vec![
            StepTemplate::new("check", 1, "Check").with_decision(Some("done"), None),
            StepTemplate::new("done", 2, "Done"),
        ];
        let world = WorldGraph::new("w", "W", steps).unwrap();
        assert!(world.successors_of("check", Some(false)).unwrap().is_empty());
    }

    #[test]
    fn unknown_successor_is_rejected() {
        let steps = vec![StepTemplate::new("a", 1, "A").with_next("missing")];
        assert_eq!(
            WorldGraph::new("w", "W", steps).unwrap_err(),
            GraphError::UnknownStep {
                world_id: "w".to_string(),
                step_id: "missing".to_string()
            }
        );
    }

    #[test]
    fn decision_with_next_is_rejected() {
        let mut decide = StepTemplate::new("a", 1, "A").with_decision(Some("b"), None);
        decide.next_step_id = Some("b".to_string());
        let steps = vec![decide, StepTemplate::new("b", 2, "B")];
        assert!(matches!(
            WorldGraph::new("w", "W", steps),
            Err(GraphError::ConflictingRouting { .. })
        ));
    }

    #[test]
    fn backward_pointer_requires_loop_back() {
        let steps = vec![
            StepTemplate::new("a", 1, "A").with_next("b"),
            StepTemplate::new("b", 2, "B").with_decision(Some("a"), None),
        ];
        assert!(matches!(
            WorldGraph::new("w", "W", steps),
            Err(GraphError::UndeclaredLoop { .. })
        ));

        let steps = vec![
            StepTemplate::new("a", 1, "A").with_next("b"),
            StepTemplate::new("b", 2, "B")
                .with_decision(Some("a"), None)
                .looping(),
        ];
        let world = WorldGraph::new("w", "W", steps).unwrap();
        assert_eq!(world.successors_of("b", Some(true)).unwrap(), ["a"]);
    }

    #[test]
    fn duplicate_order_and_zero_order_are_rejected() {
        let steps = vec![StepTemplate::new("a", 1, "A"), StepTemplate::new("b", 1, "B")];
        assert!(matches!(
            WorldGraph::new("w", "W", steps),
            Err(GraphError::InvalidOrder { order: 1, .. })
        ));
        let steps = vec![StepTemplate::new("a", 0, "A")];
        assert!(matches!(
            WorldGraph::new("w", "W", steps),
            Err(GraphError::InvalidOrder { order: 0, .. })
        ));
    }

    #[test]
    fn empty_world_and_unknown_parallel_are_rejected() {
        assert!(matches!(
            WorldGraph::new("w", "W", vec![]),
            Err(GraphError::EmptyWorld { .. })
        ));

        let mut a = StepTemplate::new("a", 1, "A");
        a.parallel_step_ids.insert("ghost".to_string());
        assert!(matches!(
            WorldGraph::new("w", "W", vec![a]),
            Err(GraphError::UnknownStep { .. })
        ));
    }
}
