// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan graph construction and finalize
//!
//! The graph owns every step and the dependency edges between them. Once
//! construction is done, [`PlanGraph::finalize`] checks the graph is acyclic,
//! merges duplicate steps, lets kin steps agree on their configuration and
//! computes the execution layers. After that the graph is read-only and can
//! be executed any number of times.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap};

use super::error::PlanError;
use super::step::{Step, StepId};
use crate::config::EngineConfig;

struct StepNode {
    dependencies: Vec<StepId>,
    step: Box<dyn Step>,
    /// Set when deduplication folded this step into an equivalent one
    replaced_by: Option<StepId>,
}

/// Dependency graph of plan steps
pub struct PlanGraph {
    nodes: Vec<StepNode>,
    config: EngineConfig,
    finalized: bool,
    /// Live steps grouped by longest distance from a root
    layers: Vec<Vec<StepId>>,
}

impl Default for PlanGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanGraph {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            nodes: Vec::new(),
            config,
            finalized: false,
            layers: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Add a step depending on `dependencies`, in order
    pub fn add_step<S: Step + 'static>(
        &mut self,
        step: S,
        dependencies: &[StepId],
    ) -> Result<StepId, PlanError> {
        self.ensure_building()?;
        for dep in dependencies {
            self.node(*dep)?;
        }

        let id = StepId(self.nodes.len());
        log::trace!("Adding step {} ({})", id, step.label());
        self.nodes.push(StepNode {
            dependencies: dependencies.to_vec(),
            step: Box::new(step),
            replaced_by: None,
        });
        Ok(id)
    }

    /// Append a dependency to an existing step, returning its position
    pub fn add_dependency(&mut self, step: StepId, dependency: StepId) -> Result<usize, PlanError> {
        self.ensure_building()?;
        self.node(dependency)?;
        let node = self.node_mut(step)?;
        node.dependencies.push(dependency);
        Ok(node.dependencies.len() - 1)
    }

    /// Dependencies of a step, after deduplication has been applied
    pub fn dependencies(&self, id: StepId) -> Result<&[StepId], PlanError> {
        Ok(&self.node(id)?.dependencies)
    }

    pub fn get_step(&self, id: StepId) -> Result<&dyn Step, PlanError> {
        Ok(self.node(id)?.step.as_ref())
    }

    /// Typed access to a step
    pub fn step<T: Step + 'static>(&self, id: StepId) -> Result<&T, PlanError> {
        self.node(id)?
            .step
            .as_any()
            .downcast_ref::<T>()
            .ok_or(PlanError::WrongStepKind {
                step: id,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Typed mutable access to a step
    pub fn step_mut<T: Step + 'static>(&mut self, id: StepId) -> Result<&mut T, PlanError> {
        self.node_mut(id)?
            .step
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(PlanError::WrongStepKind {
                step: id,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Follow deduplication aliases to the step that actually executes
    pub fn resolve(&self, id: StepId) -> StepId {
        let mut current = id;
        while let Some(next) = self
            .nodes
            .get(current.index())
            .and_then(|node| node.replaced_by)
        {
            current = next;
        }
        current
    }

    pub fn replaced_by(&self, id: StepId) -> Option<StepId> {
        self.nodes.get(id.index()).and_then(|node| node.replaced_by)
    }

    pub fn step_ids(&self) -> impl Iterator<Item = StepId> + '_ {
        (0..self.nodes.len()).map(StepId)
    }

    /// Live steps with the given meta key
    pub fn steps_by_meta_key(&self, meta_key: &str) -> Vec<StepId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.replaced_by.is_none() && node.step.meta_key() == meta_key)
            .map(|(index, _)| StepId(index))
            .collect()
    }

    /// Execution layers; every step only depends on steps of earlier layers
    pub fn layers(&self) -> Result<&[Vec<StepId>], PlanError> {
        if !self.finalized {
            return Err(PlanError::NotFinalized);
        }
        Ok(&self.layers)
    }

    /// Freeze the graph
    pub fn finalize(&mut self) -> Result<(), PlanError> {
        self.ensure_building()?;

        let order = self.topological_order()?;

        if self.config.deduplicate_steps {
            let merged = self.deduplicate(&order);
            if merged > 0 {
                log::debug!("Deduplicated {} plan steps", merged);
            }
        }

        for id in &order {
            if self.nodes[id.index()].replaced_by.is_none() {
                self.finalize_step(*id)?;
            }
        }

        self.layers = self.compute_layers(&order);
        self.finalized = true;

        if self.config.log_plan_on_finalize {
            log::debug!("Finalized plan:\n{}", self.explain());
        }
        Ok(())
    }

    /// Dependency order, ties broken by insertion order
    fn topological_order(&self) -> Result<Vec<StepId>, PlanError> {
        let mut graph: DiGraph<StepId, ()> = DiGraph::with_capacity(self.nodes.len(), 0);
        let indices: Vec<NodeIndex> = (0..self.nodes.len())
            .map(|i| graph.add_node(StepId(i)))
            .collect();

        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                graph.add_edge(indices[dep.index()], indices[i], ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(PlanError::Cycle(graph[cycle.node_id()]));
        }

        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            for dep in &node.dependencies {
                dependents[dep.index()].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|i| pending[*i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            order.push(StepId(i));
            for dependent in &dependents[i] {
                pending[*dependent] -= 1;
                if pending[*dependent] == 0 {
                    ready.insert(*dependent);
                }
            }
        }
        Ok(order)
    }

    /// Fold equivalent steps together; returns how many were folded
    fn deduplicate(&mut self, order: &[StepId]) -> usize {
        let mut candidates: HashMap<(&'static str, Vec<StepId>), Vec<StepId>> = HashMap::new();
        let mut merged = 0;

        for id in order {
            let deps: Vec<StepId> = self.nodes[id.index()]
                .dependencies
                .iter()
                .map(|dep| self.resolve(*dep))
                .collect();
            self.nodes[id.index()].dependencies = deps.clone();

            let key = (self.nodes[id.index()].step.meta_key(), deps);
            let peers = candidates.entry(key).or_default();

            let current = self.nodes[id.index()].step.as_ref();
            let survivor = peers
                .iter()
                .copied()
                .find(|peer| self.nodes[peer.index()].step.can_deduplicate_with(current));

            match survivor {
                Some(survivor) => {
                    log::trace!("Step {} folded into {}", id, survivor);
                    self.nodes[id.index()].replaced_by = Some(survivor);
                    merged += 1;
                }
                None => peers.push(*id),
            }
        }
        merged
    }

    fn finalize_step(&mut self, id: StepId) -> Result<(), PlanError> {
        let meta_key = self.nodes[id.index()].step.meta_key();
        let (before, rest) = self.nodes.split_at_mut(id.index());
        let (current, after) = rest.split_first_mut().ok_or(PlanError::UnknownStep(id))?;

        let peers: Vec<&dyn Step> = before
            .iter()
            .chain(after.iter())
            .filter(|node| node.replaced_by.is_none() && node.step.meta_key() == meta_key)
            .map(|node| node.step.as_ref())
            .collect();

        current.step.finalize(&peers)
    }

    fn compute_layers(&self, order: &[StepId]) -> Vec<Vec<StepId>> {
        let mut depth: HashMap<StepId, usize> = HashMap::new();
        let mut layers: Vec<Vec<StepId>> = Vec::new();

        for id in order {
            let node = &self.nodes[id.index()];
            if node.replaced_by.is_some() {
                continue;
            }
            let level = node
                .dependencies
                .iter()
                .filter_map(|dep| depth.get(&self.resolve(*dep)))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(*id, level);

            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(*id);
        }
        layers
    }

    fn ensure_building(&self) -> Result<(), PlanError> {
        if self.finalized {
            Err(PlanError::AlreadyFinalized)
        } else {
            Ok(())
        }
    }

    fn node(&self, id: StepId) -> Result<&StepNode, PlanError> {
        self.nodes.get(id.index()).ok_or(PlanError::UnknownStep(id))
    }

    fn node_mut(&mut self, id: StepId) -> Result<&mut StepNode, PlanError> {
        self.nodes.get_mut(id.index()).ok_or(PlanError::UnknownStep(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{ConstantStep, InputStep, ReverseStep};
    use crate::value::Value;

    #[test]
    fn test_add_step_rejects_unknown_dependency() {
        let mut graph = PlanGraph::new();
        let err = graph.add_step(ReverseStep::new(), &[StepId(3)]).unwrap_err();
        assert_eq!(err, PlanError::UnknownStep(StepId(3)));
    }

    #[test]
    fn test_cycle_is_fatal_at_finalize() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        let a = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        let b = graph.add_step(ReverseStep::new(), &[a]).unwrap();
        graph.add_dependency(a, b).unwrap();

        match graph.finalize() {
            Err(PlanError::Cycle(id)) => assert!(id == a || id == b),
            other => panic!("expected cycle error, got {:?}", other),
        }
        assert!(!graph.is_finalized());
    }

    #[test]
    fn test_finalize_twice_fails() {
        let mut graph = PlanGraph::new();
        graph.add_step(InputStep::new(), &[]).unwrap();
        graph.finalize().unwrap();
        assert_eq!(graph.finalize(), Err(PlanError::AlreadyFinalized));
        assert_eq!(
            graph.add_step(InputStep::new(), &[]),
            Err(PlanError::AlreadyFinalized)
        );
    }

    #[test]
    fn test_deduplicates_equivalent_steps_and_remaps_dependents() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        let first = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        let second = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        let outer = graph.add_step(ReverseStep::new(), &[second]).unwrap();
        graph.finalize().unwrap();

        assert_eq!(graph.resolve(second), first);
        assert_eq!(graph.resolve(first), first);
        assert_eq!(graph.dependencies(outer).unwrap(), &[first]);
        assert_eq!(graph.steps_by_meta_key("ReverseStep"), vec![first, outer]);
    }

    #[test]
    fn test_dedup_can_be_disabled() {
        let config = EngineConfig {
            deduplicate_steps: false,
            ..EngineConfig::default()
        };
        let mut graph = PlanGraph::with_config(config);
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        let first = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        let second = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        graph.finalize().unwrap();

        assert_eq!(graph.resolve(second), second);
        assert_eq!(graph.steps_by_meta_key("ReverseStep"), vec![first, second]);
    }

    #[test]
    fn test_constants_only_merge_when_equal() {
        let mut graph = PlanGraph::new();
        let a = graph.add_step(ConstantStep::new(Value::from(1i64)), &[]).unwrap();
        let b = graph.add_step(ConstantStep::new(Value::from(1i64)), &[]).unwrap();
        let c = graph.add_step(ConstantStep::new(Value::from(2i64)), &[]).unwrap();
        graph.finalize().unwrap();

        assert_eq!(graph.resolve(b), a);
        assert_eq!(graph.resolve(c), c);
    }

    #[test]
    fn test_non_finite_constants_stay_distinct_from_null() {
        let mut graph = PlanGraph::new();
        let infinite = graph
            .add_step(ConstantStep::new(Value::from(f64::INFINITY)), &[])
            .unwrap();
        let null = graph.add_step(ConstantStep::new(Value::Null), &[]).unwrap();
        let nan = graph.add_step(ConstantStep::new(Value::from(f64::NAN)), &[]).unwrap();
        let other_nan = graph.add_step(ConstantStep::new(Value::from(f64::NAN)), &[]).unwrap();
        graph.finalize().unwrap();

        assert_eq!(graph.resolve(infinite), infinite);
        assert_eq!(graph.resolve(null), null);
        assert_eq!(graph.resolve(nan), nan);
        assert_eq!(graph.resolve(other_nan), nan);
        assert_eq!(
            graph.step::<ConstantStep>(graph.resolve(null)).unwrap().value(),
            &Value::Null
        );
        assert_eq!(
            graph.step::<ConstantStep>(graph.resolve(infinite)).unwrap().value().as_number(),
            Some(f64::INFINITY)
        );
    }

    #[test]
    fn test_layers_follow_longest_path() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        let constant = graph.add_step(ConstantStep::new(Value::Null), &[]).unwrap();
        let once = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        let twice = graph.add_step(ReverseStep::new(), &[once]).unwrap();
        graph.finalize().unwrap();

        let layers = graph.layers().unwrap();
        assert_eq!(layers.len(), 3);
        assert!(layers[0].contains(&input) && layers[0].contains(&constant));
        assert_eq!(layers[1], vec![once]);
        assert_eq!(layers[2], vec![twice]);
    }

    #[test]
    fn test_typed_access_checks_kind() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        assert!(graph.step::<InputStep>(input).is_ok());
        assert!(matches!(
            graph.step::<ReverseStep>(input),
            Err(PlanError::WrongStepKind { .. })
        ));
        assert!(matches!(graph.layers(), Err(PlanError::NotFinalized)));
    }
}
