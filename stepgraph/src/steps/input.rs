// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Root steps: request inputs and constants

use std::any::Any;

use crate::exec::{ExecutionContext, StepError};
use crate::plan::{ExecutionDetails, PlanError, PlanGraph, Step, StepId, StepOutcome};
use crate::value::{canonical_json, Value};

/// Exposes the request row values
#[derive(Debug, Default)]
pub struct InputStep;

impl InputStep {
    pub fn new() -> Self {
        Self
    }
}

impl Step for InputStep {
    fn meta_key(&self) -> &'static str {
        "InputStep"
    }

    fn can_deduplicate_with(&self, peer: &dyn Step) -> bool {
        peer.as_any().is::<InputStep>()
    }

    fn execute(
        &self,
        details: &ExecutionDetails<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<StepOutcome>, StepError> {
        Ok(details.index_map(|i| {
            StepOutcome::value(details.root.get(i).cloned().unwrap_or(Value::Null))
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Same value on every row
#[derive(Debug)]
pub struct ConstantStep {
    value: Value,
}

impl ConstantStep {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Step for ConstantStep {
    fn meta_key(&self) -> &'static str {
        "ConstantStep"
    }

    fn label(&self) -> String {
        format!("ConstantStep<{}>", canonical_json(&self.value))
    }

    fn is_sync_and_safe(&self) -> bool {
        true
    }

    fn can_deduplicate_with(&self, peer: &dyn Step) -> bool {
        peer.as_any()
            .downcast_ref::<ConstantStep>()
            .is_some_and(|other| other.value == self.value)
    }

    fn execute(
        &self,
        details: &ExecutionDetails<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<StepOutcome>, StepError> {
        Ok(details.index_map(|_| StepOutcome::value(self.value.clone())))
    }

    fn unbatched_execute(
        &self,
        _values: &[Value],
        _ctx: &ExecutionContext,
    ) -> Result<Value, StepError> {
        Ok(self.value.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn input(graph: &mut PlanGraph) -> Result<StepId, PlanError> {
    graph.add_step(InputStep::new(), &[])
}

pub fn constant(graph: &mut PlanGraph, value: Value) -> Result<StepId, PlanError> {
    graph.add_step(ConstantStep::new(value), &[])
}
