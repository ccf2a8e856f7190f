// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Attribute access on object rows

use std::any::Any;

use crate::exec::{ExecutionContext, StepError};
use crate::plan::{ExecutionDetails, PlanError, PlanGraph, Step, StepId, StepOutcome};
use crate::value::Value;

/// Reads one attribute from each row; rows that are not objects give `Null`
#[derive(Debug)]
pub struct AccessStep {
    attr: String,
}

impl AccessStep {
    pub fn new(attr: impl Into<String>) -> Self {
        Self { attr: attr.into() }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }
}

impl Step for AccessStep {
    fn meta_key(&self) -> &'static str {
        "AccessStep"
    }

    fn label(&self) -> String {
        format!("AccessStep<{}>", self.attr)
    }

    fn is_sync_and_safe(&self) -> bool {
        true
    }

    fn can_deduplicate_with(&self, peer: &dyn Step) -> bool {
        peer.as_any()
            .downcast_ref::<AccessStep>()
            .is_some_and(|other| other.attr == self.attr)
    }

    fn execute(
        &self,
        details: &ExecutionDetails<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<StepOutcome>, StepError> {
        let rows = details.column(0)?;
        Ok(details.index_map(|i| StepOutcome::value(rows[i].get(&self.attr))))
    }

    fn unbatched_execute(
        &self,
        values: &[Value],
        _ctx: &ExecutionContext,
    ) -> Result<Value, StepError> {
        Ok(values.first().map(|row| row.get(&self.attr)).unwrap_or(Value::Null))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Read `attr` from the rows produced by `step`
pub fn access(graph: &mut PlanGraph, step: StepId, attr: &str) -> Result<StepId, PlanError> {
    graph.add_step(AccessStep::new(attr), &[step])
}
