// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! List reversal step

use std::any::Any;

use crate::exec::{ExecutionContext, StepError};
use crate::plan::{ExecutionDetails, PlanError, PlanGraph, Step, StepId, StepOutcome};
use crate::value::Value;

const META_KEY: &str = "ReverseStep";

/// Returns a reversed copy of the list; the input is left untouched
pub fn reverse_list(list: &Value) -> Result<Value, StepError> {
    match list {
        Value::List(items) => Ok(Value::list(items.iter().rev().cloned().collect())),
        other => Err(StepError::contract_violation(
            META_KEY,
            format!(
                "attempted to reverse a list, but received a {}",
                other.type_name()
            ),
        )),
    }
}

// Null rows pass through unchanged
fn reverse_row(row: &Value) -> Result<Value, StepError> {
    if row.is_null() {
        Ok(Value::Null)
    } else {
        reverse_list(row)
    }
}

/// Reverses the list on every row
#[derive(Debug, Default)]
pub struct ReverseStep;

impl ReverseStep {
    pub fn new() -> Self {
        Self
    }
}

impl Step for ReverseStep {
    fn meta_key(&self) -> &'static str {
        META_KEY
    }

    fn is_sync_and_safe(&self) -> bool {
        true
    }

    // Pure, so any peer over the same input is equivalent
    fn can_deduplicate_with(&self, peer: &dyn Step) -> bool {
        peer.as_any().is::<ReverseStep>()
    }

    fn execute(
        &self,
        details: &ExecutionDetails<'_>,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<StepOutcome>, StepError> {
        let rows = details.column(0)?;
        rows.iter()
            .take(details.count)
            .map(|row| reverse_row(row).map(StepOutcome::value))
            .collect()
    }

    fn unbatched_execute(
        &self,
        values: &[Value],
        _ctx: &ExecutionContext,
    ) -> Result<Value, StepError> {
        reverse_row(values.first().unwrap_or(&Value::Null))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Reverse the lists produced by `list`
pub fn reverse(graph: &mut PlanGraph, list: StepId) -> Result<StepId, PlanError> {
    graph.add_step(ReverseStep::new(), &[list])
}
