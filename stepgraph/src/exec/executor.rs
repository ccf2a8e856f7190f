// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan executor
//!
//! Runs a finalized [`PlanGraph`] against a batch of request rows. Steps are
//! executed layer by layer: every step of a layer is issued first, then the
//! deferred results of the whole layer are awaited. Loads issued by
//! independent steps of the same layer are therefore in flight together,
//! while steps that share a loader and options meet in the request cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::context::ExecutionContext;
use super::error::StepError;
use super::result::{ExecutionResult, RowResult};
use crate::plan::{ExecutionDetails, PlanError, PlanGraph, StepId, StepOutcome};
use crate::value::Value;

/// Rows to execute a plan against
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// One value per row, exposed by input steps
    pub inputs: Vec<Value>,
}

impl ExecutionRequest {
    pub fn new(inputs: Vec<Value>) -> Self {
        Self { inputs }
    }

    pub fn single(input: Value) -> Self {
        Self {
            inputs: vec![input],
        }
    }

    pub fn row_count(&self) -> usize {
        self.inputs.len()
    }
}

/// Executes one finalized plan, any number of times
#[derive(Clone)]
pub struct PlanExecutor {
    plan: Arc<PlanGraph>,
}

impl PlanExecutor {
    pub fn new(plan: Arc<PlanGraph>) -> Result<Self, PlanError> {
        if !plan.is_finalized() {
            return Err(PlanError::NotFinalized);
        }
        Ok(Self { plan })
    }

    pub fn plan(&self) -> &PlanGraph {
        &self.plan
    }

    /// Execute the plan for one batch of rows
    ///
    /// Row-level failures (a rejected load, an upstream row error) are kept
    /// in the result. Contract violations abort the execution.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, StepError> {
        let start_time = Instant::now();
        let rows = request.row_count();
        let config = self.plan.config();

        if let Some(max_rows) = config.max_batch_rows {
            if rows > max_rows {
                return Err(StepError::InvalidRequest(format!(
                    "batch of {} rows exceeds the configured maximum of {}",
                    rows, max_rows
                )));
            }
        }

        log::debug!(
            "Executing plan for request {} with {} rows",
            ctx.request_id(),
            rows
        );

        let mut outputs: HashMap<StepId, Vec<RowResult>> = HashMap::new();
        for layer in self.plan.layers()? {
            let mut issued = Vec::with_capacity(layer.len());
            for id in layer {
                issued.push((*id, self.run_step(*id, &request, &outputs, ctx)?));
            }

            for (id, outcomes) in issued {
                let mut settled = Vec::with_capacity(outcomes.len());
                for outcome in outcomes {
                    settled.push(match outcome {
                        StepOutcome::Ready(result) => result,
                        StepOutcome::Pending(deferred) => deferred.wait().await,
                    });
                }
                outputs.insert(id, settled);
            }
        }

        let aliases = self
            .plan
            .step_ids()
            .filter_map(|id| {
                let survivor = self.plan.resolve(id);
                (survivor != id).then_some((id, survivor))
            })
            .collect();

        let mut result = ExecutionResult::new(ctx.request_id(), rows, outputs, aliases);
        result.execution_time_ms = start_time.elapsed().as_millis() as u64;
        log::debug!(
            "Request {} finished in {}ms",
            ctx.request_id(),
            result.execution_time_ms
        );
        Ok(result)
    }

    /// Issue one step; returns one outcome per request row
    fn run_step(
        &self,
        id: StepId,
        request: &ExecutionRequest,
        outputs: &HashMap<StepId, Vec<RowResult>>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<StepOutcome>, StepError> {
        let rows = request.row_count();
        let step = self.plan.get_step(id)?;

        let mut columns_in: Vec<&Vec<RowResult>> = Vec::new();
        for dep in self.plan.dependencies(id)? {
            let dep = self.plan.resolve(*dep);
            let column = outputs.get(&dep).ok_or_else(|| {
                StepError::Planning(format!("step {} ran before its dependency {}", id, dep))
            })?;
            columns_in.push(column);
        }

        // A row whose dependency failed carries that failure and is not executed
        let row_errors: Vec<Option<StepError>> = (0..rows)
            .map(|row| {
                columns_in
                    .iter()
                    .find_map(|column| column[row].as_ref().err().cloned())
            })
            .collect();
        let live: Vec<usize> = (0..rows).filter(|row| row_errors[*row].is_none()).collect();

        let columns: Vec<Vec<Value>> = columns_in
            .iter()
            .map(|column| {
                live.iter()
                    .map(|row| column[*row].as_ref().cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        let root: Vec<Value> = live.iter().map(|row| request.inputs[*row].clone()).collect();

        let live_outcomes = if live.is_empty() {
            Vec::new()
        } else if self.plan.config().unbatched_fast_path
            && step.is_sync_and_safe()
            && live.len() == 1
        {
            let values: Vec<Value> = columns.iter().map(|column| column[0].clone()).collect();
            match step.unbatched_execute(&values, ctx) {
                Ok(value) => vec![StepOutcome::value(value)],
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => vec![StepOutcome::error(e)],
            }
        } else {
            let details = ExecutionDetails::new(live.len(), &columns, &root);
            step.execute(&details, ctx)?
        };

        if live_outcomes.len() != live.len() {
            return Err(StepError::contract_violation(
                step.label(),
                format!(
                    "returned {} results for {} rows",
                    live_outcomes.len(),
                    live.len()
                ),
            ));
        }

        log::trace!(
            "Step {} ({}) issued for {} of {} rows",
            id,
            step.label(),
            live.len(),
            rows
        );

        let mut live_outcomes = live_outcomes.into_iter();
        let mut outcomes = Vec::with_capacity(rows);
        for error in row_errors {
            match error {
                Some(error) => outcomes.push(StepOutcome::error(error)),
                None => match live_outcomes.next() {
                    Some(outcome) => outcomes.push(outcome),
                    None => break,
                },
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::steps::{AccessStep, ConstantStep, InputStep, ReverseStep};

    fn numbers(ns: &[i64]) -> Value {
        Value::list(ns.iter().map(|n| Value::from(*n)).collect())
    }

    #[test]
    fn test_executor_requires_finalized_plan() {
        let graph = PlanGraph::new();
        assert!(matches!(
            PlanExecutor::new(Arc::new(graph)),
            Err(PlanError::NotFinalized)
        ));
    }

    #[tokio::test]
    async fn test_reverse_pipeline_keeps_row_positions() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        let reversed = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        graph.finalize().unwrap();

        let executor = PlanExecutor::new(Arc::new(graph)).unwrap();
        let request = ExecutionRequest::new(vec![numbers(&[1, 2, 3]), Value::Null, numbers(&[4])]);
        let result = executor
            .execute(request, &ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(result.row_count, 3);
        assert_eq!(
            result.values(reversed).unwrap(),
            vec![numbers(&[3, 2, 1]), Value::Null, numbers(&[4])]
        );
    }

    #[tokio::test]
    async fn test_contract_violation_aborts_execution() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        graph.add_step(ReverseStep::new(), &[input]).unwrap();
        graph.finalize().unwrap();

        let executor = PlanExecutor::new(Arc::new(graph)).unwrap();
        for inputs in [vec![Value::from("nope")], vec![numbers(&[1]), Value::from(5i64)]] {
            let err = executor
                .execute(ExecutionRequest::new(inputs), &ExecutionContext::new())
                .await
                .unwrap_err();
            assert!(matches!(err, StepError::ContractViolation { .. }));
        }
    }

    #[tokio::test]
    async fn test_deduplicated_step_output_is_shared() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        let a = graph.add_step(AccessStep::new("tags"), &[input]).unwrap();
        let b = graph.add_step(AccessStep::new("tags"), &[input]).unwrap();
        graph.finalize().unwrap();

        let executor = PlanExecutor::new(Arc::new(graph)).unwrap();
        let row = Value::object(vec![("tags", numbers(&[1, 2]))]);
        let result = executor
            .execute(ExecutionRequest::single(row), &ExecutionContext::new())
            .await
            .unwrap();

        assert_eq!(result.values(a).unwrap(), vec![numbers(&[1, 2])]);
        assert_eq!(result.values(b).unwrap(), result.values(a).unwrap());
    }

    #[tokio::test]
    async fn test_row_limit_is_enforced() {
        let mut graph = PlanGraph::with_config(EngineConfig::bounded(1));
        graph.add_step(InputStep::new(), &[]).unwrap();
        graph.finalize().unwrap();

        let executor = PlanExecutor::new(Arc::new(graph)).unwrap();
        let err = executor
            .execute(
                ExecutionRequest::new(vec![Value::Null, Value::Null]),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_request_produces_empty_columns() {
        let mut graph = PlanGraph::new();
        let input = graph.add_step(InputStep::new(), &[]).unwrap();
        let constant = graph.add_step(ConstantStep::new(Value::from(1i64)), &[]).unwrap();
        let reversed = graph.add_step(ReverseStep::new(), &[input]).unwrap();
        graph.finalize().unwrap();

        let executor = PlanExecutor::new(Arc::new(graph)).unwrap();
        let result = executor
            .execute(ExecutionRequest::default(), &ExecutionContext::new())
            .await
            .unwrap();

        assert!(result.values(reversed).unwrap().is_empty());
        assert!(result.values(constant).unwrap().is_empty());
    }
}
