// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution results

use std::collections::HashMap;
use uuid::Uuid;

use super::error::StepError;
use crate::plan::StepId;
use crate::value::Value;

/// Output of one row of one step
pub type RowResult = Result<Value, StepError>;

/// Outputs of every executed step for one request
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub request_id: Uuid,
    pub row_count: usize,
    pub execution_time_ms: u64,
    outputs: HashMap<StepId, Vec<RowResult>>,
    /// Deduplicated step -> step that produced its output
    aliases: HashMap<StepId, StepId>,
}

impl ExecutionResult {
    pub(crate) fn new(
        request_id: Uuid,
        row_count: usize,
        outputs: HashMap<StepId, Vec<RowResult>>,
        aliases: HashMap<StepId, StepId>,
    ) -> Self {
        Self {
            request_id,
            row_count,
            execution_time_ms: 0,
            outputs,
            aliases,
        }
    }

    /// Row results of a step; deduplicated steps resolve to their survivor
    pub fn get(&self, id: StepId) -> Option<&[RowResult]> {
        let id = self.aliases.get(&id).copied().unwrap_or(id);
        self.outputs.get(&id).map(|rows| rows.as_slice())
    }

    /// Values of a step, or the first row error
    pub fn values(&self, id: StepId) -> Result<Vec<Value>, StepError> {
        let rows = self
            .get(id)
            .ok_or_else(|| StepError::Planning(format!("step {} produced no output", id)))?;
        rows.iter().cloned().collect()
    }

    /// Number of rows that failed for a step
    pub fn error_count(&self, id: StepId) -> usize {
        self.get(id)
            .map(|rows| rows.iter().filter(|row| row.is_err()).count())
            .unwrap_or(0)
    }
}
