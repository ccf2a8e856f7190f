// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Step trait and the types exchanged with the executor
//!
//! Every node of a plan graph implements [`Step`]. A step goes through three
//! phases:
//! - build: the step is added to a [`PlanGraph`](super::PlanGraph) and may
//!   still accumulate configuration
//! - finalize: called once, with the other live steps of the same kind, so
//!   that kin can agree on shared configuration before it is frozen
//! - execute: called once per batch with one value column per dependency

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use super::error::PlanError;
use crate::deferred::Deferred;
use crate::exec::{ExecutionContext, StepError};
use crate::value::Value;

/// Identity of a step within one plan graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub usize);

impl StepId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a step for one row
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Value (or row-level error) known synchronously
    Ready(Result<Value, StepError>),
    /// Value delivered later, typically by an external loader
    Pending(Deferred<Value>),
}

impl StepOutcome {
    pub fn value(value: Value) -> Self {
        StepOutcome::Ready(Ok(value))
    }

    pub fn error(error: StepError) -> Self {
        StepOutcome::Ready(Err(error))
    }
}

/// Input handed to [`Step::execute`]
///
/// `values[d][r]` is the output of dependency `d` for live row `r`. Rows
/// whose dependencies failed have already been removed by the executor, so
/// every column has exactly `count` entries. `root` holds the request input
/// of each live row.
#[derive(Debug)]
pub struct ExecutionDetails<'a> {
    pub count: usize,
    pub values: &'a [Vec<Value>],
    pub root: &'a [Value],
}

impl<'a> ExecutionDetails<'a> {
    pub fn new(count: usize, values: &'a [Vec<Value>], root: &'a [Value]) -> Self {
        Self {
            count,
            values,
            root,
        }
    }

    /// Column for dependency `index`
    pub fn column(&self, index: usize) -> Result<&'a [Value], StepError> {
        self.values
            .get(index)
            .map(|column| column.as_slice())
            .ok_or_else(|| {
                StepError::Planning(format!(
                    "dependency {} requested but only {} provided",
                    index,
                    self.values.len()
                ))
            })
    }

    /// Build one output per live row
    pub fn index_map<F>(&self, mut f: F) -> Vec<StepOutcome>
    where
        F: FnMut(usize) -> StepOutcome,
    {
        (0..self.count).map(&mut f).collect()
    }
}

/// A node of the plan graph
pub trait Step: Send + Sync + fmt::Debug {
    /// Kind of the step; finalize hands each step its peers of the same kind
    fn meta_key(&self) -> &'static str;

    /// Short description used by plan explanations
    fn label(&self) -> String {
        self.meta_key().to_string()
    }

    /// Synchronous, side-effect free and cheap enough to run row by row
    fn is_sync_and_safe(&self) -> bool {
        false
    }

    /// Whether `peer`, which has the same kind and the same dependencies,
    /// computes the same result and can be replaced by `self`
    fn can_deduplicate_with(&self, _peer: &dyn Step) -> bool {
        false
    }

    /// Called exactly once, before any execution
    ///
    /// `peers` holds every other live step with the same [`Step::meta_key`].
    fn finalize(&mut self, _peers: &[&dyn Step]) -> Result<(), PlanError> {
        Ok(())
    }

    /// Frozen load options, for steps that have them
    fn options_key(&self) -> Option<&str> {
        None
    }

    /// Execute against a batch of rows
    fn execute(
        &self,
        details: &ExecutionDetails<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<StepOutcome>, StepError>;

    /// Execute against a single row; `values` has one entry per dependency
    fn unbatched_execute(
        &self,
        _values: &[Value],
        _ctx: &ExecutionContext,
    ) -> Result<Value, StepError> {
        Err(StepError::Unsupported(format!(
            "{} has no unbatched execution path",
            self.meta_key()
        )))
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
