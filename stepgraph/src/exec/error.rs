// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution error types

use crate::plan::PlanError;
use thiserror::Error;

/// Execution errors
///
/// Errors are `Clone` because one loader failure is delivered to every row
/// that was waiting on the failed batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("Contract violation in {step}: {message}")]
    ContractViolation { step: String, message: String },

    #[error("Load failed in {loader}: {message}")]
    LoadFailed { loader: String, message: String },

    #[error("Loader {loader} returned {actual} results for a batch of {expected} specs")]
    LoadLengthMismatch {
        loader: String,
        expected: usize,
        actual: usize,
    },

    #[error("Deferred value was already settled")]
    AlreadySettled,

    #[error("Deferred value was dropped before it settled")]
    Abandoned,

    #[error("Step {0} has not been finalized")]
    NotFinalized(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Planning error: {0}")]
    Planning(String),
}

impl StepError {
    pub fn contract_violation(step: impl Into<String>, message: impl Into<String>) -> Self {
        StepError::ContractViolation {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Contract violations abort the whole execution instead of failing one row
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StepError::ContractViolation { .. }
                | StepError::NotFinalized(_)
                | StepError::InvalidRequest(_)
                | StepError::Planning(_)
        )
    }
}

impl From<PlanError> for StepError {
    fn from(error: PlanError) -> Self {
        StepError::Planning(error.to_string())
    }
}
