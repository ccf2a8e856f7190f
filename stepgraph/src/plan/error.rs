// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan construction and finalize errors

use super::step::StepId;
use thiserror::Error;

/// Errors raised while building or finalizing a plan graph
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Unknown step: {0}")]
    UnknownStep(StepId),

    #[error("Step {step} is not a {expected}")]
    WrongStepKind { step: StepId, expected: &'static str },

    #[error("Dependency cycle detected through step {0}")]
    Cycle(StepId),

    #[error("Plan is already finalized")]
    AlreadyFinalized,

    #[error("Plan has not been finalized")]
    NotFinalized,

    #[error("Step {step} cannot accept {what} after finalize")]
    FrozenStep { step: String, what: String },

    #[error("Conflicting registration on {step}: {message}")]
    Conflict { step: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
