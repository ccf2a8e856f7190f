// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan construction
//!
//! This module provides the step graph: the [`Step`] trait implemented by
//! every computation node, the [`PlanGraph`] that owns them, and the
//! finalize phase that deduplicates steps and freezes their options.

pub mod error;
pub mod graph;
pub mod step;
pub mod trace;

pub use error::PlanError;
pub use graph::PlanGraph;
pub use step::{ExecutionDetails, Step, StepId, StepOutcome};
