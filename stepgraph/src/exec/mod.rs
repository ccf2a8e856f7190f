// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Plan execution
//!
//! This module provides the executor that runs a finalized plan graph over
//! a batch of rows, the per-request context holding the load cache scope,
//! and the error and result types of execution.

pub mod cache_scope;
pub mod context;
pub mod error;
pub mod executor;
pub mod result;

pub use cache_scope::{CacheScopeStats, CallbackId, RequestCacheScope, SpecKey};
pub use context::ExecutionContext;
pub use error::StepError;
pub use executor::{ExecutionRequest, PlanExecutor};
pub use result::{ExecutionResult, RowResult};
