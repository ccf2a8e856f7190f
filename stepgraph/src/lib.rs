// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! StepGraph - a batched plan-step execution engine
//!
//! A plan is a dependency graph of steps. It is built once, finalized once
//! and then executed per request over a batch of rows.
//!
//! # Features
//!
//! - **Step deduplication**: pure steps computing the same thing from the
//!   same inputs are folded together at finalize
//! - **Projection merging**: load steps sharing a loader and params agree on
//!   one attribute set, so they share loader calls
//! - **Batched loads**: all cache misses of a load step go to the loader in
//!   one call; duplicates and cache hits are served from the same deferred
//! - **Request-scoped cache**: memoized loads live in the
//!   [`ExecutionContext`] and disappear with it
//!
//! # Usage
//!
//! ```ignore
//! let users = load_one_callback("users", |ids, options| async move { fetch(ids, options).await });
//!
//! let mut graph = PlanGraph::new();
//! let id = input(&mut graph)?;
//! let user = load_one(&mut graph, id, users)?;
//! let name = get(&mut graph, user, "name")?;
//! graph.finalize()?;
//!
//! let executor = PlanExecutor::new(Arc::new(graph))?;
//! let result = executor
//!     .execute(ExecutionRequest::new(ids), &ExecutionContext::new())
//!     .await?;
//! let names = result.values(name)?;
//! ```

pub mod config;
pub mod deferred;
pub mod exec;
pub mod plan;
pub mod steps;
pub mod value;

pub use config::EngineConfig;
pub use deferred::Deferred;
pub use exec::{ExecutionContext, ExecutionRequest, ExecutionResult, PlanExecutor, StepError};
pub use plan::{PlanError, PlanGraph, Step, StepId, StepOutcome};
pub use steps::{
    access, constant, get, input, load_one, load_one_callback, reverse, set_param, BatchLoader,
    LoadCallback, LoadError, LoadOptions,
};
pub use value::Value;

/// StepGraph version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// StepGraph crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
