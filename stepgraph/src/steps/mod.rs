// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Built-in plan steps
//!
//! - `InputStep` / `ConstantStep`: roots of the graph
//! - `AccessStep`: attribute access on object rows
//! - `LoadOneStep`: batched, request-cached external loads
//! - `ReverseStep`: vectorized list reversal

pub mod access;
pub mod input;
pub mod load_one;
pub mod reverse;

pub use access::{access, AccessStep};
pub use input::{constant, input, ConstantStep, InputStep};
pub use load_one::{
    get, load_one, load_one_callback, set_param, BatchLoader, LoadCallback, LoadError,
    LoadOneStep, LoadOptions,
};
pub use reverse::{reverse, reverse_list, ReverseStep};
