// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Execution context for one external request

use parking_lot::Mutex;
use uuid::Uuid;

use super::cache_scope::{CacheScopeStats, RequestCacheScope};

/// Per-request state shared by every step executed for that request
///
/// The load cache scope is created on first use and dropped together with
/// the context. Create a fresh context for each independent request; reuse
/// one context when executing several batches that belong to the same
/// request (for example nested list levels).
#[derive(Debug)]
pub struct ExecutionContext {
    request_id: Uuid,
    cache: Mutex<Option<RequestCacheScope>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_request_id(Uuid::new_v4())
    }

    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            cache: Mutex::new(None),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Run `f` against the request cache scope, creating it if needed
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut RequestCacheScope) -> R) -> R {
        let mut guard = self.cache.lock();
        let scope = guard.get_or_insert_with(|| {
            log::trace!("Creating load cache scope for request {}", self.request_id);
            RequestCacheScope::new()
        });
        f(scope)
    }

    pub fn has_cache_scope(&self) -> bool {
        self.cache.lock().is_some()
    }

    pub fn cache_stats(&self) -> CacheScopeStats {
        self.cache
            .lock()
            .as_ref()
            .map(|scope| scope.stats().clone())
            .unwrap_or_default()
    }
}
