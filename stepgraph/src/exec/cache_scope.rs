// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Request-scoped memoization of external loads
//!
//! The scope maps loader identity -> options key -> spec -> deferred result.
//! It lives inside one [`ExecutionContext`](super::ExecutionContext) and is
//! dropped with it, so nothing is shared between requests.
//!
//! Spec values are keyed the way a JavaScript `Map` would key them:
//! primitives by value, lists and objects by allocation identity. Two
//! structurally equal composite specs built separately are distinct keys.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::deferred::Deferred;
use crate::value::Value;

/// Identity of a loader callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub usize);

/// Cache key for one spec value
#[derive(Debug, Clone)]
pub enum SpecKey {
    Null,
    Boolean(bool),
    Number(u64),
    String(String),
    /// Keeps the composite alive so its address cannot be reused while cached
    Composite(Value),
}

impl SpecKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => SpecKey::Null,
            Value::Boolean(b) => SpecKey::Boolean(*b),
            Value::Number(n) => SpecKey::Number(normalized_bits(*n)),
            Value::String(s) => SpecKey::String(s.clone()),
            Value::List(_) | Value::Object(_) => SpecKey::Composite(value.clone()),
        }
    }

    fn address(&self) -> usize {
        match self {
            SpecKey::Composite(Value::List(items)) => Arc::as_ptr(items) as *const () as usize,
            SpecKey::Composite(Value::Object(map)) => Arc::as_ptr(map) as *const () as usize,
            _ => 0,
        }
    }
}

// -0.0 and 0.0 are the same key, as are all NaNs
fn normalized_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for SpecKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SpecKey::Null, SpecKey::Null) => true,
            (SpecKey::Boolean(a), SpecKey::Boolean(b)) => a == b,
            (SpecKey::Number(a), SpecKey::Number(b)) => a == b,
            (SpecKey::String(a), SpecKey::String(b)) => a == b,
            (SpecKey::Composite(a), SpecKey::Composite(b)) => a.same_identity(b),
            _ => false,
        }
    }
}

impl Eq for SpecKey {}

impl Hash for SpecKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            SpecKey::Null => 0u8.hash(state),
            SpecKey::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            SpecKey::Number(bits) => {
                2u8.hash(state);
                bits.hash(state);
            }
            SpecKey::String(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            SpecKey::Composite(_) => {
                4u8.hash(state);
                self.address().hash(state);
            }
        }
    }
}

/// Statistics for one cache scope
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheScopeStats {
    pub hits: u64,
    pub misses: u64,
    /// Loader invocations issued through this scope
    pub batches: u64,
}

impl CacheScopeStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Outcome of looking up a batch of specs
#[derive(Debug, Default)]
pub struct BatchLookup {
    /// One deferred per requested spec, in request order
    pub results: Vec<Deferred<Value>>,
    /// Specs that were not cached, deduplicated, in first-seen order
    pub uncached_specs: Vec<Value>,
    /// Deferreds created for `uncached_specs`, aligned with it
    pub uncached: Vec<Deferred<Value>>,
}

type SpecCache = HashMap<SpecKey, Deferred<Value>>;

#[derive(Debug, Default)]
pub struct RequestCacheScope {
    by_callback: HashMap<CallbackId, HashMap<String, SpecCache>>,
    stats: CacheScopeStats,
}

impl RequestCacheScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every spec against the cache, creating deferreds for misses
    ///
    /// Misses are inserted immediately, so a spec repeated within `specs`
    /// is only reported once in `uncached_specs`.
    pub fn lookup_batch(
        &mut self,
        callback: CallbackId,
        options_key: &str,
        specs: &[Value],
    ) -> BatchLookup {
        let cache = self
            .by_callback
            .entry(callback)
            .or_default()
            .entry(options_key.to_string())
            .or_default();

        let mut lookup = BatchLookup {
            results: Vec::with_capacity(specs.len()),
            ..BatchLookup::default()
        };

        for spec in specs {
            let key = SpecKey::from_value(spec);
            if let Some(existing) = cache.get(&key) {
                self.stats.hits += 1;
                lookup.results.push(existing.clone());
            } else {
                self.stats.misses += 1;
                let deferred = Deferred::new();
                cache.insert(key, deferred.clone());
                lookup.results.push(deferred.clone());
                lookup.uncached_specs.push(spec.clone());
                lookup.uncached.push(deferred);
            }
        }

        if !lookup.uncached_specs.is_empty() {
            self.stats.batches += 1;
        }
        lookup
    }

    pub fn get(&self, callback: CallbackId, options_key: &str, spec: &Value) -> Option<&Deferred<Value>> {
        self.by_callback
            .get(&callback)?
            .get(options_key)?
            .get(&SpecKey::from_value(spec))
    }

    /// Number of cached specs across all partitions
    pub fn len(&self) -> usize {
        self.by_callback
            .values()
            .flat_map(|by_options| by_options.values())
            .map(|cache| cache.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheScopeStats {
        &self.stats
    }
}
