// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Batched single-record loads
//!
//! A [`LoadOneStep`] turns each row's spec value into one record fetched by
//! an external [`BatchLoader`]. Within a request every (loader, options,
//! spec) triple is fetched at most once: misses of one execution are sent
//! to the loader in a single call and every row, including rows of other
//! steps using the same loader and options, shares the resulting deferred.
//!
//! Attributes requested through [`get`] are merged between kin steps (same
//! loader, same params) at finalize so that kin end up with identical
//! options and therefore share cache entries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use super::access::access;
use crate::deferred::Deferred;
use crate::exec::{CallbackId, ExecutionContext, StepError};
use crate::plan::{ExecutionDetails, PlanError, PlanGraph, Step, StepId, StepOutcome};
use crate::value::{canonical_json, canonical_params, Value};

const META_KEY: &str = "LoadOneStep";

/// Error reported by a loader
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Options passed to the loader, frozen at finalize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Sorted projection, or `None` for full records
    pub attributes: Option<Vec<String>>,
    pub params: BTreeMap<String, Value>,
}

impl LoadOptions {
    /// Canonical serialization used to partition the request cache
    pub fn canonical_key(&self) -> String {
        let attributes = match &self.attributes {
            Some(attrs) => canonical_json(&Value::list(
                attrs.iter().map(|a| Value::String(a.clone())).collect(),
            )),
            None => "null".to_string(),
        };
        format!(
            "{{\"attributes\":{},\"params\":{}}}",
            attributes,
            canonical_params(&self.params)
        )
    }
}

/// External batch lookup
///
/// `load` receives deduplicated specs and must return one result per spec,
/// in the same order.
#[async_trait]
pub trait BatchLoader: Send + Sync {
    async fn load(&self, specs: Vec<Value>, options: LoadOptions) -> Result<Vec<Value>, LoadError>;

    fn display_name(&self) -> String {
        "anonymous".to_string()
    }
}

/// Shared handle to a loader; two handles are the same callback only if they
/// were cloned from one another
#[derive(Clone)]
pub struct LoadCallback {
    loader: Arc<dyn BatchLoader>,
}

impl LoadCallback {
    pub fn new<L: BatchLoader + 'static>(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
        }
    }

    pub fn from_arc(loader: Arc<dyn BatchLoader>) -> Self {
        Self { loader }
    }

    pub fn id(&self) -> CallbackId {
        CallbackId(Arc::as_ptr(&self.loader) as *const () as usize)
    }

    pub fn display_name(&self) -> String {
        self.loader.display_name()
    }

    pub async fn call(
        &self,
        specs: Vec<Value>,
        options: LoadOptions,
    ) -> Result<Vec<Value>, LoadError> {
        self.loader.load(specs, options).await
    }
}

impl fmt::Debug for LoadCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadCallback")
            .field("name", &self.display_name())
            .field("id", &self.id())
            .finish()
    }
}

struct FnLoader<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> BatchLoader for FnLoader<F>
where
    F: Fn(Vec<Value>, LoadOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Value>, LoadError>> + Send,
{
    async fn load(&self, specs: Vec<Value>, options: LoadOptions) -> Result<Vec<Value>, LoadError> {
        (self.f)(specs, options).await
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// Build a loader callback from an async closure
pub fn load_one_callback<F, Fut>(name: impl Into<String>, f: F) -> LoadCallback
where
    F: Fn(Vec<Value>, LoadOptions) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Value>, LoadError>> + Send + 'static,
{
    LoadCallback::new(FnLoader {
        name: name.into(),
        f,
    })
}

#[derive(Debug)]
struct FrozenOptions {
    options: LoadOptions,
    key: String,
}

/// Loads one record per row through a [`BatchLoader`]
#[derive(Debug)]
pub struct LoadOneStep {
    callback: LoadCallback,
    attributes: BTreeSet<String>,
    params: BTreeMap<String, Value>,
    frozen: Option<FrozenOptions>,
}

impl LoadOneStep {
    pub fn new(callback: LoadCallback) -> Self {
        Self {
            callback,
            attributes: BTreeSet::new(),
            params: BTreeMap::new(),
            frozen: None,
        }
    }

    pub fn callback(&self) -> &LoadCallback {
        &self.callback
    }

    /// Request an attribute of the loaded record
    pub fn add_attribute(&mut self, attr: impl Into<String>) -> Result<(), PlanError> {
        let attr = attr.into();
        if self.frozen.is_some() {
            return Err(PlanError::FrozenStep {
                step: self.label(),
                what: format!("attribute '{}'", attr),
            });
        }
        self.attributes.insert(attr);
        Ok(())
    }

    /// Set a loader parameter; a key may only be bound to one value
    pub fn set_param(&mut self, key: impl Into<String>, value: Value) -> Result<(), PlanError> {
        let key = key.into();
        if self.frozen.is_some() {
            return Err(PlanError::FrozenStep {
                step: self.label(),
                what: format!("param '{}'", key),
            });
        }
        if let Some(existing) = self.params.get(&key) {
            if canonical_json(existing) != canonical_json(&value) {
                return Err(PlanError::Conflict {
                    step: self.label(),
                    message: format!(
                        "param '{}' already set to {}, cannot set it to {}",
                        key, existing, value
                    ),
                });
            }
            return Ok(());
        }
        self.params.insert(key, value);
        Ok(())
    }

    /// Requested attributes, sorted
    pub fn requested_attributes(&self) -> Vec<String> {
        self.attributes.iter().cloned().collect()
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn load_options(&self) -> Option<&LoadOptions> {
        self.frozen.as_ref().map(|frozen| &frozen.options)
    }

    fn is_kin(&self, other: &LoadOneStep, params_key: &str) -> bool {
        other.callback.id() == self.callback.id() && canonical_params(&other.params) == params_key
    }

    fn dispatch(&self, specs: Vec<Value>, deferreds: Vec<Deferred<Value>>, options: LoadOptions) {
        let callback = self.callback.clone();
        tokio::spawn(async move {
            let loader = callback.display_name();
            let expected = specs.len();
            let guard = SettleGuard {
                loader: loader.clone(),
                deferreds,
            };

            log::debug!("Dispatching {} specs to loader {}", expected, loader);
            match callback.call(specs, options).await {
                Ok(results) if results.len() == expected => {
                    for (deferred, value) in guard.deferreds.iter().zip(results) {
                        if deferred.resolve(value).is_err() {
                            log::warn!("Loader {} result arrived for a settled value", loader);
                        }
                    }
                }
                Ok(results) => {
                    log::warn!(
                        "Loader {} returned {} results for {} specs",
                        loader,
                        results.len(),
                        expected
                    );
                    guard.reject_all(StepError::LoadLengthMismatch {
                        loader: loader.clone(),
                        expected,
                        actual: results.len(),
                    });
                }
                Err(e) => {
                    log::warn!("Loader {} failed: {}", loader, e);
                    guard.reject_all(StepError::LoadFailed {
                        loader: loader.clone(),
                        message: e.message,
                    });
                }
            }
        });
    }
}

/// Rejects whatever is still pending if the load task ends without settling,
/// e.g. when the loader panics or the runtime shuts down
struct SettleGuard {
    loader: String,
    deferreds: Vec<Deferred<Value>>,
}

impl SettleGuard {
    fn reject_all(&self, error: StepError) {
        for deferred in &self.deferreds {
            let _ = deferred.reject(error.clone());
        }
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if self.deferreds.iter().any(|d| !d.is_settled()) {
            self.reject_all(StepError::LoadFailed {
                loader: self.loader.clone(),
                message: "load task ended before producing results".to_string(),
            });
        }
    }
}

impl Step for LoadOneStep {
    fn meta_key(&self) -> &'static str {
        META_KEY
    }

    fn label(&self) -> String {
        format!("{}<{}>", META_KEY, self.callback.display_name())
    }

    fn finalize(&mut self, peers: &[&dyn Step]) -> Result<(), PlanError> {
        if self.frozen.is_some() {
            return Err(PlanError::AlreadyFinalized);
        }

        // Merge the attributes of every kin step; each kin member does the
        // same with the full set, so all of them freeze identical options.
        let params_key = canonical_params(&self.params);
        let kin: Vec<&LoadOneStep> = peers
            .iter()
            .filter_map(|peer| peer.as_any().downcast_ref::<LoadOneStep>())
            .filter(|other| self.is_kin(other, &params_key))
            .collect();
        for other in &kin {
            self.attributes.extend(other.attributes.iter().cloned());
        }

        let options = LoadOptions {
            attributes: if self.attributes.is_empty() {
                None
            } else {
                Some(self.attributes.iter().cloned().collect())
            },
            params: self.params.clone(),
        };
        let key = options.canonical_key();
        log::debug!(
            "Finalized {} with {} kin, options {}",
            self.label(),
            kin.len(),
            key
        );
        self.frozen = Some(FrozenOptions { options, key });
        Ok(())
    }

    fn options_key(&self) -> Option<&str> {
        self.frozen.as_ref().map(|frozen| frozen.key.as_str())
    }

    fn execute(
        &self,
        details: &ExecutionDetails<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Vec<StepOutcome>, StepError> {
        let frozen = self
            .frozen
            .as_ref()
            .ok_or_else(|| StepError::NotFinalized(self.label()))?;
        let specs = details.column(0)?;

        // Nothing may be cached before we know the load can be issued
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(StepError::Unsupported(format!(
                "{} must execute inside a tokio runtime",
                self.label()
            )));
        }

        let lookup =
            ctx.with_cache(|scope| scope.lookup_batch(self.callback.id(), &frozen.key, specs));
        if !lookup.uncached_specs.is_empty() {
            self.dispatch(lookup.uncached_specs, lookup.uncached, frozen.options.clone());
        }

        Ok(lookup.results.into_iter().map(StepOutcome::Pending).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Load one record per row of `spec`
pub fn load_one(graph: &mut PlanGraph, spec: StepId, callback: LoadCallback) -> Result<StepId, PlanError> {
    graph.add_step(LoadOneStep::new(callback), &[spec])
}

/// Request `attr` from the records of `load` and read it
pub fn get(graph: &mut PlanGraph, load: StepId, attr: &str) -> Result<StepId, PlanError> {
    graph.step_mut::<LoadOneStep>(load)?.add_attribute(attr)?;
    access(graph, load, attr)
}

pub fn set_param(
    graph: &mut PlanGraph,
    load: StepId,
    key: &str,
    value: Value,
) -> Result<(), PlanError> {
    graph.step_mut::<LoadOneStep>(load)?.set_param(key, value)
}
