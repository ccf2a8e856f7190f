//! In-memory loader that records every call it receives

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stepgraph::{BatchLoader, LoadError, LoadOptions, Value};
use tokio::sync::Barrier;

/// One loader invocation
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub specs: Vec<Value>,
    pub options: LoadOptions,
}

/// Loader over a table of records keyed by string id
///
/// Records are projected to the requested attributes, unknown ids load as
/// `Null`.
#[allow(dead_code)]
pub struct RecordingLoader {
    name: String,
    records: BTreeMap<String, Value>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    fail_with: Option<String>,
    delay: Option<Duration>,
    barrier: Option<Arc<Barrier>>,
}

#[allow(dead_code)]
impl RecordingLoader {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: BTreeMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_with: None,
            delay: None,
            barrier: None,
        }
    }

    /// Table of users with `id`, `name` and `age`
    pub fn users() -> Self {
        let mut loader = Self::new("users");
        for (id, name, age) in [("1", "Alice", 30i64), ("2", "Bob", 25), ("3", "Carol", 41)] {
            loader.records.insert(
                id.to_string(),
                Value::object(vec![
                    ("id", Value::from(id)),
                    ("name", Value::from(name)),
                    ("age", Value::from(age)),
                ]),
            );
        }
        loader
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(name)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call waits on `barrier` before answering
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Handle to the call log, usable after the loader moved into a callback
    pub fn calls(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }

    fn project(&self, record: &Value, options: &LoadOptions) -> Value {
        match (&options.attributes, record.as_object()) {
            (Some(attrs), Some(map)) => Value::object(
                attrs
                    .iter()
                    .filter_map(|attr| map.get(attr).map(|v| (attr.clone(), v.clone()))),
            ),
            _ => record.clone(),
        }
    }
}

#[async_trait]
impl BatchLoader for RecordingLoader {
    async fn load(&self, specs: Vec<Value>, options: LoadOptions) -> Result<Vec<Value>, LoadError> {
        self.calls.lock().push(RecordedCall {
            specs: specs.clone(),
            options: options.clone(),
        });

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(LoadError::new(message.clone()));
        }

        Ok(specs
            .iter()
            .map(|spec| {
                spec.as_str()
                    .and_then(|id| self.records.get(id))
                    .map(|record| self.project(record, &options))
                    .unwrap_or(Value::Null)
            })
            .collect())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}
