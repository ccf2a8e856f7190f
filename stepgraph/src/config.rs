// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::plan::PlanError;

/// Configuration shared by plan finalize and execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fold steps that compute the same thing from the same inputs
    pub deduplicate_steps: bool,

    /// Run sync-and-safe steps row by row when a batch has a single live row
    pub unbatched_fast_path: bool,

    /// Upper bound on rows per execution request (None = unbounded)
    pub max_batch_rows: Option<usize>,

    /// Emit the plan explanation at debug level after finalize
    pub log_plan_on_finalize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deduplicate_steps: true,
            unbatched_fast_path: true,
            max_batch_rows: None,
            log_plan_on_finalize: true,
        }
    }
}

impl EngineConfig {
    /// Configuration that disables every optimization, useful when debugging
    /// a plan step by step
    pub fn unoptimized() -> Self {
        Self {
            deduplicate_steps: false,
            unbatched_fast_path: false,
            ..Self::default()
        }
    }

    /// Configuration with a hard cap on request size
    pub fn bounded(max_batch_rows: usize) -> Self {
        Self {
            max_batch_rows: Some(max_batch_rows),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, PlanError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| PlanError::InvalidConfig(e.to_string()))?;
        config.validate().map_err(PlanError::InvalidConfig)?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PlanError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PlanError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_rows == Some(0) {
            return Err("max_batch_rows must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"deduplicate_steps": false}"#).unwrap();
        assert!(!config.deduplicate_steps);
        assert!(config.unbatched_fast_path);
        assert_eq!(config.max_batch_rows, None);
    }

    #[test]
    fn test_zero_batch_rows_is_invalid() {
        let err = EngineConfig::from_json_str(r#"{"max_batch_rows": 0}"#).unwrap_err();
        assert!(matches!(err, PlanError::InvalidConfig(_)));
        assert!(EngineConfig::bounded(0).validate().is_err());
        assert!(EngineConfig::bounded(10).validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"unbatched_fast_path": false, "max_batch_rows": 64}}"#
        )
        .unwrap();

        let config = EngineConfig::from_path(file.path()).unwrap();
        assert!(!config.unbatched_fast_path);
        assert_eq!(config.max_batch_rows, Some(64));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PlanError::InvalidConfig(_)));
    }
}
