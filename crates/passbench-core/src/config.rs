//! Centralized configuration management with TOML support.
//!
//! Provides structured defaults for the execution sandbox and the
//! report output with load/save capabilities.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PassbenchError, Result};

/// Execution sandbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Interpreter command used to spawn worker processes.
    pub python_cmd: String,
    /// Wall-clock deadline per guarded step (definition or one assertion), seconds.
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            python_cmd: "python3".into(),
            timeout_secs: 30,
        }
    }
}

impl ExecutionConfig {
    /// Validate execution settings.
    pub fn validate(&self) -> Result<()> {
        if self.python_cmd.trim().is_empty() {
            return Err(PassbenchError::InvalidConfig(
                "python_cmd must not be empty".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(PassbenchError::InvalidConfig(
                "timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Report output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Where to write the machine-readable accuracy record, if anywhere.
    pub scores_path: Option<String>,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sandbox settings.
    pub execution: ExecutionConfig,
    /// Report settings.
    pub report: ReportConfig,
}

impl AppConfig {
    /// Load configuration from TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PassbenchError::Other(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| PassbenchError::Other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate all sub-configs.
    pub fn validate(&self) -> Result<()> {
        self.execution.validate()?;
        Ok(())
    }
}
