//! Configuration type definitions.

use crate::detector::DetectionOptions;
use crate::sandbox::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::ConfigError;

/// Main configuration structure for halluscan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detection options (threshold, focus, enabled detectors).
    pub detection: DetectionOptions,
    /// Sandbox settings.
    pub sandbox: SandboxConfig,
}

/// Sandbox configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub limits: ResourceLimits,
    /// Interpreter to run instead of `python3` from `PATH`.
    pub interpreter: Option<PathBuf>,
}

impl Config {
    /// Reject values the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(reason) = self.detection.invalid_reason() {
            return Err(ConfigError::Invalid(reason));
        }
        if let Some(reason) = self.sandbox.limits.invalid_reason() {
            return Err(ConfigError::Invalid(reason));
        }
        Ok(())
    }

    /// Resource limits with the detection timeout applied.
    pub fn effective_limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_execution_time_ms: self.detection.max_execution_time_ms,
            ..self.sandbox.limits
        }
    }
}
