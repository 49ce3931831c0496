//! Sandboxed execution of candidate code.
//!
//! Every run gets a fresh interpreter process in a fresh temporary
//! directory, confined by [`ResourceLimits`]. Failures of any kind come back
//! as a well-formed [`ExecutionResult`]; nothing here returns `Err`.

mod executor;
pub mod limits;
mod traceback;
mod usage;

use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub use limits::ResourceLimits;

/// Largest accepted source, in bytes.
pub const MAX_CODE_LENGTH: usize = 100_000;

/// Cap on captured stdout and stderr, each.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// `type` values the sandbox produces itself, beside interpreter exceptions.
pub mod error_kind {
    pub const TIMEOUT: &str = "TimeoutError";
    pub const MEMORY: &str = "MemoryError";
    pub const VALIDATION: &str = "ValidationError";
    pub const SPAWN: &str = "SpawnError";
    pub const PROCESS_KILLED: &str = "ProcessKilled";
    pub const NON_ZERO_EXIT: &str = "NonZeroExit";
    pub const OUTPUT_MISMATCH: &str = "OutputMismatch";
}

/// Entries of [`ExecutionResult::security_flags`].
pub mod flags {
    pub const TIMEOUT_ENFORCED: &str = "timeout_enforced";
    pub const OUTPUT_TRUNCATED: &str = "output_truncated";
    pub const MEMORY_LIMIT_EXCEEDED: &str = "memory_limit_exceeded";
    pub const CPU_LIMIT_EXCEEDED: &str = "cpu_limit_exceeded";

    pub fn killed_by_signal(signal: i32) -> String {
        format!("killed_by_signal:{signal}")
    }
}

/// One failure observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<usize>,
}

impl ExecutionError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            line_number: None,
            column_number: None,
        }
    }

    /// True for errors raised by the sandbox about itself rather than by the code.
    pub fn is_internal(&self) -> bool {
        self.kind == error_kind::SPAWN || self.kind == error_kind::VALIDATION
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    #[serde(rename = "memoryMB")]
    pub memory_mb: f64,
    pub execution_time_ms: u64,
    /// CPU time over wall time, as a percentage.
    pub cpu_usage: f64,
    #[serde(rename = "peakMemoryMB", skip_serializing_if = "Option::is_none")]
    pub peak_memory_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_calls: Option<u64>,
}

/// Outcome of a single sandbox run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub output: String,
    pub stderr: String,
    pub errors: Vec<ExecutionError>,
    pub resource_usage: ResourceUsage,
    pub security_flags: Vec<String>,
}

impl ExecutionResult {
    /// A run that never got to execute the code.
    pub fn rejected(kind: &str, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            errors: vec![ExecutionError::new(kind, message)],
            resource_usage: ResourceUsage {
                execution_time_ms: elapsed.as_millis() as u64,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn has_error(&self, kind: &str) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.security_flags.iter().any(|f| f == flag)
    }

    /// Whether the code actually ran, as opposed to being rejected or failing to spawn.
    pub fn executed(&self) -> bool {
        !self.errors.iter().any(ExecutionError::is_internal)
    }
}

/// A stdin/expected-stdout pair for [`ExecutionSandbox::execute_with_tests`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub critical: bool,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn expecting(mut self, output: impl Into<String>) -> Self {
        self.expected_output = Some(output.into());
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// Runs code in a resource-limited interpreter process.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSandbox {
    interpreter: Option<PathBuf>,
    limits: ResourceLimits,
}

impl ExecutionSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `interpreter` instead of the language's default from `PATH`.
    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Limits applied when a call does not pass its own.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub async fn execute(
        &self,
        code: &str,
        language: Language,
        limits: Option<ResourceLimits>,
    ) -> ExecutionResult {
        let limits = limits.unwrap_or(self.limits);
        if let Some(rejection) = validate(code, &limits) {
            return rejection;
        }
        self.run(code, language, limits, None).await
    }

    /// Run `code` once per test case, stopping right after a failing
    /// critical case.
    pub async fn execute_with_tests(
        &self,
        code: &str,
        language: Language,
        test_cases: &[TestCase],
    ) -> Vec<ExecutionResult> {
        if let Some(rejection) = validate(code, &self.limits) {
            return vec![rejection];
        }

        let mut results = Vec::with_capacity(test_cases.len());
        for case in test_cases {
            let mut result = self
                .run(code, language, self.limits, case.input.as_deref())
                .await;

            if result.success
                && let Some(expected) = &case.expected_output
                && result.output.trim() != expected.trim()
            {
                result.errors.push(ExecutionError::new(
                    error_kind::OUTPUT_MISMATCH,
                    format!(
                        "test '{}' expected {:?} but got {:?}",
                        case.name,
                        expected.trim(),
                        result.output.trim()
                    ),
                ));
                result.success = false;
            }

            let stop = case.critical && !result.success;
            results.push(result);
            if stop {
                debug!(test = %case.name, "critical test case failed, skipping the rest");
                break;
            }
        }
        results
    }

    async fn run(
        &self,
        code: &str,
        language: Language,
        limits: ResourceLimits,
        stdin: Option<&str>,
    ) -> ExecutionResult {
        let interpreter = self
            .interpreter
            .as_deref()
            .map(|p| p.as_os_str())
            .unwrap_or_else(|| OsStr::new(language.default_interpreter()));
        executor::run(executor::Job {
            interpreter,
            language,
            code,
            limits,
            stdin,
        })
        .await
    }
}

fn validate(code: &str, limits: &ResourceLimits) -> Option<ExecutionResult> {
    let message = if code.is_empty() {
        "code must not be empty".to_string()
    } else if code.len() > MAX_CODE_LENGTH {
        format!(
            "code is {} bytes, the limit is {MAX_CODE_LENGTH}",
            code.len()
        )
    } else {
        limits.invalid_reason()?
    };
    Some(ExecutionResult::rejected(
        error_kind::VALIDATION,
        message,
        Duration::ZERO,
    ))
}
