pub mod analysis;
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod language;
pub mod reporter;
pub mod rules;
pub mod run;
pub mod safety;
pub mod sandbox;
pub mod scoring;
pub mod suppression;
pub mod taxonomy;

#[cfg(test)]
pub mod test_utils;

pub use analysis::{CodeStructure, StructureAnalyzer};
pub use cli::{Cli, OutputFormat};
pub use config::{Config, ConfigError, SandboxConfig};
pub use detector::{
    DetectionMetadata, DetectionOptions, DetectionResult, Detector, DetectorError, Orchestrator,
    Recommendation, generate_recommendations,
};
pub use error::{HalluscanError, Result};
pub use language::Language;
pub use reporter::{Reporter, json::JsonReporter, terminal::TerminalReporter};
pub use rules::{PatternMatcher, PatternRule, PatternScan};
pub use run::run_analysis;
pub use safety::{SafetyAssessment, SafetyAssessor};
pub use sandbox::{ExecutionResult, ExecutionSandbox, ResourceLimits, TestCase};
pub use scoring::{RiskLevel, Summary};
pub use taxonomy::{
    BusinessImpact, DetectionMethod, HallucinationCategory, HallucinationType, Severity, Subtype,
};
