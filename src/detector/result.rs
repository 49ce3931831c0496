use super::Recommendation;
use crate::analysis::CodeStructure;
use crate::language::Language;
use crate::safety::SafetyAssessment;
use crate::sandbox::ExecutionResult;
use crate::scoring::Summary;
use crate::taxonomy::{BusinessImpact, HallucinationCategory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionMetadata {
    pub analysis_time_ms: u64,
    pub version: String,
    pub language: Language,
    /// Length of the analyzed code in bytes.
    pub code_length: usize,
    /// RFC 3339
    pub timestamp: String,
    /// True when the sandbox actually ran the code.
    pub execution_verified: bool,
}

/// Unified verdict of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub overall_hallucination_rate: f64,
    pub categories: Vec<HallucinationCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
    pub business_impact: BusinessImpact,
    pub recommendations: Vec<Recommendation>,
    pub detection_metadata: DetectionMetadata,
    pub has_critical_issues: bool,
    pub summary: Summary,
    pub code_structure: CodeStructure,
    pub safety_assessment: SafetyAssessment,
}
