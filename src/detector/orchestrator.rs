//! Composition of every detector into one [`DetectionResult`].

use super::{
    Detector, DetectionMetadata, DetectionOptions, DetectionResult, ExecutionFindings,
    generate_recommendations,
};
use crate::analysis::{CodeStructure, StructureAnalyzer};
use crate::config::ConfigError;
use crate::error::{HalluscanError, Result};
use crate::language::Language;
use crate::rules::PatternMatcher;
use crate::safety::{SafetyAssessment, SafetyAssessor};
use crate::sandbox::{ExecutionResult, ExecutionSandbox, MAX_CODE_LENGTH, ResourceLimits};
use crate::scoring::{Summary, hallucination_rate};
use crate::taxonomy::{BusinessImpact, HallucinationCategory, HallucinationType, Severity, Subtype};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Schema version stamped into every result.
pub const DETECTION_VERSION: &str = "1.0.0";

/// Runs the detectors and merges their findings. Holds no per-analysis
/// state, so one instance can serve concurrent analyses.
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    matcher: PatternMatcher,
    analyzer: StructureAnalyzer,
    assessor: SafetyAssessor,
    sandbox: ExecutionSandbox,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sandbox(mut self, sandbox: ExecutionSandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_matcher(mut self, matcher: PatternMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub async fn detect_hallucinations(
        &self,
        code: &str,
        language: Language,
        options: Option<&DetectionOptions>,
    ) -> Result<DetectionResult> {
        let started = Instant::now();
        validate_input(code)?;
        let options = options.cloned().unwrap_or_default();
        if let Some(reason) = options.invalid_reason() {
            return Err(ConfigError::Invalid(reason).into());
        }
        info!(%language, code_length = code.len(), "Starting hallucination analysis");

        let StaticPass {
            code_structure,
            safety_assessment,
            mut found,
        } = self.static_pass(code, &options).await?;

        let mut execution_result = None;
        if options.enable_execution_analysis {
            if safety_assessment.allow_execution {
                execution_result = self.execute(code, language, &options).await;
            } else {
                info!(
                    risks = safety_assessment.risks.len(),
                    "Safety gate denied execution"
                );
            }
        }
        if let Some(result) = &execution_result {
            collect(&ExecutionFindings::new(result), code, &mut found);
        }
        let execution_verified = execution_result
            .as_ref()
            .is_some_and(ExecutionResult::executed);

        let categories = finalize(found, &options);
        let rate = hallucination_rate(&categories);
        let summary = Summary::from_categories(&categories, rate);
        let recommendations = if options.generate_recommendations {
            generate_recommendations(&categories)
        } else {
            Vec::new()
        };

        let result = DetectionResult {
            overall_hallucination_rate: rate,
            business_impact: BusinessImpact::aggregate(
                categories.iter().map(|c| &c.business_impact),
            ),
            has_critical_issues: categories.iter().any(|c| c.severity == Severity::Critical),
            categories,
            execution_result,
            recommendations,
            detection_metadata: DetectionMetadata {
                analysis_time_ms: started.elapsed().as_millis() as u64,
                version: DETECTION_VERSION.to_string(),
                language,
                code_length: code.len(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                execution_verified,
            },
            summary,
            code_structure,
            safety_assessment,
        };

        info!(
            categories = result.categories.len(),
            rate = result.overall_hallucination_rate,
            risk = %result.summary.overall_risk,
            elapsed_ms = result.detection_metadata.analysis_time_ms,
            "Hallucination analysis finished"
        );
        Ok(result)
    }

    /// Structure, pattern and safety analysis on the blocking pool. They are
    /// CPU-bound and must not stall the runtime's workers.
    async fn static_pass(&self, code: &str, options: &DetectionOptions) -> Result<StaticPass> {
        let matcher = self.matcher.clone();
        let analyzer = self.analyzer.clone();
        let assessor = self.assessor.clone();
        let code = code.to_owned();
        let patterns = options.enable_pattern_matching;
        let static_analysis = options.enable_static_analysis;

        let task = tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            if patterns {
                collect(&matcher, &code, &mut found);
            }
            if static_analysis {
                collect(&assessor, &code, &mut found);
            }
            StaticPass {
                code_structure: analyzer.analyze(&code),
                safety_assessment: assessor.validate_safety(&code),
                found,
            }
        });

        match task.await {
            Ok(pass) => Ok(pass),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(HalluscanError::Aborted(e.to_string())),
        }
    }

    /// Run the sandbox on its own task. A panic there is a detector
    /// failure, not an analysis failure.
    async fn execute(
        &self,
        code: &str,
        language: Language,
        options: &DetectionOptions,
    ) -> Option<ExecutionResult> {
        let sandbox = self.sandbox.clone();
        let limits = ResourceLimits {
            max_execution_time_ms: options.max_execution_time_ms,
            ..*self.sandbox.limits()
        };
        let code = code.to_owned();
        let task =
            tokio::spawn(async move { sandbox.execute(&code, language, Some(limits)).await });

        match task.await {
            Ok(result) => {
                debug!(
                    success = result.success,
                    timed_out = result.timed_out,
                    "Execution analysis finished"
                );
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, "Execution detector failed, continuing without it");
                None
            }
        }
    }
}

struct StaticPass {
    code_structure: CodeStructure,
    safety_assessment: SafetyAssessment,
    found: Vec<HallucinationCategory>,
}

fn validate_input(code: &str) -> Result<()> {
    if code.is_empty() {
        return Err(HalluscanError::EmptyCode);
    }
    if code.len() > MAX_CODE_LENGTH {
        return Err(HalluscanError::CodeTooLong {
            len: code.len(),
            max: MAX_CODE_LENGTH,
        });
    }
    Ok(())
}

fn collect(detector: &dyn Detector, code: &str, out: &mut Vec<HallucinationCategory>) {
    match detector.detect(code) {
        Ok(categories) => {
            debug!(method = %detector.method(), count = categories.len(), "Detector finished");
            out.extend(categories);
        }
        Err(e) => warn!(method = %e.method, error = %e, "Detector failed, continuing without it"),
    }
}

/// Merge duplicates, apply the threshold and focus filters, and sort.
fn finalize(found: Vec<HallucinationCategory>, options: &DetectionOptions) -> Vec<HallucinationCategory> {
    let mut categories: Vec<HallucinationCategory> = merge(found)
        .into_iter()
        .filter(|c| c.confidence >= options.confidence_threshold && options.includes(c.kind))
        .collect();

    categories.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| {
                a.first_line()
                    .unwrap_or(usize::MAX)
                    .cmp(&b.first_line().unwrap_or(usize::MAX))
            })
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
    categories
}

type MergeKey = (HallucinationType, Subtype, BTreeSet<usize>);

/// Collapse categories that share type, subtype and lines. The merged
/// category keeps the worst severity and the highest confidence, unions the
/// evidence, and reports the method of its most confident member.
fn merge(found: Vec<HallucinationCategory>) -> Vec<HallucinationCategory> {
    let mut merged: Vec<HallucinationCategory> = Vec::with_capacity(found.len());
    let mut index: HashMap<MergeKey, usize> = HashMap::new();

    for category in found {
        let key = (category.kind, category.subtype, category.line_numbers.clone());
        match index.get(&key) {
            Some(&at) => absorb(&mut merged[at], category),
            None => {
                index.insert(key, merged.len());
                merged.push(category);
            }
        }
    }
    merged
}

fn absorb(into: &mut HallucinationCategory, other: HallucinationCategory) {
    if other.confidence > into.confidence {
        into.confidence = other.confidence;
        into.detection_method = other.detection_method;
    }
    into.severity = into.severity.max(other.severity);
    for item in other.evidence {
        if !into.evidence.contains(&item) {
            into.evidence.push(item);
        }
    }
    if into.rule_id.is_none() {
        into.rule_id = other.rule_id;
    }
    if into.error_message.is_none() {
        into.error_message = other.error_message;
    }
    if into.suggested_fix.is_none() {
        into.suggested_fix = other.suggested_fix;
    }
}
