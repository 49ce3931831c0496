use super::{Detector, DetectorError};
use crate::sandbox::{ExecutionError, ExecutionResult, error_kind};
use crate::taxonomy::{DetectionMethod, HallucinationCategory, Severity, Subtype};

/// Failures observed at runtime are verified, so they carry high confidence.
const EXECUTION_CONFIDENCE: f64 = 0.95;
/// Exceptions outside the known mapping are less specific.
const UNMAPPED_CONFIDENCE: f64 = 0.8;

/// Detector view of a finished sandbox run.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionFindings<'a> {
    result: &'a ExecutionResult,
}

impl<'a> ExecutionFindings<'a> {
    pub fn new(result: &'a ExecutionResult) -> Self {
        Self { result }
    }
}

impl Detector for ExecutionFindings<'_> {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Execution
    }

    fn detect(&self, _code: &str) -> Result<Vec<HallucinationCategory>, DetectorError> {
        if !self.result.executed() {
            return Ok(Vec::new());
        }
        Ok(self
            .result
            .errors
            .iter()
            .filter_map(categorize)
            .collect())
    }
}

/// Taxonomy slot, severity, confidence and fix for a runtime error type.
fn classify(kind: &str) -> (Subtype, Severity, f64, &'static str) {
    match kind {
        "TimeoutError" | "RecursionError" => (
            Subtype::ComputationalBoundary,
            Severity::Critical,
            EXECUTION_CONFIDENCE,
            "Bound the loop or recursion so it finishes within the time limit",
        ),
        "MemoryError" => (
            Subtype::PhysicalConstraint,
            Severity::Critical,
            EXECUTION_CONFIDENCE,
            "Reduce the size of the data held in memory or process it in chunks",
        ),
        "NameError" | "UnboundLocalError" => (
            Subtype::Identity,
            Severity::High,
            EXECUTION_CONFIDENCE,
            "Define the name before it is used or fix its spelling",
        ),
        "ModuleNotFoundError" | "ImportError" => (
            Subtype::ExternalSource,
            Severity::High,
            EXECUTION_CONFIDENCE,
            "Replace the import with a package that exists, or add it to the dependencies",
        ),
        "TypeError" | "ValueError" => (
            Subtype::DataCompliance,
            Severity::High,
            EXECUTION_CONFIDENCE,
            "Convert values to the types the operation expects",
        ),
        "KeyError" | "IndexError" | "AttributeError" => (
            Subtype::StructureAccess,
            Severity::High,
            EXECUTION_CONFIDENCE,
            "Check that the key, index or attribute exists before accessing it",
        ),
        "SyntaxError" | "IndentationError" | "TabError" => (
            Subtype::LogicBreakdown,
            Severity::High,
            EXECUTION_CONFIDENCE,
            "Fix the syntax so the code parses",
        ),
        _ => (
            Subtype::LogicBreakdown,
            Severity::Medium,
            UNMAPPED_CONFIDENCE,
            "Trace the failing statement and correct the logic that leads to it",
        ),
    }
}

fn categorize(error: &ExecutionError) -> Option<HallucinationCategory> {
    if error.is_internal() {
        return None;
    }
    let (subtype, severity, confidence, fix) = classify(&error.kind);
    let evidence = if error.message.is_empty() {
        error.kind.clone()
    } else {
        format!("{}: {}", error.kind, error.message)
    };
    let evidence = match error.line_number {
        Some(line) if error.kind != error_kind::OUTPUT_MISMATCH => {
            format!("{evidence} (raised on line {line})")
        }
        _ => evidence,
    };
    Some(
        HallucinationCategory::new(subtype, severity, confidence, DetectionMethod::Execution)
            .with_lines(error.line_number)
            .with_evidence([evidence])
            .with_error_message(error.message.clone())
            .with_suggested_fix(fix),
    )
}
