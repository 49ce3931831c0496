use crate::analysis::CodeStructure;
use crate::rules::index::ScanIndex;
use crate::taxonomy::{DetectionMethod, HallucinationCategory, Severity, Subtype};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure inside a rule's evidence extractor.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("rule {rule_id} failed on line {line}: {reason}")]
pub struct RuleError {
    pub rule_id: &'static str,
    pub line: usize,
    pub reason: String,
}

/// What an evidence extractor sees for one matched line.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub rule_id: &'static str,
    /// The matched line, untrimmed.
    pub line: &'a str,
    /// `line` with its comment removed and string contents masked.
    pub code: &'a str,
    /// 0-based index of `line` in `lines`.
    pub index: usize,
    pub lines: &'a [&'a str],
    /// Capture groups of the first pattern that matched `line`.
    pub captures: &'a regex::Captures<'a>,
    /// Facts about the whole file, built once per scan.
    pub scan: &'a ScanIndex,
}

impl<'a> RuleContext<'a> {
    /// 1-based line number.
    pub fn line_number(&self) -> usize {
        self.index + 1
    }

    pub fn capture(&self, group: usize) -> Option<&'a str> {
        self.captures.get(group).map(|m| m.as_str())
    }

    pub fn error(&self, reason: impl Into<String>) -> RuleError {
        RuleError {
            rule_id: self.rule_id,
            line: self.line_number(),
            reason: reason.into(),
        }
    }
}

/// Decides whether a match is backed by evidence. An empty list suppresses
/// the match.
pub type EvidenceExtractor = fn(&RuleContext<'_>) -> Result<Vec<String>, RuleError>;

/// Static definition of a pattern rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub subtype: Subtype,
    pub severity: Severity,
    pub confidence: f64,
    pub patterns: Vec<regex::Regex>,
    pub exclusions: Vec<regex::Regex>,
    pub evidence: EvidenceExtractor,
    pub suggested_fix: &'static str,
}

impl PatternRule {
    pub fn to_category(&self, matched: &PatternMatch) -> HallucinationCategory {
        HallucinationCategory::new(
            self.subtype,
            self.severity,
            matched.confidence,
            DetectionMethod::Pattern,
        )
        .with_evidence(matched.evidence.iter().cloned())
        .with_lines(matched.location.start_line..=matched.location.end_line)
        .with_error_message(self.name)
        .with_suggested_fix(self.suggested_fix)
        .with_rule_id(self.id)
    }
}

/// 1-based, end-exclusive column span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchLocation {
    pub start_line: usize,
    pub end_line: usize,
    pub start_column: usize,
    pub end_column: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub rule_id: String,
    pub confidence: f64,
    pub location: MatchLocation,
    pub evidence: Vec<String>,
}

/// Output of one pattern scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternScan {
    pub matches: Vec<PatternMatch>,
    pub categories: Vec<HallucinationCategory>,
    pub code_structure: CodeStructure,
    pub confidence: f64,
    /// Extractor failures that were skipped during the scan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_errors: Vec<String>,
}
