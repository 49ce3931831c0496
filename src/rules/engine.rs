use crate::analysis::StructureAnalyzer;
use crate::analysis::source::is_insignificant;
use crate::detector::{Detector, DetectorError};
use crate::rules::builtin;
use crate::rules::index::ScanIndex;
use crate::rules::types::{
    MatchLocation, PatternMatch, PatternRule, PatternScan, RuleContext, RuleError,
};
use crate::suppression::suppressions;
use crate::taxonomy::{DetectionMethod, HallucinationCategory};
use std::borrow::Cow;
use tracing::{debug, trace, warn};

/// Confidence lost per extractor failure.
const RULE_ERROR_PENALTY: f64 = 0.1;

/// Line-oriented pattern scanner over the rule catalog.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: Cow<'static, [PatternRule]>,
    analyzer: StructureAnalyzer,
}

impl PatternMatcher {
    pub fn new() -> Self {
        Self {
            rules: Cow::Borrowed(builtin::all_rules()),
            analyzer: StructureAnalyzer::new(),
        }
    }

    /// Matcher over an explicit rule set instead of the builtin catalog.
    pub fn with_rules(rules: Vec<PatternRule>) -> Self {
        Self {
            rules: Cow::Owned(rules),
            analyzer: StructureAnalyzer::new(),
        }
    }

    /// Get a rule by ID
    pub fn get_rule(&self, id: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn detect_patterns(&self, code: &str) -> PatternScan {
        let lines: Vec<&str> = code.lines().collect();
        trace!(
            lines = lines.len(),
            rules = self.rules.len(),
            "Checking code against pattern rules"
        );

        let scan = ScanIndex::build(&lines);
        let silenced_lines = suppressions(&lines);

        let mut matches = Vec::new();
        let mut rule_errors = Vec::new();

        for rule in self.rules.iter() {
            for (index, line) in lines.iter().enumerate() {
                if scan.in_string[index] || is_insignificant(line) {
                    continue;
                }
                if let Some(silenced) = &silenced_lines[index]
                    && silenced.covers(rule.id)
                {
                    continue;
                }
                let code_line = scan.code[index].as_str();
                if rule.exclusions.iter().any(|e| e.is_match(code_line)) {
                    continue;
                }

                match Self::check_line(rule, &lines, &scan, index, code_line) {
                    Ok(Some(found)) => matches.push(found),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(rule = rule.id, line = err.line, error = %err.reason, "Rule evidence extraction failed");
                        rule_errors.push(err.to_string());
                    }
                }
            }
        }

        matches.sort_by(|a, b| {
            a.location
                .start_line
                .cmp(&b.location.start_line)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        let categories: Vec<HallucinationCategory> = matches
            .iter()
            .filter_map(|m| self.get_rule(&m.rule_id).map(|rule| rule.to_category(m)))
            .collect();

        let confidence = Self::scan_confidence(&matches, rule_errors.len());
        debug!(
            matches = matches.len(),
            rule_errors = rule_errors.len(),
            confidence,
            "Pattern scan finished"
        );

        PatternScan {
            matches,
            categories,
            code_structure: self.analyzer.analyze(code),
            confidence,
            rule_errors,
        }
    }

    fn scan_confidence(matches: &[PatternMatch], errors: usize) -> f64 {
        let base = if matches.is_empty() {
            1.0
        } else {
            matches.iter().map(|m| m.confidence).sum::<f64>() / matches.len() as f64
        };
        (base - RULE_ERROR_PENALTY * errors as f64).clamp(0.0, 1.0)
    }

    /// Run every pattern of `rule` over one line. Evidence from all
    /// captures is merged; the first capture with evidence gives the
    /// location.
    fn check_line(
        rule: &PatternRule,
        lines: &[&str],
        scan: &ScanIndex,
        index: usize,
        code_line: &str,
    ) -> Result<Option<PatternMatch>, RuleError> {
        let mut location: Option<MatchLocation> = None;
        let mut evidence: Vec<String> = Vec::new();

        for pattern in &rule.patterns {
            for captures in pattern.captures_iter(code_line) {
                let ctx = RuleContext {
                    rule_id: rule.id,
                    line: lines[index],
                    code: code_line,
                    index,
                    lines,
                    captures: &captures,
                    scan,
                };
                let found = (rule.evidence)(&ctx)?;
                if found.is_empty() {
                    continue;
                }
                if location.is_none()
                    && let Some(whole) = captures.get(0)
                {
                    location = Some(MatchLocation {
                        start_line: index + 1,
                        end_line: index + 1,
                        start_column: column_at(code_line, whole.start()),
                        end_column: column_at(code_line, whole.end()),
                    });
                }
                for item in found {
                    if !evidence.contains(&item) {
                        evidence.push(item);
                    }
                }
            }
        }

        Ok(location.map(|location| PatternMatch {
            rule_id: rule.id.to_string(),
            confidence: rule.confidence,
            location,
            evidence,
        }))
    }
}

/// 1-based character column of a byte offset.
fn column_at(line: &str, byte_offset: usize) -> usize {
    line[..byte_offset].chars().count() + 1
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for PatternMatcher {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Pattern
    }

    fn detect(&self, code: &str) -> Result<Vec<HallucinationCategory>, DetectorError> {
        let scan = self.detect_patterns(code);
        if !scan.rule_errors.is_empty() && scan.matches.is_empty() && scan.confidence == 0.0 {
            return Err(DetectorError::new(
                self.method(),
                format!("every rule failed: {}", scan.rule_errors.join("; ")),
            ));
        }
        Ok(scan.categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::builtin::CATALOG_VERSION;
    use crate::taxonomy::{Severity, Subtype};
    use regex::Regex;

    fn line_rule(
        id: &'static str,
        pattern: &str,
        evidence: fn(&RuleContext<'_>) -> Result<Vec<String>, RuleError>,
    ) -> PatternRule {
        PatternRule {
            id,
            name: "Test rule",
            description: "Test rule",
            subtype: Subtype::LogicDeviation,
            severity: Severity::Low,
            confidence: 0.6,
            patterns: vec![Regex::new(pattern).unwrap()],
            exclusions: vec![],
            evidence,
            suggested_fix: "Fix it",
        }
    }

    fn always(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
        Ok(vec![format!("matched line {}", ctx.line_number())])
    }

    fn never(_: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
        Ok(vec![])
    }

    fn failing(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
        Err(ctx.error("boom"))
    }

    #[test]
    fn test_default_catalog_is_loaded() {
        let matcher = PatternMatcher::default();
        assert!(matcher.get_rule("MAP-001").is_some());
        assert!(matcher.get_rule("LOG-004").is_some());
        assert!(!CATALOG_VERSION.is_empty());
    }

    #[test]
    fn test_no_matches_gives_full_confidence() {
        let matcher = PatternMatcher::new();
        let scan = matcher.detect_patterns("import math\nprint(math.sqrt(16))\n");
        assert!(scan.matches.is_empty(), "{:?}", scan.matches);
        assert_eq!(scan.confidence, 1.0);
        assert_eq!(scan.code_structure.imports, vec!["math"]);
    }

    #[test]
    fn test_location_is_one_based() {
        let matcher = PatternMatcher::with_rules(vec![line_rule("T-1", r"needle", always)]);
        let scan = matcher.detect_patterns("a = 1\nb = needle\n");
        assert_eq!(scan.matches.len(), 1);
        let location = scan.matches[0].location;
        assert_eq!(location.start_line, 2);
        assert_eq!(location.start_column, 5);
        assert_eq!(location.end_column, 11);
        assert_eq!(scan.categories[0].first_line(), Some(2));
    }

    #[test]
    fn test_empty_evidence_suppresses_match() {
        let matcher = PatternMatcher::with_rules(vec![line_rule("T-1", r"needle", never)]);
        let scan = matcher.detect_patterns("needle\n");
        assert!(scan.matches.is_empty());
    }

    #[test]
    fn test_comments_and_strings_are_not_matched() {
        let matcher = PatternMatcher::with_rules(vec![line_rule("T-1", r"needle", always)]);
        let code = "# needle\nx = 'needle'\ny = 1  # needle\n\"\"\"\nneedle\n\"\"\"\n";
        assert!(matcher.detect_patterns(code).matches.is_empty());
    }

    #[test]
    fn test_extractor_failure_is_skipped_and_lowers_confidence() {
        let matcher = PatternMatcher::with_rules(vec![
            line_rule("T-1", r"needle", always),
            line_rule("T-2", r"needle", failing),
        ]);
        let scan = matcher.detect_patterns("needle\n");
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.rule_errors.len(), 1);
        assert!((scan.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_evidence_is_merged_per_line() {
        let matcher = PatternMatcher::with_rules(vec![line_rule("T-1", r"n\w+", always)]);
        let scan = matcher.detect_patterns("needle + nail\n");
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].evidence, vec!["matched line 1"]);
    }

    #[test]
    fn test_inline_suppression() {
        let matcher = PatternMatcher::with_rules(vec![line_rule("T-1", r"needle", always)]);
        let code = "a = needle  # halluscan-ignore:T-1\nb = needle  # halluscan-ignore:T-2\n";
        let scan = matcher.detect_patterns(code);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].location.start_line, 2);
    }

    #[test]
    fn test_region_and_next_line_suppressions_combine() {
        let matcher = PatternMatcher::with_rules(vec![
            line_rule("T-1", r"needle", always),
            line_rule("T-2", r"needle", always),
        ]);
        let code = "# halluscan-disable:T-1\n# halluscan-ignore-next-line:T-2\na = needle\nb = needle\n";
        let scan = matcher.detect_patterns(code);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].rule_id, "T-2");
        assert_eq!(scan.matches[0].location.start_line, 4);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let matcher = PatternMatcher::new();
        let code = crate::test_utils::fixtures::HALLUCINATED_SAMPLE;
        let first = matcher.detect_patterns(code);
        let second = matcher.detect_patterns(code);
        assert_eq!(first.matches, second.matches);
    }

    #[test]
    fn test_detector_trait_returns_categories() {
        let matcher = PatternMatcher::with_rules(vec![line_rule("T-1", r"needle", always)]);
        assert_eq!(matcher.method(), DetectionMethod::Pattern);
        let categories = matcher.detect("needle\n").unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].rule_id.as_deref(), Some("T-1"));
    }
}
