use crate::detector::{DetectionResult, Recommendation};
use crate::reporter::Reporter;
use crate::scoring::RiskLevel;
use crate::taxonomy::{HallucinationCategory, Severity};
use colored::Colorize;

pub struct TerminalReporter {
    verbose: bool,
    /// Label and text of the analyzed code, for snippets.
    source: Option<(String, String)>,
}

impl TerminalReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            source: None,
        }
    }

    /// Show findings against `code`, labelled `name` (usually a file path).
    pub fn with_source(mut self, name: impl Into<String>, code: impl Into<String>) -> Self {
        self.source = Some((name.into(), code.into()));
        self
    }

    fn severity_color(&self, severity: &Severity) -> colored::ColoredString {
        let label = format!("[{}]", severity);
        match severity {
            Severity::Critical => label.red().bold(),
            Severity::High => label.yellow().bold(),
            Severity::Medium => label.cyan(),
            Severity::Low => label.white(),
        }
    }

    fn risk_level_color(&self, level: &RiskLevel) -> colored::ColoredString {
        let label = level.as_str();
        match level {
            RiskLevel::Safe => label.green().bold(),
            RiskLevel::Low => label.white(),
            RiskLevel::Medium => label.cyan().bold(),
            RiskLevel::High => label.yellow().bold(),
            RiskLevel::Critical => label.red().bold(),
        }
    }

    fn source_line(&self, line: usize) -> Option<&str> {
        let (_, code) = self.source.as_ref()?;
        code.lines().nth(line.checked_sub(1)?)
    }

    /// Lint-style block: location header, snippet with gutter, then
    /// evidence and fix.
    fn format_category(&self, category: &HallucinationCategory) -> String {
        let mut output = String::new();
        let name = self
            .source
            .as_ref()
            .map(|(name, _)| name.as_str())
            .unwrap_or("<input>");
        let line = category.first_line();
        let rule = category
            .rule_id
            .as_deref()
            .map(|id| format!(" {id}"))
            .unwrap_or_default();

        output.push_str(&format!(
            "{}:{}: {}{} {}/{} ({})\n",
            name,
            line.map_or_else(|| "-".to_string(), |l| l.to_string()),
            self.severity_color(&category.severity),
            rule.bold(),
            category.kind,
            category.subtype,
            category.detection_method
        ));

        let gutter_width = line.map_or(4, |l| l.to_string().len().max(4));
        if let Some(line) = line
            && let Some(code) = self.source_line(line)
        {
            output.push_str(&format!(
                "{:>width$} {}\n",
                "",
                "|".dimmed(),
                width = gutter_width
            ));
            output.push_str(&format!(
                "{:>width$} {} {}\n",
                line.to_string().cyan(),
                "|".dimmed(),
                code,
                width = gutter_width
            ));
            let indent = code.len() - code.trim_start().len();
            let pointer = "^".repeat(code.trim().chars().count().clamp(1, 60));
            output.push_str(&format!(
                "{:>width$} {} {}{}\n",
                "",
                "|".dimmed(),
                " ".repeat(indent),
                pointer.bright_red().bold(),
                width = gutter_width
            ));
        }

        for evidence in &category.evidence {
            output.push_str(&format!(
                "{:>width$} {} {}\n",
                "",
                "=".dimmed(),
                format!("why: {}", evidence).yellow(),
                width = gutter_width
            ));
        }

        if let Some(fix) = &category.suggested_fix {
            output.push_str(&format!(
                "{:>width$} {} {}\n",
                "",
                "=".dimmed(),
                format!("fix: {}", fix).green(),
                width = gutter_width
            ));
        }

        if self.verbose {
            output.push_str(&format!(
                "{:>width$} {} confidence: {:.2}, impact: {:.1}h\n",
                "",
                "=".dimmed(),
                category.confidence,
                category.business_impact.estimated_dev_time_wasted_hours,
                width = gutter_width
            ));
        }

        output
    }

    fn format_recommendation(&self, recommendation: &Recommendation) -> String {
        let mut output = format!(
            "{} {} (~{} min)\n  {}\n",
            self.severity_color(&recommendation.priority),
            recommendation.title.bold(),
            recommendation.estimated_time_to_fix_minutes,
            recommendation.description
        );
        let shown = if self.verbose {
            recommendation.action_items.len()
        } else {
            3
        };
        for (rank, action) in recommendation.action_items.iter().take(shown).enumerate() {
            output.push_str(&format!("  {}. {}\n", rank + 1, action));
        }
        output
    }

    fn format_execution(&self, result: &DetectionResult) -> String {
        let Some(execution) = &result.execution_result else {
            let reason = if result.safety_assessment.allow_execution {
                "skipped"
            } else {
                "blocked by safety gate"
            };
            return format!("Execution: {}\n", reason.dimmed());
        };

        let status = if execution.success {
            "passed".green().bold()
        } else if execution.timed_out {
            "timed out".red().bold()
        } else {
            "failed".red().bold()
        };
        let mut output = format!(
            "Execution: {} in {} ms (exit code {})\n",
            status,
            execution.resource_usage.execution_time_ms,
            execution
                .exit_code
                .map_or_else(|| "-".to_string(), |c| c.to_string())
        );
        if !execution.security_flags.is_empty() {
            output.push_str(&format!(
                "  Flags: {}\n",
                execution.security_flags.join(", ").bright_magenta()
            ));
        }
        if self.verbose {
            for error in &execution.errors {
                output.push_str(&format!("  {}: {}\n", error.kind.red(), error.message));
            }
        }
        output
    }
}

impl Reporter for TerminalReporter {
    fn report(&self, result: &DetectionResult) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "{}\n\n",
            format!(
                "halluscan v{} - AI code hallucination detector",
                result.detection_metadata.version
            )
            .bold()
        ));
        if let Some((name, _)) = &self.source {
            output.push_str(&format!("Analyzing: {}\n\n", name));
        }

        output.push_str(&format!(
            "{}\n\n",
            format!(
                "━━━ HALLUCINATION RATE: {:.0}% ({}) ━━━",
                result.overall_hallucination_rate * 100.0,
                self.risk_level_color(&result.summary.overall_risk)
            )
            .bold()
        ));

        if result.categories.is_empty() {
            output.push_str(&"No hallucinations found.\n".green().to_string());
        } else {
            for category in &result.categories {
                output.push_str(&self.format_category(category));
                output.push('\n');
            }
        }

        if !result.safety_assessment.risks.is_empty() {
            output.push_str("Safety risks:\n");
            for risk in &result.safety_assessment.risks {
                output.push_str(&format!("  - {}\n", risk));
            }
            output.push('\n');
        }

        output.push_str(&self.format_execution(result));

        if !result.recommendations.is_empty() {
            output.push_str(&format!("\n{}\n", "Recommendations:".bold()));
            for recommendation in &result.recommendations {
                output.push_str(&self.format_recommendation(recommendation));
            }
        }

        output.push_str(&format!("{}\n", "━".repeat(50)));
        let summary = &result.summary;
        output.push_str(&format!(
            "Summary: {} hallucination(s) ({} critical, {} high, {} medium, {} low)\n",
            summary.total_hallucinations,
            summary.critical_count.to_string().red().bold(),
            summary.high_count.to_string().yellow().bold(),
            summary.medium_count.to_string().cyan(),
            summary.low_count
        ));
        if let Some(cost) = result.business_impact.estimated_cost_usd {
            output.push_str(&format!(
                "Estimated impact: {:.1} dev hours (${:.0})\n",
                result.business_impact.estimated_dev_time_wasted_hours, cost
            ));
        }
        if self.verbose {
            output.push_str(&format!(
                "Analyzed {} bytes in {} ms\n",
                result.detection_metadata.code_length, result.detection_metadata.analysis_time_ms
            ));
        }

        let verdict = if result.has_critical_issues {
            "Result: FAIL (critical issues found)".red().bold()
        } else {
            "Result: PASS".green().bold()
        };
        output.push_str(&format!("{}\n", verdict));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::Subtype;
    use crate::test_utils::fixtures::{
        HALLUCINATED_SAMPLE, create_category, create_result, critical_loop_category,
    };

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_report_no_findings() {
        plain();
        let output = TerminalReporter::new(false).report(&create_result(vec![]));
        assert!(output.contains("No hallucinations found."));
        assert!(output.contains("SAFE"));
        assert!(output.contains("Result: PASS"));
    }

    #[test]
    fn test_report_with_snippet() {
        plain();
        let reporter = TerminalReporter::new(false).with_source("sample.py", HALLUCINATED_SAMPLE);
        let output = reporter.report(&create_result(vec![critical_loop_category()]));
        assert!(output.contains("sample.py:11: [CRITICAL] RES-001 resource/computational_boundary"));
        assert!(output.contains("while True:"));
        assert!(output.contains("fix: Add a termination condition"));
        assert!(output.contains("Result: FAIL"));
    }

    #[test]
    fn test_verbose_shows_confidence() {
        plain();
        let category = create_category(Subtype::Identity, Severity::High, 0.8, &[2]);
        let output = TerminalReporter::new(true).report(&create_result(vec![category]));
        assert!(output.contains("confidence: 0.80"));
        assert!(output.contains("<input>:2:"));
    }

    #[test]
    fn test_execution_blocked_message() {
        plain();
        let mut result = create_result(vec![]);
        result.safety_assessment.allow_execution = false;
        result.safety_assessment.risks = vec!["line 1: imports 'os'".to_string()];
        let output = TerminalReporter::new(false).report(&result);
        assert!(output.contains("blocked by safety gate"));
        assert!(output.contains("line 1: imports 'os'"));
    }
}
