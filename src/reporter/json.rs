use crate::detector::DetectionResult;
use crate::reporter::Reporter;

pub struct JsonReporter;

impl JsonReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for JsonReporter {
    fn report(&self, result: &DetectionResult) -> String {
        serde_json::to_string_pretty(result)
            .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize result: {}"}}"#, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{critical_loop_category, create_result};

    #[test]
    fn test_json_output_structure() {
        let reporter = JsonReporter::new();
        let output = reporter.report(&create_result(vec![]));

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["overallHallucinationRate"], 0.0);
        assert_eq!(parsed["hasCriticalIssues"], false);
        assert_eq!(parsed["summary"]["overallRisk"], "safe");
        assert_eq!(parsed["detectionMetadata"]["language"], "python");
        assert!(parsed.get("executionResult").is_none());
    }

    #[test]
    fn test_json_output_with_categories() {
        let reporter = JsonReporter::new();
        let output = reporter.report(&create_result(vec![critical_loop_category()]));

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        let category = &parsed["categories"][0];
        assert_eq!(category["type"], "resource");
        assert_eq!(category["subtype"], "computational_boundary");
        assert_eq!(category["severity"], "critical");
        assert_eq!(category["detectionMethod"], "pattern");
        assert_eq!(category["lineNumbers"][0], 11);
        assert_eq!(category["ruleId"], "RES-001");
        assert_eq!(parsed["hasCriticalIssues"], true);
        assert_eq!(parsed["summary"]["mostCommonCategory"], "resource");
    }
}
