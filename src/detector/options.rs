use crate::taxonomy::HallucinationType;
use serde::{Deserialize, Serialize};

/// Knobs for one analysis. Every field has a default, so a partial config
/// file or JSON object is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionOptions {
    /// Categories below this confidence are dropped from the result.
    pub confidence_threshold: f64,
    /// Only report these types. `None` or an empty list means all types.
    pub focus_categories: Option<Vec<HallucinationType>>,
    pub generate_recommendations: bool,
    pub enable_execution_analysis: bool,
    pub enable_static_analysis: bool,
    pub enable_pattern_matching: bool,
    pub max_execution_time_ms: u64,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            focus_categories: None,
            generate_recommendations: true,
            enable_execution_analysis: true,
            enable_static_analysis: true,
            enable_pattern_matching: true,
            max_execution_time_ms: 5000,
        }
    }
}

impl DetectionOptions {
    /// Whether findings of `kind` pass the focus filter.
    pub fn includes(&self, kind: HallucinationType) -> bool {
        match &self.focus_categories {
            Some(focus) if !focus.is_empty() => focus.contains(&kind),
            _ => true,
        }
    }

    pub fn invalid_reason(&self) -> Option<String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Some(format!(
                "confidenceThreshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if self.max_execution_time_ms == 0 {
            return Some("maxExecutionTimeMs must be greater than 0".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DetectionOptions::default();
        assert_eq!(options.confidence_threshold, 0.5);
        assert!(options.generate_recommendations);
        assert!(options.enable_execution_analysis);
        assert_eq!(options.max_execution_time_ms, 5000);
        assert!(options.invalid_reason().is_none());
    }

    #[test]
    fn test_focus_filter() {
        let mut options = DetectionOptions::default();
        assert!(options.includes(HallucinationType::Logic));

        options.focus_categories = Some(vec![]);
        assert!(options.includes(HallucinationType::Logic));

        options.focus_categories = Some(vec![HallucinationType::Naming]);
        assert!(options.includes(HallucinationType::Naming));
        assert!(!options.includes(HallucinationType::Logic));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let options = DetectionOptions {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(options.invalid_reason().unwrap().contains("confidenceThreshold"));
    }

    #[test]
    fn test_partial_json() {
        let options: DetectionOptions =
            serde_json::from_str(r#"{"confidenceThreshold": 0.9, "focusCategories": ["resource"]}"#)
                .unwrap();
        assert_eq!(options.confidence_threshold, 0.9);
        assert_eq!(options.focus_categories, Some(vec![HallucinationType::Resource]));
        assert!(options.enable_pattern_matching);
    }
}
