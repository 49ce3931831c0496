use crate::taxonomy::{HallucinationCategory, HallucinationType, Severity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Severity weights for the hallucination rate
const CRITICAL_WEIGHT: f64 = 1.0;
const HIGH_WEIGHT: f64 = 0.7;
const MEDIUM_WEIGHT: f64 = 0.4;
const LOW_WEIGHT: f64 = 0.15;

/// Rate thresholds used when no critical or high finding decides the risk
const HIGH_RATE: f64 = 0.6;
const MEDIUM_RATE: f64 = 0.3;

pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => CRITICAL_WEIGHT,
        Severity::High => HIGH_WEIGHT,
        Severity::Medium => MEDIUM_WEIGHT,
        Severity::Low => LOW_WEIGHT,
    }
}

/// Probability-style union of the weighted confidences:
/// `1 - Π(1 - weight(severity) * confidence)`.
///
/// Adding a finding never lowers the rate, and the rate stays within [0, 1].
pub fn hallucination_rate(categories: &[HallucinationCategory]) -> f64 {
    let clean = categories.iter().fold(1.0, |acc, c| {
        acc * (1.0 - severity_weight(c.severity) * c.confidence.clamp(0.0, 1.0))
    });
    (1.0 - clean).clamp(0.0, 1.0)
}

/// Risk level of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= HIGH_RATE {
            RiskLevel::High
        } else if rate >= MEDIUM_RATE {
            RiskLevel::Medium
        } else if rate > 0.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counts and headline verdict of a detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_hallucinations: usize,
    pub critical_count: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub most_common_category: Option<HallucinationType>,
    pub overall_risk: RiskLevel,
}

impl Summary {
    pub fn from_categories(categories: &[HallucinationCategory], rate: f64) -> Self {
        let count = |severity: Severity| categories.iter().filter(|c| c.severity == severity).count();
        let critical_count = count(Severity::Critical);
        let high_count = count(Severity::High);

        let overall_risk = if critical_count > 0 {
            RiskLevel::Critical
        } else if high_count > 0 {
            RiskLevel::High
        } else {
            RiskLevel::from_rate(rate)
        };

        Summary {
            total_hallucinations: categories.len(),
            critical_count,
            high_count,
            medium_count: count(Severity::Medium),
            low_count: count(Severity::Low),
            most_common_category: most_common_type(categories),
            overall_risk,
        }
    }
}

/// Most frequent type. Ties go to the type with the worse worst severity,
/// then to taxonomy order.
fn most_common_type(categories: &[HallucinationCategory]) -> Option<HallucinationType> {
    let mut stats: HashMap<HallucinationType, (usize, Severity)> = HashMap::new();
    for category in categories {
        let entry = stats
            .entry(category.kind)
            .or_insert((0, category.severity));
        entry.0 += 1;
        entry.1 = entry.1.max(category.severity);
    }

    HallucinationType::ALL
        .into_iter()
        .filter_map(|kind| stats.get(&kind).map(|&(count, worst)| (kind, count, worst)))
        .max_by(|a, b| {
            a.1.cmp(&b.1)
                .then(a.2.cmp(&b.2))
                // earlier in taxonomy order wins
                .then(b.0.cmp(&a.0))
        })
        .map(|(kind, _, _)| kind)
}
