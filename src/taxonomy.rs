//! Hallucination taxonomy shared by every detector.
//!
//! A [`HallucinationCategory`] is one finding. It is typed by a closed
//! type/subtype taxonomy, carries severity, confidence and evidence, and has a
//! default [`BusinessImpact`] attached when it is created.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Hourly developer rate used to turn wasted hours into a dollar estimate.
pub const DEV_HOURLY_RATE_USD: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Top-level hallucination type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum HallucinationType {
    Mapping,
    Naming,
    Resource,
    Logic,
}

impl HallucinationType {
    pub const ALL: [HallucinationType; 4] = [
        HallucinationType::Mapping,
        HallucinationType::Naming,
        HallucinationType::Resource,
        HallucinationType::Logic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HallucinationType::Mapping => "mapping",
            HallucinationType::Naming => "naming",
            HallucinationType::Resource => "resource",
            HallucinationType::Logic => "logic",
        }
    }

    pub fn subtypes(&self) -> [Subtype; 2] {
        match self {
            HallucinationType::Mapping => [Subtype::DataCompliance, Subtype::StructureAccess],
            HallucinationType::Naming => [Subtype::Identity, Subtype::ExternalSource],
            HallucinationType::Resource => {
                [Subtype::PhysicalConstraint, Subtype::ComputationalBoundary]
            }
            HallucinationType::Logic => [Subtype::LogicDeviation, Subtype::LogicBreakdown],
        }
    }

    /// Default business impact for a finding of this type.
    pub fn default_impact(&self) -> BusinessImpact {
        let (hours, multiplier, quality) = match self {
            HallucinationType::Mapping => (1.5, 1.3, 60.0),
            HallucinationType::Naming => (2.0, 1.5, 70.0),
            HallucinationType::Resource => (4.0, 2.0, 85.0),
            HallucinationType::Logic => (3.0, 1.8, 75.0),
        };
        BusinessImpact {
            estimated_dev_time_wasted_hours: hours,
            cost_multiplier: multiplier,
            quality_impact: quality,
            estimated_cost_usd: Some(hours * DEV_HOURLY_RATE_USD),
        }
    }
}

impl std::fmt::Display for HallucinationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HallucinationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mapping" => Ok(HallucinationType::Mapping),
            "naming" => Ok(HallucinationType::Naming),
            "resource" => Ok(HallucinationType::Resource),
            "logic" => Ok(HallucinationType::Logic),
            other => Err(format!("unknown hallucination type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subtype {
    DataCompliance,
    StructureAccess,
    Identity,
    ExternalSource,
    PhysicalConstraint,
    ComputationalBoundary,
    LogicDeviation,
    LogicBreakdown,
}

impl Subtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subtype::DataCompliance => "data_compliance",
            Subtype::StructureAccess => "structure_access",
            Subtype::Identity => "identity",
            Subtype::ExternalSource => "external_source",
            Subtype::PhysicalConstraint => "physical_constraint",
            Subtype::ComputationalBoundary => "computational_boundary",
            Subtype::LogicDeviation => "logic_deviation",
            Subtype::LogicBreakdown => "logic_breakdown",
        }
    }

    /// The type this subtype belongs to. Every subtype has exactly one parent.
    pub fn parent(&self) -> HallucinationType {
        match self {
            Subtype::DataCompliance | Subtype::StructureAccess => HallucinationType::Mapping,
            Subtype::Identity | Subtype::ExternalSource => HallucinationType::Naming,
            Subtype::PhysicalConstraint | Subtype::ComputationalBoundary => {
                HallucinationType::Resource
            }
            Subtype::LogicDeviation | Subtype::LogicBreakdown => HallucinationType::Logic,
        }
    }
}

impl std::fmt::Display for Subtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Technique that produced a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Pattern,
    Static,
    Execution,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Pattern => "pattern",
            DetectionMethod::Static => "static",
            DetectionMethod::Execution => "execution",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estimated cost of a finding to the team that trusted the code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessImpact {
    pub estimated_dev_time_wasted_hours: f64,
    pub cost_multiplier: f64,
    /// 0..=100
    pub quality_impact: f64,
    #[serde(rename = "estimatedCostUSD", skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
}

impl BusinessImpact {
    /// Aggregate per-category impacts: hours and cost add up, multiplier and
    /// quality take the worst value.
    pub fn aggregate<'a>(impacts: impl IntoIterator<Item = &'a BusinessImpact>) -> Self {
        impacts
            .into_iter()
            .fold(BusinessImpact::default(), |acc, impact| BusinessImpact {
                estimated_dev_time_wasted_hours: acc.estimated_dev_time_wasted_hours
                    + impact.estimated_dev_time_wasted_hours,
                cost_multiplier: acc.cost_multiplier.max(impact.cost_multiplier),
                quality_impact: acc.quality_impact.max(impact.quality_impact).min(100.0),
                estimated_cost_usd: match (acc.estimated_cost_usd, impact.estimated_cost_usd) {
                    (None, None) => None,
                    (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
                },
            })
    }
}

/// One hallucination finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HallucinationCategory {
    #[serde(rename = "type")]
    pub kind: HallucinationType,
    pub subtype: Subtype,
    pub severity: Severity,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub detection_method: DetectionMethod,
    pub line_numbers: BTreeSet<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    pub business_impact: BusinessImpact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl HallucinationCategory {
    /// Create a category. The type is derived from the subtype and the
    /// business impact comes from the type's default table.
    pub fn new(
        subtype: Subtype,
        severity: Severity,
        confidence: f64,
        method: DetectionMethod,
    ) -> Self {
        let kind = subtype.parent();
        Self {
            kind,
            subtype,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: Vec::new(),
            detection_method: method,
            line_numbers: BTreeSet::new(),
            error_message: None,
            suggested_fix: None,
            business_impact: kind.default_impact(),
            rule_id: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl IntoIterator<Item = String>) -> Self {
        self.evidence.extend(evidence);
        self
    }

    pub fn with_lines(mut self, lines: impl IntoIterator<Item = usize>) -> Self {
        self.line_numbers.extend(lines);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_suggested_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    pub fn with_rule_id(mut self, id: impl Into<String>) -> Self {
        self.rule_id = Some(id.into());
        self
    }

    pub fn first_line(&self) -> Option<usize> {
        self.line_numbers.iter().next().copied()
    }
}
