//! Remediation guidance, one recommendation per hallucination type found.

use crate::taxonomy::{HallucinationCategory, HallucinationType, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub category: HallucinationType,
    pub priority: Severity,
    pub title: String,
    pub description: String,
    /// Ranked: category-specific fixes first, then the generic actions.
    pub action_items: Vec<String>,
    pub estimated_time_to_fix_minutes: u64,
}

struct Template {
    title: &'static str,
    description: &'static str,
    actions: &'static [&'static str],
    base_minutes: u64,
}

fn template(kind: HallucinationType) -> Template {
    match kind {
        HallucinationType::Mapping => Template {
            title: "Fix data type and structure mismatches",
            description: "values are combined with incompatible types or read through keys, indexes and attributes that may not exist",
            actions: &[
                "Convert values explicitly before combining them",
                "Guard dictionary and list access with membership or bounds checks",
                "Check for None before using optional values",
            ],
            base_minutes: 15,
        },
        HallucinationType::Naming => Template {
            title: "Resolve undefined names and fabricated imports",
            description: "the code refers to names or modules that are never defined or do not exist",
            actions: &[
                "Define every variable and function before it is used",
                "Verify each imported package exists and is a declared dependency",
            ],
            base_minutes: 10,
        },
        HallucinationType::Resource => Template {
            title: "Bound time and memory consumption",
            description: "loops, recursion or allocations can exhaust CPU time or memory",
            actions: &[
                "Give every loop a reachable termination condition",
                "Add a base case to recursive functions",
                "Stream or chunk large data instead of allocating it up front",
            ],
            base_minutes: 30,
        },
        HallucinationType::Logic => Template {
            title: "Repair control flow and incomplete logic",
            description: "conditions never hold, statements never run, or functions are left unimplemented",
            actions: &[
                "Remove dead branches and statements after return or raise",
                "Implement placeholder functions or raise NotImplementedError explicitly",
                "Add tests that cover the intended behaviour",
            ],
            base_minutes: 20,
        },
    }
}

fn priority_factor(priority: Severity) -> f64 {
    match priority {
        Severity::Low => 0.5,
        Severity::Medium => 1.0,
        Severity::High => 1.5,
        Severity::Critical => 2.0,
    }
}

/// One recommendation per type present in `categories`, most urgent first.
pub fn generate_recommendations(categories: &[HallucinationCategory]) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = HallucinationType::ALL
        .into_iter()
        .filter_map(|kind| {
            let members: Vec<&HallucinationCategory> =
                categories.iter().filter(|c| c.kind == kind).collect();
            let priority = members.iter().map(|c| c.severity).max()?;
            Some(build(kind, priority, &members))
        })
        .collect();

    // stable sort keeps taxonomy order within a priority
    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

fn build(
    kind: HallucinationType,
    priority: Severity,
    members: &[&HallucinationCategory],
) -> Recommendation {
    let template = template(kind);

    let mut action_items: Vec<String> = Vec::new();
    for fix in members.iter().filter_map(|c| c.suggested_fix.as_deref()) {
        if !action_items.iter().any(|a| a == fix) {
            action_items.push(fix.to_string());
        }
    }
    for action in template.actions {
        if !action_items.iter().any(|a| a == action) {
            action_items.push((*action).to_string());
        }
    }

    let count = members.len();
    let minutes = (template.base_minutes * count as u64) as f64 * priority_factor(priority);

    Recommendation {
        category: kind,
        priority,
        title: template.title.to_string(),
        description: format!(
            "{count} {kind} issue{}: {}.",
            if count == 1 { "" } else { "s" },
            template.description
        ),
        action_items,
        estimated_time_to_fix_minutes: minutes.ceil() as u64,
    }
}
