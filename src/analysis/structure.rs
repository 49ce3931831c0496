//! Lightweight structural scan used as context for the detectors.

use super::source::{code_of, indent_of, is_insignificant};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::trace;

static FUNCTION_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("invalid function regex")
});
static CLASS_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_]\w*)").expect("invalid class regex"));
static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:from\s+([A-Za-z_][\w.]*)\s+import\b|import\s+([A-Za-z_][\w.]*(?:\s*,\s*[A-Za-z_][\w.]*)*))")
        .expect("invalid import regex")
});
static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]\w*(?:\s*,\s*[A-Za-z_]\w*)*)\s*(?::[^=]+)?(?:[+\-*/%&|^]|//|\*\*)?=[^=]")
        .expect("invalid assignment regex")
});
static LOOP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?(?:for|while)\b").expect("invalid loop regex"));
static CONDITIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:if|elif)\b").expect("invalid conditional regex"));
static TRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*try\s*:").expect("invalid try regex"));
static EXCEPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*except\b").expect("invalid except regex"));
static BOOL_OP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:and|or)\b").expect("invalid boolean regex"));
static INLINE_IF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S\s+if\s+.+\s+else\s+\S").expect("invalid ternary regex"));
static COMPREHENSION_IF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfor\s+\S+\s+in\s+[^\]]+\bif\b").expect("invalid comprehension regex")
});

/// Read-only structural snapshot of one code sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeStructure {
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub variables: Vec<String>,
    pub imports: Vec<String>,
    pub loops: usize,
    pub conditionals: usize,
    pub try_blocks: usize,
    pub cyclomatic_complexity: usize,
    pub lines_of_code: usize,
    pub nesting_depth: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructureAnalyzer;

impl StructureAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, code: &str) -> CodeStructure {
        let mut structure = CodeStructure::default();
        let mut variables = BTreeSet::new();
        let mut decision_points = 0usize;
        let mut indent_stack: Vec<usize> = Vec::new();

        for line in code.lines() {
            if is_insignificant(line) {
                continue;
            }
            structure.lines_of_code += 1;

            let indent = indent_of(line);
            while indent_stack.last().is_some_and(|top| *top >= indent) {
                indent_stack.pop();
            }
            indent_stack.push(indent);
            // The top level counts as depth 0.
            structure.nesting_depth = structure.nesting_depth.max(indent_stack.len() - 1);

            let code_part = code_of(line);

            if let Some(caps) = FUNCTION_DEF.captures(&code_part) {
                structure.functions.push(caps[1].to_string());
            } else if let Some(caps) = CLASS_DEF.captures(&code_part) {
                structure.classes.push(caps[1].to_string());
            } else if let Some(caps) = IMPORT.captures(&code_part) {
                if let Some(module) = caps.get(1) {
                    structure.imports.push(module.as_str().to_string());
                } else if let Some(modules) = caps.get(2) {
                    structure.imports.extend(
                        modules
                            .as_str()
                            .split(',')
                            .map(|m| m.trim().to_string())
                            .filter(|m| !m.is_empty()),
                    );
                }
            } else if let Some(caps) = ASSIGNMENT.captures(&code_part) {
                variables.extend(caps[1].split(',').map(|v| v.trim().to_string()));
            }

            if LOOP.is_match(&code_part) {
                structure.loops += 1;
                decision_points += 1;
            }
            if CONDITIONAL.is_match(&code_part) {
                structure.conditionals += 1;
                decision_points += 1;
            }
            if TRY.is_match(&code_part) {
                structure.try_blocks += 1;
            }
            if EXCEPT.is_match(&code_part) {
                decision_points += 1;
            }
            decision_points += BOOL_OP.find_iter(&code_part).count();
            if INLINE_IF.is_match(&code_part) || COMPREHENSION_IF.is_match(&code_part) {
                decision_points += 1;
            }
        }

        structure.variables = variables.into_iter().collect();
        structure.cyclomatic_complexity = 1 + decision_points;

        trace!(
            functions = structure.functions.len(),
            classes = structure.classes.len(),
            complexity = structure.cyclomatic_complexity,
            depth = structure.nesting_depth,
            "Analyzed code structure"
        );
        structure
    }
}
