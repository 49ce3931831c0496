use crate::analysis::flow::{compound_body, loop_has_exit};
use crate::analysis::source::{code_of, is_insignificant};
use crate::rules::types::{PatternRule, RuleContext, RuleError};
use crate::taxonomy::{Severity, Subtype};
use regex::Regex;
use std::sync::LazyLock;

/// Iteration counts and element counts at or above this are flagged.
const OVERSIZE_THRESHOLD: f64 = 1e8;

static NUMBERISH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d[\w.]*$").expect("invalid numberish regex"));
static BASE_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:if|elif|else|try|except|for|while|match|raise|yield)\b|\bif\b.*\belse\b|\b(?:and|or)\b")
        .expect("invalid base case regex")
});
static RETURN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*return\b").expect("invalid return regex"));

pub fn rules() -> Vec<PatternRule> {
    vec![res_001(), res_002(), res_003(), res_004()]
}

/// Value of a literal arithmetic expression: products and powers of
/// integer, float, scientific and hex literals. `Ok(None)` when the
/// expression is not literal. Overflow saturates to infinity.
fn magnitude(expr: &str) -> Result<Option<f64>, String> {
    let expr = expr.replace("**", "^");
    let mut product = 1.0f64;
    for factor in expr.split('*') {
        let mut parts = factor.split('^');
        let Some(base) = parts.next().map(literal).transpose()?.flatten() else {
            return Ok(None);
        };
        let mut value = base;
        for exponent in parts {
            let Some(exponent) = literal(exponent)? else {
                return Ok(None);
            };
            value = if exponent.fract() == 0.0 && exponent.abs() <= f64::from(i32::MAX) {
                value.powi(exponent as i32)
            } else {
                value.powf(exponent)
            };
        }
        product *= value;
    }
    Ok(Some(product))
}

fn literal(token: &str) -> Result<Option<f64>, String> {
    let token = token.trim().trim_start_matches('(').trim_end_matches(')').trim();
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, token),
    };
    if !NUMBERISH.is_match(digits) {
        return Ok(None);
    }
    let clean = digits.replace('_', "");
    let value = match clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).map(|v| v as f64).map_err(|e| e.to_string()),
        None => clean.parse::<f64>().map_err(|e| e.to_string()),
    }
    .map_err(|e| format!("malformed numeric literal '{token}': {e}"))?;
    Ok(Some(if negative { -value } else { value }))
}

fn describe(count: f64) -> String {
    if count < 1e15 {
        format!("{}", count as u128)
    } else {
        format!("{:.1e}", count.min(f64::MAX))
    }
}

fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = args[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn res_001() -> PatternRule {
    PatternRule {
        id: "RES-001",
        name: "Unbounded loop",
        description: "Detects 'while True' loops and loops over endless iterators with no break, return or raise",
        subtype: Subtype::ComputationalBoundary,
        severity: Severity::Critical,
        confidence: 0.9,
        patterns: vec![
            Regex::new(r"^\s*while\s*(?:True|1|\(\s*True\s*\))\s*:").expect("RES-001: invalid regex"),
            Regex::new(r"^\s*for\s+.+?\s+in\s+(?:itertools\.)?(?:count|cycle)\s*\(")
                .expect("RES-001: invalid regex"),
        ],
        exclusions: vec![],
        evidence: loop_without_exit,
        suggested_fix: "Add a termination condition or a break/return that the loop is guaranteed to reach",
    }
}

fn loop_without_exit(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    if loop_has_exit(ctx.lines, ctx.index) {
        return Ok(vec![]);
    }
    let kind = if ctx.code.trim_start().starts_with("while") {
        "'while True' loop"
    } else {
        "loop over an endless iterator"
    };
    Ok(vec![format!("{kind} has no break, return or raise")])
}

fn res_002() -> PatternRule {
    PatternRule {
        id: "RES-002",
        name: "Recursion without base case",
        description: "Detects functions that call themselves with no branch, loop or plain return that could stop the recursion",
        subtype: Subtype::ComputationalBoundary,
        severity: Severity::High,
        confidence: 0.75,
        patterns: vec![
            Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("RES-002: invalid regex"),
        ],
        exclusions: vec![],
        evidence: recursion_without_base_case,
        suggested_fix: "Add a base case that returns without recursing",
    }
}

/// Whether `code` calls `name` directly or as `self.name`.
fn calls(code: &str, name: &str) -> bool {
    code.match_indices(name).any(|(pos, _)| {
        let before = &code[..pos];
        let direct = before
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_' || c == '.'));
        let method = before.ends_with("self.") || before.ends_with("cls.");
        (direct || method) && code[pos + name.len()..].trim_start().starts_with('(')
    })
}

fn recursion_without_base_case(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(name) = ctx.capture(1) else {
        return Ok(vec![]);
    };
    let (start, body) = compound_body(ctx.lines, ctx.index);

    let mut first_call = None;
    let mut has_base = false;
    for (offset, line) in body.iter().enumerate() {
        if is_insignificant(line) {
            continue;
        }
        let code = code_of(line);
        let recursive = calls(&code, name);
        if recursive && first_call.is_none() {
            first_call = Some(start + offset);
        }
        if BASE_CASE.is_match(&code) || (RETURN.is_match(&code) && !recursive) {
            has_base = true;
        }
    }

    Ok(match first_call {
        Some(line) if !has_base => vec![format!(
            "'{name}' calls itself on line {} with no base case",
            line + 1
        )],
        _ => vec![],
    })
}

fn res_003() -> PatternRule {
    PatternRule {
        id: "RES-003",
        name: "Oversized iteration range",
        description: "Detects range() calls whose literal bounds span a hundred million or more iterations",
        subtype: Subtype::PhysicalConstraint,
        severity: Severity::High,
        confidence: 0.8,
        patterns: vec![
            Regex::new(r"\brange\s*\(([^()]*(?:\([^()]*\)[^()]*)*)\)").expect("RES-003: invalid regex"),
        ],
        exclusions: vec![],
        evidence: oversized_range,
        suggested_fix: "Reduce the range, process the data in chunks, or use a closed-form computation",
    }
}

fn oversized_range(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(args) = ctx.capture(1) else {
        return Ok(vec![]);
    };
    let args = split_args(args);
    let (start, stop, step) = match args.as_slice() {
        [stop] => ("0", *stop, "1"),
        [start, stop] => (*start, *stop, "1"),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Ok(vec![]),
    };
    let eval = |expr: &str| magnitude(expr).map_err(|e| ctx.error(e));
    let (Some(stop), Some(step)) = (eval(stop)?, eval(step)?) else {
        return Ok(vec![]);
    };
    let start = eval(start)?.unwrap_or(0.0);
    if step == 0.0 {
        return Ok(vec![]);
    }

    let count = ((stop - start) / step).max(0.0);
    if count < OVERSIZE_THRESHOLD {
        return Ok(vec![]);
    }
    Ok(vec![format!("range() iterates about {} times", describe(count))])
}

fn res_004() -> PatternRule {
    PatternRule {
        id: "RES-004",
        name: "Oversized allocation",
        description: "Detects list, string and buffer allocations of a hundred million elements or more",
        subtype: Subtype::PhysicalConstraint,
        severity: Severity::High,
        confidence: 0.8,
        patterns: vec![
            Regex::new(r"(?:^|[^\w\])])\[[^\[\]]*\]\s*\*\s*([^,)\]}]+)").expect("RES-004: invalid regex"),
            Regex::new(r#"["']\s*\*\s*([^,)\]}]+)"#).expect("RES-004: invalid regex"),
            Regex::new(r"\b(?:bytearray|bytes|zeros|ones|empty)\s*\(\s*([^,()]+)[,)]")
                .expect("RES-004: invalid regex"),
        ],
        exclusions: vec![],
        evidence: oversized_allocation,
        suggested_fix: "Allocate lazily with a generator, stream the data, or reduce the size",
    }
}

fn oversized_allocation(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(size) = ctx.capture(1) else {
        return Ok(vec![]);
    };
    match magnitude(size).map_err(|e| ctx.error(e))? {
        Some(count) if count >= OVERSIZE_THRESHOLD => Ok(vec![format!(
            "allocates about {} elements",
            describe(count)
        )]),
        _ => Ok(vec![]),
    }
}
