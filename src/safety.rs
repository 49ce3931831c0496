//! Static pre-execution safety gate.
//!
//! The assessor looks for constructs that make running untrusted code a bad
//! idea: process, OS or network access, dynamic evaluation, file writes and
//! loops that never end. High-risk findings block sandboxed execution;
//! medium-risk findings only mark the code as not safe.

use crate::analysis::flow::loop_has_exit;
use crate::analysis::source::{code_of, is_insignificant, string_block_lines};
use crate::detector::{Detector, DetectorError};
use crate::taxonomy::{DetectionMethod, HallucinationCategory, Severity, Subtype};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

const HIGH_RISK_PENALTY: f64 = 0.25;
const MEDIUM_RISK_PENALTY: f64 = 0.1;

/// Confidence of the static unbounded-loop category.
const UNBOUNDED_LOOP_CONFIDENCE: f64 = 0.9;

const HIGH_RISK_MODULES: &[&str] = &[
    "os",
    "subprocess",
    "shutil",
    "signal",
    "ctypes",
    "multiprocessing",
    "pty",
    "socket",
    "urllib",
    "requests",
    "http",
    "ftplib",
    "smtplib",
    "telnetlib",
    "paramiko",
    "asyncio.subprocess",
    "importlib",
];

const ALLOWED_MODULES: &[&str] = &[
    "__future__",
    "math",
    "random",
    "datetime",
    "json",
    "re",
    "collections",
    "itertools",
    "functools",
    "typing",
    "string",
    "time",
    "statistics",
    "decimal",
    "fractions",
    "dataclasses",
    "enum",
    "heapq",
    "bisect",
    "copy",
    "operator",
    "abc",
    "textwrap",
    "unittest",
    "doctest",
    "pprint",
    "array",
    "numbers",
    "contextlib",
    "sys",
];

static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+)$").expect("IMPORT: invalid regex"));
static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+(\.*[\w.]*)\s+import\s+(.+)$").expect("FROM_IMPORT: invalid regex")
});
static DYNAMIC_EVAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.])(eval|exec|compile|__import__)\s*\(")
        .expect("DYNAMIC_EVAL: invalid regex")
});
static OPEN_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\w.])(?:io\.)?open\s*\(").expect("OPEN_CALL: invalid regex")
});
static MODE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bmode\s*=\s*[rbuRBU]*(['"])([^'"]*)['"]"#).expect("MODE_KEYWORD: invalid regex")
});
static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[rbuRBU]*(['"])([^'"]*)['"]$"#).expect("STRING_LITERAL: invalid regex")
});
static FILE_MUTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\.(?:write_text|write_bytes|unlink|rmdir|rmtree)\s*\(|\bos\.(?:remove|unlink|rmdir|removedirs)\s*\(|\bshutil\.(?:rmtree|move)\s*\(",
    )
    .expect("FILE_MUTATION: invalid regex")
});
static WHILE_TRUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*while\s*(?:True|1|\(\s*True\s*\))\s*:").expect("WHILE_TRUE: invalid regex")
});

/// Verdict of the safety gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAssessment {
    pub is_safe: bool,
    pub risks: Vec<String>,
    pub confidence: f64,
    pub allow_execution: bool,
}

impl Default for SafetyAssessment {
    fn default() -> Self {
        Self {
            is_safe: true,
            risks: Vec::new(),
            confidence: 1.0,
            allow_execution: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RiskClass {
    Medium,
    High,
}

#[derive(Debug)]
struct Risk {
    class: RiskClass,
    line: usize,
    description: String,
}

impl Risk {
    fn high(line: usize, description: String) -> Self {
        Self {
            class: RiskClass::High,
            line,
            description,
        }
    }

    fn medium(line: usize, description: String) -> Self {
        Self {
            class: RiskClass::Medium,
            line,
            description,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyAssessor;

impl SafetyAssessor {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_safety(&self, code: &str) -> SafetyAssessment {
        let risks = scan(code);
        let high = risks.iter().filter(|r| r.class == RiskClass::High).count();
        let medium = risks.len() - high;
        let confidence = (1.0
            - HIGH_RISK_PENALTY * high as f64
            - MEDIUM_RISK_PENALTY * medium as f64)
            .clamp(0.0, 1.0);

        debug!(high, medium, confidence, "Safety assessment finished");
        SafetyAssessment {
            is_safe: risks.is_empty(),
            allow_execution: high == 0,
            confidence,
            risks: risks
                .into_iter()
                .map(|r| format!("line {}: {}", r.line, r.description))
                .collect(),
        }
    }

    /// One critical category per `while True` loop with no visible exit.
    pub fn unbounded_loops(&self, code: &str) -> Vec<HallucinationCategory> {
        let lines: Vec<&str> = code.lines().collect();
        let in_string = string_block_lines(&lines);
        (0..lines.len())
            .filter(|&i| !in_string[i] && WHILE_TRUE.is_match(&code_of(lines[i])))
            .filter(|&i| !loop_has_exit(&lines, i))
            .map(|i| {
                HallucinationCategory::new(
                    Subtype::ComputationalBoundary,
                    Severity::Critical,
                    UNBOUNDED_LOOP_CONFIDENCE,
                    DetectionMethod::Static,
                )
                .with_lines([i + 1])
                .with_evidence(["'while True' loop has no break, return or raise".to_string()])
                .with_suggested_fix(
                    "Add a termination condition or a break/return that the loop is guaranteed to reach",
                )
            })
            .collect()
    }
}

impl Detector for SafetyAssessor {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Static
    }

    fn detect(&self, code: &str) -> Result<Vec<HallucinationCategory>, DetectorError> {
        Ok(self.unbounded_loops(code))
    }
}

fn scan(code: &str) -> Vec<Risk> {
    let lines: Vec<&str> = code.lines().collect();
    let in_string = string_block_lines(&lines);
    let mut risks = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        if in_string[index] || is_insignificant(line) {
            continue;
        }
        let number = index + 1;
        let masked = code_of(line);

        for imported in imported_modules(&masked) {
            if let Some(risk) = classify_import(number, &imported) {
                risks.push(risk);
            }
        }

        for caps in DYNAMIC_EVAL.captures_iter(&masked) {
            risks.push(Risk::high(
                number,
                format!("calls {}() (dynamic code evaluation)", &caps[1]),
            ));
        }

        for found in OPEN_CALL.find_iter(&masked) {
            risks.push(classify_open(number, line, &masked, found.end()));
        }

        if let Some(found) = FILE_MUTATION.find(&masked) {
            risks.push(Risk::high(
                number,
                format!(
                    "deletes or overwrites files via '{}'",
                    found.as_str().trim_end_matches(['(', ' '])
                ),
            ));
        }

        if WHILE_TRUE.is_match(&masked) && !loop_has_exit(&lines, index) {
            risks.push(Risk::high(
                number,
                "'while True' loop has no visible exit".to_string(),
            ));
        }
    }
    risks
}

/// Module named by an import statement. `from a import b` also yields
/// `a.b` as an implied entry so that submodule imports are recognized.
struct Imported {
    module: String,
    implied: bool,
}

fn imported_modules(code: &str) -> Vec<Imported> {
    if let Some(caps) = FROM_IMPORT.captures(code) {
        let module = &caps[1];
        if module.starts_with('.') || module.is_empty() {
            return Vec::new();
        }
        let mut modules = vec![Imported {
            module: module.to_string(),
            implied: false,
        }];
        for name in caps[2].split(',') {
            if let Some(name) = name
                .trim_matches(|c: char| c == '(' || c == ')' || c.is_whitespace())
                .split_whitespace()
                .next()
                && name != "*"
            {
                modules.push(Imported {
                    module: format!("{module}.{name}"),
                    implied: true,
                });
            }
        }
        return modules;
    }
    if let Some(caps) = IMPORT.captures(code) {
        return caps[1]
            .split(',')
            .filter_map(|part| part.split_whitespace().next())
            .map(|module| Imported {
                module: module.to_string(),
                implied: false,
            })
            .collect();
    }
    Vec::new()
}

fn classify_import(line: usize, imported: &Imported) -> Option<Risk> {
    let module = imported.module.as_str();
    let root = module.split('.').next().unwrap_or(module);
    let high = if imported.implied {
        HIGH_RISK_MODULES.contains(&module)
    } else {
        HIGH_RISK_MODULES.contains(&module) || HIGH_RISK_MODULES.contains(&root)
    };
    if high {
        return Some(Risk::high(
            line,
            format!("imports '{module}' (process, OS or network access)"),
        ));
    }
    if imported.implied || ALLOWED_MODULES.contains(&root) {
        return None;
    }
    Some(Risk::medium(
        line,
        format!("imports '{module}' (not on the allow-list)"),
    ))
}

/// Risk of one `open(` call, judged by its mode argument. `args_start` is
/// the byte offset just past the opening parenthesis.
fn classify_open(line: usize, raw: &str, masked: &str, args_start: usize) -> Risk {
    let args_end = closing_paren(masked, args_start).unwrap_or(masked.len());
    let raw_args = &raw[args_start..args_end];

    let mode = match MODE_KEYWORD.captures(raw_args) {
        Some(caps) => Some(caps[2].to_string()),
        None => positional_mode(raw_args, &masked[args_start..args_end]),
    };

    match mode {
        None if second_argument(&masked[args_start..args_end]).is_none() => {
            Risk::medium(line, "opens a file for reading".to_string())
        }
        None => Risk::high(line, "opens a file with a non-literal mode".to_string()),
        Some(mode) if mode.contains(['w', 'a', 'x', '+']) => {
            Risk::high(line, format!("opens a file for writing (mode '{mode}')"))
        }
        Some(_) => Risk::medium(line, "opens a file for reading".to_string()),
    }
}

fn positional_mode(raw_args: &str, masked_args: &str) -> Option<String> {
    let (start, end) = second_argument(masked_args)?;
    let text = raw_args[start..end].trim();
    if text.contains('=') {
        return None;
    }
    STRING_LITERAL
        .captures(text)
        .map(|caps| caps[2].to_string())
}

/// Byte range of the second top-level argument in `args`.
fn second_argument(args: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in args.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => match start {
                None => start = Some(i + 1),
                Some(s) => return Some((s, i)),
            },
            _ => {}
        }
    }
    let start = start?;
    (!args[start..].trim().is_empty()).then_some((start, args.len()))
}

fn closing_paren(masked: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in masked[from..].char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => return Some(from + i),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}
