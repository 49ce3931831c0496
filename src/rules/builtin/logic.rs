use crate::analysis::flow::statement_end;
use crate::analysis::source::{
    code_of, indent_of, is_blank, is_comment, is_insignificant, strip_comment,
};
use crate::rules::types::{PatternRule, RuleContext, RuleError};
use crate::taxonomy::{Severity, Subtype};
use regex::Regex;

/// Lines that legitimately repeat.
const TRIVIAL_LINES: &[&str] = &[
    "pass", "...", "break", "continue", "return", "print()", "else:", "try:", "finally:", ")",
    "]", "}", "),", "],", "},", "):",
];

/// Clauses that continue a compound statement rather than following it.
const CONTINUATION_CLAUSES: &[&str] = &["elif", "else", "except", "finally", "case"];

pub fn rules() -> Vec<PatternRule> {
    vec![log_001(), log_002(), log_003(), log_004()]
}

fn log_001() -> PatternRule {
    PatternRule {
        id: "LOG-001",
        name: "Condition that is always false",
        description: "Detects if/elif/while conditions that can never be true",
        subtype: Subtype::LogicDeviation,
        severity: Severity::Medium,
        confidence: 0.8,
        patterns: vec![
            Regex::new(r#"^\s*(?:if|elif|while)\s+(?P<lit>False|0|None|""|''|\(\s*\)|\[\s*\]|\{\s*\})\s*:"#)
                .expect("LOG-001: invalid regex"),
            Regex::new(r"^\s*(?:if|elif|while)\s+not\s+(?P<lit>True|1)\s*:")
                .expect("LOG-001: invalid regex"),
            Regex::new(r"^\s*(?:if|elif|while)\s+(?P<a>-?\d+(?:\.\d+)?)\s*(?P<op>==|!=|<=|>=|<|>)\s*(?P<b>-?\d+(?:\.\d+)?)\s*:")
                .expect("LOG-001: invalid regex"),
            Regex::new(r"^\s*(?:if|elif|while)\s+(?P<x>[A-Za-z_]\w*)\s+and\s+not\s+(?P<y>[A-Za-z_]\w*)\s*:")
                .expect("LOG-001: invalid regex"),
        ],
        exclusions: vec![],
        evidence: always_false,
        suggested_fix: "Fix the condition or remove the dead branch",
    }
}

fn always_false(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(whole) = ctx.captures.get(0) else {
        return Ok(vec![]);
    };
    let caps = ctx.captures;
    let never_true = if caps.name("lit").is_some() {
        true
    } else if let (Some(a), Some(op), Some(b)) = (caps.name("a"), caps.name("op"), caps.name("b")) {
        let parse = |text: &str| {
            text.parse::<f64>()
                .map_err(|e| ctx.error(format!("bad numeric literal '{text}': {e}")))
        };
        let (a, b) = (parse(a.as_str())?, parse(b.as_str())?);
        let holds = match op.as_str() {
            "==" => a == b,
            "!=" => a != b,
            "<=" => a <= b,
            ">=" => a >= b,
            "<" => a < b,
            _ => a > b,
        };
        !holds
    } else if let (Some(x), Some(y)) = (caps.name("x"), caps.name("y")) {
        x.as_str() == y.as_str()
    } else {
        false
    };

    if !never_true {
        return Ok(vec![]);
    }
    let statement = ctx
        .line
        .get(whole.range())
        .unwrap_or(whole.as_str())
        .trim()
        .trim_end_matches(':');
    Ok(vec![format!("'{statement}' can never be true")])
}

fn log_002() -> PatternRule {
    PatternRule {
        id: "LOG-002",
        name: "Duplicated line",
        description: "Detects a statement repeated on the next line at the same indentation",
        subtype: Subtype::LogicDeviation,
        severity: Severity::Low,
        confidence: 0.6,
        patterns: vec![Regex::new(r"\S.*").expect("LOG-002: invalid regex")],
        exclusions: vec![],
        evidence: duplicated_line,
        suggested_fix: "Remove the duplicate or replace it with the intended statement",
    }
}

fn duplicated_line(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let current = strip_comment(ctx.line).trim_end();
    let text = current.trim();
    if text.len() < 4 || TRIVIAL_LINES.contains(&text) || ctx.scan.continuation[ctx.index] {
        return Ok(vec![]);
    }
    let Some(previous) = (0..ctx.index).rev().find(|&k| !is_blank(ctx.lines[k])) else {
        return Ok(vec![]);
    };
    let previous_line = ctx.lines[previous];
    if is_comment(previous_line) || strip_comment(previous_line).trim_end() != current {
        return Ok(vec![]);
    }
    Ok(vec![format!(
        "line {} repeats line {}: {text}",
        ctx.line_number(),
        previous + 1
    )])
}

fn log_003() -> PatternRule {
    PatternRule {
        id: "LOG-003",
        name: "Empty function body",
        description: "Detects functions whose body is only pass, ..., a docstring or raise NotImplementedError",
        subtype: Subtype::LogicBreakdown,
        severity: Severity::Medium,
        confidence: 0.7,
        patterns: vec![
            Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("LOG-003: invalid regex"),
        ],
        exclusions: vec![],
        evidence: empty_function,
        suggested_fix: "Implement the function body or remove the stub",
    }
}

fn is_declared_abstract(ctx: &RuleContext<'_>) -> bool {
    let (lines, header) = (ctx.lines, ctx.index);
    for line in lines[..header].iter().rev() {
        let trimmed = line.trim();
        if trimmed.starts_with('@') {
            if ["abstractmethod", "abstractproperty", "overload"]
                .iter()
                .any(|marker| trimmed.contains(marker))
            {
                return true;
            }
        } else if !is_insignificant(line) {
            break;
        }
    }
    ctx.scan.enclosing[header].is_some_and(|k| {
        let code = &ctx.scan.code[k];
        code.trim_start().starts_with("class") && (code.contains("Protocol") || code.contains("ABC"))
    })
}

fn placeholder_kind(statement: &str) -> Option<&'static str> {
    match statement {
        "pass" => Some("'pass'"),
        "..." => Some("'...'"),
        s if s.starts_with("raise NotImplementedError") => Some("'raise NotImplementedError'"),
        _ => None,
    }
}

fn empty_function(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(name) = ctx.capture(1) else {
        return Ok(vec![]);
    };
    if is_declared_abstract(ctx) {
        return Ok(vec![]);
    }

    let end = statement_end(ctx.lines, ctx.index);
    let header_end = code_of(ctx.lines[end]);
    let inline = header_end
        .rsplit_once(':')
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_default();

    let mut kinds: Vec<&'static str> = Vec::new();
    let mut note = |kind: &'static str| {
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    };

    if inline.is_empty() {
        let in_string = &ctx.scan.in_string;
        for k in end + 1..ctx.lines.len() {
            let line = ctx.lines[k];
            if is_insignificant(line) && !in_string[k] {
                continue;
            }
            if indent_of(line) <= indent_of(ctx.line) && !in_string[k] {
                break;
            }
            let statement = code_of(line);
            let statement = statement.trim();
            if in_string[k] || statement.starts_with(['"', '\'']) {
                note("a docstring");
                continue;
            }
            match placeholder_kind(statement) {
                Some(kind) => note(kind),
                None => return Ok(vec![]),
            }
        }
    } else {
        match placeholder_kind(&inline) {
            Some(kind) => note(kind),
            None => return Ok(vec![]),
        }
    }

    let body = if kinds.is_empty() {
        "empty".to_string()
    } else {
        format!("only {}", kinds.join(" and "))
    };
    Ok(vec![format!("function '{name}' has no implementation: body is {body}")])
}

fn log_004() -> PatternRule {
    PatternRule {
        id: "LOG-004",
        name: "Unreachable code",
        description: "Detects statements that follow return, raise, break or continue in the same block",
        subtype: Subtype::LogicBreakdown,
        severity: Severity::Medium,
        confidence: 0.85,
        patterns: vec![
            Regex::new(r"^\s*(?P<kw>return|raise|break|continue)\b").expect("LOG-004: invalid regex"),
        ],
        exclusions: vec![],
        evidence: unreachable_code,
        suggested_fix: "Remove the unreachable statements or move them before the jump",
    }
}

fn unreachable_code(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(keyword) = ctx.capture(1) else {
        return Ok(vec![]);
    };
    let indent = indent_of(ctx.line);
    let end = statement_end(ctx.lines, ctx.index);
    let in_string = &ctx.scan.in_string;

    let next = (end + 1..ctx.lines.len()).find(|&k| !in_string[k] && !is_insignificant(ctx.lines[k]));
    let Some(next) = next else {
        return Ok(vec![]);
    };
    let line = ctx.lines[next];
    if indent_of(line) != indent {
        return Ok(vec![]);
    }
    let code = code_of(line);
    let first_word = code
        .trim_start()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default();
    if CONTINUATION_CLAUSES.contains(&first_word) {
        return Ok(vec![]);
    }
    Ok(vec![format!(
        "line {} can never run after '{keyword}' on line {}",
        next + 1,
        ctx.line_number()
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scan_rule;

    #[test]
    fn test_log_001_detects_always_false_conditions() {
        let test_cases = vec![
            ("if False:\n    run()\n", true),
            ("while 0:\n    run()\n", true),
            ("if None:\n    run()\n", true),
            ("if \"\":\n    run()\n", true),
            ("if not True:\n    run()\n", true),
            ("if 1 == 2:\n    run()\n", true),
            ("if 3 < 2:\n    run()\n", true),
            ("if ready and not ready:\n    run()\n", true),
            ("if 2 == 2:\n    run()\n", false),
            ("if \"x\":\n    run()\n", false),
            ("if ready and not done:\n    run()\n", false),
            ("if x == 0:\n    run()\n", false),
        ];
        for (input, should_match) in test_cases {
            let scan = scan_rule(log_001(), input);
            assert_eq!(!scan.matches.is_empty(), should_match, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_log_001_evidence_quotes_condition() {
        let scan = scan_rule(log_001(), "if 1 == 2:\n    run()\n");
        assert_eq!(scan.matches[0].evidence, vec!["'if 1 == 2' can never be true"]);
    }

    #[test]
    fn test_log_002_detects_duplicate_lines() {
        let code = "total = 0\ntotal += price\ntotal += price\n";
        let scan = scan_rule(log_002(), code);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].location.start_line, 3);
    }

    #[test]
    fn test_log_002_ignores_trivial_and_different_indent() {
        let safe = [
            "for a in x:\n    pass\npass\n",
            "if a:\n    x = compute()\nx = compute()\n",
            "print(\"a\")\nprint(\"b\")\n",
            "grid = [\n    [0, 0],\n    [0, 0],\n]\n",
            "x = compute()\n# x = compute()\n",
        ];
        for code in safe {
            assert!(scan_rule(log_002(), code).matches.is_empty(), "Failed for: {code}");
        }
    }

    #[test]
    fn test_log_003_detects_stub_functions() {
        let test_cases = vec![
            ("def process(data):\n    pass\n", true),
            ("def process(data): ...\n", true),
            ("def process(data):\n    \"\"\"Process the data.\"\"\"\n", true),
            ("def process(data):\n    \"\"\"\n    Long docs.\n    \"\"\"\n    pass\n", true),
            ("def process(data):\n    raise NotImplementedError()\n", true),
            ("def process(data):\n    return data * 2\n", false),
            ("def process(data): return data\n", false),
            ("def process(data):\n    \"\"\"Docs.\"\"\"\n    return data\n", false),
            ("@abstractmethod\ndef process(self):\n    pass\n", false),
            ("class Reader(Protocol):\n    def read(self) -> bytes: ...\n", false),
        ];
        for (input, should_match) in test_cases {
            let scan = scan_rule(log_003(), input);
            assert_eq!(!scan.matches.is_empty(), should_match, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_log_003_evidence_describes_body() {
        let code = "def process(data):\n    \"\"\"Docs.\"\"\"\n    pass\n";
        let scan = scan_rule(log_003(), code);
        assert_eq!(
            scan.matches[0].evidence,
            vec!["function 'process' has no implementation: body is only a docstring and 'pass'"]
        );
    }

    #[test]
    fn test_log_004_detects_unreachable_code() {
        let code = "def f(x):\n    return x\n    print(\"never\")\n";
        let scan = scan_rule(log_004(), code);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].location.start_line, 2);
        assert_eq!(scan.matches[0].evidence, vec!["line 3 can never run after 'return' on line 2"]);
    }

    #[test]
    fn test_log_004_accepts_reachable_code() {
        let safe = [
            "def f(x):\n    if x:\n        return 1\n    return 2\n",
            "for i in x:\n    if i:\n        continue\n    else:\n        break\n",
            "try:\n    raise ValueError()\nexcept ValueError:\n    pass\n",
            "def f():\n    return (\n        1\n    )\n",
            "def f():\n    return 1\n\n# trailing\n",
        ];
        for code in safe {
            assert!(scan_rule(log_004(), code).matches.is_empty(), "Failed for: {code}");
        }
    }
}
