//! Block-level control-flow helpers.

use super::source::{block_body, block_body_after, code_of, indent_of, is_insignificant};
use regex::Regex;
use std::sync::LazyLock;

static LOOP_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?(?:for|while)\b").expect("invalid loop header regex")
});
static FUNCTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+[A-Za-z_]\w*").expect("invalid def header regex")
});
static HARD_EXIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:return|raise)\b|\b(?:sys\.)?exit\s*\(|\bquit\s*\(|\bos\._exit\s*\(")
        .expect("invalid exit regex")
});
static BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bbreak\b").expect("invalid break regex"));

/// Whether the loop opened by `lines[header]` has a visible way out: a
/// `return`, `raise` or process exit anywhere in its body, or a `break` that
/// belongs to this loop rather than a nested one.
pub fn loop_has_exit(lines: &[&str], header: usize) -> bool {
    let header_code = code_of(lines[header]);
    if let Some((_, inline)) = header_code.split_once(':')
        && (HARD_EXIT.is_match(inline) || BREAK.is_match(inline))
    {
        return true;
    }

    let body = block_body(lines, header);
    let header_indent = indent_of(lines[header]);

    for (offset, line) in body.iter().enumerate() {
        if is_insignificant(line) {
            continue;
        }
        let code = code_of(line);
        if HARD_EXIT.is_match(&code) {
            return true;
        }
        if BREAK.is_match(&code) {
            let index = header + 1 + offset;
            if !break_is_nested(lines, header, header_indent, index) {
                return true;
            }
        }
    }
    false
}

fn break_is_nested(lines: &[&str], header: usize, header_indent: usize, index: usize) -> bool {
    let mut current = indent_of(lines[index]);
    for k in (header + 1..index).rev() {
        let line = lines[k];
        if is_insignificant(line) {
            continue;
        }
        let indent = indent_of(line);
        if indent < current {
            if indent <= header_indent {
                return false;
            }
            if LOOP_HEADER.is_match(&code_of(line)) {
                return true;
            }
            current = indent;
        }
    }
    false
}

pub fn is_function_header(line: &str) -> bool {
    FUNCTION_HEADER.is_match(line)
}

pub(crate) fn bracket_balance(code: &str) -> i32 {
    code.chars().fold(0, |depth, c| match c {
        '(' | '[' | '{' => depth + 1,
        ')' | ']' | '}' => depth - 1,
        _ => depth,
    })
}

/// Index of the last line of the statement starting at `lines[index]`.
pub fn statement_end(lines: &[&str], index: usize) -> usize {
    let mut depth = 0i32;
    for (k, line) in lines.iter().enumerate().skip(index).take(40) {
        let code = code_of(line);
        depth += bracket_balance(&code);
        if depth <= 0 && !code.trim_end().ends_with('\\') {
            return k;
        }
    }
    index
}

/// Body of a compound statement whose header may span several lines,
/// with the index of the body's first line.
pub fn compound_body<'a>(lines: &'a [&'a str], header: usize) -> (usize, &'a [&'a str]) {
    let end = statement_end(lines, header);
    (end + 1, block_body_after(lines, header, end))
}

/// The statement starting at `lines[index]`, joined across bracket
/// continuation lines.
pub fn logical_line(lines: &[&str], index: usize) -> String {
    let mut joined = String::new();
    let mut depth = 0i32;
    for line in lines.iter().skip(index).take(40) {
        let code = code_of(line);
        depth += bracket_balance(&code);
        joined.push_str(code.trim());
        joined.push(' ');
        if depth <= 0 {
            break;
        }
    }
    joined.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(code: &str) -> Vec<&str> {
        code.lines().collect()
    }

    #[test]
    fn test_loop_without_exit() {
        let code = "while True:\n    x = 1\n    print(x)\n";
        assert!(!loop_has_exit(&lines(code), 0));
    }

    #[test]
    fn test_loop_with_break() {
        let code = "while True:\n    if done():\n        break\n";
        assert!(loop_has_exit(&lines(code), 0));
    }

    #[test]
    fn test_break_in_nested_loop_does_not_count() {
        let code = "while True:\n    for i in range(3):\n        break\n    work()\n";
        assert!(!loop_has_exit(&lines(code), 0));
    }

    #[test]
    fn test_return_in_nested_loop_counts() {
        let code = "def f():\n    while True:\n        for i in range(3):\n            return i\n";
        assert!(loop_has_exit(&lines(code), 1));
    }

    #[test]
    fn test_inline_break() {
        assert!(loop_has_exit(&lines("while True: break"), 0));
        assert!(!loop_has_exit(&lines("while True: pass"), 0));
    }

    #[test]
    fn test_break_in_string_does_not_count() {
        let code = "while True:\n    print(\"break\")\n";
        assert!(!loop_has_exit(&lines(code), 0));
    }

    #[test]
    fn test_compound_body_with_multiline_header() {
        let code = "def f(\n    a,\n):\n    return a\nx = 1\n";
        let l = lines(code);
        assert_eq!(statement_end(&l, 0), 2);
        let (start, body) = compound_body(&l, 0);
        assert_eq!(start, 3);
        assert_eq!(body, &["    return a"]);
    }

    #[test]
    fn test_logical_line_joins_signature() {
        let code = "def f(\n    a,\n    b=2,\n):\n    return a\n";
        assert_eq!(logical_line(&lines(code), 0), "def f( a, b=2, ):");
    }
}
