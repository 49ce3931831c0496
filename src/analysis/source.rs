//! Line-level helpers for indentation-structured source.

const TAB_WIDTH: usize = 4;

/// Width of the leading whitespace, with tabs expanded to four columns.
pub fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Blank or comment-only.
pub fn is_insignificant(line: &str) -> bool {
    is_blank(line) || is_comment(line)
}

/// Remove a trailing `#` comment, ignoring `#` inside string literals.
pub fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, '#') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Replace the contents of string literals with spaces so that identifiers
/// and keywords inside strings do not match. Quotes and byte offsets are
/// preserved.
pub fn mask_strings(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                    push_blank(&mut out, c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(' ');
                } else if c == q {
                    quote = None;
                    out.push(c);
                } else {
                    push_blank(&mut out, c);
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn push_blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// Code portion of a line: comment removed, string contents masked.
pub fn code_of(line: &str) -> String {
    mask_strings(strip_comment(line))
}

/// Lines belonging to the indented block opened by `lines[header]`.
///
/// The block ends at the first significant line whose indent is not deeper
/// than the header. Trailing blank/comment lines are not included.
pub fn block_body<'a>(lines: &'a [&'a str], header: usize) -> &'a [&'a str] {
    block_body_after(lines, header, header)
}

/// Like [`block_body`] for a header spanning `lines[header..=header_end]`.
pub fn block_body_after<'a>(lines: &'a [&'a str], header: usize, header_end: usize) -> &'a [&'a str] {
    let base = indent_of(lines[header]);
    let start = (header_end + 1).min(lines.len());
    let mut end = start;
    for (offset, line) in lines[start..].iter().enumerate() {
        if is_insignificant(line) {
            continue;
        }
        if indent_of(line) <= base {
            break;
        }
        end = start + offset + 1;
    }
    &lines[start..end]
}

/// Significant lines of a block body (no blanks or comments).
pub fn significant<'a>(body: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
    body.iter().copied().filter(|l| !is_insignificant(l))
}

/// Marks lines that sit inside a multi-line triple-quoted string. The line
/// that opens the string is not marked; the closing line is.
pub fn string_block_lines(lines: &[&str]) -> Vec<bool> {
    const DOUBLE: &str = "\"\"\"";
    const SINGLE: &str = "'''";

    let mut open: Option<&'static str> = None;
    lines
        .iter()
        .map(|line| {
            let inside = open.is_some();
            let mut rest = *line;
            loop {
                match open {
                    Some(delim) => match rest.find(delim) {
                        Some(pos) => {
                            rest = &rest[pos + delim.len()..];
                            open = None;
                        }
                        None => break,
                    },
                    None => {
                        let (pos, delim) = match (rest.find(DOUBLE), rest.find(SINGLE)) {
                            (Some(d), Some(s)) if s < d => (s, SINGLE),
                            (Some(d), _) => (d, DOUBLE),
                            (None, Some(s)) => (s, SINGLE),
                            (None, None) => break,
                        };
                        rest = &rest[pos + delim.len()..];
                        open = Some(delim);
                    }
                }
            }
            inside
        })
        .collect()
}

/// Python keywords and builtins that never need a local definition.
pub const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "match", "case",
];

pub const PYTHON_BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes",
    "callable", "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir",
    "divmod", "enumerate", "eval", "exec", "filter", "float", "format", "frozenset",
    "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input", "int",
    "isinstance", "issubclass", "iter", "len", "list", "locals", "map", "max", "memoryview",
    "min", "next", "object", "oct", "open", "ord", "pow", "print", "property", "range",
    "repr", "reversed", "round", "set", "setattr", "slice", "sorted", "staticmethod", "str",
    "sum", "super", "tuple", "type", "vars", "zip", "self", "cls", "__name__", "__file__",
    "__doc__", "__import__", "Exception", "BaseException", "ValueError", "TypeError",
    "KeyError", "IndexError", "AttributeError", "RuntimeError", "ZeroDivisionError",
    "NameError", "StopIteration", "NotImplementedError", "NotImplemented", "OSError",
    "IOError", "ImportError", "ModuleNotFoundError", "AssertionError", "ArithmeticError",
    "LookupError", "MemoryError", "OverflowError", "RecursionError", "Ellipsis", "exit",
    "quit",
];

pub fn is_keyword_or_builtin(name: &str) -> bool {
    PYTHON_KEYWORDS.contains(&name) || PYTHON_BUILTINS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_of() {
        assert_eq!(indent_of("x = 1"), 0);
        assert_eq!(indent_of("    x = 1"), 4);
        assert_eq!(indent_of("\tx = 1"), 4);
        assert_eq!(indent_of("\t  x"), 6);
    }

    #[test]
    fn test_strip_comment_ignores_hash_in_strings() {
        assert_eq!(strip_comment("x = 1  # note"), "x = 1  ");
        assert_eq!(strip_comment("s = '#not a comment'"), "s = '#not a comment'");
        assert_eq!(strip_comment(r##"s = "a\"#b" # c"##), r##"s = "a\"#b" "##);
    }

    #[test]
    fn test_mask_strings_keeps_offsets() {
        let line = r#"print("while True: x")"#;
        let masked = mask_strings(line);
        assert_eq!(masked.len(), line.len());
        assert!(!masked.contains("while"));
        assert!(masked.starts_with("print(\""));
    }

    #[test]
    fn test_block_body() {
        let lines = vec![
            "def f(x):",
            "    y = x",
            "",
            "    # comment",
            "    return y",
            "",
            "print(f(1))",
        ];
        let body = block_body(&lines, 0);
        assert_eq!(body.len(), 4);
        assert_eq!(significant(body).count(), 2);
    }

    #[test]
    fn test_block_body_empty_at_end_of_file() {
        let lines = vec!["while True:"];
        assert!(block_body(&lines, 0).is_empty());
    }

    #[test]
    fn test_string_block_lines() {
        let lines = vec![
            "def f():",
            "    \"\"\"Summary.",
            "    while True: words here",
            "    \"\"\"",
            "    x = '''one line'''",
            "    return 1",
        ];
        assert_eq!(
            string_block_lines(&lines),
            vec![false, false, true, true, false, false]
        );
    }

    #[test]
    fn test_keyword_or_builtin() {
        assert!(is_keyword_or_builtin("print"));
        assert!(is_keyword_or_builtin("None"));
        assert!(!is_keyword_or_builtin("result"));
    }
}
