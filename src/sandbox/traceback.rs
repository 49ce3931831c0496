//! Parsing of Python's standard traceback format.

use super::ExecutionError;
use regex::Regex;
use std::sync::LazyLock;

static FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*File "(?P<file>[^"]*)", line (?P<line>\d+)"#)
        .expect("FRAME: invalid regex")
});

static CARETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[~^]+\s*$").expect("CARETS: invalid regex"));

static EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<kind>[A-Za-z_][\w.]*)(?::\s?(?P<message>.*))?$")
        .expect("EXCEPTION: invalid regex")
});

/// Indent Python uses for the quoted source line in a frame.
const SOURCE_INDENT: usize = 4;

/// Extract the exception that ended the run from `stderr`.
///
/// Location comes from the innermost frame inside `script`; frames in
/// library code are ignored. Returns an empty list when `stderr` holds no
/// traceback.
pub(super) fn parse(stderr: &str, code: &str, script: &str) -> Vec<ExecutionError> {
    let lines: Vec<&str> = stderr.lines().collect();

    let mut saw_frame = false;
    let mut location: Option<(usize, Option<usize>)> = None;
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("Traceback (most recent call last)") {
            saw_frame = true;
            continue;
        }
        let Some(caps) = FRAME.captures(line) else {
            continue;
        };
        saw_frame = true;
        if !is_script(&caps["file"], script) {
            continue;
        }
        let Ok(line_number) = caps["line"].parse::<usize>() else {
            continue;
        };
        let column = lines
            .get(i + 2)
            .filter(|l| CARETS.is_match(l))
            .and_then(|carets| column_of(carets, code, line_number));
        location = Some((line_number, column));
    }
    if !saw_frame {
        return Vec::new();
    }

    let Some(caps) = lines
        .iter()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .find(|l| !l.starts_with(char::is_whitespace))
        .and_then(|l| EXCEPTION.captures(l))
    else {
        return Vec::new();
    };

    let kind = caps["kind"].rsplit('.').next().unwrap_or(&caps["kind"]);
    let message = caps
        .name("message")
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let mut error = ExecutionError::new(kind, message);
    if let Some((line, column)) = location {
        error.line_number = Some(line);
        error.column_number = column;
    }
    vec![error]
}

fn is_script(file: &str, script: &str) -> bool {
    file == script
        || file
            .strip_suffix(script)
            .is_some_and(|dir| dir.ends_with('/') || dir.ends_with('\\'))
}

/// 1-based character column the carets point at, in terms of the original
/// source line. Python prints the source line dedented and re-indented by
/// four.
fn column_of(carets: &str, code: &str, line_number: usize) -> Option<usize> {
    let caret = carets.chars().position(|c| matches!(c, '^' | '~'))?;
    let source = code.lines().nth(line_number.checked_sub(1)?)?;
    let indent = source.chars().take_while(|c| c.is_whitespace()).count();
    Some(caret.checked_sub(SOURCE_INDENT)? + indent + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_with_location() {
        let stderr = r#"Traceback (most recent call last):
  File "/tmp/halluscan-abc/main.py", line 3, in <module>
    print(a / b)
          ~~^~~
ZeroDivisionError: division by zero
"#;
        let code = "a = 1\nb = 0\nprint(a / b)\n";
        let errors = parse(stderr, code, "main.py");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, "ZeroDivisionError");
        assert_eq!(errors[0].message, "division by zero");
        assert_eq!(errors[0].line_number, Some(3));
        assert_eq!(errors[0].column_number, Some(7));
    }

    #[test]
    fn test_column_counts_characters() {
        let stderr = format!(
            "Traceback (most recent call last):\n  File \"/tmp/halluscan-abc/main.py\", line 2, in <module>\n    label = 'é→'; print(1 / 0)\n{}~~^~~\nZeroDivisionError: division by zero\n",
            " ".repeat(4 + 20)
        );
        let code = "x = 1\nlabel = 'é→'; print(1 / 0)\n";
        let errors = parse(&stderr, code, "main.py");
        assert_eq!(errors[0].line_number, Some(2));
        assert_eq!(errors[0].column_number, Some(21));
    }

    #[test]
    fn test_innermost_script_frame_wins() {
        let stderr = r#"Traceback (most recent call last):
  File "/tmp/x/main.py", line 4, in <module>
    f()
  File "/tmp/x/main.py", line 2, in f
    return {}["k"]
           ~~^^^^^
  File "/usr/lib/python3.12/json/__init__.py", line 346, in loads
    return _default_decoder.decode(s)
KeyError: 'k'
"#;
        let code = "def f():\n    return {}[\"k\"]\n\nf()\n";
        let errors = parse(stderr, code, "main.py");
        assert_eq!(errors[0].kind, "KeyError");
        assert_eq!(errors[0].message, "'k'");
        assert_eq!(errors[0].line_number, Some(2));
        assert_eq!(errors[0].column_number, Some(12));
    }

    #[test]
    fn test_syntax_error_without_traceback_header() {
        let stderr = r#"  File "/tmp/x/main.py", line 1
    x = (
        ^
SyntaxError: '(' was never closed
"#;
        let errors = parse(stderr, "x = (\n", "main.py");
        assert_eq!(errors[0].kind, "SyntaxError");
        assert_eq!(errors[0].line_number, Some(1));
        assert_eq!(errors[0].column_number, Some(5));
    }

    #[test]
    fn test_dotted_exception_type() {
        let stderr = r#"Traceback (most recent call last):
  File "/tmp/x/main.py", line 2, in <module>
    json.loads("{")
json.decoder.JSONDecodeError: Expecting property name enclosed in double quotes: line 1 column 2 (char 1)
"#;
        let errors = parse(stderr, "import json\njson.loads(\"{\")\n", "main.py");
        assert_eq!(errors[0].kind, "JSONDecodeError");
        assert_eq!(errors[0].column_number, None);
        assert!(errors[0].message.starts_with("Expecting property name"));
    }

    #[test]
    fn test_exception_without_message() {
        let stderr = "Traceback (most recent call last):\n  File \"/t/main.py\", line 1, in <module>\n    raise KeyboardInterrupt\nKeyboardInterrupt\n";
        let errors = parse(stderr, "raise KeyboardInterrupt\n", "main.py");
        assert_eq!(errors[0].kind, "KeyboardInterrupt");
        assert!(errors[0].message.is_empty());
    }

    #[test]
    fn test_plain_stderr_is_not_a_traceback() {
        assert!(parse("Done\n", "print(1)", "main.py").is_empty());
        assert!(parse("", "print(1)", "main.py").is_empty());
    }

    #[test]
    fn test_other_file_named_like_script_is_ignored() {
        assert!(!is_script("/tmp/x/notmain.py", "main.py"));
        assert!(is_script("/tmp/x/main.py", "main.py"));
        assert!(is_script("main.py", "main.py"));
    }
}
