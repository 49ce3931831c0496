//! Names bound and read by a single statement.
//!
//! Input is the code portion of a line (see [`super::source::code_of`]):
//! comments removed and string contents masked.

use super::source::is_keyword_or_builtin;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_]\w*").expect("invalid identifier regex"));
static PLAIN_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("invalid identifier regex"));
static DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").expect("invalid def regex")
});
static CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_]\w*)").expect("invalid class regex"));
static IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+)$").expect("invalid import regex"));
static FROM_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+\.*[\w.]*\s+import\s+(.+)$").expect("invalid from-import regex")
});
static WILDCARD_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+\S+\s+import\s+\*").expect("invalid wildcard regex")
});
static SCOPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:global|nonlocal)\s+(.+)$").expect("invalid scope regex")
});
static FOR_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfor\s+([A-Za-z_(\[][\w\s,()\[\]*]*?)\s+in\b").expect("invalid for regex")
});
static AS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bas\s+([A-Za-z_]\w*)").expect("invalid as regex"));
static WALRUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_]\w*)\s*:=").expect("invalid walrus regex"));
static LAMBDA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blambda\b([^:]*):").expect("invalid lambda regex"));
static ANNOTATION_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[A-Za-z_]\w*\s*:\s*[^=]+$").expect("invalid annotation regex")
});
static NON_USAGE_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:async\s+)?def|class|import|from|global|nonlocal)\b")
        .expect("invalid statement regex")
});

/// A statement split at its top-level `=` signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment<'a> {
    pub targets: Vec<&'a str>,
    pub value: &'a str,
    /// Byte offset of `value` in the statement.
    pub value_offset: usize,
    /// `+=`, `-=` and friends.
    pub augmented: bool,
}

/// Split a statement at top-level assignment operators. Comparison
/// operators, walrus and keyword arguments inside brackets are ignored.
pub fn assignment(code: &str) -> Option<Assignment<'_>> {
    let bytes = code.as_bytes();
    let mut depth = 0i32;
    let mut splits: Vec<usize> = Vec::new();
    let mut augmented_at: Option<usize> = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'=' if depth == 0 => {
                let next = bytes.get(i + 1).copied();
                if next == Some(b'=') {
                    i += 2;
                    continue;
                }
                let prev = if i > 0 { bytes[i - 1] } else { 0 };
                match prev {
                    b'=' | b'!' | b':' => {}
                    b'<' | b'>' => {
                        // `<<=` and `>>=` are augmented; `<=` and `>=` compare.
                        if i >= 2 && bytes[i - 2] == prev && augmented_at.is_none() && splits.is_empty() {
                            augmented_at = Some(i - 2);
                            splits.push(i);
                        }
                    }
                    b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^' | b'@' => {
                        if augmented_at.is_none() && splits.is_empty() {
                            let mut start = i - 1;
                            if start > 0 && matches!(bytes[start - 1], b'*' | b'/') && bytes[start - 1] == prev {
                                start -= 1;
                            }
                            augmented_at = Some(start);
                            splits.push(i);
                        }
                    }
                    _ => splits.push(i),
                }
            }
            _ => {}
        }
        i += 1;
    }

    let last = *splits.last()?;
    let value_offset = last + 1;
    let value = &code[value_offset..];

    if let Some(op_start) = augmented_at {
        return Some(Assignment {
            targets: vec![code[..op_start].trim()],
            value,
            value_offset,
            augmented: true,
        });
    }

    let mut targets = Vec::with_capacity(splits.len());
    let mut start = 0;
    for split in &splits {
        targets.push(code[start..*split].trim());
        start = split + 1;
    }
    Some(Assignment {
        targets,
        value,
        value_offset,
        augmented: false,
    })
}

/// Value of a plain (non-augmented) assignment, trimmed.
pub fn assigned_value(code: &str) -> Option<&str> {
    assignment(code)
        .filter(|a| !a.augmented)
        .map(|a| a.value.trim())
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn target_names(target: &str) -> Vec<String> {
    // Drop an annotation: `x: int`.
    let target = match target.find(':') {
        Some(pos) => &target[..pos],
        None => target,
    };
    target
        .split(',')
        .map(|part| part.trim_matches(|c: char| c.is_whitespace() || "()[]*".contains(c)))
        .filter(|part| PLAIN_IDENT.is_match(part))
        .map(str::to_string)
        .collect()
}

fn parameter_names(params: &str) -> Vec<String> {
    split_top_level(params)
        .into_iter()
        .filter_map(|param| {
            let param = param.trim().trim_start_matches('*');
            let end = param.find([':', '=']).unwrap_or(param.len());
            let name = param[..end].trim();
            PLAIN_IDENT.is_match(name).then(|| name.to_string())
        })
        .collect()
}

fn import_names(items: &str, dotted: bool) -> Vec<String> {
    items
        .split(',')
        .filter_map(|item| {
            let item = item.trim_matches(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == '\\');
            if item.is_empty() || item == "*" {
                return None;
            }
            let name = match item.split_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None if dotted => item.split('.').next().unwrap_or(item).trim(),
                None => item,
            };
            PLAIN_IDENT.is_match(name).then(|| name.to_string())
        })
        .collect()
}

/// Names bound only for the duration of the statement: comprehension
/// targets, lambda parameters, walrus targets and `as` names.
fn statement_local_names(code: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    for caps in FOR_TARGET.captures_iter(code) {
        names.extend(target_names(&caps[1]));
    }
    for caps in AS_NAME.captures_iter(code) {
        names.insert(caps[1].to_string());
    }
    for caps in WALRUS.captures_iter(code) {
        names.insert(caps[1].to_string());
    }
    for caps in LAMBDA.captures_iter(code) {
        names.extend(parameter_names(&caps[1]));
    }
    names
}

/// Names bound by a statement.
pub fn bindings(code: &str) -> Vec<String> {
    if let Some(caps) = DEF.captures(code) {
        let mut names = vec![caps[1].to_string()];
        let params_start = caps.get(0).map_or(0, |m| m.end());
        let rest = &code[params_start..];
        let params_end = rest.rfind(')').unwrap_or(rest.len());
        names.extend(parameter_names(&rest[..params_end]));
        return names;
    }
    if let Some(caps) = CLASS.captures(code) {
        return vec![caps[1].to_string()];
    }
    if let Some(caps) = FROM_IMPORT.captures(code) {
        return import_names(&caps[1], false);
    }
    if let Some(caps) = IMPORT.captures(code) {
        return import_names(&caps[1], true);
    }
    if let Some(caps) = SCOPE_DECL.captures(code) {
        return caps[1]
            .split(',')
            .map(str::trim)
            .filter(|n| PLAIN_IDENT.is_match(n))
            .map(str::to_string)
            .collect();
    }

    let mut names: Vec<String> = statement_local_names(code).into_iter().collect();
    if let Some(assign) = assignment(code)
        && !assign.augmented
    {
        for target in assign.targets {
            names.extend(target_names(target));
        }
    }
    names.sort();
    names.dedup();
    names
}

/// Names read by a statement that need a definition somewhere: keywords,
/// builtins, attribute names, keyword-argument names and statement-local
/// names are excluded.
pub fn usages(code: &str) -> Vec<String> {
    if NON_USAGE_STATEMENT.is_match(code) {
        return Vec::new();
    }
    if ANNOTATION_ONLY.is_match(code) {
        let head = code.trim_start().split(':').next().unwrap_or_default().trim();
        if !is_keyword_or_builtin(head) {
            return Vec::new();
        }
    }

    let local = statement_local_names(code);
    let region_start = match assignment(code) {
        Some(assign) if !assign.augmented => assign.value_offset,
        _ => 0,
    };

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for m in IDENT.find_iter(code) {
        if m.start() < region_start {
            continue;
        }
        let name = m.as_str();
        if is_keyword_or_builtin(name) || local.contains(name) {
            continue;
        }
        if code[..m.start()].trim_end().ends_with('.') {
            continue;
        }
        let after = &code[m.end()..];
        if after.starts_with(['"', '\'']) {
            continue;
        }
        let after = after.trim_start();
        if after.starts_with('=') && !after.starts_with("==") {
            continue;
        }
        if seen.insert(name) {
            names.push(name.to_string());
        }
    }
    names
}

pub fn is_wildcard_import(code: &str) -> bool {
    WILDCARD_IMPORT.is_match(code)
}
