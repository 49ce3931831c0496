//! Facts about a source file computed once per scan, so that evidence
//! extractors answer "where was this name bound / guarded" without walking
//! back over earlier lines.

use crate::analysis::flow::{bracket_balance, is_function_header, logical_line};
use crate::analysis::names::{assigned_value, assignment, bindings, is_wildcard_import};
use crate::analysis::source::{code_of, indent_of, is_insignificant, string_block_lines};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// How far back an open bracket can make a line a continuation.
const CONTINUATION_WINDOW: usize = 40;

static NONE_COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*) (?:is not|is|!=|==) None\b").expect("NONE_COMPARISON: invalid regex")
});
static TRUTHINESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:if not|if|while|assert|and|or) ([A-Za-z_]\w*)|\bisinstance\(([A-Za-z_]\w*)")
        .expect("TRUTHINESS: invalid regex")
});
static KEY_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:"([^"]*)"|'([^']*)') (?:not )?in ([A-Za-z_]\w*)|\b([A-Za-z_]\w*)\.(?:get|setdefault)\((?:"([^"]*)"|'([^']*)')"#,
    )
    .expect("KEY_CHECK: invalid regex")
});
static KEY_SUBSCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b([A-Za-z_]\w*)\[(?:"([^"]*)"|'([^']*)')\]"#).expect("KEY_SUBSCRIPT: invalid regex")
});

#[derive(Debug, Default)]
struct NameFacts {
    /// Lines whose statement binds the name, ascending.
    bound_at: Vec<usize>,
    /// Lines that test the name against None or for truthiness, ascending.
    guarded_at: Vec<usize>,
    /// Some binding assigns a value other than a literal None.
    bound_to_value: bool,
}

/// Per-scan index over the lines of one source file.
#[derive(Debug, Default)]
pub struct ScanIndex {
    /// Each line with its comment removed and string contents masked.
    pub code: Vec<String>,
    pub in_string: Vec<bool>,
    pub continuation: Vec<bool>,
    pub in_function: Vec<bool>,
    /// Innermost block header enclosing each line.
    pub enclosing: Vec<Option<usize>>,
    pub has_wildcard_import: bool,
    pub handles_key_error: bool,
    names: HashMap<String, NameFacts>,
    /// `(mapping, key)` pairs with a membership test, `.get` or `.setdefault`.
    checked_keys: HashSet<(String, String)>,
    /// First line assigning to `mapping[key]`.
    written_keys: HashMap<(String, String), usize>,
}

impl ScanIndex {
    pub fn build(lines: &[&str]) -> Self {
        let code: Vec<String> = lines.iter().map(|line| code_of(line)).collect();
        let continuation = continuation_lines(lines, &code);
        let (enclosing, in_function) = block_structure(lines, &continuation);

        let mut index = ScanIndex {
            in_string: string_block_lines(lines),
            has_wildcard_import: lines
                .iter()
                .any(|line| line.contains("import *") && is_wildcard_import(line)),
            handles_key_error: lines
                .iter()
                .any(|line| line.contains("KeyError") && line.trim_start().starts_with("except")),
            continuation,
            in_function,
            enclosing,
            ..Default::default()
        };

        for (k, line) in lines.iter().enumerate() {
            index.record_bindings(lines, k, &code[k]);
            index.record_guards(k, &code[k]);
            index.record_keys(k, line, &code[k]);
        }
        index.code = code;
        index
    }

    fn record_bindings(&mut self, lines: &[&str], k: usize, code: &str) {
        let names = if is_function_header(lines[k]) {
            bindings(&logical_line(lines, k))
        } else {
            bindings(code)
        };
        if names.is_empty() {
            return;
        }
        let to_value = assigned_value(code) != Some("None");
        for name in names {
            let facts = self.names.entry(name).or_default();
            facts.bound_at.push(k);
            facts.bound_to_value |= to_value;
        }
    }

    fn record_guards(&mut self, k: usize, code: &str) {
        let mut guarded: Vec<&str> = NONE_COMPARISON
            .captures_iter(code)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect();
        for caps in TRUTHINESS.captures_iter(code) {
            let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            if !code[name.end()..].starts_with('.') {
                guarded.push(name.as_str());
            }
        }
        for name in guarded {
            let facts = self.names.entry(name.to_string()).or_default();
            if facts.guarded_at.last() != Some(&k) {
                facts.guarded_at.push(k);
            }
        }
    }

    fn record_keys(&mut self, k: usize, line: &str, code: &str) {
        if !line.contains('"') && !line.contains('\'') {
            return;
        }
        for caps in KEY_CHECK.captures_iter(line) {
            let key = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(5)).or_else(|| caps.get(6));
            let mapping = caps.get(3).or_else(|| caps.get(4));
            if let (Some(mapping), Some(key)) = (mapping, key) {
                self.checked_keys
                    .insert((mapping.as_str().to_string(), key.as_str().to_string()));
            }
        }
        let Some(assign) = assignment(code).filter(|a| !a.augmented) else {
            return;
        };
        let Some(targets) = line.get(..assign.value_offset) else {
            return;
        };
        for caps in KEY_SUBSCRIPT.captures_iter(targets) {
            if let (Some(mapping), Some(key)) = (caps.get(1), caps.get(2).or_else(|| caps.get(3))) {
                self.written_keys
                    .entry((mapping.as_str().to_string(), key.as_str().to_string()))
                    .or_insert(k);
            }
        }
    }

    /// Last line before `before` whose statement binds `name`.
    pub fn latest_binding(&self, name: &str, before: usize) -> Option<usize> {
        self.names.get(name).and_then(|facts| last_before(&facts.bound_at, before))
    }

    /// Whether any line before `before` binds `name`.
    pub fn bound_before(&self, name: &str, before: usize) -> bool {
        self.names
            .get(name)
            .and_then(|facts| facts.bound_at.first())
            .is_some_and(|&k| k < before)
    }

    /// Last line before `before` that guards `name` against None.
    pub fn latest_guard(&self, name: &str, before: usize) -> Option<usize> {
        self.names.get(name).and_then(|facts| last_before(&facts.guarded_at, before))
    }

    pub fn is_guarded_at(&self, name: &str, line: usize) -> bool {
        self.names
            .get(name)
            .is_some_and(|facts| facts.guarded_at.binary_search(&line).is_ok())
    }

    /// Whether some statement binds `name` to something other than None.
    pub fn bound_to_value(&self, name: &str) -> bool {
        self.names.get(name).is_some_and(|facts| facts.bound_to_value)
    }

    pub fn key_is_checked(&self, mapping: &str, key: &str) -> bool {
        self.checked_keys
            .contains(&(mapping.to_string(), key.to_string()))
    }

    /// Whether `mapping[key]` is assigned on a line before `before`.
    pub fn key_written_before(&self, mapping: &str, key: &str, before: usize) -> bool {
        self.written_keys
            .get(&(mapping.to_string(), key.to_string()))
            .is_some_and(|&k| k < before)
    }
}

fn last_before(sorted: &[usize], before: usize) -> Option<usize> {
    let end = sorted.partition_point(|&k| k < before);
    end.checked_sub(1).map(|i| sorted[i])
}

fn continuation_lines(lines: &[&str], code: &[String]) -> Vec<bool> {
    let significant: Vec<bool> = lines.iter().map(|line| !is_insignificant(line)).collect();
    let balance: Vec<i32> = code.iter().map(|c| bracket_balance(c)).collect();
    let backslash: Vec<bool> = code.iter().map(|c| c.trim_end().ends_with('\\')).collect();

    (0..lines.len())
        .map(|index| {
            let mut depth = 0i32;
            let mut open_backslash = false;
            for k in index.saturating_sub(CONTINUATION_WINDOW)..index {
                if !significant[k] {
                    continue;
                }
                depth = (depth + balance[k]).max(0);
                open_backslash = backslash[k];
            }
            depth > 0 || open_backslash
        })
        .collect()
}

/// Innermost enclosing header and function membership for every line, from
/// one pass over a stack of open blocks.
fn block_structure(lines: &[&str], continuation: &[bool]) -> (Vec<Option<usize>>, Vec<bool>) {
    // (line, indent, inside or opening a function)
    let mut open: Vec<(usize, usize, bool)> = Vec::new();
    let mut enclosing = Vec::with_capacity(lines.len());
    let mut in_function = Vec::with_capacity(lines.len());

    for (k, line) in lines.iter().enumerate() {
        let indent = indent_of(line);
        let parent = open.iter().rev().find(|(_, level, _)| *level < indent);
        enclosing.push(parent.map(|(header, _, _)| *header));
        let inside = parent.is_some_and(|(_, _, function)| *function);
        in_function.push(inside);

        if is_insignificant(line) || continuation[k] {
            continue;
        }
        while open.last().is_some_and(|(_, level, _)| *level >= indent) {
            open.pop();
        }
        open.push((k, indent, inside || is_function_header(line)));
    }
    (enclosing, in_function)
}
