use crate::analysis::names::usages;
use crate::rules::types::{PatternRule, RuleContext, RuleError};
use crate::taxonomy::{Severity, Subtype};
use regex::Regex;

/// Top-level module names that are known to exist: the standard library
/// plus widely used third-party distributions.
const KNOWN_MODULES: &[&str] = &[
    // standard library
    "__future__", "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "builtins",
    "calendar", "cmath", "collections", "concurrent", "configparser", "contextlib", "copy",
    "csv", "ctypes", "dataclasses", "datetime", "decimal", "difflib", "dis", "doctest",
    "email", "enum", "errno", "fnmatch", "fractions", "ftplib", "functools", "gc", "getpass",
    "glob", "gzip", "hashlib", "heapq", "hmac", "html", "http", "importlib", "inspect", "io",
    "ipaddress", "itertools", "json", "logging", "lzma", "math", "mimetypes",
    "multiprocessing", "numbers", "operator", "os", "pathlib", "pickle", "platform",
    "pprint", "pty", "queue", "random", "re", "secrets", "select", "shelve", "shlex",
    "shutil", "signal", "smtplib", "socket", "sqlite3", "ssl", "stat", "statistics",
    "string", "struct", "subprocess", "sys", "tarfile", "telnetlib", "tempfile", "textwrap",
    "threading", "time", "timeit", "tkinter", "token", "tokenize", "traceback", "types",
    "typing", "unicodedata", "unittest", "urllib", "uuid", "warnings", "weakref", "xml",
    "zipfile", "zlib", "zoneinfo",
    // third party
    "aiohttp", "attr", "attrs", "bs4", "boto3", "botocore", "celery", "click", "cv2",
    "django", "fastapi", "flask", "httpx", "jinja2", "jwt", "lxml", "matplotlib", "numpy",
    "openai", "pandas", "paramiko", "PIL", "pydantic", "pytest", "redis", "requests",
    "rich", "scipy", "seaborn", "sklearn", "sqlalchemy", "tensorflow", "torch", "tqdm",
    "transformers", "typer", "uvicorn", "yaml",
];

/// Words that real package names rarely use but invented ones often do.
const HYPE_WORDS: &[&str] = &[
    "advanced", "ultra", "super", "magic", "smart", "easy", "quantum", "mega", "turbo",
    "hyper", "enhanced", "optimized", "intelligent", "ultimate", "awesome", "perfect", "auto",
];

/// Suffixes glued onto a real package name to make a plausible fake one.
const FAKE_SUFFIXES: &[&str] = &[
    "utils", "helpers", "tools", "pro", "plus", "extended", "extra", "advanced", "lite", "ext",
    "enhanced",
];

pub fn rules() -> Vec<PatternRule> {
    vec![nam_001(), nam_002()]
}

fn nam_001() -> PatternRule {
    PatternRule {
        id: "NAM-001",
        name: "Name used before definition",
        description: "Detects names read at module level before any statement binds them, or never bound at all",
        subtype: Subtype::Identity,
        severity: Severity::High,
        confidence: 0.8,
        patterns: vec![Regex::new(r"\S.*").expect("NAM-001: invalid regex")],
        exclusions: vec![],
        evidence: undefined_names,
        suggested_fix: "Define or import the name before it is used",
    }
}

fn undefined_names(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let scan = ctx.scan;
    if scan.continuation[ctx.index] || scan.has_wildcard_import {
        return Ok(vec![]);
    }
    let used = usages(ctx.code);
    if used.is_empty() {
        return Ok(vec![]);
    }

    // Function bodies run after the whole module has executed.
    let visible = if scan.in_function[ctx.index] {
        ctx.lines.len()
    } else {
        ctx.index
    };

    Ok(used
        .into_iter()
        .filter(|name| !(name.starts_with("__") && name.ends_with("__")))
        .filter(|name| !scan.bound_before(name, visible))
        .map(|name| format!("'{name}' is used before it is defined"))
        .collect())
}

fn nam_002() -> PatternRule {
    PatternRule {
        id: "NAM-002",
        name: "Improbable module name",
        description: "Detects imports of modules whose names look invented rather than published",
        subtype: Subtype::ExternalSource,
        severity: Severity::High,
        confidence: 0.7,
        patterns: vec![
            Regex::new(r"^\s*from\s+([A-Za-z_][\w.]*)\s+import\b").expect("NAM-002: invalid regex"),
            Regex::new(r"^\s*import\s+(.+)$").expect("NAM-002: invalid regex"),
        ],
        exclusions: vec![],
        evidence: improbable_modules,
        suggested_fix: "Check the package index for the real package name, or implement the helper locally",
    }
}

fn improbable_modules(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(imported) = ctx.capture(1) else {
        return Ok(vec![]);
    };
    Ok(imported
        .split(',')
        .filter_map(|item| item.split_whitespace().next())
        .filter_map(|module| {
            improbability(module).map(|reason| {
                format!("module '{module}' does not match any known package ({reason})")
            })
        })
        .collect())
}

/// Why `module` looks invented, if it does.
fn improbability(module: &str) -> Option<String> {
    let top = module.split('.').next().unwrap_or(module);
    if KNOWN_MODULES.contains(&top) && !module.contains('_') {
        return None;
    }

    for segment in module.split('.') {
        if KNOWN_MODULES.contains(&segment) {
            continue;
        }
        let words: Vec<&str> = segment.split('_').filter(|w| !w.is_empty()).collect();
        if words.len() > 1
            && let Some(word) = words.iter().find(|w| HYPE_WORDS.contains(&w.to_lowercase().as_str()))
        {
            return Some(format!("contains '{word}'"));
        }
        if let Some((base, suffix)) = segment.rsplit_once('_')
            && KNOWN_MODULES.contains(&base)
            && FAKE_SUFFIXES.contains(&suffix)
        {
            return Some(format!("'{base}' with an invented '_{suffix}' suffix"));
        }
        if words.len() >= 4 {
            return Some(format!("{} underscore-separated words", words.len()));
        }
    }
    None
}
