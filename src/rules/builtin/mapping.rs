use crate::analysis::flow::statement_end;
use crate::analysis::names::{assigned_value, assignment};
use crate::analysis::source::{is_keyword_or_builtin, strip_comment};
use crate::rules::types::{PatternRule, RuleContext, RuleError};
use crate::taxonomy::{Severity, Subtype};
use regex::Regex;
use std::sync::LazyLock;

/// Indices at or above this are treated as a hardcoded assumption about size.
const LARGE_INDEX: u128 = 100;

static NUMERIC_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d[\d_]*(?:\.\d+)?(?:[eE][+-]?\d+)?$").expect("invalid numeric regex")
});
static ALLOCATION_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\]\s*\*\s*(\d[\d_]*)|range\(\s*(\d[\d_]*)\s*\)|(?:zeros|ones|empty)\(\s*(\d[\d_]*)")
        .expect("invalid allocation regex")
});

/// Methods that numeric literals really have.
const NUMBER_METHODS: &[&str] = &[
    "bit_length",
    "bit_count",
    "to_bytes",
    "from_bytes",
    "conjugate",
    "as_integer_ratio",
    "is_integer",
    "hex",
    "fromhex",
];

pub fn rules() -> Vec<PatternRule> {
    vec![map_001(), map_002(), map_003(), map_004(), map_005()]
}

/// The most recent statement before the matched line that binds a name.
struct Binding {
    index: usize,
    /// Right-hand side taken from the raw line, for plain assignments.
    value: Option<String>,
}

fn latest_binding(ctx: &RuleContext<'_>, name: &str) -> Option<Binding> {
    let k = ctx.scan.latest_binding(name, ctx.index)?;
    let code = &ctx.scan.code[k];
    let value = assignment(code)
        .filter(|a| !a.augmented)
        .and_then(|a| ctx.lines[k].get(a.value_offset..code.len()))
        .map(|v| v.trim().to_string());
    Some(Binding { index: k, value })
}

/// Raw text of the statement starting at `lines[index]`, comments removed.
fn statement_text(lines: &[&str], index: usize) -> String {
    let end = statement_end(lines, index);
    lines[index..=end]
        .iter()
        .map(|line| strip_comment(line).trim())
        .collect::<Vec<_>>()
        .join(" ")
}

fn map_001() -> PatternRule {
    PatternRule {
        id: "MAP-001",
        name: "String and number combined with '+'",
        description: "Detects '+' between a string literal and a number, which raises TypeError in Python",
        subtype: Subtype::DataCompliance,
        severity: Severity::High,
        confidence: 0.85,
        patterns: vec![
            Regex::new(r#"(?:^|[=(,\[\s])(\d+(?:\.\d+)?)\s*\+\s*[rbufRBUF]{0,2}["']"#)
                .expect("MAP-001: invalid regex"),
            Regex::new(r#"["']\s*\+\s*(\d+(?:\.\d+)?)\b"#).expect("MAP-001: invalid regex"),
            Regex::new(r#"(?:^|[=(,\[\s])([A-Za-z_]\w*)\s*\+\s*[rbufRBUF]{0,2}["']"#)
                .expect("MAP-001: invalid regex"),
            Regex::new(r#"["']\s*\+\s*([A-Za-z_]\w*)"#).expect("MAP-001: invalid regex"),
        ],
        exclusions: vec![],
        evidence: string_number_mix,
        suggested_fix: "Convert explicitly before concatenating, e.g. str(value), or use an f-string",
    }
}

fn string_number_mix(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let Some(operand) = ctx.captures.get(1) else {
        return Ok(vec![]);
    };
    let text = operand.as_str();
    if text.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(vec![format!(
            "numeric literal {text} is combined with a string using '+'"
        )]);
    }

    let rest = ctx.code[operand.end()..].trim_start();
    if rest.starts_with(['(', '.', '[', '"', '\'']) || is_keyword_or_builtin(text) {
        return Ok(vec![]);
    }
    let numeric = latest_binding(ctx, text).and_then(|binding| {
        binding
            .value
            .filter(|value| NUMERIC_LITERAL.is_match(value))
            .map(|value| (binding.index, value))
    });
    Ok(match numeric {
        Some((index, value)) => vec![format!(
            "'{text}' holds the number {value} (line {}) and is combined with a string using '+'",
            index + 1
        )],
        None => vec![],
    })
}

fn map_002() -> PatternRule {
    PatternRule {
        id: "MAP-002",
        name: "Method call on a primitive literal",
        description: "Detects calls to methods that the literal's type does not have, such as \"text\".append()",
        subtype: Subtype::DataCompliance,
        severity: Severity::Medium,
        confidence: 0.75,
        patterns: vec![
            Regex::new(r#"(?P<lit>["'])\s*\.\s*(?P<method>append|extend|push|keys|values|items|sort|add|insert|remove|length|size|toUpperCase|toLowerCase|trim|charAt|substring|includes|contains|equals|isEmpty|reverse)\s*\("#)
                .expect("MAP-002: invalid regex"),
            Regex::new(r"(?:^|[^\w)\]])\(\s*(?P<lit>-?\d+(?:\.\d+)?)\s*\)\s*\.\s*(?P<method>[A-Za-z_]\w*)\s*\(")
                .expect("MAP-002: invalid regex"),
            Regex::new(r"(?:^|[^\w.])(?P<lit>\d+\.\d+)\s*\.\s*(?P<method>[A-Za-z_]\w*)\s*\(")
                .expect("MAP-002: invalid regex"),
            Regex::new(r"(?:^|[=(,\s])(?P<lit>\[)[^\[\]]*\]\s*\.\s*(?P<method>push|length|forEach|includes|size|map|filter|join|indexOf|contains)\s*\(")
                .expect("MAP-002: invalid regex"),
            Regex::new(r"(?:^|[=(,\s])(?P<lit>\{)[^{}]*\}\s*\.\s*(?P<method>append|push|length|size|forEach|containsKey|has)\s*\(")
                .expect("MAP-002: invalid regex"),
        ],
        exclusions: vec![],
        evidence: literal_method,
        suggested_fix: "Call a method that exists on the literal's type, or convert the value first",
    }
}

fn literal_method(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let (Some(literal), Some(method)) = (ctx.captures.name("lit"), ctx.captures.name("method"))
    else {
        return Ok(vec![]);
    };
    let literal = literal.as_str();
    let method = method.as_str();
    let kind = match literal.chars().next() {
        Some('"' | '\'') => "str",
        Some('[') => "list",
        Some('{') => "dict",
        _ if literal.contains('.') => "float",
        _ => "int",
    };
    if matches!(kind, "int" | "float") && NUMBER_METHODS.contains(&method) {
        return Ok(vec![]);
    }
    Ok(vec![format!("'{kind}' literal has no method '{method}'")])
}

fn map_003() -> PatternRule {
    PatternRule {
        id: "MAP-003",
        name: "Hardcoded large index",
        description: "Detects subscripts with a large literal index into a container that is not known to be that long",
        subtype: Subtype::StructureAccess,
        severity: Severity::Medium,
        confidence: 0.6,
        patterns: vec![
            Regex::new(r"\b([A-Za-z_]\w*)\s*\[\s*(-?\d[\d_]*)\s*\]").expect("MAP-003: invalid regex"),
        ],
        exclusions: vec![],
        evidence: large_index,
        suggested_fix: "Check len() before indexing, or iterate instead of using a fixed position",
    }
}

fn large_index(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let (Some(name), Some(literal)) = (ctx.capture(1), ctx.capture(2)) else {
        return Ok(vec![]);
    };
    let value: i128 = literal
        .replace('_', "")
        .parse()
        .map_err(|e| ctx.error(format!("index literal '{literal}' is not a valid integer: {e}")))?;
    let needed = if value < 0 {
        value.unsigned_abs()
    } else {
        value.unsigned_abs() + 1
    };
    if needed <= LARGE_INDEX || is_keyword_or_builtin(name) {
        return Ok(vec![]);
    }

    if let Some(value) = latest_binding(ctx, name).and_then(|b| b.value) {
        if is_mapping_literal(&value) {
            return Ok(vec![]);
        }
        if allocation_length(&value).is_some_and(|len| len >= needed) {
            return Ok(vec![]);
        }
    }
    Ok(vec![format!(
        "'{name}[{literal}]' assumes '{name}' holds at least {needed} elements"
    )])
}

fn is_mapping_literal(value: &str) -> bool {
    value.starts_with('{')
        || ["dict(", "defaultdict(", "Counter(", "OrderedDict("]
            .iter()
            .any(|ctor| value.contains(ctor))
}

fn allocation_length(value: &str) -> Option<u128> {
    let caps = ALLOCATION_LENGTH.captures(value)?;
    let digits = caps.iter().skip(1).flatten().next()?.as_str();
    digits.replace('_', "").parse().ok()
}

fn map_004() -> PatternRule {
    PatternRule {
        id: "MAP-004",
        name: "Unchecked dictionary key access",
        description: "Detects reads of a literal dictionary key with no membership check, default or KeyError handler",
        subtype: Subtype::StructureAccess,
        severity: Severity::Low,
        confidence: 0.5,
        patterns: vec![
            Regex::new(r#"\b([A-Za-z_]\w*)\s*\[\s*[rbuRBU]?(["'])([^"'\]]*)["']\s*\]"#)
                .expect("MAP-004: invalid regex"),
        ],
        exclusions: vec![],
        evidence: unchecked_key,
        suggested_fix: "Use dict.get() with a default, or check `key in mapping` first",
    }
}

fn unchecked_key(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let (Some(whole), Some(name), Some(quote), Some(key_span)) = (
        ctx.captures.get(0),
        ctx.capture(1),
        ctx.capture(2),
        ctx.captures.get(3),
    ) else {
        return Ok(vec![]);
    };
    // Offsets in the masked line match the raw line.
    let Some(key) = ctx.line.get(key_span.range()) else {
        return Ok(vec![]);
    };
    if key.is_empty() {
        return Ok(vec![]);
    }
    if let Some(assign) = assignment(ctx.code)
        && !assign.augmented
        && whole.start() < assign.value_offset
    {
        return Ok(vec![]);
    }

    if ctx.scan.handles_key_error
        || ctx.scan.key_is_checked(name, key)
        || ctx.scan.key_written_before(name, key, ctx.index)
    {
        return Ok(vec![]);
    }

    let quoted = [format!("\"{key}\""), format!("'{key}'")];
    if let Some(binding) = latest_binding(ctx, name) {
        let text = statement_text(ctx.lines, binding.index);
        let in_literal = quoted.iter().any(|q| {
            text.match_indices(q.as_str())
                .any(|(pos, _)| text[pos + q.len()..].trim_start().starts_with(':'))
        });
        if in_literal || text.contains(&format!("{key}=")) {
            return Ok(vec![]);
        }
    }

    Ok(vec![format!(
        "'{name}[{quote}{key}{quote}]' is read without checking that the key exists"
    )])
}

fn map_005() -> PatternRule {
    PatternRule {
        id: "MAP-005",
        name: "Attribute access on None",
        description: "Detects attribute access on a variable whose latest assignment is None with no None check in between",
        subtype: Subtype::StructureAccess,
        severity: Severity::High,
        confidence: 0.7,
        patterns: vec![
            Regex::new(r"\b([A-Za-z_]\w*)\s*\.\s*([A-Za-z_]\w*)").expect("MAP-005: invalid regex"),
        ],
        exclusions: vec![],
        evidence: attribute_on_none,
        suggested_fix: "Assign a real object before use, or guard the access with `if value is not None`",
    }
}

fn attribute_on_none(ctx: &RuleContext<'_>) -> Result<Vec<String>, RuleError> {
    let (Some(whole), Some(name), Some(attr)) =
        (ctx.captures.get(0), ctx.capture(1), ctx.capture(2))
    else {
        return Ok(vec![]);
    };
    if matches!(name, "self" | "cls") || is_keyword_or_builtin(name) {
        return Ok(vec![]);
    }
    let scan = ctx.scan;
    if ctx.code[..whole.start()].trim_end().ends_with('.') || scan.is_guarded_at(name, ctx.index) {
        return Ok(vec![]);
    }

    let Some(k) = scan.latest_binding(name, ctx.index) else {
        return Ok(vec![]);
    };
    if scan.latest_guard(name, ctx.index).is_some_and(|guard| guard >= k)
        || assigned_value(&scan.code[k]) != Some("None")
    {
        return Ok(vec![]);
    }
    // A module-level None is usually replaced inside some function.
    if scan.in_function[ctx.index] && !scan.in_function[k] && scan.bound_to_value(name) {
        return Ok(vec![]);
    }
    Ok(vec![format!(
        "'{name}' is set to None on line {} and '{name}.{attr}' is accessed without a None check",
        k + 1
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scan_rule;

    #[test]
    fn test_map_001_detects_number_plus_string() {
        let test_cases = vec![
            ("x = 5 + \"text\"", true),
            ("label = 'total: ' + 42", true),
            ("msg = 3.5 + f\"{x}\"", true),
            ("x = str(5) + \"text\"", false),
            ("x = 5 + 3", false),
            ("s = \"a\" + \"b\"", false),
            ("s = \"a\" + str(n)", false),
        ];
        for (input, should_match) in test_cases {
            let scan = scan_rule(map_001(), input);
            assert_eq!(!scan.matches.is_empty(), should_match, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_map_001_follows_numeric_variables() {
        let code = "count = 10\nprint(\"Count: \" + count)\n";
        let scan = scan_rule(map_001(), code);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].location.start_line, 2);
        assert!(scan.matches[0].evidence[0].contains("line 1"));

        let code = "name = input()\nprint(\"Hello \" + name)\n";
        assert!(scan_rule(map_001(), code).matches.is_empty());
    }

    #[test]
    fn test_map_001_category_shape() {
        let scan = scan_rule(map_001(), "x = 5 + \"text\"\n");
        let category = &scan.categories[0];
        assert_eq!(category.subtype, Subtype::DataCompliance);
        assert!(category.confidence >= 0.8);
        assert_eq!(category.first_line(), Some(1));
    }

    #[test]
    fn test_map_002_detects_missing_literal_methods() {
        let test_cases = vec![
            ("\"hello\".append(\"x\")", true),
            ("'abc'.push('d')", true),
            ("n = (5).upper()", true),
            ("v = [1, 2].push(3)", true),
            ("\", \".join(items)", false),
            ("'abc'.upper()", false),
            ("(255).to_bytes(2, 'big')", false),
            ("print(5).bit_length()", false),
            ("data[0].push(1)", false),
        ];
        for (input, should_match) in test_cases {
            let scan = scan_rule(map_002(), input);
            assert_eq!(!scan.matches.is_empty(), should_match, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_map_003_detects_large_index() {
        let scan = scan_rule(map_003(), "items = load()\nfirst = items[1000]\n");
        assert_eq!(scan.matches.len(), 1);
        assert!(scan.matches[0].evidence[0].contains("1001"));
    }

    #[test]
    fn test_map_003_ignores_small_index_and_sized_containers() {
        assert!(scan_rule(map_003(), "x = items[5]\n").matches.is_empty());
        assert!(scan_rule(map_003(), "buf = [0] * 4096\nbuf[1000] = 1\n").matches.is_empty());
        assert!(scan_rule(map_003(), "cache = {}\ncache[500] = 1\n").matches.is_empty());
    }

    #[test]
    fn test_map_003_rejects_unparseable_literal() {
        let code = format!("x = items[{}]\n", "9".repeat(60));
        let scan = scan_rule(map_003(), &code);
        assert!(scan.matches.is_empty());
        assert_eq!(scan.rule_errors.len(), 1);
        assert!(scan.confidence < 1.0);
    }

    #[test]
    fn test_map_004_detects_unchecked_key() {
        let scan = scan_rule(map_004(), "config = load()\ntimeout = config[\"timeout\"]\n");
        assert_eq!(scan.matches.len(), 1);
        assert!(scan.matches[0].evidence[0].contains("config[\"timeout\"]"));
    }

    #[test]
    fn test_map_004_respects_checks() {
        let guarded = [
            "config = load()\nif \"timeout\" in config:\n    t = config[\"timeout\"]\n",
            "config = {\"timeout\": 5}\nt = config[\"timeout\"]\n",
            "config = load()\nconfig['timeout'] = 3\nt = config['timeout']\n",
            "try:\n    t = config['timeout']\nexcept KeyError:\n    t = 1\n",
            "config = load()\nconfig[\"timeout\"] = 1\n",
        ];
        for code in guarded {
            assert!(scan_rule(map_004(), code).matches.is_empty(), "Failed for: {code}");
        }
    }

    #[test]
    fn test_map_005_detects_attribute_on_none() {
        let code = "conn = None\nconn.execute(\"SELECT 1\")\n";
        let scan = scan_rule(map_005(), code);
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].location.start_line, 2);
        assert!(scan.matches[0].evidence[0].contains("line 1"));
    }

    #[test]
    fn test_map_005_respects_guards_and_reassignment() {
        let safe = [
            "conn = None\nif conn is not None:\n    conn.close()\n",
            "conn = None\nconn = connect()\nconn.close()\n",
            "conn = None\ntry:\n    conn = connect()\nfinally:\n    conn.close()\n",
            "node = None\nvalue = node.val if node else 0\n",
            "_client = None\ndef get():\n    return _client.fetch()\ndef init():\n    global _client\n    _client = Client()\n",
        ];
        for code in safe {
            assert!(scan_rule(map_005(), code).matches.is_empty(), "Failed for: {code}");
        }
    }

    #[test]
    fn test_map_005_guard_must_be_a_whole_word() {
        let code = "conn = None\nif conn.closed:\n    pass\n";
        assert_eq!(scan_rule(map_005(), code).matches.len(), 1);
    }
}
