//! Pathological inputs must not make the line scanners backtrack.
//!
//! Every line of submitted code is matched against the rule catalog and the
//! safety gate's import and call patterns, so adversarial lines are checked
//! here against a fixed time budget. Whole files near the size limit get a
//! budget of their own.

use halluscan::sandbox::MAX_CODE_LENGTH;
use halluscan::{PatternMatcher, SafetyAssessor, StructureAnalyzer};
use std::time::{Duration, Instant};

/// Generous enough for unoptimized CI builds, far below what exponential
/// backtracking would take.
const MAX_ACCEPTABLE_TIME: Duration = Duration::from_millis(500);

fn assert_fast(label: &str, code: &str) {
    let matcher = PatternMatcher::new();
    let assessor = SafetyAssessor::new();

    let start = Instant::now();
    let _scan = matcher.detect_patterns(code);
    let _assessment = assessor.validate_safety(code);
    let elapsed = start.elapsed();

    assert!(
        elapsed < MAX_ACCEPTABLE_TIME,
        "{label}: took {:?}, expected < {:?}",
        elapsed,
        MAX_ACCEPTABLE_TIME
    );
}

#[test]
fn test_redos_long_string_concatenation() {
    // MAP-001: number followed by many `+` operands
    let code = format!("x = 5 {}\"text\"\n", "+ 1 ".repeat(2000));
    assert_fast("concatenation", &code);
}

#[test]
fn test_redos_nested_subscripts() {
    // MAP-003/MAP-004: many chained subscripts on one line
    let code = format!("value = data{}\n", "[\"k\"][0]".repeat(1000));
    assert_fast("subscripts", &code);
}

#[test]
fn test_redos_unterminated_literal_call() {
    // MAP-002: list literal that never closes before a method call
    let code = format!("items = [{}.append(1)\n", "1, ".repeat(3000));
    assert_fast("literal call", &code);
}

#[test]
fn test_redos_long_import_list() {
    let names: Vec<String> = (0..2000).map(|i| format!("mod_{i}")).collect();
    let code = format!("import {}\n", names.join(", "));
    assert_fast("import list", &code);
}

#[test]
fn test_redos_many_open_calls() {
    let code = "open(".repeat(300) + "'f'" + &")".repeat(300) + "\n";
    assert_fast("open calls", &code);
}

#[test]
fn test_redos_deep_indentation() {
    let mut code = String::new();
    for depth in 0..200 {
        code.push_str(&"    ".repeat(depth));
        code.push_str("if x:\n");
    }
    code.push_str(&"    ".repeat(200));
    code.push_str("pass\n");
    assert_fast("indentation", &code);
}

#[test]
fn test_structure_analysis_of_long_line() {
    let code = format!("total = {}\n", "a + ".repeat(5000) + "a");
    let start = Instant::now();
    let structure = StructureAnalyzer::new().analyze(&code);
    assert!(start.elapsed() < MAX_ACCEPTABLE_TIME);
    assert_eq!(structure.lines_of_code, 1);
}

/// Whole-file budget. A scan that revisits earlier lines for every match
/// needs minutes at this size.
const MAX_FILE_SCAN_TIME: Duration = Duration::from_secs(10);

/// Repeats `unit` until the code is just under the accepted input size.
fn file_of(unit: &str) -> String {
    unit.repeat((MAX_CODE_LENGTH - 1) / unit.len())
}

fn assert_file_scan_fast(label: &str, code: &str) {
    let start = Instant::now();
    let scan = PatternMatcher::new().detect_patterns(code);
    let _assessment = SafetyAssessor::new().validate_safety(code);
    let elapsed = start.elapsed();

    assert!(
        elapsed < MAX_FILE_SCAN_TIME,
        "{label}: {} lines took {:?}, expected < {:?}",
        code.lines().count(),
        elapsed,
        MAX_FILE_SCAN_TIME
    );
    assert!(scan.rule_errors.is_empty(), "{label}: {:?}", scan.rule_errors);
}

#[test]
fn test_file_of_attribute_reads() {
    // MAP-005 and NAM-001 look up `obj` on every line
    let code = file_of("val = obj.attr\n");
    assert!(code.len() < MAX_CODE_LENGTH);
    assert_file_scan_fast("attribute reads", &code);
}

#[test]
fn test_file_of_undefined_name_reads() {
    let code = file_of("print(total)\n");
    let start = Instant::now();
    let scan = PatternMatcher::new().detect_patterns(&code);
    assert!(start.elapsed() < MAX_FILE_SCAN_TIME, "took {:?}", start.elapsed());
    let undefined = scan.matches.iter().filter(|m| m.rule_id == "NAM-001").count();
    assert_eq!(undefined, code.lines().count());
}

#[test]
fn test_file_of_small_functions() {
    // LOG-003/LOG-004 inspect the lines around every def and return
    assert_file_scan_fast("functions", &file_of("def f():\n    return 1\n"));
}

#[test]
fn test_file_of_dictionary_reads() {
    assert_file_scan_fast("dictionary reads", &file_of("x = cfg[\"key\"]\n"));
}

#[test]
fn test_file_inside_one_function() {
    let body = file_of("    total = total + value\n");
    let code = format!("def main():\n{}", &body[..body.len() - 100]);
    assert_file_scan_fast("function body", &code);
}
