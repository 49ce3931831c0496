use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CLEAN_CODE: &str = r#"import math

def hypotenuse(a, b):
    return math.sqrt(a * a + b * b)

print("Result:", int(hypotenuse(3, 4)))
"#;

const LOOPING_CODE: &str = "total = 0\nwhile True:\n    total += 1\n";

fn cmd() -> assert_cmd::Command {
    cargo_bin_cmd!("halluscan")
}

fn write_source(dir: &Path, name: &str, code: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, code).unwrap();
    path
}

fn python_available() -> bool {
    let available = std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success());
    if !available {
        eprintln!("python3 not found on PATH; skipping execution test");
    }
    available
}

fn json_output(assert: &assert_cmd::assert::Assert) -> serde_json::Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("stdout is JSON")
}

mod terminal_output {
    use super::*;

    #[test]
    fn test_clean_code_passes() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "clean.py", CLEAN_CODE);

        cmd()
            .arg("--no-execution")
            .arg(&source)
            .assert()
            .success()
            .stdout(predicate::str::contains("No hallucinations found."))
            .stdout(predicate::str::contains("Result: PASS"));
    }

    #[test]
    fn test_unbounded_loop_fails_with_exit_code_1() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "loop.py", LOOPING_CODE);

        cmd()
            .arg(&source)
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::contains("[CRITICAL]"))
            .stdout(predicate::str::contains("RES-001"))
            .stdout(predicate::str::contains("while True:"))
            .stdout(predicate::str::contains("blocked by safety gate"))
            .stdout(predicate::str::contains("Result: FAIL"));
    }

    #[test]
    fn test_findings_are_labelled_with_file_and_line() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "mismatch.py", "x = 1\ny = 5 + \"text\"\n");

        cmd()
            .arg("--no-execution")
            .arg(&source)
            .assert()
            .success()
            .stdout(predicate::str::contains("mismatch.py:2:"))
            .stdout(predicate::str::contains("mapping/data_compliance"));
    }

    #[test]
    fn test_no_recommendations_flag() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "loop.py", LOOPING_CODE);

        cmd()
            .args(["--no-recommendations", "--no-execution"])
            .arg(&source)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Recommendations:").not());
    }
}

mod json_output {
    use super::*;

    #[test]
    fn test_json_report_shape() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "loop.py", LOOPING_CODE);

        let assert = cmd()
            .args(["--format", "json", "--no-execution"])
            .arg(&source)
            .assert()
            .code(1);
        let report = json_output(&assert);

        assert_eq!(report["hasCriticalIssues"], true);
        assert_eq!(report["detectionMetadata"]["language"], "python");
        assert_eq!(report["detectionMetadata"]["executionVerified"], false);
        assert_eq!(report["summary"]["overallRisk"], "critical");
        let categories = report["categories"].as_array().unwrap();
        assert!(categories.iter().any(|c| {
            c["type"] == "resource" && c["subtype"] == "computational_boundary"
        }));
        assert!(report.get("executionResult").is_none());
    }

    #[test]
    fn test_reads_code_from_stdin() {
        let assert = cmd()
            .args(["--format", "json", "--no-execution", "-"])
            .write_stdin("x = 5 + \"text\"\n")
            .assert()
            .success();
        let report = json_output(&assert);

        let category = report["categories"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["subtype"] == "data_compliance")
            .expect("data compliance category");
        assert_eq!(category["type"], "mapping");
        assert_eq!(category["lineNumbers"][0], 1);
        assert!(category["confidence"].as_f64().unwrap() >= 0.8);
    }

    #[test]
    fn test_confidence_threshold_flag() {
        let dir = TempDir::new().unwrap();
        let source = write_source(
            dir.path(),
            "mixed.py",
            "x = 5 + \"text\"\ndata = {}\nprint(data[\"missing\"])\n",
        );

        let assert = cmd()
            .args(["--format", "json", "--no-execution", "--confidence-threshold", "0.9"])
            .arg(&source)
            .assert();
        let report = json_output(&assert);
        for category in report["categories"].as_array().unwrap() {
            assert!(category["confidence"].as_f64().unwrap() >= 0.9);
        }
    }

    #[test]
    fn test_focus_flag_limits_types() {
        let dir = TempDir::new().unwrap();
        let source = write_source(
            dir.path(),
            "mixed.py",
            "x = 5 + \"text\"\nwhile True:\n    pass\n",
        );

        let assert = cmd()
            .args(["--format", "json", "--no-execution", "--focus", "mapping"])
            .arg(&source)
            .assert()
            .success();
        let report = json_output(&assert);
        let categories = report["categories"].as_array().unwrap();
        assert!(!categories.is_empty());
        assert!(categories.iter().all(|c| c["type"] == "mapping"));
    }

    #[test]
    fn test_output_file() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "clean.py", CLEAN_CODE);
        let report_path = dir.path().join("report.json");

        cmd()
            .args(["--format", "json", "--no-execution", "--output"])
            .arg(&report_path)
            .arg(&source)
            .assert()
            .success()
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("Report written to"));

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(report["hasCriticalIssues"], false);
    }
}

mod configuration {
    use super::*;

    #[test]
    fn test_project_config_is_discovered() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".halluscan.yaml"),
            "detection:\n  focusCategories: [logic]\n  enableExecutionAnalysis: false\n",
        )
        .unwrap();
        let source = write_source(dir.path(), "loop.py", LOOPING_CODE);

        cmd()
            .arg(&source)
            .assert()
            .success()
            .stdout(predicate::str::contains("RES-001").not())
            .stdout(predicate::str::contains("Result: PASS"));
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("halluscan.toml");
        fs::write(&config, "[detection]\nenableExecutionAnalysis = false\n").unwrap();
        let source = write_source(dir.path(), "clean.py", CLEAN_CODE);

        cmd()
            .arg("--config")
            .arg(&config)
            .arg(&source)
            .assert()
            .success()
            .stdout(predicate::str::contains("Execution: skipped"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("halluscan.json");
        fs::write(&config, r#"{"detection": {"confidenceThreshold": 2.0}}"#).unwrap();
        let source = write_source(dir.path(), "clean.py", CLEAN_CODE);

        cmd()
            .arg("--config")
            .arg(&config)
            .arg(&source)
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("error:"));
    }
}

mod errors {
    use super::*;

    #[test]
    fn test_empty_code_exits_2() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "empty.py", "");

        cmd()
            .arg(&source)
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("Code must not be empty"));
    }

    #[test]
    fn test_unsupported_language_exits_2() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "main.rb", "puts 1\n");

        cmd()
            .args(["--language", "ruby"])
            .arg(&source)
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("Unsupported language: ruby"));
    }

    #[test]
    fn test_missing_file_exits_2() {
        let dir = TempDir::new().unwrap();

        cmd()
            .arg(dir.path().join("missing.py"))
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("missing.py"));
    }

    #[test]
    fn test_threshold_out_of_range_exits_2() {
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "clean.py", CLEAN_CODE);

        cmd()
            .args(["--confidence-threshold", "1.5"])
            .arg(&source)
            .assert()
            .failure()
            .code(2);
    }

    #[test]
    fn test_unknown_focus_is_rejected_by_parser() {
        cmd().args(["--focus", "security", "a.py"]).assert().failure().code(2);
    }
}

mod execution {
    use super::*;

    #[test]
    fn test_clean_code_is_verified_by_execution() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "clean.py", CLEAN_CODE);

        let assert = cmd()
            .args(["--format", "json"])
            .arg(&source)
            .assert()
            .success();
        let report = json_output(&assert);
        assert_eq!(report["detectionMetadata"]["executionVerified"], true);
        assert_eq!(report["executionResult"]["success"], true);
        assert!(
            report["executionResult"]["output"]
                .as_str()
                .unwrap()
                .contains("Result: 5")
        );
    }

    #[test]
    fn test_runtime_error_is_reported() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "divide.py", "total = 10\nprint(total / 0)\n");

        let assert = cmd()
            .args(["--format", "json", "--no-patterns"])
            .arg(&source)
            .assert();
        let report = json_output(&assert);
        let errors = report["executionResult"]["errors"].as_array().unwrap();
        assert_eq!(errors[0]["type"], "ZeroDivisionError");
        assert_eq!(errors[0]["lineNumber"], 2);
        let categories = report["categories"].as_array().unwrap();
        assert!(categories.iter().any(|c| c["detectionMethod"] == "execution"));
    }

    #[test]
    fn test_timeout_flag_kills_slow_code() {
        if !python_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let source = write_source(dir.path(), "slow.py", "import time\ntime.sleep(10)\n");

        let started = std::time::Instant::now();
        let assert = cmd()
            .args(["--format", "json", "--timeout-ms", "500"])
            .arg(&source)
            .assert()
            .code(1);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        let report = json_output(&assert);
        assert_eq!(report["executionResult"]["timedOut"], true);
    }
}
