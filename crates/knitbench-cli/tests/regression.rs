//! Regression detection integration tests.
//!
//! Builds run reports through the library, saves them as JSON and drives
//! the `compare` and `review` commands against them.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use knitbench_core::bank::QuestionBank;
use knitbench_core::cases::SuiteContext;
use knitbench_core::marker::{Marker, MarkerConfig};
use knitbench_core::model::CaseKind;
use knitbench_core::report::RunReport;
use knitbench_core::results::VerificationResult;
use knitbench_core::suite::build_suite;

fn knitbench() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("knitbench").unwrap()
}

/// A report in which every question of a kind in `correct_kinds` passed and
/// everything else failed.
fn make_report(model: &str, correct_kinds: &[CaseKind]) -> RunReport {
    let ctx = SuiteContext::new(QuestionBank::builtin().unwrap())
        .with_seed(21)
        .with_cases_per_kind(3);
    let suite = build_suite(
        &[CaseKind::MathQa, CaseKind::ChessMemory, CaseKind::NRulesVector],
        &ctx,
    )
    .unwrap();

    let mut marker = Marker::new(MarkerConfig::default()).unwrap();
    for q in &suite.questions {
        let result = if correct_kinds.contains(&q.kind) {
            VerificationResult::pass()
        } else {
            VerificationResult::fail("wrong")
        };
        marker.add_result(q, "answer", result).unwrap();
    }
    RunReport::from_marker(&marker, model, "mock", 0, 100)
}

fn write(dir: &TempDir, name: &str, report: &RunReport) -> std::path::PathBuf {
    let path = dir.path().join(name);
    report.save_json(&path).unwrap();
    path
}

#[test]
fn compare_flags_regressed_kind() {
    let dir = TempDir::new().unwrap();
    let baseline = write(
        &dir,
        "baseline.json",
        &make_report("old", &[CaseKind::MathQa, CaseKind::ChessMemory]),
    );
    let current = write(&dir, "current.json", &make_report("new", &[CaseKind::MathQa]));

    knitbench()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 regressions"))
        .stdout(predicate::str::contains("chess-memory"));
}

#[test]
fn fail_on_regression_sets_exit_code() {
    let dir = TempDir::new().unwrap();
    let baseline = write(&dir, "baseline.json", &make_report("old", &[CaseKind::NRulesVector]));
    let current = write(&dir, "current.json", &make_report("new", &[]));

    knitbench()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .arg("--fail-on-regression")
        .assert()
        .code(1);
}

#[test]
fn improvement_is_not_a_failure() {
    let dir = TempDir::new().unwrap();
    let baseline = write(&dir, "baseline.json", &make_report("old", &[]));
    let current = write(&dir, "current.json", &make_report("new", &[CaseKind::MathQa]));

    knitbench()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .arg("--fail-on-regression")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 improvements"));
}

#[test]
fn compare_json_output_parses() {
    let dir = TempDir::new().unwrap();
    let baseline = write(&dir, "baseline.json", &make_report("old", &[CaseKind::MathQa]));
    let current = write(&dir, "current.json", &make_report("new", &[CaseKind::ChessMemory]));

    let output = knitbench()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["baseline_model"], "old");
    assert_eq!(value["kinds"].as_array().unwrap().len(), 3);
}

#[test]
fn compare_markdown_has_table() {
    let dir = TempDir::new().unwrap();
    let report = make_report("same", &[CaseKind::MathQa]);
    let baseline = write(&dir, "baseline.json", &report);
    let current = write(&dir, "current.json", &report);

    knitbench()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .args(["--format", "markdown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("| Kind |"))
        .stdout(predicate::str::contains("(+0.0)"));
}

#[test]
fn review_writes_html_next_to_report() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "run.json", &make_report("m", &[CaseKind::MathQa]));

    knitbench()
        .arg("review")
        .arg("--report")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Review page"));

    let html = std::fs::read_to_string(dir.path().join("run.html")).unwrap();
    assert!(html.contains("math-qa-0"));
}
