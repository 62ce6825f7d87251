//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn knitbench() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("knitbench").unwrap()
}

/// A command isolated from any config on the host machine.
fn isolated(dir: &TempDir) -> Command {
    let mut cmd = knitbench();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("KNITBENCH_GEMINI_KEY")
        .env_remove("KNITBENCH_OPENAI_KEY");
    cmd
}

#[test]
fn help_output() {
    knitbench()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compute-normalized Elo"));
}

#[test]
fn version_output() {
    knitbench()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("knitbench"));
}

#[test]
fn list_cases_names_every_kind() {
    knitbench()
        .arg("list-cases")
        .assert()
        .success()
        .stdout(predicate::str::contains("math-qa"))
        .stdout(predicate::str::contains("sudoku-validation"))
        .stdout(predicate::str::contains("long-context-wiki-book"));
}

#[test]
fn validate_builtin_bank() {
    knitbench()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Bank:"));
}

#[test]
fn validate_reports_duplicate_ids() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bank.toml");
    std::fs::write(
        &path,
        r#"
[bank]
id = "dupes"

[[mmlu]]
id = "q1"
question = "What is the capital of France?"
options = ["Paris", "Rome", "Berlin", "Madrid"]
answer = 0

[[mmlu]]
id = "q1"
question = "Which planet is largest?"
options = ["Mars", "Jupiter", "Venus", "Mercury"]
answer = 1
"#,
    )
    .unwrap();

    knitbench()
        .arg("validate")
        .arg("--bank")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("dupes"))
        .stdout(predicate::str::contains("WARNING"));
}

#[test]
fn validate_nonexistent_file() {
    knitbench()
        .arg("validate")
        .arg("--bank")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_config() {
    let dir = TempDir::new().unwrap();

    isolated(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created knitbench.toml"));

    assert!(dir.path().join("knitbench.toml").exists());
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    isolated(&dir).arg("init").assert().success();

    isolated(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn run_with_mock_provider_writes_reports() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("results");

    isolated(&dir)
        .args([
            "run",
            "--model",
            "mock/mock-model",
            "--kinds",
            "math-qa,chess-memory",
            "--cases-per-kind",
            "2",
            "--request-delay-ms",
            "0",
            "--format",
            "all",
        ])
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Final Elo Score"))
        .stderr(predicate::str::contains("math-qa-1"));

    let files: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert!(files.iter().any(|f| f.ends_with(".json")));
    assert!(files.iter().any(|f| f.ends_with(".html")));
}

#[test]
fn run_with_configured_mock_provider() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(
        &config,
        r#"
default_provider = "offline"
default_model = "scripted"
request_delay_ms = 0

[providers.offline]
type = "mock"
response = "The piece is a white knight."

[suite]
seed = 3
"#,
    )
    .unwrap();

    isolated(&dir)
        .args(["run", "--kinds", "chess-memory", "--config"])
        .arg(&config)
        .arg("--output")
        .arg(dir.path().join("out"))
        .assert()
        .success()
        .stderr(predicate::str::contains("offline/scripted"));
}

#[test]
fn run_with_unknown_provider_fails() {
    let dir = TempDir::new().unwrap();

    isolated(&dir)
        .args(["run", "--model", "nowhere/model", "--kinds", "math-qa"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("provider 'nowhere' not found"));
}

#[test]
fn run_with_unknown_kind_fails() {
    let dir = TempDir::new().unwrap();

    isolated(&dir)
        .args(["run", "--model", "mock/m", "--kinds", "poetry"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("poetry"));
}

#[test]
fn compare_nonexistent_report() {
    knitbench()
        .arg("compare")
        .arg("--baseline")
        .arg("no_such_file.json")
        .arg("--current")
        .arg("also_no_file.json")
        .assert()
        .failure();
}

#[test]
fn review_nonexistent_report() {
    knitbench()
        .args(["review", "--report", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read report"));
}
