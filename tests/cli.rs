//! Command-line argument handling for the testops binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn testops() -> Command {
    let mut cmd = Command::cargo_bin("testops").expect("binary should build");
    cmd.env_remove("TESTOPS_PROJECT")
        .env_remove("TESTOPS_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    testops()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("env"))
        .stdout(predicate::str::contains("milestone"))
        .stdout(predicate::str::contains("field"))
        .stdout(predicate::str::contains("filter"));
}

#[test]
fn test_upload_requires_id_or_title() {
    testops()
        .args(["upload", "--path", "report.xml", "--format", "junit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_upload_rejects_id_with_title() {
    testops()
        .args([
            "upload", "--path", "report.xml", "--format", "junit", "--id", "3", "--title", "Nightly",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_run_attributes_need_title() {
    testops()
        .args([
            "upload", "--path", "report.xml", "--format", "junit", "--id", "3", "--milestone", "M1",
        ])
        .assert()
        .failure();
}

#[test]
fn test_upload_without_project_fails_before_network() {
    let dir = tempfile::tempdir().unwrap();
    testops()
        .current_dir(dir.path())
        .args(["upload", "--path", "report.xml", "--format", "junit", "--id", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No project given"));
}

#[test]
fn test_unknown_format_is_rejected() {
    testops()
        .args(["parse", "--path", "report.xml", "--format", "trx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_parse_prints_canonical_json() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.xml");
    std::fs::write(
        &report,
        r#"<testsuite name="unit">
  <testcase name="adds" classname="Math" time="0.5"/>
  <testcase name="divides" classname="Math"><failure message="boom">division by zero</failure></testcase>
</testsuite>"#,
    )
    .unwrap();

    let output = testops()
        .current_dir(dir.path())
        .args(["parse", "--format", "junit", "--path"])
        .arg(&report)
        .output()
        .unwrap();
    assert!(output.status.success());

    let results: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["title"], "adds");
    assert_eq!(results[1]["execution"]["status"], "failed");
}

#[test]
fn test_validate_reports_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("testops.toml");
    std::fs::write(&config, "[upload]\nbatch_size = \"many\"\n").unwrap();

    testops()
        .arg("--config")
        .arg(&config)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_validate_prints_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("testops.toml");
    std::fs::write(&config, "[api]\nproject = \"PRJ\"\n").unwrap();

    testops()
        .arg("--config")
        .arg(&config)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Project:    PRJ"))
        .stdout(predicate::str::contains("Batch size: 200"));
}

#[test]
fn test_run_create_requires_title() {
    testops()
        .args(["run", "create", "--project", "PRJ", "--token", "t"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--title"));
}

#[test]
fn test_run_delete_requires_ids_or_all() {
    testops()
        .args(["run", "delete", "--project", "PRJ", "--token", "t"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_run_delete_rejects_ids_with_all() {
    testops()
        .args(["run", "delete", "--ids", "1,2", "--all"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_run_delete_date_range_needs_all() {
    testops()
        .args(["run", "delete", "--ids", "1", "--start", "2024-01-02"])
        .assert()
        .failure();
}

#[test]
fn test_run_delete_rejects_bad_date() {
    testops()
        .args(["run", "delete", "--all", "--end", "31/12/2024"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));
}

#[test]
fn test_field_delete_requires_id_or_all() {
    testops()
        .args(["field", "custom", "delete", "--token", "t"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_filter_rejects_unknown_framework() {
    testops()
        .args(["filter", "--plan-id", "4", "--framework", "cypress"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_milestone_rejects_bad_status() {
    testops()
        .args(["milestone", "create", "--title", "Release 2", "--status", "open"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_milestone_rejects_bad_due_date() {
    testops()
        .args(["milestone", "create", "--title", "Release 2", "--due-date", "tomorrow"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));
}

#[test]
fn test_env_slug_with_spaces_fails_before_network() {
    let dir = tempfile::tempdir().unwrap();
    testops()
        .current_dir(dir.path())
        .args([
            "env", "create", "--title", "Staging", "--slug", "my env", "--project", "PRJ",
            "--token", "t",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("contain no spaces"));
    assert!(!dir.path().join("qase.env").exists());
}

#[test]
fn test_filter_without_project_fails() {
    let dir = tempfile::tempdir().unwrap();
    testops()
        .current_dir(dir.path())
        .args(["filter", "--plan-id", "4", "--framework", "playwright", "--token", "t"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No project given"));
}
