use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn sluice(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sluice"));
    cmd.arg("--project-dir").arg(dir).env("RUST_LOG", "warn");
    cmd
}

fn initialized() -> Result<TempDir> {
    let tmp = tempfile::tempdir()?;
    sluice(tmp.path()).arg("init").assert().success();
    Ok(tmp)
}

#[test]
fn test_init_writes_config_and_registry() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    sluice(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("reference schedules"));

    assert!(tmp.path().join("sluice.yaml").exists());
    let registry = std::fs::read_to_string(tmp.path().join("schedules.yaml"))?;
    assert!(registry.contains("library_daily_sync"));
    assert!(registry.contains("library_weekly_cleanup"));

    // Second run leaves the files alone.
    sluice(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn test_status_lists_reference_schedules() -> Result<()> {
    let tmp = initialized()?;
    sluice(tmp.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("library_daily_sync"))
        .stdout(predicate::str::contains("library_weekly_cleanup"));
    Ok(())
}

#[test]
fn test_run_unknown_pipeline_fails() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    sluice(tmp.path())
        .args(["run", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not registered"));
    Ok(())
}

#[test]
fn test_disable_then_status_shows_disabled() -> Result<()> {
    let tmp = initialized()?;
    sluice(tmp.path())
        .args(["disable", "library_weekly_cleanup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("disabled"));

    let registry = std::fs::read_to_string(tmp.path().join("schedules.yaml"))?;
    assert!(registry.contains("enabled: false"));

    sluice(tmp.path())
        .args(["enable", "nope"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_alerts_on_empty_store() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    sluice(tmp.path())
        .arg("alerts")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active alerts"));

    sluice(tmp.path())
        .args(["ack", "does-not-exist"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_report_json_on_empty_store() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let output = sluice(tmp.path())
        .args(["report", "--json", "--days", "3"])
        .output()?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["summary"]["overall_quality_score"], 1.0);
    assert_eq!(report["period_days"], 3);
    Ok(())
}

#[test]
fn test_health_of_unseen_pipeline_is_neutral() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    sluice(tmp.path())
        .args(["health", "library_daily_sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.000"));
    Ok(())
}
