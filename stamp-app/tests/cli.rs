use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data/title_block.dxf");
    path
}

fn dxfstamp() -> Command {
    let mut cmd = Command::cargo_bin("dxfstamp").expect("找不到 dxfstamp 可执行文件");
    cmd.env_remove("DXFSTAMP_CONFIG").env("RUST_LOG", "warn");
    cmd
}

#[test]
fn inspect_prints_json_summary() {
    dxfstamp()
        .arg("inspect")
        .arg(fixture())
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ssp_ARCH_24x36\""))
        .stdout(predicate::str::contains("\"master\""));
}

#[test]
fn apply_writes_modified_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plan.dxf");
    fs::copy(fixture(), &input).unwrap();
    let output = dir.path().join("out");

    dxfstamp()
        .arg("apply")
        .arg(&input)
        .args(["-s", "JOB_LOC1=NEW-SITE-7", "--sequential", "-o"])
        .arg(&output)
        .assert()
        .success();

    let written = fs::read_to_string(output.join("modified_plan.dxf")).unwrap();
    assert!(written.contains("\nNEW-SITE-7\n"));
}

#[test]
fn apply_without_matches_reports_no_modifications() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("plan.dxf");
    fs::copy(fixture(), &input).unwrap();

    dxfstamp()
        .arg("apply")
        .arg(&input)
        .args(["--block", "OTHER_BLOCK", "-s", "JOB_LOC1=X", "-o"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No modifications made to any file"));
    assert!(!dir.path().join("modified_plan.dxf").exists());
}

#[test]
fn malformed_field_is_rejected() {
    dxfstamp()
        .arg("apply")
        .arg(fixture())
        .args(["-s", "JOB_LOC1"])
        .assert()
        .failure();
}

#[test]
fn missing_input_fails_with_status_one() {
    dxfstamp()
        .args(["inspect", "does-not-exist.dxf"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does-not-exist.dxf"));
}

#[test]
fn apply_fails_when_every_input_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("corrupt.dxf");
    fs::write(&input, "0\nSECTION\n").unwrap();

    dxfstamp()
        .arg("apply")
        .arg(&input)
        .args(["-s", "JOB_LOC1=X", "-o"])
        .arg(dir.path().join("out"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("未能处理 corrupt.dxf"))
        .stderr(predicate::str::contains("全部未能处理"));
}

#[test]
fn unreadable_config_is_reported_after_logging_starts() {
    let dir = tempfile::tempdir().unwrap();
    dxfstamp()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("inspect")
        .arg(fixture())
        .assert()
        .success()
        .stderr(predicate::str::contains("加载配置失败，使用内建默认值"))
        .stderr(predicate::str::contains("missing.toml"));
}
