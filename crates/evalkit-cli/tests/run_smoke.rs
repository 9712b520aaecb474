use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_config(dir: &Path, output_target: &str) -> PathBuf {
    let data = dir.join("preds.csv");
    fs::write(&data, "y_true,y_pred\n1,1\n0,0\n0,1\n1,1\n1,1\n").unwrap();
    let config = format!(
        r#"
_target_: runner.evaluation
title: smoke
ingestor:
  _target_: ingestor.csv
  path: '{data}'
outputs:
  holdout:
    _target_: {output_target}
exporters:
  - _target_: exporter.metrics_json
    path: '{metrics}'
  - _target_: reporter.html
    path: '{html}'
"#,
        data = data.to_string_lossy(),
        metrics = dir.join("out").join("metrics.json").to_string_lossy(),
        html = dir.join("out").join("report.html").to_string_lossy(),
    );
    let path = dir.join("run.yaml");
    fs::write(&path, config).unwrap();
    path
}

#[test]
fn run_writes_metrics_and_report() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "output.accuracy");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evalkit"));
    let output = cmd
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("metrics.json"));
    assert!(text.contains("report.html"));

    let metrics: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("out").join("metrics.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metrics["metrics"]["holdout"]["count_correct"], 4);
    assert_eq!(metrics["metrics"]["holdout"]["count"], 5);
    assert!(metrics["determinism_hash"].is_string());
}

#[test]
fn second_run_refuses_to_overwrite() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "output.accuracy");

    let mut first = Command::new(assert_cmd::cargo_bin!("evalkit"));
    first.arg("run").arg("--config").arg(&config).assert().success();

    let mut second = Command::new(assert_cmd::cargo_bin!("evalkit"));
    let output = second
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(6)
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("already exists"));
}

#[test]
fn validate_rejects_unknown_target() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "output.auc");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evalkit"));
    let output = cmd
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("unknown target 'output.auc'"));
    assert!(!temp.path().join("out").exists());
}

#[test]
fn validate_accepts_good_config_without_running() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "output.binary_classification");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evalkit"));
    cmd.args(["--log-format", "json", "validate", "--config"])
        .arg(&config)
        .assert()
        .success();
    assert!(!temp.path().join("out").exists());
}
