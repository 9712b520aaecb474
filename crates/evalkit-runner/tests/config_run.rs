use evalkit_core::json::verify_envelope;
use evalkit_core::ErrorKind;
use evalkit_runner::{load_runner, Registry};
use std::fs;
use std::path::Path;

const PREDICTIONS: &str = "\
label,pred,score
1,1,0.9
0,0,0.1
0,0,0.3
1,1,0.8
1,1,0.7
";

fn write_config(dir: &Path, exist_ok: bool) -> std::path::PathBuf {
    let data = dir.join("preds.csv");
    fs::write(&data, PREDICTIONS).unwrap();
    let out = dir.join("out");
    let config = format!(
        "_target_: runner.evaluation
title: Holdout
ingestor:
  _target_: ingestor.csv
  path: '{data}'
transformers:
  - _target_: transformer.cast
    columns:
      label: int
      pred: int
outputs:
  labels:
    _target_: output.pair
    y_true: label
    y_pred: pred
    metrics: [accuracy, binary_classification]
    plots: [confusion]
    template: 'accuracy {{{{ accuracy }}}}'
  scores:
    _target_: output.divergence
    y_true: label
    y_pred: score
    figure:
      bins: 5
exporters:
  - _target_: exporter.metrics_json
    path: '{metrics}'
    exist_ok: {exist_ok}
  - _target_: exporter.svg
    dir: '{figures}'
    exist_ok: {exist_ok}
  - _target_: reporter.html
    path: '{html}'
    exist_ok: {exist_ok}
",
        data = data.display(),
        metrics = out.join("metrics.json").display(),
        figures = out.join("figures").display(),
        html = out.join("report.html").display(),
    );
    let path = dir.join("run.yaml");
    fs::write(&path, config).unwrap();
    path
}

#[test]
fn config_run_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), false);
    let registry = Registry::with_builtins().unwrap();
    let summary = load_runner(&config, &registry).unwrap().run().unwrap();

    assert_eq!(summary.title, "Holdout");
    assert_eq!(summary.rows, 5);
    assert_eq!(summary.outputs, 2);
    assert_eq!(summary.figures, 2);
    assert_eq!(summary.written.len(), 4);

    let out = dir.path().join("out");
    let metrics: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("metrics.json")).unwrap()).unwrap();
    assert!(verify_envelope(&metrics, "metrics").unwrap());
    assert_eq!(metrics["metrics"]["labels"]["accuracy"], 1.0);
    assert_eq!(metrics["metrics"]["labels"]["count"], 5);
    assert!(metrics["metrics"]["scores"]["js_distance"].is_number());

    assert!(out.join("figures/labels.confusion_matrix.svg").exists());
    assert!(out.join("figures/scores.histogram.svg").exists());

    let html = fs::read_to_string(out.join("report.html")).unwrap();
    assert!(html.contains("<h1>Holdout</h1>"));
    assert!(html.contains("<p>accuracy 1.0000</p>"));
    assert!(html.contains("2 scores"));
}

#[test]
fn rerun_without_exist_ok_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), false);
    let registry = Registry::with_builtins().unwrap();
    load_runner(&config, &registry).unwrap().run().unwrap();

    let err = load_runner(&config, &registry).unwrap().run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.message().contains("already exists"));
}

#[test]
fn existing_report_blocks_every_exporter() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), false);
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("report.html"), "previous").unwrap();

    let registry = Registry::with_builtins().unwrap();
    let err = load_runner(&config, &registry).unwrap().run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.message().contains("report.html"));
    assert!(!out.join("metrics.json").exists());
    assert!(!out.join("figures").exists());
    assert_eq!(fs::read_to_string(out.join("report.html")).unwrap(), "previous");
}

#[test]
fn rerun_with_exist_ok_replaces_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), true);
    let registry = Registry::with_builtins().unwrap();
    let first = load_runner(&config, &registry).unwrap().run().unwrap();
    let second = load_runner(&config, &registry).unwrap().run().unwrap();
    assert_eq!(first, second);
}

#[test]
fn config_naming_a_non_runner_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, "_target_: exporter.svg\ndir: figs\n").unwrap();
    let err = load_runner(&path, &Registry::with_builtins().unwrap())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(err.message().contains("is not a runner"));
}

#[test]
fn missing_config_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_runner(&dir.path().join("nope.yaml"), &Registry::with_builtins().unwrap())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Usage);
}
