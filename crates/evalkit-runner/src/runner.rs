use crate::registry::Registry;
use crate::setup::{setup_exporter, setup_ingestor, setup_output, setup_runner, setup_transformer, Setup};
use evalkit_core::{AppError, AppResult, ComponentSpec};
use evalkit_eval::{flatten_figures, MetricValue, Metrics};
use evalkit_frame::{Ingestor, SequentialTransformer, Table, Transformer};
use evalkit_report::{AnalysisOutput, Artifacts, Exporter, MappingOutput};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info};

pub const DEFAULT_TITLE: &str = "Evaluation report";

pub trait Runner {
    fn run(&self) -> AppResult<RunSummary>;
}

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub title: String,
    pub rows: usize,
    pub outputs: usize,
    pub metrics: usize,
    pub figures: usize,
    pub written: Vec<PathBuf>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvaluationParams {
    #[serde(default = "default_title")]
    title: String,
    ingestor: ComponentSpec,
    #[serde(default)]
    transformers: Vec<ComponentSpec>,
    outputs: BTreeMap<String, ComponentSpec>,
    #[serde(default)]
    exporters: Vec<ComponentSpec>,
}

/// Ingest, transform, evaluate every output against the resulting table,
/// then hand the artifacts to each exporter in order.
pub struct EvaluationRunner {
    title: String,
    registry: Registry,
    ingestor: Box<dyn Ingestor>,
    transformer: SequentialTransformer,
    outputs: BTreeMap<String, ComponentSpec>,
    exporters: Vec<Box<dyn Exporter>>,
}

impl EvaluationRunner {
    /// Output specs are built once against an empty table so that unknown
    /// targets and bad parameters fail here rather than mid-run.
    pub fn new(
        title: impl Into<String>,
        registry: Registry,
        ingestor: Box<dyn Ingestor>,
        outputs: BTreeMap<String, ComponentSpec>,
    ) -> AppResult<Self> {
        if outputs.is_empty() {
            return Err(AppError::usage("runner needs at least one output"));
        }
        let empty = Rc::new(Table::default());
        for spec in outputs.values() {
            setup_output(&registry, Setup::Spec(spec.clone()), &empty)?;
        }
        Ok(Self {
            title: title.into(),
            registry,
            ingestor,
            transformer: SequentialTransformer::default(),
            outputs,
            exporters: Vec::new(),
        })
    }

    pub fn from_spec(spec: &ComponentSpec, registry: &Registry) -> AppResult<Self> {
        let params: EvaluationParams = spec.params()?;
        let ingestor_target = params.ingestor.target.clone();
        let ingestor = setup_ingestor(registry, Setup::Spec(params.ingestor))?.ok_or_else(|| {
            AppError::usage(format!(
                "{}: '{ingestor_target}' is not an ingestor",
                spec.target
            ))
        })?;
        let mut runner = Self::new(params.title, registry.clone(), ingestor, params.outputs)?;
        for transformer in params.transformers {
            if let Some(transformer) = setup_transformer(registry, Setup::Spec(transformer))? {
                runner = runner.with_transformer(transformer);
            }
        }
        for exporter in params.exporters {
            if let Some(exporter) = setup_exporter(registry, Setup::Spec(exporter))? {
                runner = runner.with_exporter(exporter);
            }
        }
        Ok(runner)
    }

    pub fn with_transformer(mut self, transformer: Box<dyn Transformer>) -> Self {
        self.transformer.push(transformer);
        self
    }

    pub fn with_exporter(mut self, exporter: Box<dyn Exporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn output_keys(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    fn build_outputs(&self, table: &Rc<Table>) -> AppResult<MappingOutput> {
        let mut mapping = MappingOutput::new();
        for (key, spec) in &self.outputs {
            if let Some(output) = setup_output(&self.registry, Setup::Spec(spec.clone()), table)? {
                mapping.insert(key.clone(), output);
            }
        }
        Ok(mapping)
    }
}

impl Runner for EvaluationRunner {
    fn run(&self) -> AppResult<RunSummary> {
        let started = Instant::now();
        let table = self.ingestor.ingest()?;
        info!(rows = table.n_rows(), columns = table.n_columns(), "table ingested");
        let table = if self.transformer.is_empty() {
            table
        } else {
            let table = self.transformer.transform(table)?;
            info!(
                steps = self.transformer.len(),
                rows = table.n_rows(),
                columns = table.n_columns(),
                "transformers applied"
            );
            table
        };
        let rows = table.n_rows();
        let table = Rc::new(table);

        let outputs = self.build_outputs(&table)?;
        let result = outputs.compute()?;
        let sections = outputs.report_sections()?;
        let metrics = count_metrics(&result.metrics);
        let figures = flatten_figures(&result.figures, ".").len();
        info!(outputs = outputs.len(), metrics, figures, "outputs computed");

        let artifacts = Artifacts {
            title: self.title.clone(),
            result,
            sections,
        };
        for exporter in &self.exporters {
            let targets = exporter.preflight(&artifacts)?;
            debug!(exporter = exporter.name(), files = targets.len(), "exporter targets checked");
        }
        let mut written = Vec::new();
        for exporter in &self.exporters {
            let paths = exporter.export(&artifacts)?;
            debug!(exporter = exporter.name(), files = paths.len(), "exporter finished");
            written.extend(paths);
        }
        info!(
            title = %self.title,
            files = written.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(RunSummary {
            title: self.title.clone(),
            rows,
            outputs: outputs.len(),
            metrics,
            figures,
            written,
        })
    }
}

/// Leaf values, nested maps excluded.
fn count_metrics(metrics: &Metrics) -> usize {
    metrics
        .values()
        .map(|value| match value {
            MetricValue::Map(inner) => count_metrics(inner),
            _ => 1,
        })
        .sum()
}

/// Reads a runner config file and builds the runner it names.
pub fn load_runner(path: &Path, registry: &Registry) -> AppResult<Box<dyn Runner>> {
    let spec = ComponentSpec::load(path)?;
    let target = spec.target.clone();
    setup_runner(registry, Setup::Spec(spec))?.ok_or_else(|| {
        AppError::usage(format!(
            "{}: _target_ '{target}' is not a runner",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalkit_core::ErrorKind;
    use evalkit_frame::{Cell, Column, StaticIngestor};
    use evalkit_report::{HtmlReporter, MetricsJsonExporter};

    fn ingestor() -> Box<dyn Ingestor> {
        Box::new(StaticIngestor::new(
            Table::new(vec![
                Column::new(
                    "y_true",
                    vec![Cell::Int(1), Cell::Int(0), Cell::Int(0), Cell::Int(1), Cell::Int(1)],
                ),
                Column::new(
                    "y_pred",
                    vec![Cell::Int(1), Cell::Int(0), Cell::Int(1), Cell::Int(1), Cell::Null],
                ),
            ])
            .unwrap(),
        ))
    }

    fn outputs(targets: &[(&str, &str)]) -> BTreeMap<String, ComponentSpec> {
        targets
            .iter()
            .map(|(key, target)| (key.to_string(), ComponentSpec::new(*target)))
            .collect()
    }

    #[test]
    fn runs_outputs_and_exporters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let runner = EvaluationRunner::new(
            "unit",
            Registry::with_builtins().unwrap(),
            ingestor(),
            outputs(&[("acc", "output.accuracy"), ("cm", "output.confusion_matrix")]),
        )
        .unwrap()
        .with_exporter(Box::new(MetricsJsonExporter {
            path: path.clone(),
            exist_ok: false,
        }));
        assert_eq!(runner.title(), "unit");
        assert_eq!(runner.output_keys().collect::<Vec<_>>(), vec!["acc", "cm"]);
        let summary = runner.run().unwrap();
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.outputs, 2);
        assert_eq!(summary.figures, 1);
        assert_eq!(summary.written, vec![path.clone()]);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"count_correct\": 3"));
    }

    #[test]
    fn exporters_are_all_checked_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = dir.path().join("metrics.json");
        let report = dir.path().join("report.html");
        std::fs::write(&report, "keep").unwrap();
        let runner = EvaluationRunner::new(
            "unit",
            Registry::with_builtins().unwrap(),
            ingestor(),
            outputs(&[("acc", "output.accuracy")]),
        )
        .unwrap()
        .with_exporter(Box::new(MetricsJsonExporter {
            path: metrics.clone(),
            exist_ok: false,
        }))
        .with_exporter(Box::new(HtmlReporter {
            path: report.clone(),
            exist_ok: false,
            title: None,
        }));
        let err = runner.run().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.message().contains("report.html"));
        assert!(!metrics.exists());
        assert_eq!(std::fs::read_to_string(&report).unwrap(), "keep");
    }

    #[test]
    fn requires_an_output() {
        let err = EvaluationRunner::new("t", Registry::with_builtins().unwrap(), ingestor(), BTreeMap::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn unknown_output_target_fails_at_construction() {
        let err = EvaluationRunner::new(
            "t",
            Registry::with_builtins().unwrap(),
            ingestor(),
            outputs(&[("x", "output.auc")]),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.message().contains("output.auc"));
    }

    #[test]
    fn counts_leaf_metrics() {
        let mut inner = Metrics::new();
        inner.insert("a".into(), MetricValue::Int(1));
        inner.insert("b".into(), MetricValue::Float(0.5));
        let mut metrics = Metrics::new();
        metrics.insert("group".into(), MetricValue::Map(inner));
        metrics.insert("c".into(), MetricValue::Text("x".into()));
        assert_eq!(count_metrics(&metrics), 3);
    }
}
