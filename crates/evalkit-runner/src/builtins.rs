use crate::registry::{Factory, Registry};
use crate::runner::{EvaluationRunner, Runner};
use crate::setup::{setup_output, setup_transformer, Setup};
use evalkit_core::{AppError, AppResult, ComponentSpec};
use evalkit_eval::{ColumnSource, FigureConfig, LazyState, MetricKind, NanPolicy, PlotKind};
use evalkit_frame::{
    CastTransformer, CsvIngestor, DType, DropNullsTransformer, Ingestor, JsonIngestor,
    RenameTransformer, SelectTransformer, SequentialTransformer, Table, Transformer,
};
use evalkit_report::{
    AnalysisOutput, Exporter, FiguresJsonExporter, HtmlReporter, MappingOutput,
    MetricsJsonExporter, Output, SvgExporter, Template,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::rc::Rc;

fn default_true() -> bool {
    true
}

fn default_y_true() -> String {
    "y_true".to_string()
}

fn default_y_pred() -> String {
    "y_pred".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CsvParams {
    path: PathBuf,
    #[serde(default)]
    delimiter: Option<char>,
    #[serde(default = "default_true")]
    has_headers: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonParams {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CastParams {
    columns: BTreeMap<String, DType>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DropNullsParams {
    #[serde(default)]
    columns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SelectParams {
    columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RenameParams {
    columns: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SequentialParams {
    steps: Vec<ComponentSpec>,
}

/// Parameters shared by `output.pair` and the per-family output targets.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PairOutputParams {
    #[serde(default = "default_y_true")]
    y_true: String,
    #[serde(default = "default_y_pred")]
    y_pred: String,
    #[serde(default = "default_true")]
    drop_nulls: bool,
    #[serde(default)]
    nan_policy: NanPolicy,
    #[serde(default)]
    metrics: Vec<MetricKind>,
    #[serde(default)]
    plots: Option<Vec<PlotKind>>,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    figure: Option<FigureConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingOutputParams {
    outputs: BTreeMap<String, ComponentSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileExporterParams {
    path: PathBuf,
    #[serde(default)]
    exist_ok: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SvgParams {
    dir: PathBuf,
    #[serde(default)]
    exist_ok: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HtmlParams {
    path: PathBuf,
    #[serde(default)]
    exist_ok: bool,
    #[serde(default)]
    title: Option<String>,
}

pub(crate) fn register_builtins(registry: &mut Registry) -> AppResult<()> {
    registry.register("ingestor.csv", Factory::ingestor(csv_ingestor))?;
    registry.register("ingestor.json", Factory::ingestor(json_ingestor))?;

    registry.register("transformer.cast", Factory::transformer(cast_transformer))?;
    registry.register("transformer.drop_nulls", Factory::transformer(drop_nulls_transformer))?;
    registry.register("transformer.select", Factory::transformer(select_transformer))?;
    registry.register("transformer.rename", Factory::transformer(rename_transformer))?;
    registry.register("transformer.sequential", Factory::transformer(sequential_transformer))?;

    registry.register("output.pair", Factory::output(pair_output))?;
    registry.register("output.mapping", Factory::output(mapping_output))?;
    for kind in MetricKind::ALL {
        registry.register(
            &format!("output.{}", kind.as_str()),
            Factory::output(move |spec, table, _| family_output(spec, table, kind)),
        )?;
    }

    registry.register("exporter.metrics_json", Factory::exporter(metrics_json_exporter))?;
    registry.register("exporter.figures_json", Factory::exporter(figures_json_exporter))?;
    registry.register("exporter.svg", Factory::exporter(svg_exporter))?;
    registry.register("reporter.html", Factory::exporter(html_reporter))?;

    registry.register("runner.evaluation", Factory::runner(evaluation_runner))?;
    Ok(())
}

fn evaluation_runner(spec: &ComponentSpec, registry: &Registry) -> AppResult<Box<dyn Runner>> {
    Ok(Box::new(EvaluationRunner::from_spec(spec, registry)?))
}

fn csv_ingestor(spec: &ComponentSpec) -> AppResult<Box<dyn Ingestor>> {
    let params: CsvParams = spec.params()?;
    let mut ingestor = CsvIngestor::new(params.path);
    if let Some(delimiter) = params.delimiter {
        ingestor = ingestor.with_delimiter(delimiter)?;
    }
    ingestor.has_headers = params.has_headers;
    Ok(Box::new(ingestor))
}

fn json_ingestor(spec: &ComponentSpec) -> AppResult<Box<dyn Ingestor>> {
    let params: JsonParams = spec.params()?;
    Ok(Box::new(JsonIngestor::new(params.path)))
}

fn cast_transformer(spec: &ComponentSpec, _: &Registry) -> AppResult<Box<dyn Transformer>> {
    let params: CastParams = spec.params()?;
    Ok(Box::new(CastTransformer::new(params.columns)))
}

fn drop_nulls_transformer(spec: &ComponentSpec, _: &Registry) -> AppResult<Box<dyn Transformer>> {
    let params: DropNullsParams = spec.params()?;
    Ok(Box::new(match params.columns {
        Some(columns) => DropNullsTransformer::subset(columns),
        None => DropNullsTransformer::all(),
    }))
}

fn select_transformer(spec: &ComponentSpec, _: &Registry) -> AppResult<Box<dyn Transformer>> {
    let params: SelectParams = spec.params()?;
    if params.columns.is_empty() {
        return Err(AppError::usage(format!("{}: columns is empty", spec.target)));
    }
    Ok(Box::new(SelectTransformer {
        columns: params.columns,
    }))
}

fn rename_transformer(spec: &ComponentSpec, _: &Registry) -> AppResult<Box<dyn Transformer>> {
    let params: RenameParams = spec.params()?;
    Ok(Box::new(RenameTransformer {
        columns: params.columns,
    }))
}

fn sequential_transformer(
    spec: &ComponentSpec,
    registry: &Registry,
) -> AppResult<Box<dyn Transformer>> {
    let params: SequentialParams = spec.params()?;
    let mut sequential = SequentialTransformer::default();
    for step in params.steps {
        if let Some(step) = setup_transformer(registry, Setup::Spec(step))? {
            sequential.push(step);
        }
    }
    Ok(Box::new(sequential))
}

fn default_plots(kind: MetricKind) -> Vec<PlotKind> {
    match kind {
        MetricKind::BinaryClassification | MetricKind::ConfusionMatrix => vec![PlotKind::Confusion],
        MetricKind::Correlation | MetricKind::Regression => vec![PlotKind::Scatter],
        MetricKind::Divergence => vec![PlotKind::Histogram],
        MetricKind::Accuracy | MetricKind::BinaryJaccard => Vec::new(),
    }
}

fn build_pair_output(
    params: PairOutputParams,
    metrics: &[MetricKind],
    plots: Vec<PlotKind>,
    table: &Rc<Table>,
) -> AppResult<Box<dyn AnalysisOutput>> {
    if let Some(figure) = &params.figure {
        figure.validate()?;
    }
    let template = params.template.as_deref().map(Template::parse).transpose()?;
    let source = ColumnSource::new(table.clone(), params.y_true, params.y_pred)
        .with_drop_nulls(params.drop_nulls)
        .with_nan_policy(params.nan_policy)
        .with_figure(params.figure);
    let state = LazyState::from_columns(source);
    Ok(Box::new(Output::for_pair(state, metrics, plots, template)))
}

fn pair_output(
    spec: &ComponentSpec,
    table: &Rc<Table>,
    _: &Registry,
) -> AppResult<Box<dyn AnalysisOutput>> {
    let mut params: PairOutputParams = spec.params()?;
    if params.metrics.is_empty() {
        return Err(AppError::usage(format!(
            "{}: metrics must name at least one metric family",
            spec.target
        )));
    }
    let metrics = dedup_in_order(std::mem::take(&mut params.metrics));
    let plots = params.plots.take().unwrap_or_default();
    build_pair_output(params, &metrics, plots, table)
}

/// Drops repeated families; each first occurrence keeps its position.
fn dedup_in_order(mut metrics: Vec<MetricKind>) -> Vec<MetricKind> {
    let mut seen = BTreeSet::new();
    metrics.retain(|kind| seen.insert(*kind));
    metrics
}

fn family_output(
    spec: &ComponentSpec,
    table: &Rc<Table>,
    kind: MetricKind,
) -> AppResult<Box<dyn AnalysisOutput>> {
    let mut params: PairOutputParams = spec.params()?;
    if !params.metrics.is_empty() {
        return Err(AppError::usage(format!(
            "{}: metrics is fixed by the target; use output.pair to combine families",
            spec.target
        )));
    }
    let plots = params.plots.take().unwrap_or_else(|| default_plots(kind));
    build_pair_output(params, &[kind], plots, table)
}

fn mapping_output(
    spec: &ComponentSpec,
    table: &Rc<Table>,
    registry: &Registry,
) -> AppResult<Box<dyn AnalysisOutput>> {
    let params: MappingOutputParams = spec.params()?;
    let mut mapping = MappingOutput::new();
    for (key, child) in params.outputs {
        if let Some(output) = setup_output(registry, Setup::Spec(child), table)? {
            mapping.insert(key, output);
        }
    }
    Ok(Box::new(mapping))
}

fn metrics_json_exporter(spec: &ComponentSpec) -> AppResult<Box<dyn Exporter>> {
    let params: FileExporterParams = spec.params()?;
    Ok(Box::new(MetricsJsonExporter {
        path: params.path,
        exist_ok: params.exist_ok,
    }))
}

fn figures_json_exporter(spec: &ComponentSpec) -> AppResult<Box<dyn Exporter>> {
    let params: FileExporterParams = spec.params()?;
    Ok(Box::new(FiguresJsonExporter {
        path: params.path,
        exist_ok: params.exist_ok,
    }))
}

fn svg_exporter(spec: &ComponentSpec) -> AppResult<Box<dyn Exporter>> {
    let params: SvgParams = spec.params()?;
    Ok(Box::new(SvgExporter {
        dir: params.dir,
        exist_ok: params.exist_ok,
    }))
}

fn html_reporter(spec: &ComponentSpec) -> AppResult<Box<dyn Exporter>> {
    let params: HtmlParams = spec.params()?;
    Ok(Box::new(HtmlReporter {
        path: params.path,
        exist_ok: params.exist_ok,
        title: params.title,
    }))
}
