use crate::content::{
    escape_html, CachedContent, ContentGenerator, MetricsTableContent, SequentialContent,
    Template, TemplateContent,
};
use crate::html::ReportSection;
use evalkit_core::{AppResult, FloatCmp};
use evalkit_eval::{
    cached_metric, flatten_figures, Affix, Cached, CachedPlotter, ComputedResult, Evaluator,
    Figures, LazyState, MetricKind, MetricValue, Metrics, PairPlotter, PlotEntry, PlotKind,
    Plotter, SequentialEvaluator,
};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Something that can be evaluated, plotted and described, either a single
/// bound output or a keyed tree of them.
pub trait AnalysisOutput {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics>;
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures>;
    fn generate_content(&self) -> AppResult<String>;
    fn report_section(&self, title: &str) -> AppResult<ReportSection>;

    fn evaluate(&self) -> AppResult<Metrics> {
        self.evaluate_with(&Affix::none())
    }

    fn plot(&self) -> AppResult<Figures> {
        self.plot_with(&Affix::none())
    }

    fn compute(&self) -> AppResult<ComputedResult> {
        Ok(ComputedResult::new(self.evaluate()?, self.plot()?).with_content(self.generate_content()?))
    }

    fn equal(&self, other: &dyn AnalysisOutput, cmp: FloatCmp) -> AppResult<bool> {
        Ok(self.compute()?.equal(&other.compute()?, cmp))
    }
}

/// Binds an evaluator, a content generator and a plotter. Nothing is
/// computed until one of them is asked for a result.
pub struct Output {
    evaluator: Rc<dyn Evaluator>,
    content: Box<dyn ContentGenerator>,
    plotter: Box<dyn Plotter>,
}

impl Output {
    pub fn new(
        evaluator: Rc<dyn Evaluator>,
        content: Box<dyn ContentGenerator>,
        plotter: Box<dyn Plotter>,
    ) -> Self {
        Self {
            evaluator,
            content,
            plotter,
        }
    }

    /// The usual wiring for paired columns: memoized metrics shared with the
    /// content generator, an optional summary template above a metrics table,
    /// and memoized figures.
    pub fn for_pair(
        state: Rc<LazyState>,
        metrics: &[MetricKind],
        plots: Vec<PlotKind>,
        template: Option<Template>,
    ) -> Self {
        let evaluator: Rc<dyn Evaluator> = match metrics {
            [single] => Rc::new(cached_metric(state.clone(), *single)),
            many => Rc::new(Cached::new(SequentialEvaluator::new(
                many.iter()
                    .map(|kind| Box::new(cached_metric(state.clone(), *kind)) as Box<dyn Evaluator>)
                    .collect(),
            ))),
        };
        let mut parts: Vec<Box<dyn ContentGenerator>> = Vec::new();
        if let Some(template) = template {
            parts.push(Box::new(TemplateContent::new(template, evaluator.clone())));
        }
        parts.push(Box::new(MetricsTableContent::new(evaluator.clone())));
        let content = CachedContent::new(SequentialContent::new(parts));
        let plotter = CachedPlotter::new(PairPlotter::new(state, plots));
        Self::new(evaluator, Box::new(content), Box::new(plotter))
    }

    pub fn evaluator(&self) -> Rc<dyn Evaluator> {
        self.evaluator.clone()
    }
}

impl AnalysisOutput for Output {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        self.evaluator.evaluate_with(affix)
    }

    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        self.plotter.plot_with(affix)
    }

    fn generate_content(&self) -> AppResult<String> {
        self.content.generate_content()
    }

    fn report_section(&self, title: &str) -> AppResult<ReportSection> {
        let figures = self.plot()?;
        Ok(ReportSection {
            title: title.to_string(),
            body: self.generate_content()?,
            figures: flatten_figures(&figures, ".")
                .into_iter()
                .map(|(name, figure)| (name, figure.clone()))
                .collect(),
            children: Vec::new(),
        })
    }
}

impl AnalysisOutput for ComputedResult {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        Evaluator::evaluate_with(self, affix)
    }

    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        Plotter::plot_with(self, affix)
    }

    fn generate_content(&self) -> AppResult<String> {
        Ok(self.content.clone())
    }

    fn report_section(&self, title: &str) -> AppResult<ReportSection> {
        Ok(ReportSection {
            title: title.to_string(),
            body: self.content.clone(),
            figures: flatten_figures(&self.figures, ".")
                .into_iter()
                .map(|(name, figure)| (name, figure.clone()))
                .collect(),
            children: Vec::new(),
        })
    }
}

/// Keyed outputs; metrics and figures nest under the keys and each key gets
/// its own report section.
#[derive(Default)]
pub struct MappingOutput {
    children: BTreeMap<String, Box<dyn AnalysisOutput>>,
}

impl MappingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, child: Box<dyn AnalysisOutput>) {
        self.children.insert(key.into(), child);
    }

    pub fn with(mut self, key: impl Into<String>, child: Box<dyn AnalysisOutput>) -> Self {
        self.insert(key, child);
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// One report section per key, in key order.
    pub fn report_sections(&self) -> AppResult<Vec<ReportSection>> {
        self.children
            .iter()
            .map(|(key, child)| child.report_section(key))
            .collect()
    }
}

impl AnalysisOutput for MappingOutput {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        self.children
            .iter()
            .map(|(key, child)| Ok((key.clone(), MetricValue::Map(child.evaluate_with(affix)?))))
            .collect()
    }

    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        self.children
            .iter()
            .map(|(key, child)| Ok((key.clone(), PlotEntry::Group(child.plot_with(affix)?))))
            .collect()
    }

    fn generate_content(&self) -> AppResult<String> {
        let mut out = String::new();
        for (key, child) in &self.children {
            let fragment = child.generate_content()?;
            if !fragment.is_empty() {
                out.push_str(&format!(
                    "<div class=\"group\">\n<h4>{}</h4>\n{fragment}</div>\n",
                    escape_html(key)
                ));
            }
        }
        Ok(out)
    }

    fn report_section(&self, title: &str) -> AppResult<ReportSection> {
        Ok(ReportSection {
            title: title.to_string(),
            body: String::new(),
            figures: Vec::new(),
            children: self.report_sections()?,
        })
    }
}
