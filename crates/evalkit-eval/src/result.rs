use crate::affix::Affix;
use crate::evaluator::{merge_into, Evaluator};
use crate::figure::{figures_equal, Figures};
use crate::plotter::Plotter;
use crate::value::{metrics_equal, Metrics};
use evalkit_core::{AppResult, FloatCmp};
use serde::{Deserialize, Serialize};

/// Fully computed metrics, figures and content with no deferred work left.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedResult {
    pub metrics: Metrics,
    pub figures: Figures,
    #[serde(default)]
    pub content: String,
}

impl ComputedResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(metrics: Metrics, figures: Figures) -> Self {
        Self {
            metrics,
            figures,
            content: String::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.figures.is_empty() && self.content.is_empty()
    }

    /// Already computed; returns a copy of itself.
    pub fn compute(&self) -> ComputedResult {
        self.clone()
    }

    pub fn equal(&self, other: &ComputedResult, cmp: FloatCmp) -> bool {
        metrics_equal(&self.metrics, &other.metrics, cmp)
            && figures_equal(&self.figures, &other.figures, cmp)
            && self.content == other.content
    }

    /// Folds `other` in: later keys win and content is appended.
    pub fn merge(&mut self, other: ComputedResult) {
        merge_into(&mut self.metrics, other.metrics);
        merge_into(&mut self.figures, other.figures);
        self.content.push_str(&other.content);
    }
}

impl Evaluator for ComputedResult {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        Ok(affix.apply_keys(&self.metrics))
    }
}

impl Plotter for ComputedResult {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        Ok(affix.apply_keys(&self.figures))
    }
}

/// Ordered results merged on demand, last write wins.
#[derive(Debug, Clone, Default)]
pub struct MergedResult {
    parts: Vec<ComputedResult>,
}

impl MergedResult {
    pub fn new(parts: Vec<ComputedResult>) -> Self {
        Self { parts }
    }

    pub fn push(&mut self, part: ComputedResult) {
        self.parts.push(part);
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn compute(&self) -> ComputedResult {
        self.parts
            .iter()
            .cloned()
            .fold(ComputedResult::empty(), |mut acc, part| {
                acc.merge(part);
                acc
            })
    }
}

impl Evaluator for MergedResult {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        self.compute().evaluate_with(affix)
    }
}

impl Plotter for MergedResult {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        self.compute().plot_with(affix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figure::{Figure, FigureKind, PlotEntry};
    use crate::value::MetricValue;

    fn result(key: &str, value: i64, content: &str) -> ComputedResult {
        let mut figures = Figures::new();
        figures.insert(
            key.to_string(),
            PlotEntry::Figure(Figure::new(FigureKind::Line, key)),
        );
        ComputedResult::new(
            Metrics::from([(key.to_string(), MetricValue::Int(value))]),
            figures,
        )
        .with_content(content)
    }

    #[test]
    fn compute_is_a_fixed_point() {
        let r = result("a", 1, "<p>a</p>");
        assert!(r.compute().equal(&r, FloatCmp::Exact));
        assert!(r.compute().compute().equal(&r.compute(), FloatCmp::Exact));
    }

    #[test]
    fn empty_result_is_empty() {
        assert!(ComputedResult::empty().is_empty());
        assert!(!result("a", 1, "").is_empty());
    }

    #[test]
    fn serves_as_evaluator_and_plotter() {
        let r = result("a", 1, "");
        let metrics = r.evaluate_with(&Affix::prefix("x_")).unwrap();
        assert_eq!(metrics["x_a"], MetricValue::Int(1));
        let figures = r.plot_with(&Affix::suffix("_y")).unwrap();
        assert!(figures.contains_key("a_y"));
    }

    #[test]
    fn merged_result_last_write_wins() {
        let merged = MergedResult::new(vec![
            result("a", 1, "<p>1</p>"),
            result("b", 2, "<p>2</p>"),
            result("a", 3, ""),
        ]);
        let out = merged.compute();
        assert_eq!(out.metrics["a"], MetricValue::Int(3));
        assert_eq!(out.metrics["b"], MetricValue::Int(2));
        assert_eq!(out.figures.len(), 2);
        assert_eq!(out.content, "<p>1</p><p>2</p>");
        assert_eq!(merged.evaluate().unwrap(), out.metrics);
    }
}
