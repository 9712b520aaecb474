use crate::affix::Affix;
use crate::metric::{Metric, MetricKind};
use crate::state::LazyState;
use crate::value::{metrics_equal, MetricValue, Metrics};
use evalkit_core::{AppResult, FloatCmp};
use once_cell::unsync::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

/// Produces a mapping of metric name to value, applying `affix` to every
/// top-level key.
pub trait Evaluator {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics>;

    fn evaluate(&self) -> AppResult<Metrics> {
        self.evaluate_with(&Affix::none())
    }

    /// Compares evaluated results, computing both sides if needed.
    fn equal(&self, other: &dyn Evaluator, cmp: FloatCmp) -> AppResult<bool> {
        Ok(metrics_equal(&self.evaluate()?, &other.evaluate()?, cmp))
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Rc<E> {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        (**self).evaluate_with(affix)
    }
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        (**self).evaluate_with(affix)
    }
}

/// One metric family over a lazily resolved state. A missing state yields an
/// empty mapping.
pub struct MetricEvaluator {
    state: Rc<LazyState>,
    metric: Box<dyn Metric>,
}

impl MetricEvaluator {
    pub fn new(state: Rc<LazyState>, metric: Box<dyn Metric>) -> Self {
        Self { state, metric }
    }

    pub fn of_kind(state: Rc<LazyState>, kind: MetricKind) -> Self {
        Self::new(state, kind.metric())
    }

    pub fn metric_name(&self) -> &'static str {
        self.metric.name()
    }
}

impl Evaluator for MetricEvaluator {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        let Some(state) = self.state.get()? else {
            return Ok(Metrics::new());
        };
        debug!(metric = self.metric.name(), rows = state.len(), "computing metrics");
        let metrics = self.metric.compute(&state)?;
        Ok(affix.apply_keys(&metrics))
    }
}

/// Memoizes the unaffixed result of `inner`; affixes are applied per call.
/// Errors are returned without being cached.
pub struct Cached<E> {
    inner: E,
    cache: OnceCell<Metrics>,
}

impl<E: Evaluator> Cached<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: OnceCell::new(),
        }
    }

    pub fn is_computed(&self) -> bool {
        self.cache.get().is_some()
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: Evaluator> Evaluator for Cached<E> {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        if self.is_computed() {
            debug!("metrics cache hit");
        }
        let metrics = self.cache.get_or_try_init(|| self.inner.evaluate())?;
        Ok(affix.apply_keys(metrics))
    }
}

/// Wraps `inner` with a fixed affix nested inside any caller affix.
pub struct Affixed<E> {
    inner: E,
    affix: Affix,
}

impl<E: Evaluator> Affixed<E> {
    pub fn new(inner: E, affix: Affix) -> Self {
        Self { inner, affix }
    }
}

impl<E: Evaluator> Evaluator for Affixed<E> {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        self.inner.evaluate_with(&self.affix.within(affix))
    }
}

/// Keyed children; each child's result is nested under its key. The caller's
/// affix is passed to the children, not applied to the keys.
#[derive(Default)]
pub struct MappingEvaluator {
    children: BTreeMap<String, Box<dyn Evaluator>>,
}

impl MappingEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, child: Box<dyn Evaluator>) {
        self.children.insert(key.into(), child);
    }

    pub fn with(mut self, key: impl Into<String>, child: Box<dyn Evaluator>) -> Self {
        self.insert(key, child);
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Evaluator for MappingEvaluator {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        self.children
            .iter()
            .map(|(key, child)| Ok((key.clone(), MetricValue::Map(child.evaluate_with(affix)?))))
            .collect()
    }
}

/// Ordered children merged into one flat mapping. Later children overwrite
/// earlier keys.
#[derive(Default)]
pub struct SequentialEvaluator {
    children: Vec<Box<dyn Evaluator>>,
}

impl SequentialEvaluator {
    pub fn new(children: Vec<Box<dyn Evaluator>>) -> Self {
        Self { children }
    }

    pub fn push(&mut self, child: Box<dyn Evaluator>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Evaluator for SequentialEvaluator {
    fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
        let mut merged = Metrics::new();
        for child in &self.children {
            merge_into(&mut merged, child.evaluate_with(affix)?);
        }
        Ok(merged)
    }
}

pub(crate) fn merge_into<V>(target: &mut BTreeMap<String, V>, source: BTreeMap<String, V>) {
    for (key, value) in source {
        if target.insert(key.clone(), value).is_some() {
            debug!(key = %key, "overwriting earlier result");
        }
    }
}

/// The standard leaf: a metric family over a state, memoized.
pub fn cached_metric(state: Rc<LazyState>, kind: MetricKind) -> Cached<MetricEvaluator> {
    Cached::new(MetricEvaluator::of_kind(state, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ColumnSource, PairState};
    use evalkit_core::ErrorKind;
    use evalkit_frame::{Column, Table};
    use std::cell::Cell;

    struct Counting {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl Evaluator for Counting {
        fn evaluate_with(&self, affix: &Affix) -> AppResult<Metrics> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(evalkit_core::AppError::numeric("boom"));
            }
            let metrics = Metrics::from([
                ("a".to_string(), MetricValue::Int(1)),
                ("b".to_string(), MetricValue::Float(0.5)),
            ]);
            Ok(affix.apply_keys(&metrics))
        }
    }

    fn counting(fail: bool) -> (Rc<Cell<usize>>, Counting) {
        let calls = Rc::new(Cell::new(0));
        (
            calls.clone(),
            Counting {
                calls,
                fail,
            },
        )
    }

    fn labels_state() -> Rc<LazyState> {
        LazyState::ready(
            PairState::new(vec![1.0, 0.0, 0.0, 1.0, 1.0], vec![1.0, 0.0, 1.0, 1.0, 0.0]).unwrap(),
        )
    }

    #[test]
    fn cached_computes_once() {
        let (calls, inner) = counting(false);
        let cached = Cached::new(inner);
        assert!(!cached.is_computed());
        let first = cached.evaluate().unwrap();
        let second = cached.evaluate().unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        assert!(cached.is_computed());
    }

    #[test]
    fn cached_applies_affix_without_mutating_cache() {
        let (calls, inner) = counting(false);
        let cached = Cached::new(inner);
        let prefixed = cached.evaluate_with(&Affix::prefix("val_")).unwrap();
        assert!(prefixed.contains_key("val_a"));
        let plain = cached.evaluate().unwrap();
        assert!(plain.contains_key("a"));
        assert!(!plain.contains_key("val_a"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cached_does_not_cache_errors() {
        let (calls, inner) = counting(true);
        let cached = Cached::new(inner);
        assert_eq!(cached.evaluate().unwrap_err().kind(), ErrorKind::Numeric);
        assert!(cached.evaluate().is_err());
        assert_eq!(calls.get(), 2);
        assert!(!cached.is_computed());
    }

    #[test]
    fn affixed_composes_with_caller_affix() {
        let direct = cached_metric(labels_state(), MetricKind::Accuracy)
            .evaluate_with(&Affix::new("p0_p1_", "_s1_s0"))
            .unwrap();
        let wrapped = Affixed::new(
            cached_metric(labels_state(), MetricKind::Accuracy),
            Affix::new("p1_", "_s1"),
        )
        .evaluate_with(&Affix::new("p0_", "_s0"))
        .unwrap();
        assert_eq!(direct, wrapped);
        assert!(wrapped.contains_key("p0_p1_accuracy_s1_s0"));
    }

    #[test]
    fn mapping_nests_child_results() {
        let state = labels_state();
        let mapping = MappingEvaluator::new()
            .with("acc", Box::new(cached_metric(state.clone(), MetricKind::Accuracy)))
            .with("jac", Box::new(cached_metric(state.clone(), MetricKind::BinaryJaccard)));
        let result = mapping.evaluate_with(&Affix::prefix("x_")).unwrap();
        let keys: Vec<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["acc", "jac"]);
        let acc = result["acc"].as_map().unwrap();
        let expected = cached_metric(state, MetricKind::Accuracy)
            .evaluate_with(&Affix::prefix("x_"))
            .unwrap();
        assert_eq!(acc, &expected);
    }

    #[test]
    fn sequential_last_write_wins() {
        let first = crate::result::ComputedResult::new(
            Metrics::from([
                ("a".to_string(), MetricValue::Int(1)),
                ("b".to_string(), MetricValue::Int(1)),
            ]),
            Default::default(),
        );
        let second = crate::result::ComputedResult::new(
            Metrics::from([("b".to_string(), MetricValue::Int(2))]),
            Default::default(),
        );
        let seq = SequentialEvaluator::new(vec![Box::new(first), Box::new(second)]);
        let merged = seq.evaluate().unwrap();
        assert_eq!(merged["a"], MetricValue::Int(1));
        assert_eq!(merged["b"], MetricValue::Int(2));
    }

    #[test]
    fn missing_column_yields_empty_metrics() {
        let table = Rc::new(
            Table::new(vec![
                Column::from_f64("y_true", &[1.0, 0.0, 1.0]),
                Column::from_f64("y_pred", &[1.0, 1.0, 1.0]),
            ])
            .unwrap(),
        );
        let state = LazyState::from_columns(ColumnSource::new(table, "y_true", "prediction"));
        let evaluator = cached_metric(state, MetricKind::BinaryJaccard);
        assert!(evaluator.evaluate().unwrap().is_empty());
        let empty = crate::result::ComputedResult::empty();
        assert!(evaluator.equal(&empty, FloatCmp::Exact).unwrap());
    }

    #[test]
    fn equal_is_nan_aware() {
        let nan_state = || {
            LazyState::ready(PairState::new(vec![1.0, 2.0, 3.0], vec![1.0, 1.0, 1.0]).unwrap())
        };
        let a = cached_metric(nan_state(), MetricKind::Correlation);
        let b = cached_metric(nan_state(), MetricKind::Correlation);
        assert!(a.equal(&b, FloatCmp::NanEqual).unwrap());
        assert!(!a.equal(&b, FloatCmp::Exact).unwrap());
    }
}
