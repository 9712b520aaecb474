use crate::state::{PairState, DEFAULT_BINS};
use crate::stats::{self, AccuracyCounts, BinaryCounts, ConfusionMatrix};
use crate::value::{MetricValue, Metrics};
use evalkit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// A family of metrics computed from one paired state.
pub trait Metric {
    fn name(&self) -> &'static str;
    fn compute(&self, state: &PairState) -> AppResult<Metrics>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Accuracy,
    BinaryClassification,
    BinaryJaccard,
    ConfusionMatrix,
    Correlation,
    Regression,
    Divergence,
}

impl MetricKind {
    pub const ALL: [MetricKind; 7] = [
        MetricKind::Accuracy,
        MetricKind::BinaryClassification,
        MetricKind::BinaryJaccard,
        MetricKind::ConfusionMatrix,
        MetricKind::Correlation,
        MetricKind::Regression,
        MetricKind::Divergence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Accuracy => "accuracy",
            MetricKind::BinaryClassification => "binary_classification",
            MetricKind::BinaryJaccard => "binary_jaccard",
            MetricKind::ConfusionMatrix => "confusion_matrix",
            MetricKind::Correlation => "correlation",
            MetricKind::Regression => "regression",
            MetricKind::Divergence => "divergence",
        }
    }

    pub fn metric(self) -> Box<dyn Metric> {
        match self {
            MetricKind::Accuracy => Box::new(Accuracy),
            MetricKind::BinaryClassification => Box::new(BinaryClassification),
            MetricKind::BinaryJaccard => Box::new(BinaryJaccard),
            MetricKind::ConfusionMatrix => Box::new(ConfusionMatrixMetric),
            MetricKind::Correlation => Box::new(Correlation),
            MetricKind::Regression => Box::new(Regression),
            MetricKind::Divergence => Box::new(Divergence::default()),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::usage(format!("unknown metric '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn compute(&self, state: &PairState) -> AppResult<Metrics> {
        let (t, p) = state.prepared();
        let counts: AccuracyCounts = stats::accuracy_counts(&t, &p)?;
        let accuracy = counts.accuracy();
        Ok(Metrics::from([
            ("accuracy".to_string(), accuracy.into()),
            ("count_correct".to_string(), counts.correct.into()),
            ("count_incorrect".to_string(), counts.incorrect().into()),
            ("count".to_string(), counts.total.into()),
            ("error".to_string(), (1.0 - accuracy).into()),
        ]))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryClassification;

impl Metric for BinaryClassification {
    fn name(&self) -> &'static str {
        "binary_classification"
    }

    fn compute(&self, state: &PairState) -> AppResult<Metrics> {
        let (t, p) = state.prepared();
        let c = BinaryCounts::from_labels(&t, &p)?;
        Ok(Metrics::from([
            ("precision".to_string(), c.precision().into()),
            ("recall".to_string(), c.recall().into()),
            ("f1".to_string(), c.f1().into()),
            ("specificity".to_string(), c.specificity().into()),
            ("true_positive".to_string(), c.tp.into()),
            ("false_positive".to_string(), c.fp.into()),
            ("true_negative".to_string(), c.tn.into()),
            ("false_negative".to_string(), c.fn_.into()),
            ("support".to_string(), c.support().into()),
        ]))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryJaccard;

impl Metric for BinaryJaccard {
    fn name(&self) -> &'static str {
        "binary_jaccard"
    }

    fn compute(&self, state: &PairState) -> AppResult<Metrics> {
        let (t, p) = state.prepared();
        let c = BinaryCounts::from_labels(&t, &p)?;
        Ok(Metrics::from([("jaccard".to_string(), c.jaccard().into())]))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfusionMatrixMetric;

impl Metric for ConfusionMatrixMetric {
    fn name(&self) -> &'static str {
        "confusion_matrix"
    }

    fn compute(&self, state: &PairState) -> AppResult<Metrics> {
        let (t, p) = state.prepared();
        let m = ConfusionMatrix::from_labels(&t, &p)?;
        let matrix: Vec<f64> = m.counts().iter().map(|c| *c as f64).collect();
        Ok(Metrics::from([
            ("labels".to_string(), MetricValue::Array(m.labels().to_vec())),
            ("matrix".to_string(), MetricValue::Array(matrix)),
            ("count".to_string(), m.total().into()),
        ]))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Correlation;

impl Metric for Correlation {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn compute(&self, state: &PairState) -> AppResult<Metrics> {
        let (t, p) = state.prepared();
        let policy = state.nan_policy();
        Ok(Metrics::from([
            ("pearson".to_string(), stats::pearson(&t, &p, policy)?.into()),
            ("spearman".to_string(), stats::spearman(&t, &p, policy)?.into()),
            ("kendall_tau".to_string(), stats::kendall_tau(&t, &p, policy)?.into()),
            ("count".to_string(), t.len().into()),
        ]))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Regression;

impl Metric for Regression {
    fn name(&self) -> &'static str {
        "regression"
    }

    fn compute(&self, state: &PairState) -> AppResult<Metrics> {
        let (t, p) = state.prepared();
        let mse = stats::mean_squared_error(&t, &p)?;
        Ok(Metrics::from([
            ("mae".to_string(), stats::mean_absolute_error(&t, &p)?.into()),
            ("mse".to_string(), mse.into()),
            ("rmse".to_string(), mse.sqrt().into()),
            ("r2".to_string(), stats::r2_score(&t, &p)?.into()),
            ("max_error".to_string(), stats::max_error(&t, &p)?.into()),
            ("count".to_string(), t.len().into()),
        ]))
    }
}

/// Distribution distances between ground truth and predictions. The bin
/// count comes from the state's figure config when present.
#[derive(Debug, Clone, Copy)]
pub struct Divergence {
    pub bins: usize,
}

impl Default for Divergence {
    fn default() -> Self {
        Self { bins: DEFAULT_BINS }
    }
}

impl Metric for Divergence {
    fn name(&self) -> &'static str {
        "divergence"
    }

    fn compute(&self, state: &PairState) -> AppResult<Metrics> {
        let (t, p) = state.prepared();
        let bins = state.figure().map_or(self.bins, |f| f.bins);
        let d = stats::divergence(&t, &p, bins, state.nan_policy())?;
        Ok(Metrics::from([
            ("kl_divergence".to_string(), d.kl.into()),
            ("js_distance".to_string(), d.js.into()),
            ("wasserstein".to_string(), d.wasserstein.into()),
            ("count".to_string(), t.len().into()),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nan::NanPolicy;
    use evalkit_core::{ErrorKind, FloatCmp};

    fn state(t: &[f64], p: &[f64]) -> PairState {
        PairState::new(t.to_vec(), p.to_vec()).unwrap()
    }

    #[test]
    fn accuracy_on_identical_labels() {
        let labels = [1.0, 0.0, 0.0, 1.0, 1.0];
        let metrics = Accuracy.compute(&state(&labels, &labels)).unwrap();
        let expected = Metrics::from([
            ("accuracy".to_string(), MetricValue::Float(1.0)),
            ("count_correct".to_string(), MetricValue::Int(5)),
            ("count_incorrect".to_string(), MetricValue::Int(0)),
            ("count".to_string(), MetricValue::Int(5)),
            ("error".to_string(), MetricValue::Float(0.0)),
        ]);
        assert_eq!(metrics, expected);
    }

    #[test]
    fn every_kind_round_trips_its_name() {
        for kind in MetricKind::ALL {
            assert_eq!(kind.as_str().parse::<MetricKind>().unwrap(), kind);
            assert_eq!(kind.metric().name(), kind.as_str());
        }
        assert!("auc".parse::<MetricKind>().is_err());
    }

    #[test]
    fn confusion_matrix_is_row_major() {
        let metrics = ConfusionMatrixMetric
            .compute(&state(&[0.0, 0.0, 1.0], &[0.0, 1.0, 1.0]))
            .unwrap();
        assert_eq!(
            metrics["matrix"],
            MetricValue::Array(vec![1.0, 1.0, 0.0, 1.0])
        );
        assert_eq!(metrics["labels"], MetricValue::Array(vec![0.0, 1.0]));
    }

    #[test]
    fn omit_policy_filters_before_classification() {
        let s = state(&[1.0, f64::NAN, 0.0], &[1.0, 1.0, 0.0]).with_nan_policy(NanPolicy::Omit);
        let metrics = Accuracy.compute(&s).unwrap();
        assert_eq!(metrics["count"], MetricValue::Int(2));
    }

    #[test]
    fn propagate_policy_lets_classification_reject_nan() {
        let s = state(&[1.0, f64::NAN], &[1.0, 1.0]);
        let err = BinaryJaccard.compute(&s).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numeric);
    }

    #[test]
    fn propagate_policy_yields_nan_correlation() {
        let s = state(&[1.0, f64::NAN, 3.0], &[1.0, 2.0, 3.0]);
        let metrics = Correlation.compute(&s).unwrap();
        let expected = Metrics::from([
            ("pearson".to_string(), MetricValue::Float(f64::NAN)),
            ("spearman".to_string(), MetricValue::Float(f64::NAN)),
            ("kendall_tau".to_string(), MetricValue::Float(f64::NAN)),
            ("count".to_string(), MetricValue::Int(3)),
        ]);
        assert!(crate::value::metrics_equal(&metrics, &expected, FloatCmp::NanEqual));
    }

    #[test]
    fn regression_reports_rmse() {
        let metrics = Regression
            .compute(&state(&[0.0, 0.0], &[3.0, 4.0]))
            .unwrap();
        let rmse = metrics["rmse"].as_f64().unwrap();
        assert!((rmse - 12.5f64.sqrt()).abs() < 1e-12);
    }
}
