use crate::nan::NanPolicy;
use evalkit_core::{AppError, AppResult, FloatCmp};
use evalkit_frame::Table;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::{debug, warn};

pub const DEFAULT_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FigureConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_bins")]
    pub bins: usize,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_bins() -> usize {
    DEFAULT_BINS
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            title: None,
            width: default_width(),
            height: default_height(),
            bins: default_bins(),
        }
    }
}

impl FigureConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(AppError::validation("figure width and height must be > 0"));
        }
        if self.bins == 0 {
            return Err(AppError::validation("figure bins must be > 0"));
        }
        Ok(())
    }
}

/// Paired ground truth and predictions for one output.
#[derive(Debug, Clone, PartialEq)]
pub struct PairState {
    y_true: Vec<f64>,
    y_pred: Vec<f64>,
    y_true_name: String,
    y_pred_name: String,
    nan_policy: NanPolicy,
    figure: Option<FigureConfig>,
}

impl PairState {
    pub fn new(y_true: Vec<f64>, y_pred: Vec<f64>) -> AppResult<Self> {
        if y_true.len() != y_pred.len() {
            return Err(AppError::validation(format!(
                "y_true and y_pred differ in length ({} vs {})",
                y_true.len(),
                y_pred.len()
            )));
        }
        Ok(Self {
            y_true,
            y_pred,
            y_true_name: "y_true".to_string(),
            y_pred_name: "y_pred".to_string(),
            nan_policy: NanPolicy::default(),
            figure: None,
        })
    }

    pub fn with_names(mut self, y_true: impl Into<String>, y_pred: impl Into<String>) -> Self {
        self.y_true_name = y_true.into();
        self.y_pred_name = y_pred.into();
        self
    }

    pub fn with_nan_policy(mut self, policy: NanPolicy) -> Self {
        self.nan_policy = policy;
        self
    }

    pub fn with_figure(mut self, figure: FigureConfig) -> AppResult<Self> {
        figure.validate()?;
        self.figure = Some(figure);
        Ok(self)
    }

    pub fn y_true(&self) -> &[f64] {
        &self.y_true
    }

    pub fn y_pred(&self) -> &[f64] {
        &self.y_pred
    }

    pub fn y_true_name(&self) -> &str {
        &self.y_true_name
    }

    pub fn y_pred_name(&self) -> &str {
        &self.y_pred_name
    }

    pub fn nan_policy(&self) -> NanPolicy {
        self.nan_policy
    }

    pub fn figure(&self) -> Option<&FigureConfig> {
        self.figure.as_ref()
    }

    pub fn figure_or_default(&self) -> FigureConfig {
        self.figure.clone().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }

    /// Arrays after the nan policy's filter.
    pub fn prepared(&self) -> (Vec<f64>, Vec<f64>) {
        self.nan_policy.prepare(&self.y_true, &self.y_pred)
    }

    pub fn equal(&self, other: &PairState, cmp: FloatCmp) -> bool {
        cmp.eq_slice(&self.y_true, &other.y_true)
            && cmp.eq_slice(&self.y_pred, &other.y_pred)
            && self.y_true_name == other.y_true_name
            && self.y_pred_name == other.y_pred_name
            && self.nan_policy == other.nan_policy
            && self.figure == other.figure
    }
}

/// Two named columns of a shared table, resolved into a `PairState` on demand.
#[derive(Debug, Clone)]
pub struct ColumnSource {
    table: Rc<Table>,
    y_true: String,
    y_pred: String,
    drop_nulls: bool,
    nan_policy: NanPolicy,
    figure: Option<FigureConfig>,
}

impl ColumnSource {
    pub fn new(table: Rc<Table>, y_true: impl Into<String>, y_pred: impl Into<String>) -> Self {
        Self {
            table,
            y_true: y_true.into(),
            y_pred: y_pred.into(),
            drop_nulls: true,
            nan_policy: NanPolicy::default(),
            figure: None,
        }
    }

    pub fn with_drop_nulls(mut self, drop_nulls: bool) -> Self {
        self.drop_nulls = drop_nulls;
        self
    }

    pub fn with_nan_policy(mut self, policy: NanPolicy) -> Self {
        self.nan_policy = policy;
        self
    }

    pub fn with_figure(mut self, figure: Option<FigureConfig>) -> Self {
        self.figure = figure;
        self
    }

    pub fn required_columns(&self) -> [&str; 2] {
        [&self.y_true, &self.y_pred]
    }

    /// Builds the state, or `None` when a required column is absent.
    pub fn resolve(&self) -> AppResult<Option<PairState>> {
        let required = self.required_columns();
        let missing = self.table.missing_columns(&required);
        if !missing.is_empty() {
            warn!(
                missing = ?missing,
                available = ?self.table.column_names(),
                "required columns absent; returning empty result"
            );
            return Ok(None);
        }
        let selected = self.table.select(&required)?;
        let selected = if self.drop_nulls {
            let cleaned = selected.drop_nulls_in(&required)?;
            let dropped = selected.n_rows() - cleaned.n_rows();
            if dropped > 0 {
                debug!(dropped, y_true = %self.y_true, y_pred = %self.y_pred, "dropped null rows");
            }
            cleaned
        } else {
            selected
        };
        let mut state = PairState::new(
            selected.float_column(&self.y_true)?,
            selected.float_column(&self.y_pred)?,
        )?
        .with_names(self.y_true.clone(), self.y_pred.clone())
        .with_nan_policy(self.nan_policy);
        if let Some(figure) = &self.figure {
            state = state.with_figure(figure.clone())?;
        }
        Ok(Some(state))
    }
}

enum StateSource {
    Ready,
    Columns(ColumnSource),
}

/// State shared by the providers of one output. Column resolution runs at
/// most once; a failed resolution is retried on the next access.
pub struct LazyState {
    source: StateSource,
    cell: OnceCell<Option<Rc<PairState>>>,
}

impl LazyState {
    pub fn ready(state: PairState) -> Rc<Self> {
        Rc::new(Self {
            source: StateSource::Ready,
            cell: OnceCell::with_value(Some(Rc::new(state))),
        })
    }

    pub fn from_columns(source: ColumnSource) -> Rc<Self> {
        Rc::new(Self {
            source: StateSource::Columns(source),
            cell: OnceCell::new(),
        })
    }

    pub fn get(&self) -> AppResult<Option<Rc<PairState>>> {
        let state = self.cell.get_or_try_init(|| match &self.source {
            StateSource::Ready => Err(AppError::internal("ready state was not initialized")),
            StateSource::Columns(source) => Ok(source.resolve()?.map(Rc::new)),
        })?;
        Ok(state.clone())
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl std::fmt::Debug for LazyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyState")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalkit_core::ErrorKind;
    use evalkit_frame::{Cell, Column};

    fn table() -> Rc<Table> {
        Rc::new(
            Table::new(vec![
                Column::new(
                    "label",
                    vec![Cell::Int(1), Cell::Null, Cell::Int(0), Cell::Int(1)],
                ),
                Column::from_f64("score", &[0.9, 0.2, f64::NAN, 0.7]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn length_mismatch_fails_at_construction() {
        let err = PairState::new(vec![1.0, 0.0], vec![1.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn drop_nulls_removes_null_rows_and_keeps_nan() {
        let state = ColumnSource::new(table(), "label", "score")
            .resolve()
            .unwrap()
            .unwrap();
        assert_eq!(state.y_true(), &[1.0, 0.0, 1.0]);
        assert_eq!(state.y_pred()[0], 0.9);
        assert!(state.y_pred()[1].is_nan());
        assert_eq!(state.y_pred()[2], 0.7);
        assert_eq!(state.y_true_name(), "label");
    }

    #[test]
    fn nan_policy_applies_after_drop_nulls() {
        let omit = ColumnSource::new(table(), "label", "score")
            .with_nan_policy(NanPolicy::Omit)
            .resolve()
            .unwrap()
            .unwrap();
        assert_eq!(omit.prepared(), (vec![1.0, 1.0], vec![0.9, 0.7]));

        let raise = ColumnSource::new(table(), "label", "score")
            .with_nan_policy(NanPolicy::Raise)
            .resolve()
            .unwrap()
            .unwrap();
        let err = raise
            .nan_policy()
            .check(&[raise.y_true(), raise.y_pred()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Numeric);
    }

    #[test]
    fn keeping_nulls_turns_them_into_nan() {
        let state = ColumnSource::new(table(), "label", "score")
            .with_drop_nulls(false)
            .resolve()
            .unwrap()
            .unwrap();
        assert_eq!(state.len(), 4);
        assert!(state.y_true()[1].is_nan());
        assert!(state.y_pred()[2].is_nan());
    }

    #[test]
    fn missing_column_resolves_to_none() {
        let source = ColumnSource::new(table(), "label", "prediction");
        assert!(source.resolve().unwrap().is_none());
    }

    #[test]
    fn lazy_state_resolves_once() {
        let lazy = LazyState::from_columns(ColumnSource::new(table(), "label", "score"));
        assert!(!lazy.is_resolved());
        let first = lazy.get().unwrap().unwrap();
        let second = lazy.get().unwrap().unwrap();
        assert!(lazy.is_resolved());
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn nan_aware_state_equality() {
        let a = PairState::new(vec![f64::NAN, 1.0], vec![0.0, 1.0]).unwrap();
        let b = a.clone();
        assert!(a.equal(&b, FloatCmp::NanEqual));
        assert!(!a.equal(&b, FloatCmp::Exact));
        assert_ne!(a, b);
    }

    #[test]
    fn omit_policy_filters_prepared_arrays() {
        let state = PairState::new(vec![1.0, f64::NAN, 0.0], vec![1.0, 1.0, f64::NAN])
            .unwrap()
            .with_nan_policy(NanPolicy::Omit);
        let (t, p) = state.prepared();
        assert_eq!(t, vec![1.0]);
        assert_eq!(p, vec![1.0]);
    }

    #[test]
    fn invalid_figure_config_is_rejected() {
        let figure = FigureConfig {
            bins: 0,
            ..FigureConfig::default()
        };
        let state = PairState::new(vec![1.0], vec![1.0]).unwrap();
        assert!(state.with_figure(figure).is_err());
    }
}
