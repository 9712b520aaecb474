use crate::affix::Affix;
use crate::evaluator::merge_into;
use crate::figure::{figures_equal, Figure, FigureKind, Figures, PlotEntry, Series};
use crate::state::{LazyState, PairState};
use crate::stats::{ConfusionMatrix, Histogram};
use evalkit_core::{AppError, AppResult, FloatCmp};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

/// Produces a mapping of figure name to figure, applying `affix` to every
/// top-level key.
pub trait Plotter {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures>;

    fn plot(&self) -> AppResult<Figures> {
        self.plot_with(&Affix::none())
    }

    fn equal(&self, other: &dyn Plotter, cmp: FloatCmp) -> AppResult<bool> {
        Ok(figures_equal(&self.plot()?, &other.plot()?, cmp))
    }
}

impl<P: Plotter + ?Sized> Plotter for Rc<P> {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        (**self).plot_with(affix)
    }
}

impl<P: Plotter + ?Sized> Plotter for Box<P> {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        (**self).plot_with(affix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    Scatter,
    Histogram,
    Confusion,
}

impl PlotKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlotKind::Scatter => "scatter",
            PlotKind::Histogram => "histogram",
            PlotKind::Confusion => "confusion",
        }
    }

    fn figure_name(self) -> &'static str {
        match self {
            PlotKind::Scatter => "scatter",
            PlotKind::Histogram => "histogram",
            PlotKind::Confusion => "confusion_matrix",
        }
    }

    fn build(self, state: &PairState) -> AppResult<Figure> {
        let config = state.figure_or_default();
        let (t, p) = state.prepared();
        let title = |default: String| config.title.clone().unwrap_or(default);
        let figure = match self {
            PlotKind::Scatter => Figure::new(
                FigureKind::Scatter,
                title(format!("{} vs {}", state.y_pred_name(), state.y_true_name())),
            )
            .labels(state.y_true_name(), state.y_pred_name())
            .with_series(Series::new("points", t, p)),
            PlotKind::Histogram => {
                let (ht, hp) = Histogram::shared(&t, &p, config.bins)?;
                Figure::new(
                    FigureKind::Bar,
                    title(format!("distribution of {} and {}", state.y_true_name(), state.y_pred_name())),
                )
                .labels("value", "count")
                .with_series(Series::new(state.y_true_name(), ht.centers(), ht.counts))
                .with_series(Series::new(state.y_pred_name(), hp.centers(), hp.counts))
            }
            PlotKind::Confusion => {
                let matrix = ConfusionMatrix::from_labels(&t, &p)?;
                let mut figure = Figure::new(FigureKind::Bar, title("confusion matrix".to_string()))
                    .labels("predicted label", "count");
                for (row, label) in matrix.labels().iter().enumerate() {
                    let counts = (0..matrix.size())
                        .map(|col| matrix.get(row, col) as f64)
                        .collect();
                    figure = figure.with_series(Series::new(
                        format!("true {label}"),
                        matrix.labels().to_vec(),
                        counts,
                    ));
                }
                figure
            }
        };
        Ok(figure.size(config.width, config.height))
    }
}

impl std::str::FromStr for PlotKind {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s {
            "scatter" => Ok(PlotKind::Scatter),
            "histogram" => Ok(PlotKind::Histogram),
            "confusion" => Ok(PlotKind::Confusion),
            other => Err(AppError::usage(format!("unknown plot '{other}'"))),
        }
    }
}

/// Figures of the requested kinds over a lazily resolved state. A missing
/// state yields no figures.
pub struct PairPlotter {
    state: Rc<LazyState>,
    kinds: Vec<PlotKind>,
}

impl PairPlotter {
    pub fn new(state: Rc<LazyState>, kinds: Vec<PlotKind>) -> Self {
        Self { state, kinds }
    }

    pub fn kinds(&self) -> &[PlotKind] {
        &self.kinds
    }
}

impl Plotter for PairPlotter {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        if self.kinds.is_empty() {
            return Ok(Figures::new());
        }
        let Some(state) = self.state.get()? else {
            return Ok(Figures::new());
        };
        let mut figures = Figures::new();
        for kind in &self.kinds {
            debug!(plot = kind.as_str(), rows = state.len(), "building figure");
            figures.insert(
                affix.apply(kind.figure_name()),
                PlotEntry::Figure(kind.build(&state)?),
            );
        }
        Ok(figures)
    }
}

pub struct CachedPlotter<P> {
    inner: P,
    cache: OnceCell<Figures>,
}

impl<P: Plotter> CachedPlotter<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: OnceCell::new(),
        }
    }

    pub fn is_computed(&self) -> bool {
        self.cache.get().is_some()
    }
}

impl<P: Plotter> Plotter for CachedPlotter<P> {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        let figures = self.cache.get_or_try_init(|| self.inner.plot())?;
        Ok(affix.apply_keys(figures))
    }
}

pub struct AffixedPlotter<P> {
    inner: P,
    affix: Affix,
}

impl<P: Plotter> AffixedPlotter<P> {
    pub fn new(inner: P, affix: Affix) -> Self {
        Self { inner, affix }
    }
}

impl<P: Plotter> Plotter for AffixedPlotter<P> {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        self.inner.plot_with(&self.affix.within(affix))
    }
}

#[derive(Default)]
pub struct MappingPlotter {
    children: BTreeMap<String, Box<dyn Plotter>>,
}

impl MappingPlotter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, child: Box<dyn Plotter>) {
        self.children.insert(key.into(), child);
    }

    pub fn with(mut self, key: impl Into<String>, child: Box<dyn Plotter>) -> Self {
        self.insert(key, child);
        self
    }
}

impl Plotter for MappingPlotter {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        self.children
            .iter()
            .map(|(key, child)| Ok((key.clone(), PlotEntry::Group(child.plot_with(affix)?))))
            .collect()
    }
}

#[derive(Default)]
pub struct SequentialPlotter {
    children: Vec<Box<dyn Plotter>>,
}

impl SequentialPlotter {
    pub fn new(children: Vec<Box<dyn Plotter>>) -> Self {
        Self { children }
    }

    pub fn push(&mut self, child: Box<dyn Plotter>) {
        self.children.push(child);
    }
}

impl Plotter for SequentialPlotter {
    fn plot_with(&self, affix: &Affix) -> AppResult<Figures> {
        let mut merged = Figures::new();
        for child in &self.children {
            merge_into(&mut merged, child.plot_with(affix)?);
        }
        Ok(merged)
    }
}
