pub mod affix;
pub mod evaluator;
pub mod figure;
pub mod metric;
pub mod nan;
pub mod plotter;
pub mod result;
pub mod state;
pub mod stats;
pub mod value;

pub use affix::Affix;
pub use evaluator::{
    cached_metric, Affixed, Cached, Evaluator, MappingEvaluator, MetricEvaluator,
    SequentialEvaluator,
};
pub use figure::{flatten_figures, Figure, FigureKind, Figures, PlotEntry, Series};
pub use metric::{Metric, MetricKind};
pub use nan::NanPolicy;
pub use plotter::{
    AffixedPlotter, CachedPlotter, MappingPlotter, PairPlotter, PlotKind, Plotter,
    SequentialPlotter,
};
pub use result::{ComputedResult, MergedResult};
pub use state::{ColumnSource, FigureConfig, LazyState, PairState};
pub use value::{metrics_equal, MetricValue, Metrics};
