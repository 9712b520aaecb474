mod builtins;
pub mod registry;
pub mod runner;
pub mod setup;

pub use registry::{Capability, Factory, Registry};
pub use runner::{load_runner, EvaluationRunner, RunSummary, Runner, DEFAULT_TITLE};
pub use setup::{
    setup_exporter, setup_ingestor, setup_output, setup_runner, setup_transformer, Setup,
};
