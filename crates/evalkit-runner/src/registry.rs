use crate::runner::Runner;
use evalkit_core::{AppError, AppResult, ComponentSpec};
use evalkit_frame::{Ingestor, Table, Transformer};
use evalkit_report::{AnalysisOutput, Exporter};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Ingestor,
    Transformer,
    Output,
    Exporter,
    Runner,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Ingestor => "ingestor",
            Capability::Transformer => "transformer",
            Capability::Output => "output",
            Capability::Exporter => "exporter",
            Capability::Runner => "runner",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type IngestorFactory = Rc<dyn Fn(&ComponentSpec) -> AppResult<Box<dyn Ingestor>>>;
pub type TransformerFactory =
    Rc<dyn Fn(&ComponentSpec, &Registry) -> AppResult<Box<dyn Transformer>>>;
pub type OutputFactory =
    Rc<dyn Fn(&ComponentSpec, &Rc<Table>, &Registry) -> AppResult<Box<dyn AnalysisOutput>>>;
pub type ExporterFactory = Rc<dyn Fn(&ComponentSpec) -> AppResult<Box<dyn Exporter>>>;
pub type RunnerFactory = Rc<dyn Fn(&ComponentSpec, &Registry) -> AppResult<Box<dyn Runner>>>;

/// A constructor tagged with the capability of what it builds.
#[derive(Clone)]
pub enum Factory {
    Ingestor(IngestorFactory),
    Transformer(TransformerFactory),
    Output(OutputFactory),
    Exporter(ExporterFactory),
    Runner(RunnerFactory),
}

impl Factory {
    pub fn ingestor(
        f: impl Fn(&ComponentSpec) -> AppResult<Box<dyn Ingestor>> + 'static,
    ) -> Self {
        Factory::Ingestor(Rc::new(f))
    }

    pub fn transformer(
        f: impl Fn(&ComponentSpec, &Registry) -> AppResult<Box<dyn Transformer>> + 'static,
    ) -> Self {
        Factory::Transformer(Rc::new(f))
    }

    pub fn output(
        f: impl Fn(&ComponentSpec, &Rc<Table>, &Registry) -> AppResult<Box<dyn AnalysisOutput>>
            + 'static,
    ) -> Self {
        Factory::Output(Rc::new(f))
    }

    pub fn exporter(
        f: impl Fn(&ComponentSpec) -> AppResult<Box<dyn Exporter>> + 'static,
    ) -> Self {
        Factory::Exporter(Rc::new(f))
    }

    pub fn runner(
        f: impl Fn(&ComponentSpec, &Registry) -> AppResult<Box<dyn Runner>> + 'static,
    ) -> Self {
        Factory::Runner(Rc::new(f))
    }

    pub fn capability(&self) -> Capability {
        match self {
            Factory::Ingestor(_) => Capability::Ingestor,
            Factory::Transformer(_) => Capability::Transformer,
            Factory::Output(_) => Capability::Output,
            Factory::Exporter(_) => Capability::Exporter,
            Factory::Runner(_) => Capability::Runner,
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Factory({})", self.capability())
    }
}

/// Maps `_target_` names to constructors.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in component.
    pub fn with_builtins() -> AppResult<Self> {
        let mut registry = Self::new();
        crate::builtins::register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, target: &str, factory: Factory) -> AppResult<()> {
        if target.is_empty() {
            return Err(AppError::validation("registry target is empty"));
        }
        if target.chars().any(char::is_whitespace) {
            return Err(AppError::validation(format!(
                "registry target '{target}' contains whitespace"
            )));
        }
        if self.entries.contains_key(target) {
            return Err(AppError::validation(format!(
                "registry target '{target}' is already registered"
            )));
        }
        self.entries.insert(target.to_string(), factory);
        Ok(())
    }

    pub fn lookup(&self, target: &str) -> AppResult<&Factory> {
        self.entries
            .get(target)
            .ok_or_else(|| AppError::usage(format!("unknown target '{target}'")))
    }

    pub fn contains(&self, target: &str) -> bool {
        self.entries.contains_key(target)
    }

    /// Registered targets with their capability, sorted by name.
    pub fn targets(&self) -> impl Iterator<Item = (&str, Capability)> {
        self.entries
            .iter()
            .map(|(name, factory)| (name.as_str(), factory.capability()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
