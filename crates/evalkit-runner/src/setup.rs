use crate::registry::{Capability, Factory, Registry};
use crate::runner::Runner;
use evalkit_core::{AppResult, ComponentSpec};
use evalkit_frame::{Ingestor, Table, Transformer};
use evalkit_report::{AnalysisOutput, Exporter};
use std::rc::Rc;
use tracing::warn;

/// A component given either as a built value or as a spec to construct.
pub enum Setup<T> {
    Instance(T),
    Spec(ComponentSpec),
}

impl<T> From<ComponentSpec> for Setup<T> {
    fn from(spec: ComponentSpec) -> Self {
        Setup::Spec(spec)
    }
}

fn wrong_capability<T>(spec: &ComponentSpec, expected: Capability, found: Capability) -> Option<T> {
    warn!(
        component = %spec.target,
        expected = %expected,
        found = %found,
        "component has the wrong capability; ignoring it"
    );
    None
}

pub fn setup_ingestor(
    registry: &Registry,
    setup: Setup<Box<dyn Ingestor>>,
) -> AppResult<Option<Box<dyn Ingestor>>> {
    let spec = match setup {
        Setup::Instance(ingestor) => return Ok(Some(ingestor)),
        Setup::Spec(spec) => spec,
    };
    match registry.lookup(&spec.target)? {
        Factory::Ingestor(build) => build(&spec).map(Some),
        other => Ok(wrong_capability(&spec, Capability::Ingestor, other.capability())),
    }
}

pub fn setup_transformer(
    registry: &Registry,
    setup: Setup<Box<dyn Transformer>>,
) -> AppResult<Option<Box<dyn Transformer>>> {
    let spec = match setup {
        Setup::Instance(transformer) => return Ok(Some(transformer)),
        Setup::Spec(spec) => spec,
    };
    match registry.lookup(&spec.target)? {
        Factory::Transformer(build) => build(&spec, registry).map(Some),
        other => Ok(wrong_capability(&spec, Capability::Transformer, other.capability())),
    }
}

/// Output specs are built against `table`.
pub fn setup_output(
    registry: &Registry,
    setup: Setup<Box<dyn AnalysisOutput>>,
    table: &Rc<Table>,
) -> AppResult<Option<Box<dyn AnalysisOutput>>> {
    let spec = match setup {
        Setup::Instance(output) => return Ok(Some(output)),
        Setup::Spec(spec) => spec,
    };
    match registry.lookup(&spec.target)? {
        Factory::Output(build) => build(&spec, table, registry).map(Some),
        other => Ok(wrong_capability(&spec, Capability::Output, other.capability())),
    }
}

pub fn setup_exporter(
    registry: &Registry,
    setup: Setup<Box<dyn Exporter>>,
) -> AppResult<Option<Box<dyn Exporter>>> {
    let spec = match setup {
        Setup::Instance(exporter) => return Ok(Some(exporter)),
        Setup::Spec(spec) => spec,
    };
    match registry.lookup(&spec.target)? {
        Factory::Exporter(build) => build(&spec).map(Some),
        other => Ok(wrong_capability(&spec, Capability::Exporter, other.capability())),
    }
}

pub fn setup_runner(
    registry: &Registry,
    setup: Setup<Box<dyn Runner>>,
) -> AppResult<Option<Box<dyn Runner>>> {
    let spec = match setup {
        Setup::Instance(runner) => return Ok(Some(runner)),
        Setup::Spec(spec) => spec,
    };
    match registry.lookup(&spec.target)? {
        Factory::Runner(build) => build(&spec, registry).map(Some),
        other => Ok(wrong_capability(&spec, Capability::Runner, other.capability())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalkit_core::ErrorKind;
    use evalkit_frame::{Column, StaticIngestor};
    use tracing_test::traced_test;

    fn table() -> Rc<Table> {
        Rc::new(
            Table::new(vec![
                Column::from_f64("y_true", &[1.0, 0.0, 1.0]),
                Column::from_f64("y_pred", &[1.0, 1.0, 1.0]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn instances_pass_through() {
        let registry = Registry::new();
        let ingestor: Box<dyn Ingestor> = Box::new(StaticIngestor::new(Table::default()));
        let built = setup_ingestor(&registry, Setup::Instance(ingestor)).unwrap();
        assert!(built.is_some());
    }

    #[test]
    fn specs_are_built_through_the_registry() {
        let registry = Registry::with_builtins().unwrap();
        let spec = ComponentSpec::new("output.accuracy");
        let output = setup_output(&registry, spec.into(), &table())
            .unwrap()
            .unwrap();
        let metrics = output.evaluate().unwrap();
        assert_eq!(metrics["count_correct"].as_f64(), Some(2.0));
    }

    #[test]
    #[traced_test]
    fn wrong_capability_warns_and_yields_none() {
        let registry = Registry::with_builtins().unwrap();
        let spec = ComponentSpec::new("output.accuracy");
        let built = setup_exporter(&registry, spec.into()).unwrap();
        assert!(built.is_none());
        assert!(logs_contain("wrong capability"));
    }

    #[test]
    fn unknown_target_is_usage_error() {
        let registry = Registry::with_builtins().unwrap();
        let err = setup_transformer(&registry, ComponentSpec::new("transformer.pivot").into())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
