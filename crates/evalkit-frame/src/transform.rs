use crate::table::{DType, Table};
use evalkit_core::AppResult;
use std::collections::BTreeMap;
use tracing::debug;

pub trait Transformer {
    fn transform(&self, table: Table) -> AppResult<Table>;
}

#[derive(Debug, Clone, Default)]
pub struct CastTransformer {
    pub columns: BTreeMap<String, DType>,
}

impl CastTransformer {
    pub fn new(columns: BTreeMap<String, DType>) -> Self {
        Self { columns }
    }

    pub fn single(column: impl Into<String>, dtype: DType) -> Self {
        let mut columns = BTreeMap::new();
        columns.insert(column.into(), dtype);
        Self { columns }
    }
}

impl Transformer for CastTransformer {
    fn transform(&self, mut table: Table) -> AppResult<Table> {
        for (column, dtype) in &self.columns {
            table = table.cast(column, *dtype)?;
            debug!(column = %column, dtype = dtype.as_str(), "column cast");
        }
        Ok(table)
    }
}

/// Drops rows with nulls in `columns`, or in any column when `columns` is `None`.
#[derive(Debug, Clone, Default)]
pub struct DropNullsTransformer {
    pub columns: Option<Vec<String>>,
}

impl DropNullsTransformer {
    pub fn all() -> Self {
        Self { columns: None }
    }

    pub fn subset(columns: Vec<String>) -> Self {
        Self {
            columns: Some(columns),
        }
    }
}

impl Transformer for DropNullsTransformer {
    fn transform(&self, table: Table) -> AppResult<Table> {
        let before = table.n_rows();
        let out = match &self.columns {
            Some(columns) => table.drop_nulls_in(columns)?,
            None => table.drop_nulls(),
        };
        debug!(dropped = before - out.n_rows(), rows = out.n_rows(), "nulls dropped");
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub struct SelectTransformer {
    pub columns: Vec<String>,
}

impl Transformer for SelectTransformer {
    fn transform(&self, table: Table) -> AppResult<Table> {
        table.select(&self.columns)
    }
}

#[derive(Debug, Clone)]
pub struct RenameTransformer {
    pub columns: BTreeMap<String, String>,
}

impl Transformer for RenameTransformer {
    fn transform(&self, mut table: Table) -> AppResult<Table> {
        for (from, to) in &self.columns {
            table = table.rename(from, to)?;
        }
        Ok(table)
    }
}

/// Applies its children in order.
#[derive(Default)]
pub struct SequentialTransformer {
    steps: Vec<Box<dyn Transformer>>,
}

impl SequentialTransformer {
    pub fn new(steps: Vec<Box<dyn Transformer>>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, step: Box<dyn Transformer>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Transformer for SequentialTransformer {
    fn transform(&self, table: Table) -> AppResult<Table> {
        self.steps
            .iter()
            .try_fold(table, |table, step| step.transform(table))
    }
}
