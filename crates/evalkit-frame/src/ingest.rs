use crate::table::{Cell, Column, Table};
use csv::ReaderBuilder;
use evalkit_core::{AppError, AppResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

pub trait Ingestor {
    fn ingest(&self) -> AppResult<Table>;
}

#[derive(Debug, Clone)]
pub struct CsvIngestor {
    pub path: PathBuf,
    pub delimiter: u8,
    pub has_headers: bool,
}

impl CsvIngestor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            has_headers: true,
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> AppResult<Self> {
        if !delimiter.is_ascii() {
            return Err(AppError::usage(format!(
                "csv delimiter must be ascii, got '{delimiter}'"
            )));
        }
        self.delimiter = delimiter as u8;
        Ok(self)
    }
}

impl Ingestor for CsvIngestor {
    fn ingest(&self) -> AppResult<Table> {
        let file = open_input(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .from_reader(file);

        let mut headers: Vec<String> = if self.has_headers {
            reader
                .headers()
                .map_err(|e| parse_error(&self.path, e))?
                .iter()
                .map(str::to_string)
                .collect()
        } else {
            Vec::new()
        };

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| parse_error(&self.path, e))?;
            if headers.is_empty() {
                headers = (0..record.len()).map(|i| format!("column_{i}")).collect();
            }
            rows.push(record.iter().map(Cell::parse).collect::<Vec<_>>());
        }

        let table = Table::from_rows(headers, rows)?;
        info!(
            path = %self.path.display(),
            rows = table.n_rows(),
            columns = table.n_columns(),
            "csv ingested"
        );
        Ok(table)
    }
}

/// Reads a JSON array of flat objects. Keys missing from a record become nulls.
#[derive(Debug, Clone)]
pub struct JsonIngestor {
    pub path: PathBuf,
}

impl JsonIngestor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Ingestor for JsonIngestor {
    fn ingest(&self) -> AppResult<Table> {
        let file = open_input(&self.path)?;
        let value: Value =
            serde_json::from_reader(file).map_err(|e| parse_error(&self.path, e))?;
        let table = table_from_records(&value)
            .map_err(|e| AppError::validation(format!("{}: {}", self.path.display(), e)))?;
        info!(
            path = %self.path.display(),
            rows = table.n_rows(),
            columns = table.n_columns(),
            "json ingested"
        );
        Ok(table)
    }
}

/// Hands out a table that is already in memory.
#[derive(Debug, Clone)]
pub struct StaticIngestor {
    table: Table,
}

impl StaticIngestor {
    pub fn new(table: Table) -> Self {
        Self { table }
    }
}

impl Ingestor for StaticIngestor {
    fn ingest(&self) -> AppResult<Table> {
        Ok(self.table.clone())
    }
}

pub fn table_from_records(value: &Value) -> AppResult<Table> {
    let records = value
        .as_array()
        .ok_or_else(|| AppError::validation("expected a json array of records"))?;

    let mut columns: BTreeMap<String, Vec<Cell>> = BTreeMap::new();
    for (row, record) in records.iter().enumerate() {
        let object = record
            .as_object()
            .ok_or_else(|| AppError::validation(format!("record {row} is not an object")))?;
        for key in object.keys() {
            columns
                .entry(key.clone())
                .or_insert_with(|| vec![Cell::Null; row]);
        }
        for (key, cells) in columns.iter_mut() {
            let cell = match object.get(key) {
                Some(value) => json_cell(value)
                    .map_err(|e| AppError::validation(format!("record {row}, key {key}: {e}")))?,
                None => Cell::Null,
            };
            cells.push(cell);
        }
    }

    Table::new(
        columns
            .into_iter()
            .map(|(name, cells)| Column::new(name, cells))
            .collect(),
    )
}

fn json_cell(value: &Value) -> AppResult<Cell> {
    match value {
        Value::Null => Ok(Cell::Null),
        Value::Bool(v) => Ok(Cell::Bool(*v)),
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(Cell::Int(v)),
            None => n
                .as_f64()
                .map(Cell::Float)
                .ok_or_else(|| AppError::validation(format!("unsupported number {n}"))),
        },
        Value::String(s) => Ok(Cell::Str(s.clone())),
        Value::Array(_) | Value::Object(_) => {
            Err(AppError::validation("nested values are not supported"))
        }
    }
}

fn open_input(path: &Path) -> AppResult<File> {
    if !path.exists() {
        return Err(AppError::io(format!("{} does not exist", path.display())));
    }
    File::open(path).map_err(|e| AppError::io(format!("failed to open {}: {e}", path.display())))
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("failed to parse {}: {err}", path.display()))
}
