use evalkit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "integer", alias = "int64")]
    Int,
    #[serde(alias = "float64", alias = "double")]
    Float,
    #[serde(alias = "string")]
    Str,
}

impl DType {
    pub fn as_str(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int => "int",
            DType::Float => "float",
            DType::Str => "str",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Cell {
    /// Parses a raw text field: empty and `NA`/`null` become `Null`, then
    /// bool, integer and float are tried in that order.
    pub fn parse(field: &str) -> Self {
        let field = field.trim();
        match field {
            "" | "NA" | "N/A" | "null" | "NULL" | "None" => return Cell::Null,
            "true" | "True" | "TRUE" => return Cell::Bool(true),
            "false" | "False" | "FALSE" => return Cell::Bool(false),
            _ => {}
        }
        if let Ok(v) = field.parse::<i64>() {
            return Cell::Int(v);
        }
        if let Ok(v) = field.parse::<f64>() {
            return Cell::Float(v);
        }
        Cell::Str(field.to_string())
    }

    /// Only `Null` is missing; a NaN float is a value and is left to the
    /// consumer's NaN policy.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn dtype(&self) -> Option<DType> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some(DType::Bool),
            Cell::Int(_) => Some(DType::Int),
            Cell::Float(_) => Some(DType::Float),
            Cell::Str(_) => Some(DType::Str),
        }
    }

    /// Numeric view of the cell; nulls map to NaN.
    pub fn to_f64(&self) -> AppResult<f64> {
        match self {
            Cell::Null => Ok(f64::NAN),
            Cell::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Cell::Int(v) => Ok(*v as f64),
            Cell::Float(v) => Ok(*v),
            Cell::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| AppError::validation(format!("cannot read '{s}' as a number"))),
        }
    }

    pub fn cast(&self, dtype: DType) -> AppResult<Cell> {
        if let Cell::Null = self {
            return Ok(Cell::Null);
        }
        let cell = match (self, dtype) {
            (Cell::Bool(v), DType::Bool) => Cell::Bool(*v),
            (Cell::Bool(v), DType::Int) => Cell::Int(i64::from(*v)),
            (Cell::Bool(v), DType::Float) => Cell::Float(if *v { 1.0 } else { 0.0 }),
            (Cell::Int(v), DType::Bool) => Cell::Bool(*v != 0),
            (Cell::Int(v), DType::Int) => Cell::Int(*v),
            (Cell::Int(v), DType::Float) => Cell::Float(*v as f64),
            (Cell::Float(v), DType::Bool) => Cell::Bool(*v != 0.0),
            (Cell::Float(v), DType::Int) => {
                if !v.is_finite() {
                    return Err(AppError::validation(format!(
                        "cannot cast non-finite value {v} to int"
                    )));
                }
                Cell::Int(v.trunc() as i64)
            }
            (Cell::Float(v), DType::Float) => Cell::Float(*v),
            (Cell::Str(s), DType::Bool) => match s.trim() {
                "true" | "True" | "TRUE" | "1" => Cell::Bool(true),
                "false" | "False" | "FALSE" | "0" => Cell::Bool(false),
                other => {
                    return Err(AppError::validation(format!(
                        "cannot cast '{other}' to bool"
                    )))
                }
            },
            (Cell::Str(s), DType::Int) => Cell::Int(s.trim().parse::<i64>().map_err(|_| {
                AppError::validation(format!("cannot cast '{s}' to int"))
            })?),
            (Cell::Str(s), DType::Float) => Cell::Float(self.to_f64().map_err(|_| {
                AppError::validation(format!("cannot cast '{s}' to float"))
            })?),
            (other, DType::Str) => Cell::Str(other.to_string()),
            (Cell::Null, _) => Cell::Null,
        };
        Ok(cell)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(v) => write!(f, "{v}"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Str(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    pub fn from_f64(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(name, values.iter().map(|v| Cell::Float(*v)).collect())
    }

    pub fn from_i64(name: impl Into<String>, values: &[i64]) -> Self {
        Self::new(name, values.iter().map(|v| Cell::Int(*v)).collect())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_null()).count()
    }

    pub fn to_f64_vec(&self) -> AppResult<Vec<f64>> {
        self.cells
            .iter()
            .map(|cell| {
                cell.to_f64()
                    .map_err(|e| AppError::validation(format!("column {}: {}", self.name, e)))
            })
            .collect()
    }
}

/// Column-oriented in-memory table. Column names are unique and every
/// column has the same number of rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> AppResult<Self> {
        let mut names = BTreeSet::new();
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        if let Some(first) = columns.first() {
            for column in &columns[1..] {
                if column.len() != first.len() {
                    return Err(AppError::validation(format!(
                        "column '{}' has {} rows, expected {}",
                        column.name,
                        column.len(),
                        first.len()
                    )));
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> AppResult<Self> {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(rows.len())))
            .collect();
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(AppError::validation(format!(
                    "row {idx} has {} fields, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (column, cell) in columns.iter_mut().zip(row) {
                column.cells.push(cell);
            }
        }
        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn missing_columns<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect()
    }

    pub fn column(&self, name: &str) -> AppResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| AppError::missing_input(format!("column '{name}' not found")))
    }

    pub fn float_column(&self, name: &str) -> AppResult<Vec<f64>> {
        self.column(name)?.to_f64_vec()
    }

    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> AppResult<Table> {
        let columns = names
            .iter()
            .map(|name| self.column(name.as_ref()).cloned())
            .collect::<AppResult<Vec<_>>>()?;
        Table::new(columns)
    }

    pub fn rename(mut self, from: &str, to: &str) -> AppResult<Table> {
        if from != to && self.has_column(to) {
            return Err(AppError::validation(format!(
                "cannot rename '{from}' to existing column '{to}'"
            )));
        }
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == from)
            .ok_or_else(|| AppError::missing_input(format!("column '{from}' not found")))?;
        column.name = to.to_string();
        Ok(self)
    }

    pub fn cast(mut self, name: &str, dtype: DType) -> AppResult<Table> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| AppError::missing_input(format!("column '{name}' not found")))?;
        let cells = column
            .cells
            .iter()
            .map(|cell| {
                cell.cast(dtype).map_err(|e| {
                    AppError::validation(format!("column {name}: {}", e.message()))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;
        column.cells = cells;
        Ok(self)
    }

    /// Drops every row holding a null in any of `names`.
    pub fn drop_nulls_in<S: AsRef<str>>(&self, names: &[S]) -> AppResult<Table> {
        let checked = names
            .iter()
            .map(|name| self.column(name.as_ref()))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(self.drop_rows_with_nulls(&checked))
    }

    pub fn drop_nulls(&self) -> Table {
        let checked: Vec<&Column> = self.columns.iter().collect();
        self.drop_rows_with_nulls(&checked)
    }

    fn drop_rows_with_nulls(&self, checked: &[&Column]) -> Table {
        let keep: Vec<bool> = (0..self.n_rows())
            .map(|row| checked.iter().all(|c| !c.cells[row].is_null()))
            .collect();
        self.filter_rows(&keep)
    }

    pub fn filter_rows(&self, keep: &[bool]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let cells = column
                    .cells
                    .iter()
                    .zip(keep)
                    .filter(|(_, keep)| **keep)
                    .map(|(cell, _)| cell.clone())
                    .collect();
                Column::new(column.name.clone(), cells)
            })
            .collect();
        Table { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            Column::from_i64("label", &[1, 0, 1, 0]),
            Column::new(
                "score",
                vec![
                    Cell::Float(0.9),
                    Cell::Null,
                    Cell::Float(f64::NAN),
                    Cell::Float(0.2),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn parse_recognizes_types() {
        assert_eq!(Cell::parse(""), Cell::Null);
        assert_eq!(Cell::parse("NA"), Cell::Null);
        assert_eq!(Cell::parse("true"), Cell::Bool(true));
        assert_eq!(Cell::parse(" 42 "), Cell::Int(42));
        assert_eq!(Cell::parse("0.5"), Cell::Float(0.5));
        assert_eq!(Cell::parse("cat"), Cell::Str("cat".to_string()));
        let nan = Cell::parse("NaN");
        assert!(matches!(nan, Cell::Float(v) if v.is_nan()));
        assert!(!nan.is_null());
    }

    #[test]
    fn new_rejects_ragged_and_duplicate_columns() {
        let ragged = Table::new(vec![
            Column::from_i64("a", &[1, 2]),
            Column::from_i64("b", &[1]),
        ]);
        assert!(ragged.is_err());
        let dup = Table::new(vec![
            Column::from_i64("a", &[1]),
            Column::from_i64("a", &[2]),
        ]);
        assert!(dup.is_err());
    }

    #[test]
    fn drop_nulls_keeps_nan_values() {
        let table = sample().drop_nulls_in(&["score"]).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.float_column("label").unwrap(), vec![1.0, 1.0, 0.0]);
        assert!(table.float_column("score").unwrap()[1].is_nan());
        assert_eq!(sample().column("score").unwrap().null_count(), 1);
    }

    #[test]
    fn drop_nulls_without_subset_checks_every_column() {
        let table = Table::new(vec![
            Column::new("a", vec![Cell::Int(1), Cell::Null]),
            Column::new("b", vec![Cell::Int(1), Cell::Int(2)]),
        ])
        .unwrap();
        assert_eq!(table.drop_nulls().n_rows(), 1);
    }

    #[test]
    fn drop_nulls_on_unknown_column_is_missing_input() {
        let err = sample().drop_nulls_in(&["nope"]).unwrap_err();
        assert_eq!(err.kind(), evalkit_core::ErrorKind::MissingInput);
    }

    #[test]
    fn float_column_maps_null_to_nan() {
        let values = sample().float_column("score").unwrap();
        assert!(values[1].is_nan());
        assert!(values[2].is_nan());
    }

    #[test]
    fn cast_float_to_int_truncates() {
        let table = Table::new(vec![Column::from_f64("x", &[1.9, -2.5])]).unwrap();
        let cast = table.cast("x", DType::Int).unwrap();
        assert_eq!(cast.column("x").unwrap().cells, vec![Cell::Int(1), Cell::Int(-2)]);
    }

    #[test]
    fn cast_nan_to_int_fails() {
        let table = Table::new(vec![Column::from_f64("x", &[f64::NAN])]).unwrap();
        assert!(table.cast("x", DType::Int).is_err());
    }

    #[test]
    fn rename_refuses_collisions() {
        assert!(sample().rename("label", "score").is_err());
        let renamed = sample().rename("label", "y_true").unwrap();
        assert!(renamed.has_column("y_true"));
        assert_eq!(renamed.missing_columns(&["label", "y_true"]), vec!["label"]);
    }
}
