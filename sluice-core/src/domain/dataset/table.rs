// sluice-core/src/domain/dataset/table.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::value::{DataType, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// In-memory table threaded through the pipeline stages.
///
/// Rows are stored row-major; every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Builds a dataset from column names, inferring each column's type from its values.
    /// Short rows are padded with nulls, long rows truncated.
    pub fn from_rows<S: Into<String>>(names: Vec<S>, rows: Vec<Vec<Value>>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let width = names.len();
        let rows: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();

        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Column {
                name,
                data_type: infer_type(rows.iter().map(|r| &r[idx])),
            })
            .collect();

        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell_count(&self) -> usize {
        self.row_count() * self.column_count()
    }

    pub fn non_null_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.iter().filter(|v| !v.is_null()).count())
            .sum()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |r| r.get(idx))
    }

    /// Values of the named column, or `None` when the column does not exist.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        self.column_index(name)
            .map(|idx| self.column_values(idx).collect())
    }

    pub fn non_null_count(&self, idx: usize) -> usize {
        self.column_values(idx).filter(|v| !v.is_null()).count()
    }

    /// Rows that repeat an earlier row exactly (the first occurrence is not counted).
    pub fn duplicate_row_count(&self) -> usize {
        let mut seen: HashSet<&[Value]> = HashSet::with_capacity(self.rows.len());
        self.rows
            .iter()
            .filter(|r| !seen.insert(r.as_slice()))
            .count()
    }

    /// Replaces the named column, or appends it when absent. `values` holds one
    /// cell per row; missing cells become null.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        let data_type = infer_type(values.iter());
        let idx = match self.column_index(name) {
            Some(idx) => {
                self.columns[idx].data_type = data_type;
                idx
            }
            None => {
                self.columns.push(Column::new(name, data_type));
                self.columns.len() - 1
            }
        };
        let width = self.columns.len();
        let mut values = values.into_iter();
        for row in self.rows.iter_mut() {
            row.resize(width, Value::Null);
            row[idx] = values.next().unwrap_or(Value::Null);
        }
    }

    /// Pads short rows with nulls and truncates long ones to the column count.
    /// Returns how many rows had the wrong width.
    pub fn normalize(&mut self) -> usize {
        let width = self.columns.len();
        let mut fixed = 0;
        for row in self.rows.iter_mut().filter(|r| r.len() != width) {
            row.resize(width, Value::Null);
            fixed += 1;
        }
        fixed
    }

    /// Re-infers every column type from the current cells (after a transform rewrote them).
    pub fn refresh_types(&mut self) {
        for (idx, column) in self.columns.iter_mut().enumerate() {
            column.data_type = infer_type(self.rows.iter().filter_map(|r| r.get(idx)));
        }
    }
}

fn infer_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut inferred: Option<DataType> = None;
    for value in values {
        let Some(ty) = value.data_type() else {
            continue;
        };
        inferred = match (inferred, ty) {
            (None, t) => Some(t),
            (Some(DataType::Integer), DataType::Float) | (Some(DataType::Float), DataType::Integer) => {
                Some(DataType::Float)
            }
            (Some(prev), t) if prev == t => Some(prev),
            // Mixed kinds fall back to text.
            _ => return DataType::Text,
        };
    }
    inferred.unwrap_or_default()
}
