// sluice-core/src/domain/quality/profile.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::dataset::{DataType, Dataset, Value};

const SAMPLE_SIZE: usize = 10;

/// Per-column statistics. Recomputed on every run, never merged with older profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column_name: String,
    pub data_type: DataType,
    pub null_count: usize,
    pub null_pct: f64,
    pub unique_count: usize,
    pub unique_pct: f64,
    pub min: Option<String>,
    pub max: Option<String>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub stdev: Option<f64>,
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataProfile {
    pub total_rows: usize,
    pub total_columns: usize,
    pub duplicate_rows: usize,
    pub columns: Vec<ColumnProfile>,
}

impl DataProfile {
    pub fn of(data: &Dataset) -> Self {
        let columns = (0..data.column_count())
            .map(|idx| profile_column(data, idx))
            .collect();

        Self {
            total_rows: data.row_count(),
            total_columns: data.column_count(),
            duplicate_rows: data.duplicate_row_count(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.column_name == name)
    }
}

fn profile_column(data: &Dataset, idx: usize) -> ColumnProfile {
    let column = &data.columns[idx];
    let total = data.row_count();
    let present: Vec<&Value> = data.column_values(idx).filter(|v| !v.is_null()).collect();

    let null_count = total - present.len();
    let unique_count = present.iter().collect::<HashSet<_>>().len();

    let (mean, median, stdev) = if column.data_type.is_numeric() {
        let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
        numeric_stats(numbers)
    } else {
        (None, None, None)
    };

    let min = present
        .iter()
        .min_by(|a, b| a.total_cmp(b))
        .map(|v| v.to_string());
    let max = present
        .iter()
        .max_by(|a, b| a.total_cmp(b))
        .map(|v| v.to_string());

    ColumnProfile {
        column_name: column.name.clone(),
        data_type: column.data_type,
        null_count,
        null_pct: ratio(null_count, total),
        unique_count,
        unique_pct: ratio(unique_count, total),
        min,
        max,
        mean,
        median,
        stdev,
        sample_values: present
            .iter()
            .take(SAMPLE_SIZE)
            .map(|v| v.to_string())
            .collect(),
    }
}

/// Mean, median and sample standard deviation (n - 1 denominator).
fn numeric_stats(mut numbers: Vec<f64>) -> (Option<f64>, Option<f64>, Option<f64>) {
    if numbers.is_empty() {
        return (None, None, None);
    }
    let n = numbers.len() as f64;
    let mean = numbers.iter().sum::<f64>() / n;

    numbers.sort_by(|a, b| a.total_cmp(b));
    let mid = numbers.len() / 2;
    let median = if numbers.len() % 2 == 0 {
        (numbers[mid - 1] + numbers[mid]) / 2.0
    } else {
        numbers[mid]
    };

    let stdev = if numbers.len() > 1 {
        let var = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(var.sqrt())
    } else {
        None
    };

    (Some(mean), Some(median), stdev)
}

pub(crate) fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
