// sluice-core/src/domain/quality/analysis.rs

//! Heuristic quality measurements over a dataset.
//!
//! Column roles are guessed from names: `email`/`phone`/date-like tokens drive validity,
//! identifier-like tokens drive uniqueness, an `_id` suffix marks a foreign key.
//! Every ratio with an empty denominator is reported as 0.0.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::domain::dataset::{Dataset, Value};
use crate::domain::quality::metric::{MetricType, QualityMetric, QualityThresholds};
use crate::domain::quality::profile::ratio;
use crate::domain::quality::validator::ValidationReport;

pub(crate) fn re_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
    })
}

fn re_phone() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\+?1?[-.\s]?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}$")
            .unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
    })
}

const DATE_TOKENS: [&str; 4] = ["date", "time", "created", "updated"];
const UNIQUE_TOKENS: [&str; 4] = ["id", "email", "isbn", "code"];

fn has_token(column: &str, tokens: &[&str]) -> bool {
    let lower = column.to_lowercase();
    tokens.iter().any(|t| lower.contains(t))
}

/// Every measurement category, in a stable order.
pub fn analyze(
    data: &Dataset,
    thresholds: &QualityThresholds,
    rules: Option<&ValidationReport>,
    now: DateTime<Utc>,
) -> Vec<QualityMetric> {
    let mut metrics = completeness(data, thresholds.completeness, now);
    metrics.extend(validity(data, thresholds.validity, now));
    metrics.extend(uniqueness(data, thresholds.uniqueness, now));
    metrics.extend(consistency(data, thresholds.consistency, now));
    metrics.extend(timeliness(data, thresholds.timeliness_hours, now));
    if let Some(report) = rules {
        metrics.extend(accuracy(report, thresholds.accuracy, now));
    }
    metrics
}

pub fn completeness(data: &Dataset, threshold: f64, now: DateTime<Utc>) -> Vec<QualityMetric> {
    let overall = ratio(data.non_null_cells(), data.cell_count());
    let mut metrics = vec![QualityMetric::measure(
        "overall_completeness",
        MetricType::Completeness,
        overall,
        threshold,
        format!("Overall data completeness: {:.2}%", overall * 100.0),
        now,
    )];

    for (idx, column) in data.columns.iter().enumerate() {
        let value = ratio(data.non_null_count(idx), data.row_count());
        metrics.push(QualityMetric::measure(
            format!("completeness_{}", column.name),
            MetricType::Completeness,
            value,
            threshold,
            format!("Column '{}' completeness: {:.2}%", column.name, value * 100.0),
            now,
        ));
    }
    metrics
}

pub fn validity(data: &Dataset, threshold: f64, now: DateTime<Utc>) -> Vec<QualityMetric> {
    let mut metrics = Vec::new();

    for (idx, column) in data.columns.iter().enumerate() {
        let lower = column.name.to_lowercase();
        let (kind, check): (&str, fn(&Value) -> bool) = if lower.contains("email") {
            ("email", is_email)
        } else if lower.contains("phone") {
            ("phone", is_phone)
        } else if has_token(&column.name, &DATE_TOKENS) {
            ("date", is_timestamp)
        } else {
            continue;
        };

        let present: Vec<&Value> = data.column_values(idx).filter(|v| !v.is_null()).collect();
        let valid = present.iter().filter(|v| check(v)).count();
        let value = ratio(valid, present.len());

        metrics.push(QualityMetric::measure(
            format!("{}_validity_{}", kind, column.name),
            MetricType::Validity,
            value,
            threshold,
            format!(
                "{} validity for '{}': {:.2}%",
                capitalize(kind),
                column.name,
                value * 100.0
            ),
            now,
        ));
    }
    metrics
}

pub fn uniqueness(data: &Dataset, threshold: f64, now: DateTime<Utc>) -> Vec<QualityMetric> {
    let mut metrics = Vec::new();

    for (idx, column) in data.columns.iter().enumerate() {
        if !has_token(&column.name, &UNIQUE_TOKENS) {
            continue;
        }
        let present: Vec<&Value> = data.column_values(idx).filter(|v| !v.is_null()).collect();
        let distinct = present.iter().collect::<HashSet<_>>().len();
        let value = ratio(distinct, present.len());

        metrics.push(QualityMetric::measure(
            format!("uniqueness_{}", column.name),
            MetricType::Uniqueness,
            value,
            threshold,
            format!(
                "Uniqueness for '{}': {:.2}% ({}/{})",
                column.name,
                value * 100.0,
                distinct,
                present.len()
            ),
            now,
        ));
    }

    let duplicates = data.duplicate_row_count();
    let value = ratio(data.row_count() - duplicates, data.row_count());
    metrics.push(QualityMetric::measure(
        "row_uniqueness",
        MetricType::Uniqueness,
        value,
        threshold,
        format!(
            "Row uniqueness: {:.2}% ({} duplicates)",
            value * 100.0,
            duplicates
        ),
        now,
    ));
    metrics
}

pub fn consistency(data: &Dataset, threshold: f64, now: DateTime<Utc>) -> Vec<QualityMetric> {
    let mut metrics = Vec::new();

    for (idx, column) in data.columns.iter().enumerate() {
        if column.name.ends_with("_id") {
            let value = ratio(data.non_null_count(idx), data.row_count());
            metrics.push(QualityMetric::measure(
                format!("fk_consistency_{}", column.name),
                MetricType::Consistency,
                value,
                threshold,
                format!(
                    "Foreign key consistency for '{}': {:.2}%",
                    column.name,
                    value * 100.0
                ),
                now,
            ));
        }
    }

    for (idx, column) in data.columns.iter().enumerate() {
        let present: Vec<&Value> = data.column_values(idx).filter(|v| !v.is_null()).collect();
        let consistent = present
            .iter()
            .filter(|v| v.coercible_to(column.data_type))
            .count();
        let value = ratio(consistent, present.len());
        metrics.push(QualityMetric::measure(
            format!("type_consistency_{}", column.name),
            MetricType::Consistency,
            value,
            threshold,
            format!(
                "Type consistency for '{}': {:.2}%",
                column.name,
                value * 100.0
            ),
            now,
        ));
    }
    metrics
}

/// Age in hours of the newest timestamp in each date-like column.
/// Columns with no parseable value are skipped.
pub fn timeliness(data: &Dataset, max_age_hours: f64, now: DateTime<Utc>) -> Vec<QualityMetric> {
    data.columns
        .iter()
        .enumerate()
        .filter(|(_, c)| has_token(&c.name, &DATE_TOKENS))
        .filter_map(|(idx, column)| {
            let newest = data.column_values(idx).filter_map(parse_timestamp).max()?;
            let hours = ((now - newest).num_seconds() as f64 / 3600.0).max(0.0);
            Some(QualityMetric::measure(
                format!("freshness_{}", column.name),
                MetricType::Timeliness,
                hours,
                max_age_hours,
                format!("Newest '{}' value is {:.1} hours old", column.name, hours),
                now,
            ))
        })
        .collect()
}

/// One accuracy metric per evaluated rule: the share of checked cells that conform.
pub fn accuracy(report: &ValidationReport, threshold: f64, now: DateTime<Utc>) -> Vec<QualityMetric> {
    report
        .rule_results
        .iter()
        .map(|r| {
            let value = r.conformance();
            QualityMetric::measure(
                format!("accuracy_{}", r.rule_name),
                MetricType::Accuracy,
                value,
                threshold,
                format!("Rule '{}' ({}): {}", r.rule_name, r.rule_type, r.message),
                now,
            )
        })
        .collect()
}

/// Reads a cell as a point in time. Naive text is taken as UTC; numbers are epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Int(secs) => Utc.timestamp_opt(*secs, 0).single(),
        Value::Float(secs) => Utc.timestamp_opt(secs.trunc() as i64, 0).single(),
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Null | Value::Bool(_) => None,
    }
}

pub(crate) fn is_email(v: &Value) -> bool {
    re_email().is_match(&v.to_string())
}

fn is_phone(v: &Value) -> bool {
    re_phone().is_match(&v.to_string())
}

fn is_timestamp(v: &Value) -> bool {
    parse_timestamp(v).is_some()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::quality::metric::MetricStatus;
    use chrono::Duration;

    fn find<'a>(metrics: &'a [QualityMetric], name: &str) -> &'a QualityMetric {
        metrics.iter().find(|m| m.name == name).unwrap()
    }

    fn emails(nulls: usize) -> Dataset {
        let rows = (0..100)
            .map(|i| {
                let email = if i < nulls {
                    Value::Null
                } else {
                    Value::Text(format!("reader{}@library.org", i))
                };
                vec![Value::Int(i as i64), email]
            })
            .collect();
        Dataset::from_rows(vec!["member_id", "email"], rows)
    }

    #[test]
    fn test_column_completeness() {
        let metrics = completeness(&emails(10), 0.95, Utc::now());
        let m = find(&metrics, "completeness_email");
        assert!((m.value - 0.90).abs() < 1e-9);
        assert_eq!(m.status, MetricStatus::Fail);
        assert_eq!(find(&metrics, "completeness_member_id").status, MetricStatus::Pass);
        assert!((find(&metrics, "overall_completeness").value - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_validity_only_on_recognised_columns() {
        let data = Dataset::from_rows(
            vec!["email", "phone", "created_at", "title"],
            vec![
                vec![
                    "a@b.org".into(),
                    "(555) 123-4567".into(),
                    "2024-01-01".into(),
                    "Dune".into(),
                ],
                vec![
                    "broken".into(),
                    "12".into(),
                    "yesterday".into(),
                    "Emma".into(),
                ],
            ],
        );
        let metrics = validity(&data, 0.99, Utc::now());
        assert_eq!(metrics.len(), 3);
        assert_eq!(find(&metrics, "email_validity_email").value, 0.5);
        assert_eq!(find(&metrics, "phone_validity_phone").value, 0.5);
        assert_eq!(find(&metrics, "date_validity_created_at").value, 0.5);
    }

    #[test]
    fn test_uniqueness_and_row_duplicates() {
        let data = Dataset::from_rows(
            vec!["isbn", "title"],
            vec![
                vec!["111".into(), "Dune".into()],
                vec!["111".into(), "Dune".into()],
                vec!["222".into(), "Emma".into()],
                vec!["333".into(), "Ulysses".into()],
            ],
        );
        let metrics = uniqueness(&data, 0.98, Utc::now());
        assert_eq!(metrics.len(), 2);
        assert_eq!(find(&metrics, "uniqueness_isbn").value, 0.75);
        assert_eq!(find(&metrics, "row_uniqueness").value, 0.75);
    }

    #[test]
    fn test_consistency_fk_and_types() {
        let data = Dataset::from_rows(
            vec!["book_id", "copies"],
            vec![
                vec![Value::Int(1), Value::Int(3)],
                vec![Value::Null, Value::Int(2)],
            ],
        );
        let metrics = consistency(&data, 0.95, Utc::now());
        assert_eq!(find(&metrics, "fk_consistency_book_id").value, 0.5);
        assert_eq!(find(&metrics, "type_consistency_copies").value, 1.0);
    }

    #[test]
    fn test_empty_dataset_ratios_are_zero() {
        let data = Dataset::from_rows(vec!["email"], vec![]);
        let metrics = completeness(&data, 0.95, Utc::now());
        assert!(metrics.iter().all(|m| m.value == 0.0));
    }

    #[test]
    fn test_timeliness_hours_since_newest() {
        let now = Utc::now();
        let stamp = (now - Duration::hours(30)).to_rfc3339();
        let data = Dataset::from_rows(vec!["updated_at"], vec![vec![stamp.into()]]);
        let metrics = timeliness(&data, 24.0, now);
        let m = find(&metrics, "freshness_updated_at");
        assert!((m.value - 30.0).abs() < 0.01);
        assert!(m.failed());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp(&"2024-03-01T10:00:00Z".into()).is_some());
        assert!(parse_timestamp(&"2024-03-01 10:00:00".into()).is_some());
        assert!(parse_timestamp(&"2024-03-01".into()).is_some());
        assert!(parse_timestamp(&Value::Int(1_700_000_000)).is_some());
        assert!(parse_timestamp(&"soon".into()).is_none());
    }
}
