// sluice-core/src/application/components/cleaner.rs

use async_trait::async_trait;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::domain::dataset::{Dataset, Value};
use crate::domain::error::{BoxError, DomainError};
use crate::domain::pipeline::{CaseType, CleaningRule, FillStrategy};
use crate::domain::quality::analysis::is_email;
use crate::ports::component::{StageContext, Transformer};

struct CompiledRule {
    rule: CleaningRule,
    pattern: Option<Regex>,
}

/// General purpose cleaning transformer.
///
/// Auto-clean drops empty rows, trims text and removes duplicates. Configured rules
/// then run in order. A rule that cannot apply (unknown column, non-numeric mean) is
/// reported as a stage warning and the data passes through that rule untouched.
pub struct Cleaner {
    auto_clean: bool,
    rules: Vec<CompiledRule>,
}

impl Cleaner {
    pub fn new(auto_clean: bool, rules: Vec<CleaningRule>) -> Result<Self, DomainError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = match &rule {
                    CleaningRule::RemoveSpecialChars { pattern, .. } => {
                        Some(Regex::new(pattern).map_err(|e| {
                            DomainError::Configuration(format!(
                                "invalid remove_special_chars pattern '{pattern}': {e}"
                            ))
                        })?)
                    }
                    _ => None,
                };
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Self { auto_clean, rules })
    }

    /// Synchronous core of the transform.
    pub fn clean(&self, data: &Dataset, ctx: &mut StageContext) -> Dataset {
        let mut df = data.clone();
        let ragged = df.normalize();
        if ragged > 0 {
            warn!(rows = ragged, "Rows did not match the column count and were resized");
        }

        if self.auto_clean {
            let before = df.row_count();
            auto_clean(&mut df);
            info!("Auto-cleaning removed {} rows", before - df.row_count());
        }

        for compiled in &self.rules {
            if let Err(reason) = apply_rule(&mut df, compiled) {
                warn!(rule = rule_name(&compiled.rule), %reason, "Failed to apply cleaning rule");
                ctx.warn(format!(
                    "cleaning rule '{}' skipped: {}",
                    rule_name(&compiled.rule),
                    reason
                ));
            }
        }

        df.refresh_types();
        info!(
            "Data cleaning completed: {} -> {} rows",
            data.row_count(),
            df.row_count()
        );
        df
    }
}

#[async_trait]
impl Transformer for Cleaner {
    async fn transform(&self, data: &Dataset, ctx: &mut StageContext) -> Result<Dataset, BoxError> {
        Ok(self.clean(data, ctx))
    }
}

fn rule_name(rule: &CleaningRule) -> &'static str {
    match rule {
        CleaningRule::RemoveNulls { .. } => "remove_nulls",
        CleaningRule::StandardizeCase { .. } => "standardize_case",
        CleaningRule::RemoveSpecialChars { .. } => "remove_special_chars",
        CleaningRule::StandardizePhone { .. } => "standardize_phone",
        CleaningRule::StandardizeEmail { .. } => "standardize_email",
        CleaningRule::FillMissing { .. } => "fill_missing",
    }
}

fn auto_clean(df: &mut Dataset) {
    df.rows.retain(|row| row.iter().any(|v| !v.is_null()));

    for row in df.rows.iter_mut() {
        for cell in row.iter_mut() {
            if let Value::Text(s) = cell {
                let trimmed = s.trim();
                *cell = if trimmed.is_empty() {
                    Value::Null
                } else {
                    Value::Text(trimmed.to_string())
                };
            }
        }
    }

    let mut seen: HashSet<Vec<Value>> = HashSet::with_capacity(df.rows.len());
    df.rows.retain(|row| seen.insert(row.clone()));
}

fn require(df: &Dataset, column: &str) -> Result<usize, String> {
    df.column_index(column)
        .ok_or_else(|| format!("column '{column}' not found"))
}

fn apply_rule(df: &mut Dataset, compiled: &CompiledRule) -> Result<(), String> {
    match &compiled.rule {
        CleaningRule::RemoveNulls { columns, threshold } => {
            let indices: Vec<usize> = match columns {
                Some(names) => names
                    .iter()
                    .map(|c| require(df, c))
                    .collect::<Result<_, _>>()?,
                None => (0..df.column_count()).collect(),
            };
            remove_nulls(df, &indices, *threshold);
        }
        CleaningRule::StandardizeCase { column, case_type } => {
            let idx = require(df, column)?;
            map_text(df, idx, |s| Value::Text(change_case(s, *case_type)));
        }
        CleaningRule::RemoveSpecialChars {
            column,
            replacement,
            ..
        } => {
            let idx = require(df, column)?;
            if let Some(re) = &compiled.pattern {
                map_text(df, idx, |s| {
                    Value::Text(re.replace_all(s, replacement.as_str()).into_owned())
                });
            }
        }
        CleaningRule::StandardizePhone { column } => {
            let idx = require(df, column)?;
            for row in df.rows.iter_mut() {
                if !row[idx].is_null() {
                    if let Some(formatted) = standardize_phone(&row[idx].to_string()) {
                        row[idx] = Value::Text(formatted);
                    }
                }
            }
        }
        CleaningRule::StandardizeEmail { column } => {
            let idx = require(df, column)?;
            for row in df.rows.iter_mut() {
                row[idx] = match &row[idx] {
                    Value::Null => Value::Null,
                    Value::Text(s) => {
                        let email = Value::Text(s.trim().to_lowercase());
                        if is_email(&email) { email } else { Value::Null }
                    }
                    _ => Value::Null,
                };
            }
        }
        CleaningRule::FillMissing {
            column,
            strategy,
            value,
        } => {
            let idx = require(df, column)?;
            match value {
                Some(v) => fill_constant(df, idx, v),
                None => fill_with_strategy(df, idx, *strategy)?,
            }
        }
    }
    Ok(())
}

/// Threshold 0 drops rows with any null in the subset, 1 drops rows that are
/// entirely null there. In between, rows whose null share exceeds the threshold go.
fn remove_nulls(df: &mut Dataset, indices: &[usize], threshold: f64) {
    if indices.is_empty() {
        return;
    }
    let width = indices.len() as f64;
    df.rows.retain(|row| {
        let nulls = indices.iter().filter(|&&i| row[i].is_null()).count();
        if threshold >= 1.0 {
            nulls < indices.len()
        } else {
            nulls as f64 / width <= threshold
        }
    });
}

fn map_text(df: &mut Dataset, idx: usize, f: impl Fn(&str) -> Value) {
    for row in df.rows.iter_mut() {
        if let Value::Text(s) = &row[idx] {
            row[idx] = f(s);
        }
    }
}

fn change_case(s: &str, case: CaseType) -> String {
    match case {
        CaseType::Upper => s.to_uppercase(),
        CaseType::Lower => s.to_lowercase(),
        CaseType::Title => title_case(s),
        CaseType::Sentence => {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        }
    }
}

/// Uppercases the first letter of every alphabetic run, lowercases the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// `None` leaves the original value in place.
fn standardize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 => Some(format!(
            "({}) {}-{}",
            &digits[..3],
            &digits[3..6],
            &digits[6..]
        )),
        11 if digits.starts_with('1') => Some(format!(
            "+1 ({}) {}-{}",
            &digits[1..4],
            &digits[4..7],
            &digits[7..]
        )),
        _ => None,
    }
}

fn fill_constant(df: &mut Dataset, idx: usize, value: &Value) {
    for row in df.rows.iter_mut() {
        if row[idx].is_null() {
            row[idx] = value.clone();
        }
    }
}

fn fill_with_strategy(df: &mut Dataset, idx: usize, strategy: FillStrategy) -> Result<(), String> {
    match strategy {
        FillStrategy::Mean | FillStrategy::Median => {
            let mut numbers = numeric_values(df, idx, strategy)?;
            if numbers.is_empty() {
                return Ok(());
            }
            let fill = if strategy == FillStrategy::Mean {
                numbers.iter().sum::<f64>() / numbers.len() as f64
            } else {
                numbers.sort_by(f64::total_cmp);
                let mid = numbers.len() / 2;
                if numbers.len() % 2 == 0 {
                    (numbers[mid - 1] + numbers[mid]) / 2.0
                } else {
                    numbers[mid]
                }
            };
            fill_constant(df, idx, &Value::Float(fill));
        }
        FillStrategy::Mode => {
            let mut counts: HashMap<&Value, usize> = HashMap::new();
            for v in df.column_values(idx).filter(|v| !v.is_null()) {
                *counts.entry(v).or_default() += 1;
            }
            // Ties resolve to the smallest value.
            let mode = counts
                .into_iter()
                .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.total_cmp(va)))
                .map(|(v, _)| v.clone());
            if let Some(mode) = mode {
                fill_constant(df, idx, &mode);
            }
        }
        FillStrategy::ForwardFill => {
            let mut last: Option<Value> = None;
            for row in df.rows.iter_mut() {
                if row[idx].is_null() {
                    if let Some(v) = &last {
                        row[idx] = v.clone();
                    }
                } else {
                    last = Some(row[idx].clone());
                }
            }
        }
        FillStrategy::BackwardFill => {
            let mut next: Option<Value> = None;
            for row in df.rows.iter_mut().rev() {
                if row[idx].is_null() {
                    if let Some(v) = &next {
                        row[idx] = v.clone();
                    }
                } else {
                    next = Some(row[idx].clone());
                }
            }
        }
    }
    Ok(())
}

fn numeric_values(df: &Dataset, idx: usize, strategy: FillStrategy) -> Result<Vec<f64>, String> {
    df.column_values(idx)
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(format!(
                "strategy '{strategy:?}' needs a numeric column, found '{other}'"
            )),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dataset::DataType;

    fn ctx() -> StageContext {
        StageContext::new("p", "e")
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    #[test]
    fn test_auto_clean_trims_and_dedups() {
        let data = Dataset::from_rows(
            vec!["name", "age"],
            vec![
                vec![text("  ann "), Value::Int(30)],
                vec![text("ann"), Value::Int(30)],
                vec![Value::Null, Value::Null],
                vec![text("   "), Value::Int(41)],
            ],
        );
        let out = Cleaner::new(true, vec![]).unwrap().clean(&data, &mut ctx());
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.rows[0][0], text("ann"));
        assert_eq!(out.rows[1][0], Value::Null);
    }

    #[test]
    fn test_remove_nulls_thresholds() {
        let data = Dataset::from_rows(
            vec!["a", "b"],
            vec![
                vec![Value::Int(1), Value::Int(2)],
                vec![Value::Int(1), Value::Null],
                vec![Value::Null, Value::Null],
            ],
        );
        let any = Cleaner::new(
            false,
            vec![CleaningRule::RemoveNulls { columns: None, threshold: 0.0 }],
        )
        .unwrap();
        assert_eq!(any.clean(&data, &mut ctx()).row_count(), 1);

        let all = Cleaner::new(
            false,
            vec![CleaningRule::RemoveNulls { columns: None, threshold: 1.0 }],
        )
        .unwrap();
        assert_eq!(all.clean(&data, &mut ctx()).row_count(), 2);

        let half = Cleaner::new(
            false,
            vec![CleaningRule::RemoveNulls { columns: None, threshold: 0.5 }],
        )
        .unwrap();
        assert_eq!(half.clean(&data, &mut ctx()).row_count(), 2);
    }

    #[test]
    fn test_case_and_special_chars() {
        let data = Dataset::from_rows(vec!["title"], vec![vec![text("the LORD of the rings!")]]);
        let cleaner = Cleaner::new(
            false,
            vec![
                CleaningRule::RemoveSpecialChars {
                    column: "title".into(),
                    pattern: r"[^\w\s]".into(),
                    replacement: String::new(),
                },
                CleaningRule::StandardizeCase {
                    column: "title".into(),
                    case_type: CaseType::Title,
                },
            ],
        )
        .unwrap();
        let out = cleaner.clean(&data, &mut ctx());
        assert_eq!(out.rows[0][0], text("The Lord Of The Rings"));
        assert_eq!(change_case("hELLO world", CaseType::Sentence), "Hello world");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn test_phone_and_email_standardization() {
        let data = Dataset::from_rows(
            vec!["phone", "email"],
            vec![
                vec![text("555.123.4567"), text("  Ann@Example.COM ")],
                vec![text("1-555-123-4567"), text("not-an-email")],
                vec![text("12345"), Value::Null],
            ],
        );
        let cleaner = Cleaner::new(
            false,
            vec![
                CleaningRule::StandardizePhone { column: "phone".into() },
                CleaningRule::StandardizeEmail { column: "email".into() },
            ],
        )
        .unwrap();
        let out = cleaner.clean(&data, &mut ctx());
        assert_eq!(out.rows[0][0], text("(555) 123-4567"));
        assert_eq!(out.rows[1][0], text("+1 (555) 123-4567"));
        assert_eq!(out.rows[2][0], text("12345"));
        assert_eq!(out.rows[0][1], text("ann@example.com"));
        assert_eq!(out.rows[1][1], Value::Null);
    }

    #[test]
    fn test_fill_strategies() {
        let data = Dataset::from_rows(
            vec!["n"],
            vec![
                vec![Value::Int(1)],
                vec![Value::Null],
                vec![Value::Int(3)],
                vec![Value::Int(3)],
            ],
        );
        let fill = |strategy| {
            Cleaner::new(
                false,
                vec![CleaningRule::FillMissing {
                    column: "n".into(),
                    strategy,
                    value: None,
                }],
            )
            .unwrap()
            .clean(&data, &mut ctx())
            .rows[1][0]
                .clone()
        };
        assert_eq!(fill(FillStrategy::Mean), Value::Float(7.0 / 3.0));
        assert_eq!(fill(FillStrategy::Median), Value::Float(3.0));
        assert_eq!(fill(FillStrategy::Mode), Value::Int(3));
        assert_eq!(fill(FillStrategy::ForwardFill), Value::Int(1));
        assert_eq!(fill(FillStrategy::BackwardFill), Value::Int(3));
    }

    #[test]
    fn test_unknown_column_is_skipped_with_warning() {
        let data = Dataset::from_rows(vec!["a"], vec![vec![text("x")]]);
        let cleaner = Cleaner::new(
            false,
            vec![CleaningRule::StandardizeEmail { column: "missing".into() }],
        )
        .unwrap();
        let mut ctx = ctx();
        let out = cleaner.clean(&data, &mut ctx);
        assert_eq!(out, data);
        let warnings = ctx.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("missing"));
    }

    #[test]
    fn test_types_refreshed_after_fill() {
        let data = Dataset::from_rows(vec!["n"], vec![vec![Value::Int(2)], vec![Value::Null]]);
        let out = Cleaner::new(
            false,
            vec![CleaningRule::FillMissing {
                column: "n".into(),
                strategy: FillStrategy::Mean,
                value: None,
            }],
        )
        .unwrap()
        .clean(&data, &mut ctx());
        assert_eq!(out.columns[0].data_type, DataType::Float);
    }

    #[test]
    fn test_bad_pattern_is_configuration_error() {
        let err = Cleaner::new(
            false,
            vec![CleaningRule::RemoveSpecialChars {
                column: "a".into(),
                pattern: "[".into(),
                replacement: String::new(),
            }],
        )
        .err()
        .unwrap();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn test_ragged_rows_from_host_extractor_do_not_panic() {
        use crate::domain::dataset::Column;
        let data = Dataset::new(
            vec![Column::new("a", DataType::Integer), Column::new("email", DataType::Text)],
            vec![
                vec![Value::Int(1)],
                vec![Value::Int(2), text(" Bob@Example.COM "), Value::Int(9)],
            ],
        );
        let out = Cleaner::new(
            false,
            vec![
                CleaningRule::StandardizeEmail {
                    column: "email".into(),
                },
                CleaningRule::StandardizePhone {
                    column: "email".into(),
                },
                CleaningRule::RemoveNulls {
                    columns: None,
                    threshold: 1.0,
                },
            ],
        )
        .unwrap()
        .clean(&data, &mut ctx());

        assert_eq!(out.row_count(), 2);
        assert!(out.rows.iter().all(|r| r.len() == 2));
        assert_eq!(out.rows[0][1], Value::Null);
        assert_eq!(out.rows[1][1], text("bob@example.com"));
    }
}
