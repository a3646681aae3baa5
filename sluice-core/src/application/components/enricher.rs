// sluice-core/src/application/components/enricher.rs

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{info, warn};

use crate::domain::dataset::{Dataset, Value};
use crate::domain::error::{BoxError, DomainError};
use crate::domain::pipeline::{DatePart, EnrichmentRule, TextFeature};
use crate::domain::quality::analysis::parse_timestamp;
use crate::ports::component::{StageContext, Transformer};

/// Adds derived columns. Rules run in order, so later rules can read columns
/// produced by earlier ones. A rule whose source column is missing is skipped
/// with a stage warning.
pub struct Enricher {
    rules: Vec<EnrichmentRule>,
}

impl Enricher {
    pub fn new(rules: Vec<EnrichmentRule>) -> Result<Self, DomainError> {
        for rule in &rules {
            match rule {
                EnrichmentRule::AddHash { source_columns, .. } if source_columns.is_empty() => {
                    return Err(DomainError::Configuration(
                        "add_hash needs at least one source column".to_string(),
                    ));
                }
                EnrichmentRule::ExtractDateParts { parts, .. } if parts.is_empty() => {
                    return Err(DomainError::Configuration(
                        "extract_date_parts needs at least one part".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(Self { rules })
    }

    pub fn enrich(&self, data: &Dataset, ctx: &mut StageContext) -> Dataset {
        self.enrich_at(data, ctx, Utc::now())
    }

    /// `now` stamps `add_timestamp` and is the default age reference.
    pub fn enrich_at(&self, data: &Dataset, ctx: &mut StageContext, now: DateTime<Utc>) -> Dataset {
        let mut df = data.clone();
        df.normalize();
        let before = df.column_count();

        for rule in &self.rules {
            if let Err(reason) = apply_rule(&mut df, rule, now) {
                warn!(rule = rule_name(rule), %reason, "Failed to apply enrichment rule");
                ctx.warn(format!(
                    "enrichment rule '{}' skipped: {}",
                    rule_name(rule),
                    reason
                ));
            }
        }

        info!(
            "Data enrichment completed: {} -> {} columns",
            before,
            df.column_count()
        );
        df
    }
}

#[async_trait]
impl Transformer for Enricher {
    async fn transform(&self, data: &Dataset, ctx: &mut StageContext) -> Result<Dataset, BoxError> {
        Ok(self.enrich(data, ctx))
    }
}

fn rule_name(rule: &EnrichmentRule) -> &'static str {
    match rule {
        EnrichmentRule::AddTimestamp { .. } => "add_timestamp",
        EnrichmentRule::AddRowId { .. } => "add_row_id",
        EnrichmentRule::AddHash { .. } => "add_hash",
        EnrichmentRule::CategoryMapping { .. } => "category_mapping",
        EnrichmentRule::CalculateAge { .. } => "calculate_age",
        EnrichmentRule::ExtractDateParts { .. } => "extract_date_parts",
        EnrichmentRule::TextFeatures { .. } => "text_features",
    }
}

fn require(df: &Dataset, column: &str) -> Result<usize, String> {
    df.column_index(column)
        .ok_or_else(|| format!("column '{column}' not found"))
}

fn derive(df: &Dataset, idx: usize, f: impl Fn(&Value) -> Value) -> Vec<Value> {
    df.rows
        .iter()
        .map(|row| row.get(idx).map(&f).unwrap_or(Value::Null))
        .collect()
}

fn apply_rule(df: &mut Dataset, rule: &EnrichmentRule, now: DateTime<Utc>) -> Result<(), String> {
    match rule {
        EnrichmentRule::AddTimestamp { column_name } => {
            let stamp = Value::Text(now.format("%Y-%m-%d %H:%M:%S").to_string());
            df.set_column(column_name, vec![stamp; df.row_count()]);
        }
        EnrichmentRule::AddRowId { column_name } => {
            let ids = (1..=df.row_count() as i64).map(Value::Int).collect();
            df.set_column(column_name, ids);
        }
        EnrichmentRule::AddHash {
            source_columns,
            target_column,
        } => {
            let indices: Vec<usize> = source_columns
                .iter()
                .map(|c| require(df, c))
                .collect::<Result<_, _>>()?;
            let hashes = df
                .rows
                .iter()
                .map(|row| {
                    let key: String = indices
                        .iter()
                        .filter_map(|&i| row.get(i))
                        .filter(|v| !v.is_null())
                        .map(Value::to_string)
                        .collect();
                    Value::Text(format!("{:x}", md5::compute(key.as_bytes())))
                })
                .collect();
            df.set_column(target_column, hashes);
        }
        EnrichmentRule::CategoryMapping {
            source_column,
            target_column,
            mapping,
            default_value,
        } => {
            let idx = require(df, source_column)?;
            let mapped = derive(df, idx, |v| {
                if v.is_null() {
                    return default_value.clone();
                }
                mapping
                    .get(&v.to_string())
                    .cloned()
                    .unwrap_or_else(|| default_value.clone())
            });
            df.set_column(target_column, mapped);
        }
        EnrichmentRule::CalculateAge {
            birth_date_column,
            target_column,
            reference_date,
        } => {
            let idx = require(df, birth_date_column)?;
            let reference = reference_date.unwrap_or_else(|| now.date_naive());
            let ages = derive(df, idx, |v| match parse_date(v) {
                Some(born) => Value::Int((reference - born).num_days().div_euclid(365)),
                None => Value::Null,
            });
            df.set_column(target_column, ages);
        }
        EnrichmentRule::ExtractDateParts { date_column, parts } => {
            let idx = require(df, date_column)?;
            for part in parts {
                let values = derive(df, idx, |v| match parse_date(v) {
                    Some(d) => Value::Int(date_part(d, *part)),
                    None => Value::Null,
                });
                df.set_column(&format!("{date_column}_{}", part_suffix(*part)), values);
            }
        }
        EnrichmentRule::TextFeatures {
            text_column,
            features,
        } => {
            let idx = require(df, text_column)?;
            for feature in features {
                let values = derive(df, idx, |v| match v {
                    Value::Null => Value::Null,
                    other => Value::Int(text_feature(&other.to_string(), *feature)),
                });
                df.set_column(&format!("{text_column}_{}", feature_suffix(*feature)), values);
            }
        }
    }
    Ok(())
}

fn parse_date(v: &Value) -> Option<NaiveDate> {
    parse_timestamp(v).map(|t| t.date_naive())
}

fn date_part(d: NaiveDate, part: DatePart) -> i64 {
    match part {
        DatePart::Year => i64::from(d.year()),
        DatePart::Month => i64::from(d.month()),
        DatePart::Day => i64::from(d.day()),
        DatePart::Weekday => i64::from(d.weekday().num_days_from_monday()),
        DatePart::Quarter => i64::from((d.month() - 1) / 3 + 1),
    }
}

fn part_suffix(part: DatePart) -> &'static str {
    match part {
        DatePart::Year => "year",
        DatePart::Month => "month",
        DatePart::Day => "day",
        DatePart::Weekday => "weekday",
        DatePart::Quarter => "quarter",
    }
}

fn text_feature(s: &str, feature: TextFeature) -> i64 {
    let count = match feature {
        TextFeature::Length => s.chars().count(),
        TextFeature::WordCount => s.split_whitespace().count(),
        TextFeature::UppercaseCount => s.chars().filter(char::is_ascii_uppercase).count(),
        TextFeature::DigitCount => s.chars().filter(char::is_ascii_digit).count(),
    };
    count as i64
}

fn feature_suffix(feature: TextFeature) -> &'static str {
    match feature {
        TextFeature::Length => "length",
        TextFeature::WordCount => "word_count",
        TextFeature::UppercaseCount => "uppercase_count",
        TextFeature::DigitCount => "digit_count",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dataset::DataType;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn ctx() -> StageContext {
        StageContext::new("p", "e")
    }

    fn text(s: &str) -> Value {
        Value::Text(s.into())
    }

    fn books() -> Dataset {
        Dataset::from_rows(
            vec!["title", "genre", "published"],
            vec![
                vec![text("Dune Messiah 2"), text("sci-fi"), text("1969-10-15")],
                vec![text("Emma"), text("romance"), text("not a date")],
                vec![Value::Null, Value::Null, Value::Null],
            ],
        )
    }

    fn column<'a>(df: &'a Dataset, name: &str) -> Vec<&'a Value> {
        df.column(name).unwrap()
    }

    #[test]
    fn test_row_id_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let out = Enricher::new(vec![
            EnrichmentRule::AddRowId {
                column_name: "row_id".into(),
            },
            EnrichmentRule::AddTimestamp {
                column_name: "processed_timestamp".into(),
            },
        ])
        .unwrap()
        .enrich_at(&books(), &mut ctx(), now);

        assert_eq!(
            column(&out, "row_id"),
            vec![&Value::Int(1), &Value::Int(2), &Value::Int(3)]
        );
        assert_eq!(column(&out, "processed_timestamp")[0], &text("2024-03-01 12:30:00"));
        assert_eq!(out.column_count(), 5);
    }

    #[test]
    fn test_hash_is_stable_and_ignores_nulls() {
        let enricher = Enricher::new(vec![EnrichmentRule::AddHash {
            source_columns: vec!["title".into(), "genre".into()],
            target_column: "key".into(),
        }])
        .unwrap();
        let out = enricher.enrich(&books(), &mut ctx());
        let expected = format!("{:x}", md5::compute("Dune Messiah 2sci-fi".as_bytes()));
        assert_eq!(column(&out, "key")[0], &Value::Text(expected));
        let empty = format!("{:x}", md5::compute("".as_bytes()));
        assert_eq!(column(&out, "key")[2], &Value::Text(empty));
    }

    #[test]
    fn test_category_mapping_uses_default() {
        let mut mapping = BTreeMap::new();
        mapping.insert("sci-fi".to_string(), text("Science Fiction"));
        let out = Enricher::new(vec![EnrichmentRule::CategoryMapping {
            source_column: "genre".into(),
            target_column: "genre".into(),
            mapping,
            default_value: text("Other"),
        }])
        .unwrap()
        .enrich(&books(), &mut ctx());

        assert_eq!(
            column(&out, "genre"),
            vec![&text("Science Fiction"), &text("Other"), &text("Other")]
        );
        assert_eq!(out.column_count(), 3);
    }

    #[test]
    fn test_age_and_date_parts() {
        let out = Enricher::new(vec![
            EnrichmentRule::CalculateAge {
                birth_date_column: "published".into(),
                target_column: "age".into(),
                reference_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            },
            EnrichmentRule::ExtractDateParts {
                date_column: "published".into(),
                parts: vec![DatePart::Year, DatePart::Weekday, DatePart::Quarter],
            },
        ])
        .unwrap()
        .enrich(&books(), &mut ctx());

        assert_eq!(column(&out, "age"), vec![&Value::Int(54), &Value::Null, &Value::Null]);
        assert_eq!(column(&out, "published_year")[0], &Value::Int(1969));
        // 1969-10-15 was a Wednesday.
        assert_eq!(column(&out, "published_weekday")[0], &Value::Int(2));
        assert_eq!(column(&out, "published_quarter")[0], &Value::Int(4));
        assert_eq!(out.columns[3].data_type, DataType::Integer);
    }

    #[test]
    fn test_text_features() {
        let out = Enricher::new(vec![EnrichmentRule::TextFeatures {
            text_column: "title".into(),
            features: vec![
                TextFeature::Length,
                TextFeature::WordCount,
                TextFeature::UppercaseCount,
                TextFeature::DigitCount,
            ],
        }])
        .unwrap()
        .enrich(&books(), &mut ctx());

        assert_eq!(column(&out, "title_length")[0], &Value::Int(14));
        assert_eq!(column(&out, "title_word_count")[0], &Value::Int(3));
        assert_eq!(column(&out, "title_uppercase_count")[0], &Value::Int(2));
        assert_eq!(column(&out, "title_digit_count")[0], &Value::Int(1));
        assert_eq!(column(&out, "title_length")[2], &Value::Null);
    }

    #[test]
    fn test_missing_source_is_skipped_with_warning() {
        let mut ctx = ctx();
        let out = Enricher::new(vec![
            EnrichmentRule::TextFeatures {
                text_column: "summary".into(),
                features: vec![TextFeature::Length],
            },
            EnrichmentRule::AddRowId {
                column_name: "row_id".into(),
            },
        ])
        .unwrap()
        .enrich(&books(), &mut ctx);

        assert!(out.column_index("row_id").is_some());
        let warnings = ctx.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("text_features"));
    }

    #[test]
    fn test_empty_hash_sources_are_rejected() {
        let err = Enricher::new(vec![EnrichmentRule::AddHash {
            source_columns: vec![],
            target_column: "h".into(),
        }])
        .err()
        .unwrap();
        assert!(matches!(err, DomainError::Configuration(_)));
    }
}
