// sluice-core/src/domain/pipeline/config.rs

//! Declarative pipeline definitions.
//!
//! Every component kind is a closed variant tagged by `class`, so an unknown kind
//! fails at deserialization time as a configuration error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::dataset::Value;
use crate::domain::error::DomainError;
use crate::domain::quality::QualityRule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig<K> {
    pub name: String,
    #[serde(flatten)]
    pub kind: K,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Rows embedded in the configuration itself.
    Inline {
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<Value>>,
    },
    /// Any DuckDB query, including `read_csv_auto(...)` style file scans.
    #[serde(rename = "duckdb")]
    DuckDb {
        #[serde(default)]
        database: Option<PathBuf>,
        query: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum TransformerKind {
    Cleaner {
        #[serde(default = "default_true")]
        auto_clean: bool,
        #[serde(default)]
        cleaning_rules: Vec<CleaningRule>,
    },
    QualityGate {
        #[serde(default)]
        rules: Vec<QualityRule>,
        #[serde(default)]
        strict: bool,
    },
    Enricher {
        #[serde(default)]
        enrichment_rules: Vec<EnrichmentRule>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    #[default]
    Replace,
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum LoaderKind {
    #[serde(rename = "duckdb")]
    DuckDb {
        database: PathBuf,
        table: String,
        #[serde(default)]
        mode: LoadMode,
    },
    /// Pretty JSON array of row objects.
    Json { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaseType {
    Upper,
    Lower,
    #[default]
    Title,
    Sentence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    #[default]
    Mean,
    Median,
    Mode,
    ForwardFill,
    BackwardFill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CleaningRule {
    /// Drops rows whose null share across `columns` exceeds `threshold`.
    /// 0.0 drops a row with any null, 1.0 only rows that are entirely null.
    RemoveNulls {
        #[serde(default)]
        columns: Option<Vec<String>>,
        #[serde(default)]
        threshold: f64,
    },
    StandardizeCase {
        column: String,
        #[serde(default)]
        case_type: CaseType,
    },
    RemoveSpecialChars {
        column: String,
        #[serde(default = "default_special_chars")]
        pattern: String,
        #[serde(default)]
        replacement: String,
    },
    StandardizePhone {
        column: String,
    },
    StandardizeEmail {
        column: String,
    },
    /// An explicit `value` wins over `strategy`.
    FillMissing {
        column: String,
        #[serde(default)]
        strategy: FillStrategy,
        #[serde(default)]
        value: Option<Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePart {
    Year,
    Month,
    Day,
    /// Monday is 0.
    Weekday,
    Quarter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFeature {
    Length,
    WordCount,
    UppercaseCount,
    DigitCount,
}

/// Derived columns. An existing column with the target name is overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnrichmentRule {
    AddTimestamp {
        #[serde(default = "default_timestamp_column")]
        column_name: String,
    },
    /// 1-based position of each row.
    AddRowId {
        #[serde(default = "default_row_id_column")]
        column_name: String,
    },
    /// md5 hex digest of the concatenated source values; nulls contribute nothing.
    AddHash {
        source_columns: Vec<String>,
        target_column: String,
    },
    /// Looks up each source value's text form; unmapped and null values get `default_value`.
    CategoryMapping {
        source_column: String,
        target_column: String,
        mapping: BTreeMap<String, Value>,
        #[serde(default = "default_category")]
        default_value: Value,
    },
    /// Whole years (days / 365) between the birth date and `reference_date` (today by default).
    CalculateAge {
        birth_date_column: String,
        #[serde(default = "default_age_column")]
        target_column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference_date: Option<NaiveDate>,
    },
    /// Adds `<date_column>_<part>` per requested part.
    ExtractDateParts {
        date_column: String,
        #[serde(default = "default_date_parts")]
        parts: Vec<DatePart>,
    },
    /// Adds `<text_column>_<feature>` per requested feature.
    TextFeatures {
        text_column: String,
        #[serde(default = "default_text_features")]
        features: Vec<TextFeature>,
    },
}

fn default_timestamp_column() -> String {
    "processed_timestamp".to_string()
}

fn default_row_id_column() -> String {
    "row_id".to_string()
}

fn default_category() -> Value {
    Value::Text("Other".to_string())
}

fn default_age_column() -> String {
    "age".to_string()
}

fn default_date_parts() -> Vec<DatePart> {
    vec![DatePart::Year, DatePart::Month, DatePart::Day]
}

fn default_text_features() -> Vec<TextFeature> {
    vec![TextFeature::Length, TextFeature::WordCount]
}

fn default_true() -> bool {
    true
}

fn default_special_chars() -> String {
    r"[^\w\s]".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePolicy {
    #[serde(default = "default_true")]
    pub stop_on_error: bool,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            max_retries: 0,
            timeout_seconds: None,
        }
    }
}

/// Post-load monitoring. Metrics are stored under `table_name`, or the pipeline name when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default)]
    pub rules: Vec<QualityRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub extractors: Vec<ComponentConfig<ExtractorKind>>,
    #[serde(default)]
    pub transformers: Vec<ComponentConfig<TransformerKind>>,
    #[serde(default)]
    pub loaders: Vec<ComponentConfig<LoaderKind>>,
    #[serde(default)]
    pub config: PipelinePolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityConfig>,
}

impl PipelineConfig {
    /// Exactly one extractor and at least one loader.
    pub fn check_shape(&self, pipeline: &str) -> Result<(), DomainError> {
        if self.extractors.len() != 1 {
            return Err(DomainError::Configuration(format!(
                "Pipeline '{}' needs exactly one extractor, found {}",
                pipeline,
                self.extractors.len()
            )));
        }
        if self.loaders.is_empty() {
            return Err(DomainError::Configuration(format!(
                "Pipeline '{}' needs at least one loader",
                pipeline
            )));
        }
        Ok(())
    }

    pub fn component_count(&self) -> usize {
        self.extractors.len() + self.transformers.len() + self.loaders.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::quality::RuleKind;

    const YAML: &str = r#"
extractors:
  - name: members_src
    class: duckdb
    query: "SELECT * FROM read_csv_auto('members.csv')"
transformers:
  - name: clean
    class: cleaner
    cleaning_rules:
      - type: standardize_email
        column: email
      - type: fill_missing
        column: age
        strategy: median
  - name: gate
    class: quality_gate
    strict: true
    rules:
      - name: email_present
        type: not_null
        column: email
        severity: error
loaders:
  - name: warehouse
    class: duckdb
    database: warehouse.duckdb
    table: members
    mode: append
config:
  stop_on_error: false
  max_retries: 2
"#;

    #[test]
    fn test_parse_full_definition() {
        let cfg: PipelineConfig = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(cfg.component_count(), 4);
        assert!(!cfg.config.stop_on_error);
        assert_eq!(cfg.config.max_retries, 2);

        match &cfg.transformers[0].kind {
            TransformerKind::Cleaner { auto_clean, cleaning_rules } => {
                assert!(*auto_clean);
                assert_eq!(cleaning_rules.len(), 2);
                assert!(matches!(
                    cleaning_rules[1],
                    CleaningRule::FillMissing { strategy: FillStrategy::Median, .. }
                ));
            }
            other => panic!("unexpected transformer {:?}", other),
        }
        match &cfg.transformers[1].kind {
            TransformerKind::QualityGate { rules, strict } => {
                assert!(*strict);
                assert!(matches!(rules[0].kind, RuleKind::NotNull { .. }));
            }
            other => panic!("unexpected transformer {:?}", other),
        }
        assert!(matches!(
            cfg.loaders[0].kind,
            LoaderKind::DuckDb { mode: LoadMode::Append, .. }
        ));
        cfg.check_shape("members").unwrap();
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let yaml = "extractors:\n  - name: api\n    class: rest\n    url: http://x\n";
        let err = serde_yaml::from_str::<PipelineConfig>(yaml).unwrap_err();
        assert!(err.to_string().contains("rest"));
    }

    #[test]
    fn test_policy_defaults() {
        let cfg: PipelineConfig = serde_yaml::from_str("loaders: []\n").unwrap();
        assert!(cfg.config.stop_on_error);
        assert_eq!(cfg.config.max_retries, 0);
        assert!(cfg.config.timeout_seconds.is_none());
    }

    #[test]
    fn test_shape_errors() {
        let cfg = PipelineConfig::default();
        assert!(matches!(
            cfg.check_shape("empty"),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn test_parse_enricher_rules() {
        let yaml = r#"
name: enrich
class: enricher
enrichment_rules:
  - type: add_row_id
  - type: add_hash
    source_columns: [first_name, last_name]
    target_column: member_key
  - type: category_mapping
    source_column: genre
    target_column: genre_group
    mapping: { sci-fi: Fiction, biography: Non-Fiction }
  - type: calculate_age
    birth_date_column: birth_date
    reference_date: "2024-01-01"
  - type: extract_date_parts
    date_column: joined
    parts: [year, quarter]
  - type: text_features
    text_column: title
"#;
        let c: ComponentConfig<TransformerKind> = serde_yaml::from_str(yaml).unwrap();
        let TransformerKind::Enricher { enrichment_rules } = c.kind else {
            panic!("expected an enricher");
        };
        assert_eq!(enrichment_rules.len(), 6);
        assert!(matches!(
            &enrichment_rules[0],
            EnrichmentRule::AddRowId { column_name } if column_name == "row_id"
        ));
        assert!(matches!(
            &enrichment_rules[2],
            EnrichmentRule::CategoryMapping { default_value: Value::Text(d), .. } if d == "Other"
        ));
        assert!(matches!(
            &enrichment_rules[3],
            EnrichmentRule::CalculateAge { target_column, reference_date: Some(_), .. } if target_column == "age"
        ));
        assert!(matches!(
            &enrichment_rules[5],
            EnrichmentRule::TextFeatures { features, .. }
                if features == &vec![TextFeature::Length, TextFeature::WordCount]
        ));

        let bad = "name: e\nclass: enricher\nenrichment_rules:\n  - type: lookup_everything\n";
        assert!(serde_yaml::from_str::<ComponentConfig<TransformerKind>>(bad).is_err());
    }
}
