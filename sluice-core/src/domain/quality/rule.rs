// sluice-core/src/domain/quality/rule.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Warning,
    Error,
}

/// The predicate a rule evaluates. Tagged by `type` in configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    NotNull {
        column: String,
    },
    Unique {
        column: String,
    },
    Range {
        column: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Pattern {
        column: String,
        pattern: String,
    },
    Completeness {
        #[serde(default = "default_completeness")]
        threshold: f64,
    },
}

impl RuleKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RuleKind::NotNull { .. } => "not_null",
            RuleKind::Unique { .. } => "unique",
            RuleKind::Range { .. } => "range",
            RuleKind::Pattern { .. } => "pattern",
            RuleKind::Completeness { .. } => "completeness",
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            RuleKind::NotNull { column }
            | RuleKind::Unique { column }
            | RuleKind::Range { column, .. }
            | RuleKind::Pattern { column, .. } => Some(column),
            RuleKind::Completeness { .. } => None,
        }
    }
}

fn default_completeness() -> f64 {
    0.95
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QualityRule {
    pub name: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl QualityRule {
    pub fn new(name: impl Into<String>, severity: Severity, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            severity,
            kind,
        }
    }
}
