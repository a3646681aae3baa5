// sluice-core/src/domain/quality/validator.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::dataset::{Dataset, Value};
use crate::domain::error::DomainError;
use crate::domain::quality::profile::{DataProfile, ratio};
use crate::domain::quality::rule::{QualityRule, RuleKind, Severity};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_name: String,
    pub rule_type: String,
    pub severity: Severity,
    pub passed: bool,
    /// Offending cells (or rows) for column rules, missing cells for completeness.
    pub violations: usize,
    /// Cells the rule looked at; the denominator for conformance ratios.
    pub checked: usize,
    pub message: String,
}

impl RuleResult {
    /// Share of checked cells that conform, in [0, 1].
    pub fn conformance(&self) -> f64 {
        if self.checked == 0 {
            return if self.passed { 1.0 } else { 0.0 };
        }
        1.0 - ratio(self.violations, self.checked)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// False only when an error-severity rule failed.
    pub passed: bool,
    pub total_rules: usize,
    pub passed_rules: usize,
    pub failed_rules: usize,
    pub rule_results: Vec<RuleResult>,
    pub profile: DataProfile,
}

impl ValidationReport {
    pub fn failed_errors(&self) -> impl Iterator<Item = &RuleResult> {
        self.rule_results
            .iter()
            .filter(|r| !r.passed && r.severity == Severity::Error)
    }

    pub fn failed_warnings(&self) -> impl Iterator<Item = &RuleResult> {
        self.rule_results
            .iter()
            .filter(|r| !r.passed && r.severity == Severity::Warning)
    }
}

struct CompiledRule {
    rule: QualityRule,
    // Set only for pattern rules.
    regex: Option<Regex>,
}

/// Evaluates a fixed rule set against datasets. Patterns are compiled once, up front.
pub struct QualityValidator {
    rules: Vec<CompiledRule>,
}

impl QualityValidator {
    pub fn new(rules: Vec<QualityRule>) -> Result<Self, DomainError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let regex = match &rule.kind {
                    // Anchored at the start only: a prefix match passes.
                    RuleKind::Pattern { pattern, .. } => Some(
                        Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
                            DomainError::Configuration(format!(
                                "Rule '{}' has an invalid pattern '{}': {}",
                                rule.name, pattern, e
                            ))
                        })?,
                    ),
                    _ => None,
                };
                Ok(CompiledRule { rule, regex })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Self { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn validate(&self, data: &Dataset) -> ValidationReport {
        let rule_results: Vec<RuleResult> =
            self.rules.iter().map(|r| evaluate(r, data)).collect();

        let passed_rules = rule_results.iter().filter(|r| r.passed).count();
        let passed = !rule_results
            .iter()
            .any(|r| !r.passed && r.severity == Severity::Error);

        ValidationReport {
            passed,
            total_rules: rule_results.len(),
            passed_rules,
            failed_rules: rule_results.len() - passed_rules,
            rule_results,
            profile: DataProfile::of(data),
        }
    }
}

fn evaluate(compiled: &CompiledRule, data: &Dataset) -> RuleResult {
    let rule = &compiled.rule;

    let outcome = match &rule.kind {
        RuleKind::NotNull { column } => with_column(data, column, |values| {
            let nulls = values.iter().filter(|v| v.is_null()).count();
            (
                nulls,
                values.len(),
                format!("Column '{}' has {} null values", column, nulls),
            )
        }),
        RuleKind::Unique { column } => with_column(data, column, |values| {
            let mut seen = HashSet::new();
            let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
            let duplicates = present.iter().filter(|v| !seen.insert(**v)).count();
            (
                duplicates,
                present.len(),
                format!("Column '{}' has {} duplicate values", column, duplicates),
            )
        }),
        RuleKind::Range { column, min, max } => with_column(data, column, |values| {
            let numbers: Vec<Option<f64>> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| v.as_f64())
                .collect();
            let out_of_range = numbers
                .iter()
                .filter(|n| match n {
                    // Non-numeric cells can never satisfy a numeric range.
                    None => true,
                    Some(x) => min.is_some_and(|m| *x < m) || max.is_some_and(|m| *x > m),
                })
                .count();
            (
                out_of_range,
                numbers.len(),
                format!(
                    "Column '{}' has {} values out of range [{}, {}]",
                    column,
                    out_of_range,
                    bound(min),
                    bound(max)
                ),
            )
        }),
        RuleKind::Pattern { column, pattern } => with_column(data, column, |values| {
            let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
            let invalid = match &compiled.regex {
                Some(re) => present
                    .iter()
                    .filter(|v| !re.is_match(&v.to_string()))
                    .count(),
                None => present.len(),
            };
            (
                invalid,
                present.len(),
                format!(
                    "Column '{}' has {} values not matching pattern '{}'",
                    column, invalid, pattern
                ),
            )
        }),
        RuleKind::Completeness { threshold } => {
            let total = data.cell_count();
            let filled = data.non_null_cells();
            let completeness = ratio(filled, total);
            return RuleResult {
                rule_name: rule.name.clone(),
                rule_type: rule.kind.type_name().to_string(),
                severity: rule.severity,
                passed: completeness >= *threshold,
                violations: total - filled,
                checked: total,
                message: format!(
                    "Data completeness is {:.2}% (threshold: {:.2}%)",
                    completeness * 100.0,
                    threshold * 100.0
                ),
            };
        }
    };

    match outcome {
        Ok((violations, checked, message)) => RuleResult {
            rule_name: rule.name.clone(),
            rule_type: rule.kind.type_name().to_string(),
            severity: rule.severity,
            passed: violations == 0,
            violations,
            checked,
            message,
        },
        // A rule that cannot run is an error whatever its configured severity.
        Err(message) => RuleResult {
            rule_name: rule.name.clone(),
            rule_type: rule.kind.type_name().to_string(),
            severity: Severity::Error,
            passed: false,
            violations: 0,
            checked: 0,
            message: format!("Rule execution failed: {}", message),
        },
    }
}

fn with_column<F>(data: &Dataset, column: &str, check: F) -> Result<(usize, usize, String), String>
where
    F: FnOnce(&[&Value]) -> (usize, usize, String),
{
    let values = data
        .column(column)
        .ok_or_else(|| format!("column '{}' not found", column))?;
    Ok(check(&values))
}

fn bound(b: &Option<f64>) -> String {
    b.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
