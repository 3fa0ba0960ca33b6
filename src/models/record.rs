use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::enums::RuleStatus;

/// Field name → extracted value. `None` means the label was not found.
pub type FieldValues = IndexMap<String, Option<String>>;

/// Verdict for one rule against one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub rule_name: String,
    pub category: String,
    pub status: RuleStatus,
    pub message: String,
}

impl RuleResult {
    pub fn error(rule_id: &str, rule_name: &str, category: &str, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            rule_name: rule_name.to_string(),
            category: category.to_string(),
            status: RuleStatus::Error,
            message: message.into(),
        }
    }
}

/// Counts over a result set. ERROR results only count toward `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSummary {
    #[serde(rename = "total_rules")]
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl RuleSummary {
    pub fn from_results(results: &[RuleResult]) -> Self {
        let mut summary = Self {
            total: results.len() as u32,
            ..Self::default()
        };
        for result in results {
            match result.status {
                RuleStatus::Pass => summary.passed += 1,
                RuleStatus::Fail => summary.failed += 1,
                RuleStatus::Skip => summary.skipped += 1,
                RuleStatus::Error => {}
            }
        }
        summary
    }

    pub fn errored(&self) -> u32 {
        self.total - self.passed - self.failed - self.skipped
    }

    /// Fold another summary into this one (run-level totals).
    pub fn absorb(&mut self, other: &RuleSummary) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// One persisted audit result per (encounter, run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    #[serde(rename = "validation_run_id")]
    pub run_id: String,
    #[serde(rename = "organization_id")]
    pub org_id: String,
    pub document_id: String,
    pub filename: String,
    #[serde(rename = "validation_timestamp")]
    pub timestamp: String,
    #[serde(default = "unknown_version")]
    pub config_version: String,
    pub summary: RuleSummary,
    #[serde(rename = "rules")]
    pub rule_results: Vec<RuleResult>,
    pub field_values: FieldValues,
}

fn unknown_version() -> String {
    "unknown".to_string()
}

impl ValidationRecord {
    /// Date portion (`YYYY-MM-DD`) of the ISO timestamp.
    pub fn date(&self) -> &str {
        self.timestamp.get(..10).unwrap_or(&self.timestamp)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.field_values.get(name).and_then(|v| v.as_deref())
    }
}

/// Individual recovery plan extracted from an IRP document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrpRecord {
    pub irp_id: String,
    #[serde(rename = "organization_id")]
    pub org_id: String,
    pub consumer_name: String,
    #[serde(rename = "irp_start_date")]
    pub start_date: String,
    #[serde(rename = "irp_end_date")]
    pub end_date: String,
    #[serde(rename = "plan_of_care_text")]
    pub plan_text: String,
    pub filename: String,
    #[serde(rename = "processed_timestamp")]
    pub processed_at: String,
    /// Optional mapped fields (document_id, case_manager, diagnosis, goals, ...).
    #[serde(default)]
    pub extra_fields: BTreeMap<String, String>,
    /// Every form pair of the document, key → value.
    #[serde(default)]
    pub forms: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: RuleStatus) -> RuleResult {
        RuleResult {
            rule_id: name.to_lowercase(),
            rule_name: name.to_string(),
            category: "documentation".to_string(),
            status,
            message: String::new(),
        }
    }

    #[test]
    fn summary_of_empty_results_is_zero() {
        assert_eq!(RuleSummary::from_results(&[]), RuleSummary::default());
    }

    #[test]
    fn summary_counts_error_only_in_total() {
        let results = vec![
            result("A", RuleStatus::Pass),
            result("B", RuleStatus::Fail),
            result("C", RuleStatus::Skip),
            result("D", RuleStatus::Error),
            result("E", RuleStatus::Pass),
        ];
        let summary = RuleSummary::from_results(&results);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errored(), 1);
    }

    #[test]
    fn summary_absorb_adds_counts() {
        let mut total = RuleSummary::from_results(&[result("A", RuleStatus::Pass)]);
        total.absorb(&RuleSummary::from_results(&[result("A", RuleStatus::Fail)]));
        assert_eq!(total.total, 2);
        assert_eq!(total.passed, 1);
        assert_eq!(total.failed, 1);
    }

    #[test]
    fn record_serializes_with_storage_field_names() {
        let record = ValidationRecord {
            run_id: "20260101-120000".into(),
            org_id: "riverbend".into(),
            document_id: "SVC-1".into(),
            filename: "textract-processed/a.json".into(),
            timestamp: "2026-01-01T12:00:00.000000".into(),
            config_version: "3".into(),
            summary: RuleSummary::default(),
            rule_results: vec![],
            field_values: FieldValues::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["validation_run_id"], "20260101-120000");
        assert_eq!(json["organization_id"], "riverbend");
        assert_eq!(json["summary"]["total_rules"], 0);
        assert_eq!(record.date(), "2026-01-01");
    }
}
