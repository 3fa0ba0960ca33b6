//! Run report: one row per validated document, one column per rule.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{RuleResult, RuleStatus, ValidationRecord};
use crate::storage::{ObjectStore, StorageError, CONTENT_TYPE_CSV};

pub const REPORT_PREFIX: &str = "validation-reports/";
pub const SERVICE_ID_COLUMN: &str = "Service ID";
pub const CONSUMER_NAME_COLUMN: &str = "Consumer Name";
const MISSING: &str = "N/A";

pub fn report_key(run_id: &str) -> String {
    format!("{REPORT_PREFIX}{run_id}-validation-report.csv")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Cell text for one rule result. PASS stays terse; other statuses carry
/// the message, prefixed with the status unless it already starts with it.
pub fn format_cell(result: &RuleResult) -> String {
    let status = result.status.as_str();
    if result.status == RuleStatus::Pass {
        return status.to_string();
    }
    let message = result.message.as_str();
    if message.is_empty() || message == status {
        return status.to_string();
    }
    if message.to_uppercase().starts_with(status) {
        message.to_string()
    } else {
        format!("{status}: {message}")
    }
}

fn field_or_missing(record: &ValidationRecord, name: &str) -> String {
    record
        .field(name)
        .filter(|v| !v.is_empty())
        .unwrap_or(MISSING)
        .to_string()
}

/// Pivot records into a wide table. Columns are the sorted union of rule
/// names across all records; a rule a record lacks renders `N/A`.
pub fn build_report(records: &[ValidationRecord], include_consumer_name: bool) -> ReportTable {
    let rule_names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.rule_results.iter().map(|res| res.rule_name.as_str()))
        .collect();

    let mut header = vec![SERVICE_ID_COLUMN.to_string()];
    if include_consumer_name {
        header.push(CONSUMER_NAME_COLUMN.to_string());
    }
    header.extend(rule_names.iter().map(|n| n.to_string()));

    let rows = records
        .iter()
        .map(|record| {
            // a duplicate rule name keeps the last result, like a dict insert
            let cells: BTreeMap<&str, String> = record
                .rule_results
                .iter()
                .map(|res| (res.rule_name.as_str(), format_cell(res)))
                .collect();

            let mut row = vec![field_or_missing(record, "document_id")];
            if include_consumer_name {
                row.push(field_or_missing(record, "consumer_name"));
            }
            row.extend(
                rule_names
                    .iter()
                    .map(|name| cells.get(name).cloned().unwrap_or_else(|| MISSING.to_string())),
            );
            row
        })
        .collect();

    ReportTable { header, rows }
}

fn needs_quoting(cell: &str) -> bool {
    cell.contains([',', '"', '\r', '\n'])
}

fn write_row(out: &mut String, row: &[String]) {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if needs_quoting(cell) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push_str("\r\n");
}

impl ReportTable {
    /// RFC 4180 CSV: minimal quoting, CRLF line endings.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_row(&mut out, &self.header);
        for row in &self.rows {
            write_row(&mut out, row);
        }
        out
    }
}

/// Write the CSV for `run_id` and return its key.
pub fn store_report(store: &dyn ObjectStore, run_id: &str, table: &ReportTable) -> Result<String, StorageError> {
    let key = report_key(run_id);
    store.put(&key, table.to_csv().as_bytes(), CONTENT_TYPE_CSV)?;
    tracing::info!(run_id, %key, rows = table.rows.len(), columns = table.header.len(), "Saved report");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValues, RuleSummary};
    use crate::storage::MemoryObjectStore;

    fn res(name: &str, status: RuleStatus, message: &str) -> RuleResult {
        RuleResult {
            rule_id: name.to_lowercase(),
            rule_name: name.to_string(),
            category: String::new(),
            status,
            message: message.to_string(),
        }
    }

    fn record(doc: Option<&str>, results: Vec<RuleResult>) -> ValidationRecord {
        let mut fields = FieldValues::new();
        fields.insert("document_id".into(), doc.map(str::to_string));
        ValidationRecord {
            run_id: "r".into(),
            org_id: "o".into(),
            document_id: doc.unwrap_or("unknown").into(),
            filename: "f.json".into(),
            timestamp: "2026-01-01T00:00:00".into(),
            config_version: "1".into(),
            summary: RuleSummary::from_results(&results),
            rule_results: results,
            field_values: fields,
        }
    }

    #[test]
    fn cell_formatting() {
        assert_eq!(format_cell(&res("A", RuleStatus::Pass, "PASS - fine")), "PASS");
        assert_eq!(format_cell(&res("A", RuleStatus::Fail, "FAIL - unsigned")), "FAIL - unsigned");
        assert_eq!(format_cell(&res("A", RuleStatus::Fail, "fail: lowercase")), "fail: lowercase");
        assert_eq!(format_cell(&res("A", RuleStatus::Skip, "No IRP found")), "SKIP: No IRP found");
        assert_eq!(format_cell(&res("A", RuleStatus::Error, "")), "ERROR");
        assert_eq!(format_cell(&res("A", RuleStatus::Skip, "SKIP")), "SKIP");
    }

    #[test]
    fn header_is_sorted_union_and_missing_rules_are_na() {
        let records = vec![
            record(Some("1"), vec![res("B", RuleStatus::Pass, ""), res("A", RuleStatus::Pass, "")]),
            record(Some("2"), vec![res("C", RuleStatus::Fail, "FAIL - x"), res("A", RuleStatus::Pass, "")]),
        ];
        let table = build_report(&records, false);
        assert_eq!(table.header, vec!["Service ID", "A", "B", "C"]);
        assert_eq!(table.rows[0], vec!["1", "PASS", "PASS", "N/A"]);
        assert_eq!(table.rows[1], vec!["2", "PASS", "N/A", "FAIL - x"]);
    }

    #[test]
    fn consumer_column_and_missing_ids() {
        let mut with_name = record(Some("7"), vec![res("A", RuleStatus::Pass, "")]);
        with_name
            .field_values
            .insert("consumer_name".into(), Some("Jane Roe".into()));
        let records = vec![with_name, record(None, vec![])];

        let table = build_report(&records, true);
        assert_eq!(table.header, vec!["Service ID", "Consumer Name", "A"]);
        assert_eq!(table.rows[0], vec!["7", "Jane Roe", "PASS"]);
        assert_eq!(table.rows[1], vec!["N/A", "N/A", "N/A"]);
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let table = ReportTable {
            header: vec!["Service ID".into(), "Rule, with comma".into()],
            rows: vec![vec!["1".into(), "FAIL: said \"no\"".into()]],
        };
        assert_eq!(
            table.to_csv(),
            "Service ID,\"Rule, with comma\"\r\n1,\"FAIL: said \"\"no\"\"\"\r\n"
        );
    }

    #[test]
    fn empty_run_has_header_only() {
        let table = build_report(&[], true);
        assert_eq!(table.to_csv(), "Service ID,Consumer Name\r\n");
    }

    #[test]
    fn report_stored_under_run_key() {
        let store = MemoryObjectStore::new();
        let table = build_report(&[record(Some("1"), vec![res("A", RuleStatus::Pass, "")])], false);
        let key = store_report(&store, "20260101-120000", &table).unwrap();
        assert_eq!(key, "validation-reports/20260101-120000-validation-report.csv");
        assert_eq!(store.content_type(&key).as_deref(), Some(CONTENT_TYPE_CSV));
        assert_eq!(store.get(&key).unwrap(), b"Service ID,A\r\n1,PASS\r\n");
    }
}
