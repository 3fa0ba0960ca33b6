//! Validation runs.
//!
//! One run validates every encounter file waiting in an organization's
//! processed folder, stores a `ValidationRecord` per encounter and writes
//! the CSV report for the run.
//!
//! ```text
//! list → (read → fields → evaluate → store → archive)* → report
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::{DatabaseError, IrpLookup, RecordStore};
use crate::llm::{LlmClient, LlmError};
use crate::models::{RuleSummary, ValidationRecord};
use crate::org_config::{load_org_config, ConfigError, OrgConfig};
use crate::pipeline::fields::{apply_computed_fields, extract_text_fields};
use crate::pipeline::ingest::{list_encounter_keys, relocated_key};
use crate::pipeline::segment::Encounter;
use crate::pipeline::{key_timestamp, PipelineError};
use crate::report::{build_report, store_report};
use crate::rules::{EncounterContext, EngineSettings, RuleEngine};
use crate::storage::{file_stem, ObjectStore, StorageError, CONTENT_TYPE_JSON};

pub const VALIDATION_ARCHIVE_PREFIX: &str = "archived/validation/";
pub const VALIDATION_RESULTS_PREFIX: &str = "validation-results/";

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Model client error: {0}")]
    Llm(#[from] LlmError),

    #[error("Cannot determine home directory; pass --data-dir")]
    NoHomeDir,

    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level result of a validation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub org_id: String,
    pub run_id: String,
    pub files_processed: usize,
    pub records_stored: usize,
    pub report_key: Option<String>,
    pub summary: RuleSummary,
    pub message: String,
}

/// Collaborators of a run, constructed by the caller.
pub struct Auditor<'a> {
    pub store: &'a dyn ObjectStore,
    pub records: &'a dyn RecordStore,
    pub irps: Option<&'a dyn IrpLookup>,
    pub client: &'a dyn LlmClient,
    pub settings: EngineSettings,
}

impl Auditor<'_> {
    pub fn run_validation(&self, org_id: &str) -> Result<RunOutcome, AuditError> {
        self.run_validation_at(org_id, Utc::now())
    }

    /// Run with an explicit start time; the run id derives from it.
    pub fn run_validation_at(&self, org_id: &str, started: DateTime<Utc>) -> Result<RunOutcome, AuditError> {
        let run_id = key_timestamp(started);
        tracing::info!(org_id, run_id = %run_id, "Starting validation run");

        let config = load_org_config(self.store, org_id).inspect_err(|e| {
            tracing::error!(org_id, error = %e, "Cannot load organization configuration");
        })?;

        let folders = &config.chart.folders;
        let prefix = folders.processed_charts.as_str();
        let keys = list_encounter_keys(self.store, prefix, &[folders.processed_irp.as_str()])?;

        let mut outcome = RunOutcome {
            org_id: org_id.to_string(),
            run_id: run_id.clone(),
            files_processed: 0,
            records_stored: 0,
            report_key: None,
            summary: RuleSummary::default(),
            message: String::new(),
        };
        if keys.is_empty() {
            tracing::info!(org_id, run_id = %run_id, prefix, "No files to validate");
            outcome.message = "No files to validate".to_string();
            return Ok(outcome);
        }

        let mut engine = RuleEngine::new(self.client, self.settings.clone());
        if let Some(irps) = self.irps {
            engine = engine.with_irp_lookup(irps);
        }

        for key in &keys {
            let record = self.validate_file(&engine, &config, &run_id, key)?;
            outcome.files_processed += 1;
            outcome.summary.absorb(&record.summary);

            match self.records.put_record(&record) {
                Ok(()) => outcome.records_stored += 1,
                Err(e) => {
                    tracing::error!(org_id, run_id = %run_id, %key, error = %e, "Failed to store validation record");
                }
            }
            self.save_result_json(&record, key, prefix);

            let archive_key = relocated_key(key, prefix, VALIDATION_ARCHIVE_PREFIX);
            if let Err(e) = self.store.rename(key, &archive_key) {
                tracing::warn!(org_id, %key, error = %e, "Failed to archive validated file");
            }
        }

        outcome.report_key = Some(write_report(self.store, self.records, org_id, &run_id)?);
        outcome.message = "Validation completed successfully".to_string();

        tracing::info!(
            org_id,
            run_id = %run_id,
            files = outcome.files_processed,
            stored = outcome.records_stored,
            passed = outcome.summary.passed,
            failed = outcome.summary.failed,
            skipped = outcome.summary.skipped,
            "Validation run complete"
        );
        Ok(outcome)
    }

    fn validate_file(
        &self,
        engine: &RuleEngine<'_>,
        config: &OrgConfig,
        run_id: &str,
        key: &str,
    ) -> Result<ValidationRecord, AuditError> {
        let body = self.store.get(key)?;
        let encounter: Encounter = serde_json::from_slice(&body).map_err(|source| {
            PipelineError::MalformedEncounter {
                key: key.to_string(),
                source,
            }
        })?;

        let mut fields = extract_text_fields(&encounter.text, &config.field_mappings);
        apply_computed_fields(&mut fields, &encounter.forms, &config.computed_fields);

        let org_id = config.organization_id.as_str();
        let outcome = engine.evaluate(
            &config.rules,
            &EncounterContext {
                org_id,
                fields: &fields,
                document_text: &encounter.text,
            },
        );

        let document_id = fields
            .get("document_id")
            .and_then(|v| v.clone())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| file_stem(key).to_string());

        tracing::info!(
            org_id,
            %key,
            document_id = %document_id,
            total = outcome.summary.total,
            passed = outcome.summary.passed,
            failed = outcome.summary.failed,
            "Validated encounter"
        );

        Ok(ValidationRecord {
            run_id: run_id.to_string(),
            org_id: org_id.to_string(),
            document_id,
            filename: key.to_string(),
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            config_version: config.version.clone(),
            summary: outcome.summary,
            rule_results: outcome.results,
            field_values: fields,
        })
    }

    /// Keep a JSON copy of the record next to the reports. Failures are logged.
    fn save_result_json(&self, record: &ValidationRecord, key: &str, prefix: &str) {
        let relocated = relocated_key(key, prefix, VALIDATION_RESULTS_PREFIX);
        let result_key = match relocated.strip_suffix(".json") {
            Some(stem) => format!("{stem}-validation.json"),
            None => format!("{relocated}-validation.json"),
        };
        let written = serde_json::to_vec_pretty(record)
            .map_err(|e| e.to_string())
            .and_then(|body| {
                self.store
                    .put(&result_key, &body, CONTENT_TYPE_JSON)
                    .map_err(|e| e.to_string())
            });
        if let Err(error) = written {
            tracing::warn!(key = %result_key, %error, "Failed to save validation result");
        }
    }
}

/// Build the CSV for a stored run and write it. Returns the report key.
pub fn write_report(
    store: &dyn ObjectStore,
    records: &dyn RecordStore,
    org_id: &str,
    run_id: &str,
) -> Result<String, AuditError> {
    let run_records = records.records_for_run(org_id, run_id)?;
    let table = build_report(&run_records, true);
    Ok(store_report(store, run_id, &table)?)
}
