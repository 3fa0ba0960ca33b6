//! IRP processing: encounter files from the IRP processed folder become
//! `IrpRecord`s that IRP comparison rules look up by consumer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::IrpStore;
use crate::models::IrpRecord;
use crate::org_config::{IrpConfig, OrgConfig};
use crate::storage::ObjectStore;

use super::fields::extract_structured_fields;
use super::ingest::{list_encounter_keys, relocated_key};
use super::segment::Encounter;
use super::PipelineError;

pub const IRP_ARCHIVE_PREFIX: &str = "archived/irp/";

/// Fields with a dedicated slot on `IrpRecord`.
const CORE_FIELDS: [&str; 3] = ["consumer_name", "irp_start_date", "irp_end_date"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IrpRunOutcome {
    pub files_processed: usize,
    pub records_stored: usize,
    pub irp_ids: Vec<String>,
}

/// `{consumer-slug}-{start-slug}-{timestamp}`.
pub fn irp_id(consumer_name: &str, start_date: &str, timestamp: &str) -> String {
    let consumer = if consumer_name.is_empty() {
        "unknown".to_string()
    } else {
        consumer_name.replace(' ', "-").to_lowercase()
    };
    let start = if start_date.is_empty() {
        "no-date".to_string()
    } else {
        start_date.replace('/', "-")
    };
    format!("{consumer}-{start}-{timestamp}")
}

/// Build the record for one IRP encounter. The whole encounter text is the
/// plan of care.
pub fn build_irp_record(
    encounter: &Encounter,
    key: &str,
    org_id: &str,
    config: &IrpConfig,
    processed_at: DateTime<Utc>,
) -> IrpRecord {
    let fields = extract_structured_fields(&encounter.forms, &encounter.text, &config.field_mappings);
    let field = |name: &str| fields.get(name).unwrap_or_default().to_string();

    let consumer_name = field("consumer_name");
    let start_date = field("irp_start_date");
    let timestamp = processed_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();

    let extra_fields: BTreeMap<String, String> = fields
        .values
        .iter()
        .filter(|(name, _)| !CORE_FIELDS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (name.clone(), v.to_string()))
        })
        .collect();

    let forms = encounter
        .forms
        .entries()
        .iter()
        .map(|e| (e.key.clone(), e.value.clone()))
        .collect();

    IrpRecord {
        irp_id: irp_id(&consumer_name, &start_date, &timestamp),
        org_id: org_id.to_string(),
        end_date: field("irp_end_date"),
        consumer_name,
        start_date,
        plan_text: encounter.text.clone(),
        filename: key.to_string(),
        processed_at: timestamp,
        extra_fields,
        forms,
    }
}

/// Process every IRP file waiting in the organization's IRP processed
/// folder. A file that cannot be read or parsed stops the run; a record
/// that cannot be stored is logged and its file stays in place.
pub fn process_irp_documents(
    store: &dyn ObjectStore,
    irps: &dyn IrpStore,
    config: &OrgConfig,
) -> Result<IrpRunOutcome, PipelineError> {
    let org_id = config.organization_id.as_str();
    let prefix = config.chart.folders.processed_irp.as_str();
    let keys = list_encounter_keys(store, prefix, &[])?;
    tracing::info!(org_id, prefix, files = keys.len(), "Processing IRP documents");

    let mut outcome = IrpRunOutcome::default();
    for key in keys {
        let body = store.get(&key)?;
        let encounter: Encounter = serde_json::from_slice(&body).map_err(|source| {
            PipelineError::MalformedEncounter {
                key: key.clone(),
                source,
            }
        })?;
        outcome.files_processed += 1;

        let record = build_irp_record(&encounter, &key, org_id, &config.irp, Utc::now());
        if record.consumer_name.is_empty() {
            tracing::warn!(org_id, %key, "IRP has no consumer name");
        }

        if let Err(e) = irps.put_irp(&record) {
            tracing::error!(org_id, %key, error = %e, "Failed to store IRP");
            continue;
        }
        outcome.records_stored += 1;
        tracing::info!(
            org_id,
            irp_id = %record.irp_id,
            consumer = %record.consumer_name,
            start_date = %record.start_date,
            "Stored IRP"
        );
        outcome.irp_ids.push(record.irp_id);

        let archive_key = relocated_key(&key, prefix, IRP_ARCHIVE_PREFIX);
        if let Err(e) = store.rename(&key, &archive_key) {
            tracing::warn!(org_id, %key, error = %e, "Failed to archive IRP file");
        }
    }
    Ok(outcome)
}
