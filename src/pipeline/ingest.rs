//! Ingest: one finished OCR job becomes encounter files.
//!
//! The raw result is kept under the raw folder, every encounter is written
//! to the processed folder, a manifest lists what was written, and the
//! source document is moved to the archive folder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DocumentKind;
use crate::org_config::ChartConfig;
use crate::storage::{file_name, file_stem, ObjectStore, StorageError, CONTENT_TYPE_JSON};

use super::ocr::{collect_job_result, normalize, OcrJobResult, OcrPageSource};
use super::segment::{encounter_id, segment};
use super::{key_timestamp, to_json_body, PipelineError};

pub const MANIFEST_SUFFIX: &str = "-batch-complete.json";

/// Written last; its presence means every encounter file of the batch exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub batch_id: String,
    pub source_pdf: String,
    pub organization_id: String,
    pub encounter_count: usize,
    pub encounter_files: Vec<String>,
    pub created_at: String,
    pub is_batch_manifest: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub kind: DocumentKind,
    pub raw_key: String,
    pub encounter_keys: Vec<String>,
    pub manifest_key: String,
    /// `None` when the source object was already gone.
    pub archive_key: Option<String>,
}

pub fn document_kind(source_key: &str, chart: &ChartConfig) -> DocumentKind {
    if !chart.irp_folder_pattern.is_empty() && source_key.contains(&chart.irp_folder_pattern) {
        DocumentKind::Irp
    } else {
        DocumentKind::Chart
    }
}

/// Assemble the job's pages, then ingest the result.
pub fn ingest_job(
    store: &dyn ObjectStore,
    pages: &dyn OcrPageSource,
    job_id: &str,
    source_key: &str,
    org_id: &str,
    chart: &ChartConfig,
    now: DateTime<Utc>,
) -> Result<Option<IngestOutcome>, PipelineError> {
    let result = collect_job_result(pages, job_id)?;
    ingest_result(store, &result, source_key, org_id, chart, now)
}

/// Encounter files waiting under `prefix`, sorted. Folder markers, batch
/// manifests, raw results, non-JSON objects and anything under one of the
/// `exclude` prefixes are left out.
pub fn list_encounter_keys(
    store: &dyn ObjectStore,
    prefix: &str,
    exclude: &[&str],
) -> Result<Vec<String>, StorageError> {
    Ok(store
        .list(prefix)?
        .into_iter()
        .map(|o| o.key)
        .filter(|key| {
            !key.ends_with('/')
                && !key.ends_with(MANIFEST_SUFFIX)
                && !key.contains("/raw/")
                && key.ends_with(".json")
                && !exclude.iter().any(|ex| !ex.is_empty() && key.starts_with(ex))
        })
        .collect())
}

/// `{to}{key without from}`; keys outside `from` keep only their file name.
pub fn relocated_key(key: &str, from: &str, to: &str) -> String {
    let rest = key.strip_prefix(from).unwrap_or_else(|| file_name(key));
    format!("{to}{rest}")
}

/// Returns `Ok(None)` for a job that did not succeed; nothing is written.
pub fn ingest_result(
    store: &dyn ObjectStore,
    result: &OcrJobResult,
    source_key: &str,
    org_id: &str,
    chart: &ChartConfig,
    now: DateTime<Utc>,
) -> Result<Option<IngestOutcome>, PipelineError> {
    if !result.succeeded() {
        tracing::warn!(
            org_id,
            source_key,
            job_status = %result.job_status,
            "OCR job did not succeed, skipping"
        );
        return Ok(None);
    }

    let kind = document_kind(source_key, chart);
    let is_irp = kind == DocumentKind::Irp;
    let folders = &chart.folders;
    let (raw_folder, processed_folder, archive_folder) = if is_irp {
        (&folders.raw_irp, &folders.processed_irp, &folders.archive_irp)
    } else {
        (&folders.raw_charts, &folders.processed_charts, &folders.archive_charts)
    };

    let filename = file_stem(source_key);
    let stamp = key_timestamp(now);

    let raw_key = format!("{raw_folder}{filename}-{stamp}.json");
    store.put(&raw_key, &to_json_body("raw OCR result", result)?, CONTENT_TYPE_JSON)?;
    tracing::debug!(org_id, key = %raw_key, "Saved raw OCR result");

    let doc = normalize(result);
    let encounters = segment(&doc, &chart.encounter_delimiter, is_irp);

    let mut encounter_keys = Vec::with_capacity(encounters.len());
    if encounters.len() > 1 {
        for (idx, encounter) in encounters.iter().enumerate() {
            let id = encounter_id(encounter, &chart.encounter_id_field)
                .unwrap_or_else(|| format!("encounter-{}", idx + 1));
            let key = format!("{processed_folder}{filename}-{id}-{stamp}.json");
            store.put(&key, &to_json_body("encounter", encounter)?, CONTENT_TYPE_JSON)?;
            encounter_keys.push(key);
        }
    } else if let Some(encounter) = encounters.first() {
        let key = format!("{processed_folder}{filename}-{stamp}.json");
        store.put(&key, &to_json_body("encounter", encounter)?, CONTENT_TYPE_JSON)?;
        encounter_keys.push(key);
    }

    let manifest = BatchManifest {
        batch_id: format!("{filename}-{stamp}"),
        source_pdf: source_key.to_string(),
        organization_id: org_id.to_string(),
        encounter_count: encounter_keys.len(),
        encounter_files: encounter_keys.clone(),
        created_at: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        is_batch_manifest: true,
    };
    let manifest_key = format!("{processed_folder}{filename}-{stamp}{MANIFEST_SUFFIX}");
    store.put(&manifest_key, &to_json_body("batch manifest", &manifest)?, CONTENT_TYPE_JSON)?;

    let archive_key = if store.exists(source_key)? {
        let extension = &file_name(source_key)[filename.len()..];
        let key = format!("{archive_folder}{filename}-{stamp}{extension}");
        store.rename(source_key, &key)?;
        Some(key)
    } else {
        tracing::warn!(org_id, source_key, "Source document not found, nothing to archive");
        None
    };

    tracing::info!(
        org_id,
        source_key,
        kind = %kind,
        encounters = encounter_keys.len(),
        manifest = %manifest_key,
        "Ingested OCR result"
    );

    Ok(Some(IngestOutcome {
        kind,
        raw_key,
        encounter_keys,
        manifest_key,
        archive_key,
    }))
}
