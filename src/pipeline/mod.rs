//! Document pipeline.
//!
//! ```text
//! OCR pages → normalize → segment → encounter files   (ingest)
//! IRP encounter files → structured fields → irp_records (irp)
//! encounter text → fields                              (fields)
//! ```

pub mod ocr;
pub mod segment;
pub mod fields;
pub mod ingest;
pub mod irp;

use thiserror::Error;

use crate::storage::StorageError;

pub use ocr::OcrError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("OCR result error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Cannot serialize {what}: {source}")]
    Serialization {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed encounter file {key}: {source}")]
    MalformedEncounter {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Pretty JSON body for an object written by the pipeline.
pub(crate) fn to_json_body<T: serde::Serialize>(what: &str, value: &T) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec_pretty(value).map_err(|source| PipelineError::Serialization {
        what: what.to_string(),
        source,
    })
}

/// Compact `%Y%m%d-%H%M%S` stamp used in object keys and run ids.
pub fn key_timestamp(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y%m%d-%H%M%S").to_string()
}
