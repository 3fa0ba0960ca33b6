//! Per-organization configuration: field mappings, computed fields, rules,
//! chart splitting and IRP extraction settings.

pub mod model;
pub mod loader;

pub use model::*;
pub use loader::*;

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed configuration for {org_id}: {source}")]
    Parse {
        org_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
