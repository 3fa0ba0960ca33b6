//! OCR result handling: raw block model, pagination assembly, block index
//! and reading-order normalization.
//!
//! ```text
//! pages (NextToken chain) → OcrJobResult → BlockIndex → NormalizedDocument
//! ```

pub mod types;
pub mod pages;
pub mod index;
pub mod normalize;

pub use types::*;
pub use pages::*;
pub use index::BlockIndex;
pub use normalize::*;

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Malformed OCR result {location}: {source}")]
    Malformed {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Pagination for job {job_id} revisited token {token}")]
    PaginationLoop { job_id: String, token: String },
}
