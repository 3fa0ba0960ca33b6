use std::collections::HashSet;

use super::types::{OcrJobResult, OcrResultPage};
use super::OcrError;
use crate::storage::ObjectStore;

/// Token used for the first page of a job.
pub const FIRST_PAGE_TOKEN: &str = "0";

/// Where paginated analysis results come from.
pub trait OcrPageSource {
    /// Fetch one page. `next_token` is `None` for the first page.
    fn fetch_page(&self, job_id: &str, next_token: Option<&str>) -> Result<OcrResultPage, OcrError>;
}

/// Follow `NextToken` until exhausted and merge every page's blocks.
///
/// Job status and document metadata come from the first page.
pub fn collect_job_result(source: &dyn OcrPageSource, job_id: &str) -> Result<OcrJobResult, OcrError> {
    let first = source.fetch_page(job_id, None)?;
    let job_status = first.job_status.clone();
    let document_metadata = first.document_metadata.clone();

    let mut blocks = first.blocks;
    let mut next_token = first.next_token;
    let mut seen: HashSet<String> = HashSet::new();
    let mut page_count = 1usize;

    while let Some(token) = next_token.take() {
        if !seen.insert(token.clone()) {
            return Err(OcrError::PaginationLoop {
                job_id: job_id.to_string(),
                token,
            });
        }
        let page = source.fetch_page(job_id, Some(&token))?;
        blocks.extend(page.blocks);
        next_token = page.next_token;
        page_count += 1;
    }

    tracing::debug!(job_id, pages = page_count, blocks = blocks.len(), "Assembled OCR result");

    Ok(OcrJobResult {
        blocks,
        job_status,
        document_metadata,
    })
}

/// Pages stored as `ocr-results/{job_id}/{token}.json`; the first page uses
/// token `0`.
pub struct ObjectStorePageSource<'a> {
    store: &'a dyn ObjectStore,
    prefix: String,
}

impl<'a> ObjectStorePageSource<'a> {
    pub fn new(store: &'a dyn ObjectStore, prefix: &str) -> Self {
        Self {
            store,
            prefix: prefix.to_string(),
        }
    }

    pub fn page_key(&self, job_id: &str, token: Option<&str>) -> String {
        format!(
            "{}{}/{}.json",
            self.prefix,
            job_id,
            token.unwrap_or(FIRST_PAGE_TOKEN)
        )
    }
}

impl OcrPageSource for ObjectStorePageSource<'_> {
    fn fetch_page(&self, job_id: &str, next_token: Option<&str>) -> Result<OcrResultPage, OcrError> {
        let key = self.page_key(job_id, next_token);
        let body = self.store.get(&key)?;
        serde_json::from_slice(&body).map_err(|source| OcrError::Malformed {
            location: key,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::types::{Block, DocumentMetadata};
    use crate::storage::{MemoryObjectStore, CONTENT_TYPE_JSON};

    fn line(id: &str) -> Block {
        Block {
            id: id.to_string(),
            block_type: "LINE".to_string(),
            entity_types: vec![],
            page: Some(1),
            text: Some(id.to_string()),
            confidence: None,
            geometry: None,
            relationships: vec![],
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> OcrResultPage {
        OcrResultPage {
            blocks: ids.iter().map(|id| line(id)).collect(),
            job_status: "SUCCEEDED".to_string(),
            document_metadata: DocumentMetadata { pages: 2 },
            next_token: next.map(String::from),
        }
    }

    fn store_page(store: &MemoryObjectStore, key: &str, page: &OcrResultPage) {
        store
            .put(key, &serde_json::to_vec(page).unwrap(), CONTENT_TYPE_JSON)
            .unwrap();
    }

    #[test]
    fn collects_all_pages_in_order() {
        let store = MemoryObjectStore::new();
        store_page(&store, "ocr-results/job-1/0.json", &page(&["a", "b"], Some("t2")));
        store_page(&store, "ocr-results/job-1/t2.json", &page(&["c"], Some("t3")));
        store_page(&store, "ocr-results/job-1/t3.json", &page(&["d"], None));

        let source = ObjectStorePageSource::new(&store, "ocr-results/");
        let result = collect_job_result(&source, "job-1").unwrap();

        let ids: Vec<&str> = result.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(result.succeeded());
        assert_eq!(result.document_metadata.pages, 2);
    }

    #[test]
    fn single_page_job() {
        let store = MemoryObjectStore::new();
        store_page(&store, "ocr-results/job-2/0.json", &page(&["only"], None));
        let source = ObjectStorePageSource::new(&store, "ocr-results/");
        let result = collect_job_result(&source, "job-2").unwrap();
        assert_eq!(result.blocks.len(), 1);
    }

    #[test]
    fn missing_page_propagates_storage_error() {
        let store = MemoryObjectStore::new();
        store_page(&store, "ocr-results/job-3/0.json", &page(&["a"], Some("gone")));
        let source = ObjectStorePageSource::new(&store, "ocr-results/");
        let err = collect_job_result(&source, "job-3").unwrap_err();
        assert!(matches!(err, OcrError::Storage(_)));
    }

    #[test]
    fn repeated_token_is_rejected() {
        let store = MemoryObjectStore::new();
        store_page(&store, "ocr-results/job-4/0.json", &page(&["a"], Some("loop")));
        store_page(&store, "ocr-results/job-4/loop.json", &page(&["b"], Some("loop")));
        let source = ObjectStorePageSource::new(&store, "ocr-results/");
        let err = collect_job_result(&source, "job-4").unwrap_err();
        assert!(matches!(err, OcrError::PaginationLoop { .. }));
    }

    #[test]
    fn malformed_page_reports_location() {
        let store = MemoryObjectStore::new();
        store.put("ocr-results/job-5/0.json", b"not json", CONTENT_TYPE_JSON).unwrap();
        let source = ObjectStorePageSource::new(&store, "ocr-results/");
        match collect_job_result(&source, "job-5").unwrap_err() {
            OcrError::Malformed { location, .. } => {
                assert_eq!(location, "ocr-results/job-5/0.json")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
