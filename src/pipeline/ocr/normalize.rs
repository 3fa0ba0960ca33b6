//! OCR result → reading-ordered transcripts and a keyed form dictionary.
//!
//! Two transcripts come out of one result:
//! - `line_text`: every LINE block sorted by `(page, top)`; used to count
//!   encounter delimiters.
//! - `primary_text`: KEY/VALUE pairs rendered as `"key value"` in the same
//!   order, falling back to `line_text` when the document has no form pairs.

use std::cmp::Ordering;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::index::BlockIndex;
use super::types::{BlockKind, OcrJobResult};

/// One LINE block in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub page: u32,
    #[serde(rename = "y_position")]
    pub top: f64,
}

/// One resolved KEY/VALUE pair. `key` is unique within a document;
/// `original_key` is the text as printed on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormEntry {
    pub key: String,
    pub original_key: String,
    pub value: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Form pairs in reading order. Repeated labels get `#2`, `#3`… suffixes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormDictionary {
    entries: Vec<FormEntry>,
}

impl FormDictionary {
    /// Insert a pair under its printed label, suffixing duplicates.
    pub fn push(&mut self, label: &str, value: &str, confidence: f32) {
        let mut key = label.to_string();
        let mut n = 1;
        while self.get(&key).is_some() {
            n += 1;
            key = format!("{label}#{n}");
        }
        self.entries.push(FormEntry {
            key,
            original_key: label.to_string(),
            value: value.to_string(),
            confidence,
        });
    }

    /// Exact key lookup.
    pub fn get(&self, key: &str) -> Option<&FormEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Exact key, else the first entry printed with that label.
    pub fn lookup(&self, label: &str) -> Option<&FormEntry> {
        self.get(label)
            .or_else(|| self.entries.iter().find(|e| e.original_key == label))
    }

    pub fn entries(&self) -> &[FormEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationMetadata {
    pub document_pages: u32,
    pub extraction_timestamp: String,
    pub job_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub primary_text: String,
    pub line_text: String,
    pub lines: Vec<TextLine>,
    pub forms: FormDictionary,
    pub metadata: NormalizationMetadata,
}

struct PositionedPair {
    key: String,
    value: String,
    confidence: f32,
    page: u32,
    top: f64,
}

fn reading_order(a: (u32, f64), b: (u32, f64)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.total_cmp(&b.1))
}

/// Normalize an assembled analysis result.
pub fn normalize(result: &OcrJobResult) -> NormalizedDocument {
    let index = BlockIndex::new(&result.blocks);

    let mut pairs: Vec<PositionedPair> = result
        .blocks
        .iter()
        .filter(|b| b.is_key())
        .filter_map(|key_block| {
            let key = index.text_of(key_block);
            if key.is_empty() {
                return None;
            }
            let value = index
                .value_of(key_block)
                .map(|v| index.text_of(v))
                .unwrap_or_default();
            Some(PositionedPair {
                key,
                value,
                confidence: key_block.confidence.unwrap_or(0.0),
                page: key_block.page(),
                top: key_block.top(),
            })
        })
        .collect();
    // sort_by is stable: ties keep block order
    pairs.sort_by(|a, b| reading_order((a.page, a.top), (b.page, b.top)));

    let mut forms = FormDictionary::default();
    let mut form_lines = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        forms.push(&pair.key, &pair.value, pair.confidence);
        if pair.value.is_empty() {
            form_lines.push(pair.key.clone());
        } else {
            form_lines.push(format!("{} {}", pair.key, pair.value));
        }
    }
    let forms_text = form_lines.join("\n");

    let mut lines: Vec<TextLine> = result
        .blocks
        .iter()
        .filter(|b| b.kind() == BlockKind::Line)
        .map(|b| TextLine {
            text: b.text.clone().unwrap_or_default(),
            page: b.page(),
            top: b.top(),
        })
        .collect();
    lines.sort_by(|a, b| reading_order((a.page, a.top), (b.page, b.top)));
    let line_text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    tracing::debug!(
        form_pairs = pairs.len(),
        lines = lines.len(),
        "Normalized OCR result"
    );

    let primary_text = if forms_text.is_empty() {
        line_text.clone()
    } else {
        forms_text
    };

    NormalizedDocument {
        primary_text,
        line_text,
        lines,
        forms,
        metadata: NormalizationMetadata {
            document_pages: result.document_metadata.pages,
            extraction_timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            job_status: result.job_status.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ocr::index::fixtures::*;
    use crate::pipeline::ocr::types::{Block, DocumentMetadata};

    fn job(blocks: Vec<Block>) -> OcrJobResult {
        OcrJobResult {
            blocks,
            job_status: "SUCCEEDED".to_string(),
            document_metadata: DocumentMetadata { pages: 2 },
        }
    }

    #[test]
    fn lines_sorted_by_page_then_top() {
        let result = job(vec![
            line("c", "third", 2, 0.1),
            line("a", "first", 1, 0.5),
            line("b", "second", 1, 0.9),
            line("z", "zeroth", 1, 0.05),
        ]);
        let doc = normalize(&result);
        assert_eq!(doc.line_text, "zeroth\nfirst\nsecond\nthird");
        assert_eq!(doc.primary_text, doc.line_text);
        assert!(doc.forms.is_empty());
        assert_eq!(doc.metadata.document_pages, 2);
        assert_eq!(doc.metadata.job_status, "SUCCEEDED");
    }

    #[test]
    fn n_lines_keep_count_and_order() {
        let tops = [0.7, 0.1, 0.4, 0.4, 0.9, 0.0, 0.3];
        let blocks: Vec<Block> = tops
            .iter()
            .enumerate()
            .map(|(i, top)| line(&format!("l{i}"), &format!("line {i}"), 1 + (i as u32 % 2), *top))
            .collect();
        let doc = normalize(&job(blocks));

        assert_eq!(doc.line_text.split('\n').count(), tops.len());
        for pair in doc.lines.windows(2) {
            assert_ne!(
                reading_order((pair[0].page, pair[0].top), (pair[1].page, pair[1].top)),
                Ordering::Greater
            );
        }
    }

    #[test]
    fn equal_positions_keep_block_order() {
        let doc = normalize(&job(vec![
            line("a", "alpha", 1, 0.2),
            line("b", "beta", 1, 0.2),
            line("c", "gamma", 1, 0.2),
        ]));
        assert_eq!(doc.line_text, "alpha\nbeta\ngamma");
    }

    #[test]
    fn forms_text_preferred_over_lines() {
        let mut blocks = pair("p2", "Service Date:", "01/02/2026", 1, 0.3);
        blocks.extend(pair("p1", "Consumer Name:", "Jane Roe", 1, 0.1));
        blocks.push(line("l1", "Consumer Name: Jane Roe", 1, 0.1));
        let doc = normalize(&job(blocks));

        assert_eq!(
            doc.primary_text,
            "Consumer Name: Jane Roe\nService Date: 01/02/2026"
        );
        assert_eq!(doc.line_text, "Consumer Name: Jane Roe");
        assert_eq!(doc.forms.lookup("Service Date:").unwrap().value, "01/02/2026");
    }

    #[test]
    fn empty_value_renders_key_only_and_empty_key_is_dropped() {
        let blocks = vec![
            word("w1", "Signature:"),
            key("k1", &["w1"], None, 1, 0.1),
            key("k2", &[], None, 1, 0.2),
        ];
        let doc = normalize(&job(blocks));
        assert_eq!(doc.primary_text, "Signature:");
        assert_eq!(doc.forms.len(), 1);
        assert_eq!(doc.forms.get("Signature:").unwrap().value, "");
    }

    #[test]
    fn duplicate_labels_are_suffixed() {
        let mut blocks = pair("a", "ID:", "100", 1, 0.1);
        blocks.extend(pair("b", "ID:", "200", 1, 0.2));
        blocks.extend(pair("c", "ID:", "300", 1, 0.3));
        let doc = normalize(&job(blocks));

        let keys: Vec<&str> = doc.forms.entries().iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["ID:", "ID:#2", "ID:#3"]);
        assert!(doc.forms.entries().iter().all(|e| e.original_key == "ID:"));
        assert_eq!(doc.forms.get("ID:#2").unwrap().value, "200");
        assert_eq!(doc.forms.lookup("ID:").unwrap().value, "100");
    }

    #[test]
    fn empty_result_yields_empty_document() {
        let doc = normalize(&job(vec![]));
        assert_eq!(doc.primary_text, "");
        assert_eq!(doc.line_text, "");
        assert!(doc.lines.is_empty());
    }
}
