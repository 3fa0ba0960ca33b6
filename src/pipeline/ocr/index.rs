use std::collections::HashMap;

use super::types::{Block, BlockKind};

const CHILD: &str = "CHILD";
const VALUE: &str = "VALUE";

/// Identity → block lookup over one analysis result.
///
/// Borrowed from the result; built in one pass. Duplicate ids keep the last
/// occurrence.
pub struct BlockIndex<'a> {
    by_id: HashMap<&'a str, &'a Block>,
}

impl<'a> BlockIndex<'a> {
    pub fn new(blocks: &'a [Block]) -> Self {
        let mut by_id = HashMap::with_capacity(blocks.len());
        for block in blocks {
            by_id.insert(block.id.as_str(), block);
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a Block> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Space-joined text of the WORD children of `block`. Empty when the
    /// block has no word children.
    pub fn text_of(&self, block: &Block) -> String {
        let words: Vec<&str> = block
            .related_ids(CHILD)
            .filter_map(|id| self.get(id))
            .filter(|child| child.kind() == BlockKind::Word)
            .filter_map(|child| child.text.as_deref())
            .collect();
        words.join(" ").trim().to_string()
    }

    /// Block paired with a KEY block through its VALUE relationship.
    pub fn value_of(&self, key_block: &Block) -> Option<&'a Block> {
        key_block
            .related_ids(VALUE)
            .next()
            .and_then(|id| self.get(id))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::pipeline::ocr::types::{Block, BoundingBox, Geometry, Relationship};

    fn geometry(top: f64) -> Option<Geometry> {
        Some(Geometry {
            bounding_box: Some(BoundingBox {
                top,
                ..BoundingBox::default()
            }),
        })
    }

    pub fn word(id: &str, text: &str) -> Block {
        Block {
            id: id.to_string(),
            block_type: "WORD".to_string(),
            entity_types: vec![],
            page: Some(1),
            text: Some(text.to_string()),
            confidence: Some(99.0),
            geometry: None,
            relationships: vec![],
        }
    }

    pub fn line(id: &str, text: &str, page: u32, top: f64) -> Block {
        Block {
            id: id.to_string(),
            block_type: "LINE".to_string(),
            entity_types: vec![],
            page: Some(page),
            text: Some(text.to_string()),
            confidence: Some(99.0),
            geometry: geometry(top),
            relationships: vec![],
        }
    }

    /// KEY block with word children and an optional VALUE link.
    pub fn key(id: &str, words: &[&str], value_id: Option<&str>, page: u32, top: f64) -> Block {
        let mut relationships = vec![Relationship {
            kind: "CHILD".to_string(),
            ids: words.iter().map(|w| w.to_string()).collect(),
        }];
        if let Some(value_id) = value_id {
            relationships.push(Relationship {
                kind: "VALUE".to_string(),
                ids: vec![value_id.to_string()],
            });
        }
        Block {
            id: id.to_string(),
            block_type: "KEY_VALUE_SET".to_string(),
            entity_types: vec!["KEY".to_string()],
            page: Some(page),
            text: None,
            confidence: Some(87.5),
            geometry: geometry(top),
            relationships,
        }
    }

    pub fn value(id: &str, words: &[&str], page: u32, top: f64) -> Block {
        Block {
            id: id.to_string(),
            block_type: "KEY_VALUE_SET".to_string(),
            entity_types: vec!["VALUE".to_string()],
            page: Some(page),
            text: None,
            confidence: Some(80.0),
            geometry: geometry(top),
            relationships: vec![Relationship {
                kind: "CHILD".to_string(),
                ids: words.iter().map(|w| w.to_string()).collect(),
            }],
        }
    }

    /// A key/value pair `label: value` built from whitespace-split words.
    /// Word ids are derived from `prefix`.
    pub fn pair(prefix: &str, label: &str, val: &str, page: u32, top: f64) -> Vec<Block> {
        let mut blocks = Vec::new();
        let key_words: Vec<String> = label
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| {
                let id = format!("{prefix}-kw{i}");
                blocks.push(word(&id, w));
                id
            })
            .collect();
        let value_words: Vec<String> = val
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| {
                let id = format!("{prefix}-vw{i}");
                blocks.push(word(&id, w));
                id
            })
            .collect();
        let key_refs: Vec<&str> = key_words.iter().map(String::as_str).collect();
        let value_refs: Vec<&str> = value_words.iter().map(String::as_str).collect();
        let value_id = format!("{prefix}-v");
        blocks.push(key(&format!("{prefix}-k"), &key_refs, Some(&value_id), page, top));
        blocks.push(value(&value_id, &value_refs, page, top));
        blocks
    }
}
