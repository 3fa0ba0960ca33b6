use serde::{Deserialize, Serialize};

/// Job status value for a finished analysis.
pub const JOB_SUCCEEDED: &str = "SUCCEEDED";

/// Block type as far as normalization cares. Anything else (PAGE, TABLE,
/// CELL, SELECTION_ELEMENT, ...) is carried but ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Word,
    Line,
    KeyValueSet,
    Other,
}

impl BlockKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "WORD" => Self::Word,
            "LINE" => Self::Line,
            "KEY_VALUE_SET" => Self::KeyValueSet,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BoundingBox {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relationship {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

/// One spatial OCR primitive, as emitted by the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Block {
    pub id: String,
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        BlockKind::parse(&self.block_type)
    }

    /// KEY_VALUE_SET block in the KEY role.
    pub fn is_key(&self) -> bool {
        self.kind() == BlockKind::KeyValueSet && self.entity_types.iter().any(|t| t == "KEY")
    }

    /// Page number, 1 when absent.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    /// Top of the bounding box, 0 when absent.
    pub fn top(&self) -> f64 {
        self.geometry
            .as_ref()
            .and_then(|g| g.bounding_box.as_ref())
            .map(|b| b.top)
            .unwrap_or(0.0)
    }

    /// Ids of all relationships of the given type, in declaration order.
    pub fn related_ids<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.kind == kind)
            .flat_map(|r| r.ids.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub pages: u32,
}

/// One page of a paginated analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrResultPage {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub job_status: String,
    #[serde(default)]
    pub document_metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Fully assembled analysis result: every block of every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrJobResult {
    pub blocks: Vec<Block>,
    pub job_status: String,
    #[serde(default)]
    pub document_metadata: DocumentMetadata,
}

impl OcrJobResult {
    pub fn succeeded(&self) -> bool {
        self.job_status == JOB_SUCCEEDED
    }
}
