//! Block stream normalization.
//!
//! The external extractor emits a per-page "middle JSON" document:
//!
//! ```text
//! { "pdf_info": [ { "page_id": 0, "para_blocks": [ { "type": "title", "text": "...", ... } ] } ] }
//! ```
//!
//! [`BlockStream`] re-shapes it into one ordered sequence of [`Block`]s. Every
//! field is optional on the way in; malformed values degrade to defaults
//! instead of failing the whole document.

use serde_json::Value;
use tracing::{debug, instrument};

use docoutline_shared::{Block, BlockKind, OutlineError, Result};

/// The blocks of one page, in extractor order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageBlocks {
    /// Page index reported by the extractor (`page_id` or `page_idx`).
    pub page: Option<u32>,
    pub blocks: Vec<Block>,
}

/// Ordered, page-grouped block sequence for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockStream {
    pages: Vec<PageBlocks>,
}

impl BlockStream {
    /// Parse a middle JSON document. Fails only when the input is not JSON.
    #[instrument(skip_all, fields(bytes = json.len()))]
    pub fn from_middle_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| OutlineError::parse(format!("invalid middle JSON: {e}")))?;
        let stream = Self::from_value(&value);
        debug!(
            pages = stream.pages.len(),
            blocks = stream.len(),
            "normalized block stream"
        );
        Ok(stream)
    }

    /// Normalize an already-parsed middle JSON value.
    pub fn from_value(value: &Value) -> Self {
        let pages = value
            .get("pdf_info")
            .and_then(Value::as_array)
            .map(|pages| pages.iter().map(normalize_page).collect())
            .unwrap_or_default();
        Self { pages }
    }

    /// Build a stream from blocks that are already normalized.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            pages: vec![PageBlocks { page: None, blocks }],
        }
    }

    pub fn pages(&self) -> &[PageBlocks] {
        &self.pages
    }

    /// Total number of blocks across all pages.
    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.blocks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All blocks flattened in document order.
    pub fn blocks(&self) -> Vec<Block> {
        self.pages
            .iter()
            .flat_map(|p| p.blocks.iter().cloned())
            .collect()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.pages.into_iter().flat_map(|p| p.blocks).collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn normalize_page(page: &Value) -> PageBlocks {
    let page_index = page
        .get("page_id")
        .and_then(as_u32)
        .or_else(|| page.get("page_idx").and_then(as_u32));

    let blocks = page
        .get("para_blocks")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .map(|b| normalize_block(b, page_index))
                .collect()
        })
        .unwrap_or_default();

    PageBlocks {
        page: page_index,
        blocks,
    }
}

fn normalize_block(block: &Value, page: Option<u32>) -> Block {
    let kind = block
        .get("type")
        .and_then(Value::as_str)
        .map(BlockKind::from_label)
        .unwrap_or(BlockKind::Other);

    let id = block
        .get("id")
        .or_else(|| block.get("block_id"))
        .and_then(as_id);

    Block {
        id,
        page,
        kind,
        level: block.get("level").and_then(as_u32),
        text: extract_text(block),
        image_path: block
            .get("image_path")
            .and_then(Value::as_str)
            .map(str::to_string),
        table_html: block.get("html").and_then(Value::as_str).map(str::to_string),
    }
}

/// The block's `text` field if non-blank, else its concatenated span contents.
fn extract_text(block: &Value) -> String {
    if let Some(text) = block.get("text").and_then(Value::as_str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let Some(lines) = block.get("lines").and_then(Value::as_array) else {
        return String::new();
    };

    let mut out = String::new();
    for line in lines {
        let spans = line.get("spans").and_then(Value::as_array);
        for span in spans.into_iter().flatten() {
            if let Some(content) = span.get("content").and_then(Value::as_str) {
                out.push_str(content);
            }
        }
    }
    out.trim().to_string()
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
