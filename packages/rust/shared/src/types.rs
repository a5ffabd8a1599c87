//! Core domain types for document outlines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OutlineError, Result};

/// Maximum heading depth tracked by the per-level counters.
pub const MAX_LEVEL: u32 = 6;

// ---------------------------------------------------------------------------
// DocId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for document identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub Uuid);

impl DocId {
    /// Generate a new time-sortable document identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// Normalized block category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Title,
    Text,
    Image,
    Table,
    Other,
}

impl BlockKind {
    /// Map an extractor type label onto a block kind (case-insensitive).
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "TITLE" | "TITLE_BLOCK" => Self::Title,
            "TEXT" | "PARA" | "PARAGRAPH" => Self::Text,
            "IMAGE" | "FIGURE" => Self::Image,
            "TABLE" => Self::Table,
            _ => Self::Other,
        }
    }

    /// Whether blocks of this kind can anchor a title match.
    pub fn is_text_bearing(self) -> bool {
        matches!(self, Self::Title | Self::Text)
    }
}

/// One atomic content unit on a page, as produced by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Extractor-assigned block id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Zero-based page index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub kind: BlockKind,
    /// Heading level reported for title blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Extracted text, trimmed. Empty when the block carries none.
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_html: Option<String>,
}

impl Block {
    /// Build a block of the given kind with text and nothing else set.
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            id: None,
            page: None,
            kind,
            level: None,
            text: text.into(),
            image_path: None,
            table_html: None,
        }
    }

    /// Shorthand for a title block at `level`.
    pub fn title(level: u32, text: impl Into<String>) -> Self {
        Self {
            level: Some(level),
            ..Self::new(BlockKind::Title, text)
        }
    }

    /// Shorthand for a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Text, text)
    }

    /// Set the page index.
    pub fn on_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Heading level clamped to `1..=MAX_LEVEL` (missing levels count as 1).
    pub fn heading_level(&self) -> u32 {
        self.level.unwrap_or(1).clamp(1, MAX_LEVEL)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Processing state of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Pending,
    Filled,
    Analyzed,
    Failed,
}

/// Reference to a text block owned by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRef {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub page: Option<u32>,
}

/// Reference to an image block owned by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

/// Reference to a table block owned by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

/// Blocks attributed to a node, by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentRefs {
    #[serde(default)]
    pub text_blocks: Vec<TextRef>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub tables: Vec<TableRef>,
}

impl ContentRefs {
    pub fn is_empty(&self) -> bool {
        self.text_blocks.is_empty() && self.images.is_empty() && self.tables.is_empty()
    }
}

/// One entry of the reconstructed outline. Owns its children exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Hierarchical path id, e.g. `chapter_1_2`.
    pub node_id: String,
    pub title: String,
    /// Heading level, always >= 1.
    pub level: u32,
    /// Type hint forwarded to the analyze capability (e.g. `expansion`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// `[min, max]` page indices of attributed blocks.
    #[serde(default)]
    pub page_range: Option<[u32; 2]>,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub content_refs: ContentRefs,
    #[serde(default)]
    pub raw_text: Vec<String>,
    /// Opaque analysis result.
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
    /// Failure payload of the last analysis attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Node {
    /// Create an empty, pending node.
    pub fn new(node_id: impl Into<String>, title: impl Into<String>, level: u32) -> Self {
        Self {
            node_id: node_id.into(),
            title: title.into(),
            level,
            kind: None,
            page_range: None,
            status: NodeStatus::Pending,
            content_refs: ContentRefs::default(),
            raw_text: Vec::new(),
            analysis: None,
            error: None,
            children: Vec::new(),
        }
    }

    /// Widen `page_range` to include `page`. Never narrows.
    pub fn widen_page_range(&mut self, page: Option<u32>) {
        let Some(page) = page else {
            return;
        };
        self.page_range = Some(match self.page_range {
            None => [page, page],
            Some([min, max]) => [min.min(page), max.max(page)],
        });
    }

    /// Drop all attributed content, including the page span, so it can be
    /// reassigned.
    pub fn reset_content(&mut self) {
        self.content_refs = ContentRefs::default();
        self.raw_text.clear();
        self.page_range = None;
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// TOC
// ---------------------------------------------------------------------------

fn default_level() -> u32 {
    1
}

/// One entry of an externally supplied table of contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocItem {
    pub title: String,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl TocItem {
    pub fn new(title: impl Into<String>, level: u32) -> Self {
        Self {
            title: title.into(),
            level,
            kind: None,
        }
    }
}

/// TOC metadata recorded on a tree after correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocMeta {
    /// Where the items came from (e.g. `vlm`, `text`, `vlm_precheck`).
    pub source: String,
    pub items: Vec<TocItem>,
    /// Reason code when the TOC was not applied (`empty_toc`, `disabled`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Flattened node view sent to the external title-mapping capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatNode {
    pub node_id: String,
    pub title: String,
    pub level: u32,
}

/// A `node_id -> corrected title` pair returned by the mapping capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleCorrection {
    pub node_id: String,
    pub new_title: String,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Aggregate outcome of an enrichment run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub analyzed: usize,
    pub failed: usize,
    pub skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisStats {
    /// Total number of nodes accounted for.
    pub fn total(&self) -> usize {
        self.analyzed + self.failed + self.skipped
    }
}

/// A document outline: ordered root nodes plus TOC and analysis metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub doc_id: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc: Option<TocMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<AnalysisStats>,
}

impl Tree {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            nodes: Vec::new(),
            toc: None,
            analysis_summary: None,
        }
    }

    /// Total number of nodes at every depth.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(Node::subtree_len).sum()
    }

    /// All nodes in pre-order, depth-first.
    pub fn flatten(&self) -> Vec<&Node> {
        fn walk<'a>(nodes: &'a [Node], out: &mut Vec<&'a Node>) {
            for node in nodes {
                out.push(node);
                walk(&node.children, out);
            }
        }

        let mut out = Vec::with_capacity(self.node_count());
        walk(&self.nodes, &mut out);
        out
    }

    /// Visit every node mutably in pre-order, depth-first.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut Node)) {
        fn walk(nodes: &mut [Node], f: &mut impl FnMut(&mut Node)) {
            for node in nodes {
                f(node);
                walk(&mut node.children, f);
            }
        }

        walk(&mut self.nodes, &mut f);
    }

    /// Check structural invariants: positive levels, children deeper than
    /// their parent, and globally unique node ids.
    pub fn validate(&self) -> Result<()> {
        fn walk<'a>(
            nodes: &'a [Node],
            parent_level: u32,
            seen: &mut std::collections::HashSet<&'a str>,
        ) -> Result<()> {
            for node in nodes {
                if node.level == 0 {
                    return Err(OutlineError::validation(format!(
                        "node {} has level 0",
                        node.node_id
                    )));
                }
                if node.level <= parent_level {
                    return Err(OutlineError::validation(format!(
                        "node {} (level {}) is nested under level {parent_level}",
                        node.node_id, node.level
                    )));
                }
                if !seen.insert(node.node_id.as_str()) {
                    return Err(OutlineError::validation(format!(
                        "duplicate node id {}",
                        node.node_id
                    )));
                }
                walk(&node.children, node.level, seen)?;
            }
            Ok(())
        }

        let mut seen = std::collections::HashSet::new();
        walk(&self.nodes, 0, &mut seen)
    }
}
