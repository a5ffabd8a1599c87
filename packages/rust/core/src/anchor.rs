//! Fuzzy title anchoring under a forward window and a monotonic cursor.
//!
//! For every target title the matcher scans `blocks[cursor, cursor + window)`
//! (title and text blocks only) and stops at the first candidate whose score
//! reaches the threshold. A match moves the cursor to `match + 1`; a miss
//! leaves it unchanged. Misses are normal outcomes, never errors.

use std::sync::Arc;

use tracing::trace;

use docoutline_shared::{Block, Node};

use crate::similarity::{Similarity, default_similarity};

/// Default forward window, in blocks.
pub const DEFAULT_WINDOW: usize = 1000;

/// Default minimum similarity for an anchor.
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Matched block index of one node, mirrored over its children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    pub index: Option<usize>,
    pub children: Vec<Anchor>,
}

impl Anchor {
    pub fn is_matched(&self) -> bool {
        self.index.is_some()
    }
}

/// Locates node titles inside a block sequence.
#[derive(Clone)]
pub struct AnchorMatcher {
    similarity: Arc<dyn Similarity>,
    window: usize,
    threshold: f64,
}

impl std::fmt::Debug for AnchorMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorMatcher")
            .field("window", &self.window)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl Default for AnchorMatcher {
    fn default() -> Self {
        Self::new(default_similarity(), DEFAULT_WINDOW, DEFAULT_THRESHOLD)
    }
}

impl AnchorMatcher {
    pub fn new(similarity: Arc<dyn Similarity>, window: usize, threshold: f64) -> Self {
        Self {
            similarity,
            window,
            threshold,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best-matching block index for `title` within the window at `cursor`.
    ///
    /// The scan stops as soon as the running best reaches the threshold, so a
    /// nearer passing candidate wins over a farther, stronger one.
    pub fn locate_one(&self, title: &str, blocks: &[Block], cursor: usize) -> Option<usize> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }

        let start = cursor.min(blocks.len());
        let end = cursor.saturating_add(self.window).min(blocks.len());
        let mut best: Option<(usize, f64)> = None;

        for (offset, block) in blocks[start..end].iter().enumerate() {
            if !block.kind.is_text_bearing() {
                continue;
            }
            let score = self.similarity.score(title, &block.text);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((start + offset, score));
            }
            if score >= self.threshold {
                break;
            }
        }

        let matched = best
            .filter(|&(_, score)| score >= self.threshold)
            .map(|(index, _)| index);
        trace!(title, cursor, ?matched, "anchor lookup");
        matched
    }

    /// Flat pass: one shared cursor across all titles, in order.
    ///
    /// Returns the match per title and the cursor after the last title.
    pub fn locate<S: AsRef<str>>(
        &self,
        titles: &[S],
        blocks: &[Block],
        cursor: usize,
    ) -> (Vec<Option<usize>>, usize) {
        let mut cursor = cursor;
        let mut matches = Vec::with_capacity(titles.len());

        for title in titles {
            let matched = self.locate_one(title.as_ref(), blocks, cursor);
            if let Some(index) = matched {
                cursor = index + 1;
            }
            matches.push(matched);
        }

        (matches, cursor)
    }

    /// Nested pass over a node forest.
    ///
    /// Children search from their parent's matched index (or the inherited
    /// cursor when the parent is unmatched). The returned cursor is the
    /// furthest position reached by the forest and all descendants, so later
    /// siblings never re-scan consumed blocks.
    pub fn locate_tree(
        &self,
        nodes: &[Node],
        blocks: &[Block],
        cursor: usize,
    ) -> (Vec<Anchor>, usize) {
        let mut cursor = cursor;
        let mut anchors = Vec::with_capacity(nodes.len());

        for node in nodes {
            let index = self.locate_one(&node.title, blocks, cursor);
            if let Some(matched) = index {
                cursor = matched + 1;
            }

            let children = if node.children.is_empty() {
                Vec::new()
            } else {
                let child_start = index.unwrap_or(cursor);
                let (children, reached) = self.locate_tree(&node.children, blocks, child_start);
                cursor = cursor.max(reached);
                children
            };

            anchors.push(Anchor { index, children });
        }

        (anchors, cursor)
    }
}
