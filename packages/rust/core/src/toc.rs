//! TOC reconciliation.
//!
//! Reconciles a built tree with an externally extracted table of contents.
//! Exactly one strategy runs per document:
//!
//! 1. **Retitle**: overwrite titles of the best-matching same-level nodes.
//! 2. **Rebuild**: discard the tree and rebuild it from the TOC items, with
//!    flat content between consecutive anchors.
//! 3. **Delegated**: apply `node_id -> title` corrections returned by an
//!    external mapping capability, verbatim.
//!
//! An empty item list is a no-op recorded in the tree's TOC metadata.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use docoutline_shared::{
    AlignMode, Block, FlatNode, Node, NodeStatus, Result, SimilarityKind, TitleCorrection,
    TocItem, TocMeta, Tree,
};

use crate::anchor::AnchorMatcher;
use crate::builder::nest_by_level;
use crate::content::attribute_block;
use crate::similarity::{Similarity, build_similarity, default_similarity};

/// Reason code: the TOC source produced no items.
pub const REASON_EMPTY_TOC: &str = "empty_toc";
/// Reason code: TOC correction is turned off in config.
pub const REASON_DISABLED: &str = "disabled";
/// Reason code: the mapping capability failed; the tree was left as is.
pub const REASON_MAPPING_FAILED: &str = "mapping_failed";

/// External capability that maps outline nodes onto TOC titles.
#[async_trait]
pub trait TitleMapper: Send + Sync {
    async fn map_titles(
        &self,
        nodes: &[FlatNode],
        toc_items: &[TocItem],
    ) -> Result<Vec<TitleCorrection>>;
}

/// TOC items together with the name of the source that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TocInput {
    pub source: String,
    pub items: Vec<TocItem>,
}

impl TocInput {
    pub fn new(source: impl Into<String>, items: Vec<TocItem>) -> Self {
        Self {
            source: source.into(),
            items,
        }
    }
}

/// The strategy selected for a document.
#[derive(Clone)]
pub enum AlignStrategy {
    Retitle,
    Rebuild,
    Delegated(Arc<dyn TitleMapper>),
}

impl AlignStrategy {
    pub fn mode(&self) -> AlignMode {
        match self {
            Self::Retitle => AlignMode::Retitle,
            Self::Rebuild => AlignMode::Rebuild,
            Self::Delegated(_) => AlignMode::Delegated,
        }
    }
}

impl std::fmt::Debug for AlignStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.mode())
    }
}

/// What a correction pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignReport {
    /// Nodes retitled, or nodes anchored for a rebuild.
    pub changed: usize,
    /// Set when the tree was left unmodified.
    pub reason: Option<&'static str>,
}

/// Runs TOC correction strategies.
///
/// Retitling compares titles with a sequence ratio; rebuild anchoring uses
/// the scorer passed to [`TocAligner::new`].
#[derive(Clone)]
pub struct TocAligner {
    similarity: Arc<dyn Similarity>,
    title_similarity: Arc<dyn Similarity>,
    threshold: f64,
    window: usize,
}

impl TocAligner {
    pub fn new(similarity: Arc<dyn Similarity>, threshold: f64, window: usize) -> Self {
        Self {
            similarity,
            title_similarity: build_similarity(SimilarityKind::SequenceRatio),
            threshold,
            window,
        }
    }

    /// Apply `strategy` and record the TOC on the tree.
    ///
    /// `blocks` is only read by the rebuild strategy.
    #[instrument(skip_all, fields(doc_id = %tree.doc_id, source = %toc.source, items = toc.items.len(), strategy = ?strategy))]
    pub async fn correct(
        &self,
        tree: &mut Tree,
        toc: TocInput,
        strategy: &AlignStrategy,
        blocks: &[Block],
    ) -> Result<AlignReport> {
        let TocInput { source, items } = toc;

        if items.is_empty() {
            info!("TOC source yielded no items, leaving tree unchanged");
            tree.toc = Some(TocMeta {
                source,
                items,
                reason: Some(REASON_EMPTY_TOC.to_string()),
            });
            return Ok(AlignReport {
                changed: 0,
                reason: Some(REASON_EMPTY_TOC),
            });
        }

        let report = match strategy {
            AlignStrategy::Retitle => AlignReport {
                changed: self.retitle(tree, &items),
                reason: None,
            },
            AlignStrategy::Rebuild => AlignReport {
                changed: self.rebuild(tree, &items, blocks),
                reason: None,
            },
            AlignStrategy::Delegated(mapper) => {
                match self.delegate(tree, &items, mapper.as_ref()).await {
                    Ok(changed) => AlignReport {
                        changed,
                        reason: None,
                    },
                    Err(e) => {
                        warn!(error = %e, "title mapping failed, keeping built titles");
                        AlignReport {
                            changed: 0,
                            reason: Some(REASON_MAPPING_FAILED),
                        }
                    }
                }
            }
        };

        info!(changed = report.changed, "TOC correction complete");
        tree.toc = Some(TocMeta {
            source,
            items,
            reason: report.reason.map(str::to_string),
        });
        Ok(report)
    }

    /// Strategy 1: for each item, retitle the most similar same-level node
    /// when the score reaches the threshold. Returns the number of overwrites.
    pub fn retitle(&self, tree: &mut Tree, items: &[TocItem]) -> usize {
        // Later items score against titles already overwritten by earlier ones.
        let mut titles: Vec<(u32, String)> = tree
            .flatten()
            .iter()
            .map(|n| (n.level, n.title.clone()))
            .collect();
        let mut overwrites: HashMap<usize, String> = HashMap::new();

        for item in items {
            let wanted = item.title.trim();
            if wanted.is_empty() {
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for (idx, (level, title)) in titles.iter().enumerate() {
                if *level != item.level {
                    continue;
                }
                let score = self.title_similarity.score(title, wanted);
                if best.is_none_or(|(_, best_score)| score > best_score) {
                    best = Some((idx, score));
                }
            }

            if let Some((idx, score)) = best.filter(|&(_, score)| score >= self.threshold) {
                debug!(from = %titles[idx].1, to = wanted, score, "retitling node");
                titles[idx].1 = wanted.to_string();
                overwrites.insert(idx, wanted.to_string());
            }
        }

        let changed = overwrites.len();
        let mut position = 0;
        tree.for_each_mut(|node| {
            if let Some(title) = overwrites.remove(&position) {
                node.title = title;
            }
            position += 1;
        });
        changed
    }

    /// Strategy 2: replace the tree with one node per TOC item.
    ///
    /// Items are anchored in a single flat pass sharing one cursor; each
    /// matched node receives the blocks strictly between its anchor and the
    /// next matched anchor. The flat list is then nested by level. Returns the
    /// number of anchored items.
    pub fn rebuild(&self, tree: &mut Tree, items: &[TocItem], blocks: &[Block]) -> usize {
        let matcher = AnchorMatcher::new(self.similarity.clone(), self.window, self.threshold);
        let titles: Vec<&str> = items.iter().map(|item| item.title.as_str()).collect();
        let (matches, _) = matcher.locate(&titles, blocks, 0);

        let mut flat: Vec<Node> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let id = format!("toc_{}", i + 1);
                let mut node = Node::new(id, item.title.trim(), item.level.max(1));
                node.kind = item.kind.clone();
                node
            })
            .collect();

        let mut anchored = 0;
        for (i, node) in flat.iter_mut().enumerate() {
            let Some(start) = matches[i] else {
                continue;
            };
            let end = matches[i + 1..]
                .iter()
                .find_map(|m| *m)
                .unwrap_or(blocks.len());
            for block in &blocks[start + 1..end] {
                attribute_block(node, block);
            }
            node.status = NodeStatus::Filled;
            anchored += 1;
        }

        debug!(items = items.len(), anchored, "rebuilt tree from TOC");
        tree.nodes = nest_by_level(flat);
        tree.analysis_summary = None;
        anchored
    }

    /// Strategy 3: apply corrections from the mapping capability verbatim.
    /// Returns the number of retitled nodes.
    pub async fn delegate(
        &self,
        tree: &mut Tree,
        items: &[TocItem],
        mapper: &dyn TitleMapper,
    ) -> Result<usize> {
        let flat: Vec<FlatNode> = tree
            .flatten()
            .iter()
            .map(|n| FlatNode {
                node_id: n.node_id.clone(),
                title: n.title.clone(),
                level: n.level,
            })
            .collect();

        let corrections = mapper.map_titles(&flat, items).await?;
        let mapping: HashMap<String, String> = corrections
            .into_iter()
            .filter(|c| !c.new_title.trim().is_empty())
            .map(|c| (c.node_id, c.new_title))
            .collect();

        let mut changed = 0;
        tree.for_each_mut(|node| {
            if let Some(title) = mapping.get(&node.node_id) {
                node.title = title.clone();
                changed += 1;
            }
        });
        debug!(corrections = mapping.len(), changed, "applied delegated title mapping");
        Ok(changed)
    }
}

/// Record that TOC correction was skipped by configuration.
pub fn record_disabled(tree: &mut Tree) {
    tree.toc = Some(TocMeta {
        source: REASON_DISABLED.to_string(),
        items: Vec::new(),
        reason: Some(REASON_DISABLED.to_string()),
    });
}

/// Correct `tree` against `toc` with the default similarity scorer.
pub async fn correct_toc(
    tree: &mut Tree,
    toc: TocInput,
    strategy: &AlignStrategy,
    blocks: &[Block],
    threshold: f64,
    window: usize,
) -> Result<AlignReport> {
    TocAligner::new(default_similarity(), threshold, window)
        .correct(tree, toc, strategy, blocks)
        .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
