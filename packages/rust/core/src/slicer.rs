//! Partition the flat block stream into per-node content slices.
//!
//! A matched node owns `[anchor, next_boundary)`, where `next_boundary` is the
//! next matched sibling's anchor or the enclosing limit. Children are sliced
//! first, inside the same boundary; the parent's own range is then truncated
//! at the first matched child's anchor. Unmatched nodes (and everything below
//! them) lose their content but keep their status, so every block has at most
//! one owner.

use tracing::{debug, instrument};

use docoutline_shared::{Block, Node, NodeStatus, Tree};

use crate::anchor::{Anchor, AnchorMatcher};
use crate::content::attribute_block;
use crate::similarity::default_similarity;

/// Counts produced by one slicing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceReport {
    /// Nodes whose content was (re)assigned.
    pub filled: usize,
    /// Nodes skipped because their title had no anchor.
    pub unmatched: usize,
    /// Blocks below the limit that no node received.
    pub unassigned: usize,
}

/// Anchors node titles and slices block content into the tree.
#[derive(Debug, Clone, Default)]
pub struct ContentSlicer {
    matcher: AnchorMatcher,
}

impl ContentSlicer {
    pub fn new(matcher: AnchorMatcher) -> Self {
        Self { matcher }
    }

    /// Locate every node's anchor from the start of `blocks`, then slice.
    ///
    /// Idempotent: content is reset before reassignment, so running this
    /// twice on the same tree yields identical content.
    #[instrument(skip_all, fields(doc_id = %tree.doc_id, blocks = blocks.len()))]
    pub fn fill(&self, tree: &mut Tree, blocks: &[Block]) -> SliceReport {
        let (anchors, _) = self.matcher.locate_tree(&tree.nodes, blocks, 0);
        let report = Self::slice(&mut tree.nodes, &anchors, blocks, blocks.len());
        debug!(
            filled = report.filled,
            unmatched = report.unmatched,
            unassigned = report.unassigned,
            "content slicing complete"
        );
        report
    }

    /// Slice `blocks[..limit]` into `nodes` according to `anchors`.
    pub fn slice(
        nodes: &mut [Node],
        anchors: &[Anchor],
        blocks: &[Block],
        limit: usize,
    ) -> SliceReport {
        let limit = limit.min(blocks.len());
        let mut report = SliceReport::default();
        let assigned = slice_level(nodes, anchors, blocks, limit, &mut report);
        report.unassigned = limit.saturating_sub(assigned);
        report
    }
}

/// Run a full fill pass with the default similarity scorer.
pub fn fill_content(
    tree: &mut Tree,
    blocks: &[Block],
    threshold: f64,
    window: usize,
) -> SliceReport {
    let matcher = AnchorMatcher::new(default_similarity(), window, threshold);
    ContentSlicer::new(matcher).fill(tree, blocks)
}

/// Slice one sibling list. Returns the number of blocks assigned in it.
fn slice_level(
    nodes: &mut [Node],
    anchors: &[Anchor],
    blocks: &[Block],
    limit: usize,
    report: &mut SliceReport,
) -> usize {
    let mut assigned = 0;

    for (i, node) in nodes.iter_mut().enumerate() {
        let Some((anchor, start)) = anchors.get(i).and_then(|a| Some((a, a.index?))) else {
            report.unmatched += 1;
            clear_subtree(node);
            continue;
        };

        let next_boundary = anchors[i + 1..]
            .iter()
            .find_map(|a| a.index)
            .unwrap_or(limit)
            .min(limit);

        let mut end = next_boundary;
        if !node.children.is_empty() {
            let first_child = anchor
                .children
                .iter()
                .find_map(|a| a.index)
                .unwrap_or(next_boundary);
            assigned += slice_level(
                &mut node.children,
                &anchor.children,
                blocks,
                next_boundary,
                report,
            );
            end = first_child.min(next_boundary);
        }

        let start = start.min(limit);
        let end = end.max(start);

        node.reset_content();
        for block in &blocks[start..end] {
            attribute_block(node, block);
        }
        node.status = NodeStatus::Filled;

        assigned += end - start;
        report.filled += 1;
    }

    assigned
}

/// Drop content from `node` and all of its descendants.
fn clear_subtree(node: &mut Node) {
    node.reset_content();
    for child in &mut node.children {
        clear_subtree(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_tree;
    use docoutline_shared::BlockKind;

    fn anchor(index: Option<usize>, children: Vec<Anchor>) -> Anchor {
        Anchor { index, children }
    }

    fn node(id: &str, level: u32, children: Vec<Node>) -> Node {
        let mut n = Node::new(id, id, level);
        n.children = children;
        n
    }

    fn texts(n: usize) -> Vec<Block> {
        (0..n).map(|i| Block::text(format!("b{i}"))).collect()
    }

    #[test]
    fn sibling_ranges_do_not_overlap() {
        let blocks = texts(10);
        let mut nodes = vec![node("a", 1, vec![]), node("b", 1, vec![]), node("c", 1, vec![])];
        let anchors = vec![
            anchor(Some(1), vec![]),
            anchor(None, vec![]),
            anchor(Some(6), vec![]),
        ];

        let report = ContentSlicer::slice(&mut nodes, &anchors, &blocks, blocks.len());
        assert_eq!(nodes[0].raw_text, vec!["b1", "b2", "b3", "b4", "b5"]);
        assert!(nodes[1].raw_text.is_empty());
        assert_eq!(nodes[1].status, NodeStatus::Pending);
        assert_eq!(nodes[2].raw_text, vec!["b6", "b7", "b8", "b9"]);
        assert_eq!(report.filled, 2);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.unassigned, 1);
    }

    #[test]
    fn parent_truncates_at_first_child() {
        let blocks = texts(8);
        let mut nodes = vec![node(
            "p",
            1,
            vec![node("c1", 2, vec![]), node("c2", 2, vec![])],
        )];
        let anchors = vec![anchor(
            Some(0),
            vec![anchor(Some(3), vec![]), anchor(Some(5), vec![])],
        )];

        ContentSlicer::slice(&mut nodes, &anchors, &blocks, blocks.len());
        let parent = &nodes[0];
        assert_eq!(parent.raw_text, vec!["b0", "b1", "b2"]);
        assert_eq!(parent.children[0].raw_text, vec!["b3", "b4"]);
        assert_eq!(parent.children[1].raw_text, vec!["b5", "b6", "b7"]);
    }

    #[test]
    fn children_bounded_by_parent_sibling() {
        let blocks = texts(8);
        let mut nodes = vec![
            node("p", 1, vec![node("c", 2, vec![])]),
            node("q", 1, vec![]),
        ];
        let anchors = vec![
            anchor(Some(0), vec![anchor(Some(2), vec![])]),
            anchor(Some(5), vec![]),
        ];

        ContentSlicer::slice(&mut nodes, &anchors, &blocks, blocks.len());
        assert_eq!(nodes[0].children[0].raw_text, vec!["b2", "b3", "b4"]);
        assert_eq!(nodes[1].raw_text, vec!["b5", "b6", "b7"]);
    }

    #[test]
    fn unmatched_parent_skips_subtree() {
        let blocks = texts(4);
        let mut nodes = vec![node("p", 1, vec![node("c", 2, vec![])])];
        nodes[0].children[0].raw_text = vec!["stale".into()];
        nodes[0].children[0].page_range = Some([0, 1]);
        let anchors = vec![anchor(None, vec![anchor(Some(1), vec![])])];

        let report = ContentSlicer::slice(&mut nodes, &anchors, &blocks, blocks.len());
        let child = &nodes[0].children[0];
        assert!(child.raw_text.is_empty());
        assert!(child.page_range.is_none());
        assert_eq!(child.status, NodeStatus::Pending);
        assert_eq!(report.filled, 0);
        assert_eq!(report.unassigned, 4);
    }

    #[test]
    fn unmatched_sibling_drops_built_content() {
        let blocks = vec![
            Block::title(1, "Intro").on_page(0),
            Block::text("a").on_page(0),
            Block::title(1, "Basix").on_page(1),
            Block::text("b").on_page(1),
            Block::title(1, "End").on_page(2),
            Block::text("c").on_page(2),
        ];
        let mut tree = build_tree("doc", &blocks);
        assert_eq!(tree.nodes[1].raw_text, vec!["b"]);
        let built_status = tree.nodes[1].status;
        tree.nodes[1].title = "Basics".into();

        let report = fill_content(&mut tree, &blocks, 0.8, 1000);

        assert_eq!(tree.nodes[0].raw_text, vec!["a", "b"]);
        assert!(tree.nodes[1].raw_text.is_empty());
        assert!(tree.nodes[1].content_refs.text_blocks.is_empty());
        assert!(tree.nodes[1].page_range.is_none());
        assert_eq!(tree.nodes[1].status, built_status);
        assert_eq!(tree.nodes[2].raw_text, vec!["c"]);
        assert_eq!(report.filled, 2);
        assert_eq!(report.unmatched, 1);
    }

    #[test]
    fn classifies_media_blocks() {
        let blocks = vec![
            Block::title(1, "Intro"),
            Block::new(BlockKind::Image, "").on_page(2),
            Block::new(BlockKind::Table, "").on_page(3),
            Block::new(BlockKind::Other, "caption"),
        ];
        let mut nodes = vec![node("Intro", 1, vec![])];
        let anchors = vec![anchor(Some(0), vec![])];

        ContentSlicer::slice(&mut nodes, &anchors, &blocks, blocks.len());
        assert_eq!(nodes[0].content_refs.images.len(), 1);
        assert_eq!(nodes[0].content_refs.tables.len(), 1);
        assert_eq!(nodes[0].raw_text, vec!["caption"]);
        assert_eq!(nodes[0].page_range, Some([2, 3]));
    }

    #[test]
    fn fill_is_idempotent() {
        let blocks = vec![
            Block::title(1, "Intro").on_page(0),
            Block::text("hello").on_page(0),
            Block::title(2, "Sub").on_page(1),
            Block::text("world").on_page(1),
            Block::title(1, "Outro").on_page(2),
            Block::text("bye").on_page(2),
        ];
        let mut tree = build_tree("doc", &blocks);

        fill_content(&mut tree, &blocks, 0.8, 1000);
        let first = tree.clone();
        fill_content(&mut tree, &blocks, 0.8, 1000);
        assert_eq!(tree, first);

        let intro = &tree.nodes[0];
        assert_eq!(intro.content_refs.text_blocks.len(), 1);
        assert_eq!(intro.children[0].raw_text, vec!["world"]);
        assert_eq!(tree.nodes[1].raw_text, vec!["bye"]);
    }

    #[test]
    fn limit_is_clamped_to_blocks() {
        let blocks = texts(3);
        let mut nodes = vec![node("a", 1, vec![])];
        let anchors = vec![anchor(Some(1), vec![])];
        let report = ContentSlicer::slice(&mut nodes, &anchors, &blocks, 99);
        assert_eq!(nodes[0].raw_text, vec!["b1", "b2"]);
        assert_eq!(report.unassigned, 1);
    }
}
