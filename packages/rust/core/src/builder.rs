//! Initial tree construction from title-typed blocks.
//!
//! One pass over the block stream builds structure and assigns content at the
//! same time: block order and structural order coincide, so no separate
//! slicing step is needed for a freshly built tree.

use tracing::{debug, instrument};

use docoutline_shared::{Block, BlockKind, MAX_LEVEL, Node, NodeStatus, Tree};

use crate::content::attribute_block;

/// Id of the node synthesized for content that precedes the first title.
pub const IMPLICIT_ROOT_ID: &str = "chapter_0";

/// Title of the implicit root node.
pub const IMPLICIT_ROOT_TITLE: &str = "Uncategorized";

/// Per-level counters deriving hierarchical node ids.
///
/// Entering a title at level `L` increments `counters[L]` and zeroes every
/// deeper counter, so ids stay unique across the whole document.
#[derive(Debug, Default)]
struct LevelCounters([u32; MAX_LEVEL as usize]);

impl LevelCounters {
    fn enter(&mut self, level: u32) -> String {
        let depth = level as usize;
        self.0[depth - 1] += 1;
        for counter in &mut self.0[depth..] {
            *counter = 0;
        }
        let path = self.0[..depth]
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join("_");
        format!("chapter_{path}")
    }
}

/// Builds the initial outline tree from an ordered block sequence.
#[derive(Debug, Default)]
pub struct TreeBuilder;

impl TreeBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a tree for `doc_id` from `blocks`.
    ///
    /// The open-ancestor stack holds child-index paths into the owned tree;
    /// it lives only for the duration of this call.
    #[instrument(skip_all, fields(doc_id = %doc_id, blocks = blocks.len()))]
    pub fn build(&self, doc_id: &str, blocks: &[Block]) -> Tree {
        let mut tree = Tree::new(doc_id);
        let mut counters = LevelCounters::default();
        let mut stack: Vec<usize> = Vec::new();
        let mut stack_levels: Vec<u32> = Vec::new();

        for block in blocks {
            if block.kind == BlockKind::Title {
                let level = block.heading_level();
                let node_id = counters.enter(level);
                let title = if block.text.is_empty() {
                    format!("Section {node_id}")
                } else {
                    block.text.clone()
                };
                let mut node = Node::new(node_id, title, level);
                attribute_block(&mut node, block);

                while stack_levels.last().is_some_and(|&top| top >= level) {
                    stack.pop();
                    stack_levels.pop();
                }
                let siblings = children_at(&mut tree.nodes, &stack);
                siblings.push(node);
                stack.push(siblings.len() - 1);
                stack_levels.push(level);
                continue;
            }

            if stack.is_empty() {
                tree.nodes.push(Node::new(IMPLICIT_ROOT_ID, IMPLICIT_ROOT_TITLE, 1));
                stack.push(tree.nodes.len() - 1);
                stack_levels.push(1);
            }

            if let Some((&last, parents)) = stack.split_last() {
                let current = &mut children_at(&mut tree.nodes, parents)[last];
                attribute_block(current, block);
            }
        }

        tree.for_each_mut(|node| {
            if !node.raw_text.is_empty() || !node.content_refs.is_empty() {
                node.status = NodeStatus::Filled;
            }
        });

        debug!(
            roots = tree.nodes.len(),
            nodes = tree.node_count(),
            "built outline tree"
        );
        tree
    }
}

/// Build a tree with the default builder.
pub fn build_tree(doc_id: &str, blocks: &[Block]) -> Tree {
    TreeBuilder::new().build(doc_id, blocks)
}

/// Re-nest a flat, ordered node list using the level stack.
///
/// Each node is attached under the nearest preceding node with a strictly
/// smaller level, or becomes a root.
pub(crate) fn nest_by_level(flat: Vec<Node>) -> Vec<Node> {
    let mut roots: Vec<Node> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();
    let mut stack_levels: Vec<u32> = Vec::new();

    for node in flat {
        let level = node.level;
        while stack_levels.last().is_some_and(|&top| top >= level) {
            stack.pop();
            stack_levels.pop();
        }
        let siblings = children_at(&mut roots, &stack);
        siblings.push(node);
        stack.push(siblings.len() - 1);
        stack_levels.push(level);
    }

    roots
}

/// The children list of the node addressed by `path` (the roots when empty).
fn children_at<'a>(roots: &'a mut Vec<Node>, path: &[usize]) -> &'a mut Vec<Node> {
    let mut list = roots;
    for &idx in path {
        list = &mut list[idx].children;
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(tree: &Tree) -> Vec<String> {
        tree.flatten().iter().map(|n| n.node_id.clone()).collect()
    }

    #[test]
    fn counters_reset_when_level_decreases() {
        let blocks: Vec<Block> = [1, 2, 3, 2, 1]
            .iter()
            .enumerate()
            .map(|(i, &level)| Block::title(level, format!("T{i}")))
            .collect();

        let tree = build_tree("doc", &blocks);
        assert_eq!(
            ids(&tree),
            vec![
                "chapter_1",
                "chapter_1_1",
                "chapter_1_1_1",
                "chapter_1_2",
                "chapter_2"
            ]
        );
        assert_eq!(tree.nodes.len(), 2);
        assert_eq!(tree.nodes[0].children.len(), 2);
        assert_eq!(tree.nodes[0].children[0].children.len(), 1);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn assigns_content_to_open_node() {
        let blocks = vec![
            Block::title(1, "Intro").on_page(0),
            Block::text("hello").on_page(0),
            Block::title(2, "Sub").on_page(1),
            Block::text("world").on_page(2),
        ];

        let tree = build_tree("doc", &blocks);
        let intro = &tree.nodes[0];
        assert_eq!(intro.title, "Intro");
        assert_eq!(intro.raw_text, vec!["hello"]);
        assert_eq!(intro.page_range, Some([0, 0]));
        assert_eq!(intro.status, NodeStatus::Filled);

        let sub = &intro.children[0];
        assert_eq!(sub.title, "Sub");
        assert_eq!(sub.raw_text, vec!["world"]);
        assert_eq!(sub.page_range, Some([1, 2]));
    }

    #[test]
    fn synthesizes_implicit_root_for_leading_content() {
        let blocks = vec![
            Block::text("preface"),
            Block::title(1, "One"),
            Block::text("body"),
        ];

        let tree = build_tree("doc", &blocks);
        assert_eq!(ids(&tree), vec![IMPLICIT_ROOT_ID, "chapter_1"]);
        assert_eq!(tree.nodes[0].title, IMPLICIT_ROOT_TITLE);
        assert_eq!(tree.nodes[0].raw_text, vec!["preface"]);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn accepts_level_jumps() {
        let blocks = vec![Block::title(1, "A"), Block::title(3, "B"), Block::title(2, "C")];
        let tree = build_tree("doc", &blocks);
        assert_eq!(ids(&tree), vec!["chapter_1", "chapter_1_0_1", "chapter_1_1"]);
        assert_eq!(tree.nodes[0].children.len(), 2);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn empty_title_gets_placeholder() {
        let tree = build_tree("doc", &[Block::title(1, "")]);
        assert_eq!(tree.nodes[0].title, "Section chapter_1");
        assert_eq!(tree.nodes[0].status, NodeStatus::Pending);
    }

    #[test]
    fn sibling_ids_never_collide() {
        let levels = [1, 2, 2, 3, 1, 2, 3, 3, 2, 1, 4, 1];
        let blocks: Vec<Block> = levels.iter().map(|&l| Block::title(l, "x")).collect();
        let tree = build_tree("doc", &blocks);
        assert_eq!(tree.node_count(), levels.len());
        assert!(tree.validate().is_ok());
        assert!(tree.flatten().iter().all(|n| n.level >= 1));
    }

    #[test]
    fn nest_by_level_matches_builder_shape() {
        let flat = vec![
            Node::new("a", "A", 1),
            Node::new("b", "B", 2),
            Node::new("c", "C", 3),
            Node::new("d", "D", 2),
            Node::new("e", "E", 1),
        ];
        let roots = nest_by_level(flat);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].children.len(), 2);
        assert_eq!(roots[0].children[0].children[0].node_id, "c");
    }
}
