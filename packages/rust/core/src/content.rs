//! Block classification shared by the tree builder, the slicer and the TOC
//! rebuild path.

use docoutline_shared::{Block, BlockKind, ImageRef, Node, TableRef, TextRef};

/// Attribute `block` to `node`: widen the page range and file the block under
/// the matching content category.
///
/// Title blocks only widen the page range; they are structure, not content.
pub(crate) fn attribute_block(node: &mut Node, block: &Block) {
    node.widen_page_range(block.page);

    match block.kind {
        BlockKind::Title => {}
        BlockKind::Text => {
            if !block.text.is_empty() {
                node.raw_text.push(block.text.clone());
                node.content_refs.text_blocks.push(TextRef {
                    id: block.id.clone(),
                    text: block.text.clone(),
                    page: block.page,
                });
            }
        }
        BlockKind::Image => node.content_refs.images.push(ImageRef {
            id: block.id.clone(),
            path: block.image_path.clone(),
            page: block.page,
        }),
        BlockKind::Table => node.content_refs.tables.push(TableRef {
            id: block.id.clone(),
            html: block.table_html.clone(),
            image_path: block.image_path.clone(),
            page: block.page,
        }),
        BlockKind::Other => {
            if !block.text.is_empty() {
                node.raw_text.push(block.text.clone());
            }
        }
    }
}
