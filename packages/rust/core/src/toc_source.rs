//! Locating and loading TOC material.
//!
//! Page scoring picks the pages most likely to hold a printed table of
//! contents, and [`collect_page_text`] turns them into plain text for an
//! external TOC extractor. Extracted items are read back with
//! [`parse_toc_items`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use docoutline_shared::{OutlineError, Result, TocItem};

use crate::blocks::{BlockStream, PageBlocks};

/// Phrases that mark a TOC page. Matched case-insensitively.
pub const TOC_KEYWORDS: [&str; 3] = ["目录", "contents", "table of contents"];

const KEYWORD_WEIGHT: usize = 5;

/// Dot leaders such as `Chapter 1 ........ 12`.
static DOT_LEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{3,}").expect("dot leader pattern is valid"));

/// Heuristic TOC likelihood of one page.
pub fn page_score(page: &PageBlocks) -> usize {
    let text = page
        .blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let lower = text.to_lowercase();

    let keywords = TOC_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(&kw.to_lowercase()))
        .count();
    keywords * KEYWORD_WEIGHT + DOT_LEADER.find_iter(&text).count()
}

/// Positional indices of up to `max_pages` pages, best score first.
///
/// Ties keep document order. When no page scores above zero the first
/// `max_pages` pages are returned instead.
pub fn select_toc_pages(stream: &BlockStream, max_pages: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, usize)> = stream
        .pages()
        .iter()
        .enumerate()
        .map(|(idx, page)| (idx, page_score(page)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let top: Vec<usize> = scored
        .into_iter()
        .filter(|&(_, score)| score > 0)
        .map(|(idx, _)| idx)
        .take(max_pages)
        .collect();

    if top.is_empty() {
        let fallback = max_pages.min(stream.pages().len());
        debug!(fallback, "no page looks like a TOC, using leading pages");
        return (0..fallback).collect();
    }
    debug!(pages = ?top, "selected TOC candidate pages");
    top
}

/// Non-empty trimmed block text of the given pages, one block per line.
/// Out-of-range indices are ignored.
pub fn collect_page_text(stream: &BlockStream, page_ids: &[usize]) -> String {
    let pages = stream.pages();
    page_ids
        .iter()
        .filter_map(|&idx| pages.get(idx))
        .flat_map(|page| page.blocks.iter())
        .map(|block| block.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TocDocument {
    Plain(Vec<TocItem>),
    Wrapped { toc_tree: Option<Vec<TocItem>> },
}

/// Parse extracted TOC items: either a bare array or `{"toc_tree": [...]}`.
///
/// Items with an empty title are dropped and levels are raised to at least 1.
pub fn parse_toc_items(json: &str) -> Result<Vec<TocItem>> {
    let doc: TocDocument = serde_json::from_str(json)
        .map_err(|e| OutlineError::parse(format!("invalid TOC document: {e}")))?;

    let items = match doc {
        TocDocument::Wrapped { toc_tree } => toc_tree.unwrap_or_default(),
        TocDocument::Plain(items) => items,
    };

    Ok(items
        .into_iter()
        .filter(|item| !item.title.trim().is_empty())
        .map(|mut item| {
            item.level = item.level.max(1);
            item
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docoutline_shared::Block;
    use serde_json::json;

    fn stream(pages: Vec<Vec<&str>>) -> BlockStream {
        let value = json!({
            "pdf_info": pages
                .into_iter()
                .enumerate()
                .map(|(i, texts)| json!({
                    "page_id": i,
                    "para_blocks": texts
                        .into_iter()
                        .map(|t| json!({"type": "text", "text": t}))
                        .collect::<Vec<_>>(),
                }))
                .collect::<Vec<_>>(),
        });
        BlockStream::from_value(&value)
    }

    #[test]
    fn scores_keywords_and_dot_leaders() {
        let page = PageBlocks {
            page: Some(0),
            blocks: vec![
                Block::text("Table of Contents"),
                Block::text("Intro ...... 1"),
                Block::text("Usage ....... 4"),
            ],
        };
        // "contents" and "table of contents" both hit.
        assert_eq!(page_score(&page), 2 * KEYWORD_WEIGHT + 2);
    }

    #[test]
    fn selects_highest_scoring_pages() {
        let s = stream(vec![
            vec!["Preface"],
            vec!["目录", "第一章 ...... 1"],
            vec!["Chapter 1 .... 3"],
            vec!["body text"],
        ]);
        assert_eq!(select_toc_pages(&s, 20), vec![1, 2]);
        assert_eq!(select_toc_pages(&s, 1), vec![1]);
    }

    #[test]
    fn falls_back_to_leading_pages() {
        let s = stream(vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(select_toc_pages(&s, 2), vec![0, 1]);
        assert_eq!(select_toc_pages(&s, 10), vec![0, 1, 2]);
    }

    #[test]
    fn collects_trimmed_text() {
        let s = stream(vec![vec!["  one ", ""], vec!["two"], vec!["three"]]);
        assert_eq!(collect_page_text(&s, &[2, 0, 99]), "three\none");
    }

    #[test]
    fn parses_plain_and_wrapped_documents() {
        let plain = r#"[{"title": "Intro", "level": 1}, {"title": "Sub", "level": 2, "type": "expansion"}]"#;
        let items = parse_toc_items(plain).expect("plain");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].kind.as_deref(), Some("expansion"));

        let wrapped = r#"{"toc_tree": [{"title": "Intro"}, {"title": "  ", "level": 2}]}"#;
        let items = parse_toc_items(wrapped).expect("wrapped");
        assert_eq!(items, vec![TocItem::new("Intro", 1)]);

        let empty = r#"{"toc_tree": null}"#;
        assert!(parse_toc_items(empty).expect("null tree").is_empty());
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_toc_items("not json"),
            Err(OutlineError::Parse { .. })
        ));
    }
}
