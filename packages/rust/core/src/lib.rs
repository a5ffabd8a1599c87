//! Document outline reconstruction for docoutline.
//!
//! This crate turns an extractor's flat block stream into a hierarchical
//! outline: it builds the tree from title blocks, reconciles it with an
//! external table of contents, slices block content into nodes, and drives
//! bounded-concurrency enrichment through an external analyzer.

pub mod anchor;
pub mod blocks;
pub mod bridge;
pub mod builder;
mod content;
pub mod enrichment;
pub mod pipeline;
pub mod similarity;
pub mod slicer;
pub mod toc;
pub mod toc_source;

pub use anchor::{Anchor, AnchorMatcher};
pub use blocks::BlockStream;
pub use bridge::BridgeCommand;
pub use builder::{TreeBuilder, build_tree};
pub use enrichment::{
    EnrichmentProgress, EnrichmentScheduler, NodeAnalyzer, SilentEnrichmentProgress, enrich,
};
pub use pipeline::{
    DocumentStatus, OutlinePipeline, PipelineOutcome, ProgressReporter, SilentProgress,
    analyze_document,
};
pub use similarity::{Similarity, build_similarity};
pub use slicer::{ContentSlicer, SliceReport, fill_content};
pub use toc::{AlignReport, AlignStrategy, TitleMapper, TocAligner, TocInput, correct_toc};
