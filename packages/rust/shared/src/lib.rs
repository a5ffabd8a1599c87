//! Shared types, error model, and configuration for docoutline.
//!
//! This crate is the foundation depended on by all other docoutline crates.
//! It provides:
//! - [`OutlineError`], the unified error type
//! - Domain types ([`Block`], [`Node`], [`Tree`], [`TocItem`], [`AnalysisStats`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AlignMode, AppConfig, BridgeConfig, ContentConfig, PipelineConfig, SimilarityKind,
    TocConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    write_default_config,
};
pub use error::{OutlineError, Result};
pub use types::{
    AnalysisStats, Block, BlockKind, ContentRefs, DocId, FlatNode, ImageRef, MAX_LEVEL, Node,
    NodeStatus, TableRef, TextRef, TitleCorrection, TocItem, TocMeta, Tree,
};
