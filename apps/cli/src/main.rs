//! docoutline CLI: document outline reconstruction.
//!
//! Turns a PDF extractor's block stream into a hierarchical outline tree,
//! corrected against the document's table of contents and optionally
//! enriched through an external analysis bridge.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
