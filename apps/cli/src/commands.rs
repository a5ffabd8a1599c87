//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use docoutline_core::toc_source::{collect_page_text, parse_toc_items, select_toc_pages};
use docoutline_core::{
    BlockStream, BridgeCommand, OutlinePipeline, PipelineOutcome, ProgressReporter, TocInput,
};
use docoutline_shared::{AlignMode, AppConfig, DocId, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docoutline: rebuild document outlines from extracted layout blocks.
#[derive(Parser)]
#[command(
    name = "docoutline",
    version,
    about = "Reconstruct a hierarchical outline from a PDF extractor's block stream.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.docoutline/docoutline.toml.
    #[arg(long, global = true, env = "DOCOUTLINE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build, correct, fill and optionally enrich the outline of one document.
    Analyze {
        /// Extractor output (middle JSON).
        #[arg(long)]
        blocks: PathBuf,

        /// Extracted TOC items: a JSON array or {"toc_tree": [...]}.
        #[arg(long)]
        toc: Option<PathBuf>,

        /// Label recorded as the TOC source.
        #[arg(long, default_value = "file")]
        toc_source: String,

        /// Document id (defaults to a fresh UUID).
        #[arg(long)]
        doc_id: Option<String>,

        /// TOC strategy: retitle, rebuild, or delegated.
        #[arg(long)]
        align: Option<AlignMode>,

        /// Run node enrichment through the configured bridge.
        #[arg(long)]
        enrich: bool,

        /// Override pipeline.llm_concurrency.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Write the tree here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List the pages most likely to hold a table of contents.
    TocPages {
        /// Extractor output (middle JSON).
        #[arg(long)]
        blocks: PathBuf,

        /// Maximum number of pages (defaults to toc.max_pages).
        #[arg(long)]
        max_pages: Option<usize>,

        /// Print the collected page text as well.
        #[arg(long)]
        text: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docoutline=info",
        1 => "docoutline=debug",
        _ => "docoutline=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so the tree can be piped from stdout.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Analyze {
            blocks,
            toc,
            toc_source,
            doc_id,
            align,
            enrich,
            concurrency,
            out,
        } => {
            let mut config = resolve_config(config_path.as_deref())?;
            if let Some(mode) = align {
                config.toc.align_mode = mode;
            }
            if let Some(n) = concurrency {
                config.pipeline.llm_concurrency = n;
            }
            let args = AnalyzeArgs {
                blocks,
                toc,
                toc_source,
                doc_id,
                enrich,
                out,
            };
            cmd_analyze(config, args).await
        }
        Command::TocPages {
            blocks,
            max_pages,
            text,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_toc_pages(&blocks, max_pages.unwrap_or(config.toc.max_pages), text)
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn read_file(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read {what} '{}'", path.display()))
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

struct AnalyzeArgs {
    blocks: PathBuf,
    toc: Option<PathBuf>,
    toc_source: String,
    doc_id: Option<String>,
    enrich: bool,
    out: Option<PathBuf>,
}

async fn cmd_analyze(config: AppConfig, args: AnalyzeArgs) -> Result<()> {
    let middle = read_file(&args.blocks, "block file")?;
    let blocks = BlockStream::from_middle_json(&middle)?.into_blocks();

    let toc = match &args.toc {
        Some(path) => {
            let items = parse_toc_items(&read_file(path, "TOC file")?)?;
            Some(TocInput::new(args.toc_source.clone(), items))
        }
        None => None,
    };

    let doc_id = args.doc_id.unwrap_or_else(|| DocId::new().to_string());
    let needs_bridge = args.enrich || config.toc.align_mode == AlignMode::Delegated;

    let mut pipeline = OutlinePipeline::new(config.clone());
    if needs_bridge {
        let bridge = Arc::new(
            BridgeCommand::from_config(&config.bridge)
                .wrap_err("enrichment and delegated alignment need [bridge] command set")?,
        );
        if args.enrich {
            pipeline = pipeline.with_analyzer(bridge.clone());
        }
        pipeline = pipeline.with_mapper(bridge);
    }

    info!(
        doc_id = %doc_id,
        blocks = blocks.len(),
        toc_items = toc.as_ref().map(|t| t.items.len()).unwrap_or(0),
        align = ?config.toc.align_mode,
        enrich = args.enrich,
        "analyzing document"
    );

    let reporter = CliProgress::new();
    let outcome = pipeline.run(&doc_id, &blocks, toc, &reporter).await?;

    if outcome.slice.unassigned > 0 {
        warn!(
            unassigned = outcome.slice.unassigned,
            "some blocks were not assigned to any node"
        );
    }

    let json = serde_json::to_string_pretty(&outcome.tree)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .wrap_err_with(|| format!("cannot write '{}'", path.display()))?;
            print_summary(&outcome, path);
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn print_summary(outcome: &PipelineOutcome, path: &Path) {
    let tree = &outcome.tree;
    eprintln!();
    eprintln!("  Outline written!");
    eprintln!("  Doc:     {}", tree.doc_id);
    eprintln!("  Nodes:   {}", tree.node_count());
    eprintln!("  Filled:  {}", outcome.slice.filled);
    if let Some(stats) = &tree.analysis_summary {
        eprintln!(
            "  Analyzed: {} ok, {} failed, {} skipped",
            stats.analyzed, stats.failed, stats.skipped
        );
    }
    eprintln!("  Status:  {}", outcome.status);
    eprintln!("  Path:    {}", path.display());
    eprintln!("  Time:    {:.1}s", outcome.elapsed.as_secs_f64());
    eprintln!();
}

// ---------------------------------------------------------------------------
// toc-pages
// ---------------------------------------------------------------------------

fn cmd_toc_pages(blocks: &Path, max_pages: usize, with_text: bool) -> Result<()> {
    if max_pages == 0 {
        return Err(eyre!("--max-pages must be at least 1"));
    }
    let stream = BlockStream::from_middle_json(&read_file(blocks, "block file")?)?;
    let pages = select_toc_pages(&stream, max_pages);

    let listed: Vec<String> = pages.iter().map(usize::to_string).collect();
    println!("{}", listed.join(" "));

    if with_text {
        println!();
        println!("{}", collect_page_text(&stream, &pages));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn node_analyzed(&self, current: usize, total: usize, detail: &str) {
        self.spinner
            .set_message(format!("Analyzing [{current}/{total}] {detail}"));
    }

    fn done(&self, _outcome: &PipelineOutcome) {
        self.spinner.finish_and_clear();
    }
}
