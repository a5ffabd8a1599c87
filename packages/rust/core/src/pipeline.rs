//! End-to-end outline pipeline: blocks → tree → TOC correction → content → enrichment.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use docoutline_shared::{AlignMode, AnalysisStats, AppConfig, Block, OutlineError, Result, Tree};

use crate::anchor::AnchorMatcher;
use crate::builder::TreeBuilder;
use crate::enrichment::{EnrichmentProgress, EnrichmentScheduler, NodeAnalyzer};
use crate::similarity::build_similarity;
use crate::slicer::{ContentSlicer, SliceReport};
use crate::toc::{AlignReport, AlignStrategy, TitleMapper, TocAligner, TocInput, record_disabled};

/// Final processing status of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Completed,
    /// At least one node failed analysis.
    CompletedWithErrors,
}

impl DocumentStatus {
    pub fn from_stats(stats: Option<&AnalysisStats>) -> Self {
        match stats {
            Some(s) if s.failed > 0 => Self::CompletedWithErrors,
            _ => Self::Completed,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub tree: Tree,
    pub status: DocumentStatus,
    /// `None` when no TOC was supplied or the TOC stage is disabled.
    pub toc: Option<AlignReport>,
    pub slice: SliceReport,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a node's analysis finishes.
    fn node_analyzed(&self, current: usize, total: usize, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, outcome: &PipelineOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn node_analyzed(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _outcome: &PipelineOutcome) {}
}

/// Routes scheduler progress into the pipeline reporter.
struct ForwardProgress<'a>(&'a dyn ProgressReporter);

impl EnrichmentProgress for ForwardProgress<'_> {
    fn phase(&self, name: &str) {
        self.0.phase(name);
    }
    fn task_progress(&self, current: usize, total: usize, detail: &str) {
        self.0.node_analyzed(current, total, detail);
    }
}

/// Runs every stage for one document with a fixed configuration.
#[derive(Clone)]
pub struct OutlinePipeline {
    config: AppConfig,
    analyzer: Option<Arc<dyn NodeAnalyzer>>,
    mapper: Option<Arc<dyn TitleMapper>>,
}

impl OutlinePipeline {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            analyzer: None,
            mapper: None,
        }
    }

    /// Enable the enrichment stage.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn NodeAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Provide the mapping capability used by delegated TOC alignment.
    pub fn with_mapper(mut self, mapper: Arc<dyn TitleMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn strategy(&self) -> Result<AlignStrategy> {
        match self.config.toc.align_mode {
            AlignMode::Retitle => Ok(AlignStrategy::Retitle),
            AlignMode::Rebuild => Ok(AlignStrategy::Rebuild),
            AlignMode::Delegated => self
                .mapper
                .clone()
                .map(AlignStrategy::Delegated)
                .ok_or_else(|| {
                    OutlineError::config("toc.align_mode = \"delegated\" requires a title mapper")
                }),
        }
    }

    /// Run the full pipeline.
    ///
    /// 1. Build the tree from title blocks
    /// 2. Correct it against the TOC (if enabled and supplied)
    /// 3. Re-anchor and slice block content into the final tree
    /// 4. Enrich nodes (if an analyzer is configured)
    #[instrument(skip_all, fields(doc_id = %doc_id, blocks = blocks.len()))]
    pub async fn run(
        &self,
        doc_id: &str,
        blocks: &[Block],
        toc: Option<TocInput>,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutcome> {
        let start = Instant::now();
        self.config.validate()?;
        let strategy = self.strategy()?;

        let content = &self.config.content;
        let similarity = build_similarity(content.similarity);

        // --- Phase 1: Build ---
        progress.phase("Building outline");
        let mut tree = TreeBuilder::new().build(doc_id, blocks);

        // --- Phase 2: TOC correction ---
        let toc_report = if !self.config.toc.enable {
            record_disabled(&mut tree);
            None
        } else if let Some(toc) = toc {
            progress.phase("Correcting against TOC");
            let aligner = TocAligner::new(
                similarity.clone(),
                self.config.toc.min_similarity,
                content.window,
            );
            Some(aligner.correct(&mut tree, toc, &strategy, blocks).await?)
        } else {
            None
        };

        // --- Phase 3: Content ---
        progress.phase("Slicing content");
        let matcher = AnchorMatcher::new(similarity, content.window, content.threshold);
        let slice = ContentSlicer::new(matcher).fill(&mut tree, blocks);

        // --- Phase 4: Enrichment ---
        if let Some(analyzer) = &self.analyzer {
            EnrichmentScheduler::new(analyzer.clone(), self.config.pipeline.llm_concurrency)
                .with_max_chars(self.config.pipeline.max_chars)
                .run(&mut tree, &ForwardProgress(progress))
                .await?;
        }

        let status = DocumentStatus::from_stats(tree.analysis_summary.as_ref());
        let outcome = PipelineOutcome {
            tree,
            status,
            toc: toc_report,
            slice,
            elapsed: start.elapsed(),
        };

        info!(
            nodes = outcome.tree.node_count(),
            filled = outcome.slice.filled,
            unassigned = outcome.slice.unassigned,
            %status,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "pipeline complete"
        );
        progress.done(&outcome);
        Ok(outcome)
    }
}

/// Run the pipeline with `config` and no external collaborators.
pub async fn analyze_document(
    config: AppConfig,
    doc_id: &str,
    blocks: &[Block],
    toc: Option<TocInput>,
) -> Result<PipelineOutcome> {
    OutlinePipeline::new(config)
        .run(doc_id, blocks, toc, &SilentProgress)
        .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use docoutline_shared::{NodeStatus, TocItem};
    use serde_json::{Value, json};

    use crate::toc::{REASON_DISABLED, REASON_EMPTY_TOC};

    fn blocks() -> Vec<Block> {
        vec![
            Block::title(1, "Intro").on_page(0),
            Block::text("hello").on_page(0),
            Block::title(2, "Sub").on_page(1),
            Block::text("world").on_page(1),
        ]
    }

    struct FlakyAnalyzer;

    #[async_trait]
    impl NodeAnalyzer for FlakyAnalyzer {
        async fn analyze(&self, _text: &str, title: &str, _kind: Option<&str>) -> Result<Value> {
            if title == "Sub" {
                Err(OutlineError::Enrichment("model refused".into()))
            } else {
                Ok(json!({ "summary": title }))
            }
        }
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<String>>);

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.0.lock().unwrap().push(name.to_string());
        }
        fn node_analyzed(&self, _current: usize, _total: usize, _detail: &str) {}
        fn done(&self, outcome: &PipelineOutcome) {
            self.0.lock().unwrap().push(format!("done:{}", outcome.status));
        }
    }

    #[tokio::test]
    async fn runs_without_collaborators() {
        let outcome = analyze_document(AppConfig::default(), "doc", &blocks(), None)
            .await
            .expect("pipeline");

        assert_eq!(outcome.status, DocumentStatus::Completed);
        assert!(outcome.toc.is_none());
        assert!(outcome.tree.analysis_summary.is_none());
        assert_eq!(outcome.tree.nodes[0].raw_text, vec!["hello"]);
        assert_eq!(outcome.tree.nodes[0].children[0].raw_text, vec!["world"]);
    }

    #[tokio::test]
    async fn analysis_failures_mark_document() {
        let progress = RecordingProgress::default();
        let pipeline =
            OutlinePipeline::new(AppConfig::default()).with_analyzer(Arc::new(FlakyAnalyzer));
        let outcome = pipeline
            .run("doc", &blocks(), None, &progress)
            .await
            .expect("pipeline");

        assert_eq!(outcome.status, DocumentStatus::CompletedWithErrors);
        let stats = outcome.tree.analysis_summary.as_ref().expect("stats");
        assert_eq!((stats.analyzed, stats.failed), (1, 1));
        assert_eq!(outcome.tree.nodes[0].status, NodeStatus::Analyzed);
        assert_eq!(outcome.tree.nodes[0].children[0].status, NodeStatus::Failed);

        let phases = progress.0.lock().unwrap().clone();
        assert_eq!(phases.first().map(String::as_str), Some("Building outline"));
        assert_eq!(phases.last().map(String::as_str), Some("done:completed_with_errors"));
    }

    #[tokio::test]
    async fn rebuild_from_toc_then_refill() {
        let mut config = AppConfig::default();
        config.toc.align_mode = AlignMode::Rebuild;
        let toc = TocInput::new("text", vec![TocItem::new("Intro", 1), TocItem::new("Sub", 2)]);

        let outcome = analyze_document(config, "doc", &blocks(), Some(toc))
            .await
            .expect("pipeline");

        let intro = &outcome.tree.nodes[0];
        assert_eq!(intro.node_id, "toc_1");
        assert_eq!(intro.raw_text, vec!["hello"]);
        assert_eq!(intro.children[0].node_id, "toc_2");
        assert_eq!(intro.children[0].raw_text, vec!["world"]);
        assert_eq!(outcome.toc.map(|r| r.changed), Some(2));
    }

    #[tokio::test]
    async fn empty_toc_and_disabled_toc_are_recorded() {
        let outcome = analyze_document(
            AppConfig::default(),
            "doc",
            &blocks(),
            Some(TocInput::new("vlm", vec![])),
        )
        .await
        .expect("pipeline");
        assert_eq!(
            outcome.tree.toc.and_then(|t| t.reason).as_deref(),
            Some(REASON_EMPTY_TOC)
        );

        let mut config = AppConfig::default();
        config.toc.enable = false;
        let outcome = analyze_document(
            config,
            "doc",
            &blocks(),
            Some(TocInput::new("vlm", vec![TocItem::new("Intro", 1)])),
        )
        .await
        .expect("pipeline");
        assert!(outcome.toc.is_none());
        assert_eq!(
            outcome.tree.toc.and_then(|t| t.reason).as_deref(),
            Some(REASON_DISABLED)
        );
    }

    #[tokio::test]
    async fn delegated_mode_needs_a_mapper() {
        let mut config = AppConfig::default();
        config.toc.align_mode = AlignMode::Delegated;
        let err = analyze_document(config, "doc", &blocks(), None)
            .await
            .expect_err("missing mapper");
        assert!(matches!(err, OutlineError::Config { .. }));
    }

    #[test]
    fn status_from_stats() {
        assert_eq!(DocumentStatus::from_stats(None), DocumentStatus::Completed);
        let stats = AnalysisStats {
            failed: 2,
            ..Default::default()
        };
        assert_eq!(
            DocumentStatus::from_stats(Some(&stats)),
            DocumentStatus::CompletedWithErrors
        );
        assert_eq!(DocumentStatus::CompletedWithErrors.to_string(), "completed_with_errors");
    }
}
