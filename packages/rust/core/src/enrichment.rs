//! Bounded-concurrency node enrichment.
//!
//! Every node with text and no prior analysis is sent to a [`NodeAnalyzer`].
//! Requests fan out over a semaphore of size `concurrency`; the scheduler
//! waits for all of them before writing outcomes back into the tree, so the
//! tree itself is never shared across tasks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use docoutline_shared::{AnalysisStats, NodeStatus, OutlineError, Result, Tree};

/// Default character budget for text sent to the analyzer.
pub const DEFAULT_MAX_CHARS: usize = 3000;

/// External capability that turns node text into a structured analysis.
#[async_trait]
pub trait NodeAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str, title: &str, kind: Option<&str>) -> Result<Value>;
}

/// One unit of work. Owns its inputs so it can move into a task.
#[derive(Debug)]
struct WorkItem {
    position: usize,
    text: String,
    title: String,
    kind: Option<String>,
}

enum Outcome {
    Analyzed(Value),
    Failed(String),
}

/// Fans node analysis out over a bounded number of concurrent requests.
#[derive(Clone)]
pub struct EnrichmentScheduler {
    analyzer: Arc<dyn NodeAnalyzer>,
    concurrency: usize,
    max_chars: usize,
}

impl EnrichmentScheduler {
    pub fn new(analyzer: Arc<dyn NodeAnalyzer>, concurrency: usize) -> Self {
        Self {
            analyzer,
            concurrency,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Analyze every eligible node and attach the stats to the tree.
    ///
    /// Per-node failures are recorded on the node and counted, never
    /// returned. Errors are reserved for an invalid tree or a zero
    /// concurrency limit, both detected before any request is sent.
    #[instrument(skip_all, fields(doc_id = %tree.doc_id, concurrency = self.concurrency))]
    pub async fn run(
        &self,
        tree: &mut Tree,
        progress: &dyn EnrichmentProgress,
    ) -> Result<AnalysisStats> {
        if self.concurrency == 0 {
            return Err(OutlineError::validation(
                "enrichment concurrency must be at least 1",
            ));
        }
        tree.validate()?;

        let mut stats = AnalysisStats::default();
        let mut work = Vec::new();
        for (position, node) in tree.flatten().into_iter().enumerate() {
            if node.analysis.is_some() || node.raw_text.is_empty() {
                stats.skipped += 1;
                continue;
            }
            work.push(WorkItem {
                position,
                text: truncate_chars(&node.raw_text.join("\n"), self.max_chars),
                title: node.title.clone(),
                kind: node.kind.clone(),
            });
        }

        let total = work.len();
        debug!(total, skipped = stats.skipped, "dispatching node analysis");
        progress.phase("Analyzing nodes");

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(total);

        for item in work {
            let analyzer = self.analyzer.clone();
            let sem = semaphore.clone();
            let position = item.position;

            handles.push((
                position,
                tokio::spawn(async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|e| OutlineError::Enrichment(format!("semaphore closed: {e}")))?;
                    analyzer
                        .analyze(&item.text, &item.title, item.kind.as_deref())
                        .await
                }),
            ));
        }

        let mut outcomes: Vec<(usize, Outcome)> = Vec::with_capacity(total);
        for (done, (position, handle)) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(Ok(analysis)) => Outcome::Analyzed(analysis),
                Ok(Err(e)) => {
                    warn!(position, error = %e, "node analysis failed");
                    Outcome::Failed(e.to_string())
                }
                Err(e) => {
                    warn!(position, error = %e, "node analysis task aborted");
                    Outcome::Failed(format!("analysis task aborted: {e}"))
                }
            };
            progress.task_progress(done + 1, total, &format!("node #{position}"));
            outcomes.push((position, outcome));
        }

        // Outcomes are in ascending pre-order position, matching the walk.
        let mut pending = outcomes.into_iter().peekable();
        let mut position = 0;
        tree.for_each_mut(|node| {
            if let Some((_, outcome)) = pending.next_if(|(p, _)| *p == position) {
                match outcome {
                    Outcome::Analyzed(analysis) => {
                        node.analysis = Some(analysis);
                        node.error = None;
                        node.status = NodeStatus::Analyzed;
                        stats.analyzed += 1;
                    }
                    Outcome::Failed(error) => {
                        node.error = Some(error);
                        node.status = NodeStatus::Failed;
                        stats.failed += 1;
                    }
                }
            }
            position += 1;
        });

        stats.completed_at = Some(Utc::now());
        tree.analysis_summary = Some(stats.clone());
        info!(
            analyzed = stats.analyzed,
            failed = stats.failed,
            skipped = stats.skipped,
            "enrichment complete"
        );
        Ok(stats)
    }
}

/// Enrich `tree` with the default character budget.
pub async fn enrich(
    tree: &mut Tree,
    analyzer: Arc<dyn NodeAnalyzer>,
    concurrency: usize,
    progress: &dyn EnrichmentProgress,
) -> Result<AnalysisStats> {
    EnrichmentScheduler::new(analyzer, concurrency)
        .run(tree, progress)
        .await
}

/// Keep at most `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for enrichment operations.
pub trait EnrichmentProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once per finished node, in dispatch order.
    fn task_progress(&self, current: usize, total: usize, detail: &str);
}

/// No-op enrichment progress.
pub struct SilentEnrichmentProgress;

impl EnrichmentProgress for SilentEnrichmentProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _current: usize, _total: usize, _detail: &str) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
