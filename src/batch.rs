//! Batch entry points: discover, fan out, aggregate.
//!
//! ```text
//! discover ──▶ WorkItem* ──▶ run_item × N (≤ C admitted) ──▶ outcome channel ──▶ aggregator
//!                                   │
//!                                   └──────▶ progress channel ──▶ reporter
//! ```
//!
//! One Tokio task is spawned per work item; the [`ConcurrencyLimiter`] keeps
//! at most `concurrency` of them inside the conversion call. Outcomes and
//! progress flow through two separate channels so that the display can never
//! hold up accounting.

use crate::aggregate::{BatchSummary, ConversionOutcome, ResultAggregator};
use crate::client::{DatalabClient, DatalabConfig, SharedClient};
use crate::config::{BatchConfig, FormatSelector};
use crate::credential::ApiKey;
use crate::error::{BatchError, ConversionError};
use crate::limiter::ConcurrencyLimiter;
use crate::progress::ProgressReporter;
use crate::registry::{self, Discovery};
use crate::runner::{run_item, TaskContext};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How a batch run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchRun {
    /// Nothing to convert: no matching inputs, or all already converted.
    /// The conversion service was never called.
    Empty {
        input_dir: PathBuf,
        format: FormatSelector,
        /// Inputs that matched but were skipped (output already present).
        skipped: usize,
    },
    /// Every discovered item reached a terminal state.
    Completed(BatchSummary),
}

impl BatchRun {
    /// The summary, when any item was processed.
    pub fn summary(&self) -> Option<&BatchSummary> {
        match self {
            BatchRun::Completed(summary) => Some(summary),
            BatchRun::Empty { .. } => None,
        }
    }
}

/// Convert every matching document in `config.input_dir` with `client`.
///
/// # Returns
/// `Ok(BatchRun)` whenever the batch ran, even if every item failed; check
/// [`BatchSummary::failed`].
///
/// # Errors
/// Returns `Err(BatchError)` only for fatal conditions, before any item is
/// attempted:
/// - input directory missing, not a directory, or unreadable
/// - output directory cannot be created
pub async fn run_batch(config: &BatchConfig, client: SharedClient) -> Result<BatchRun, BatchError> {
    let start = Instant::now();
    info!(
        "Starting batch: {} ({} files) → {}",
        config.input_dir.display(),
        config.format,
        config.output_dir.display()
    );

    // ── Step 1: Discover ─────────────────────────────────────────────────
    let discovery = registry::discover(
        &config.input_dir,
        &config.output_dir,
        config.format,
        config.target,
    )?;
    let Discovery {
        items,
        skipped_existing,
        duplicates,
    } = discovery;
    let skipped = skipped_existing.len() + duplicates.len();

    if items.is_empty() {
        info!(
            "No {} files to convert in {} ({} skipped)",
            config.format,
            config.input_dir.display(),
            skipped
        );
        return Ok(BatchRun::Empty {
            input_dir: config.input_dir.clone(),
            format: config.format,
            skipped,
        });
    }

    // ── Step 2: Prepare output ───────────────────────────────────────────
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|e| BatchError::OutputDirFailed {
            path: config.output_dir.clone(),
            source: e,
        })?;

    let total = items.len();
    info!(
        "Found {} files to convert ({} skipped), concurrency {}",
        total, skipped, config.concurrency
    );

    // ── Step 3: Wire channels ────────────────────────────────────────────
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let aggregator =
        ResultAggregator::new(total, config.output_dir.clone(), skipped).spawn(outcome_rx);
    let (progress_tx, reporter) = ProgressReporter::spawn(total, config.progress_callback.clone());

    let ctx = TaskContext {
        client,
        limiter: ConcurrencyLimiter::new(config.concurrency),
        progress: progress_tx,
        outcomes: outcome_tx.clone(),
    };

    // ── Step 4: Fan out ──────────────────────────────────────────────────
    let tasks: Vec<(PathBuf, _)> = items
        .into_iter()
        .map(|item| {
            let input = item.input.clone();
            let handle = tokio::spawn(run_item(item, ctx.clone()));
            (input, handle)
        })
        .collect();
    drop(ctx);

    let (inputs, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    for (input, joined) in inputs.into_iter().zip(join_all(handles).await) {
        match joined {
            Ok(state) => debug!("{} finished: {:?}", input.display(), state),
            Err(e) => {
                // The runner died outside its own panic guard. Report on its
                // behalf; the aggregator drops this if an outcome already
                // arrived for the item.
                warn!("Task for {} aborted: {}", input.display(), e);
                let _ = outcome_tx.send(ConversionOutcome::Failed {
                    input,
                    error: ConversionError::Panicked(e.to_string()),
                    duration_ms: 0,
                });
            }
        }
    }
    drop(outcome_tx);

    // ── Step 5: Collect ──────────────────────────────────────────────────
    let view = reporter.finish().await;
    debug!(
        "Progress view drained: {}/{} ({} failed)",
        view.completed, view.total, view.failed
    );

    let aggregator = aggregator
        .await
        .map_err(|e| BatchError::Internal(format!("Result aggregator panicked: {e}")))?;
    let summary = aggregator.finish(start.elapsed().as_millis() as u64);

    info!(
        "Batch complete: {}/{} succeeded, {} failed, {}ms total",
        summary.succeeded, summary.total, summary.failed, summary.duration_ms
    );
    Ok(BatchRun::Completed(summary))
}

/// Convert a directory with the Datalab client, resolving the API key from
/// the environment.
///
/// The key is checked first, so a missing credential is reported before
/// the input directory is even looked at.
pub async fn convert_directory(config: &BatchConfig) -> Result<BatchRun, BatchError> {
    let api_key = ApiKey::from_env()?;
    let client = DatalabClient::new(DatalabConfig::builder(api_key).build()?)?;
    run_batch(config, Arc::new(client)).await
}

/// Synchronous wrapper around [`run_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_batch_sync(config: &BatchConfig, client: SharedClient) -> Result<BatchRun, BatchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BatchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run_batch(config, client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ConversionClient, ConvertedDocument};
    use crate::config::TargetFormat;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    struct StubClient;

    #[async_trait]
    impl ConversionClient for StubClient {
        fn name(&self) -> &str {
            "stub"
        }

        async fn convert(
            &self,
            input: &Path,
            _target: TargetFormat,
        ) -> Result<ConvertedDocument, ConversionError> {
            Ok(ConvertedDocument {
                content: format!("converted {}", input.display()),
                page_count: None,
            })
        }
    }

    #[test]
    fn sync_wrapper_runs_a_batch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("one.pdf"), b"%PDF").unwrap();
        let config = BatchConfig::builder(dir.path())
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();

        let run = run_batch_sync(&config, Arc::new(StubClient)).unwrap();
        let summary = run.summary().expect("batch should have run");
        assert_eq!((summary.total, summary.succeeded), (1, 1));
        assert!(dir.path().join("out/one.md").exists());
    }

    #[tokio::test]
    async fn empty_directory_does_not_create_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let config = BatchConfig::builder(dir.path())
            .output_dir(&out)
            .build()
            .unwrap();

        let run = run_batch(&config, Arc::new(StubClient)).await.unwrap();
        assert!(run.summary().is_none());
        assert!(matches!(run, BatchRun::Empty { skipped: 0, .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn missing_input_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = BatchConfig::builder(dir.path().join("nope"))
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();

        let err = run_batch(&config, Arc::new(StubClient)).await.unwrap_err();
        assert!(matches!(err, BatchError::InputNotFound { .. }));
    }
}
