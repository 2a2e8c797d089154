//! Result aggregation: the single owner of batch accounting.
//!
//! Task runners send exactly one [`ConversionOutcome`] per item into a
//! channel. One aggregator task drains it and is the only code that ever
//! mutates [`BatchState`], so the counters need no locks and arrival order
//! does not matter. When the channel closes, the state is frozen into an
//! immutable [`BatchSummary`].

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Longest error message kept per failed item.
pub const MAX_ERROR_CHARS: usize = 200;

/// Failures listed individually in the text summary.
pub const SUMMARY_FAILURE_LIMIT: usize = 10;

const SUMMARY_NAME_WIDTH: usize = 60;
const SUMMARY_ERROR_WIDTH: usize = 100;

/// Terminal result of one work item. Created once, by its task runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionOutcome {
    /// The converted document was written to `output`.
    Succeeded {
        input: PathBuf,
        output: PathBuf,
        bytes: usize,
        duration_ms: u64,
    },
    /// The item failed; siblings are unaffected.
    Failed {
        input: PathBuf,
        error: ConversionError,
        duration_ms: u64,
    },
}

impl ConversionOutcome {
    /// Input path identifying the item.
    pub fn input(&self) -> &PathBuf {
        match self {
            ConversionOutcome::Succeeded { input, .. }
            | ConversionOutcome::Failed { input, .. } => input,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded { .. })
    }
}

/// One failed item as it appears in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// File name of the input.
    pub name: String,
    /// Full input path.
    pub input: PathBuf,
    /// Error message, at most [`MAX_ERROR_CHARS`] characters.
    pub message: String,
}

/// Run-scoped counters. Mutated only by [`ResultAggregator`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchState {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedItem>,
    pub converted: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

/// Accumulates outcomes into [`BatchState`].
#[derive(Debug)]
pub struct ResultAggregator {
    state: BatchState,
    output_dir: PathBuf,
    skipped: usize,
}

impl ResultAggregator {
    /// Aggregator for `total` items writing into `output_dir`.
    ///
    /// `skipped` is the number of inputs excluded at discovery; it is
    /// reported but never counted towards `total`.
    pub fn new(total: usize, output_dir: PathBuf, skipped: usize) -> Self {
        Self {
            state: BatchState {
                total,
                ..BatchState::default()
            },
            output_dir,
            skipped,
        }
    }

    /// Record one terminal outcome.
    ///
    /// A second outcome for an item already recorded, or an outcome beyond
    /// `total`, is ignored with a warning so that `completed` can never
    /// exceed `total` nor count an item twice.
    pub fn record(&mut self, outcome: ConversionOutcome) {
        let state = &mut self.state;
        if state.completed >= state.total {
            warn!(
                "Ignoring outcome for {}: all {} items already completed",
                outcome.input().display(),
                state.total
            );
            return;
        }
        if !state.seen.insert(outcome.input().clone()) {
            warn!(
                "Ignoring duplicate outcome for {}",
                outcome.input().display()
            );
            return;
        }

        state.completed += 1;
        match outcome {
            ConversionOutcome::Succeeded { output, .. } => {
                state.succeeded += 1;
                state.converted.push(output);
            }
            ConversionOutcome::Failed { input, error, .. } => {
                state.failed += 1;
                state.failures.push(FailedItem {
                    name: file_name(&input),
                    message: truncate_chars(&error.to_string(), MAX_ERROR_CHARS),
                    input,
                });
            }
        }
        debug_assert_eq!(state.completed, state.succeeded + state.failed);
    }

    /// Current state, for inspection.
    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Freeze the state into the final summary.
    ///
    /// Failures and converted paths are sorted so the summary does not
    /// depend on completion order.
    pub fn finish(self, duration_ms: u64) -> BatchSummary {
        let BatchState {
            total,
            succeeded,
            failed,
            mut failures,
            mut converted,
            ..
        } = self.state;
        failures.sort_by(|a, b| a.input.cmp(&b.input));
        converted.sort();

        BatchSummary {
            total,
            succeeded,
            failed,
            skipped: self.skipped,
            output_dir: self.output_dir,
            failures,
            converted,
            duration_ms,
        }
    }

    /// Drain `rx` on a dedicated task until every sender is dropped.
    ///
    /// The returned handle yields the aggregator so the caller can stamp
    /// the final duration with [`finish`](Self::finish).
    pub fn spawn(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ConversionOutcome>,
    ) -> JoinHandle<ResultAggregator> {
        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                self.record(outcome);
            }
            self
        })
    }
}

/// Immutable result of a finished batch, handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items processed in this run (excludes skipped ones).
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Inputs skipped because their output already existed, or because
    /// another input already claimed the same output path.
    pub skipped: usize,
    pub output_dir: PathBuf,
    /// Failed items sorted by input path.
    pub failures: Vec<FailedItem>,
    /// Written output paths, sorted.
    pub converted: Vec<PathBuf>,
    pub duration_ms: u64,
}

impl BatchSummary {
    /// `true` when every processed item succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Conversion Summary:")?;
        writeln!(f, "  Successful: {}", self.succeeded)?;
        writeln!(f, "  Failed: {}", self.failed)?;
        if self.skipped > 0 {
            writeln!(f, "  Skipped (already converted): {}", self.skipped)?;
        }
        writeln!(f, "  Total: {}", self.total)?;
        write!(f, "  Output files saved to: {}", self.output_dir.display())?;

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f)?;
            write!(f, "Failed conversions (first {SUMMARY_FAILURE_LIMIT}):")?;
            for item in self.failures.iter().take(SUMMARY_FAILURE_LIMIT) {
                writeln!(f)?;
                writeln!(f, "  - {}", truncate_chars(&item.name, SUMMARY_NAME_WIDTH))?;
                write!(
                    f,
                    "    Error: {}",
                    truncate_chars(&item.message, SUMMARY_ERROR_WIDTH)
                )?;
            }
            if self.failures.len() > SUMMARY_FAILURE_LIMIT {
                writeln!(f)?;
                write!(
                    f,
                    "  ... and {} more failures",
                    self.failures.len() - SUMMARY_FAILURE_LIMIT
                )?;
            }
        }
        Ok(())
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(name: &str) -> ConversionOutcome {
        ConversionOutcome::Succeeded {
            input: PathBuf::from(format!("in/{name}.pdf")),
            output: PathBuf::from(format!("out/{name}.md")),
            bytes: 10,
            duration_ms: 1,
        }
    }

    fn failed(name: &str, msg: &str) -> ConversionOutcome {
        ConversionOutcome::Failed {
            input: PathBuf::from(format!("in/{name}.pdf")),
            error: ConversionError::Rejected(msg.to_string()),
            duration_ms: 1,
        }
    }

    #[test]
    fn counts_are_consistent() {
        let mut agg = ResultAggregator::new(3, "out".into(), 0);
        agg.record(ok("a"));
        agg.record(failed("b", "bad"));
        agg.record(ok("c"));
        let s = agg.state();
        assert_eq!((s.completed, s.succeeded, s.failed), (3, 2, 1));
        assert_eq!(s.completed, s.succeeded + s.failed);
    }

    #[test]
    fn duplicate_outcome_is_ignored() {
        let mut agg = ResultAggregator::new(2, "out".into(), 0);
        agg.record(ok("a"));
        agg.record(failed("a", "late"));
        let s = agg.state();
        assert_eq!((s.completed, s.succeeded, s.failed), (1, 1, 0));
    }

    #[test]
    fn completed_never_exceeds_total() {
        let mut agg = ResultAggregator::new(1, "out".into(), 0);
        agg.record(ok("a"));
        agg.record(ok("b"));
        assert_eq!(agg.state().completed, 1);
    }

    #[test]
    fn summary_is_independent_of_arrival_order() {
        let outcomes = vec![failed("z", "e1"), ok("m"), failed("a", "e2"), ok("b")];

        let mut forward = ResultAggregator::new(4, "out".into(), 0);
        outcomes.iter().cloned().for_each(|o| forward.record(o));
        let mut backward = ResultAggregator::new(4, "out".into(), 0);
        outcomes.into_iter().rev().for_each(|o| backward.record(o));

        let a = forward.finish(0);
        let b = backward.finish(0);
        assert_eq!(a, b);
        assert_eq!(a.failures[0].name, "a.pdf");
    }

    #[test]
    fn error_message_is_truncated() {
        let mut agg = ResultAggregator::new(1, "out".into(), 0);
        agg.record(failed("a", &"x".repeat(500)));
        let summary = agg.finish(0);
        assert_eq!(summary.failures[0].message.chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn display_lists_first_ten_failures() {
        let mut agg = ResultAggregator::new(12, "out".into(), 2);
        for i in 0..12 {
            agg.record(failed(&format!("doc{i:02}"), "nope"));
        }
        let text = agg.finish(0).to_string();
        assert!(text.contains("Failed: 12"));
        assert!(text.contains("Skipped (already converted): 2"));
        assert!(text.contains("Failed conversions (first 10):"));
        assert!(text.contains("doc09.pdf"));
        assert!(!text.contains("doc10.pdf"));
        assert!(text.contains("... and 2 more failures"));
    }

    #[test]
    fn clean_summary_has_no_failure_section() {
        let mut agg = ResultAggregator::new(1, "out".into(), 0);
        agg.record(ok("a"));
        let summary = agg.finish(5);
        assert!(summary.is_clean());
        assert!(!summary.to_string().contains("Failed conversions"));
        assert_eq!(summary.converted, vec![PathBuf::from("out/a.md")]);
    }

    #[tokio::test]
    async fn spawned_aggregator_drains_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ResultAggregator::new(2, "out".into(), 0).spawn(rx);
        let tx2 = tx.clone();
        tokio::spawn(async move { tx2.send(ok("a")).unwrap() });
        tx.send(failed("b", "x")).unwrap();
        drop(tx);

        let summary = handle.await.unwrap().finish(0);
        assert_eq!((summary.succeeded, summary.failed), (1, 1));
    }
}
