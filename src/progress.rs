//! Live progress reporting for a running batch.
//!
//! Task runners never call user code directly. They push [`ProgressEvent`]s
//! into an unbounded channel, and a single reporter task folds them into a
//! [`ProgressView`] and forwards them to the configured
//! [`BatchProgressCallback`]. Sending never blocks a runner, so a slow
//! terminal cannot throttle conversions, and no event is ever dropped. The
//! display may lag behind; the final accounting lives in
//! [`crate::aggregate`] and does not depend on this module.
//!
//! Because only the reporter task invokes the callback, implementations see
//! events one at a time, in the order they were sent.
//!
//! # Example
//!
//! ```rust
//! use edgequake_batch2md::{BatchProgressCallback, ProgressView};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct FailureCounter(AtomicUsize);
//!
//! impl BatchProgressCallback for FailureCounter {
//!     fn on_item_error(&self, _view: &ProgressView, label: &str, error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{label}: {error}");
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Longest item label shown in progress output.
pub const LABEL_WIDTH: usize = 40;

/// One lifecycle transition of a work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// The item was admitted into `slot` and its conversion call issued.
    Started { slot: usize, label: String },
    /// The item converted and its output was written.
    Succeeded {
        slot: usize,
        label: String,
        bytes: usize,
    },
    /// The item failed; `error` is the human-readable reason.
    Failed {
        slot: usize,
        label: String,
        error: String,
    },
}

/// Snapshot of batch progress as seen by the reporter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressView {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Label of the item currently occupying each busy slot.
    pub active: BTreeMap<usize, String>,
}

impl ProgressView {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Fold one event into the view.
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { slot, label } => {
                self.active.insert(*slot, label.clone());
            }
            ProgressEvent::Succeeded { slot, .. } => {
                self.active.remove(slot);
                self.completed += 1;
                self.succeeded += 1;
            }
            ProgressEvent::Failed { slot, .. } => {
                self.active.remove(slot);
                self.completed += 1;
                self.failed += 1;
            }
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }
}

/// Observer of batch progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls arrive serially from the reporter task.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any item is admitted.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called when an item enters a slot and its conversion begins.
    fn on_item_start(&self, view: &ProgressView, label: &str) {
        let _ = (view, label);
    }

    /// Called when an item's output has been written.
    fn on_item_complete(&self, view: &ProgressView, label: &str, bytes: usize) {
        let _ = (view, label, bytes);
    }

    /// Called when an item fails.
    fn on_item_error(&self, view: &ProgressView, label: &str, error: &str) {
        let _ = (view, label, error);
    }

    /// Called once after every item reached a terminal state.
    fn on_batch_complete(&self, view: &ProgressView) {
        let _ = view;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// Sending half handed to task runners.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Handle to a running reporter task.
pub struct ProgressReporter {
    handle: JoinHandle<ProgressView>,
}

impl ProgressReporter {
    /// Spawn the reporter for a batch of `total` items.
    ///
    /// The reporter runs until every [`ProgressSender`] clone is dropped.
    pub fn spawn(total: usize, callback: Option<ProgressCallback>) -> (ProgressSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(report(total, rx, callback));
        (tx, Self { handle })
    }

    /// Wait for the reporter to drain its queue and return the final view.
    pub async fn finish(self) -> ProgressView {
        match self.handle.await {
            Ok(view) => view,
            Err(e) => {
                tracing::warn!("Progress reporter stopped abnormally: {}", e);
                ProgressView::default()
            }
        }
    }
}

async fn report(
    total: usize,
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    callback: Option<ProgressCallback>,
) -> ProgressView {
    let mut view = ProgressView::new(total);
    if let Some(ref cb) = callback {
        cb.on_batch_start(total);
    }

    while let Some(event) = rx.recv().await {
        view.apply(&event);
        let Some(ref cb) = callback else { continue };
        match &event {
            ProgressEvent::Started { label, .. } => cb.on_item_start(&view, label),
            ProgressEvent::Succeeded { label, bytes, .. } => {
                cb.on_item_complete(&view, label, *bytes)
            }
            ProgressEvent::Failed { label, error, .. } => cb.on_item_error(&view, label, error),
        }
    }

    if let Some(ref cb) = callback {
        cb.on_batch_complete(&view);
    }
    view
}

/// Shorten `s` to at most `max` characters.
pub fn truncate_label(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
