//! Task runner: drives one [`WorkItem`] from queued to a terminal outcome.
//!
//! ```text
//! Queued ──acquire slot──▶ Admitted ──convert()──▶ Invoking ──┬─▶ Succeeded
//!                                                            └─▶ Failed
//! ```
//!
//! Whatever happens inside `Invoking` (service error, write error, even a
//! panic in the client) is caught here and turned into
//! [`ConversionOutcome::Failed`]. Every item sends exactly one outcome.
//!
//! The terminal progress event is sent while the slot is still held, so the
//! reporter always sees a slot vacated before the next item's `Started`
//! event reuses it. The slot is released before the outcome goes to the
//! aggregator.

use crate::aggregate::ConversionOutcome;
use crate::client::SharedClient;
use crate::error::ConversionError;
use crate::limiter::ConcurrencyLimiter;
use crate::progress::{truncate_label, ProgressEvent, ProgressSender, LABEL_WIDTH};
use crate::registry::WorkItem;
use futures::FutureExt;
use std::any::Any;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Queued,
    Admitted,
    Invoking,
    Succeeded,
    Failed,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Succeeded | ItemState::Failed)
    }
}

/// Everything a runner shares with its siblings. Cheap to clone.
#[derive(Clone)]
pub struct TaskContext {
    pub client: SharedClient,
    pub limiter: ConcurrencyLimiter,
    pub progress: ProgressSender,
    pub outcomes: mpsc::UnboundedSender<ConversionOutcome>,
}

/// Run `item` to completion and report its single outcome.
///
/// Returns the terminal state for logging and tests; the authoritative
/// record is the outcome sent to the aggregator.
pub async fn run_item(item: WorkItem, ctx: TaskContext) -> ItemState {
    let label = truncate_label(&item.stem(), LABEL_WIDTH);
    debug!("{}: {:?}", item.name(), ItemState::Queued);

    let permit = match ctx.limiter.acquire().await {
        Ok(permit) => permit,
        Err(error) => {
            // Never admitted: no slot to release, no Started event.
            warn!("{}: {}", item.name(), error);
            let outcome = ConversionOutcome::Failed {
                input: item.input.clone(),
                error,
                duration_ms: 0,
            };
            send_outcome(&ctx, outcome);
            return ItemState::Failed;
        }
    };
    let slot = permit.slot();
    debug!("{}: {:?} (slot {})", item.name(), ItemState::Admitted, slot);

    let _ = ctx.progress.send(ProgressEvent::Started {
        slot,
        label: label.clone(),
    });

    debug!(
        "{}: {:?} via {}",
        item.name(),
        ItemState::Invoking,
        ctx.client.name()
    );
    let start = Instant::now();
    let result = AssertUnwindSafe(invoke(&item, &ctx.client))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ConversionError::Panicked(panic_message(panic))));
    let duration_ms = start.elapsed().as_millis() as u64;

    let (state, event, outcome) = match result {
        Ok(bytes) => {
            debug!(
                "{}: converted → {} ({} bytes, {}ms)",
                item.name(),
                item.output.display(),
                bytes,
                duration_ms
            );
            (
                ItemState::Succeeded,
                ProgressEvent::Succeeded { slot, label, bytes },
                ConversionOutcome::Succeeded {
                    input: item.input,
                    output: item.output,
                    bytes,
                    duration_ms,
                },
            )
        }
        Err(error) => {
            warn!("{}: conversion failed: {}", item.name(), error);
            (
                ItemState::Failed,
                ProgressEvent::Failed {
                    slot,
                    label,
                    error: error.to_string(),
                },
                ConversionOutcome::Failed {
                    input: item.input,
                    error,
                    duration_ms,
                },
            )
        }
    };

    let _ = ctx.progress.send(event);
    drop(permit);
    send_outcome(&ctx, outcome);
    state
}

/// The `Invoking` step: one conversion call, then persist the content.
async fn invoke(item: &WorkItem, client: &SharedClient) -> Result<usize, ConversionError> {
    let doc = client.convert(&item.input, item.target).await?;
    write_output(&item.output, doc.content).await
}

fn send_outcome(ctx: &TaskContext, outcome: ConversionOutcome) {
    if ctx.outcomes.send(outcome).is_err() {
        warn!("Result aggregator is gone; outcome dropped");
    }
}

/// Write `content` to `path` atomically, creating the parent directory.
///
/// The content goes to a temp file in the destination directory which is
/// then renamed over `path`, so a crash never leaves a partial file that a
/// later run would mistake for a finished conversion.
pub async fn write_output(path: &Path, content: String) -> Result<usize, ConversionError> {
    let path = path.to_path_buf();
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomic(&target, content.as_bytes()))
        .await
        .map_err(|e| ConversionError::WriteFailed {
            path: path.clone(),
            detail: format!("write task failed: {e}"),
        })?
        .map_err(|e| ConversionError::WriteFailed {
            path,
            detail: e.to_string(),
        })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<usize> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".batch2md-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(bytes.len())
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
