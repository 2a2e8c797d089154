//! # edgequake-batch2md
//!
//! Convert a directory of documents (PDF, EPUB, HTML) to Markdown through a
//! remote conversion service, many files at once.
//!
//! ## Why this crate?
//!
//! Converting a single document through a hosted converter is easy. Doing it
//! for a few hundred files is where it gets annoying: you want bounded
//! parallelism so the service does not throttle you, re-runs that pick up
//! where the last one stopped, and one bad file that does not take the whole
//! batch down with it. This crate is that orchestration layer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover  match extensions, skip outputs that already exist
//!  ├─ 2. Admit     at most N items in flight (FIFO semaphore)
//!  ├─ 3. Convert   one remote call per item (submit + poll)
//!  ├─ 4. Write     atomic temp-file + rename into the output dir
//!  └─ 5. Report    live progress events + final summary
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_batch2md::{convert_directory, BatchConfig, BatchRun, FormatSelector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from DATALAB_API_KEY (or the legacy MARKER_PDF_KEY)
//!     let config = BatchConfig::builder("./papers")
//!         .format(FormatSelector::All)
//!         .concurrency(10)
//!         .build()?;
//!     match convert_directory(&config).await? {
//!         BatchRun::Completed(summary) => println!("{summary}"),
//!         BatchRun::Empty { .. } => println!("nothing to do"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Bring Your Own Converter
//!
//! The orchestrator only talks to the [`ConversionClient`] trait. Pass any
//! implementation to [`run_batch`]; [`DatalabClient`] is the one shipped.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `batch2md` binary (clap + anyhow + indicatif + tracing-subscriber + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-batch2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod batch;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod limiter;
pub mod progress;
pub mod registry;
pub mod runner;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{BatchSummary, ConversionOutcome, FailedItem};
pub use batch::{convert_directory, run_batch, run_batch_sync, BatchRun};
pub use client::{
    ConversionClient, ConversionMode, ConvertedDocument, DatalabClient, DatalabConfig,
    DatalabConfigBuilder, SharedClient,
};
pub use config::{
    BatchConfig, BatchConfigBuilder, FormatSelector, TargetFormat, DEFAULT_CONCURRENCY,
};
pub use credential::{ApiKey, LEGACY_API_KEY_VAR, PRIMARY_API_KEY_VAR};
pub use error::{BatchError, ConversionError};
pub use limiter::ConcurrencyLimiter;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback, ProgressView};
pub use registry::{Discovery, WorkItem};
