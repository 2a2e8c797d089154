//! Error types for the edgequake-batch2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`]: **Fatal**: the batch cannot start at all (input
//!   directory missing, no API credential, output directory not creatable).
//!   Returned as `Err(BatchError)` from the top-level `run_batch*` functions
//!   before any document is sent to the conversion service.
//!
//! * [`ConversionError`]: **Non-fatal**: a single document failed (bad
//!   file, rejected by the service, network glitch) but every other document
//!   in the batch is unaffected. Stored inside
//!   [`crate::aggregate::ConversionOutcome::Failed`] and listed in the final
//!   summary instead of aborting the run.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-batch2md library.
///
/// Per-document failures use [`ConversionError`] and never surface here.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// The input path exists but is a file, not a directory.
    #[error("Input path is not a directory: '{path}'")]
    InputNotADirectory { path: PathBuf },

    /// Process does not have permission to list the input directory.
    #[error("Permission denied reading '{path}'\nTry: chmod +rx {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Listing the input directory failed for another reason.
    #[error("Failed to read input directory '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Credential errors ─────────────────────────────────────────────────
    /// Neither the primary nor the legacy API key variable is set.
    #[error(
        "API key not found or not configured.\n\
Set DATALAB_API_KEY=<your key> (or the legacy MARKER_PDF_KEY) in the environment."
    )]
    CredentialMissing,

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client for the conversion service could not be built.
    #[error("Failed to initialise conversion client: {0}")]
    ClientInit(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
///
/// Produced at the task-runner boundary and carried by the failed outcome.
/// The batch continues regardless of how many documents hit one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    /// The input document could not be read from disk.
    #[error("Failed to read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// Transport-level failure talking to the service (DNS, TLS, reset…).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The service rejected the API key (401/403).
    #[error("Authentication rejected by conversion service (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// The service answered with a non-success HTTP status.
    #[error("Conversion service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The service accepted the request but reported a failed conversion.
    #[error("Conversion rejected: {0}")]
    Rejected(String),

    /// The conversion completed but produced no content.
    #[error("No {format} content returned from conversion service")]
    EmptyContent { format: String },

    /// The result was still pending after the configured number of polls.
    #[error("Conversion still pending after {polls} status checks")]
    PollExhausted { polls: u32 },

    /// The converted document could not be written to its destination.
    #[error("Failed to write output '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    /// The conversion task panicked.
    #[error("Conversion task panicked: {0}")]
    Panicked(String),

    /// The concurrency limiter was closed before a slot was granted.
    #[error("Concurrency limiter closed before a slot was granted")]
    LimiterClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_missing_names_both_variables() {
        let msg = BatchError::CredentialMissing.to_string();
        assert!(msg.contains("DATALAB_API_KEY"), "got: {msg}");
        assert!(msg.contains("MARKER_PDF_KEY"), "got: {msg}");
    }

    #[test]
    fn input_not_found_names_path() {
        let e = BatchError::InputNotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert!(e.to_string().contains("/no/such/dir"));
    }

    #[test]
    fn api_error_display() {
        let e = ConversionError::Api {
            status: 500,
            message: "internal".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("internal"));
    }

    #[test]
    fn empty_content_names_format() {
        let e = ConversionError::EmptyContent {
            format: "markdown".into(),
        };
        assert_eq!(
            e.to_string(),
            "No markdown content returned from conversion service"
        );
    }

    #[test]
    fn conversion_error_serialises() {
        let e = ConversionError::PollExhausted { polls: 300 };
        let json = serde_json::to_string(&e).expect("serialise");
        let back: ConversionError = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, e);
    }
}
