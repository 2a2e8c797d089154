//! The conversion-service boundary.
//!
//! The orchestrator only ever sees [`ConversionClient::convert`]: one logical
//! call per document that either yields converted content or a
//! [`ConversionError`]. How that call is carried out (upload, polling,
//! streaming) is the implementation's business.
//!
//! [`DatalabClient`] is the shipped implementation. Tests substitute their
//! own client through the same trait.

pub mod datalab;

pub use datalab::{ConversionMode, DatalabClient, DatalabConfig, DatalabConfigBuilder};

use crate::config::TargetFormat;
use crate::error::ConversionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Content returned by the conversion service for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedDocument {
    /// Converted content in the requested [`TargetFormat`].
    pub content: String,
    /// Number of pages the service processed, when reported.
    pub page_count: Option<usize>,
}

/// A remote document converter.
///
/// Implementations must be `Send + Sync`: one client instance is shared by
/// every concurrently running task of a batch.
#[async_trait]
pub trait ConversionClient: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Convert the document at `input` into `target`.
    ///
    /// Exactly one attempt is made; errors are returned, never retried.
    async fn convert(
        &self,
        input: &Path,
        target: TargetFormat,
    ) -> Result<ConvertedDocument, ConversionError>;
}

/// Shared handle stored by the orchestrator.
pub type SharedClient = Arc<dyn ConversionClient>;
