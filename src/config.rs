//! Configuration types for a batch conversion run.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share the config with spawned tasks and to log exactly what a run was
//! asked to do.
//!
//! Service-specific settings (API key, endpoint, polling) live in
//! [`crate::client::DatalabConfig`] instead: the orchestrator never needs them.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default number of simultaneous conversion calls.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Configuration for one batch run over a directory.
///
/// # Example
/// ```rust
/// use edgequake_batch2md::{BatchConfig, FormatSelector};
///
/// let config = BatchConfig::builder("papers")
///     .format(FormatSelector::All)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_dir.to_str(), Some("papers_Markdown"));
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Directory scanned for input documents (top level only).
    pub input_dir: PathBuf,

    /// Directory receiving one output file per converted document.
    ///
    /// Defaults to a sibling of the input named `<input>_Markdown`; see
    /// [`default_output_dir`].
    pub output_dir: PathBuf,

    /// Which input extensions are picked up. Default: [`FormatSelector::Pdf`].
    pub format: FormatSelector,

    /// What the service is asked to produce. Default: [`TargetFormat::Markdown`].
    pub target: TargetFormat,

    /// Maximum number of conversion calls in flight at once. Default: 10.
    ///
    /// The service enforces its own rate limits; this ceiling keeps the
    /// client below them. Lower it if you see HTTP 429 failures.
    pub concurrency: usize,

    /// Optional observer for live progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("format", &self.format)
            .field("target", &self.target)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for the given input directory.
    pub fn builder(input_dir: impl Into<PathBuf>) -> BatchConfigBuilder {
        BatchConfigBuilder {
            input_dir: input_dir.into(),
            output_dir: None,
            format: FormatSelector::default(),
            target: TargetFormat::default(),
            concurrency: DEFAULT_CONCURRENCY,
            progress_callback: None,
        }
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    input_dir: PathBuf,
    output_dir: Option<PathBuf>,
    format: FormatSelector,
    target: TargetFormat,
    concurrency: usize,
    progress_callback: Option<ProgressCallback>,
}

impl BatchConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn format(mut self, format: FormatSelector) -> Self {
        self.format = format;
        self
    }

    pub fn target(mut self, target: TargetFormat) -> Self {
        self.target = target;
        self
    }

    /// Maximum items in flight. Zero is raised to one.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Attach a progress observer.
    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(BatchError::InvalidConfig(
                "Input directory must not be empty".into(),
            ));
        }
        let output_dir = self
            .output_dir
            .unwrap_or_else(|| default_output_dir(&self.input_dir));
        if output_dir == self.input_dir {
            return Err(BatchError::InvalidConfig(format!(
                "Output directory must differ from the input directory ('{}')",
                output_dir.display()
            )));
        }

        Ok(BatchConfig {
            input_dir: self.input_dir,
            output_dir,
            format: self.format,
            target: self.target,
            concurrency: self.concurrency,
            progress_callback: self.progress_callback,
        })
    }
}

/// Derive the default output directory for an input directory.
///
/// `docs/papers` becomes `docs/papers_Markdown`. When the input has no final
/// component (`.`, `/`), a `Markdown` directory inside it is used instead.
pub fn default_output_dir(input_dir: &Path) -> PathBuf {
    match input_dir.file_name() {
        Some(name) => {
            let mut dir_name = name.to_os_string();
            dir_name.push("_Markdown");
            input_dir
                .parent()
                .map(|parent| parent.join(&dir_name))
                .unwrap_or_else(|| PathBuf::from(&dir_name))
        }
        None => input_dir.join("Markdown"),
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Selects which input documents a batch picks up.
///
/// Extension matching is case-insensitive: `REPORT.PDF` is a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatSelector {
    /// `.pdf` (default)
    #[default]
    Pdf,
    /// `.epub`
    Epub,
    /// `.html` and `.htm`
    Html,
    /// Every supported extension.
    All,
}

impl FormatSelector {
    /// Lower-case extensions (without the dot) accepted by this selector.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FormatSelector::Pdf => &["pdf"],
            FormatSelector::Epub => &["epub"],
            FormatSelector::Html => &["html", "htm"],
            FormatSelector::All => &["pdf", "epub", "html", "htm"],
        }
    }

    /// Whether `path` carries one of the accepted extensions.
    pub fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions().contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// Name used in user-facing messages ("No pdf files found…").
    pub fn as_str(self) -> &'static str {
        match self {
            FormatSelector::Pdf => "pdf",
            FormatSelector::Epub => "epub",
            FormatSelector::Html => "html",
            FormatSelector::All => "all",
        }
    }
}

impl fmt::Display for FormatSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format requested from the conversion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Markdown, written as `<stem>.md` (default).
    #[default]
    Markdown,
    /// HTML, written as `<stem>.html`.
    Html,
    /// Structured JSON, written as `<stem>.json`.
    Json,
}

impl TargetFormat {
    /// Value of the service's `output_format` field, and the name of the
    /// response field carrying the converted content.
    pub fn as_api_str(self) -> &'static str {
        match self {
            TargetFormat::Markdown => "markdown",
            TargetFormat::Html => "html",
            TargetFormat::Json => "json",
        }
    }

    /// File extension of the written output.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Markdown => "md",
            TargetFormat::Html => "html",
            TargetFormat::Json => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = BatchConfig::builder("in").build().unwrap();
        assert_eq!(c.concurrency, 10);
        assert_eq!(c.format, FormatSelector::Pdf);
        assert_eq!(c.target, TargetFormat::Markdown);
        assert!(c.progress_callback.is_none());
    }

    #[test]
    fn concurrency_is_clamped_to_one() {
        let c = BatchConfig::builder("in").concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn output_dir_defaults_to_sibling() {
        assert_eq!(
            default_output_dir(Path::new("data/papers")),
            PathBuf::from("data/papers_Markdown")
        );
        assert_eq!(
            default_output_dir(Path::new("data/papers/")),
            PathBuf::from("data/papers_Markdown")
        );
        assert_eq!(
            default_output_dir(Path::new("papers")),
            PathBuf::from("papers_Markdown")
        );
        assert_eq!(
            default_output_dir(Path::new("/")),
            PathBuf::from("/Markdown")
        );
    }

    #[test]
    fn explicit_output_dir_is_kept() {
        let c = BatchConfig::builder("in").output_dir("out").build().unwrap();
        assert_eq!(c.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn output_equal_to_input_is_rejected() {
        let err = BatchConfig::builder("same").output_dir("same").build();
        assert!(matches!(err, Err(BatchError::InvalidConfig(_))));
    }

    #[test]
    fn selector_matches_case_insensitively() {
        assert!(FormatSelector::Pdf.matches(Path::new("a.pdf")));
        assert!(FormatSelector::Pdf.matches(Path::new("A.PDF")));
        assert!(!FormatSelector::Pdf.matches(Path::new("a.epub")));
        assert!(FormatSelector::Html.matches(Path::new("page.HTM")));
        assert!(FormatSelector::Html.matches(Path::new("page.html")));
        assert!(FormatSelector::All.matches(Path::new("book.Epub")));
        assert!(!FormatSelector::All.matches(Path::new("notes.txt")));
        assert!(!FormatSelector::All.matches(Path::new("pdf")));
    }

    #[test]
    fn target_extensions() {
        assert_eq!(TargetFormat::Markdown.extension(), "md");
        assert_eq!(TargetFormat::Json.as_api_str(), "json");
    }
}
