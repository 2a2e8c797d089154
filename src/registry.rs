//! Work-item discovery: turn an input directory into the set of documents
//! that still need converting.
//!
//! Discovery is a snapshot. The skip check is a plain existence test on the
//! computed output path at enumeration time; nothing inspects whether a prior
//! output is complete. Writes are atomic (see [`crate::runner`]), so an
//! existing output is always a finished one.

use crate::config::{FormatSelector, TargetFormat};
use crate::error::BatchError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One input document slated for conversion. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Path of the input document.
    pub input: PathBuf,
    /// Output format requested from the service.
    pub target: TargetFormat,
    /// Where the converted document will be written.
    pub output: PathBuf,
}

impl WorkItem {
    /// Build the item for `input`, placing its output in `output_dir`.
    pub fn new(input: PathBuf, output_dir: &Path, target: TargetFormat) -> Self {
        let output = output_path_for(&input, output_dir, target);
        Self {
            input,
            target,
            output,
        }
    }

    /// File name of the input, used as the item's identity in reports.
    pub fn name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// File stem of the input, used as the progress label.
    pub fn stem(&self) -> String {
        self.input
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name())
    }
}

/// Compute `<output_dir>/<input stem>.<target ext>`.
pub fn output_path_for(input: &Path, output_dir: &Path, target: TargetFormat) -> PathBuf {
    let stem = input.file_stem().unwrap_or(input.as_os_str());
    let mut file_name = stem.to_os_string();
    file_name.push(".");
    file_name.push(target.extension());
    output_dir.join(file_name)
}

/// Result of scanning an input directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discovery {
    /// Items that need converting, in file-name order.
    pub items: Vec<WorkItem>,
    /// Inputs whose output already existed; they produce no outcome.
    pub skipped_existing: Vec<PathBuf>,
    /// Inputs whose output path collides with an earlier item's
    /// (e.g. `a.pdf` and `a.epub` with [`FormatSelector::All`]).
    pub duplicates: Vec<PathBuf>,
}

impl Discovery {
    /// `true` when there is nothing to convert. Not an error.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of inputs matching the selector, converted or not.
    pub fn matched(&self) -> usize {
        self.items.len() + self.skipped_existing.len() + self.duplicates.len()
    }
}

/// Scan `input_dir` (top level only) for documents matching `format`.
///
/// Items whose output already exists under `output_dir` are excluded.
///
/// # Errors
/// Fatal [`BatchError`]s when `input_dir` is missing, not a directory, or
/// unreadable. Unreadable individual entries are logged and ignored.
pub fn discover(
    input_dir: &Path,
    output_dir: &Path,
    format: FormatSelector,
    target: TargetFormat,
) -> Result<Discovery, BatchError> {
    let mut candidates = list_matching(input_dir, format)?;
    candidates.sort();

    let mut discovery = Discovery::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for input in candidates {
        let item = WorkItem::new(input, output_dir, target);

        if !claimed.insert(item.output.clone()) {
            warn!(
                "Skipping {}: output {} is already claimed by another input",
                item.input.display(),
                item.output.display()
            );
            discovery.duplicates.push(item.input);
            continue;
        }

        if item.output.exists() {
            debug!("Skipping (exists): {}", item.output.display());
            discovery.skipped_existing.push(item.input);
            continue;
        }

        discovery.items.push(item);
    }

    debug!(
        "Discovered {} items ({} skipped, {} duplicates) in {}",
        discovery.items.len(),
        discovery.skipped_existing.len(),
        discovery.duplicates.len(),
        input_dir.display()
    );
    Ok(discovery)
}

/// Check that `input_dir` exists and is a directory.
pub fn validate_input_dir(input_dir: &Path) -> Result<(), BatchError> {
    match std::fs::metadata(input_dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(BatchError::InputNotADirectory {
            path: input_dir.to_path_buf(),
        }),
        Err(e) => Err(map_dir_error(input_dir, e)),
    }
}

fn list_matching(input_dir: &Path, format: FormatSelector) -> Result<Vec<PathBuf>, BatchError> {
    validate_input_dir(input_dir)?;

    let entries = std::fs::read_dir(input_dir).map_err(|e| map_dir_error(input_dir, e))?;

    let mut matches = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Ignoring unreadable entry in {}: {}",
                    input_dir.display(),
                    e
                );
                continue;
            }
        };
        let path = entry.path();
        // `Path::is_file` follows symlinks, so linked documents are included.
        if path.is_file() && format.matches(&path) {
            matches.push(path);
        }
    }
    Ok(matches)
}

fn map_dir_error(path: &Path, e: std::io::Error) -> BatchError {
    let path = path.to_path_buf();
    match e.kind() {
        ErrorKind::NotFound => BatchError::InputNotFound { path },
        ErrorKind::PermissionDenied => BatchError::PermissionDenied { path },
        _ => BatchError::InputUnreadable { path, source: e },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn output_path_uses_stem_and_target_extension() {
        let p = output_path_for(
            Path::new("in/Report.v2.PDF"),
            Path::new("out"),
            TargetFormat::Markdown,
        );
        assert_eq!(p, PathBuf::from("out/Report.v2.md"));
    }

    #[test]
    fn discovers_matching_files_sorted() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        touch(input.path(), "b.pdf");
        touch(input.path(), "A.PDF");
        touch(input.path(), "c.epub");
        touch(input.path(), "notes.txt");
        fs::create_dir(input.path().join("nested.pdf")).unwrap();

        let d = discover(
            input.path(),
            output.path(),
            FormatSelector::Pdf,
            TargetFormat::Markdown,
        )
        .unwrap();
        let names: Vec<String> = d.items.iter().map(WorkItem::name).collect();
        assert_eq!(names, vec!["A.PDF", "b.pdf"]);
        assert_eq!(d.items[0].output, output.path().join("A.md"));
    }

    #[test]
    fn html_selector_includes_htm() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        touch(input.path(), "a.html");
        touch(input.path(), "b.HTM");
        touch(input.path(), "c.pdf");

        let d = discover(
            input.path(),
            output.path(),
            FormatSelector::Html,
            TargetFormat::Markdown,
        )
        .unwrap();
        assert_eq!(d.items.len(), 2);
    }

    #[test]
    fn existing_outputs_are_skipped() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        touch(input.path(), "done.pdf");
        touch(input.path(), "todo.pdf");
        touch(output.path(), "done.md");

        let d = discover(
            input.path(),
            output.path(),
            FormatSelector::Pdf,
            TargetFormat::Markdown,
        )
        .unwrap();
        assert_eq!(d.items.len(), 1);
        assert_eq!(d.items[0].name(), "todo.pdf");
        assert_eq!(d.skipped_existing, vec![input.path().join("done.pdf")]);
        assert_eq!(d.matched(), 2);
    }

    #[test]
    fn colliding_outputs_keep_first_by_name() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        touch(input.path(), "a.pdf");
        touch(input.path(), "a.epub");

        let d = discover(
            input.path(),
            output.path(),
            FormatSelector::All,
            TargetFormat::Markdown,
        )
        .unwrap();
        assert_eq!(d.items.len(), 1);
        assert_eq!(d.items[0].name(), "a.epub");
        assert_eq!(d.duplicates, vec![input.path().join("a.pdf")]);
    }

    #[test]
    fn empty_directory_is_not_an_error() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let d = discover(
            input.path(),
            output.path(),
            FormatSelector::Pdf,
            TargetFormat::Markdown,
        )
        .unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn missing_directory_is_fatal() {
        let err = discover(
            Path::new("/definitely/not/a/real/dir"),
            Path::new("/tmp/out"),
            FormatSelector::Pdf,
            TargetFormat::Markdown,
        );
        assert!(matches!(err, Err(BatchError::InputNotFound { .. })));
    }

    #[test]
    fn file_as_input_is_fatal() {
        let input = TempDir::new().unwrap();
        touch(input.path(), "a.pdf");
        let err = validate_input_dir(&input.path().join("a.pdf"));
        assert!(matches!(err, Err(BatchError::InputNotADirectory { .. })));
    }
}
