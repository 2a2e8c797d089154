//! CLI binary for edgequake-batch2md.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `BatchConfig` / `DatalabConfig` and prints the batch summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_batch2md::{
    run_batch, ApiKey, BatchConfig, BatchProgressCallback, BatchRun, BatchSummary,
    ConversionMode, DatalabClient, DatalabConfig, FormatSelector, ProgressCallback, ProgressView,
    TargetFormat,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the whole batch plus a log line
/// per finished file. Items finish out of order; the bar message lists the
/// files currently in flight.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input directory…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}\n  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn show_active(&self, view: &ProgressView) {
        let active: Vec<&str> = view.active.values().map(String::as_str).collect();
        self.bar.set_message(dim(&active.join(", ")));
    }

    /// Remove the bar if the batch ended without `on_batch_complete`
    /// (empty batch or fatal error). No-op once the bar is finished.
    fn dismiss(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        self.activate_bar(total_items);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_items} files…"))
        ));
    }

    fn on_item_start(&self, view: &ProgressView, label: &str) {
        let line = format!("  {} Processing: {}", dim("…"), label);
        self.bar.println(line);
        self.show_active(view);
    }

    fn on_item_complete(&self, view: &ProgressView, label: &str, bytes: usize) {
        self.bar.println(format!(
            "  {} Converted: {}  {}",
            green("✓"),
            label,
            dim(&format!("{bytes} bytes")),
        ));
        self.bar.set_position(view.completed as u64);
        self.show_active(view);
    }

    fn on_item_error(&self, view: &ProgressView, label: &str, error: &str) {
        let msg: String = error.chars().take(80).collect();
        let line = format!("  {} Failed: {}  {}", red("✗"), label, red(&msg));
        self.bar.println(line);
        self.bar.set_position(view.completed as u64);
        self.show_active(view);
    }

    fn on_batch_complete(&self, view: &ProgressView) {
        self.bar.finish_and_clear();
        if view.failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&view.succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if view.succeeded == 0 {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&view.succeeded.to_string()),
                view.total,
                red(&view.failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every PDF in a folder (output: ./papers_Markdown)
  batch2md -i ./papers

  # EPUB, HTML and PDF together, into a chosen folder
  batch2md -i ./library -f all -o ./library-md

  # Fewer parallel requests
  batch2md -i ./papers -c 4

  # Machine-readable summary
  batch2md -i ./papers --json > summary.json

  # Re-run after a partial failure: finished files are skipped
  batch2md -i ./papers

ENVIRONMENT VARIABLES:
  DATALAB_API_KEY        Datalab API key
  MARKER_PDF_KEY         Legacy name for the API key (used if DATALAB_API_KEY is unset)
  BATCH2MD_BASE_URL      Override the conversion service URL
  RUST_LOG               Override the log filter (e.g. edgequake_batch2md=debug)

SETUP:
  1. Set API key:     export DATALAB_API_KEY=...   (or put it in ./.env)
  2. Convert:         batch2md -i ./papers

  Files whose output already exists are skipped, so interrupted or
  partially failed runs can simply be repeated.
"#;

/// Convert a directory of PDF, EPUB and HTML files to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "batch2md",
    version,
    about = "Convert a directory of PDF, EPUB and HTML files to Markdown",
    long_about = "Convert every matching document in a directory to Markdown through the \
Datalab conversion API, several files at a time. Files already converted are skipped; a \
failing file never stops the rest of the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the documents to convert.
    #[arg(short, long, env = "BATCH2MD_INPUT")]
    input: PathBuf,

    /// Output directory (default: <input>_Markdown next to the input).
    #[arg(short, long, env = "BATCH2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Which documents to convert.
    #[arg(short, long, env = "BATCH2MD_FORMAT", value_enum, default_value = "pdf")]
    format: FormatArg,

    /// Maximum number of conversions in flight.
    #[arg(short, long, env = "BATCH2MD_CONCURRENCY", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..))]
    concurrency: u32,

    /// Format requested from the service and written to disk.
    #[arg(long, env = "BATCH2MD_OUTPUT_FORMAT", value_enum, default_value = "markdown")]
    output_format: TargetArg,

    /// Service-side conversion mode.
    #[arg(long, env = "BATCH2MD_MODE", value_enum, default_value = "balanced")]
    mode: ModeArg,

    /// Conversion service base URL.
    #[arg(long, env = "BATCH2MD_BASE_URL")]
    base_url: Option<String>,

    /// Delay between status polls, in milliseconds.
    #[arg(long, env = "BATCH2MD_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Status polls per file before giving up.
    #[arg(long, env = "BATCH2MD_MAX_POLLS", default_value_t = 300)]
    max_polls: u32,

    /// Print the summary as JSON instead of text.
    #[arg(long, env = "BATCH2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BATCH2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BATCH2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the summary.
    #[arg(short, long, env = "BATCH2MD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pdf,
    Epub,
    Html,
    All,
}

impl From<FormatArg> for FormatSelector {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Pdf => FormatSelector::Pdf,
            FormatArg::Epub => FormatSelector::Epub,
            FormatArg::Html => FormatSelector::Html,
            FormatArg::All => FormatSelector::All,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TargetArg {
    Markdown,
    Html,
    Json,
}

impl From<TargetArg> for TargetFormat {
    fn from(v: TargetArg) -> Self {
        match v {
            TargetArg::Markdown => TargetFormat::Markdown,
            TargetArg::Html => TargetFormat::Html,
            TargetArg::Json => TargetFormat::Json,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Fast,
    Balanced,
    Accurate,
}

impl From<ModeArg> for ConversionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Fast => ConversionMode::Fast,
            ModeArg::Balanced => ConversionMode::Balanced,
            ModeArg::Accurate => ConversionMode::Accurate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A `.env` in the working directory (or a parent) fills in variables
    // not already set, including the API key and BATCH2MD_* flags.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Credential ───────────────────────────────────────────────────────
    // Resolved before the input directory is touched.
    let api_key = ApiKey::from_env().context("No API key configured")?;

    // ── Build config ─────────────────────────────────────────────────────
    let client = DatalabClient::new(build_client_config(&cli, api_key)?)
        .context("Failed to initialise conversion client")?;

    let cli_progress = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn BatchProgressCallback>);

    let config = match build_config(&cli, progress_cb) {
        Ok(config) => config,
        Err(e) => {
            if let Some(ref cb) = cli_progress {
                cb.dismiss();
            }
            return Err(e);
        }
    };

    if !cli.quiet && !cli.json {
        eprintln!(
            "{} {} → {}",
            dim("Converting"),
            bold(&config.input_dir.display().to_string()),
            bold(&config.output_dir.display().to_string()),
        );
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let run = run_batch(&config, Arc::new(client)).await;
    if let Some(ref cb) = cli_progress {
        cb.dismiss();
    }
    let run = run.context("Batch conversion failed")?;

    if cli.json {
        let json =
            serde_json::to_string_pretty(&run).context("Failed to serialise summary")?;
        println!("{json}");
        return Ok(());
    }

    match run {
        BatchRun::Empty {
            input_dir,
            format,
            skipped,
        } => {
            if skipped > 0 {
                println!(
                    "No {format} files left to convert in {} ({skipped} already converted)",
                    input_dir.display()
                );
            } else {
                println!("No {format} files found in {}", input_dir.display());
            }
        }
        BatchRun::Completed(summary) => print_summary(&summary),
    }

    // Per-item failures are listed in the summary, not treated as fatal.
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("{summary}");
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder(&cli.input)
        .format(cli.format.into())
        .target(cli.output_format.into())
        .concurrency(cli.concurrency as usize);

    if let Some(ref output) = cli.output {
        builder = builder.output_dir(output);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to `DatalabConfig`.
fn build_client_config(cli: &Cli, api_key: ApiKey) -> Result<DatalabConfig> {
    let mut builder = DatalabConfig::builder(api_key)
        .mode(cli.mode.into())
        .poll_interval_ms(cli.poll_interval_ms)
        .max_polls(cli.max_polls);

    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url.clone());
    }

    builder
        .build()
        .context("Invalid conversion service configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dismiss_clears_an_unfinished_spinner() {
        let cb = CliProgressCallback::new();
        assert!(!cb.bar.is_finished());
        cb.dismiss();
        assert!(cb.bar.is_finished());
    }

    #[test]
    fn dismiss_after_batch_complete_is_a_no_op() {
        let cb = CliProgressCallback::new();
        cb.on_batch_start(1);
        cb.on_batch_complete(&ProgressView::default());
        assert!(cb.bar.is_finished());
        cb.dismiss();
        assert!(cb.bar.is_finished());
    }

    #[test]
    fn cli_maps_to_batch_config() {
        let cli = Cli::parse_from(["batch2md", "-i", "papers", "-f", "all", "-c", "3"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.format, FormatSelector::All);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.output_dir, PathBuf::from("papers_Markdown"));
    }
}
