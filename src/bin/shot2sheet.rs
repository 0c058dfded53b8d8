//! CLI binary for shot2sheet.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig`, picks a backend, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use shot2sheet::prompts::names_all_keys;
use shot2sheet::{
    export_to_xlsx, purge_remote_files, run_extraction, ExtractionConfig,
    ExtractionProgressCallback, GeminiClient, InferenceClient, ProgressCallback, ProviderClient,
    RunStats,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
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

/// Terminal progress callback. Events arrive from the aggregator in page
/// order, so the per-page lines print in page order too.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
    records: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` tells us how many pages remain.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading store…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
            records: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, remaining: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(remaining as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize, skipped: usize) {
        let remaining = total_pages.saturating_sub(skipped);
        self.activate_bar(remaining);
        self.bar.println(format!(
            "{} {}  {}",
            cyan("◆"),
            bold(&format!("Extracting {remaining} of {total_pages} screenshots…")),
            dim(&format!("({skipped} already stored)")),
        ));
    }

    fn on_no_work(&self, screenshots_dir: &Path) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} No screenshots found in {}",
            cyan("◆"),
            bold(&screenshots_dir.display().to_string()),
        );
    }

    fn on_page_complete(&self, index: usize, total: usize, records: usize) {
        self.records.fetch_add(records, Ordering::SeqCst);
        let mark = if records == 0 { cyan("∅") } else { green("✓") };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            mark,
            index,
            total,
            dim(&format!("{records:>3} records")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let mut s: String = error.chars().take(79).collect();
            s.push('…');
            s
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_records: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let added = self.records.load(Ordering::SeqCst);

        eprintln!(
            "{} {} records added, {} in store{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&added.to_string()),
            bold(&total_records.to_string()),
            if failed == 0 {
                String::new()
            } else {
                format!("  ({} pages failed)", red(&failed.to_string()))
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract Screenshots/*.png into data.json (resumes where it stopped)
  shot2sheet extract

  # Then export to a spreadsheet
  shot2sheet export -o data.xlsx

  # Both in one go, gentler on rate limits
  shot2sheet run --concurrency 20

  # Any edgequake-llm vision provider instead of the Gemini Files API
  shot2sheet extract --backend provider --provider openai --model gpt-4.1-mini

  # Remove uploads left behind by a killed run
  shot2sheet purge

SCREENSHOT NAMING:
  Pages are processed in file-name order and resume is based on the number
  of stored records (19 per page by default). Zero-pad page numbers:
  page_001.png, page_002.png, ... not page_1.png, page_10.png.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (gemini backend)
  OPENAI_API_KEY          OpenAI API key (provider backend)
  ANTHROPIC_API_KEY       Anthropic API key (provider backend)
  EDGEQUAKE_LLM_PROVIDER  Provider for --backend provider
  EDGEQUAKE_MODEL         Model for --backend provider
  RUST_LOG                Overrides the log filter
"#;

/// Extract tables from screenshots with a Vision LLM into JSON and xlsx.
#[derive(Parser, Debug)]
#[command(
    name = "shot2sheet",
    version,
    about = "Extract tables from screenshots with a Vision LLM into JSON and xlsx",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Disable progress bar.
    #[arg(long, global = true, env = "SHOT2SHEET_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SHOT2SHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SHOT2SHEET_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract records from every screenshot not yet in the store.
    Extract(ExtractArgs),

    /// Convert the JSON store to a spreadsheet.
    Export(ExportArgs),

    /// Delete every file still uploaded to the backend.
    Purge(BackendArgs),

    /// Extract, then export.
    Run {
        #[command(flatten)]
        extract: ExtractArgs,

        /// Spreadsheet to write after extraction.
        #[arg(short, long, env = "SHOT2SHEET_XLSX", default_value = "data.xlsx")]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// Gemini Files API + generateContent.
    Gemini,
    /// Any edgequake-llm vision provider.
    Provider,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Inference backend.
    #[arg(long, env = "SHOT2SHEET_BACKEND", value_enum, default_value = "gemini")]
    backend: Backend,

    /// edgequake-llm provider name (provider backend only).
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = "SHOT2SHEET_MODEL", default_value = "gemini-2.5-flash-lite")]
    model: String,

    /// Per-call timeout in seconds.
    #[arg(long, env = "SHOT2SHEET_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    backend: BackendArgs,

    /// Directory of screenshots, one per table page.
    #[arg(short = 'i', long, env = "SHOT2SHEET_SCREENSHOTS", default_value = "Screenshots")]
    screenshots: PathBuf,

    /// JSON record store.
    #[arg(short, long, env = "SHOT2SHEET_STORE", default_value = "data.json")]
    store: PathBuf,

    /// Screenshot file extension.
    #[arg(long, env = "SHOT2SHEET_EXTENSION", default_value = "png")]
    extension: String,

    /// Records one complete page contributes.
    #[arg(long, env = "SHOT2SHEET_PAGE_WIDTH", default_value_t = 19)]
    page_width: usize,

    /// Number of concurrent extractions.
    #[arg(short, long, env = "SHOT2SHEET_CONCURRENCY", default_value_t = 100)]
    concurrency: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "SHOT2SHEET_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Nucleus sampling cutoff.
    #[arg(long, env = "SHOT2SHEET_TOP_P", default_value_t = 1.0)]
    top_p: f32,

    /// Top-k sampling cutoff.
    #[arg(long, env = "SHOT2SHEET_TOP_K", default_value_t = 32)]
    top_k: u32,

    /// Max output tokens per page.
    #[arg(long, env = "SHOT2SHEET_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: u32,

    /// Retries of the inference call per page.
    #[arg(long, env = "SHOT2SHEET_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Initial retry delay in milliseconds.
    #[arg(long, env = "SHOT2SHEET_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "SHOT2SHEET_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// JSON record store to read.
    #[arg(short, long, env = "SHOT2SHEET_STORE", default_value = "data.json")]
    input: PathBuf,

    /// Spreadsheet to write.
    #[arg(short, long, env = "SHOT2SHEET_XLSX", default_value = "data.xlsx")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let extracting = matches!(cli.command, Command::Extract(_) | Command::Run { .. });
    let show_progress = extracting && !cli.quiet && !cli.no_progress;
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

    match cli.command {
        Command::Extract(ref args) => {
            let stats = extract(args, show_progress).await?;
            print_run_summary(&cli, show_progress, &stats);
        }
        Command::Export(ref args) => {
            export(&cli, &args.input, &args.output)?;
        }
        Command::Purge(ref args) => {
            let config = backend_config(args).build().context("Invalid configuration")?;
            let client = build_client(args, &config)?;
            let stats = purge_remote_files(client.as_ref())
                .await
                .context("Purge failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} of {} files deleted{}",
                    if stats.failed == 0 { green("✔") } else { cyan("⚠") },
                    bold(&stats.deleted.to_string()),
                    stats.found,
                    if stats.failed == 0 {
                        String::new()
                    } else {
                        format!("  ({} failed)", red(&stats.failed.to_string()))
                    },
                );
            }
        }
        Command::Run {
            extract: ref args,
            ref output,
        } => {
            let stats = extract(args, show_progress).await?;
            print_run_summary(&cli, show_progress, &stats);
            export(&cli, &args.store, output)?;
        }
    }

    Ok(())
}

async fn extract(args: &ExtractArgs, show_progress: bool) -> Result<RunStats> {
    let cli_cb = show_progress.then(CliProgressCallback::new_dynamic);
    let progress_cb = cli_cb
        .clone()
        .map(|cb| cb as Arc<dyn ExtractionProgressCallback>);

    let outcome: Result<RunStats> = async {
        let config = build_config(args, progress_cb).await?;
        let client = build_client(&args.backend, &config)?;
        run_extraction(client, &config)
            .await
            .context("Extraction failed")
    }
    .await;

    // Don't leave the spinner behind an error message.
    if let (Err(_), Some(cb)) = (&outcome, &cli_cb) {
        cb.bar.finish_and_clear();
    }
    outcome
}

fn export(cli: &Cli, input: &Path, output: &Path) -> Result<()> {
    let stats = export_to_xlsx(input, output)
        .with_context(|| format!("Failed to export {}", input.display()))?;
    if !cli.quiet {
        eprintln!(
            "{}  {} rows × {} columns  →  {}",
            green("✔"),
            stats.rows,
            stats.columns,
            bold(&output.display().to_string()),
        );
    }
    Ok(())
}

fn print_run_summary(cli: &Cli, show_progress: bool, stats: &RunStats) {
    // The callback already printed its own summary line.
    if cli.quiet || show_progress {
        return;
    }
    if stats.total_pages == 0 {
        eprintln!("No screenshots found.");
        return;
    }
    eprintln!(
        "Extracted {} pages ({} skipped, {} failed) in {}ms; {} records in store",
        stats.processed_pages,
        stats.skipped_pages,
        stats.failed_pages,
        stats.total_duration_ms,
        stats.total_records
    );
    if stats.persist_failures > 0 {
        eprintln!("  {} store writes failed", stats.persist_failures);
    }
}

/// Config fields shared by every backend-using subcommand.
fn backend_config(args: &BackendArgs) -> shot2sheet::ExtractionConfigBuilder {
    ExtractionConfig::builder()
        .model(args.model.clone())
        .api_timeout_secs(args.api_timeout)
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    args: &ExtractArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = backend_config(&args.backend)
        .screenshots_dir(args.screenshots.clone())
        .store_path(args.store.clone())
        .extension(args.extension.clone())
        .page_width(args.page_width)
        .concurrency(args.concurrency)
        .temperature(args.temperature)
        .top_p(args.top_p)
        .top_k(args.top_k)
        .max_output_tokens(args.max_tokens)
        .max_retries(args.max_retries)
        .retry_backoff_ms(args.retry_backoff_ms);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        if !names_all_keys(&prompt) {
            warn!("Custom prompt does not name every column key; missing fields will be empty");
        }
        builder = builder.system_prompt(prompt);
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_client(args: &BackendArgs, config: &ExtractionConfig) -> Result<Arc<dyn InferenceClient>> {
    let client: Arc<dyn InferenceClient> = match args.backend {
        Backend::Gemini => {
            let key = args
                .api_key
                .clone()
                .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
                .unwrap_or_default();
            Arc::new(GeminiClient::new(key, config)?)
        }
        Backend::Provider => Arc::new(ProviderClient::resolve(args.provider.as_deref(), config)?),
    };
    Ok(client)
}
