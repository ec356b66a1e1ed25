//! CLI binary for docshift.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docshift::{
    convert_batch, is_bare_url, BatchOutput, BundledLibraries, CacheManager, ConversionConfig,
    ConversionInput, ConversionProgressCallback, InputFormat, LibraryPathStrategy, OutputFormat,
    PageAttributes, PageSize, ProgressCallback, Template,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

/// Live progress bar plus one log line per finished input. Inputs may
/// finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    labels: Vec<String>,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new(labels: Vec<String>) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(labels.len() as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            labels,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn label(&self, index: usize) -> &str {
        self.labels
            .get(index.wrapping_sub(1))
            .map(String::as_str)
            .unwrap_or("?")
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&index)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_input_start(&self, index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(index, Instant::now());
        self.bar.set_message(self.label(index).to_string());
    }

    fn on_input_complete(&self, index: usize, _total: usize, output_bytes: u64) {
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            self.label(index),
            dim(&format!("{output_bytes} bytes")),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_input_error(&self, index: usize, _total: usize, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg: String = if first_line.chars().count() > 80 {
            first_line.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            self.label(index),
            red(&msg),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} file(s) converted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown to HTML on stdout
  docshift notes.md --to html

  # Word document to Markdown file
  docshift report.docx --to markdown -o report.md

  # Styled PDF
  docshift paper.md --to pdf --template academic -o paper.pdf

  # Several inputs into one directory
  docshift a.md b.rst c.html --to docx -o out/

  # From stdin, declared format
  cat page.html | docshift - --from html --to markdown

  # Download and convert
  docshift https://example.com/readme.md --to html

  # Just report the detected format
  docshift --detect-only mystery.bin

  # Remove produced files older than a day
  docshift --clean-cache --max-age-secs 86400

ENGINES:
  pandoc       required for every conversion       DOCSHIFT_PANDOC
  pdftohtml    PDF input only (poppler-utils)      DOCSHIFT_PDFTOHTML
  chromium     PDF output only                     DOCSHIFT_BROWSER

ENVIRONMENT VARIABLES:
  DOCSHIFT_BROWSER_ARGS   Extra browser flags, e.g. --no-sandbox in containers
  DOCSHIFT_SHIM_DIR       Where the bundled-library symlink shim is created
  RUST_LOG                Override log filtering (e.g. docshift=debug)
"#;

/// Convert documents between formats with pandoc.
#[derive(Parser, Debug)]
#[command(
    name = "docshift",
    version,
    about = "Convert documents between formats with pandoc",
    long_about = "Detect document formats and convert between Markdown, HTML, LaTeX, \
reStructuredText, DOCX, ODT, EPUB, plain text and PDF. Text conversions run pandoc; \
PDF input is read with pdftohtml and PDF output is printed by a headless browser.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files, HTTP/HTTPS URLs, or `-` for stdin.
    inputs: Vec<String>,

    /// Output format (markdown, html, docx, latex, plain, pdf).
    #[arg(short, long, env = "DOCSHIFT_TO", required_unless_present_any = ["detect_only", "clean_cache"])]
    to: Option<OutputFormat>,

    /// Input format; detected from type, name and content when omitted.
    #[arg(short, long, env = "DOCSHIFT_FROM")]
    from: Option<InputFormat>,

    /// Output file (one input) or directory (several inputs).
    #[arg(short, long, env = "DOCSHIFT_OUTPUT")]
    output: Option<PathBuf>,

    /// Stylesheet to inject before rendering PDF output.
    #[arg(long, env = "DOCSHIFT_CSS", conflicts_with = "template")]
    css: Option<PathBuf>,

    /// Built-in style for PDF output: default, clean, academic.
    #[arg(long, env = "DOCSHIFT_TEMPLATE")]
    template: Option<String>,

    /// Paper size for PDF output.
    #[arg(long, env = "DOCSHIFT_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Page margin in millimetres for PDF output.
    #[arg(long, env = "DOCSHIFT_MARGIN_MM", default_value_t = 0.0)]
    margin_mm: f32,

    /// Print the detected input format and exit.
    #[arg(long)]
    detect_only: bool,

    /// Print results as JSON.
    #[arg(long, env = "DOCSHIFT_JSON")]
    json: bool,

    /// Remove stale files from the output directory and exit.
    #[arg(long)]
    clean_cache: bool,

    /// Age in seconds after which `--clean-cache` removes a file.
    #[arg(long, default_value_t = 3600, requires = "clean_cache")]
    max_age_secs: u64,

    /// Path to the pandoc executable.
    #[arg(long, env = "DOCSHIFT_PANDOC")]
    pandoc: Option<PathBuf>,

    /// Path to the pdftohtml executable.
    #[arg(long, env = "DOCSHIFT_PDFTOHTML")]
    pdftohtml: Option<PathBuf>,

    /// Path to a Chromium-family browser.
    #[arg(long, env = "DOCSHIFT_BROWSER")]
    browser: Option<PathBuf>,

    /// Directory of bundled engine libraries to put on the library path.
    #[arg(long, env = "DOCSHIFT_LIB_DIR")]
    lib_dir: Option<PathBuf>,

    /// Working directory for scratch files.
    #[arg(long, env = "DOCSHIFT_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Per-engine timeout in seconds.
    #[arg(long, env = "DOCSHIFT_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCSHIFT_DOWNLOAD_TIMEOUT", default_value_t = 15)]
    download_timeout: u64,

    /// Maximum input size in bytes.
    #[arg(long, env = "DOCSHIFT_MAX_BYTES", default_value_t = 10_000_000)]
    max_bytes: u64,

    /// Number of inputs converted at once.
    #[arg(short, long, env = "DOCSHIFT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Disable progress bar.
    #[arg(long, env = "DOCSHIFT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSHIFT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSHIFT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PageSizeArg {
    A4,
    Letter,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.detect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Detect-only mode ─────────────────────────────────────────────────
    if cli.detect_only {
        return detect_only(&cli).await;
    }

    // ── Cache housekeeping ───────────────────────────────────────────────
    if cli.clean_cache {
        let config = build_config(&cli, None)?;
        let cache = CacheManager::new(&config);
        let removed = cache
            .cleanup_old_files(Duration::from_secs(cli.max_age_secs))
            .await
            .context("Failed to clean output directory")?;
        if cli.json {
            println!("{}", serde_json::json!({ "removed": removed, "dir": cache.output_dir() }));
        } else if !cli.quiet {
            eprintln!("Removed {} file(s) from {}", removed, cache.output_dir().display());
        }
        return Ok(());
    }

    // ── Build inputs and config ──────────────────────────────────────────
    let to = cli.to.context("--to is required")?;
    if cli.inputs.is_empty() {
        anyhow::bail!("No inputs given");
    }
    let css = load_css(&cli).await?;
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new(cli.inputs.clone());
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let mut inputs = Vec::with_capacity(cli.inputs.len());
    for raw in &cli.inputs {
        inputs.push(load_input(raw, cli.from, &config).await?);
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let batch = convert_batch(inputs, to, css.as_deref(), &config).await;
    let delivered = deliver(&cli, to, &batch).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&batch).context("Failed to serialise output")?);
    } else {
        for line in delivered {
            println!("{line}");
        }
    }

    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "Converted {}/{} in {}ms",
            batch.stats.succeeded, batch.stats.total, batch.stats.total_duration_ms
        );
    }
    for job in &batch.results {
        if let Err(ref e) = job.result {
            if !show_progress && !cli.json {
                eprintln!("{} {}: {}", red("✗"), job.input, e);
            }
        }
    }
    if batch.stats.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn detect_only(cli: &Cli) -> Result<()> {
    let config = build_config(cli, None)?;
    let mut rows = Vec::new();
    for raw in &cli.inputs {
        let input = load_input(raw, cli.from, &config).await?;
        rows.push((raw.clone(), input.format()));
    }
    if cli.json {
        let json: Vec<_> = rows
            .iter()
            .map(|(input, format)| serde_json::json!({ "input": input, "format": format }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json).context("Failed to serialise output")?);
    } else {
        for (input, format) in rows {
            println!("{input}\t{format}");
        }
    }
    Ok(())
}

/// Turn a command-line argument into a conversion input.
async fn load_input(raw: &str, from: Option<InputFormat>, config: &ConversionConfig) -> Result<ConversionInput> {
    if raw == "-" {
        let mut bytes = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Failed to read stdin")?;
        return Ok(match from {
            Some(format) => ConversionInput::from_bytes(bytes, format),
            None => ConversionInput::detect_bytes(bytes, None, None),
        });
    }
    if is_bare_url(raw) {
        return Ok(match from {
            Some(format) => ConversionInput::from_url(raw, format),
            None => {
                // Detection needs the bytes and the Content-Type.
                docshift::pipeline::input::fetch_url(raw, config)
                    .await
                    .with_context(|| format!("Failed to download {raw}"))?
                    .into_input()
            }
        });
    }
    let path = PathBuf::from(raw);
    if !path.exists() {
        anyhow::bail!("No such file: {}", path.display());
    }
    Ok(match from {
        Some(format) => ConversionInput::from_path(path, format),
        None => ConversionInput::detect_path(path),
    })
}

async fn load_css(cli: &Cli) -> Result<Option<String>> {
    if let Some(ref path) = cli.css {
        let css = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read stylesheet {:?}", path))?;
        return Ok(Some(css));
    }
    Ok(cli
        .template
        .as_deref()
        .map(Template::from_id)
        .and_then(Template::css)
        .map(str::to_string))
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .process_timeout_secs(cli.timeout)
        .download_timeout_secs(cli.download_timeout)
        .max_input_bytes(cli.max_bytes)
        .concurrency(cli.concurrency)
        .page(PageAttributes {
            size: cli.page_size.into(),
            margin_mm: cli.margin_mm,
        });

    if let Some(ref p) = cli.pandoc {
        builder = builder.engine_path(p);
    }
    if let Some(ref p) = cli.pdftohtml {
        builder = builder.pdftohtml_path(p);
    }
    if let Some(ref p) = cli.browser {
        builder = builder.browser_path(p);
    }
    if let Some(ref dir) = cli.lib_dir {
        builder = builder.library_path(LibraryPathStrategy::Bundled(BundledLibraries::new(dir)));
    }
    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Put produced files where the user asked. Returns the lines to print.
///
/// - one text-format input, no `-o`: contents on stdout, file removed
/// - one input with `-o`: moved to that path
/// - several inputs with `-o`: moved into that directory
/// - otherwise: the produced paths
async fn deliver(cli: &Cli, to: OutputFormat, batch: &BatchOutput) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    let single = batch.results.len() == 1;

    for job in &batch.results {
        let Ok(ref out) = job.result else { continue };

        match (&cli.output, single) {
            (None, true) if to.is_text_based() && !cli.json => {
                let bytes = tokio::fs::read(&out.path)
                    .await
                    .with_context(|| format!("Failed to read {}", out.path.display()))?;
                let mut stdout = io::stdout().lock();
                stdout.write_all(&bytes).context("Failed to write to stdout")?;
                if !bytes.ends_with(b"\n") {
                    stdout.write_all(b"\n").ok();
                }
                tokio::fs::remove_file(&out.path).await.ok();
            }
            (None, _) => lines.push(out.path.display().to_string()),
            (Some(dest), true) => {
                move_to(&out.path, dest).await?;
                lines.push(dest.display().to_string());
            }
            (Some(dir), false) => {
                let dest = dir.join(format!("{}.{}", stem_of(&job.input, job.index), to.extension()));
                move_to(&out.path, &dest).await?;
                lines.push(dest.display().to_string());
            }
        }
    }
    Ok(lines)
}

async fn move_to(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if tokio::fs::rename(from, to).await.is_err() {
        tokio::fs::copy(from, to)
            .await
            .with_context(|| format!("Failed to write {}", to.display()))?;
        tokio::fs::remove_file(from).await.ok();
    }
    Ok(())
}

/// File stem for an input description, `input-<n>` when there is none.
fn stem_of(input: &str, index: usize) -> String {
    input
        .rsplit(['/', '\\'])
        .next()
        .and_then(|name| Path::new(name).file_stem())
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && !s.starts_with('<'))
        .map(str::to_string)
        .unwrap_or_else(|| format!("input-{index}"))
}
