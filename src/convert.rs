//! Conversion entry points.
//!
//! [`convert`] runs one input through the conversion engine. PDF output goes
//! through [`convert_to_pdf`]: engine → HTML → optional CSS → render → PDF.
//! [`convert_batch`] runs several inputs with bounded concurrency; see
//! [`crate::stream::convert_stream`] for the streaming variant.
//!
//! Within one call the steps are strictly sequential:
//! resolve input → size check → locate engine → build command → run → verify.

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::format::{InputFormat, OutputFormat};
use crate::output::{BatchOutput, BatchStats, ConversionOutput, JobResult};
use crate::pipeline::command::build_command;
use crate::pipeline::exec::{self, ExecOptions};
use crate::pipeline::image::{build_image_html, image_mime_type};
use crate::pipeline::input::{self, ConversionInput, ResolvedInput};
use crate::pipeline::pdf_input::pdf_to_html;
use crate::pipeline::render::{ChromiumFactory, RenderLoop, SurfaceFactory};
use crate::pipeline::style::inject_css;
use engine_locate::{locate_engine, LibrarySearchPath, LocateError, BROWSER, PANDOC, PDFTOHTML};
use futures::stream::{self, StreamExt};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert `input` to `output`.
///
/// # Errors
/// - [`ConversionError::FileTooLarge`] before any engine runs
/// - [`ConversionError::UnsupportedFormat`] for image input to a non-PDF
///   format, or when an engine needed only for this format is missing
/// - [`ConversionError::Timeout`] / [`ConversionError::ProcessFailed`] from the engine
/// - [`ConversionError::InputError`] when the source cannot be read
pub async fn convert(
    input: ConversionInput,
    output: OutputFormat,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    if output == OutputFormat::Pdf {
        return convert_to_pdf(input, None, config).await;
    }

    let started = Instant::now();
    let input_format = input.format();
    info!("Converting {} ({}) to {}", input.describe(), input_format, output);

    let session = Session::new(config);
    let path = session.run_engine(input, output).await?;
    finish(path, input_format, output, started).await
}

/// Convert `input` to PDF, optionally styling it with `css` first.
///
/// The intermediate HTML file is removed whatever the outcome.
pub async fn convert_to_pdf(
    input: ConversionInput,
    css: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    let started = Instant::now();
    let input_format = input.format();
    info!("Converting {} ({}) to pdf", input.describe(), input_format);

    let session = Session::new(config);

    // ── Step 1: HTML ─────────────────────────────────────────────────────
    let (mut html, _intermediate) = if input_format == InputFormat::Image {
        let resolved = input::resolve(input.into_source(), config).await?;
        let bytes = resolved.into_bytes().await?;
        (build_image_html(&bytes, image_mime_type(&bytes)), None)
    } else {
        let html_path = session.run_engine(input, OutputFormat::Html).await?;
        let guard = IntermediateFile(html_path);
        let bytes = tokio::fs::read(&guard.0)
            .await
            .map_err(|e| ConversionError::process_failed(-1, format!("Cannot read engine HTML: {e}")))?;
        (String::from_utf8_lossy(&bytes).into_owned(), Some(guard))
    };

    // ── Step 2: CSS ──────────────────────────────────────────────────────
    if let Some(css) = css {
        html = inject_css(&html, css);
    }

    // ── Step 3-4: Render and print ───────────────────────────────────────
    session.ensure_dirs().await?;
    let factory = session.surface_factory()?;
    let pdf_path = session.output_path(OutputFormat::Pdf);
    let render_start = Instant::now();
    RenderLoop::shared()?
        .render_pdf(factory, html, config.page, pdf_path.clone())
        .await?;
    debug!("Rendered PDF in {}ms", render_start.elapsed().as_millis());

    finish(pdf_path, input_format, OutputFormat::Pdf, started).await
}

/// Convert and move the produced file to `dest`.
pub async fn convert_to_file(
    input: ConversionInput,
    output: OutputFormat,
    dest: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    let produced = convert(input, output, config).await?;
    let dest = dest.as_ref();
    move_file(&produced.path, dest).await?;
    Ok(ConversionOutput {
        path: dest.to_path_buf(),
        ..produced
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn convert_sync(
    input: ConversionInput,
    output: OutputFormat,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    runtime()?.block_on(convert(input, output, config))
}

/// Synchronous wrapper around [`convert_to_pdf`].
pub fn convert_to_pdf_sync(
    input: ConversionInput,
    css: Option<&str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ConversionError> {
    runtime()?.block_on(convert_to_pdf(input, css, config))
}

fn runtime() -> Result<tokio::runtime::Runtime, ConversionError> {
    tokio::runtime::Runtime::new().map_err(|e| {
        ConversionError::process_failed(-1, format!("Failed to create tokio runtime: {e}"))
    })
}

/// Convert several inputs to the same format.
///
/// Up to `config.concurrency` conversions run at once. One input failing
/// does not affect the others; results come back in input order.
pub async fn convert_batch(
    inputs: Vec<ConversionInput>,
    output: OutputFormat,
    css: Option<&str>,
    config: &ConversionConfig,
) -> BatchOutput {
    let started = Instant::now();
    let total = inputs.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    let mut results: Vec<JobResult> = stream::iter(
        inputs
            .into_iter()
            .enumerate()
            .map(|(i, input)| run_job(i + 1, total, input, output, css, config)),
    )
    .buffer_unordered(config.concurrency)
    .collect()
    .await;
    results.sort_by_key(|r| r.index);

    let stats = BatchStats::from_results(&results, started.elapsed().as_millis() as u64);
    info!(
        "Batch complete: {}/{} succeeded in {}ms",
        stats.succeeded, stats.total, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total, stats.succeeded);
    }

    BatchOutput { results, stats }
}

/// One batch job, with progress events.
pub(crate) async fn run_job(
    index: usize,
    total: usize,
    input: ConversionInput,
    output: OutputFormat,
    css: Option<&str>,
    config: &ConversionConfig,
) -> JobResult {
    if let Some(ref cb) = config.progress_callback {
        cb.on_input_start(index, total);
    }
    let description = input.describe();
    let result = if output == OutputFormat::Pdf {
        convert_to_pdf(input, css, config).await
    } else {
        convert(input, output, config).await
    };
    if let Some(ref cb) = config.progress_callback {
        match &result {
            Ok(out) => cb.on_input_complete(index, total, out.size_bytes),
            Err(e) => cb.on_input_error(index, total, &e.to_string()),
        }
    }
    if let Err(e) = &result {
        warn!("Input {}/{} ({}) failed: {}", index, total, description, e);
    }
    JobResult {
        index,
        input: description,
        result,
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Per-call environment. Directories and the library search path are set up
/// on first use, after the input has passed its size check.
struct Session<'a> {
    config: &'a ConversionConfig,
    search_path: OnceCell<LibrarySearchPath>,
}

impl<'a> Session<'a> {
    fn new(config: &'a ConversionConfig) -> Self {
        Self {
            config,
            search_path: OnceCell::new(),
        }
    }

    async fn ensure_dirs(&self) -> Result<(), ConversionError> {
        for dir in [&self.config.scratch_dir, &self.config.output_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ConversionError::process_failed(-1, format!("Cannot create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    fn search_path(&self) -> Result<&LibrarySearchPath, ConversionError> {
        self.search_path
            .get_or_try_init(|| self.config.library_path.prepare())
            .map_err(ConversionError::from)
    }

    fn exec_options(&self) -> Result<ExecOptions<'_>, ConversionError> {
        Ok(ExecOptions {
            working_dir: &self.config.scratch_dir,
            timeout: self.config.process_timeout(),
            search_path: self.search_path()?,
        })
    }

    /// A fresh, collision-free output path.
    fn output_path(&self, format: OutputFormat) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}.{}", uuid::Uuid::new_v4(), format.extension()))
    }

    /// Run the conversion engine and return the produced file.
    async fn run_engine(&self, input: ConversionInput, output: OutputFormat) -> Result<PathBuf, ConversionError> {
        let format = input.format();
        if format.reader_flag().is_none() {
            return Err(ConversionError::unsupported(format.name()));
        }

        let resolved = input::resolve(input.into_source(), self.config).await?;
        self.ensure_dirs().await?;
        let engine = locate_engine(&PANDOC, self.config.engine_path.as_deref())?;
        let out_path = self.output_path(output);

        // PDF reaches the engine as extracted HTML on stdin. Everything else
        // is either a staged file or a buffer.
        let (stdin, staged) = if format == InputFormat::Pdf {
            let pdftohtml = locate_optional(&PDFTOHTML, self.config.pdftohtml_path.as_deref(), "pdf")?;
            let pdf = resolved.into_file(self.config).await?;
            let html = pdf_to_html(&pdftohtml, pdf.path(), self.exec_options()?).await?;
            (Some(html.into_bytes()), None)
        } else {
            match resolved {
                ResolvedInput::Buffer(bytes) => (Some(bytes), None),
                file @ ResolvedInput::File(_) => (None, Some(file)),
            }
        };

        let cmd = build_command(
            &engine,
            format,
            output,
            staged.as_ref().and_then(ResolvedInput::path),
            &out_path,
        )?;
        exec::run_engine(&cmd, stdin, &out_path, self.exec_options()?).await?;
        Ok(out_path)
    }

    /// Resolve the rendering surface, from most-specific to least-specific:
    ///
    /// 1. **Pre-built factory** (`config.surface_factory`), used as-is.
    /// 2. **Browser path** (`config.browser_path`), which must exist.
    /// 3. **`DOCSHIFT_BROWSER`** environment variable.
    /// 4. **Auto-detection** of Chromium-family executables on `PATH`.
    fn surface_factory(&self) -> Result<Arc<dyn SurfaceFactory>, ConversionError> {
        if let Some(ref factory) = self.config.surface_factory {
            return Ok(Arc::clone(factory));
        }
        let browser = locate_optional(&BROWSER, self.config.browser_path.as_deref(), "pdf")?;
        debug!("Rendering with {}", browser.display());
        let factory = ChromiumFactory::new(
            browser,
            self.config.scratch_dir.clone(),
            self.config.process_timeout(),
            self.search_path()?.clone(),
        )?;
        Ok(Arc::new(factory))
    }
}

/// Locate an engine that only some formats need. Its absence makes those
/// formats unsupported rather than being an engine failure.
fn locate_optional(
    spec: &engine_locate::EngineSpec,
    explicit: Option<&Path>,
    format: &str,
) -> Result<PathBuf, ConversionError> {
    locate_engine(spec, explicit).map_err(|e| match e {
        LocateError::NotFound { .. } => {
            warn!("{}; {} conversions are unavailable", e, format);
            ConversionError::unsupported(format)
        }
        other => other.into(),
    })
}

/// Removes the engine's intermediate HTML on drop, including on error and
/// cancellation.
struct IntermediateFile(PathBuf);

impl Drop for IntermediateFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            warn!("Failed to remove intermediate {}: {}", self.0.display(), e);
        }
    }
}

async fn finish(
    path: PathBuf,
    input_format: InputFormat,
    output_format: OutputFormat,
    started: Instant,
) -> Result<ConversionOutput, ConversionError> {
    let size_bytes = tokio::fs::metadata(&path)
        .await
        .map(|m| m.len())
        .map_err(|e| ConversionError::process_failed(-1, format!("Cannot stat output: {e}")))?;
    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Produced {} ({} bytes) in {}ms",
        path.display(),
        size_bytes,
        duration_ms
    );
    Ok(ConversionOutput {
        path,
        input_format,
        output_format,
        size_bytes,
        duration_ms,
    })
}

async fn move_file(from: &Path, to: &Path) -> Result<(), ConversionError> {
    let io_err = |e: std::io::Error| {
        ConversionError::process_failed(-1, format!("Failed to write '{}': {e}", to.display()))
    };
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    // Cross-device: copy, then drop the original.
    tokio::fs::copy(from, to).await.map_err(io_err)?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        warn!("Failed to remove {} after copy: {}", from.display(), e);
    }
    Ok(())
}
