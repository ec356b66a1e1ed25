//! Configuration types for document conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct carries every knob, so a
//! config can be cloned into worker tasks and logged as a whole.

use crate::error::ConversionError;
use crate::pipeline::render::SurfaceFactory;
use crate::progress::ProgressCallback;
use engine_locate::LibraryPathStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default input size cap in bytes.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 10_000_000;
/// Default per-subprocess timeout.
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 30;
/// Default URL download timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 15;

/// Configuration for a conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use docshift::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .engine_path("/usr/local/bin/pandoc")
///     .process_timeout_secs(60)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Conversion engine binary. If None, discovered via `DOCSHIFT_PANDOC`
    /// then `pandoc` on `PATH`.
    pub engine_path: Option<PathBuf>,

    /// PDF extraction binary. If None, discovered via `DOCSHIFT_PDFTOHTML`
    /// then `pdftohtml` on `PATH`. Only needed for PDF inputs.
    pub pdftohtml_path: Option<PathBuf>,

    /// Headless browser used for PDF output. If None, discovered via
    /// `DOCSHIFT_BROWSER` then common Chromium names on `PATH`.
    pub browser_path: Option<PathBuf>,

    /// Pre-built rendering surface factory. Takes precedence over `browser_path`.
    pub surface_factory: Option<Arc<dyn SurfaceFactory>>,

    /// How the engines' shared-library search path is set up. Default: System.
    pub library_path: LibraryPathStrategy,

    /// Working directory for engines and home of temporary input copies.
    /// Default: `<tmp>/docshift`.
    pub scratch_dir: PathBuf,

    /// Where produced files are written. Default: `<scratch_dir>/converted`.
    ///
    /// docshift never deletes a file it produced; see
    /// [`crate::cache::CacheManager`] for housekeeping.
    pub output_dir: PathBuf,

    /// Maximum input size in bytes. Default: 10 000 000.
    pub max_input_bytes: u64,

    /// Per-subprocess wall-clock limit in seconds. Default: 30.
    pub process_timeout_secs: u64,

    /// URL download timeout in seconds. Default: 15.
    pub download_timeout_secs: u64,

    /// Parallel jobs in batch mode. Default: 4.
    pub concurrency: usize,

    /// Print attributes for PDF output. Default: A4, no margins.
    pub page: PageAttributes,

    /// Progress callback for batch conversion.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        let scratch_dir = default_scratch_dir();
        Self {
            engine_path: None,
            pdftohtml_path: None,
            browser_path: None,
            surface_factory: None,
            library_path: LibraryPathStrategy::System,
            output_dir: scratch_dir.join("converted"),
            scratch_dir,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            concurrency: 4,
            page: PageAttributes::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("engine_path", &self.engine_path)
            .field("pdftohtml_path", &self.pdftohtml_path)
            .field("browser_path", &self.browser_path)
            .field(
                "surface_factory",
                &self.surface_factory.as_ref().map(|_| "<dyn SurfaceFactory>"),
            )
            .field("library_path", &self.library_path)
            .field("scratch_dir", &self.scratch_dir)
            .field("output_dir", &self.output_dir)
            .field("max_input_bytes", &self.max_input_bytes)
            .field("process_timeout_secs", &self.process_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("page", &self.page)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
            output_dir_set: false,
        }
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("docshift")
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
    output_dir_set: bool,
}

impl ConversionConfigBuilder {
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_path = Some(path.into());
        self
    }

    pub fn pdftohtml_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftohtml_path = Some(path.into());
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn surface_factory(mut self, factory: Arc<dyn SurfaceFactory>) -> Self {
        self.config.surface_factory = Some(factory);
        self
    }

    pub fn library_path(mut self, strategy: LibraryPathStrategy) -> Self {
        self.config.library_path = strategy;
        self
    }

    /// Set the scratch directory. Unless [`Self::output_dir`] is also called,
    /// the output directory moves with it.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        if !self.output_dir_set {
            self.config.output_dir = self.config.scratch_dir.join("converted");
        }
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self.output_dir_set = true;
        self
    }

    pub fn max_input_bytes(mut self, n: u64) -> Self {
        self.config.max_input_bytes = n;
        self
    }

    pub fn process_timeout_secs(mut self, secs: u64) -> Self {
        self.config.process_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page(mut self, page: PageAttributes) -> Self {
        self.config.page = page;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConversionError> {
        let c = &self.config;
        if c.max_input_bytes == 0 {
            return Err(ConversionError::input(
                "Invalid configuration: max_input_bytes must be > 0",
            ));
        }
        if c.process_timeout_secs == 0 {
            return Err(ConversionError::input(
                "Invalid configuration: process_timeout_secs must be > 0",
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(ConversionError::input(
                "Invalid configuration: download_timeout_secs must be > 0",
            ));
        }
        let shortest_side = c.page.size.width_mm().min(c.page.size.height_mm());
        if c.page.margin_mm < 0.0 || c.page.margin_mm * 2.0 >= shortest_side {
            return Err(ConversionError::input(format!(
                "Invalid configuration: page margin {}mm does not fit the page",
                c.page.margin_mm
            )));
        }
        Ok(self.config)
    }
}

// ── Page attributes ──────────────────────────────────────────────────────

/// Paper size for PDF output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// 210 × 297 mm. (default)
    #[default]
    A4,
    /// 215.9 × 279.4 mm.
    Letter,
    /// Arbitrary size in millimetres.
    Custom { width_mm: f32, height_mm: f32 },
}

impl PageSize {
    pub fn width_mm(self) -> f32 {
        match self {
            PageSize::A4 => 210.0,
            PageSize::Letter => 215.9,
            PageSize::Custom { width_mm, .. } => width_mm,
        }
    }

    pub fn height_mm(self) -> f32 {
        match self {
            PageSize::A4 => 297.0,
            PageSize::Letter => 279.4,
            PageSize::Custom { height_mm, .. } => height_mm,
        }
    }

    /// Value for a CSS `@page { size: ... }` declaration.
    pub fn css_size(self) -> String {
        match self {
            PageSize::A4 => "A4".to_string(),
            PageSize::Letter => "letter".to_string(),
            PageSize::Custom { width_mm, height_mm } => format!("{width_mm}mm {height_mm}mm"),
        }
    }
}

/// Print attributes applied during the layout phase of PDF output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageAttributes {
    pub size: PageSize,
    /// Uniform margin on every side. Default: 0.
    pub margin_mm: f32,
}
