//! # docshift
//!
//! Convert documents between formats by driving Pandoc, with a PDF path that
//! prints styled HTML through a headless browser.
//!
//! ## Why this crate?
//!
//! Pandoc reads and writes almost everything, but calling it well from a
//! service means detecting formats, bounding input size, enforcing deadlines,
//! capturing diagnostics and cleaning up temp files. PDF needs two more
//! engines: `pdftohtml` to read it and a browser to print it. This crate wraps
//! all of that behind one async call with a single closed error type.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input (bytes / path / URL)
//!  │
//!  ├─ 1. Detect   MIME type → file extension → content sniffing
//!  ├─ 2. Resolve  size check, stage in scratch dir, download URLs
//!  ├─ 3. Engine   pandoc -f <reader> -t <writer> (PDF in via pdftohtml)
//!  └─ 4. Output   unique file in the output dir + stats
//!
//! PDF output:  engine HTML → CSS template → render surface → print to PDF
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docshift::{convert, ConversionConfig, ConversionInput, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let input = ConversionInput::detect_path("notes.md");
//!     let output = convert(input, OutputFormat::Docx, &config).await?;
//!     println!("{} ({} bytes)", output.path.display(), output.size_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Engines
//!
//! | Engine | Needed for | Override |
//! |--------|------------|----------|
//! | `pandoc` | every text conversion | `DOCSHIFT_PANDOC` |
//! | `pdftohtml` | PDF input | `DOCSHIFT_PDFTOHTML` |
//! | Chromium / Chrome | PDF output | `DOCSHIFT_BROWSER` |
//!
//! A missing optional engine makes only its formats unsupported.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docshift` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docshift = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::CacheManager;
pub use config::{ConversionConfig, ConversionConfigBuilder, PageAttributes, PageSize};
pub use convert::{convert, convert_batch, convert_sync, convert_to_file, convert_to_pdf, convert_to_pdf_sync};
pub use error::{describe_exit_code, ConversionError};
pub use format::{InputFormat, OutputFormat};
pub use output::{BatchOutput, BatchStats, ConversionOutput, JobResult};
pub use pipeline::detect::detect;
pub use pipeline::input::{extract_url, is_bare_url, is_url, ContentRef, ConversionInput, InputSource};
pub use pipeline::render::{ChromiumFactory, LoadFailure, LoadSettings, RenderLoop, RenderSurface, SurfaceFactory};
pub use pipeline::style::{inject_css, Template};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, JobStream};

pub use engine_locate::{BundledLibraries, LibraryPathStrategy, SonameLink};
