//! # engine-locate
//!
//! Find the external engines a document converter shells out to (pandoc,
//! pdftohtml, a headless browser) and prepare the dynamic-library search path
//! they need, so callers no longer hard-code install locations or export
//! `LD_LIBRARY_PATH` / `DYLD_LIBRARY_PATH` by hand.
//!
//! ## How it works
//!
//! [`locate_engine`] resolves a binary in this order (first match wins):
//!
//! 1. An explicit path supplied by the caller (it must exist).
//! 2. The engine's environment override, e.g. `DOCSHIFT_PANDOC`.
//! 3. Each candidate executable name, searched on `PATH`.
//!
//! [`LibraryPathStrategy`] decides which directories are prepended to the
//! platform's library search variable when the engine is launched:
//!
//! - [`LibraryPathStrategy::System`]: nothing; the OS loader finds
//!   installed libraries on its own.
//! - [`LibraryPathStrategy::Bundled`]: a directory of shipped shared
//!   libraries plus a private *shim* directory of symlinks. Some packaged
//!   binaries are linked against version-suffixed sonames (`libz.so.1`)
//!   while the bundle ships unsuffixed files (`libz.so`); the shim maps one
//!   to the other.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use engine_locate::{locate_engine, BundledLibraries, LibraryPathStrategy, PANDOC};
//!
//! let pandoc = locate_engine(&PANDOC, None).expect("pandoc not installed");
//!
//! let strategy = LibraryPathStrategy::Bundled(BundledLibraries::new("/opt/docshift/lib"));
//! let search_path = strategy.prepare().expect("shim setup failed");
//! if let Some(value) = search_path.env_value().expect("bad path") {
//!     println!("{}={:?} {}", engine_locate::LibrarySearchPath::env_var(), value, pandoc.display());
//! }
//! ```
//!
//! ## Environment variable overrides
//!
//! - `DOCSHIFT_PANDOC`, `DOCSHIFT_PDFTOHTML`, `DOCSHIFT_BROWSER`: engine paths.
//! - `DOCSHIFT_SHIM_DIR`: override the default shim directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;

// ── Known engines ────────────────────────────────────────────────────────────

/// How to find one external engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSpec {
    /// Human-readable engine name used in errors.
    pub name: &'static str,
    /// Environment variable holding an explicit path.
    pub env_var: &'static str,
    /// Executable names tried on `PATH`, in order.
    pub candidates: &'static [&'static str],
}

/// The document-conversion engine.
pub const PANDOC: EngineSpec = EngineSpec {
    name: "pandoc",
    env_var: "DOCSHIFT_PANDOC",
    candidates: &["pandoc"],
};

/// The PDF text/HTML extraction engine (poppler-utils).
pub const PDFTOHTML: EngineSpec = EngineSpec {
    name: "pdftohtml",
    env_var: "DOCSHIFT_PDFTOHTML",
    candidates: &["pdftohtml"],
};

/// A Chromium-family browser able to print HTML to PDF headlessly.
pub const BROWSER: EngineSpec = EngineSpec {
    name: "headless browser",
    env_var: "DOCSHIFT_BROWSER",
    candidates: &[
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
        "chrome",
    ],
};

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by engine-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// No executable was found for the engine.
    #[error("{engine} not found (searched: {})", searched.join(", "))]
    NotFound {
        engine: String,
        searched: Vec<String>,
    },

    /// Could not create the shim directory.
    #[error("Shim directory error: {0}")]
    ShimDir(#[source] std::io::Error),

    /// Could not create one shim symlink.
    #[error("Failed to link '{link}' -> '{target}': {source}")]
    Symlink {
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory cannot be placed in a search-path variable
    /// (for example it contains the platform separator).
    #[error("Invalid library search path: {0}")]
    InvalidPath(String),
}

// ── Engine discovery ─────────────────────────────────────────────────────────

/// Resolve the executable for `spec`.
///
/// An `explicit` path is authoritative: if it does not exist the lookup fails
/// rather than silently picking a different binary. An environment override
/// that points nowhere is skipped and the `PATH` search continues.
pub fn locate_engine(spec: &EngineSpec, explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    let mut searched = Vec::new();

    // 1. Caller-supplied path.
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(LocateError::NotFound {
            engine: spec.name.to_string(),
            searched: vec![path.display().to_string()],
        });
    }

    // 2. Environment variable override.
    if let Some(value) = std::env::var_os(spec.env_var) {
        let p = PathBuf::from(&value);
        if p.is_file() {
            return Ok(p);
        }
        searched.push(format!("${}={}", spec.env_var, p.display()));
    }

    // 3. PATH search.
    let path_dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|v| std::env::split_paths(&v).collect())
        .unwrap_or_default();
    for name in spec.candidates {
        if let Some(found) = find_in_dirs(name, &path_dirs) {
            return Ok(found);
        }
        searched.push(format!("{name} on PATH"));
    }

    Err(LocateError::NotFound {
        engine: spec.name.to_string(),
        searched,
    })
}

/// Returns `true` when [`locate_engine`] would succeed without an explicit path.
pub fn is_engine_available(spec: &EngineSpec) -> bool {
    locate_engine(spec, None).is_ok()
}

/// Search `dirs` in order for an executable called `name`.
pub fn find_in_dirs(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| executable_names(name).into_iter().map(move |n| dir.join(n)))
        .find(|candidate| is_executable(candidate))
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(name).extension().is_none() {
        vec![format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Library search path ──────────────────────────────────────────────────────

/// One shim entry: `link_name` (the soname the binary asks for) resolves to
/// `target_name` inside the bundled library directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SonameLink {
    pub link_name: String,
    pub target_name: String,
}

impl SonameLink {
    pub fn new(link_name: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            link_name: link_name.into(),
            target_name: target_name.into(),
        }
    }
}

/// A directory of shipped shared libraries and the shim that adapts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledLibraries {
    /// Directory holding the packaged (unsuffixed) libraries.
    pub native_lib_dir: PathBuf,
    /// Private directory where soname symlinks are materialised.
    pub shim_dir: PathBuf,
    /// Links to create on first use.
    pub links: Vec<SonameLink>,
}

impl BundledLibraries {
    /// Bundle rooted at `native_lib_dir` with the default shim directory and
    /// the links a statically packaged pandoc needs.
    pub fn new(native_lib_dir: impl Into<PathBuf>) -> Self {
        Self {
            native_lib_dir: native_lib_dir.into(),
            shim_dir: default_shim_dir(),
            links: vec![
                SonameLink::new("libz.so.1", "libz.so"),
                SonameLink::new("liblua5.4.so.5.4", "liblua5.4.so"),
            ],
        }
    }

    pub fn with_shim_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shim_dir = dir.into();
        self
    }

    pub fn with_links(mut self, links: Vec<SonameLink>) -> Self {
        self.links = links;
        self
    }

    /// Create every shim link whose target exists.
    ///
    /// Safe to call concurrently from several processes or threads: an
    /// existing link (even one created by a racing caller) counts as done.
    pub fn materialize_shim(&self) -> Result<(), LocateError> {
        std::fs::create_dir_all(&self.shim_dir).map_err(LocateError::ShimDir)?;

        for link in &self.links {
            let link_path = self.shim_dir.join(&link.link_name);
            let target = self.native_lib_dir.join(&link.target_name);

            if !target.exists() || link_path.symlink_metadata().is_ok() {
                continue;
            }

            match create_link(&target, &link_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(LocateError::Symlink {
                        link: link_path,
                        target,
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

// Windows resolves DLLs by file name only; versioned sonames never occur there.
#[cfg(not(unix))]
fn create_link(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Returns the default shim directory.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/docshift/lib/`
/// - **Linux**: `~/.cache/docshift/lib/`
/// - **Windows**: `%LOCALAPPDATA%\docshift\lib\`
///
/// Override by setting `DOCSHIFT_SHIM_DIR`.
pub fn default_shim_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("DOCSHIFT_SHIM_DIR") {
        return PathBuf::from(dir);
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("docshift").join("lib")
}

/// How the engine's library search path is set up before launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LibraryPathStrategy {
    /// Ordinary discovery: leave the loader's search path alone.
    #[default]
    System,
    /// Prepend a bundled library directory and its soname shim.
    Bundled(BundledLibraries),
}

impl LibraryPathStrategy {
    /// Perform any one-time setup and return the directories to prepend.
    pub fn prepare(&self) -> Result<LibrarySearchPath, LocateError> {
        match self {
            LibraryPathStrategy::System => Ok(LibrarySearchPath::default()),
            LibraryPathStrategy::Bundled(bundle) => {
                bundle.materialize_shim()?;
                Ok(LibrarySearchPath {
                    dirs: vec![bundle.shim_dir.clone(), bundle.native_lib_dir.clone()],
                })
            }
        }
    }
}

/// Directories to prepend to the platform library search variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibrarySearchPath {
    dirs: Vec<PathBuf>,
}

impl LibrarySearchPath {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Name of the loader's search variable on this platform.
    pub fn env_var() -> &'static str {
        if cfg!(target_os = "macos") {
            "DYLD_LIBRARY_PATH"
        } else if cfg!(windows) {
            "PATH"
        } else {
            "LD_LIBRARY_PATH"
        }
    }

    /// The value to set for [`Self::env_var`]: our directories first, then
    /// whatever the current process already has. `None` when there is nothing
    /// to prepend.
    pub fn env_value(&self) -> Result<Option<OsString>, LocateError> {
        if self.dirs.is_empty() {
            return Ok(None);
        }
        let existing: Vec<PathBuf> = std::env::var_os(Self::env_var())
            .map(|v| std::env::split_paths(&v).collect())
            .unwrap_or_default();
        self.join_with(&existing).map(Some)
    }

    fn join_with(&self, existing: &[PathBuf]) -> Result<OsString, LocateError> {
        std::env::join_paths(self.dirs.iter().chain(existing.iter()))
            .map_err(|e| LocateError::InvalidPath(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
