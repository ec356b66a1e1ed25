//! HTML → PDF rendering.
//!
//! A [`RenderSurface`] is a callback-driven, single-threaded page renderer:
//! load HTML, lay it out for print, write the PDF. Surfaces are not `Send`.
//! Every surface is created and driven on one dedicated render-loop thread,
//! which owns all live surfaces and reacts to their completion callbacks.
//!
//! ```text
//!  async caller                  render-loop thread
//!  ────────────                  ──────────────────
//!  Start{id} ───────────────────▶ factory.create() → load_html(cb)
//!                                 Loaded{id}  ──▶ layout(cb)
//!                                 LaidOut{id} ──▶ write(cb)
//!  oneshot ◀───────────────────── Written{id} ──▶ reply, drop surface
//!  (dropped) ── Cancel{id} ─────▶ surface.cancel(), drop surface
//! ```
//!
//! The caller awaits a `oneshot` receiver, so it resumes at most once. The
//! job is removed from the loop's table on its first terminal event; any
//! late callback for that id finds nothing and is ignored. Dropping the
//! awaiting future sends `Cancel`, which tears the surface down.
//!
//! The default surface drives a headless Chromium ([`ChromiumFactory`]).

use crate::config::PageAttributes;
use crate::error::ConversionError;
use crate::pipeline::command::EngineCommand;
use crate::pipeline::exec::{self, ExecOptions};
use crate::pipeline::style::inject_css;
use engine_locate::LibrarySearchPath;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

// ── Surface contract ─────────────────────────────────────────────────────

/// Options for loading a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSettings {
    /// Converted documents are untrusted; the pipeline always passes `false`.
    pub javascript_enabled: bool,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            javascript_enabled: false,
        }
    }
}

/// A failed page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub code: i32,
    pub description: String,
}

pub type LoadCallback = Box<dyn FnOnce(Result<(), LoadFailure>) + Send>;
pub type LayoutCallback = Box<dyn FnOnce(Result<(), String>) + Send>;
/// Write failures are already typed, so a browser timeout stays retryable.
pub type WriteCallback = Box<dyn FnOnce(Result<(), ConversionError>) + Send>;

/// A single-threaded renderer able to print a loaded page to PDF.
///
/// Each phase reports completion through its callback, which may be invoked
/// synchronously or later from any thread. Each callback fires at most once.
pub trait RenderSurface {
    fn load_html(&mut self, html: &str, settings: LoadSettings, done: LoadCallback);

    fn layout(&mut self, page: &PageAttributes, done: LayoutCallback);

    fn write(&mut self, dest: &Path, done: WriteCallback);

    /// Abandon any in-flight work. The surface is dropped right after.
    fn cancel(&mut self);
}

/// Creates surfaces. Called on the render-loop thread.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn RenderSurface>, ConversionError>;
}

// ── Render loop ──────────────────────────────────────────────────────────

enum RenderEvent {
    Start {
        id: u64,
        factory: Arc<dyn SurfaceFactory>,
        html: String,
        page: PageAttributes,
        dest: PathBuf,
        reply: oneshot::Sender<Result<(), ConversionError>>,
    },
    Loaded {
        id: u64,
        result: Result<(), LoadFailure>,
    },
    LaidOut {
        id: u64,
        result: Result<(), String>,
    },
    Written {
        id: u64,
        result: Result<(), ConversionError>,
    },
    Cancel {
        id: u64,
    },
}

struct ActiveJob {
    surface: Box<dyn RenderSurface>,
    page: PageAttributes,
    dest: PathBuf,
    reply: oneshot::Sender<Result<(), ConversionError>>,
}

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);
static SHARED_LOOP: Mutex<Option<RenderLoop>> = Mutex::new(None);

/// Handle to a render-loop thread.
#[derive(Clone)]
pub struct RenderLoop {
    tx: mpsc::Sender<RenderEvent>,
}

impl RenderLoop {
    /// Start a new render-loop thread.
    pub fn spawn() -> Result<Self, ConversionError> {
        let (tx, rx) = mpsc::channel();
        let loop_tx = tx.clone();
        std::thread::Builder::new()
            .name("docshift-render".into())
            .spawn(move || run_loop(rx, loop_tx))
            .map_err(|e| ConversionError::process_failed(-1, format!("Cannot start render thread: {e}")))?;
        Ok(Self { tx })
    }

    /// The process-wide render loop, started on first use.
    pub fn shared() -> Result<Self, ConversionError> {
        let mut slot = SHARED_LOOP.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        let fresh = Self::spawn()?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }

    /// Load `html` into a new surface and print it to `dest`.
    ///
    /// Cancel-safe: dropping the returned future cancels the surface.
    pub async fn render_pdf(
        &self,
        factory: Arc<dyn SurfaceFactory>,
        html: String,
        page: PageAttributes,
        dest: PathBuf,
    ) -> Result<(), ConversionError> {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let (reply, reply_rx) = oneshot::channel();

        self.tx
            .send(RenderEvent::Start {
                id,
                factory,
                html,
                page,
                dest,
                reply,
            })
            .map_err(|_| {
                forget_shared_loop();
                ConversionError::process_failed(-1, "Render loop has stopped")
            })?;

        let mut guard = CancelGuard {
            id,
            tx: self.tx.clone(),
            armed: true,
        };
        let result = reply_rx.await.unwrap_or_else(|_| {
            Err(ConversionError::process_failed(
                -1,
                "Render surface was torn down before finishing",
            ))
        });
        guard.armed = false;
        result
    }
}

// A dead loop (a surface panicked) must not poison every later conversion.
fn forget_shared_loop() {
    let mut slot = SHARED_LOOP.lock().unwrap_or_else(|p| p.into_inner());
    *slot = None;
}

struct CancelGuard {
    id: u64,
    tx: mpsc::Sender<RenderEvent>,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!(job = self.id, "render job cancelled");
            let _ = self.tx.send(RenderEvent::Cancel { id: self.id });
        }
    }
}

fn run_loop(rx: mpsc::Receiver<RenderEvent>, tx: mpsc::Sender<RenderEvent>) {
    let mut jobs: HashMap<u64, ActiveJob> = HashMap::new();

    while let Ok(event) = rx.recv() {
        match event {
            RenderEvent::Start {
                id,
                factory,
                html,
                page,
                dest,
                reply,
            } => {
                let surface = match factory.create() {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        continue;
                    }
                };
                let job = jobs.entry(id).or_insert(ActiveJob {
                    surface,
                    page,
                    dest,
                    reply,
                });
                let tx = tx.clone();
                job.surface.load_html(
                    &html,
                    LoadSettings::default(),
                    Box::new(move |result| {
                        let _ = tx.send(RenderEvent::Loaded { id, result });
                    }),
                );
            }

            RenderEvent::Loaded { id, result } => match result {
                Ok(()) => {
                    if let Some(job) = jobs.get_mut(&id) {
                        let tx = tx.clone();
                        let page = job.page;
                        job.surface.layout(
                            &page,
                            Box::new(move |result| {
                                let _ = tx.send(RenderEvent::LaidOut { id, result });
                            }),
                        );
                    }
                }
                Err(f) => finish(&mut jobs, id, Err(ConversionError::process_failed(f.code, f.description))),
            },

            RenderEvent::LaidOut { id, result } => match result {
                Ok(()) => {
                    if let Some(job) = jobs.get_mut(&id) {
                        let tx = tx.clone();
                        let dest = job.dest.clone();
                        job.surface.write(
                            &dest,
                            Box::new(move |result| {
                                let _ = tx.send(RenderEvent::Written { id, result });
                            }),
                        );
                    }
                }
                Err(msg) => finish(&mut jobs, id, Err(ConversionError::process_failed(-1, msg))),
            },

            RenderEvent::Written { id, result } => finish(&mut jobs, id, result),

            RenderEvent::Cancel { id } => {
                if let Some(mut job) = jobs.remove(&id) {
                    job.surface.cancel();
                }
            }
        }
    }
}

fn finish(jobs: &mut HashMap<u64, ActiveJob>, id: u64, result: Result<(), ConversionError>) {
    if let Some(ActiveJob { surface, reply, .. }) = jobs.remove(&id) {
        if let Err(e) = &result {
            debug!(job = id, error = %e, "render job failed");
        }
        // Tear down before resuming the caller so its scratch files are gone.
        drop(surface);
        let _ = reply.send(result);
    }
}

// ── Headless Chromium ────────────────────────────────────────────────────

/// Extra browser flags, whitespace-separated (e.g. `--no-sandbox` in containers).
pub const BROWSER_ARGS_ENV: &str = "DOCSHIFT_BROWSER_ARGS";

/// Surfaces backed by a headless Chromium-family browser.
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    browser: PathBuf,
    scratch_dir: PathBuf,
    timeout: Duration,
    search_path: LibrarySearchPath,
    extra_args: Vec<String>,
    runtime: tokio::runtime::Handle,
}

impl ChromiumFactory {
    /// Must be called from within a Tokio runtime; the browser process is
    /// supervised on it.
    pub fn new(
        browser: PathBuf,
        scratch_dir: PathBuf,
        timeout: Duration,
        search_path: LibrarySearchPath,
    ) -> Result<Self, ConversionError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ConversionError::process_failed(-1, format!("No async runtime for the browser: {e}"))
        })?;
        let extra_args = std::env::var(BROWSER_ARGS_ENV)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Ok(Self {
            browser,
            scratch_dir,
            timeout,
            search_path,
            extra_args,
            runtime,
        })
    }
}

impl SurfaceFactory for ChromiumFactory {
    fn create(&self) -> Result<Box<dyn RenderSurface>, ConversionError> {
        Ok(Box::new(ChromiumSurface {
            factory: self.clone(),
            html: String::new(),
            javascript_enabled: false,
            staged: None,
            task: None,
        }))
    }
}

struct ChromiumSurface {
    factory: ChromiumFactory,
    html: String,
    javascript_enabled: bool,
    staged: Option<PathBuf>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ChromiumSurface {
    fn stage(&mut self, html: &str) -> std::io::Result<PathBuf> {
        let path = match &self.staged {
            Some(p) => p.clone(),
            None => {
                std::fs::create_dir_all(&self.factory.scratch_dir)?;
                let dir = std::path::absolute(&self.factory.scratch_dir)?;
                let p = dir.join(format!("{}.html", uuid::Uuid::new_v4()));
                self.staged = Some(p.clone());
                p
            }
        };
        std::fs::write(&path, html)?;
        Ok(path)
    }

    fn command(&self, staged: &Path, dest: &Path) -> Result<EngineCommand, String> {
        let url = reqwest::Url::from_file_path(staged)
            .map_err(|_| format!("Cannot build file URL for {}", staged.display()))?;
        let dest = std::path::absolute(dest).map_err(|e| e.to_string())?;

        let mut args: Vec<OsString> = vec!["--headless".into(), "--disable-gpu".into()];
        if !self.javascript_enabled {
            args.push("--blink-settings=scriptEnabled=false".into());
        }
        args.push("--no-pdf-header-footer".into());
        args.extend(self.factory.extra_args.iter().map(OsString::from));
        let mut print_to = OsString::from("--print-to-pdf=");
        print_to.push(dest.as_os_str());
        args.push(print_to);
        args.push(url.as_str().into());

        Ok(EngineCommand {
            program: self.factory.browser.clone(),
            args,
        })
    }

    fn remove_staged(&mut self) {
        if let Some(path) = self.staged.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove staged HTML {}: {}", path.display(), e);
            }
        }
    }
}

impl RenderSurface for ChromiumSurface {
    fn load_html(&mut self, html: &str, settings: LoadSettings, done: LoadCallback) {
        self.javascript_enabled = settings.javascript_enabled;
        self.html = html.to_string();
        let result = self.stage(html).map(|_| ()).map_err(|e| LoadFailure {
            code: -1,
            description: format!("Failed to stage HTML for rendering: {e}"),
        });
        done(result);
    }

    fn layout(&mut self, page: &PageAttributes, done: LayoutCallback) {
        let rule = format!(
            "@page {{ size: {}; margin: {}mm; }}",
            page.size.css_size(),
            page.margin_mm
        );
        let laid_out = inject_css(&self.html, &rule);
        done(self.stage(&laid_out).map(|_| ()).map_err(|e| format!("Layout failed: {e}")));
    }

    fn write(&mut self, dest: &Path, done: WriteCallback) {
        let Some(staged) = self.staged.clone() else {
            done(Err(ConversionError::process_failed(-1, "Nothing loaded")));
            return;
        };
        let cmd = match self.command(&staged, dest) {
            Ok(c) => c,
            Err(msg) => {
                done(Err(ConversionError::process_failed(-1, msg)));
                return;
            }
        };

        let dest = dest.to_path_buf();
        let working_dir = self.factory.scratch_dir.clone();
        let timeout = self.factory.timeout;
        let search_path = self.factory.search_path.clone();

        self.task = Some(self.factory.runtime.spawn(async move {
            let opts = ExecOptions {
                working_dir: &working_dir,
                timeout,
                search_path: &search_path,
            };
            let result = match exec::run(&cmd, None, opts).await {
                Ok(out) if out.exit_code != 0 => Err(ConversionError::process_failed(
                    -1,
                    format!("Browser exited with code {}: {}", out.exit_code, out.stderr_text()),
                )),
                Ok(_) if !dest.exists() => Err(ConversionError::process_failed(-1, "Browser did not write the PDF")),
                Ok(_) => Ok(()),
                Err(ConversionError::Timeout) => {
                    debug!("Browser timed out after {}ms", timeout.as_millis());
                    Err(ConversionError::Timeout)
                }
                Err(e) => Err(e),
            };
            done(result);
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.remove_staged();
    }
}

impl Drop for ChromiumSurface {
    fn drop(&mut self) {
        self.remove_staged();
    }
}
