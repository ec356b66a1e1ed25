//! Pipeline integration tests against fake engines.
//!
//! Each test writes tiny `/bin/sh` stand-ins for pandoc and pdftohtml into a
//! temp dir, so no real engine is needed. PDF output goes through a scripted
//! render surface.

#![cfg(unix)]

use docshift::{
    convert, convert_batch, convert_stream, convert_to_file, convert_to_pdf, ConversionConfig,
    ConversionError, ConversionInput, InputFormat, LoadSettings, OutputFormat, PageAttributes,
    RenderSurface, SurfaceFactory, Template,
};
use docshift::pipeline::render::{LayoutCallback, LoadCallback, WriteCallback};
use futures::StreamExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Fake engines ─────────────────────────────────────────────────────────────

/// Echoes `-f`/`-t` in a header line, then the input (file or stdin), into `-o`.
const FAKE_PANDOC: &str = r#"#!/bin/sh
out=""; src=""; reader=""; writer=""
while [ $# -gt 0 ]; do
  case "$1" in
    -f) reader="$2"; shift 2 ;;
    -t) writer="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) src="$1"; shift ;;
  esac
done
{
  echo "<!-- $reader -> $writer -->"
  if [ -n "$src" ]; then cat "$src"; else cat; fi
} > "$out"
"#;

const FAKE_PDFTOHTML: &str = r#"#!/bin/sh
echo "<html><head><title>x</title></head><body><p>from pdf</p></body></html>"
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct Fixture {
    dir: tempfile::TempDir,
    pandoc: PathBuf,
    pdftohtml: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pandoc = write_script(dir.path(), "pandoc", FAKE_PANDOC);
        let pdftohtml = write_script(dir.path(), "pdftohtml", FAKE_PDFTOHTML);
        Self { dir, pandoc, pdftohtml }
    }

    fn config(&self) -> ConversionConfig {
        self.builder().build().unwrap()
    }

    fn builder(&self) -> docshift::ConversionConfigBuilder {
        ConversionConfig::builder()
            .engine_path(&self.pandoc)
            .pdftohtml_path(&self.pdftohtml)
            .browser_path(self.dir.path().join("no-browser"))
            .scratch_dir(self.dir.path().join("scratch"))
            .process_timeout_secs(10)
    }

    fn output_files(&self) -> Vec<PathBuf> {
        let out = self.dir.path().join("scratch/converted");
        let mut files: Vec<PathBuf> = std::fs::read_dir(out)
            .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default();
        files.sort();
        files
    }
}

// ── Scripted render surface ──────────────────────────────────────────────────

#[derive(Default)]
struct RecordingFactory {
    html: Arc<Mutex<Vec<String>>>,
    pages: Arc<Mutex<Vec<PageAttributes>>>,
}

impl SurfaceFactory for RecordingFactory {
    fn create(&self) -> Result<Box<dyn RenderSurface>, ConversionError> {
        Ok(Box::new(RecordingSurface {
            html: String::new(),
            seen_html: self.html.clone(),
            seen_pages: self.pages.clone(),
        }))
    }
}

struct RecordingSurface {
    html: String,
    seen_html: Arc<Mutex<Vec<String>>>,
    seen_pages: Arc<Mutex<Vec<PageAttributes>>>,
}

impl RenderSurface for RecordingSurface {
    fn load_html(&mut self, html: &str, settings: LoadSettings, done: LoadCallback) {
        assert!(!settings.javascript_enabled);
        self.html = html.to_string();
        self.seen_html.lock().unwrap().push(html.to_string());
        done(Ok(()));
    }

    fn layout(&mut self, page: &PageAttributes, done: LayoutCallback) {
        self.seen_pages.lock().unwrap().push(*page);
        done(Ok(()));
    }

    fn write(&mut self, dest: &Path, done: WriteCallback) {
        match std::fs::write(dest, format!("%PDF-1.7\n{}", self.html)) {
            Ok(()) => done(Ok(())),
            Err(e) => done(Err(ConversionError::process_failed(-1, e.to_string()))),
        }
    }

    fn cancel(&mut self) {}
}

// ── Text conversions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn buffer_input_is_piped_on_stdin() {
    let fx = Fixture::new();
    let input = ConversionInput::from_bytes(b"# Title\n".to_vec(), InputFormat::Markdown);

    let out = convert(input, OutputFormat::Html, &fx.config()).await.unwrap();

    let text = std::fs::read_to_string(&out.path).unwrap();
    assert_eq!(text, "<!-- markdown -> html -->\n# Title\n");
    assert_eq!(out.input_format, InputFormat::Markdown);
    assert_eq!(out.output_format, OutputFormat::Html);
    assert_eq!(out.size_bytes, text.len() as u64);
    assert_eq!(out.path.extension().unwrap(), "html");
    assert!(out.path.starts_with(fx.dir.path().join("scratch/converted")));
}

#[tokio::test]
async fn path_input_is_passed_as_a_staged_copy() {
    let fx = Fixture::new();
    let src = fx.dir.path().join("doc.org");
    std::fs::write(&src, "* Heading\n").unwrap();

    let out = convert(ConversionInput::detect_path(&src), OutputFormat::Markdown, &fx.config())
        .await
        .unwrap();

    let text = std::fs::read_to_string(&out.path).unwrap();
    assert_eq!(text, "<!-- org -> markdown -->\n* Heading\n");
    assert!(src.exists());
    // The staged copy is gone once the call returns.
    let leftovers: Vec<_> = std::fs::read_dir(fx.dir.path().join("scratch"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .collect();
    assert!(leftovers.is_empty(), "scratch files left: {leftovers:?}");
}

#[tokio::test]
async fn plain_text_is_read_as_markdown() {
    let fx = Fixture::new();
    let input = ConversionInput::from_bytes(b"hello".to_vec(), InputFormat::Plain);
    let out = convert(input, OutputFormat::Latex, &fx.config()).await.unwrap();
    let text = std::fs::read_to_string(&out.path).unwrap();
    assert!(text.starts_with("<!-- markdown -> latex -->"));
    assert_eq!(out.path.extension().unwrap(), "tex");
}

#[tokio::test]
async fn every_call_gets_a_fresh_output_file() {
    let fx = Fixture::new();
    let config = fx.config();
    let a = convert(ConversionInput::from_bytes(b"a".to_vec(), InputFormat::Markdown), OutputFormat::Html, &config)
        .await
        .unwrap();
    let b = convert(ConversionInput::from_bytes(b"b".to_vec(), InputFormat::Markdown), OutputFormat::Html, &config)
        .await
        .unwrap();
    assert_ne!(a.path, b.path);
    assert_eq!(fx.output_files().len(), 2);
}

#[tokio::test]
async fn pdf_input_goes_through_pdftohtml() {
    let fx = Fixture::new();
    let input = ConversionInput::from_bytes(b"%PDF-1.4 fake".to_vec(), InputFormat::Pdf);

    let out = convert(input, OutputFormat::Markdown, &fx.config()).await.unwrap();

    let text = std::fs::read_to_string(&out.path).unwrap();
    assert!(text.starts_with("<!-- html -> markdown -->\n"));
    assert!(text.contains("<p>from pdf</p>"));
    assert_eq!(out.input_format, InputFormat::Pdf);
}

#[tokio::test]
async fn pdf_input_without_pdftohtml_is_unsupported() {
    let fx = Fixture::new();
    let config = fx.builder().pdftohtml_path(fx.dir.path().join("missing")).build().unwrap();
    let input = ConversionInput::from_bytes(b"%PDF-1.4".to_vec(), InputFormat::Pdf);
    let err = convert(input, OutputFormat::Html, &config).await.unwrap_err();
    assert_eq!(err, ConversionError::unsupported("pdf"));
}

#[tokio::test]
async fn encrypted_pdf_is_an_input_error() {
    let fx = Fixture::new();
    let locked = write_script(
        fx.dir.path(),
        "pdftohtml-locked",
        "#!/bin/sh\necho 'Command Line Error: Incorrect password' >&2\nexit 3\n",
    );
    let config = fx.builder().pdftohtml_path(locked).build().unwrap();
    let input = ConversionInput::from_bytes(b"%PDF-1.4".to_vec(), InputFormat::Pdf);
    let err = convert(input, OutputFormat::Html, &config).await.unwrap_err();
    assert!(matches!(err, ConversionError::InputError { .. }), "{err:?}");
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn engine_failure_carries_exit_code_and_output() {
    let fx = Fixture::new();
    let failing = write_script(
        fx.dir.path(),
        "pandoc-fail",
        "#!/bin/sh\necho 'Unknown input format foo' >&2\nexit 21\n",
    );
    let config = fx.builder().engine_path(failing).build().unwrap();
    let input = ConversionInput::from_bytes(b"x".to_vec(), InputFormat::Markdown);

    let err = convert(input, OutputFormat::Html, &config).await.unwrap_err();
    match &err {
        ConversionError::ProcessFailed { exit_code, stderr } => {
            assert_eq!(*exit_code, 21);
            assert!(stderr.contains("Unknown input format foo"));
        }
        other => panic!("expected ProcessFailed, got {other:?}"),
    }
    assert_eq!(err.label(), Some("PandocUnknownReaderError"));
    assert!(fx.output_files().is_empty());
}

#[tokio::test]
async fn hung_engine_times_out() {
    let fx = Fixture::new();
    let slow = write_script(fx.dir.path(), "pandoc-slow", "#!/bin/sh\nsleep 30\n");
    let config = fx
        .builder()
        .engine_path(slow)
        .process_timeout_secs(1)
        .build()
        .unwrap();
    let input = ConversionInput::from_bytes(b"x".to_vec(), InputFormat::Markdown);

    let started = std::time::Instant::now();
    let err = convert(input, OutputFormat::Html, &config).await.unwrap_err();
    assert_eq!(err, ConversionError::Timeout);
    assert!(err.is_retryable());
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}

#[tokio::test]
async fn oversized_path_input_is_rejected_before_the_engine() {
    let fx = Fixture::new();
    let marker = fx.dir.path().join("ran");
    let tattle = write_script(
        fx.dir.path(),
        "pandoc-tattle",
        &format!("#!/bin/sh\ntouch '{}'\n", marker.display()),
    );
    let src = fx.dir.path().join("big.md");
    std::fs::write(&src, vec![b'a'; 2048]).unwrap();
    let config = fx
        .builder()
        .engine_path(tattle)
        .max_input_bytes(1024)
        .build()
        .unwrap();

    let err = convert(ConversionInput::from_path(&src, InputFormat::Markdown), OutputFormat::Html, &config)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ConversionError::FileTooLarge {
            size_bytes: 2048,
            max_bytes: 1024
        }
    );
    assert!(!marker.exists());
}

#[tokio::test]
async fn missing_local_file_is_an_input_error() {
    let fx = Fixture::new();
    let input = ConversionInput::from_path(fx.dir.path().join("nope.md"), InputFormat::Markdown);
    let err = convert(input, OutputFormat::Html, &fx.config()).await.unwrap_err();
    assert!(matches!(err, ConversionError::InputError { .. }), "{err:?}");
}

// ── PDF output ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_output_renders_styled_engine_html() {
    let fx = Fixture::new();
    let factory = Arc::new(RecordingFactory::default());
    let config = fx.builder().surface_factory(factory.clone()).build().unwrap();
    let input = ConversionInput::from_bytes(b"<html><head></head><body>hi</body></html>".to_vec(), InputFormat::Html);

    let out = convert_to_pdf(input, Template::Clean.css(), &config).await.unwrap();

    assert_eq!(out.output_format, OutputFormat::Pdf);
    assert_eq!(out.mime_type(), "application/pdf");
    let pdf = std::fs::read_to_string(&out.path).unwrap();
    assert!(pdf.starts_with("%PDF-1.7\n<!-- html -> html -->"));

    let html = factory.html.lock().unwrap();
    assert_eq!(html.len(), 1);
    let style_at = html[0].find("<style>").expect("css injected");
    let head_end = html[0].find("</head>").unwrap();
    assert!(style_at < head_end);
    assert_eq!(factory.pages.lock().unwrap()[0], config.page);

    // Only the PDF is left; the intermediate HTML was removed.
    assert_eq!(fx.output_files(), vec![out.path.clone()]);
}

#[tokio::test]
async fn convert_with_pdf_target_skips_css() {
    let fx = Fixture::new();
    let factory = Arc::new(RecordingFactory::default());
    let config = fx.builder().surface_factory(factory.clone()).build().unwrap();
    let input = ConversionInput::from_bytes(b"# T".to_vec(), InputFormat::Markdown);

    let out = convert(input, OutputFormat::Pdf, &config).await.unwrap();

    assert_eq!(out.path.extension().unwrap(), "pdf");
    assert!(!factory.html.lock().unwrap()[0].contains("<style>"));
}

#[tokio::test]
async fn image_input_renders_without_the_engine() {
    let fx = Fixture::new();
    let factory = Arc::new(RecordingFactory::default());
    let config = fx
        .builder()
        .engine_path(fx.dir.path().join("no-pandoc"))
        .surface_factory(factory.clone())
        .build()
        .unwrap();
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    let out = convert_to_pdf(ConversionInput::detect_bytes(png, None, None), None, &config)
        .await
        .unwrap();

    assert_eq!(out.input_format, InputFormat::Image);
    let html = &factory.html.lock().unwrap()[0];
    assert!(html.contains("data:image/png;base64,"));
}

#[tokio::test]
async fn pdf_output_without_browser_is_unsupported() {
    let fx = Fixture::new();
    let input = ConversionInput::from_bytes(b"# T".to_vec(), InputFormat::Markdown);
    let err = convert_to_pdf(input, None, &fx.config()).await.unwrap_err();
    assert_eq!(err, ConversionError::unsupported("pdf"));
    // The engine ran, but its HTML does not outlive the failure.
    assert!(fx.output_files().is_empty());
}

// ── Batch, stream, file delivery ─────────────────────────────────────────────

#[tokio::test]
async fn batch_isolates_failures() {
    let fx = Fixture::new();
    let config = fx.builder().max_input_bytes(16).concurrency(3).build().unwrap();
    let inputs = vec![
        ConversionInput::from_bytes(b"# one".to_vec(), InputFormat::Markdown),
        ConversionInput::from_bytes(vec![b'x'; 64], InputFormat::Markdown),
        ConversionInput::from_bytes(b"<p>three</p>".to_vec(), InputFormat::Html),
        ConversionInput::from_bytes(b"png".to_vec(), InputFormat::Image),
    ];

    let batch = convert_batch(inputs, OutputFormat::Markdown, None, &config).await;

    assert_eq!(batch.results.iter().map(|r| r.index).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert!(batch.results[0].is_ok());
    assert!(matches!(batch.results[1].result, Err(ConversionError::FileTooLarge { .. })));
    assert!(batch.results[2].is_ok());
    assert!(matches!(batch.results[3].result, Err(ConversionError::UnsupportedFormat { .. })));
    assert_eq!(batch.stats.succeeded, 2);
    assert_eq!(batch.stats.failed, 2);
    assert_eq!(fx.output_files().len(), 2);
}

#[tokio::test]
async fn stream_yields_every_input() {
    let fx = Fixture::new();
    let inputs: Vec<_> = (0..5)
        .map(|i| ConversionInput::from_bytes(format!("doc {i}").into_bytes(), InputFormat::Markdown))
        .collect();

    let results: Vec<_> = convert_stream(inputs, OutputFormat::Plain, None, &fx.config())
        .collect()
        .await;

    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.is_ok()));
    let mut indices: Vec<_> = results.iter().map(|r| r.index).collect();
    indices.sort();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn convert_to_file_moves_the_result() {
    let fx = Fixture::new();
    let dest = fx.dir.path().join("out/final.md");
    let input = ConversionInput::from_bytes(b"<h1>x</h1>".to_vec(), InputFormat::Html);

    let out = convert_to_file(input, OutputFormat::Markdown, &dest, &fx.config())
        .await
        .unwrap();

    assert_eq!(out.path, dest);
    assert!(std::fs::read_to_string(&dest).unwrap().contains("<h1>x</h1>"));
    assert!(fx.output_files().is_empty());
}
