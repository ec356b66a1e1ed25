//! End-to-end tests against the real engines.
//!
//! These run pandoc (and, where noted, pdftohtml or a headless browser) on
//! the host. They are gated behind the `E2E_ENABLED` environment variable and
//! skip themselves when an engine cannot be found.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! In containers the browser usually needs:
//!   DOCSHIFT_BROWSER_ARGS=--no-sandbox

use docshift::{
    convert, convert_to_pdf, detect, ConversionConfig, ConversionError, ConversionInput,
    InputFormat, OutputFormat, Template,
};
use engine_locate::{is_engine_available, EngineSpec, BROWSER, PANDOC, PDFTOHTML};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and every engine is available.
macro_rules! e2e_skip_unless_ready {
    ($($engine:expr),+) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let engines: &[&EngineSpec] = &[$(&$engine),+];
        for spec in engines {
            if !is_engine_available(spec) {
                println!("SKIP — {} not found (set {})", spec.name, spec.env_var);
                return;
            }
        }
    }};
}

fn config_in(dir: &tempfile::TempDir) -> ConversionConfig {
    ConversionConfig::builder()
        .scratch_dir(dir.path())
        .process_timeout_secs(60)
        .build()
        .unwrap()
}

const SAMPLE_MD: &str = "# Quarterly Report\n\nRevenue grew **12%**.\n\n- north\n- south\n";

// ── Text conversions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_markdown_to_html_round_trips_through_detection() {
    e2e_skip_unless_ready!(PANDOC);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let input = ConversionInput::from_bytes(SAMPLE_MD, InputFormat::Markdown);
    let out = convert(input, OutputFormat::Html, &config).await.unwrap();

    let html = std::fs::read_to_string(&out.path).unwrap();
    println!("{} bytes of HTML", html.len());
    assert!(html.contains("Quarterly Report"));
    assert!(html.contains("<strong>12%</strong>"));
    assert_eq!(detect(None, None, Some(html.as_bytes())), InputFormat::Html);
}

#[tokio::test]
async fn test_markdown_to_docx_is_a_zip_container() {
    e2e_skip_unless_ready!(PANDOC);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let input = ConversionInput::from_bytes(SAMPLE_MD, InputFormat::Markdown);
    let out = convert(input, OutputFormat::Docx, &config).await.unwrap();

    let bytes = std::fs::read(&out.path).unwrap();
    assert!(bytes.starts_with(b"PK"));
    assert_eq!(detect(None, None, Some(&bytes)), InputFormat::Docx);

    // And back again.
    let back = convert(ConversionInput::from_path(&out.path, InputFormat::Docx), OutputFormat::Markdown, &config)
        .await
        .unwrap();
    let md = std::fs::read_to_string(&back.path).unwrap();
    assert!(md.contains("Quarterly Report"));
}

#[tokio::test]
async fn test_html_to_plain_and_latex() {
    e2e_skip_unless_ready!(PANDOC);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let html = "<html><body><h1>Title</h1><p>Body text.</p></body></html>";

    let plain = convert(ConversionInput::from_bytes(html, InputFormat::Html), OutputFormat::Plain, &config)
        .await
        .unwrap();
    let text = std::fs::read_to_string(&plain.path).unwrap();
    assert!(text.contains("Body text."));
    assert!(!text.contains("<p>"));

    let latex = convert(ConversionInput::from_bytes(html, InputFormat::Html), OutputFormat::Latex, &config)
        .await
        .unwrap();
    let tex = std::fs::read_to_string(&latex.path).unwrap();
    assert!(tex.contains("\\section"));
}

#[tokio::test]
async fn test_corrupt_docx_fails_with_engine_diagnostics() {
    e2e_skip_unless_ready!(PANDOC);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let input = ConversionInput::from_bytes(b"PK\x03\x04 definitely not a docx".to_vec(), InputFormat::Docx);
    let err = convert(input, OutputFormat::Markdown, &config).await.unwrap_err();
    match err {
        ConversionError::ProcessFailed { exit_code, ref stderr } => {
            println!("exit {exit_code} ({}): {stderr}", err.label().unwrap_or("?"));
            assert_ne!(exit_code, 0);
            assert!(!stderr.is_empty());
        }
        other => panic!("expected ProcessFailed, got {other:?}"),
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_markdown_to_pdf_with_template() {
    e2e_skip_unless_ready!(PANDOC, BROWSER);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let input = ConversionInput::from_bytes(SAMPLE_MD, InputFormat::Markdown);
    let out = convert_to_pdf(input, Template::Academic.css(), &config).await.unwrap();

    let bytes = std::fs::read(&out.path).unwrap();
    println!("{} bytes of PDF in {}ms", bytes.len(), out.duration_ms);
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(detect(None, None, Some(&bytes)), InputFormat::Pdf);
}

#[tokio::test]
async fn test_pdf_round_trip_to_markdown() {
    e2e_skip_unless_ready!(PANDOC, BROWSER, PDFTOHTML);
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let pdf = convert_to_pdf(ConversionInput::from_bytes(SAMPLE_MD, InputFormat::Markdown), None, &config)
        .await
        .unwrap();
    let md = convert(ConversionInput::detect_path(&pdf.path), OutputFormat::Markdown, &config)
        .await
        .unwrap();

    assert_eq!(md.input_format, InputFormat::Pdf);
    let text = std::fs::read_to_string(&md.path).unwrap();
    assert!(text.contains("Quarterly"), "extracted text: {text}");
}
