//! PDF input: extract HTML with pdftohtml so the conversion engine can read it.
//!
//! pdftohtml has its own failure vocabulary. Password protection and
//! image-only documents are conditions the user can act on, so they are
//! reported as [`ConversionError::InputError`] rather than engine failures.

use crate::error::ConversionError;
use crate::pipeline::command::build_pdftohtml_command;
use crate::pipeline::exec::{self, ExecOptions};
use std::path::Path;
use tracing::debug;

/// pdftohtml's exit code for a document it cannot decrypt.
const EXIT_ENCRYPTED: i32 = 3;

pub const PASSWORD_PROTECTED_MSG: &str = "PDF is password-protected and cannot be converted";
pub const NO_TEXT_MSG: &str = "PDF produced no text output (may be scanned/image-only)";

/// Extract `pdf_file` as a single unframed HTML document.
pub async fn pdf_to_html(
    pdftohtml: &Path,
    pdf_file: &Path,
    opts: ExecOptions<'_>,
) -> Result<String, ConversionError> {
    let cmd = build_pdftohtml_command(pdftohtml, pdf_file);
    let output = exec::run(&cmd, None, opts).await?;

    if output.exit_code != 0 {
        return Err(map_pdftohtml_error(output.exit_code, &output.stderr_text()));
    }

    let html = String::from_utf8_lossy(&output.stdout).into_owned();
    if html.trim().is_empty() {
        return Err(ConversionError::input(NO_TEXT_MSG));
    }

    debug!(bytes = html.len(), "pdftohtml extracted HTML");
    Ok(html)
}

/// Classify a failed pdftohtml run.
pub fn map_pdftohtml_error(exit_code: i32, stderr: &str) -> ConversionError {
    if exit_code == EXIT_ENCRYPTED || stderr.to_lowercase().contains("encrypted") {
        return ConversionError::input(PASSWORD_PROTECTED_MSG);
    }
    ConversionError::process_failed(exit_code, format!("pdftohtml failed: {stderr}"))
}
