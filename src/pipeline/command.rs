//! Engine command lines.
//!
//! Pure functions: no process is started here, so argument vectors can be
//! asserted directly in tests.

use crate::error::ConversionError;
use crate::format::{InputFormat, OutputFormat};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl EngineCommand {
    /// Program and arguments as one lossy string vector.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }
}

/// Conversion-engine command.
///
/// With `input_file` the engine reads that file; without it the engine reads
/// stdin and no positional input argument is emitted.
pub fn build_command(
    engine: &Path,
    input: InputFormat,
    output: OutputFormat,
    input_file: Option<&Path>,
    output_file: &Path,
) -> Result<EngineCommand, ConversionError> {
    let reader = input
        .reader_flag()
        .ok_or_else(|| ConversionError::unsupported(input.name()))?;

    let mut args: Vec<OsString> = vec![
        "-f".into(),
        reader.into(),
        "-t".into(),
        output.writer_flag().into(),
    ];
    if let Some(path) = input_file {
        args.push(path.into());
    }
    args.push("-o".into());
    args.push(output_file.into());

    Ok(EngineCommand {
        program: engine.to_path_buf(),
        args,
    })
}

/// PDF extraction command: single HTML page, no images, unframed, on stdout.
pub fn build_pdftohtml_command(engine: &Path, input_file: &Path) -> EngineCommand {
    EngineCommand {
        program: engine.to_path_buf(),
        args: vec![
            "-s".into(),
            "-i".into(),
            "-noframes".into(),
            "-stdout".into(),
            input_file.into(),
        ],
    }
}
