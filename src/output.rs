//! Result records returned by the conversion entry points.

use crate::error::ConversionError;
use crate::format::{InputFormat, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A produced file.
///
/// The file lives in [`crate::ConversionConfig::output_dir`] under a unique
/// name and belongs to the caller; docshift never deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub path: PathBuf,
    pub input_format: InputFormat,
    pub output_format: OutputFormat,
    /// Size of the produced file.
    pub size_bytes: u64,
    /// Wall-clock time of the whole conversion.
    pub duration_ms: u64,
}

impl ConversionOutput {
    pub fn mime_type(&self) -> &'static str {
        self.output_format.mime_type()
    }
}

/// Outcome of one input in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    /// 1-indexed position in the batch.
    pub index: usize,
    /// Short description of the input (path, URL or buffer size).
    pub input: String,
    pub result: Result<ConversionOutput, ConversionError>,
}

impl JobResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Counters for a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Inputs that failed with a retryable error (timeouts).
    pub retryable: usize,
    pub total_output_bytes: u64,
    pub total_duration_ms: u64,
}

impl BatchStats {
    pub fn from_results(results: &[JobResult], total_duration_ms: u64) -> Self {
        let mut stats = BatchStats {
            total: results.len(),
            total_duration_ms,
            ..Default::default()
        };
        for r in results {
            match &r.result {
                Ok(out) => {
                    stats.succeeded += 1;
                    stats.total_output_bytes += out.size_bytes;
                }
                Err(e) => {
                    stats.failed += 1;
                    if e.is_retryable() {
                        stats.retryable += 1;
                    }
                }
            }
        }
        stats
    }
}

/// Every input's outcome, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub results: Vec<JobResult>,
    pub stats: BatchStats,
}
