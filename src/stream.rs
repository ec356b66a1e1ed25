//! Streaming batch API: emit each input's outcome as soon as it finishes.
//!
//! [`crate::convert::convert_batch`] returns only after every input is done.
//! [`convert_stream`] yields a [`JobResult`] per input through a `Stream`, so
//! callers can report progress or move finished files while the rest are
//! still converting. Items arrive in completion order; sort by
//! [`JobResult::index`] if order matters.

use crate::config::ConversionConfig;
use crate::convert::run_job;
use crate::format::OutputFormat;
use crate::output::JobResult;
use crate::pipeline::input::ConversionInput;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-input outcomes.
pub type JobStream = Pin<Box<dyn Stream<Item = JobResult> + Send>>;

/// Convert `inputs` to `output`, streaming results as they complete.
///
/// At most `config.concurrency` inputs are in flight. The stream owns a
/// copy of `config`; progress callbacks fire exactly as for
/// [`crate::convert::convert_batch`] except `on_conversion_complete`, which
/// the caller can derive from the stream's end.
pub fn convert_stream(
    inputs: Vec<ConversionInput>,
    output: OutputFormat,
    css: Option<String>,
    config: &ConversionConfig,
) -> JobStream {
    let total = inputs.len();
    info!("Starting streaming conversion of {} input(s) to {}", total, output);

    let config = Arc::new(config.clone());
    let css = css.map(Arc::<str>::from);
    let concurrency = config.concurrency;
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    stream::iter(inputs.into_iter().enumerate())
        .map(move |(i, input)| {
            let config = Arc::clone(&config);
            let css = css.clone();
            async move { run_job(i + 1, total, input, output, css.as_deref(), &config).await }
        })
        .buffer_unordered(concurrency)
        .boxed()
}
