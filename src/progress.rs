//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as [`crate::convert_batch`] and [`crate::convert_stream`] work
//! through their inputs.
//!
//! # Example
//!
//! ```rust
//! use docshift::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_input_complete(&self, index: usize, total: usize, output_bytes: u64) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}/{total} done (input #{index}, {output_bytes} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it processes each input.
///
/// Implementations must be `Send + Sync`: inputs are converted concurrently
/// and `on_input_*` methods may be called from different tasks at once.
/// All methods have default no-op implementations.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before any input is processed.
    fn on_conversion_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when work on an input begins.
    ///
    /// # Arguments
    /// * `index`: 1-indexed position of the input in the batch
    /// * `total`: batch size
    fn on_input_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an input produced its output file.
    ///
    /// # Arguments
    /// * `output_bytes`: size of the produced file
    fn on_input_complete(&self, index: usize, total: usize, output_bytes: u64) {
        let _ = (index, total, output_bytes);
    }

    /// Called when an input failed.
    fn on_input_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every input has been attempted.
    fn on_conversion_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
