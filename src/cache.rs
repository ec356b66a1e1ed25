//! Housekeeping for the output directory.
//!
//! Produced files belong to the caller and are never removed by a
//! conversion. Long-running hosts call [`CacheManager::cleanup_old_files`]
//! periodically to bound disk use.

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Age after which an output file is considered stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Removes stale files from an output directory.
#[derive(Debug, Clone)]
pub struct CacheManager {
    output_dir: PathBuf,
}

impl CacheManager {
    pub fn new(config: &ConversionConfig) -> Self {
        Self::for_dir(&config.output_dir)
    }

    pub fn for_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Delete regular files whose modification time is at least `max_age`
    /// old. Returns how many were removed.
    ///
    /// A missing directory counts as empty. Files that vanish or cannot be
    /// removed mid-scan are skipped with a warning.
    pub async fn cleanup_old_files(&self, max_age: Duration) -> Result<usize, ConversionError> {
        let now = SystemTime::now();
        self.remove_where(|modified| {
            now.duration_since(modified).unwrap_or(Duration::ZERO) >= max_age
        })
        .await
    }

    /// Remove the output directory and everything in it. Returns how many
    /// regular files it held. The next conversion recreates the directory.
    pub async fn clear_all(&self) -> Result<usize, ConversionError> {
        let removed = self.remove_where(|_| true).await?;
        match tokio::fs::remove_dir_all(&self.output_dir).await {
            Ok(()) => Ok(removed),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(removed),
            Err(e) => Err(ConversionError::process_failed(
                -1,
                format!("Cannot remove {}: {e}", self.output_dir.display()),
            )),
        }
    }

    async fn remove_where<F>(&self, stale: F) -> Result<usize, ConversionError>
    where
        F: Fn(SystemTime) -> bool,
    {
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(ConversionError::process_failed(
                    -1,
                    format!("Cannot list {}: {e}", self.output_dir.display()),
                ))
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped scanning {}: {}", self.output_dir.display(), e);
                    break;
                }
            };
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if !stale(modified) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!("Removed {}", entry.path().display());
                    removed += 1;
                }
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} file(s) from {}", removed, self.output_dir.display());
        }
        Ok(removed)
    }
}
