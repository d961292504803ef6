//! Blocking file downloads with throttled progress reporting.
//!
//! Provides:
//! - Idempotent fetches (an existing file of the right size is kept)
//! - Progress updates at a minimum time interval, independent of file size
//! - Bounded retry for transient failures
//! - Atomic file operations (temp file -> final)

use crate::config::NetworkConfig;
use crate::error::{ApcalError, Result};
use crate::network::client::HttpClient;
use crate::network::retry::{retry_blocking, RetryConfig};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Progress information for a download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes (if known).
    pub total_bytes: Option<u64>,
    /// Percentage complete (0-100).
    pub percent: Option<f64>,
}

impl DownloadProgress {
    fn new(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = total_bytes.map(|total| {
            if total > 0 {
                (bytes_downloaded as f64 / total as f64) * 100.0
            } else {
                0.0
            }
        });

        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }

    /// Text bar such as `[=====     ] (1.20 KB)`.
    pub fn render(&self, width: usize) -> String {
        let done = match self.total_bytes {
            Some(total) if total > 0 => {
                ((width as f64 * self.bytes_downloaded as f64 / total as f64) as usize).min(width)
            }
            _ => 0,
        };
        format!(
            "[{}{}] ({})",
            "=".repeat(done),
            " ".repeat(width - done),
            format_size(self.bytes_downloaded)
        )
    }
}

/// Callback receiving throttled progress updates.
pub type ProgressCallback = dyn Fn(&DownloadProgress) + Send + Sync;

/// What a download call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file was transferred; number of bytes written.
    Downloaded(u64),
    /// The destination already held a file of the remote size.
    AlreadyPresent,
}

/// Format bytes as human-readable string.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Download manager for model artifacts.
pub struct DownloadManager {
    http: HttpClient,
    retry: RetryConfig,
    progress_interval: Duration,
    chunk_size: usize,
    temp_suffix: String,
    progress: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("http", &self.http)
            .field("retry", &self.retry)
            .field("progress_interval", &self.progress_interval)
            .field("chunk_size", &self.chunk_size)
            .field("has_progress_callback", &self.progress.is_some())
            .finish()
    }
}

impl DownloadManager {
    /// Create a new download manager.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(HttpClient::new()?))
    }

    /// Create a download manager with a custom HTTP client.
    pub fn with_client(http: HttpClient) -> Self {
        Self {
            http,
            retry: RetryConfig::new()
                .with_max_attempts(NetworkConfig::DOWNLOAD_RETRY_ATTEMPTS)
                .with_base_delay(NetworkConfig::DOWNLOAD_RETRY_BASE_DELAY),
            progress_interval: NetworkConfig::DOWNLOAD_PROGRESS_INTERVAL,
            chunk_size: NetworkConfig::DOWNLOAD_CHUNK_SIZE,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX.to_string(),
            progress: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Minimum time between two progress updates.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Route progress updates to `callback` instead of the log.
    pub fn with_progress_callback(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Download `url` to `destination`, retrying transient failures.
    pub fn download(&self, url: &str, destination: &Path) -> Result<DownloadOutcome> {
        let (result, stats) = retry_blocking(&self.retry, || self.download_once(url, destination));

        if stats.attempts > 1 {
            debug!(
                "Download of {} finished after {} attempts (total delay: {:?})",
                url, stats.attempts, stats.total_delay
            );
        }

        result
    }

    fn download_once(&self, url: &str, destination: &Path) -> Result<DownloadOutcome> {
        let mut response = self.http.get(url)?;
        let total_bytes = response.content_length();

        if let Ok(metadata) = std::fs::metadata(destination) {
            if total_bytes.map_or(true, |total| total == metadata.len()) {
                info!("file '{}' already downloaded.", destination.display());
                return Ok(DownloadOutcome::AlreadyPresent);
            }
        }

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ApcalError::Io {
                    message: format!("Failed to create directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        info!(
            "Downloading '{}' ({})",
            destination.display(),
            total_bytes
                .map(format_size)
                .unwrap_or_else(|| "unknown size".to_string())
        );

        let temp_path = PathBuf::from(format!(
            "{}{}",
            destination.display(),
            self.temp_suffix
        ));

        let result = self.write_body(&mut response, &temp_path, total_bytes);
        let bytes = match result {
            Ok(0) => {
                let _ = std::fs::remove_file(&temp_path);
                return Err(ApcalError::DownloadFailed {
                    url: url.to_string(),
                    message: "server returned no content".to_string(),
                    retryable: false,
                });
            }
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                return Err(e);
            }
        };

        std::fs::rename(&temp_path, destination).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            ApcalError::Io {
                message: format!("Failed to move download to final destination: {}", e),
                path: Some(destination.to_path_buf()),
                source: Some(e),
            }
        })?;

        info!("Downloaded {} bytes to {}", bytes, destination.display());
        Ok(DownloadOutcome::Downloaded(bytes))
    }

    fn write_body(
        &self,
        response: &mut reqwest::blocking::Response,
        temp_path: &Path,
        total_bytes: Option<u64>,
    ) -> Result<u64> {
        let mut file = std::fs::File::create(temp_path).map_err(|e| ApcalError::Io {
            message: format!("Failed to create temp file: {}", e),
            path: Some(temp_path.to_path_buf()),
            source: Some(e),
        })?;

        let bytes_downloaded = match total_bytes {
            // Without a content length there is nothing to measure progress against.
            None => response.copy_to(&mut file).map_err(|e| ApcalError::Network {
                message: format!("Error reading download stream: {}", e),
                source: Some(e),
            })?,
            Some(total) => self.copy_with_progress(response, &mut file, temp_path, total)?,
        };

        file.flush().map_err(|e| ApcalError::Io {
            message: format!("Failed to flush temp file: {}", e),
            path: Some(temp_path.to_path_buf()),
            source: Some(e),
        })?;

        Ok(bytes_downloaded)
    }

    fn copy_with_progress(
        &self,
        response: &mut reqwest::blocking::Response,
        file: &mut std::fs::File,
        temp_path: &Path,
        total: u64,
    ) -> Result<u64> {
        let mut buffer = vec![0u8; self.chunk_size];
        let mut bytes_downloaded: u64 = 0;
        let mut last_progress_update = Instant::now();

        loop {
            let read = response.read(&mut buffer).map_err(|e| ApcalError::Network {
                message: format!("Error reading download stream: {}", e),
                source: None,
            })?;
            if read == 0 {
                break;
            }

            file.write_all(&buffer[..read]).map_err(|e| ApcalError::Io {
                message: format!("Failed to write to temp file: {}", e),
                path: Some(temp_path.to_path_buf()),
                source: Some(e),
            })?;
            bytes_downloaded += read as u64;

            if last_progress_update.elapsed() >= self.progress_interval {
                self.report(&DownloadProgress::new(bytes_downloaded, Some(total)));
                last_progress_update = Instant::now();
            }
        }

        self.report(&DownloadProgress::new(bytes_downloaded, Some(total)));
        Ok(bytes_downloaded)
    }

    fn report(&self, progress: &DownloadProgress) {
        match &self.progress {
            Some(callback) => callback(progress),
            None => info!(
                "{}",
                progress.render(NetworkConfig::DOWNLOAD_PROGRESS_WIDTH)
            ),
        }
    }
}
