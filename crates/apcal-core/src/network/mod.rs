//! Network utilities for fetching model artifacts.
//!
//! This module provides:
//! - A blocking HTTP client with timeouts
//! - Retry logic with exponential backoff and jitter
//! - A download manager with throttled progress reporting

mod client;
mod download;
mod retry;

pub use client::HttpClient;
pub use download::{
    format_size, DownloadManager, DownloadOutcome, DownloadProgress, ProgressCallback,
};
pub use retry::{retry_blocking, RetryConfig, RetryStats};
