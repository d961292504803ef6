//! Remote storage backends for model artifacts.
//!
//! Each backend only knows how to turn a file name into a URL; transfer,
//! retry, and progress are shared through [`DownloadManager`].

use crate::error::Result;
use crate::manifest::{RepositoryConfig, RepositoryKind};
use crate::network::{DownloadManager, DownloadOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A place model artifacts can be fetched from.
pub trait Repository: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> RepositoryKind;

    /// URL serving `filename`.
    fn file_url(&self, filename: &str) -> String;

    fn downloader(&self) -> &DownloadManager;

    /// Fetch `filename` into `destination_dir`, returning the local path.
    ///
    /// A destination file already matching the remote size is left alone.
    fn fetch(&self, filename: &str, destination_dir: &Path) -> Result<PathBuf> {
        let url = self.file_url(filename);
        let destination = destination_dir.join(filename);
        info!("Fetching {} from {} repository", filename, self.kind());
        if self.downloader().download(&url, &destination)? == DownloadOutcome::AlreadyPresent {
            debug!("{} was already present in {}", filename, destination_dir.display());
        }
        Ok(destination)
    }
}

/// Direct download from `{url}/{filename}`.
#[derive(Debug)]
pub struct HttpRepository {
    base_url: String,
    downloader: Arc<DownloadManager>,
}

impl HttpRepository {
    pub fn new(base_url: impl Into<String>, downloader: Arc<DownloadManager>) -> Self {
        Self {
            base_url: base_url.into(),
            downloader,
        }
    }
}

impl Repository for HttpRepository {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Http
    }

    fn file_url(&self, filename: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), filename)
    }

    fn downloader(&self) -> &DownloadManager {
        &self.downloader
    }
}

/// Keeper/Seafile shared folder: `{url}/files/?p=%2F{filename}&dl=1`.
#[derive(Debug)]
pub struct KeeperRepository {
    share_url: String,
    downloader: Arc<DownloadManager>,
}

impl KeeperRepository {
    pub fn new(share_url: impl Into<String>, downloader: Arc<DownloadManager>) -> Self {
        Self {
            share_url: share_url.into(),
            downloader,
        }
    }
}

impl Repository for KeeperRepository {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Keeper
    }

    fn file_url(&self, filename: &str) -> String {
        format!(
            "{}/files/?p=%2F{}&dl=1",
            self.share_url.trim_end_matches('/'),
            urlencoding::encode(filename)
        )
    }

    fn downloader(&self) -> &DownloadManager {
        &self.downloader
    }
}

/// Build the backend registered for `config.kind`.
pub fn registered_repository(
    config: &RepositoryConfig,
    downloader: Arc<DownloadManager>,
) -> Box<dyn Repository> {
    match config.kind {
        RepositoryKind::Http => Box::new(HttpRepository::new(config.url.clone(), downloader)),
        RepositoryKind::Keeper => Box::new(KeeperRepository::new(config.url.clone(), downloader)),
    }
}
