//! Centralized configuration for the calibration library.
//!
//! Tunables for network operations, integrity checks, and on-disk layout live
//! here, along with resolution of the default home directory.

use crate::error::{ApcalError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Library version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const USER_AGENT: &'static str = concat!("apcal/", env!("CARGO_PKG_VERSION"));
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DOWNLOAD_RETRY_ATTEMPTS: u32 = 3;
    pub const DOWNLOAD_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const DOWNLOAD_CHUNK_SIZE: usize = 4096;
    pub const DOWNLOAD_PROGRESS_INTERVAL: Duration = Duration::from_secs(2);
    pub const DOWNLOAD_PROGRESS_WIDTH: usize = 50;
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
}

/// Integrity check configuration.
pub struct IntegrityConfig;

impl IntegrityConfig {
    /// Block size for streamed digest computation.
    pub const DIGEST_BLOCK_SIZE: usize = 64 * 1024;
}

/// On-disk layout.
pub struct PathsConfig;

impl PathsConfig {
    pub const HOME_ENV_VAR: &'static str = "APCAL_HOME";
    pub const APP_DIR_NAME: &'static str = "apcal";
    pub const MODELS_DIR_NAME: &'static str = "models";
    pub const MANIFEST_FILENAME: &'static str = "configuration.json";
}

/// Canonical model names used by the convenience calibrations.
pub struct ModelNames;

impl ModelNames {
    pub const METALLICITY: &'static str = "mh";
    pub const TEFF: &'static str = "teff";
}

/// Resolve the library home directory.
///
/// `APCAL_HOME` wins when set; otherwise `<platform data dir>/apcal`.
pub fn default_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(PathsConfig::HOME_ENV_VAR) {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    let data_dir = dirs::data_dir().ok_or_else(|| {
        ApcalError::config(format!(
            "Could not determine data directory; set {}",
            PathsConfig::HOME_ENV_VAR
        ))
    })?;
    Ok(data_dir.join(PathsConfig::APP_DIR_NAME))
}

/// Default manifest location (`<home>/configuration.json`).
pub fn default_manifest_path() -> Result<PathBuf> {
    Ok(default_home()?.join(PathsConfig::MANIFEST_FILENAME))
}

/// Default models directory (`<home>/models`).
pub fn default_models_dir() -> Result<PathBuf> {
    Ok(default_home()?.join(PathsConfig::MODELS_DIR_NAME))
}
