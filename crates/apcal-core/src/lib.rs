//! apcal core - bias calibrations for Gaia DR3 GSP-Phot astrophysical parameters.
//!
//! Pre-trained calibration models are described by a JSON manifest. Each
//! model names an artifact file, its MD5 digest, the feature columns it
//! needs, and the label column it corrects. Models are loaded on first use:
//! the artifact is fetched from the configured repository if missing,
//! verified, deserialized, and applied as a residual correction
//! `label - predicted_bias`.
//!
//! Rows with a missing or non-finite feature come back as NaN; they never
//! fail the batch. The latitude cosine `cosb` is derived from `b` or from
//! `ra`/`dec` when a model needs it and the table lacks it.
//!
//! # Example
//!
//! ```rust,no_run
//! use apcal_core::CalibrationRegistry;
//! use polars::prelude::*;
//!
//! fn main() -> apcal_core::Result<()> {
//!     let registry = CalibrationRegistry::from_manifest_path("configuration.json")?;
//!
//!     let df = df!(
//!         "teff_gspphot" => [5200.0],
//!         "logg_gspphot" => [4.4],
//!         "mh_gspphot" => [-0.3],
//!         "b" => [32.5]
//!     )?;
//!     let corrected = registry.calibrate_metallicity(&df)?;
//!     println!("{:?}", corrected);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod integrity;
pub mod loader;
pub mod manifest;
pub mod model;
pub mod network;
pub mod registry;
pub mod repository;

// Re-export commonly used types
pub use config::ModelNames;
pub use error::{ApcalError, Result};
pub use integrity::{check_md5, compute_md5, DigestCheck, DigestPolicy};
pub use loader::ModelLoader;
pub use manifest::{Manifest, ModelEntry, PredictorKind, RepositoryConfig, RepositoryKind};
pub use model::{
    callable, CalibrationModel, CallableCatalog, CallableFn, Estimator, EstimatorArtifact,
    ModelWrapper, Predictor,
};
pub use network::{DownloadManager, DownloadProgress, RetryConfig};
pub use registry::{CalibrationRegistry, CalibrationRegistryBuilder};
pub use repository::{HttpRepository, KeeperRepository, Repository};
