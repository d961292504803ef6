//! Process-wide registry of calibration models.
//!
//! The manifest is read when the registry is built; model artifacts are only
//! resolved, verified, and deserialized the first time a model is requested.
//! Loaded models are cached for the lifetime of the registry and never
//! evicted.
//!
//! Every manifest entry has its own load lock. Concurrent first access to the
//! same name performs one load; the other callers of that name wait and then
//! share the cached model. The cache map itself is only locked for lookups
//! and inserts, so a slow download of one model never stalls callers of
//! another. Callers that want to avoid the first-access wait can [`warm_up`]
//! models before spawning workers.
//!
//! [`warm_up`]: CalibrationRegistry::warm_up

use crate::config::{default_manifest_path, default_models_dir, ModelNames};
use crate::error::{ApcalError, Result};
use crate::integrity::DigestPolicy;
use crate::loader::ModelLoader;
use crate::manifest::{Manifest, RepositoryConfig};
use crate::model::{CalibrationModel, CallableCatalog};
use crate::network::DownloadManager;
use crate::repository::registered_repository;
use polars::prelude::DataFrame;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Lazily loading, never evicting cache of calibration models.
#[derive(Debug)]
pub struct CalibrationRegistry {
    manifest: Manifest,
    loader: ModelLoader,
    cache: Mutex<HashMap<String, Arc<CalibrationModel>>>,
    load_locks: HashMap<String, Mutex<()>>,
}

impl CalibrationRegistry {
    /// Registry over the default manifest and models directory.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Registry over the manifest at `path`.
    pub fn from_manifest_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::builder().manifest_path(path).build()
    }

    pub fn builder() -> CalibrationRegistryBuilder {
        CalibrationRegistryBuilder::new()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn models_dir(&self) -> &Path {
        self.loader.models_dir()
    }

    /// The model `name`, loading it on first use.
    pub fn get(&self, name: &str) -> Result<Arc<CalibrationModel>> {
        if let Some(model) = self.cached(name) {
            return Ok(model);
        }
        let load_lock = self
            .load_locks
            .get(name)
            .ok_or_else(|| ApcalError::UnknownModel {
                name: name.to_string(),
            })?;
        let _loading = load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have finished the load while we waited.
        if let Some(model) = self.cached(name) {
            return Ok(model);
        }

        debug!("Loading model {} on first use", name);
        let model = Arc::new(self.loader.load(name, &self.manifest)?);
        self.cache().insert(name.to_string(), Arc::clone(&model));
        Ok(model)
    }

    /// Download (if needed) and verify the artifact of `name` without
    /// loading it.
    pub fn fetch_artifact(&self, name: &str) -> Result<PathBuf> {
        let entry = self.manifest.entry(name)?;
        self.loader.ensure_artifact(name, entry)
    }

    /// Apply model `name` to `df`.
    pub fn calibrate(&self, name: &str, df: &DataFrame) -> Result<Vec<f64>> {
        self.get(name)?.predict(df)
    }

    /// Calibrated metallicity ([M/H]).
    pub fn calibrate_metallicity(&self, df: &DataFrame) -> Result<Vec<f64>> {
        self.calibrate(ModelNames::METALLICITY, df)
    }

    /// Calibrated effective temperature.
    pub fn calibrate_teff(&self, df: &DataFrame) -> Result<Vec<f64>> {
        self.calibrate(ModelNames::TEFF, df)
    }

    /// Load every model in `names` now.
    pub fn warm_up<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.get(name.as_ref())?;
        }
        Ok(())
    }

    /// Every model the manifest defines, sorted.
    pub fn model_names(&self) -> Vec<String> {
        self.manifest.names().map(str::to_string).collect()
    }

    /// `(name, version)` for every manifest entry, sorted by name.
    pub fn model_versions(&self) -> Vec<(String, Option<String>)> {
        self.manifest
            .entries()
            .map(|(name, entry)| (name.to_string(), entry.version.clone()))
            .collect()
    }

    /// Names of the models loaded so far, sorted.
    pub fn loaded_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.cache().contains_key(name)
    }

    fn cached(&self, name: &str) -> Option<Arc<CalibrationModel>> {
        self.cache().get(name).cloned()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<CalibrationModel>>> {
        // Cached models are immutable, so a panic elsewhere cannot leave them
        // half-written.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for CalibrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Calibration Models")?;
        let loaded = self.loaded_models();
        if loaded.is_empty() {
            write!(f, "    (none loaded)")
        } else {
            write!(f, "    {}", loaded.join(", "))
        }
    }
}

/// Builder for [`CalibrationRegistry`].
///
/// # Example
///
/// ```rust,no_run
/// use apcal_core::{CalibrationRegistry, CallableCatalog, DigestPolicy};
///
/// let registry = CalibrationRegistry::builder()
///     .manifest_path("/data/apcal/configuration.json")
///     .models_dir("/data/apcal/models")
///     .callables(CallableCatalog::new())
///     .digest_policy(DigestPolicy::Strict)
///     .build()?;
/// # Ok::<(), apcal_core::ApcalError>(())
/// ```
#[derive(Debug, Default)]
pub struct CalibrationRegistryBuilder {
    manifest_path: Option<PathBuf>,
    manifest: Option<Manifest>,
    models_dir: Option<PathBuf>,
    callables: CallableCatalog,
    digest_policy: DigestPolicy,
    repository: Option<RepositoryConfig>,
    downloader: Option<Arc<DownloadManager>>,
    offline: bool,
}

impl CalibrationRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the manifest from `path` instead of `<home>/configuration.json`.
    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    /// Use an already parsed manifest. Takes precedence over
    /// [`manifest_path`](Self::manifest_path).
    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Directory holding model artifacts.
    ///
    /// Default: `<home>/models`
    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(dir.into());
        self
    }

    /// Functions backing callable-flavored entries.
    pub fn callables(mut self, callables: CallableCatalog) -> Self {
        self.callables = callables;
        self
    }

    /// Digest comparison policy.
    ///
    /// Default: [`DigestPolicy::Strict`]
    pub fn digest_policy(mut self, policy: DigestPolicy) -> Self {
        self.digest_policy = policy;
        self
    }

    /// Fetch missing artifacts from `repository` rather than the one the
    /// manifest names.
    pub fn repository(mut self, repository: RepositoryConfig) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Download manager used for fetches (custom retry, progress callback).
    pub fn download_manager(mut self, downloader: Arc<DownloadManager>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Never fetch; a missing artifact is reported as not found.
    ///
    /// Default: `false`
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Parse the manifest and set up the loader. No artifact is touched.
    pub fn build(self) -> Result<CalibrationRegistry> {
        let manifest = match self.manifest {
            Some(manifest) => manifest,
            None => {
                let path = match self.manifest_path {
                    Some(path) => path,
                    None => default_manifest_path()?,
                };
                Manifest::from_path(&path)?
            }
        };

        let models_dir = match self.models_dir {
            Some(dir) => dir,
            None => default_models_dir()?,
        };

        let repository_config = self.repository.or_else(|| manifest.repository().cloned());
        let repository = match repository_config {
            Some(config) if !self.offline => {
                let downloader = match self.downloader {
                    Some(downloader) => downloader,
                    None => Arc::new(DownloadManager::new()?),
                };
                Some(registered_repository(&config, downloader))
            }
            _ => None,
        };

        debug!(
            "Calibration registry: {} models, artifacts in {}",
            manifest.len(),
            models_dir.display()
        );

        let loader = ModelLoader::new(models_dir)
            .with_repository(repository)
            .with_callables(self.callables)
            .with_digest_policy(self.digest_policy);

        let load_locks = manifest
            .names()
            .map(|name| (name.to_string(), Mutex::new(())))
            .collect();

        Ok(CalibrationRegistry {
            manifest,
            loader,
            cache: Mutex::new(HashMap::new()),
            load_locks,
        })
    }
}
