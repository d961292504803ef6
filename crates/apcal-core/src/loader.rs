//! Configuration-driven model loading.
//!
//! Turns a manifest entry into a [`CalibrationModel`]:
//!
//! 1. resolve the artifact path (verbatim if it exists, else under the models
//!    directory);
//! 2. fetch it from the configured repository when absent;
//! 3. verify its digest against the manifest;
//! 4. deserialize the predictors (estimator artifact) or look them up in the
//!    callable catalog;
//! 5. wrap them, grouped by category when the entry declares `groupby`.

use crate::error::{ApcalError, Result};
use crate::integrity::{verify_artifact, DigestPolicy};
use crate::manifest::{Manifest, ModelEntry, PredictorKind};
use crate::model::{
    load_estimator_artifacts, CalibrationModel, CallableCatalog, ModelWrapper, Predictor,
};
use crate::repository::Repository;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Loads calibration models described by manifest entries.
#[derive(Debug)]
pub struct ModelLoader {
    models_dir: PathBuf,
    repository: Option<Box<dyn Repository>>,
    callables: CallableCatalog,
    digest_policy: DigestPolicy,
}

impl ModelLoader {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            repository: None,
            callables: CallableCatalog::new(),
            digest_policy: DigestPolicy::default(),
        }
    }

    /// Repository used to fetch artifacts missing from disk.
    pub fn with_repository(mut self, repository: Option<Box<dyn Repository>>) -> Self {
        self.repository = repository;
        self
    }

    pub fn with_callables(mut self, callables: CallableCatalog) -> Self {
        self.callables = callables;
        self
    }

    pub fn with_digest_policy(mut self, policy: DigestPolicy) -> Self {
        self.digest_policy = policy;
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn repository(&self) -> Option<&dyn Repository> {
        self.repository.as_deref()
    }

    /// Where the artifact of `entry` is expected on disk.
    pub fn resolve_artifact_path(&self, entry: &ModelEntry) -> PathBuf {
        let verbatim = Path::new(&entry.filename);
        if verbatim.exists() {
            return verbatim.to_path_buf();
        }
        self.models_dir.join(entry.artifact_file_name())
    }

    /// Make sure the artifact of `name` is on disk and verified; returns its path.
    pub fn ensure_artifact(&self, name: &str, entry: &ModelEntry) -> Result<PathBuf> {
        let mut path = self.resolve_artifact_path(entry);

        if !path.exists() {
            if let Some(repository) = &self.repository {
                info!(
                    "Model {} is not available locally, fetching {}",
                    name, entry.filename
                );
                path = repository.fetch(&entry.artifact_file_name(), &self.models_dir)?;
            }
        }

        if !path.exists() {
            return Err(ApcalError::ArtifactNotFound {
                model: name.to_string(),
                path,
            });
        }

        verify_artifact(name, &path, &entry.md5sum, self.digest_policy)?;
        debug!("Verified artifact {} for model {}", path.display(), name);
        Ok(path)
    }

    /// Load the model `name` from `manifest`.
    pub fn load(&self, name: &str, manifest: &Manifest) -> Result<CalibrationModel> {
        let entry = manifest.entry(name)?;
        let path = self.ensure_artifact(name, entry)?;

        let predictors = self.read_predictors(name, entry, &path)?;
        if predictors.is_empty() {
            return Err(ApcalError::config(format!(
                "Artifact {} of model {} defines no sub-models",
                path.display(),
                name
            )));
        }

        let member_features: Vec<String> = match &entry.groupby {
            Some(column) => entry
                .features
                .iter()
                .filter(|feature| *feature != column)
                .cloned()
                .collect(),
            None => entry.features.clone(),
        };

        let wrappers: BTreeMap<String, ModelWrapper> = predictors
            .into_iter()
            .map(|(member, predictor)| {
                let wrapper = ModelWrapper::new(
                    member.clone(),
                    member_features.clone(),
                    entry.label.clone(),
                    predictor,
                );
                (member, wrapper)
            })
            .collect();

        info!(
            "Loaded model {} ({} sub-models, version {})",
            name,
            wrappers.len(),
            entry.version.as_deref().unwrap_or("unknown")
        );

        let model = match &entry.groupby {
            Some(column) => CalibrationModel::grouped(
                name,
                entry.features.clone(),
                entry.label.clone(),
                column.clone(),
                wrappers,
            ),
            None => CalibrationModel::single(
                name,
                entry.features.clone(),
                entry.label.clone(),
                wrappers,
            ),
        };
        Ok(model.with_version(entry.version.clone()))
    }

    fn read_predictors(
        &self,
        name: &str,
        entry: &ModelEntry,
        path: &Path,
    ) -> Result<BTreeMap<String, Predictor>> {
        match entry.predictor_kind() {
            PredictorKind::Estimator => Ok(load_estimator_artifacts(path)?
                .into_iter()
                .map(|(member, estimator)| (member, Predictor::Estimator(estimator)))
                .collect()),
            PredictorKind::Callable => {
                let stem = entry.artifact_stem();
                let module =
                    self.callables
                        .module(&stem)
                        .ok_or_else(|| ApcalError::UnknownCallable {
                            model: name.to_string(),
                            artifact: stem.clone(),
                        })?;
                Ok(module
                    .iter()
                    .map(|(member, function)| {
                        (member.clone(), Predictor::Callable(function.clone()))
                    })
                    .collect())
            }
        }
    }
}
