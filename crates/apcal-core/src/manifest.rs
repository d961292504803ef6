//! Model manifest: the configuration document describing every calibration.
//!
//! The manifest is a JSON object keyed by model name. The reserved `models`
//! key carries the remote repository used to repair missing artifacts:
//!
//! ```json
//! {
//!   "models": { "repository": { "url": "https://example.org/d/abc", "type": "keeper" } },
//!   "mh": {
//!     "filename": "mh_mars.py",
//!     "md5sum": "0123456789abcdef0123456789abcdef",
//!     "features": ["teff_gspphot", "cosb", "libname_gspphot"],
//!     "label": "mh_gspphot",
//!     "groupby": "libname_gspphot",
//!     "callable": true,
//!     "version": "1.0"
//!   }
//! }
//! ```

use crate::error::{ApcalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Remote storage backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// Plain HTTP layout: `{url}/{filename}`.
    Http,
    /// Keeper/Seafile shared folder: `{url}/files/?p=%2F{filename}&dl=1`.
    Keeper,
}

impl RepositoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryKind::Http => "http",
            RepositoryKind::Keeper => "keeper",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "http" => Ok(RepositoryKind::Http),
            "keeper" => Ok(RepositoryKind::Keeper),
            _ => Err(ApcalError::UnknownRepository(tag.to_string())),
        }
    }
}

impl std::fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote repository holding the model artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: RepositoryKind,
}

/// The reserved `models` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsSection {
    #[serde(default)]
    pub repository: Option<RepositoryConfig>,
}

/// How the underlying predictor of an entry is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredictorKind {
    /// Deserialized estimator object with a batch `predict`.
    Estimator,
    /// Statically registered function over the feature matrix.
    Callable,
}

/// One named model's configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Artifact file name, or a path used verbatim when it exists.
    pub filename: String,
    /// Expected MD5 digest of the artifact (hex).
    pub md5sum: String,
    /// Required feature columns, in the order the predictor expects them.
    pub features: Vec<String>,
    /// Column the predicted bias is subtracted from.
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groupby: Option<String>,
    #[serde(default)]
    pub callable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModelEntry {
    pub fn predictor_kind(&self) -> PredictorKind {
        if self.callable {
            PredictorKind::Callable
        } else {
            PredictorKind::Estimator
        }
    }

    /// Artifact base name without extension, used to look up callables.
    pub fn artifact_stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.filename.clone())
    }

    /// Artifact file name without any directory part.
    pub fn artifact_file_name(&self) -> String {
        Path::new(&self.filename)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.filename.clone())
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(ApcalError::config(format!("Model '{}' has empty filename", name)));
        }
        if self.md5sum.trim().is_empty() {
            return Err(ApcalError::config(format!("Model '{}' has empty md5sum", name)));
        }
        if self.label.trim().is_empty() {
            return Err(ApcalError::config(format!("Model '{}' has empty label", name)));
        }
        if self.features.is_empty() {
            return Err(ApcalError::config(format!("Model '{}' declares no features", name)));
        }
        if let Some(groupby) = &self.groupby {
            if groupby.trim().is_empty() {
                return Err(ApcalError::config(format!(
                    "Model '{}' has an empty groupby column",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Parsed manifest. Immutable once read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub models: ModelsSection,
    #[serde(flatten)]
    entries: BTreeMap<String, ModelEntry>,
}

impl Manifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(content).map_err(|e| ApcalError::Config {
            message: format!("Failed to parse model manifest: {}", e),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ApcalError::Config {
            message: format!("Failed to read model manifest {}: {}", path.display(), e),
        })?;
        let manifest = Self::from_json(&content)?;
        debug!(
            "Read manifest {} ({} models)",
            path.display(),
            manifest.entries.len()
        );
        Ok(manifest)
    }

    /// Build a manifest in code.
    pub fn new(repository: Option<RepositoryConfig>) -> Self {
        Self {
            models: ModelsSection { repository },
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace an entry.
    pub fn with_entry(mut self, name: impl Into<String>, entry: ModelEntry) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.entries.get(name)
    }

    /// Look up an entry, failing for names the manifest does not define.
    pub fn entry(&self, name: &str) -> Result<&ModelEntry> {
        self.entries.get(name).ok_or_else(|| ApcalError::UnknownModel {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ModelEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn repository(&self) -> Option<&RepositoryConfig> {
        self.models.repository.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<()> {
        for (name, entry) in &self.entries {
            entry.validate(name)?;
        }
        if let Some(repo) = &self.models.repository {
            if repo.url.trim().is_empty() {
                return Err(ApcalError::config("Model repository has an empty url"));
            }
        }
        Ok(())
    }
}
