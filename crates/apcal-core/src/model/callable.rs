//! Catalog of in-process calibration functions.
//!
//! Callable-flavored manifest entries name an artifact file whose stem
//! (`mh_mars` for `mh_mars.py`) selects a module in the catalog. A module maps
//! sub-model names to functions over the feature matrix.

use ndarray::ArrayView2;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A calibration function: one value per feature-matrix row.
pub type CallableFn = dyn for<'a> Fn(ArrayView2<'a, f64>) -> Vec<f64> + Send + Sync;

/// Named functions provided by one artifact.
pub type CallableModule = BTreeMap<String, Arc<CallableFn>>;

/// Box a closure as a [`CallableFn`].
pub fn callable<F>(function: F) -> Arc<CallableFn>
where
    F: for<'a> Fn(ArrayView2<'a, f64>) -> Vec<f64> + Send + Sync + 'static,
{
    Arc::new(function)
}

/// Artifact stem -> module.
#[derive(Clone, Default)]
pub struct CallableCatalog {
    modules: HashMap<String, CallableModule>,
}

impl CallableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` as `name` in the module for artifact `stem`.
    pub fn register<F>(mut self, stem: impl Into<String>, name: impl Into<String>, function: F) -> Self
    where
        F: for<'a> Fn(ArrayView2<'a, f64>) -> Vec<f64> + Send + Sync + 'static,
    {
        self.insert(stem, name, function);
        self
    }

    /// In-place form of [`CallableCatalog::register`].
    pub fn insert<F>(&mut self, stem: impl Into<String>, name: impl Into<String>, function: F)
    where
        F: for<'a> Fn(ArrayView2<'a, f64>) -> Vec<f64> + Send + Sync + 'static,
    {
        self.modules
            .entry(stem.into())
            .or_default()
            .insert(name.into(), callable(function));
    }

    pub fn module(&self, stem: &str) -> Option<&CallableModule> {
        self.modules.get(stem)
    }

    pub fn contains(&self, stem: &str) -> bool {
        self.modules.contains_key(stem)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for CallableCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<_> = self
            .modules
            .iter()
            .map(|(stem, module)| (stem.as_str(), module.keys().collect::<Vec<_>>()))
            .collect();
        modules.sort();
        f.debug_struct("CallableCatalog")
            .field("modules", &modules)
            .finish()
    }
}
