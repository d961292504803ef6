//! Estimator predictors and their serialized artifact format.
//!
//! An estimator artifact is a JSON object mapping sub-model names to tagged
//! estimators:
//!
//! ```json
//! {
//!   "teff": { "kind": "linear", "intercept": 12.0, "coefficients": [0.5, -3.0] },
//!   "mh_marcs": {
//!     "kind": "mars",
//!     "intercept": -0.2,
//!     "terms": [
//!       { "coefficient": 1.5, "factors": [{ "type": "hinge", "feature": 0, "knot": 0.3 }] },
//!       { "coefficient": -0.7, "factors": [
//!           { "type": "hinge", "feature": 1, "knot": 0.5, "reflected": true },
//!           { "type": "linear", "feature": 2 } ] }
//!     ]
//!   }
//! }
//! ```
//!
//! Parameters are produced by external training; this module only evaluates
//! them.

use crate::error::{ApcalError, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A batch predictor over a feature matrix (rows are samples, columns are
/// features in manifest order).
pub trait Estimator: Send + Sync + fmt::Debug {
    /// One prediction per input row.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>>;
}

/// `intercept + sum(coefficients[j] * x[j])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

/// One factor of a MARS basis function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BasisFactor {
    /// `x[feature]`
    Linear { feature: usize },
    /// `max(0, x[feature] - knot)`, or `max(0, knot - x[feature])` when reflected.
    Hinge {
        feature: usize,
        knot: f64,
        #[serde(default)]
        reflected: bool,
    },
}

impl BasisFactor {
    fn feature(&self) -> usize {
        match self {
            BasisFactor::Linear { feature } | BasisFactor::Hinge { feature, .. } => *feature,
        }
    }

    fn evaluate(&self, row: &ArrayView1<'_, f64>) -> f64 {
        match *self {
            BasisFactor::Linear { feature } => row[feature],
            BasisFactor::Hinge {
                feature,
                knot,
                reflected,
            } => {
                let delta = if reflected {
                    knot - row[feature]
                } else {
                    row[feature] - knot
                };
                delta.max(0.0)
            }
        }
    }
}

/// A product of basis factors scaled by a coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarsTerm {
    pub coefficient: f64,
    pub factors: Vec<BasisFactor>,
}

/// Multivariate adaptive regression spline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarsModel {
    pub intercept: f64,
    pub terms: Vec<MarsTerm>,
}

impl MarsModel {
    fn evaluate(&self, row: &ArrayView1<'_, f64>) -> f64 {
        self.terms.iter().fold(self.intercept, |acc, term| {
            acc + term.coefficient
                * term
                    .factors
                    .iter()
                    .map(|factor| factor.evaluate(row))
                    .product::<f64>()
        })
    }
}

/// Serialized estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EstimatorArtifact {
    Linear(LinearModel),
    Mars(MarsModel),
}

impl EstimatorArtifact {
    /// Smallest number of feature columns the estimator can be applied to.
    pub fn required_features(&self) -> usize {
        match self {
            EstimatorArtifact::Linear(model) => model.coefficients.len(),
            EstimatorArtifact::Mars(model) => model
                .terms
                .iter()
                .flat_map(|term| term.factors.iter())
                .map(|factor| factor.feature() + 1)
                .max()
                .unwrap_or(0),
        }
    }
}

impl Estimator for EstimatorArtifact {
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        let required = self.required_features();
        let width = features.ncols();
        let width_ok = match self {
            EstimatorArtifact::Linear(_) => width == required,
            EstimatorArtifact::Mars(_) => width >= required,
        };
        if !width_ok {
            return Err(ApcalError::Other(format!(
                "estimator expects {} features, got {}",
                required, width
            )));
        }

        Ok(match self {
            EstimatorArtifact::Linear(model) => features
                .dot(&ArrayView1::from(model.coefficients.as_slice()))
                .iter()
                .map(|value| value + model.intercept)
                .collect(),
            EstimatorArtifact::Mars(model) => features
                .rows()
                .into_iter()
                .map(|row| model.evaluate(&row))
                .collect(),
        })
    }
}

/// Read an estimator artifact: a map of sub-model name to estimator.
pub fn load_estimator_artifacts(
    path: impl AsRef<Path>,
) -> Result<BTreeMap<String, Arc<dyn Estimator>>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ApcalError::io_with_path(e, path))?;
    let artifacts: BTreeMap<String, EstimatorArtifact> =
        serde_json::from_str(&content).map_err(|e| ApcalError::Json {
            message: format!("Failed to parse estimator artifact {}: {}", path.display(), e),
            source: Some(e),
        })?;

    Ok(artifacts
        .into_iter()
        .map(|(name, artifact)| (name, Arc::new(artifact) as Arc<dyn Estimator>))
        .collect())
}
