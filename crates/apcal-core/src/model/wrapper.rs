//! A single predictor bound to its feature list and label column.

use crate::error::{ApcalError, Result};
use crate::features::{feature_matrix, label_values};
use crate::manifest::PredictorKind;
use crate::model::callable::CallableFn;
use crate::model::estimator::Estimator;
use ndarray::{ArrayView2, Axis};
use polars::prelude::DataFrame;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The underlying predictor of a wrapper.
#[derive(Clone)]
pub enum Predictor {
    Estimator(Arc<dyn Estimator>),
    Callable(Arc<CallableFn>),
}

impl Predictor {
    pub fn kind(&self) -> PredictorKind {
        match self {
            Predictor::Estimator(_) => PredictorKind::Estimator,
            Predictor::Callable(_) => PredictorKind::Callable,
        }
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        match self {
            Predictor::Estimator(estimator) => estimator.predict(features),
            Predictor::Callable(function) => Ok(function(features)),
        }
    }
}

impl fmt::Debug for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predictor::Estimator(estimator) => f.debug_tuple("Estimator").field(estimator).finish(),
            Predictor::Callable(_) => f.write_str("Callable"),
        }
    }
}

/// Applies one predictor as a residual correction: `label - prediction`.
#[derive(Debug, Clone)]
pub struct ModelWrapper {
    name: String,
    features: Vec<String>,
    label: String,
    predictor: Predictor,
}

impl ModelWrapper {
    pub fn new(
        name: impl Into<String>,
        features: Vec<String>,
        label: impl Into<String>,
        predictor: Predictor,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            label: label.into(),
            predictor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> PredictorKind {
        self.predictor.kind()
    }

    /// Corrected label values, one per row of `df`, in row order.
    ///
    /// Rows with any non-finite feature are not passed to the predictor and
    /// come back as NaN.
    pub fn predict(&self, df: &DataFrame) -> Result<Vec<f64>> {
        let matrix = feature_matrix(df, &self.features)?;
        let labels = label_values(df, &self.label)?;

        let valid: Vec<usize> = matrix
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|value| value.is_finite()))
            .map(|(index, _)| index)
            .collect();

        let mut corrected = vec![f64::NAN; df.height()];
        if valid.is_empty() {
            debug!("{}: no rows with finite features", self.name);
            return Ok(corrected);
        }
        if valid.len() < df.height() {
            debug!(
                "{}: skipping {} rows with non-finite features",
                self.name,
                df.height() - valid.len()
            );
        }

        let subset = matrix.select(Axis(0), &valid);
        let predictions = self
            .predictor
            .predict(subset.view())
            .map_err(|e| match e {
                ApcalError::Predictor { .. } => e,
                other => ApcalError::Predictor {
                    model: self.name.clone(),
                    message: other.to_string(),
                },
            })?;

        if predictions.len() != valid.len() {
            return Err(ApcalError::Predictor {
                model: self.name.clone(),
                message: format!(
                    "returned {} values for {} rows",
                    predictions.len(),
                    valid.len()
                ),
            });
        }

        for (row, prediction) in valid.into_iter().zip(predictions) {
            corrected[row] = labels[row] - prediction;
        }
        Ok(corrected)
    }
}
