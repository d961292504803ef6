//! Calibration models.
//!
//! A [`CalibrationModel`] is what the registry hands out: a named transform
//! from a table to corrected label values. It either applies one
//! [`ModelWrapper`] to every row, or routes each row to the wrapper of its
//! category (see [`Dispatch::Grouped`]).

mod callable;
mod estimator;
mod wrapper;

pub use callable::{callable, CallableCatalog, CallableFn, CallableModule};
pub use estimator::{
    load_estimator_artifacts, BasisFactor, Estimator, EstimatorArtifact, LinearModel, MarsModel,
    MarsTerm,
};
pub use wrapper::{ModelWrapper, Predictor};

use crate::error::{ApcalError, Result};
use crate::features::{ensure_features, label_values, with_derived_features};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// How rows reach the wrappers of a model.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Every row goes through one wrapper.
    Single(BTreeMap<String, ModelWrapper>),
    /// Rows are routed by the value of `column` to the wrapper keyed
    /// `{model}_{value lowercased}`.
    Grouped {
        column: String,
        members: BTreeMap<String, ModelWrapper>,
    },
}

/// A named calibration built from one manifest entry.
#[derive(Debug, Clone)]
pub struct CalibrationModel {
    name: String,
    features: Vec<String>,
    label: String,
    version: Option<String>,
    dispatch: Dispatch,
}

impl CalibrationModel {
    /// A model applying one of `wrappers` to every row.
    pub fn single(
        name: impl Into<String>,
        features: Vec<String>,
        label: impl Into<String>,
        wrappers: BTreeMap<String, ModelWrapper>,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            label: label.into(),
            version: None,
            dispatch: Dispatch::Single(wrappers),
        }
    }

    /// A model routing rows by `column` to `members`.
    pub fn grouped(
        name: impl Into<String>,
        features: Vec<String>,
        label: impl Into<String>,
        column: impl Into<String>,
        members: BTreeMap<String, ModelWrapper>,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            label: label.into(),
            version: None,
            dispatch: Dispatch::Grouped {
                column: column.into(),
                members,
            },
        }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feature columns as declared, including the grouping column if any.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn is_grouped(&self) -> bool {
        matches!(self.dispatch, Dispatch::Grouped { .. })
    }

    /// Names of the wrappers this model holds.
    pub fn members(&self) -> Vec<&str> {
        match &self.dispatch {
            Dispatch::Single(wrappers) => wrappers.keys().map(String::as_str).collect(),
            Dispatch::Grouped { members, .. } => members.keys().map(String::as_str).collect(),
        }
    }

    /// Lookup key of the sub-model for a group value.
    pub fn group_key(&self, group: &str) -> String {
        format!("{}_{}", self.name, group.to_lowercase())
    }

    /// Corrected label values for every row of `df`, in row order.
    pub fn predict(&self, df: &DataFrame) -> Result<Vec<f64>> {
        match &self.dispatch {
            Dispatch::Single(wrappers) => self.single_wrapper(wrappers)?.predict(df),
            Dispatch::Grouped { column, members } => self.predict_grouped(df, column, members),
        }
    }

    /// [`CalibrationModel::predict`] as a named column.
    pub fn predict_series(&self, df: &DataFrame, name: &str) -> Result<Series> {
        Ok(Series::new(name.into(), self.predict(df)?))
    }

    fn single_wrapper<'a>(
        &self,
        wrappers: &'a BTreeMap<String, ModelWrapper>,
    ) -> Result<&'a ModelWrapper> {
        if wrappers.len() == 1 {
            if let Some(wrapper) = wrappers.values().next() {
                return Ok(wrapper);
            }
        }
        wrappers.get(&self.name).ok_or_else(|| {
            ApcalError::config(format!(
                "Model '{}' holds {} sub-models ({}) and none is named after it",
                self.name,
                wrappers.len(),
                wrappers.keys().cloned().collect::<Vec<_>>().join(",")
            ))
        })
    }

    fn predict_grouped(
        &self,
        df: &DataFrame,
        column: &str,
        members: &BTreeMap<String, ModelWrapper>,
    ) -> Result<Vec<f64>> {
        let mut required = self.features.clone();
        if !required.iter().any(|f| f == column) {
            required.push(column.to_string());
        }

        // Derive on the whole table so the latitude unit is inferred once.
        let table = with_derived_features(df, &required)?;
        ensure_features(&table, &required)?;
        label_values(&table, &self.label)?;

        let mut partitions: BTreeMap<String, Vec<IdxSize>> = BTreeMap::new();
        for (row, group) in group_values(&table, column)?.into_iter().enumerate() {
            if let Some(group) = group {
                partitions
                    .entry(self.group_key(&group))
                    .or_default()
                    .push(row as IdxSize);
            }
        }

        let mut corrected = vec![f64::NAN; table.height()];
        for (key, rows) in partitions {
            let member = members.get(&key).ok_or_else(|| ApcalError::UnknownGroup {
                model: self.name.clone(),
                key: key.clone(),
            })?;
            debug!("{}: {} rows -> {}", self.name, rows.len(), key);

            let subset = table.take(&IdxCa::from_vec("row".into(), rows.clone()))?;
            for (row, value) in rows.into_iter().zip(member.predict(&subset)?) {
                corrected[row as usize] = value;
            }
        }
        Ok(corrected)
    }
}

impl fmt::Display for CalibrationModel {
    /// Grouped models list the features their members see, without the
    /// grouping column.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let features: Vec<&str> = match &self.dispatch {
            Dispatch::Single(_) => self.features.iter().map(String::as_str).collect(),
            Dispatch::Grouped { column, .. } => self
                .features
                .iter()
                .filter(|feature| *feature != column)
                .map(String::as_str)
                .collect(),
        };
        write!(
            f,
            "Calibration Model '{}':\n    ({}) -> {}",
            self.name,
            features.join(", "),
            self.label
        )
    }
}

/// Values of a grouping column as strings. Numeric groups use their string
/// form; nulls stay `None`.
pub fn group_values(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    let values = df.column(column)?.cast(&DataType::String)?;
    Ok(values
        .str()?
        .iter()
        .map(|value| value.map(str::to_string))
        .collect())
}
