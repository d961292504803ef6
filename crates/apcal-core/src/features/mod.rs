//! Feature extraction from input tables.
//!
//! Models declare an ordered list of feature columns. Before a matrix is
//! built, derivable features that the table lacks are synthesized on a copy
//! of the table; the caller's frame is never modified.

mod galactic;

pub use galactic::{cos_galactic_latitude, equatorial_to_galactic};

use crate::error::{ApcalError, Result};
use ndarray::Array2;
use polars::prelude::*;
use std::f64::consts::FRAC_PI_2;
use tracing::info;

/// Cosine of the galactic latitude.
pub const COSB: &str = "cosb";
/// Galactic latitude.
pub const LATITUDE: &str = "b";
/// Right ascension, degrees.
pub const RA: &str = "ra";
/// Declination, degrees.
pub const DEC: &str = "dec";

/// Unit assumed for a latitude column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatitudeUnit {
    Degrees,
    Radians,
}

impl LatitudeUnit {
    /// Degrees as soon as any finite `|b|` exceeds pi/2, radians otherwise.
    ///
    /// This is a heuristic: a table whose latitudes all sit within 1.57
    /// degrees of the plane is read as radians.
    pub fn infer(values: &[f64]) -> Self {
        let max_abs = values
            .iter()
            .filter(|v| !v.is_nan())
            .fold(f64::NEG_INFINITY, |acc, v| acc.max(v.abs()));
        if max_abs > FRAC_PI_2 {
            LatitudeUnit::Degrees
        } else {
            LatitudeUnit::Radians
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LatitudeUnit::Degrees => "degrees",
            LatitudeUnit::Radians => "radians",
        }
    }
}

/// Read a column as `f64`, nulls (and unparsable values) as NaN.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

/// Compute `cos(b)` for every row from `b`, or from `ra`/`dec`.
pub fn derive_cosb(df: &DataFrame) -> Result<Vec<f64>> {
    if df.get_column_index(LATITUDE).is_some() {
        let latitude = column_values(df, LATITUDE)?;
        let unit = LatitudeUnit::infer(&latitude);
        info!("Automatically adding cosb from b [assuming {}]", unit.as_str());
        return Ok(latitude
            .into_iter()
            .map(|b| match unit {
                LatitudeUnit::Degrees => b.to_radians().cos(),
                LatitudeUnit::Radians => b.cos(),
            })
            .collect());
    }

    if df.get_column_index(RA).is_some() && df.get_column_index(DEC).is_some() {
        info!("Automatically adding cosb from ra, dec");
        let ra = column_values(df, RA)?;
        let dec = column_values(df, DEC)?;
        return Ok(ra
            .into_iter()
            .zip(dec)
            .map(|(ra, dec)| cos_galactic_latitude(ra, dec))
            .collect());
    }

    Err(ApcalError::MissingPosition)
}

/// Copy of `df` with derivable `features` it lacks attached as columns.
pub fn with_derived_features(df: &DataFrame, features: &[String]) -> Result<DataFrame> {
    let mut augmented = df.clone();
    let needs_cosb = features.iter().any(|f| f == COSB);
    if needs_cosb && df.get_column_index(COSB).is_none() {
        let cosb: Column = Series::new(COSB.into(), derive_cosb(df)?).into();
        augmented.with_column(cosb)?;
    }
    Ok(augmented)
}

/// Names of `features` absent from `df`, in the given order.
pub fn missing_features(df: &DataFrame, features: &[String]) -> Vec<String> {
    features
        .iter()
        .filter(|name| df.get_column_index(name).is_none())
        .cloned()
        .collect()
}

/// Fail with [`ApcalError::MissingFeatures`] unless every feature is a column.
pub fn ensure_features(df: &DataFrame, features: &[String]) -> Result<()> {
    let missing = missing_features(df, features);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApcalError::MissingFeatures { missing })
    }
}

/// Row-major `height x features.len()` matrix, columns in `features` order.
///
/// Derivable features are synthesized first; anything still missing is an
/// error listing the absent names.
pub fn feature_matrix(df: &DataFrame, features: &[String]) -> Result<Array2<f64>> {
    let augmented = with_derived_features(df, features)?;
    ensure_features(&augmented, features)?;

    let columns = features
        .iter()
        .map(|name| column_values(&augmented, name))
        .collect::<Result<Vec<_>>>()?;

    Ok(Array2::from_shape_fn(
        (augmented.height(), features.len()),
        |(row, col)| columns[col][row],
    ))
}

/// Values of the label column the correction is subtracted from.
pub fn label_values(df: &DataFrame, label: &str) -> Result<Vec<f64>> {
    if df.get_column_index(label).is_none() {
        return Err(ApcalError::MissingLabel {
            label: label.to_string(),
        });
    }
    column_values(df, label)
}
