//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use apcal_core::{compute_md5, CalibrationRegistry, PredictorKind};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<file>: <md5>` for each file.
pub fn checksum_lines(files: &[PathBuf]) -> Result<Vec<String>> {
    files
        .iter()
        .map(|file| {
            let digest = compute_md5(file)
                .with_context(|| format!("Failed to checksum {}", file.display()))?;
            Ok(format!("{}: {}", file.display(), digest))
        })
        .collect()
}

/// `<model>: <version>` for each manifest entry.
pub fn version_lines(registry: &CalibrationRegistry) -> Vec<String> {
    registry
        .model_versions()
        .into_iter()
        .map(|(name, version)| format!("{}: {}", name, version.as_deref().unwrap_or("unknown")))
        .collect()
}

/// Load `models`, or every manifest model when empty.
///
/// Callable-flavored models are only downloaded and verified: their
/// functions are registered by embedding programs, not by this binary.
pub fn fetch(registry: &CalibrationRegistry, models: &[String]) -> Result<()> {
    let names = if models.is_empty() {
        registry.model_names()
    } else {
        models.to_vec()
    };
    for name in &names {
        let fetched = if is_callable(registry, name)? {
            registry.fetch_artifact(name).map(|_| ())
        } else {
            registry.get(name).map(|_| ())
        };
        fetched.with_context(|| format!("Failed to fetch model {}", name))?;
        info!("Model {} is ready", name);
    }
    Ok(())
}

fn is_callable(registry: &CalibrationRegistry, model: &str) -> Result<bool> {
    let entry = registry.manifest().entry(model)?;
    Ok(entry.predictor_kind() == PredictorKind::Callable)
}

/// Calibrate the CSV at `input` with `model` and write it to `output` with
/// the corrected column appended. Returns the number of rows.
pub fn calibrate_csv(
    registry: &CalibrationRegistry,
    model: &str,
    input: &Path,
    output: &Path,
    column: Option<&str>,
) -> Result<usize> {
    if is_callable(registry, model)? {
        bail!(
            "Model {} is backed by registered functions; callable models can only be \
             applied from a program that registers them with \
             CalibrationRegistryBuilder::callables",
            model
        );
    }
    let calibration = registry.get(model)?;
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(input.to_path_buf()))
        .and_then(|reader| reader.finish())
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let column = column
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_calibrated", calibration.label()));
    let corrected = calibration.predict_series(&df, &column)?;
    df.with_column(corrected)?;

    let mut file = std::fs::File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "Wrote {} rows with column {} to {}",
        df.height(),
        column,
        output.display()
    );
    Ok(df.height())
}
