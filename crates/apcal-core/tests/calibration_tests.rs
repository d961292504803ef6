//! Integration tests for calibrating tables through the registry.

mod common;

use apcal_core::ApcalError;
use approx::assert_abs_diff_eq;
use common::*;
use polars::prelude::*;

// Residual corrections of the seeded table under the fixture models.
const MH_EXPECTED: [f64; 2] = [-0.6011793462971141, -0.46234761610381325];
const TEFF_EXPECTED: [f64; 2] = [-13.893607034393744, -23.553325246706173];

fn set_value(df: &DataFrame, column: &str, row: usize, value: f64) -> DataFrame {
    let mut values: Vec<f64> = df
        .column(column)
        .unwrap()
        .f64()
        .unwrap()
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    values[row] = value;
    let mut out = df.clone();
    out.with_column(Series::new(column.into(), values)).unwrap();
    out
}

#[test]
fn test_metallicity_with_all_columns_available() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);
    let df = seeded_table();

    let calibrated = registry.calibrate_metallicity(&df).unwrap();

    assert_eq!(calibrated.len(), df.height());
    for (value, expected) in calibrated.iter().zip(MH_EXPECTED) {
        assert_abs_diff_eq!(*value, expected, epsilon = 1e-8);
    }
}

#[test]
fn test_teff_with_all_columns_available() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);

    let calibrated = registry.calibrate_teff(&seeded_table()).unwrap();

    assert_eq!(calibrated.len(), 2);
    for (value, expected) in calibrated.iter().zip(TEFF_EXPECTED) {
        assert_abs_diff_eq!(*value, expected, epsilon = 1e-8);
    }
}

#[test]
fn test_metallicity_missing_columns() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);
    let df = seeded_table().drop_many(["azero_gspphot", "ag_gspphot"]);

    let err = registry.get("mh").unwrap().predict(&df).unwrap_err();
    assert!(matches!(err, ApcalError::MissingFeatures { .. }));

    let message = err.to_string();
    let missing: Vec<&str> = message.split(": ").nth(1).unwrap().split(',').collect();
    assert_eq!(missing, vec!["azero_gspphot", "ag_gspphot"]);
}

#[test]
fn test_teff_missing_columns_in_manifest_order() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);
    let df = seeded_table().drop_many(["ag_gspphot", "azero_gspphot"]);

    let err = registry.calibrate_teff(&df).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Missing features from input data: azero_gspphot,ag_gspphot"
    );
}

#[test]
fn test_nan_feature_only_affects_its_row() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);
    let df = set_value(&seeded_table(), "teff_gspphot", 0, f64::NAN);

    let mh = registry.calibrate_metallicity(&df).unwrap();
    assert!(mh[0].is_nan());
    assert_abs_diff_eq!(mh[1], MH_EXPECTED[1], epsilon = 1e-8);

    let df = set_value(&seeded_table(), "mh_gspphot", 0, f64::NAN);
    let teff = registry.calibrate_teff(&df).unwrap();
    assert!(teff[0].is_nan());
    assert_abs_diff_eq!(teff[1], TEFF_EXPECTED[1], epsilon = 1e-8);
}

#[test]
fn test_cosb_from_b_in_degrees() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);

    let latitudes: [f64; 2] = [-35.0, 71.5];
    let mut without_cosb = seeded_table().drop("cosb").unwrap();
    without_cosb
        .with_column(Series::new("b".into(), latitudes.to_vec()))
        .unwrap();
    let explicit = set_value(&seeded_table(), "cosb", 0, latitudes[0].to_radians().cos());
    let explicit = set_value(&explicit, "cosb", 1, latitudes[1].to_radians().cos());

    let derived = registry.calibrate_metallicity(&without_cosb).unwrap();
    let reference = registry.calibrate_metallicity(&explicit).unwrap();

    assert!(derived.iter().all(|v| v.is_finite()));
    for (d, r) in derived.iter().zip(&reference) {
        assert_abs_diff_eq!(*d, *r, epsilon = 1e-12);
    }
    // The caller's table is left as it was.
    assert!(without_cosb.column("cosb").is_err());
}

#[test]
fn test_cosb_from_b_in_radians() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);

    let latitudes: [f64; 2] = [0.2, -1.1];
    let mut without_cosb = seeded_table().drop("cosb").unwrap();
    without_cosb
        .with_column(Series::new("b".into(), latitudes.to_vec()))
        .unwrap();
    let explicit = set_value(&seeded_table(), "cosb", 0, latitudes[0].cos());
    let explicit = set_value(&explicit, "cosb", 1, latitudes[1].cos());

    let derived = registry.calibrate_teff(&without_cosb).unwrap();
    let reference = registry.calibrate_teff(&explicit).unwrap();
    for (d, r) in derived.iter().zip(&reference) {
        assert_abs_diff_eq!(*d, *r, epsilon = 1e-12);
    }
}

#[test]
fn test_cosb_from_ra_dec() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);

    let mut df = seeded_table().drop("cosb").unwrap();
    df.with_column(Series::new("ra".into(), vec![-120.5, 33.0]))
        .unwrap();
    df.with_column(Series::new("dec".into(), vec![-60.0, 75.2]))
        .unwrap();

    let mh = registry.calibrate_metallicity(&df).unwrap();
    assert_eq!(mh.len(), 2);
    assert!(mh.iter().all(|v| v.is_finite()));
}

#[test]
fn test_missing_position_columns() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);
    let df = seeded_table().drop("cosb").unwrap();

    let err = registry.calibrate_teff(&df).unwrap_err();
    assert!(matches!(err, ApcalError::MissingPosition));
}

#[test]
fn test_grouped_rows_keep_input_order() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);

    // Same rows, groups swapped: each row must get its own group's correction.
    let mut df = seeded_table();
    df.with_column(Series::new("libname_gspphot".into(), ["MARCS", "Phoenix"]))
        .unwrap();

    let swapped = registry.calibrate_metallicity(&df).unwrap();
    assert_abs_diff_eq!(swapped[0], -0.0035493219729271497, epsilon = 1e-8);
    assert_abs_diff_eq!(swapped[1], -0.21052891360013748, epsilon = 1e-8);
}

#[test]
fn test_unknown_group_is_an_error() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);

    let mut df = seeded_table();
    df.with_column(Series::new("libname_gspphot".into(), ["phoenix", "OB"]))
        .unwrap();

    match registry.calibrate_metallicity(&df).unwrap_err() {
        ApcalError::UnknownGroup { model, key } => {
            assert_eq!(model, "mh");
            assert_eq!(key, "mh_ob");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_model_display() {
    let (dir, manifest) = model_home();
    let registry = registry_for(dir.path(), manifest);

    let teff = registry.get("teff").unwrap();
    assert_eq!(
        teff.to_string(),
        format!(
            "Calibration Model 'teff':\n    ({}) -> teff_gspphot",
            FEATURES.join(", ")
        )
    );
    assert_eq!(registry.to_string(), "Calibration Models\n    teff");

    let mh = registry.get("mh").unwrap();
    assert_eq!(
        mh.to_string(),
        format!(
            "Calibration Model 'mh':\n    ({}) -> mh_gspphot",
            FEATURES.join(", ")
        )
    );
    assert_eq!(registry.to_string(), "Calibration Models\n    mh, teff");
}
