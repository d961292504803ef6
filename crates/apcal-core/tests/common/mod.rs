//! Shared fixtures for the integration tests.
//!
//! Fixture models mirror the layout of the published calibrations: a grouped
//! callable metallicity model (`mh`, one sub-model per spectral library) and
//! a MARS estimator for effective temperature (`teff`).

#![allow(dead_code)]

use apcal_core::{
    compute_md5, CalibrationRegistry, CallableCatalog, Manifest, ModelEntry, RepositoryConfig,
    RepositoryKind,
};
use polars::prelude::*;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const FEATURES: [&str; 8] = [
    "teff_gspphot",
    "logg_gspphot",
    "mh_gspphot",
    "azero_gspphot",
    "ebpminrp_gspphot",
    "ag_gspphot",
    "mg_gspphot",
    "cosb",
];

/// First two rows of a seeded uniform(0, 1) draw over [`FEATURES`].
pub const ROWS: [[f64; 8]; 2] = [
    [
        0.417022004702574,
        0.7203244934421581,
        0.00011437481734488664,
        0.30233257263183977,
        0.14675589081711304,
        0.0923385947687978,
        0.1862602113776709,
        0.34556072704304774,
    ],
    [
        0.39676747423066994,
        0.538816734003357,
        0.4191945144032948,
        0.6852195003967595,
        0.20445224973151743,
        0.8781174363909454,
        0.027387593197926163,
        0.6704675101784022,
    ],
];

pub const MH_ARTIFACT: &str = "mh_mars.py";
pub const MH_SOURCE: &str = "models = {'mh_phoenix': mh_phoenix, 'mh_marcs': mh_marcs}\n";

pub const TEFF_ARTIFACT: &str = "teff_mars.json";
pub const TEFF_SOURCE: &str = r#"{"teff": {"kind": "mars", "intercept": 10.0, "terms": [
  {"coefficient": 25.0, "factors": [{"type": "hinge", "feature": 0, "knot": 0.3}]},
  {"coefficient": -40.0, "factors": [
    {"type": "hinge", "feature": 1, "knot": 0.6, "reflected": true},
    {"type": "linear", "feature": 7}]},
  {"coefficient": 15.0, "factors": [{"type": "linear", "feature": 5}]}
]}}
"#;

fn hinge(value: f64) -> f64 {
    value.max(0.0)
}

/// Functions behind `mh_mars.py`.
pub fn mh_catalog() -> CallableCatalog {
    CallableCatalog::new()
        .register("mh_mars", "mh_phoenix", |x| {
            x.rows()
                .into_iter()
                .map(|r| 0.3 + 1.2 * r[0] - 0.8 * r[1] * r[7] + 0.5 * hinge(r[3] - 0.4))
                .collect()
        })
        .register("mh_mars", "mh_marcs", |x| {
            x.rows()
                .into_iter()
                .map(|r| -0.1 + 2.0 * r[2] + 0.25 * hinge(0.6 - r[6]))
                .collect()
        })
}

pub fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub fn mh_entry(md5sum: String) -> ModelEntry {
    let mut features = strings(&FEATURES);
    features.push("libname_gspphot".into());
    ModelEntry {
        filename: MH_ARTIFACT.into(),
        md5sum,
        features,
        label: "mh_gspphot".into(),
        groupby: Some("libname_gspphot".into()),
        callable: true,
        version: Some("1.0".into()),
    }
}

pub fn teff_entry(md5sum: String) -> ModelEntry {
    ModelEntry {
        filename: TEFF_ARTIFACT.into(),
        md5sum,
        features: strings(&FEATURES),
        label: "teff_gspphot".into(),
        groupby: None,
        callable: false,
        version: Some("1.0".into()),
    }
}

pub fn md5_of(content: &str) -> String {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), content).unwrap();
    compute_md5(file.path()).unwrap()
}

/// Models directory holding both artifacts, plus the matching manifest.
pub fn model_home() -> (TempDir, Manifest) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    std::fs::write(dir.path().join(MH_ARTIFACT), MH_SOURCE).unwrap();
    std::fs::write(dir.path().join(TEFF_ARTIFACT), TEFF_SOURCE).unwrap();

    let manifest = Manifest::new(None)
        .with_entry("mh", mh_entry(md5_of(MH_SOURCE)))
        .with_entry("teff", teff_entry(md5_of(TEFF_SOURCE)));
    (dir, manifest)
}

pub fn registry_for(dir: &Path, manifest: Manifest) -> CalibrationRegistry {
    CalibrationRegistry::builder()
        .manifest(manifest)
        .models_dir(dir)
        .callables(mh_catalog())
        .build()
        .expect("registry builds")
}

/// Seeded input table; `libname_gspphot` is `phoenix` then `marcs`.
pub fn seeded_table() -> DataFrame {
    let mut columns: Vec<Column> = FEATURES
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let values: Vec<f64> = ROWS.iter().map(|row| row[j]).collect();
            Series::new((*name).into(), values).into()
        })
        .collect();
    columns.push(Series::new("libname_gspphot".into(), ["phoenix", "marcs"]).into());
    DataFrame::new(columns).unwrap()
}

pub fn repository(url: &str, kind: RepositoryKind) -> RepositoryConfig {
    RepositoryConfig {
        url: url.to_string(),
        kind,
    }
}

/// How [`ArtifactServer`] shapes its response.
#[derive(Debug, Clone, Copy)]
pub struct ResponseShape {
    /// Pause between reading a request and answering it.
    pub delay: Duration,
    /// Send a `Content-Length` header; without it the body ends at EOF.
    pub content_length: bool,
}

impl Default for ResponseShape {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            content_length: true,
        }
    }
}

/// Loopback HTTP responder serving one fixed response.
pub struct ArtifactServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl ArtifactServer {
    /// Answer up to `max_requests` GETs with `status` and `body`.
    pub fn start(status: u16, body: &'static str, max_requests: usize) -> Self {
        Self::start_with(status, body, max_requests, ResponseShape::default())
    }

    pub fn start_with(
        status: u16,
        body: &'static str,
        max_requests: usize,
        shape: ResponseShape,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        std::thread::spawn(move || {
            for stream in listener.incoming().take(max_requests) {
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => continue,
                };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                loop {
                    let mut header = String::new();
                    if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                        break;
                    }
                }
                let target = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                seen.lock().unwrap().push(target);
                std::thread::sleep(shape.delay);

                let reason = if status == 200 { "OK" } else { "Error" };
                let length = if shape.content_length {
                    format!("Content-Length: {}\r\n", body.len())
                } else {
                    String::new()
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\n{}Connection: close\r\n\r\n{}",
                    status, reason, length, body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { base_url, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Block until at least one request has arrived.
    pub fn wait_for_request(&self) {
        while self.requests.lock().unwrap().is_empty() {
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
