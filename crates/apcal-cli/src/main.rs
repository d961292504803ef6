//! apcal - command-line front end for the GSP-Phot calibrations.
//!
//! Results go to stdout; logs go to stderr.

mod commands;

use anyhow::Result;
use apcal_core::{CalibrationRegistry, DigestPolicy};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "apcal")]
#[command(version, about = "Apply Gaia DR3 GSP-Phot calibration models")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Model manifest (defaults to $APCAL_HOME/configuration.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding model artifacts (defaults to $APCAL_HOME/models)
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Never download missing artifacts
    #[arg(long, global = true)]
    offline: bool,

    /// Accept artifacts whose digest only differs by CRLF line endings
    #[arg(long, global = true)]
    normalize_line_endings: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the MD5 digest of each file
    Checksum {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the models in the manifest with their versions
    Versions,
    /// Download and verify models (all models when none are named)
    Fetch { models: Vec<String> },
    /// Calibrate a CSV table and write it back with the corrected column
    Calibrate {
        /// Model name, e.g. mh or teff
        #[arg(short, long)]
        model: String,

        /// Input CSV with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,

        /// Name of the added column (defaults to <label>_calibrated)
        #[arg(long)]
        column: Option<String>,
    },
}

impl Args {
    fn registry(&self) -> Result<CalibrationRegistry> {
        let mut builder = CalibrationRegistry::builder().offline(self.offline);
        if let Some(path) = &self.config {
            builder = builder.manifest_path(path);
        }
        if let Some(dir) = &self.models_dir {
            builder = builder.models_dir(dir);
        }
        if self.normalize_line_endings {
            builder = builder.digest_policy(DigestPolicy::NormalizeLineEndings);
        }
        Ok(builder.build()?)
    }
}

fn init_logging(debug: bool) {
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    // RUST_LOG wins over --debug when set.
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        let log_level = if debug { Level::DEBUG } else { Level::INFO };
        builder.with_max_level(log_level).init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);
    debug!("apcal {}", apcal_core::config::VERSION);

    match &args.command {
        Command::Checksum { files } => {
            for line in commands::checksum_lines(files)? {
                println!("{}", line);
            }
        }
        Command::Versions => {
            for line in commands::version_lines(&args.registry()?) {
                println!("{}", line);
            }
        }
        Command::Fetch { models } => {
            let registry = args.registry()?;
            commands::fetch(&registry, models)?;
            println!("{}", registry);
        }
        Command::Calibrate {
            model,
            input,
            output,
            column,
        } => {
            let registry = args.registry()?;
            let rows = commands::calibrate_csv(&registry, model, input, output, column.as_deref())?;
            println!("{}: calibrated {} rows -> {}", model, rows, output.display());
        }
    }

    Ok(())
}
