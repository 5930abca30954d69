//! Command-line parsing for the `lxe` emission-model tool.
//!
//! Parsing stays here; building a [`ModelConfig`] from the parsed flags is
//! the only logic this module owns.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{EnergySpectrum, ModelConfig, ModelKind, Multiplicity, SpectrumSource};
use crate::error::AppError;
use crate::logging::{LogFormat, LogLevel};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "lxe", version, about = "Liquid-xenon TPC emission model: simulate, annotate, evaluate")]
pub struct Cli {
    /// Log verbosity (overridden by RUST_LOG).
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Log line format.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Simulate detected events and write them as CSV.
    Simulate(SimulateArgs),
    /// Compute latent-count bounds for observed events.
    Annotate(AnnotateArgs),
    /// Evaluate the differential rate (event density) of observed events.
    Evaluate(EvaluateArgs),
    /// Estimate the expected number of detected events.
    Mu(MuArgs),
}

/// Options selecting a model and a parameter point.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Recoil type (a `--config` file carries its own).
    #[arg(long, value_enum, default_value_t = ModelKind::Er, conflicts_with = "config")]
    pub model: ModelKind,

    /// Full model configuration JSON (replaces the built-in defaults).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Flat JSON object of parameter overrides, e.g. `{"elife": 6e5}`.
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Single parameter override `name=value` (repeatable, applied last).
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub set: Vec<String>,

    /// Energy spectrum CSV with `energy` and `rate` columns.
    #[arg(long)]
    pub spectrum: Option<PathBuf>,

    /// Width of the latent-count domains, in standard deviations.
    #[arg(long)]
    pub max_sigma: Option<f64>,

    /// Scatter sites per event; `double`/`triple` select the multi-site NR source.
    #[arg(long, value_enum)]
    pub multiplicity: Option<Multiplicity>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Number of events to draw from the spectrum.
    #[arg(short = 'n', long, default_value_t = 1000, conflicts_with = "energies")]
    pub n: usize,

    /// Explicit deposit energies in keV (comma separated), one event each.
    #[arg(long, value_delimiter = ',')]
    pub energies: Option<Vec<f64>>,

    /// Pin every event to this drift time (ns) on the TPC axis.
    #[arg(long)]
    pub drift_time: Option<f64>,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV (stdout summary only when omitted).
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct AnnotateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Event CSV (`s1`, `s2`, optional position/time columns).
    #[arg(short = 'e', long)]
    pub events: PathBuf,

    /// Output CSV with the per-event bounds.
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Event CSV (`s1`, `s2`, optional position/time columns).
    #[arg(short = 'e', long)]
    pub events: PathBuf,

    /// Output CSV with bounds and densities.
    #[arg(short = 'o', long)]
    pub out: Option<PathBuf>,

    /// Show the N lowest-density events.
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Args, Clone)]
pub struct MuArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Simulated events used for the acceptance estimate.
    #[arg(long, default_value_t = 100_000)]
    pub trials: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Build the parameter point selected by `args`.
///
/// Precedence, lowest first: defaults for `--model` (or `--config`),
/// `--params`, `--set`, `--spectrum`, `--max-sigma`, `--multiplicity`.
pub fn model_config_from_args(args: &ModelArgs) -> Result<ModelConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => crate::io::read_model_config(path)?,
        None => ModelConfig::for_model(args.model),
    };

    if let Some(path) = &args.params {
        let overrides = crate::io::read_overrides(path)?;
        config = config.with_overrides(&overrides)?;
    }
    for assignment in &args.set {
        let (name, value) = crate::io::parse_assignment(assignment)?;
        config.set(&name, value)?;
    }
    if let Some(path) = &args.spectrum {
        let spectrum: EnergySpectrum = crate::io::load_spectrum_csv(path)?;
        config.spectrum = Some(SpectrumSource::Static(spectrum));
    }
    if let Some(max_sigma) = args.max_sigma {
        config.max_sigma = max_sigma;
    }
    if let Some(multiplicity) = args.multiplicity {
        config.multiplicity = multiplicity;
    }

    config.validate()?;
    Ok(config)
}
