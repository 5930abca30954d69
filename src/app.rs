//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - builds the parameter point
//! - runs the selected pipeline
//! - prints reports and writes optional exports

use clap::Parser;

use crate::cli::{AnnotateArgs, Command, EvaluateArgs, MuArgs, SimulateArgs, model_config_from_args};
use crate::data::{EnergyRequest, FixedTruth};
use crate::error::AppError;

use pipeline::{EvaluationResult, SimulatedEvents};

pub mod pipeline;

/// Entry point for the `lxe` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    crate::logging::init_logging(cli.log_level, cli.log_format);

    match cli.command {
        Command::Simulate(args) => handle_simulate(args),
        Command::Annotate(args) => handle_annotate(args),
        Command::Evaluate(args) => handle_evaluate(args),
        Command::Mu(args) => handle_mu(args),
    }
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = model_config_from_args(&args.model)?;
    let request = match args.energies {
        Some(values) => EnergyRequest::Values(values),
        None => EnergyRequest::Count(args.n),
    };
    let fixed = args.drift_time.map(|drift_time| FixedTruth {
        x: 0.0,
        y: 0.0,
        z: -drift_time * config.geometry.drift_velocity,
        drift_time,
        event_time: config.geometry.time_window_ns().0,
    });

    let run = pipeline::run_simulate(&config, &request, fixed.as_ref(), args.seed)?;
    match &run.events {
        SimulatedEvents::SingleSite(events) => {
            println!(
                "{}",
                crate::report::format_simulation_summary(&config, request.len(), events)
            );
            if let Some(path) = &args.out {
                crate::io::write_simulated_csv(path, events)?;
            }
        }
        SimulatedEvents::MultiSite(events) => {
            println!(
                "{}",
                crate::report::format_multisite_summary(&config, request.len(), events)
            );
            if let Some(path) = &args.out {
                crate::io::write_multisite_csv(path, events)?;
            }
        }
    }
    Ok(())
}

fn handle_annotate(args: AnnotateArgs) -> Result<(), AppError> {
    let config = model_config_from_args(&args.model)?;
    let run = pipeline::run_annotate(&config, &args.events)?;

    print!("{}", crate::report::format_ingest_summary(&run.ingest));
    println!("{}", crate::report::format_annotation_summary(&config, &run.annotated));

    if let Some(path) = &args.out {
        crate::io::write_annotated_csv(path, &run.annotated)?;
    }
    Ok(())
}

fn handle_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let config = model_config_from_args(&args.model)?;
    let run = pipeline::run_evaluate(&config, &args.events)?;
    print!("{}", crate::report::format_ingest_summary(&run.ingest));

    match &run.evaluation {
        EvaluationResult::SingleSite(evaluation) => {
            let lowest = crate::report::rank_lowest_density(
                evaluation.annotated.iter().map(|a| &a.event),
                &evaluation.densities,
                args.top,
            );
            println!(
                "{}",
                crate::report::format_evaluation_summary(&config, evaluation, &lowest)
            );
            if let Some(path) = &args.out {
                crate::io::write_evaluation_csv(path, evaluation)?;
            }
        }
        EvaluationResult::MultiSite(evaluation) => {
            let lowest =
                crate::report::rank_lowest_density(&evaluation.events, &evaluation.densities, args.top);
            println!(
                "{}",
                crate::report::format_multisite_evaluation(&config, evaluation, &lowest)
            );
            if let Some(path) = &args.out {
                crate::io::write_multisite_evaluation_csv(path, evaluation)?;
            }
        }
    }
    Ok(())
}

fn handle_mu(args: MuArgs) -> Result<(), AppError> {
    let config = model_config_from_args(&args.model)?;
    let estimate = pipeline::run_mu(&config, args.trials, args.seed)?;
    println!(
        "{}",
        crate::report::format_mu(&config, estimate.mu_before_efficiencies, estimate.mu, estimate.n_trials)
    );
    Ok(())
}
