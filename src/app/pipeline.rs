//! Shared pipelines behind the CLI subcommands.
//!
//! Each function owns the workflow (config -> source -> compute) and returns
//! plain data; the caller decides how to print or export it.

use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::data::{
    EnergyRequest, FixedTruth, estimate_mu, estimate_mu_multisite, simulate, simulate_multisite,
};
use crate::domain::{AnnotatedEvent, ModelConfig, MultiSiteEvent, Multiplicity, SimulatedEvent};
use crate::engine::{Evaluation, MultiSiteEvaluation, annotate, evaluate, evaluate_multisite};
use crate::error::AppError;
use crate::io::ingest::{IngestedEvents, load_events};
use crate::models::{MultiSiteSource, Source};

/// Simulated events of either source family.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedEvents {
    SingleSite(Vec<SimulatedEvent>),
    MultiSite(Vec<MultiSiteEvent>),
}

impl SimulatedEvents {
    pub fn len(&self) -> usize {
        match self {
            SimulatedEvents::SingleSite(v) => v.len(),
            SimulatedEvents::MultiSite(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outputs of `lxe simulate`.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub events: SimulatedEvents,
}

/// Outputs of `lxe annotate`.
#[derive(Debug, Clone)]
pub struct AnnotationRun {
    pub ingest: IngestedEvents,
    pub annotated: Vec<AnnotatedEvent>,
}

/// Densities of either source family.
#[derive(Debug, Clone)]
pub enum EvaluationResult {
    SingleSite(Evaluation),
    MultiSite(MultiSiteEvaluation),
}

/// Outputs of `lxe evaluate`.
#[derive(Debug, Clone)]
pub struct EvaluationRun {
    pub ingest: IngestedEvents,
    pub evaluation: EvaluationResult,
}

/// Outputs of `lxe mu`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuEstimate {
    pub mu_before_efficiencies: f64,
    pub mu: f64,
    pub n_trials: usize,
}

pub fn run_simulate(
    config: &ModelConfig,
    request: &EnergyRequest,
    fixed: Option<&FixedTruth>,
    seed: u64,
) -> Result<SimulationRun, AppError> {
    let mut rng = StdRng::seed_from_u64(seed);
    if is_multi_site(config) {
        let source = MultiSiteSource::from_config(config)?;
        let EnergyRequest::Count(n) = request else {
            return Err(AppError::invalid_input(
                "Multi-site sources draw every site energy from the spectrum; explicit energies are not supported.",
            ));
        };
        if fixed.is_some() {
            return Err(AppError::invalid_input(
                "Multi-site sources carry no event position; drop the pinned drift time.",
            ));
        }
        let events = simulate_multisite(*n, &source, &mut rng)?;
        return Ok(SimulationRun {
            events: SimulatedEvents::MultiSite(events),
        });
    }
    let source = Source::from_config(config)?;
    let events = simulate(request, &source, fixed, &mut rng)?;
    Ok(SimulationRun {
        events: SimulatedEvents::SingleSite(events),
    })
}

fn is_multi_site(config: &ModelConfig) -> bool {
    config.multiplicity != Multiplicity::Single
}

pub fn run_annotate(config: &ModelConfig, events_csv: &Path) -> Result<AnnotationRun, AppError> {
    if is_multi_site(config) {
        return Err(AppError::invalid_input(
            "Multi-site sources have no latent-count domains to annotate; use `evaluate`.",
        ));
    }
    let source = Source::from_config(config)?;
    let ingest = load_events(events_csv)?;
    let annotated = annotate(&ingest.events, &source)?;
    Ok(AnnotationRun { ingest, annotated })
}

pub fn run_evaluate(config: &ModelConfig, events_csv: &Path) -> Result<EvaluationRun, AppError> {
    let ingest = load_events(events_csv)?;
    let evaluation = evaluate_config(config, &ingest.events)?;
    Ok(EvaluationRun { ingest, evaluation })
}

/// Evaluate in-memory events with the source `config` selects.
pub fn evaluate_config(config: &ModelConfig, events: &[crate::domain::Event]) -> Result<EvaluationResult, AppError> {
    if is_multi_site(config) {
        let source = MultiSiteSource::from_config(config)?;
        return Ok(EvaluationResult::MultiSite(evaluate_multisite(events, &source)?));
    }
    let source = Source::from_config(config)?;
    Ok(EvaluationResult::SingleSite(evaluate(events, &source)?))
}

pub fn run_mu(config: &ModelConfig, n_trials: usize, seed: u64) -> Result<MuEstimate, AppError> {
    if n_trials == 0 {
        return Err(AppError::invalid_input("Number of trials must be > 0."));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    if is_multi_site(config) {
        let source = MultiSiteSource::from_config(config)?;
        let mu = estimate_mu_multisite(&source, n_trials, &mut rng)?;
        return Ok(MuEstimate {
            mu_before_efficiencies: source.mu_before_efficiencies(),
            mu,
            n_trials,
        });
    }
    let source = Source::from_config(config)?;
    let mu = estimate_mu(&source, n_trials, &mut rng)?;
    Ok(MuEstimate {
        mu_before_efficiencies: source.mu_before_efficiencies(),
        mu,
        n_trials,
    })
}
