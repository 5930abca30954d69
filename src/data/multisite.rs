//! Forward simulation of multi-site sources.
//!
//! Every site draws one spectrum point; the summed signal moments give a
//! correlated Gaussian draw of (S1, S2), and events outside the joint window
//! are dropped.

use rand::Rng;
use rand::distributions::WeightedIndex;
use rand_distr::{Distribution, StandardNormal};
use tracing::info;

use crate::domain::{Event, MultiSiteEvent};
use crate::error::AppError;
use crate::models::{MultiSiteSource, SignalMoments};

/// Simulate `n` events and return the ones inside the S1/S2 window.
pub fn simulate_multisite<R: Rng>(
    n: usize,
    source: &MultiSiteSource,
    rng: &mut R,
) -> Result<Vec<MultiSiteEvent>, AppError> {
    if n == 0 {
        return Err(AppError::invalid_input("Event count must be > 0."));
    }
    let spectrum = source.spectrum();
    let index = WeightedIndex::new(&spectrum.rates)
        .map_err(|e| AppError::invalid_input(format!("Cannot sample spectrum: {e}")))?;
    let sites = source.multiplicity().sites();

    let mut accepted = Vec::new();
    for _ in 0..n {
        let energies: Vec<f64> = (0..sites)
            .map(|_| spectrum.energies[index.sample(rng)])
            .collect();
        let (s1, s2) = draw_signals(&source.event_moments(&energies), rng);
        if source.window().eval(s1, s2) > 0.0 {
            accepted.push(MultiSiteEvent {
                event: Event::from_signals(s1, s2),
                energies,
            });
        }
    }

    info!(
        multiplicity = source.multiplicity().name(),
        requested = n,
        accepted = accepted.len(),
        "simulated multi-site events"
    );
    Ok(accepted)
}

/// Correlated normal draw of the summed signals.
fn draw_signals<R: Rng>(m: &SignalMoments, rng: &mut R) -> (f64, f64) {
    let z1: f64 = StandardNormal.sample(rng);
    let z2: f64 = StandardNormal.sample(rng);
    let rho = m.correlation();
    let s1 = m.s1_mean + m.s1_var.sqrt() * z1;
    let s2 = m.s2_mean + m.s2_var.sqrt() * (rho * z1 + (1.0 - rho * rho).max(0.0).sqrt() * z2);
    (s1, s2)
}

/// Expected number of events inside the window, from `n_trials` simulated ones.
pub fn estimate_mu_multisite<R: Rng>(
    source: &MultiSiteSource,
    n_trials: usize,
    rng: &mut R,
) -> Result<f64, AppError> {
    let accepted = simulate_multisite(n_trials, source, rng)?;
    Ok(source.mu_before_efficiencies() * accepted.len() as f64 / n_trials as f64)
}
