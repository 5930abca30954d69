//! Density evaluation of multi-site sources.
//!
//! Multi-site events carry no latent-count domains: the mixture density is
//! evaluated directly on the observed signals.

use tracing::{info, warn};

use crate::domain::Event;
use crate::engine::rate::{LogLikelihood, log_likelihood_terms};
use crate::error::AppError;
use crate::models::MultiSiteSource;

/// Observed events with their multi-site densities.
#[derive(Debug, Clone)]
pub struct MultiSiteEvaluation {
    pub events: Vec<Event>,
    pub densities: Vec<f64>,
    pub log_likelihood: LogLikelihood,
}

pub fn evaluate_multisite(events: &[Event], source: &MultiSiteSource) -> Result<MultiSiteEvaluation, AppError> {
    if events.is_empty() {
        return Err(AppError::invalid_input("No events to evaluate."));
    }
    let densities = source.differential_rate(events)?;
    let log_likelihood = log_likelihood_terms(&densities);
    if log_likelihood.zero_count > 0 {
        warn!(
            zero = log_likelihood.zero_count,
            events = densities.len(),
            "events with zero density"
        );
    }
    info!(
        multiplicity = source.multiplicity().name(),
        events = densities.len(),
        log_likelihood = log_likelihood.total,
        "evaluated multi-site rates"
    );
    Ok(MultiSiteEvaluation {
        events: events.to_vec(),
        densities,
        log_likelihood,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnergySpectrum, Multiplicity, S1S2Window, SiteSignalParams};

    #[test]
    fn evaluation_counts_zero_density_events() {
        let spectrum = EnergySpectrum::new(vec![10.0, 20.0], vec![1.0, 1.0]).unwrap();
        let source = MultiSiteSource::new(
            Multiplicity::Double,
            spectrum,
            SiteSignalParams::default(),
            S1S2Window::default(),
        )
        .unwrap();
        let m = source.event_moments(&[10.0, 20.0]);
        let events = vec![Event::from_signals(m.s1_mean, m.s2_mean), Event::from_signals(5.0, 100.0)];
        let eval = evaluate_multisite(&events, &source).unwrap();
        assert!(eval.densities[0] > 0.0);
        assert_eq!(eval.densities[1], 0.0);
        assert_eq!(eval.log_likelihood.zero_count, 1);
        assert_eq!(eval.log_likelihood.total, f64::NEG_INFINITY);
        assert!(evaluate_multisite(&[], &source).is_err());
    }
}
