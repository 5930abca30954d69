//! Forward simulation of the emission model.
//!
//! The chain for every event:
//!
//! - draw truth: energy, position in the TPC, drift time, event time
//! - draw produced quanta and the electron/photon split
//! - thin produced into detected quanta per channel
//! - draw S1/S2 from the Gaussian signal response
//! - keep the event with probability equal to its total acceptance
//!
//! The random source is always injected, so runs are reproducible given a seed.

use rand::Rng;
use rand_distr::{Beta, Binomial, Distribution, Normal};
use tracing::info;

use crate::domain::{Event, SimulatedEvent, SimulationGeometry, SpectrumSource};
use crate::domain::types::Channel;
use crate::error::AppError;
use crate::math::beta_params;
use crate::models::{Source, dpe_mean_std};

/// Which deposit energies to simulate.
#[derive(Debug, Clone, PartialEq)]
pub enum EnergyRequest {
    /// Draw this many energies from the source spectrum.
    Count(usize),
    /// Use these energies (keV), one event each.
    Values(Vec<f64>),
}

impl EnergyRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            EnergyRequest::Count(0) => Err(AppError::invalid_input("Event count must be > 0.")),
            EnergyRequest::Count(_) => Ok(()),
            EnergyRequest::Values(v) if v.is_empty() => {
                Err(AppError::invalid_input("Energy list is empty."))
            }
            EnergyRequest::Values(v) => match v.iter().position(|e| !e.is_finite() || *e < 0.0) {
                Some(i) => Err(AppError::invalid_input(format!(
                    "Energy #{i} must be finite and >= 0, got {}.",
                    v[i]
                ))),
                None => Ok(()),
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EnergyRequest::Count(n) => *n,
            EnergyRequest::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Event metadata pinned for every simulated event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTruth {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub drift_time: f64,
    pub event_time: f64,
}

/// One drawn truth row: event metadata plus the deposited energy.
#[derive(Debug, Clone, PartialEq)]
pub struct Truth {
    pub event: Event,
    pub energy: f64,
}

/// Draw truth rows for `request`.
///
/// Positions are uniform in the cylinder and event times uniform in the
/// configured window, unless `fixed` pins them. Time-dependent spectra always
/// provide the event times, so the energy and its time bin stay paired.
pub fn random_truth<R: Rng>(
    request: &EnergyRequest,
    spectrum: &SpectrumSource,
    geometry: &SimulationGeometry,
    fixed: Option<&FixedTruth>,
    rng: &mut R,
) -> Result<Vec<Truth>, AppError> {
    request.validate()?;
    let (t_start, t_stop) = geometry.time_window_ns();

    let mut out = Vec::with_capacity(request.len());
    for i in 0..request.len() {
        let (spectrum_time, energy) = match request {
            EnergyRequest::Count(_) => spectrum.sample(rng)?,
            EnergyRequest::Values(v) => match spectrum {
                SpectrumSource::TimeDependent(_) => (spectrum.sample(rng)?.0, v[i]),
                SpectrumSource::Static(_) => (None, v[i]),
            },
        };

        let event = match fixed {
            Some(f) => Event {
                x: f.x,
                y: f.y,
                z: f.z,
                r: f.x.hypot(f.y),
                theta: f.y.atan2(f.x),
                drift_time: f.drift_time,
                event_time: spectrum_time.unwrap_or(f.event_time),
                ..Event::default()
            },
            None => {
                let r = (rng.r#gen::<f64>() * geometry.tpc_radius.powi(2)).sqrt();
                let theta = rng.gen_range(0.0..std::f64::consts::TAU);
                let z = -rng.r#gen::<f64>() * geometry.tpc_length;
                let event_time = match spectrum_time {
                    Some(t) => t,
                    None => t_start + rng.r#gen::<f64>() * (t_stop - t_start),
                };
                Event {
                    x: r * theta.cos(),
                    y: r * theta.sin(),
                    z,
                    r,
                    theta,
                    drift_time: -z / geometry.drift_velocity,
                    event_time,
                    ..Event::default()
                }
            }
        };
        out.push(Truth { event, energy });
    }
    Ok(out)
}

/// Simulate events and return only the accepted ones.
pub fn simulate<R: Rng>(
    request: &EnergyRequest,
    source: &Source,
    fixed: Option<&FixedTruth>,
    rng: &mut R,
) -> Result<Vec<SimulatedEvent>, AppError> {
    let truth = random_truth(request, source.spectrum(), source.geometry(), fixed, rng)?;
    let requested = truth.len();

    let mut accepted = Vec::new();
    for t in truth {
        let (sim, acceptance) = simulate_response(t, source, rng);
        if rng.r#gen::<f64>() < acceptance {
            accepted.push(sim);
        }
    }

    info!(
        model = source.kind().display_name(),
        requested,
        accepted = accepted.len(),
        "simulated events"
    );
    Ok(accepted)
}

/// Run the forward chain for one truth row.
///
/// Returns the event and its total acceptance (product of the quanta and
/// signal acceptances of both channels).
pub fn simulate_response<R: Rng>(truth: Truth, source: &Source, rng: &mut R) -> (SimulatedEvent, f64) {
    let yield_model = source.yield_model();
    let detector = source.detector();
    let Truth { mut event, energy } = truth;

    let nq = yield_model.sample_nq(energy, detector.work(), &mut *rng);
    let p_el_mean = yield_model.p_electron(nq as f64);
    let (p_el_fluct, p_el_actual) = match yield_model.p_electron_fluctuation(nq as f64) {
        Some(fluct) => (fluct, draw_beta(p_el_mean, fluct, rng)),
        None => (0.0, p_el_mean),
    };
    let p_el_actual = if p_el_actual.is_nan() { 0.0 } else { p_el_actual.clamp(0.0, 1.0) };

    let electron_produced = draw_binomial(nq, p_el_actual, rng);
    let photon_produced = nq - electron_produced;

    let electron_eff = detector.detection_eff(Channel::Electron, &event);
    let photon_eff = detector.detection_eff(Channel::Photon, &event)
        * yield_model.penning_quenching_eff(photon_produced as f64);
    let electron_detected = draw_binomial(electron_produced, electron_eff, rng);
    let photon_detected = draw_binomial(photon_produced, photon_eff, rng);

    let el = electron_detected as f64;
    event.s2 = draw_normal(
        el * detector.gain_mean(Channel::Electron, &event),
        el.sqrt() * detector.gain_std(Channel::Electron, &event),
        rng,
    );
    let (s1_mean, s1_std) = dpe_mean_std(
        photon_detected as f64,
        detector.double_pe_fraction(&event),
        detector.gain_mean(Channel::Photon, &event),
        detector.gain_std(Channel::Photon, &event),
    );
    event.s1 = draw_normal(s1_mean, s1_std, rng);

    let acceptance = detector.quanta_acceptance(Channel::Photon, photon_detected as f64)
        * detector.quanta_acceptance(Channel::Electron, electron_detected as f64)
        * detector.signal_acceptance(Channel::Photon, event.s1)
        * detector.signal_acceptance(Channel::Electron, event.s2);

    let sim = SimulatedEvent {
        event,
        energy,
        nq,
        p_el_mean,
        p_el_fluct,
        p_el_actual,
        electron_produced,
        photon_produced,
        electron_detected,
        photon_detected,
    };
    (sim, acceptance)
}

/// Expected number of detected events: the spectrum total times the accepted
/// fraction of `n_trials` simulated events.
pub fn estimate_mu<R: Rng>(source: &Source, n_trials: usize, rng: &mut R) -> Result<f64, AppError> {
    let accepted = simulate(&EnergyRequest::Count(n_trials), source, None, rng)?;
    let fraction = accepted.len() as f64 / n_trials as f64;
    Ok(source.mu_before_efficiencies() * fraction)
}

fn draw_binomial<R: Rng>(n: u64, p: f64, rng: &mut R) -> u64 {
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    match Binomial::new(n, p) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0,
    }
}

/// Beta draw with the given mean and spread; NaN when no such beta exists.
fn draw_beta<R: Rng>(mean: f64, std: f64, rng: &mut R) -> f64 {
    let (a, b) = beta_params(mean, std);
    if !(a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0) {
        return f64::NAN;
    }
    match Beta::new(a, b) {
        Ok(dist) => dist.sample(rng),
        Err(_) => f64::NAN,
    }
}

fn draw_normal<R: Rng>(mean: f64, std: f64, rng: &mut R) -> f64 {
    if !(std.is_finite() && std > 0.0) {
        return mean;
    }
    match Normal::new(mean, std) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelConfig, ModelKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn source(kind: ModelKind) -> Source {
        Source::from_config(&ModelConfig::for_model(kind)).unwrap()
    }

    #[test]
    fn request_validation() {
        assert!(EnergyRequest::Count(0).validate().is_err());
        assert!(EnergyRequest::Values(vec![]).validate().is_err());
        assert!(EnergyRequest::Values(vec![1.0, f64::NAN]).validate().is_err());
        assert!(EnergyRequest::Values(vec![1.0, -2.0]).validate().is_err());
        assert!(EnergyRequest::Values(vec![0.0, 2.0]).validate().is_ok());
    }

    #[test]
    fn truth_lies_inside_the_tpc() {
        let s = source(ModelKind::Er);
        let mut rng = StdRng::seed_from_u64(11);
        let g = s.geometry().clone();
        let (t0, t1) = g.time_window_ns();
        let truth = random_truth(&EnergyRequest::Count(500), s.spectrum(), &g, None, &mut rng).unwrap();
        assert_eq!(truth.len(), 500);
        for t in &truth {
            let e = &t.event;
            assert!(e.r <= g.tpc_radius);
            assert!(e.z <= 0.0 && e.z >= -g.tpc_length);
            assert!((e.drift_time - (-e.z / g.drift_velocity)).abs() < 1e-6 * e.drift_time.max(1.0));
            assert!(e.event_time >= t0 && e.event_time <= t1);
            assert!((0.0..=10.0).contains(&t.energy));
        }
    }

    #[test]
    fn fixed_truth_is_copied() {
        let s = source(ModelKind::Nr);
        let mut rng = StdRng::seed_from_u64(3);
        let fixed = FixedTruth {
            x: 3.0,
            y: 4.0,
            z: -10.0,
            drift_time: 1e5,
            event_time: 1.5e18,
        };
        let truth = random_truth(
            &EnergyRequest::Values(vec![5.0, 6.0]),
            s.spectrum(),
            s.geometry(),
            Some(&fixed),
            &mut rng,
        )
        .unwrap();
        assert_eq!(truth[1].energy, 6.0);
        assert_eq!(truth[0].event.r, 5.0);
        assert_eq!(truth[0].event.drift_time, 1e5);
    }

    #[test]
    fn fixed_truth_keeps_the_spectrum_time() {
        let spectrum = SpectrumSource::TimeDependent(crate::domain::TimeDependentSpectrum {
            time_edges: vec![0.0, 10.0, 20.0],
            energy_edges: vec![1.0, 2.0, 4.0],
            counts: vec![vec![0.0, 0.0], vec![2.0, 6.0]],
        });
        let fixed = FixedTruth {
            x: 0.0,
            y: 0.0,
            z: -10.0,
            drift_time: 1e5,
            event_time: 5.0,
        };
        let mut rng = StdRng::seed_from_u64(21);
        let g = SimulationGeometry::default();
        for request in [EnergyRequest::Count(200), EnergyRequest::Values(vec![3.0; 50])] {
            let truth = random_truth(&request, &spectrum, &g, Some(&fixed), &mut rng).unwrap();
            for t in &truth {
                // Only the second time bin has events.
                assert!((10.0..=20.0).contains(&t.event.event_time), "{}", t.event.event_time);
                assert_eq!(t.event.drift_time, 1e5);
            }
        }
    }

    #[test]
    fn latent_columns_are_consistent() {
        let s = source(ModelKind::Er);
        let mut rng = StdRng::seed_from_u64(5);
        let events = simulate(&EnergyRequest::Count(2000), &s, None, &mut rng).unwrap();
        assert!(!events.is_empty());
        for e in &events {
            assert_eq!(e.electron_produced + e.photon_produced, e.nq);
            assert!(e.electron_detected <= e.electron_produced);
            assert!(e.photon_detected <= e.photon_produced);
            assert!(e.photon_detected >= 3 && e.electron_detected >= 3);
            assert!((2.0..=70.0).contains(&e.event.s1));
            assert!((200.0..=6000.0).contains(&e.event.s2));
            assert!((0.0..=1.0).contains(&e.p_el_actual));
        }
    }

    #[test]
    fn nr_has_no_electron_fraction_spread() {
        let s = source(ModelKind::Nr);
        let mut rng = StdRng::seed_from_u64(9);
        let events = simulate(&EnergyRequest::Values(vec![20.0; 300]), &s, None, &mut rng).unwrap();
        for e in &events {
            assert_eq!(e.p_el_fluct, 0.0);
            assert_eq!(e.p_el_actual, e.p_el_mean);
        }
    }

    #[test]
    fn same_seed_same_events() {
        let s = source(ModelKind::Nr);
        let a = simulate(&EnergyRequest::Count(200), &s, None, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = simulate(&EnergyRequest::Count(200), &s, None, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mu_is_bounded_by_the_spectrum_total() {
        let s = source(ModelKind::Er);
        let mut rng = StdRng::seed_from_u64(17);
        let mu = estimate_mu(&s, 2000, &mut rng).unwrap();
        assert!(mu > 0.0 && mu <= s.mu_before_efficiencies());
    }
}
