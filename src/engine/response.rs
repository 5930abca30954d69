//! Detection and signal-response tensors, one block per event.
//!
//! - `detection_p`: `P(n_detected | n_produced)` over (detected × produced)
//! - `detector_response`: `P(observed signal | n_detected)` over the detected domain

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::AnnotatedEvent;
use crate::domain::types::Channel;
use crate::math::{STD_FLOOR, binomial_pmf, normal_pdf};
use crate::models::{Source, signal_mean_std};

/// Binomial thinning of produced into detected quanta, times the detected-count
/// acceptance. Photon efficiency includes Penning quenching of the produced count.
pub fn detection_p(channel: Channel, annotated: &[AnnotatedEvent], source: &Source) -> Vec<DMatrix<f64>> {
    annotated
        .par_iter()
        .map(|a| detection_p_event(channel, a, source))
        .collect()
}

/// Whether both observed signals fall inside the signal acceptance.
///
/// Events failing this have zero density; their blocks collapse to 1×1 zeros.
pub fn signals_accepted(a: &AnnotatedEvent, source: &Source) -> bool {
    Channel::ALL
        .iter()
        .all(|&ch| source.detector().signal_acceptance(ch, a.event.signal(ch)) > 0.0)
}

pub fn detection_p_event(channel: Channel, a: &AnnotatedEvent, source: &Source) -> DMatrix<f64> {
    if !signals_accepted(a, source) {
        return DMatrix::zeros(1, 1);
    }
    let detector = source.detector();
    let yield_model = source.yield_model();
    let detected = a.annotation.bounds.detected(channel);
    let produced = a.annotation.bounds.produced(channel);
    let base_eff = a.annotation.response(channel).detection_eff;

    let eff: Vec<f64> = produced
        .iter()
        .map(|n| match channel {
            Channel::Photon => base_eff * yield_model.penning_quenching_eff(n as f64),
            Channel::Electron => base_eff,
        })
        .collect();
    let acceptance: Vec<f64> = detected
        .iter()
        .map(|n| detector.quanta_acceptance(channel, n as f64))
        .collect();

    DMatrix::from_fn(detected.len(), produced.len(), |i, j| {
        if acceptance[i] == 0.0 {
            return 0.0;
        }
        let n_det = detected.min + i as u64;
        let n_prod = produced.min + j as u64;
        binomial_pmf(n_det, n_prod, eff[j]) * acceptance[i]
    })
}

/// Gaussian density of the observed signal for each detected count, times the
/// signal acceptance.
pub fn detector_response(
    channel: Channel,
    annotated: &[AnnotatedEvent],
    source: &Source,
) -> Vec<DVector<f64>> {
    annotated
        .par_iter()
        .map(|a| detector_response_event(channel, a, source))
        .collect()
}

pub fn detector_response_event(channel: Channel, a: &AnnotatedEvent, source: &Source) -> DVector<f64> {
    if !signals_accepted(a, source) {
        return DVector::zeros(1);
    }
    let observed = a.event.signal(channel);
    let detected = a.annotation.bounds.detected(channel);
    let response = a.annotation.response(channel);
    let acceptance = source.detector().signal_acceptance(channel, observed);

    DVector::from_fn(detected.len(), |i, _| {
        let n_det = (detected.min + i as u64) as f64;
        let (mean, std) = signal_mean_std(channel, n_det, response, a.annotation.double_pe_fraction);
        normal_pdf(observed, mean, std + STD_FLOOR) * acceptance
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CountBounds, Event, ModelConfig, ModelKind};
    use crate::engine::annotate::annotate;
    use approx::assert_relative_eq;

    fn er_source(overrides: &[(&str, f64)]) -> Source {
        let mut config = ModelConfig::for_model(ModelKind::Er);
        for (name, value) in overrides {
            config.set(name, *value).unwrap();
        }
        Source::from_config(&config).unwrap()
    }

    fn with_bounds(mut a: AnnotatedEvent, channel: Channel, det: CountBounds, prod: CountBounds) -> AnnotatedEvent {
        let b = &mut a.annotation.bounds;
        match channel {
            Channel::Photon => {
                b.photon_detected = det;
                b.photon_produced = prod;
            }
            Channel::Electron => {
                b.electron_detected = det;
                b.electron_produced = prod;
            }
        }
        a
    }

    #[test]
    fn detection_columns_normalize_without_threshold() {
        let source = er_source(&[("min_s2_electrons_detected", 0.0)]);
        let base = annotate(&[Event::from_signals(30.0, 2000.0)], &source).unwrap().remove(0);
        let a = with_bounds(
            base,
            Channel::Electron,
            CountBounds::new(0, 50, 200),
            CountBounds::new(40, 60, 80),
        );
        let m = detection_p_event(Channel::Electron, &a, &source);
        assert_eq!(m.shape(), (201, 41));
        for j in 0..m.ncols() {
            assert_relative_eq!(m.column(j).sum(), 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn threshold_masks_low_detected_counts() {
        let source = er_source(&[("photon_detection_eff", 0.5)]);
        let base = annotate(&[Event::from_signals(30.0, 2000.0)], &source).unwrap().remove(0);
        let a = with_bounds(
            base,
            Channel::Photon,
            CountBounds::new(0, 50, 100),
            CountBounds::new(100, 100, 100),
        );
        let m = detection_p_event(Channel::Photon, &a, &source);
        assert_eq!(m[(0, 0)], 0.0);
        assert_eq!(m[(2, 0)], 0.0);
        assert_relative_eq!(m[(50, 0)], 0.079_589_237_387_178_7, max_relative = 1e-9);
    }

    #[test]
    fn zero_detected_electrons_give_finite_density() {
        let source = er_source(&[("min_s2_electrons_detected", 0.0), ("s2_min", 0.0)]);
        let base = annotate(&[Event::from_signals(30.0, 250.0)], &source).unwrap().remove(0);
        let a = with_bounds(
            base,
            Channel::Electron,
            CountBounds::new(0, 0, 5),
            CountBounds::new(0, 0, 5),
        );
        let d = detector_response_event(Channel::Electron, &a, &source);
        assert!(d.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(d[0], 0.0);
    }

    #[test]
    fn signal_outside_window_has_zero_response() {
        let source = er_source(&[]);
        let a = annotate(&[Event::from_signals(80.0, 2000.0)], &source).unwrap();
        let d = detector_response(Channel::Photon, &a, &source);
        assert!(d[0].iter().all(|v| *v == 0.0));
        assert!(!signals_accepted(&a[0], &source));
        assert_eq!(d[0].len(), 1);
        assert_eq!(detection_p_event(Channel::Electron, &a[0], &source).shape(), (1, 1));
    }
}
