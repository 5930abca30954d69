//! Rate engine: produced-quanta rate tensor and the per-event differential rate.
//!
//! For one event with annotated domains:
//!
//! ```text
//! Y[nph, nel]   = rate_nq(nph + nel) * P(nel | nq = nph + nel)
//! density       = d_ph^T · P_ph · Y · P_el^T · d_el
//! ```
//!
//! where `P_*` are the detection matrices (detected × produced) and `d_*` the
//! signal responses over the detected domain.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{AnnotatedEvent, Event};
use crate::domain::types::Channel;
use crate::engine::annotate::annotate;
use crate::engine::response::{detection_p, detector_response, signals_accepted};
use crate::error::AppError;
use crate::math::{
    P_CLIP_EPS, beta_binomial_pmf, binomial_pmf, sanitize_dispersion, sanitize_probability,
};
use crate::models::Source;

/// Joint rate of (produced photons × produced electrons), one matrix per event.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTensor {
    pub per_event: Vec<DMatrix<f64>>,
}

impl RateTensor {
    pub fn len(&self) -> usize {
        self.per_event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_event.is_empty()
    }
}

/// Build the produced-quanta rate tensor for every annotated event.
pub fn rate_nphnel(annotated: &[AnnotatedEvent], source: &Source) -> RateTensor {
    let per_event = annotated
        .par_iter()
        .map(|a| rate_nphnel_event(a, source))
        .collect();
    RateTensor { per_event }
}

pub fn rate_nphnel_event(a: &AnnotatedEvent, source: &Source) -> DMatrix<f64> {
    if !signals_accepted(a, source) {
        return DMatrix::zeros(1, 1);
    }
    let yield_model = source.yield_model();
    let bounds = &a.annotation.bounds;
    let nq = bounds.nq;
    let photons = bounds.photon_produced;
    let electrons = bounds.electron_produced;

    let spectrum = source.spectrum_for(&a.event);
    let rate_nq = yield_model.rate_nq(&nq, &spectrum, source.detector().work());

    // Per-nq electron fraction (and dispersion), gathered by offset below.
    let p_el: Vec<f64> = nq
        .iter()
        .map(|n| sanitize_probability(yield_model.p_electron(n as f64), P_CLIP_EPS))
        .collect();
    let p_fluct: Option<Vec<f64>> = nq
        .iter()
        .map(|n| {
            yield_model
                .p_electron_fluctuation(n as f64)
                .map(|s| sanitize_dispersion(s, P_CLIP_EPS))
        })
        .collect();

    DMatrix::from_fn(photons.len(), electrons.len(), |i, j| {
        let n_ph = photons.min + i as u64;
        let n_el = electrons.min + j as u64;
        let total = n_ph + n_el;
        let idx = (total - nq.min) as usize;
        let rate = rate_nq[idx];
        if rate == 0.0 {
            return 0.0;
        }
        let split = match &p_fluct {
            Some(fluct) => beta_binomial_pmf(n_el, total, p_el[idx], fluct[idx]),
            None => binomial_pmf(n_el, total, p_el[idx]),
        };
        rate * split
    })
}

/// Contract the rate tensor with detection and response blocks.
///
/// Every batch must hold one entry per event and the matrices of each event
/// must chain; anything else is a computation error.
pub fn contract(
    rates: &RateTensor,
    p_ph: &[DMatrix<f64>],
    p_el: &[DMatrix<f64>],
    d_ph: &[DVector<f64>],
    d_el: &[DVector<f64>],
) -> Result<Vec<f64>, AppError> {
    let n = rates.len();
    for (name, len) in [
        ("photon detection", p_ph.len()),
        ("electron detection", p_el.len()),
        ("photon response", d_ph.len()),
        ("electron response", d_el.len()),
    ] {
        if len != n {
            return Err(AppError::computation(format!(
                "Batch length mismatch: {n} rate blocks but {len} {name} blocks."
            )));
        }
    }

    (0..n)
        .into_par_iter()
        .map(|i| {
            contract_event(&rates.per_event[i], &p_ph[i], &p_el[i], &d_ph[i], &d_el[i])
                .map_err(|e| e.context(format!("Event {i}")))
        })
        .collect()
}

fn contract_event(
    y: &DMatrix<f64>,
    p_ph: &DMatrix<f64>,
    p_el: &DMatrix<f64>,
    d_ph: &DVector<f64>,
    d_el: &DVector<f64>,
) -> Result<f64, AppError> {
    if p_ph.nrows() != d_ph.len()
        || p_el.nrows() != d_el.len()
        || p_ph.ncols() != y.nrows()
        || p_el.ncols() != y.ncols()
    {
        return Err(AppError::computation(format!(
            "Shapes do not chain: d_ph {}, P_ph {:?}, Y {:?}, P_el {:?}, d_el {}.",
            d_ph.len(),
            p_ph.shape(),
            y.shape(),
            p_el.shape(),
            d_el.len()
        )));
    }
    // Sum out the detected axes first: both are vectors over produced counts.
    let w_ph = p_ph.tr_mul(d_ph);
    let w_el = p_el.tr_mul(d_el);
    let v = w_ph.dot(&(y * w_el));
    Ok(if v.is_finite() { v.max(0.0) } else { 0.0 })
}

/// Largest block (in cells) built for a single event.
pub const MAX_BLOCK_CELLS: usize = 1 << 26;

/// Reject events whose accepted domains would need a block above
/// [`MAX_BLOCK_CELLS`].
pub fn check_block_sizes(annotated: &[AnnotatedEvent], source: &Source) -> Result<(), AppError> {
    for (idx, a) in annotated.iter().enumerate() {
        if !signals_accepted(a, source) {
            continue;
        }
        let b = &a.annotation.bounds;
        let blocks = [
            ("photon detection", b.photon_detected.len(), b.photon_produced.len()),
            ("electron detection", b.electron_detected.len(), b.electron_produced.len()),
            ("rate", b.photon_produced.len(), b.electron_produced.len()),
        ];
        for (name, rows, cols) in blocks {
            let cells = rows.saturating_mul(cols);
            if cells > MAX_BLOCK_CELLS {
                return Err(AppError::computation(format!(
                    "Event {idx}: {name} block {rows} x {cols} exceeds {MAX_BLOCK_CELLS} cells."
                )));
            }
        }
    }
    Ok(())
}

/// Differential rate of every annotated event at the parameter point of `source`.
pub fn differential_rate(annotated: &[AnnotatedEvent], source: &Source) -> Result<Vec<f64>, AppError> {
    check_block_sizes(annotated, source)?;
    let rates = rate_nphnel(annotated, source);
    let p_ph = detection_p(Channel::Photon, annotated, source);
    let p_el = detection_p(Channel::Electron, annotated, source);
    let d_ph = detector_response(Channel::Photon, annotated, source);
    let d_el = detector_response(Channel::Electron, annotated, source);
    contract(&rates, &p_ph, &p_el, &d_ph, &d_el)
}

/// Per-event log densities and their sum.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLikelihood {
    /// `ln(density)`, `-inf` for zero densities.
    pub terms: Vec<f64>,
    pub total: f64,
    pub zero_count: usize,
}

pub fn log_likelihood_terms(densities: &[f64]) -> LogLikelihood {
    let terms: Vec<f64> = densities
        .iter()
        .map(|&d| if d > 0.0 { d.ln() } else { f64::NEG_INFINITY })
        .collect();
    let zero_count = densities.iter().filter(|&&d| !(d > 0.0)).count();
    LogLikelihood {
        total: terms.iter().sum(),
        terms,
        zero_count,
    }
}

/// Annotated events with their densities.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub annotated: Vec<AnnotatedEvent>,
    pub densities: Vec<f64>,
    pub log_likelihood: LogLikelihood,
}

/// Annotate `events` and evaluate their differential rates.
pub fn evaluate(events: &[Event], source: &Source) -> Result<Evaluation, AppError> {
    if events.is_empty() {
        return Err(AppError::invalid_input("No events to evaluate."));
    }
    let annotated = annotate(events, source)?;
    let densities = differential_rate(&annotated, source)?;
    let log_likelihood = log_likelihood_terms(&densities);

    if log_likelihood.zero_count > 0 {
        warn!(
            zero = log_likelihood.zero_count,
            events = densities.len(),
            "events with zero density"
        );
    }
    info!(
        events = densities.len(),
        log_likelihood = log_likelihood.total,
        "evaluated differential rates"
    );
    Ok(Evaluation {
        annotated,
        densities,
        log_likelihood,
    })
}

/// Density at a single `(s1, s2)` point, for an external integrator.
pub fn point_density(s1: f64, s2: f64, drift_time: f64, source: &Source) -> Result<f64, AppError> {
    let event = Event {
        drift_time,
        ..Event::from_signals(s1, s2)
    };
    let annotated = annotate(std::slice::from_ref(&event), source)?;
    let density = differential_rate(&annotated, source)?;
    debug!(s1, s2, drift_time, density = density[0], "point density");
    Ok(density[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelConfig, ModelKind};
    use approx::assert_relative_eq;

    fn source(kind: ModelKind) -> Source {
        Source::from_config(&ModelConfig::for_model(kind)).unwrap()
    }

    #[test]
    fn contraction_matches_explicit_sum() {
        let y = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let p_ph = DMatrix::from_row_slice(1, 2, &[0.5, 0.25]);
        let p_el = DMatrix::from_row_slice(2, 3, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let d_ph = DVector::from_vec(vec![2.0]);
        let d_el = DVector::from_vec(vec![1.0, 3.0]);

        let mut expected = 0.0;
        for a in 0..1 {
            for b in 0..2 {
                for c in 0..3 {
                    for e in 0..2 {
                        expected += d_ph[a] * p_ph[(a, b)] * y[(b, c)] * p_el[(e, c)] * d_el[e];
                    }
                }
            }
        }
        let rates = RateTensor { per_event: vec![y] };
        let got = contract(&rates, &[p_ph], &[p_el], &[d_ph], &[d_el]).unwrap();
        assert_relative_eq!(got[0], expected, max_relative = 1e-12);
    }

    #[test]
    fn huge_signal_outside_window_has_zero_density() {
        let s = source(ModelKind::Er);
        let events = [Event::from_signals(20.0, 3000.0), Event::from_signals(20.0, 1e10)];
        let eval = evaluate(&events, &s).unwrap();
        assert!(eval.densities[0] > 0.0);
        assert_eq!(eval.densities[1], 0.0);
        assert_eq!(eval.log_likelihood.zero_count, 1);
    }

    #[test]
    fn oversized_blocks_are_a_computation_error() {
        let mut config = ModelConfig::for_model(ModelKind::Er);
        config.detector.s2_acceptance = crate::domain::Acceptance::All;
        let s = Source::from_config(&config).unwrap();
        let err = evaluate(&[Event::from_signals(20.0, 1e10)], &s).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Computation);
        assert!(err.message().contains("Event 0"));
    }

    #[test]
    fn mismatched_batches_are_rejected() {
        let rates = RateTensor {
            per_event: vec![DMatrix::zeros(1, 1), DMatrix::zeros(1, 1)],
        };
        let m = DMatrix::zeros(1, 1);
        let v = DVector::zeros(1);
        let err = contract(&rates, &[m.clone()], &[m.clone(), m.clone()], &[v.clone(), v.clone()], &[v.clone(), v])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Computation);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let rates = RateTensor {
            per_event: vec![DMatrix::zeros(2, 2)],
        };
        let err = contract(
            &rates,
            &[DMatrix::zeros(1, 3)],
            &[DMatrix::zeros(1, 2)],
            &[DVector::zeros(1)],
            &[DVector::zeros(1)],
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Computation);
    }

    #[test]
    fn rate_tensor_is_non_negative_and_shaped_by_bounds() {
        for kind in [ModelKind::Er, ModelKind::Nr] {
            let s = source(kind);
            let events = [Event::from_signals(20.0, 1500.0), Event::from_signals(45.0, 4000.0)];
            let annotated = annotate(&events, &s).unwrap();
            let rates = rate_nphnel(&annotated, &s);
            for (a, y) in annotated.iter().zip(&rates.per_event) {
                let b = &a.annotation.bounds;
                assert_eq!(y.shape(), (b.photon_produced.len(), b.electron_produced.len()));
                assert!(y.iter().all(|v| v.is_finite() && *v >= 0.0));
            }
        }
    }

    #[test]
    fn typical_events_have_positive_density() {
        let s = source(ModelKind::Er);
        // About 5 keV ER: ~365 quanta, roughly half electrons.
        let eval = evaluate(&[Event::from_signals(20.0, 3000.0)], &s).unwrap();
        assert!(eval.densities[0] > 0.0, "density {}", eval.densities[0]);
        assert!(eval.log_likelihood.total.is_finite());
    }

    #[test]
    fn events_outside_the_window_have_zero_density() {
        let s = source(ModelKind::Er);
        let d = point_density(100.0, 3000.0, 0.0, &s).unwrap();
        assert_eq!(d, 0.0);
    }

    #[test]
    fn log_likelihood_counts_zeros() {
        let ll = log_likelihood_terms(&[1.0, 0.0, std::f64::consts::E]);
        assert_eq!(ll.zero_count, 1);
        assert_eq!(ll.terms[0], 0.0);
        assert_eq!(ll.total, f64::NEG_INFINITY);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let s = source(ModelKind::Nr);
        let events: Vec<Event> = (0..12)
            .map(|i| Event::from_signals(5.0 + i as f64 * 3.0, 600.0 + i as f64 * 150.0))
            .collect();
        let a = evaluate(&events, &s).unwrap();
        let b = evaluate(&events, &s).unwrap();
        assert_eq!(a.densities, b.densities);
    }
}
