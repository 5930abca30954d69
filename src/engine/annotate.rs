//! Bounds estimation: per-event MLEs and finite domains for every latent count.
//!
//! Pipeline per event:
//! 1) detected-quanta MLEs by inverting the mean signal response
//! 2) Penning quenching at the MLE, by inverting a tabulated
//!    `produced * eff(produced) -> eff` relation
//! 3) visible-energy estimate and the electron fraction at the implied `nq`
//! 4) `[min, max]` domains from a normal-quantile rule at `max_sigma`
//!
//! Events are independent, so the work is spread over rayon's pool. The
//! result only depends on the input events and the source.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{AnnotatedEvent, CountBounds, Event, EventAnnotation, LatentBounds};
use crate::domain::types::Channel;
use crate::error::AppError;
use crate::math::{interp, interp_clamped, log_space, normal_quantile_offset};
use crate::models::{QuantaYield, Source, dpe_mean_std};

const QUENCHING_TABLE_MIN: f64 = 1e-1;
const QUENCHING_TABLE_MAX: f64 = 1e8;
const QUENCHING_TABLE_STEPS: usize = 1000;

/// Penning quenching tabulated against the mean number of detectable
/// photons per unit efficiency, for inversion at an observed count.
#[derive(Debug, Clone)]
pub struct QuenchingTable {
    effective_counts: Vec<f64>,
    eff: Vec<f64>,
}

impl QuenchingTable {
    pub fn build(yield_model: &dyn QuantaYield) -> Result<Self, AppError> {
        let produced = log_space(QUENCHING_TABLE_MIN, QUENCHING_TABLE_MAX, QUENCHING_TABLE_STEPS)?;
        let eff: Vec<f64> = produced
            .iter()
            .map(|&n| yield_model.penning_quenching_eff(n))
            .collect();
        let effective_counts = produced.iter().zip(&eff).map(|(n, e)| n * e).collect();
        Ok(Self {
            effective_counts,
            eff,
        })
    }

    /// Quenching efficiency for `detected / detection_eff` effective photons.
    ///
    /// Outside the table the nearest edge value is used; a non-finite input
    /// means no quenching information, so the result is 1.
    pub fn invert(&self, effective_count: f64) -> f64 {
        if let Some(v) = interp(effective_count, &self.effective_counts, &self.eff) {
            return v;
        }
        debug!(effective_count, "penning table lookup outside tabulated range");
        interp_clamped(effective_count, &self.effective_counts, &self.eff).unwrap_or(1.0)
    }
}

/// Width of the produced-count domain around its MLE.
///
/// Approximation that compounds the binomial detection spread with the
/// uncertainty of the efficiency division; kept as-is and pinned by tests.
pub fn produced_scale(n_produced_mle: f64, eff: f64) -> f64 {
    let q = 1.0 / eff;
    (q + (q * q + 4.0 * n_produced_mle * q).sqrt()) / 2.0
}

/// One side of a domain: `ppf(cdf(offset); loc, scale)`, rounded and floored.
///
/// A degenerate scale collapses the bound onto the MLE.
pub fn count_bound(loc: f64, scale: f64, quantile_offset: f64, floor: f64) -> u64 {
    let raw = if scale.is_finite() && scale > 0.0 {
        loc + quantile_offset * scale
    } else {
        loc
    };
    let v = raw.round().max(floor);
    if v.is_finite() { v as u64 } else { floor.max(0.0) as u64 }
}

/// Annotate every event for the parameter point of `source`.
pub fn annotate(events: &[Event], source: &Source) -> Result<Vec<AnnotatedEvent>, AppError> {
    let table = QuenchingTable::build(source.yield_model())?;
    let offset = normal_quantile_offset(source.max_sigma());

    let annotated: Vec<AnnotatedEvent> = events
        .par_iter()
        .enumerate()
        .map(|(idx, event)| {
            annotate_event(event, source, &table, offset)
                .map_err(|e| e.context(format!("Event {idx}")))
        })
        .collect::<Result<_, _>>()?;

    if !annotated.is_empty() {
        let n = annotated.len() as f64;
        let mean_width = |f: fn(&LatentBounds) -> usize| {
            annotated.iter().map(|a| f(&a.annotation.bounds) as f64).sum::<f64>() / n
        };
        info!(
            events = annotated.len(),
            mean_photon_produced = mean_width(|b| b.photon_produced.len()),
            mean_electron_produced = mean_width(|b| b.electron_produced.len()),
            mean_nq = mean_width(|b| b.nq.len()),
            "annotated events"
        );
    }
    Ok(annotated)
}

/// Annotate a single event.
pub fn annotate_event(
    event: &Event,
    source: &Source,
    table: &QuenchingTable,
    quantile_offset: f64,
) -> Result<AnnotatedEvent, AppError> {
    if !(event.s1.is_finite() && event.s2.is_finite()) {
        return Err(AppError::invalid_input(format!(
            "Signals must be finite, got s1={}, s2={}.",
            event.s1, event.s2
        )));
    }
    let detector = source.detector();
    let photon = detector.channel_response(Channel::Photon, event);
    let electron = detector.channel_response(Channel::Electron, event);
    let p_dpe = detector.double_pe_fraction(event);

    // 1) Detected MLEs (kept unrounded until the derived quantities are done).
    let photon_floor = detector.min_detected(Channel::Photon);
    let electron_floor = detector.min_detected(Channel::Electron);
    let photon_detected_mle = (event.s1 / photon.gain_mean / (1.0 + p_dpe)).max(photon_floor);
    let electron_detected_mle = (event.s2 / electron.gain_mean).max(electron_floor);

    // 2) Penning quenching at the MLE.
    let penning = table.invert(photon_detected_mle / photon.detection_eff);

    // 3) Visible energy.
    let work = detector.work();
    let e_charge_vis = work * (electron_detected_mle / electron.detection_eff);
    let e_light_vis = work * (photon_detected_mle / (photon.detection_eff / penning));
    let e_vis = e_charge_vis + e_light_vis;
    let nq_vis_mle = e_vis / work;
    let fel_mle = source.yield_model().p_electron(nq_vis_mle);

    // 4) Domains.
    let photon_det = detected_scale(Channel::Photon, photon_detected_mle, &photon, p_dpe);
    let electron_det = detected_scale(Channel::Electron, electron_detected_mle, &electron, p_dpe);

    let (photon_detected, photon_produced) = channel_bounds(
        photon_detected_mle,
        photon_det,
        photon.detection_eff * penning,
        photon_floor,
        quantile_offset,
    )?;
    let (electron_detected, electron_produced) = channel_bounds(
        electron_detected_mle,
        electron_det,
        electron.detection_eff,
        electron_floor,
        quantile_offset,
    )?;

    let bounds = LatentBounds {
        photon_detected,
        photon_produced,
        electron_detected,
        electron_produced,
        nq: photon_produced.sum(&electron_produced),
    };

    Ok(AnnotatedEvent {
        event: event.clone(),
        annotation: EventAnnotation {
            photon,
            electron,
            double_pe_fraction: p_dpe,
            photon_detected_mle,
            electron_detected_mle,
            penning_quenching_eff_mle: penning,
            e_charge_vis,
            e_light_vis,
            e_vis,
            nq_vis_mle,
            fel_mle,
            bounds,
        },
    })
}

/// Spread of the detected count implied by the signal resolution.
fn detected_scale(
    channel: Channel,
    n: f64,
    response: &crate::domain::ChannelResponse,
    p_dpe: f64,
) -> f64 {
    match channel {
        Channel::Photon => dpe_mean_std(n, p_dpe, response.gain_mean, response.gain_std).1,
        Channel::Electron => n.sqrt() * response.gain_std / response.gain_mean,
    }
}

fn channel_bounds(
    detected_mle: f64,
    detected_scale: f64,
    eff: f64,
    floor: f64,
    quantile_offset: f64,
) -> Result<(CountBounds, CountBounds), AppError> {
    if !(eff.is_finite() && eff > 0.0) {
        return Err(AppError::computation(format!(
            "Detection efficiency must be finite and > 0, got {eff}."
        )));
    }
    let produced_mle = (detected_mle / eff).trunc();
    if !produced_mle.is_finite() {
        return Err(AppError::computation(format!(
            "Produced-quanta estimate is not finite (detected {detected_mle}, eff {eff})."
        )));
    }

    let detected = CountBounds::new(
        count_bound(detected_mle, detected_scale, -quantile_offset, floor),
        detected_mle.round() as u64,
        count_bound(detected_mle, detected_scale, quantile_offset, floor),
    );

    let scale = produced_scale(produced_mle, eff);
    let produced = CountBounds::new(
        count_bound(produced_mle, scale, -quantile_offset, floor),
        produced_mle as u64,
        count_bound(produced_mle, scale, quantile_offset, floor),
    );
    Ok((detected, produced))
}
