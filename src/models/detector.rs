//! Detector capability interface: efficiencies, gains, acceptances.
//!
//! The rate engine, the bounds estimator and the simulator only use the
//! [`DetectorResponse`] trait. [`DetectorParams`] is the default detector.

use crate::domain::{ChannelResponse, DetectorParams, Event};
use crate::domain::types::Channel;

/// Named detector functions evaluated per event.
pub trait DetectorResponse: Send + Sync {
    /// Probability that a produced quantum is detected, before any
    /// count-dependent quenching.
    fn detection_eff(&self, channel: Channel, event: &Event) -> f64;

    /// Mean signal per detected quantum (per photoelectron for S1).
    fn gain_mean(&self, channel: Channel, event: &Event) -> f64;

    fn gain_std(&self, channel: Channel, event: &Event) -> f64;

    fn double_pe_fraction(&self, event: &Event) -> f64;

    /// Average energy per produced quantum (keV).
    fn work(&self) -> f64;

    /// Acceptance as a function of the detected count.
    fn quanta_acceptance(&self, channel: Channel, n_detected: f64) -> f64 {
        if n_detected >= self.min_detected(channel) { 1.0 } else { 0.0 }
    }

    /// Acceptance as a function of the observed signal.
    fn signal_acceptance(&self, channel: Channel, signal: f64) -> f64;

    /// Smallest detected count the detector can register.
    fn min_detected(&self, channel: Channel) -> f64;

    /// The three nominal values of one channel at `event`.
    fn channel_response(&self, channel: Channel, event: &Event) -> ChannelResponse {
        ChannelResponse {
            detection_eff: self.detection_eff(channel, event),
            gain_mean: self.gain_mean(channel, event),
            gain_std: self.gain_std(channel, event),
        }
    }
}

impl DetectorResponse for DetectorParams {
    fn detection_eff(&self, channel: Channel, event: &Event) -> f64 {
        match channel {
            Channel::Photon => self.photon_detection_eff,
            Channel::Electron => self.extraction_eff * (-event.drift_time / self.elife).exp(),
        }
    }

    fn gain_mean(&self, channel: Channel, _event: &Event) -> f64 {
        match channel {
            Channel::Photon => self.photon_gain_mean,
            Channel::Electron => self.g2,
        }
    }

    fn gain_std(&self, channel: Channel, _event: &Event) -> f64 {
        match channel {
            Channel::Photon => self.photon_gain_std,
            Channel::Electron => self.electron_gain_std,
        }
    }

    fn double_pe_fraction(&self, _event: &Event) -> f64 {
        self.double_pe_fraction
    }

    fn work(&self) -> f64 {
        self.work
    }

    fn signal_acceptance(&self, channel: Channel, signal: f64) -> f64 {
        match channel {
            Channel::Photon => self.s1_acceptance.eval(signal),
            Channel::Electron => self.s2_acceptance.eval(signal),
        }
    }

    fn min_detected(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Photon => self.min_s1_photons_detected,
            Channel::Electron => self.min_s2_electrons_detected,
        }
    }
}

/// Mean and standard deviation of S1 for `n_detected` photons when each
/// photon may emit a second photoelectron with probability `p_dpe`.
///
/// The variance adds PMT resolution on the photoelectron count and the
/// binomial spread of the single/double split.
pub fn dpe_mean_std(n_detected: f64, p_dpe: f64, gain_mean: f64, gain_std: f64) -> (f64, f64) {
    let npe_mean = n_detected * (1.0 + p_dpe);
    let mean = npe_mean * gain_mean;
    let pmt_std = npe_mean.sqrt() * gain_std;
    let var = pmt_std * pmt_std + n_detected * p_dpe * (1.0 - p_dpe);
    (mean, var.sqrt())
}

/// Mean and standard deviation of the signal produced by `n_detected` quanta.
pub fn signal_mean_std(
    channel: Channel,
    n_detected: f64,
    response: &ChannelResponse,
    p_dpe: f64,
) -> (f64, f64) {
    match channel {
        Channel::Photon => dpe_mean_std(n_detected, p_dpe, response.gain_mean, response.gain_std),
        Channel::Electron => (
            n_detected * response.gain_mean,
            n_detected.sqrt() * response.gain_std,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn dpe_mean_and_variance() {
        let (mean, std) = dpe_mean_std(10.0, 0.2, 1.0, 0.5);
        assert_relative_eq!(mean, 12.0, max_relative = 1e-12);
        assert_relative_eq!(std * std, 4.6, max_relative = 1e-12);
    }

    #[test]
    fn electron_efficiency_decays_with_drift_time() {
        let d = DetectorParams::default();
        let top = Event::default();
        let deep = Event {
            drift_time: d.elife,
            ..Event::default()
        };
        assert_relative_eq!(d.detection_eff(Channel::Electron, &top), 0.96);
        assert_relative_eq!(
            d.detection_eff(Channel::Electron, &deep),
            0.96 * (-1.0f64).exp(),
            max_relative = 1e-12
        );
        assert_eq!(d.detection_eff(Channel::Photon, &deep), 0.1);
    }

    #[test]
    fn default_acceptances() {
        let d = DetectorParams::default();
        assert_eq!(d.quanta_acceptance(Channel::Photon, 2.0), 0.0);
        assert_eq!(d.quanta_acceptance(Channel::Photon, 3.0), 1.0);
        assert_eq!(d.signal_acceptance(Channel::Photon, 1.0), 0.0);
        assert_eq!(d.signal_acceptance(Channel::Photon, 30.0), 1.0);
        assert_eq!(d.signal_acceptance(Channel::Electron, 6001.0), 0.0);
    }

    #[test]
    fn electron_signal_moments() {
        let r = ChannelResponse {
            detection_eff: 0.9,
            gain_mean: 20.0,
            gain_std: 5.0,
        };
        let (mean, std) = signal_mean_std(Channel::Electron, 16.0, &r, 0.0);
        assert_eq!(mean, 320.0);
        assert_eq!(std, 20.0);
    }
}
