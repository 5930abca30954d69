//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between annotation, rate evaluation and simulation
//! - exported to CSV/JSON
//! - reloaded later as inputs for another evaluation

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Quanta carrier type, and the signal channel it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Scintillation photons, observed as S1.
    Photon,
    /// Ionization electrons, observed as S2.
    Electron,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Photon, Channel::Electron];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Photon => "photon",
            Channel::Electron => "electron",
        }
    }

    pub fn signal_name(self) -> &'static str {
        match self {
            Channel::Photon => "s1",
            Channel::Electron => "s2",
        }
    }
}

/// Which emission model to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Electronic recoils.
    Er,
    /// Nuclear recoils.
    Nr,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Er => "ER",
            ModelKind::Nr => "NR",
        }
    }
}

/// Number of scatter sites contributing to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    /// One site, resolved quanta by quanta.
    #[default]
    Single,
    /// Two unresolved nuclear-recoil sites.
    Double,
    /// Three unresolved nuclear-recoil sites.
    Triple,
}

impl Multiplicity {
    pub fn sites(self) -> usize {
        match self {
            Multiplicity::Single => 1,
            Multiplicity::Double => 2,
            Multiplicity::Triple => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Multiplicity::Single => "single-site",
            Multiplicity::Double => "double-site",
            Multiplicity::Triple => "triple-site",
        }
    }
}

/// One observed interaction.
///
/// Only `s1`/`s2` enter the emission model directly; the position and time
/// fields feed position- or time-dependent model functions (electron
/// lifetime, time-dependent spectra).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub s1: f64,
    pub s2: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: f64,
    pub theta: f64,
    /// Drift time (ns).
    pub drift_time: f64,
    /// Event time (ns since the Unix epoch).
    pub event_time: f64,
}

impl Event {
    /// Event at the given signals with all metadata zeroed.
    pub fn from_signals(s1: f64, s2: f64) -> Self {
        Self {
            s1,
            s2,
            ..Self::default()
        }
    }

    pub fn signal(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Photon => self.s1,
            Channel::Electron => self.s2,
        }
    }
}

/// Finite integer domain `[min, max]` of one latent count, with its MLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBounds {
    pub min: u64,
    pub mle: u64,
    pub max: u64,
}

impl CountBounds {
    /// Build bounds, widening `[min, max]` where rounding left the MLE outside.
    pub fn new(min: u64, mle: u64, max: u64) -> Self {
        Self {
            min: min.min(mle),
            mle,
            max: max.max(mle),
        }
    }

    /// Number of integers in the domain.
    pub fn len(&self) -> usize {
        (self.max - self.min + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, n: u64) -> bool {
        self.min <= n && n <= self.max
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u64> {
        self.min..=self.max
    }

    /// Sum of two domains (e.g. photons + electrons = total quanta).
    pub fn sum(&self, other: &CountBounds) -> CountBounds {
        CountBounds::new(
            self.min + other.min,
            self.mle + other.mle,
            self.max + other.max,
        )
    }
}

/// Bounds on every latent count of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatentBounds {
    pub photon_detected: CountBounds,
    pub photon_produced: CountBounds,
    pub electron_detected: CountBounds,
    pub electron_produced: CountBounds,
    pub nq: CountBounds,
}

impl LatentBounds {
    pub fn detected(&self, channel: Channel) -> &CountBounds {
        match channel {
            Channel::Photon => &self.photon_detected,
            Channel::Electron => &self.electron_detected,
        }
    }

    pub fn produced(&self, channel: Channel) -> &CountBounds {
        match channel {
            Channel::Photon => &self.photon_produced,
            Channel::Electron => &self.electron_produced,
        }
    }
}

/// Nominal model values evaluated at one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub detection_eff: f64,
    pub gain_mean: f64,
    pub gain_std: f64,
}

/// Everything the bounds estimator derives for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub photon: ChannelResponse,
    pub electron: ChannelResponse,
    pub double_pe_fraction: f64,
    /// Unrounded detected-quanta MLEs (after the physical floor).
    pub photon_detected_mle: f64,
    pub electron_detected_mle: f64,
    pub penning_quenching_eff_mle: f64,
    pub e_charge_vis: f64,
    pub e_light_vis: f64,
    pub e_vis: f64,
    pub nq_vis_mle: f64,
    pub fel_mle: f64,
    pub bounds: LatentBounds,
}

impl EventAnnotation {
    pub fn response(&self, channel: Channel) -> &ChannelResponse {
        match channel {
            Channel::Photon => &self.photon,
            Channel::Electron => &self.electron,
        }
    }
}

/// An event together with its annotation for the current parameter point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedEvent {
    pub event: Event,
    pub annotation: EventAnnotation,
}

/// A simulated event with every latent column of the forward chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedEvent {
    pub event: Event,
    /// Deposited energy (keV).
    pub energy: f64,
    pub nq: u64,
    pub p_el_mean: f64,
    pub p_el_fluct: f64,
    pub p_el_actual: f64,
    pub electron_produced: u64,
    pub photon_produced: u64,
    pub electron_detected: u64,
    pub photon_detected: u64,
}

/// A simulated multi-site event with its per-site energies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSiteEvent {
    pub event: Event,
    /// Deposited energy of each site (keV).
    pub energies: Vec<f64>,
}

impl MultiSiteEvent {
    pub fn total_energy(&self) -> f64 {
        self.energies.iter().sum()
    }
}

impl SimulatedEvent {
    pub fn detected(&self, channel: Channel) -> u64 {
        match channel {
            Channel::Photon => self.photon_detected,
            Channel::Electron => self.electron_detected,
        }
    }

    pub fn produced(&self, channel: Channel) -> u64 {
        match channel {
            Channel::Photon => self.photon_produced,
            Channel::Electron => self.electron_produced,
        }
    }
}
