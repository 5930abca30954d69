//! Model parameters and run configuration.
//!
//! Every physics coefficient is a named, typed field with the default of the
//! reference liquid-xenon model. A parameter point is an immutable
//! [`ModelConfig`]; callers derive new points with [`ModelConfig::set`] or
//! [`ModelConfig::with_overrides`] before building a source.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::spectrum::SpectrumSource;
use crate::domain::types::{ModelKind, Multiplicity};
use crate::error::AppError;

/// Acceptance as a function of a single scalar (a count or a signal size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Acceptance {
    /// Accept everything.
    All,
    /// Accept `x >= min`.
    Threshold { min: f64 },
    /// Accept `min <= x <= max`.
    Window { min: f64, max: f64 },
}

impl Acceptance {
    pub fn eval(&self, x: f64) -> f64 {
        let accepted = match *self {
            Acceptance::All => true,
            Acceptance::Threshold { min } => x >= min,
            Acceptance::Window { min, max } => x >= min && x <= max,
        };
        if accepted { 1.0 } else { 0.0 }
    }

    fn set_min(&mut self, value: f64) {
        *self = match *self {
            Acceptance::Window { max, .. } => Acceptance::Window { min: value, max },
            _ => Acceptance::Threshold { min: value },
        };
    }

    fn set_max(&mut self, value: f64) {
        *self = match *self {
            Acceptance::Window { min, .. } | Acceptance::Threshold { min } => {
                Acceptance::Window { min, max: value }
            }
            Acceptance::All => Acceptance::Window {
                min: f64::NEG_INFINITY,
                max: value,
            },
        };
    }
}

/// Detector response coefficients shared by the ER and NR models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Average energy per produced quantum (keV).
    pub work: f64,
    /// Electron lifetime (ns).
    pub elife: f64,
    pub extraction_eff: f64,
    pub photon_detection_eff: f64,
    /// S2 gain per detected electron.
    pub g2: f64,
    pub electron_gain_std: f64,
    /// S1 gain per photoelectron.
    pub photon_gain_mean: f64,
    pub photon_gain_std: f64,
    pub double_pe_fraction: f64,
    /// Detection threshold on quanta; also the floor of every bound.
    pub min_s1_photons_detected: f64,
    pub min_s2_electrons_detected: f64,
    pub s1_acceptance: Acceptance,
    pub s2_acceptance: Acceptance,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            work: 13.7e-3,
            elife: 452e3,
            extraction_eff: 0.96,
            photon_detection_eff: 0.1,
            g2: 20.0,
            electron_gain_std: 5.0,
            photon_gain_mean: 1.0,
            photon_gain_std: 0.5,
            double_pe_fraction: 0.219,
            min_s1_photons_detected: 3.0,
            min_s2_electrons_detected: 3.0,
            s1_acceptance: Acceptance::Window { min: 2.0, max: 70.0 },
            s2_acceptance: Acceptance::Window {
                min: 200.0,
                max: 6000.0,
            },
        }
    }
}

/// Electron-fraction parameterization for electronic recoils.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErYieldParams {
    pub er_pel_a: f64,
    pub er_pel_b: f64,
    pub er_pel_c: f64,
    /// Reference energy (keV) of the log-energy expansion.
    pub er_pel_e0: f64,
    /// Asymptotic spread of the electron fraction.
    pub er_fluct_amplitude: f64,
    /// Quanta scale over which the spread saturates.
    pub er_fluct_scale: f64,
    pub er_fluct_floor: f64,
}

impl Default for ErYieldParams {
    fn default() -> Self {
        Self {
            er_pel_a: 15.0,
            er_pel_b: -27.7,
            er_pel_c: 32.5,
            er_pel_e0: 5.0,
            er_fluct_amplitude: 0.041,
            er_fluct_scale: 123.0,
            er_fluct_floor: 1e-4,
        }
    }
}

/// Recombination, Penning and Lindhard coefficients for nuclear recoils.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NrYieldParams {
    pub alpha: f64,
    pub zeta: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    /// Drift field (V/cm).
    pub drift_field: f64,
    pub lindhard_k: f64,
    /// Penning quenching strength.
    pub eta: f64,
    /// Penning quenching exponent.
    pub labda: f64,
}

impl Default for NrYieldParams {
    fn default() -> Self {
        Self {
            alpha: 1.280,
            zeta: 0.045,
            beta: 273.0 * 0.9e-4,
            gamma: 0.0141,
            delta: 0.062,
            drift_field: 120.0,
            lindhard_k: 0.138,
            eta: 8.2e-5 * 3.3,
            labda: 0.8 * 1.15,
        }
    }
}

/// Parametric S1/S2 response of one nuclear-recoil site, used by the
/// multi-site sources.
///
/// Per site of energy `E` (keV), with `l = log10(E) - 1.6`:
/// `s2 = m2 (c0 + c1 l + c2 l²) E g2`, `s1 = max(m1 (a E^b - s2/g2) g1, 0.01)`,
/// variances `d_s1 s1` and `d_s2 s2`, correlation `anti_corr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSignalParams {
    pub a: f64,
    pub b: f64,
    pub c_s2_0: f64,
    pub c_s2_1: f64,
    pub c_s2_2: f64,
    pub g1: f64,
    pub g2: f64,
    pub s1_mean_multiplier: f64,
    pub s2_mean_multiplier: f64,
    pub d_s1: f64,
    pub d_s2: f64,
    pub anti_corr: f64,
}

impl Default for SiteSignalParams {
    fn default() -> Self {
        Self {
            a: 13.1895962,
            b: 1.06532331,
            c_s2_0: 3.70318382,
            c_s2_1: -3.49159718,
            c_s2_2: 0.07861683,
            g1: 0.1131,
            g2: 47.35,
            s1_mean_multiplier: 1.0,
            s2_mean_multiplier: 1.0,
            d_s1: 1.20307136,
            d_s2: 38.27449296,
            anti_corr: -0.20949764,
        }
    }
}

/// Joint (S1, S2) acceptance of the multi-site sources: a box, the band cut
/// `s2 > band_coeff · s1^band_exp` and a veto of the NR endpoint region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S1S2Window {
    pub s1_min: f64,
    pub s1_max: f64,
    pub s2_min: f64,
    pub s2_max: f64,
    pub band_coeff: f64,
    pub band_exp: f64,
    pub veto_s1_min: f64,
    pub veto_s2_min: f64,
    pub veto_s2_max: f64,
}

impl Default for S1S2Window {
    fn default() -> Self {
        Self {
            s1_min: 20.0,
            s1_max: 200.0,
            s2_min: 400.0,
            s2_max: 3e4,
            band_coeff: 200.0,
            band_exp: 0.73,
            veto_s1_min: 140.0,
            veto_s2_min: 8e3,
            veto_s2_max: 11.5e3,
        }
    }
}

impl S1S2Window {
    /// 1 inside the accepted region, 0 outside.
    pub fn eval(&self, s1: f64, s2: f64) -> f64 {
        let in_box = s1 >= self.s1_min && s1 <= self.s1_max && s2 >= self.s2_min && s2 <= self.s2_max;
        let in_band = s2 > self.band_coeff * s1.powf(self.band_exp);
        let vetoed = s1 > self.veto_s1_min && s2 > self.veto_s2_min && s2 < self.veto_s2_max;
        if in_box && in_band && !vetoed { 1.0 } else { 0.0 }
    }
}

/// Detector geometry and time window used to draw event metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationGeometry {
    /// cm
    pub tpc_radius: f64,
    /// cm
    pub tpc_length: f64,
    /// cm/ns
    pub drift_velocity: f64,
    pub t_start: NaiveDateTime,
    pub t_stop: NaiveDateTime,
}

impl Default for SimulationGeometry {
    fn default() -> Self {
        let t_start = chrono::NaiveDate::from_ymd_opt(2016, 9, 13)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default();
        let t_stop = chrono::NaiveDate::from_ymd_opt(2017, 9, 13)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap_or_default();
        Self {
            tpc_radius: 47.9,
            tpc_length: 97.6,
            drift_velocity: 1.335e-4,
            t_start,
            t_stop,
        }
    }
}

impl SimulationGeometry {
    /// Start and stop of the event-time window, in ns since the Unix epoch.
    pub fn time_window_ns(&self) -> (f64, f64) {
        let to_ns = |t: &NaiveDateTime| {
            let utc = t.and_utc();
            utc.timestamp() as f64 * 1e9 + utc.timestamp_subsec_nanos() as f64
        };
        (to_ns(&self.t_start), to_ns(&self.t_stop))
    }
}

/// A full parameter point plus the settings needed to evaluate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: ModelKind,
    pub detector: DetectorParams,
    pub er: ErYieldParams,
    pub nr: NrYieldParams,
    /// Energy spectrum; `None` selects the default flat spectrum of `model`.
    pub spectrum: Option<SpectrumSource>,
    /// Width of the latent-count domains, in standard deviations.
    pub max_sigma: f64,
    pub geometry: SimulationGeometry,
    /// Scatter sites per event; anything but `single` selects the parametric
    /// multi-site source.
    pub multiplicity: Multiplicity,
    pub site_signal: SiteSignalParams,
    pub s1s2_window: S1S2Window,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_model(ModelKind::Er)
    }
}

/// Names accepted by [`ModelConfig::set`].
pub const PARAMETER_NAMES: &[&str] = &[
    "work",
    "elife",
    "extraction_eff",
    "photon_detection_eff",
    "g2",
    "electron_gain_std",
    "photon_gain_mean",
    "photon_gain_std",
    "double_pe_fraction",
    "min_s1_photons_detected",
    "min_s2_electrons_detected",
    "s1_min",
    "s1_max",
    "s2_min",
    "s2_max",
    "er_pel_a",
    "er_pel_b",
    "er_pel_c",
    "er_pel_e0",
    "er_fluct_amplitude",
    "er_fluct_scale",
    "er_fluct_floor",
    "alpha",
    "zeta",
    "beta",
    "gamma",
    "delta",
    "drift_field",
    "lindhard_k",
    "eta",
    "labda",
    "max_sigma",
    "ms_a",
    "ms_b",
    "ms_c_s2_0",
    "ms_c_s2_1",
    "ms_c_s2_2",
    "ms_g1",
    "ms_g2",
    "ms_s1_mean_multiplier",
    "ms_s2_mean_multiplier",
    "ms_d_s1",
    "ms_d_s2",
    "ms_anti_corr",
    "ms_s1_min",
    "ms_s1_max",
    "ms_s2_min",
    "ms_s2_max",
];

impl ModelConfig {
    fn validate_multi_site(&self) -> Result<(), AppError> {
        if self.model != ModelKind::Nr {
            return Err(AppError::config(format!(
                "{} sources are nuclear recoils; use `model = nr`.",
                self.multiplicity.name()
            )));
        }
        if matches!(self.spectrum, Some(SpectrumSource::TimeDependent(_))) {
            return Err(AppError::config(
                "Multi-site sources need a static energy spectrum.",
            ));
        }
        let p = &self.site_signal;
        for (name, v) in [("ms_g1", p.g1), ("ms_g2", p.g2), ("ms_d_s1", p.d_s1), ("ms_d_s2", p.d_s2)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(AppError::config(format!(
                    "Parameter `{name}` must be finite and > 0, got {v}."
                )));
            }
        }
        if !(p.anti_corr.is_finite() && p.anti_corr.abs() < 1.0) {
            return Err(AppError::config(format!(
                "Parameter `ms_anti_corr` must lie in (-1, 1), got {}.",
                p.anti_corr
            )));
        }
        Ok(())
    }

    pub fn for_model(model: ModelKind) -> Self {
        Self {
            model,
            detector: DetectorParams::default(),
            er: ErYieldParams::default(),
            nr: NrYieldParams::default(),
            spectrum: None,
            max_sigma: 3.0,
            geometry: SimulationGeometry::default(),
            multiplicity: Multiplicity::Single,
            site_signal: SiteSignalParams::default(),
            s1s2_window: S1S2Window::default(),
        }
    }

    /// Set one named scalar coefficient.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), AppError> {
        if !value.is_finite() {
            return Err(AppError::config(format!(
                "Parameter `{name}` must be finite, got {value}."
            )));
        }
        let d = &mut self.detector;
        match name {
            "work" => d.work = value,
            "elife" => d.elife = value,
            "extraction_eff" => d.extraction_eff = value,
            "photon_detection_eff" => d.photon_detection_eff = value,
            "g2" => d.g2 = value,
            "electron_gain_std" => d.electron_gain_std = value,
            "photon_gain_mean" => d.photon_gain_mean = value,
            "photon_gain_std" => d.photon_gain_std = value,
            "double_pe_fraction" => d.double_pe_fraction = value,
            "min_s1_photons_detected" => d.min_s1_photons_detected = value,
            "min_s2_electrons_detected" => d.min_s2_electrons_detected = value,
            "s1_min" => d.s1_acceptance.set_min(value),
            "s1_max" => d.s1_acceptance.set_max(value),
            "s2_min" => d.s2_acceptance.set_min(value),
            "s2_max" => d.s2_acceptance.set_max(value),
            "er_pel_a" => self.er.er_pel_a = value,
            "er_pel_b" => self.er.er_pel_b = value,
            "er_pel_c" => self.er.er_pel_c = value,
            "er_pel_e0" => self.er.er_pel_e0 = value,
            "er_fluct_amplitude" => self.er.er_fluct_amplitude = value,
            "er_fluct_scale" => self.er.er_fluct_scale = value,
            "er_fluct_floor" => self.er.er_fluct_floor = value,
            "alpha" => self.nr.alpha = value,
            "zeta" => self.nr.zeta = value,
            "beta" => self.nr.beta = value,
            "gamma" => self.nr.gamma = value,
            "delta" => self.nr.delta = value,
            "drift_field" => self.nr.drift_field = value,
            "lindhard_k" => self.nr.lindhard_k = value,
            "eta" => self.nr.eta = value,
            "labda" => self.nr.labda = value,
            "max_sigma" => self.max_sigma = value,
            "ms_a" => self.site_signal.a = value,
            "ms_b" => self.site_signal.b = value,
            "ms_c_s2_0" => self.site_signal.c_s2_0 = value,
            "ms_c_s2_1" => self.site_signal.c_s2_1 = value,
            "ms_c_s2_2" => self.site_signal.c_s2_2 = value,
            "ms_g1" => self.site_signal.g1 = value,
            "ms_g2" => self.site_signal.g2 = value,
            "ms_s1_mean_multiplier" => self.site_signal.s1_mean_multiplier = value,
            "ms_s2_mean_multiplier" => self.site_signal.s2_mean_multiplier = value,
            "ms_d_s1" => self.site_signal.d_s1 = value,
            "ms_d_s2" => self.site_signal.d_s2 = value,
            "ms_anti_corr" => self.site_signal.anti_corr = value,
            "ms_s1_min" => self.s1s2_window.s1_min = value,
            "ms_s1_max" => self.s1s2_window.s1_max = value,
            "ms_s2_min" => self.s1s2_window.s2_min = value,
            "ms_s2_max" => self.s1s2_window.s2_max = value,
            _ => {
                return Err(AppError::config(format!(
                    "Unknown model parameter `{name}`. Known parameters: {}.",
                    PARAMETER_NAMES.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Copy of `self` with every named override applied.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, f64>) -> Result<Self, AppError> {
        let mut out = self.clone();
        for (name, &value) in overrides {
            out.set(name, value)?;
        }
        Ok(out)
    }

    /// Reject parameter points the model functions cannot be evaluated at.
    pub fn validate(&self) -> Result<(), AppError> {
        let d = &self.detector;
        let positive = [
            ("work", d.work),
            ("elife", d.elife),
            ("g2", d.g2),
            ("photon_gain_mean", d.photon_gain_mean),
            ("max_sigma", self.max_sigma),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(AppError::config(format!(
                    "Parameter `{name}` must be finite and > 0, got {v}."
                )));
            }
        }
        let non_negative = [
            ("electron_gain_std", d.electron_gain_std),
            ("photon_gain_std", d.photon_gain_std),
            ("min_s1_photons_detected", d.min_s1_photons_detected),
            ("min_s2_electrons_detected", d.min_s2_electrons_detected),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                return Err(AppError::config(format!(
                    "Parameter `{name}` must be finite and >= 0, got {v}."
                )));
            }
        }
        if let Some(spectrum) = &self.spectrum {
            spectrum.validate()?;
        }
        if self.multiplicity != Multiplicity::Single {
            self.validate_multi_site()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_known_and_unknown_names() {
        let mut config = ModelConfig::for_model(ModelKind::Nr);
        config.set("elife", 600e3).unwrap();
        config.set("lindhard_k", 0.15).unwrap();
        assert_eq!(config.detector.elife, 600e3);
        assert_eq!(config.nr.lindhard_k, 0.15);

        let err = config.set("no_such_thing", 1.0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn every_listed_name_is_settable() {
        let mut config = ModelConfig::default();
        for name in PARAMETER_NAMES {
            config.set(name, 1.0).unwrap();
        }
    }

    #[test]
    fn window_overrides_keep_the_other_edge() {
        let mut config = ModelConfig::default();
        config.set("s1_max", 100.0).unwrap();
        assert_eq!(
            config.detector.s1_acceptance,
            Acceptance::Window { min: 2.0, max: 100.0 }
        );
    }

    #[test]
    fn acceptance_eval() {
        let w = Acceptance::Window { min: 2.0, max: 70.0 };
        assert_eq!(w.eval(1.9), 0.0);
        assert_eq!(w.eval(2.0), 1.0);
        assert_eq!(w.eval(70.1), 0.0);
        assert_eq!(Acceptance::Threshold { min: 3.0 }.eval(2.0), 0.0);
        assert_eq!(Acceptance::All.eval(-5.0), 1.0);
    }

    #[test]
    fn validate_rejects_non_positive_work() {
        let mut config = ModelConfig::default();
        config.detector.work = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn s1s2_window_cuts() {
        let w = S1S2Window::default();
        assert_eq!(w.eval(30.0, 3000.0), 1.0);
        assert_eq!(w.eval(10.0, 3000.0), 0.0);
        // Below the band: 200 · 100^0.73 ≈ 5750.
        assert_eq!(w.eval(100.0, 5000.0), 0.0);
        assert_eq!(w.eval(100.0, 7000.0), 1.0);
        // Endpoint veto.
        assert_eq!(w.eval(150.0, 9000.0), 0.0);
        assert_eq!(w.eval(150.0, 12000.0), 1.0);
    }

    #[test]
    fn multi_site_needs_nuclear_recoils() {
        let mut config = ModelConfig::for_model(ModelKind::Er);
        config.multiplicity = Multiplicity::Double;
        assert_eq!(config.validate().unwrap_err().kind(), crate::error::ErrorKind::Configuration);
        config.model = ModelKind::Nr;
        assert!(config.validate().is_ok());
        config.set("ms_anti_corr", -1.0).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ModelConfig::for_model(ModelKind::Nr);
        let text = serde_json::to_string(&config).unwrap();
        let back: ModelConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
