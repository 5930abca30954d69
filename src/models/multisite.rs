//! Multi-site nuclear-recoil sources.
//!
//! A neutron scattering `k` times deposits `k` independent energies drawn from
//! the same spectrum. Each site has a parametric Gaussian (S1, S2) response;
//! the site moments add, so an event is a mixture of correlated bivariate
//! normals over every unordered combination of spectrum points, cut by the
//! joint S1/S2 window.

use rayon::prelude::*;
use tracing::debug;

use crate::domain::{
    EnergySpectrum, Event, ModelConfig, ModelKind, Multiplicity, S1S2Window, SiteSignalParams,
    SpectrumSource,
};
use crate::error::AppError;
use crate::math::bivariate_normal_pdf;

/// Most mixture components a source may hold.
pub const MAX_COMPONENTS: usize = 1 << 20;

/// Floor on the per-site signal means.
const SITE_SIGNAL_FLOOR: f64 = 0.01;

/// Mean and (co)variance of the summed (S1, S2) signals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalMoments {
    pub s1_mean: f64,
    pub s2_mean: f64,
    pub s1_var: f64,
    pub s2_var: f64,
    pub cov: f64,
}

impl SignalMoments {
    /// Moments of two independent deposits in the same event.
    pub fn add(self, other: SignalMoments) -> SignalMoments {
        SignalMoments {
            s1_mean: self.s1_mean + other.s1_mean,
            s2_mean: self.s2_mean + other.s2_mean,
            s1_var: self.s1_var + other.s1_var,
            s2_var: self.s2_var + other.s2_var,
            cov: self.cov + other.cov,
        }
    }

    /// Correlation coefficient of S1 and S2.
    pub fn correlation(&self) -> f64 {
        let denom = (self.s1_var * self.s2_var).sqrt();
        if denom > 0.0 { self.cov / denom } else { 0.0 }
    }

    pub fn pdf(&self, s1: f64, s2: f64) -> f64 {
        bivariate_normal_pdf(s1 - self.s1_mean, s2 - self.s2_mean, self.s1_var, self.s2_var, self.cov)
    }
}

/// Signal moments of a single site depositing `energy` keV.
pub fn site_moments(energy: f64, p: &SiteSignalParams) -> SignalMoments {
    if !(energy.is_finite() && energy > 0.0) {
        return SignalMoments::default();
    }
    let l = energy.log10() - 1.6;
    let charge_yield = p.c_s2_0 + p.c_s2_1 * l + p.c_s2_2 * l * l;
    let s2_mean = (p.s2_mean_multiplier * charge_yield * energy * p.g2).max(SITE_SIGNAL_FLOOR);
    let s1_mean = (p.s1_mean_multiplier * (p.a * energy.powf(p.b) - s2_mean / p.g2) * p.g1)
        .max(SITE_SIGNAL_FLOOR);
    let s1_var = p.d_s1 * s1_mean;
    let s2_var = p.d_s2 * s2_mean;
    SignalMoments {
        s1_mean,
        s2_mean,
        s1_var,
        s2_var,
        cov: p.anti_corr * (s1_var * s2_var).sqrt(),
    }
}

/// One term of the event mixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    /// Probability of this unordered energy combination.
    pub weight: f64,
    pub moments: SignalMoments,
}

/// Unordered `k`-combinations (with repetition) of `0..n`, in lexicographic order.
fn multisets(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if n == 0 || k == 0 {
        return out;
    }
    let mut idx = vec![0usize; k];
    loop {
        out.push(idx.clone());
        // Rightmost position that can still grow.
        let Some(pos) = (0..k).rev().find(|&i| idx[i] + 1 < n) else {
            return out;
        };
        let next = idx[pos] + 1;
        for v in &mut idx[pos..] {
            *v = next;
        }
    }
}

/// Number of orderings of a sorted index tuple.
fn orderings(sorted: &[usize]) -> f64 {
    let factorial = |m: usize| (1..=m).map(|v| v as f64).product::<f64>();
    let mut denom = 1.0;
    let mut run = 1;
    for w in sorted.windows(2) {
        if w[0] == w[1] {
            run += 1;
        } else {
            denom *= factorial(run);
            run = 1;
        }
    }
    denom *= factorial(run);
    factorial(sorted.len()) / denom
}

fn binomial_count(n: usize, k: usize) -> f64 {
    (1..=k).map(|i| (n + 1 - i) as f64 / i as f64).product()
}

/// Parametric multi-site source: one parameter point, ready to evaluate.
#[derive(Debug, Clone)]
pub struct MultiSiteSource {
    multiplicity: Multiplicity,
    spectrum: EnergySpectrum,
    params: SiteSignalParams,
    window: S1S2Window,
    components: Vec<Component>,
}

impl MultiSiteSource {
    /// Validate `config` and precompute the event mixture.
    pub fn from_config(config: &ModelConfig) -> Result<Self, AppError> {
        config.validate()?;
        if config.multiplicity == Multiplicity::Single {
            return Err(AppError::config(
                "Multi-site source requested with `multiplicity = single`.",
            ));
        }
        let spectrum = match &config.spectrum {
            None => EnergySpectrum::default_for(ModelKind::Nr),
            Some(SpectrumSource::Static(s)) => s.clone(),
            Some(SpectrumSource::TimeDependent(_)) => {
                return Err(AppError::config(
                    "Multi-site sources need a static energy spectrum.",
                ));
            }
        };
        Self::new(
            config.multiplicity,
            spectrum,
            config.site_signal.clone(),
            config.s1s2_window.clone(),
        )
    }

    pub fn new(
        multiplicity: Multiplicity,
        spectrum: EnergySpectrum,
        params: SiteSignalParams,
        window: S1S2Window,
    ) -> Result<Self, AppError> {
        spectrum.validate()?;
        let total = spectrum.total_rate();
        if !(total > 0.0) {
            return Err(AppError::invalid_input("Energy spectrum has zero total rate."));
        }
        let k = multiplicity.sites();
        let n = spectrum.len();
        let count = binomial_count(n + k - 1, k);
        if count > MAX_COMPONENTS as f64 {
            return Err(AppError::computation(format!(
                "{} source over {n} spectrum points needs {count:.0} mixture components (limit {MAX_COMPONENTS}).",
                multiplicity.name()
            )));
        }

        let probs: Vec<f64> = spectrum.rates.iter().map(|r| r / total).collect();
        let sites: Vec<SignalMoments> = spectrum
            .energies
            .iter()
            .map(|&e| site_moments(e, &params))
            .collect();
        let components: Vec<Component> = multisets(n, k)
            .into_iter()
            .filter_map(|idx| {
                let weight = orderings(&idx) * idx.iter().map(|&i| probs[i]).product::<f64>();
                if !(weight > 0.0) {
                    return None;
                }
                let moments = idx
                    .iter()
                    .fold(SignalMoments::default(), |acc, &i| acc.add(sites[i]));
                Some(Component { weight, moments })
            })
            .collect();

        debug!(
            multiplicity = multiplicity.name(),
            points = n,
            components = components.len(),
            "built multi-site source"
        );
        Ok(Self {
            multiplicity,
            spectrum,
            params,
            window,
            components,
        })
    }

    pub fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    pub fn spectrum(&self) -> &EnergySpectrum {
        &self.spectrum
    }

    pub fn params(&self) -> &SiteSignalParams {
        &self.params
    }

    pub fn window(&self) -> &S1S2Window {
        &self.window
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Expected number of events before the S1/S2 window.
    pub fn mu_before_efficiencies(&self) -> f64 {
        self.spectrum.total_rate()
    }

    /// Moments of the summed signals for explicit site energies.
    pub fn event_moments(&self, energies: &[f64]) -> SignalMoments {
        energies
            .iter()
            .fold(SignalMoments::default(), |acc, &e| acc.add(site_moments(e, &self.params)))
    }

    /// Differential rate at `(s1, s2)`: zero outside the window.
    pub fn density(&self, s1: f64, s2: f64) -> f64 {
        if self.window.eval(s1, s2) == 0.0 {
            return 0.0;
        }
        let mixture: f64 = self
            .components
            .iter()
            .map(|c| c.weight * c.moments.pdf(s1, s2))
            .sum();
        self.mu_before_efficiencies() * mixture
    }

    /// Differential rate of each event.
    pub fn differential_rate(&self, events: &[Event]) -> Result<Vec<f64>, AppError> {
        if let Some(i) = events
            .iter()
            .position(|e| !(e.s1.is_finite() && e.s2.is_finite()))
        {
            return Err(AppError::invalid_input(format!(
                "Event {i}: signals must be finite, got s1={} s2={}.",
                events[i].s1, events[i].s2
            )));
        }
        Ok(events.par_iter().map(|e| self.density(e.s1, e.s2)).collect())
    }
}
