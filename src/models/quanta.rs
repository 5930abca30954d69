//! Quanta yield: energy deposit -> produced quanta -> electron/photon split.
//!
//! Each recoil type implements [`QuantaYield`]. The rate engine and the
//! simulator only talk to the trait, so swapping a parameterization means
//! adding an implementation, not touching the engine.

use rand::RngCore;
use rand_distr::{Distribution, Poisson};

use crate::domain::{CountBounds, EnergySpectrum, ErYieldParams, ModelConfig, ModelKind, NrYieldParams};
use crate::math::{P_CLIP_EPS, poisson_pmf, sanitize_probability};

/// keV per quantum used by the ER electron-fraction fit (independent of `work`).
const ER_FIT_KEV_PER_QUANTUM: f64 = 13.7e-3;

/// Atomic number of xenon, for the Lindhard reduced energy.
const XENON_Z: f64 = 54.0;

/// Physics functions of one recoil type.
pub trait QuantaYield: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Probability that a produced quantum is an electron, clipped into
    /// `[1e-6, 1 - 1e-6]` with NaN mapped to the lower edge.
    fn p_electron(&self, nq: f64) -> f64;

    /// Spread of the electron fraction, for variants with non-binomial
    /// recombination fluctuations.
    fn p_electron_fluctuation(&self, nq: f64) -> Option<f64>;

    /// Multiplicative photon detection loss as a function of produced photons.
    fn penning_quenching_eff(&self, n_photons_produced: f64) -> f64;

    /// Relative rate of each `nq` in `domain` for the given spectrum.
    fn rate_nq(&self, domain: &CountBounds, spectrum: &EnergySpectrum, work: f64) -> Vec<f64>;

    /// Draw the number of produced quanta for one deposit.
    fn sample_nq(&self, energy: f64, work: f64, rng: &mut dyn RngCore) -> u64;
}

/// Build the yield strategy selected by `config.model`.
pub fn build_yield(config: &ModelConfig) -> Box<dyn QuantaYield> {
    match config.model {
        ModelKind::Er => Box::new(ErYield::new(config.er.clone())),
        ModelKind::Nr => Box::new(NrYield::new(config.nr.clone())),
    }
}

/// Electronic recoils: deterministic quanta, fluctuating electron fraction.
#[derive(Debug, Clone)]
pub struct ErYield {
    params: ErYieldParams,
}

impl ErYield {
    pub fn new(params: ErYieldParams) -> Self {
        Self { params }
    }

    /// Deterministic number of quanta for a deposit.
    pub fn quanta(energy: f64, work: f64) -> u64 {
        let q = (energy / work).floor();
        if q.is_finite() && q > 0.0 { q as u64 } else { 0 }
    }
}

impl QuantaYield for ErYield {
    fn kind(&self) -> ModelKind {
        ModelKind::Er
    }

    fn p_electron(&self, nq: f64) -> f64 {
        let p = &self.params;
        let e_kev = nq * ER_FIT_KEV_PER_QUANTUM;
        let eps = (e_kev / p.er_pel_e0 + 1e-9).log10();
        let qy = p.er_pel_a * eps * eps + p.er_pel_b * eps + p.er_pel_c;
        sanitize_probability(qy * ER_FIT_KEV_PER_QUANTUM, P_CLIP_EPS)
    }

    fn p_electron_fluctuation(&self, nq: f64) -> Option<f64> {
        let p = &self.params;
        let v = p.er_fluct_amplitude * (1.0 - (-nq / p.er_fluct_scale).exp());
        Some(v.max(p.er_fluct_floor))
    }

    fn penning_quenching_eff(&self, _n_photons_produced: f64) -> f64 {
        1.0
    }

    /// Histogram rebin: every energy contributes its rate to `floor(E / W)`.
    fn rate_nq(&self, domain: &CountBounds, spectrum: &EnergySpectrum, work: f64) -> Vec<f64> {
        let mut out = vec![0.0; domain.len()];
        for (&e, &rate) in spectrum.energies.iter().zip(&spectrum.rates) {
            let q = (e / work).floor();
            if !q.is_finite() || q < 0.0 {
                continue;
            }
            let q = q as u64;
            if domain.contains(q) {
                out[(q - domain.min) as usize] += rate;
            }
        }
        out
    }

    fn sample_nq(&self, energy: f64, work: f64, _rng: &mut dyn RngCore) -> u64 {
        Self::quanta(energy, work)
    }
}

/// Nuclear recoils: Lindhard-quenched Poisson quanta, Penning-quenched light.
#[derive(Debug, Clone)]
pub struct NrYield {
    params: NrYieldParams,
}

impl NrYield {
    pub fn new(params: NrYieldParams) -> Self {
        Self { params }
    }

    /// Lindhard quenching factor at recoil energy `e` (keV).
    pub fn lindhard_l(&self, e: f64) -> f64 {
        let k = self.params.lindhard_k;
        let eps = e * 11.5 * XENON_Z.powf(-7.0 / 3.0);
        let g = 3.0 * eps.powf(0.15) + 0.7 * eps.powf(0.6) + eps;
        k * g / (1.0 + k * g)
    }

    /// Mean number of produced quanta for a deposit.
    pub fn mean_quanta(&self, energy: f64, work: f64) -> f64 {
        energy * self.lindhard_l(energy) / work
    }
}

impl QuantaYield for NrYield {
    fn kind(&self) -> ModelKind {
        ModelKind::Nr
    }

    /// Recombination model in the form of Lenardo et al. (2015), written as a
    /// function of `nq` rather than energy.
    fn p_electron(&self, nq: f64) -> f64 {
        let p = &self.params;
        let nq = nq + 1e-9;

        let nexni = p.alpha * p.drift_field.powf(-p.zeta) * (1.0 - (-p.beta * nq).exp());
        let ni = nq / (1.0 + nexni);

        // Fraction of ions escaping recombination.
        let squiggle = p.gamma * p.drift_field.powf(-p.delta);
        let fnotr = (ni * squiggle).ln_1p() / (ni * squiggle);

        sanitize_probability(ni * fnotr / nq, P_CLIP_EPS)
    }

    fn p_electron_fluctuation(&self, _nq: f64) -> Option<f64> {
        None
    }

    fn penning_quenching_eff(&self, n_photons_produced: f64) -> f64 {
        1.0 / (1.0 + self.params.eta * n_photons_produced.powf(self.params.labda))
    }

    fn rate_nq(&self, domain: &CountBounds, spectrum: &EnergySpectrum, work: f64) -> Vec<f64> {
        let means: Vec<f64> = spectrum
            .energies
            .iter()
            .map(|&e| self.mean_quanta(e, work))
            .collect();
        domain
            .iter()
            .map(|nq| {
                means
                    .iter()
                    .zip(&spectrum.rates)
                    .map(|(&mu, &rate)| poisson_pmf(nq, mu) * rate)
                    .sum()
            })
            .collect()
    }

    fn sample_nq(&self, energy: f64, work: f64, rng: &mut dyn RngCore) -> u64 {
        let mu = self.mean_quanta(energy, work);
        if !(mu.is_finite() && mu > 0.0) {
            return 0;
        }
        match Poisson::new(mu) {
            Ok(dist) => {
                let draw: f64 = dist.sample(rng);
                draw as u64
            }
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const WORK: f64 = 13.7e-3;

    #[test]
    fn lindhard_factor_at_ten_kev() {
        let nr = NrYield::new(NrYieldParams::default());
        let l = nr.lindhard_l(10.0);
        assert!((0.16..0.19).contains(&l), "L(10 keV) = {l}");
        // Monotonic and bounded in [0, 1).
        assert!(nr.lindhard_l(50.0) > l);
        assert!(nr.lindhard_l(1e6) < 1.0);
    }

    #[test]
    fn nr_poisson_mean_matches_lindhard() {
        let nr = NrYield::new(NrYieldParams::default());
        let mut rng = StdRng::seed_from_u64(1234);
        let n = 20_000;
        let total: u64 = (0..n).map(|_| nr.sample_nq(10.0, WORK, &mut rng)).sum();
        let sample_mean = total as f64 / n as f64;
        let expected = nr.mean_quanta(10.0, WORK);
        assert!((115.0..135.0).contains(&expected), "expected mean {expected}");
        assert!(
            (sample_mean / expected - 1.0).abs() < 0.02,
            "sample mean {sample_mean} vs {expected}"
        );
    }

    #[test]
    fn er_rate_nq_is_an_exact_rebin() {
        let er = ErYield::new(ErYieldParams::default());
        let spectrum = EnergySpectrum::new(
            vec![0.1, 0.105, 0.2, 0.5],
            vec![1.0, 2.0, 4.0, 8.0],
        )
        .unwrap();
        // floor(E / W) = 7, 7, 14, 36
        let domain = CountBounds::new(5, 10, 20);
        let rates = er.rate_nq(&domain, &spectrum, WORK);
        assert_eq!(rates.len(), 16);
        assert_eq!(rates[2], 3.0);
        assert_eq!(rates[9], 4.0);
        assert_eq!(rates.iter().sum::<f64>(), 7.0);
    }

    #[test]
    fn nr_rate_nq_matches_poisson_sum() {
        let nr = NrYield::new(NrYieldParams::default());
        let spectrum = EnergySpectrum::new(vec![10.0], vec![2.0]).unwrap();
        let domain = CountBounds::new(0, 130, 400);
        let rates = nr.rate_nq(&domain, &spectrum, WORK);
        let total: f64 = rates.iter().sum();
        assert!((total - 2.0).abs() < 1e-9, "total {total}");
    }

    #[test]
    fn electron_fraction_is_a_probability() {
        let er = ErYield::new(ErYieldParams::default());
        let nr = NrYield::new(NrYieldParams::default());
        for nq in [0.0, 1.0, 10.0, 100.0, 1e4, 1e7] {
            for p in [er.p_electron(nq), nr.p_electron(nq)] {
                assert!(p >= P_CLIP_EPS && p <= 1.0 - P_CLIP_EPS, "p={p} at nq={nq}");
            }
        }
    }

    #[test]
    fn fluctuation_support_by_variant() {
        let er = ErYield::new(ErYieldParams::default());
        let nr = NrYield::new(NrYieldParams::default());
        assert_eq!(er.p_electron_fluctuation(0.0), Some(1e-4));
        let big = er.p_electron_fluctuation(1e6).unwrap();
        assert!((big - 0.041).abs() < 1e-9);
        assert!(nr.p_electron_fluctuation(100.0).is_none());
    }

    #[test]
    fn penning_quenching() {
        let er = ErYield::new(ErYieldParams::default());
        let nr = NrYield::new(NrYieldParams::default());
        assert_eq!(er.penning_quenching_eff(1e5), 1.0);
        assert_eq!(nr.penning_quenching_eff(0.0), 1.0);
        assert!(nr.penning_quenching_eff(1e3) < nr.penning_quenching_eff(10.0));
    }
}
