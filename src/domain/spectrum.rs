//! Energy spectra: static, or time-dependent via a (time × energy) histogram.
//!
//! Spectra are immutable inputs. They are built (or loaded) once when a
//! source is constructed and borrowed by every evaluation afterwards.

use std::borrow::Cow;

use rand::Rng;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use serde::{Deserialize, Serialize};

use crate::domain::types::ModelKind;
use crate::error::AppError;
use crate::math::{bin_centers, lin_space};

/// Ordered `(energy, rate)` pairs. Energies in keV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergySpectrum {
    pub energies: Vec<f64>,
    pub rates: Vec<f64>,
}

impl EnergySpectrum {
    pub fn new(energies: Vec<f64>, rates: Vec<f64>) -> Result<Self, AppError> {
        let s = Self { energies, rates };
        s.validate()?;
        Ok(s)
    }

    /// Flat default spectrum of each recoil type.
    pub fn default_for(model: ModelKind) -> Self {
        let energies = match model {
            ModelKind::Er => lin_space(0.0, 10.0, 1000),
            ModelKind::Nr => lin_space(0.7, 150.0, 100),
        };
        let rates = vec![1.0; energies.len()];
        Self { energies, rates }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.energies.is_empty() {
            return Err(AppError::invalid_input("Energy spectrum is empty."));
        }
        if self.energies.len() != self.rates.len() {
            return Err(AppError::invalid_input(format!(
                "Energy spectrum has {} energies but {} rates.",
                self.energies.len(),
                self.rates.len()
            )));
        }
        if self.energies.iter().any(|e| !e.is_finite() || *e < 0.0) {
            return Err(AppError::invalid_input(
                "Spectrum energies must be finite and >= 0.",
            ));
        }
        if self.rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(AppError::invalid_input(
                "Spectrum rates must be finite and >= 0.",
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.energies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energies.is_empty()
    }

    pub fn total_rate(&self) -> f64 {
        self.rates.iter().sum()
    }

    /// Draw one energy, treating `energies` as bin edges and `rates[..n-1]`
    /// as the contents of the bins between them.
    pub fn sample_energy<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, AppError> {
        if self.energies.len() < 2 {
            return Err(AppError::invalid_input(
                "Need at least two spectrum points to draw energies.",
            ));
        }
        let weights = &self.rates[..self.rates.len() - 1];
        let index = WeightedIndex::new(weights)
            .map_err(|e| AppError::invalid_input(format!("Cannot sample spectrum: {e}")))?;
        let bin = index.sample(rng);
        let (lo, hi) = (self.energies[bin], self.energies[bin + 1]);
        Ok(lo + rng.r#gen::<f64>() * (hi - lo))
    }
}

/// Differential counts per (time bin, energy bin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDependentSpectrum {
    /// Time bin edges (ns since the Unix epoch).
    pub time_edges: Vec<f64>,
    /// Energy bin edges (keV).
    pub energy_edges: Vec<f64>,
    /// `counts[t][e]`: expected events in time bin `t`, energy bin `e`.
    pub counts: Vec<Vec<f64>>,
}

impl TimeDependentSpectrum {
    pub fn validate(&self) -> Result<(), AppError> {
        let n_t = self.time_edges.len().saturating_sub(1);
        let n_e = self.energy_edges.len().saturating_sub(1);
        if n_t == 0 || n_e == 0 {
            return Err(AppError::invalid_input(
                "Time-dependent spectrum needs at least one time and one energy bin.",
            ));
        }
        if self.time_edges.windows(2).any(|w| !(w[1] > w[0]))
            || self.energy_edges.windows(2).any(|w| !(w[1] > w[0]))
        {
            return Err(AppError::invalid_input(
                "Spectrum bin edges must be strictly increasing.",
            ));
        }
        if self.counts.len() != n_t || self.counts.iter().any(|row| row.len() != n_e) {
            return Err(AppError::invalid_input(format!(
                "Spectrum histogram must be {n_t} x {n_e}."
            )));
        }
        if self.counts.iter().flatten().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(AppError::invalid_input(
                "Spectrum counts must be finite and >= 0.",
            ));
        }
        Ok(())
    }

    fn time_bin(&self, t: f64) -> usize {
        let n_t = self.time_edges.len() - 1;
        let idx = self.time_edges.partition_point(|&edge| edge <= t);
        idx.saturating_sub(1).min(n_t - 1)
    }

    /// Spectrum at the energy bin centres for the time bin containing `t`.
    ///
    /// Times outside the histogram use the nearest edge bin.
    pub fn slice(&self, t: f64) -> EnergySpectrum {
        let bin = self.time_bin(t);
        EnergySpectrum {
            energies: bin_centers(&self.energy_edges),
            rates: self.counts[bin].clone(),
        }
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().flatten().sum()
    }

    /// Draw `(event_time, energy)` from the 2-D histogram.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(f64, f64), AppError> {
        let n_e = self.energy_edges.len() - 1;
        let weights: Vec<f64> = self.counts.iter().flatten().copied().collect();
        let index = WeightedIndex::new(&weights)
            .map_err(|e| AppError::invalid_input(format!("Cannot sample spectrum: {e}")))?;
        let flat = index.sample(rng);
        let (t_bin, e_bin) = (flat / n_e, flat % n_e);
        let t0 = self.time_edges[t_bin];
        let t1 = self.time_edges[t_bin + 1];
        let e0 = self.energy_edges[e_bin];
        let e1 = self.energy_edges[e_bin + 1];
        let t = t0 + rng.r#gen::<f64>() * (t1 - t0);
        let e = e0 + rng.r#gen::<f64>() * (e1 - e0);
        Ok((t, e))
    }
}

/// Where a source gets its energy spectrum from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpectrumSource {
    Static(EnergySpectrum),
    TimeDependent(TimeDependentSpectrum),
}

impl SpectrumSource {
    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            SpectrumSource::Static(s) => s.validate(),
            SpectrumSource::TimeDependent(s) => s.validate(),
        }
    }

    /// Spectrum seen by an event at `event_time`.
    pub fn spectrum_at(&self, event_time: f64) -> Cow<'_, EnergySpectrum> {
        match self {
            SpectrumSource::Static(s) => Cow::Borrowed(s),
            SpectrumSource::TimeDependent(s) => Cow::Owned(s.slice(event_time)),
        }
    }

    /// Expected number of events before any detection efficiency.
    pub fn mu_before_efficiencies(&self) -> f64 {
        match self {
            SpectrumSource::Static(s) => s.total_rate(),
            SpectrumSource::TimeDependent(s) => s.total() / s.counts.len() as f64,
        }
    }

    /// Draw `(event_time, energy)`; static spectra have no time information.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(Option<f64>, f64), AppError> {
        match self {
            SpectrumSource::Static(s) => Ok((None, s.sample_energy(rng)?)),
            SpectrumSource::TimeDependent(s) => {
                let (t, e) = s.sample(rng)?;
                Ok((Some(t), e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_by_two() -> TimeDependentSpectrum {
        TimeDependentSpectrum {
            time_edges: vec![0.0, 10.0, 20.0],
            energy_edges: vec![1.0, 2.0, 4.0],
            counts: vec![vec![1.0, 3.0], vec![2.0, 6.0]],
        }
    }

    #[test]
    fn default_spectra_shapes() {
        let er = EnergySpectrum::default_for(ModelKind::Er);
        assert_eq!(er.len(), 1000);
        assert_eq!(er.total_rate(), 1000.0);
        let nr = EnergySpectrum::default_for(ModelKind::Nr);
        assert_eq!(nr.len(), 100);
        assert!((nr.energies[0] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_negative_rates() {
        assert!(EnergySpectrum::new(vec![1.0, 2.0], vec![1.0, -1.0]).is_err());
        assert!(EnergySpectrum::new(vec![1.0, 2.0], vec![1.0]).is_err());
    }

    #[test]
    fn time_slices_pick_the_right_bin() {
        let s = two_by_two();
        s.validate().unwrap();
        assert_eq!(s.slice(5.0).rates, vec![1.0, 3.0]);
        assert_eq!(s.slice(15.0).rates, vec![2.0, 6.0]);
        // Outside the histogram: nearest bin.
        assert_eq!(s.slice(-5.0).rates, vec![1.0, 3.0]);
        assert_eq!(s.slice(50.0).rates, vec![2.0, 6.0]);
        assert_eq!(s.slice(5.0).energies, vec![1.5, 3.0]);
    }

    #[test]
    fn mu_before_efficiencies_averages_time_bins() {
        let source = SpectrumSource::TimeDependent(two_by_two());
        assert_eq!(source.mu_before_efficiencies(), 6.0);
        let flat = SpectrumSource::Static(EnergySpectrum::default_for(ModelKind::Nr));
        assert_eq!(flat.mu_before_efficiencies(), 100.0);
    }

    #[test]
    fn samples_stay_inside_the_histogram() {
        let mut rng = StdRng::seed_from_u64(7);
        let source = SpectrumSource::TimeDependent(two_by_two());
        for _ in 0..200 {
            let (t, e) = source.sample(&mut rng).unwrap();
            let t = t.unwrap();
            assert!((0.0..20.0).contains(&t));
            assert!((1.0..4.0).contains(&e));
        }
        let flat = SpectrumSource::Static(EnergySpectrum::default_for(ModelKind::Er));
        let (t, e) = flat.sample(&mut rng).unwrap();
        assert!(t.is_none());
        assert!((0.0..=10.0).contains(&e));
    }
}
