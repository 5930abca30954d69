//! A source: one parameter point of the emission model, ready to evaluate.
//!
//! Composition of three strategies selected by configuration:
//! - quanta yield (ER or NR)
//! - detector response
//! - spectrum source (static or time-dependent)
//!
//! A `Source` is immutable. Evaluating another parameter point means building
//! another `Source` from an updated [`ModelConfig`].

use std::borrow::Cow;

use tracing::debug;

use crate::domain::{
    EnergySpectrum, Event, ModelConfig, ModelKind, SimulationGeometry, SpectrumSource,
};
use crate::error::AppError;
use crate::models::detector::DetectorResponse;
use crate::models::quanta::{QuantaYield, build_yield};

pub struct Source {
    yield_model: Box<dyn QuantaYield>,
    detector: Box<dyn DetectorResponse>,
    spectrum: SpectrumSource,
    max_sigma: f64,
    geometry: SimulationGeometry,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("model", &self.yield_model.kind())
            .field("spectrum", &self.spectrum)
            .field("max_sigma", &self.max_sigma)
            .finish_non_exhaustive()
    }
}

impl Source {
    /// Validate `config` and build the source it describes.
    pub fn from_config(config: &ModelConfig) -> Result<Self, AppError> {
        config.validate()?;
        let spectrum = config
            .spectrum
            .clone()
            .unwrap_or_else(|| SpectrumSource::Static(EnergySpectrum::default_for(config.model)));
        debug!(
            model = config.model.display_name(),
            max_sigma = config.max_sigma,
            "building source"
        );
        Ok(Self {
            yield_model: build_yield(config),
            detector: Box::new(config.detector.clone()),
            spectrum,
            max_sigma: config.max_sigma,
            geometry: config.geometry.clone(),
        })
    }

    /// Assemble a source from explicit strategies.
    pub fn from_parts(
        yield_model: Box<dyn QuantaYield>,
        detector: Box<dyn DetectorResponse>,
        spectrum: SpectrumSource,
        max_sigma: f64,
    ) -> Result<Self, AppError> {
        spectrum.validate()?;
        if !(max_sigma.is_finite() && max_sigma > 0.0) {
            return Err(AppError::config(format!(
                "max_sigma must be finite and > 0, got {max_sigma}."
            )));
        }
        Ok(Self {
            yield_model,
            detector,
            spectrum,
            max_sigma,
            geometry: SimulationGeometry::default(),
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.yield_model.kind()
    }

    pub fn yield_model(&self) -> &dyn QuantaYield {
        self.yield_model.as_ref()
    }

    pub fn detector(&self) -> &dyn DetectorResponse {
        self.detector.as_ref()
    }

    pub fn spectrum(&self) -> &SpectrumSource {
        &self.spectrum
    }

    pub fn max_sigma(&self) -> f64 {
        self.max_sigma
    }

    pub fn geometry(&self) -> &SimulationGeometry {
        &self.geometry
    }

    /// Energy spectrum seen by `event`.
    pub fn spectrum_for(&self, event: &Event) -> Cow<'_, EnergySpectrum> {
        self.spectrum.spectrum_at(event.event_time)
    }

    /// Expected number of events before any detection efficiency.
    pub fn mu_before_efficiencies(&self) -> f64 {
        self.spectrum.mu_before_efficiencies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spectrum_follows_model() {
        let source = Source::from_config(&ModelConfig::for_model(ModelKind::Nr)).unwrap();
        assert_eq!(source.kind(), ModelKind::Nr);
        assert_eq!(source.mu_before_efficiencies(), 100.0);
        assert_eq!(source.spectrum_for(&Event::default()).len(), 100);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ModelConfig::default();
        config.max_sigma = -1.0;
        assert!(Source::from_config(&config).is_err());
    }
}
