//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - events, latent-count bounds and annotations (`types`)
//! - typed model parameters and run configuration (`params`)
//! - energy spectra and spectrum sources (`spectrum`)

pub mod params;
pub mod spectrum;
pub mod types;

pub use params::*;
pub use spectrum::*;
pub use types::*;
