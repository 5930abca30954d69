//! Input/output helpers.
//!
//! - CSV ingest of events and spectra (`ingest`)
//! - CSV exports of simulations, annotations and densities (`export`)
//! - config JSON and parameter overrides (`config`)

pub mod config;
pub mod export;
pub mod ingest;

pub use config::*;
pub use export::*;
pub use ingest::*;
