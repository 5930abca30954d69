//! Synthetic data: forward simulation of the emission model.

pub mod multisite;
pub mod simulate;

pub use multisite::*;
pub use simulate::*;
