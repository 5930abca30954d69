//! Emission-model building blocks.
//!
//! - `quanta`: energy -> produced quanta and the electron/photon split
//! - `detector`: efficiencies, gains and acceptances of the detector
//! - `multisite`: parametric multi-scatter NR sources with a joint S1/S2 window
//! - `source`: composition of the above with a spectrum into one parameter point

pub mod detector;
pub mod multisite;
pub mod quanta;
pub mod source;

pub use detector::*;
pub use multisite::*;
pub use quanta::*;
pub use source::*;
