//! Density evaluation: annotation, tensor construction and contraction.
//!
//! `annotate` fixes the latent-count domains of each event, `response` builds
//! the detection/response blocks over those domains and `rate` composes them
//! into one differential rate per event. `multisite` evaluates the mixture
//! density of multi-site sources directly on the signals.

pub mod annotate;
pub mod multisite;
pub mod rate;
pub mod response;

pub use annotate::*;
pub use multisite::*;
pub use rate::*;
pub use response::*;
