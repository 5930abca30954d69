//! Mathematical utilities: grids, interpolation and probability functions.

pub mod grid;
pub mod prob;

pub use grid::*;
pub use prob::*;
