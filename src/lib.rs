//! `lxe-response` library crate.
//!
//! Emission model of a liquid-xenon TPC: energy deposits become produced
//! quanta, detected quanta and finally the S1/S2 signals. The crate runs the
//! model both ways:
//!
//! - forward, drawing synthetic events (`data`)
//! - backward, evaluating the density of observed events (`engine`)
//!
//! The binary (`lxe`) is a thin wrapper so the core stays testable without
//! spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod report;
