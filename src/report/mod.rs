//! Reporting utilities: density rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::Event;

/// One event of a density ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEvent {
    /// Position in the evaluated batch.
    pub index: usize,
    pub s1: f64,
    pub s2: f64,
    pub density: f64,
}

/// The `top_n` events with the lowest density (ties by batch position).
pub fn rank_lowest_density<'a>(
    events: impl IntoIterator<Item = &'a Event>,
    densities: &[f64],
    top_n: usize,
) -> Vec<RankedEvent> {
    let mut ranked: Vec<RankedEvent> = events
        .into_iter()
        .zip(densities)
        .enumerate()
        .map(|(index, (e, &density))| RankedEvent {
            index,
            s1: e.s1,
            s2: e.s2,
            density,
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.density
            .partial_cmp(&b.density)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    ranked.truncate(top_n);
    ranked
}
