//! Grids and 1-D interpolation.
//!
//! The annotation step inverts a count-dependent quenching function by
//! tabulating it on a log-spaced grid and interpolating; the default energy
//! spectra are linearly spaced.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::invalid_input(format!(
            "Invalid log-grid range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::invalid_input("Log-grid steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// Generate `steps` evenly spaced points between `start` and `stop` (inclusive).
pub fn lin_space(start: f64, stop: f64, steps: usize) -> Vec<f64> {
    match steps {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (steps as f64 - 1.0);
            (0..steps).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Midpoints of consecutive edges.
pub fn bin_centers(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

/// Piecewise-linear interpolation of `ys(xs)` at `x`.
///
/// `xs` must be non-decreasing. Returns `None` when `x` is not finite or lies
/// outside `[xs[0], xs[last]]`; callers decide how to extrapolate.
pub fn interp(x: f64, xs: &[f64], ys: &[f64]) -> Option<f64> {
    if !x.is_finite() || xs.is_empty() || xs.len() != ys.len() {
        return None;
    }
    let last = xs.len() - 1;
    if x < xs[0] || x > xs[last] {
        return None;
    }

    // First index with xs[i] >= x.
    let hi = xs.partition_point(|&v| v < x);
    if hi == 0 {
        return Some(ys[0]);
    }
    let lo = hi - 1;
    let (x0, x1) = (xs[lo], xs[hi]);
    if (x1 - x0).abs() < f64::EPSILON * x1.abs().max(1.0) {
        return Some(ys[hi]);
    }
    let u = (x - x0) / (x1 - x0);
    Some(ys[lo] + u * (ys[hi] - ys[lo]))
}

/// Like [`interp`], but clamps to the edge values outside the table.
///
/// Returns `None` only for non-finite `x` or an empty table.
pub fn interp_clamped(x: f64, xs: &[f64], ys: &[f64]) -> Option<f64> {
    if let Some(v) = interp(x, xs, ys) {
        return Some(v);
    }
    if !x.is_finite() || xs.is_empty() || xs.len() != ys.len() {
        return None;
    }
    if x < xs[0] { Some(ys[0]) } else { Some(ys[ys.len() - 1]) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 1e8, 1000).unwrap();
        assert_eq!(v.len(), 1000);
        assert!((v[0] - 0.1).abs() < 1e-12);
        assert!((v[v.len() - 1] / 1e8 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn log_space_rejects_bad_range() {
        assert!(log_space(0.0, 1.0, 10).is_err());
        assert!(log_space(2.0, 1.0, 10).is_err());
        assert!(log_space(1.0, 2.0, 1).is_err());
    }

    #[test]
    fn lin_space_matches_endpoints() {
        let v = lin_space(0.7, 150.0, 100);
        assert_eq!(v.len(), 100);
        assert!((v[0] - 0.7).abs() < 1e-12);
        assert!((v[99] - 150.0).abs() < 1e-9);
    }

    #[test]
    fn interp_inside_and_outside() {
        let xs = [0.0, 1.0, 3.0];
        let ys = [0.0, 10.0, 30.0];
        assert_eq!(interp(0.5, &xs, &ys), Some(5.0));
        assert_eq!(interp(2.0, &xs, &ys), Some(20.0));
        assert_eq!(interp(3.0, &xs, &ys), Some(30.0));
        assert_eq!(interp(-1.0, &xs, &ys), None);
        assert_eq!(interp(f64::NAN, &xs, &ys), None);
        assert_eq!(interp_clamped(-1.0, &xs, &ys), Some(0.0));
        assert_eq!(interp_clamped(9.0, &xs, &ys), Some(30.0));
    }
}
