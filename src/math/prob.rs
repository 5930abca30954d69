//! Probability mass/density functions used by the emission model.
//!
//! All functions work on plain `f64` and never return NaN: cells that fall in
//! a degenerate corner of parameter space evaluate to a probability of zero.

use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use statrs::function::gamma::ln_gamma;

/// Clip margin for probabilities that feed binomial/beta-binomial draws.
pub const P_CLIP_EPS: f64 = 1e-6;

/// Floor added to Gaussian widths before evaluating a density.
pub const STD_FLOOR: f64 = 1e-10;

fn ln_choose(n: u64, k: u64) -> f64 {
    let n1 = (n as f64) + 1.0;
    let k1 = (k as f64) + 1.0;
    let nk1 = ((n - k) as f64) + 1.0;
    ln_gamma(n1) - ln_gamma(k1) - ln_gamma(nk1)
}

/// Replace NaN by 0 and clip into `[eps, 1 - eps]`.
pub fn sanitize_probability(p: f64, eps: f64) -> f64 {
    let p = if p.is_nan() { 0.0 } else { p };
    p.clamp(eps, 1.0 - eps)
}

/// Clip a beta-binomial dispersion into `[eps, 1]` (NaN maps to `eps`).
pub fn sanitize_dispersion(sigma: f64, eps: f64) -> f64 {
    if sigma.is_nan() {
        return eps;
    }
    sigma.clamp(eps, 1.0)
}

/// `P(k | n, p)` for a binomial distribution. Zero when `k > n`.
pub fn binomial_pmf(k: u64, n: u64, p: f64) -> f64 {
    if k > n {
        return 0.0;
    }
    if p <= 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    if p >= 1.0 {
        return if k == n { 1.0 } else { 0.0 };
    }
    let kf = k as f64;
    let nf = n as f64;
    let ln_p = ln_choose(n, k) + kf * p.ln() + (nf - kf) * (-p).ln_1p();
    let v = ln_p.exp();
    if v.is_finite() { v } else { 0.0 }
}

/// Beta distribution `(alpha, beta)` with the given mean and standard deviation.
///
/// Parameters are non-positive when `std^2 >= mean (1 - mean)`; callers must
/// treat that as "no valid distribution".
pub fn beta_params(mean: f64, std: f64) -> (f64, f64) {
    let nu = mean * (1.0 - mean) / (std * std) - 1.0;
    (mean * nu, (1.0 - mean) * nu)
}

/// `P(k | n)` for a beta-binomial whose success probability has mean
/// `p_mean` and standard deviation `p_std`.
pub fn beta_binomial_pmf(k: u64, n: u64, p_mean: f64, p_std: f64) -> f64 {
    if k > n {
        return 0.0;
    }
    let (a, b) = beta_params(p_mean, p_std);
    if !(a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0) {
        return 0.0;
    }
    let kf = k as f64;
    let nf = n as f64;
    let ln_p = ln_gamma(nf + 1.0) + ln_gamma(kf + a) + ln_gamma(nf - kf + b) + ln_gamma(a + b)
        - ln_gamma(kf + 1.0)
        - ln_gamma(nf - kf + 1.0)
        - ln_gamma(a)
        - ln_gamma(b)
        - ln_gamma(nf + a + b);
    let v = ln_p.exp();
    if v.is_finite() { v } else { 0.0 }
}

/// `P(k | mu)` for a Poisson distribution.
pub fn poisson_pmf(k: u64, mu: f64) -> f64 {
    if !(mu.is_finite() && mu >= 0.0) {
        return 0.0;
    }
    if mu == 0.0 {
        return if k == 0 { 1.0 } else { 0.0 };
    }
    let kf = k as f64;
    let v = (kf * mu.ln() - mu - ln_gamma(kf + 1.0)).exp();
    if v.is_finite() { v } else { 0.0 }
}

/// Gaussian density at `x`. Zero when the width is not strictly positive.
pub fn normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    match Normal::new(mean, std) {
        Ok(dist) => {
            let v = dist.pdf(x);
            if v.is_finite() { v } else { 0.0 }
        }
        Err(_) => 0.0,
    }
}

/// Standard-normal offset reached by `ppf(cdf(sigma))`.
///
/// Mathematically this is `sigma`; evaluating the round trip keeps the bound
/// rule literally expressed as a quantile of the configured confidence level.
pub fn normal_quantile_offset(sigma: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(std_normal) => {
            let level = std_normal.cdf(sigma);
            let z = std_normal.inverse_cdf(level);
            if z.is_finite() { z } else { sigma }
        }
        Err(_) => sigma,
    }
}

/// Two-sided coverage `2 Phi(sigma) - 1` of a `±sigma` interval.
pub fn two_sided_coverage(sigma: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(std_normal) => 2.0 * std_normal.cdf(sigma) - 1.0,
        Err(_) => 0.0,
    }
}

/// Bivariate Gaussian density at offsets `(d1, d2)` from the mean, for
/// variances `v1`, `v2` and covariance `cov`. Zero for a singular covariance.
pub fn bivariate_normal_pdf(d1: f64, d2: f64, v1: f64, v2: f64, cov: f64) -> f64 {
    let det = v1 * v2 - cov * cov;
    if !(det.is_finite() && det > 0.0 && v1 > 0.0 && v2 > 0.0) {
        return 0.0;
    }
    let q = (v2 * d1 * d1 - 2.0 * cov * d1 * d2 + v1 * d2 * d2) / det;
    let v = (-0.5 * q).exp() / (std::f64::consts::TAU * det.sqrt());
    if v.is_finite() { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use statrs::distribution::{Binomial, Discrete, Poisson};

    #[test]
    fn binomial_matches_statrs() {
        let reference = Binomial::new(0.3, 40).unwrap();
        for k in 0..=40u64 {
            assert_relative_eq!(binomial_pmf(k, 40, 0.3), reference.pmf(k), max_relative = 1e-9);
        }
        assert_eq!(binomial_pmf(41, 40, 0.3), 0.0);
    }

    #[test]
    fn binomial_edges() {
        assert_eq!(binomial_pmf(0, 5, 0.0), 1.0);
        assert_eq!(binomial_pmf(1, 5, 0.0), 0.0);
        assert_eq!(binomial_pmf(5, 5, 1.0), 1.0);
        assert_eq!(binomial_pmf(4, 5, 1.0), 0.0);
    }

    #[test]
    fn poisson_matches_statrs() {
        let reference = Poisson::new(12.5).unwrap();
        for k in 0..60u64 {
            assert_relative_eq!(poisson_pmf(k, 12.5), reference.pmf(k), max_relative = 1e-9, epsilon = 1e-300);
        }
        assert_eq!(poisson_pmf(0, 0.0), 1.0);
        assert_eq!(poisson_pmf(3, 0.0), 0.0);
    }

    #[test]
    fn beta_binomial_normalizes() {
        let total: f64 = (0..=50u64).map(|k| beta_binomial_pmf(k, 50, 0.4, 0.05)).sum();
        assert_relative_eq!(total, 1.0, max_relative = 1e-9);
    }

    #[test]
    fn beta_binomial_mean_matches_binomial_mean() {
        let mean: f64 = (0..=80u64)
            .map(|k| k as f64 * beta_binomial_pmf(k, 80, 0.25, 0.03))
            .sum();
        assert_relative_eq!(mean, 80.0 * 0.25, max_relative = 1e-8);
    }

    #[test]
    fn beta_binomial_invalid_params_are_zero() {
        // std^2 > mean (1 - mean): no valid beta distribution.
        assert_eq!(beta_binomial_pmf(3, 10, 1e-6, 0.04), 0.0);
    }

    #[test]
    fn sanitize_handles_nan_and_edges() {
        assert_eq!(sanitize_probability(f64::NAN, P_CLIP_EPS), P_CLIP_EPS);
        assert_eq!(sanitize_probability(2.0, P_CLIP_EPS), 1.0 - P_CLIP_EPS);
        assert_eq!(sanitize_probability(-1.0, P_CLIP_EPS), P_CLIP_EPS);
        assert_eq!(sanitize_dispersion(5.0, P_CLIP_EPS), 1.0);
        assert_eq!(sanitize_dispersion(0.0, P_CLIP_EPS), P_CLIP_EPS);
    }

    #[test]
    fn normal_pdf_degenerate_width_is_zero() {
        assert_eq!(normal_pdf(1.0, 0.0, 0.0), 0.0);
        assert!(normal_pdf(0.0, 0.0, STD_FLOOR).is_finite());
    }

    #[test]
    fn quantile_offset_round_trips() {
        assert_relative_eq!(normal_quantile_offset(3.0), 3.0, max_relative = 1e-6);
        assert_relative_eq!(normal_quantile_offset(-2.0), -2.0, max_relative = 1e-6);
        assert_relative_eq!(two_sided_coverage(1.0), 0.682_689_492, max_relative = 1e-6);
    }

    #[test]
    fn bivariate_pdf_factorizes_without_correlation() {
        let got = bivariate_normal_pdf(0.5, -1.0, 4.0, 9.0, 0.0);
        let expected = normal_pdf(0.5, 0.0, 2.0) * normal_pdf(-1.0, 0.0, 3.0);
        assert_relative_eq!(got, expected, max_relative = 1e-12);
    }

    #[test]
    fn bivariate_pdf_integrates_to_one() {
        let (v1, v2, cov) = (1.0, 4.0, -0.8);
        let h = 0.05;
        let mut total = 0.0;
        for i in -200..=200 {
            for j in -300..=300 {
                total += bivariate_normal_pdf(i as f64 * h, j as f64 * h, v1, v2, cov) * h * h;
            }
        }
        assert_relative_eq!(total, 1.0, max_relative = 1e-3);
        // Negative covariance favours opposite-sign offsets.
        assert!(bivariate_normal_pdf(1.0, -1.0, v1, v2, cov) > bivariate_normal_pdf(1.0, 1.0, v1, v2, cov));
        assert_eq!(bivariate_normal_pdf(0.0, 0.0, 1.0, 1.0, 1.0), 0.0);
    }
}
