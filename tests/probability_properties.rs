//! Property checks on the numerical guards of the emission model.

use lxe_response::domain::{ModelConfig, ModelKind};
use lxe_response::math::{P_CLIP_EPS, binomial_pmf, sanitize_dispersion, sanitize_probability};
use lxe_response::models::build_yield;
use proptest::prelude::*;

proptest! {
    #[test]
    fn sanitized_probability_is_clipped(p in prop::num::f64::ANY) {
        let q = sanitize_probability(p, P_CLIP_EPS);
        prop_assert!(q >= P_CLIP_EPS && q <= 1.0 - P_CLIP_EPS);
    }

    #[test]
    fn sanitized_dispersion_is_clipped(s in prop::num::f64::ANY) {
        let q = sanitize_dispersion(s, P_CLIP_EPS);
        prop_assert!(q >= P_CLIP_EPS && q <= 1.0);
    }

    #[test]
    fn electron_fraction_stays_in_unit_interval(nq in 0.0f64..1e7, nr in any::<bool>()) {
        let model = if nr { ModelKind::Nr } else { ModelKind::Er };
        let yield_model = build_yield(&ModelConfig::for_model(model));
        let p = yield_model.p_electron(nq);
        prop_assert!(p > 0.0 && p < 1.0, "p_electron({nq}) = {p}");
        let penning = yield_model.penning_quenching_eff(nq);
        prop_assert!(penning > 0.0 && penning <= 1.0);
    }

    #[test]
    fn binomial_pmf_is_a_probability(n in 0u64..500, k in 0u64..500, p in 0.0f64..=1.0) {
        let v = binomial_pmf(k, n, p);
        prop_assert!(v.is_finite());
        prop_assert!((0.0..=1.0 + 1e-12).contains(&v));
        if k > n {
            prop_assert_eq!(v, 0.0);
        }
    }
}

#[test]
fn binomial_half_of_hundred() {
    approx::assert_relative_eq!(binomial_pmf(50, 100, 0.5), 0.079_589_237_387_178_7, max_relative = 1e-9);
}
