//! Binned Poisson likelihood, offset by bin.
//!
//! For bins `i` inside the fit ranges with observed counts `n_i`, the expected
//! counts are
//!
//! `ν_i = N · p_i / Σ_j p_j`
//!
//! where `p_i` is the model integral over bin `i` and `N` the observed yield in
//! range (the shape is normalized over the fit range, not the whole domain).
//! The statistic is the saturated-model deviance
//!
//! `2 Σ [ν_i - n_i + n_i ln(n_i / ν_i)]`
//!
//! which is zero for a perfect fit and asymptotically χ² distributed.

use crate::data::BinnedDataset;
use crate::domain::FitRange;
use crate::math::bin_integrals;
use crate::models::ModelFamily;

/// Expected counts in the bins selected by `ranges` (same order as
/// `BinnedDataset::bins_in_ranges`). `None` when the model has no positive mass
/// in range.
pub fn expected_counts(model: &ModelFamily, data: &BinnedDataset, ranges: &[FitRange]) -> Option<Vec<f64>> {
    let bins = data.bins_in_ranges(ranges);
    let density = model.density();
    let integrals = bin_integrals(|x| density.value(x), &data.edges);

    let mass: f64 = bins.iter().map(|&i| integrals[i]).sum();
    if !(mass.is_finite() && mass > 0.0) {
        return None;
    }
    let yield_in_range: f64 = bins.iter().map(|&i| data.counts[i]).sum();
    Some(
        bins.iter()
            .map(|&i| yield_in_range * integrals[i].max(0.0) / mass)
            .collect(),
    )
}

/// Offset twice negative log-likelihood; `+∞` where the model is undefined.
pub fn twice_nll(model: &ModelFamily, data: &BinnedDataset, ranges: &[FitRange]) -> f64 {
    let Some(expected) = expected_counts(model, data, ranges) else {
        return f64::INFINITY;
    };
    let observed = data.bins_in_ranges(ranges).into_iter().map(|i| data.counts[i]);
    let mut acc = 0.0;
    for (n, nu) in observed.zip(expected) {
        acc += bin_deviance(n, nu);
    }
    if acc.is_finite() { 2.0 * acc } else { f64::INFINITY }
}

/// `ν - n + n ln(n/ν)`, with the `n = 0` term reducing to `ν`.
fn bin_deviance(n: f64, nu: f64) -> f64 {
    if n <= 0.0 {
        nu
    } else if nu <= 0.0 {
        f64::INFINITY
    } else {
        nu - n + n * (n / nu).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Shape;
    use crate::models::Domain;

    fn asimov_power(a: f64) -> (ModelFamily, BinnedDataset) {
        let domain = Domain::new(100.0, 180.0).unwrap();
        let mut model = ModelFamily::new(Shape::Power, 1, domain).unwrap();
        model.set_free_values(&[a]);
        let mut data = BinnedDataset::uniform(100.0, 180.0, 80).unwrap();
        let density = model.density();
        let integrals = bin_integrals(|x| density.value(x), &data.edges);
        let total: f64 = integrals.iter().sum();
        data.counts = integrals.iter().map(|p| 10_000.0 * p / total).collect();
        (model, data)
    }

    #[test]
    fn deviance_terms() {
        assert_eq!(bin_deviance(0.0, 2.5), 2.5);
        assert!(bin_deviance(3.0, 3.0).abs() < 1e-15);
        assert!(bin_deviance(3.0, 0.0).is_infinite());
        assert!(bin_deviance(4.0, 2.0) > 0.0);
    }

    #[test]
    fn perfect_model_has_zero_statistic() {
        let (model, data) = asimov_power(-2.0);
        assert!(twice_nll(&model, &data, &[]).abs() < 1e-9);
    }

    #[test]
    fn wrong_parameters_cost_likelihood() {
        let (mut model, data) = asimov_power(-2.0);
        model.set_free_values(&[-3.0]);
        assert!(twice_nll(&model, &data, &[]) > 10.0);
    }

    #[test]
    fn expected_counts_match_observed_yield_in_range() {
        let (model, data) = asimov_power(-2.0);
        let ranges = [
            FitRange::new(100.0, 115.0).unwrap(),
            FitRange::new(135.0, 180.0).unwrap(),
        ];
        let expected = expected_counts(&model, &data, &ranges).unwrap();
        assert_eq!(expected.len(), data.bins_in_ranges(&ranges).len());
        let sum: f64 = expected.iter().sum();
        assert!((sum - data.sum_in_ranges(&ranges)).abs() < 1e-6);
        assert!(twice_nll(&model, &data, &ranges).abs() < 1e-9);
    }
}
