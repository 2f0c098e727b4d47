//! Goodness-of-fit and nested-model tests.

use log::debug;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::data::BinnedDataset;
use crate::domain::FitRange;
use crate::error::AppError;
use crate::fit::engine::ModelEngine;
use crate::models::ModelFamily;

/// Result of a goodness-of-fit evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GofResult {
    /// Offset twice negative log-likelihood.
    pub statistic: f64,
    /// Bins in range minus model dof.
    pub dof: usize,
    pub pvalue: f64,
}

/// Number of bins whose centre lies strictly inside any of `ranges` (all bins when empty).
pub fn nbins_fitted(data: &BinnedDataset, ranges: &[FitRange]) -> usize {
    data.bins_in_ranges(ranges).len()
}

/// Upper-tail χ² probability `P(X > statistic)` with `dof` degrees of freedom.
pub fn chi2_sf(statistic: f64, dof: f64) -> Result<f64, AppError> {
    if !(dof.is_finite() && dof > 0.0) {
        return Err(AppError::config(format!(
            "Chi-square degrees of freedom must be > 0, got {dof}."
        )));
    }
    if statistic.is_nan() {
        return Err(AppError::numerical("Chi-square statistic is NaN."));
    }
    if statistic <= 0.0 {
        return Ok(1.0);
    }
    if statistic.is_infinite() {
        return Ok(0.0);
    }
    let dist = ChiSquared::new(dof)
        .map_err(|e| AppError::numerical(format!("Invalid chi-square distribution: {e}")))?;
    Ok(dist.sf(statistic))
}

/// Evaluate the fitted `model` against `data` over `ranges`.
pub fn evaluate<E: ModelEngine + ?Sized>(
    engine: &E,
    model: &ModelFamily,
    data: &BinnedDataset,
    ranges: &[FitRange],
) -> Result<GofResult, AppError> {
    let nbins = nbins_fitted(data, ranges);
    let model_dof = model.dof();
    if nbins <= model_dof {
        return Err(AppError::config(format!(
            "{} has {model_dof} free parameters but only {nbins} bins are fitted.",
            model.name()
        )));
    }
    let dof = nbins - model_dof;
    let statistic = engine.twice_nll(model, data, ranges);
    if !statistic.is_finite() {
        return Err(AppError::numerical(format!(
            "{} has a non-finite likelihood at its best fit.",
            model.name()
        )));
    }
    let pvalue = chi2_sf(statistic, dof as f64)?;
    debug!("{}: 2NLL={statistic:.4}, ndof={dof}, p={pvalue:.4}", model.name());
    Ok(GofResult {
        statistic,
        dof,
        pvalue,
    })
}

/// Nested-model F-test p-value between a simpler and a richer fit.
///
/// Negative improvements (numerical noise) count as no improvement.
pub fn ftest_pvalue(
    simpler_twice_nll: f64,
    richer_twice_nll: f64,
    simpler_dof: usize,
    richer_dof: usize,
) -> Result<f64, AppError> {
    if richer_dof <= simpler_dof {
        return Err(AppError::invariant(format!(
            "F-test needs a richer model: dof {richer_dof} <= {simpler_dof}."
        )));
    }
    let delta = (simpler_twice_nll - richer_twice_nll).max(0.0);
    debug!("Delta(2NLL) = {delta:.4} for {} extra parameters", richer_dof - simpler_dof);
    chi2_sf(delta, (richer_dof - simpler_dof) as f64)
}
