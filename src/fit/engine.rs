//! Model engine: the local minimization primitive the robust optimizer drives.
//!
//! The optimizer only needs "minimize the NLL starting from the model's current
//! parameters and leave the model at the minimum". [`SimplexEngine`] is the
//! default implementation; tests substitute engines with scripted surfaces.

use crate::data::BinnedDataset;
use crate::domain::FitRange;
use crate::error::AppError;
use crate::fit::likelihood;
use crate::math::{minimize, Bound, SimplexOptions};
use crate::models::ModelFamily;

/// Result of one local minimization.
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Negative log-likelihood at the minimum (half of the offset statistic).
    pub nll: f64,
    /// Free parameter values at the minimum (in `ModelFamily::free_values` order).
    pub values: Vec<f64>,
    pub converged: bool,
    pub evals: usize,
}

pub trait ModelEngine: Sync {
    /// Minimize the NLL starting from the current parameters of `model`.
    ///
    /// On success `model` holds the values reported in the returned [`Minimum`].
    fn minimize(
        &self,
        model: &mut ModelFamily,
        data: &BinnedDataset,
        ranges: &[FitRange],
    ) -> Result<Minimum, AppError>;

    /// Offset twice-NLL of `model` at its current parameters.
    fn twice_nll(&self, model: &ModelFamily, data: &BinnedDataset, ranges: &[FitRange]) -> f64 {
        likelihood::twice_nll(model, data, ranges)
    }
}

/// Bounded Nelder–Mead on the binned likelihood.
#[derive(Debug, Clone, Default)]
pub struct SimplexEngine {
    pub options: SimplexOptions,
}

impl ModelEngine for SimplexEngine {
    fn minimize(
        &self,
        model: &mut ModelFamily,
        data: &BinnedDataset,
        ranges: &[FitRange],
    ) -> Result<Minimum, AppError> {
        let x0 = model.free_values();
        if x0.is_empty() {
            let nll = 0.5 * likelihood::twice_nll(model, data, ranges);
            return Ok(Minimum {
                nll,
                values: x0,
                converged: nll.is_finite(),
                evals: 1,
            });
        }
        let bounds: Vec<Bound> = model
            .free_bounds()
            .into_iter()
            .map(|(lo, hi)| Bound { lo, hi })
            .collect();

        let mut trial = model.clone();
        let result = minimize(
            |x| {
                trial.set_free_values(x);
                0.5 * likelihood::twice_nll(&trial, data, ranges)
            },
            &x0,
            &bounds,
            &self.options,
        );

        model.set_free_values(&result.x);
        Ok(Minimum {
            nll: result.f,
            values: result.x,
            converged: result.converged,
            evals: result.evals,
        })
    }
}
