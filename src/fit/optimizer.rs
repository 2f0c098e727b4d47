//! Robust multi-start optimization.
//!
//! A robust fit runs `n` local minimizations, each from an independent uniform
//! draw of the free parameters. Restart `i` always uses an RNG seeded with
//! `base_seed + i`, so results do not depend on thread scheduling and escalating
//! from `n` to `2n` restarts only has to run the new half.
//!
//! Stability check: the minimum NLL over the first half of the restarts must
//! agree with the minimum over the second half within `nll_tolerance`. An
//! unstable fit doubles the restart count; still unstable at `max_restarts` is a
//! hard error. A batch in which no restart reached a finite NLL fails at once.

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::data::BinnedDataset;
use crate::domain::{FitMethod, FitRange, ScanConfig};
use crate::error::AppError;
use crate::fit::engine::{Minimum, ModelEngine};
use crate::math::{errors_from_hessian, hessian};
use crate::models::ModelFamily;

/// Restart settings of the robust fit.
#[derive(Debug, Clone, Copy)]
pub struct RobustSettings {
    pub n_restarts: usize,
    pub max_restarts: usize,
    pub nll_tolerance: f64,
}

impl Default for RobustSettings {
    fn default() -> Self {
        Self {
            n_restarts: 8,
            max_restarts: 1024,
            nll_tolerance: 0.01,
        }
    }
}

impl From<&ScanConfig> for RobustSettings {
    fn from(config: &ScanConfig) -> Self {
        Self {
            n_restarts: config.n_restarts,
            max_restarts: config.max_restarts,
            nll_tolerance: config.nll_tolerance,
        }
    }
}

/// Outcome of fitting one model.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub best: Minimum,
    /// Index of the winning restart (0 for single fits).
    pub best_restart: usize,
    /// Local minimizations performed.
    pub restarts: usize,
    /// Free parameters that ended within 1% of a bound.
    pub pinned: Vec<String>,
}

/// Fit `model` with the selected method and leave it at the best values found.
pub fn fit_model<E: ModelEngine + ?Sized>(
    engine: &E,
    model: &mut ModelFamily,
    data: &BinnedDataset,
    ranges: &[FitRange],
    method: FitMethod,
    settings: &RobustSettings,
    base_seed: u64,
) -> Result<FitOutcome, AppError> {
    let outcome = match method {
        FitMethod::Robust => robust_fit(engine, model, data, ranges, settings, base_seed)?,
        FitMethod::FromDefaults => single_fit(engine, model, data, ranges, None)?,
        FitMethod::Randomize => single_fit(engine, model, data, ranges, Some(base_seed))?,
    };
    attach_uncertainties(engine, model, data, ranges);
    Ok(outcome)
}

/// One local minimization, from the defaults or from a single seeded draw.
fn single_fit<E: ModelEngine + ?Sized>(
    engine: &E,
    model: &mut ModelFamily,
    data: &BinnedDataset,
    ranges: &[FitRange],
    seed: Option<u64>,
) -> Result<FitOutcome, AppError> {
    if let Some(seed) = seed {
        model.randomize(&mut StdRng::seed_from_u64(seed));
    }
    let best = engine.minimize(model, data, ranges)?;
    if !best.nll.is_finite() {
        return Err(AppError::numerical(format!(
            "Fit of {} did not reach a finite likelihood.",
            model.name()
        )));
    }
    if !best.converged {
        warn!("Fit of {} stopped before converging", model.name());
    }
    model.set_free_values(&best.values);
    let pinned = model.check_bounds();
    Ok(FitOutcome {
        best,
        best_restart: 0,
        restarts: 1,
        pinned,
    })
}

/// Multi-start fit with split-half stability check and restart escalation.
pub fn robust_fit<E: ModelEngine + ?Sized>(
    engine: &E,
    model: &mut ModelFamily,
    data: &BinnedDataset,
    ranges: &[FitRange],
    settings: &RobustSettings,
    base_seed: u64,
) -> Result<FitOutcome, AppError> {
    if settings.n_restarts < 2 || settings.max_restarts < settings.n_restarts {
        return Err(AppError::config(format!(
            "Invalid restart settings: n_restarts={}, max_restarts={}.",
            settings.n_restarts, settings.max_restarts
        )));
    }

    let template = model.clone();
    let mut minima: Vec<Minimum> = Vec::with_capacity(settings.n_restarts);
    let mut n = settings.n_restarts;

    loop {
        info!("Fitting {} with {} random initialisations", template.name(), n);
        let fresh: Vec<Minimum> = (minima.len()..n)
            .into_par_iter()
            .map(|i| run_restart(engine, &template, data, ranges, restart_seed(base_seed, i)))
            .collect::<Result<Vec<_>, AppError>>()?;
        minima.extend(fresh);
        if minima.iter().all(|m| !m.nll.is_finite()) {
            return Err(AppError::numerical(format!(
                "No restart of {} reached a finite likelihood; the model is undefined on the data range.",
                template.name()
            )));
        }

        let diff = split_half_difference(&minima);
        debug!("{}: split-half NLL difference {diff:.6}", template.name());
        if diff <= settings.nll_tolerance {
            break;
        }
        if n >= settings.max_restarts {
            return Err(AppError::NonConvergence {
                model: template.name(),
                restarts: n,
            });
        }
        let next = (2 * n).min(settings.max_restarts);
        warn!(
            "Fit of {} looks unstable (difference in minimum NLL between halves is {diff:.4}); retrying with {next} initialisations",
            template.name()
        );
        n = next;
    }

    let (best_restart, best) = best_minimum(&minima);
    let best = best.clone();
    model.set_free_values(&best.values);
    let pinned = model.check_bounds();

    Ok(FitOutcome {
        best,
        best_restart,
        restarts: minima.len(),
        pinned,
    })
}

/// Seed of restart `index`.
pub fn restart_seed(base_seed: u64, index: usize) -> u64 {
    base_seed.wrapping_add(index as u64)
}

fn run_restart<E: ModelEngine + ?Sized>(
    engine: &E,
    template: &ModelFamily,
    data: &BinnedDataset,
    ranges: &[FitRange],
    seed: u64,
) -> Result<Minimum, AppError> {
    let mut model = template.clone();
    model.randomize(&mut StdRng::seed_from_u64(seed));
    engine.minimize(&mut model, data, ranges)
}

/// `|min(first half) - min(second half)|`; non-finite when either half failed.
fn split_half_difference(minima: &[Minimum]) -> f64 {
    let half = minima.len() / 2;
    let min_of = |s: &[Minimum]| s.iter().map(|m| m.nll).fold(f64::INFINITY, f64::min);
    let diff = (min_of(&minima[..half]) - min_of(&minima[half..])).abs();
    if diff.is_nan() { f64::INFINITY } else { diff }
}

/// Lowest NLL; ties go to the earliest restart.
fn best_minimum(minima: &[Minimum]) -> (usize, &Minimum) {
    let mut best = (0, &minima[0]);
    for (i, m) in minima.iter().enumerate().skip(1) {
        if m.nll < best.1.nll {
            best = (i, m);
        }
    }
    best
}

/// Symmetric uncertainties from the NLL Hessian at the current parameters.
///
/// Failure to invert is logged and leaves the errors unset.
pub fn attach_uncertainties<E: ModelEngine + ?Sized>(
    engine: &E,
    model: &mut ModelFamily,
    data: &BinnedDataset,
    ranges: &[FitRange],
) {
    let x = model.free_values();
    if x.is_empty() {
        return;
    }
    let steps: Vec<f64> = model
        .free_bounds()
        .iter()
        .map(|(lo, hi)| ((hi - lo) * 1e-4).max(1e-8))
        .collect();
    let scratch = model.clone();
    let nll = |p: &[f64]| {
        let mut m = scratch.clone();
        m.set_free_values(p);
        0.5 * engine.twice_nll(&m, data, ranges)
    };
    match errors_from_hessian(&hessian(nll, &x, &steps)) {
        Some(errors) => model.set_free_errors(&errors),
        None => warn!("Could not estimate parameter uncertainties for {}", model.name()),
    }
}
