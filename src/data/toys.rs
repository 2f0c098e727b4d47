//! Toy dataset generation from a model.
//!
//! Asimov toys carry the exact expected counts and are what the tests use:
//! they make fit outcomes deterministic without depending on a particular
//! random stream. Poisson toys fluctuate every bin independently.

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::data::BinnedDataset;
use crate::error::AppError;
use crate::math::bin_integrals;
use crate::models::ModelFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToyKind {
    Asimov,
    Poisson,
}

impl std::str::FromStr for ToyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asimov" => Ok(Self::Asimov),
            "poisson" => Ok(Self::Poisson),
            other => Err(AppError::config(format!(
                "Unknown toy kind '{other}' (expected asimov or poisson)."
            ))),
        }
    }
}

/// Expected counts of `model` in `nbins` uniform bins over `[lo, hi]`, scaled to `events`.
pub fn asimov(
    model: &ModelFamily,
    lo: f64,
    hi: f64,
    nbins: usize,
    events: f64,
) -> Result<BinnedDataset, AppError> {
    if !(events.is_finite() && events > 0.0) {
        return Err(AppError::config(format!("Toy yield must be > 0, got {events}.")));
    }
    let mut data = BinnedDataset::uniform(lo, hi, nbins)?;
    let density = model.density();
    let integrals = bin_integrals(|x| density.value(x), &data.edges);
    let total: f64 = integrals.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(AppError::numerical(format!(
            "{} has no positive mass on [{lo}, {hi}].",
            model.name()
        )));
    }
    data.counts = integrals
        .iter()
        .map(|p| events * p.max(0.0) / total)
        .collect();
    Ok(data)
}

/// Poisson-fluctuated toy around the Asimov expectation.
pub fn poisson<R: Rng + ?Sized>(
    model: &ModelFamily,
    lo: f64,
    hi: f64,
    nbins: usize,
    events: f64,
    rng: &mut R,
) -> Result<BinnedDataset, AppError> {
    let mut data = asimov(model, lo, hi, nbins, events)?;
    for c in data.counts.iter_mut() {
        *c = if *c > 0.0 {
            let dist = Poisson::new(*c)
                .map_err(|e| AppError::numerical(format!("Invalid Poisson mean {c}: {e}")))?;
            dist.sample(rng)
        } else {
            0.0
        };
    }
    Ok(data)
}

/// Generate a toy of the requested kind.
pub fn generate<R: Rng + ?Sized>(
    kind: ToyKind,
    model: &ModelFamily,
    lo: f64,
    hi: f64,
    nbins: usize,
    events: f64,
    rng: &mut R,
) -> Result<BinnedDataset, AppError> {
    match kind {
        ToyKind::Asimov => asimov(model, lo, hi, nbins, events),
        ToyKind::Poisson => poisson(model, lo, hi, nbins, events, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Shape;
    use crate::models::Domain;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn gaussian() -> ModelFamily {
        let mut m = ModelFamily::new(Shape::Gaussian, 1, Domain::new(100.0, 180.0).unwrap()).unwrap();
        m.set_free_values(&[125.0, 2.0]);
        m
    }

    #[test]
    fn asimov_preserves_yield_and_peaks_at_mean() {
        let data = asimov(&gaussian(), 100.0, 180.0, 80, 100_000.0).unwrap();
        assert!((data.total() - 100_000.0).abs() < 1e-6);
        let (peak, _) = data
            .counts
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |acc, (i, &c)| if c > acc.1 { (i, c) } else { acc });
        assert!((data.bin_center(peak) - 125.0).abs() <= 1.0);
    }

    #[test]
    fn poisson_toys_are_seeded() {
        let a = poisson(&gaussian(), 100.0, 180.0, 40, 5_000.0, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = poisson(&gaussian(), 100.0, 180.0, 40, 5_000.0, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
        assert!(a.counts.iter().all(|c| c.fract() == 0.0));
    }

    #[test]
    fn toy_kind_parses() {
        assert_eq!("Asimov".parse::<ToyKind>().unwrap(), ToyKind::Asimov);
        assert!("gauss".parse::<ToyKind>().is_err());
    }
}
