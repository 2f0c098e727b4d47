//! Shared envelope pipeline used by the CLI and by library callers.
//!
//! dataset -> order scan per family (parallel) -> envelope
//!
//! The CLI only adds presentation (text report, JSON export) on top.

use log::info;
use rayon::prelude::*;

use crate::data::BinnedDataset;
use crate::domain::{FitRange, FitRecord, ScanConfig, Shape};
use crate::error::AppError;
use crate::fit::engine::{ModelEngine, SimplexEngine};
use crate::fit::envelope::Envelope;
use crate::fit::gof::evaluate;
use crate::fit::optimizer::{fit_model, FitOutcome, RobustSettings};
use crate::fit::selection::{FamilyScan, OrderScan};
use crate::models::{BoundsOverrides, Domain, ModelFamily};

/// All computed outputs of one envelope run.
#[derive(Debug, Clone)]
pub struct EnvelopeRun {
    /// Per-family record sequences, in the order the families were requested.
    pub families: Vec<FamilyScan>,
    pub envelope: Envelope,
    /// Fit ranges actually used (the full domain when none were given).
    pub ranges: Vec<FitRange>,
    /// Base seed the run was derived from.
    pub seed: u64,
}

/// Outputs of a single-model fit.
#[derive(Debug, Clone)]
pub struct SingleFit {
    pub model: ModelFamily,
    pub record: FitRecord,
    pub outcome: FitOutcome,
    pub seed: u64,
}

/// Scan every family with the default simplex engine and build the envelope.
pub fn run_envelope(
    data: &BinnedDataset,
    families: &[Shape],
    max_dof: usize,
    ranges: &[FitRange],
    exhaustive: bool,
    config: &ScanConfig,
) -> Result<EnvelopeRun, AppError> {
    run_envelope_with(&SimplexEngine::default(), data, families, max_dof, ranges, exhaustive, config)
}

/// Same as [`run_envelope`] with a caller-supplied engine.
pub fn run_envelope_with<E: ModelEngine + ?Sized>(
    engine: &E,
    data: &BinnedDataset,
    families: &[Shape],
    max_dof: usize,
    ranges: &[FitRange],
    exhaustive: bool,
    config: &ScanConfig,
) -> Result<EnvelopeRun, AppError> {
    config.validate()?;
    data.validate()?;
    validate_families(families)?;
    if max_dof == 0 {
        return Err(AppError::config("max_dof must be >= 1."));
    }
    let ranges = data.resolve_ranges(ranges);
    let domain = Domain::new(data.lo(), data.hi())?;
    let overrides = BoundsOverrides::from_table(&config.bounds)?;
    let seed = config.seed.unwrap_or_else(rand::random);

    info!(
        "Scanning {} families up to {max_dof} dof over {} (seed {seed})",
        families.len(),
        format_ranges(&ranges)
    );

    let scan = OrderScan {
        max_dof,
        exhaustive,
        ranges: &ranges,
        config,
        overrides: &overrides,
    };
    let scans = families
        .par_iter()
        .enumerate()
        .map(|(i, &shape)| scan.run(engine, shape, data, family_seed(seed, i)))
        .collect::<Result<Vec<_>, AppError>>()?;

    let envelope = Envelope::build(&scans, domain, config.gof_threshold, config.ftest_threshold)?;

    Ok(EnvelopeRun {
        families: scans,
        envelope,
        ranges,
        seed,
    })
}

/// Fit one shape at one order with the configured method.
pub fn fit_single(
    data: &BinnedDataset,
    shape: Shape,
    order: usize,
    ranges: &[FitRange],
    config: &ScanConfig,
) -> Result<SingleFit, AppError> {
    config.validate()?;
    data.validate()?;
    let engine = SimplexEngine::default();
    let ranges = data.resolve_ranges(ranges);
    let domain = Domain::new(data.lo(), data.hi())?;
    let overrides = BoundsOverrides::from_table(&config.bounds)?;
    let seed = config.seed.unwrap_or_else(rand::random);

    let mut model = ModelFamily::with_overrides(shape, order, domain, &overrides)?;
    let outcome = fit_model(
        &engine,
        &mut model,
        data,
        &ranges,
        config.method,
        &RobustSettings::from(config),
        seed,
    )?;
    let gof = evaluate(&engine, &model, data, &ranges)?;
    info!(
        "{}: 2NLL={:.3}, ndof={}, gof p-value={:.4}",
        model.name(),
        gof.statistic,
        gof.dof,
        gof.pvalue
    );

    let record = FitRecord {
        key: model.key(&config.category),
        dof: model.dof(),
        twice_nll: gof.statistic,
        gof_dof: gof.dof,
        gof_pvalue: gof.pvalue,
        ftest_pvalue: 0.0,
        restarts: outcome.restarts,
        parameters: model.params().to_vec(),
    };
    Ok(SingleFit {
        model,
        record,
        outcome,
        seed,
    })
}

/// Independent seed stream of family `index`.
pub fn family_seed(base: u64, index: usize) -> u64 {
    base.wrapping_add((index as u64) << 32)
}

fn validate_families(families: &[Shape]) -> Result<(), AppError> {
    if families.is_empty() {
        return Err(AppError::config("At least one family is required."));
    }
    for (i, shape) in families.iter().enumerate() {
        if families[..i].contains(shape) {
            return Err(AppError::config(format!("Family {shape} is listed twice.")));
        }
    }
    Ok(())
}

pub fn format_ranges(ranges: &[FitRange]) -> String {
    ranges
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::toys::asimov;
    use crate::fit::selection::StopReason;

    fn gaussian_data() -> BinnedDataset {
        let domain = Domain::new(100.0, 180.0).unwrap();
        let mut truth = ModelFamily::new(Shape::Gaussian, 1, domain).unwrap();
        truth.set_free_values(&[125.0, 2.0]);
        asimov(&truth, 100.0, 180.0, 80, 100_000.0).unwrap()
    }

    fn seeded() -> ScanConfig {
        ScanConfig {
            seed: Some(7),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn single_gaussian_is_accepted_at_order_one() {
        let run = run_envelope(&gaussian_data(), &[Shape::Gaussian], 5, &[], false, &seeded()).unwrap();
        let scan = &run.families[0];
        let dofs: Vec<usize> = scan.records.iter().map(|r| r.dof).collect();
        assert_eq!(dofs, vec![2, 5]);
        assert!(scan.records[0].gof_pvalue > 0.01);
        assert!(scan.records[1].ftest_pvalue > 0.05);

        assert_eq!(run.envelope.len(), 1);
        assert_eq!(run.envelope.active().order(), 1);
        let mean = &run.envelope.active().parameters[0];
        assert!((mean.value - 125.0).abs() < 0.05, "{mean:?}");
        assert_eq!(run.ranges, vec![FitRange::new(100.0, 180.0).unwrap()]);
    }

    #[test]
    fn fixed_seed_runs_are_reproducible() {
        let data = gaussian_data();
        let config = seeded();
        let a = fit_single(&data, Shape::Gaussian, 1, &[], &config).unwrap();
        let b = fit_single(&data, Shape::Gaussian, 1, &[], &config).unwrap();
        assert_eq!(a.model.free_values(), b.model.free_values());
        assert!(a.record.gof_pvalue > 0.02);
    }

    #[test]
    fn every_shape_and_order_refits_its_own_asimov_toy() {
        let domain = Domain::new(100.0, 180.0).unwrap();
        for shape in Shape::ALL {
            for order in 1..=shape.max_order().min(3) {
                let truth = ModelFamily::new(shape, order, domain).unwrap();
                let data = asimov(&truth, 100.0, 180.0, 80, 10_000.0).unwrap();
                let fit = fit_single(&data, shape, order, &[], &seeded()).unwrap();
                assert!(
                    fit.record.gof_pvalue > 0.02,
                    "{}: 2NLL={}, p={}",
                    fit.model.name(),
                    fit.record.twice_nll,
                    fit.record.gof_pvalue
                );
            }
        }
    }

    #[test]
    fn exhaustive_power_scan_reaches_max_dof() {
        let domain = Domain::new(100.0, 180.0).unwrap();
        let mut truth = ModelFamily::new(Shape::Power, 1, domain).unwrap();
        truth.set_free_values(&[-3.0]);
        let data = asimov(&truth, 100.0, 180.0, 80, 20_000.0).unwrap();
        let run = run_envelope(&data, &[Shape::Power], 5, &[], true, &seeded()).unwrap();
        let scan = &run.families[0];
        let dofs: Vec<usize> = scan.records.iter().map(|r| r.dof).collect();
        assert_eq!(dofs, vec![1, 3, 5]);
        assert_eq!(scan.stop, StopReason::ReachedMaxDof);
        assert_eq!(run.envelope.active().order(), 1);
    }

    #[test]
    fn undefined_model_fails_fast_with_numerical_error() {
        let mut data = BinnedDataset::uniform(0.0, 80.0, 80).unwrap();
        data.counts = vec![100.0; 80];
        assert!(matches!(
            fit_single(&data, Shape::Power, 1, &[], &seeded()),
            Err(AppError::Numerical(_))
        ));
    }

    #[test]
    fn families_must_be_unique_and_present() {
        let data = gaussian_data();
        assert!(matches!(
            run_envelope(&data, &[], 5, &[], false, &seeded()),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            run_envelope(&data, &[Shape::Power, Shape::Power], 5, &[], false, &seeded()),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn order_above_shape_maximum_is_rejected() {
        assert!(matches!(
            fit_single(&gaussian_data(), Shape::Dcb, 2, &[], &seeded()),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn family_seeds_do_not_overlap() {
        assert_eq!(family_seed(5, 0), 5);
        assert_eq!(family_seed(5, 1), 5 + (1u64 << 32));
        assert_eq!(family_seed(u64::MAX, 1), (1u64 << 32) - 1);
    }
}
