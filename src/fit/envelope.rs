//! Discrete envelope over the accepted models of several families.
//!
//! Per family, records first have to fit acceptably (GoF p-value above
//! threshold). Of those, the first one is an unconditional candidate and later
//! ones must have been a significant improvement over their predecessor
//! (F-test p-value below threshold). Survivors of every family are flattened in
//! family order; the default active index is the best GoF p-value.

use log::{info, warn};
use serde::Serialize;

use crate::domain::FitRecord;
use crate::error::AppError;
use crate::fit::selection::FamilyScan;
use crate::models::{Domain, ModelFamily};

/// Keep records with `gof_pvalue > threshold`; the first survivor's F-test
/// p-value is forced to 0.
pub fn filter_by_gof(records: &[FitRecord], threshold: f64) -> Vec<FitRecord> {
    let mut kept: Vec<FitRecord> = records
        .iter()
        .filter(|r| r.gof_pvalue > threshold)
        .cloned()
        .collect();
    if let Some(first) = kept.first_mut() {
        first.ftest_pvalue = 0.0;
    }
    kept
}

/// Keep records with `ftest_pvalue < threshold`.
pub fn filter_by_ftest(records: &[FitRecord], threshold: f64) -> Vec<FitRecord> {
    records
        .iter()
        .filter(|r| r.ftest_pvalue < threshold)
        .cloned()
        .collect()
}

/// One line per family listing the p-values every order was rejected on.
fn rejection_summary(scan: &FamilyScan) -> String {
    let orders: Vec<String> = scan
        .records
        .iter()
        .map(|r| format!("order {} gof={:.4} ftest={:.4}", r.order(), r.gof_pvalue, r.ftest_pvalue))
        .collect();
    if orders.is_empty() {
        format!("{}: no orders fitted", scan.shape)
    } else {
        format!("{}: {}", scan.shape, orders.join(", "))
    }
}

/// Index of the maximum GoF p-value (first on ties).
fn best_gof_index(records: &[FitRecord]) -> usize {
    let mut best = 0;
    for (i, r) in records.iter().enumerate().skip(1) {
        if r.gof_pvalue > records[best].gof_pvalue {
            best = i;
        }
    }
    best
}

/// Validated envelope; only built through [`Envelope::build`] or
/// [`Envelope::from_entries`], so `active_index` always points at an entry.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    active_index: usize,
    entries: Vec<FitRecord>,
    domain_lo: f64,
    domain_hi: f64,
}

impl Envelope {
    /// Filter every family and combine the survivors.
    pub fn build(
        scans: &[FamilyScan],
        domain: Domain,
        gof_threshold: f64,
        ftest_threshold: f64,
    ) -> Result<Self, AppError> {
        let mut entries = Vec::new();
        for scan in scans {
            let accepted = filter_by_ftest(&filter_by_gof(&scan.records, gof_threshold), ftest_threshold);
            info!(
                "{}: {} of {} orders enter the envelope",
                scan.shape,
                accepted.len(),
                scan.records.len()
            );
            entries.extend(accepted);
        }
        if entries.is_empty() {
            let summary: Vec<String> = scans.iter().map(rejection_summary).collect();
            for line in &summary {
                warn!("{line}");
            }
            return Err(AppError::data(format!(
                "No model passed the goodness-of-fit and F-test filters; the envelope is empty. {}",
                summary.join("; ")
            )));
        }
        Self::from_entries(entries, domain)
    }

    /// Envelope over already filtered candidates.
    pub fn from_entries(entries: Vec<FitRecord>, domain: Domain) -> Result<Self, AppError> {
        if entries.is_empty() {
            return Err(AppError::data(
                "No model passed the goodness-of-fit and F-test filters; the envelope is empty.",
            ));
        }
        let active_index = best_gof_index(&entries);
        info!(
            "Envelope of {} models, default {} (gof p-value {:.4})",
            entries.len(),
            entries[active_index].key,
            entries[active_index].gof_pvalue
        );
        Ok(Self {
            active_index,
            entries,
            domain_lo: domain.lo,
            domain_hi: domain.hi,
        })
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn entries(&self) -> &[FitRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn domain(&self) -> Domain {
        Domain {
            lo: self.domain_lo,
            hi: self.domain_hi,
        }
    }

    pub fn active(&self) -> &FitRecord {
        &self.entries[self.active_index]
    }

    /// Switch the active model.
    pub fn set_active_index(&mut self, index: usize) -> Result<(), AppError> {
        if index >= self.entries.len() {
            return Err(AppError::config(format!(
                "Envelope index {index} out of range (0..{}).",
                self.entries.len()
            )));
        }
        self.active_index = index;
        Ok(())
    }

    /// Rebuild the fitted model behind `index`.
    pub fn model(&self, index: usize) -> Result<ModelFamily, AppError> {
        let record = self.entries.get(index).ok_or_else(|| {
            AppError::config(format!(
                "Envelope index {index} out of range (0..{}).",
                self.entries.len()
            ))
        })?;
        let mut model = ModelFamily::new(record.key.shape, record.key.order, self.domain())?;
        model.set_params(record.parameters.clone())?;
        Ok(model)
    }

    /// Normalized density of the model behind `index` at `x`.
    pub fn density(&self, index: usize, x: f64) -> Result<f64, AppError> {
        self.model(index)?.normalized_density(x)
    }

    /// Normalized density of the active model at `x`.
    pub fn active_density(&self, x: f64) -> Result<f64, AppError> {
        self.density(self.active_index, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelKey, Shape};
    use crate::fit::selection::StopReason;

    fn record(shape: Shape, order: usize, gof: f64, ftest: f64) -> FitRecord {
        let domain = Domain::new(100.0, 180.0).unwrap();
        let model = ModelFamily::new(shape, order, domain).unwrap();
        FitRecord {
            key: ModelKey {
                shape,
                order,
                category: "cat0".into(),
            },
            dof: model.dof(),
            twice_nll: 70.0,
            gof_dof: 70,
            gof_pvalue: gof,
            ftest_pvalue: ftest,
            restarts: 8,
            parameters: model.params().to_vec(),
        }
    }

    fn scan(shape: Shape, records: Vec<FitRecord>) -> FamilyScan {
        FamilyScan {
            shape,
            records,
            stop: StopReason::Converged,
        }
    }

    fn domain() -> Domain {
        Domain::new(100.0, 180.0).unwrap()
    }

    #[test]
    fn gof_filter_forces_first_survivor_ftest_to_zero() {
        let records = vec![
            record(Shape::Power, 1, 0.001, 0.0),
            record(Shape::Power, 2, 0.2, 0.01),
            record(Shape::Power, 3, 0.3, 0.5),
        ];
        let kept = filter_by_gof(&records, 0.01);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].order(), 2);
        assert_eq!(kept[0].ftest_pvalue, 0.0);
        assert_eq!(kept[1].ftest_pvalue, 0.5);
        let kept = filter_by_ftest(&kept, 0.05);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].order(), 2);
    }

    #[test]
    fn active_index_is_global_best_gof() {
        let scans = vec![
            scan(
                Shape::Power,
                vec![record(Shape::Power, 1, 0.2, 0.0), record(Shape::Power, 2, 0.4, 0.01)],
            ),
            scan(Shape::Exponential, vec![record(Shape::Exponential, 1, 0.6, 0.0)]),
            scan(Shape::Bernstein, vec![record(Shape::Bernstein, 1, 0.005, 0.0)]),
        ];
        let env = Envelope::build(&scans, domain(), 0.01, 0.05).unwrap();
        assert_eq!(env.len(), 3);
        assert_eq!(env.active_index(), 2);
        assert_eq!(env.active().key.shape, Shape::Exponential);
        let best = env
            .entries()
            .iter()
            .map(|r| r.gof_pvalue)
            .fold(f64::MIN, f64::max);
        assert_eq!(env.active().gof_pvalue, best);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let env = Envelope::from_entries(
            vec![record(Shape::Power, 1, 0.5, 0.0), record(Shape::Laurent, 1, 0.5, 0.0)],
            domain(),
        )
        .unwrap();
        assert_eq!(env.active_index(), 0);
    }

    #[test]
    fn empty_envelope_is_an_error() {
        let scans = vec![
            scan(Shape::Power, vec![record(Shape::Power, 1, 0.001, 0.0)]),
            scan(
                Shape::Exponential,
                vec![record(Shape::Exponential, 1, 0.002, 0.0), record(Shape::Exponential, 2, 0.003, 0.2)],
            ),
        ];
        match Envelope::build(&scans, domain(), 0.01, 0.05) {
            Err(AppError::Data(msg)) => {
                assert!(msg.contains("order 1 gof=0.0010"), "{msg}");
                assert!(msg.contains("order 2 gof=0.0030 ftest=0.2000"), "{msg}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn density_switches_by_index() {
        let mut env = Envelope::from_entries(
            vec![record(Shape::Power, 1, 0.5, 0.0), record(Shape::Exponential, 1, 0.4, 0.0)],
            domain(),
        )
        .unwrap();
        let a = env.density(0, 130.0).unwrap();
        let b = env.density(1, 130.0).unwrap();
        assert!(a > 0.0 && b > 0.0 && (a - b).abs() > 1e-6);
        env.set_active_index(1).unwrap();
        assert_eq!(env.active_density(130.0).unwrap(), b);
        assert!(env.set_active_index(2).is_err());
        assert!(env.density(5, 130.0).is_err());
    }
}
