//! Order selection for one shape family.
//!
//! The scan fits order 1, 2, ... of a shape and stops on the first of:
//!
//! 1. the current model has exactly `max_dof` free parameters
//! 2. the next model would exceed `max_dof` (it is never fitted or recorded)
//! 3. not exhaustive, and the last order neither improved significantly on the
//!    previous one (F-test p-value above threshold) nor was needed (GoF p-value
//!    above threshold)
//! 4. the shape has no higher order
//!
//! Records are appended in increasing order and their dof must strictly
//! increase; anything else is a construction bug and fails the scan.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::data::BinnedDataset;
use crate::domain::{FitRecord, FitRange, ScanConfig, Shape};
use crate::error::AppError;
use crate::fit::engine::ModelEngine;
use crate::fit::gof::{evaluate, ftest_pvalue};
use crate::fit::optimizer::{fit_model, RobustSettings};
use crate::models::{BoundsOverrides, Domain, ModelFamily};

/// Scan state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    NotStarted,
    Fitting { order: usize },
    Evaluating { order: usize },
    Stopped,
}

/// Why a family scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The last record has exactly `max_dof` free parameters.
    ReachedMaxDof,
    /// The next order would have had more than `max_dof` free parameters.
    ExceededMaxDof { order: usize, dof: usize },
    /// No significant improvement and an acceptable fit.
    Converged,
    /// The shape's highest order was fitted.
    ReachedMaxOrder,
}

/// The ordered fit records of one family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyScan {
    pub shape: Shape,
    pub records: Vec<FitRecord>,
    pub stop: StopReason,
}

/// Settings shared by every family scan of a run.
#[derive(Debug, Clone, Copy)]
pub struct OrderScan<'a> {
    pub max_dof: usize,
    pub exhaustive: bool,
    pub ranges: &'a [FitRange],
    pub config: &'a ScanConfig,
    pub overrides: &'a BoundsOverrides,
}

impl OrderScan<'_> {
    /// Scan `shape` on `data`, seeding every robust fit from `base_seed`.
    pub fn run<E: ModelEngine + ?Sized>(
        &self,
        engine: &E,
        shape: Shape,
        data: &BinnedDataset,
        base_seed: u64,
    ) -> Result<FamilyScan, AppError> {
        let domain = Domain::new(data.lo(), data.hi())?;
        let settings = RobustSettings::from(self.config);
        let mut records: Vec<FitRecord> = Vec::new();
        let mut state = ScanState::NotStarted;
        let mut stop = StopReason::ReachedMaxOrder;

        loop {
            state = match state {
                ScanState::NotStarted => ScanState::Fitting { order: 1 },

                ScanState::Fitting { order } => {
                    let mut model = ModelFamily::with_overrides(shape, order, domain, self.overrides)?;
                    let dof = model.dof();
                    if dof > self.max_dof {
                        info!(
                            "{shape}: order {order} has {dof} free parameters (> max dof {}), stopping",
                            self.max_dof
                        );
                        stop = StopReason::ExceededMaxDof { order, dof };
                        ScanState::Stopped
                    } else {
                        let outcome = fit_model(
                            engine,
                            &mut model,
                            data,
                            self.ranges,
                            self.config.method,
                            &settings,
                            base_seed,
                        )?;
                        let gof = evaluate(engine, &model, data, self.ranges)?;
                        info!(
                            "{}: 2NLL={:.3}, gof p-value={:.4} ({} restarts)",
                            model.name(),
                            gof.statistic,
                            gof.pvalue,
                            outcome.restarts
                        );
                        records.push(FitRecord {
                            key: model.key(&self.config.category),
                            dof,
                            twice_nll: gof.statistic,
                            gof_dof: gof.dof,
                            gof_pvalue: gof.pvalue,
                            ftest_pvalue: 0.0,
                            restarts: outcome.restarts,
                            parameters: model.params().to_vec(),
                        });
                        ScanState::Evaluating { order }
                    }
                }

                ScanState::Evaluating { order } => {
                    check_strictly_increasing(&records)?;
                    if let [.., prev, cur] = records.as_mut_slice() {
                        cur.ftest_pvalue = ftest_pvalue(prev.twice_nll, cur.twice_nll, prev.dof, cur.dof)?;
                        info!("{shape}{order}: F-test p-value={:.4}", cur.ftest_pvalue);
                    }
                    match self.next_step(shape, order, &records) {
                        Some(reason) => {
                            stop = reason;
                            ScanState::Stopped
                        }
                        None => ScanState::Fitting { order: order + 1 },
                    }
                }

                ScanState::Stopped => break,
            };
        }

        debug!("{shape}: scan stopped ({stop:?}) after {} records", records.len());
        Ok(FamilyScan {
            shape,
            records,
            stop,
        })
    }

    /// Stopping rule after a record for `order` has been evaluated.
    fn next_step(&self, shape: Shape, order: usize, records: &[FitRecord]) -> Option<StopReason> {
        let cur = records.last()?;
        if cur.dof == self.max_dof {
            return Some(StopReason::ReachedMaxDof);
        }
        if !self.exhaustive
            && cur.ftest_pvalue > self.config.ftest_threshold
            && cur.gof_pvalue > self.config.gof_threshold
        {
            return Some(StopReason::Converged);
        }
        if order >= shape.max_order() {
            return Some(StopReason::ReachedMaxOrder);
        }
        None
    }
}

/// Fail fast if dof do not strictly increase along `records`.
pub fn check_strictly_increasing(records: &[FitRecord]) -> Result<(), AppError> {
    for w in records.windows(2) {
        if w[1].dof <= w[0].dof {
            return Err(AppError::invariant(format!(
                "{} has {} free parameters, not more than {} ({}).",
                w[1].key, w[1].dof, w[0].key, w[0].dof
            )));
        }
    }
    Ok(())
}
