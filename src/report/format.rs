//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays free of presentation concerns
//! - output changes are localized

use crate::app::pipeline::{format_ranges, EnvelopeRun, SingleFit};
use crate::data::BinnedDataset;
use crate::domain::{FitRecord, Parameter};
use crate::fit::selection::StopReason;

/// Format the full scan summary: dataset, per-family tables and the envelope.
pub fn format_run_summary(data: &BinnedDataset, run: &EnvelopeRun) -> String {
    let mut out = String::new();

    out.push_str("=== envfit - background envelope scan ===\n");
    out.push_str(&format!(
        "Dataset: {} bins on [{}, {}] | yield={:.1}\n",
        data.nbins(),
        data.lo(),
        data.hi(),
        data.total()
    ));
    out.push_str(&format!("Fit ranges: {}\n", format_ranges(&run.ranges)));
    out.push_str(&format!("Seed: {}\n", run.seed));

    for scan in &run.families {
        out.push_str(&format!("\n{} ({}):\n", scan.shape.display_name(), format_stop(scan.stop)));
        out.push_str(&format_record_table(&scan.records));
    }

    let envelope = &run.envelope;
    out.push_str(&format!("\nEnvelope ({} models):\n", envelope.len()));
    for (i, record) in envelope.entries().iter().enumerate() {
        let chosen = if i == envelope.active_index() { "*" } else { " " };
        out.push_str(&format!(
            "{chosen} [{i}] {:<16} dof={:<2} gof p={:.4}\n",
            record.key.to_string(),
            record.dof,
            record.gof_pvalue
        ));
    }

    out.push_str("\nDefault model:\n");
    out.push_str(&format_parameters(&envelope.active().parameters));
    out
}

/// Format a single-model fit.
pub fn format_fit(fit: &SingleFit) -> String {
    let mut out = String::new();
    let r = &fit.record;
    out.push_str(&format!("=== envfit - {} ===\n", r.key));
    out.push_str(&format!(
        "2NLL={:.4} ndof={} gof p={:.4} | restarts={} (best #{}) seed={}\n",
        r.twice_nll, r.gof_dof, r.gof_pvalue, r.restarts, fit.outcome.best_restart, fit.seed
    ));
    out.push_str(&format_parameters(&r.parameters));
    if !fit.outcome.pinned.is_empty() {
        out.push_str(&format!("At bounds: {}\n", fit.outcome.pinned.join(", ")));
    }
    out
}

fn format_record_table(records: &[FitRecord]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>5} {:>4} {:>12} {:>5} {:>10} {:>10} {:>8}\n",
            "order", "dof", "2NLL", "ndof", "gof p", "ftest p", "restarts"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<5} {:-<4} {:-<12} {:-<5} {:-<10} {:-<10} {:-<8}\n",
            "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');
    if records.is_empty() {
        out.push_str("(no orders within max dof)\n");
    }
    for r in records {
        out.push_str(&format!(
            "{:>5} {:>4} {:>12.3} {:>5} {:>10.4} {:>10.4} {:>8}\n",
            r.order(),
            r.dof,
            r.twice_nll,
            r.gof_dof,
            r.gof_pvalue,
            r.ftest_pvalue,
            r.restarts
        ));
    }
    out
}

fn format_parameters(params: &[Parameter]) -> String {
    let mut out = String::new();
    for p in params {
        let error = match (p.constant, p.error) {
            (true, _) => "(fixed)".to_string(),
            (false, Some(e)) => format!("+/- {e:.6}"),
            (false, None) => String::new(),
        };
        out.push_str(
            format!(
                "- {:<8} = {:>12.6} {:<16} [{}, {}]\n",
                truncate(&p.name, 8),
                p.value,
                error,
                p.lo,
                p.hi
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn format_stop(stop: StopReason) -> String {
    match stop {
        StopReason::ReachedMaxDof => "reached max dof".to_string(),
        StopReason::ExceededMaxDof { order, dof } => format!("order {order} would have {dof} dof"),
        StopReason::Converged => "no significant improvement".to_string(),
        StopReason::ReachedMaxOrder => "highest order fitted".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
