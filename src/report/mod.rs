//! Reporting utilities: formatted terminal output for scans, envelopes and fits.

pub mod format;

pub use format::*;
