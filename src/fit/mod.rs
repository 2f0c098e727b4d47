//! Fitting and model selection.
//!
//! Responsibilities:
//!
//! - binned likelihood offset by bin (`likelihood`)
//! - the local minimization contract and its simplex implementation (`engine`)
//! - robust multi-start fits with restart escalation (`optimizer`)
//! - goodness-of-fit and F-test p-values (`gof`)
//! - per-family order scans (`selection`)
//! - the discrete multi-family envelope (`envelope`)

pub mod engine;
pub mod envelope;
pub mod gof;
pub mod likelihood;
pub mod optimizer;
pub mod selection;

pub use engine::*;
pub use envelope::*;
pub use gof::*;
pub use optimizer::*;
pub use selection::*;
