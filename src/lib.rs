//! `envelope-fit` library crate.
//!
//! The binary (`envfit`) is a thin wrapper around this library so that:
//!
//! - the order scan and envelope logic is testable without spawning processes
//! - other front-ends can drive `app::pipeline::run_envelope` directly
//! - model engines can be swapped through the `fit::ModelEngine` trait

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
