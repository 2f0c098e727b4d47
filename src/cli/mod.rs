//! Command-line parsing for the `envfit` binary.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code. Flags given here override values from `--config`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::toys::ToyKind;
use crate::domain::{FitMethod, FitRange, Shape};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "envfit", version, about = "Model-order selection and background envelopes for binned spectra")]
pub struct Cli {
    /// Verbosity from -2 (silent) to 2 (debug). `RUST_LOG` takes precedence.
    #[arg(short = 'v', long, global = true, default_value_t = 1, allow_negative_numbers = true,
          value_parser = clap::value_parser!(i8).range(-2..=2))]
    pub verbose: i8,

    /// TOML file with scan settings (thresholds, restarts, seed, bounds overrides).
    #[arg(long, global = true, value_name = "TOML")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a toy dataset from a shape.
    Toy(ToyArgs),
    /// Fit one shape at one order.
    Fit(FitArgs),
    /// Scan model orders for several families and build the envelope.
    Scan(ScanArgs),
}

/// Options shared by the fitting commands.
#[derive(Debug, Args, Clone)]
pub struct FitCommon {
    /// Dataset JSON (`{"edges": [...], "counts": [...]}`).
    #[arg(value_name = "DATASET")]
    pub data: PathBuf,

    /// Fit range `lo,hi` (repeatable). Defaults to the full domain.
    #[arg(short = 'r', long = "range", value_name = "LO,HI", allow_hyphen_values = true)]
    pub ranges: Vec<FitRange>,

    /// Rebin to this many bins before fitting (must divide the bin count).
    #[arg(long)]
    pub nbins: Option<usize>,

    /// Fitting method.
    #[arg(short = 'm', long)]
    pub method: Option<FitMethod>,

    /// Base seed for random initialisations.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Initial number of random initialisations of a robust fit.
    #[arg(long)]
    pub restarts: Option<usize>,

    /// Category label used in model keys.
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub common: FitCommon,

    /// Shape to fit.
    #[arg(short = 'p', long, default_value = "Gaussian")]
    pub shape: Shape,

    /// Shape order.
    #[arg(short = 'o', long, default_value_t = 1)]
    pub order: usize,

    /// Write the fit result to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub common: FitCommon,

    /// Families to scan (comma separated).
    #[arg(short = 'p', long, value_delimiter = ',',
          default_values_t = Shape::BACKGROUND.to_vec())]
    pub families: Vec<Shape>,

    /// Maximum number of free parameters of any model.
    #[arg(short = 'd', long, default_value_t = 5)]
    pub max_dof: usize,

    /// Fit every order up to the maximum instead of stopping early.
    #[arg(long)]
    pub exhaustive: bool,

    /// Write the envelope (and every family scan) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ToyArgs {
    /// Output dataset JSON.
    #[arg(value_name = "OUT")]
    pub out: PathBuf,

    /// Generating shape.
    #[arg(short = 'p', long, default_value = "Gaussian")]
    pub shape: Shape,

    /// Shape order.
    #[arg(short = 'o', long, default_value_t = 1)]
    pub order: usize,

    /// Expected number of events.
    #[arg(short = 'n', long, default_value_t = 10_000.0)]
    pub events: f64,

    /// Observable limits `lo,hi`.
    #[arg(long, default_value = "100,180")]
    pub xlim: FitRange,

    /// Number of bins (default: one per unit of the observable).
    #[arg(long)]
    pub nbins: Option<usize>,

    /// Asimov (expected counts) or Poisson-fluctuated.
    #[arg(long, default_value = "poisson")]
    pub kind: ToyKind,

    /// Parameter value `name=value` (repeatable); others keep their defaults.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub set: Vec<String>,

    /// Draw the parameters uniformly within their bounds before generating.
    #[arg(long)]
    pub randomize: bool,

    /// Seed for parameter randomization and Poisson fluctuations.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_defaults_to_background_families() {
        let cli = Cli::try_parse_from(["envfit", "scan", "data.json"]).unwrap();
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.families, Shape::BACKGROUND.to_vec());
        assert_eq!(args.max_dof, 5);
        assert!(!args.exhaustive);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn ranges_and_families_parse() {
        let cli = Cli::try_parse_from([
            "envfit", "-v", "-1", "scan", "data.json", "-p", "power,bernstein", "-r", "100,120", "-r",
            "130,180", "--exhaustive",
        ])
        .unwrap();
        assert_eq!(cli.verbose, -1);
        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(args.families, vec![Shape::Power, Shape::Bernstein]);
        assert_eq!(args.common.ranges.len(), 2);
        assert_eq!(args.common.ranges[1].lo, 130.0);
        assert!(args.exhaustive);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!(Cli::try_parse_from(["envfit", "fit", "d.json", "-m", "newton"]).is_err());
        let cli = Cli::try_parse_from(["envfit", "fit", "d.json", "-m", "from_defaults"]).unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.common.method, Some(FitMethod::FromDefaults));
    }

    #[test]
    fn verbosity_is_bounded() {
        assert!(Cli::try_parse_from(["envfit", "-v", "3", "scan", "d.json"]).is_err());
    }
}
