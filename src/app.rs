//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and loads the optional TOML config
//! - initialises logging
//! - dispatches to toy generation, single fits or envelope scans
//! - prints reports and writes optional exports

use std::path::Path;

use clap::Parser;
use log::{info, LevelFilter};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cli::{Cli, Command, FitArgs, FitCommon, ScanArgs, ToyArgs};
use crate::data::BinnedDataset;
use crate::data::toys;
use crate::domain::ScanConfig;
use crate::error::AppError;
use crate::models::{Domain, ModelFamily};

pub mod pipeline;

/// Entry point for the `envfit` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ScanConfig::default(),
    };

    match cli.command {
        Command::Toy(args) => handle_toy(args),
        Command::Fit(args) => handle_fit(args, config),
        Command::Scan(args) => handle_scan(args, config),
    }
}

/// Map `-v` (-2..=2) onto a log level unless `RUST_LOG` is set.
fn init_logging(verbose: i8) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_for(verbose));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.format_timestamp(None).init();
}

fn level_for(verbose: i8) -> LevelFilter {
    match verbose {
        i8::MIN..=-2 => LevelFilter::Off,
        -1 => LevelFilter::Error,
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Read and validate a TOML scan config.
pub fn load_config(path: &Path) -> Result<ScanConfig, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config '{}': {e}", path.display())))?;
    let config: ScanConfig = toml::from_str(&text)
        .map_err(|e| AppError::config(format!("Invalid config '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// CLI flags override the config file.
fn apply_overrides(mut config: ScanConfig, common: &FitCommon) -> ScanConfig {
    if let Some(method) = common.method {
        config.method = method;
    }
    if let Some(seed) = common.seed {
        config.seed = Some(seed);
    }
    if let Some(n) = common.restarts {
        config.n_restarts = n;
    }
    if let Some(category) = &common.category {
        config.category = category.clone();
    }
    config
}

fn load_dataset(common: &FitCommon) -> Result<BinnedDataset, AppError> {
    let data = crate::io::read_dataset_json(&common.data)?;
    info!(
        "Loaded {} bins on [{}, {}] with yield {:.1}",
        data.nbins(),
        data.lo(),
        data.hi(),
        data.total()
    );
    match common.nbins {
        Some(nbins) if nbins != data.nbins() => {
            if nbins == 0 || data.nbins() % nbins != 0 {
                return Err(AppError::config(format!(
                    "Cannot rebin {} bins into {nbins}.",
                    data.nbins()
                )));
            }
            data.rebin(data.nbins() / nbins)
        }
        _ => Ok(data),
    }
}

fn handle_toy(args: ToyArgs) -> Result<(), AppError> {
    let (lo, hi) = (args.xlim.lo, args.xlim.hi);
    let nbins = match args.nbins {
        Some(n) => n,
        None => ((hi - lo).round() as usize).max(1),
    };
    let mut model = ModelFamily::new(args.shape, args.order, Domain::new(lo, hi)?)?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    if args.randomize {
        model.randomize(&mut rng);
    }
    if !args.set.is_empty() {
        let mut params = model.params().to_vec();
        for assignment in &args.set {
            let (name, value) = parse_assignment(assignment)?;
            let p = params
                .iter_mut()
                .find(|p| p.name == name)
                .ok_or_else(|| AppError::config(format!("{} has no parameter '{name}'.", model.name())))?;
            p.value = value;
        }
        model.set_params(params)?;
    }

    let data = toys::generate(args.kind, &model, lo, hi, nbins, args.events, &mut rng)?;
    crate::io::write_dataset_json(&args.out, &data)?;
    info!(
        "Wrote {:?} toy of {} ({} bins, yield {:.1}) to {}",
        args.kind,
        model.name(),
        data.nbins(),
        data.total(),
        args.out.display()
    );
    Ok(())
}

fn parse_assignment(s: &str) -> Result<(&str, f64), AppError> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| AppError::config(format!("Expected NAME=VALUE, got '{s}'.")))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| AppError::config(format!("Invalid value in '{s}': {e}")))?;
    Ok((name.trim(), value))
}

fn handle_fit(args: FitArgs, config: ScanConfig) -> Result<(), AppError> {
    let config = apply_overrides(config, &args.common);
    let data = load_dataset(&args.common)?;
    let fit = pipeline::fit_single(&data, args.shape, args.order, &args.common.ranges, &config)?;

    println!("{}", crate::report::format_fit(&fit));

    if let Some(path) = &args.export {
        crate::io::write_fit_json(path, &crate::io::FitFile::from_fit(&fit, config.method))?;
    }
    Ok(())
}

fn handle_scan(args: ScanArgs, config: ScanConfig) -> Result<(), AppError> {
    let config = apply_overrides(config, &args.common);
    let data = load_dataset(&args.common)?;
    let run = pipeline::run_envelope(
        &data,
        &args.families,
        args.max_dof,
        &args.common.ranges,
        args.exhaustive,
        &config,
    )?;

    println!("{}", crate::report::format_run_summary(&data, &run));

    if let Some(path) = &args.export {
        let file = crate::io::EnvelopeFile::from_run(&run, &config.category)?;
        crate::io::write_envelope_json(path, &file)?;
        info!("Wrote envelope to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(-2), LevelFilter::Off);
        assert_eq!(level_for(-1), LevelFilter::Error);
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
    }

    #[test]
    fn assignments_parse() {
        assert_eq!(parse_assignment("mean=125.5").unwrap(), ("mean", 125.5));
        assert!(parse_assignment("mean").is_err());
        assert!(parse_assignment("mean=abc").is_err());
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::try_parse_from(["envfit", "fit", "d.json", "--seed", "9", "--restarts", "16"]).unwrap();
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = apply_overrides(ScanConfig::default(), &args.common);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.n_restarts, 16);
        assert_eq!(config.category, "cat0");
    }

    #[test]
    fn config_file_is_validated() {
        let path = std::env::temp_dir().join(format!("envfit-config-{}.toml", std::process::id()));
        std::fs::write(&path, "n_restarts = 1\n").unwrap();
        let err = load_config(&path).unwrap_err();
        std::fs::write(&path, "gof_threshold = 0.05\nseed = 3\n[bounds]\n\"a*\" = [-1.0, -2.0, 0.0]\n").unwrap();
        let ok = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(ok.seed, Some(3));
        assert_eq!(ok.bounds["a*"], vec![-1.0, -2.0, 0.0]);
    }
}
