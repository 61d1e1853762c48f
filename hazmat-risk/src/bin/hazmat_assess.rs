//! Compound Risk Assessment Binary
//!
//! Classifies one formulation against local hazard datasets and prints the
//! assessment as JSON to stdout. Logs go to stderr.
//!
//! Usage:
//!   hazmat-assess [--config <hazmat.toml>] [--parallel] <compound.json> <dataset.json>...
//!
//! Config falls back to `HAZMAT_CONFIG`, then defaults; `HAZMAT_*` variables
//! override either.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hazmat_core::{system_clock, ConfigError, HazmatConfig, HazmatResult};
use hazmat_reliability::{DatasetHazardSource, FallbackOrchestrator, HazardDataService, LookupMode};
use hazmat_risk::{init_tracing, load_formulation, LogFormat, RiskEngine};
use hazmat_storage::{open_cache, spawn_sweeper};
use tokio::sync::watch;
use tracing::{info, warn};

const USAGE: &str =
    "Usage: hazmat-assess [--config <hazmat.toml>] [--parallel] <compound.json> <dataset.json>...";

struct Args {
    config: Option<PathBuf>,
    parallel: bool,
    compound: PathBuf,
    datasets: Vec<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut config = None;
    let mut parallel = false;
    let mut positional = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next()?)),
            "--parallel" => parallel = true,
            "-h" | "--help" => return None,
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    let mut positional = positional.into_iter();
    let compound = positional.next()?;
    let datasets: Vec<PathBuf> = positional.collect();
    if datasets.is_empty() {
        return None;
    }
    Some(Args {
        config,
        parallel,
        compound,
        datasets,
    })
}

fn load_config(path: Option<&Path>) -> Result<HazmatConfig, ConfigError> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var("HAZMAT_CONFIG").ok().map(PathBuf::from));
    let config = match path {
        Some(path) => HazmatConfig::from_path(&path)?,
        None => HazmatConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn source_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

#[tokio::main]
async fn main() -> HazmatResult<()> {
    let Some(args) = parse_args() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    if let Err(e) = init_tracing(LogFormat::from_env()) {
        eprintln!("{}", e);
    }

    let config = load_config(args.config.as_deref())?;
    let formulation = load_formulation(&args.compound)?;
    let clock = system_clock();

    let cache = Arc::new(open_cache(&config.cache, clock.clone())?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(cache.clone(), shutdown_rx);

    let orchestrator = Arc::new(FallbackOrchestrator::from_config(&config, clock.clone()));
    let mode = if args.parallel {
        LookupMode::Parallel
    } else {
        LookupMode::Ranked
    };
    let mut service = HazardDataService::new(cache.clone(), orchestrator).with_mode(mode);
    for path in &args.datasets {
        let source = DatasetHazardSource::from_path(source_name(path), 1.0, path)?;
        service = service.with_source(Arc::new(source));
    }
    info!(sources = ?service.source_names(), mode = ?mode, "hazard sources loaded");

    let engine = RiskEngine::new(Arc::new(service), config.risk.clone(), clock);
    let outcome = engine.assess_compound(&formulation).await;

    let _ = shutdown_tx.send(true);
    match sweeper.await {
        Ok(metrics) => info!(sweeps = ?metrics.snapshot(), cache = ?cache.stats(), "cache closed"),
        Err(e) => warn!(error = %e, "cache sweeper did not stop cleanly"),
    }

    let assessment = outcome?;
    match serde_json::to_string_pretty(&assessment) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize assessment: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
