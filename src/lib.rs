pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod fingerprint;
pub mod io_utils;
pub mod normalize;
pub mod pipeline;
pub mod presentation;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod schema;
pub mod surrogate;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    fingerprint::KeyCatalog,
    reconcile::ReconciliationValidator,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("rhc_warehouse", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Dimensions(args) => handle_dimensions(&args),
        Commands::Facts(args) => handle_facts(&args),
        Commands::Validate(args) => handle_validate(&args),
        Commands::Remap(args) => handle_remap(&args),
    }
}

fn handle_dimensions(args: &cli::DimensionsArgs) -> Result<()> {
    let config = args.common.load_config()?;
    config.validate()?;
    let sources = config.discover_inputs()?;
    let catalog = KeyCatalog::standard();
    debug!("Key signature {}", catalog.signature());
    let layout = config.output_layout();
    let summaries = pipeline::run_dimension_pipeline(&catalog, &sources, &layout)
        .context("Building dimension tables")?;
    let discarded: usize = summaries.iter().map(|s| s.discarded).sum();
    info!(
        "Wrote {} dimension table(s) to {:?} ({} duplicate row(s) discarded)",
        summaries.len(),
        layout.dir(),
        discarded
    );
    Ok(())
}

fn handle_facts(args: &cli::FactsArgs) -> Result<()> {
    let mut config = args.common.load_config()?;
    if let Some(size) = args.batch_size {
        config.batch_size = size;
    }
    config.validate()?;
    let sources = config.discover_inputs()?;
    let layout = config.output_layout();
    info!(
        "Building facts for {} file(s), batch size {}",
        sources.len(),
        config.batch_size
    );
    let summary =
        pipeline::run_fact_pipeline(KeyCatalog::standard(), &sources, &layout, config.batch_size)?;
    match &summary.consolidated {
        Some(path) => info!(
            "Fact table ready at {:?} ({} file(s) processed this run)",
            path,
            summary.processed.len()
        ),
        None => warn!("Fact table not consolidated; pending files remain"),
    }
    Ok(())
}

fn handle_validate(args: &cli::ValidateArgs) -> Result<()> {
    let mut config = args.common.load_config()?;
    if let Some(limit) = args.sample_limit {
        config.sample_limit = limit;
    }
    let layout = config.output_layout();
    let validator = ReconciliationValidator::new(config.sample_limit);
    let report = validator
        .validate_artifacts(&layout)
        .with_context(|| format!("Validating artifacts in {:?}", layout.dir()))?;
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Serializing report")?;
        println!("{json}");
    } else {
        print!("{}", report::render_report(&report));
    }
    if !report.passed() {
        let failing: Vec<&str> = report
            .failures()
            .map(|c| c.dimension.table_name())
            .collect();
        bail!(
            "Referential integrity check failed for {}",
            failing.join(", ")
        );
    }
    info!("All {} dimension(s) fully covered", report.dimensions.len());
    Ok(())
}

fn handle_remap(args: &cli::RemapArgs) -> Result<()> {
    let config = args.common.load_config()?;
    let layout = config.output_layout();
    let (map, path) = surrogate::remap_from_artifacts(&layout, args.dimension, &args.ids)
        .with_context(|| format!("Remapping {}", args.dimension.table_name()))?;
    info!(
        "{} surrogate id(s) for {} written to {:?}",
        map.len(),
        args.dimension.table_name(),
        path
    );
    Ok(())
}
