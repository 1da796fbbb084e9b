use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::{config::WarehouseConfig, io_utils::parse_delimiter, schema::Dimension};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Build a content-addressed star schema from cancer registry extracts",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the eight dimension tables from every input file
    Dimensions(DimensionsArgs),
    /// Build fact batches for pending input files and consolidate them
    Facts(FactsArgs),
    /// Check that every fact foreign key resolves in its dimension table
    Validate(ValidateArgs),
    /// Map a dimension's fingerprints to store-assigned integer ids
    Remap(RemapArgs),
}

/// Options shared by every command. Flags override the config file.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory holding the registry extracts
    #[arg(short = 'i', long = "input-dir")]
    pub input_dir: Option<PathBuf>,
    /// Directory receiving dimensions, fact batches and the checkpoint
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,
    /// File name prefix of input extracts
    #[arg(long = "input-prefix")]
    pub input_prefix: Option<String>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter_flag)]
    pub delimiter: Option<String>,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<WarehouseConfig> {
        let mut config = WarehouseConfig::load_or_default(self.config.as_deref())?;
        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(prefix) = &self.input_prefix {
            config.input_prefix = prefix.clone();
        }
        if let Some(encoding) = &self.input_encoding {
            config.input_encoding = Some(encoding.clone());
        }
        if let Some(delimiter) = &self.delimiter {
            config.delimiter = Some(delimiter.clone());
        }
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct DimensionsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct FactsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Maximum rows assembled per batch
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Unresolved fingerprints listed per failing dimension
    #[arg(long = "sample-limit")]
    pub sample_limit: Option<usize>,
    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RemapArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Dimension to map (e.g. `patient`, `dim_paciente`, `paciente`)
    #[arg(short, long, value_parser = parse_dimension)]
    pub dimension: Dimension,
    /// Ids assigned by the store, in insertion order: one per line or a CSV with an `id` column
    #[arg(long)]
    pub ids: PathBuf,
}

fn parse_delimiter_flag(value: &str) -> Result<String, String> {
    parse_delimiter(value).map(|_| value.to_string())
}

fn parse_dimension(value: &str) -> Result<Dimension, String> {
    value.parse::<Dimension>().map_err(|err| err.to_string())
}
