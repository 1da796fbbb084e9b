//! Run configuration, loaded from YAML and overridden from the command line.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, ensure};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    io_utils::{self, DEFAULT_CSV_DELIMITER},
    pipeline::{CsvSource, OutputLayout, discover_inputs},
    reconcile::DEFAULT_SAMPLE_LIMIT,
};

pub const DEFAULT_BATCH_SIZE: usize = 50_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarehouseConfig {
    pub input_dir: PathBuf,
    pub input_prefix: String,
    pub output_dir: PathBuf,
    pub fact_file: String,
    pub checkpoint_file: String,
    pub batch_size: usize,
    pub sample_limit: usize,
    /// Encoding label understood by `encoding_rs`; UTF-8 when absent.
    pub input_encoding: Option<String>,
    pub delimiter: Option<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data_processed"),
            input_prefix: "rhc".to_string(),
            output_dir: PathBuf::from("dimensions"),
            fact_file: "fato_casos_oncologicos.csv".to_string(),
            checkpoint_file: ".checkpoint_fact.json".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            input_encoding: None,
            delimiter: None,
        }
    }
}

impl WarehouseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: WarehouseConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    /// The file at `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be greater than zero");
        ensure!(!self.fact_file.trim().is_empty(), "fact_file cannot be empty");
        ensure!(
            !self.checkpoint_file.trim().is_empty(),
            "checkpoint_file cannot be empty"
        );
        self.encoding()?;
        self.delimiter_byte()?;
        Ok(())
    }

    pub fn encoding(&self) -> Result<&'static Encoding> {
        io_utils::resolve_encoding(self.input_encoding.as_deref())
    }

    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_deref() {
            Some(raw) => io_utils::parse_delimiter(raw).map_err(|err| anyhow!(err)),
            None => Ok(DEFAULT_CSV_DELIMITER),
        }
    }

    pub fn output_layout(&self) -> OutputLayout {
        OutputLayout::new(&self.output_dir, &self.fact_file, &self.checkpoint_file)
    }

    pub fn discover_inputs(&self) -> Result<Vec<CsvSource>> {
        discover_inputs(
            &self.input_dir,
            &self.input_prefix,
            self.delimiter_byte()?,
            self.encoding()?,
        )
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config to YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("warehouse.yml");
        fs::write(&path, "input_dir: extracts\nbatch_size: 10\ninput_encoding: latin1\n")
            .expect("write");
        let config = WarehouseConfig::load(&path).expect("load");
        assert_eq!(config.input_dir, PathBuf::from("extracts"));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.input_prefix, "rhc");
        assert_eq!(config.fact_file, "fato_casos_oncologicos.csv");
        assert_eq!(config.encoding().unwrap().name(), "windows-1252");
    }

    #[test]
    fn rejects_zero_batch_size_and_unknown_keys() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("warehouse.yml");
        fs::write(&path, "batch_size: 0\n").expect("write");
        assert!(WarehouseConfig::load(&path).is_err());
        fs::write(&path, "batch: 10\n").expect("write");
        assert!(WarehouseConfig::load(&path).is_err());
    }

    #[test]
    fn yaml_round_trips() {
        let config = WarehouseConfig::default();
        let yaml = config.to_yaml_string().expect("yaml");
        let back: WarehouseConfig = serde_yaml::from_str(&yaml).expect("parse");
        assert_eq!(back, config);
    }
}
