//! Durable record of input files whose fact batches are complete.
//!
//! The checkpoint is a small JSON document next to the dimension outputs:
//!
//! ```json
//! {
//!   "processed_files": ["rhc2019.csv"],
//!   "last_update": "2024-05-01T12:00:00Z",
//!   "key_signature": "3f1c..."
//! }
//! ```
//!
//! Every mutation is flushed before the call returns, through a temporary
//! sibling that is fsynced and renamed over the previous document.

use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{error::WarehouseError, io_utils::partial_path};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckpointState {
    #[serde(default)]
    pub processed_files: BTreeSet<String>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_signature: Option<String>,
}

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    signature: String,
    state: CheckpointState,
}

impl CheckpointStore {
    /// Loads the checkpoint at `path`, or starts empty when there is none.
    ///
    /// A checkpoint recorded under a different key signature is refused: its
    /// batches were keyed by another layout and cannot be mixed with new ones.
    /// A checkpoint without a signature is adopted as-is.
    pub fn open(path: &Path, signature: &str) -> Result<Self> {
        let state = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Reading checkpoint {path:?}"))?;
            let state: CheckpointState = serde_json::from_str(&raw)
                .with_context(|| format!("Parsing checkpoint {path:?}"))?;
            match state.key_signature.as_deref() {
                Some(recorded) if recorded != signature => {
                    return Err(WarehouseError::SignatureMismatch {
                        path: path.to_path_buf(),
                        recorded: recorded.to_string(),
                        current: signature.to_string(),
                    }
                    .into());
                }
                Some(_) => {}
                None => warn!("Checkpoint {path:?} has no key signature; assuming the current layout"),
            }
            debug!(
                "Loaded checkpoint {:?} with {} processed file(s)",
                path,
                state.processed_files.len()
            );
            state
        } else {
            CheckpointState::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            signature: signature.to_string(),
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_done(&self, file_id: &str) -> bool {
        self.state.processed_files.contains(file_id)
    }

    pub fn processed_files(&self) -> impl Iterator<Item = &str> {
        self.state.processed_files.iter().map(String::as_str)
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.state.last_update
    }

    /// Inputs from `all` not yet marked done, in the given order.
    pub fn pending<'a>(&self, all: &'a [String]) -> Vec<&'a str> {
        all.iter()
            .map(String::as_str)
            .filter(|id| !self.is_done(id))
            .collect()
    }

    /// Marks `file_id` complete and flushes before returning.
    pub fn mark_done(&mut self, file_id: &str) -> Result<()> {
        if !self.state.processed_files.insert(file_id.to_string()) {
            return Ok(());
        }
        self.state.last_update = Some(Utc::now());
        self.state.key_signature = Some(self.signature.clone());
        self.flush()
            .with_context(|| format!("Recording {file_id} as processed"))
    }

    /// Forgets all progress and removes the checkpoint file.
    pub fn clear(&mut self) -> Result<()> {
        self.state = CheckpointState::default();
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Removing checkpoint {:?}", self.path))?;
            info!("Cleared checkpoint {:?}", self.path);
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating checkpoint directory {parent:?}"))?;
        }
        let staging = partial_path(&self.path);
        let file = File::create(&staging)
            .with_context(|| format!("Creating checkpoint staging file {staging:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.state)
            .context("Serializing checkpoint")?;
        writer.write_all(b"\n")?;
        let file = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("Flushing {staging:?}: {}", err.error()))?;
        file.sync_all()
            .with_context(|| format!("Syncing {staging:?}"))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("Moving checkpoint into place at {:?}", self.path))
    }
}
