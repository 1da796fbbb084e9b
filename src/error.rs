use std::path::PathBuf;

use thiserror::Error;

use crate::{fingerprint::Fingerprint, schema::Dimension};

/// Structural contract violations. Data-quality problems (nulls, unparseable
/// values) never surface here; they are carried as data.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("{source_id}: column '{column}' required by {dimension} is missing from the input layout")]
    SchemaMismatch {
        dimension: Dimension,
        column: String,
        source_id: String,
    },
    #[error("{source_id}: fact column '{column}' is missing from the input layout")]
    MissingFactColumn { column: String, source_id: String },
    #[error(
        "{dimension}: {fingerprints} fingerprint(s) in the dimension list but {ids} id(s) returned by the store"
    )]
    CardinalityMismatch {
        dimension: Dimension,
        fingerprints: usize,
        ids: usize,
    },
    #[error("{dimension}: fingerprint {fingerprint} appears more than once in the dimension list")]
    DuplicateFingerprint {
        dimension: Dimension,
        fingerprint: Fingerprint,
    },
    #[error("{dimension}: fingerprint {fingerprint} has no surrogate id")]
    UnmappedFingerprint {
        dimension: Dimension,
        fingerprint: Fingerprint,
    },
    #[error(
        "checkpoint {path:?} was written with key signature {recorded}, current signature is {current}; clear it and reprocess"
    )]
    SignatureMismatch {
        path: PathBuf,
        recorded: String,
        current: String,
    },
    #[error("processing {file} failed; it will be retried on the next run")]
    PartialFailure {
        file: String,
        #[source]
        source: anyhow::Error,
    },
}
