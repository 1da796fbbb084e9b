//! Deduplicated dimension tables keyed by fingerprint.

use std::{collections::HashSet, path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::debug;

use crate::{
    data::{Value, render_cell},
    error::WarehouseError,
    fingerprint::{Fingerprint, FingerprintFunction},
    io_utils,
    presentation::present,
    record::{RawRecord, RecordLayout},
    schema::Dimension,
};

pub const HASH_KEY_COLUMN: &str = "hash_key";

/// One dimension row: the key plus its attributes in storage form.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionRecord {
    pub fingerprint: Fingerprint,
    pub attributes: Vec<Option<Value>>,
}

impl DimensionRecord {
    /// Fingerprints the raw values first, then applies the presentation
    /// transforms to those same raw values.
    pub fn derive(function: &FingerprintFunction, record: &RawRecord) -> Self {
        let fingerprint = function.fingerprint(record);
        Self {
            fingerprint,
            attributes: present_attributes(function, record),
        }
    }
}

fn present_attributes(function: &FingerprintFunction, record: &RawRecord) -> Vec<Option<Value>> {
    function
        .schema()
        .fields
        .iter()
        .map(|field| present(field.presentation, field.source.raw_value(record).as_deref()))
        .collect()
}

/// First-seen-wins set of dimension rows, kept in insertion order.
#[derive(Debug, Clone)]
pub struct DimensionTable {
    dimension: Dimension,
    records: Vec<DimensionRecord>,
    seen: HashSet<Fingerprint>,
    discarded: usize,
}

impl DimensionTable {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            records: Vec::new(),
            seen: HashSet::new(),
            discarded: 0,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Returns `false` (and drops `record`) when the fingerprint is already present.
    pub fn insert(&mut self, record: DimensionRecord) -> bool {
        if self.seen.insert(record.fingerprint) {
            self.records.push(record);
            true
        } else {
            self.discarded += 1;
            false
        }
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Appends a table built from rows that come after this table's rows in
    /// global order. Merging partial tables in any other order breaks
    /// first-seen-wins.
    pub fn absorb(&mut self, later: DimensionTable) {
        debug_assert_eq!(self.dimension, later.dimension);
        self.discarded += later.discarded;
        for record in later.records {
            self.insert(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows dropped because their fingerprint was already present.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn records(&self) -> &[DimensionRecord] {
        &self.records
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.records.iter().map(|r| r.fingerprint)
    }

    pub fn headers(&self) -> Vec<&'static str> {
        std::iter::once(HASH_KEY_COLUMN)
            .chain(self.dimension.schema().output_columns())
            .collect()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        io_utils::write_replacing(path, |writer| {
            writer
                .write_record(self.headers())
                .context("Writing dimension headers")?;
            for record in &self.records {
                let row = std::iter::once(record.fingerprint.to_string())
                    .chain(record.attributes.iter().map(|v| render_cell(v.as_ref())));
                writer
                    .write_record(row)
                    .with_context(|| format!("Writing {} row {}", self.dimension, record.fingerprint))?;
            }
            Ok(())
        })
        .with_context(|| format!("Writing {} to {:?}", self.dimension.table_name(), path))
    }
}

/// Streams raw rows into one dimension table.
#[derive(Debug)]
pub struct DimensionBuilder {
    function: FingerprintFunction,
    table: DimensionTable,
    checked_layout: Option<Arc<RecordLayout>>,
}

impl DimensionBuilder {
    pub fn new(function: FingerprintFunction) -> Self {
        Self {
            table: DimensionTable::new(function.dimension()),
            function,
            checked_layout: None,
        }
    }

    /// Builds a complete table from rows in global order.
    pub fn build<'a, I>(
        function: FingerprintFunction,
        rows: I,
        source_id: &str,
    ) -> Result<DimensionTable, WarehouseError>
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut builder = Self::new(function);
        for row in rows {
            builder.push(row, source_id)?;
        }
        Ok(builder.finish())
    }

    /// Adds one row. A row whose layout lacks a key column is a schema
    /// mismatch and aborts the build.
    pub fn push(&mut self, row: &RawRecord, source_id: &str) -> Result<bool, WarehouseError> {
        let already_checked = self
            .checked_layout
            .as_ref()
            .is_some_and(|layout| Arc::ptr_eq(layout, row.layout()));
        if !already_checked {
            self.function.ensure_layout(row.layout(), source_id)?;
            self.checked_layout = Some(Arc::clone(row.layout()));
        }
        let fingerprint = self.function.fingerprint(row);
        if self.table.contains(&fingerprint) {
            self.table.discarded += 1;
            return Ok(false);
        }
        Ok(self.table.insert(DimensionRecord {
            fingerprint,
            attributes: present_attributes(&self.function, row),
        }))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn finish(self) -> DimensionTable {
        debug!(
            "{}: {} distinct record(s), {} duplicate(s) discarded",
            self.table.dimension,
            self.table.len(),
            self.table.discarded
        );
        self.table
    }
}

/// Fingerprints of a written dimension file, in file order.
pub fn read_dimension_fingerprints(path: &Path) -> Result<Vec<Fingerprint>> {
    io_utils::read_column(path, HASH_KEY_COLUMN)?
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            raw.parse::<Fingerprint>()
                .with_context(|| format!("Row {} of {:?}", idx + 2, path))
        })
        .collect()
}
