//! File-level orchestration of the dimension and fact builds.
//!
//! Inputs arrive as [`RecordSource`]s in global order. The dimension pipeline
//! reads all of them in one pass; the fact pipeline processes each pending
//! source into its own batch file, records it in the checkpoint, and
//! consolidates the batches once nothing is pending.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    checkpoint::CheckpointStore,
    dimension::{DimensionBuilder, DimensionTable},
    error::WarehouseError,
    fact::{FactAssembler, fact_headers, write_fact_rows},
    fingerprint::KeyCatalog,
    io_utils::{self, CsvRecords},
    record::RawRecord,
    schema::Dimension,
};

pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<RawRecord>> + 'a>;

/// One input file, identified by a stable name used for checkpointing.
pub trait RecordSource {
    fn id(&self) -> &str;
    fn records(&self) -> Result<RecordIter<'_>>;
}

#[derive(Debug, Clone)]
pub struct CsvSource {
    id: String,
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl CsvSource {
    pub fn new(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Self {
        Self {
            id: io_utils::file_id(path),
            path: path.to_path_buf(),
            delimiter,
            encoding,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CsvSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn records(&self) -> Result<RecordIter<'_>> {
        let records = CsvRecords::open(&self.path, self.delimiter, self.encoding)?;
        Ok(Box::new(records))
    }
}

/// Rows already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    id: String,
    rows: Vec<RawRecord>,
}

impl MemorySource {
    pub fn new(id: impl Into<String>, rows: Vec<RawRecord>) -> Self {
        Self {
            id: id.into(),
            rows,
        }
    }
}

impl RecordSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn records(&self) -> Result<RecordIter<'_>> {
        Ok(Box::new(self.rows.iter().cloned().map(Ok)))
    }
}

/// `<prefix>*.csv` files of `dir` in name order.
pub fn discover_inputs(
    dir: &Path,
    prefix: &str,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Vec<CsvSource>> {
    let files = io_utils::list_input_files(dir, prefix)?;
    if files.is_empty() {
        bail!("No input files matching '{prefix}*.csv' in {dir:?}");
    }
    info!("Found {} input file(s) in {:?}", files.len(), dir);
    Ok(files
        .iter()
        .map(|path| CsvSource::new(path, delimiter, encoding))
        .collect())
}

/// Where every artifact of a run lives.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    dir: PathBuf,
    fact_file: String,
    checkpoint_file: String,
}

impl OutputLayout {
    pub fn new(dir: &Path, fact_file: &str, checkpoint_file: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            fact_file: fact_file.to_string(),
            checkpoint_file: checkpoint_file.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn dimension_path(&self, dimension: Dimension) -> PathBuf {
        self.dir.join(dimension.file_name())
    }

    pub fn fact_path(&self) -> PathBuf {
        self.dir.join(&self.fact_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(&self.checkpoint_file)
    }

    /// `fato_batch_<stem>.csv` for `.csv` sources; any other id keeps its
    /// extension in the name so `x.csv` and `x.CSV` stay apart.
    pub fn batch_path(&self, source_id: &str) -> PathBuf {
        let path = Path::new(source_id);
        let name = match (path.file_stem(), path.extension()) {
            (Some(stem), Some(ext)) if ext == "csv" => stem.to_string_lossy().into_owned(),
            _ => source_id.replace('.', "_"),
        };
        self.dir.join(format!("fato_batch_{name}.csv"))
    }

    pub fn surrogate_map_path(&self, dimension: Dimension) -> PathBuf {
        self.dir.join(format!("map_{}.csv", dimension.table_name()))
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Creating output directory {:?}", self.dir))
    }
}

/// Feeds every source, in order, through the eight dimension builders.
pub fn build_dimension_tables<S: RecordSource>(
    catalog: &KeyCatalog,
    sources: &[S],
) -> Result<Vec<DimensionTable>> {
    let mut builders: Vec<DimensionBuilder> = catalog
        .functions()
        .iter()
        .map(|function| DimensionBuilder::new(*function))
        .collect();
    for source in sources {
        let mut rows = 0usize;
        for record in source.records()? {
            let record = record?;
            for builder in builders.iter_mut() {
                builder.push(&record, source.id())?;
            }
            rows += 1;
        }
        info!("{}: {} row(s) read for dimensions", source.id(), rows);
    }
    Ok(builders.into_iter().map(DimensionBuilder::finish).collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionSummary {
    pub dimension: Dimension,
    pub records: usize,
    pub discarded: usize,
    pub path: PathBuf,
}

pub fn write_dimension_tables(
    tables: &[DimensionTable],
    layout: &OutputLayout,
) -> Result<Vec<DimensionSummary>> {
    layout.ensure_dir()?;
    tables
        .iter()
        .map(|table| {
            let path = layout.dimension_path(table.dimension());
            table.write_csv(&path)?;
            info!(
                "{}: {} record(s) written to {:?}",
                table.dimension().table_name(),
                table.len(),
                path
            );
            if table.discarded() > 0 {
                warn!(
                    "{}: {} duplicate row(s) discarded",
                    table.dimension().table_name(),
                    table.discarded()
                );
            }
            Ok(DimensionSummary {
                dimension: table.dimension(),
                records: table.len(),
                discarded: table.discarded(),
                path,
            })
        })
        .collect()
}

pub fn run_dimension_pipeline<S: RecordSource>(
    catalog: &KeyCatalog,
    sources: &[S],
    layout: &OutputLayout,
) -> Result<Vec<DimensionSummary>> {
    let tables = build_dimension_tables(catalog, sources)?;
    write_dimension_tables(&tables, layout)
}

/// Writes the fact rows of one source into `batch_path`, `batch_size` rows
/// at a time. Nothing is left under `batch_path` if any row fails.
pub fn write_fact_batch<S: RecordSource>(
    assembler: &FactAssembler,
    source: &S,
    batch_size: usize,
    batch_path: &Path,
) -> Result<usize> {
    let batch_size = batch_size.max(1);
    let mut written = 0usize;
    io_utils::write_replacing(batch_path, |writer| {
        writer
            .write_record(fact_headers())
            .context("Writing fact headers")?;
        let chunks = source.records()?.chunks(batch_size);
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let rows: Vec<RawRecord> = chunk.collect::<Result<_>>()?;
            let facts = assembler.assemble(&rows, source.id())?;
            write_fact_rows(writer, &facts)?;
            written += facts.len();
            debug!("{}: batch {} with {} row(s)", source.id(), idx + 1, facts.len());
        }
        Ok(())
    })?;
    Ok(written)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactRunSummary {
    /// Sources processed during this run.
    pub processed: Vec<String>,
    /// Sources skipped because the checkpoint already had them.
    pub skipped: Vec<String>,
    pub rows: usize,
    /// Set once every batch was merged into the final fact file.
    pub consolidated: Option<PathBuf>,
}

/// Errors no rerun can fix.
fn is_structural(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<WarehouseError>(),
        Some(WarehouseError::SchemaMismatch { .. } | WarehouseError::MissingFactColumn { .. })
    )
}

fn claim_batch_paths<S: RecordSource>(layout: &OutputLayout, sources: &[S]) -> Result<()> {
    let mut claimed: HashMap<PathBuf, &str> = HashMap::with_capacity(sources.len());
    for source in sources {
        let path = layout.batch_path(source.id());
        if let Some(previous) = claimed.insert(path.clone(), source.id()) {
            bail!(
                "Inputs '{}' and '{}' would share batch file {:?}; rename one of them",
                previous,
                source.id(),
                path
            );
        }
    }
    Ok(())
}

/// Processes every source not yet recorded in the checkpoint, then
/// consolidates. The first failing source stops the run with
/// [`WarehouseError::PartialFailure`]; sources completed before it stay
/// recorded. Schema errors are returned as they are.
///
/// Consolidation writes the fact file, clears the checkpoint and only then
/// removes the batches. A run that finds every source done, the fact file
/// present and no batch left treats the merge as already done.
pub fn run_fact_pipeline<S: RecordSource>(
    catalog: Arc<KeyCatalog>,
    sources: &[S],
    layout: &OutputLayout,
    batch_size: usize,
) -> Result<FactRunSummary> {
    claim_batch_paths(layout, sources)?;
    layout.ensure_dir()?;
    let mut checkpoint = CheckpointStore::open(&layout.checkpoint_path(), catalog.signature())?;
    let assembler = FactAssembler::new(catalog);
    let mut summary = FactRunSummary::default();

    for source in sources {
        let id = source.id();
        if checkpoint.is_done(id) {
            summary.skipped.push(id.to_string());
            continue;
        }
        let batch_path = layout.batch_path(id);
        let rows = match write_fact_batch(&assembler, source, batch_size, &batch_path) {
            Ok(rows) => rows,
            Err(err) if is_structural(&err) => return Err(err),
            Err(err) => {
                return Err(WarehouseError::PartialFailure {
                    file: id.to_string(),
                    source: err,
                }
                .into());
            }
        };
        checkpoint.mark_done(id)?;
        info!("{id}: {rows} fact row(s) written to {batch_path:?}");
        summary.processed.push(id.to_string());
        summary.rows += rows;
    }

    if !summary.skipped.is_empty() {
        info!("Skipped {} file(s) already processed", summary.skipped.len());
    }

    let ids: Vec<String> = sources.iter().map(|s| s.id().to_string()).collect();
    if checkpoint.pending(&ids).is_empty() {
        let batches: Vec<PathBuf> = ids.iter().map(|id| layout.batch_path(id)).collect();
        let fact_path = layout.fact_path();
        if !batches.is_empty() && fact_path.exists() && batches.iter().all(|b| !b.exists()) {
            warn!("Batches were already merged into {fact_path:?}; clearing the checkpoint");
        } else {
            consolidate_batches(layout, &ids)?;
        }
        checkpoint.clear()?;
        remove_batches(&batches);
        summary.consolidated = Some(fact_path);
    }
    Ok(summary)
}

/// Concatenates the batch files of `source_ids`, in that order, into the
/// final fact file. The batches are left in place.
pub fn consolidate_batches(layout: &OutputLayout, source_ids: &[String]) -> Result<PathBuf> {
    let batches: Vec<PathBuf> = source_ids.iter().map(|id| layout.batch_path(id)).collect();
    if let Some(missing) = batches.iter().find(|path| !path.exists()) {
        bail!("Batch file {missing:?} is missing; clear the checkpoint and rerun the fact build");
    }
    let fact_path = layout.fact_path();
    let mut total = 0usize;
    io_utils::write_replacing(&fact_path, |writer| {
        writer
            .write_record(fact_headers())
            .context("Writing fact headers")?;
        for batch in &batches {
            let mut reader = io_utils::open_csv_reader_from_path(batch, io_utils::DEFAULT_CSV_DELIMITER)?;
            for (idx, record) in reader.byte_records().enumerate() {
                let record =
                    record.with_context(|| format!("Reading row {} of {:?}", idx + 2, batch))?;
                writer
                    .write_byte_record(&record)
                    .with_context(|| format!("Copying row {} of {:?}", idx + 2, batch))?;
                total += 1;
            }
        }
        Ok(())
    })?;
    info!(
        "Consolidated {} batch file(s) into {:?} ({} row(s))",
        batches.len(),
        fact_path,
        total
    );
    Ok(fact_path)
}

fn remove_batches(batches: &[PathBuf]) {
    for batch in batches.iter().filter(|b| b.exists()) {
        if let Err(err) = fs::remove_file(batch) {
            warn!("Could not remove batch file {batch:?}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_names_keep_non_csv_extensions_apart() {
        let layout = OutputLayout::new(Path::new("out"), "fato.csv", ".ckpt.json");
        let lower = layout.batch_path("rhc2019.csv");
        let upper = layout.batch_path("rhc2019.CSV");
        assert_ne!(lower, upper);
        assert_eq!(upper, Path::new("out").join("fato_batch_rhc2019_CSV.csv"));
        assert_eq!(
            layout.batch_path("rhc2019"),
            Path::new("out").join("fato_batch_rhc2019.csv")
        );
    }

    #[test]
    fn batch_names_follow_the_source_stem() {
        let layout = OutputLayout::new(Path::new("out"), "fato.csv", ".ckpt.json");
        assert_eq!(
            layout.batch_path("rhc2019.csv"),
            Path::new("out").join("fato_batch_rhc2019.csv")
        );
        assert_eq!(
            layout.dimension_path(Dimension::RiskFactors),
            Path::new("out").join("dim_fatores_risco.csv")
        );
        assert_eq!(
            layout.surrogate_map_path(Dimension::Time),
            Path::new("out").join("map_dim_tempo.csv")
        );
    }
}
