//! CSV plumbing for the warehouse pipelines.
//!
//! All file I/O in rhc-warehouse flows through this module:
//!
//! - **Input discovery**: registry extracts are `<prefix>*.csv` files, sorted by
//!   name; that order is the global row order of the dataset.
//! - **Decoding**: inputs are decoded through `encoding_rs` (UTF-8 by default,
//!   `latin1` extracts are common); empty cells read as absent values.
//! - **Writing**: outputs are always UTF-8 and quoted only when needed, so an
//!   empty cell stays distinguishable as null for bulk loaders.
//! - **Replacement**: whole-file outputs are written to a `.partial` sibling and
//!   renamed into place, so a crash never leaves a truncated artifact under the
//!   final name.

use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::record::{RawRecord, RecordLayout};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const PARTIAL_SUFFIX: &str = "partial";

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Input files under `dir` named `<prefix>*.csv`, sorted by file name.
pub fn list_input_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("Listing input directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Reading entry in {dir:?}"))?
            .path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if path.is_file() && is_csv && name.starts_with(prefix) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Stable identifier of an input file: its file name.
pub fn file_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = Box::new(BufReader::new(
        File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
    ));
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    Ok(builder.from_reader(reader))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<Option<String>>> {
    record
        .iter()
        .map(|field| {
            if field.is_empty() {
                Ok(None)
            } else {
                decode_bytes(field, encoding).map(Some)
            }
        })
        .collect()
}

pub fn reader_headers<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let headers = reader.byte_headers()?.clone();
    headers
        .iter()
        .map(|field| decode_bytes(field, encoding).map(|h| h.trim().to_string()))
        .collect()
}

/// Streams the rows of one input CSV as [`RawRecord`]s sharing a layout.
pub struct CsvRecords {
    path: PathBuf,
    reader: csv::Reader<Box<dyn Read>>,
    layout: Arc<RecordLayout>,
    encoding: &'static Encoding,
    record: csv::ByteRecord,
    line: usize,
}

impl CsvRecords {
    pub fn open(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = open_csv_reader_from_path(path, delimiter)?;
        let headers = reader_headers(&mut reader, encoding)
            .with_context(|| format!("Reading headers of {path:?}"))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            layout: Arc::new(RecordLayout::new(headers)),
            encoding,
            record: csv::ByteRecord::new(),
            line: 1,
        })
    }

    pub fn layout(&self) -> &Arc<RecordLayout> {
        &self.layout
    }
}

impl Iterator for CsvRecords {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.line += 1;
        match self.reader.read_byte_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => Some(
                decode_record(&self.record, self.encoding)
                    .map(|values| RawRecord::new(Arc::clone(&self.layout), values))
                    .with_context(|| format!("Decoding row {} in {:?}", self.line, self.path)),
            ),
            Err(err) => Some(
                Err(err).with_context(|| format!("Reading row {} in {:?}", self.line, self.path)),
            ),
        }
    }
}

pub fn open_csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DEFAULT_CSV_DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Writes `path` through a `.partial` sibling that is fsynced and renamed into
/// place only when `fill` succeeds. On failure the partial file is removed.
pub fn write_replacing<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut csv::Writer<BufWriter<File>>) -> Result<()>,
{
    let staging = partial_path(path);
    let result = (|| {
        let file =
            File::create(&staging).with_context(|| format!("Creating output file {staging:?}"))?;
        let mut writer = open_csv_writer(BufWriter::new(file));
        fill(&mut writer)?;
        let buffered = writer
            .into_inner()
            .map_err(|err| anyhow!("Flushing {staging:?}: {}", err.error()))?;
        let file = buffered
            .into_inner()
            .map_err(|err| anyhow!("Flushing {staging:?}: {}", err.error()))?;
        file.sync_all()
            .with_context(|| format!("Syncing {staging:?}"))?;
        fs::rename(&staging, path)
            .with_context(|| format!("Moving {staging:?} into place at {path:?}"))
    })();
    if result.is_err() && staging.exists() {
        let _ = fs::remove_file(&staging);
    }
    result
}

/// Reads one column of a CSV file, in row order, skipping empty cells.
pub fn read_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = open_csv_reader_from_path(path, DEFAULT_CSV_DELIMITER)?;
    let headers = reader_headers(&mut reader, UTF_8)?;
    let idx = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| anyhow!("Column '{column}' not found in {path:?}"))?;
    let mut values = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record =
            record.with_context(|| format!("Reading row {} in {:?}", row_idx + 2, path))?;
        if let Some(field) = record.get(idx).filter(|f| !f.is_empty()) {
            values.push(decode_bytes(field, UTF_8)?);
        }
    }
    Ok(values)
}

/// Distinct values of several columns in one pass, keyed by column position
/// in `columns`.
pub fn read_distinct_columns(path: &Path, columns: &[&str]) -> Result<Vec<HashSet<String>>> {
    let mut reader = open_csv_reader_from_path(path, DEFAULT_CSV_DELIMITER)?;
    let headers = reader_headers(&mut reader, UTF_8)?;
    let indices = columns
        .iter()
        .map(|column| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| anyhow!("Column '{column}' not found in {path:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut sets = vec![HashSet::new(); columns.len()];
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record =
            record.with_context(|| format!("Reading row {} in {:?}", row_idx + 2, path))?;
        for (set, idx) in sets.iter_mut().zip(&indices) {
            if let Some(field) = record.get(*idx).filter(|f| !f.is_empty()) {
                set.insert(decode_bytes(field, UTF_8)?);
            }
        }
    }
    Ok(sets)
}
