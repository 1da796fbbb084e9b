//! Fingerprint to store-assigned integer id mappings.
//!
//! A store that assigns sequential ids on insert hands them back in insertion
//! order. Zipping them with the dimension list that was inserted is only
//! sound if both sequences have the same length and the list holds no
//! duplicates, so both are checked before any pair is formed.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    dimension::{HASH_KEY_COLUMN, read_dimension_fingerprints},
    error::WarehouseError,
    fact::FactRecord,
    fingerprint::Fingerprint,
    io_utils,
    pipeline::OutputLayout,
    schema::Dimension,
};

pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurrogateMap {
    dimension: Dimension,
    entries: Vec<(Fingerprint, i64)>,
    index: HashMap<Fingerprint, i64>,
}

impl SurrogateMap {
    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<i64> {
        self.index.get(fingerprint).copied()
    }

    pub fn resolve(&self, fingerprint: &Fingerprint) -> Result<i64, WarehouseError> {
        self.get(fingerprint)
            .ok_or_else(|| WarehouseError::UnmappedFingerprint {
                dimension: self.dimension,
                fingerprint: *fingerprint,
            })
    }

    /// Pairs in dimension-list order.
    pub fn entries(&self) -> &[(Fingerprint, i64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        io_utils::write_replacing(path, |writer| {
            writer.write_record([HASH_KEY_COLUMN, ID_COLUMN])?;
            for (fingerprint, id) in &self.entries {
                writer.write_record([fingerprint.to_string(), id.to_string()])?;
            }
            Ok(())
        })
        .with_context(|| format!("Writing surrogate map {path:?}"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SurrogateRemapper;

impl SurrogateRemapper {
    /// Zips `fingerprints` (the dimension list in insertion order) with the
    /// `ids` the store returned for it.
    pub fn remap(
        &self,
        dimension: Dimension,
        fingerprints: &[Fingerprint],
        ids: &[i64],
    ) -> Result<SurrogateMap, WarehouseError> {
        if fingerprints.len() != ids.len() {
            return Err(WarehouseError::CardinalityMismatch {
                dimension,
                fingerprints: fingerprints.len(),
                ids: ids.len(),
            });
        }
        let mut index = HashMap::with_capacity(fingerprints.len());
        let mut entries = Vec::with_capacity(fingerprints.len());
        for (fingerprint, id) in fingerprints.iter().zip(ids) {
            if index.insert(*fingerprint, *id).is_some() {
                return Err(WarehouseError::DuplicateFingerprint {
                    dimension,
                    fingerprint: *fingerprint,
                });
            }
            entries.push((*fingerprint, *id));
        }
        Ok(SurrogateMap {
            dimension,
            entries,
            index,
        })
    }
}

/// One optional map per dimension, used to swap fact fingerprints for ids.
#[derive(Debug, Clone, Default)]
pub struct SurrogateCatalog {
    maps: [Option<SurrogateMap>; 8],
}

impl SurrogateCatalog {
    pub fn insert(&mut self, map: SurrogateMap) {
        let idx = map.dimension().ordinal();
        self.maps[idx] = Some(map);
    }

    pub fn map(&self, dimension: Dimension) -> Option<&SurrogateMap> {
        self.maps[dimension.ordinal()].as_ref()
    }

    /// Integer foreign keys of `fact`, in [`Dimension::ALL`] order. A
    /// dimension without a map leaves every key unmapped.
    pub fn rewrite(&self, fact: &FactRecord) -> Result<[i64; 8], WarehouseError> {
        let mut ids = [0i64; 8];
        for dimension in Dimension::ALL {
            let fingerprint = fact.key(dimension);
            ids[dimension.ordinal()] = match self.map(dimension) {
                Some(map) => map.resolve(&fingerprint)?,
                None => {
                    return Err(WarehouseError::UnmappedFingerprint {
                        dimension,
                        fingerprint,
                    });
                }
            };
        }
        Ok(ids)
    }
}

/// Reads store-assigned ids: either a CSV with an `id` column or one integer
/// per line. Blank lines are ignored.
pub fn read_ids(path: &Path) -> Result<Vec<i64>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Reading id file {path:?}"))?;
    let first = contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    let is_csv = first
        .split(',')
        .any(|cell| cell.trim().trim_matches('"') == ID_COLUMN);
    let raw: Vec<String> = if is_csv {
        io_utils::read_column(path, ID_COLUMN)?
    } else {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    };
    raw.iter()
        .enumerate()
        .map(|(idx, value)| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|err| anyhow!("Id #{} ('{}') in {:?}: {}", idx + 1, value, path, err))
        })
        .collect()
}

/// Builds the map for `dimension` from its written table and an id file, and
/// stores it next to the table.
pub fn remap_from_artifacts(
    layout: &OutputLayout,
    dimension: Dimension,
    ids_path: &Path,
) -> Result<(SurrogateMap, PathBuf)> {
    let dim_path = layout.dimension_path(dimension);
    if !dim_path.exists() {
        return Err(anyhow!(
            "Dimension file {dim_path:?} not found; run the dimension build first"
        ));
    }
    let fingerprints = read_dimension_fingerprints(&dim_path)?;
    let ids = read_ids(ids_path)?;
    let map = SurrogateRemapper.remap(dimension, &fingerprints, &ids)?;
    let out = layout.surrogate_map_path(dimension);
    map.write_csv(&out)?;
    info!(
        "{}: mapped {} fingerprint(s) to surrogate ids in {:?}",
        dimension.table_name(),
        map.len(),
        out
    );
    Ok((map, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_plain_and_csv_id_files() {
        let dir = tempdir().expect("temp dir");
        let plain = dir.path().join("ids.txt");
        fs::write(&plain, "10\n11\n\n12\n").expect("write");
        assert_eq!(read_ids(&plain).unwrap(), vec![10, 11, 12]);

        let csv = dir.path().join("ids.csv");
        fs::write(&csv, "id,sexo\n7,M\n8,F\n").expect("write");
        assert_eq!(read_ids(&csv).unwrap(), vec![7, 8]);
    }

    #[test]
    fn rejects_non_integer_ids() {
        let dir = tempdir().expect("temp dir");
        let plain = dir.path().join("ids.txt");
        fs::write(&plain, "10\nabc\n").expect("write");
        assert!(read_ids(&plain).is_err());
    }
}
