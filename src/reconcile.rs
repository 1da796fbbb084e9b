//! Referential coverage of fact foreign keys against dimension keys.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use serde::Serialize;

use crate::{
    dimension::HASH_KEY_COLUMN,
    fingerprint::Fingerprint,
    io_utils,
    pipeline::OutputLayout,
    schema::Dimension,
};

pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

pub type FingerprintSet = HashSet<Fingerprint>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every fact key resolves.
    Covered,
    /// At least one fact key has no dimension row.
    Incomplete,
    /// The fact table holds no keys for this dimension, so nothing was checked.
    NoFactKeys,
    /// The dimension artifact does not exist.
    MissingDimension,
}

impl Verdict {
    pub fn passed(self) -> bool {
        matches!(self, Verdict::Covered)
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Covered => "ok",
            Verdict::Incomplete => "incomplete",
            Verdict::NoFactKeys => "no fact keys",
            Verdict::MissingDimension => "missing dimension",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionCoverage {
    pub dimension: Dimension,
    pub fact_distinct: usize,
    pub dimension_distinct: usize,
    pub matches: usize,
    pub verdict: Verdict,
    /// Up to the validator's sample limit, sorted.
    pub missing_sample: Vec<Fingerprint>,
    pub missing_total: usize,
    /// Dimension keys no fact row references. Informational only.
    pub unused: usize,
}

impl DimensionCoverage {
    /// Percentage of distinct fact keys found in the dimension; zero when
    /// there are no fact keys.
    pub fn coverage(&self) -> f64 {
        if self.fact_distinct == 0 {
            0.0
        } else {
            self.matches as f64 * 100.0 / self.fact_distinct as f64
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.passed()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub dimensions: Vec<DimensionCoverage>,
}

impl ReconciliationReport {
    pub fn passed(&self) -> bool {
        !self.dimensions.is_empty() && self.dimensions.iter().all(DimensionCoverage::passed)
    }

    pub fn get(&self, dimension: Dimension) -> Option<&DimensionCoverage> {
        self.dimensions.iter().find(|c| c.dimension == dimension)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DimensionCoverage> {
        self.dimensions.iter().filter(|c| !c.passed())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconciliationValidator {
    sample_limit: usize,
}

impl Default for ReconciliationValidator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_LIMIT)
    }
}

impl ReconciliationValidator {
    pub fn new(sample_limit: usize) -> Self {
        Self { sample_limit }
    }

    /// `dims` is `None` when the dimension's table could not be found.
    pub fn validate_dimension(
        &self,
        dimension: Dimension,
        fact: &FingerprintSet,
        dims: Option<&FingerprintSet>,
    ) -> DimensionCoverage {
        let Some(dims) = dims else {
            return DimensionCoverage {
                dimension,
                fact_distinct: fact.len(),
                dimension_distinct: 0,
                matches: 0,
                verdict: Verdict::MissingDimension,
                missing_sample: sample(fact.iter().copied(), self.sample_limit),
                missing_total: fact.len(),
                unused: 0,
            };
        };
        let matches = fact.intersection(dims).count();
        let missing_total = fact.len() - matches;
        let verdict = if fact.is_empty() {
            Verdict::NoFactKeys
        } else if missing_total == 0 {
            Verdict::Covered
        } else {
            Verdict::Incomplete
        };
        DimensionCoverage {
            dimension,
            fact_distinct: fact.len(),
            dimension_distinct: dims.len(),
            matches,
            verdict,
            missing_sample: sample(fact.difference(dims).copied(), self.sample_limit),
            missing_total,
            unused: dims.len() - matches,
        }
    }

    /// Validates each dimension independently; the slices are indexed by
    /// [`Dimension::ordinal`].
    pub fn validate(
        &self,
        fact: &[FingerprintSet; 8],
        dims: &[Option<FingerprintSet>; 8],
    ) -> ReconciliationReport {
        let dimensions = Dimension::ALL
            .iter()
            .map(|dim| {
                let idx = dim.ordinal();
                let coverage = self.validate_dimension(*dim, &fact[idx], dims[idx].as_ref());
                if !coverage.passed() {
                    warn!(
                        "{}: {} ({} of {} fact key(s) resolved)",
                        dim.table_name(),
                        coverage.verdict.label(),
                        coverage.matches,
                        coverage.fact_distinct
                    );
                }
                coverage
            })
            .collect();
        ReconciliationReport { dimensions }
    }

    /// Validates the written fact file against the dimension files of `layout`.
    pub fn validate_artifacts(&self, layout: &OutputLayout) -> Result<ReconciliationReport> {
        let fact = load_fact_fingerprints(&layout.fact_path())?;
        let mut dims: [Option<FingerprintSet>; 8] = Default::default();
        for dim in Dimension::ALL {
            dims[dim.ordinal()] = load_dimension_set(&layout.dimension_path(dim))?;
        }
        Ok(self.validate(&fact, &dims))
    }
}

fn sample(missing: impl Iterator<Item = Fingerprint>, limit: usize) -> Vec<Fingerprint> {
    let mut all: Vec<Fingerprint> = missing.collect();
    all.sort();
    all.truncate(limit);
    all
}

/// Distinct foreign-key fingerprints per dimension, read from a fact file.
pub fn load_fact_fingerprints(path: &Path) -> Result<[FingerprintSet; 8]> {
    if !path.exists() {
        bail!("Fact file {path:?} not found; run the fact build first");
    }
    let columns: Vec<&str> = Dimension::ALL.iter().map(|d| d.fact_column()).collect();
    let raw = io_utils::read_distinct_columns(path, &columns)?;
    let mut sets: [FingerprintSet; 8] = Default::default();
    for (set, (values, column)) in sets.iter_mut().zip(raw.into_iter().zip(&columns)) {
        for value in values {
            let fp = value
                .parse::<Fingerprint>()
                .with_context(|| format!("Column '{column}' of {path:?}"))?;
            set.insert(fp);
        }
    }
    debug!("Loaded fact keys from {path:?}");
    Ok(sets)
}

/// Key set of one dimension file, or `None` if the file does not exist.
pub fn load_dimension_set(path: &Path) -> Result<Option<FingerprintSet>> {
    if !path.exists() {
        return Ok(None);
    }
    let values = io_utils::read_column(path, HASH_KEY_COLUMN)?;
    let set = values
        .iter()
        .map(|raw| {
            raw.parse::<Fingerprint>()
                .with_context(|| format!("Column '{HASH_KEY_COLUMN}' of {path:?}"))
        })
        .collect::<Result<FingerprintSet>>()?;
    Ok(Some(set))
}
