//! Fact rows: one case per input row, foreign keys as fingerprints.

use std::{io::Write, sync::Arc};

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::{
    data::{Value, render_cell},
    error::WarehouseError,
    fingerprint::{Fingerprint, KeyCatalog},
    normalize::{is_null, non_null},
    presentation::{multiple_tumors, parse_money},
    record::{RawRecord, RecordLayout},
    schema::Dimension,
};

/// Raw columns read for fact measures, besides the dimension key columns.
pub const MEASURE_SOURCE_COLUMNS: &[&str] = &[
    "tipo_caso",
    "data_diagnostico",
    "data_obito",
    "valor_total",
    "mais_um_tumor",
    "origem_encaminhamento",
    "exame_diagnostico",
    "diagnostico_anterior",
    "base_mais_importante",
    "base_diagnostico_sp",
    "outro_estadiamento",
];

pub const MEASURE_COLUMNS: &[&str] = &[
    "case_code",
    "data_diagnostico",
    "data_obito",
    "valor_total",
    "multiplos_tumores",
    "orientacao",
    "exame_diagnostico",
    "diagnostico_anterior",
    "base_diagnostico",
    "base_diagnostico_suplementar",
    "outro_estadio",
    "sobreviveu",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactMeasures {
    pub case_code: Option<String>,
    pub diagnosis_date: Option<String>,
    pub death_date: Option<String>,
    pub total_value: Option<Decimal>,
    pub multiple_tumors: Option<bool>,
    pub referral: Option<String>,
    pub diagnostic_exam: Option<String>,
    pub previous_diagnosis: Option<String>,
    pub diagnosis_basis: Option<String>,
    pub supplementary_basis: Option<String>,
    pub other_staging: Option<String>,
    /// No death date on record.
    pub survived: bool,
}

impl FactMeasures {
    fn derive(record: &RawRecord) -> Self {
        let text = |column: &str| non_null(record.value(column));
        Self {
            case_code: text("tipo_caso"),
            diagnosis_date: text("data_diagnostico"),
            death_date: text("data_obito"),
            total_value: parse_money(record.value("valor_total")),
            multiple_tumors: multiple_tumors(record.value("mais_um_tumor")),
            referral: text("origem_encaminhamento"),
            diagnostic_exam: text("exame_diagnostico"),
            previous_diagnosis: text("diagnostico_anterior"),
            diagnosis_basis: text("base_mais_importante"),
            supplementary_basis: text("base_diagnostico_sp"),
            other_staging: text("outro_estadiamento"),
            survived: is_null(record.value("data_obito")),
        }
    }

    fn cells(&self) -> [String; 12] {
        let opt = |value: &Option<String>| value.clone().unwrap_or_default();
        [
            opt(&self.case_code),
            opt(&self.diagnosis_date),
            opt(&self.death_date),
            render_cell(self.total_value.map(Value::Decimal).as_ref()),
            self.multiple_tumors
                .map(|v| v.to_string())
                .unwrap_or_default(),
            opt(&self.referral),
            opt(&self.diagnostic_exam),
            opt(&self.previous_diagnosis),
            opt(&self.diagnosis_basis),
            opt(&self.supplementary_basis),
            opt(&self.other_staging),
            self.survived.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactRecord {
    /// Indexed by [`Dimension::ordinal`].
    pub keys: [Fingerprint; 8],
    pub measures: FactMeasures,
}

impl FactRecord {
    pub fn key(&self, dimension: Dimension) -> Fingerprint {
        self.keys[dimension.ordinal()]
    }

    pub fn to_row(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(Fingerprint::to_string)
            .chain(self.measures.cells())
            .collect()
    }
}

pub fn fact_headers() -> Vec<&'static str> {
    Dimension::ALL
        .iter()
        .map(|dim| dim.fact_column())
        .chain(MEASURE_COLUMNS.iter().copied())
        .collect()
}

pub fn write_fact_rows<W: Write>(writer: &mut csv::Writer<W>, records: &[FactRecord]) -> Result<()> {
    for record in records {
        writer
            .write_record(record.to_row())
            .context("Writing fact row")?;
    }
    Ok(())
}

/// Turns raw rows into fact rows. Holds no cross-row state, so batch
/// boundaries never change the output.
#[derive(Debug, Clone)]
pub struct FactAssembler {
    catalog: Arc<KeyCatalog>,
}

impl FactAssembler {
    pub fn new(catalog: Arc<KeyCatalog>) -> Self {
        Self { catalog }
    }

    pub fn ensure_layout(&self, layout: &RecordLayout, source_id: &str) -> Result<(), WarehouseError> {
        self.catalog.ensure_layout(layout, source_id)?;
        match MEASURE_SOURCE_COLUMNS
            .iter()
            .find(|column| !layout.contains(column))
        {
            Some(column) => Err(WarehouseError::MissingFactColumn {
                column: (*column).to_string(),
                source_id: source_id.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn assemble_row(&self, record: &RawRecord) -> FactRecord {
        FactRecord {
            keys: self.catalog.fingerprint_all(record),
            measures: FactMeasures::derive(record),
        }
    }

    pub fn assemble(&self, batch: &[RawRecord], source_id: &str) -> Result<Vec<FactRecord>, WarehouseError> {
        let mut checked: Option<&Arc<RecordLayout>> = None;
        let mut facts = Vec::with_capacity(batch.len());
        for record in batch {
            if !checked.is_some_and(|layout| Arc::ptr_eq(layout, record.layout())) {
                self.ensure_layout(record.layout(), source_id)?;
                checked = Some(record.layout());
            }
            facts.push(self.assemble_row(record));
        }
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_row(death: Option<&str>) -> RawRecord {
        let mut pairs: Vec<(&str, Option<&str>)> = Vec::new();
        for dim in Dimension::ALL {
            for column in dim.schema().source_columns() {
                if !pairs.iter().any(|(c, _)| *c == column) {
                    pairs.push((column, None));
                }
            }
        }
        for column in MEASURE_SOURCE_COLUMNS {
            if !pairs.iter().any(|(c, _)| c == column) {
                pairs.push((*column, None));
            }
        }
        for (column, value) in pairs.iter_mut() {
            match *column {
                "data_obito" => *value = death,
                "valor_total" => *value = Some("1500,75"),
                "mais_um_tumor" => *value = Some("1"),
                "data_diagnostico" => *value = Some("2019-03-07"),
                _ => {}
            }
        }
        RawRecord::from_pairs(pairs)
    }

    #[test]
    fn survival_follows_death_date_absence() {
        let assembler = FactAssembler::new(KeyCatalog::standard());
        let alive = assembler.assemble_row(&full_row(None));
        let dead = assembler.assemble_row(&full_row(Some("2020-01-01")));
        assert!(alive.measures.survived);
        assert!(!dead.measures.survived);
        assert_eq!(alive.measures.total_value, Some(Decimal::new(150075, 2)));
        assert_eq!(alive.measures.multiple_tumors, Some(true));
        assert_eq!(alive.keys, dead.keys);
    }

    #[test]
    fn rows_line_up_with_headers() {
        let assembler = FactAssembler::new(KeyCatalog::standard());
        let fact = assembler.assemble_row(&full_row(None));
        assert_eq!(fact.to_row().len(), fact_headers().len());
        assert_eq!(
            fact.key(Dimension::Time).to_string(),
            "ce26828399616b58d5c60f90b8329eae"
        );
    }

    #[test]
    fn missing_measure_column_is_fatal() {
        let assembler = FactAssembler::new(KeyCatalog::standard());
        let row = full_row(None);
        let headers: Vec<String> = row
            .layout()
            .headers()
            .iter()
            .filter(|h| h.as_str() != "valor_total")
            .cloned()
            .collect();
        let layout = Arc::new(RecordLayout::new(headers.clone()));
        let truncated = RawRecord::new(layout, vec![None; headers.len()]);
        let err = assembler.assemble(&[truncated], "rhc2019.csv").unwrap_err();
        assert!(matches!(err, WarehouseError::MissingFactColumn { .. }));
    }
}
