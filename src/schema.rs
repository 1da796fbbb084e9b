//! The eight dimension schemas of the star model.
//!
//! Each schema lists, in fingerprint order, the raw fields that make up a
//! dimension's natural key together with the warehouse column they land in
//! and the presentation applied to them after fingerprinting. The order of
//! [`KeyField`]s inside a schema is part of the key contract; [`key_signature`]
//! digests it so persisted progress can detect a layout change.

use std::{borrow::Cow, fmt, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{data::parse_naive_date, normalize::is_null, record::RawRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Patient,
    Location,
    Institution,
    Tumor,
    RiskFactors,
    Occupation,
    Time,
    Treatment,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::Patient,
        Dimension::Location,
        Dimension::Institution,
        Dimension::Tumor,
        Dimension::RiskFactors,
        Dimension::Occupation,
        Dimension::Time,
        Dimension::Treatment,
    ];

    /// Position inside [`Dimension::ALL`], used to index per-dimension arrays.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn table_name(self) -> &'static str {
        match self {
            Dimension::Patient => "dim_paciente",
            Dimension::Location => "dim_localizacao",
            Dimension::Institution => "dim_instituicao",
            Dimension::Tumor => "dim_tumor",
            Dimension::RiskFactors => "dim_fatores_risco",
            Dimension::Occupation => "dim_ocupacao",
            Dimension::Time => "dim_tempo",
            Dimension::Treatment => "dim_tratamento",
        }
    }

    /// Foreign-key column holding this dimension's fingerprint in the fact table.
    pub fn fact_column(self) -> &'static str {
        match self {
            Dimension::Patient => "paciente_id",
            Dimension::Location => "localizacao_id",
            Dimension::Institution => "instituicao_id",
            Dimension::Tumor => "tumor_id",
            Dimension::RiskFactors => "fatores_id",
            Dimension::Occupation => "ocupacao_id",
            Dimension::Time => "tempo_id",
            Dimension::Treatment => "tratamento_id",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.csv", self.table_name())
    }

    pub fn schema(self) -> &'static DimensionSchema {
        &SCHEMAS[self.ordinal()]
    }

    fn as_str(self) -> &'static str {
        match self {
            Dimension::Patient => "patient",
            Dimension::Location => "location",
            Dimension::Institution => "institution",
            Dimension::Tumor => "tumor",
            Dimension::RiskFactors => "risk_factors",
            Dimension::Occupation => "occupation",
            Dimension::Time => "time",
            Dimension::Treatment => "treatment",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = anyhow::Error;

    /// Accepts the English name, the table name, or the table name without `dim_`.
    fn from_str(value: &str) -> Result<Self> {
        let wanted = value.trim().to_ascii_lowercase().replace('-', "_");
        Dimension::ALL
            .into_iter()
            .find(|dim| {
                dim.as_str() == wanted
                    || dim.table_name() == wanted
                    || dim.table_name().trim_start_matches("dim_") == wanted
            })
            .ok_or_else(|| anyhow!("Unknown dimension '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Iso,
    Year,
    Month,
}

/// Where a key field's raw value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Column(&'static str),
    /// A calendar component of a date column. Unparseable dates yield no value
    /// for every part.
    DatePart {
        column: &'static str,
        part: DatePart,
    },
}

impl KeySource {
    pub fn column(&self) -> &'static str {
        match self {
            KeySource::Column(column) => *column,
            KeySource::DatePart { column, .. } => *column,
        }
    }

    /// Raw (pre-normalization) value of this field in `record`.
    pub fn raw_value<'r>(&self, record: &'r RawRecord) -> Option<Cow<'r, str>> {
        match self {
            KeySource::Column(column) => record.value(column).map(Cow::Borrowed),
            KeySource::DatePart { column, part } => {
                let raw = record.value(column);
                if is_null(raw) {
                    return None;
                }
                let date = parse_naive_date(raw?).ok()?;
                let rendered = match part {
                    DatePart::Iso => date.format("%Y-%m-%d").to_string(),
                    DatePart::Year => chrono::Datelike::year(&date).to_string(),
                    DatePart::Month => chrono::Datelike::month(&date).to_string(),
                };
                Some(Cow::Owned(rendered))
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            KeySource::Column(column) => (*column).to_string(),
            KeySource::DatePart { column, part } => format!("{column}#{part:?}"),
        }
    }
}

/// Storage transform applied to a key field once its fingerprint exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Text,
    Sex,
    Age,
    MaritalStatus,
    Flag,
    Integer,
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct KeyField {
    /// Column name in the dimension table.
    pub column: &'static str,
    pub source: KeySource,
    pub presentation: Presentation,
}

const fn raw(column: &'static str, source: &'static str, presentation: Presentation) -> KeyField {
    KeyField {
        column,
        source: KeySource::Column(source),
        presentation,
    }
}

const fn date_part(column: &'static str, part: DatePart, presentation: Presentation) -> KeyField {
    KeyField {
        column,
        source: KeySource::DatePart {
            column: "data_diagnostico",
            part,
        },
        presentation,
    }
}

#[derive(Debug)]
pub struct DimensionSchema {
    pub dimension: Dimension,
    pub fields: &'static [KeyField],
}

impl DimensionSchema {
    /// Raw input columns this schema reads, deduplicated, in key order.
    pub fn source_columns(&self) -> Vec<&'static str> {
        let mut columns: Vec<&'static str> = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let column = field.source.column();
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    pub fn output_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.column)
    }
}

use Presentation::{Age, Flag, Integer, MaritalStatus, Sex, Text};

static SCHEMAS: [DimensionSchema; 8] = [
    DimensionSchema {
        dimension: Dimension::Patient,
        fields: &[
            raw("sexo", "sexo", Sex),
            raw("idade", "idade", Age),
            raw("raca_cor", "raca_cor", Text),
            raw("nivel_instrucao", "instrucao", Text),
            raw("estado_civil", "estado_conjugal", MaritalStatus),
        ],
    },
    DimensionSchema {
        dimension: Dimension::Location,
        fields: &[
            raw("cidade_nascimento", "local_nascimento", Text),
            raw("estado_residencia", "estado_residencia", Text),
            raw("procedencia", "procedencia", Text),
        ],
    },
    DimensionSchema {
        dimension: Dimension::Institution,
        fields: &[
            raw("codigo_atendimento", "clinica_atendimento", Text),
            raw("codigo_tratamento", "clinica_tratamento", Text),
            raw("cnes", "cnes", Text),
            raw("uf", "uf_unidade_hospitalar", Text),
            raw("municipio", "municipio_unidade_hospitalar", Text),
        ],
    },
    DimensionSchema {
        dimension: Dimension::Tumor,
        fields: &[
            raw("local_detalhado", "localizacao_tumor_detalhada", Text),
            raw("local_primario", "localizacao_tumor_primaria", Text),
            raw("local_propagacao", "localizacao_tumor_procedimento", Text),
            raw("tipo_histologico", "tipo_histologico", Text),
            raw("lateralidade", "lateralidade", Text),
            raw("tnm", "tnm", Text),
            raw("ptnm", "ptnm", Text),
            raw("estadiamento", "estadiamento", Text),
        ],
    },
    DimensionSchema {
        dimension: Dimension::RiskFactors,
        fields: &[
            raw("historico_familiar", "historico_familiar", Flag),
            raw("alcoolismo", "alcoolismo", Flag),
            raw("tabagismo", "tabagismo", Flag),
        ],
    },
    DimensionSchema {
        dimension: Dimension::Occupation,
        fields: &[raw("ocupacao", "ocupacao", Text)],
    },
    DimensionSchema {
        dimension: Dimension::Time,
        fields: &[
            date_part("data_completa", DatePart::Iso, Presentation::Date),
            date_part("ano_primeiro_diagnostico", DatePart::Year, Integer),
            date_part("mes", DatePart::Month, Integer),
        ],
    },
    DimensionSchema {
        dimension: Dimension::Treatment,
        fields: &[
            raw("data_primeiro_contato", "data_primeiro_contato_alt", Text),
            raw("data_inicio_tratamento", "data_inicio_tratamento_alt", Text),
            raw("tipo_tratamento", "primeiro_tratamento_hospital", Text),
            raw("estado_final_tratamento", "estado_final_tratamento", Text),
            raw("razao_termino", "razao_nao_tratamento", Text),
            raw("antecedente_tratamento", "diagnostico_anterior", Text),
        ],
    },
];

/// SHA-256 over every schema's name and ordered key sources. Any change to a
/// key layout changes this value.
pub fn key_signature() -> String {
    let mut hasher = Sha256::new();
    for schema in &SCHEMAS {
        hasher.update(schema.dimension.table_name().as_bytes());
        hasher.update(b"=");
        for field in schema.fields {
            hasher.update(field.source.describe().as_bytes());
            hasher.update(b"|");
        }
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
