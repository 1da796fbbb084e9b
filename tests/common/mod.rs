#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rhc_warehouse::{fact::MEASURE_SOURCE_COLUMNS, record::RawRecord, schema::Dimension};
use tempfile::{TempDir, tempdir};

/// Every column a registry extract must carry, key columns first.
pub fn registry_headers() -> Vec<&'static str> {
    let mut headers: Vec<&'static str> = Vec::new();
    let key_columns = Dimension::ALL
        .iter()
        .flat_map(|dim| dim.schema().source_columns());
    for column in key_columns.chain(MEASURE_SOURCE_COLUMNS.iter().copied()) {
        if !headers.contains(&column) {
            headers.push(column);
        }
    }
    headers
}

/// One registry case with plausible values; `overrides` replace single columns.
pub fn case_row(overrides: &[(&str, &str)]) -> Vec<String> {
    registry_headers()
        .into_iter()
        .map(|column| {
            if let Some((_, value)) = overrides.iter().find(|(c, _)| *c == column) {
                return value.to_string();
            }
            default_value(column).to_string()
        })
        .collect()
}

fn default_value(column: &str) -> &'static str {
    match column {
        "sexo" => "Masculino",
        "idade" => "45",
        "raca_cor" => "Branca",
        "instrucao" => "",
        "estado_conjugal" => "CASADO",
        "local_nascimento" => "Campinas",
        "estado_residencia" => "SP",
        "procedencia" => "Campinas",
        "cnes" => "2077485",
        "uf_unidade_hospitalar" => "SP",
        "municipio_unidade_hospitalar" => "Sao Paulo",
        "tipo_histologico" => "8140/3",
        "localizacao_tumor_primaria" => "C50",
        "historico_familiar" => "Sim",
        "alcoolismo" => "Nao",
        "tabagismo" => "Sem informacao",
        "ocupacao" => "Pedreiro",
        "data_diagnostico" => "2019-03-07",
        "tipo_caso" => "1",
        "valor_total" => "1500,75",
        "mais_um_tumor" => "0",
        _ => "",
    }
}

/// Renders `rows` (already ordered like [`registry_headers`]) as CSV text.
pub fn extract_csv(rows: &[Vec<String>]) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(registry_headers()).expect("headers");
    for row in rows {
        writer.write_record(row).expect("row");
    }
    String::from_utf8(writer.into_inner().expect("flush")).expect("utf8")
}

/// The same cases as in-memory records, empty cells read as absent.
pub fn case_records(rows: &[Vec<String>]) -> Vec<RawRecord> {
    rows.iter()
        .map(|row| {
            RawRecord::from_pairs(
                registry_headers()
                    .into_iter()
                    .zip(row)
                    .map(|(h, v)| (h, (!v.is_empty()).then_some(v.as_str()))),
            )
        })
        .collect()
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory with `input/` and `output/` inside.
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("temp dir");
        fs::create_dir_all(temp_dir.path().join("input")).expect("input dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn input_dir(&self) -> PathBuf {
        self.path().join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("output")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes a registry extract into `input/`.
    pub fn write_extract(&self, name: &str, rows: &[Vec<String>]) -> PathBuf {
        self.write(&format!("input/{name}"), &extract_csv(rows))
    }

    pub fn read_output(&self, name: &str) -> String {
        fs::read_to_string(self.output_dir().join(name)).expect("read output")
    }
}
