mod common;

use common::{case_records, case_row};
use rhc_warehouse::{
    data::Value,
    dimension::{DimensionBuilder, DimensionRecord, DimensionTable},
    error::WarehouseError,
    fact::FactAssembler,
    fingerprint::{FingerprintFunction, KeyCatalog},
    pipeline::{MemorySource, build_dimension_tables},
    record::RawRecord,
    schema::Dimension,
};

fn records_of(table: &DimensionTable) -> Vec<DimensionRecord> {
    table.records().to_vec()
}

#[test]
fn appending_exact_duplicates_changes_nothing() {
    let rows = vec![
        case_row(&[]),
        case_row(&[("sexo", "Feminino"), ("idade", "61")]),
        case_row(&[("ocupacao", "Professora")]),
    ];
    let mut doubled = rows.clone();
    doubled.extend(rows.iter().cloned());

    let catalog = KeyCatalog::standard();
    let once = build_dimension_tables(&catalog, &[MemorySource::new("a.csv", case_records(&rows))])
        .expect("build");
    let twice =
        build_dimension_tables(&catalog, &[MemorySource::new("a.csv", case_records(&doubled))])
            .expect("build");
    for (a, b) in once.iter().zip(&twice) {
        assert_eq!(records_of(a), records_of(b), "{}", a.dimension());
    }
    let patients = &twice[Dimension::Patient.ordinal()];
    assert_eq!(patients.len(), 2);
    assert_eq!(patients.discarded(), 4);
}

#[test]
fn padded_duplicates_collapse_into_the_first_row() {
    let function = FingerprintFunction::new(Dimension::Occupation);
    let first = RawRecord::from_pairs([("ocupacao", Some("Pedreiro"))]);
    let second = RawRecord::from_pairs([("ocupacao", Some("  Pedreiro  "))]);
    let table = DimensionBuilder::build(function, [&first, &second], "rhc.csv").expect("build");
    assert_eq!(table.len(), 1);
    assert_eq!(table.discarded(), 1);
    assert_eq!(
        table.records()[0].attributes,
        vec![Some(Value::Text("Pedreiro".into()))]
    );
}

#[test]
fn collisions_keep_the_earliest_non_key_attributes() {
    let function = FingerprintFunction::new(Dimension::Patient);
    let first = RawRecord::from_pairs([
        ("sexo", Some("Masculino")),
        ("idade", Some("45")),
        ("raca_cor", Some("Branca")),
        ("instrucao", Some("nan")),
        ("estado_conjugal", Some("CASADO")),
        ("ocupacao", Some("Pedreiro")),
    ]);
    let second = RawRecord::from_pairs([
        ("sexo", Some(" Masculino")),
        ("idade", Some("45 ")),
        ("raca_cor", Some("Branca")),
        ("instrucao", None),
        ("estado_conjugal", Some("CASADO")),
        ("ocupacao", Some("Motorista")),
    ]);
    let table = DimensionBuilder::build(function, [&first, &second], "rhc.csv").expect("build");
    assert_eq!(table.len(), 1);
    assert_eq!(table.records()[0], DimensionRecord::derive(&function, &first));
}

#[test]
fn dimension_and_fact_paths_derive_the_same_keys() {
    let rows = vec![
        case_row(&[]),
        case_row(&[("data_diagnostico", "31/12/2020"), ("tabagismo", "Sim")]),
        case_row(&[("data_diagnostico", ""), ("cnes", " 2077485 ")]),
    ];
    let records = case_records(&rows);
    let catalog = KeyCatalog::standard();
    let tables =
        build_dimension_tables(&catalog, &[MemorySource::new("a.csv", records.clone())]).expect("build");
    let facts = FactAssembler::new(catalog.clone())
        .assemble(&records, "a.csv")
        .expect("assemble");

    for dimension in Dimension::ALL {
        let table = &tables[dimension.ordinal()];
        for (record, fact) in records.iter().zip(&facts) {
            let via_dimension = DimensionRecord::derive(catalog.function(dimension), record);
            assert_eq!(via_dimension.fingerprint, fact.key(dimension), "{dimension}");
            assert!(table.contains(&fact.key(dimension)), "{dimension}");
        }
    }
}

#[test]
fn a_missing_key_column_aborts_the_build() {
    let function = FingerprintFunction::new(Dimension::Location);
    let row = RawRecord::from_pairs([
        ("local_nascimento", Some("Campinas")),
        ("estado_residencia", Some("SP")),
    ]);
    let err = DimensionBuilder::build(function, [&row], "rhc2019.csv").unwrap_err();
    match err {
        WarehouseError::SchemaMismatch {
            dimension,
            column,
            source_id,
        } => {
            assert_eq!(dimension, Dimension::Location);
            assert_eq!(column, "procedencia");
            assert_eq!(source_id, "rhc2019.csv");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn written_tables_start_with_the_hash_key() {
    let workspace = common::TestWorkspace::new();
    let function = FingerprintFunction::new(Dimension::RiskFactors);
    let row = RawRecord::from_pairs([
        ("historico_familiar", Some("Sim")),
        ("alcoolismo", Some("2")),
        ("tabagismo", Some("nan")),
    ]);
    let table = DimensionBuilder::build(function, [&row], "rhc.csv").expect("build");
    let path = workspace.path().join("dim_fatores_risco.csv");
    table.write_csv(&path).expect("write");
    let contents = std::fs::read_to_string(&path).expect("read");
    let fingerprint = function.fingerprint(&row);
    assert_eq!(
        contents,
        format!("hash_key,historico_familiar,alcoolismo,tabagismo\n{fingerprint},true,false,\n")
    );
}
