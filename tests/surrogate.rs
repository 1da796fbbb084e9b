mod common;

use common::{TestWorkspace, case_records, case_row};
use rhc_warehouse::{
    error::WarehouseError,
    fact::FactAssembler,
    fingerprint::{Fingerprint, KeyCatalog},
    pipeline::{MemorySource, OutputLayout, build_dimension_tables},
    schema::Dimension,
    surrogate::{SurrogateCatalog, SurrogateRemapper, remap_from_artifacts},
};

fn fingerprints(names: &[&str]) -> Vec<Fingerprint> {
    names.iter().map(|n| Fingerprint::of(n)).collect()
}

#[test]
fn zips_positionally() {
    let list = fingerprints(&["a", "b", "c"]);
    let map = SurrogateRemapper
        .remap(Dimension::Patient, &list, &[11, 12, 13])
        .expect("remap");
    assert_eq!(map.get(&list[0]), Some(11));
    assert_eq!(map.get(&list[2]), Some(13));
    assert_eq!(map.entries()[1], (list[1], 12));
}

#[test]
fn length_mismatch_is_refused() {
    let list = fingerprints(&["a", "b", "c"]);
    let err = SurrogateRemapper
        .remap(Dimension::Tumor, &list, &[1, 2])
        .unwrap_err();
    assert!(matches!(
        err,
        WarehouseError::CardinalityMismatch {
            dimension: Dimension::Tumor,
            fingerprints: 3,
            ids: 2
        }
    ));
}

#[test]
fn duplicate_fingerprints_are_refused() {
    let list = fingerprints(&["a", "b", "a"]);
    let err = SurrogateRemapper
        .remap(Dimension::Tumor, &list, &[1, 2, 3])
        .unwrap_err();
    assert!(matches!(err, WarehouseError::DuplicateFingerprint { .. }));
}

#[test]
fn rewrites_fact_keys_and_reports_unmapped_ones() {
    let rows = vec![case_row(&[]), case_row(&[("sexo", "Feminino")])];
    let records = case_records(&rows);
    let catalog = KeyCatalog::standard();
    let tables =
        build_dimension_tables(&catalog, &[MemorySource::new("rhc.csv", records.clone())]).expect("build");
    let facts = FactAssembler::new(catalog.clone())
        .assemble(&records, "rhc.csv")
        .expect("assemble");

    let mut surrogates = SurrogateCatalog::default();
    for table in &tables {
        let list: Vec<Fingerprint> = table.fingerprints().collect();
        let ids: Vec<i64> = (1..=list.len() as i64).collect();
        surrogates.insert(
            SurrogateRemapper
                .remap(table.dimension(), &list, &ids)
                .expect("remap"),
        );
    }
    let first = surrogates.rewrite(&facts[0]).expect("rewrite");
    let second = surrogates.rewrite(&facts[1]).expect("rewrite");
    assert_eq!(first, [1; 8]);
    assert_eq!(second[Dimension::Patient.ordinal()], 2);
    assert_eq!(second[Dimension::Tumor.ordinal()], 1);

    let mut partial = SurrogateCatalog::default();
    partial.insert(
        SurrogateRemapper
            .remap(Dimension::Patient, &[facts[0].key(Dimension::Patient)], &[1])
            .expect("remap"),
    );
    let err = partial.rewrite(&facts[1]).unwrap_err();
    assert!(matches!(
        err,
        WarehouseError::UnmappedFingerprint {
            dimension: Dimension::Patient,
            ..
        }
    ));
}

#[test]
fn writes_a_map_file_from_artifacts() {
    let workspace = TestWorkspace::new();
    let layout = OutputLayout::new(&workspace.output_dir(), "fato.csv", ".checkpoint.json");
    let rows = vec![case_row(&[]), case_row(&[("ocupacao", "Professora")])];
    let catalog = KeyCatalog::standard();
    let tables =
        build_dimension_tables(&catalog, &[MemorySource::new("rhc.csv", case_records(&rows))])
            .expect("build");
    rhc_warehouse::pipeline::write_dimension_tables(&tables, &layout).expect("write");

    let ids = workspace.write("ids.txt", "40\n41\n");
    let (map, path) = remap_from_artifacts(&layout, Dimension::Occupation, &ids).expect("remap");
    assert_eq!(map.len(), 2);
    let contents = std::fs::read_to_string(&path).expect("map file");
    let occupation: Vec<Fingerprint> = tables[Dimension::Occupation.ordinal()]
        .fingerprints()
        .collect();
    assert_eq!(
        contents,
        format!("hash_key,id\n{},40\n{},41\n", occupation[0], occupation[1])
    );

    let short = workspace.write("short.txt", "40\n");
    let err = remap_from_artifacts(&layout, Dimension::Occupation, &short).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<WarehouseError>(),
        Some(WarehouseError::CardinalityMismatch { .. })
    ));
}
