mod common;

use std::io::{Cursor, Write};

use adage_loader::catalog::{Catalog, EdgeRepository, ModelRepository, SqliteCatalog};
use adage_loader::error::LoaderError;
use adage_loader::fs_util::open_input;
use adage_loader::network::import_network;
use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use common::{MODEL, seeded_sqlite};

const HEADER: &str = "gene1\tgene2\tweight\tsign\n";
const GENES: [&str; 4] = ["PA0001", "PA0002", "PA0003", "PA0004"];

fn edge_weights(catalog: &mut SqliteCatalog) -> Vec<f64> {
    let work = catalog.begin_import().unwrap();
    let model = work.find_model(MODEL).unwrap().unwrap();
    work.edges_for_model(model.id)
        .unwrap()
        .into_iter()
        .map(|edge| edge.weight)
        .collect()
}

#[test]
fn gzipped_network_is_loaded_in_batches() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("network.tsv.gz")).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    write!(
        encoder,
        "{HEADER}PA0001\tPA0002\t0.61\t+\nPA0001\tPA0003\t0.12\t+\nPA0001\tPA0004\t0.55\t-\nPA0002\tPA0003\t0.80\t+\n"
    )
    .unwrap();
    std::fs::write(path.as_std_path(), encoder.finish().unwrap()).unwrap();

    let mut catalog = seeded_sqlite(&GENES, false, 0.5);
    let report = import_network(&mut catalog, open_input(&path).unwrap(), MODEL, 2).unwrap();

    assert_eq!(report.imported, 3);
    assert_eq!(report.below_cutoff, 1);
    assert_eq!(report.batches, 2);
    assert_eq!(edge_weights(&mut catalog), vec![0.61, -0.55, 0.80]);
}

#[test]
fn failure_after_a_flushed_batch_rolls_everything_back() {
    let mut catalog = seeded_sqlite(&GENES, false, 0.0);
    let rows = "PA0001\tPA0002\t0.5\t+\nPA0001\tPA0003\t0.5\t+\nPA0004\tPA0004\t0.5\t+\n";
    let err = import_network(&mut catalog, Cursor::new(format!("{HEADER}{rows}")), MODEL, 1)
        .unwrap_err();
    assert_matches!(err, LoaderError::SelfLoop { line: 4, .. });
    assert!(edge_weights(&mut catalog).is_empty());
}

#[test]
fn second_import_checks_stored_edges() {
    let mut catalog = seeded_sqlite(&GENES, false, 0.0);
    import_network(
        &mut catalog,
        Cursor::new(format!("{HEADER}PA0001\tPA0002\t0.5\t+\n")),
        MODEL,
        10,
    )
    .unwrap();

    let err = import_network(
        &mut catalog,
        Cursor::new(format!("{HEADER}PA0002\tPA0001\t0.3\t-\n")),
        MODEL,
        10,
    )
    .unwrap_err();
    assert_matches!(err, LoaderError::UniquenessViolation { line: 2, .. });
    assert_eq!(edge_weights(&mut catalog), vec![0.5]);
}

#[test]
fn unknown_model_is_fatal() {
    let mut catalog = seeded_sqlite(&GENES, false, 0.0);
    let err = import_network(&mut catalog, Cursor::new(HEADER), "Unknown model", 10).unwrap_err();
    assert_matches!(err, LoaderError::ModelNotFound(_));
}
