mod common;

use std::io::Cursor;

use adage_loader::catalog::{Catalog, GeneRepository, OrganismRepository, SqliteCatalog};
use adage_loader::error::LoaderError;
use adage_loader::gene_history::{GeneHistoryOptions, import_gene_history};
use adage_loader::gene_info::{GeneInfoOptions, import_gene_info};
use assert_matches::assert_matches;

use common::{TAX_ID, seeded_sqlite};

fn gene_info(count: usize) -> String {
    let mut input = String::from(
        "#tax_id\tGeneID\tSymbol\tLocusTag\tSynonyms\tdbXrefs\tchromosome\tmap_location\tdescription\ttype_of_gene\n",
    );
    for idx in 0..count {
        input.push_str(&format!(
            "{TAX_ID}\t{}\tgen{idx}\tPA{idx:04}\tsyn{idx}\tGeneID:{}\t-\t-\thypothetical protein\tprotein-coding\n",
            879000 + idx,
            879000 + idx
        ));
    }
    input
}

fn obsolete_flags(catalog: &mut SqliteCatalog, entrez_ids: &[i64]) -> Vec<bool> {
    let work = catalog.begin_import().unwrap();
    let organism = work.find_organism(TAX_ID).unwrap().unwrap();
    entrez_ids
        .iter()
        .map(|id| work.find_gene_by_entrez(organism.id, *id).unwrap().unwrap().obsolete)
        .collect()
}

#[test]
fn gene_info_then_history() {
    let mut catalog = seeded_sqlite(&[], false, 0.0);

    let report = import_gene_info(
        &mut catalog,
        Cursor::new(gene_info(12)),
        &GeneInfoOptions::new(TAX_ID),
    )
    .unwrap();
    assert_eq!(report.created, 12);

    {
        let work = catalog.begin_import().unwrap();
        let genes = work.find_genes_by_systematic_name("PA0003").unwrap();
        assert_eq!(genes.len(), 1);
        assert_eq!(genes[0].aliases, "syn3");
        // (2 * 1 xref + 1 alias) * 2
        assert_eq!(genes[0].weight, 6.0);
    }

    let history = format!(
        "#tax_id\tGeneID\tDiscontinued_GeneID\tDiscontinued_Symbol\tDiscontinue_Date\n\
         {TAX_ID}\t-\t879002\tgen2\t20190101\n\
         {TAX_ID}\t-\t555\tPA9999\t20190101\n"
    );
    let report = import_gene_history(
        &mut catalog,
        Cursor::new(history),
        &GeneHistoryOptions::new(TAX_ID),
    )
    .unwrap();
    assert_eq!((report.obsoleted, report.created), (1, 1));
    assert_eq!(obsolete_flags(&mut catalog, &[879001, 879002, 555]), vec![false, true, true]);

    // Re-importing gene_info revives 879002 and obsoletes the history-only gene.
    let report = import_gene_info(
        &mut catalog,
        Cursor::new(gene_info(12)),
        &GeneInfoOptions::new(TAX_ID),
    )
    .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.obsoleted, 0);
    assert_eq!(obsolete_flags(&mut catalog, &[879002, 555]), vec![false, true]);
}

#[test]
fn too_few_gene_records() {
    let mut catalog = seeded_sqlite(&[], false, 0.0);
    let err = import_gene_info(
        &mut catalog,
        Cursor::new(gene_info(9)),
        &GeneInfoOptions::new(TAX_ID),
    )
    .unwrap_err();
    assert_matches!(err, LoaderError::TooFewGeneRecords { found: 9, .. });
    assert!(
        catalog
            .begin_import()
            .unwrap()
            .find_genes_by_systematic_name("PA0001")
            .unwrap()
            .is_empty()
    );
}
