#![allow(dead_code)]

use adage_loader::admin;
use adage_loader::catalog::{Catalog, GeneRepository, SqliteCatalog, UnitOfWork};
use adage_loader::config::MlModelConfig;
use adage_loader::domain::{GeneRecord, OrganismId};

pub const TAX_ID: i64 = 208964;
pub const MODEL: &str = "Ensemble ADAGE 300";
pub const PARTICIPATION_TYPE: &str = "High-weight genes";

/// Organism, model, participation type and `genes` (entrez ids from
/// 880000) in a fresh in-memory SQLite catalog.
pub fn seeded_sqlite(genes: &[&str], directed: bool, cutoff: f64) -> SqliteCatalog {
    let mut catalog = SqliteCatalog::open_in_memory().unwrap();
    seed(&mut catalog, genes, directed, cutoff);
    catalog
}

pub fn seed<C: Catalog>(catalog: &mut C, genes: &[&str], directed: bool, cutoff: f64) {
    let (organism, _) = admin::set_organism(
        catalog,
        TAX_ID,
        "Pseudomonas aeruginosa",
        "Pseudomonas aeruginosa PAO1",
        None,
    )
    .unwrap();
    admin::set_ml_model(
        catalog,
        &MlModelConfig {
            title: MODEL.to_string(),
            organism_tax_id: TAX_ID,
            directed_g2g_edge: directed,
            g2g_edge_cutoff: cutoff,
            desc_html: "<p>300-node ensemble model</p>".to_string(),
        },
    )
    .unwrap();
    admin::set_participation_type(catalog, PARTICIPATION_TYPE, "Genes beyond 2.5 std").unwrap();
    insert_genes(catalog, organism.id, genes);
}

pub fn insert_genes<C: Catalog>(catalog: &mut C, organism_id: OrganismId, genes: &[&str]) {
    let mut work = catalog.begin_import().unwrap();
    for (idx, name) in genes.iter().enumerate() {
        work.insert_gene(&GeneRecord {
            organism_id,
            entrez_id: Some(880000 + idx as i64),
            systematic_name: name.to_string(),
            standard_name: None,
            description: String::new(),
            aliases: String::new(),
            weight: 0.0,
            obsolete: false,
        })
        .unwrap();
    }
    work.commit().unwrap();
}

pub fn gene_names(count: usize) -> Vec<String> {
    (0..count).map(|idx| format!("PA{idx:04}")).collect()
}
