use crate::catalog::{
    Catalog, GeneRepository, MemoryCatalog, ModelRepository, OrganismRepository,
    ParticipationTypeRepository, SignatureRepository, UnitOfWork,
};
use crate::domain::{GeneRecord, NewMlModel, NewOrganism, Polarity};

pub(crate) const MODEL: &str = "Ensemble ADAGE 300";
pub(crate) const PARTICIPATION_TYPE: &str = "High-weight genes";

/// A catalog with one organism, one model, one participation type, the
/// given genes and a pos/neg signature pair for each node.
pub(crate) fn seeded_catalog(
    genes: &[&str],
    nodes: &[&str],
    directed: bool,
    cutoff: f64,
) -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    let mut work = catalog.begin_import().unwrap();
    let (organism, _) = work
        .upsert_organism(&NewOrganism {
            taxonomy_id: 208964,
            common_name: "Pseudomonas aeruginosa".to_string(),
            scientific_name: "Pseudomonas aeruginosa PAO1".to_string(),
            url_template: None,
        })
        .unwrap();
    let (model, _) = work
        .upsert_model(&NewMlModel {
            title: MODEL.to_string(),
            organism_id: organism.id,
            directed_g2g_edge: directed,
            g2g_edge_cutoff: cutoff,
            desc_html: String::new(),
        })
        .unwrap();
    work.upsert_participation_type(PARTICIPATION_TYPE, "Genes above 2.5 std")
        .unwrap();
    for (idx, name) in genes.iter().enumerate() {
        work.insert_gene(&GeneRecord {
            organism_id: organism.id,
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
    for node in nodes {
        for polarity in [Polarity::Pos, Polarity::Neg] {
            work.insert_signature(&polarity.signature_name(node), model.id)
                .unwrap();
        }
    }
    work.commit().unwrap();
    catalog
}
