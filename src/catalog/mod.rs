//! Catalog access for the importers.
//!
//! Each import runs inside one [`UnitOfWork`] obtained from
//! [`Catalog::begin_import`]. Nothing written through the unit is visible
//! outside it until [`UnitOfWork::commit`]; dropping the unit, or calling
//! [`UnitOfWork::rollback`], discards every write.

mod memory;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::{MemoryCatalog, MemoryWork};
pub use sqlite::{SqliteCatalog, SqliteWork};

use crate::domain::{
    CrossRef, CrossRefDb, Edge, Experiment, ExpressionValue, Gene, GeneId, GeneRecord, MlModel,
    ModelId, NewExperiment, NewMlModel, NewOrganism, Organism, OrganismId, Participation,
    ParticipationType, Sample, SampleId, Signature, Upsert,
};
use crate::error::LoaderError;

pub trait OrganismRepository {
    fn find_organism(&self, taxonomy_id: i64) -> Result<Option<Organism>, LoaderError>;
    fn upsert_organism(&mut self, organism: &NewOrganism) -> Result<(Organism, Upsert), LoaderError>;
}

pub trait GeneRepository {
    /// Every gene whose systematic name matches exactly, across organisms.
    fn find_genes_by_systematic_name(&self, name: &str) -> Result<Vec<Gene>, LoaderError>;
    /// Matches by systematic name within one organism.
    fn find_organism_genes(
        &self,
        organism_id: OrganismId,
        systematic_name: &str,
    ) -> Result<Vec<Gene>, LoaderError>;
    fn find_gene_by_entrez(
        &self,
        organism_id: OrganismId,
        entrez_id: i64,
    ) -> Result<Option<Gene>, LoaderError>;
    fn organism_entrez_ids(&self, organism_id: OrganismId) -> Result<Vec<i64>, LoaderError>;
    fn insert_gene(&mut self, gene: &GeneRecord) -> Result<GeneId, LoaderError>;
    fn update_gene(&mut self, id: GeneId, gene: &GeneRecord) -> Result<(), LoaderError>;
    fn set_gene_obsolete(&mut self, id: GeneId, obsolete: bool) -> Result<(), LoaderError>;
}

pub trait ModelRepository {
    fn find_model(&self, title: &str) -> Result<Option<MlModel>, LoaderError>;
    fn upsert_model(&mut self, model: &NewMlModel) -> Result<(MlModel, Upsert), LoaderError>;
}

pub trait SignatureRepository {
    fn find_signature(&self, name: &str, model: ModelId) -> Result<Option<Signature>, LoaderError>;
    fn insert_signature(&mut self, name: &str, model: ModelId) -> Result<Signature, LoaderError>;
}

pub trait ParticipationTypeRepository {
    fn find_participation_type(&self, name: &str)
    -> Result<Option<ParticipationType>, LoaderError>;
    fn upsert_participation_type(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<(ParticipationType, Upsert), LoaderError>;
}

pub trait ParticipationRepository {
    /// Creates the participation or overwrites the weight of the existing
    /// (signature, gene, participation type) row.
    fn upsert_participation(&mut self, participation: &Participation) -> Result<Upsert, LoaderError>;
    fn participations_for_signature(
        &self,
        signature: &Signature,
    ) -> Result<Vec<Participation>, LoaderError>;
}

pub trait EdgeRepository {
    fn model_has_edges(&self, model: ModelId) -> Result<bool, LoaderError>;
    /// Ordered lookup of (model, gene1, gene2).
    fn edge_exists(&self, model: ModelId, gene1: GeneId, gene2: GeneId) -> Result<bool, LoaderError>;
    fn insert_edges(&mut self, edges: &[Edge]) -> Result<(), LoaderError>;
    fn edges_for_model(&self, model: ModelId) -> Result<Vec<Edge>, LoaderError>;
}

pub trait ExperimentRepository {
    fn find_experiment(&self, accession: &str) -> Result<Option<Experiment>, LoaderError>;
    /// Fails when the accession is already stored.
    fn insert_experiment(&mut self, experiment: &NewExperiment) -> Result<(), LoaderError>;
    /// Every experiment, ordered by accession.
    fn experiments(&self) -> Result<Vec<Experiment>, LoaderError>;
    fn set_samples_info(&mut self, accession: &str, samples_info: &str) -> Result<(), LoaderError>;
}

pub trait SampleRepository {
    fn find_sample(
        &self,
        name: &str,
        ml_data_source: Option<&str>,
    ) -> Result<Option<Sample>, LoaderError>;
    fn find_sample_by_data_source(&self, ml_data_source: &str)
    -> Result<Option<Sample>, LoaderError>;
    fn insert_sample(&mut self, name: &str, ml_data_source: Option<&str>)
    -> Result<Sample, LoaderError>;
    /// Adds the sample to the experiment. Linking twice is a no-op.
    fn link_sample(&mut self, accession: &str, sample: SampleId) -> Result<(), LoaderError>;
    /// Samples of one experiment, ordered by id.
    fn experiment_samples(&self, accession: &str) -> Result<Vec<Sample>, LoaderError>;
    /// Accessions of every experiment holding the sample, sorted.
    fn sample_experiments(&self, sample: SampleId) -> Result<Vec<String>, LoaderError>;
    /// (annotation type, text) pairs in the order they were first set.
    fn sample_annotations(&self, sample: SampleId) -> Result<Vec<(String, String)>, LoaderError>;
    /// Creates the annotation type on first use and replaces any earlier
    /// text for the same type.
    fn set_sample_annotation(
        &mut self,
        sample: SampleId,
        annotation_type: &str,
        text: &str,
    ) -> Result<(), LoaderError>;
}

pub trait ExpressionRepository {
    /// Fails when a (sample, gene) pair is already stored.
    fn insert_expression_values(&mut self, values: &[ExpressionValue]) -> Result<(), LoaderError>;
    fn expression_values_for_gene(&self, gene: GeneId) -> Result<Vec<ExpressionValue>, LoaderError>;
}

pub trait CrossRefRepository {
    fn find_crossref_db(&self, name: &str) -> Result<Option<CrossRefDb>, LoaderError>;
    fn upsert_crossref_db(&mut self, name: &str, url: &str)
    -> Result<(CrossRefDb, Upsert), LoaderError>;
    /// Returns `false` when the reference was already stored.
    fn add_crossref(&mut self, crossref: &CrossRef) -> Result<bool, LoaderError>;
    fn crossrefs_for_gene(&self, gene: GeneId) -> Result<Vec<CrossRef>, LoaderError>;
}

pub trait UnitOfWork:
    OrganismRepository
    + GeneRepository
    + ModelRepository
    + SignatureRepository
    + ParticipationTypeRepository
    + ParticipationRepository
    + EdgeRepository
    + ExperimentRepository
    + SampleRepository
    + ExpressionRepository
    + CrossRefRepository
{
    fn commit(self) -> Result<(), LoaderError>;
    fn rollback(self) -> Result<(), LoaderError>;
}

pub trait Catalog {
    type Work<'a>: UnitOfWork
    where
        Self: 'a;

    fn begin_import(&mut self) -> Result<Self::Work<'_>, LoaderError>;
}

/// Resolves a systematic name to exactly one gene.
pub fn resolve_gene<R: GeneRepository + ?Sized>(repo: &R, name: &str) -> Result<Gene, LoaderError> {
    let mut genes = repo.find_genes_by_systematic_name(name)?;
    match genes.len() {
        0 => Err(LoaderError::GeneNotFound(name.to_string())),
        1 => Ok(genes.remove(0)),
        count => Err(LoaderError::AmbiguousGene {
            name: name.to_string(),
            count,
        }),
    }
}
