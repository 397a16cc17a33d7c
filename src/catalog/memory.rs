use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::catalog::{
    Catalog, CrossRefRepository, EdgeRepository, ExperimentRepository, ExpressionRepository,
    GeneRepository, ModelRepository, OrganismRepository, ParticipationRepository,
    ParticipationTypeRepository, SampleRepository, SignatureRepository, UnitOfWork,
};
use crate::domain::{
    CrossRef, CrossRefDb, CrossRefDbId, Edge, Experiment, ExpressionValue, Gene, GeneId,
    GeneRecord, MlModel, ModelId, NewExperiment, NewMlModel, NewOrganism, Organism, OrganismId,
    Participation, ParticipationType, ParticipationTypeId, Sample, SampleId, Signature,
    SignatureId, Upsert,
};
use crate::error::LoaderError;

#[derive(Debug, Clone, Default)]
struct CatalogState {
    next_id: i64,
    organisms: Vec<Organism>,
    genes: Vec<Gene>,
    models: Vec<MlModel>,
    signatures: Vec<Signature>,
    participation_types: Vec<ParticipationType>,
    participations: BTreeMap<(SignatureId, GeneId, ParticipationTypeId), f64>,
    edges: Vec<Edge>,
    edge_keys: HashSet<(ModelId, GeneId, GeneId)>,
    experiments: BTreeMap<String, Experiment>,
    samples: Vec<Sample>,
    experiment_samples: BTreeSet<(String, SampleId)>,
    annotation_types: Vec<String>,
    /// (sample, annotation type, text) in creation order.
    sample_annotations: Vec<(SampleId, String, String)>,
    expression: BTreeMap<(SampleId, GeneId), f64>,
    crossref_dbs: Vec<CrossRefDb>,
    crossrefs: Vec<CrossRef>,
}

impl CatalogState {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Catalog held entirely in memory. A unit of work stages a copy of the
/// state and swaps it in on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: CatalogState,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge_count(&self) -> usize {
        self.state.edges.len()
    }

    pub fn participation_count(&self) -> usize {
        self.state.participations.len()
    }

    pub fn gene_count(&self) -> usize {
        self.state.genes.len()
    }

    pub fn expression_count(&self) -> usize {
        self.state.expression.len()
    }

    pub fn crossref_count(&self) -> usize {
        self.state.crossrefs.len()
    }
}

impl Catalog for MemoryCatalog {
    type Work<'a> = MemoryWork<'a>;

    fn begin_import(&mut self) -> Result<Self::Work<'_>, LoaderError> {
        let staged = self.state.clone();
        Ok(MemoryWork {
            catalog: self,
            staged,
        })
    }
}

pub struct MemoryWork<'a> {
    catalog: &'a mut MemoryCatalog,
    staged: CatalogState,
}

impl UnitOfWork for MemoryWork<'_> {
    fn commit(self) -> Result<(), LoaderError> {
        self.catalog.state = self.staged;
        Ok(())
    }

    fn rollback(self) -> Result<(), LoaderError> {
        Ok(())
    }
}

impl OrganismRepository for MemoryWork<'_> {
    fn find_organism(&self, taxonomy_id: i64) -> Result<Option<Organism>, LoaderError> {
        Ok(self
            .staged
            .organisms
            .iter()
            .find(|organism| organism.taxonomy_id == taxonomy_id)
            .cloned())
    }

    fn upsert_organism(&mut self, organism: &NewOrganism) -> Result<(Organism, Upsert), LoaderError> {
        let slug = organism.slug();
        if let Some(existing) = self
            .staged
            .organisms
            .iter_mut()
            .find(|existing| existing.taxonomy_id == organism.taxonomy_id)
        {
            existing.common_name = organism.common_name.clone();
            existing.scientific_name = organism.scientific_name.clone();
            existing.slug = slug;
            existing.url_template = organism.url_template.clone();
            return Ok((existing.clone(), Upsert::Updated));
        }
        let created = Organism {
            id: OrganismId(self.staged.allocate()),
            taxonomy_id: organism.taxonomy_id,
            common_name: organism.common_name.clone(),
            scientific_name: organism.scientific_name.clone(),
            slug,
            url_template: organism.url_template.clone(),
        };
        self.staged.organisms.push(created.clone());
        Ok((created, Upsert::Created))
    }
}

impl GeneRepository for MemoryWork<'_> {
    fn find_genes_by_systematic_name(&self, name: &str) -> Result<Vec<Gene>, LoaderError> {
        Ok(self
            .staged
            .genes
            .iter()
            .filter(|gene| gene.systematic_name == name)
            .cloned()
            .collect())
    }

    fn find_organism_genes(
        &self,
        organism_id: OrganismId,
        systematic_name: &str,
    ) -> Result<Vec<Gene>, LoaderError> {
        Ok(self
            .staged
            .genes
            .iter()
            .filter(|gene| gene.organism_id == organism_id && gene.systematic_name == systematic_name)
            .cloned()
            .collect())
    }

    fn find_gene_by_entrez(
        &self,
        organism_id: OrganismId,
        entrez_id: i64,
    ) -> Result<Option<Gene>, LoaderError> {
        Ok(self
            .staged
            .genes
            .iter()
            .find(|gene| gene.organism_id == organism_id && gene.entrez_id == Some(entrez_id))
            .cloned())
    }

    fn organism_entrez_ids(&self, organism_id: OrganismId) -> Result<Vec<i64>, LoaderError> {
        Ok(self
            .staged
            .genes
            .iter()
            .filter(|gene| gene.organism_id == organism_id)
            .filter_map(|gene| gene.entrez_id)
            .collect())
    }

    fn insert_gene(&mut self, gene: &GeneRecord) -> Result<GeneId, LoaderError> {
        if let Some(entrez_id) = gene.entrez_id
            && self.find_gene_by_entrez(gene.organism_id, entrez_id)?.is_some()
        {
            return Err(LoaderError::Database(format!(
                "UNIQUE constraint failed: genes.organism_id, genes.entrez_id ({entrez_id})"
            )));
        }
        let id = GeneId(self.staged.allocate());
        self.staged.genes.push(Gene {
            id,
            organism_id: gene.organism_id,
            entrez_id: gene.entrez_id,
            systematic_name: gene.systematic_name.clone(),
            standard_name: gene.standard_name.clone(),
            description: gene.description.clone(),
            aliases: gene.aliases.clone(),
            weight: gene.weight,
            obsolete: gene.obsolete,
        });
        Ok(id)
    }

    fn update_gene(&mut self, id: GeneId, gene: &GeneRecord) -> Result<(), LoaderError> {
        let existing = self
            .staged
            .genes
            .iter_mut()
            .find(|existing| existing.id == id)
            .ok_or_else(|| LoaderError::Database(format!("gene {id} does not exist")))?;
        existing.systematic_name = gene.systematic_name.clone();
        existing.standard_name = gene.standard_name.clone();
        existing.description = gene.description.clone();
        existing.aliases = gene.aliases.clone();
        existing.weight = gene.weight;
        existing.obsolete = gene.obsolete;
        Ok(())
    }

    fn set_gene_obsolete(&mut self, id: GeneId, obsolete: bool) -> Result<(), LoaderError> {
        let existing = self
            .staged
            .genes
            .iter_mut()
            .find(|existing| existing.id == id)
            .ok_or_else(|| LoaderError::Database(format!("gene {id} does not exist")))?;
        existing.obsolete = obsolete;
        Ok(())
    }
}

impl ModelRepository for MemoryWork<'_> {
    fn find_model(&self, title: &str) -> Result<Option<MlModel>, LoaderError> {
        Ok(self
            .staged
            .models
            .iter()
            .find(|model| model.title == title)
            .cloned())
    }

    fn upsert_model(&mut self, model: &NewMlModel) -> Result<(MlModel, Upsert), LoaderError> {
        if let Some(existing) = self
            .staged
            .models
            .iter_mut()
            .find(|existing| existing.title == model.title)
        {
            existing.organism_id = model.organism_id;
            existing.directed_g2g_edge = model.directed_g2g_edge;
            existing.g2g_edge_cutoff = model.g2g_edge_cutoff;
            existing.desc_html = model.desc_html.clone();
            return Ok((existing.clone(), Upsert::Updated));
        }
        let created = MlModel {
            id: ModelId(self.staged.allocate()),
            title: model.title.clone(),
            organism_id: model.organism_id,
            directed_g2g_edge: model.directed_g2g_edge,
            g2g_edge_cutoff: model.g2g_edge_cutoff,
            desc_html: model.desc_html.clone(),
        };
        self.staged.models.push(created.clone());
        Ok((created, Upsert::Created))
    }
}

impl SignatureRepository for MemoryWork<'_> {
    fn find_signature(&self, name: &str, model: ModelId) -> Result<Option<Signature>, LoaderError> {
        Ok(self
            .staged
            .signatures
            .iter()
            .find(|signature| signature.name == name && signature.model_id == model)
            .cloned())
    }

    fn insert_signature(&mut self, name: &str, model: ModelId) -> Result<Signature, LoaderError> {
        if self.find_signature(name, model)?.is_some() {
            return Err(LoaderError::Database(format!(
                "UNIQUE constraint failed: signatures.name, signatures.model_id ({name})"
            )));
        }
        let signature = Signature {
            id: SignatureId(self.staged.allocate()),
            name: name.to_string(),
            model_id: model,
        };
        self.staged.signatures.push(signature.clone());
        Ok(signature)
    }
}

impl ParticipationTypeRepository for MemoryWork<'_> {
    fn find_participation_type(
        &self,
        name: &str,
    ) -> Result<Option<ParticipationType>, LoaderError> {
        Ok(self
            .staged
            .participation_types
            .iter()
            .find(|kind| kind.name == name)
            .cloned())
    }

    fn upsert_participation_type(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<(ParticipationType, Upsert), LoaderError> {
        if let Some(existing) = self
            .staged
            .participation_types
            .iter_mut()
            .find(|kind| kind.name == name)
        {
            existing.description = description.to_string();
            return Ok((existing.clone(), Upsert::Updated));
        }
        let created = ParticipationType {
            id: ParticipationTypeId(self.staged.allocate()),
            name: name.to_string(),
            description: description.to_string(),
        };
        self.staged.participation_types.push(created.clone());
        Ok((created, Upsert::Created))
    }
}

impl ParticipationRepository for MemoryWork<'_> {
    fn upsert_participation(&mut self, participation: &Participation) -> Result<Upsert, LoaderError> {
        let key = (
            participation.signature_id,
            participation.gene_id,
            participation.participation_type_id,
        );
        let previous = self.staged.participations.insert(key, participation.weight);
        Ok(if previous.is_some() {
            Upsert::Updated
        } else {
            Upsert::Created
        })
    }

    fn participations_for_signature(
        &self,
        signature: &Signature,
    ) -> Result<Vec<Participation>, LoaderError> {
        Ok(self
            .staged
            .participations
            .iter()
            .filter(|((signature_id, _, _), _)| *signature_id == signature.id)
            .map(|(&(signature_id, gene_id, participation_type_id), &weight)| Participation {
                signature_id,
                gene_id,
                participation_type_id,
                weight,
            })
            .collect())
    }
}

impl EdgeRepository for MemoryWork<'_> {
    fn model_has_edges(&self, model: ModelId) -> Result<bool, LoaderError> {
        Ok(self.staged.edges.iter().any(|edge| edge.model_id == model))
    }

    fn edge_exists(&self, model: ModelId, gene1: GeneId, gene2: GeneId) -> Result<bool, LoaderError> {
        Ok(self.staged.edge_keys.contains(&(model, gene1, gene2)))
    }

    fn insert_edges(&mut self, edges: &[Edge]) -> Result<(), LoaderError> {
        for edge in edges {
            if !self
                .staged
                .edge_keys
                .insert((edge.model_id, edge.gene1_id, edge.gene2_id))
            {
                return Err(LoaderError::Database(format!(
                    "UNIQUE constraint failed: edges.model_id, edges.gene1_id, edges.gene2_id ({}, {}, {})",
                    edge.model_id, edge.gene1_id, edge.gene2_id
                )));
            }
            self.staged.edges.push(*edge);
        }
        Ok(())
    }

    fn edges_for_model(&self, model: ModelId) -> Result<Vec<Edge>, LoaderError> {
        Ok(self
            .staged
            .edges
            .iter()
            .filter(|edge| edge.model_id == model)
            .copied()
            .collect())
    }
}

impl ExperimentRepository for MemoryWork<'_> {
    fn find_experiment(&self, accession: &str) -> Result<Option<Experiment>, LoaderError> {
        Ok(self.staged.experiments.get(accession).cloned())
    }

    fn insert_experiment(&mut self, experiment: &NewExperiment) -> Result<(), LoaderError> {
        if self.staged.experiments.contains_key(&experiment.accession) {
            return Err(LoaderError::Database(format!(
                "UNIQUE constraint failed: experiments.accession ({})",
                experiment.accession
            )));
        }
        self.staged.experiments.insert(
            experiment.accession.clone(),
            Experiment {
                accession: experiment.accession.clone(),
                name: experiment.name.clone(),
                description: experiment.description.clone(),
                samples_info: String::new(),
            },
        );
        Ok(())
    }

    fn experiments(&self) -> Result<Vec<Experiment>, LoaderError> {
        Ok(self.staged.experiments.values().cloned().collect())
    }

    fn set_samples_info(&mut self, accession: &str, samples_info: &str) -> Result<(), LoaderError> {
        let experiment = self
            .staged
            .experiments
            .get_mut(accession)
            .ok_or_else(|| LoaderError::Database(format!("experiment {accession} does not exist")))?;
        experiment.samples_info = samples_info.to_string();
        Ok(())
    }
}

impl SampleRepository for MemoryWork<'_> {
    fn find_sample(
        &self,
        name: &str,
        ml_data_source: Option<&str>,
    ) -> Result<Option<Sample>, LoaderError> {
        Ok(self
            .staged
            .samples
            .iter()
            .find(|sample| sample.name == name && sample.ml_data_source.as_deref() == ml_data_source)
            .cloned())
    }

    fn find_sample_by_data_source(
        &self,
        ml_data_source: &str,
    ) -> Result<Option<Sample>, LoaderError> {
        Ok(self
            .staged
            .samples
            .iter()
            .find(|sample| sample.ml_data_source.as_deref() == Some(ml_data_source))
            .cloned())
    }

    fn insert_sample(
        &mut self,
        name: &str,
        ml_data_source: Option<&str>,
    ) -> Result<Sample, LoaderError> {
        if let Some(source) = ml_data_source
            && self.find_sample_by_data_source(source)?.is_some()
        {
            return Err(LoaderError::Database(format!(
                "UNIQUE constraint failed: samples.ml_data_source ({source})"
            )));
        }
        let sample = Sample {
            id: SampleId(self.staged.allocate()),
            name: name.to_string(),
            ml_data_source: ml_data_source.map(str::to_string),
        };
        self.staged.samples.push(sample.clone());
        Ok(sample)
    }

    fn link_sample(&mut self, accession: &str, sample: SampleId) -> Result<(), LoaderError> {
        if !self.staged.experiments.contains_key(accession) {
            return Err(LoaderError::Database(format!(
                "FOREIGN KEY constraint failed: experiment {accession}"
            )));
        }
        self.staged
            .experiment_samples
            .insert((accession.to_string(), sample));
        Ok(())
    }

    fn experiment_samples(&self, accession: &str) -> Result<Vec<Sample>, LoaderError> {
        let mut samples: Vec<Sample> = self
            .staged
            .samples
            .iter()
            .filter(|sample| {
                self.staged
                    .experiment_samples
                    .contains(&(accession.to_string(), sample.id))
            })
            .cloned()
            .collect();
        samples.sort_by_key(|sample| sample.id);
        Ok(samples)
    }

    fn sample_experiments(&self, sample: SampleId) -> Result<Vec<String>, LoaderError> {
        Ok(self
            .staged
            .experiment_samples
            .iter()
            .filter(|(_, linked)| *linked == sample)
            .map(|(accession, _)| accession.clone())
            .collect())
    }

    fn sample_annotations(&self, sample: SampleId) -> Result<Vec<(String, String)>, LoaderError> {
        Ok(self
            .staged
            .sample_annotations
            .iter()
            .filter(|(owner, _, _)| *owner == sample)
            .map(|(_, kind, text)| (kind.clone(), text.clone()))
            .collect())
    }

    fn set_sample_annotation(
        &mut self,
        sample: SampleId,
        annotation_type: &str,
        text: &str,
    ) -> Result<(), LoaderError> {
        if !self.staged.annotation_types.iter().any(|kind| kind == annotation_type) {
            self.staged.annotation_types.push(annotation_type.to_string());
        }
        if let Some(existing) = self
            .staged
            .sample_annotations
            .iter_mut()
            .find(|(owner, kind, _)| *owner == sample && kind == annotation_type)
        {
            existing.2 = text.to_string();
            return Ok(());
        }
        self.staged
            .sample_annotations
            .push((sample, annotation_type.to_string(), text.to_string()));
        Ok(())
    }
}

impl ExpressionRepository for MemoryWork<'_> {
    fn insert_expression_values(&mut self, values: &[ExpressionValue]) -> Result<(), LoaderError> {
        for value in values {
            let key = (value.sample_id, value.gene_id);
            if self.staged.expression.contains_key(&key) {
                return Err(LoaderError::Database(format!(
                    "UNIQUE constraint failed: expression_values.sample_id, expression_values.gene_id ({}, {})",
                    value.sample_id, value.gene_id
                )));
            }
            self.staged.expression.insert(key, value.value);
        }
        Ok(())
    }

    fn expression_values_for_gene(&self, gene: GeneId) -> Result<Vec<ExpressionValue>, LoaderError> {
        Ok(self
            .staged
            .expression
            .iter()
            .filter(|((_, gene_id), _)| *gene_id == gene)
            .map(|(&(sample_id, gene_id), &value)| ExpressionValue {
                sample_id,
                gene_id,
                value,
            })
            .collect())
    }
}

impl CrossRefRepository for MemoryWork<'_> {
    fn find_crossref_db(&self, name: &str) -> Result<Option<CrossRefDb>, LoaderError> {
        Ok(self
            .staged
            .crossref_dbs
            .iter()
            .find(|db| db.name == name)
            .cloned())
    }

    fn upsert_crossref_db(
        &mut self,
        name: &str,
        url: &str,
    ) -> Result<(CrossRefDb, Upsert), LoaderError> {
        if let Some(existing) = self.staged.crossref_dbs.iter_mut().find(|db| db.name == name) {
            existing.url = url.to_string();
            return Ok((existing.clone(), Upsert::Updated));
        }
        let created = CrossRefDb {
            id: CrossRefDbId(self.staged.allocate()),
            name: name.to_string(),
            url: url.to_string(),
        };
        self.staged.crossref_dbs.push(created.clone());
        Ok((created, Upsert::Created))
    }

    fn add_crossref(&mut self, crossref: &CrossRef) -> Result<bool, LoaderError> {
        if self.staged.crossrefs.contains(crossref) {
            return Ok(false);
        }
        self.staged.crossrefs.push(crossref.clone());
        Ok(true)
    }

    fn crossrefs_for_gene(&self, gene: GeneId) -> Result<Vec<CrossRef>, LoaderError> {
        Ok(self
            .staged
            .crossrefs
            .iter()
            .filter(|crossref| crossref.gene_id == gene)
            .cloned()
            .collect())
    }
}
