//! SQLite-backed catalog.

use camino::Utf8Path;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};

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

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS organisms (
        id INTEGER PRIMARY KEY,
        taxonomy_id INTEGER NOT NULL UNIQUE,
        common_name TEXT NOT NULL,
        scientific_name TEXT NOT NULL,
        slug TEXT NOT NULL,
        url_template TEXT
    );

    CREATE TABLE IF NOT EXISTS genes (
        id INTEGER PRIMARY KEY,
        organism_id INTEGER NOT NULL REFERENCES organisms(id),
        entrez_id INTEGER,
        systematic_name TEXT NOT NULL,
        standard_name TEXT,
        description TEXT NOT NULL DEFAULT '',
        aliases TEXT NOT NULL DEFAULT '',
        weight REAL NOT NULL DEFAULT 1.0,
        obsolete INTEGER NOT NULL DEFAULT 0,
        UNIQUE (organism_id, entrez_id)
    );
    CREATE INDEX IF NOT EXISTS idx_genes_systematic_name ON genes(systematic_name);

    CREATE TABLE IF NOT EXISTS ml_models (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL UNIQUE,
        organism_id INTEGER NOT NULL REFERENCES organisms(id),
        directed_g2g_edge INTEGER NOT NULL DEFAULT 0,
        g2g_edge_cutoff REAL NOT NULL DEFAULT 0.0,
        desc_html TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS signatures (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        model_id INTEGER NOT NULL REFERENCES ml_models(id),
        UNIQUE (name, model_id)
    );

    CREATE TABLE IF NOT EXISTS participation_types (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS participations (
        signature_id INTEGER NOT NULL REFERENCES signatures(id),
        gene_id INTEGER NOT NULL REFERENCES genes(id),
        participation_type_id INTEGER NOT NULL REFERENCES participation_types(id),
        weight REAL NOT NULL,
        PRIMARY KEY (signature_id, gene_id, participation_type_id)
    );

    CREATE TABLE IF NOT EXISTS edges (
        id INTEGER PRIMARY KEY,
        model_id INTEGER NOT NULL REFERENCES ml_models(id),
        gene1_id INTEGER NOT NULL REFERENCES genes(id),
        gene2_id INTEGER NOT NULL REFERENCES genes(id),
        weight REAL NOT NULL,
        UNIQUE (model_id, gene1_id, gene2_id)
    );

    CREATE TABLE IF NOT EXISTS experiments (
        accession TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        samples_info TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS samples (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        ml_data_source TEXT UNIQUE
    );

    CREATE TABLE IF NOT EXISTS experiment_samples (
        experiment TEXT NOT NULL REFERENCES experiments(accession),
        sample_id INTEGER NOT NULL REFERENCES samples(id),
        PRIMARY KEY (experiment, sample_id)
    );

    CREATE TABLE IF NOT EXISTS annotation_types (
        id INTEGER PRIMARY KEY,
        typename TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS sample_annotations (
        id INTEGER PRIMARY KEY,
        annotation_type_id INTEGER NOT NULL REFERENCES annotation_types(id),
        sample_id INTEGER NOT NULL REFERENCES samples(id),
        text TEXT NOT NULL DEFAULT '',
        UNIQUE (annotation_type_id, sample_id)
    );

    CREATE TABLE IF NOT EXISTS expression_values (
        sample_id INTEGER NOT NULL REFERENCES samples(id),
        gene_id INTEGER NOT NULL REFERENCES genes(id),
        value REAL NOT NULL,
        PRIMARY KEY (sample_id, gene_id)
    );

    CREATE TABLE IF NOT EXISTS crossref_dbs (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        url TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS crossrefs (
        id INTEGER PRIMARY KEY,
        crossref_db_id INTEGER NOT NULL REFERENCES crossref_dbs(id),
        xrid TEXT NOT NULL,
        gene_id INTEGER NOT NULL REFERENCES genes(id),
        UNIQUE (crossref_db_id, xrid, gene_id)
    );
"#;

pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    pub fn open(path: &Utf8Path) -> Result<Self, LoaderError> {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                std::fs::create_dir_all(parent.as_std_path())
                    .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
            }
        }
        let conn = Connection::open(path.as_std_path())?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, LoaderError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), LoaderError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

impl Catalog for SqliteCatalog {
    type Work<'a> = SqliteWork<'a>;

    fn begin_import(&mut self) -> Result<Self::Work<'_>, LoaderError> {
        let tx = self.conn.transaction()?;
        Ok(SqliteWork { tx })
    }
}

/// A catalog transaction. Dropping it without `commit` rolls back.
pub struct SqliteWork<'a> {
    tx: Transaction<'a>,
}

impl UnitOfWork for SqliteWork<'_> {
    fn commit(self) -> Result<(), LoaderError> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> Result<(), LoaderError> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn row_to_organism(row: &Row<'_>) -> rusqlite::Result<Organism> {
    Ok(Organism {
        id: OrganismId(row.get(0)?),
        taxonomy_id: row.get(1)?,
        common_name: row.get(2)?,
        scientific_name: row.get(3)?,
        slug: row.get(4)?,
        url_template: row.get(5)?,
    })
}

const GENE_COLUMNS: &str = "id, organism_id, entrez_id, systematic_name, standard_name, description, aliases, weight, obsolete";

fn row_to_gene(row: &Row<'_>) -> rusqlite::Result<Gene> {
    Ok(Gene {
        id: GeneId(row.get(0)?),
        organism_id: OrganismId(row.get(1)?),
        entrez_id: row.get(2)?,
        systematic_name: row.get(3)?,
        standard_name: row.get(4)?,
        description: row.get(5)?,
        aliases: row.get(6)?,
        weight: row.get(7)?,
        obsolete: row.get(8)?,
    })
}

fn row_to_model(row: &Row<'_>) -> rusqlite::Result<MlModel> {
    Ok(MlModel {
        id: ModelId(row.get(0)?),
        title: row.get(1)?,
        organism_id: OrganismId(row.get(2)?),
        directed_g2g_edge: row.get(3)?,
        g2g_edge_cutoff: row.get(4)?,
        desc_html: row.get(5)?,
    })
}

impl OrganismRepository for SqliteWork<'_> {
    fn find_organism(&self, taxonomy_id: i64) -> Result<Option<Organism>, LoaderError> {
        let organism = self
            .tx
            .query_row(
                "SELECT id, taxonomy_id, common_name, scientific_name, slug, url_template
                 FROM organisms WHERE taxonomy_id = ?1",
                params![taxonomy_id],
                row_to_organism,
            )
            .optional()?;
        Ok(organism)
    }

    fn upsert_organism(&mut self, organism: &NewOrganism) -> Result<(Organism, Upsert), LoaderError> {
        let slug = organism.slug();
        let action = if self.find_organism(organism.taxonomy_id)?.is_some() {
            self.tx.execute(
                "UPDATE organisms SET common_name = ?2, scientific_name = ?3, slug = ?4, url_template = ?5
                 WHERE taxonomy_id = ?1",
                params![
                    organism.taxonomy_id,
                    organism.common_name,
                    organism.scientific_name,
                    slug,
                    organism.url_template,
                ],
            )?;
            Upsert::Updated
        } else {
            self.tx.execute(
                "INSERT INTO organisms (taxonomy_id, common_name, scientific_name, slug, url_template)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    organism.taxonomy_id,
                    organism.common_name,
                    organism.scientific_name,
                    slug,
                    organism.url_template,
                ],
            )?;
            Upsert::Created
        };
        let stored = self.find_organism(organism.taxonomy_id)?.ok_or_else(|| {
            LoaderError::Database(format!("organism {} vanished after write", organism.taxonomy_id))
        })?;
        Ok((stored, action))
    }
}

impl GeneRepository for SqliteWork<'_> {
    fn find_genes_by_systematic_name(&self, name: &str) -> Result<Vec<Gene>, LoaderError> {
        let mut stmt = self
            .tx
            .prepare_cached(&format!("SELECT {GENE_COLUMNS} FROM genes WHERE systematic_name = ?1"))?;
        let genes = stmt
            .query_map(params![name], row_to_gene)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genes)
    }

    fn find_organism_genes(
        &self,
        organism_id: OrganismId,
        systematic_name: &str,
    ) -> Result<Vec<Gene>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(&format!(
            "SELECT {GENE_COLUMNS} FROM genes WHERE organism_id = ?1 AND systematic_name = ?2"
        ))?;
        let genes = stmt
            .query_map(params![organism_id.0, systematic_name], row_to_gene)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(genes)
    }

    fn find_gene_by_entrez(
        &self,
        organism_id: OrganismId,
        entrez_id: i64,
    ) -> Result<Option<Gene>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(&format!(
            "SELECT {GENE_COLUMNS} FROM genes WHERE organism_id = ?1 AND entrez_id = ?2"
        ))?;
        let gene = stmt
            .query_row(params![organism_id.0, entrez_id], row_to_gene)
            .optional()?;
        Ok(gene)
    }

    fn organism_entrez_ids(&self, organism_id: OrganismId) -> Result<Vec<i64>, LoaderError> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT entrez_id FROM genes WHERE organism_id = ?1 AND entrez_id IS NOT NULL")?;
        let ids = stmt
            .query_map(params![organism_id.0], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn insert_gene(&mut self, gene: &GeneRecord) -> Result<GeneId, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO genes (organism_id, entrez_id, systematic_name, standard_name, description, aliases, weight, obsolete)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        stmt.execute(params![
            gene.organism_id.0,
            gene.entrez_id,
            gene.systematic_name,
            gene.standard_name,
            gene.description,
            gene.aliases,
            gene.weight,
            gene.obsolete,
        ])?;
        Ok(GeneId(self.tx.last_insert_rowid()))
    }

    fn update_gene(&mut self, id: GeneId, gene: &GeneRecord) -> Result<(), LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "UPDATE genes SET systematic_name = ?2, standard_name = ?3, description = ?4,
                              aliases = ?5, weight = ?6, obsolete = ?7
             WHERE id = ?1",
        )?;
        stmt.execute(params![
            id.0,
            gene.systematic_name,
            gene.standard_name,
            gene.description,
            gene.aliases,
            gene.weight,
            gene.obsolete,
        ])?;
        Ok(())
    }

    fn set_gene_obsolete(&mut self, id: GeneId, obsolete: bool) -> Result<(), LoaderError> {
        self.tx.execute(
            "UPDATE genes SET obsolete = ?2 WHERE id = ?1",
            params![id.0, obsolete],
        )?;
        Ok(())
    }
}

impl ModelRepository for SqliteWork<'_> {
    fn find_model(&self, title: &str) -> Result<Option<MlModel>, LoaderError> {
        let model = self
            .tx
            .query_row(
                "SELECT id, title, organism_id, directed_g2g_edge, g2g_edge_cutoff, desc_html
                 FROM ml_models WHERE title = ?1",
                params![title],
                row_to_model,
            )
            .optional()?;
        Ok(model)
    }

    fn upsert_model(&mut self, model: &NewMlModel) -> Result<(MlModel, Upsert), LoaderError> {
        let action = if self.find_model(&model.title)?.is_some() {
            self.tx.execute(
                "UPDATE ml_models SET organism_id = ?2, directed_g2g_edge = ?3, g2g_edge_cutoff = ?4, desc_html = ?5
                 WHERE title = ?1",
                params![
                    model.title,
                    model.organism_id.0,
                    model.directed_g2g_edge,
                    model.g2g_edge_cutoff,
                    model.desc_html,
                ],
            )?;
            Upsert::Updated
        } else {
            self.tx.execute(
                "INSERT INTO ml_models (title, organism_id, directed_g2g_edge, g2g_edge_cutoff, desc_html)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    model.title,
                    model.organism_id.0,
                    model.directed_g2g_edge,
                    model.g2g_edge_cutoff,
                    model.desc_html,
                ],
            )?;
            Upsert::Created
        };
        let stored = self
            .find_model(&model.title)?
            .ok_or_else(|| LoaderError::Database(format!("model {} vanished after write", model.title)))?;
        Ok((stored, action))
    }
}

impl SignatureRepository for SqliteWork<'_> {
    fn find_signature(&self, name: &str, model: ModelId) -> Result<Option<Signature>, LoaderError> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT id, name, model_id FROM signatures WHERE name = ?1 AND model_id = ?2")?;
        let signature = stmt
            .query_row(params![name, model.0], |row| {
                Ok(Signature {
                    id: SignatureId(row.get(0)?),
                    name: row.get(1)?,
                    model_id: ModelId(row.get(2)?),
                })
            })
            .optional()?;
        Ok(signature)
    }

    fn insert_signature(&mut self, name: &str, model: ModelId) -> Result<Signature, LoaderError> {
        self.tx.execute(
            "INSERT INTO signatures (name, model_id) VALUES (?1, ?2)",
            params![name, model.0],
        )?;
        Ok(Signature {
            id: SignatureId(self.tx.last_insert_rowid()),
            name: name.to_string(),
            model_id: model,
        })
    }
}

impl ParticipationTypeRepository for SqliteWork<'_> {
    fn find_participation_type(
        &self,
        name: &str,
    ) -> Result<Option<ParticipationType>, LoaderError> {
        let kind = self
            .tx
            .query_row(
                "SELECT id, name, description FROM participation_types WHERE name = ?1",
                params![name],
                |row| {
                    Ok(ParticipationType {
                        id: ParticipationTypeId(row.get(0)?),
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(kind)
    }

    fn upsert_participation_type(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<(ParticipationType, Upsert), LoaderError> {
        let action = if self.find_participation_type(name)?.is_some() {
            self.tx.execute(
                "UPDATE participation_types SET description = ?2 WHERE name = ?1",
                params![name, description],
            )?;
            Upsert::Updated
        } else {
            self.tx.execute(
                "INSERT INTO participation_types (name, description) VALUES (?1, ?2)",
                params![name, description],
            )?;
            Upsert::Created
        };
        let stored = self.find_participation_type(name)?.ok_or_else(|| {
            LoaderError::Database(format!("participation type {name} vanished after write"))
        })?;
        Ok((stored, action))
    }
}

impl ParticipationRepository for SqliteWork<'_> {
    fn upsert_participation(&mut self, participation: &Participation) -> Result<Upsert, LoaderError> {
        let updated = self
            .tx
            .prepare_cached(
                "UPDATE participations SET weight = ?4
                 WHERE signature_id = ?1 AND gene_id = ?2 AND participation_type_id = ?3",
            )?
            .execute(params![
                participation.signature_id.0,
                participation.gene_id.0,
                participation.participation_type_id.0,
                participation.weight,
            ])?;
        if updated > 0 {
            return Ok(Upsert::Updated);
        }
        self.tx
            .prepare_cached(
                "INSERT INTO participations (signature_id, gene_id, participation_type_id, weight)
                 VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![
                participation.signature_id.0,
                participation.gene_id.0,
                participation.participation_type_id.0,
                participation.weight,
            ])?;
        Ok(Upsert::Created)
    }

    fn participations_for_signature(
        &self,
        signature: &Signature,
    ) -> Result<Vec<Participation>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT signature_id, gene_id, participation_type_id, weight
             FROM participations WHERE signature_id = ?1 ORDER BY gene_id",
        )?;
        let rows = stmt
            .query_map(params![signature.id.0], |row| {
                Ok(Participation {
                    signature_id: SignatureId(row.get(0)?),
                    gene_id: GeneId(row.get(1)?),
                    participation_type_id: ParticipationTypeId(row.get(2)?),
                    weight: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl EdgeRepository for SqliteWork<'_> {
    fn model_has_edges(&self, model: ModelId) -> Result<bool, LoaderError> {
        let exists: bool = self.tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM edges WHERE model_id = ?1)",
            params![model.0],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn edge_exists(&self, model: ModelId, gene1: GeneId, gene2: GeneId) -> Result<bool, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT EXISTS(SELECT 1 FROM edges WHERE model_id = ?1 AND gene1_id = ?2 AND gene2_id = ?3)",
        )?;
        let exists: bool = stmt.query_row(params![model.0, gene1.0, gene2.0], |row| row.get(0))?;
        Ok(exists)
    }

    fn insert_edges(&mut self, edges: &[Edge]) -> Result<(), LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO edges (model_id, gene1_id, gene2_id, weight) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for edge in edges {
            stmt.execute(params![
                edge.model_id.0,
                edge.gene1_id.0,
                edge.gene2_id.0,
                edge.weight
            ])?;
        }
        Ok(())
    }

    fn edges_for_model(&self, model: ModelId) -> Result<Vec<Edge>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT model_id, gene1_id, gene2_id, weight FROM edges WHERE model_id = ?1 ORDER BY id",
        )?;
        let edges = stmt
            .query_map(params![model.0], |row| {
                Ok(Edge {
                    model_id: ModelId(row.get(0)?),
                    gene1_id: GeneId(row.get(1)?),
                    gene2_id: GeneId(row.get(2)?),
                    weight: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }
}

fn row_to_experiment(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        accession: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        samples_info: row.get(3)?,
    })
}

fn row_to_sample(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: SampleId(row.get(0)?),
        name: row.get(1)?,
        ml_data_source: row.get(2)?,
    })
}

fn row_to_crossref_db(row: &Row<'_>) -> rusqlite::Result<CrossRefDb> {
    Ok(CrossRefDb {
        id: CrossRefDbId(row.get(0)?),
        name: row.get(1)?,
        url: row.get(2)?,
    })
}

impl ExperimentRepository for SqliteWork<'_> {
    fn find_experiment(&self, accession: &str) -> Result<Option<Experiment>, LoaderError> {
        let experiment = self
            .tx
            .query_row(
                "SELECT accession, name, description, samples_info FROM experiments WHERE accession = ?1",
                params![accession],
                row_to_experiment,
            )
            .optional()?;
        Ok(experiment)
    }

    fn insert_experiment(&mut self, experiment: &NewExperiment) -> Result<(), LoaderError> {
        self.tx.execute(
            "INSERT INTO experiments (accession, name, description) VALUES (?1, ?2, ?3)",
            params![experiment.accession, experiment.name, experiment.description],
        )?;
        Ok(())
    }

    fn experiments(&self) -> Result<Vec<Experiment>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT accession, name, description, samples_info FROM experiments ORDER BY accession",
        )?;
        let experiments = stmt
            .query_map([], row_to_experiment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(experiments)
    }

    fn set_samples_info(&mut self, accession: &str, samples_info: &str) -> Result<(), LoaderError> {
        self.tx.execute(
            "UPDATE experiments SET samples_info = ?2 WHERE accession = ?1",
            params![accession, samples_info],
        )?;
        Ok(())
    }
}

impl SampleRepository for SqliteWork<'_> {
    fn find_sample(
        &self,
        name: &str,
        ml_data_source: Option<&str>,
    ) -> Result<Option<Sample>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT id, name, ml_data_source FROM samples WHERE name = ?1 AND ml_data_source IS ?2",
        )?;
        let sample = stmt
            .query_row(params![name, ml_data_source], row_to_sample)
            .optional()?;
        Ok(sample)
    }

    fn find_sample_by_data_source(
        &self,
        ml_data_source: &str,
    ) -> Result<Option<Sample>, LoaderError> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT id, name, ml_data_source FROM samples WHERE ml_data_source = ?1")?;
        let sample = stmt
            .query_row(params![ml_data_source], row_to_sample)
            .optional()?;
        Ok(sample)
    }

    fn insert_sample(
        &mut self,
        name: &str,
        ml_data_source: Option<&str>,
    ) -> Result<Sample, LoaderError> {
        self.tx
            .prepare_cached("INSERT INTO samples (name, ml_data_source) VALUES (?1, ?2)")?
            .execute(params![name, ml_data_source])?;
        Ok(Sample {
            id: SampleId(self.tx.last_insert_rowid()),
            name: name.to_string(),
            ml_data_source: ml_data_source.map(str::to_string),
        })
    }

    fn link_sample(&mut self, accession: &str, sample: SampleId) -> Result<(), LoaderError> {
        self.tx
            .prepare_cached(
                "INSERT OR IGNORE INTO experiment_samples (experiment, sample_id) VALUES (?1, ?2)",
            )?
            .execute(params![accession, sample.0])?;
        Ok(())
    }

    fn experiment_samples(&self, accession: &str) -> Result<Vec<Sample>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT s.id, s.name, s.ml_data_source
             FROM samples s JOIN experiment_samples es ON es.sample_id = s.id
             WHERE es.experiment = ?1 ORDER BY s.id",
        )?;
        let samples = stmt
            .query_map(params![accession], row_to_sample)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    fn sample_experiments(&self, sample: SampleId) -> Result<Vec<String>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT experiment FROM experiment_samples WHERE sample_id = ?1 ORDER BY experiment",
        )?;
        let accessions = stmt
            .query_map(params![sample.0], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(accessions)
    }

    fn sample_annotations(&self, sample: SampleId) -> Result<Vec<(String, String)>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT t.typename, a.text
             FROM sample_annotations a JOIN annotation_types t ON t.id = a.annotation_type_id
             WHERE a.sample_id = ?1 ORDER BY a.id",
        )?;
        let annotations = stmt
            .query_map(params![sample.0], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(annotations)
    }

    fn set_sample_annotation(
        &mut self,
        sample: SampleId,
        annotation_type: &str,
        text: &str,
    ) -> Result<(), LoaderError> {
        self.tx
            .prepare_cached("INSERT OR IGNORE INTO annotation_types (typename) VALUES (?1)")?
            .execute(params![annotation_type])?;
        self.tx
            .prepare_cached(
                "INSERT INTO sample_annotations (annotation_type_id, sample_id, text)
                 SELECT id, ?2, ?3 FROM annotation_types WHERE typename = ?1
                 ON CONFLICT (annotation_type_id, sample_id) DO UPDATE SET text = excluded.text",
            )?
            .execute(params![annotation_type, sample.0, text])?;
        Ok(())
    }
}

impl ExpressionRepository for SqliteWork<'_> {
    fn insert_expression_values(&mut self, values: &[ExpressionValue]) -> Result<(), LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO expression_values (sample_id, gene_id, value) VALUES (?1, ?2, ?3)",
        )?;
        for value in values {
            stmt.execute(params![value.sample_id.0, value.gene_id.0, value.value])?;
        }
        Ok(())
    }

    fn expression_values_for_gene(&self, gene: GeneId) -> Result<Vec<ExpressionValue>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT sample_id, gene_id, value FROM expression_values WHERE gene_id = ?1 ORDER BY sample_id",
        )?;
        let values = stmt
            .query_map(params![gene.0], |row| {
                Ok(ExpressionValue {
                    sample_id: SampleId(row.get(0)?),
                    gene_id: GeneId(row.get(1)?),
                    value: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

impl CrossRefRepository for SqliteWork<'_> {
    fn find_crossref_db(&self, name: &str) -> Result<Option<CrossRefDb>, LoaderError> {
        let db = self
            .tx
            .query_row(
                "SELECT id, name, url FROM crossref_dbs WHERE name = ?1",
                params![name],
                row_to_crossref_db,
            )
            .optional()?;
        Ok(db)
    }

    fn upsert_crossref_db(
        &mut self,
        name: &str,
        url: &str,
    ) -> Result<(CrossRefDb, Upsert), LoaderError> {
        let action = if self.find_crossref_db(name)?.is_some() {
            self.tx.execute(
                "UPDATE crossref_dbs SET url = ?2 WHERE name = ?1",
                params![name, url],
            )?;
            Upsert::Updated
        } else {
            self.tx.execute(
                "INSERT INTO crossref_dbs (name, url) VALUES (?1, ?2)",
                params![name, url],
            )?;
            Upsert::Created
        };
        let stored = self.find_crossref_db(name)?.ok_or_else(|| {
            LoaderError::Database(format!("cross-reference database {name} vanished after write"))
        })?;
        Ok((stored, action))
    }

    fn add_crossref(&mut self, crossref: &CrossRef) -> Result<bool, LoaderError> {
        let inserted = self
            .tx
            .prepare_cached(
                "INSERT OR IGNORE INTO crossrefs (crossref_db_id, xrid, gene_id) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![crossref.crossref_db_id.0, crossref.xrid, crossref.gene_id.0])?;
        Ok(inserted > 0)
    }

    fn crossrefs_for_gene(&self, gene: GeneId) -> Result<Vec<CrossRef>, LoaderError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT crossref_db_id, xrid, gene_id FROM crossrefs WHERE gene_id = ?1 ORDER BY id",
        )?;
        let crossrefs = stmt
            .query_map(params![gene.0], |row| {
                Ok(CrossRef {
                    crossref_db_id: CrossRefDbId(row.get(0)?),
                    xrid: row.get(1)?,
                    gene_id: GeneId(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(crossrefs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteCatalog {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();
        let mut work = catalog.begin_import().unwrap();
        let (organism, _) = work
            .upsert_organism(&NewOrganism {
                taxonomy_id: 208964,
                common_name: "Pseudomonas aeruginosa".to_string(),
                scientific_name: "Pseudomonas aeruginosa PAO1".to_string(),
                url_template: None,
            })
            .unwrap();
        work.insert_gene(&GeneRecord {
            organism_id: organism.id,
            entrez_id: Some(878417),
            systematic_name: "PA0001".to_string(),
            standard_name: Some("dnaA".to_string()),
            description: String::new(),
            aliases: String::new(),
            weight: 1.0,
            obsolete: false,
        })
        .unwrap();
        work.commit().unwrap();
        catalog
    }

    #[test]
    fn dropped_work_rolls_back() {
        let mut catalog = seeded();
        {
            let mut work = catalog.begin_import().unwrap();
            work.upsert_participation_type("High-weight genes", "heavy genes")
                .unwrap();
        }
        let work = catalog.begin_import().unwrap();
        assert!(
            work.find_participation_type("High-weight genes")
                .unwrap()
                .is_none()
        );
        assert_eq!(work.find_genes_by_systematic_name("PA0001").unwrap().len(), 1);
    }

    #[test]
    fn organism_upsert_reports_action() {
        let mut catalog = seeded();
        let mut work = catalog.begin_import().unwrap();
        let (organism, action) = work
            .upsert_organism(&NewOrganism {
                taxonomy_id: 208964,
                common_name: "P. aeruginosa".to_string(),
                scientific_name: "Pseudomonas aeruginosa".to_string(),
                url_template: Some("https://pseudomonas.com/<systematic_name>".to_string()),
            })
            .unwrap();
        assert_eq!(action, Upsert::Updated);
        assert_eq!(organism.slug, "pseudomonas-aeruginosa");
    }

    #[test]
    fn duplicate_edge_violates_unique_constraint() {
        let mut catalog = seeded();
        let mut work = catalog.begin_import().unwrap();
        let organism = work.find_organism(208964).unwrap().unwrap();
        let (model, _) = work
            .upsert_model(&NewMlModel {
                title: "Ensemble ADAGE 300".to_string(),
                organism_id: organism.id,
                directed_g2g_edge: false,
                g2g_edge_cutoff: 0.2,
                desc_html: String::new(),
            })
            .unwrap();
        let gene1 = work.find_genes_by_systematic_name("PA0001").unwrap()[0].id;
        let gene2 = work
            .insert_gene(&GeneRecord {
                organism_id: organism.id,
                entrez_id: Some(878418),
                systematic_name: "PA0002".to_string(),
                standard_name: None,
                description: String::new(),
                aliases: String::new(),
                weight: 1.0,
                obsolete: false,
            })
            .unwrap();
        let edge = Edge {
            model_id: model.id,
            gene1_id: gene1,
            gene2_id: gene2,
            weight: 0.4,
        };
        work.insert_edges(&[edge]).unwrap();
        assert!(work.model_has_edges(model.id).unwrap());
        assert!(work.edge_exists(model.id, gene1, gene2).unwrap());
        assert!(!work.edge_exists(model.id, gene2, gene1).unwrap());
        let err = work.insert_edges(&[edge]).unwrap_err();
        assert!(matches!(err, LoaderError::Database(_)));
    }

    #[test]
    fn sample_annotations_replace_text_in_place() {
        let mut catalog = seeded();
        let mut work = catalog.begin_import().unwrap();
        work.insert_experiment(&NewExperiment {
            accession: "E-GEOD-1".to_string(),
            name: "biofilm".to_string(),
            description: String::new(),
        })
        .unwrap();
        let sample = work.insert_sample("PAO1 rep1", Some("GSM1.CEL")).unwrap();
        work.link_sample("E-GEOD-1", sample.id).unwrap();
        work.link_sample("E-GEOD-1", sample.id).unwrap();
        work.set_sample_annotation(sample.id, "strain", "PAO1").unwrap();
        work.set_sample_annotation(sample.id, "medium", "LB").unwrap();
        work.set_sample_annotation(sample.id, "strain", "PAO1 wild type").unwrap();

        assert_eq!(
            work.sample_annotations(sample.id).unwrap(),
            vec![
                ("strain".to_string(), "PAO1 wild type".to_string()),
                ("medium".to_string(), "LB".to_string()),
            ]
        );
        assert_eq!(work.experiment_samples("E-GEOD-1").unwrap(), vec![sample.clone()]);
        assert_eq!(work.find_sample("PAO1 rep1", Some("GSM1.CEL")).unwrap(), Some(sample.clone()));
        assert_eq!(work.find_sample("PAO1 rep1", None).unwrap(), None);
        let unsourced = work.insert_sample("PAO1 rep2", None).unwrap();
        assert_eq!(work.find_sample("PAO1 rep2", None).unwrap(), Some(unsourced));
        assert!(work.insert_sample("other", Some("GSM1.CEL")).is_err());
    }

    #[test]
    fn crossrefs_are_stored_once() {
        let mut catalog = seeded();
        let mut work = catalog.begin_import().unwrap();
        let gene = work.find_genes_by_systematic_name("PA0001").unwrap()[0].id;
        let (db, action) = work
            .upsert_crossref_db("UniProtKB", "http://www.uniprot.org/uniprot/_REPL_")
            .unwrap();
        assert_eq!(action, Upsert::Created);
        let (_, action) = work
            .upsert_crossref_db("UniProtKB", "https://www.uniprot.org/uniprot/_REPL_")
            .unwrap();
        assert_eq!(action, Upsert::Updated);

        let crossref = CrossRef {
            crossref_db_id: db.id,
            xrid: "P25084".to_string(),
            gene_id: gene,
        };
        assert!(work.add_crossref(&crossref).unwrap());
        assert!(!work.add_crossref(&crossref).unwrap());
        assert_eq!(work.crossrefs_for_gene(gene).unwrap(), vec![crossref]);
    }

    #[test]
    fn genes_without_entrez_id_coexist() {
        let mut catalog = seeded();
        let mut work = catalog.begin_import().unwrap();
        let organism = work.find_organism(208964).unwrap().unwrap();
        for name in ["PA14_00010", "PA14_00020"] {
            work.insert_gene(&GeneRecord {
                organism_id: organism.id,
                entrez_id: None,
                systematic_name: name.to_string(),
                standard_name: None,
                description: String::new(),
                aliases: String::new(),
                weight: 1.0,
                obsolete: false,
            })
            .unwrap();
        }
        assert_eq!(work.organism_entrez_ids(organism.id).unwrap(), vec![878417]);
        assert_eq!(work.find_organism_genes(organism.id, "PA14_00020").unwrap().len(), 1);
    }
}
