use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::admin::{self, SignatureReport};
use crate::aliases::{self, AliasReport, GeneNamesReport};
use crate::catalog::{Catalog, OrganismRepository};
use crate::config::{MlModelConfig, ResolvedConfig};
use crate::domain::{Polarity, Upsert};
use crate::error::LoaderError;
use crate::experiments::{self, ExperimentReport, SamplesInfoReport};
use crate::expression::{self, ExpressionReport};
use crate::fs_util::open_input;
use crate::gene_history::{self, GeneHistoryOptions, GeneHistoryReport};
use crate::gene_info::{self, GeneInfoOptions, GeneInfoReport};
use crate::network::{self, NetworkReport};
use crate::participation::{self, ParticipationReport};
use crate::store::Store;
use crate::tribe::{self, TribeClient};

#[derive(Debug, Clone, Serialize)]
pub struct UpsertResult {
    pub kind: String,
    pub key: String,
    pub action: Upsert,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenesetFetchResult {
    pub organism: String,
    /// Tribe resource URI of the organism.
    pub tribe_organism: String,
    pub path: String,
    pub genesets: usize,
    pub genes: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: Catalog, T: TribeClient> {
    store: Store,
    config: ResolvedConfig,
    catalog: C,
    tribe: T,
}

impl<C: Catalog, T: TribeClient> App<C, T> {
    pub fn new(store: Store, config: ResolvedConfig, catalog: C, tribe: T) -> Self {
        Self {
            store,
            config,
            catalog,
            tribe,
        }
    }

    pub fn set_organism(
        &mut self,
        taxonomy_id: i64,
        common_name: &str,
        scientific_name: &str,
        url_template: Option<&str>,
    ) -> Result<UpsertResult, LoaderError> {
        let (organism, action) = admin::set_organism(
            &mut self.catalog,
            taxonomy_id,
            common_name,
            scientific_name,
            url_template,
        )?;
        Ok(UpsertResult {
            kind: "organism".to_string(),
            key: organism.taxonomy_id.to_string(),
            action,
        })
    }

    pub fn set_participation_type(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<UpsertResult, LoaderError> {
        let (kind, action) = admin::set_participation_type(&mut self.catalog, name, description)?;
        Ok(UpsertResult {
            kind: "participation type".to_string(),
            key: kind.name,
            action,
        })
    }

    pub fn set_crossref_db(&mut self, name: &str, url: &str) -> Result<UpsertResult, LoaderError> {
        let (db, action) = admin::set_crossref_db(&mut self.catalog, name, url)?;
        Ok(UpsertResult {
            kind: "crossref db".to_string(),
            key: db.name,
            action,
        })
    }

    pub fn set_ml_model(&mut self, path: &Utf8Path) -> Result<UpsertResult, LoaderError> {
        let config = MlModelConfig::load(path.as_str())?;
        let (model, action) = admin::set_ml_model(&mut self.catalog, &config)?;
        Ok(UpsertResult {
            kind: "ml model".to_string(),
            key: model.title,
            action,
        })
    }

    /// Registers `names` plus a `pos`/`neg` pair for each of `nodes`.
    pub fn set_signatures(
        &mut self,
        model: &str,
        names: &[String],
        nodes: &[String],
    ) -> Result<SignatureReport, LoaderError> {
        let mut all = names.to_vec();
        for node in nodes {
            for polarity in [Polarity::Pos, Polarity::Neg] {
                all.push(polarity.signature_name(node));
            }
        }
        if all.is_empty() {
            return Err(LoaderError::InvalidValue(
                "no signature names given".to_string(),
            ));
        }
        admin::register_signatures(&mut self.catalog, model, &all)
    }

    pub fn import_participation(
        &mut self,
        path: &Utf8Path,
        model: &str,
        participation_type: &str,
        sink: &dyn ProgressSink,
    ) -> Result<ParticipationReport, LoaderError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; weight matrix {path}"),
            elapsed: None,
        });
        let reader = open_input(path)?;
        let report =
            participation::import_participation(&mut self.catalog, reader, model, participation_type)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} created, {} updated, {} skipped",
                report.created,
                report.updated,
                report.skipped.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn import_network(
        &mut self,
        path: &Utf8Path,
        model: &str,
        batch_size: Option<usize>,
        sink: &dyn ProgressSink,
    ) -> Result<NetworkReport, LoaderError> {
        let started = Instant::now();
        let batch_size = batch_size.unwrap_or(self.config.edge_batch_size);
        sink.event(ProgressEvent {
            message: format!("phase=Read; gene network {path} (batches of {batch_size})"),
            elapsed: None,
        });
        let reader = open_input(path)?;
        let report = network::import_network(&mut self.catalog, reader, model, batch_size)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} edges in {} batches, {} below cutoff",
                report.imported, report.batches, report.below_cutoff
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn import_gene_info(
        &mut self,
        path: &Utf8Path,
        options: &GeneInfoOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GeneInfoReport, LoaderError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; gene info {path}"),
            elapsed: None,
        });
        let reader = open_input(path)?;
        let report = gene_info::import_gene_info(&mut self.catalog, reader, options)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} created, {} updated, {} obsoleted",
                report.created, report.updated, report.obsoleted
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn import_gene_history(
        &mut self,
        path: &Utf8Path,
        options: &GeneHistoryOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GeneHistoryReport, LoaderError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; gene history {path}"),
            elapsed: None,
        });
        let reader = open_input(path)?;
        let report = gene_history::import_gene_history(&mut self.catalog, reader, options)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} obsoleted, {} created",
                report.obsoleted, report.created
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    /// Imports the experiments named in an annotation spreadsheet, taking
    /// names and descriptions from a saved experiment listing.
    pub fn import_experiments(
        &mut self,
        annotations: &Utf8Path,
        listing: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ExperimentReport, LoaderError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; experiment listing {listing}"),
            elapsed: None,
        });
        let json = std::fs::read_to_string(listing)
            .map_err(|err| LoaderError::Filesystem(format!("read {listing}: {err}")))?;
        let experiments = experiments::parse_experiment_list(&json)?;
        sink.event(ProgressEvent {
            message: format!("phase=Read; sample annotations {annotations}"),
            elapsed: None,
        });
        let rows = experiments::parse_annotation_sheet(open_input(annotations)?)?;
        let report = experiments::import_experiments(&mut self.catalog, &experiments, &rows)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} experiments, {} samples created, {} reused",
                report.experiments, report.samples_created, report.samples_reused
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn refresh_samples_info(
        &mut self,
        sink: &dyn ProgressSink,
    ) -> Result<SamplesInfoReport, LoaderError> {
        let started = Instant::now();
        let report = experiments::refresh_samples_info(&mut self.catalog)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; samples info of {} experiments",
                report.experiments
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn import_expression(
        &mut self,
        path: &Utf8Path,
        tax_id: i64,
        sink: &dyn ProgressSink,
    ) -> Result<ExpressionReport, LoaderError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; expression values {path}"),
            elapsed: None,
        });
        let reader = open_input(path)?;
        let report = expression::import_expression(&mut self.catalog, reader, tax_id)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} values for {} genes, {} skipped",
                report.values,
                report.genes,
                report.skipped.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn add_gene_aliases(
        &mut self,
        path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<AliasReport, LoaderError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; gene aliases {path}"),
            elapsed: None,
        });
        let reader = open_input(path)?;
        let report = aliases::add_gene_aliases(&mut self.catalog, reader)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} aliases added, {} skipped",
                report.added,
                report.skipped.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn update_gene_names(
        &mut self,
        path: &Utf8Path,
        tax_id: i64,
        sink: &dyn ProgressSink,
    ) -> Result<GeneNamesReport, LoaderError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Read; gene names {path}"),
            elapsed: None,
        });
        let reader = open_input(path)?;
        let report = aliases::update_gene_names(&mut self.catalog, reader, tax_id)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Commit; {} updated, {} created, {} skipped",
                report.updated,
                report.created,
                report.skipped.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    /// Downloads the public gene sets of a catalog organism and caches them
    /// as JSON.
    pub fn fetch_genesets(
        &mut self,
        taxonomy_id: i64,
        max_genes: usize,
        sink: &dyn ProgressSink,
    ) -> Result<GenesetFetchResult, LoaderError> {
        let started = Instant::now();
        let organism = {
            let work = self.catalog.begin_import()?;
            work.find_organism(taxonomy_id)?
                .ok_or(LoaderError::OrganismNotFound(taxonomy_id))?
        };

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} in Tribe", organism.scientific_name),
            elapsed: None,
        });
        // Tribe must know the organism before any download starts.
        let tribe_organism = self.tribe.organism_uri(&organism.scientific_name)?;
        tracing::debug!(%tribe_organism, "organism resolved in Tribe");

        sink.event(ProgressEvent {
            message: format!("phase=Download; public gene sets from {}", self.tribe.base_url()),
            elapsed: None,
        });
        let genesets = tribe::download_organism_genesets(
            &self.tribe,
            &organism.scientific_name,
            &self.config.tribe_crossref,
            max_genes,
        )?;

        let path: Utf8PathBuf = self.store.geneset_path(&organism.slug);
        let json = serde_json::to_vec_pretty(&genesets)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        Store::write_bytes_atomic(&path, &json)?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; {path}"),
            elapsed: Some(started.elapsed()),
        });

        Ok(GenesetFetchResult {
            organism: organism.scientific_name,
            tribe_organism,
            path: path.to_string(),
            genesets: genesets.geneset_count(),
            genes: genesets.gene_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use serde_json::{Value, json};

    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::output::JsonOutput;

    struct StaticTribe;

    impl TribeClient for StaticTribe {
        fn organism_uri(&self, _: &str) -> Result<String, LoaderError> {
            Ok("/api/v1/organism/1".to_string())
        }

        fn public_genesets(
            &self,
            _filters: &[(String, String)],
            _all: bool,
        ) -> Result<Vec<Value>, LoaderError> {
            Ok(vec![json!({"slug": "kegg", "creator": {"username": "t"}, "tip": {"genes": ["1"]}})])
        }

        fn base_url(&self) -> &str {
            "https://tribe.example"
        }
    }

    /// A Tribe server that knows no organisms.
    struct EmptyTribe;

    impl TribeClient for EmptyTribe {
        fn organism_uri(&self, scientific_name: &str) -> Result<String, LoaderError> {
            Err(LoaderError::TribeResolution(format!(
                "organism {scientific_name} not found in Tribe"
            )))
        }

        fn public_genesets(
            &self,
            _filters: &[(String, String)],
            _all: bool,
        ) -> Result<Vec<Value>, LoaderError> {
            panic!("gene sets requested for an organism Tribe does not know")
        }

        fn base_url(&self) -> &str {
            "https://tribe.example"
        }
    }

    fn app(temp: &tempfile::TempDir) -> App<MemoryCatalog, StaticTribe> {
        let project_root = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
        let cache_root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        App::new(
            Store::new_with_paths(project_root, cache_root),
            ResolvedConfig::default(),
            MemoryCatalog::new(),
            StaticTribe,
        )
    }

    #[test]
    fn genesets_cached_under_organism_slug() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app(&temp);
        app.set_organism(208964, "Pseudomonas", "Pseudomonas aeruginosa", None)
            .unwrap();

        let result = app.fetch_genesets(208964, 300, &JsonOutput).unwrap();
        assert!(result.path.ends_with("genesets/pseudomonas-aeruginosa.json"));
        assert_eq!(result.genesets, 3);
        assert_eq!(result.tribe_organism, "/api/v1/organism/1");
        let cached: Value =
            serde_json::from_str(&std::fs::read_to_string(&result.path).unwrap()).unwrap();
        assert_eq!(cached["organism"], "Pseudomonas aeruginosa");

        assert_matches!(
            app.fetch_genesets(9606, 300, &JsonOutput),
            Err(LoaderError::OrganismNotFound(9606))
        );
    }

    #[test]
    fn organism_unknown_to_tribe_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let project_root = Utf8PathBuf::from_path_buf(temp.path().join("project")).unwrap();
        let cache_root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        let store = Store::new_with_paths(project_root, cache_root);
        let cached = store.geneset_path("pseudomonas-aeruginosa");
        let mut app = App::new(store, ResolvedConfig::default(), MemoryCatalog::new(), EmptyTribe);
        app.set_organism(208964, "Pseudomonas", "Pseudomonas aeruginosa", None)
            .unwrap();

        assert_matches!(
            app.fetch_genesets(208964, 300, &JsonOutput),
            Err(LoaderError::TribeResolution(_))
        );
        assert!(!cached.exists());
    }

    #[test]
    fn experiments_and_aliases_from_files() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app(&temp);
        app.set_organism(208964, "Pseudomonas", "Pseudomonas aeruginosa", None)
            .unwrap();

        let listing = temp.path().join("experiments.json");
        std::fs::write(
            &listing,
            r#"{"experiments": {"experiment": [{"accession": "E-GEOD-1", "name": "biofilm", "description": {"text": "PAO1 biofilms"}}]}}"#,
        )
        .unwrap();
        let sheet = temp.path().join("annotations.tsv");
        let mut cells = vec!["E-GEOD-1", "rep1", "GSM1.CEL", "PAO1"];
        cells.resize(crate::experiments::ANNOTATION_COLUMNS.len(), "");
        std::fs::write(
            &sheet,
            format!("{}\n{}\n", crate::experiments::ANNOTATION_COLUMNS.join("\t"), cells.join("\t")),
        )
        .unwrap();
        let report = app
            .import_experiments(
                Utf8Path::from_path(&sheet).unwrap(),
                Utf8Path::from_path(&listing).unwrap(),
                &JsonOutput,
            )
            .unwrap();
        assert_eq!(report.experiments, 1);
        assert_eq!(report.samples_created, 1);
        assert_eq!(app.refresh_samples_info(&JsonOutput).unwrap().samples, 1);

        let names = temp.path().join("names.tsv");
        std::fs::write(&names, "PA0001\tdnaA\tPA14_00010\n").unwrap();
        let report = app
            .update_gene_names(Utf8Path::from_path(&names).unwrap(), 208964, &JsonOutput)
            .unwrap();
        assert_eq!(report.created, 1);

        let aliases = temp.path().join("aliases.tsv");
        std::fs::write(&aliases, "PA0001\tdnaA1\n").unwrap();
        let report = app
            .add_gene_aliases(Utf8Path::from_path(&aliases).unwrap(), &JsonOutput)
            .unwrap();
        assert_eq!(report.added, 1);

        assert_matches!(
            app.import_experiments(
                Utf8Path::from_path(&sheet).unwrap(),
                Utf8Path::new("missing.json"),
                &JsonOutput,
            ),
            Err(LoaderError::Filesystem(_))
        );
    }

    #[test]
    fn crossref_db_result_names_database() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app(&temp);
        let result = app
            .set_crossref_db("UniProtKB", "http://www.uniprot.org/uniprot/_REPL_")
            .unwrap();
        assert_eq!(result.kind, "crossref db");
        assert_eq!(result.key, "UniProtKB");
        assert_eq!(result.action, Upsert::Created);
    }

    #[test]
    fn model_from_yaml_file() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app(&temp);
        app.set_organism(208964, "Pseudomonas", "Pseudomonas aeruginosa", None)
            .unwrap();

        let yml = temp.path().join("model.yml");
        let mut file = std::fs::File::create(&yml).unwrap();
        writeln!(file, "title: Ensemble ADAGE 300\norganism_tax_id: 208964\ng2g_edge_cutoff: 0.4").unwrap();
        let result = app
            .set_ml_model(Utf8Path::from_path(&yml).unwrap())
            .unwrap();
        assert_eq!(result.action, Upsert::Created);

        let report = app
            .set_signatures("Ensemble ADAGE 300", &[], &["Node1".to_string()])
            .unwrap();
        assert_eq!(report.created, vec!["Node1pos", "Node1neg"]);
    }
}
