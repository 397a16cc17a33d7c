use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use adage_loader::app::{App, ProgressSink};
use adage_loader::catalog::SqliteCatalog;
use adage_loader::config::ConfigLoader;
use adage_loader::domain::TaxonomyId;
use adage_loader::error::LoaderError;
use adage_loader::gene_history::GeneHistoryOptions;
use adage_loader::gene_info::GeneInfoOptions;
use adage_loader::output::{HumanOutput, JsonOutput, OutputMode};
use adage_loader::store::Store;
use adage_loader::tribe::{DEFAULT_MAX_GENES, TribeHttpClient};

#[derive(Parser)]
#[command(name = "adage-loader")]
#[command(about = "Batch loader for the ADAGE gene, signature and network catalog")]
#[command(version, author)]
struct Cli {
    /// Loader config file (default: ./adage-loader.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// SQLite catalog path; overrides the config file.
    #[arg(long, global = true)]
    database: Option<Utf8PathBuf>,

    /// Print JSON reports instead of a summary line.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage organisms")]
    Organism {
        #[command(subcommand)]
        command: OrganismCommand,
    },
    #[command(about = "Manage participation types")]
    ParticipationType {
        #[command(subcommand)]
        command: ParticipationTypeCommand,
    },
    #[command(about = "Manage machine learning models")]
    MlModel {
        #[command(subcommand)]
        command: MlModelCommand,
    },
    #[command(about = "Manage signatures")]
    Signature {
        #[command(subcommand)]
        command: SignatureCommand,
    },
    #[command(about = "Import tab-delimited data files")]
    Import {
        #[command(subcommand)]
        command: ImportCommand,
    },
    #[command(about = "Manage cross-reference databases")]
    CrossrefDb {
        #[command(subcommand)]
        command: CrossrefDbCommand,
    },
    #[command(about = "Experiment search text")]
    Experiments {
        #[command(subcommand)]
        command: ExperimentsCommand,
    },
    #[command(about = "Curated gene names and aliases")]
    Genes {
        #[command(subcommand)]
        command: GenesCommand,
    },
    #[command(about = "Public gene sets from Tribe")]
    Genesets {
        #[command(subcommand)]
        command: GenesetsCommand,
    },
}

#[derive(Subcommand)]
enum OrganismCommand {
    #[command(about = "Create or update an organism")]
    Set(OrganismArgs),
}

#[derive(Args)]
struct OrganismArgs {
    #[arg(long)]
    tax_id: TaxonomyId,
    #[arg(long)]
    common_name: String,
    #[arg(long)]
    scientific_name: String,
    #[arg(long)]
    url_template: Option<String>,
}

#[derive(Subcommand)]
enum ParticipationTypeCommand {
    #[command(about = "Create or update a participation type")]
    Set {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
    },
}

#[derive(Subcommand)]
enum CrossrefDbCommand {
    #[command(about = "Create or update a cross-reference database")]
    Set {
        #[arg(long)]
        name: String,
        /// Link template; `_REPL_` stands for the reference id.
        #[arg(long)]
        url: String,
    },
}

#[derive(Subcommand)]
enum ExperimentsCommand {
    #[command(about = "Rebuild the samples_info text of every experiment")]
    SamplesInfo,
}

#[derive(Subcommand)]
enum GenesCommand {
    #[command(about = "Append aliases from (systematic name, alias) rows")]
    AddAliases { file: Utf8PathBuf },
    #[command(about = "Apply (systematic name, standard name, aliases) rows")]
    UpdateNames {
        file: Utf8PathBuf,
        /// Organism of genes created for unknown names.
        #[arg(long)]
        tax_id: TaxonomyId,
    },
}

#[derive(Subcommand)]
enum MlModelCommand {
    #[command(about = "Create or update a model from a YAML definition")]
    Set { config: Utf8PathBuf },
}

#[derive(Subcommand)]
enum SignatureCommand {
    #[command(about = "Register signatures of a model")]
    Set {
        #[arg(long)]
        model: String,
        /// Signature name; repeatable.
        #[arg(long = "name")]
        names: Vec<String>,
        /// Node name; registers `<node>pos` and `<node>neg`. Repeatable.
        #[arg(long = "node")]
        nodes: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ImportCommand {
    #[command(about = "Heavy-gene participations from a gene-by-node weight matrix")]
    Participation {
        file: Utf8PathBuf,
        #[arg(long)]
        model: String,
        #[arg(long)]
        participation_type: String,
    },
    #[command(about = "Gene-gene network edges")]
    Network {
        file: Utf8PathBuf,
        #[arg(long)]
        model: String,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    #[command(about = "NCBI gene_info file")]
    GeneInfo(GeneInfoArgs),
    #[command(about = "NCBI gene_history file")]
    GeneHistory(GeneHistoryArgs),
    #[command(about = "Experiments and samples from an annotation spreadsheet")]
    Experiments {
        /// Tab-separated sample annotation spreadsheet.
        annotations: Utf8PathBuf,
        /// Saved ArrayExpress experiment listing (JSON).
        #[arg(long)]
        experiments: Utf8PathBuf,
    },
    #[command(about = "Gene-sample expression values")]
    Expression {
        file: Utf8PathBuf,
        #[arg(long)]
        tax_id: TaxonomyId,
    },
}

#[derive(Args)]
struct GeneInfoArgs {
    file: Utf8PathBuf,
    #[arg(long)]
    tax_id: TaxonomyId,
    #[arg(long)]
    gi_tax_id: Option<i64>,
    #[arg(long, default_value_t = 2)]
    symbol_col: usize,
    #[arg(long, default_value_t = 3)]
    systematic_col: usize,
    #[arg(long, default_value_t = 4)]
    alias_col: usize,
    /// Cross-reference database that also receives each systematic name.
    #[arg(long)]
    systematic_xrdb: Option<String>,
}

#[derive(Args)]
struct GeneHistoryArgs {
    file: Utf8PathBuf,
    #[arg(long)]
    tax_id: TaxonomyId,
    #[arg(long, default_value_t = 1)]
    tax_id_col: usize,
    #[arg(long, default_value_t = 3)]
    discontinued_id_col: usize,
    #[arg(long, default_value_t = 4)]
    discontinued_symbol_col: usize,
}

#[derive(Subcommand)]
enum GenesetsCommand {
    #[command(about = "Download and cache the public gene sets of an organism")]
    Fetch {
        #[arg(long)]
        tax_id: TaxonomyId,
        #[arg(long, default_value_t = DEFAULT_MAX_GENES)]
        max_genes: usize,
    },
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<LoaderError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LoaderError) -> u8 {
    match error {
        LoaderError::ModelNotFound(_)
        | LoaderError::ParticipationTypeNotFound(_)
        | LoaderError::SignatureNotFound { .. }
        | LoaderError::OrganismNotFound(_) => 2,
        LoaderError::EmptyMatrix
        | LoaderError::MalformedRow { .. }
        | LoaderError::NonNumericWeight { .. }
        | LoaderError::BlankGene { .. }
        | LoaderError::DuplicateGene { .. }
        | LoaderError::InsufficientSamples { .. }
        | LoaderError::ColumnCount { .. }
        | LoaderError::SelfLoop { .. }
        | LoaderError::WeightNotFloat { .. }
        | LoaderError::WeightRange { .. }
        | LoaderError::DuplicatePair { .. }
        | LoaderError::UniquenessViolation { .. }
        | LoaderError::ColumnOutOfRange { .. }
        | LoaderError::InvalidInteger { .. }
        | LoaderError::TooFewGeneRecords { .. }
        | LoaderError::BlankField { .. }
        | LoaderError::BlankDataSource { .. }
        | LoaderError::DuplicateDataSource { .. }
        | LoaderError::NonNumericValue { .. }
        | LoaderError::ExperimentList(_)
        | LoaderError::ExperimentsMissing(_)
        | LoaderError::AnnotationMismatch { .. }
        | LoaderError::InvalidValue(_)
        | LoaderError::ConfigParse(_) => 3,
        LoaderError::ConfigRead(_)
        | LoaderError::Database(_)
        | LoaderError::Filesystem(_)
        | LoaderError::TribeHttp(_)
        | LoaderError::TribeStatus { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::new()?;
    let database = store.database_path(cli.database.as_deref().or(config.database.as_deref()));
    let catalog = SqliteCatalog::open(&database)?;
    let tribe = TribeHttpClient::new(&config.tribe_url)?;
    let mut app = App::new(store, config, catalog, tribe);

    let sink: &dyn ProgressSink = match mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &HumanOutput,
    };

    match cli.command {
        Commands::Organism {
            command: OrganismCommand::Set(args),
        } => {
            let result = app.set_organism(
                args.tax_id.get(),
                &args.common_name,
                &args.scientific_name,
                args.url_template.as_deref(),
            )?;
            emit(mode, &result, &format!("organism {} {}", result.key, result.action))
        }
        Commands::ParticipationType {
            command: ParticipationTypeCommand::Set { name, description },
        } => {
            let result = app.set_participation_type(&name, &description)?;
            emit(
                mode,
                &result,
                &format!("participation type {} {}", result.key, result.action),
            )
        }
        Commands::MlModel {
            command: MlModelCommand::Set { config },
        } => {
            let result = app.set_ml_model(&config)?;
            emit(mode, &result, &format!("ml model {} {}", result.key, result.action))
        }
        Commands::Signature {
            command: SignatureCommand::Set { model, names, nodes },
        } => {
            let report = app.set_signatures(&model, &names, &nodes)?;
            emit(
                mode,
                &report,
                &format!(
                    "{} signature(s) created, {} already present for {}",
                    report.created.len(),
                    report.existing.len(),
                    report.model
                ),
            )
        }
        Commands::CrossrefDb {
            command: CrossrefDbCommand::Set { name, url },
        } => {
            let result = app.set_crossref_db(&name, &url)?;
            emit(mode, &result, &format!("crossref db {} {}", result.key, result.action))
        }
        Commands::Experiments {
            command: ExperimentsCommand::SamplesInfo,
        } => {
            let report = app.refresh_samples_info(sink)?;
            emit(
                mode,
                &report,
                &format!(
                    "samples_info rebuilt for {} experiments ({} samples)",
                    report.experiments, report.samples
                ),
            )
        }
        Commands::Genes { command } => match command {
            GenesCommand::AddAliases { file } => {
                let report = app.add_gene_aliases(&file, sink)?;
                emit(
                    mode,
                    &report,
                    &format!(
                        "{} alias(es) added, {} unchanged, {} skipped",
                        report.added,
                        report.unchanged,
                        report.skipped.len()
                    ),
                )
            }
            GenesCommand::UpdateNames { file, tax_id } => {
                let report = app.update_gene_names(&file, tax_id.get(), sink)?;
                emit(
                    mode,
                    &report,
                    &format!(
                        "Gene names: {} updated, {} created, {} skipped",
                        report.updated,
                        report.created,
                        report.skipped.len()
                    ),
                )
            }
        },
        Commands::Import { command } => run_import(&mut app, command, mode, sink),
        Commands::Genesets {
            command: GenesetsCommand::Fetch { tax_id, max_genes },
        } => {
            let result = app.fetch_genesets(tax_id.get(), max_genes, sink)?;
            emit(
                mode,
                &result,
                &format!(
                    "{} gene sets ({} genes) for {} saved to {}",
                    result.genesets, result.genes, result.organism, result.path
                ),
            )
        }
    }
}

fn run_import(
    app: &mut App<SqliteCatalog, TribeHttpClient>,
    command: ImportCommand,
    mode: OutputMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    match command {
        ImportCommand::Participation {
            file,
            model,
            participation_type,
        } => {
            let report = app.import_participation(&file, &model, &participation_type, sink)?;
            emit(
                mode,
                &report,
                &format!(
                    "Participations imported for {}: {} created, {} updated, {} skipped",
                    report.model,
                    report.created,
                    report.updated,
                    report.skipped.len()
                ),
            )
        }
        ImportCommand::Network {
            file,
            model,
            batch_size,
        } => {
            let report = app.import_network(&file, &model, batch_size, sink)?;
            emit(
                mode,
                &report,
                &format!(
                    "Gene network imported for {}: {} edges, {} below cutoff, {} skipped",
                    report.model,
                    report.imported,
                    report.below_cutoff,
                    report.skipped.len()
                ),
            )
        }
        ImportCommand::GeneInfo(args) => {
            let options = GeneInfoOptions {
                tax_id: args.tax_id.get(),
                gi_tax_id: args.gi_tax_id,
                symbol_col: args.symbol_col,
                systematic_col: args.systematic_col,
                alias_col: args.alias_col,
                systematic_xrdb: args.systematic_xrdb,
            };
            let report = app.import_gene_info(&args.file, &options, sink)?;
            emit(
                mode,
                &report,
                &format!(
                    "Gene info imported: {} created, {} updated, {} obsoleted, {} cross-references",
                    report.created, report.updated, report.obsoleted, report.crossrefs
                ),
            )
        }
        ImportCommand::GeneHistory(args) => {
            let options = GeneHistoryOptions {
                tax_id: args.tax_id.get(),
                tax_id_col: args.tax_id_col,
                discontinued_id_col: args.discontinued_id_col,
                discontinued_symbol_col: args.discontinued_symbol_col,
            };
            let report = app.import_gene_history(&args.file, &options, sink)?;
            emit(
                mode,
                &report,
                &format!(
                    "Gene history imported: {} obsoleted, {} created",
                    report.obsoleted, report.created
                ),
            )
        }
        ImportCommand::Experiments {
            annotations,
            experiments,
        } => {
            let report = app.import_experiments(&annotations, &experiments, sink)?;
            emit(
                mode,
                &report,
                &format!(
                    "Experiments imported: {} experiments, {} samples created, {} reused",
                    report.experiments, report.samples_created, report.samples_reused
                ),
            )
        }
        ImportCommand::Expression { file, tax_id } => {
            let report = app.import_expression(&file, tax_id.get(), sink)?;
            emit(
                mode,
                &report,
                &format!(
                    "Expression imported: {} values for {} genes, {} skipped",
                    report.values,
                    report.genes,
                    report.skipped.len()
                ),
            )
        }
    }
}

fn emit<T: Serialize>(mode: OutputMode, value: &T, summary: &str) -> miette::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print(value).into_diagnostic(),
        OutputMode::Human => HumanOutput::print(summary).into_diagnostic(),
    }
}
