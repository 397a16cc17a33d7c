use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("input is empty or has no node columns in its header")]
    EmptyMatrix,

    #[error("incorrect number of columns on line {line}: expected {expected}, found {found}")]
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: weight ({token}) is not a floating point value")]
    NonNumericWeight { line: usize, token: String },

    #[error("line {line}: gene identifier (column #1) is blank")]
    BlankGene { line: usize },

    #[error("line {line}: gene {gene} already appeared on line {first_line}")]
    #[diagnostic(help("each gene may appear only once in a weight matrix"))]
    DuplicateGene {
        line: usize,
        first_line: usize,
        gene: String,
    },

    #[error("node {node} has {count} gene weight(s); at least 2 are needed for a standard deviation")]
    InsufficientSamples { node: String, count: usize },

    #[error("input file line #{line}: number of fields is not {expected}")]
    ColumnCount { line: usize, expected: usize },

    #[error("input file line #{line}: identical genes ({gene}) in columns #1 and #2")]
    SelfLoop { line: usize, gene: String },

    #[error("input file line #{line}: weight ({value}) not floating type")]
    WeightNotFloat { line: usize, value: String },

    #[error("input file line #{line}: weight ({value}) out of range of -1.0~1.0")]
    WeightRange { line: usize, value: String },

    #[error("input file line #{line}: duplicate pair of genes ({gene1}, {gene2})")]
    DuplicatePair {
        line: usize,
        gene1: String,
        gene2: String,
    },

    #[error("input file line #{line}: ({gene1}, {gene2}, {model}) not unique in catalog")]
    UniquenessViolation {
        line: usize,
        gene1: String,
        gene2: String,
        model: String,
    },

    #[error("input file line #{line}: column number of {column} is out of range")]
    ColumnOutOfRange { line: usize, column: String },

    #[error("input file line #{line}: {value} is not an integer")]
    InvalidInteger { line: usize, value: String },

    #[error("less than 10 gene records found for taxonomy id {tax_id}")]
    #[diagnostic(help("check the organism tax_id passed to the import"))]
    TooFewGeneRecords { tax_id: i64, found: usize },

    #[error("line {line}: {field} is blank")]
    BlankField { line: usize, field: String },

    #[error("input file line #1 column #{column}: blank data source")]
    BlankDataSource { column: usize },

    #[error("input file line #1 column #{column}: duplicate data source ({value})")]
    DuplicateDataSource { column: usize, value: String },

    #[error("input file line #{line} column #{column}: expression value {value} not numeric")]
    NonNumericValue {
        line: usize,
        column: usize,
        value: String,
    },

    #[error("invalid experiment list: {0}")]
    ExperimentList(String),

    #[error("annotated experiments missing from the experiment list: [{}]", .0.join(", "))]
    #[diagnostic(help("the experiment list must describe every accession in the annotation file"))]
    ExperimentsMissing(Vec<String>),

    #[error("annotation mismatches found: {count} sample(s)")]
    #[diagnostic(help("a sample shared by several experiments needs the same annotations in each"))]
    AnnotationMismatch { count: usize },

    #[error("machine learning model not found in catalog: {0}")]
    #[diagnostic(help("create it first with `adage-loader ml-model set <config.yml>`"))]
    ModelNotFound(String),

    #[error("participation type not found in catalog: {0}")]
    #[diagnostic(help("create it first with `adage-loader participation-type set`"))]
    ParticipationTypeNotFound(String),

    #[error("signature {name} not found in catalog for model {model}")]
    SignatureNotFound { name: String, model: String },

    #[error("organism with taxonomy id {0} not found in catalog")]
    OrganismNotFound(i64),

    #[error("gene systematic name ({0}) not found in catalog")]
    GeneNotFound(String),

    #[error("gene systematic name ({name}) matches {count} records in catalog")]
    AmbiguousGene { name: String, count: usize },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse config: {0}")]
    ConfigParse(String),

    #[error("catalog error: {0}")]
    Database(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("Tribe request failed: {0}")]
    TribeHttp(String),

    #[error("Tribe returned status {status}: {message}")]
    TribeStatus { status: u16, message: String },

    #[error("{0}")]
    TribeResolution(String),
}

impl LoaderError {
    /// Missing or ambiguous genes are skipped with a warning instead of
    /// aborting the import.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LoaderError::GeneNotFound(_) | LoaderError::AmbiguousGene { .. }
        )
    }
}

impl From<rusqlite::Error> for LoaderError {
    fn from(err: rusqlite::Error) -> Self {
        LoaderError::Database(err.to_string())
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(err: std::io::Error) -> Self {
        LoaderError::Filesystem(err.to_string())
    }
}
