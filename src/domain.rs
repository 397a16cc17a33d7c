use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LoaderError;

macro_rules! catalog_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

catalog_id!(OrganismId);
catalog_id!(GeneId);
catalog_id!(ModelId);
catalog_id!(SignatureId);
catalog_id!(ParticipationTypeId);
catalog_id!(SampleId);
catalog_id!(CrossRefDbId);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Organism {
    pub id: OrganismId,
    pub taxonomy_id: i64,
    pub common_name: String,
    pub scientific_name: String,
    pub slug: String,
    pub url_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOrganism {
    pub taxonomy_id: i64,
    pub common_name: String,
    pub scientific_name: String,
    pub url_template: Option<String>,
}

impl NewOrganism {
    pub fn slug(&self) -> String {
        slugify(&self.scientific_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gene {
    pub id: GeneId,
    pub organism_id: OrganismId,
    pub entrez_id: Option<i64>,
    pub systematic_name: String,
    pub standard_name: Option<String>,
    pub description: String,
    pub aliases: String,
    pub weight: f64,
    pub obsolete: bool,
}

impl Gene {
    /// Current field values, as a starting point for an update.
    pub fn to_record(&self) -> GeneRecord {
        GeneRecord {
            organism_id: self.organism_id,
            entrez_id: self.entrez_id,
            systematic_name: self.systematic_name.clone(),
            standard_name: self.standard_name.clone(),
            description: self.description.clone(),
            aliases: self.aliases.clone(),
            weight: self.weight,
            obsolete: self.obsolete,
        }
    }

    /// Space-separated aliases as a list.
    pub fn alias_list(&self) -> Vec<&str> {
        self.aliases.split_whitespace().collect()
    }
}

/// Field values for a gene. Genes from NCBI files are keyed by
/// (organism, entrez id); curated genes may have no entrez id.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneRecord {
    pub organism_id: OrganismId,
    pub entrez_id: Option<i64>,
    pub systematic_name: String,
    pub standard_name: Option<String>,
    pub description: String,
    pub aliases: String,
    pub weight: f64,
    pub obsolete: bool,
}

impl GeneRecord {
    /// True when `gene` already carries every field of this record.
    pub fn matches(&self, gene: &Gene) -> bool {
        gene.systematic_name == self.systematic_name
            && gene.standard_name == self.standard_name
            && gene.description == self.description
            && gene.aliases == self.aliases
            && gene.weight == self.weight
            && gene.obsolete == self.obsolete
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlModel {
    pub id: ModelId,
    pub title: String,
    pub organism_id: OrganismId,
    pub directed_g2g_edge: bool,
    pub g2g_edge_cutoff: f64,
    pub desc_html: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMlModel {
    pub title: String,
    pub organism_id: OrganismId,
    pub directed_g2g_edge: bool,
    pub g2g_edge_cutoff: f64,
    pub desc_html: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub id: SignatureId,
    pub name: String,
    pub model_id: ModelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipationType {
    pub id: ParticipationTypeId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Participation {
    pub signature_id: SignatureId,
    pub gene_id: GeneId,
    pub participation_type_id: ParticipationTypeId,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub model_id: ModelId,
    pub gene1_id: GeneId,
    pub gene2_id: GeneId,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Experiment {
    pub accession: String,
    pub name: String,
    pub description: String,
    /// Sample names, data sources and annotation texts, one per line.
    pub samples_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExperiment {
    pub accession: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub id: SampleId,
    pub name: String,
    pub ml_data_source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExpressionValue {
    pub sample_id: SampleId,
    pub gene_id: GeneId,
    pub value: f64,
}

/// An external gene database. `url` carries a `_REPL_` placeholder for
/// the reference id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossRefDb {
    pub id: CrossRefDbId,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CrossRef {
    pub crossref_db_id: CrossRefDbId,
    pub xrid: String,
    pub gene_id: GeneId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Upsert {
    Created,
    Updated,
}

impl fmt::Display for Upsert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upsert::Created => write!(f, "created"),
            Upsert::Updated => write!(f, "updated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Pos,
    Neg,
}

impl Polarity {
    pub fn signature_name(self, node: &str) -> String {
        format!("{node}{self}")
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Pos => write!(f, "pos"),
            Polarity::Neg => write!(f, "neg"),
        }
    }
}

/// A record an import left out without aborting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub gene: String,
    pub reason: String,
}

/// NCBI taxonomy identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaxonomyId(i64);

impl TaxonomyId {
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaxonomyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonomyId {
    type Err = LoaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value
            .trim()
            .parse::<i64>()
            .map_err(|_| LoaderError::InvalidValue(format!("taxonomy id {value}")))?;
        if parsed <= 0 {
            return Err(LoaderError::InvalidValue(format!("taxonomy id {value}")));
        }
        Ok(Self(parsed))
    }
}

/// Lowercase, URL-safe label: runs of anything other than ASCII letters and
/// digits collapse to a single `-`.
pub fn slugify(value: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
    let lowered = value.trim().to_lowercase();
    separators
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Trims `value` and rejects it when nothing is left.
pub fn non_blank(field: &str, value: &str) -> Result<String, LoaderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoaderError::InvalidValue(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}
