//! NCBI `gene_info` import.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{
    Catalog, CrossRefRepository, GeneRepository, OrganismRepository, UnitOfWork,
};
use crate::domain::{CrossRef, CrossRefDb, GeneId, GeneRecord, OrganismId};
use crate::error::LoaderError;
use crate::fs_util::{NumberedLines, split_tabs};

pub const MIN_GENE_RECORDS: usize = 10;

const TAX_ID_COL: usize = 0;
const ENTREZ_COL: usize = 1;
const XREF_COL: usize = 5;
const CHROMOSOME_COL: usize = 6;
const DESCRIPTION_COL: usize = 8;
const TYPE_COL: usize = 9;

/// Column layout and organism filter. Columns are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneInfoOptions {
    pub tax_id: i64,
    /// Tax id written in the file, when it differs from the catalog's.
    pub gi_tax_id: Option<i64>,
    pub symbol_col: usize,
    pub systematic_col: usize,
    pub alias_col: usize,
    /// Cross-reference database that also receives each gene's systematic
    /// name as a reference id.
    pub systematic_xrdb: Option<String>,
}

impl GeneInfoOptions {
    pub fn new(tax_id: i64) -> Self {
        Self {
            tax_id,
            gi_tax_id: None,
            symbol_col: 2,
            systematic_col: 3,
            alias_col: 4,
            systematic_xrdb: None,
        }
    }

    fn width(&self) -> usize {
        [TYPE_COL, self.symbol_col, self.systematic_col, self.alias_col]
            .into_iter()
            .max()
            .unwrap_or(TYPE_COL)
            + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneInfoReport {
    pub tax_id: i64,
    pub records: usize,
    pub found: usize,
    pub updated: usize,
    pub created: usize,
    pub obsoleted: usize,
    /// Cross-references stored by this run.
    pub crossrefs: usize,
    /// References left out per database name missing from the catalog.
    pub unknown_crossref_dbs: BTreeMap<String, usize>,
}

/// One data row of the file.
struct GeneInfoRow {
    entrez_id: i64,
    record: GeneRecord,
    /// (database name, reference id) pairs.
    xrefs: BTreeSet<(String, String)>,
}

pub fn import_gene_info<C, R>(
    catalog: &mut C,
    reader: R,
    options: &GeneInfoOptions,
) -> Result<GeneInfoReport, LoaderError>
where
    C: Catalog,
    R: BufRead,
{
    let mut work = catalog.begin_import()?;
    let organism = work
        .find_organism(options.tax_id)?
        .ok_or(LoaderError::OrganismNotFound(options.tax_id))?;
    let file_tax_id = options.gi_tax_id.unwrap_or(options.tax_id);
    let width = options.width();

    let in_catalog: HashSet<i64> = work.organism_entrez_ids(organism.id)?.into_iter().collect();
    let mut seen = HashSet::new();
    let mut report = GeneInfoReport {
        tax_id: options.tax_id,
        records: 0,
        found: 0,
        updated: 0,
        created: 0,
        obsoleted: 0,
        crossrefs: 0,
        unknown_crossref_dbs: BTreeMap::new(),
    };
    let mut xrdbs: HashMap<String, Option<CrossRefDb>> = HashMap::new();

    for entry in NumberedLines::new(reader) {
        let (line, text) = entry?;
        if text.starts_with('#') || text.trim().is_empty() {
            continue;
        }
        let tokens = split_tabs(&text);
        if tokens.len() < width {
            return Err(LoaderError::ColumnCount {
                line,
                expected: width,
            });
        }
        if tokens[options.symbol_col] == "NEWENTRY" {
            debug!(line, "NEWENTRY line skipped");
            continue;
        }
        if parse_integer(line, tokens[TAX_ID_COL])? != file_tax_id {
            continue;
        }
        report.records += 1;

        let row = gene_row(line, &tokens, organism.id, options)?;
        seen.insert(row.entrez_id);

        let gene_id = if in_catalog.contains(&row.entrez_id) {
            report.found += 1;
            let Some(existing) = work.find_gene_by_entrez(organism.id, row.entrez_id)? else {
                continue;
            };
            if !row.record.matches(&existing) {
                work.update_gene(existing.id, &row.record)?;
                report.updated += 1;
            }
            existing.id
        } else {
            debug!(entrez_id = row.entrez_id, "new gene");
            report.created += 1;
            work.insert_gene(&row.record)?
        };

        store_crossrefs(&mut work, &mut xrdbs, gene_id, &row.xrefs, &mut report)?;
    }

    for entrez_id in in_catalog.difference(&seen) {
        if let Some(gene) = work.find_gene_by_entrez(organism.id, *entrez_id)?
            && !gene.obsolete
        {
            work.set_gene_obsolete(gene.id, true)?;
            report.obsoleted += 1;
        }
    }

    if report.records < MIN_GENE_RECORDS {
        return Err(LoaderError::TooFewGeneRecords {
            tax_id: options.tax_id,
            found: report.records,
        });
    }

    work.commit()?;
    info!(
        tax_id = report.tax_id,
        found = report.found,
        updated = report.updated,
        created = report.created,
        obsoleted = report.obsoleted,
        crossrefs = report.crossrefs,
        "gene info import committed"
    );
    Ok(report)
}

fn store_crossrefs<W: UnitOfWork>(
    work: &mut W,
    xrdbs: &mut HashMap<String, Option<CrossRefDb>>,
    gene_id: GeneId,
    xrefs: &BTreeSet<(String, String)>,
    report: &mut GeneInfoReport,
) -> Result<(), LoaderError> {
    for (db_name, xrid) in xrefs {
        if xrid.is_empty() {
            debug!(%db_name, "cross-reference without id left out");
            continue;
        }
        if !xrdbs.contains_key(db_name) {
            let found = work.find_crossref_db(db_name)?;
            if found.is_none() {
                warn!("crossrefdb ({db_name}) not in catalog; its references are skipped");
            }
            xrdbs.insert(db_name.clone(), found);
        }
        let Some(Some(db)) = xrdbs.get(db_name) else {
            *report.unknown_crossref_dbs.entry(db_name.clone()).or_default() += 1;
            continue;
        };
        let added = work.add_crossref(&CrossRef {
            crossref_db_id: db.id,
            xrid: xrid.clone(),
            gene_id,
        })?;
        if added {
            report.crossrefs += 1;
        }
    }
    Ok(())
}

fn gene_row(
    line: usize,
    tokens: &[&str],
    organism_id: OrganismId,
    options: &GeneInfoOptions,
) -> Result<GeneInfoRow, LoaderError> {
    let entrez_id = parse_integer(line, tokens[ENTREZ_COL])?;
    let standard_name = tokens[options.symbol_col].to_string();

    let mut systematic_name = tokens[options.systematic_col].trim().to_string();
    if systematic_name.is_empty() || systematic_name == "-" {
        systematic_name = standard_name.clone();
    }
    if tokens[CHROMOSOME_COL] == "MT" && !systematic_name.starts_with("MT") {
        systematic_name = format!("MT-{systematic_name}");
    }

    let aliases = tokens[options.alias_col].trim();
    let alias_list: Vec<&str> = if aliases.is_empty() || aliases == "-" {
        Vec::new()
    } else {
        aliases.split('|').collect()
    };

    let mut xrefs = BTreeSet::new();
    let raw_xrefs = tokens[XREF_COL];
    if !raw_xrefs.is_empty() && raw_xrefs != "-" {
        if let Some(db_name) = &options.systematic_xrdb {
            xrefs.insert((db_name.clone(), systematic_name.clone()));
        }
        for xref in raw_xrefs.split('|') {
            let (db_name, xrid) = xref.split_once(':').unwrap_or((xref, ""));
            xrefs.insert((db_name.to_string(), xrid.to_string()));
        }
    }

    let mut weight = (2 * xrefs.len() + alias_list.len()) as f64;
    if tokens[TYPE_COL] == "protein-coding" {
        weight *= 2.0;
    }

    Ok(GeneInfoRow {
        entrez_id,
        record: GeneRecord {
            organism_id,
            entrez_id: Some(entrez_id),
            systematic_name,
            standard_name: Some(standard_name),
            description: tokens[DESCRIPTION_COL].to_string(),
            aliases: alias_list.join(" "),
            weight,
            obsolete: false,
        },
        xrefs,
    })
}

pub(crate) fn parse_integer(line: usize, value: &str) -> Result<i64, LoaderError> {
    value
        .trim()
        .parse()
        .map_err(|_| LoaderError::InvalidInteger {
            line,
            value: value.to_string(),
        })
}
