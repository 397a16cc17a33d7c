//! Curated gene name and alias maintenance.
//!
//! Both imports read tab-separated files keyed by systematic name, skip `#`
//! comment lines and blank lines, and leave out rows whose name matches
//! several catalog genes.

use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, GeneRepository, OrganismRepository, UnitOfWork, resolve_gene};
use crate::domain::{GeneRecord, SkippedRecord};
use crate::error::LoaderError;
use crate::fs_util::{NumberedLines, split_tabs};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasReport {
    pub records: usize,
    pub added: usize,
    pub unchanged: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Data lines with their 1-based line numbers and tab-separated fields.
fn data_lines<R: BufRead>(
    reader: R,
    fields: usize,
) -> impl Iterator<Item = Result<(usize, Vec<String>), LoaderError>> {
    NumberedLines::new(reader).filter_map(move |entry| {
        let (line, text) = match entry {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        if text.trim().is_empty() || text.trim_start().starts_with('#') {
            debug!(line, "comment or blank line skipped");
            return None;
        }
        let tokens: Vec<String> = split_tabs(&text)
            .into_iter()
            .map(|token| token.trim().to_string())
            .collect();
        if tokens.len() != fields {
            return Some(Err(LoaderError::ColumnCount {
                line,
                expected: fields,
            }));
        }
        Some(Ok((line, tokens)))
    })
}

/// Appends the alias in column 2 to the gene named in column 1, unless the
/// gene already lists it. Names unknown to the catalog are skipped.
pub fn add_gene_aliases<C, R>(catalog: &mut C, reader: R) -> Result<AliasReport, LoaderError>
where
    C: Catalog,
    R: BufRead,
{
    let mut work = catalog.begin_import()?;
    let mut report = AliasReport {
        records: 0,
        added: 0,
        unchanged: 0,
        skipped: Vec::new(),
    };

    for entry in data_lines(reader, 2) {
        let (line, tokens) = entry?;
        let (name, alias) = (&tokens[0], &tokens[1]);
        if name.is_empty() {
            return Err(LoaderError::BlankGene { line });
        }
        report.records += 1;
        let gene = match resolve_gene(&work, name) {
            Ok(gene) => gene,
            Err(err) if err.is_recoverable() => {
                warn!("line #{line} ignored: {err}");
                report.skipped.push(SkippedRecord {
                    line: Some(line),
                    gene: name.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
            Err(err) => return Err(err),
        };
        if alias.is_empty() || gene.alias_list().contains(&alias.as_str()) {
            report.unchanged += 1;
            continue;
        }
        let mut record = gene.to_record();
        let mut aliases = gene.alias_list();
        aliases.push(alias);
        record.aliases = aliases.join(" ");
        work.update_gene(gene.id, &record)?;
        report.added += 1;
    }

    work.commit()?;
    info!(added = report.added, skipped = report.skipped.len(), "gene aliases committed");
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneNamesReport {
    pub tax_id: i64,
    pub records: usize,
    pub updated: usize,
    pub created: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Applies (systematic name, standard name, space-separated aliases) rows.
/// Non-empty fields replace the stored ones; names missing from the
/// catalog become new genes of organism `tax_id` without an entrez id.
pub fn update_gene_names<C, R>(
    catalog: &mut C,
    reader: R,
    tax_id: i64,
) -> Result<GeneNamesReport, LoaderError>
where
    C: Catalog,
    R: BufRead,
{
    let mut work = catalog.begin_import()?;
    let organism = work
        .find_organism(tax_id)?
        .ok_or(LoaderError::OrganismNotFound(tax_id))?;
    let mut report = GeneNamesReport {
        tax_id,
        records: 0,
        updated: 0,
        created: 0,
        skipped: Vec::new(),
    };

    for entry in data_lines(reader, 3) {
        let (line, tokens) = entry?;
        let (name, standard_name, aliases) = (&tokens[0], &tokens[1], &tokens[2]);
        if name.is_empty() {
            return Err(LoaderError::BlankGene { line });
        }
        report.records += 1;
        match resolve_gene(&work, name) {
            Ok(gene) => {
                let mut record = gene.to_record();
                if !standard_name.is_empty() {
                    record.standard_name = Some(standard_name.clone());
                }
                if !aliases.is_empty() {
                    record.aliases = aliases.clone();
                }
                if !record.matches(&gene) {
                    work.update_gene(gene.id, &record)?;
                    report.updated += 1;
                }
            }
            Err(LoaderError::GeneNotFound(_)) => {
                debug!(line, %name, "creating curated gene");
                work.insert_gene(&GeneRecord {
                    organism_id: organism.id,
                    entrez_id: None,
                    systematic_name: name.clone(),
                    standard_name: Some(standard_name.clone()).filter(|value| !value.is_empty()),
                    description: String::new(),
                    aliases: aliases.clone(),
                    weight: 1.0,
                    obsolete: false,
                })?;
                report.created += 1;
            }
            Err(err) if err.is_recoverable() => {
                warn!("line #{line} ignored: {err}");
                report.skipped.push(SkippedRecord {
                    line: Some(line),
                    gene: name.clone(),
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    work.commit()?;
    info!(
        tax_id,
        updated = report.updated,
        created = report.created,
        skipped = report.skipped.len(),
        "gene names committed"
    );
    Ok(report)
}
