//! NCBI `gene_history` import: discontinued genes become obsolete.

use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{Catalog, GeneRepository, OrganismRepository, UnitOfWork};
use crate::domain::GeneRecord;
use crate::error::LoaderError;
use crate::fs_util::{NumberedLines, split_tabs};
use crate::gene_info::parse_integer;

/// Column layout and organism filter. Columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneHistoryOptions {
    pub tax_id: i64,
    pub tax_id_col: usize,
    pub discontinued_id_col: usize,
    pub discontinued_symbol_col: usize,
}

impl GeneHistoryOptions {
    pub fn new(tax_id: i64) -> Self {
        Self {
            tax_id,
            tax_id_col: 1,
            discontinued_id_col: 3,
            discontinued_symbol_col: 4,
        }
    }

    fn zero_based(&self) -> Result<(usize, usize, usize), LoaderError> {
        let shift = |name: &str, col: usize| {
            col.checked_sub(1).ok_or_else(|| {
                LoaderError::InvalidValue(format!("{name} must be a positive integer"))
            })
        };
        Ok((
            shift("tax_id_col", self.tax_id_col)?,
            shift("discontinued_id_col", self.discontinued_id_col)?,
            shift("discontinued_symbol_col", self.discontinued_symbol_col)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneHistoryReport {
    pub tax_id: i64,
    pub records: usize,
    pub obsoleted: usize,
    pub created: usize,
}

pub fn import_gene_history<C, R>(
    catalog: &mut C,
    reader: R,
    options: &GeneHistoryOptions,
) -> Result<GeneHistoryReport, LoaderError>
where
    C: Catalog,
    R: BufRead,
{
    let (tax_col, id_col, symbol_col) = options.zero_based()?;
    let mut work = catalog.begin_import()?;
    let organism = work
        .find_organism(options.tax_id)?
        .ok_or(LoaderError::OrganismNotFound(options.tax_id))?;

    let mut report = GeneHistoryReport {
        tax_id: options.tax_id,
        records: 0,
        obsoleted: 0,
        created: 0,
    };

    for entry in NumberedLines::new(reader) {
        let (line, text) = entry?;
        if text.starts_with('#') || text.trim().is_empty() {
            continue;
        }
        let fields = split_tabs(text.trim_end());
        let out_of_range = [
            ("tax_id_col", tax_col),
            ("discontinued_id_col", id_col),
            ("discontinued_symbol_col", symbol_col),
        ]
        .into_iter()
        .find(|(_, col)| *col >= fields.len());
        if let Some((column, _)) = out_of_range {
            return Err(LoaderError::ColumnOutOfRange {
                line,
                column: column.to_string(),
            });
        }

        if parse_integer(line, fields[tax_col])? != options.tax_id {
            continue;
        }
        report.records += 1;
        let entrez_id = parse_integer(line, fields[id_col])?;

        match work.find_gene_by_entrez(organism.id, entrez_id)? {
            Some(gene) => {
                if !gene.obsolete {
                    work.set_gene_obsolete(gene.id, true)?;
                    report.obsoleted += 1;
                }
            }
            None => {
                let symbol = fields[symbol_col].to_string();
                debug!(entrez_id, %symbol, "creating discontinued gene");
                work.insert_gene(&GeneRecord {
                    organism_id: organism.id,
                    entrez_id: Some(entrez_id),
                    systematic_name: symbol.clone(),
                    standard_name: Some(symbol),
                    description: String::new(),
                    aliases: String::new(),
                    weight: 0.0,
                    obsolete: true,
                })?;
                report.created += 1;
            }
        }
    }

    work.commit()?;
    info!(
        tax_id = report.tax_id,
        obsoleted = report.obsoleted,
        created = report.created,
        "gene history import committed"
    );
    Ok(report)
}
