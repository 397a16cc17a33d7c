//! Gene-sample expression import.
//!
//! The header names one sample data source per column after a leading label
//! cell; each data line holds a systematic gene name and one value per
//! column.

use std::collections::HashSet;
use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{
    Catalog, ExpressionRepository, GeneRepository, OrganismRepository, SampleRepository,
    UnitOfWork,
};
use crate::domain::{ExpressionValue, SampleId, SkippedRecord};
use crate::error::LoaderError;
use crate::fs_util::{NumberedLines, split_tabs};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpressionReport {
    pub tax_id: i64,
    pub samples: usize,
    /// Header data sources with no sample in the catalog; their columns
    /// are read but not stored.
    pub skipped_data_sources: Vec<String>,
    pub genes: usize,
    pub values: usize,
    pub skipped: Vec<SkippedRecord>,
}

pub fn import_expression<C, R>(
    catalog: &mut C,
    reader: R,
    tax_id: i64,
) -> Result<ExpressionReport, LoaderError>
where
    C: Catalog,
    R: BufRead,
{
    let mut work = catalog.begin_import()?;
    let organism = work
        .find_organism(tax_id)?
        .ok_or(LoaderError::OrganismNotFound(tax_id))?;

    let mut lines = NumberedLines::new(reader);
    let (_, header) = lines.next().transpose()?.ok_or(LoaderError::EmptyMatrix)?;
    let mut report = ExpressionReport {
        tax_id,
        samples: 0,
        skipped_data_sources: Vec::new(),
        genes: 0,
        values: 0,
        skipped: Vec::new(),
    };
    let samples = read_header(&work, &header, &mut report)?;
    if samples.is_empty() {
        return Err(LoaderError::EmptyMatrix);
    }

    for entry in lines {
        let (line, text) = entry?;
        if text.is_empty() {
            debug!(line, "blank line skipped");
            continue;
        }
        let tokens = split_tabs(&text);
        if tokens.len() != samples.len() + 1 {
            return Err(LoaderError::ColumnCount {
                line,
                expected: samples.len() + 1,
            });
        }
        let gene_name = tokens[0].trim();
        if gene_name.is_empty() {
            return Err(LoaderError::BlankGene { line });
        }

        let mut genes = work.find_organism_genes(organism.id, gene_name)?;
        let gene = match genes.len() {
            0 => {
                let reason = LoaderError::GeneNotFound(gene_name.to_string()).to_string();
                warn!("input file line #{line}: {reason}; row skipped");
                report.skipped.push(SkippedRecord {
                    line: Some(line),
                    gene: gene_name.to_string(),
                    reason,
                });
                continue;
            }
            1 => genes.remove(0),
            count => {
                return Err(LoaderError::AmbiguousGene {
                    name: gene_name.to_string(),
                    count,
                });
            }
        };

        let mut values = Vec::with_capacity(samples.len());
        for (offset, (sample, token)) in samples.iter().zip(&tokens[1..]).enumerate() {
            let value: f64 = token
                .trim()
                .parse()
                .map_err(|_| LoaderError::NonNumericValue {
                    line,
                    column: offset + 2,
                    value: token.to_string(),
                })?;
            if let Some(sample_id) = sample {
                values.push(ExpressionValue {
                    sample_id: *sample_id,
                    gene_id: gene.id,
                    value,
                });
            }
        }
        work.insert_expression_values(&values)?;
        report.genes += 1;
        report.values += values.len();
    }

    work.commit()?;
    info!(
        tax_id,
        genes = report.genes,
        values = report.values,
        skipped = report.skipped.len(),
        "expression import committed"
    );
    Ok(report)
}

/// One entry per data column: the catalog sample, or `None` when no sample
/// carries that data source.
fn read_header<R: SampleRepository>(
    repo: &R,
    header: &str,
    report: &mut ExpressionReport,
) -> Result<Vec<Option<SampleId>>, LoaderError> {
    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    for (offset, source) in split_tabs(header).into_iter().skip(1).enumerate() {
        let column = offset + 2;
        if source.trim().is_empty() {
            return Err(LoaderError::BlankDataSource { column });
        }
        if !seen.insert(source) {
            return Err(LoaderError::DuplicateDataSource {
                column,
                value: source.to_string(),
            });
        }
        match repo.find_sample_by_data_source(source)? {
            Some(sample) => {
                report.samples += 1;
                samples.push(Some(sample.id));
            }
            None => {
                warn!("input file line #1: data source in column #{column} not found in catalog: {source}");
                report.skipped_data_sources.push(source.to_string());
                samples.push(None);
            }
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;
    use crate::catalog::testing::seeded_catalog;
    use crate::catalog::{ExperimentRepository, MemoryCatalog};
    use crate::domain::NewExperiment;

    fn catalog(genes: &[&str]) -> MemoryCatalog {
        let mut catalog = seeded_catalog(genes, &[], false, 0.0);
        let mut work = catalog.begin_import().unwrap();
        work.insert_experiment(&NewExperiment {
            accession: "E-GEOD-1".to_string(),
            name: "biofilm".to_string(),
            description: String::new(),
        })
        .unwrap();
        for source in ["GSM1.CEL", "GSM2.CEL"] {
            let sample = work.insert_sample(source, Some(source)).unwrap();
            work.link_sample("E-GEOD-1", sample.id).unwrap();
        }
        work.commit().unwrap();
        catalog
    }

    fn gene_values(catalog: &mut MemoryCatalog, name: &str) -> Vec<f64> {
        let work = catalog.begin_import().unwrap();
        let gene = work.find_genes_by_systematic_name(name).unwrap()[0].id;
        work.expression_values_for_gene(gene)
            .unwrap()
            .into_iter()
            .map(|value| value.value)
            .collect()
    }

    #[test]
    fn unknown_sources_and_genes_are_skipped() {
        let mut catalog = catalog(&["PA0001", "PA0002"]);
        let input = "gene\tGSM1.CEL\tGSM9.CEL\tGSM2.CEL\n\
                     PA0001\t7.5\t1\t8.25\n\
                     PA9999\t1\t1\t1\n\
                     \n\
                     PA0002\t-0.5\t2\t3\n";
        let report = import_expression(&mut catalog, Cursor::new(input), 208964).unwrap();
        assert_eq!(report.samples, 2);
        assert_eq!(report.skipped_data_sources, ["GSM9.CEL"]);
        assert_eq!(report.genes, 2);
        assert_eq!(report.values, 4);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].gene, "PA9999");
        assert_eq!(report.skipped[0].line, Some(3));

        assert_eq!(gene_values(&mut catalog, "PA0001"), vec![7.5, 8.25]);
        assert_eq!(catalog.expression_count(), 4);
    }

    #[test]
    fn header_problems_are_fatal() {
        let mut catalog = catalog(&["PA0001"]);
        assert_matches!(
            import_expression(&mut catalog, Cursor::new("gene\tGSM1.CEL\t \n"), 208964),
            Err(LoaderError::BlankDataSource { column: 3 })
        );
        assert_matches!(
            import_expression(&mut catalog, Cursor::new("gene\tGSM1.CEL\tGSM1.CEL\n"), 208964),
            Err(LoaderError::DuplicateDataSource { column: 3, .. })
        );
        assert_matches!(
            import_expression(&mut catalog, Cursor::new("gene\n"), 208964),
            Err(LoaderError::EmptyMatrix)
        );
        assert_matches!(
            import_expression(&mut catalog, Cursor::new("gene\tGSM1.CEL\n"), 9606),
            Err(LoaderError::OrganismNotFound(9606))
        );
    }

    #[test]
    fn bad_rows_roll_back() {
        let mut catalog = catalog(&["PA0001", "PA0002"]);
        let header = "gene\tGSM1.CEL\tGSM2.CEL\n";
        assert_matches!(
            import_expression(&mut catalog, Cursor::new(format!("{header}PA0001\t1\t2\nPA0002\t1\n")), 208964),
            Err(LoaderError::ColumnCount { line: 3, expected: 3 })
        );
        assert_matches!(
            import_expression(&mut catalog, Cursor::new(format!("{header}PA0001\t1\thigh\n")), 208964),
            Err(LoaderError::NonNumericValue { line: 2, column: 3, .. })
        );
        assert_matches!(
            import_expression(&mut catalog, Cursor::new(format!("{header}\t1\t2\n")), 208964),
            Err(LoaderError::BlankGene { line: 2 })
        );
        assert_eq!(catalog.expression_count(), 0);
    }

    #[test]
    fn ambiguous_gene_is_fatal() {
        let mut catalog = catalog(&["PA0001", "PA0001"]);
        let input = "gene\tGSM1.CEL\tGSM2.CEL\nPA0001\t1\t2\n";
        assert_matches!(
            import_expression(&mut catalog, Cursor::new(input), 208964),
            Err(LoaderError::AmbiguousGene { count: 2, .. })
        );
    }
}
