//! Gene-by-node weight matrices.
//!
//! The first line names the nodes after a leading label cell; each following
//! line holds a gene identifier and one weight per node.

use std::collections::HashMap;
use std::io::BufRead;

use tracing::debug;

use crate::error::LoaderError;
use crate::fs_util::{NumberedLines, split_tabs};

#[derive(Debug, Clone, PartialEq)]
pub struct WeightMatrix {
    nodes: Vec<String>,
    genes: Vec<String>,
    /// One row per gene, one weight per node, in header order.
    rows: Vec<Vec<f64>>,
}

impl WeightMatrix {
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, LoaderError> {
        let mut lines = NumberedLines::new(reader);

        let (_, header) = lines.next().transpose()?.ok_or(LoaderError::EmptyMatrix)?;
        let header_tokens = split_tabs(&header);
        let nodes: Vec<String> = header_tokens
            .iter()
            .skip(1)
            .map(|node| node.trim().to_string())
            .collect();
        if nodes.is_empty() {
            return Err(LoaderError::EmptyMatrix);
        }
        let expected = header_tokens.len();

        let mut genes = Vec::new();
        let mut rows = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for next in lines {
            let (line, text) = next?;
            if text.is_empty() {
                debug!(line, "blank line skipped");
                continue;
            }
            let tokens = split_tabs(&text);
            if tokens.len() != expected {
                return Err(LoaderError::MalformedRow {
                    line,
                    expected,
                    found: tokens.len(),
                });
            }

            let gene = tokens[0].trim().to_string();
            if gene.is_empty() {
                return Err(LoaderError::BlankGene { line });
            }
            if let Some(&first_line) = seen.get(&gene) {
                return Err(LoaderError::DuplicateGene {
                    line,
                    first_line,
                    gene,
                });
            }

            let weights = tokens[1..]
                .iter()
                .map(|token| {
                    token
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| LoaderError::NonNumericWeight {
                            line,
                            token: token.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            seen.insert(gene.clone(), line);
            genes.push(gene);
            rows.push(weights);
        }

        Ok(Self { nodes, genes, rows })
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    /// Gene/weight pairs of one node column, in file order.
    pub fn column(&self, index: usize) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.genes
            .iter()
            .zip(self.rows.iter())
            .map(move |(gene, row)| (gene.as_str(), row[index]))
    }
}
