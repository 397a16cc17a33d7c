//! Gene-gene network import.
//!
//! Input is tab-delimited with a header line and four columns per row:
//! `gene1`, `gene2`, weight magnitude and weight sign (`+` or `-`).

use std::collections::{HashMap, HashSet};
use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{
    Catalog, EdgeRepository, GeneRepository, ModelRepository, UnitOfWork, resolve_gene,
};
use crate::domain::{Edge, GeneId, SkippedRecord};
use crate::error::LoaderError;
use crate::fs_util::{NumberedLines, split_tabs};

pub const NETWORK_COLUMNS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkReport {
    pub model: String,
    pub directed: bool,
    pub cutoff: f64,
    pub imported: usize,
    pub below_cutoff: usize,
    pub batches: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Systematic name lookups, remembered for the rest of the import.
#[derive(Default)]
struct GeneCache {
    resolved: HashMap<String, Result<GeneId, String>>,
}

impl GeneCache {
    fn lookup<R: GeneRepository + ?Sized>(
        &mut self,
        repo: &R,
        name: &str,
    ) -> Result<Result<GeneId, String>, LoaderError> {
        if let Some(cached) = self.resolved.get(name) {
            return Ok(cached.clone());
        }
        let resolved = match resolve_gene(repo, name) {
            Ok(gene) => Ok(gene.id),
            Err(err) if err.is_recoverable() => Err(err.to_string()),
            Err(err) => return Err(err),
        };
        self.resolved.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }
}

/// Loads the edges of `model_title` from `reader`, flushing every
/// `batch_size` accepted rows. Any fatal error discards every batch.
pub fn import_network<C, R>(
    catalog: &mut C,
    reader: R,
    model_title: &str,
    batch_size: usize,
) -> Result<NetworkReport, LoaderError>
where
    C: Catalog,
    R: BufRead,
{
    if batch_size == 0 {
        return Err(LoaderError::InvalidValue(
            "edge batch size must be at least 1".to_string(),
        ));
    }

    let mut work = catalog.begin_import()?;
    let model = work
        .find_model(model_title)?
        .ok_or_else(|| LoaderError::ModelNotFound(model_title.to_string()))?;
    let directed = model.directed_g2g_edge;
    let check_unique = work.model_has_edges(model.id)?;

    let mut report = NetworkReport {
        model: model.title.clone(),
        directed,
        cutoff: model.g2g_edge_cutoff,
        imported: 0,
        below_cutoff: 0,
        batches: 0,
        skipped: Vec::new(),
    };
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut genes = GeneCache::default();
    let mut buffer: Vec<Edge> = Vec::with_capacity(batch_size);

    for entry in NumberedLines::new(reader).skip(1) {
        let (line, text) = entry?;
        if text.is_empty() {
            debug!(line, "blank line skipped");
            continue;
        }
        let tokens = split_tabs(&text);
        if tokens.len() != NETWORK_COLUMNS {
            return Err(LoaderError::ColumnCount {
                line,
                expected: NETWORK_COLUMNS,
            });
        }
        let (gene1, gene2) = (tokens[0], tokens[1]);
        if gene1 == gene2 {
            return Err(LoaderError::SelfLoop {
                line,
                gene: gene1.to_string(),
            });
        }

        let value = format!("{}{}", tokens[3], tokens[2]);
        let weight: f64 = value
            .parse()
            .map_err(|_| LoaderError::WeightNotFloat {
                line,
                value: value.clone(),
            })?;
        if !(-1.0..=1.0).contains(&weight) {
            return Err(LoaderError::WeightRange { line, value });
        }
        if weight.abs() < model.g2g_edge_cutoff {
            report.below_cutoff += 1;
            continue;
        }

        let pair = (gene1.to_string(), gene2.to_string());
        let reverse_seen = !directed && seen.contains(&(pair.1.clone(), pair.0.clone()));
        if seen.contains(&pair) || reverse_seen {
            return Err(LoaderError::DuplicatePair {
                line,
                gene1: pair.0,
                gene2: pair.1,
            });
        }
        seen.insert(pair);

        let mut unresolved = None;
        let mut ids = [GeneId(0); 2];
        for (slot, name) in ids.iter_mut().zip([gene1, gene2]) {
            match genes.lookup(&work, name)? {
                Ok(id) => *slot = id,
                Err(reason) => {
                    unresolved = Some((name, reason));
                    break;
                }
            }
        }
        if let Some((name, reason)) = unresolved {
            warn!("input file line #{line}: {reason}; edge skipped");
            report.skipped.push(SkippedRecord {
                line: Some(line),
                gene: name.to_string(),
                reason,
            });
            continue;
        }
        let [id1, id2] = ids;

        if check_unique
            && (work.edge_exists(model.id, id1, id2)?
                || (!directed && work.edge_exists(model.id, id2, id1)?))
        {
            return Err(LoaderError::UniquenessViolation {
                line,
                gene1: gene1.to_string(),
                gene2: gene2.to_string(),
                model: model.title.clone(),
            });
        }

        buffer.push(Edge {
            model_id: model.id,
            gene1_id: id1,
            gene2_id: id2,
            weight,
        });
        if buffer.len() >= batch_size {
            flush(&mut work, &mut buffer, &mut report)?;
        }
    }
    if !buffer.is_empty() {
        flush(&mut work, &mut buffer, &mut report)?;
    }

    work.commit()?;
    info!(
        model = %report.model,
        imported = report.imported,
        below_cutoff = report.below_cutoff,
        skipped = report.skipped.len(),
        "network import committed"
    );
    Ok(report)
}

fn flush<W: UnitOfWork>(
    work: &mut W,
    buffer: &mut Vec<Edge>,
    report: &mut NetworkReport,
) -> Result<(), LoaderError> {
    work.insert_edges(buffer)?;
    report.imported += buffer.len();
    report.batches += 1;
    debug!(rows = buffer.len(), batch = report.batches, "edge batch flushed");
    buffer.clear();
    Ok(())
}
