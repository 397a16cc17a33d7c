//! Upserts gene-signature participations from a weight matrix.

use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{
    Catalog, ModelRepository, ParticipationRepository, ParticipationTypeRepository,
    SignatureRepository, UnitOfWork, resolve_gene,
};
use crate::domain::{Participation, SkippedRecord, Upsert};
use crate::error::LoaderError;
use crate::heavy;
use crate::matrix::WeightMatrix;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipationReport {
    pub model: String,
    pub participation_type: String,
    pub nodes: usize,
    pub signatures: usize,
    pub heavy_genes: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// Classifies the heavy genes of every node in `reader` and records them as
/// participations of the node's `pos`/`neg` signatures.
///
/// The whole import runs in one unit of work: a missing model, participation
/// type or signature, or any malformed input, leaves the catalog untouched.
/// Genes that do not resolve to exactly one catalog entry are skipped.
pub fn import_participation<C, R>(
    catalog: &mut C,
    reader: R,
    model_title: &str,
    participation_type: &str,
) -> Result<ParticipationReport, LoaderError>
where
    C: Catalog,
    R: BufRead,
{
    let mut work = catalog.begin_import()?;

    let model = work
        .find_model(model_title)?
        .ok_or_else(|| LoaderError::ModelNotFound(model_title.to_string()))?;
    let kind = work
        .find_participation_type(participation_type)?
        .ok_or_else(|| LoaderError::ParticipationTypeNotFound(participation_type.to_string()))?;

    let matrix = WeightMatrix::parse(reader)?;
    let heavy = heavy::classify(&matrix)?;

    let mut report = ParticipationReport {
        model: model.title.clone(),
        participation_type: kind.name.clone(),
        nodes: matrix.nodes().len(),
        signatures: heavy.buckets.len(),
        heavy_genes: heavy.heavy_gene_count(),
        created: 0,
        updated: 0,
        skipped: Vec::new(),
    };

    for bucket in &heavy.buckets {
        let name = bucket.signature_name();
        let signature = work.find_signature(&name, model.id)?.ok_or_else(|| {
            LoaderError::SignatureNotFound {
                name: name.clone(),
                model: model.title.clone(),
            }
        })?;

        for (gene_name, weight) in &bucket.genes {
            let gene = match resolve_gene(&work, gene_name) {
                Ok(gene) => gene,
                Err(err) if err.is_recoverable() => {
                    warn!("{err}; skipped for signature {name}");
                    report.skipped.push(SkippedRecord {
                        line: None,
                        gene: gene_name.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            let action = work.upsert_participation(&Participation {
                signature_id: signature.id,
                gene_id: gene.id,
                participation_type_id: kind.id,
                weight: *weight,
            })?;
            debug!(signature = %name, gene = %gene_name, %action, "participation");
            match action {
                Upsert::Created => report.created += 1,
                Upsert::Updated => report.updated += 1,
            }
        }
    }

    work.commit()?;
    info!(
        model = %report.model,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped.len(),
        "participation import committed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;
    use crate::catalog::testing::{MODEL, PARTICIPATION_TYPE, seeded_catalog};
    use crate::catalog::{ModelRepository, ParticipationRepository, SignatureRepository};

    /// Node1 has a single positive spike on PA0009; Node2 a single dip on
    /// PA0000.
    fn spiky_matrix() -> String {
        let mut input = String::from("gene\tNode1\tNode2\n");
        for idx in 0..10 {
            let node1 = if idx == 9 { 100.0 } else { 0.0 };
            let node2 = if idx == 0 { -100.0 } else { 0.0 };
            input.push_str(&format!("PA{idx:04}\t{node1}\t{node2}\n"));
        }
        input
    }

    fn genes() -> Vec<String> {
        (0..10).map(|idx| format!("PA{idx:04}")).collect()
    }

    #[test]
    fn heavy_genes_become_participations() {
        let names = genes();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut catalog = seeded_catalog(&refs, &["Node1", "Node2"], false, 0.0);

        let report =
            import_participation(&mut catalog, Cursor::new(spiky_matrix()), MODEL, PARTICIPATION_TYPE)
                .unwrap();
        assert_eq!(report.signatures, 4);
        assert_eq!(report.heavy_genes, 2);
        assert_eq!(report.created, 2);
        assert_eq!(report.updated, 0);
        assert!(report.skipped.is_empty());

        let work = catalog.begin_import().unwrap();
        let model = work.find_model(MODEL).unwrap().unwrap();
        let pos = work.find_signature("Node1pos", model.id).unwrap().unwrap();
        let rows = work.participations_for_signature(&pos).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weight, 100.0);
    }

    #[test]
    fn rerun_is_idempotent() {
        let names = genes();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut catalog = seeded_catalog(&refs, &["Node1", "Node2"], false, 0.0);

        import_participation(&mut catalog, Cursor::new(spiky_matrix()), MODEL, PARTICIPATION_TYPE)
            .unwrap();
        let again =
            import_participation(&mut catalog, Cursor::new(spiky_matrix()), MODEL, PARTICIPATION_TYPE)
                .unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.updated, 2);
        assert_eq!(catalog.participation_count(), 2);
    }

    #[test]
    fn unknown_gene_is_skipped() {
        let names: Vec<String> = genes().into_iter().filter(|g| g != "PA0009").collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut catalog = seeded_catalog(&refs, &["Node1", "Node2"], false, 0.0);

        let report =
            import_participation(&mut catalog, Cursor::new(spiky_matrix()), MODEL, PARTICIPATION_TYPE)
                .unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].gene, "PA0009");
        assert_eq!(catalog.participation_count(), 1);
    }

    #[test]
    fn ambiguous_gene_is_skipped() {
        let mut names = genes();
        names.push("PA0009".to_string());
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut catalog = seeded_catalog(&refs, &["Node1", "Node2"], false, 0.0);

        let report =
            import_participation(&mut catalog, Cursor::new(spiky_matrix()), MODEL, PARTICIPATION_TYPE)
                .unwrap();
        assert_eq!(report.heavy_genes, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].gene, "PA0009");
        assert_eq!(report.skipped[0].line, None);
        assert!(report.skipped[0].reason.contains("matches 2 records"));

        let work = catalog.begin_import().unwrap();
        let model = work.find_model(MODEL).unwrap().unwrap();
        let pos = work.find_signature("Node1pos", model.id).unwrap().unwrap();
        assert!(work.participations_for_signature(&pos).unwrap().is_empty());
        let neg = work.find_signature("Node2neg", model.id).unwrap().unwrap();
        let rows = work.participations_for_signature(&neg).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].weight, -100.0);
    }

    #[test]
    fn missing_signature_rolls_back() {
        let names = genes();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        // Node2 signatures are absent; Node1 writes happen first.
        let mut catalog = seeded_catalog(&refs, &["Node1"], false, 0.0);

        let err =
            import_participation(&mut catalog, Cursor::new(spiky_matrix()), MODEL, PARTICIPATION_TYPE)
                .unwrap_err();
        assert_matches!(err, LoaderError::SignatureNotFound { ref name, .. } if name == "Node2pos");
        assert_eq!(catalog.participation_count(), 0);
    }

    #[test]
    fn unknown_model_and_type() {
        let mut catalog = seeded_catalog(&["PA0001"], &["Node1"], false, 0.0);
        let err = import_participation(&mut catalog, Cursor::new(spiky_matrix()), "nope", PARTICIPATION_TYPE)
            .unwrap_err();
        assert_matches!(err, LoaderError::ModelNotFound(_));
        let err = import_participation(&mut catalog, Cursor::new(spiky_matrix()), MODEL, "nope")
            .unwrap_err();
        assert_matches!(err, LoaderError::ParticipationTypeNotFound(_));
    }
}
