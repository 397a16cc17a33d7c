//! Create-or-update operations that prepare a catalog for imports.

use serde::Serialize;
use tracing::info;

use crate::catalog::{
    Catalog, CrossRefRepository, ModelRepository, OrganismRepository,
    ParticipationTypeRepository, SignatureRepository, UnitOfWork,
};
use crate::config::MlModelConfig;
use crate::domain::{
    CrossRefDb, MlModel, NewMlModel, NewOrganism, Organism, ParticipationType, Upsert,
    non_blank,
};
use crate::error::LoaderError;

pub fn set_organism<C: Catalog>(
    catalog: &mut C,
    taxonomy_id: i64,
    common_name: &str,
    scientific_name: &str,
    url_template: Option<&str>,
) -> Result<(Organism, Upsert), LoaderError> {
    if taxonomy_id <= 0 {
        return Err(LoaderError::InvalidValue(format!(
            "taxonomy id must be positive, got {taxonomy_id}"
        )));
    }
    let organism = NewOrganism {
        taxonomy_id,
        common_name: non_blank("common name", common_name)?,
        scientific_name: non_blank("scientific name", scientific_name)?,
        url_template: url_template
            .map(str::trim)
            .filter(|template| !template.is_empty())
            .map(str::to_string),
    };

    let mut work = catalog.begin_import()?;
    let (organism, action) = work.upsert_organism(&organism)?;
    work.commit()?;
    info!(taxonomy_id, slug = %organism.slug, %action, "organism");
    Ok((organism, action))
}

pub fn set_participation_type<C: Catalog>(
    catalog: &mut C,
    name: &str,
    description: &str,
) -> Result<(ParticipationType, Upsert), LoaderError> {
    let name = non_blank("participation type name", name)?;
    let description = non_blank("participation type description", description)?;

    let mut work = catalog.begin_import()?;
    let (kind, action) = work.upsert_participation_type(&name, &description)?;
    work.commit()?;
    info!(name = %kind.name, %action, "participation type");
    Ok((kind, action))
}

/// Registers a cross-reference database. `url` may hold `_REPL_`, which
/// front ends replace with the reference id.
pub fn set_crossref_db<C: Catalog>(
    catalog: &mut C,
    name: &str,
    url: &str,
) -> Result<(CrossRefDb, Upsert), LoaderError> {
    let name = non_blank("cross-reference database name", name)?;
    let url = non_blank("cross-reference database url", url)?;

    let mut work = catalog.begin_import()?;
    let (db, action) = work.upsert_crossref_db(&name, &url)?;
    work.commit()?;
    info!(name = %db.name, %action, "cross-reference database");
    Ok((db, action))
}

pub fn set_ml_model<C: Catalog>(
    catalog: &mut C,
    config: &MlModelConfig,
) -> Result<(MlModel, Upsert), LoaderError> {
    let title = non_blank("model title", &config.title)?;
    if !(0.0..=1.0).contains(&config.g2g_edge_cutoff) {
        return Err(LoaderError::InvalidValue(format!(
            "g2g_edge_cutoff ({}) must be within 0.0~1.0",
            config.g2g_edge_cutoff
        )));
    }

    let mut work = catalog.begin_import()?;
    let organism = work
        .find_organism(config.organism_tax_id)?
        .ok_or(LoaderError::OrganismNotFound(config.organism_tax_id))?;
    let (model, action) = work.upsert_model(&NewMlModel {
        title,
        organism_id: organism.id,
        directed_g2g_edge: config.directed_g2g_edge,
        g2g_edge_cutoff: config.g2g_edge_cutoff,
        desc_html: config.desc_html.clone(),
    })?;
    work.commit()?;
    info!(title = %model.title, %action, "ml model");
    Ok((model, action))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureReport {
    pub model: String,
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

/// Registers each signature name under `model_title` unless it is already
/// there.
pub fn register_signatures<C: Catalog>(
    catalog: &mut C,
    model_title: &str,
    names: &[String],
) -> Result<SignatureReport, LoaderError> {
    let names = names
        .iter()
        .map(|name| non_blank("signature name", name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut work = catalog.begin_import()?;
    let model = work
        .find_model(model_title)?
        .ok_or_else(|| LoaderError::ModelNotFound(model_title.to_string()))?;

    let mut report = SignatureReport {
        model: model.title.clone(),
        created: Vec::new(),
        existing: Vec::new(),
    };
    for name in names {
        if work.find_signature(&name, model.id)?.is_some() {
            report.existing.push(name);
        } else {
            work.insert_signature(&name, model.id)?;
            report.created.push(name);
        }
    }
    work.commit()?;
    info!(
        model = %report.model,
        created = report.created.len(),
        existing = report.existing.len(),
        "signatures"
    );
    Ok(report)
}
