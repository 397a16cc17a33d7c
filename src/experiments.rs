//! Experiment, sample and sample annotation import.
//!
//! Experiments come from an ArrayExpress-style JSON listing; samples and
//! their annotations come from the curated annotation spreadsheet exported
//! as tab-separated text. Only experiments named in the spreadsheet are
//! stored.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::BufRead;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ExperimentRepository, SampleRepository, UnitOfWork};
use crate::domain::{NewExperiment, Sample, SampleId};
use crate::error::LoaderError;
use crate::fs_util::{NumberedLines, split_tabs};

/// Spreadsheet columns, in file order.
pub const ANNOTATION_COLUMNS: [&str; 19] = [
    "accession",
    "sample",
    "cel_file",
    "strain",
    "genotype",
    "abx_marker",
    "variant_phenotype",
    "medium",
    "treatment",
    "biotic_int_lv_1",
    "biotic_int_lv_2",
    "growth_setting_1",
    "growth_setting_2",
    "nucleic_acid",
    "temperature",
    "od",
    "additional_notes",
    "description",
    "expt_summary",
];

const ACCESSION_COL: usize = 0;
const SAMPLE_COL: usize = 1;
const CEL_FILE_COL: usize = 2;
const FIRST_ANNOTATION_COL: usize = 3;
const SUMMARY_COL: usize = 18;

/// One spreadsheet row: a sample as it appears in one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    pub line: usize,
    pub accession: String,
    pub sample: String,
    pub cel_file: Option<String>,
    /// (annotation type, text) for every annotation column, blanks included.
    pub annotations: Vec<(&'static str, String)>,
}

/// Reads the spreadsheet. The header line is checked for width only.
pub fn parse_annotation_sheet<R: BufRead>(reader: R) -> Result<Vec<AnnotationRow>, LoaderError> {
    let width = ANNOTATION_COLUMNS.len();
    let mut lines = NumberedLines::new(reader);
    let (_, header) = lines.next().transpose()?.ok_or(LoaderError::ColumnCount {
        line: 1,
        expected: width,
    })?;
    if split_tabs(&header).len() != width {
        return Err(LoaderError::ColumnCount {
            line: 1,
            expected: width,
        });
    }

    let mut rows = Vec::new();
    for entry in lines {
        let (line, text) = entry?;
        if text.is_empty() {
            debug!(line, "blank line skipped");
            continue;
        }
        let tokens = split_tabs(&text);
        if tokens.len() != width {
            return Err(LoaderError::ColumnCount {
                line,
                expected: width,
            });
        }
        let required = |col: usize| {
            let value = tokens[col].trim();
            if value.is_empty() {
                return Err(LoaderError::BlankField {
                    line,
                    field: ANNOTATION_COLUMNS[col].to_string(),
                });
            }
            Ok(value.to_string())
        };
        let accession = required(ACCESSION_COL)?;
        let sample = required(SAMPLE_COL)?;
        let cel_file = Some(tokens[CEL_FILE_COL].trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let annotations = (FIRST_ANNOTATION_COL..SUMMARY_COL)
            .map(|col| (ANNOTATION_COLUMNS[col], tokens[col].trim().to_string()))
            .collect();
        rows.push(AnnotationRow {
            line,
            accession,
            sample,
            cel_file,
            annotations,
        });
    }
    Ok(rows)
}

/// Reads `experiments.experiment[]` from an ArrayExpress JSON listing.
pub fn parse_experiment_list(json: &str) -> Result<Vec<NewExperiment>, LoaderError> {
    let body: Value =
        serde_json::from_str(json).map_err(|err| LoaderError::ExperimentList(err.to_string()))?;
    body.pointer("/experiments/experiment")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            LoaderError::ExperimentList("no `experiments.experiment` list".to_string())
        })?
        .iter()
        .map(experiment_from)
        .collect()
}

fn experiment_from(entry: &Value) -> Result<NewExperiment, LoaderError> {
    let text = |field: &str| {
        entry
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LoaderError::ExperimentList(format!("experiment without `{field}`")))
    };
    let accession = text("accession")?;
    let description = match entry.pointer("/description/text") {
        Some(value) => scrub_description(value)
            .map_err(|reason| LoaderError::ExperimentList(format!("{accession}: {reason}")))?,
        None => String::new(),
    };
    Ok(NewExperiment {
        name: text("name")?,
        accession,
        description,
    })
}

/// Flattens description text that arrives either as a string or as a list
/// of strings and `{"a": {"$": ...}}` link sections.
fn scrub_description(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(text) => Ok(text.clone()),
        Value::Array(sections) => {
            let mut text = String::new();
            for section in sections {
                match section {
                    Value::String(part) => text.push_str(part),
                    Value::Object(map) if map.len() == 1 && map.get("br") == Some(&Value::Null) => {}
                    Value::Object(_) => {
                        let part = section
                            .pointer("/a/$")
                            .and_then(Value::as_str)
                            .ok_or_else(|| format!("cannot read description section {section}"))?;
                        text.push_str(part);
                    }
                    other => return Err(format!("cannot read description section {other}")),
                }
            }
            Ok(text)
        }
        other => Err(format!("cannot read description {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentReport {
    pub experiments: usize,
    pub rows: usize,
    pub samples_created: usize,
    pub samples_reused: usize,
    pub annotations_set: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Keep,
    Replace,
    Conflict,
}

/// Decides how an annotation seen again for an existing sample combines
/// with the stored text. Case-insensitive prefixes count as agreement, and
/// the longer text wins.
fn merge_annotation(stored: &str, incoming: &str) -> Merge {
    if incoming.is_empty() || stored == incoming {
        return Merge::Keep;
    }
    if stored.is_empty() {
        return Merge::Replace;
    }
    let (stored, incoming) = (stored.to_lowercase(), incoming.to_lowercase());
    if stored == incoming || stored.starts_with(&incoming) {
        Merge::Keep
    } else if incoming.starts_with(&stored) {
        Merge::Replace
    } else {
        Merge::Conflict
    }
}

/// Creates the annotated experiments and their samples in one unit of
/// work. The catalog must not hold any of the experiments yet. A sample
/// listed under several experiments is stored once; its annotations must
/// agree across rows or the whole import is rejected.
pub fn import_experiments<C: Catalog>(
    catalog: &mut C,
    experiments: &[NewExperiment],
    rows: &[AnnotationRow],
) -> Result<ExperimentReport, LoaderError> {
    let annotated: BTreeSet<&str> = rows.iter().map(|row| row.accession.as_str()).collect();
    let listed: HashSet<&str> = experiments
        .iter()
        .map(|experiment| experiment.accession.as_str())
        .collect();
    let missing: Vec<String> = annotated
        .iter()
        .filter(|accession| !listed.contains(*accession))
        .map(|accession| accession.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::ExperimentsMissing(missing));
    }

    let mut work = catalog.begin_import()?;
    let mut report = ExperimentReport {
        experiments: 0,
        rows: rows.len(),
        samples_created: 0,
        samples_reused: 0,
        annotations_set: 0,
    };
    for experiment in experiments
        .iter()
        .filter(|experiment| annotated.contains(experiment.accession.as_str()))
    {
        work.insert_experiment(experiment)?;
        report.experiments += 1;
    }

    // (other experiment, sample, experiment) -> conflicting annotation types
    let mut mismatches: BTreeMap<(String, String, String), Vec<&str>> = BTreeMap::new();
    for row in rows {
        let existing = work.find_sample(&row.sample, row.cel_file.as_deref())?;
        let sample = match existing {
            Some(sample) => sample,
            None => {
                let sample = work.insert_sample(&row.sample, row.cel_file.as_deref())?;
                work.link_sample(&row.accession, sample.id)?;
                for (kind, text) in row.annotations.iter().filter(|(_, text)| !text.is_empty()) {
                    work.set_sample_annotation(sample.id, kind, text)?;
                    report.annotations_set += 1;
                }
                report.samples_created += 1;
                continue;
            }
        };
        work.link_sample(&row.accession, sample.id)?;
        report.samples_reused += 1;

        let stored: HashMap<String, String> = work.sample_annotations(sample.id)?.into_iter().collect();
        let mut conflicts = Vec::new();
        for (kind, text) in &row.annotations {
            let current = stored.get(*kind).map(String::as_str).unwrap_or("");
            match merge_annotation(current, text) {
                Merge::Keep => {}
                Merge::Replace => {
                    work.set_sample_annotation(sample.id, kind, text)?;
                    report.annotations_set += 1;
                }
                Merge::Conflict => conflicts.push(*kind),
            }
        }
        if !conflicts.is_empty() {
            let other = work
                .sample_experiments(sample.id)?
                .into_iter()
                .find(|accession| *accession != row.accession)
                .unwrap_or_else(|| row.accession.clone());
            mismatches
                .entry((other, row.sample.clone(), row.accession.clone()))
                .or_default()
                .extend(conflicts);
        }
    }

    if !mismatches.is_empty() {
        for ((other, sample, accession), fields) in &mismatches {
            warn!(
                "sample '{sample}' in experiment {accession} does not match experiment {other} (check fields: {})",
                fields.join(", ")
            );
        }
        return Err(LoaderError::AnnotationMismatch {
            count: mismatches.len(),
        });
    }

    work.commit()?;
    info!(
        experiments = report.experiments,
        samples_created = report.samples_created,
        samples_reused = report.samples_reused,
        "experiment import committed"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SamplesInfoReport {
    pub experiments: usize,
    pub samples: usize,
}

/// Rebuilds each experiment's `samples_info` search text from its samples.
pub fn refresh_samples_info<C: Catalog>(catalog: &mut C) -> Result<SamplesInfoReport, LoaderError> {
    let mut work = catalog.begin_import()?;
    let mut texts: HashMap<SampleId, String> = HashMap::new();
    let experiments = work.experiments()?;
    for experiment in &experiments {
        let mut samples_info = String::new();
        for sample in work.experiment_samples(&experiment.accession)? {
            if !texts.contains_key(&sample.id) {
                let text = sample_text(&work, &sample)?;
                texts.insert(sample.id, text);
            }
            if let Some(text) = texts.get(&sample.id) {
                samples_info.push_str(text);
                samples_info.push('\n');
            }
        }
        work.set_samples_info(&experiment.accession, &samples_info)?;
    }
    work.commit()?;

    let report = SamplesInfoReport {
        experiments: experiments.len(),
        samples: texts.len(),
    };
    info!(experiments = report.experiments, samples = report.samples, "samples info refreshed");
    Ok(report)
}

/// Name, data source and annotation texts of one sample, one per line.
fn sample_text<R: SampleRepository>(repo: &R, sample: &Sample) -> Result<String, LoaderError> {
    let mut parts = vec![sample.name.clone()];
    if let Some(source) = sample.ml_data_source.as_ref().filter(|source| !source.is_empty()) {
        parts.push(source.clone());
    }
    parts.extend(
        repo.sample_annotations(sample.id)?
            .into_iter()
            .map(|(_, text)| text)
            .filter(|text| !text.is_empty()),
    );
    Ok(parts.join("\n"))
}
