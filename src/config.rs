use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::LoaderError;

pub const DEFAULT_CONFIG_FILE: &str = "adage-loader.json";
pub const DEFAULT_EDGE_BATCH_SIZE: usize = 2000;
pub const DEFAULT_TRIBE_URL: &str = "https://tribe.greenelab.com";
pub const DEFAULT_TRIBE_CROSSREF: &str = "Entrez";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub edge_batch_size: Option<usize>,
    #[serde(default)]
    pub tribe_url: Option<String>,
    #[serde(default)]
    pub tribe_crossref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// `None` means the project-local default chosen by `Store`.
    pub database: Option<Utf8PathBuf>,
    pub edge_batch_size: usize,
    pub tribe_url: String,
    pub tribe_crossref: String,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            database: None,
            edge_batch_size: DEFAULT_EDGE_BATCH_SIZE,
            tribe_url: DEFAULT_TRIBE_URL.to_string(),
            tribe_crossref: DEFAULT_TRIBE_CROSSREF.to_string(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `adage-loader.json` in the working directory when it
    /// exists. With neither, the defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LoaderError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LoaderError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LoaderError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LoaderError> {
        let edge_batch_size = config.edge_batch_size.unwrap_or(DEFAULT_EDGE_BATCH_SIZE);
        if edge_batch_size == 0 {
            return Err(LoaderError::ConfigParse(
                "edge_batch_size must be at least 1".to_string(),
            ));
        }
        let tribe_url = config
            .tribe_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_TRIBE_URL.to_string());

        Ok(ResolvedConfig {
            database: config.database.map(Utf8PathBuf::from),
            edge_batch_size,
            tribe_url,
            tribe_crossref: config
                .tribe_crossref
                .unwrap_or_else(|| DEFAULT_TRIBE_CROSSREF.to_string()),
        })
    }
}

/// Machine learning model definition, read from YAML.
///
/// ```yaml
/// title: Ensemble ADAGE 300
/// organism_tax_id: 208964
/// directed_g2g_edge: false
/// g2g_edge_cutoff: 0.4
/// desc_html: <p>300-node ensemble model</p>
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MlModelConfig {
    pub title: String,
    pub organism_tax_id: i64,
    #[serde(default)]
    pub directed_g2g_edge: bool,
    #[serde(default)]
    pub g2g_edge_cutoff: f64,
    #[serde(default)]
    pub desc_html: String,
}

impl MlModelConfig {
    pub fn load(path: &str) -> Result<Self, LoaderError> {
        let content =
            fs::read_to_string(path).map_err(|_| LoaderError::ConfigRead(PathBuf::from(path)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, LoaderError> {
        let config: MlModelConfig = serde_yaml::from_str(content)
            .map_err(|err| LoaderError::ConfigParse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LoaderError> {
        if self.title.trim().is_empty() {
            return Err(LoaderError::ConfigParse(
                "`title` must be a non-empty string".to_string(),
            ));
        }
        if self.organism_tax_id <= 0 {
            return Err(LoaderError::ConfigParse(
                "`organism_tax_id` must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.g2g_edge_cutoff) {
            return Err(LoaderError::ConfigParse(format!(
                "`g2g_edge_cutoff` ({}) must be within 0.0~1.0",
                self.g2g_edge_cutoff
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_apply_to_empty_config() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.edge_batch_size, DEFAULT_EDGE_BATCH_SIZE);
        assert_eq!(resolved.tribe_url, DEFAULT_TRIBE_URL);
        assert!(resolved.database.is_none());
    }

    #[test]
    fn unknown_loader_keys_rejected() {
        let err = serde_json::from_str::<Config>(r#"{"databse": "x.sqlite3"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn model_yaml_with_defaults() {
        let config = MlModelConfig::from_yaml("title: Ensemble ADAGE 300\norganism_tax_id: 208964\n")
            .unwrap();
        assert_eq!(config.title, "Ensemble ADAGE 300");
        assert!(!config.directed_g2g_edge);
        assert_eq!(config.g2g_edge_cutoff, 0.0);
    }

    #[test]
    fn model_yaml_rejects_unknown_keys() {
        let err = MlModelConfig::from_yaml(
            "title: Ensemble ADAGE 300\norganism_tax_id: 208964\ng2g_cutoff: 0.2\n",
        )
        .unwrap_err();
        assert_matches!(err, LoaderError::ConfigParse(message) if message.contains("unknown field"));
    }

    #[test]
    fn model_yaml_rejects_blank_title() {
        let err = MlModelConfig::from_yaml("title: '  '\norganism_tax_id: 208964\n").unwrap_err();
        assert_matches!(err, LoaderError::ConfigParse(_));
    }
}
