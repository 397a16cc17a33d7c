use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;

use crate::error::LoaderError;

pub const DATABASE_FILE: &str = "catalog.sqlite3";

/// On-disk layout: the catalog database lives in a project-local `.adage`
/// directory, fetched gene sets in the user cache.
#[derive(Debug, Clone)]
pub struct Store {
    project_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, LoaderError> {
        let cwd = std::env::current_dir().map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        let project_root = Utf8PathBuf::from_path_buf(cwd.join(".adage"))
            .map_err(|_| LoaderError::Filesystem("invalid project path".to_string()))?;

        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("adage-loader")).ok()
            })
            .ok_or_else(|| {
                LoaderError::Filesystem("unable to resolve cache directory".to_string())
            })?;

        Ok(Self {
            project_root,
            cache_root,
        })
    }

    pub fn new_with_paths(project_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            project_root,
            cache_root,
        }
    }

    pub fn project_root(&self) -> &Utf8Path {
        &self.project_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    /// `configured` wins over the project-local default.
    pub fn database_path(&self, configured: Option<&Utf8Path>) -> Utf8PathBuf {
        match configured {
            Some(path) => path.to_path_buf(),
            None => self.project_root.join(DATABASE_FILE),
        }
    }

    pub fn geneset_path(&self, organism_slug: &str) -> Utf8PathBuf {
        self.cache_root
            .join("genesets")
            .join(format!("{organism_slug}.json"))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), LoaderError> {
        let parent = path
            .parent()
            .ok_or_else(|| LoaderError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("adage-loader")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/work/.adage"),
            Utf8PathBuf::from("/home/u/.cache/adage-loader"),
        );
        assert!(store.database_path(None).ends_with(".adage/catalog.sqlite3"));
        assert_eq!(
            store.database_path(Some(Utf8Path::new("/data/adage.sqlite3"))),
            Utf8PathBuf::from("/data/adage.sqlite3")
        );
        assert!(
            store
                .geneset_path("pseudomonas-aeruginosa")
                .ends_with("genesets/pseudomonas-aeruginosa.json")
        );
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("nested/out.json")).unwrap();
        Store::write_bytes_atomic(&path, b"[1]").unwrap();
        Store::write_bytes_atomic(&path, b"[2]").unwrap();
        assert_eq!(std::fs::read_to_string(path.as_std_path()).unwrap(), "[2]");
    }
}
