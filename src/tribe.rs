//! Read-only client for public gene sets published by Tribe.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::LoaderError;

/// Gene sets above this size are left out of the cache.
pub const DEFAULT_MAX_GENES: usize = 300;
/// Page size requested from Tribe; larger pages tend to fail server side.
pub const PAGE_LIMIT: usize = 1000;

/// Title prefix sent to Tribe and the collection it files under.
pub const GENESET_COLLECTIONS: [(&str, &str); 3] =
    [("GO", "Gene Ontology"), ("KEGG", "KEGG"), ("DO", "OMIM")];

pub trait TribeClient {
    fn organism_uri(&self, scientific_name: &str) -> Result<String, LoaderError>;

    /// Public gene sets matching `filters`. With `all`, follows `meta.next`
    /// until the last page.
    fn public_genesets(
        &self,
        filters: &[(String, String)],
        all: bool,
    ) -> Result<Vec<Value>, LoaderError>;

    fn base_url(&self) -> &str;
}

#[derive(Clone)]
pub struct TribeHttpClient {
    client: Client,
    base_url: String,
}

impl TribeHttpClient {
    pub fn new(base_url: &str) -> Result<Self, LoaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("adage-loader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LoaderError::TribeHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| LoaderError::TribeHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, LoaderError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        std::thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && (err.is_timeout() || err.is_connect()) {
                        std::thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(LoaderError::TribeHttp(err.to_string()));
                }
            }
        }
    }

    fn get_json(&self, url: &str, query: &[(String, String)]) -> Result<Value, LoaderError> {
        debug!(%url, "GET");
        let response = self.send_with_retries(|| self.client.get(url).query(query))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| LoaderError::TribeHttp(err.to_string()))
    }

    fn handle_status(response: Response) -> Result<Response, LoaderError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Tribe request failed".to_string());
        Err(LoaderError::TribeStatus { status, message })
    }
}

impl TribeClient for TribeHttpClient {
    fn organism_uri(&self, scientific_name: &str) -> Result<String, LoaderError> {
        let url = format!("{}/api/v1/organism", self.base_url);
        let body = self.get_json(
            &url,
            &[("scientific_name".to_string(), scientific_name.to_string())],
        )?;
        organism_uri_from(&body, scientific_name)
    }

    fn public_genesets(
        &self,
        filters: &[(String, String)],
        all: bool,
    ) -> Result<Vec<Value>, LoaderError> {
        let url = format!("{}/api/v1/geneset/", self.base_url);
        let body = self.get_json(&url, filters)?;
        let (mut genesets, mut next) = parse_page(&body)?;

        while all && let Some(path) = next.take() {
            let body = self.get_json(&format!("{}{path}", self.base_url), &[])?;
            let (page, following) = parse_page(&body)?;
            genesets.extend(page);
            next = following;
        }
        Ok(genesets)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub fn organism_uri_from(body: &Value, scientific_name: &str) -> Result<String, LoaderError> {
    body.get("objects")
        .and_then(Value::as_array)
        .and_then(|objects| objects.first())
        .and_then(|organism| organism.get("resource_uri"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            LoaderError::TribeResolution(format!(
                "organism {scientific_name} is not known to Tribe"
            ))
        })
}

/// Splits a list response into its objects and the `meta.next` path.
pub fn parse_page(body: &Value) -> Result<(Vec<Value>, Option<String>), LoaderError> {
    let objects = body
        .get("objects")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| {
            LoaderError::TribeResolution("gene set response has no `objects` list".to_string())
        })?;
    let next = body
        .get("meta")
        .and_then(|meta| meta.get("next"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((objects, next))
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganismGenesets {
    pub organism: String,
    pub downloaded_at: String,
    pub gene_count: usize,
    pub collections: BTreeMap<String, Vec<Value>>,
}

impl OrganismGenesets {
    pub fn geneset_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Downloads every public GO, KEGG and OMIM gene set of an organism,
/// dropping sets larger than `max_genes` and tagging each kept set with its
/// Tribe detail URL. Gene identifiers are those of the `crossref` database.
pub fn download_organism_genesets<T: TribeClient + ?Sized>(
    client: &T,
    scientific_name: &str,
    crossref: &str,
    max_genes: usize,
) -> Result<OrganismGenesets, LoaderError> {
    let mut collections = BTreeMap::new();
    let mut all_genes: BTreeSet<String> = BTreeSet::new();

    for (prefix, collection) in GENESET_COLLECTIONS {
        let filters = vec![
            ("organism__scientific_name".to_string(), scientific_name.to_string()),
            ("show_tip".to_string(), "true".to_string()),
            ("limit".to_string(), PAGE_LIMIT.to_string()),
            ("xrdb".to_string(), crossref.to_string()),
            ("title__startswith".to_string(), prefix.to_string()),
        ];
        let mut kept = Vec::new();
        for mut geneset in client.public_genesets(&filters, true)? {
            let genes: BTreeSet<String> = geneset
                .pointer("/tip/genes")
                .and_then(Value::as_array)
                .map(|genes| genes.iter().map(gene_key).collect())
                .unwrap_or_default();
            if genes.len() > max_genes {
                continue;
            }
            all_genes.extend(genes);

            let creator = geneset.pointer("/creator/username").and_then(Value::as_str);
            let slug = geneset.get("slug").and_then(Value::as_str);
            match (creator, slug) {
                (Some(creator), Some(slug)) => {
                    let url = format!("{}/#/use/detail/{creator}/{slug}", client.base_url());
                    if let Some(object) = geneset.as_object_mut() {
                        object.insert("url".to_string(), Value::String(url));
                    }
                }
                _ => warn!("gene set without creator or slug in {collection}"),
            }
            kept.push(geneset);
        }
        collections.insert(collection.to_string(), kept);
    }

    Ok(OrganismGenesets {
        organism: scientific_name.to_string(),
        downloaded_at: Utc::now().to_rfc3339(),
        gene_count: all_genes.len(),
        collections,
    })
}

fn gene_key(gene: &Value) -> String {
    match gene {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn page_with_next_link() {
        let body = json!({
            "meta": {"next": "/api/v1/geneset/?offset=2", "limit": 2},
            "objects": [{"slug": "a"}, {"slug": "b"}],
        });
        let (objects, next) = parse_page(&body).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(next.as_deref(), Some("/api/v1/geneset/?offset=2"));

        let last = json!({"meta": {"next": null}, "objects": []});
        assert_eq!(parse_page(&last).unwrap().1, None);
        assert_matches!(parse_page(&json!({})), Err(LoaderError::TribeResolution(_)));
    }

    #[test]
    fn organism_uri_takes_first_match() {
        let body = json!({"objects": [{"resource_uri": "/api/v1/organism/9"}]});
        assert_eq!(
            organism_uri_from(&body, "Pseudomonas aeruginosa").unwrap(),
            "/api/v1/organism/9"
        );
        assert_matches!(
            organism_uri_from(&json!({"objects": []}), "Nope"),
            Err(LoaderError::TribeResolution(_))
        );
    }

    struct FakeTribe {
        requests: RefCell<Vec<String>>,
    }

    impl TribeClient for FakeTribe {
        fn organism_uri(&self, _: &str) -> Result<String, LoaderError> {
            Ok("/api/v1/organism/1".to_string())
        }

        fn public_genesets(
            &self,
            filters: &[(String, String)],
            _all: bool,
        ) -> Result<Vec<Value>, LoaderError> {
            let prefix = filters
                .iter()
                .find(|(key, _)| key == "title__startswith")
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            self.requests.borrow_mut().push(prefix.clone());
            if prefix != "GO" {
                return Ok(Vec::new());
            }
            Ok(vec![
                json!({"slug": "go-1", "creator": {"username": "tribe"}, "tip": {"genes": [1, 2]}}),
                json!({"slug": "go-2", "creator": {"username": "tribe"}, "tip": {"genes": [2, 3, 4, 5]}}),
            ])
        }

        fn base_url(&self) -> &str {
            "https://tribe.example"
        }
    }

    #[test]
    fn download_filters_large_sets() {
        let fake = FakeTribe {
            requests: RefCell::new(Vec::new()),
        };
        let genesets = download_organism_genesets(&fake, "Pseudomonas aeruginosa", "Entrez", 3).unwrap();

        assert_eq!(*fake.requests.borrow(), vec!["GO", "KEGG", "DO"]);
        let go = &genesets.collections["Gene Ontology"];
        assert_eq!(go.len(), 1);
        assert_eq!(go[0]["url"], "https://tribe.example/#/use/detail/tribe/go-1");
        assert_eq!(genesets.gene_count, 2);
        assert_eq!(genesets.geneset_count(), 1);
        assert!(genesets.collections["OMIM"].is_empty());
    }
}
