//! Structured JSON API backend.
//!
//! Some indexes expose machine-readable metadata directly:
//! `GET <base>/<package>/json` answers with a `releases` mapping for version
//! enumeration, and `GET <base>/<package>/<version>/json` answers with an
//! `info` object whose `requires_dist` member lists the declared
//! dependencies. When this endpoint exists it is far cheaper than pulling
//! artifacts, so its results are memoized aggressively.

use std::sync::Arc;

use pep440_rs::Version;
use serde_json::Value;
use url::Url;

use crate::core::requirement::normalize_name;
use crate::core::{Candidate, DeclarationParser, DependencySet};
use crate::index::error::IndexError;
use crate::index::DependencyBackend;
use crate::util::BoundedCache;

/// Queries a structured per-version metadata endpoint.
pub struct JsonApiBackend {
    base_url: Url,
    client: reqwest::blocking::Client,

    /// Version enumerations by package name
    package_cache: BoundedCache<String, Arc<Vec<Version>>>,

    /// Parsed dependency sets by (package name, version)
    version_cache: BoundedCache<(String, Version), DependencySet>,
}

impl JsonApiBackend {
    /// Create a backend with the default cache capacities.
    pub fn new(base_url: Url) -> Self {
        // Per-version lookups are much more granular than whole-package
        // enumerations, so that cache is sized larger.
        Self::with_capacities(base_url, 64, 1024)
    }

    /// Create a backend with explicit cache capacities.
    pub fn with_capacities(base_url: Url, package_entries: usize, version_entries: usize) -> Self {
        JsonApiBackend {
            base_url,
            client: reqwest::blocking::Client::new(),
            package_cache: BoundedCache::new(package_entries),
            version_cache: BoundedCache::new(version_entries),
        }
    }

    /// The endpoint URL for the given path segments.
    fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.as_str().trim_end_matches('/').to_string();
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        url.push_str("/json");
        url
    }

    /// Fetch and parse a JSON document.
    fn get_value(&self, url: &str, not_found: impl FnOnce() -> IndexError) -> Result<Value, IndexError> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send()?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(not_found());
        }
        if !status.is_success() {
            return Err(IndexError::Api(format!("HTTP {} for {}", status, url)));
        }

        let body = response.text()?;
        serde_json::from_str(&body)
            .map_err(|e| IndexError::NonConformingResponse(format!("invalid JSON: {}", e)))
    }

    /// All versions the catalog knows for a package, newest first.
    pub fn available_versions(&self, name: &str) -> Result<Vec<Version>, IndexError> {
        let name = normalize_name(name);
        let versions = self.package_cache.get_or_try_insert_with(name.clone(), || {
            let url = self.endpoint(&[name.as_str()]);
            let value = self.get_value(&url, || IndexError::PackageNotFound(name.clone()))?;

            let releases = value
                .get("releases")
                .ok_or_else(|| {
                    IndexError::NonConformingResponse("missing `releases` member".to_string())
                })?
                .as_object()
                .ok_or_else(|| {
                    IndexError::NonConformingResponse("`releases` is not a mapping".to_string())
                })?;

            let mut versions = Vec::new();
            for key in releases.keys() {
                match key.parse::<Version>() {
                    Ok(version) => versions.push(version),
                    Err(_) => tracing::debug!("skipping unparsable version key `{}`", key),
                }
            }
            versions.sort();
            versions.reverse();
            Ok::<_, IndexError>(Arc::new(versions))
        })?;

        Ok(versions.as_ref().clone())
    }

    /// The dependencies one version declares, per the catalog.
    pub fn declared_dependencies(
        &self,
        name: &str,
        version: &Version,
    ) -> Result<DependencySet, IndexError> {
        let name = normalize_name(name);
        let key = (name.clone(), version.clone());

        self.version_cache.get_or_try_insert_with(key, || {
            let version_text = version.to_string();
            let url = self.endpoint(&[name.as_str(), version_text.as_str()]);
            let value = self.get_value(&url, || IndexError::VersionNotFound {
                package: name.clone(),
                version: version.clone(),
            })?;

            let info = value.get("info").ok_or_else(|| {
                IndexError::NonConformingResponse("missing `info` member".to_string())
            })?;

            // Only an explicit null means "no dependencies"; a missing
            // member means the endpoint is not answering the question.
            let requires_dist = info.get("requires_dist").ok_or_else(|| {
                IndexError::NonConformingResponse("`info` has no `requires_dist` member".to_string())
            })?;

            let declarations: Vec<String> = match requires_dist {
                Value::Null => Vec::new(),
                Value::Array(entries) => entries
                    .iter()
                    .map(|entry| {
                        entry.as_str().map(str::to_string).ok_or_else(|| {
                            IndexError::NonConformingResponse(
                                "non-string entry in `requires_dist`".to_string(),
                            )
                        })
                    })
                    .collect::<Result<_, _>>()?,
                _ => {
                    return Err(IndexError::NonConformingResponse(
                        "`requires_dist` is neither a list nor null".to_string(),
                    ))
                }
            };

            Ok(DeclarationParser::new().parse(declarations))
        })
    }
}

impl DependencyBackend for JsonApiBackend {
    fn label(&self) -> &str {
        "catalog"
    }

    fn fetch_dependencies(
        &self,
        candidate: &Candidate,
        allow_network: bool,
    ) -> Result<DependencySet, IndexError> {
        if !allow_network {
            // The catalog has no offline story; everything it knows lives
            // behind the endpoint.
            return Err(IndexError::ArtifactNotAvailableOffline(
                candidate.to_string(),
            ));
        }
        self.declared_dependencies(candidate.name(), candidate.version())
    }

    fn fetch_versions(&self, name: &str) -> Result<Vec<Version>, IndexError> {
        self.available_versions(name)
    }
}
