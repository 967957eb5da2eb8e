//! Dependency resolution strategy.
//!
//! The resolver orchestrates the two index backends under an ordered
//! fallback policy: consult already-cached artifacts first (cheap, no
//! artifact downloads), then the structured catalog endpoint when the index
//! offers one, then the listing backend with network access. The exact order
//! is policy, not law; it is configurable per resolver and through the
//! config file.
//!
//! Failure containment is the point of this layer: not-found conditions and
//! per-backend trouble never escape `resolve_dependencies` as errors. Total
//! exhaustion yields an empty dependency set plus a warning. Only
//! caller-error-class inputs (a requirement pinned to a URL that does not
//! name a recognizable artifact) fail hard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use pep440_rs::Version;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{Candidate, DependencySet, Requirement};
use crate::index::link::ArtifactLink;
use crate::index::{
    detect_catalog_url, DependencyBackend, IndexError, JsonApiBackend, SimpleIndexBackend,
    VersionedLinks,
};
use crate::store::{ArtifactStore, SdistBuilder};

/// One step of the backend fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStep {
    /// The listing backend, restricted to already-cached artifacts
    CachedArtifacts,

    /// The structured catalog endpoint, if the index offers one
    CatalogApi,

    /// The listing backend with network access permitted
    NetworkListing,
}

impl FallbackStep {
    /// The default policy: cache first, catalog, then the network.
    pub fn default_order() -> Vec<FallbackStep> {
        vec![
            FallbackStep::CachedArtifacts,
            FallbackStep::CatalogApi,
            FallbackStep::NetworkListing,
        ]
    }
}

/// Resolves requirements to dependency sets against one index.
pub struct Resolver {
    listing: SimpleIndexBackend,
    catalog: Option<JsonApiBackend>,
    fallback: Vec<FallbackStep>,

    /// Latched once the catalog endpoint proves unusable; the catalog step
    /// is skipped for the remainder of the process.
    catalog_unavailable: AtomicBool,
}

impl Resolver {
    /// Create a resolver over a listing backend only.
    pub fn new(listing: SimpleIndexBackend) -> Self {
        Resolver {
            listing,
            catalog: None,
            fallback: FallbackStep::default_order(),
            catalog_unavailable: AtomicBool::new(false),
        }
    }

    /// Attach a structured catalog backend.
    pub fn with_catalog(mut self, catalog: JsonApiBackend) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Override the fallback policy.
    pub fn with_fallback(mut self, steps: Vec<FallbackStep>) -> Self {
        self.fallback = steps;
        self
    }

    /// Build a resolver for an index URL, introspecting whether the index
    /// also offers a catalog endpoint.
    pub fn for_index(
        listing_url: Url,
        store: Arc<dyn ArtifactStore>,
        builder: Arc<dyn SdistBuilder>,
    ) -> Self {
        let catalog = detect_catalog_url(&listing_url).map(JsonApiBackend::new);
        let mut resolver = Resolver::new(SimpleIndexBackend::new(listing_url, store, builder));
        if let Some(catalog) = catalog {
            resolver.catalog = Some(catalog);
        }
        resolver
    }

    /// The listing backend, for callers that tune or query it directly.
    pub fn listing(&self) -> &SimpleIndexBackend {
        &self.listing
    }

    /// Replace the listing backend (used to apply interpreter/tag settings).
    pub fn map_listing(mut self, f: impl FnOnce(SimpleIndexBackend) -> SimpleIndexBackend) -> Self {
        self.listing = f(self.listing);
        self
    }

    /// Resolve the dependencies of the best-matching version of a
    /// requirement.
    ///
    /// Never fails for not-found or backend trouble; those exhaust into an
    /// empty set with a warning. A requirement pinned to a URL that does not
    /// name a recognizable artifact is a caller error and fails hard.
    pub fn resolve_dependencies(
        &self,
        requirement: &Requirement,
        allow_network: bool,
    ) -> Result<DependencySet> {
        // An explicit URL pin bypasses index discovery entirely.
        if let Some(url) = requirement.url() {
            let link = ArtifactLink::from_url(url.clone())
                .with_context(|| format!("unusable URL pin on requirement `{}`", requirement))?;
            return Ok(
                match self.listing.dependencies_for_link(&link, allow_network) {
                    Ok(set) => set,
                    Err(e) => {
                        tracing::warn!("could not inspect pinned artifact: {}", e);
                        DependencySet::new()
                    }
                },
            );
        }

        let Some(version) = self.best_version(requirement, allow_network) else {
            tracing::warn!("no version satisfying `{}` was found", requirement);
            return Ok(DependencySet::new());
        };

        let candidate = Candidate::pin(requirement, version)
            .context("selected version no longer satisfies the requirement")?;
        tracing::debug!("resolving dependencies of {}", candidate);

        Ok(self.dependencies_for(&candidate, allow_network))
    }

    /// Dependencies of one pinned candidate, through the fallback policy.
    pub fn dependencies_for(&self, candidate: &Candidate, allow_network: bool) -> DependencySet {
        for step in &self.fallback {
            let (backend, network): (&dyn DependencyBackend, bool) = match step {
                FallbackStep::CachedArtifacts => (&self.listing, false),
                FallbackStep::CatalogApi => {
                    if !allow_network {
                        continue;
                    }
                    let Some(catalog) = &self.catalog else {
                        continue;
                    };
                    if self.catalog_unavailable.load(Ordering::Relaxed) {
                        continue;
                    }
                    (catalog, true)
                }
                FallbackStep::NetworkListing => {
                    if !allow_network {
                        continue;
                    }
                    (&self.listing, true)
                }
            };

            match backend.fetch_dependencies(candidate, network) {
                Ok(set) => return set,
                Err(e)
                    if matches!(step, FallbackStep::CatalogApi) && e.is_endpoint_unusable() =>
                {
                    // Treat as "endpoint not offered" from here on.
                    tracing::warn!("catalog endpoint unusable, disabling it: {}", e);
                    self.catalog_unavailable.store(true, Ordering::Relaxed);
                }
                // A 404 for one package or version is not an endpoint
                // failure; the next step may still answer.
                Err(e) => tracing::debug!("{} step failed: {}", backend.label(), e),
            }
        }

        tracing::warn!(
            "no backend could answer for {}; returning an empty dependency set",
            candidate
        );
        DependencySet::new()
    }

    /// The newest version satisfying a requirement.
    ///
    /// The listing enumeration is authoritative (its versions have
    /// artifacts behind them); the catalog's `releases` enumeration is the
    /// fallback when the listing cannot answer.
    fn best_version(&self, requirement: &Requirement, allow_network: bool) -> Option<Version> {
        match self.listing.versioned_links(requirement) {
            Ok(index) => {
                if let Some(version) = index.latest() {
                    return Some(version.clone());
                }
                tracing::debug!("listing has no version satisfying `{}`", requirement);
            }
            Err(e) => tracing::debug!("listing enumeration failed: {}", e),
        }

        if !allow_network || self.catalog_unavailable.load(Ordering::Relaxed) {
            return None;
        }
        let catalog = self.catalog.as_ref()?;
        match catalog.available_versions(requirement.name()) {
            Ok(versions) => versions
                .into_iter()
                .find(|version| requirement.matches_version(version)),
            Err(e) => {
                if e.is_endpoint_unusable() {
                    tracing::warn!("catalog endpoint unusable, disabling it: {}", e);
                    self.catalog_unavailable.store(true, Ordering::Relaxed);
                } else {
                    tracing::debug!("catalog enumeration failed: {}", e);
                }
                None
            }
        }
    }

    /// All versions known for a package name, newest first.
    pub fn available_versions(
        &self,
        name: &str,
        allow_network: bool,
    ) -> Result<Vec<Version>, IndexError> {
        match self.listing.package_links(name) {
            Ok(links) => {
                let mut versions: Vec<Version> =
                    links.iter().map(|link| link.version().clone()).collect();
                versions.sort();
                versions.dedup();
                versions.reverse();
                return Ok(versions);
            }
            Err(e) => tracing::debug!("listing enumeration failed: {}", e),
        }

        if allow_network {
            if let Some(catalog) = &self.catalog {
                if !self.catalog_unavailable.load(Ordering::Relaxed) {
                    return catalog.available_versions(name);
                }
            }
        }
        Err(IndexError::PackageNotFound(name.to_string()))
    }

    /// Links matching a requirement, grouped by version.
    pub fn versioned_links(&self, requirement: &Requirement) -> Result<VersionedLinks, IndexError> {
        self.listing.versioned_links(requirement)
    }
}
