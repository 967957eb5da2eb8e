//! Index backends.
//!
//! An index may speak up to two protocols: a structured JSON API serving
//! per-version metadata directly, and an HTML listing protocol whose pages
//! enumerate artifact links. Both are modeled as [`DependencyBackend`]
//! variants; the resolver holds them in an ordered fallback list rather than
//! dispatching structurally.

pub mod error;
pub mod filter;
pub mod html;
pub mod json;
pub mod link;
pub mod simple;

use pep440_rs::Version;
use url::Url;

use crate::core::{Candidate, DependencySet};

pub use error::IndexError;
pub use filter::{CompatTags, VersionedLinks};
pub use json::JsonApiBackend;
pub use link::{ArtifactLink, Checksum, LinkError, LinkKind};
pub use simple::SimpleIndexBackend;

/// A source of declared-dependency metadata for one index.
pub trait DependencyBackend {
    /// Short label for logs.
    fn label(&self) -> &str;

    /// Declared dependencies of a candidate.
    fn fetch_dependencies(
        &self,
        candidate: &Candidate,
        allow_network: bool,
    ) -> Result<DependencySet, IndexError>;

    /// Versions the backend knows for a package name, newest first.
    fn fetch_versions(&self, name: &str) -> Result<Vec<Version>, IndexError>;
}

/// Where an index's structured JSON API lives, if it offers one.
///
/// An index rooted at `/simple` is assumed to offer the JSON API at the
/// sibling `/pypi` path, the way the reference public index does. Any other
/// URL is treated as listing-only.
pub fn detect_catalog_url(listing_url: &Url) -> Option<Url> {
    let path = listing_url.path();
    if path == "/simple" || path == "/simple/" {
        let mut catalog = listing_url.clone();
        catalog.set_path("/pypi");
        return Some(catalog);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_catalog_url() {
        let listing = Url::parse("https://pypi.org/simple").unwrap();
        let catalog = detect_catalog_url(&listing).unwrap();
        assert_eq!(catalog.as_str(), "https://pypi.org/pypi");

        let listing = Url::parse("https://pypi.org/simple/").unwrap();
        assert!(detect_catalog_url(&listing).is_some());

        let mirror = Url::parse("https://mirror.example.com/packages").unwrap();
        assert!(detect_catalog_url(&mirror).is_none());
    }
}
