//! Error taxonomy for index operations.
//!
//! The split matters to the fallback strategy: a missing package is permanent
//! for the whole requirement, a missing version only for that version, and an
//! endpoint that errors or answers nonsense is unusable as a whole. Per-link
//! failures live in [`crate::index::link::LinkError`] and never reach here.

use pep440_rs::Version;
use thiserror::Error;

/// Failure of an index query.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index has never heard of the package.
    #[error("package `{0}` not found in index")]
    PackageNotFound(String),

    /// The package exists but not at this version.
    #[error("version {version} of `{package}` not found in index")]
    VersionNotFound { package: String, version: Version },

    /// The endpoint was reachable but answered with an error.
    #[error("index endpoint error: {0}")]
    Api(String),

    /// The payload arrived but does not have the promised shape.
    #[error("index response does not have the expected shape: {0}")]
    NonConformingResponse(String),

    /// The query needs an artifact or endpoint that network access was not
    /// granted for. Soft: the caller advances to its next option.
    #[error("`{0}` is not available without network access")]
    ArtifactNotAvailableOffline(String),

    /// The transport itself failed.
    #[error("network error contacting index")]
    Http(#[from] reqwest::Error),
}

impl IndexError {
    /// Failures that mean the endpoint itself is unusable for this process,
    /// as opposed to one package or version being absent from it.
    pub fn is_endpoint_unusable(&self) -> bool {
        matches!(
            self,
            IndexError::Api(_) | IndexError::NonConformingResponse(_) | IndexError::Http(_)
        )
    }
}
