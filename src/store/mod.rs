//! Artifact acquisition.
//!
//! The metadata engine never touches the network or disk for artifacts
//! directly; it asks an [`ArtifactStore`] for a locally-usable binary
//! artifact and an [`SdistBuilder`] to turn a source archive into one.
//! Default implementations live in this module, but both seams exist so the
//! engine can be exercised without either.

pub mod build;
pub mod disk;
pub mod wheel;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::index::link::ArtifactLink;
use crate::util::hash::{digest, UnsupportedAlgorithm};

pub use build::CommandBuilder;
pub use disk::DiskStore;

/// Failure acquiring or producing one artifact. Fatal for that artifact
/// only; callers move on to the next link.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The downloaded bytes do not match the link's declared checksum.
    #[error("checksum mismatch for `{filename}`: expected {expected}, got {actual}")]
    IntegrityMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// The external build step failed to produce a binary artifact.
    #[error("failed to build a binary artifact from `{0}`")]
    BuildFailed(String),

    /// The artifact URL answered with an error status.
    #[error("artifact download failed: HTTP {status} for {url}")]
    Download { url: String, status: u16 },

    #[error(transparent)]
    UnsupportedChecksum(#[from] UnsupportedAlgorithm),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Holds locally-cached binary artifacts and fetches new ones.
pub trait ArtifactStore: Send + Sync {
    /// The cached path for a link's artifact, if it is already present.
    fn cached(&self, link: &ArtifactLink) -> Option<PathBuf>;

    /// Download the artifact, verify its checksum, admit it to the cache,
    /// and return its path.
    fn fetch(&self, link: &ArtifactLink) -> Result<PathBuf, StoreError>;
}

/// Turns a source archive into a binary artifact. Opaque and one-shot.
pub trait SdistBuilder: Send + Sync {
    fn build(&self, sdist: &Path) -> Result<PathBuf, StoreError>;
}

/// Verify downloaded bytes against a link's declared checksum.
///
/// A mismatch is fatal for the artifact; a link without a checksum passes
/// (nothing was promised).
pub fn verify_checksum(link: &ArtifactLink, data: &[u8]) -> Result<(), StoreError> {
    let Some(checksum) = link.checksum() else {
        tracing::debug!("no checksum declared for {}", link.filename());
        return Ok(());
    };

    let actual = digest(&checksum.algorithm, data)?;
    if actual != checksum.value {
        return Err(StoreError::IntegrityMismatch {
            filename: link.filename(),
            expected: checksum.value.clone(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hash::sha256_bytes;
    use pep440_rs::VersionSpecifiers;
    use url::Url;

    fn link_with_checksum(fragment: Option<&str>) -> ArtifactLink {
        let url = Url::parse("https://files.example.com/demo-1.0.tar.gz").unwrap();
        let checksum = fragment.and_then(crate::index::Checksum::parse);
        ArtifactLink::parse("demo-1.0.tar.gz", url, checksum, VersionSpecifiers::empty()).unwrap()
    }

    #[test]
    fn test_verify_checksum_match() {
        let data = b"artifact bytes";
        let fragment = format!("sha256={}", sha256_bytes(data));
        let link = link_with_checksum(Some(&fragment));
        assert!(verify_checksum(&link, data).is_ok());
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        let link = link_with_checksum(Some("sha256=deadbeef"));
        let err = verify_checksum(&link, b"other bytes").unwrap_err();
        assert!(matches!(err, StoreError::IntegrityMismatch { .. }));
    }

    #[test]
    fn test_unknown_algorithm_is_not_ignored() {
        let link = link_with_checksum(Some("crc32=deadbeef"));
        let err = verify_checksum(&link, b"bytes").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedChecksum(_)));
    }

    #[test]
    fn test_missing_checksum_passes() {
        let link = link_with_checksum(None);
        assert!(verify_checksum(&link, b"bytes").is_ok());
    }
}
