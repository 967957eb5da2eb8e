//! On-disk artifact cache with download-and-verify admission.

use std::path::{Path, PathBuf};

use crate::index::link::ArtifactLink;
use crate::store::{verify_checksum, ArtifactStore, StoreError};
use crate::util::hash::sha256_str;

/// A cache directory of downloaded artifacts, keyed by link URL.
///
/// Layout: `<root>/artifacts/<url-hash-prefix>/<filename>`. The hash prefix
/// keeps two same-named files from different hosts apart.
pub struct DiskStore {
    root: PathBuf,
    client: reqwest::blocking::Client,
}

impl DiskStore {
    /// Create a store rooted at `root`. Nothing is created until the first
    /// artifact is admitted.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DiskStore {
            root: root.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    /// The cache path an artifact for `link` would occupy.
    fn entry_path(&self, link: &ArtifactLink) -> PathBuf {
        let key = sha256_str(link.url().as_str());
        self.root
            .join("artifacts")
            .join(&key[..16])
            .join(link.filename())
    }

    /// The store root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for DiskStore {
    fn cached(&self, link: &ArtifactLink) -> Option<PathBuf> {
        let path = self.entry_path(link);
        path.exists().then_some(path)
    }

    fn fetch(&self, link: &ArtifactLink) -> Result<PathBuf, StoreError> {
        let path = self.entry_path(link);
        if path.exists() {
            return Ok(path);
        }

        tracing::info!("Downloading {}", link.url());
        let response = self.client.get(link.url().as_str()).send()?;
        if !response.status().is_success() {
            return Err(StoreError::Download {
                url: link.url().to_string(),
                status: response.status().as_u16(),
            });
        }
        let data = response.bytes()?;

        // The checksum gates admission: nothing unverified enters the cache.
        verify_checksum(link, &data)?;

        let dir = path.parent().expect("entry path always has a parent");
        std::fs::create_dir_all(dir)?;

        // Write to the side, then rename, so a crash never leaves a partial
        // file where `cached` would find it.
        let mut partial = path.clone();
        partial.set_extension("part");
        std::fs::write(&partial, &data)?;
        std::fs::rename(&partial, &path)?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Checksum;
    use crate::util::hash::sha256_bytes;
    use pep440_rs::VersionSpecifiers;
    use tempfile::TempDir;
    use url::Url;

    fn link_for(url: &str, filename: &str, checksum: Option<Checksum>) -> ArtifactLink {
        ArtifactLink::parse(
            filename,
            Url::parse(url).unwrap(),
            checksum,
            VersionSpecifiers::empty(),
        )
        .unwrap()
    }

    #[test]
    fn test_cached_miss_then_hit() {
        let tmp = TempDir::new().unwrap();
        let store = DiskStore::new(tmp.path());
        let link = link_for(
            "https://files.example.com/demo-1.0.tar.gz",
            "demo-1.0.tar.gz",
            None,
        );

        assert!(store.cached(&link).is_none());

        // Plant the file where the store would put it.
        let path = store.entry_path(&link);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"bytes").unwrap();

        assert_eq!(store.cached(&link), Some(path));
    }

    #[test]
    fn test_same_filename_different_hosts_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let store = DiskStore::new(tmp.path());

        let a = link_for("https://a.example.com/demo-1.0.tar.gz", "demo-1.0.tar.gz", None);
        let b = link_for("https://b.example.com/demo-1.0.tar.gz", "demo-1.0.tar.gz", None);
        assert_ne!(store.entry_path(&a), store.entry_path(&b));
    }

    #[test]
    fn test_fetch_verifies_and_admits() {
        let mut server = mockito::Server::new();
        let body = b"wheel bytes".to_vec();
        let mock = server
            .mock("GET", "/demo-1.0-py3-none-any.whl")
            .with_status(200)
            .with_body(body.clone())
            .create();

        let tmp = TempDir::new().unwrap();
        let store = DiskStore::new(tmp.path());
        let checksum = Checksum::parse(&format!("sha256={}", sha256_bytes(&body)));
        let link = link_for(
            &format!("{}/demo-1.0-py3-none-any.whl", server.url()),
            "demo-1.0-py3-none-any.whl",
            checksum,
        );

        let path = store.fetch(&link).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert_eq!(store.cached(&link), Some(path));
        mock.assert();
    }

    #[test]
    fn test_fetch_rejects_corrupt_artifact() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/demo-1.0-py3-none-any.whl")
            .with_status(200)
            .with_body("tampered bytes")
            .create();

        let tmp = TempDir::new().unwrap();
        let store = DiskStore::new(tmp.path());
        let link = link_for(
            &format!("{}/demo-1.0-py3-none-any.whl", server.url()),
            "demo-1.0-py3-none-any.whl",
            Checksum::parse("sha256=0000000000000000"),
        );

        let err = store.fetch(&link).unwrap_err();
        assert!(matches!(err, StoreError::IntegrityMismatch { .. }));
        // Nothing unverified entered the cache.
        assert!(store.cached(&link).is_none());
    }
}
