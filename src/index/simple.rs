//! HTML listing backend.
//!
//! The listing protocol serves one page per package, enumerating artifact
//! links. Dependency metadata is not embedded in the page: to answer a
//! dependency query this backend picks the most preferable artifact for the
//! version, obtains a locally-usable binary artifact for it (cache hit,
//! download, or an external build for source archives), and reads the
//! declarations out of it. An index commonly lists artifacts that cannot be
//! retrieved for the current platform, so per-link failures are contained
//! and exhaustion is a soft failure: an empty set plus a warning.

use std::sync::Arc;

use pep440_rs::{Version, VersionSpecifiers};
use url::Url;

use crate::core::requirement::normalize_name;
use crate::core::{Candidate, DeclarationParser, DependencySet, Requirement};
use crate::index::error::IndexError;
use crate::index::filter::{
    is_interpreter_compatible, is_version_compatible, sort_by_preference, CompatTags,
    VersionedLinks,
};
use crate::index::html::{scrape_links, PageLink};
use crate::index::link::{ArtifactLink, Checksum, LinkError};
use crate::index::DependencyBackend;
use crate::store::wheel::read_requires_dist;
use crate::store::{ArtifactStore, SdistBuilder};
use crate::util::BoundedCache;

/// Why one link could not be inspected.
enum InspectFailure {
    /// Only because network access was not granted.
    Offline,
    /// Fetch, build, or metadata trouble; try the next link.
    Soft,
}

/// Queries a per-package listing endpoint and inspects artifacts.
pub struct SimpleIndexBackend {
    base_url: Url,
    client: reqwest::blocking::Client,

    /// Interpreter version checked against `data-requires-python`
    interpreter: Option<Version>,

    /// Local binary tag set for wheel compatibility
    tags: CompatTags,

    store: Arc<dyn ArtifactStore>,
    builder: Arc<dyn SdistBuilder>,

    /// Scraped pages by normalized package name
    page_cache: BoundedCache<String, Arc<Vec<ArtifactLink>>>,
}

impl SimpleIndexBackend {
    /// Create a backend over the given artifact collaborators.
    pub fn new(
        base_url: Url,
        store: Arc<dyn ArtifactStore>,
        builder: Arc<dyn SdistBuilder>,
    ) -> Self {
        SimpleIndexBackend {
            base_url,
            client: reqwest::blocking::Client::new(),
            interpreter: None,
            tags: CompatTags::generic("py3"),
            store,
            builder,
            page_cache: BoundedCache::new(64),
        }
    }

    /// Filter links against this interpreter version.
    pub fn with_interpreter(mut self, version: Version) -> Self {
        self.interpreter = Some(version);
        self
    }

    /// Use this binary tag set for wheel compatibility.
    pub fn with_tags(mut self, tags: CompatTags) -> Self {
        self.tags = tags;
        self
    }

    /// Resize the page cache.
    pub fn with_page_capacity(mut self, entries: usize) -> Self {
        self.page_cache = BoundedCache::new(entries);
        self
    }

    /// Every artifact link the index lists for a package. Cached per name.
    pub fn package_links(&self, name: &str) -> Result<Arc<Vec<ArtifactLink>>, IndexError> {
        let name = normalize_name(name);
        self.page_cache.get_or_try_insert_with(name.clone(), || {
            let url_text = format!(
                "{}/{}/",
                self.base_url.as_str().trim_end_matches('/'),
                name
            );
            tracing::debug!("GET {}", url_text);
            let response = self.client.get(&url_text).send()?;

            let status = response.status();
            if status.as_u16() == 404 {
                return Err(IndexError::PackageNotFound(name.clone()));
            }
            if !status.is_success() {
                return Err(IndexError::Api(format!("HTTP {} for {}", status, url_text)));
            }

            let page_url = Url::parse(&url_text)
                .map_err(|e| IndexError::Api(format!("invalid page URL {}: {}", url_text, e)))?;
            let body = response.text()?;

            let links: Vec<ArtifactLink> = scrape_links(&body)
                .iter()
                .filter_map(|page_link| link_from_page(&page_url, page_link))
                .collect();

            tracing::debug!("{} lists {} usable artifacts", name, links.len());
            Ok(Arc::new(links))
        })
    }

    /// Links matching a requirement, grouped by version.
    ///
    /// Filters the package's links by the requirement's version constraint
    /// and by interpreter compatibility.
    pub fn versioned_links(&self, requirement: &Requirement) -> Result<VersionedLinks, IndexError> {
        let links = self.package_links(requirement.name())?;
        Ok(links
            .iter()
            .filter(|link| is_version_compatible(link, requirement.specifiers()))
            .filter(|link| is_interpreter_compatible(link, self.interpreter.as_ref()))
            .cloned()
            .collect())
    }

    /// Declared dependencies of a candidate, by artifact inspection.
    pub fn dependencies(
        &self,
        candidate: &Candidate,
        allow_network: bool,
    ) -> Result<DependencySet, IndexError> {
        let links = self.package_links(candidate.name())?;
        let mut matching: Vec<ArtifactLink> = links
            .iter()
            .filter(|link| link.version() == candidate.version())
            .filter(|link| is_interpreter_compatible(link, self.interpreter.as_ref()))
            .cloned()
            .collect();

        if matching.is_empty() {
            return Err(IndexError::VersionNotFound {
                package: candidate.normalized_name(),
                version: candidate.version().clone(),
            });
        }

        // The first artifact that yields readable metadata wins, so the
        // order here decides what gets downloaded.
        sort_by_preference(&mut matching, self.interpreter.as_ref(), &self.tags);

        let mut offline_miss = false;
        for link in &matching {
            match self.inspect_link(link, allow_network) {
                Ok(set) => return Ok(set),
                Err(InspectFailure::Offline) => offline_miss = true,
                Err(InspectFailure::Soft) => {}
            }
        }

        if offline_miss {
            return Err(IndexError::ArtifactNotAvailableOffline(
                candidate.to_string(),
            ));
        }

        tracing::warn!(
            "failed to read dependencies for {} from any listed artifact",
            candidate
        );
        Ok(DependencySet::new())
    }

    /// Declared dependencies behind a single known link, outside any page.
    ///
    /// This is the path for requirements pinned to an explicit URL.
    pub fn dependencies_for_link(
        &self,
        link: &ArtifactLink,
        allow_network: bool,
    ) -> Result<DependencySet, IndexError> {
        match self.inspect_link(link, allow_network) {
            Ok(set) => Ok(set),
            Err(InspectFailure::Offline) => {
                Err(IndexError::ArtifactNotAvailableOffline(link.filename()))
            }
            Err(InspectFailure::Soft) => {
                tracing::warn!("failed to read dependencies from {}", link);
                Ok(DependencySet::new())
            }
        }
    }

    /// Obtain a binary artifact for one link and read its declarations.
    fn inspect_link(
        &self,
        link: &ArtifactLink,
        allow_network: bool,
    ) -> Result<DependencySet, InspectFailure> {
        let wheel = if link.is_binary() {
            if let Some(path) = self.store.cached(link) {
                path
            } else if !allow_network {
                tracing::debug!("{} is not in the local artifact cache", link);
                return Err(InspectFailure::Offline);
            } else {
                match self.store.fetch(link) {
                    Ok(path) => path,
                    Err(e) => {
                        tracing::warn!("failed to fetch {}: {}", link, e);
                        return Err(InspectFailure::Soft);
                    }
                }
            }
        } else {
            // A source archive is only usable through the build step, which
            // needs the archive bytes; there is no offline answer.
            if !allow_network {
                return Err(InspectFailure::Offline);
            }
            let sdist = match self.store.fetch(link) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("failed to fetch {}: {}", link, e);
                    return Err(InspectFailure::Soft);
                }
            };
            match self.builder.build(&sdist) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("failed to build {}: {}", link, e);
                    return Err(InspectFailure::Soft);
                }
            }
        };

        match read_requires_dist(&wheel) {
            Ok(declarations) => Ok(DeclarationParser::new().parse(declarations)),
            Err(e) => {
                tracing::warn!("unreadable metadata in {}: {}", wheel.display(), e);
                Err(InspectFailure::Soft)
            }
        }
    }
}

impl DependencyBackend for SimpleIndexBackend {
    fn label(&self) -> &str {
        "listing"
    }

    fn fetch_dependencies(
        &self,
        candidate: &Candidate,
        allow_network: bool,
    ) -> Result<DependencySet, IndexError> {
        self.dependencies(candidate, allow_network)
    }

    fn fetch_versions(&self, name: &str) -> Result<Vec<Version>, IndexError> {
        let links = self.package_links(name)?;
        let mut versions: Vec<Version> = links.iter().map(|link| link.version().clone()).collect();
        versions.sort();
        versions.dedup();
        versions.reverse();
        Ok(versions)
    }
}

/// Turn one scraped anchor into an artifact link, or drop it.
fn link_from_page(page_url: &Url, page_link: &PageLink) -> Option<ArtifactLink> {
    let resolved = match page_url.join(&page_link.href) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("dropping unresolvable link `{}`: {}", page_link.href, e);
            return None;
        }
    };

    let checksum = resolved.fragment().and_then(Checksum::parse);
    let mut url = resolved.clone();
    url.set_fragment(None);

    let filename = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(str::to_string)?;

    let requires_python = match &page_link.requires_python {
        Some(text) => text.parse().unwrap_or_else(|_| {
            tracing::debug!("ignoring unparsable requires-python `{}`", text);
            VersionSpecifiers::empty()
        }),
        None => VersionSpecifiers::empty(),
    };

    match ArtifactLink::parse(&filename, url, checksum, requires_python) {
        Ok(link) => Some(link),
        Err(LinkError::SkippedArtifact(filename)) => {
            tracing::debug!("skipping {}", filename);
            None
        }
        Err(e) => {
            tracing::warn!("dropping link: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use crate::util::hash::sha256_bytes;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// In-memory artifact store over pre-planted files.
    #[derive(Default)]
    struct FakeStore {
        cached: HashMap<String, PathBuf>,
        fetchable: HashMap<String, PathBuf>,
        corrupt: Vec<String>,
    }

    impl ArtifactStore for FakeStore {
        fn cached(&self, link: &ArtifactLink) -> Option<PathBuf> {
            self.cached.get(&link.filename()).cloned()
        }

        fn fetch(&self, link: &ArtifactLink) -> Result<PathBuf, StoreError> {
            let filename = link.filename();
            if self.corrupt.contains(&filename) {
                return Err(StoreError::IntegrityMismatch {
                    filename,
                    expected: "0".repeat(8),
                    actual: sha256_bytes(b"tampered")[..8].to_string(),
                });
            }
            self.fetchable
                .get(&filename)
                .cloned()
                .ok_or(StoreError::Download {
                    url: link.url().to_string(),
                    status: 404,
                })
        }
    }

    /// Builder that hands back a prepared wheel for any archive.
    struct FakeBuilder {
        wheel: Option<PathBuf>,
    }

    impl SdistBuilder for FakeBuilder {
        fn build(&self, sdist: &Path) -> Result<PathBuf, StoreError> {
            self.wheel
                .clone()
                .ok_or_else(|| StoreError::BuildFailed(sdist.display().to_string()))
        }
    }

    fn write_wheel(dir: &Path, filename: &str, requires_dist: &[&str]) -> PathBuf {
        let path = dir.join(filename);
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();

        let mut metadata = String::from("Metadata-Version: 2.1\nName: demo\nVersion: 1.0\n");
        for declaration in requires_dist {
            metadata.push_str(&format!("Requires-Dist: {}\n", declaration));
        }

        writer
            .start_file("demo-1.0.dist-info/METADATA", options)
            .unwrap();
        writer.write_all(metadata.as_bytes()).unwrap();
        writer.finish().unwrap();

        path
    }

    fn listing_page(server: &mut mockito::Server, name: &str, body: &str) -> mockito::Mock {
        server
            .mock("GET", format!("/{}/", name).as_str())
            .with_status(200)
            .with_body(body.to_string())
            .create()
    }

    fn backend_with(
        server: &mockito::Server,
        store: FakeStore,
        builder: FakeBuilder,
    ) -> SimpleIndexBackend {
        SimpleIndexBackend::new(
            Url::parse(&server.url()).unwrap(),
            Arc::new(store),
            Arc::new(builder),
        )
    }

    const DEMO_PAGE: &str = r#"
        <html><body>
        <a href="/files/demo-1.0-py3-none-any.whl#sha256=aaaa">demo-1.0-py3-none-any.whl</a>
        <a href="/files/demo-1.0.tar.gz#sha256=bbbb">demo-1.0.tar.gz</a>
        <a href="/files/demo-2.0-py3-none-any.whl" data-requires-python="&gt;=3.8">demo-2.0-py3-none-any.whl</a>
        <a href="/files/demo-2.0.linux.rpm">demo-2.0.linux.rpm</a>
        <a href="/files/not-a-wheel-at-all-x-y-z-w-q-v.whl">broken</a>
        </body></html>
    "#;

    #[test]
    fn test_package_links_scrape_and_cache() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/demo/")
            .with_status(200)
            .with_body(DEMO_PAGE)
            .expect(1)
            .create();

        let backend = backend_with(&server, FakeStore::default(), FakeBuilder { wheel: None });

        let links = backend.package_links("demo").unwrap();
        // The rpm is skipped, the malformed wheel name dropped.
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].checksum().unwrap().value, "aaaa");
        assert!(links[0].url().fragment().is_none());

        // Second call answers from the page cache.
        backend.package_links("demo").unwrap();
        mock.assert();
    }

    #[test]
    fn test_versioned_links_filter() {
        let mut server = mockito::Server::new();
        listing_page(&mut server, "demo", DEMO_PAGE);

        let backend = backend_with(&server, FakeStore::default(), FakeBuilder { wheel: None })
            .with_interpreter("3.6".parse().unwrap());

        let requirement = Requirement::parse("demo>=1.0").unwrap();
        let index = backend.versioned_links(&requirement).unwrap();

        // 2.0 requires >=3.8, so only 1.0 survives for a 3.6 interpreter.
        assert_eq!(index.len(), 1);
        assert_eq!(index.latest(), Some(&"1.0".parse().unwrap()));
        assert_eq!(index.get(&"1.0".parse().unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn test_dependencies_prefer_cached_wheel() {
        let tmp = TempDir::new().unwrap();
        let wheel = write_wheel(tmp.path(), "demo-1.0-py3-none-any.whl", &["requests>=2.0"]);

        let mut server = mockito::Server::new();
        listing_page(&mut server, "demo", DEMO_PAGE);

        let store = FakeStore {
            cached: HashMap::from([("demo-1.0-py3-none-any.whl".to_string(), wheel)]),
            ..Default::default()
        };
        let backend = backend_with(&server, store, FakeBuilder { wheel: None });

        let candidate = Candidate::new("demo", "1.0".parse().unwrap());
        // Offline is enough: the wheel is already cached.
        let deps = backend.dependencies(&candidate, false).unwrap();
        assert_eq!(deps.base()[0].name(), "requests");
    }

    #[test]
    fn test_integrity_failure_falls_back_to_source_artifact() {
        let tmp = TempDir::new().unwrap();
        let built = write_wheel(tmp.path(), "demo-1.0-py3-none-any.built.whl", &["fallback-dep"]);
        let sdist = tmp.path().join("demo-1.0.tar.gz");
        std::fs::write(&sdist, b"archive bytes").unwrap();

        let mut server = mockito::Server::new();
        listing_page(&mut server, "demo", DEMO_PAGE);

        let store = FakeStore {
            corrupt: vec!["demo-1.0-py3-none-any.whl".to_string()],
            fetchable: HashMap::from([("demo-1.0.tar.gz".to_string(), sdist)]),
            ..Default::default()
        };
        let backend = backend_with(&server, store, FakeBuilder { wheel: Some(built) });

        let candidate = Candidate::new("demo", "1.0".parse().unwrap());
        let deps = backend.dependencies(&candidate, true).unwrap();
        // The corrupt wheel was skipped, the built source artifact answered.
        assert_eq!(deps.base()[0].name(), "fallback-dep");
    }

    #[test]
    fn test_offline_miss_is_its_own_failure() {
        let mut server = mockito::Server::new();
        listing_page(&mut server, "demo", DEMO_PAGE);

        let backend = backend_with(&server, FakeStore::default(), FakeBuilder { wheel: None });

        let candidate = Candidate::new("demo", "1.0".parse().unwrap());
        let err = backend.dependencies(&candidate, false).unwrap_err();
        assert!(matches!(err, IndexError::ArtifactNotAvailableOffline(_)));
    }

    #[test]
    fn test_total_exhaustion_is_soft() {
        let mut server = mockito::Server::new();
        listing_page(&mut server, "demo", DEMO_PAGE);

        // Nothing fetchable, nothing buildable: every link fails.
        let backend = backend_with(&server, FakeStore::default(), FakeBuilder { wheel: None });

        let candidate = Candidate::new("demo", "1.0".parse().unwrap());
        let deps = backend.dependencies(&candidate, true).unwrap();
        assert!(deps.is_empty());
    }

    #[test]
    fn test_unknown_version_is_version_not_found() {
        let mut server = mockito::Server::new();
        listing_page(&mut server, "demo", DEMO_PAGE);

        let backend = backend_with(&server, FakeStore::default(), FakeBuilder { wheel: None });

        let candidate = Candidate::new("demo", "9.9".parse().unwrap());
        let err = backend.dependencies(&candidate, true).unwrap_err();
        assert!(matches!(err, IndexError::VersionNotFound { .. }));
    }

    #[test]
    fn test_missing_package_page() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/absent/").with_status(404).create();

        let backend = backend_with(&server, FakeStore::default(), FakeBuilder { wheel: None });
        let err = backend.package_links("absent").unwrap_err();
        assert!(matches!(err, IndexError::PackageNotFound(_)));
    }

    #[test]
    fn test_fetch_versions_newest_first() {
        let mut server = mockito::Server::new();
        listing_page(&mut server, "demo", DEMO_PAGE);

        let backend = backend_with(&server, FakeStore::default(), FakeBuilder { wheel: None });
        let versions = backend.fetch_versions("demo").unwrap();
        let texts: Vec<String> = versions.iter().map(Version::to_string).collect();
        assert_eq!(texts, vec!["2.0", "1.0"]);
    }
}
