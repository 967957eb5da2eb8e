//! Compatibility filtering and preference ordering for artifact links.
//!
//! Pure predicates over [`ArtifactLink`]: does a link satisfy the requested
//! version constraint, the interpreter-version constraint, and the local
//! binary tag set. The preference ordering here decides which artifact gets
//! downloaded first when metadata has to be read out of one.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use pep440_rs::{Version, VersionSpecifiers};

use crate::index::link::{ArtifactLink, LinkKind, WheelInfo};

/// The set of (python, abi, platform) tag triples the local environment can
/// run prebuilt artifacts for.
#[derive(Debug, Clone, Default)]
pub struct CompatTags {
    supported: BTreeSet<(String, String, String)>,
}

impl CompatTags {
    /// Build a tag set from explicit triples.
    pub fn new<I, S>(triples: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String>,
    {
        CompatTags {
            supported: triples
                .into_iter()
                .map(|(py, abi, plat)| (py.into(), abi.into(), plat.into()))
                .collect(),
        }
    }

    /// The portable tag set every interpreter of the given major version
    /// supports: pure-python wheels with no ABI or platform demands.
    pub fn generic(python_tag: &str) -> Self {
        CompatTags::new([(python_tag, "none", "any")])
    }

    /// Check whether any of a wheel's claimed tag triples is supported.
    pub fn supports(&self, info: &WheelInfo) -> bool {
        info.expanded_tags()
            .into_iter()
            .any(|triple| self.supported.contains(&triple))
    }

    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }
}

/// Check if a link's declared version satisfies a version constraint.
pub fn is_version_compatible(link: &ArtifactLink, specifiers: &VersionSpecifiers) -> bool {
    specifiers.contains(link.version())
}

/// Check if a link's `requires-python` constraint admits the interpreter.
///
/// With no interpreter version given, every link passes.
pub fn is_interpreter_compatible(link: &ArtifactLink, interpreter: Option<&Version>) -> bool {
    match interpreter {
        Some(version) => link.requires_python().contains(version),
        None => true,
    }
}

/// Check if a prebuilt link can run locally. Trivially true for source
/// artifacts, which carry no binary tags.
pub fn is_binary_compatible(link: &ArtifactLink, tags: &CompatTags) -> bool {
    match link.kind() {
        LinkKind::Wheel(info) => tags.supports(info),
        LinkKind::Sdist => true,
    }
}

/// Order links by inspection preference: binary-compatible wheels first,
/// then source artifacts, then incompatible wheels; interpreter-compatible
/// before not within each band; discovery order last (the sort is stable).
pub fn sort_by_preference(
    links: &mut [ArtifactLink],
    interpreter: Option<&Version>,
    tags: &CompatTags,
) {
    links.sort_by_key(|link| {
        let binary_band = match link.kind() {
            LinkKind::Wheel(info) if tags.supports(info) => 1,
            LinkKind::Sdist => 0,
            LinkKind::Wheel(_) => -1,
        };
        let interpreter_band = i32::from(is_interpreter_compatible(link, interpreter));
        std::cmp::Reverse((binary_band, interpreter_band))
    });
}

/// The links an index lists for each version of one package.
///
/// Consumed, never mutated, by the compatibility filter: only point lookup
/// and version enumeration are offered.
#[derive(Debug, Clone, Default)]
pub struct VersionedLinks {
    by_version: BTreeMap<Version, Vec<ArtifactLink>>,
}

impl VersionedLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a link under its declared version, preserving discovery order.
    pub fn insert(&mut self, link: ArtifactLink) {
        self.by_version
            .entry(link.version().clone())
            .or_default()
            .push(link);
    }

    /// The links observed for one version.
    pub fn get(&self, version: &Version) -> Option<&[ArtifactLink]> {
        self.by_version.get(version).map(Vec::as_slice)
    }

    /// All versions, newest first.
    pub fn versions_newest_first(&self) -> impl Iterator<Item = &Version> {
        self.by_version.keys().rev()
    }

    /// The newest version with any links.
    pub fn latest(&self) -> Option<&Version> {
        self.by_version.keys().next_back()
    }

    pub fn is_empty(&self) -> bool {
        self.by_version.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_version.len()
    }
}

impl FromIterator<ArtifactLink> for VersionedLinks {
    fn from_iter<I: IntoIterator<Item = ArtifactLink>>(iter: I) -> Self {
        let mut index = VersionedLinks::new();
        for link in iter {
            index.insert(link);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn link(filename: &str) -> ArtifactLink {
        let url = Url::parse(&format!("https://files.example.com/{}", filename)).unwrap();
        ArtifactLink::parse(filename, url, None, VersionSpecifiers::empty()).unwrap()
    }

    fn link_requiring(filename: &str, requires_python: &str) -> ArtifactLink {
        let url = Url::parse(&format!("https://files.example.com/{}", filename)).unwrap();
        ArtifactLink::parse(filename, url, None, requires_python.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_version_compatibility() {
        let l = link("demo-1.5-py3-none-any.whl");
        assert!(is_version_compatible(&l, &">=1.0,<2.0".parse().unwrap()));
        assert!(!is_version_compatible(&l, &">=2.0".parse().unwrap()));
    }

    #[test]
    fn test_interpreter_compatibility() {
        let l = link_requiring("demo-1.0.tar.gz", ">=3.7");
        assert!(is_interpreter_compatible(&l, Some(&"3.10".parse().unwrap())));
        assert!(!is_interpreter_compatible(&l, Some(&"2.7".parse().unwrap())));
        assert!(is_interpreter_compatible(&l, None));
    }

    #[test]
    fn test_binary_compatibility_trivial_for_sdists() {
        let tags = CompatTags::generic("py3");
        assert!(is_binary_compatible(&link("demo-1.0.tar.gz"), &tags));
        assert!(is_binary_compatible(
            &link("demo-1.0-py3-none-any.whl"),
            &tags
        ));
        assert!(!is_binary_compatible(
            &link("demo-1.0-cp311-cp311-manylinux2014_x86_64.whl"),
            &tags
        ));
    }

    #[test]
    fn test_compressed_tags_match_any_expansion() {
        let tags = CompatTags::generic("py3");
        assert!(is_binary_compatible(
            &link("demo-1.0-py2.py3-none-any.whl"),
            &tags
        ));
    }

    #[test]
    fn test_preference_order() {
        let mut links = vec![
            link("demo-1.0.tar.gz"),
            link("demo-1.0-cp99-cp99-exotic_platform.whl"),
            link("demo-1.0-py3-none-any.whl"),
        ];
        sort_by_preference(&mut links, None, &CompatTags::generic("py3"));

        let names: Vec<String> = links.iter().map(ArtifactLink::filename).collect();
        assert_eq!(
            names,
            vec![
                "demo-1.0-py3-none-any.whl",
                "demo-1.0.tar.gz",
                "demo-1.0-cp99-cp99-exotic_platform.whl",
            ]
        );
    }

    #[test]
    fn test_preference_order_is_stable_within_band() {
        let mut links = vec![link("demo-1.0.zip"), link("demo-1.0.tar.gz")];
        sort_by_preference(&mut links, None, &CompatTags::generic("py3"));
        // Same band: discovery order decides.
        assert_eq!(links[0].filename(), "demo-1.0.zip");
    }

    #[test]
    fn test_versioned_links() {
        let index: VersionedLinks = [
            link("demo-1.0.tar.gz"),
            link("demo-2.0.tar.gz"),
            link("demo-1.0-py3-none-any.whl"),
        ]
        .into_iter()
        .collect();

        assert_eq!(index.len(), 2);
        assert_eq!(index.latest(), Some(&"2.0".parse().unwrap()));
        assert_eq!(index.get(&"1.0".parse().unwrap()).unwrap().len(), 2);

        let newest: Vec<String> = index
            .versions_newest_first()
            .map(Version::to_string)
            .collect();
        assert_eq!(newest, vec!["2.0", "1.0"]);
    }
}
