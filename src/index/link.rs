//! Artifact links scraped from index listing pages.
//!
//! A link names one distributable file for one package version: a prebuilt
//! wheel or a source archive. Everything derivable from the filename (kind,
//! declared version, compatibility tags) is derived once at construction;
//! a filename that cannot be understood fails construction rather than
//! producing a partially-populated link.

use std::fmt;

use pep440_rs::{Version, VersionSpecifiers};
use thiserror::Error;
use url::Url;

/// Per-link parse failure. Links that fail are dropped by the caller;
/// neither variant aborts processing of the rest of a page.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The extension is not one we know how to inspect.
    #[error("skipped artifact `{0}`: unrecognized extension")]
    SkippedArtifact(String),

    /// The filename does not follow the naming convention for its kind.
    #[error("malformed artifact name `{0}`")]
    MalformedArtifactName(String),
}

/// Whether an artifact is prebuilt or source form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactKind {
    Binary,
    Source,
}

/// Recognized artifact extensions, in match order. The double-dot source
/// extensions come first so `demo-1.0.tar.gz` never matches a shorter
/// suffix wrongly.
const WANTED_EXTENSIONS: &[(&str, ArtifactKind)] = &[
    (".whl", ArtifactKind::Binary),
    (".tar.gz", ArtifactKind::Source),
    (".tar.bz2", ArtifactKind::Source),
    (".zip", ArtifactKind::Source),
];

/// An integrity checksum from a link's URL fragment, `algorithm=hexdigest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: String,
    pub value: String,
}

impl Checksum {
    /// Parse a URL fragment of the form `algorithm=hexdigest`.
    pub fn parse(fragment: &str) -> Option<Self> {
        let (algorithm, value) = fragment.split_once('=')?;
        if algorithm.is_empty() || value.is_empty() {
            return None;
        }
        Some(Checksum {
            algorithm: algorithm.to_string(),
            value: value.to_lowercase(),
        })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.algorithm, self.value)
    }
}

/// The compatibility fields of a wheel filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelInfo {
    /// Build sequence number, when present
    pub build: Option<u32>,

    /// Interpreter implementation tag, e.g. `py3` or `cp311`
    pub python_tag: String,

    /// Application binary interface tag, e.g. `none` or `cp311`
    pub abi_tag: String,

    /// Platform tag, e.g. `any` or `manylinux2014_x86_64`
    pub platform_tag: String,
}

impl WheelInfo {
    /// Expand compressed tag sets (`py2.py3-none-any`) into every concrete
    /// (python, abi, platform) triple the wheel claims to support.
    pub fn expanded_tags(&self) -> Vec<(String, String, String)> {
        let mut tags = Vec::new();
        for python in self.python_tag.split('.') {
            for abi in self.abi_tag.split('.') {
                for platform in self.platform_tag.split('.') {
                    tags.push((python.to_string(), abi.to_string(), platform.to_string()));
                }
            }
        }
        tags
    }
}

/// Source vs prebuilt, with the wheel's parsed tag fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Wheel(WheelInfo),
    Sdist,
}

/// A parsed link from an index listing page.
#[derive(Debug, Clone)]
pub struct ArtifactLink {
    url: Url,
    checksum: Option<Checksum>,
    file_stem: String,
    extension: &'static str,
    name: String,
    version: Version,
    kind: LinkKind,
    requires_python: VersionSpecifiers,
}

impl ArtifactLink {
    /// Parse a link from its filename and page attributes.
    pub fn parse(
        filename: &str,
        url: Url,
        checksum: Option<Checksum>,
        requires_python: VersionSpecifiers,
    ) -> Result<Self, LinkError> {
        let (extension, kind) = WANTED_EXTENSIONS
            .iter()
            .copied()
            .find(|(ext, _)| filename.ends_with(*ext))
            .ok_or_else(|| LinkError::SkippedArtifact(filename.to_string()))?;

        let file_stem = &filename[..filename.len() - extension.len()];

        let (name, version, kind) = match kind {
            ArtifactKind::Binary => parse_wheel_stem(filename, file_stem)?,
            ArtifactKind::Source => parse_sdist_stem(filename, file_stem)?,
        };

        Ok(ArtifactLink {
            url,
            checksum,
            file_stem: file_stem.to_string(),
            extension,
            name,
            version,
            kind,
            requires_python,
        })
    }

    /// Parse a link from a bare artifact URL (an explicit requirement pin).
    ///
    /// The filename is the last path segment; the fragment, if present,
    /// carries the checksum.
    pub fn from_url(url: Url) -> Result<Self, LinkError> {
        let filename = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(str::to_string)
            .ok_or_else(|| LinkError::MalformedArtifactName(url.to_string()))?;

        let checksum = url.fragment().and_then(Checksum::parse);

        let mut stripped = url.clone();
        stripped.set_fragment(None);

        Self::parse(&filename, stripped, checksum, VersionSpecifiers::empty())
    }

    /// The artifact URL, without its checksum fragment.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The integrity checksum, if the page declared one.
    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    /// The artifact filename.
    pub fn filename(&self) -> String {
        format!("{}{}", self.file_stem, self.extension)
    }

    /// The distribution name segment, verbatim from the filename.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version declared by the filename.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Source vs prebuilt, with wheel tag fields.
    pub fn kind(&self) -> &LinkKind {
        &self.kind
    }

    /// Check if this is a prebuilt artifact.
    pub fn is_binary(&self) -> bool {
        matches!(self.kind, LinkKind::Wheel(_))
    }

    /// The interpreter-version constraint from `data-requires-python`.
    pub fn requires_python(&self) -> &VersionSpecifiers {
        &self.requires_python
    }
}

impl fmt::Display for ArtifactLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filename())
    }
}

/// Tokenize a wheel stem into its 5 or 6 dash-delimited fields.
fn parse_wheel_stem(
    filename: &str,
    stem: &str,
) -> Result<(String, Version, LinkKind), LinkError> {
    let malformed = || LinkError::MalformedArtifactName(filename.to_string());

    let fields: Vec<&str> = stem.split('-').collect();
    let (name, version_text, build, python_tag, abi_tag, platform_tag) = match fields.as_slice() {
        [name, version, build, python, abi, platform] => {
            let build = build.parse::<u32>().map_err(|_| malformed())?;
            (*name, *version, Some(build), *python, *abi, *platform)
        }
        [name, version, python, abi, platform] => (*name, *version, None, *python, *abi, *platform),
        _ => return Err(malformed()),
    };

    let version: Version = version_text.parse().map_err(|_| malformed())?;

    Ok((
        name.to_string(),
        version,
        LinkKind::Wheel(WheelInfo {
            build,
            python_tag: python_tag.to_string(),
            abi_tag: abi_tag.to_string(),
            platform_tag: platform_tag.to_string(),
        }),
    ))
}

/// Split a source-archive stem at the last dash: `name-version`.
fn parse_sdist_stem(
    filename: &str,
    stem: &str,
) -> Result<(String, Version, LinkKind), LinkError> {
    let malformed = || LinkError::MalformedArtifactName(filename.to_string());

    let (name, version_text) = stem.rsplit_once('-').ok_or_else(malformed)?;
    if name.is_empty() {
        return Err(malformed());
    }
    let version: Version = version_text.parse().map_err(|_| malformed())?;

    Ok((name.to_string(), version, LinkKind::Sdist))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(filename: &str) -> Result<ArtifactLink, LinkError> {
        let url = Url::parse(&format!("https://files.example.com/{}", filename)).unwrap();
        ArtifactLink::parse(filename, url, None, VersionSpecifiers::empty())
    }

    #[test]
    fn test_wheel_five_fields() {
        let link = parse("demo_pkg-1.0-py3-none-any.whl").unwrap();
        assert_eq!(link.name(), "demo_pkg");
        assert_eq!(link.version(), &"1.0".parse().unwrap());
        let LinkKind::Wheel(info) = link.kind() else {
            panic!("expected a wheel");
        };
        assert_eq!(info.build, None);
        assert_eq!(info.python_tag, "py3");
        assert_eq!(info.abi_tag, "none");
        assert_eq!(info.platform_tag, "any");
    }

    #[test]
    fn test_wheel_six_fields_round_trips() {
        let filename = "demo-2.1.3-4-cp311-cp311-manylinux2014_x86_64.whl";
        let link = parse(filename).unwrap();
        let LinkKind::Wheel(info) = link.kind() else {
            panic!("expected a wheel");
        };
        assert_eq!(info.build, Some(4));

        // Reconstructing the filename from the parsed fields is exact.
        let rebuilt = format!(
            "{}-{}-{}-{}-{}-{}.whl",
            link.name(),
            link.version(),
            info.build.unwrap(),
            info.python_tag,
            info.abi_tag,
            info.platform_tag,
        );
        assert_eq!(rebuilt, filename);
        assert_eq!(link.filename(), filename);
    }

    #[test]
    fn test_wheel_wrong_field_count_is_malformed() {
        for filename in [
            "demo-1.0-py3-none.whl",
            "demo-1.0-0-1-py3-none-any.whl",
            "demo.whl",
        ] {
            assert!(matches!(
                parse(filename),
                Err(LinkError::MalformedArtifactName(_))
            ));
        }
    }

    #[test]
    fn test_sdist_double_dot_extension() {
        let link = parse("demo-pkg-1.0.tar.gz").unwrap();
        assert_eq!(link.name(), "demo-pkg");
        assert_eq!(link.version(), &"1.0".parse().unwrap());
        assert_eq!(link.kind(), &LinkKind::Sdist);
        assert!(!link.is_binary());
        assert_eq!(link.filename(), "demo-pkg-1.0.tar.gz");
    }

    #[test]
    fn test_unrecognized_extension_is_skipped() {
        assert!(matches!(
            parse("demo-1.0.exe"),
            Err(LinkError::SkippedArtifact(_))
        ));
        assert!(matches!(
            parse("demo-1.0.tar.xz"),
            Err(LinkError::SkippedArtifact(_))
        ));
    }

    #[test]
    fn test_compressed_tags_expand() {
        let link = parse("demo-1.0-py2.py3-none-any.whl").unwrap();
        let LinkKind::Wheel(info) = link.kind() else {
            panic!("expected a wheel");
        };
        assert_eq!(
            info.expanded_tags(),
            vec![
                ("py2".to_string(), "none".to_string(), "any".to_string()),
                ("py3".to_string(), "none".to_string(), "any".to_string()),
            ]
        );
    }

    #[test]
    fn test_checksum_fragment() {
        let checksum = Checksum::parse("sha256=ABCDEF01").unwrap();
        assert_eq!(checksum.algorithm, "sha256");
        assert_eq!(checksum.value, "abcdef01");

        assert!(Checksum::parse("sha256").is_none());
        assert!(Checksum::parse("=deadbeef").is_none());
    }

    #[test]
    fn test_from_url_takes_fragment_checksum() {
        let url =
            Url::parse("https://files.example.com/pkg/demo-1.0.tar.gz#sha256=deadbeef").unwrap();
        let link = ArtifactLink::from_url(url).unwrap();
        assert_eq!(link.filename(), "demo-1.0.tar.gz");
        assert_eq!(link.checksum().unwrap().algorithm, "sha256");
        assert!(link.url().fragment().is_none());
    }
}
