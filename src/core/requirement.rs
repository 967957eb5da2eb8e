//! Requirement specification.
//!
//! A Requirement describes what a caller is asking for: a package name, the
//! optional-feature groups to include, a version constraint, and optionally
//! an explicit artifact URL that bypasses index discovery entirely. Unlike
//! the per-link and per-declaration conditions elsewhere in the system, a
//! requirement that fails to parse is a caller error and fails hard.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use pep440_rs::{Version, VersionSpecifiers};
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::core::marker::{MarkerError, MarkerExpr};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?$").unwrap());

/// Error parsing a requirement or dependency specification.
#[derive(Debug, Error)]
pub enum RequirementError {
    #[error("requirement `{0}` has no package name")]
    MissingName(String),

    #[error("invalid package name `{0}`")]
    InvalidName(String),

    #[error("unclosed extras list in `{0}`")]
    UnclosedExtras(String),

    #[error("invalid version constraint `{spec}`: {message}")]
    InvalidSpecifier { spec: String, message: String },

    #[error("invalid URL `{url}`: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("invalid condition in `{text}`")]
    InvalidCondition {
        text: String,
        #[source]
        source: MarkerError,
    },
}

/// A requirement for a package, as given by the caller.
#[derive(Debug, Clone)]
pub struct Requirement {
    /// Package name as written
    name: String,

    /// Optional-feature groups to include
    extras: BTreeSet<String>,

    /// Version constraint (empty means any version)
    specifiers: VersionSpecifiers,

    /// Explicit artifact URL, bypassing index discovery
    url: Option<Url>,
}

impl Requirement {
    /// Create a requirement with no constraints.
    pub fn new(name: impl Into<String>) -> Self {
        Requirement {
            name: name.into(),
            extras: BTreeSet::new(),
            specifiers: VersionSpecifiers::empty(),
            url: None,
        }
    }

    /// Set the version constraint.
    pub fn with_specifiers(mut self, specifiers: VersionSpecifiers) -> Self {
        self.specifiers = specifiers;
        self
    }

    /// Set the optional-feature groups.
    pub fn with_extras(mut self, extras: impl IntoIterator<Item = String>) -> Self {
        self.extras = extras.into_iter().collect();
        self
    }

    /// Pin the requirement to an explicit artifact URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Parse a requirement from text, e.g. `requests[security]>=2.0,<3`.
    ///
    /// A trailing environment condition (`; python_version >= '3'`) is
    /// validated and discarded; conditions gate declarations, not queries.
    pub fn parse(text: &str) -> Result<Self, RequirementError> {
        let (spec_text, marker_text) = split_condition(text);

        if let Some(marker_text) = marker_text {
            MarkerExpr::parse(marker_text).map_err(|source| {
                RequirementError::InvalidCondition {
                    text: text.to_string(),
                    source,
                }
            })?;
            tracing::debug!("ignoring environment condition on requirement `{}`", text);
        }

        let parts = parse_spec_parts(spec_text)?;
        Ok(Requirement {
            name: parts.name,
            extras: parts.extras,
            specifiers: parts.specifiers,
            url: parts.url,
        })
    }

    /// Get the package name as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the name normalized for index lookups.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Get the requested optional-feature groups.
    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    /// Get the version constraint.
    pub fn specifiers(&self) -> &VersionSpecifiers {
        &self.specifiers
    }

    /// Get the explicit URL pin, if any.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Check if a version satisfies this requirement's constraint.
    pub fn matches_version(&self, version: &Version) -> bool {
        self.specifiers.contains(version)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if let Some(ref url) = self.url {
            write!(f, " @ {}", url)?;
        } else if !self.specifiers.is_empty() {
            write!(f, "{}", self.specifiers)?;
        }
        Ok(())
    }
}

/// Normalize a package name for index lookups: lowercase, with runs of
/// `-`, `_`, and `.` collapsed to a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c == '-' || c == '_' || c == '.' {
            if !in_run {
                out.push('-');
                in_run = true;
            }
        } else {
            out.extend(c.to_lowercase());
            in_run = false;
        }
    }
    out
}

/// Split a declaration at the `;` separating spec from condition.
///
/// Specifier and extras text cannot contain `;`, so the first one wins.
pub(crate) fn split_condition(text: &str) -> (&str, Option<&str>) {
    match text.split_once(';') {
        Some((spec, marker)) => (spec.trim(), Some(marker.trim())),
        None => (text.trim(), None),
    }
}

/// The spec half of a declaration: everything except the condition.
pub(crate) struct SpecParts {
    pub name: String,
    pub extras: BTreeSet<String>,
    pub specifiers: VersionSpecifiers,
    pub url: Option<Url>,
}

/// Parse `name[extras]constraint` or `name[extras] @ url`.
pub(crate) fn parse_spec_parts(text: &str) -> Result<SpecParts, RequirementError> {
    let text = text.trim();

    let name_end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
        .unwrap_or(text.len());
    let name = &text[..name_end];
    if name.is_empty() {
        return Err(RequirementError::MissingName(text.to_string()));
    }
    if !NAME_RE.is_match(name) {
        return Err(RequirementError::InvalidName(name.to_string()));
    }

    let mut rest = text[name_end..].trim_start();

    let mut extras = BTreeSet::new();
    if let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return Err(RequirementError::UnclosedExtras(text.to_string()));
        };
        for extra in stripped[..close].split(',') {
            let extra = extra.trim();
            if !extra.is_empty() {
                extras.insert(extra.to_string());
            }
        }
        rest = stripped[close + 1..].trim_start();
    }

    if let Some(url_text) = rest.strip_prefix('@') {
        let url_text = url_text.trim();
        let url = Url::parse(url_text).map_err(|e| RequirementError::InvalidUrl {
            url: url_text.to_string(),
            message: e.to_string(),
        })?;
        return Ok(SpecParts {
            name: name.to_string(),
            extras,
            specifiers: VersionSpecifiers::empty(),
            url: Some(url),
        });
    }

    // Some metadata writes the constraint parenthesized: `foo (>=1.0)`.
    let mut spec_text = rest.trim();
    if spec_text.starts_with('(') && spec_text.ends_with(')') {
        spec_text = spec_text[1..spec_text.len() - 1].trim();
    }

    let specifiers = if spec_text.is_empty() {
        VersionSpecifiers::empty()
    } else {
        match spec_text.parse::<VersionSpecifiers>() {
            Ok(specifiers) => specifiers,
            Err(e) => {
                return Err(RequirementError::InvalidSpecifier {
                    spec: spec_text.to_string(),
                    message: e.to_string(),
                })
            }
        }
    };

    Ok(SpecParts {
        name: name.to_string(),
        extras,
        specifiers,
        url: None,
    })
}
