//! Candidate identification - a requirement pinned to one concrete version.
//!
//! Candidates are produced by resolution, never constructed by callers for
//! discovery. Equality and ordering go through the canonical string form, so
//! two candidates naming the same package, extras, version, and URL are the
//! same candidate however they were built.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use pep440_rs::Version;
use thiserror::Error;
use url::Url;

use crate::core::requirement::Requirement;

/// The version picked for a candidate does not satisfy the requirement.
#[derive(Debug, Error)]
#[error("{version} does not satisfy {requirement}")]
pub struct PinError {
    pub requirement: String,
    pub version: Version,
}

/// A requirement pinned to one concrete version.
#[derive(Debug, Clone)]
pub struct Candidate {
    name: String,
    extras: BTreeSet<String>,
    version: Version,
    url: Option<Url>,
}

impl Candidate {
    /// Create a candidate directly.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Candidate {
            name: name.into(),
            extras: BTreeSet::new(),
            version,
            url: None,
        }
    }

    /// Set the optional-feature groups carried over from the requirement.
    pub fn with_extras(mut self, extras: impl IntoIterator<Item = String>) -> Self {
        self.extras = extras.into_iter().collect();
        self
    }

    /// Set the explicit artifact URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Pin a requirement to a version it admits.
    pub fn pin(requirement: &Requirement, version: Version) -> Result<Self, PinError> {
        if !requirement.matches_version(&version) {
            return Err(PinError {
                requirement: requirement.to_string(),
                version,
            });
        }
        Ok(Candidate {
            name: requirement.name().to_string(),
            extras: requirement.extras().clone(),
            version,
            url: requirement.url().cloned(),
        })
    }

    /// Get the package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the name normalized for index lookups.
    pub fn normalized_name(&self) -> String {
        crate::core::requirement::normalize_name(&self.name)
    }

    /// Get the optional-feature groups.
    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    /// Get the pinned version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Get the explicit artifact URL, if any.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// The canonical string form identity goes through.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        write!(f, "=={}", self.version)?;
        if let Some(ref url) = self.url {
            write!(f, " @ {}", url)?;
        }
        Ok(())
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical().cmp(&other.canonical())
    }
}

impl Hash for Candidate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}
