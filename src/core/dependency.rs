//! Dependency declarations and their parsed, grouped form.
//!
//! A package declares its dependencies as a flat list of strings, each
//! optionally gated by an environment condition and/or assigned to a named
//! optional-feature ("extra") group. Two historical encodings exist for the
//! feature assignment: newer metadata carries the feature name in a separate
//! field next to the condition text; older metadata embeds it as a trailing
//! `extra == 'name'` clause inside the condition itself. `DeclarationParser`
//! normalizes both into a `DependencySet` so nothing downstream ever sees the
//! raw text again.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use pep440_rs::VersionSpecifiers;
use regex::Regex;
use thiserror::Error;

use crate::core::marker::{MarkerError, MarkerExpr};
use crate::core::requirement::{parse_spec_parts, split_condition, RequirementError};

/// Trailing feature clause: an `extra == '<name>'` equality test at the end
/// of the condition text, optionally preceded by an `and` connective.
static TRAILING_EXTRA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:(?P<env>.*\S)\s+and\s+)?extra\s*==\s*(?:'(?P<sq>[^']*)'|"(?P<dq>[^"]*)")\s*$"#,
    )
    .unwrap()
});

/// Any feature-equality test, wherever it sits in the condition.
static EXTRA_TEST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bextra\s*==").unwrap());

/// A single declaration that could not be understood.
///
/// These are contained: the declaration is dropped with a warning, the rest
/// of the set still parses.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error(transparent)]
    Spec(#[from] RequirementError),

    #[error("invalid condition: {0}")]
    Condition(#[from] MarkerError),

    #[error("feature clause is not the trailing term of the condition")]
    UnrecognizedDeclaration,
}

/// One parsed dependency declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Package name as declared
    name: String,

    /// Optional-feature groups requested of the dependency itself
    extras: BTreeSet<String>,

    /// Version constraint
    specifiers: VersionSpecifiers,

    /// Environment condition gating the declaration
    condition: Option<MarkerExpr>,
}

impl Dependency {
    /// Create a dependency on any version of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Dependency {
            name: name.into(),
            extras: BTreeSet::new(),
            specifiers: VersionSpecifiers::empty(),
            condition: None,
        }
    }

    /// Set the version constraint.
    pub fn with_specifiers(mut self, specifiers: VersionSpecifiers) -> Self {
        self.specifiers = specifiers;
        self
    }

    /// Set the dependency's own optional-feature groups.
    pub fn with_extras(mut self, extras: impl IntoIterator<Item = String>) -> Self {
        self.extras = extras.into_iter().collect();
        self
    }

    /// Set the environment condition.
    pub fn with_condition(mut self, condition: MarkerExpr) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Get the package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the dependency's own optional-feature groups.
    pub fn extras(&self) -> &BTreeSet<String> {
        &self.extras
    }

    /// Get the version constraint.
    pub fn specifiers(&self) -> &VersionSpecifiers {
        &self.specifiers
    }

    /// Get the environment condition, if any.
    pub fn condition(&self) -> Option<&MarkerExpr> {
        self.condition.as_ref()
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if !self.specifiers.is_empty() {
            write!(f, "{}", self.specifiers)?;
        }
        if let Some(ref condition) = self.condition {
            write!(f, "; {}", condition)?;
        }
        Ok(())
    }
}

/// The dependencies a package declares, split into the unconditional base
/// group and named optional-feature groups.
///
/// A declaration conditioned on a feature name lives in that feature's
/// sequence, never in `base`; its stored condition is the conjunction of its
/// environment condition (if any) and the feature-equality test. Sequences
/// preserve declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencySet {
    base: Vec<Dependency>,
    extras: BTreeMap<String, Vec<Dependency>>,
}

impl DependencySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The unconditional declarations, in declaration order.
    pub fn base(&self) -> &[Dependency] {
        &self.base
    }

    /// The optional-feature groups.
    pub fn extras(&self) -> &BTreeMap<String, Vec<Dependency>> {
        &self.extras
    }

    /// Check whether the set holds no declarations at all.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.extras.values().all(Vec::is_empty)
    }

    /// Total number of declarations across all groups.
    pub fn len(&self) -> usize {
        self.base.len() + self.extras.values().map(Vec::len).sum::<usize>()
    }

    /// Add an unconditional declaration.
    pub fn push_base(&mut self, dependency: Dependency) {
        self.base.push(dependency);
    }

    /// Append a declaration to a feature group, creating it on first use.
    pub fn push_extra(&mut self, extra: impl Into<String>, dependency: Dependency) {
        self.extras.entry(extra.into()).or_default().push(dependency);
    }

    /// Iterate base declarations plus those of the requested features.
    ///
    /// Features that declare nothing are silently absent, matching how an
    /// index answers for unknown extras.
    pub fn iter_with_extras<'a>(
        &'a self,
        requested: impl IntoIterator<Item = &'a str> + 'a,
    ) -> impl Iterator<Item = &'a Dependency> + 'a {
        self.base.iter().chain(
            requested
                .into_iter()
                .filter_map(|name| self.extras.get(name))
                .flatten(),
        )
    }
}

/// One raw declaration handed to the parser.
#[derive(Debug, Clone)]
pub struct RawDeclaration {
    /// Declaration text: `name[extras] constraint ; condition`
    pub spec: String,

    /// Feature name, when the metadata source carries it as its own field
    pub extra: Option<String>,
}

impl RawDeclaration {
    /// A declaration whose feature assignment (if any) is inside the text.
    pub fn spec(text: impl Into<String>) -> Self {
        RawDeclaration {
            spec: text.into(),
            extra: None,
        }
    }

    /// A declaration with the feature name already split out.
    pub fn with_extra(text: impl Into<String>, extra: impl Into<String>) -> Self {
        RawDeclaration {
            spec: text.into(),
            extra: Some(extra.into()),
        }
    }
}

impl From<&str> for RawDeclaration {
    fn from(text: &str) -> Self {
        RawDeclaration::spec(text)
    }
}

impl From<String> for RawDeclaration {
    fn from(text: String) -> Self {
        RawDeclaration::spec(text)
    }
}

/// Parses raw declarations into a [`DependencySet`].
#[derive(Debug, Default)]
pub struct DeclarationParser {
    /// Condition applying to every declaration in the parsed block
    group_condition: Option<MarkerExpr>,
}

impl DeclarationParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `condition` to every declaration in the block, conjoined with
    /// each declaration's own conditions.
    pub fn with_group_condition(condition: MarkerExpr) -> Self {
        DeclarationParser {
            group_condition: Some(condition),
        }
    }

    /// Parse a list of raw declarations.
    ///
    /// Declarations that cannot be understood are dropped with a warning;
    /// one bad entry never discards the rest of the set.
    pub fn parse<I>(&self, declarations: I) -> DependencySet
    where
        I: IntoIterator,
        I::Item: Into<RawDeclaration>,
    {
        let mut set = DependencySet::new();

        for declaration in declarations {
            let declaration = declaration.into();
            match self.parse_one(&declaration) {
                Ok((dependency, Some(extra))) => set.push_extra(extra, dependency),
                Ok((dependency, None)) => set.push_base(dependency),
                Err(e) => {
                    tracing::warn!(
                        "skipping dependency declaration `{}`: {}",
                        declaration.spec,
                        e
                    );
                }
            }
        }

        set
    }

    /// Parse one declaration into a dependency and its feature assignment.
    fn parse_one(
        &self,
        declaration: &RawDeclaration,
    ) -> Result<(Dependency, Option<String>), DeclarationError> {
        let (spec_text, condition_text) = split_condition(&declaration.spec);
        let parts = parse_spec_parts(spec_text)?;

        if parts.url.is_some() {
            tracing::debug!(
                "ignoring direct URL reference on declaration `{}`",
                declaration.spec
            );
        }

        let (environment, extra) = match &declaration.extra {
            // Modern shape: the feature name is its own field and the
            // condition text is already pure.
            Some(extra) => {
                let environment = condition_text.map(MarkerExpr::parse).transpose()?;
                (environment, Some(extra.clone()))
            }
            None => match condition_text {
                Some(text) if EXTRA_TEST_RE.is_match(text) => strip_trailing_extra(text)?,
                Some(text) => (Some(MarkerExpr::parse(text)?), None),
                None => (None, None),
            },
        };

        let feature_condition = extra.as_deref().map(MarkerExpr::extra_equals);
        let condition = MarkerExpr::conjoin(vec![
            self.group_condition.clone(),
            environment,
            feature_condition,
        ]);

        let mut dependency = Dependency::new(parts.name)
            .with_specifiers(parts.specifiers)
            .with_extras(parts.extras);
        if let Some(condition) = condition {
            dependency = dependency.with_condition(condition);
        }

        Ok((dependency, extra))
    }
}

/// Recover the pure environment condition and feature name from legacy
/// condition text ending in a feature clause.
fn strip_trailing_extra(
    text: &str,
) -> Result<(Option<MarkerExpr>, Option<String>), DeclarationError> {
    let captures = TRAILING_EXTRA_RE
        .captures(text)
        .ok_or(DeclarationError::UnrecognizedDeclaration)?;

    let extra = captures
        .name("sq")
        .or_else(|| captures.name("dq"))
        .map(|m| m.as_str().to_string())
        .ok_or(DeclarationError::UnrecognizedDeclaration)?;

    let environment = match captures.name("env") {
        Some(env) => {
            // A second feature test hiding in the remainder means the
            // declaration does not fit the trailing-clause shape after all.
            if EXTRA_TEST_RE.is_match(env.as_str()) {
                return Err(DeclarationError::UnrecognizedDeclaration);
            }
            Some(MarkerExpr::parse(env.as_str())?)
        }
        None => None,
    };

    Ok((environment, Some(extra)))
}
