//! Core data structures for drydock.
//!
//! This module contains the foundational types used throughout drydock:
//! - Requirements and candidates (what is asked for, what was chosen)
//! - Dependency declarations and their grouped sets
//! - Environment-condition expressions

pub mod candidate;
pub mod dependency;
pub mod marker;
pub mod requirement;

pub use candidate::Candidate;
pub use dependency::{DeclarationParser, Dependency, DependencySet, RawDeclaration};
pub use marker::{MarkerEnvironment, MarkerExpr};
pub use requirement::Requirement;
