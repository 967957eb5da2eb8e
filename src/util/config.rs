//! Configuration file support for drydock.
//!
//! Configuration lives in the platform config directory
//! (`~/.config/drydock/config.toml` on Linux). Everything has a default, so
//! a missing file is not an error; a present-but-invalid file is reported
//! and replaced with defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::resolver::FallbackStep;

/// Default index listing URL.
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";

/// drydock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index settings
    pub index: IndexConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Source-artifact build settings
    pub build: BuildConfig,
}

/// Index selection and fallback policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Base URL of the index listing endpoint
    pub url: String,

    /// Backend fallback order for dependency queries
    pub fallback: Vec<FallbackStep>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            url: DEFAULT_INDEX_URL.to_string(),
            fallback: FallbackStep::default_order(),
        }
    }
}

/// In-process and on-disk cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Artifact cache directory (defaults to the platform cache dir)
    pub dir: Option<PathBuf>,

    /// Capacity of the per-package listing caches
    pub page_entries: usize,

    /// Capacity of the per-version metadata cache
    pub version_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            dir: None,
            // Whole-package listings are few; per-version lookups are far
            // more granular and deserve the larger cache.
            page_entries: 64,
            version_entries: 1024,
        }
    }
}

/// How to turn a source archive into an inspectable binary artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Command invoked with the output directory and the source archive
    /// path appended, in that order
    pub command: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            command: vec![
                "python".to_string(),
                "-m".to_string(),
                "pip".to_string(),
                "wheel".to_string(),
                "--no-deps".to_string(),
                "--wheel-dir".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file is missing
    /// or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// The default config file location for this platform.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "drydock").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The artifact cache directory, honoring the configured override.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.cache.dir {
            return Some(dir.clone());
        }
        ProjectDirs::from("", "", "drydock").map(|dirs| dirs.cache_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.index.url, DEFAULT_INDEX_URL);
        assert_eq!(config.cache.page_entries, 64);
        assert_eq!(config.cache.version_entries, 1024);
        assert_eq!(config.index.fallback, FallbackStep::default_order());
    }

    #[test]
    fn test_load_partial_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[index]
url = "https://index.example.com/simple"

[cache]
page_entries = 8
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.index.url, "https://index.example.com/simple");
        assert_eq!(config.cache.page_entries, 8);
        // Unset keys keep their defaults.
        assert_eq!(config.cache.version_entries, 1024);
    }

    #[test]
    fn test_fallback_order_from_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[index]
fallback = ["catalog-api", "cached-artifacts", "network-listing"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.index.fallback,
            vec![
                FallbackStep::CatalogApi,
                FallbackStep::CachedArtifacts,
                FallbackStep::NetworkListing,
            ]
        );
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_or_default(&tmp.path().join("missing.toml"));
        assert_eq!(config.index.url, DEFAULT_INDEX_URL);
    }
}
