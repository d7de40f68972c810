//! Configuration file handling.
//!
//! This module provides loading and saving of depwatch configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/depwatch/config.toml`
//! - macOS: `~/Library/Application Support/depwatch/config.toml`
//! - Windows: `%APPDATA%\depwatch\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! ecosystems = ["python", "go", "npm", "composer", "cargo"]
//! default_format = "table"
//! discovery_depth = 3
//! check_outdated = true
//! skip_vuln_check = false
//!
//! [ignore]
//! packages = ["@types/*"]
//! vulnerabilities = ["GHSA-xxxx"]
//! outdated = ["typescript"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::manifest::DEFAULT_DISCOVERY_DEPTH;
use crate::model::{Ecosystem, Findings};
use crate::platform;

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use depwatch::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Discovery depth: {}", config.discovery_depth);
/// println!("Check outdated: {}", config.check_outdated);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which ecosystems to check when no `--ecosystem` flag is provided.
    ///
    /// Default: all ecosystems
    pub ecosystems: Vec<Ecosystem>,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// How many directory levels below the project root to search for
    /// manifests.
    ///
    /// Default: 3
    pub discovery_depth: usize,

    /// Whether to check for outdated packages by default.
    ///
    /// Default: true
    pub check_outdated: bool,

    /// Whether to skip vulnerability checking by default.
    ///
    /// Default: false (vulnerability checking is enabled)
    pub skip_vuln_check: bool,

    /// Ignore list configuration for suppressing known issues.
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Configuration for ignoring specific packages or vulnerabilities.
///
/// Use this to suppress known false positives or accepted risks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to exclude from every check.
    ///
    /// Packages matching these patterns will not appear in results.
    /// Supports glob patterns (e.g., "lodash*", "@types/*").
    pub packages: Vec<String>,

    /// Vulnerability IDs to ignore (e.g., "CVE-2021-12345", "GHSA-xxxx").
    ///
    /// These vulnerabilities will not be reported even if found.
    pub vulnerabilities: Vec<String>,

    /// Package names to exclude from outdated checks.
    ///
    /// Useful for packages intentionally pinned to older versions.
    pub outdated: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a package should be ignored.
    pub fn should_ignore_package(&self, package: &str) -> bool {
        matches_any(&self.packages, package)
    }

    /// Check if a vulnerability should be ignored.
    pub fn should_ignore_vulnerability(&self, vuln_id: &str) -> bool {
        self.vulnerabilities.iter().any(|id| id == vuln_id)
    }

    /// Check if outdated check should be skipped for a package.
    pub fn should_ignore_outdated(&self, package: &str) -> bool {
        matches_any(&self.outdated, package)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.vulnerabilities.is_empty() && self.outdated.is_empty()
    }

    /// Removes ignored packages and findings from `findings`.
    ///
    /// A vulnerability record whose findings are all ignored is dropped;
    /// one that keeps some has its severity recomputed from them.
    pub fn filter(&self, findings: Findings) -> Findings {
        if self.is_empty() {
            return findings;
        }

        match findings {
            Findings::Outdated(mut records) => {
                records.retain(|name, _| {
                    !self.should_ignore_package(name) && !self.should_ignore_outdated(name)
                });
                Findings::Outdated(records)
            }
            Findings::Vulnerabilities(mut records) => {
                records.retain(|name, record| {
                    if self.should_ignore_package(name) {
                        return false;
                    }
                    record.retain_findings(|f| !self.should_ignore_vulnerability(&f.id));
                    !record.findings.is_empty()
                });
                Findings::Vulnerabilities(records)
            }
        }
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.contains('*') {
            glob_match(pattern, name)
        } else {
            pattern == name
        }
    })
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Check prefix (before first *)
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Check suffix (after last *)
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    // Check middle parts
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ecosystems: Ecosystem::ALL.to_vec(),
            default_format: "table".to_string(),
            discovery_depth: DEFAULT_DISCOVERY_DEPTH,
            check_outdated: true,
            skip_vuln_check: false,
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`, or defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use depwatch::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("depwatch/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
