use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Python,
    Go,
    Npm,
    Composer,
    Cargo,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 5] = [
        Ecosystem::Python,
        Ecosystem::Go,
        Ecosystem::Npm,
        Ecosystem::Composer,
        Ecosystem::Cargo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Python => "python",
            Ecosystem::Go => "go",
            Ecosystem::Npm => "npm",
            Ecosystem::Composer => "composer",
            Ecosystem::Cargo => "cargo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Ecosystem::Python => "Python",
            Ecosystem::Go => "Go",
            Ecosystem::Npm => "npm",
            Ecosystem::Composer => "Composer",
            Ecosystem::Cargo => "Cargo",
        }
    }

    /// The exact file name of this ecosystem's manifest.
    pub fn manifest_name(&self) -> &'static str {
        match self {
            Ecosystem::Python => "requirements.txt",
            Ecosystem::Go => "go.mod",
            Ecosystem::Npm => "package.json",
            Ecosystem::Composer => "composer.json",
            Ecosystem::Cargo => "Cargo.toml",
        }
    }

    /// Returns the ecosystem whose manifest is named exactly `file_name`.
    pub fn for_manifest(file_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ecosystem| ecosystem.manifest_name() == file_name)
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "pip" | "py" => Ok(Ecosystem::Python),
            "go" | "golang" => Ok(Ecosystem::Go),
            "npm" | "node" => Ok(Ecosystem::Npm),
            "composer" | "php" => Ok(Ecosystem::Composer),
            "cargo" | "rust" => Ok(Ecosystem::Cargo),
            _ => Err(format!(
                "Unknown ecosystem: {}. Use: python, go, npm, composer, cargo",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Outdated,
    Vulnerabilities,
}

impl CheckKind {
    pub const ALL: [CheckKind; 2] = [CheckKind::Outdated, CheckKind::Vulnerabilities];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Outdated => "outdated",
            CheckKind::Vulnerabilities => "vulnerabilities",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            CheckKind::Outdated => "Outdated packages",
            CheckKind::Vulnerabilities => "Vulnerable packages",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
