use super::{CheckKind, Ecosystem, PackageRecord, VulnerabilityRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum width, in characters, of a vulnerability display line.
pub const DISPLAY_WIDTH: usize = 80;

/// Why a check could not produce findings.
///
/// None of these mean "nothing found"; an empty [`Findings`] does.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckError {
    #[error("{tool} not found. {hint}")]
    ToolMissing { tool: String, hint: String },

    #[error("{0}")]
    ManifestMissing(String),

    #[error("check failed (exit code {code}): {message}")]
    ProcessFailure { code: i32, message: String },
}

impl CheckError {
    pub fn tool_missing(tool: impl Into<String>, hint: impl Into<String>) -> Self {
        CheckError::ToolMissing {
            tool: tool.into(),
            hint: hint.into(),
        }
    }

    /// Builds a failure from captured output, keeping only the first line.
    pub fn process_failure(code: i32, stdout: &str, stderr: &str) -> Self {
        let message = first_line(stderr)
            .or_else(|| first_line(stdout))
            .map(str::to_string)
            .unwrap_or_else(|| format!("exited with status {}", code));

        CheckError::ProcessFailure { code, message }
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| !line.is_empty())
}

/// The parsed output of one check, keyed by package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "packages", rename_all = "lowercase")]
pub enum Findings {
    Outdated(BTreeMap<String, PackageRecord>),
    Vulnerabilities(BTreeMap<String, VulnerabilityRecord>),
}

impl Findings {
    /// Collects outdated records; a later record for the same name wins.
    pub fn outdated(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        Findings::Outdated(
            records
                .into_iter()
                .map(|record| (record.name.clone(), record))
                .collect(),
        )
    }

    pub fn empty(kind: CheckKind) -> Self {
        match kind {
            CheckKind::Outdated => Findings::Outdated(BTreeMap::new()),
            CheckKind::Vulnerabilities => Findings::Vulnerabilities(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> CheckKind {
        match self {
            Findings::Outdated(_) => CheckKind::Outdated,
            Findings::Vulnerabilities(_) => CheckKind::Vulnerabilities,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Findings::Outdated(records) => records.len(),
            Findings::Vulnerabilities(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn package_names(&self) -> Vec<&str> {
        match self {
            Findings::Outdated(records) => records.keys().map(String::as_str).collect(),
            Findings::Vulnerabilities(records) => records.keys().map(String::as_str).collect(),
        }
    }

    pub fn as_outdated(&self) -> Option<&BTreeMap<String, PackageRecord>> {
        match self {
            Findings::Outdated(records) => Some(records),
            Findings::Vulnerabilities(_) => None,
        }
    }

    pub fn as_vulnerabilities(&self) -> Option<&BTreeMap<String, VulnerabilityRecord>> {
        match self {
            Findings::Vulnerabilities(records) => Some(records),
            Findings::Outdated(_) => None,
        }
    }

    /// One human-readable line per package, in package-name order.
    pub fn display_lines(&self) -> Vec<String> {
        match self {
            Findings::Outdated(records) => {
                records.values().map(PackageRecord::display_line).collect()
            }
            Findings::Vulnerabilities(records) => records
                .values()
                .map(VulnerabilityRecord::display_line)
                .collect(),
        }
    }
}

/// The outcome of one check for one ecosystem.
///
/// An error result never carries packages or display lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub ecosystem: Ecosystem,
    pub kind: CheckKind,
    pub outcome: Result<Findings, CheckError>,
}

impl CheckResult {
    pub fn new(ecosystem: Ecosystem, kind: CheckKind, outcome: Result<Findings, CheckError>) -> Self {
        Self {
            ecosystem,
            kind,
            outcome,
        }
    }

    pub fn failed(ecosystem: Ecosystem, kind: CheckKind, error: CheckError) -> Self {
        Self::new(ecosystem, kind, Err(error))
    }

    pub fn packages(&self) -> Option<&Findings> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CheckError> {
        self.outcome.as_ref().err()
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn display(&self) -> Vec<String> {
        self.packages()
            .map(Findings::display_lines)
            .unwrap_or_default()
    }

    /// A one-line notification that never confuses "could not check" with
    /// "nothing found".
    pub fn summary(&self) -> String {
        match &self.outcome {
            Err(error) => format!(
                "{}: could not check {}: {}",
                self.ecosystem, self.kind, error
            ),
            Ok(findings) if findings.is_empty() => match self.kind {
                CheckKind::Outdated => format!("{}: all packages up to date", self.ecosystem),
                CheckKind::Vulnerabilities => {
                    format!("{}: no known vulnerabilities", self.ecosystem)
                }
            },
            Ok(findings) => format!(
                "{}: {} {} package(s)",
                self.ecosystem,
                findings.len(),
                self.kind
            ),
        }
    }
}

/// Shortens `s` to at most `max_len` characters, ending in `...` when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
