mod cli;
mod json;

pub use cli::{classify_update, print_cli_table, print_manifests, TerminalAnnotations, TerminalList};
pub use json::print_json;

use crate::model::{CheckError, CheckKind, CheckResult, Ecosystem};
use crate::view::StatusReport;
use anyhow::Result;
use serde::Serialize;

/// Output format for check results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

/// A check that could not run. Kept apart from the findings so "could not
/// check" is never shown as "nothing found".
#[derive(Debug, Clone, Serialize)]
pub struct CheckFailure {
    pub ecosystem: Ecosystem,
    pub kind: CheckKind,
    pub message: String,
    pub error: CheckError,
}

/// Everything one `check` run produced.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub status: StatusReport,
    pub failures: Vec<CheckFailure>,
}

impl CheckReport {
    pub fn new(results: &[CheckResult], status: StatusReport) -> Self {
        let failures = results
            .iter()
            .filter_map(|result| {
                let error = result.error()?;
                Some(CheckFailure {
                    ecosystem: result.ecosystem,
                    kind: result.kind,
                    message: result.summary(),
                    error: error.clone(),
                })
            })
            .collect();

        Self { status, failures }
    }
}

pub fn print_report(report: &CheckReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_cli_table(report),
        OutputFormat::Json => print_json(report),
    }
}

/// Format report to string for file output
pub fn format_report_to_string(report: &CheckReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json | OutputFormat::Table => {
            // Files always get JSON; tables are for terminals.
            Ok(serde_json::to_string_pretty(report)?)
        }
    }
}
