//! Ecosystem probes.
//!
//! This module provides the [`Probe`] trait and one implementation per
//! supported ecosystem. A probe knows three things about its ecosystem:
//! which tools must be present, which command lines to run, and how to
//! read those tools' output.
//!
//! # Available Probes
//!
//! | Probe | Manifest | Outdated | Vulnerabilities |
//! |-------|----------|----------|-----------------|
//! | [`PythonProbe`] | `requirements.txt` | `pip list --outdated --format=columns` | `safety check --json` |
//! | [`GoProbe`] | `go.mod` | `go list -m -u all` | `govulncheck -json ./...` |
//! | [`NpmProbe`] | `package.json` | `npm outdated --depth=0 --color=false` | `npm audit --json` |
//! | [`ComposerProbe`] | `composer.json` | `composer outdated --format=json --direct` | `composer audit --format=json` |
//! | [`CargoProbe`] | `Cargo.toml` | `cargo outdated --format=json` | `cargo audit --json` |
//!
//! Probes hold no state. Parsing lives in plain functions
//! (`python::parse_outdated`, `npm::parse_vulnerabilities`, ...) that take
//! raw tool output and never fail: lines or fragments that don't fit are
//! skipped.

mod cargo;
mod composer;
mod go;
mod json;
mod npm;
mod python;

pub use cargo::CargoProbe;
pub use composer::ComposerProbe;
pub use go::GoProbe;
pub use npm::NpmProbe;
pub use python::PythonProbe;

/// Raw-output parsers, one module per ecosystem.
pub mod parse {
    pub use super::cargo::{parse_outdated as cargo_outdated, parse_vulnerabilities as cargo_vulnerabilities};
    pub use super::composer::{
        parse_outdated as composer_outdated, parse_vulnerabilities as composer_vulnerabilities,
    };
    pub use super::go::{parse_outdated as go_outdated, parse_vulnerabilities as go_vulnerabilities};
    pub use super::npm::{parse_outdated as npm_outdated, parse_vulnerabilities as npm_vulnerabilities};
    pub use super::python::{
        parse_outdated as python_outdated, parse_vulnerabilities as python_vulnerabilities,
    };
}

use crate::model::{CheckError, CheckKind, Ecosystem, Findings};
use crate::platform::ToolLocator;
use crate::runner::{Invocation, ProcessRunner};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What a probe may consult while preparing a check.
pub struct ProbeEnv<'a> {
    dir: &'a Path,
    tools: &'a dyn ToolLocator,
    exists: &'a mut dyn FnMut(&Path) -> bool,
}

impl<'a> ProbeEnv<'a> {
    pub fn new(
        dir: &'a Path,
        tools: &'a dyn ToolLocator,
        exists: &'a mut dyn FnMut(&Path) -> bool,
    ) -> Self {
        Self { dir, tools, exists }
    }

    /// The manifest's directory.
    pub fn dir(&self) -> &Path {
        self.dir
    }

    pub fn tools(&self) -> &dyn ToolLocator {
        self.tools
    }

    pub fn exists(&mut self, path: &Path) -> bool {
        (self.exists)(path)
    }

    /// Resolves `program`, or fails with an install hint.
    pub fn require(&self, program: &str, hint: &str) -> Result<PathBuf, CheckError> {
        self.tools
            .find(program)
            .ok_or_else(|| CheckError::tool_missing(program, hint))
    }
}

/// One ecosystem's tooling.
pub trait Probe: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    /// Verifies tools and sibling files, then returns the command line for
    /// `kind`. Nothing is spawned here.
    ///
    /// # Errors
    ///
    /// [`CheckError::ToolMissing`] or [`CheckError::ManifestMissing`].
    fn prepare(&self, kind: CheckKind, env: &mut ProbeEnv<'_>) -> Result<String, CheckError>;

    fn parse_outdated(&self, output: &str) -> Findings;

    fn parse_vulnerabilities(&self, output: &str) -> Findings;

    /// Whether `exit_code` from the `kind` command means the tool worked.
    fn accepts_exit(&self, _kind: CheckKind, exit_code: i32) -> bool {
        exit_code == 0
    }

    fn parse(&self, kind: CheckKind, output: &str) -> Findings {
        match kind {
            CheckKind::Outdated => self.parse_outdated(output),
            CheckKind::Vulnerabilities => self.parse_vulnerabilities(output),
        }
    }
}

/// Runs a prepared check and applies the shared exit-code policy.
pub async fn execute(
    probe: &dyn Probe,
    kind: CheckKind,
    invocation: &Invocation,
    runner: &dyn ProcessRunner,
) -> Result<Findings, CheckError> {
    let output = runner.run(invocation).await;

    if !probe.accepts_exit(kind, output.exit_code) {
        return Err(CheckError::process_failure(
            output.exit_code,
            &output.stdout,
            &output.stderr,
        ));
    }

    let findings = probe.parse(kind, &output.stdout);
    debug!(
        ecosystem = %probe.ecosystem(),
        kind = %kind,
        packages = findings.len(),
        "parsed tool output"
    );
    Ok(findings)
}

/// Returns every probe, in [`Ecosystem::ALL`] order.
pub fn all_probes() -> Vec<Box<dyn Probe>> {
    Ecosystem::ALL.into_iter().map(probe_for).collect()
}

/// Returns the probe for `ecosystem`.
///
/// # Example
///
/// ```
/// use depwatch::model::Ecosystem;
/// use depwatch::probe::probe_for;
///
/// let probe = probe_for(Ecosystem::Go);
/// assert_eq!(probe.ecosystem(), Ecosystem::Go);
/// ```
pub fn probe_for(ecosystem: Ecosystem) -> Box<dyn Probe> {
    match ecosystem {
        Ecosystem::Python => Box::new(PythonProbe),
        Ecosystem::Go => Box::new(GoProbe),
        Ecosystem::Npm => Box::new(NpmProbe),
        Ecosystem::Composer => Box::new(ComposerProbe),
        Ecosystem::Cargo => Box::new(CargoProbe),
    }
}
