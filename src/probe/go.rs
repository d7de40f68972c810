use super::{json, Probe, ProbeEnv};
use crate::model::{
    accumulate, CheckError, CheckKind, Ecosystem, Finding, Findings, PackageRecord, Severity,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Go modules: `go list` for updates, `govulncheck` for advisories.
pub struct GoProbe;

impl Probe for GoProbe {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn prepare(&self, kind: CheckKind, env: &mut ProbeEnv<'_>) -> Result<String, CheckError> {
        match kind {
            // `go` itself is assumed present; a missing binary surfaces as a
            // process failure from the shell.
            CheckKind::Outdated => Ok("go list -m -u all".to_string()),
            CheckKind::Vulnerabilities => {
                env.require(
                    "govulncheck",
                    "Install with: go install golang.org/x/vuln/cmd/govulncheck@latest",
                )?;
                Ok("govulncheck -json ./...".to_string())
            }
        }
    }

    fn parse_outdated(&self, output: &str) -> Findings {
        parse_outdated(output)
    }

    fn parse_vulnerabilities(&self, output: &str) -> Findings {
        parse_vulnerabilities(output)
    }
}

/// Reads `go list -m -u all` output.
///
/// Only lines containing `=>` count. The module is the text before the
/// first whitespace and the available version is the first token after
/// `=>`.
pub fn parse_outdated(output: &str) -> Findings {
    let records = output.lines().filter_map(|line| {
        let (before, after) = line.split_once("=>")?;
        let mut fields = before.split_whitespace();
        let module = fields.next()?;
        let current = fields.next().unwrap_or_default();
        let available = after.split_whitespace().next()?;
        Some(PackageRecord::new(module, current, available))
    });

    Findings::outdated(records)
}

/// Reads the `govulncheck -json` message stream.
///
/// `osv` messages supply summaries; each `finding` message whose first
/// trace frame names a module yields one finding for that module. Severity
/// is always medium: govulncheck doesn't rate findings.
pub fn parse_vulnerabilities(output: &str) -> Findings {
    let messages = json::values(output);

    let summaries: HashMap<&str, &str> = messages
        .iter()
        .filter_map(|message| message.get("osv")?.as_object())
        .filter_map(|osv| {
            let id = json::text(osv, "id")?;
            let summary = json::text(osv, "summary").or_else(|| json::text(osv, "details"))?;
            Some((id, summary))
        })
        .collect();

    let mut records = BTreeMap::new();
    for finding in messages
        .iter()
        .filter_map(|message| message.get("finding")?.as_object())
    {
        let Some(id) = json::text(finding, "osv") else {
            continue;
        };
        let module = finding
            .get("trace")
            .and_then(Value::as_array)
            .and_then(|trace| trace.first())
            .and_then(Value::as_object)
            .and_then(|frame| json::text(frame, "module"));
        let Some(module) = module else {
            continue;
        };

        let summary = summaries.get(id).copied().unwrap_or_default();
        accumulate(
            &mut records,
            module,
            Finding::new(id, summary, Severity::Medium),
        );
    }

    Findings::Vulnerabilities(records)
}
