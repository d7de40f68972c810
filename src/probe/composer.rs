use super::{json, Probe, ProbeEnv};
use crate::model::{
    accumulate, CheckError, CheckKind, Ecosystem, Finding, Findings, PackageRecord, Severity,
};
use std::collections::BTreeMap;

/// PHP Composer: `composer outdated` and `composer audit`.
pub struct ComposerProbe;

impl Probe for ComposerProbe {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Composer
    }

    fn prepare(&self, kind: CheckKind, env: &mut ProbeEnv<'_>) -> Result<String, CheckError> {
        env.require(
            "composer",
            "Install Composer from https://getcomposer.org/download/",
        )?;

        Ok(match kind {
            CheckKind::Outdated => "composer outdated --format=json --direct",
            CheckKind::Vulnerabilities => "composer audit --format=json",
        }
        .to_string())
    }

    fn parse_outdated(&self, output: &str) -> Findings {
        parse_outdated(output)
    }

    fn parse_vulnerabilities(&self, output: &str) -> Findings {
        parse_vulnerabilities(output)
    }
}

/// Reads `composer outdated --format=json` output, falling back to the
/// plain-text table when no JSON record is found.
pub fn parse_outdated(output: &str) -> Findings {
    let mut records = Vec::new();
    for value in json::values(output) {
        json::for_each_object(&value, &mut |object| {
            if let (Some(name), Some(version), Some(latest)) = (
                json::text(object, "name"),
                json::text(object, "version"),
                json::text(object, "latest"),
            ) {
                records.push(PackageRecord::new(name, version, latest));
            }
        });
    }

    if records.is_empty() {
        records = parse_outdated_text(output);
    }

    Findings::outdated(records)
}

/// Composer's text table marks each row with `!` (semver-incompatible) or
/// `~` (compatible) between the installed and latest versions.
fn parse_outdated_text(output: &str) -> Vec<PackageRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            // Package names are always vendor/package; this also skips the
            // `Name` header and the colour legend.
            if name == "Name" || !name.contains('/') {
                return None;
            }
            let current = fields.next()?;
            let latest = fields.find(|field| !matches!(*field, "!" | "~" | "="))?;
            Some(PackageRecord::new(name, current, latest))
        })
        .collect()
}

/// Reads `composer audit --format=json` output.
pub fn parse_vulnerabilities(output: &str) -> Findings {
    let mut records = BTreeMap::new();

    for value in json::values(output) {
        let Some(advisories) = value.get("advisories") else {
            continue;
        };
        json::for_each_object(advisories, &mut |advisory| {
            let (Some(package), Some(title)) = (
                json::text(advisory, "packageName"),
                json::text(advisory, "title"),
            ) else {
                return;
            };
            let severity = Severity::parse(json::text(advisory, "severity").unwrap_or_default());
            let id = json::text(advisory, "cve")
                .or_else(|| json::text(advisory, "advisoryId"))
                .unwrap_or(title);
            accumulate(&mut records, package, Finding::new(id, title, severity));
        });
    }

    Findings::Vulnerabilities(records)
}
