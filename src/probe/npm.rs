use super::{json, Probe, ProbeEnv};
use crate::model::{
    accumulate, CheckError, CheckKind, Ecosystem, Finding, Findings, PackageRecord, Severity,
    VulnerabilityRecord,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// npm: `npm outdated` and `npm audit`, both needing an installed
/// `node_modules`.
pub struct NpmProbe;

impl Probe for NpmProbe {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn prepare(&self, kind: CheckKind, env: &mut ProbeEnv<'_>) -> Result<String, CheckError> {
        let modules = env.dir().join("node_modules");
        if !env.exists(&modules) {
            return Err(CheckError::ManifestMissing(format!(
                "no node_modules directory in {} (run `npm install` first)",
                env.dir().display()
            )));
        }

        Ok(match kind {
            CheckKind::Outdated => "npm outdated --depth=0 --color=false",
            CheckKind::Vulnerabilities => "npm audit --json",
        }
        .to_string())
    }

    /// `npm audit` exits 1 when it finds vulnerabilities.
    fn accepts_exit(&self, kind: CheckKind, exit_code: i32) -> bool {
        match kind {
            CheckKind::Outdated => exit_code == 0,
            CheckKind::Vulnerabilities => exit_code == 0 || exit_code == 1,
        }
    }

    fn parse_outdated(&self, output: &str) -> Findings {
        parse_outdated(output)
    }

    fn parse_vulnerabilities(&self, output: &str) -> Findings {
        parse_vulnerabilities(output)
    }
}

/// Reads `npm outdated` table output.
///
/// ```text
/// Package  Current  Wanted   Latest   Location
/// lodash   4.0.0    4.15.0   4.17.21  node_modules/lodash
/// ```
///
/// The available version is `wanted`, unless it equals `latest`.
pub fn parse_outdated(output: &str) -> Findings {
    let mut lines = output.lines().peekable();
    if lines
        .peek()
        .is_some_and(|line| line.trim_start().starts_with("Package"))
    {
        lines.next();
    }

    let records = lines.filter_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [name, current, wanted, latest, ..] = fields.as_slice() else {
            return None;
        };
        let available = if wanted == latest { latest } else { wanted };
        Some(PackageRecord::new(*name, *current, *available))
    });

    Findings::outdated(records)
}

/// Reads `npm audit --json` output.
///
/// Understands both the npm 6 `advisories` map and the npm 7+
/// `vulnerabilities` map. Severity only ever rises within a package.
pub fn parse_vulnerabilities(output: &str) -> Findings {
    let mut records = BTreeMap::new();

    for report in json::values(output) {
        if let Some(advisories) = report.get("advisories").and_then(Value::as_object) {
            for advisory in advisories.values().filter_map(Value::as_object) {
                read_advisory(&mut records, advisory);
            }
        }

        if let Some(vulnerabilities) = report.get("vulnerabilities").and_then(Value::as_object) {
            for (name, entry) in vulnerabilities {
                if let Some(entry) = entry.as_object() {
                    read_vulnerability(&mut records, name, entry);
                }
            }
        }
    }

    Findings::Vulnerabilities(records)
}

/// npm 6: `{"module_name": .., "severity": .., "title": .., "id": ..}`.
fn read_advisory(records: &mut BTreeMap<String, VulnerabilityRecord>, advisory: &Map<String, Value>) {
    let (Some(module), Some(title)) = (
        json::text(advisory, "module_name"),
        json::text(advisory, "title"),
    ) else {
        return;
    };

    let severity = Severity::parse(json::text(advisory, "severity").unwrap_or_default());
    let id = json::text_or_number(advisory, "id")
        .or_else(|| json::text(advisory, "url").map(str::to_string))
        .unwrap_or_else(|| title.to_string());

    accumulate(records, module, Finding::new(id, title, severity));
}

/// npm 7+: each entry's `via` lists advisory objects, or names of the
/// dependencies it is vulnerable through.
fn read_vulnerability(
    records: &mut BTreeMap<String, VulnerabilityRecord>,
    key: &str,
    entry: &Map<String, Value>,
) {
    let name = json::text(entry, "name").unwrap_or(key);
    let entry_severity = Severity::parse(json::text(entry, "severity").unwrap_or_default());
    let Some(via) = entry.get("via").and_then(Value::as_array) else {
        return;
    };

    for cause in via {
        match cause {
            Value::Object(advisory) => {
                let Some(title) = json::text(advisory, "title") else {
                    continue;
                };
                let severity = json::text(advisory, "severity")
                    .map(Severity::parse)
                    .unwrap_or(entry_severity);
                let id = json::text(advisory, "url")
                    .map(str::to_string)
                    .or_else(|| json::text_or_number(advisory, "source"))
                    .unwrap_or_else(|| title.to_string());
                accumulate(records, name, Finding::new(id, title, severity));
            }
            Value::String(dependency) => {
                accumulate(
                    records,
                    name,
                    Finding::new(
                        format!("via:{}", dependency),
                        format!("vulnerable through {}", dependency),
                        entry_severity,
                    ),
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Toolchain;
    use crate::probe::testing::prepare_in;

    #[test]
    fn test_available_is_latest_when_wanted_matches() {
        let findings = parse_outdated("lodash 4.0.0 4.17.21 4.17.21\n");
        assert_eq!(
            findings.as_outdated().unwrap()["lodash"].available_version,
            "4.17.21"
        );
    }

    #[test]
    fn test_available_is_wanted_when_behind_latest() {
        let findings = parse_outdated("lodash 4.0.0 4.15.0 4.17.21\n");
        assert_eq!(
            findings.as_outdated().unwrap()["lodash"],
            PackageRecord::new("lodash", "4.0.0", "4.15.0")
        );
    }

    #[test]
    fn test_parse_outdated_table() {
        let output = "\
Package  Current  Wanted   Latest   Location             Depended by
express  4.17.1   4.18.2   4.18.2   node_modules/express app
short    1.0.0
react    17.0.2   17.0.2   18.2.0   node_modules/react   app
";
        let findings = parse_outdated(output);
        let records = findings.as_outdated().unwrap();

        assert_eq!(findings.package_names(), vec!["express", "react"]);
        assert_eq!(records["express"].available_version, "4.18.2");
        assert_eq!(records["react"].available_version, "17.0.2");
    }

    #[test]
    fn test_parse_npm6_advisories_upgrade_severity() {
        let output = r#"{
  "advisories": {
    "1065": {"id": 1065, "module_name": "lodash", "severity": "low", "title": "Prototype Pollution"},
    "1523": {"id": 1523, "module_name": "lodash", "severity": "high", "title": "Command Injection"},
    "1600": {"id": 1600, "module_name": "lodash", "severity": "moderate", "title": "ReDoS"},
    "7": {"module_name": "minimist", "title": "Prototype Pollution", "url": "https://npmjs.com/advisories/7"}
  },
  "metadata": {"vulnerabilities": {"low": 1}}
}"#;
        let findings = parse_vulnerabilities(output);
        let records = findings.as_vulnerabilities().unwrap();

        let lodash = &records["lodash"];
        assert_eq!(lodash.severity, Severity::High);
        assert_eq!(lodash.findings.len(), 3);
        assert_eq!(lodash.findings[0].id, "1065");

        let minimist = &records["minimist"];
        assert_eq!(minimist.severity, Severity::Medium);
        assert_eq!(minimist.findings[0].id, "https://npmjs.com/advisories/7");
    }

    #[test]
    fn test_parse_npm7_vulnerabilities() {
        let output = r#"{
  "auditReportVersion": 2,
  "vulnerabilities": {
    "minimist": {
      "name": "minimist",
      "severity": "critical",
      "via": [
        {"source": 1179, "name": "minimist", "title": "Prototype Pollution in minimist",
         "url": "https://github.com/advisories/GHSA-xvch-5gv4-984h", "severity": "critical"}
      ]
    },
    "mkdirp": {
      "name": "mkdirp",
      "severity": "critical",
      "via": ["minimist"]
    }
  },
  "metadata": {}
}"#;
        let findings = parse_vulnerabilities(output);
        let records = findings.as_vulnerabilities().unwrap();

        assert_eq!(records["minimist"].severity, Severity::Critical);
        assert_eq!(
            records["minimist"].findings[0].id,
            "https://github.com/advisories/GHSA-xvch-5gv4-984h"
        );
        assert_eq!(records["mkdirp"].findings[0].id, "via:minimist");
        assert_eq!(records["mkdirp"].severity, Severity::Critical);
    }

    #[test]
    fn test_prepare_requires_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let tools = Toolchain::isolated();

        for kind in CheckKind::ALL {
            match prepare_in(&NpmProbe, kind, dir.path(), &tools) {
                Err(CheckError::ManifestMissing(message)) => {
                    assert!(message.starts_with("no node_modules"))
                }
                other => panic!("expected missing node_modules, got {:?}", other),
            }
        }

        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        assert_eq!(
            prepare_in(&NpmProbe, CheckKind::Outdated, dir.path(), &tools),
            Ok("npm outdated --depth=0 --color=false".to_string())
        );
        assert_eq!(
            prepare_in(&NpmProbe, CheckKind::Vulnerabilities, dir.path(), &tools),
            Ok("npm audit --json".to_string())
        );
    }

    #[test]
    fn test_parse_audit_skips_malformed_fragments() {
        let output = r#"npm WARN config production Use `--omit=dev` instead.
{"vulnerabilities": {"lodash": {"name": "lodash", "severity": "high"
{"vulnerabilities": {"minimist": "oops", "qs": {"name": "qs", "severity": "high", "via": [42, {"title": "qs vulnerable to Prototype Pollution", "url": "https://github.com/advisories/GHSA-hrpp-h998-j3pp", "severity": "high"}]}}}
"#;
        let findings = parse_vulnerabilities(output);
        let records = findings.as_vulnerabilities().unwrap();

        assert_eq!(findings.package_names(), vec!["qs"]);
        assert_eq!(records["qs"].findings.len(), 1);
        assert_eq!(records["qs"].severity, Severity::High);
    }
}
