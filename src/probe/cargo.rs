use super::{json, Probe, ProbeEnv};
use crate::model::{
    accumulate, CheckError, CheckKind, Ecosystem, Finding, Findings, PackageRecord, Severity,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Rust crates: `cargo outdated` and `cargo audit`, both cargo plugins.
pub struct CargoProbe;

impl Probe for CargoProbe {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cargo
    }

    fn prepare(&self, kind: CheckKind, env: &mut ProbeEnv<'_>) -> Result<String, CheckError> {
        env.require("cargo", "Install Rust from https://rustup.rs")?;

        match kind {
            CheckKind::Outdated => {
                env.require("cargo-outdated", "Install with: cargo install cargo-outdated")?;
                Ok("cargo outdated --format=json".to_string())
            }
            CheckKind::Vulnerabilities => {
                env.require("cargo-audit", "Install with: cargo install cargo-audit")?;
                Ok("cargo audit --json".to_string())
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

/// Reads `cargo outdated --format=json` output.
///
/// A dependency counts when its `latest` differs from the `project`
/// version. `---` and `Removed` are cargo-outdated's placeholders, not
/// versions.
pub fn parse_outdated(output: &str) -> Findings {
    let mut records = Vec::new();

    for value in json::values(output) {
        json::for_each_object(&value, &mut |object| {
            let (Some(name), Some(project), Some(latest)) = (
                json::text(object, "name"),
                json::text(object, "project"),
                json::text(object, "latest"),
            ) else {
                return;
            };
            if project != latest && !matches!(latest, "---" | "Removed") {
                records.push(PackageRecord::new(name, project, latest));
            }
        });
    }

    Findings::outdated(records)
}

/// Reads `cargo audit --json` output.
///
/// Only `vulnerabilities.list` is read; `warnings` (unmaintained, yanked)
/// aren't advisories against the code.
pub fn parse_vulnerabilities(output: &str) -> Findings {
    let mut records = BTreeMap::new();

    for report in json::values(output) {
        let Some(list) = report
            .get("vulnerabilities")
            .and_then(|v| v.get("list"))
            .and_then(Value::as_array)
        else {
            continue;
        };

        for entry in list {
            let Some(advisory) = entry.get("advisory").and_then(Value::as_object) else {
                continue;
            };
            let package = json::text(advisory, "package").or_else(|| {
                entry
                    .get("package")
                    .and_then(Value::as_object)
                    .and_then(|p| json::text(p, "name"))
            });
            let (Some(package), Some(id)) = (package, json::text(advisory, "id")) else {
                continue;
            };

            let title = json::text(advisory, "title").unwrap_or(id);
            let severity = json::text(advisory, "severity")
                .map(Severity::parse)
                .or_else(|| json::text(advisory, "cvss").and_then(Severity::from_cvss))
                .unwrap_or_default();

            accumulate(&mut records, package, Finding::new(id, title, severity));
        }
    }

    Findings::Vulnerabilities(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Toolchain;
    use crate::probe::testing::prepare_in;

    #[test]
    fn test_parse_outdated() {
        let output = r#"{
  "crate_name": "app",
  "dependencies": [
    {"name": "serde", "project": "1.0.100", "compat": "1.0.193", "latest": "1.0.193", "kind": "Normal"},
    {"name": "rand", "project": "0.7.3", "compat": "---", "latest": "0.8.5", "kind": "Normal"},
    {"name": "gone", "project": "0.1.0", "compat": "---", "latest": "Removed", "kind": "Normal"},
    {"name": "log", "project": "0.4.20", "compat": "---", "latest": "0.4.20", "kind": "Normal"}
  ]
}"#;
        let findings = parse_outdated(output);
        let records = findings.as_outdated().unwrap();

        assert_eq!(findings.package_names(), vec!["rand", "serde"]);
        assert_eq!(records["rand"], PackageRecord::new("rand", "0.7.3", "0.8.5"));
    }

    #[test]
    fn test_parse_audit() {
        let output = r#"{
  "database": {"advisory-count": 600},
  "vulnerabilities": {
    "found": true,
    "count": 2,
    "list": [
      {
        "advisory": {
          "id": "RUSTSEC-2021-0003",
          "package": "smallvec",
          "title": "Buffer overflow in SmallVec::insert_many",
          "cvss": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
        },
        "package": {"name": "smallvec", "version": "1.6.0"}
      },
      {
        "advisory": {
          "id": "RUSTSEC-2020-0071",
          "package": "time",
          "title": "Potential segfault in the time crate",
          "cvss": "6.2"
        }
      },
      {
        "advisory": {"id": "RUSTSEC-2099-0001", "title": "No package"}
      }
    ]
  },
  "warnings": {"unmaintained": [{"advisory": {"id": "RUSTSEC-2020-0016", "package": "net2"}}]}
}"#;
        let findings = parse_vulnerabilities(output);
        let records = findings.as_vulnerabilities().unwrap();

        assert_eq!(findings.package_names(), vec!["smallvec", "time"]);
        assert_eq!(records["smallvec"].severity, Severity::High);
        assert_eq!(records["smallvec"].findings[0].id, "RUSTSEC-2021-0003");
        assert_eq!(records["time"].severity, Severity::Medium);
    }

    #[test]
    fn test_parse_audit_clean() {
        let output = r#"{"vulnerabilities": {"found": false, "count": 0, "list": []}}"#;
        assert!(parse_vulnerabilities(output).is_empty());
    }

    #[test]
    fn test_missing_plugin_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Toolchain::isolated().with_override("cargo", "/usr/bin/cargo");

        match prepare_in(&CargoProbe, CheckKind::Outdated, dir.path(), &tools) {
            Err(CheckError::ToolMissing { tool, hint }) => {
                assert_eq!(tool, "cargo-outdated");
                assert_eq!(hint, "Install with: cargo install cargo-outdated");
            }
            other => panic!("expected missing cargo-outdated, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_cargo_is_reported_first() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Toolchain::isolated().with_override("cargo-audit", "/bin/cargo-audit");

        let outcome = prepare_in(&CargoProbe, CheckKind::Vulnerabilities, dir.path(), &tools);
        assert!(matches!(outcome, Err(CheckError::ToolMissing { ref tool, .. }) if tool == "cargo"));
    }

    #[test]
    fn test_prepare_commands() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Toolchain::isolated()
            .with_override("cargo", "/usr/bin/cargo")
            .with_override("cargo-outdated", "/usr/bin/cargo-outdated")
            .with_override("cargo-audit", "/usr/bin/cargo-audit");

        assert_eq!(
            prepare_in(&CargoProbe, CheckKind::Outdated, dir.path(), &tools),
            Ok("cargo outdated --format=json".to_string())
        );
        assert_eq!(
            prepare_in(&CargoProbe, CheckKind::Vulnerabilities, dir.path(), &tools),
            Ok("cargo audit --json".to_string())
        );
    }

    #[test]
    fn test_parse_outdated_skips_malformed_fragments() {
        let output = r#"{"crate_name": "app", "dependencies": [{"name": "rand", "project": "0.7.3"
{"crate_name": "app", "dependencies": [{"name": "serde", "project": "1.0.100", "latest": "1.0.193"}, {"name": 5, "project": "1", "latest": "2"}, null]}
"#;
        let findings = parse_outdated(output);

        assert_eq!(findings.package_names(), vec!["serde"]);
    }

    #[test]
    fn test_parse_audit_skips_malformed_fragments() {
        let output = r#"    Fetching advisory database from `https://github.com/RustSec/advisory-db.git`
{"vulnerabilities": {"list": [{"advisory": "bogus"}, {"advisory": {"id": "RUSTSEC-2020-0071", "package": "time", "title": "Potential segfault in the time crate"}}, {"package": {"name": "x"}}]}}
"#;
        let findings = parse_vulnerabilities(output);
        let records = findings.as_vulnerabilities().unwrap();

        assert_eq!(findings.package_names(), vec!["time"]);
        assert_eq!(records["time"].findings[0].id, "RUSTSEC-2020-0071");
        assert_eq!(records["time"].severity, Severity::Medium);
    }
}
