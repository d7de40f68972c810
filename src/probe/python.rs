use super::{json, Probe, ProbeEnv};
use crate::model::{
    accumulate, CheckError, CheckKind, Ecosystem, Finding, Findings, PackageRecord, Severity,
};
use crate::platform::{shell_quote, venv_interpreter};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// pip for outdated packages, `safety` for advisories.
pub struct PythonProbe;

/// `pip list --format=columns` prints a title row and a dashed rule.
const PIP_HEADER_LINES: usize = 2;

impl Probe for PythonProbe {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    fn prepare(&self, kind: CheckKind, env: &mut ProbeEnv<'_>) -> Result<String, CheckError> {
        match kind {
            CheckKind::Outdated => {
                let dir = env.dir().to_path_buf();
                let local = venv_interpreter(&dir, &mut |p: &Path| env.exists(p));
                let python = local
                    .or_else(|| env.tools().find("python3"))
                    .or_else(|| env.tools().find("python"))
                    .ok_or_else(|| {
                        CheckError::tool_missing(
                            "python",
                            "Install Python 3 or create a .venv next to requirements.txt",
                        )
                    })?;

                Ok(format!(
                    "{} -m pip list --outdated --format=columns",
                    shell_quote(&python.to_string_lossy())
                ))
            }
            CheckKind::Vulnerabilities => {
                env.require("safety", "Install with: pip install safety")?;
                Ok("safety check --json".to_string())
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

/// Reads `pip list --outdated --format=columns` output.
///
/// ```text
/// Package    Version Latest Type
/// ---------- ------- ------ -----
/// requests   2.25.0  2.31.0 wheel
/// ```
pub fn parse_outdated(output: &str) -> Findings {
    let records = output
        .lines()
        .skip(PIP_HEADER_LINES)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let current = fields.next()?;
            let available = fields.next()?;
            Some(PackageRecord::new(name, current, available))
        });

    Findings::outdated(records)
}

/// Reads `safety check --json` output.
///
/// Safety's reports carry no severity this probe trusts, so every finding
/// is recorded as medium.
pub fn parse_vulnerabilities(output: &str) -> Findings {
    let mut records = BTreeMap::new();

    for value in json::values(output) {
        // Safety 1.x: a bare array of
        // [name, spec, installed, advisory, vulnerability_id, ...] rows.
        if let Value::Array(rows) = &value {
            for row in rows.iter().filter_map(Value::as_array) {
                let field = |i: usize| row.get(i).and_then(Value::as_str);
                if let (Some(name), Some(advisory), Some(id)) = (field(0), field(3), field(4)) {
                    accumulate(
                        &mut records,
                        name,
                        Finding::new(id, advisory.trim(), Severity::Medium),
                    );
                }
            }
        }

        // Safety 2.x: only the top-level `vulnerabilities` list counts;
        // `ignored_vulnerabilities` has the same shape.
        let reported = value
            .get("vulnerabilities")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object);
        for object in reported {
            let (Some(name), Some(id)) = (
                json::text(object, "package_name"),
                json::text_or_number(object, "vulnerability_id"),
            ) else {
                continue;
            };
            let advisory = json::text(object, "advisory").unwrap_or_default();
            accumulate(
                &mut records,
                name,
                Finding::new(id, advisory.trim(), Severity::Medium),
            );
        }
    }

    Findings::Vulnerabilities(records)
}
