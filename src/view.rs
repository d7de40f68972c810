//! Read-only views over the aggregator.
//!
//! Nothing here performs I/O. A [`Presenter`] turns the current snapshots
//! into a status report, a searchable list, or per-line manifest
//! annotations, and hands them to sinks supplied by the front end.

use crate::aggregator::Aggregator;
use crate::manifest::{declared_dependencies, ContainerId, ManifestEntry};
use crate::model::{CheckKind, Ecosystem, PackageRecord, Severity, VulnerabilityRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::Range;

/// Everything currently known, per ecosystem.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub ecosystems: Vec<EcosystemStatus>,
}

/// One ecosystem's snapshots. A `None` timestamp means that check has not
/// completed since the last reset.
#[derive(Debug, Clone, Serialize)]
pub struct EcosystemStatus {
    pub ecosystem: Ecosystem,
    pub outdated: Vec<PackageRecord>,
    pub vulnerabilities: Vec<VulnerabilityRecord>,
    pub outdated_checked_at: Option<DateTime<Utc>>,
    pub vulnerabilities_checked_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    /// Builds a report from the snapshots stored right now. Ecosystems
    /// without any snapshot are left out.
    pub fn from_aggregator(aggregator: &Aggregator) -> Self {
        let ecosystems = Ecosystem::ALL
            .into_iter()
            .filter_map(|ecosystem| {
                let outdated = aggregator.query(ecosystem, CheckKind::Outdated);
                let vulnerable = aggregator.query(ecosystem, CheckKind::Vulnerabilities);
                if outdated.is_none() && vulnerable.is_none() {
                    return None;
                }

                Some(EcosystemStatus {
                    ecosystem,
                    outdated: outdated
                        .as_ref()
                        .and_then(|s| s.findings.as_outdated())
                        .map(|records| records.values().cloned().collect())
                        .unwrap_or_default(),
                    vulnerabilities: vulnerable
                        .as_ref()
                        .and_then(|s| s.findings.as_vulnerabilities())
                        .map(|records| records.values().cloned().collect())
                        .unwrap_or_default(),
                    outdated_checked_at: outdated.map(|s| s.completed_at),
                    vulnerabilities_checked_at: vulnerable.map(|s| s.completed_at),
                })
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            ecosystems,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ecosystems.is_empty()
    }

    pub fn outdated_count(&self) -> usize {
        self.ecosystems.iter().map(|e| e.outdated.len()).sum()
    }

    pub fn vulnerable_count(&self) -> usize {
        self.ecosystems.iter().map(|e| e.vulnerabilities.len()).sum()
    }

    /// Highest severity across every vulnerability record, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.ecosystems
            .iter()
            .flat_map(|e| &e.vulnerabilities)
            .map(|v| v.severity)
            .max()
    }
}

/// A searchable list UI.
pub trait ListSink {
    /// Shows `labels` under `title`. `on_select` receives the index of a
    /// chosen label.
    fn show(&mut self, title: &str, labels: &[String], on_select: &mut dyn FnMut(usize));
}

/// Renders inline annotations next to manifest lines.
pub trait AnnotationSink {
    fn annotate(&mut self, location: ContainerId, line: usize, span: Range<usize>, label: &str);

    /// Removes every annotation previously placed at `location`.
    fn clear(&mut self, location: ContainerId);
}

/// One row of the list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub ecosystem: Ecosystem,
    pub package: String,
    pub label: String,
}

pub struct Presenter<'a> {
    aggregator: &'a Aggregator,
}

impl<'a> Presenter<'a> {
    pub fn new(aggregator: &'a Aggregator) -> Self {
        Self { aggregator }
    }

    /// Rows for `kind` across every ecosystem, in ecosystem then package
    /// order.
    pub fn list_entries(&self, kind: CheckKind) -> Vec<ListEntry> {
        let mut entries = Vec::new();

        for ecosystem in Ecosystem::ALL {
            let Some(snapshot) = self.aggregator.query(ecosystem, kind) else {
                continue;
            };
            let names = snapshot.findings.package_names();
            let lines = snapshot.findings.display_lines();
            for (package, line) in names.into_iter().zip(lines) {
                entries.push(ListEntry {
                    ecosystem,
                    package: package.to_string(),
                    label: format!("[{}] {}", ecosystem.display_name(), line),
                });
            }
        }

        entries
    }

    /// Sends the list for `kind` to `sink`; a selection is resolved back to
    /// its entry before reaching `on_select`.
    pub fn show_list(
        &self,
        sink: &mut dyn ListSink,
        kind: CheckKind,
        mut on_select: impl FnMut(&ListEntry),
    ) {
        let entries = self.list_entries(kind);
        let labels: Vec<String> = entries.iter().map(|e| e.label.clone()).collect();

        sink.show(kind.title(), &labels, &mut |index| {
            if let Some(entry) = entries.get(index) {
                on_select(entry);
            }
        });
    }

    /// Replaces the annotations for `entry` with one per declared
    /// dependency that has an outdated or vulnerability record. `text` is
    /// the manifest's current contents. Returns how many were placed.
    pub fn annotate_manifest(
        &self,
        entry: &ManifestEntry,
        text: &str,
        sink: &mut dyn AnnotationSink,
    ) -> usize {
        sink.clear(entry.container);

        let ecosystem = entry.ecosystem;
        let key = |name: &str| package_key(ecosystem, name);

        let outdated_snapshot = self.aggregator.query(ecosystem, CheckKind::Outdated);
        let outdated: HashMap<String, &PackageRecord> = outdated_snapshot
            .as_ref()
            .and_then(|s| s.findings.as_outdated())
            .map(|records| records.iter().map(|(name, r)| (key(name), r)).collect())
            .unwrap_or_default();

        let vulnerable_snapshot = self.aggregator.query(ecosystem, CheckKind::Vulnerabilities);
        let vulnerable: HashMap<String, &VulnerabilityRecord> = vulnerable_snapshot
            .as_ref()
            .and_then(|s| s.findings.as_vulnerabilities())
            .map(|records| records.iter().map(|(name, r)| (key(name), r)).collect())
            .unwrap_or_default();

        let mut placed = 0;
        for dependency in declared_dependencies(ecosystem, text) {
            let name = key(&dependency.name);
            let mut parts = Vec::new();
            if let Some(record) = outdated.get(&name) {
                parts.push(format!("⇡ {}", record.available_version));
            }
            if let Some(record) = vulnerable.get(&name) {
                parts.push(format!(
                    "⚠ {} ({})",
                    record.severity.label(),
                    record.findings.len()
                ));
            }
            if parts.is_empty() {
                continue;
            }

            sink.annotate(
                entry.container,
                dependency.line,
                dependency.span,
                &parts.join("  "),
            );
            placed += 1;
        }

        placed
    }
}

/// Python package names compare case-insensitively, with `-`, `_` and `.`
/// all equivalent. Other ecosystems compare exactly.
fn package_key(ecosystem: Ecosystem, name: &str) -> String {
    match ecosystem {
        Ecosystem::Python => name
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '.' { '-' } else { c })
            .collect(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestLocator;
    use crate::model::{accumulate, Finding, Findings};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct RecordingSink {
        cleared: Vec<ContainerId>,
        annotations: Vec<(usize, Range<usize>, String)>,
    }

    impl AnnotationSink for RecordingSink {
        fn annotate(&mut self, _location: ContainerId, line: usize, span: Range<usize>, label: &str) {
            self.annotations.push((line, span, label.to_string()));
        }

        fn clear(&mut self, location: ContainerId) {
            self.cleared.push(location);
            self.annotations.clear();
        }
    }

    struct PickFirst;

    impl ListSink for PickFirst {
        fn show(&mut self, _title: &str, labels: &[String], on_select: &mut dyn FnMut(usize)) {
            if !labels.is_empty() {
                on_select(0);
            }
        }
    }

    fn vulnerabilities(package: &str, severities: &[Severity]) -> Findings {
        let mut records = BTreeMap::new();
        for (i, severity) in severities.iter().enumerate() {
            accumulate(&mut records, package, Finding::new(format!("ID-{}", i), "bad", *severity));
        }
        Findings::Vulnerabilities(records)
    }

    fn manifest(dir: &std::path::Path, name: &str, text: &str) -> ManifestEntry {
        std::fs::write(dir.join(name), text).unwrap();
        let mut locator = ManifestLocator::new(dir);
        locator.all().remove(0)
    }

    #[test]
    fn test_status_report() {
        let aggregator = Aggregator::new();
        aggregator.store(
            Ecosystem::Npm,
            Findings::outdated([PackageRecord::new("lodash", "4.0.0", "4.17.21")]),
        );
        aggregator.store(
            Ecosystem::Npm,
            vulnerabilities("lodash", &[Severity::Low, Severity::Critical]),
        );
        aggregator.store(Ecosystem::Go, Findings::empty(CheckKind::Outdated));

        let report = StatusReport::from_aggregator(&aggregator);

        assert_eq!(report.ecosystems.len(), 2);
        assert_eq!(report.ecosystems[0].ecosystem, Ecosystem::Go);
        assert!(report.ecosystems[0].vulnerabilities_checked_at.is_none());
        assert_eq!(report.outdated_count(), 1);
        assert_eq!(report.vulnerable_count(), 1);
        assert_eq!(report.max_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_empty_report() {
        let report = StatusReport::from_aggregator(&Aggregator::new());
        assert!(report.is_empty());
        assert_eq!(report.max_severity(), None);
    }

    #[test]
    fn test_list_selection_resolves_entry() {
        let aggregator = Aggregator::new();
        aggregator.store(
            Ecosystem::Cargo,
            Findings::outdated([PackageRecord::new("serde", "1.0.0", "1.0.193")]),
        );
        aggregator.store(
            Ecosystem::Python,
            Findings::outdated([
                PackageRecord::new("requests", "2.25.0", "2.31.0"),
                PackageRecord::new("flask", "1.0", "3.0"),
            ]),
        );

        let presenter = Presenter::new(&aggregator);
        let labels: Vec<_> = presenter
            .list_entries(CheckKind::Outdated)
            .into_iter()
            .map(|e| e.label)
            .collect();
        assert_eq!(
            labels,
            vec![
                "[Python] flask: 1.0 → 3.0",
                "[Python] requests: 2.25.0 → 2.31.0",
                "[Cargo] serde: 1.0.0 → 1.0.193",
            ]
        );

        let mut picked = None;
        presenter.show_list(&mut PickFirst, CheckKind::Outdated, |entry| {
            picked = Some((entry.ecosystem, entry.package.clone()));
        });
        assert_eq!(picked, Some((Ecosystem::Python, "flask".to_string())));
    }

    #[test]
    fn test_annotations_for_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let text = "# pinned\nRequests==2.25.0\nflask>=1.0\nzope.interface==5.0\n";
        let entry = manifest(dir.path(), "requirements.txt", text);

        let aggregator = Aggregator::new();
        aggregator.store(
            Ecosystem::Python,
            Findings::outdated([
                PackageRecord::new("requests", "2.25.0", "2.31.0"),
                PackageRecord::new("zope-interface", "5.0", "6.1"),
            ]),
        );
        aggregator.store(
            Ecosystem::Python,
            vulnerabilities("requests", &[Severity::Medium, Severity::High]),
        );

        let mut sink = RecordingSink::default();
        let placed = Presenter::new(&aggregator).annotate_manifest(&entry, text, &mut sink);

        assert_eq!(placed, 2);
        assert_eq!(sink.cleared, vec![entry.container]);
        assert_eq!(
            sink.annotations,
            vec![
                (1, 0..8, "⇡ 2.31.0  ⚠ HIGH (2)".to_string()),
                (3, 0..14, "⇡ 6.1".to_string()),
            ]
        );
    }

    #[test]
    fn test_annotations_are_cleared_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let text = "{\n  \"dependencies\": {\n    \"express\": \"^4.17.1\"\n  }\n}\n";
        let entry = manifest(dir.path(), "package.json", text);

        let mut sink = RecordingSink::default();
        sink.annotations.push((0, 0..1, "stale".to_string()));

        let placed = Presenter::new(&Aggregator::new()).annotate_manifest(&entry, text, &mut sink);

        assert_eq!(placed, 0);
        assert!(sink.annotations.is_empty());
    }

    #[test]
    fn test_package_key() {
        assert_eq!(package_key(Ecosystem::Python, "Zope_Interface"), "zope-interface");
        assert_eq!(package_key(Ecosystem::Npm, "Lodash"), "Lodash");
    }
}
