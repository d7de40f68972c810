use super::CheckReport;
use crate::manifest::{ContainerId, ManifestEntry};
use crate::model::{truncate, Severity};
use crate::view::{AnnotationSink, ListSink};
use anyhow::Result;
use std::collections::BTreeMap;
use std::ops::Range;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct VulnRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Ecosystem")]
    ecosystem: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Title")]
    title: String,
}

#[derive(Tabled)]
struct OutdatedRow {
    #[tabled(rename = "Ecosystem")]
    ecosystem: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Current")]
    current: String,
    #[tabled(rename = "Available")]
    available: String,
    #[tabled(rename = "Type")]
    update_type: String,
}

#[derive(Tabled)]
struct ManifestRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Ecosystem")]
    ecosystem: String,
    #[tabled(rename = "Path")]
    path: String,
}

pub fn print_cli_table(report: &CheckReport) -> Result<()> {
    let status = &report.status;

    println!();
    println!(
        "Checked at: {}",
        status.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    for failure in &report.failures {
        println!("  ! {}", failure.message);
    }
    if !report.failures.is_empty() {
        println!();
    }

    // Vulnerabilities
    let mut vulns: Vec<_> = status
        .ecosystems
        .iter()
        .flat_map(|e| e.vulnerabilities.iter().map(move |v| (e.ecosystem, v)))
        .collect();
    if !vulns.is_empty() {
        println!("Found {} vulnerable packages:", vulns.len());
        println!();

        vulns.sort_by(|a, b| b.1.severity.cmp(&a.1.severity));

        let rows: Vec<VulnRow> = vulns
            .iter()
            .flat_map(|(ecosystem, record)| {
                record.findings.iter().map(move |finding| VulnRow {
                    severity: format_severity(&finding.severity),
                    ecosystem: ecosystem.display_name().to_string(),
                    package: record.package_name.clone(),
                    id: finding.id.clone(),
                    title: truncate(&finding.description, 50),
                })
            })
            .collect();

        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    // Outdated packages
    let outdated: Vec<OutdatedRow> = status
        .ecosystems
        .iter()
        .flat_map(|e| {
            e.outdated.iter().map(move |o| OutdatedRow {
                ecosystem: e.ecosystem.display_name().to_string(),
                package: o.name.clone(),
                current: o.current_version.clone(),
                available: o.available_version.clone(),
                update_type: classify_update(&o.current_version, &o.available_version)
                    .to_string(),
            })
        })
        .collect();
    if !outdated.is_empty() {
        println!();
        println!("Found {} outdated packages:", outdated.len());
        println!();

        let table = Table::new(outdated).with(Style::rounded()).to_string();
        println!("{}", table);
    }

    println!();
    print_summary(report);

    Ok(())
}

fn print_summary(report: &CheckReport) {
    let status = &report.status;
    let count = |severity: Severity| {
        status
            .ecosystems
            .iter()
            .flat_map(|e| &e.vulnerabilities)
            .filter(|v| v.severity == severity)
            .count()
    };

    println!("Summary:");
    if status.is_empty() && report.failures.is_empty() {
        println!("  Nothing was checked.");
        return;
    }

    let checked: Vec<&str> = status
        .ecosystems
        .iter()
        .map(|e| e.ecosystem.display_name())
        .collect();
    if !checked.is_empty() {
        println!("  Checked: {}", checked.join(", "));
    }

    if status.vulnerable_count() > 0 {
        println!(
            "  Vulnerable packages: {} critical, {} high, {} medium, {} low",
            count(Severity::Critical),
            count(Severity::High),
            count(Severity::Medium),
            count(Severity::Low)
        );
    } else if status.ecosystems.iter().any(|e| e.vulnerabilities_checked_at.is_some()) {
        println!("  No known vulnerabilities");
    }

    if status.outdated_count() > 0 {
        let major_count = status
            .ecosystems
            .iter()
            .flat_map(|e| &e.outdated)
            .filter(|o| classify_update(&o.current_version, &o.available_version) == "MAJOR")
            .count();

        if major_count > 0 {
            println!(
                "  Outdated packages: {} ({} major updates)",
                status.outdated_count(),
                major_count
            );
        } else {
            println!("  Outdated packages: {}", status.outdated_count());
        }
    } else if status.ecosystems.iter().any(|e| e.outdated_checked_at.is_some()) {
        println!("  All packages up to date");
    }

    if !report.failures.is_empty() {
        println!("  Could not check: {}", report.failures.len());
    }
}

fn format_severity(severity: &Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
    }
}

/// Classify version update as major, minor, or patch.
///
/// Versions that aren't valid semver (`v1.2`, `2.0.0.post1`) are compared
/// by their leading numeric components.
pub fn classify_update(current: &str, available: &str) -> &'static str {
    let parse = |v: &str| {
        let v = v.trim().trim_start_matches('v');
        semver::Version::parse(v)
            .map(|s| (Some(s.major), Some(s.minor)))
            .unwrap_or_else(|_| {
                let mut parts = v.split(['.', '-', '+']).map(|p| p.parse::<u64>().ok());
                (parts.next().flatten(), parts.next().flatten())
            })
    };

    let (current_major, current_minor) = parse(current);
    let (available_major, available_minor) = parse(available);

    if let (Some(cm), Some(am)) = (current_major, available_major) {
        if am > cm {
            return "MAJOR";
        }
        if let (Some(cmi), Some(ami)) = (current_minor, available_minor) {
            if am == cm && ami > cmi {
                return "minor";
            }
        }
    }

    "patch"
}

pub fn print_manifests(entries: &[ManifestEntry]) {
    if entries.is_empty() {
        println!("No manifests found.");
        return;
    }

    let rows: Vec<ManifestRow> = entries
        .iter()
        .map(|entry| ManifestRow {
            id: entry.container.to_string(),
            ecosystem: entry.ecosystem.display_name().to_string(),
            path: entry.path.display().to_string(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Prints a numbered list; `pick` (1-based) stands in for the user's
/// choice.
pub struct TerminalList {
    pick: Option<usize>,
}

impl TerminalList {
    pub fn new(pick: Option<usize>) -> Self {
        Self { pick }
    }
}

impl ListSink for TerminalList {
    fn show(&mut self, title: &str, labels: &[String], on_select: &mut dyn FnMut(usize)) {
        println!("{} ({}):", title, labels.len());
        for (i, label) in labels.iter().enumerate() {
            println!("  {:>3}. {}", i + 1, label);
        }

        if let Some(pick) = self.pick {
            if pick >= 1 && pick <= labels.len() {
                on_select(pick - 1);
            }
        }
    }
}

/// Collects annotations for one manifest and renders them after the lines
/// they belong to.
pub struct TerminalAnnotations {
    lines: Vec<String>,
    notes: BTreeMap<usize, Vec<String>>,
}

impl TerminalAnnotations {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            notes: BTreeMap::new(),
        }
    }

    pub fn render(&self) -> String {
        let width = self.lines.len().to_string().len();
        let mut out = String::new();

        for (index, line) in self.lines.iter().enumerate() {
            match self.notes.get(&index) {
                Some(notes) => out.push_str(&format!(
                    "{:>width$} | {}    {}\n",
                    index + 1,
                    line,
                    notes.join("  "),
                    width = width
                )),
                None => out.push_str(&format!("{:>width$} | {}\n", index + 1, line, width = width)),
            }
        }

        out
    }
}

impl AnnotationSink for TerminalAnnotations {
    fn annotate(&mut self, _location: ContainerId, line: usize, _span: Range<usize>, label: &str) {
        self.notes.entry(line).or_default().push(label.to_string());
    }

    fn clear(&mut self, _location: ContainerId) {
        self.notes.clear();
    }
}
