use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Advisory severity, ordered `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Reads a severity word as printed by audit tools.
    ///
    /// Unrecognised or missing words count as [`Severity::Medium`].
    pub fn parse(word: &str) -> Self {
        match word.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" | "info" | "informational" => Severity::Low,
            _ => Severity::Medium,
        }
    }

    /// Maps a CVSS score into a severity level.
    ///
    /// Supports both numeric scores and CVSS vector strings. Returns `None`
    /// when nothing usable can be read from `score`.
    pub fn from_cvss(score: &str) -> Option<Self> {
        if let Ok(cvss) = score.trim().parse::<f32>() {
            return match cvss {
                s if s >= 9.0 => Some(Severity::Critical),
                s if s >= 7.0 => Some(Severity::High),
                s if s >= 4.0 => Some(Severity::Medium),
                s if s > 0.0 => Some(Severity::Low),
                _ => None,
            };
        }

        // Vectors like "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H" carry no
        // base score, so judge by the impact metrics alone.
        if score.contains("CVSS:") {
            if score.contains("/C:H") || score.contains("/I:H") || score.contains("/A:H") {
                return Some(Severity::High);
            }
            if score.contains("/C:L") || score.contains("/I:L") || score.contains("/A:L") {
                return Some(Severity::Medium);
            }
            return Some(Severity::Low);
        }

        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One advisory reported against a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub description: String,
    pub severity: Severity,
}

impl Finding {
    pub fn new(id: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            severity,
        }
    }
}

/// All advisories found for one package in a single scan.
///
/// `severity` is always the maximum over `findings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub package_name: String,
    pub severity: Severity,
    pub findings: Vec<Finding>,
}

impl VulnerabilityRecord {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            severity: Severity::Low,
            findings: Vec::new(),
        }
    }

    /// Appends a finding, raising the record's severity if needed.
    ///
    /// A finding whose id is already present is not repeated, but can still
    /// raise the severity.
    pub fn record(&mut self, finding: Finding) {
        if self.findings.is_empty() {
            self.severity = finding.severity;
        } else {
            self.severity = self.severity.max(finding.severity);
        }

        if !self.findings.iter().any(|f| f.id == finding.id) {
            self.findings.push(finding);
        }
    }

    /// Keeps only the findings matching `keep`, recomputing the severity.
    pub fn retain_findings(&mut self, mut keep: impl FnMut(&Finding) -> bool) {
        self.findings.retain(|f| keep(f));
        self.severity = self
            .findings
            .iter()
            .map(|f| f.severity)
            .max()
            .unwrap_or(Severity::Low);
    }

    pub fn display_line(&self) -> String {
        let summary = match self.findings.first() {
            Some(first) if first.description.is_empty() => first.id.clone(),
            Some(first) => first.description.clone(),
            None => String::new(),
        };

        let line = if self.findings.len() > 1 {
            format!(
                "[{}] {} ({}): {}",
                self.severity.label(),
                self.package_name,
                self.findings.len(),
                summary
            )
        } else {
            format!(
                "[{}] {}: {}",
                self.severity.label(),
                self.package_name,
                summary
            )
        };

        super::truncate(&line, super::DISPLAY_WIDTH)
    }
}

/// Adds `finding` to the record for `package`, creating it on first sight.
pub fn accumulate(
    records: &mut BTreeMap<String, VulnerabilityRecord>,
    package: &str,
    finding: Finding,
) {
    records
        .entry(package.to_string())
        .or_insert_with(|| VulnerabilityRecord::new(package))
        .record(finding);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_severity_words() {
        assert_eq!(Severity::parse("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse("high"), Severity::High);
        assert_eq!(Severity::parse("moderate"), Severity::Medium);
        assert_eq!(Severity::parse("low"), Severity::Low);
        assert_eq!(Severity::parse("info"), Severity::Low);
        assert_eq!(Severity::parse(""), Severity::Medium);
        assert_eq!(Severity::parse("bogus"), Severity::Medium);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::default(), Severity::Medium);
    }

    #[test]
    fn test_from_cvss_numeric() {
        assert_eq!(Severity::from_cvss("9.8"), Some(Severity::Critical));
        assert_eq!(Severity::from_cvss("7.0"), Some(Severity::High));
        assert_eq!(Severity::from_cvss("5.5"), Some(Severity::Medium));
        assert_eq!(Severity::from_cvss("0.1"), Some(Severity::Low));
        assert_eq!(Severity::from_cvss("0.0"), None);
        assert_eq!(Severity::from_cvss("not a number"), None);
    }

    #[test]
    fn test_from_cvss_vector() {
        assert_eq!(
            Severity::from_cvss("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N"),
            Some(Severity::High)
        );
        assert_eq!(
            Severity::from_cvss("CVSS:3.1/AV:L/AC:H/PR:L/UI:R/S:U/C:L/I:N/A:N"),
            Some(Severity::Medium)
        );
        assert_eq!(
            Severity::from_cvss("CVSS:3.1/AV:L/AC:H/PR:H/UI:R/S:U/C:N/I:N/A:N"),
            Some(Severity::Low)
        );
    }

    #[test]
    fn test_severity_never_downgrades() {
        let sequence = [
            Severity::Low,
            Severity::High,
            Severity::Medium,
            Severity::Critical,
            Severity::Low,
        ];

        let mut record = VulnerabilityRecord::new("lodash");
        for (i, severity) in sequence.iter().enumerate() {
            record.record(Finding::new(format!("ADV-{}", i), "advisory", *severity));
        }

        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.findings.len(), 5);
    }

    #[test]
    fn test_duplicate_finding_ids_collapse() {
        let mut records = BTreeMap::new();
        accumulate(&mut records, "pkg", Finding::new("GO-1", "first", Severity::Low));
        accumulate(&mut records, "pkg", Finding::new("GO-1", "again", Severity::High));

        let record = &records["pkg"];
        assert_eq!(record.findings.len(), 1);
        assert_eq!(record.findings[0].description, "first");
        assert_eq!(record.severity, Severity::High);
    }

    #[test]
    fn test_retain_findings_recomputes_severity() {
        let mut record = VulnerabilityRecord::new("pkg");
        record.record(Finding::new("A", "a", Severity::Critical));
        record.record(Finding::new("B", "b", Severity::Low));

        record.retain_findings(|f| f.id != "A");

        assert_eq!(record.severity, Severity::Low);
        assert_eq!(record.findings.len(), 1);
    }

    #[test]
    fn test_display_line_is_truncated() {
        let mut record = VulnerabilityRecord::new("pkg");
        record.record(Finding::new("A", "x".repeat(200), Severity::High));

        let line = record.display_line();
        assert_eq!(line.chars().count(), 80);
        assert!(line.starts_with("[HIGH] pkg: xxx"));
        assert!(line.ends_with("..."));
    }

    #[test]
    fn test_display_line_counts_findings() {
        let mut record = VulnerabilityRecord::new("lodash");
        record.record(Finding::new("1", "Prototype Pollution", Severity::High));
        record.record(Finding::new("2", "ReDoS", Severity::Medium));

        assert_eq!(
            record.display_line(),
            "[HIGH] lodash (2): Prototype Pollution"
        );
    }
}
