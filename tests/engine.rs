use async_trait::async_trait;
use depwatch::manifest::{ContainerId, ManifestLocator};
use depwatch::model::{CheckError, CheckKind, Ecosystem, Severity};
use depwatch::platform::Toolchain;
use depwatch::runner::{Invocation, ProcessOutput, ProcessRunner};
use depwatch::view::{AnnotationSink, ListSink};
use depwatch::StatusEngine;
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::sync::{Arc, Mutex};

/// Answers each command line with fixed output and counts how often it ran.
#[derive(Default)]
struct FakeTools {
    outputs: HashMap<String, ProcessOutput>,
    runs: Mutex<Vec<String>>,
}

impl FakeTools {
    fn with(mut self, command: &str, output: ProcessOutput) -> Self {
        self.outputs.insert(command.to_string(), output);
        self
    }

    fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeTools {
    async fn run(&self, invocation: &Invocation) -> ProcessOutput {
        self.runs.lock().unwrap().push(invocation.command.clone());
        self.outputs
            .get(&invocation.command)
            .cloned()
            .unwrap_or_else(|| ProcessOutput::new(127, "", "command not found"))
    }
}

const NPM_OUTDATED: &str = "\
Package  Current  Wanted   Latest   Location
express  4.17.1   4.18.2   4.18.2   node_modules/express
lodash   4.0.0    4.15.0   4.17.21  node_modules/lodash
";

const NPM_AUDIT: &str = r#"{
  "auditReportVersion": 2,
  "vulnerabilities": {
    "lodash": {
      "name": "lodash",
      "severity": "high",
      "via": [
        {"source": 1523, "title": "Command Injection in lodash", "url": "https://github.com/advisories/GHSA-35jh-r3h4-6jhm", "severity": "high"},
        {"source": 1065, "title": "Prototype Pollution in lodash", "url": "https://github.com/advisories/GHSA-p6mc-m468-83gw", "severity": "low"}
      ]
    }
  }
}"#;

const PACKAGE_JSON: &str = r#"{
  "name": "app",
  "dependencies": {
    "express": "^4.17.1",
    "lodash": "~4.0.0"
  }
}
"#;

fn npm_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("package.json"), PACKAGE_JSON).unwrap();
    fs::create_dir(dir.path().join("node_modules")).unwrap();
    dir
}

fn npm_tools() -> Arc<FakeTools> {
    Arc::new(
        FakeTools::default()
            .with(
                "npm outdated --depth=0 --color=false",
                ProcessOutput::new(1, NPM_OUTDATED, ""),
            )
            .with("npm audit --json", ProcessOutput::new(1, NPM_AUDIT, "")),
    )
}

struct Collect(Vec<(usize, Range<usize>, String)>);

impl AnnotationSink for Collect {
    fn annotate(&mut self, _location: ContainerId, line: usize, span: Range<usize>, label: &str) {
        self.0.push((line, span, label.to_string()));
    }

    fn clear(&mut self, _location: ContainerId) {
        self.0.clear();
    }
}

struct Titles(Vec<String>);

impl ListSink for Titles {
    fn show(&mut self, title: &str, labels: &[String], _on_select: &mut dyn FnMut(usize)) {
        self.0.push(title.to_string());
        self.0.extend(labels.iter().cloned());
    }
}

#[tokio::test]
async fn npm_outdated_exit_one_is_a_failure() {
    // `npm outdated` exits 1 whenever something is outdated; only the audit
    // command treats 1 as success.
    let dir = npm_project();
    let tools = npm_tools();
    let engine = StatusEngine::new(
        ManifestLocator::new(dir.path()),
        tools.clone(),
        Arc::new(Toolchain::isolated()),
    );

    let outdated = engine.check_outdated(Ecosystem::Npm).await;
    let audit = engine.check_vulnerabilities(Ecosystem::Npm).await;

    assert!(matches!(
        outdated.error(),
        Some(CheckError::ProcessFailure { code: 1, .. })
    ));
    assert!(outdated.display().is_empty());
    assert!(audit.is_ok());
    assert_eq!(
        audit.display(),
        vec!["[HIGH] lodash (2): Command Injection in lodash"]
    );
    assert_eq!(tools.runs().len(), 2);
}

#[tokio::test]
async fn full_cycle_feeds_every_view() {
    let dir = npm_project();
    let tools = Arc::new(
        FakeTools::default()
            .with(
                "npm outdated --depth=0 --color=false",
                ProcessOutput::new(0, NPM_OUTDATED, ""),
            )
            .with("npm audit --json", ProcessOutput::new(0, NPM_AUDIT, "")),
    );
    let engine = StatusEngine::new(
        ManifestLocator::new(dir.path()),
        tools.clone(),
        Arc::new(Toolchain::isolated()),
    );
    let mut updates = engine.subscribe();

    let results = engine
        .check_all(&[
            (Ecosystem::Npm, CheckKind::Outdated),
            (Ecosystem::Npm, CheckKind::Vulnerabilities),
            (Ecosystem::Cargo, CheckKind::Outdated),
        ])
        .await;

    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(matches!(
        results[2].error(),
        Some(CheckError::ManifestMissing(_))
    ));
    assert!(updates.has_changed().unwrap());
    updates.borrow_and_update();

    // Status report
    let status = engine.query_status();
    assert_eq!(status.ecosystems.len(), 1);
    assert_eq!(status.outdated_count(), 2);
    assert_eq!(status.max_severity(), Some(Severity::High));
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(
        json["ecosystems"][0]["outdated"][1]["available_version"],
        "4.15.0"
    );

    // List view
    let mut titles = Titles(Vec::new());
    engine
        .presenter()
        .show_list(&mut titles, CheckKind::Outdated, |_| {});
    assert_eq!(
        titles.0,
        vec![
            "Outdated packages",
            "[npm] express: 4.17.1 → 4.18.2",
            "[npm] lodash: 4.0.0 → 4.15.0",
        ]
    );

    // Annotation view
    let entry = engine.manifests().remove(0);
    let mut sink = Collect(Vec::new());
    let placed = engine
        .presenter()
        .annotate_manifest(&entry, PACKAGE_JSON, &mut sink);
    assert_eq!(placed, 2);
    assert_eq!(sink.0[0].0, 3);
    assert_eq!(sink.0[0].2, "⇡ 4.18.2");
    assert_eq!(sink.0[1].2, "⇡ 4.15.0  ⚠ HIGH (2)");

    // Reset
    engine.reset_all();
    assert!(updates.has_changed().unwrap());
    assert!(engine.query_status().is_empty());
}

#[tokio::test]
async fn concurrent_refreshes_leave_one_complete_snapshot() {
    let dir = npm_project();
    let tools = npm_tools();
    let engine = Arc::new(StatusEngine::new(
        ManifestLocator::new(dir.path()),
        tools.clone(),
        Arc::new(Toolchain::isolated()),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| engine.spawn_check(Ecosystem::Npm, CheckKind::Vulnerabilities))
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let snapshot = engine
        .query(Ecosystem::Npm, CheckKind::Vulnerabilities)
        .unwrap();
    assert_eq!(snapshot.findings.package_names(), vec!["lodash"]);
    assert_eq!(tools.runs().len(), 8);
}
