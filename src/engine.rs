//! The dependency-status engine.
//!
//! [`StatusEngine`] wires the pieces together: a check request finds the
//! ecosystem's manifest, lets the probe validate its tools and build a
//! command, runs it, parses the output, drops ignored entries, and stores
//! the result in the [`Aggregator`].
//!
//! ```text
//! locate manifest -> probe.prepare -> runner.run -> probe.parse -> ignore filter -> commit
//! ```
//!
//! Checks never block one another. Several may be in flight at once,
//! including two for the same `(ecosystem, kind)` pair; see the
//! [`aggregator`](crate::aggregator) docs for which of those wins.

use crate::aggregator::{Aggregator, Snapshot};
use crate::config::IgnoreConfig;
use crate::manifest::{ContainerId, ManifestEntry, ManifestLocator};
use crate::model::{CheckError, CheckKind, CheckResult, Ecosystem};
use crate::platform::ToolLocator;
use crate::probe::{self, Probe, ProbeEnv};
use crate::runner::{Invocation, ProcessRunner};
use crate::view::{Presenter, StatusReport};
use futures::future::join_all;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub struct StatusEngine {
    runner: Arc<dyn ProcessRunner>,
    tools: Arc<dyn ToolLocator>,
    locator: Mutex<ManifestLocator>,
    aggregator: Aggregator,
    ignore: IgnoreConfig,
}

impl StatusEngine {
    pub fn new(
        locator: ManifestLocator,
        runner: Arc<dyn ProcessRunner>,
        tools: Arc<dyn ToolLocator>,
    ) -> Self {
        Self {
            runner,
            tools,
            locator: Mutex::new(locator),
            aggregator: Aggregator::new(),
            ignore: IgnoreConfig::default(),
        }
    }

    /// Entries matching `ignore` are removed before results are stored.
    pub fn with_ignore(mut self, ignore: IgnoreConfig) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn presenter(&self) -> Presenter<'_> {
        Presenter::new(&self.aggregator)
    }

    pub async fn check_outdated(&self, ecosystem: Ecosystem) -> CheckResult {
        self.check(ecosystem, CheckKind::Outdated).await
    }

    pub async fn check_vulnerabilities(&self, ecosystem: Ecosystem) -> CheckResult {
        self.check(ecosystem, CheckKind::Vulnerabilities).await
    }

    /// Runs one check and stores its findings on success.
    ///
    /// A failed check leaves the previous snapshot for the pair in place.
    #[instrument(skip_all, fields(ecosystem = %ecosystem, kind = %kind))]
    pub async fn check(&self, ecosystem: Ecosystem, kind: CheckKind) -> CheckResult {
        let probe = probe::probe_for(ecosystem);
        let ticket = self.aggregator.begin(ecosystem, kind);

        let outcome = match self.prepare(probe.as_ref(), kind) {
            Ok(invocation) => {
                debug!(command = %invocation.command, "running check");
                probe::execute(probe.as_ref(), kind, &invocation, self.runner.as_ref())
                    .await
                    .map(|findings| self.ignore.filter(findings))
            }
            Err(error) => Err(error),
        };

        match &outcome {
            Ok(findings) => {
                if self.aggregator.commit(ticket, findings.clone()) {
                    info!(packages = findings.len(), "check completed");
                } else {
                    info!("check completed after a newer one; result not stored");
                }
            }
            Err(error) => warn!(%error, "check failed"),
        }

        CheckResult::new(ecosystem, kind, outcome)
    }

    /// Runs every requested check concurrently. Results come back in
    /// request order.
    pub async fn check_all(&self, requests: &[(Ecosystem, CheckKind)]) -> Vec<CheckResult> {
        join_all(
            requests
                .iter()
                .map(|&(ecosystem, kind)| self.check(ecosystem, kind)),
        )
        .await
    }

    /// Starts a check on its own task.
    pub fn spawn_check(self: &Arc<Self>, ecosystem: Ecosystem, kind: CheckKind) -> JoinHandle<CheckResult> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.check(ecosystem, kind).await })
    }

    pub fn query_status(&self) -> StatusReport {
        StatusReport::from_aggregator(&self.aggregator)
    }

    pub fn query(&self, ecosystem: Ecosystem, kind: CheckKind) -> Option<Arc<Snapshot>> {
        self.aggregator.query(ecosystem, kind)
    }

    pub fn reset_all(&self) {
        self.aggregator.reset();
    }

    /// Forgets every cached manifest and existence check.
    pub fn refresh_manifest_cache(&self) {
        self.locator().invalidate();
    }

    /// File-set notification: `path` was opened.
    pub fn track_file(&self, path: impl AsRef<Path>) -> ContainerId {
        self.locator().track(path)
    }

    /// File-set notification: `path` was closed.
    pub fn untrack_file(&self, path: impl AsRef<Path>) -> bool {
        self.locator().untrack(path)
    }

    /// Every known manifest.
    pub fn manifests(&self) -> Vec<ManifestEntry> {
        self.locator().all()
    }

    pub fn manifest(&self, container: ContainerId) -> Option<ManifestEntry> {
        self.locator().entry(container)
    }

    /// Ecosystems with at least one manifest, in declaration order.
    pub fn present_ecosystems(&self) -> Vec<Ecosystem> {
        let mut locator = self.locator();
        Ecosystem::ALL
            .into_iter()
            .filter(|ecosystem| !locator.locate(*ecosystem).is_empty())
            .collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.aggregator.subscribe()
    }

    /// Resolves the manifest directory and lets the probe build its
    /// command. Never spawns anything.
    fn prepare(&self, probe: &dyn Probe, kind: CheckKind) -> Result<Invocation, CheckError> {
        let ecosystem = probe.ecosystem();
        let mut locator = self.locator();

        let entry = locator
            .locate(ecosystem)
            .into_iter()
            .next()
            .ok_or_else(|| {
                CheckError::ManifestMissing(format!(
                    "no {} found under {}",
                    ecosystem.manifest_name(),
                    locator.root().display()
                ))
            })?;
        let dir = entry.dir().to_path_buf();

        let mut exists = |path: &Path| locator.exists(path);
        let mut env = ProbeEnv::new(&dir, self.tools.as_ref(), &mut exists);
        let command = probe.prepare(kind, &mut env)?;

        Ok(Invocation::new(command, dir))
    }

    fn locator(&self) -> MutexGuard<'_, ManifestLocator> {
        self.locator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
