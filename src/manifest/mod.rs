//! Manifest discovery.
//!
//! [`ManifestLocator`] answers "which manifests does this project have for
//! ecosystem E?". It combines two sources:
//!
//! - files reported open by a file-set notifier ([`ManifestLocator::track`])
//! - a bounded walk of the project root
//!
//! The answer is cached until [`ManifestLocator::invalidate`] runs, which
//! also forgets every memoized existence check. Invalidation is coarse on
//! purpose: any change to the file set drops everything.
//!
//! # Example
//!
//! ```no_run
//! use depwatch::manifest::ManifestLocator;
//! use depwatch::model::Ecosystem;
//!
//! let mut locator = ManifestLocator::new(".");
//! for entry in locator.locate(Ecosystem::Cargo) {
//!     println!("{} ({})", entry.path.display(), entry.container);
//! }
//! ```

mod declared;

pub use declared::{declared_dependencies, DeclaredDependency};

use crate::cache::ExistenceCache;
use crate::model::Ecosystem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Default depth of the project walk (root is depth 0).
pub const DEFAULT_DISCOVERY_DEPTH: usize = 3;

/// Directories never descended into while walking the project.
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".venv",
    "venv",
    "env",
    "__pycache__",
    "node_modules",
    "vendor",
    "target",
];

/// Opaque handle for one manifest file. Stable while the file stays
/// tracked or discoverable; a file that disappears and comes back gets a
/// new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(u64);

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub container: ContainerId,
    pub ecosystem: Ecosystem,
    pub path: PathBuf,
    pub file_name: String,
}

impl ManifestEntry {
    /// The directory checks for this manifest run in.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

pub struct ManifestLocator {
    root: PathBuf,
    max_depth: usize,
    tracked: BTreeSet<PathBuf>,
    ids: HashMap<PathBuf, ContainerId>,
    next_id: u64,
    manifests: Option<HashMap<Ecosystem, Vec<ManifestEntry>>>,
    existence: ExistenceCache,
}

impl ManifestLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            max_depth: DEFAULT_DISCOVERY_DEPTH,
            tracked: BTreeSet::new(),
            ids: HashMap::new(),
            next_id: 1,
            manifests: None,
            existence: ExistenceCache::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Records `path` as open and invalidates all cached state.
    pub fn track(&mut self, path: impl AsRef<Path>) -> ContainerId {
        let path = self.absolute(path.as_ref());
        let id = self.container_for(&path);
        self.tracked.insert(path);
        self.invalidate();
        id
    }

    /// Forgets an open file. Returns whether it was tracked.
    pub fn untrack(&mut self, path: impl AsRef<Path>) -> bool {
        let path = self.absolute(path.as_ref());
        let removed = self.tracked.remove(&path);
        self.invalidate();
        removed
    }

    /// Drops the manifest cache and every memoized existence check.
    pub fn invalidate(&mut self) {
        debug!("manifest cache invalidated");
        self.manifests = None;
        self.existence.clear();
    }

    /// Memoized filesystem check; only [`invalidate`](Self::invalidate)
    /// forgets the answer.
    pub fn exists(&mut self, path: &Path) -> bool {
        self.existence.exists(path)
    }

    /// Whether a manifest listing is currently cached.
    pub fn is_cached(&self) -> bool {
        self.manifests.is_some()
    }

    /// Manifests for `ecosystem`, shallowest first.
    pub fn locate(&mut self, ecosystem: Ecosystem) -> Vec<ManifestEntry> {
        self.manifests()
            .get(&ecosystem)
            .cloned()
            .unwrap_or_default()
    }

    /// Every known manifest, grouped by ecosystem in declaration order.
    pub fn all(&mut self) -> Vec<ManifestEntry> {
        let manifests = self.manifests();
        Ecosystem::ALL
            .iter()
            .filter_map(|ecosystem| manifests.get(ecosystem))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn entry(&mut self, container: ContainerId) -> Option<ManifestEntry> {
        self.manifests()
            .values()
            .flatten()
            .find(|entry| entry.container == container)
            .cloned()
    }

    fn manifests(&mut self) -> &HashMap<Ecosystem, Vec<ManifestEntry>> {
        if self.manifests.is_none() {
            let rebuilt = self.rebuild();
            self.manifests = Some(rebuilt);
        }
        self.manifests.get_or_insert_with(HashMap::new)
    }

    fn rebuild(&mut self) -> HashMap<Ecosystem, Vec<ManifestEntry>> {
        let mut found: BTreeSet<PathBuf> = WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(Ecosystem::for_manifest)
                    .is_some()
            })
            .map(DirEntry::into_path)
            .collect();

        let tracked: Vec<PathBuf> = self.tracked.iter().cloned().collect();
        for path in tracked {
            if manifest_ecosystem(&path).is_some() && self.existence.exists(&path) {
                found.insert(path);
            }
        }

        // Ids live as long as their path is tracked or found by the walk.
        self.ids
            .retain(|path, _| found.contains(path) || self.tracked.contains(path));

        let mut manifests: HashMap<Ecosystem, Vec<ManifestEntry>> = HashMap::new();
        for path in found {
            let Some(ecosystem) = manifest_ecosystem(&path) else {
                continue;
            };
            let container = self.container_for(&path);
            manifests.entry(ecosystem).or_default().push(ManifestEntry {
                container,
                ecosystem,
                file_name: ecosystem.manifest_name().to_string(),
                path,
            });
        }

        for entries in manifests.values_mut() {
            entries.sort_by(|a, b| {
                let depth = |e: &ManifestEntry| e.path.components().count();
                depth(a).cmp(&depth(b)).then_with(|| a.path.cmp(&b.path))
            });
        }

        debug!(
            root = %self.root.display(),
            ecosystems = manifests.len(),
            "manifest cache rebuilt"
        );
        manifests
    }

    fn container_for(&mut self, path: &Path) -> ContainerId {
        if let Some(id) = self.ids.get(path) {
            return *id;
        }
        let id = ContainerId(self.next_id);
        self.next_id += 1;
        self.ids.insert(path.to_path_buf(), id);
        id
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        let joined = self.root.join(path);
        joined.canonicalize().unwrap_or(joined)
    }
}

fn manifest_ecosystem(path: &Path) -> Option<Ecosystem> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(Ecosystem::for_manifest)
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join("web").join("node_modules").join("x")).unwrap();
        fs::write(dir.path().join("web").join("package.json"), "{}").unwrap();
        fs::write(
            dir.path().join("web").join("node_modules").join("x").join("package.json"),
            "{}",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_locate_walks_root_and_skips_dependency_dirs() {
        let dir = project();
        let mut locator = ManifestLocator::new(dir.path());

        let npm = locator.locate(Ecosystem::Npm);
        assert_eq!(npm.len(), 2);
        assert_eq!(npm[0].path, locator.root().join("package.json"));
        assert_eq!(npm[1].path, locator.root().join("web").join("package.json"));
        assert!(npm.iter().all(|e| e.file_name == "package.json"));

        assert_eq!(locator.locate(Ecosystem::Cargo).len(), 1);
        assert!(locator.locate(Ecosystem::Go).is_empty());
    }

    #[test]
    fn test_cache_is_reused_until_invalidated() {
        let dir = project();
        let mut locator = ManifestLocator::new(dir.path());

        assert!(locator.locate(Ecosystem::Go).is_empty());
        assert!(locator.is_cached());

        fs::write(dir.path().join("go.mod"), "module x\n").unwrap();
        assert!(locator.locate(Ecosystem::Go).is_empty());

        locator.invalidate();
        assert!(!locator.is_cached());
        assert_eq!(locator.locate(Ecosystem::Go).len(), 1);
    }

    #[test]
    fn test_tracked_file_outside_root() {
        let dir = project();
        let other = tempfile::tempdir().unwrap();
        let go_mod = other.path().join("go.mod");
        fs::write(&go_mod, "module x\n").unwrap();

        let mut locator = ManifestLocator::new(dir.path());
        assert!(locator.locate(Ecosystem::Go).is_empty());

        let id = locator.track(&go_mod);
        assert!(!locator.is_cached());

        let go = locator.locate(Ecosystem::Go);
        assert_eq!(go.len(), 1);
        assert_eq!(go[0].container, id);
        assert_eq!(locator.entry(id).map(|e| e.ecosystem), Some(Ecosystem::Go));

        assert!(locator.untrack(&go_mod));
        assert!(locator.locate(Ecosystem::Go).is_empty());
    }

    #[test]
    fn test_untracked_files_release_their_ids() {
        let dir = project();
        let other = tempfile::tempdir().unwrap();
        let mut locator = ManifestLocator::new(dir.path());
        let walked = locator.all().len();

        for i in 0..20 {
            let sub = other.path().join(i.to_string());
            fs::create_dir(&sub).unwrap();
            fs::write(sub.join("go.mod"), "module x\n").unwrap();
            locator.track(sub.join("go.mod"));
            locator.all();
            locator.untrack(sub.join("go.mod"));
        }
        locator.all();
        assert_eq!(locator.ids.len(), walked);

        // Files that stay discoverable keep their id.
        let before = locator.locate(Ecosystem::Cargo)[0].container;
        locator.invalidate();
        assert_eq!(locator.locate(Ecosystem::Cargo)[0].container, before);
    }

    #[test]
    fn test_tracked_non_manifest_is_ignored() {
        let dir = project();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "hi").unwrap();

        let mut locator = ManifestLocator::new(dir.path());
        locator.track(&notes);

        assert_eq!(locator.all().len(), 3);
    }

    #[test]
    fn test_container_ids_are_stable() {
        let dir = project();
        let mut locator = ManifestLocator::new(dir.path());

        let before = locator.locate(Ecosystem::Cargo)[0].container;
        locator.invalidate();
        let after = locator.locate(Ecosystem::Cargo)[0].container;

        assert_eq!(before, after);
    }

    #[test]
    fn test_exists_memo_cleared_by_invalidate() {
        let dir = project();
        let modules = dir.path().join("node_modules");
        let mut locator = ManifestLocator::new(dir.path());

        assert!(!locator.exists(&modules));
        fs::create_dir(&modules).unwrap();
        assert!(!locator.exists(&modules));

        locator.invalidate();
        assert!(locator.exists(&modules));
    }

    #[test]
    fn test_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a").join("b").join("c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("go.mod"), "module deep\n").unwrap();

        let mut shallow = ManifestLocator::new(dir.path()).with_max_depth(2);
        assert!(shallow.locate(Ecosystem::Go).is_empty());

        let mut deeper = ManifestLocator::new(dir.path()).with_max_depth(4);
        assert_eq!(deeper.locate(Ecosystem::Go).len(), 1);
    }
}
