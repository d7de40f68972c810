//! Memoized filesystem existence checks.
//!
//! A refresh cycle asks the same questions over and over ("is there a
//! `node_modules` next to this `package.json`?", "does `.venv/bin/python`
//! exist?"). [`ExistenceCache`] answers each path once and keeps the answer
//! until [`ExistenceCache::clear`] is called, which the manifest locator
//! does on every file-set change.
//!
//! # Example
//!
//! ```
//! use depwatch::cache::ExistenceCache;
//! use std::path::Path;
//!
//! let mut cache = ExistenceCache::new();
//!
//! let first = cache.exists(Path::new("/definitely/not/here"));
//! assert!(!first);
//! assert_eq!(cache.len(), 1);
//!
//! cache.clear();
//! assert!(cache.is_empty());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Absolute path to "does it exist" answers.
///
/// There is no expiry: an answer stays valid until the whole cache is
/// cleared.
#[derive(Debug, Default)]
pub struct ExistenceCache {
    entries: HashMap<PathBuf, bool>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether `path` exists, touching the filesystem only the
    /// first time a path is asked about.
    pub fn exists(&mut self, path: &Path) -> bool {
        if let Some(known) = self.entries.get(path) {
            return *known;
        }

        let found = path.exists();
        self.entries.insert(path.to_path_buf(), found);
        found
    }

    /// Returns the memoized answer for `path` without touching the
    /// filesystem.
    pub fn cached(&self, path: &Path) -> Option<bool> {
        self.entries.get(path).copied()
    }

    /// Forgets every answer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
