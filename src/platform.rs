//! Toolchain discovery and platform-specific paths.
//!
//! Probes never spawn a tool blindly when the ecosystem requires it to be
//! present: they ask a [`ToolLocator`] first and report a missing tool
//! without running anything.
//!
//! All lookups return `Option<PathBuf>` - returning `None` if the tool or
//! file can't be found.

use crate::model::Platform;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolves executable names to paths.
pub trait ToolLocator: Send + Sync {
    /// Returns the path of `program`, or `None` if it can't be run.
    fn find(&self, program: &str) -> Option<PathBuf>;

    fn has(&self, program: &str) -> bool {
        self.find(program).is_some()
    }
}

/// Looks tools up in configured overrides first, then on `PATH`.
///
/// # Example
///
/// ```
/// use depwatch::platform::{ToolLocator, Toolchain};
///
/// let tools = Toolchain::isolated().with_override("cargo", "/opt/rust/bin/cargo");
///
/// assert!(tools.has("cargo"));
/// assert!(!tools.has("cargo-outdated"));
/// ```
#[derive(Debug, Clone)]
pub struct Toolchain {
    overrides: HashMap<String, PathBuf>,
    search_path: bool,
}

impl Toolchain {
    /// Searches `PATH` with no overrides.
    pub fn system() -> Self {
        Self {
            overrides: HashMap::new(),
            search_path: true,
        }
    }

    /// Only knows about explicit overrides; `PATH` is never consulted.
    pub fn isolated() -> Self {
        Self {
            overrides: HashMap::new(),
            search_path: false,
        }
    }

    pub fn with_override(mut self, program: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(program.into(), path.into());
        self
    }

}

impl Default for Toolchain {
    fn default() -> Self {
        Self::system()
    }
}

impl ToolLocator for Toolchain {
    fn find(&self, program: &str) -> Option<PathBuf> {
        if let Some(path) = self.overrides.get(program) {
            return Some(path.clone());
        }

        if !self.search_path {
            return None;
        }

        which::which(program).ok()
    }
}

/// Virtualenv directory names probed next to a `requirements.txt`, in
/// priority order.
pub const VENV_DIRS: [&str; 3] = [".venv", "venv", "env"];

/// Returns the interpreter of the first local virtualenv under `dir`.
///
/// `exists` is the caller's (usually memoized) existence check.
pub fn venv_interpreter(dir: &Path, exists: &mut dyn FnMut(&Path) -> bool) -> Option<PathBuf> {
    let relative: &[&str] = match Platform::current() {
        Platform::Windows => &["Scripts", "python.exe"],
        Platform::Linux | Platform::MacOS => &["bin", "python"],
    };

    VENV_DIRS.iter().find_map(|venv| {
        let candidate = relative
            .iter()
            .fold(dir.join(venv), |path, part| path.join(part));
        if exists(&candidate) {
            Some(candidate)
        } else {
            None
        }
    })
}

/// Quotes `arg` for the platform shell when it holds anything beyond
/// plain path characters.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/\\._-+:=@".contains(c));
    if plain {
        return Cow::Borrowed(arg);
    }

    match Platform::current() {
        Platform::Windows => Cow::Owned(format!("\"{}\"", arg.replace('"', "\"\""))),
        Platform::Linux | Platform::MacOS => {
            Cow::Owned(format!("'{}'", arg.replace('\'', "'\\''")))
        }
    }
}

/// Returns the directory holding depwatch's configuration file.
///
/// Platform-specific locations:
/// - Linux: `~/.config/depwatch/`
/// - macOS: `~/Library/Application Support/depwatch/`
/// - Windows: `%APPDATA%\depwatch\`
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("depwatch")
}
