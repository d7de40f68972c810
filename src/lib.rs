//! depwatch: dependency status checks across package ecosystems.
//!
//! Discovers a project's manifests (`requirements.txt`, `go.mod`,
//! `package.json`, `composer.json`, `Cargo.toml`), runs each ecosystem's own
//! tooling to find outdated and vulnerable packages, and keeps the latest
//! results queryable.
//!
//! # Example
//!
//! ```no_run
//! use depwatch::manifest::ManifestLocator;
//! use depwatch::model::Ecosystem;
//! use depwatch::platform::Toolchain;
//! use depwatch::runner::ShellRunner;
//! use depwatch::StatusEngine;
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let engine = StatusEngine::new(
//!     ManifestLocator::new("."),
//!     Arc::new(ShellRunner),
//!     Arc::new(Toolchain::system()),
//! );
//!
//! let result = engine.check_outdated(Ecosystem::Npm).await;
//! println!("{}", result.summary());
//! for line in result.display() {
//!     println!("  {}", line);
//! }
//! # }
//! ```

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod engine;
pub mod manifest;
pub mod model;
pub mod output;
pub mod platform;
pub mod probe;
pub mod runner;
pub mod view;

pub use aggregator::Aggregator;
pub use config::Config;
pub use engine::StatusEngine;
pub use model::{CheckError, CheckKind, CheckResult, Ecosystem, Findings, Severity};
