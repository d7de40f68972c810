//! Core data types for dependency status checks.
//!
//! This module contains the fundamental types used throughout depwatch:
//!
//! - [`Ecosystem`] - A package-management system (pip, Go modules, npm, ...)
//! - [`CheckKind`] - Outdated listing or vulnerability scan
//! - [`PackageRecord`] - One outdated package
//! - [`VulnerabilityRecord`] - Advisories affecting one package
//! - [`Findings`] - The parsed output of one check
//! - [`CheckResult`] - What a check hands back to its caller
//!
//! # Example
//!
//! ```
//! use depwatch::model::{Findings, PackageRecord};
//!
//! let record = PackageRecord::new("requests", "2.25.0", "2.31.0");
//! let findings = Findings::outdated([record]);
//!
//! assert_eq!(findings.display_lines(), vec!["requests: 2.25.0 → 2.31.0"]);
//! ```

mod ecosystem;
mod package;
mod result;
mod vulnerability;

pub use ecosystem::*;
pub use package::*;
pub use result::*;
pub use vulnerability::*;
