//! Version handling for the upgrade tool.
//!
//! This module provides dotted-version parsing, precision-bounded comparison,
//! and the version this build of the tool upgrades databases to.

mod types;

pub use types::{Version, VersionComparison, VersionError};

use std::cmp::Ordering;

/// Precision used when resolving migration paths.
pub const DEFAULT_PRECISION: usize = 3;

/// Version of this tool; the final catalog stamps it.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compare two version strings to the given precision.
pub fn compare_versions(a: &str, b: &str, precision: usize) -> Result<Ordering, VersionError> {
    let a = Version::parse(a)?;
    let b = Version::parse(b)?;
    Ok(a.compare_to(&b, precision))
}

/// Compare the stamped database version against a requested target.
pub fn compare_stamp(stamp: &Version, target: &Version, precision: usize) -> VersionComparison {
    match stamp.compare_to(target, precision) {
        Ordering::Equal => VersionComparison::Equal,
        Ordering::Less => VersionComparison::StampBehind,
        Ordering::Greater => VersionComparison::StampAhead,
    }
}
