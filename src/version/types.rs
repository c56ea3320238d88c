//! Version types for dotted catalog versions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Error types for version operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {0:?}")]
    InvalidFormat(String),
}

/// A dotted version such as `2.7` or `2.6.2.0`.
///
/// The original string is kept for display so that stamps round-trip exactly
/// as written by the catalog that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    segments: Vec<u64>,
    raw: String,
}

impl Version {
    /// Parse a dotted version string. Every segment must be a non-negative
    /// integer.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionError::InvalidFormat(s.to_string()));
        }

        let segments = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| VersionError::InvalidFormat(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            segments,
            raw: trimmed.to_string(),
        })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Compare two versions on their first `precision` segments, padding
    /// missing trailing segments with zero. A precision of zero compares
    /// every segment present in either version.
    pub fn compare_to(&self, other: &Version, precision: usize) -> Ordering {
        let width = if precision == 0 {
            self.segments.len().max(other.segments.len())
        } else {
            precision
        };

        for i in 0..width {
            let left = self.segments.get(i).copied().unwrap_or(0);
            let right = other.segments.get(i).copied().unwrap_or(0);
            match left.cmp(&right) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }

        Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.raw
    }
}

/// Result of comparing the stamped database version against a requested
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComparison {
    /// Database is already at the target.
    Equal,
    /// Database is older than the target (can upgrade).
    StampBehind,
    /// Database is newer than the target (downgrade request).
    StampAhead,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_version_parse_valid() {
        let version = v("2.6.2");
        assert_eq!(version.segments(), &[2, 6, 2]);
        assert_eq!(version.to_string(), "2.6.2");
    }

    #[test]
    fn test_version_parse_short_and_long() {
        assert_eq!(v("3").segments(), &[3]);
        assert_eq!(v("2.7.0.0").segments(), &[2, 7, 0, 0]);
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("1.2.x").is_err());
        assert!(Version::parse("a.b.c").is_err());
        assert!(Version::parse("1.-2").is_err());
    }

    #[test]
    fn test_version_padding() {
        assert_eq!(v("2.0").compare_to(&v("2.0.0"), 3), Ordering::Equal);
        assert_eq!(v("2").compare_to(&v("2.0.1"), 3), Ordering::Less);
    }

    #[test]
    fn test_version_precision_truncates() {
        assert_eq!(v("2.7.0.1").compare_to(&v("2.7.0.0"), 3), Ordering::Equal);
        assert_eq!(v("2.7.0.1").compare_to(&v("2.7.0.0"), 4), Ordering::Greater);
        assert_eq!(v("2.7.0.1").compare_to(&v("2.7.0"), 0), Ordering::Greater);
    }

    #[test]
    fn test_version_numeric_not_lexical() {
        assert_eq!(v("2.10.0").compare_to(&v("2.9.0"), 3), Ordering::Greater);
    }

    #[test]
    fn test_version_serde_roundtrip_keeps_raw() {
        let json = serde_json::to_string(&v("2.6")).unwrap();
        assert_eq!(json, "\"2.6\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "2.6");
        assert!(serde_json::from_str::<Version>("\"nope\"").is_err());
    }
}
