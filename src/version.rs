//! Version allocation for metric models
//!
//! Versions are `"<major>.<minor>"` pairs where the minor component cycles
//! through 0..=9 before the major component is bumped.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version assigned to the first registration of a metric model
pub const INITIAL_VERSION: &str = "1.0";

/// Largest minor component before rolling over to the next major
pub const MAX_MINOR: u32 = 9;

/// Errors raised for version strings the allocator cannot continue from
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("malformed version string '{0}': expected '<major>.<minor>'")]
    Malformed(String),

    #[error("invalid version state '{0}': major must be >= 1 and minor must be <= 9")]
    InvalidState(String),
}

/// A parsed `"<major>.<minor>"` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    /// The first version of every metric model
    pub const fn initial() -> Self {
        Self { major: 1, minor: 0 }
    }

    /// The version following this one.
    ///
    /// Fails when the major component cannot be incremented.
    pub fn next(self) -> Result<Self, VersionError> {
        if self.minor < MAX_MINOR {
            return Ok(Self {
                major: self.major,
                minor: self.minor + 1,
            });
        }

        let major = self
            .major
            .checked_add(1)
            .ok_or_else(|| VersionError::InvalidState(self.to_string()))?;
        Ok(Self { major, minor: 0 })
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionError::Malformed(s.to_string());

        let (major, minor) = s.split_once('.').ok_or_else(malformed)?;
        let major = parse_component(major).ok_or_else(malformed)?;
        let minor = parse_component(minor).ok_or_else(malformed)?;

        if major == 0 || minor > MAX_MINOR {
            return Err(VersionError::InvalidState(s.to_string()));
        }

        Ok(Self { major, minor })
    }
}

/// Parse a version component made only of ASCII digits
fn parse_component(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

/// Compute the version string that follows `previous`.
///
/// `None` means the model has never been registered and yields `"1.0"`.
pub fn next_version(previous: Option<&str>) -> Result<String, VersionError> {
    match previous {
        None => Ok(INITIAL_VERSION.to_string()),
        Some(prev) => Ok(prev.parse::<Version>()?.next()?.to_string()),
    }
}
