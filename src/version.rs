//! Four-part application versions
//!
//! Versions compare as `major.minor.build.revision`, each a non-negative
//! integer. Missing trailing parts count as zero, so `2.1` equals `2.1.0.0`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, UpdateError};

/// A comparable `major.minor.build.revision` version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl AppVersion {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a version string, stripping an optional `v` prefix.
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl FromStr for AppVersion {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let invalid = || UpdateError::InvalidVersion(s.to_string());
        if body.is_empty() {
            return Err(invalid());
        }

        let mut parts = [0u32; 4];
        let mut count = 0;
        for segment in body.split('.') {
            if count == parts.len() || segment.is_empty() {
                return Err(invalid());
            }
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            parts[count] = segment.parse().map_err(|_| invalid())?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}
