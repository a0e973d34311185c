//! Update metadata records

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;
use crate::version::AppVersion;

/// One discoverable update
///
/// Deserialized from the metadata document by the fetch stage, or rebuilt
/// from the handoff arguments in the elevated process. Both paths yield the
/// same record for the same update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// Target version (`major.minor.build.revision`)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub version: String,

    /// Package locator: local path, `file://` URL, or http(s) URL
    #[serde(default, deserialize_with = "null_as_empty")]
    pub address: String,

    /// Package checksum (SHA-256 hex is verified, anything else is advisory)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub hash: String,

    /// Skip the confirmation prompt
    #[serde(default)]
    pub force: bool,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub changelog: String,

    /// Comma-separated rollout tags; empty applies to everyone
    #[serde(default, deserialize_with = "null_as_empty")]
    pub grayscale: String,

    /// Caller-defined metadata, passed through untouched
    #[serde(default, deserialize_with = "null_as_empty")]
    pub extension: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

impl UpdateRecord {
    /// Create a record with only a version and a package address
    pub fn new(version: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    /// Parse the JSON metadata document (an array of records)
    pub fn parse_list(text: &str) -> Result<Vec<UpdateRecord>> {
        let text = text.trim_start_matches('\u{feff}');
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(text)?)
    }

    pub fn parsed_version(&self) -> Result<AppVersion> {
        self.version.parse()
    }

    /// Whether a caller tag falls inside this record's rollout audience
    ///
    /// An empty record tag targets everyone. Otherwise the record tag is a
    /// comma-separated list and the caller tag must equal one entry.
    pub fn targets(&self, grayscale: Option<&str>) -> bool {
        if self.grayscale.trim().is_empty() {
            return true;
        }
        let Some(tag) = grayscale.map(str::trim).filter(|t| !t.is_empty()) else {
            return false;
        };
        self.grayscale.split(',').any(|entry| entry.trim() == tag)
    }
}
