//! Error types for a3s-autoupdate

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Process exit code for success, or for a run that intentionally did nothing
pub const EXIT_OK: i32 = 0;

/// Process exit code for a failed backup or an unrecoverable rollback
pub const EXIT_FAILURE: i32 = 1;

/// Pipeline stage a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Fetching update metadata
    Fetch,
    /// Evaluating candidates
    Decide,
    /// Downloading the package
    Download,
    /// Backing up the install tree and spawning the elevated updater
    Backup,
    /// Extracting the package over the install root
    Resolve,
    /// Restoring the install root from the backup
    Rollback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Decide => "decide",
            Stage::Download => "download",
            Stage::Backup => "backup",
            Stage::Resolve => "resolve",
            Stage::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while updating
#[derive(Debug, Error)]
pub enum UpdateError {
    /// A stage failed; the cause is kept as the source
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<UpdateError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Version string is not 1-4 dot-separated integers
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    /// Address is neither a local path nor an http(s) URL
    #[error("Unsupported address: {0}")]
    UnsupportedAddress(String),

    /// Downloaded package does not match the advertised hash
    #[error("Hash mismatch for {}: expected {expected}, got {actual}", path.display())]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Confirmation prompt could not be shown
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Spawning a process failed
    #[error("Process error for '{}': {msg}", program.display())]
    Process { program: PathBuf, msg: String },

    /// Pending-update arguments are malformed or from a newer schema
    #[error("Handoff error: {0}")]
    Handoff(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Lock error: {0}")]
    Lock(String),

    /// Error raised by a caller-supplied hook
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UpdateError {
    /// Attribute this error to a pipeline stage
    ///
    /// Errors already attributed to a stage are returned unchanged.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            UpdateError::Stage { .. } => self,
            other => UpdateError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error was attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            UpdateError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias for update operations
pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = UpdateError::Config("bad".into()).in_stage(Stage::Fetch);
        assert_eq!(err.stage(), Some(Stage::Fetch));

        let err = err.in_stage(Stage::Download);
        assert_eq!(err.stage(), Some(Stage::Fetch));
    }

    #[test]
    fn test_stage_display() {
        let err = UpdateError::InvalidVersion("x.y".into()).in_stage(Stage::Decide);
        assert_eq!(err.to_string(), "decide stage failed: Invalid version 'x.y'");
    }

    #[test]
    fn test_unattributed_error_has_no_stage() {
        assert!(UpdateError::Lock("held".into()).stage().is_none());
    }
}
