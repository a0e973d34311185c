//! Updater configuration and on-disk layout

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdateError};

/// Suffix appended to the application identity to name the updater lock
pub const LOCK_SUFFIX: &str = "AutoUpdater";

/// How the default decider treats a record's grayscale tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrayscalePolicy {
    /// The tag only changes the prompt wording; every caller is eligible
    #[default]
    Ignore,
    /// Callers outside the record's audience are never offered the update
    Restrict,
}

/// Settings for the update engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Application identity; scopes the cross-process lock
    pub app_id: String,

    /// Version of the running application
    pub current_version: String,

    /// Install root (default: directory of the running executable)
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Entry executable file name (default: the running executable's name)
    #[serde(default)]
    pub entry_name: Option<String>,

    /// Update working directory, relative to the install root
    #[serde(default = "default_work_dir_name")]
    pub work_dir_name: String,

    /// Write rolling logs under `<work>/Logs`
    #[serde(default = "default_true")]
    pub log_enabled: bool,

    /// Request elevation when launching the updater and the relaunched app
    #[serde(default = "default_true")]
    pub elevate: bool,

    /// Verify SHA-256 package hashes when the record carries one
    #[serde(default = "default_true")]
    pub verify_hash: bool,

    #[serde(default)]
    pub grayscale_policy: GrayscalePolicy,

    /// Directory for lock files (default: system temp dir)
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,

    /// Age after which a lock file is considered abandoned
    #[serde(default = "default_lock_stale_after_secs")]
    pub lock_stale_after_secs: u64,

    /// HTTP timeout; unset waits indefinitely
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

fn default_work_dir_name() -> String {
    "AutoUpdater".to_string()
}

fn default_true() -> bool {
    true
}

fn default_lock_stale_after_secs() -> u64 {
    600
}

impl UpdaterConfig {
    pub fn new(app_id: impl Into<String>, current_version: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            current_version: current_version.into(),
            root_dir: None,
            entry_name: None,
            work_dir_name: default_work_dir_name(),
            log_enabled: true,
            elevate: true,
            verify_hash: true,
            grayscale_policy: GrayscalePolicy::default(),
            lock_dir: None,
            lock_stale_after_secs: default_lock_stale_after_secs(),
            http_timeout_secs: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpdateError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: UpdaterConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(UpdateError::Config("app_id must not be empty".into()));
        }
        crate::version::AppVersion::parse(&self.current_version).map_err(|_| {
            UpdateError::Config(format!(
                "current_version '{}' is not a valid version",
                self.current_version
            ))
        })?;
        let work = Path::new(&self.work_dir_name);
        if self.work_dir_name.trim().is_empty()
            || work.is_absolute()
            || work.components().count() != 1
        {
            return Err(UpdateError::Config(format!(
                "work_dir_name '{}' must be a single relative path component",
                self.work_dir_name
            )));
        }
        Ok(())
    }

    /// Name of the lock serializing elevated updaters of this application
    pub fn lock_name(&self) -> String {
        format!("{}.{}", self.app_id, LOCK_SUFFIX)
    }

    /// Name of the lock serializing foreground update runs
    pub fn foreground_lock_name(&self) -> String {
        format!("{}.foreground", self.lock_name())
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_after_secs)
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    /// Resolve the on-disk layout for the configured (or detected) root
    pub fn layout(&self) -> Result<Layout> {
        let root = match &self.root_dir {
            Some(root) => root.clone(),
            None => current_exe()?
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| UpdateError::Config("executable has no parent directory".into()))?,
        };
        self.layout_for(&root)
    }

    /// Layout for an explicit root, e.g. the root named in handoff arguments
    pub fn layout_for(&self, root: &Path) -> Result<Layout> {
        Ok(Layout::new(root, &self.entry_name()?, &self.work_dir_name))
    }

    pub fn entry_name(&self) -> Result<String> {
        if let Some(name) = &self.entry_name {
            return Ok(name.clone());
        }
        current_exe()?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UpdateError::Config("executable has no file name".into()))
    }
}

fn current_exe() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| {
        UpdateError::Config(format!("failed to determine current executable path: {e}"))
    })?;
    Ok(exe.canonicalize().unwrap_or(exe))
}

/// Resolved paths of an install and its update working directory
///
/// ```text
/// <root>/
///   <entry>
///   AutoUpdater/
///     Logs/
///     Backups/      # runnable mirror of <root>
///     Downloads/    # fetched packages
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub entry: String,
    pub work: PathBuf,
    pub logs: PathBuf,
    pub backups: PathBuf,
    pub downloads: PathBuf,
}

impl Layout {
    pub fn new(root: &Path, entry: &str, work_dir_name: &str) -> Self {
        let work = root.join(work_dir_name);
        Self {
            root: root.to_path_buf(),
            entry: entry.to_string(),
            logs: work.join("Logs"),
            backups: work.join("Backups"),
            downloads: work.join("Downloads"),
            work,
        }
    }

    /// Entry executable inside the install root
    pub fn root_entry(&self) -> PathBuf {
        self.root.join(&self.entry)
    }

    /// Entry executable inside the backup mirror
    pub fn backup_entry(&self) -> PathBuf {
        self.backups.join(&self.entry)
    }

    /// Delete and rebuild the working directory
    ///
    /// A failed delete (e.g. a file still in use by the exiting updater) is
    /// logged; the subdirectories are still ensured.
    pub fn recreate(&self) -> Result<()> {
        if self.work.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.work) {
                tracing::warn!(path = %self.work.display(), "Failed to clear work directory: {}", e);
            }
        }
        self.ensure()
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.logs)?;
        std::fs::create_dir_all(&self.backups)?;
        std::fs::create_dir_all(&self.downloads)?;
        Ok(())
    }
}
