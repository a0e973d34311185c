//! Hook registry: replaceable stage operations and notifications
//!
//! Each pipeline stage calls one operation trait and then exactly one of
//! the matching `*_succeeded` / `*_failed` notifications on
//! [`UpdateEvents`]. Operations and notifications are replaced
//! independently: swap an operation in [`Hooks`], or override a single
//! notification method on your own `UpdateEvents` implementation.
//!
//! Closures implement the operation traits directly:
//!
//! ```rust
//! use a3s_autoupdate::{Decider, Result, UpdateRecord};
//!
//! let always = |_: &UpdateRecord, _: Option<&str>| -> Result<bool> { Ok(true) };
//! assert!(always.decide(&UpdateRecord::new("2.0", "pkg.tar.gz"), None).unwrap());
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::Archiver;
use crate::error::{Result, UpdateError};
use crate::record::UpdateRecord;
use crate::transport::Transport;

/// Produces the candidate list for an address
pub trait Fetcher: Send + Sync {
    fn fetch(&self, address: &str) -> Result<Vec<UpdateRecord>>;
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> Result<Vec<UpdateRecord>> + Send + Sync,
{
    fn fetch(&self, address: &str) -> Result<Vec<UpdateRecord>> {
        self(address)
    }
}

/// Decides whether a candidate should be applied
pub trait Decider: Send + Sync {
    fn decide(&self, record: &UpdateRecord, grayscale: Option<&str>) -> Result<bool>;
}

impl<F> Decider for F
where
    F: Fn(&UpdateRecord, Option<&str>) -> Result<bool> + Send + Sync,
{
    fn decide(&self, record: &UpdateRecord, grayscale: Option<&str>) -> Result<bool> {
        self(record, grayscale)
    }
}

/// Fetches a selected candidate's package to a local file
pub trait Downloader: Send + Sync {
    fn download(&self, record: &UpdateRecord) -> Result<PathBuf>;
}

impl<F> Downloader for F
where
    F: Fn(&UpdateRecord) -> Result<PathBuf> + Send + Sync,
{
    fn download(&self, record: &UpdateRecord) -> Result<PathBuf> {
        self(record)
    }
}

/// Applies a package over the install root
///
/// Returns the entry executable to launch afterwards.
pub trait PackageResolver: Send + Sync {
    fn resolve(&self, package: &Path, root: &Path, record: &UpdateRecord) -> Result<PathBuf>;
}

impl<F> PackageResolver for F
where
    F: Fn(&Path, &Path, &UpdateRecord) -> Result<PathBuf> + Send + Sync,
{
    fn resolve(&self, package: &Path, root: &Path, record: &UpdateRecord) -> Result<PathBuf> {
        self(package, root, record)
    }
}

/// Stage outcome notifications
///
/// Failure notifications receive the stage-attributed error by value.
/// Returning `Err` re-raises it to the caller of the pipeline; the default
/// does exactly that for every stage except resolve, whose failure is
/// followed by a rollback.
pub trait UpdateEvents: Send + Sync {
    fn fetch_succeeded(&self, address: &str, records: &[UpdateRecord]) -> Result<()> {
        tracing::info!(address, count = records.len(), "Update metadata fetched");
        Ok(())
    }

    fn fetch_failed(&self, _address: &str, error: UpdateError) -> Result<()> {
        Err(error)
    }

    fn decide_succeeded(
        &self,
        record: &UpdateRecord,
        _grayscale: Option<&str>,
        accepted: bool,
    ) -> Result<()> {
        tracing::info!(version = %record.version, accepted, "Candidate evaluated");
        Ok(())
    }

    fn decide_failed(
        &self,
        _record: &UpdateRecord,
        _grayscale: Option<&str>,
        error: UpdateError,
    ) -> Result<()> {
        Err(error)
    }

    fn download_succeeded(&self, record: &UpdateRecord, package: &Path) -> Result<()> {
        tracing::info!(version = %record.version, package = %package.display(), "Package downloaded");
        Ok(())
    }

    fn download_failed(&self, _record: &UpdateRecord, error: UpdateError) -> Result<()> {
        Err(error)
    }

    fn resolve_succeeded(
        &self,
        _package: &Path,
        root: &Path,
        record: &UpdateRecord,
        entry: &Path,
    ) -> Result<()> {
        tracing::info!(
            version = %record.version,
            root = %root.display(),
            entry = %entry.display(),
            "Update applied"
        );
        Ok(())
    }

    fn resolve_failed(
        &self,
        _package: &Path,
        _root: &Path,
        _record: &UpdateRecord,
        _error: UpdateError,
    ) -> Result<()> {
        Ok(())
    }

    fn backup_succeeded(&self, record: &UpdateRecord) -> Result<()> {
        tracing::info!(version = %record.version, "Install backed up, updater launched");
        Ok(())
    }

    fn backup_failed(&self, _record: &UpdateRecord, error: UpdateError) -> Result<()> {
        Err(error)
    }

    fn rollback_succeeded(&self, record: &UpdateRecord) -> Result<()> {
        tracing::info!(version = %record.version, "Install restored from backup");
        Ok(())
    }

    fn rollback_failed(&self, _record: &UpdateRecord, error: UpdateError) -> Result<()> {
        Err(error)
    }
}

/// Notifications with the default behavior
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvents;

impl UpdateEvents for DefaultEvents {}

/// Stage operations and notifications for one updater
#[derive(Clone)]
pub struct Hooks {
    pub fetcher: Arc<dyn Fetcher>,
    pub decider: Arc<dyn Decider>,
    pub downloader: Arc<dyn Downloader>,
    pub resolver: Arc<dyn PackageResolver>,
    pub events: Arc<dyn UpdateEvents>,
}

// ============================================================================
// Default operations
// ============================================================================

/// Reads the JSON metadata document through a transport
pub struct DefaultFetcher {
    transport: Arc<dyn Transport>,
}

impl DefaultFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, address: &str) -> Result<Vec<UpdateRecord>> {
        let bytes = self.transport.get(address)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            UpdateError::Config(format!("metadata at {address} is not UTF-8: {e}"))
        })?;
        UpdateRecord::parse_list(&text)
    }
}

/// Copies the package into the downloads directory under a fresh name
pub struct DefaultDownloader {
    transport: Arc<dyn Transport>,
    dir: PathBuf,
}

impl DefaultDownloader {
    pub fn new(transport: Arc<dyn Transport>, dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            dir: dir.into(),
        }
    }
}

impl Downloader for DefaultDownloader {
    fn download(&self, record: &UpdateRecord) -> Result<PathBuf> {
        if record.address.trim().is_empty() {
            return Err(UpdateError::UnsupportedAddress(format!(
                "record {} has no package address",
                record.version
            )));
        }
        std::fs::create_dir_all(&self.dir)?;
        let dest = self.dir.join(format!("{}.tar.gz", uuid::Uuid::new_v4()));

        match self.transport.copy_to(&record.address, &dest) {
            Ok(bytes) => {
                tracing::debug!(dest = %dest.display(), bytes, "Package stored");
                Ok(dest)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&dest);
                Err(e)
            }
        }
    }
}

/// Extracts the package over the root and returns `<root>/<entry>`
pub struct DefaultResolver {
    archiver: Arc<dyn Archiver>,
    entry: String,
}

impl DefaultResolver {
    pub fn new(archiver: Arc<dyn Archiver>, entry: impl Into<String>) -> Self {
        Self {
            archiver,
            entry: entry.into(),
        }
    }
}

impl PackageResolver for DefaultResolver {
    fn resolve(&self, package: &Path, root: &Path, _record: &UpdateRecord) -> Result<PathBuf> {
        if !package.is_file() {
            return Err(UpdateError::Archive(format!(
                "package {} does not exist",
                package.display()
            )));
        }
        self.archiver.extract(package, root)?;
        Ok(root.join(&self.entry))
    }
}
