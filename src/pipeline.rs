//! Pipeline controller
//!
//! Runs fetch → decide → download → backup-and-handoff. Every stage
//! contains its own failure: the failure is reported to the stage's
//! `*_failed` notification and the run degrades to "no update applied".
//! A notification that returns `Err` ends the run with that error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, Stage, EXIT_FAILURE, EXIT_OK};
use crate::handoff::{HandoffManager, PendingUpdate};
use crate::hooks::Hooks;
use crate::integrity;
use crate::lock::NamedLock;
use crate::record::UpdateRecord;

/// Where candidates come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Fetch the metadata document at this address
    Address(String),
    /// Candidates already in hand; the fetch stage is skipped
    Records(Vec<UpdateRecord>),
}

impl Source {
    pub fn address(address: impl Into<String>) -> Self {
        Source::Address(address.into())
    }
}

impl From<Vec<UpdateRecord>> for Source {
    fn from(records: Vec<UpdateRecord>) -> Self {
        Source::Records(records)
    }
}

impl From<&str> for Source {
    fn from(address: &str) -> Self {
        Source::Address(address.to_string())
    }
}

impl From<String> for Source {
    fn from(address: String) -> Self {
        Source::Address(address)
    }
}

/// What the host process should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flow {
    /// Keep running
    #[default]
    Continue,
    /// Terminate with this exit code
    Exit(i32),
}

impl Flow {
    pub fn is_exit(&self) -> bool {
        matches!(self, Flow::Exit(_))
    }

    /// Terminate the process if the flow asks for it
    pub fn exit_if_requested(self) {
        if let Flow::Exit(code) = self {
            tracing::info!(code, "Exiting for update");
            std::process::exit(code);
        }
    }
}

/// Transient state of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub candidates: Vec<UpdateRecord>,
    pub selected: Option<UpdateRecord>,
    pub package: Option<PathBuf>,
    /// The elevated updater was launched
    pub handed_off: bool,
    pub flow: Flow,
}

/// Drives one update attempt
pub struct Pipeline {
    hooks: Hooks,
    handoff: HandoffManager,
    foreground_lock: NamedLock,
    lock_stale_after: Duration,
    verify_hash: bool,
}

impl Pipeline {
    pub fn new(
        hooks: Hooks,
        handoff: HandoffManager,
        foreground_lock: NamedLock,
        lock_stale_after: Duration,
        verify_hash: bool,
    ) -> Self {
        Self {
            hooks,
            handoff,
            foreground_lock,
            lock_stale_after,
            verify_hash,
        }
    }

    pub fn run(&self, source: Source, grayscale: Option<&str>) -> Result<RunState> {
        let mut state = RunState::default();

        state.candidates = match source {
            Source::Address(address) => self.fetch(&address)?,
            Source::Records(records) => records,
        };

        state.selected = self.decide(&state.candidates, grayscale)?;
        let Some(record) = state.selected.clone() else {
            tracing::info!("No applicable update");
            return Ok(state);
        };

        // Download and backup write into the shared work directory.
        let Some(_guard) = self.foreground_lock.try_acquire(self.lock_stale_after)? else {
            tracing::warn!(
                lock = %self.foreground_lock.path().display(),
                "Another update run is in progress, skipping"
            );
            return Ok(state);
        };

        state.package = self.download(&record)?;

        if let Some(package) = state.package.as_ref().filter(|p| p.is_file()) {
            state.flow = self.backup_and_handoff(&record, package)?;
            state.handed_off = state.flow == Flow::Exit(EXIT_OK);
        }
        Ok(state)
    }

    fn fetch(&self, address: &str) -> Result<Vec<UpdateRecord>> {
        tracing::info!(address, "Checking for updates");
        match self.hooks.fetcher.fetch(address) {
            Ok(records) => {
                tracing::info!(address, count = records.len(), "Fetch succeeded");
                self.hooks.events.fetch_succeeded(address, &records)?;
                Ok(records)
            }
            Err(e) => {
                tracing::error!(address, "Fetch failed: {}", e);
                self.hooks
                    .events
                    .fetch_failed(address, e.in_stage(Stage::Fetch))?;
                Ok(Vec::new())
            }
        }
    }

    /// First candidate the decider accepts, in list order
    fn decide(
        &self,
        candidates: &[UpdateRecord],
        grayscale: Option<&str>,
    ) -> Result<Option<UpdateRecord>> {
        for record in candidates {
            if let Err(e) = record.parsed_version() {
                tracing::warn!(version = %record.version, "Skipping candidate: {}", e);
                continue;
            }

            match self.hooks.decider.decide(record, grayscale) {
                Ok(accepted) => {
                    tracing::info!(version = %record.version, grayscale, accepted, "Decide succeeded");
                    self.hooks
                        .events
                        .decide_succeeded(record, grayscale, accepted)?;
                    if accepted {
                        return Ok(Some(record.clone()));
                    }
                }
                Err(e) => {
                    tracing::error!(version = %record.version, "Decide failed: {}", e);
                    self.hooks
                        .events
                        .decide_failed(record, grayscale, e.in_stage(Stage::Decide))?;
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }

    fn download(&self, record: &UpdateRecord) -> Result<Option<PathBuf>> {
        tracing::info!(version = %record.version, address = %record.address, "Downloading package");
        let result = self.hooks.downloader.download(record).and_then(|package| {
            if self.verify_hash && package.is_file() {
                integrity::verify_package(&package, &record.hash)?;
            }
            Ok(package)
        });

        match result {
            Ok(package) => {
                tracing::info!(package = %package.display(), "Download succeeded");
                self.hooks.events.download_succeeded(record, &package)?;
                Ok(Some(package))
            }
            Err(e) => {
                tracing::error!(version = %record.version, "Download failed: {}", e);
                self.hooks
                    .events
                    .download_failed(record, e.in_stage(Stage::Download))?;
                Ok(None)
            }
        }
    }

    /// Commit point: back up, launch the updater from the backup, exit
    fn backup_and_handoff(&self, record: &UpdateRecord, package: &Path) -> Result<Flow> {
        let layout = self.handoff.layout();
        tracing::info!(
            root = %layout.root.display(),
            backups = %layout.backups.display(),
            "Backing up install and handing off to updater"
        );

        let pending = PendingUpdate::new(package, layout.root.clone(), record.clone());
        // Launching the updater is the last fallible step.
        let result = self
            .handoff
            .backup()
            .and_then(|_| self.hooks.events.backup_succeeded(record))
            .and_then(|_| self.handoff.relaunch(&pending));

        match result {
            Ok(()) => {
                tracing::info!("Handoff succeeded");
                Ok(Flow::Exit(EXIT_OK))
            }
            Err(e) => {
                tracing::error!("Backup failed: {}", e);
                if let Err(raised) = self
                    .hooks
                    .events
                    .backup_failed(record, e.in_stage(Stage::Backup))
                {
                    tracing::error!("Backup failure notification raised: {}", raised);
                }
                Ok(Flow::Exit(EXIT_FAILURE))
            }
        }
    }
}
