//! Elevated resolver
//!
//! Entry point of the updater process launched from the backup mirror.
//! Single pass: acquire the application lock, apply the package over the
//! install root and relaunch it. If applying fails, restore the root from
//! the backup mirror and relaunch the original application. A failed
//! restore is terminal.

use std::sync::Arc;
use std::time::Duration;

use crate::archive::Archiver;
use crate::config::Layout;
use crate::error::{Result, Stage, UpdateError, EXIT_FAILURE, EXIT_OK};
use crate::handoff::{Launcher, PendingUpdate};
use crate::hooks::Hooks;
use crate::lock::NamedLock;
use crate::pipeline::Flow;

pub struct Resolver {
    hooks: Hooks,
    layout: Layout,
    archiver: Arc<dyn Archiver>,
    launcher: Arc<dyn Launcher>,
    lock: NamedLock,
    lock_stale_after: Duration,
    elevate: bool,
}

impl Resolver {
    pub fn new(
        hooks: Hooks,
        layout: Layout,
        archiver: Arc<dyn Archiver>,
        launcher: Arc<dyn Launcher>,
        lock: NamedLock,
        lock_stale_after: Duration,
        elevate: bool,
    ) -> Self {
        Self {
            hooks,
            layout,
            archiver,
            launcher,
            lock,
            lock_stale_after,
            elevate,
        }
    }

    pub fn run(&self, pending: &PendingUpdate) -> Result<Flow> {
        let Some(_guard) = self.lock.try_acquire(self.lock_stale_after)? else {
            tracing::warn!(
                lock = %self.lock.path().display(),
                "Another updater instance is already running"
            );
            return Ok(Flow::Exit(EXIT_OK));
        };

        match self.extract(pending) {
            Ok(()) => Ok(Flow::Exit(EXIT_OK)),
            Err(e) => {
                tracing::error!(version = %pending.record.version, "Resolve failed: {}", e);
                if let Err(raised) = self.hooks.events.resolve_failed(
                    &pending.package,
                    &pending.root,
                    &pending.record,
                    e.in_stage(Stage::Resolve),
                ) {
                    tracing::error!("Resolve failure notification raised: {}", raised);
                }
                Ok(self.rollback(pending))
            }
        }
    }

    fn extract(&self, pending: &PendingUpdate) -> Result<()> {
        tracing::info!(
            package = %pending.package.display(),
            root = %pending.root.display(),
            version = %pending.record.version,
            "Applying update"
        );
        let entry = self
            .hooks
            .resolver
            .resolve(&pending.package, &pending.root, &pending.record)?;
        self.hooks
            .events
            .resolve_succeeded(&pending.package, &pending.root, &pending.record, &entry)?;

        // Last fallible step: a running new version is never rolled back.
        self.launcher.launch(&entry, &[], self.elevate)?;
        tracing::info!(entry = %entry.display(), "Update applied, application relaunched");
        Ok(())
    }

    fn rollback(&self, pending: &PendingUpdate) -> Flow {
        tracing::info!(backups = %self.layout.backups.display(), "Rolling back");
        let result = self.restore().and_then(|_| {
            self.launcher
                .launch(&self.layout.root_entry(), &[], self.elevate)
        });

        match result {
            Ok(()) => {
                if let Err(raised) = self.hooks.events.rollback_succeeded(&pending.record) {
                    tracing::error!("Rollback success notification raised: {}", raised);
                }
                tracing::info!("Rollback succeeded, original application relaunched");
                Flow::Exit(EXIT_OK)
            }
            Err(e) => {
                tracing::error!("Rollback failed: {}", e);
                if let Err(raised) = self
                    .hooks
                    .events
                    .rollback_failed(&pending.record, e.in_stage(Stage::Rollback))
                {
                    tracing::error!("Rollback failure notification raised: {}", raised);
                }
                Flow::Exit(EXIT_FAILURE)
            }
        }
    }

    /// Make the root match the backup mirror again
    ///
    /// Everything in the root except the work directory is removed first,
    /// so files added by a partial extract do not survive.
    fn restore(&self) -> Result<()> {
        let layout = &self.layout;
        if !layout.backup_entry().is_file() {
            return Err(UpdateError::Archive(format!(
                "backup at {} has no entry executable, refusing to restore",
                layout.backups.display()
            )));
        }

        let scratch = layout
            .work
            .join(format!("rollback-{}.tar.gz", uuid::Uuid::new_v4()));
        let result = self
            .archiver
            .compress(&layout.backups, &scratch, &[scratch.clone()])
            .and_then(|_| clear_root(layout))
            .and_then(|_| self.archiver.extract(&scratch, &layout.root));

        if scratch.exists() {
            if let Err(e) = std::fs::remove_file(&scratch) {
                tracing::warn!(path = %scratch.display(), "Failed to remove rollback archive: {}", e);
            }
        }
        result
    }
}

fn clear_root(layout: &Layout) -> Result<()> {
    for entry in std::fs::read_dir(&layout.root)? {
        let entry = entry?;
        if Some(entry.file_name().as_os_str()) == layout.work.file_name() {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
