//! Elevated resolver integration tests
//!
//! Simulate the updater process: back up a temporary install, then call
//! `AutoUpdater::initialize` with the handoff arguments the host would pass.

mod common;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use a3s_autoupdate::{
    AutoUpdater, Flow, HandoffManager, NamedLock, PendingUpdate, Result, Stage, TarGzArchiver,
    UpdateError, UpdateEvents, UpdateRecord, EXIT_FAILURE, EXIT_OK,
};
use common::{snapshot, Install, RecordingLauncher, ENTRY};

const WORK: &str = "AutoUpdater";

#[derive(Debug, Clone, Default)]
struct RecordingEvents {
    seen: Arc<Mutex<Vec<String>>>,
    reject_success: bool,
}

impl RecordingEvents {
    fn rejecting_success() -> Self {
        Self {
            reject_success: true,
            ..Self::default()
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    fn note(&self, what: &str) {
        self.seen.lock().unwrap().push(what.to_string());
    }
}

impl UpdateEvents for RecordingEvents {
    fn resolve_succeeded(&self, _: &Path, _: &Path, _: &UpdateRecord, _: &Path) -> Result<()> {
        self.note("resolve_succeeded");
        if self.reject_success {
            return Err(UpdateError::Config("telemetry endpoint down".into()));
        }
        Ok(())
    }

    fn resolve_failed(
        &self,
        _: &Path,
        _: &Path,
        _: &UpdateRecord,
        error: UpdateError,
    ) -> Result<()> {
        assert_eq!(error.stage(), Some(Stage::Resolve));
        self.note("resolve_failed");
        Ok(())
    }

    fn rollback_succeeded(&self, _: &UpdateRecord) -> Result<()> {
        self.note("rollback_succeeded");
        Ok(())
    }

    fn rollback_failed(&self, _: &UpdateRecord, error: UpdateError) -> Result<()> {
        assert_eq!(error.stage(), Some(Stage::Rollback));
        self.note("rollback_failed");
        Err(error)
    }
}

/// Back up the install and build the updater-process command line
fn handoff_args(install: &Install, package: &Path) -> Vec<OsString> {
    let config = install.config("1.0");
    let layout = config.layout_for(&install.root).unwrap();
    let manager = HandoffManager::new(
        layout.clone(),
        Arc::new(TarGzArchiver),
        Arc::new(RecordingLauncher::default()),
        false,
    );
    manager.backup().unwrap();

    let mut record = UpdateRecord::new("2.0.0.0", package.to_string_lossy());
    record.force = true;
    let pending = PendingUpdate::new(package, &install.root, record);

    let mut args = vec![layout.backup_entry().into_os_string()];
    args.extend(pending.to_args());
    args
}

#[test]
fn test_successful_update_relaunches_root_entry() {
    let install = Install::new();
    let package = install.package();
    let args = handoff_args(&install, &package);

    let launcher = RecordingLauncher::default();
    let events = RecordingEvents::default();
    let updater = AutoUpdater::builder(install.config("1.0"))
        .launcher(launcher.clone())
        .events(events.clone())
        .build()
        .unwrap();

    assert_eq!(updater.initialize(args).unwrap(), Flow::Exit(EXIT_OK));

    assert_eq!(std::fs::read(install.root.join(ENTRY)).unwrap(), b"app v2");
    assert!(install.root.join("whatsnew.txt").is_file());
    assert!(install.root.join("data").join("settings.ini").is_file());

    let launches = launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].program, install.root.join(ENTRY));
    assert!(launches[0].args.is_empty());
    assert_eq!(events.seen(), vec!["resolve_succeeded"]);

    // The backups survive the updater run.
    assert!(updater.layout().backup_entry().is_file());
}

#[test]
fn test_failed_resolve_rolls_back_byte_identical() {
    let install = Install::new();
    let package = install.package();
    let args = handoff_args(&install, &package);
    let before = snapshot(&install.root, WORK);

    // Writes part of the update, then fails.
    let partial = |_: &Path, root: &Path, _: &UpdateRecord| -> Result<PathBuf> {
        std::fs::write(root.join(ENTRY), b"half-written")?;
        std::fs::write(root.join("stray.dll"), b"from the new version")?;
        std::fs::remove_file(root.join("readme.txt"))?;
        Err(UpdateError::Archive("package truncated".into()))
    };

    let launcher = RecordingLauncher::default();
    let events = RecordingEvents::default();
    let updater = AutoUpdater::builder(install.config("1.0"))
        .launcher(launcher.clone())
        .events(events.clone())
        .resolver(partial)
        .build()
        .unwrap();

    assert_eq!(updater.initialize(args).unwrap(), Flow::Exit(EXIT_OK));
    assert_eq!(snapshot(&install.root, WORK), before);
    assert_eq!(events.seen(), vec!["resolve_failed", "rollback_succeeded"]);

    let launches = launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].program, install.root.join(ENTRY));

    // No rollback scratch archive is left in the work directory.
    let work = install.root.join(WORK);
    let leftovers: Vec<_> = std::fs::read_dir(&work)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n.to_string_lossy().starts_with("rollback-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_relaunch_failure_triggers_rollback() {
    let install = Install::new();
    let package = install.package();
    let args = handoff_args(&install, &package);
    let before = snapshot(&install.root, WORK);

    let launcher = RecordingLauncher::failing(1);
    let updater = AutoUpdater::builder(install.config("1.0"))
        .launcher(launcher.clone())
        .build()
        .unwrap();

    assert_eq!(updater.initialize(args).unwrap(), Flow::Exit(EXIT_OK));
    assert_eq!(snapshot(&install.root, WORK), before);
    assert_eq!(launcher.launches().len(), 1);
}

#[test]
fn test_rejected_success_notification_rolls_back_before_launch() {
    let install = Install::new();
    let package = install.package();
    let args = handoff_args(&install, &package);
    let before = snapshot(&install.root, WORK);

    let launcher = RecordingLauncher::default();
    let events = RecordingEvents::rejecting_success();
    let updater = AutoUpdater::builder(install.config("1.0"))
        .launcher(launcher.clone())
        .events(events.clone())
        .build()
        .unwrap();

    assert_eq!(updater.initialize(args).unwrap(), Flow::Exit(EXIT_OK));
    assert_eq!(
        events.seen(),
        vec!["resolve_succeeded", "resolve_failed", "rollback_succeeded"]
    );

    // Only the restored original is ever launched.
    let launches = launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].program, install.root.join(ENTRY));
    assert_eq!(snapshot(&install.root, WORK), before);
}

#[test]
fn test_rollback_failure_exits_with_failure() {
    let install = Install::new();
    let package = install.package();
    let args = handoff_args(&install, &package);

    let config = install.config("1.0");
    let layout = config.layout_for(&install.root).unwrap();
    std::fs::remove_dir_all(&layout.backups).unwrap();

    let failing = |_: &Path, _: &Path, _: &UpdateRecord| -> Result<PathBuf> {
        Err(UpdateError::Archive("bad package".into()))
    };
    let launcher = RecordingLauncher::default();
    let events = RecordingEvents::default();
    let updater = AutoUpdater::builder(config)
        .launcher(launcher.clone())
        .events(events.clone())
        .resolver(failing)
        .build()
        .unwrap();

    assert_eq!(updater.initialize(args).unwrap(), Flow::Exit(EXIT_FAILURE));
    assert_eq!(events.seen(), vec!["resolve_failed", "rollback_failed"]);
    assert!(launcher.launches().is_empty());
    // Refusing to restore leaves the install untouched.
    assert_eq!(std::fs::read(install.root.join(ENTRY)).unwrap(), b"app v1");
}

#[test]
fn test_lock_held_exits_without_applying() {
    let install = Install::new();
    let package = install.package();
    let args = handoff_args(&install, &package);
    let before = snapshot(&install.root, WORK);

    let config = install.config("1.0");
    let lock = NamedLock::new(config.lock_dir(), &config.lock_name());
    let _held = lock
        .try_acquire(config.lock_stale_after())
        .unwrap()
        .unwrap();

    let launcher = RecordingLauncher::default();
    let updater = AutoUpdater::builder(config)
        .launcher(launcher.clone())
        .build()
        .unwrap();

    assert_eq!(updater.initialize(args).unwrap(), Flow::Exit(EXIT_OK));
    assert_eq!(snapshot(&install.root, WORK), before);
    assert!(launcher.launches().is_empty());
}

#[test]
fn test_lock_is_released_after_run() {
    let install = Install::new();
    let package = install.package();
    let args = handoff_args(&install, &package);
    let config = install.config("1.0");
    let lock = NamedLock::new(config.lock_dir(), &config.lock_name());

    let updater = AutoUpdater::builder(config)
        .launcher(RecordingLauncher::default())
        .build()
        .unwrap();
    updater.initialize(args).unwrap();

    assert!(!lock.path().exists());
}

#[test]
fn test_normal_start_recreates_work_dir() {
    let install = Install::new();
    let config = install.config("1.0");
    let layout = config.layout_for(&install.root).unwrap();
    std::fs::create_dir_all(&layout.downloads).unwrap();
    std::fs::write(layout.downloads.join("stale.tar.gz"), b"old").unwrap();

    let updater = AutoUpdater::builder(config)
        .launcher(RecordingLauncher::default())
        .build()
        .unwrap();

    assert_eq!(
        updater.initialize(["app", "--verbose"]).unwrap(),
        Flow::Continue
    );
    assert!(!layout.downloads.join("stale.tar.gz").exists());
    assert!(layout.logs.is_dir());
    assert!(layout.backups.is_dir());
    assert!(layout.downloads.is_dir());
}

#[test]
fn test_unknown_mode_continues() {
    let install = Install::new();
    let updater = AutoUpdater::builder(install.config("1.0"))
        .launcher(RecordingLauncher::default())
        .build()
        .unwrap();

    let args = ["app", "AutoUpdater", "-m", "Install", "-p", "/p", "-r", "/r"];
    assert_eq!(updater.initialize(args).unwrap(), Flow::Continue);
}

#[test]
fn test_newer_handoff_schema_is_rejected() {
    let install = Install::new();
    let updater = AutoUpdater::builder(install.config("1.0"))
        .launcher(RecordingLauncher::default())
        .build()
        .unwrap();

    let args = ["app", "AutoUpdater", "-m", "Update", "-s", "99", "-p", "/p", "-r", "/r"];
    assert!(matches!(
        updater.initialize(args),
        Err(UpdateError::Handoff(_))
    ));
}
