//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use a3s_autoupdate::{Archiver, Launcher, Result, TarGzArchiver, UpdateError, UpdaterConfig};
use tempfile::TempDir;

pub const ENTRY: &str = "app";
pub const APP_ID: &str = "com.a3s.autoupdate.test";

/// One recorded launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub elevate: bool,
}

/// Launcher that records instead of spawning
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launches: Arc<Mutex<Vec<Launch>>>,
    fail_first: Arc<Mutex<usize>>,
}

impl RecordingLauncher {
    /// Fail the first `n` launches
    pub fn failing(n: usize) -> Self {
        let launcher = Self::default();
        *launcher.fail_first.lock().unwrap() = n;
        launcher
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.launches.lock().unwrap().clone()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, program: &Path, args: &[OsString], elevate: bool) -> Result<()> {
        let mut remaining = self.fail_first.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(UpdateError::Process {
                program: program.to_path_buf(),
                msg: "refused by test launcher".into(),
            });
        }
        self.launches.lock().unwrap().push(Launch {
            program: program.to_path_buf(),
            args: args.to_vec(),
            elevate,
        });
        Ok(())
    }
}

/// An installed application: `<root>/app` at v1 plus some data
pub struct Install {
    pub dir: TempDir,
    pub root: PathBuf,
    pub locks: PathBuf,
}

impl Install {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("install");
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(root.join(ENTRY), b"app v1").unwrap();
        std::fs::write(root.join("data").join("settings.ini"), b"theme=dark").unwrap();
        std::fs::write(root.join("readme.txt"), b"version one").unwrap();
        let locks = dir.path().join("locks");
        Self { dir, root, locks }
    }

    pub fn config(&self, current_version: &str) -> UpdaterConfig {
        let mut config = UpdaterConfig::new(APP_ID, current_version);
        config.root_dir = Some(self.root.clone());
        config.entry_name = Some(ENTRY.to_string());
        config.lock_dir = Some(self.locks.clone());
        config.log_enabled = false;
        config.elevate = false;
        config
    }

    /// Package for v2: replaces the entry and adds a file
    pub fn package(&self) -> PathBuf {
        let staging = self.dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join(ENTRY), b"app v2").unwrap();
        std::fs::write(staging.join("whatsnew.txt"), b"everything").unwrap();

        let package = self.dir.path().join("demo-2.0.tar.gz");
        TarGzArchiver.compress(&staging, &package, &[]).unwrap();
        package
    }
}

/// Relative path -> contents of every file under `root`, skipping `skip`
pub fn snapshot(root: &Path, skip: &str) -> BTreeMap<PathBuf, Vec<u8>> {
    walk(root, root, skip)
}

fn walk(base: &Path, dir: &Path, skip: &str) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if dir == base && path.file_name().map(|n| n == skip).unwrap_or(false) {
            continue;
        }
        if path.is_dir() {
            files.extend(walk(base, &path, skip));
        } else {
            let rel = path.strip_prefix(base).unwrap().to_path_buf();
            files.insert(rel, std::fs::read(&path).unwrap());
        }
    }
    files
}
