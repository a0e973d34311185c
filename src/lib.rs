//! # a3s-autoupdate
//!
//! Crash-safe self-update engine for desktop and service applications.
//!
//! ## Overview
//!
//! `a3s-autoupdate` checks a metadata document for newer releases, decides
//! whether to apply one, downloads the package, mirrors the install tree
//! into a backup and hands off to a copy of the application running from
//! that backup. The copy (the elevated updater) extracts the package over
//! the original install root and relaunches it, rolling back from the
//! backup if anything fails.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3s_autoupdate::{AutoConfirm, AutoUpdater, UpdaterConfig};
//!
//! # fn example() -> a3s_autoupdate::Result<()> {
//! let updater = AutoUpdater::builder(UpdaterConfig::new("com.example.demo", "1.0.0.0"))
//!     .confirm(AutoConfirm(true))
//!     .build()?;
//!
//! // First thing in main: exits here when running as the updater.
//! updater.initialize(std::env::args_os())?.exit_if_requested();
//!
//! // Later, usually on a worker thread.
//! let state = updater.start("https://example.com/demo/releases.json", None)?;
//! state.flow.exit_if_requested();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Hooks**: replaceable stage operations plus `UpdateEvents` notifications
//! - **Pipeline**: fetch, decide, download, backup-and-handoff in the host process
//! - **Resolver**: extract-or-rollback in the elevated updater process
//! - **PendingUpdate**: versioned state carried on the updater's command line

pub mod archive;
pub mod config;
pub mod decision;
pub mod error;
pub mod handoff;
pub mod hooks;
pub mod integrity;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod resolver;
pub mod transport;
pub mod updater;
pub mod version;

// Re-export core types
pub use archive::{Archiver, TarGzArchiver};
pub use config::{GrayscalePolicy, Layout, UpdaterConfig};
pub use decision::{AutoConfirm, Confirm, ConsoleConfirm, DefaultDecider, Prompt};
pub use error::{Result, Stage, UpdateError, EXIT_FAILURE, EXIT_OK};
pub use handoff::{HandoffManager, Launcher, PendingUpdate, ProcessLauncher};
pub use hooks::{
    Decider, DefaultDownloader, DefaultEvents, DefaultFetcher, DefaultResolver, Downloader,
    Fetcher, Hooks, PackageResolver, UpdateEvents,
};
pub use lock::{LockGuard, NamedLock};
pub use pipeline::{Flow, Pipeline, RunState, Source};
pub use record::UpdateRecord;
pub use resolver::Resolver;
pub use transport::{DefaultTransport, Transport};
pub use updater::{AutoUpdater, AutoUpdaterBuilder};
pub use version::AppVersion;
