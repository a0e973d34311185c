//! Embedding API: `AutoUpdater` and its builder
//!
//! Call [`AutoUpdater::initialize`] first thing in `main` with the process
//! arguments; when the process was launched as the elevated updater it
//! returns the exit flow. Later, call [`AutoUpdater::start`] (usually from a
//! worker thread) to check for and apply an update.

use std::ffi::OsString;
use std::sync::Arc;

use crate::archive::{Archiver, TarGzArchiver};
use crate::config::{Layout, UpdaterConfig};
use crate::decision::{Confirm, ConsoleConfirm, DefaultDecider};
use crate::error::Result;
use crate::handoff::{HandoffManager, Launcher, PendingUpdate, ProcessLauncher};
use crate::hooks::{
    Decider, DefaultDownloader, DefaultEvents, DefaultFetcher, DefaultResolver, Downloader,
    Fetcher, Hooks, PackageResolver, UpdateEvents,
};
use crate::lock::NamedLock;
use crate::logging;
use crate::pipeline::{Flow, Pipeline, RunState, Source};
use crate::resolver::Resolver;
use crate::transport::{DefaultTransport, Transport};
use crate::version::AppVersion;

/// Self-update engine for one application
pub struct AutoUpdater {
    config: UpdaterConfig,
    layout: Layout,
    hooks: Hooks,
    archiver: Arc<dyn Archiver>,
    launcher: Arc<dyn Launcher>,
}

impl AutoUpdater {
    pub fn builder(config: UpdaterConfig) -> AutoUpdaterBuilder {
        AutoUpdaterBuilder::new(config)
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Handle process start-up
    ///
    /// If `args` are an updater invocation, runs the elevated resolver
    /// against the install root named in them and returns its exit flow.
    /// Otherwise recreates the work directory, starts file logging, and
    /// returns [`Flow::Continue`].
    pub fn initialize<I, T>(&self, args: I) -> Result<Flow>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        if let Some(pending) = PendingUpdate::from_args(args)? {
            let layout = self.config.layout_for(&pending.root)?;
            if self.config.log_enabled {
                logging::init(&layout.logs)?;
            }
            tracing::info!(
                root = %pending.root.display(),
                version = %pending.record.version,
                "Started as updater"
            );
            return self.resolver(layout).run(&pending);
        }

        self.layout.recreate()?;
        if self.config.log_enabled {
            logging::init(&self.layout.logs)?;
        }
        Ok(Flow::Continue)
    }

    /// Run the update pipeline once
    pub fn start(&self, source: impl Into<Source>, grayscale: Option<&str>) -> Result<RunState> {
        self.pipeline().run(source.into(), grayscale)
    }

    fn pipeline(&self) -> Pipeline {
        let handoff = HandoffManager::new(
            self.layout.clone(),
            self.archiver.clone(),
            self.launcher.clone(),
            self.config.elevate,
        );
        Pipeline::new(
            self.hooks.clone(),
            handoff,
            NamedLock::new(self.config.lock_dir(), &self.config.foreground_lock_name()),
            self.config.lock_stale_after(),
            self.config.verify_hash,
        )
    }

    fn resolver(&self, layout: Layout) -> Resolver {
        Resolver::new(
            self.hooks.clone(),
            layout,
            self.archiver.clone(),
            self.launcher.clone(),
            NamedLock::new(self.config.lock_dir(), &self.config.lock_name()),
            self.config.lock_stale_after(),
            self.config.elevate,
        )
    }
}

/// Builder replacing individual hooks and collaborators
pub struct AutoUpdaterBuilder {
    config: UpdaterConfig,
    transport: Option<Arc<dyn Transport>>,
    archiver: Option<Arc<dyn Archiver>>,
    launcher: Option<Arc<dyn Launcher>>,
    confirm: Option<Arc<dyn Confirm>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    decider: Option<Arc<dyn Decider>>,
    downloader: Option<Arc<dyn Downloader>>,
    resolver: Option<Arc<dyn PackageResolver>>,
    events: Option<Arc<dyn UpdateEvents>>,
}

impl AutoUpdaterBuilder {
    pub fn new(config: UpdaterConfig) -> Self {
        Self {
            config,
            transport: None,
            archiver: None,
            launcher: None,
            confirm: None,
            fetcher: None,
            decider: None,
            downloader: None,
            resolver: None,
            events: None,
        }
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn archiver(mut self, archiver: impl Archiver + 'static) -> Self {
        self.archiver = Some(Arc::new(archiver));
        self
    }

    pub fn launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Confirmation policy used by the default decider
    pub fn confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Some(Arc::new(confirm));
        self
    }

    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn decider(mut self, decider: impl Decider + 'static) -> Self {
        self.decider = Some(Arc::new(decider));
        self
    }

    pub fn downloader(mut self, downloader: impl Downloader + 'static) -> Self {
        self.downloader = Some(Arc::new(downloader));
        self
    }

    pub fn resolver(mut self, resolver: impl PackageResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn events(mut self, events: impl UpdateEvents + 'static) -> Self {
        self.events = Some(Arc::new(events));
        self
    }

    pub fn build(self) -> Result<AutoUpdater> {
        self.config.validate()?;
        let layout = self.config.layout()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(DefaultTransport::new(self.config.http_timeout())?),
        };
        let archiver = self
            .archiver
            .unwrap_or_else(|| Arc::new(TarGzArchiver) as Arc<dyn Archiver>);
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(ProcessLauncher) as Arc<dyn Launcher>);

        let decider: Arc<dyn Decider> = match self.decider {
            Some(d) => d,
            None => {
                let current = AppVersion::parse(&self.config.current_version)?;
                let confirm = self
                    .confirm
                    .unwrap_or_else(|| Arc::new(ConsoleConfirm) as Arc<dyn Confirm>);
                Arc::new(DefaultDecider::new(
                    current,
                    confirm,
                    self.config.grayscale_policy,
                ))
            }
        };

        let hooks = Hooks {
            fetcher: self.fetcher.unwrap_or_else(|| {
                Arc::new(DefaultFetcher::new(transport.clone())) as Arc<dyn Fetcher>
            }),
            decider,
            downloader: self.downloader.unwrap_or_else(|| {
                Arc::new(DefaultDownloader::new(transport.clone(), &layout.downloads))
                    as Arc<dyn Downloader>
            }),
            resolver: self.resolver.unwrap_or_else(|| {
                Arc::new(DefaultResolver::new(archiver.clone(), layout.entry.clone()))
                    as Arc<dyn PackageResolver>
            }),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(DefaultEvents) as Arc<dyn UpdateEvents>),
        };

        Ok(AutoUpdater {
            config: self.config,
            layout,
            hooks,
            archiver,
            launcher,
        })
    }
}
