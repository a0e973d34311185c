use std::io::BufRead;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use a3s_autoupdate::{AutoUpdater, UpdaterConfig};

/// Config file looked up next to the executable
const CONFIG_FILE: &str = "autoupdate.toml";

#[derive(Parser)]
#[command(
    name = "a3s-autoupdate-demo",
    about = "Demo application that keeps itself up to date",
    version
)]
struct Cli {
    /// Metadata document to check (default: <root>/Release.json)
    #[arg(short, long)]
    source: Option<String>,

    /// Rollout tag of this installation
    #[arg(short, long)]
    grayscale: Option<String>,

    /// Seconds to wait before checking
    #[arg(short, long, default_value_t = 3)]
    delay: u64,
}

fn load_config() -> anyhow::Result<UpdaterConfig> {
    let exe = std::env::current_exe().context("cannot locate executable")?;
    let path = exe
        .parent()
        .map(|dir| dir.join(CONFIG_FILE))
        .filter(|p| p.is_file());

    match path {
        Some(path) => UpdaterConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(UpdaterConfig::new(
            "a3s-autoupdate-demo",
            env!("CARGO_PKG_VERSION"),
        )),
    }
}

fn default_source(root: &Path) -> String {
    root.join("Release.json")
        .to_string_lossy()
        .into_owned()
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    let updater = AutoUpdater::builder(config).build()?;

    // Exits here when launched as the elevated updater.
    updater.initialize(std::env::args_os())?.exit_if_requested();

    let cli = Cli::parse();
    let source = cli
        .source
        .unwrap_or_else(|| default_source(&updater.layout().root));

    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_secs(cli.delay));
        match updater.start(source.as_str(), cli.grayscale.as_deref()) {
            Ok(state) => state.flow.exit_if_requested(),
            Err(e) => eprintln!("Update check failed: {e}"),
        }
    });

    println!("a3s-autoupdate-demo {}", env!("CARGO_PKG_VERSION"));
    println!("Press Enter to quit");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;

    if worker.is_finished() {
        let _ = worker.join();
    }
    Ok(())
}
