//! Process handoff
//!
//! The running application backs up its install tree, launches the copy of
//! itself inside the backup with a [`PendingUpdate`] on the command line,
//! and exits. The copy (the elevated updater) is free to overwrite the
//! original install root.
//!
//! Command line of the elevated updater:
//!
//! ```text
//! <exe> AutoUpdater -m Update -s <schema> -p <package> -r <root>
//!     -v <version> -a <address> -h <hash> -f <true|false>
//!     -c <changelog> -g <grayscale> -e <extension>
//! ```

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::archive::{self, Archiver};
use crate::config::Layout;
use crate::error::{Result, UpdateError};
use crate::record::UpdateRecord;

/// Verb that marks an updater invocation
pub const HANDOFF_VERB: &str = "AutoUpdater";

/// The only mode the updater verb supports
pub const MODE_UPDATE: &str = "Update";

/// Current pending-update schema version
pub const HANDOFF_SCHEMA: u32 = 1;

/// State carried across the process boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub schema: u32,
    /// Downloaded package
    pub package: PathBuf,
    /// Install root to update
    pub root: PathBuf,
    pub record: UpdateRecord,
}

#[derive(Parser, Debug)]
#[command(name = "autoupdater", disable_help_subcommand = true)]
struct HandoffCli {
    #[command(subcommand)]
    command: HandoffCommand,
}

#[derive(Subcommand, Debug)]
enum HandoffCommand {
    #[command(name = "AutoUpdater", disable_help_flag = true)]
    AutoUpdater(HandoffArgs),
}

#[derive(Args, Debug)]
struct HandoffArgs {
    #[arg(short = 'm', long = "mode")]
    mode: String,

    #[arg(short = 's', long = "schema", default_value_t = HANDOFF_SCHEMA)]
    schema: u32,

    #[arg(short = 'p', long = "path", allow_hyphen_values = true)]
    path: PathBuf,

    #[arg(short = 'r', long = "root", allow_hyphen_values = true)]
    root: PathBuf,

    #[arg(short = 'v', long = "version", default_value = "", allow_hyphen_values = true)]
    version: String,

    #[arg(short = 'a', long = "address", default_value = "", allow_hyphen_values = true)]
    address: String,

    #[arg(short = 'h', long = "hash", default_value = "", allow_hyphen_values = true)]
    hash: String,

    #[arg(short = 'f', long = "force", action = ArgAction::Set, default_value_t = false)]
    force: bool,

    #[arg(short = 'c', long = "changelog", default_value = "", allow_hyphen_values = true)]
    changelog: String,

    #[arg(short = 'g', long = "grayscale", default_value = "", allow_hyphen_values = true)]
    grayscale: String,

    #[arg(short = 'e', long = "extension", default_value = "", allow_hyphen_values = true)]
    extension: String,
}

impl PendingUpdate {
    pub fn new(package: impl Into<PathBuf>, root: impl Into<PathBuf>, record: UpdateRecord) -> Self {
        Self {
            schema: HANDOFF_SCHEMA,
            package: package.into(),
            root: root.into(),
            record,
        }
    }

    /// Arguments for the elevated updater, excluding the program name
    pub fn to_args(&self) -> Vec<OsString> {
        let r = &self.record;
        let mut args: Vec<OsString> = Vec::with_capacity(23);
        args.push(HANDOFF_VERB.into());
        let mut push = |flag: &str, value: &OsStr| {
            args.push(flag.into());
            args.push(value.to_os_string());
        };
        push("-m", OsStr::new(MODE_UPDATE));
        push("-s", OsStr::new(&self.schema.to_string()));
        push("-p", self.package.as_os_str());
        push("-r", self.root.as_os_str());
        push("-v", OsStr::new(&r.version));
        push("-a", OsStr::new(&r.address));
        push("-h", OsStr::new(&r.hash));
        push("-f", OsStr::new(if r.force { "true" } else { "false" }));
        push("-c", OsStr::new(&r.changelog));
        push("-g", OsStr::new(&r.grayscale));
        push("-e", OsStr::new(&r.extension));
        args
    }

    /// Parse process arguments (program name first)
    ///
    /// Returns `Ok(None)` when the arguments are not an updater invocation
    /// or name a mode other than `Update`.
    pub fn from_args<I, T>(args: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        if args.get(1).map(|a| a.as_os_str()) != Some(OsStr::new(HANDOFF_VERB)) {
            return Ok(None);
        }

        let cli = HandoffCli::try_parse_from(&args)
            .map_err(|e| UpdateError::Handoff(e.to_string()))?;
        let HandoffCommand::AutoUpdater(a) = cli.command;

        if a.mode != MODE_UPDATE {
            tracing::warn!(mode = %a.mode, "Ignoring unknown updater mode");
            return Ok(None);
        }
        if a.schema == 0 || a.schema > HANDOFF_SCHEMA {
            return Err(UpdateError::Handoff(format!(
                "unsupported pending-update schema {} (supported: {})",
                a.schema, HANDOFF_SCHEMA
            )));
        }

        Ok(Some(Self {
            schema: a.schema,
            package: a.path,
            root: a.root,
            record: UpdateRecord {
                version: a.version,
                address: a.address,
                hash: a.hash,
                force: a.force,
                changelog: a.changelog,
                grayscale: a.grayscale,
                extension: a.extension,
            },
        }))
    }
}

// ============================================================================
// Launching
// ============================================================================

/// Starts a detached process
pub trait Launcher: Send + Sync {
    /// Launch `program` with `args`; `elevate` requests higher privileges
    fn launch(&self, program: &Path, args: &[OsString], elevate: bool) -> Result<()>;
}

/// Spawns real processes
///
/// On Windows an elevation request goes through
/// `Start-Process -Verb RunAs`, which raises the UAC prompt. Elsewhere the
/// process inherits the caller's privileges.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, program: &Path, args: &[OsString], elevate: bool) -> Result<()> {
        let spawn_err = |e: std::io::Error| UpdateError::Process {
            program: program.to_path_buf(),
            msg: e.to_string(),
        };

        let mut cmd = if elevate && cfg!(windows) {
            let mut cmd = Command::new("powershell");
            cmd.args([
                "-NoProfile",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                &elevated_command(program, args),
            ]);
            cmd
        } else {
            if elevate {
                tracing::debug!(program = %program.display(), "Elevation not supported here, launching directly");
            }
            let mut cmd = Command::new(program);
            cmd.args(args);
            if let Some(dir) = program.parent() {
                cmd.current_dir(dir);
            }
            cmd
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = cmd.spawn().map_err(spawn_err)?;
        tracing::info!(program = %program.display(), pid = child.id(), elevate, "Process launched");
        Ok(())
    }
}

/// PowerShell command starting `program` elevated with a raw argument line
fn elevated_command(program: &Path, args: &[OsString]) -> String {
    let line = args
        .iter()
        .map(|a| quote_windows_arg(&a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");
    let mut command = format!(
        "Start-Process -FilePath '{}' -Verb RunAs",
        ps_single_quote(&program.to_string_lossy())
    );
    if !line.is_empty() {
        command.push_str(&format!(" -ArgumentList '{}'", ps_single_quote(&line)));
    }
    command
}

fn ps_single_quote(s: &str) -> String {
    s.replace('\'', "''")
}

/// Quote one argument for the Windows command-line parser
pub fn quote_windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '"']) {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for ch in arg.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            other => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(other);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    quoted
}

// ============================================================================
// Backup + relaunch
// ============================================================================

/// Backs up the install tree and starts the updater from the backup
pub struct HandoffManager {
    layout: Layout,
    archiver: Arc<dyn Archiver>,
    launcher: Arc<dyn Launcher>,
    elevate: bool,
}

impl HandoffManager {
    pub fn new(
        layout: Layout,
        archiver: Arc<dyn Archiver>,
        launcher: Arc<dyn Launcher>,
        elevate: bool,
    ) -> Self {
        Self {
            layout,
            archiver,
            launcher,
            elevate,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Mirror the install root into the backup directory
    ///
    /// The work directory is excluded, so the mirror never contains earlier
    /// backups or downloads. The live root is only read.
    pub fn backup(&self) -> Result<()> {
        std::fs::create_dir_all(&self.layout.backups)?;
        let scratch = self
            .layout
            .backups
            .join(format!("{}.tar.gz", uuid::Uuid::new_v4()));
        archive::mirror(
            self.archiver.as_ref(),
            &self.layout.root,
            &self.layout.backups,
            &scratch,
            &[self.layout.work.clone()],
        )?;

        let entry = self.layout.backup_entry();
        if !entry.is_file() {
            return Err(UpdateError::Archive(format!(
                "backup is missing entry executable {}",
                entry.display()
            )));
        }
        tracing::info!(backups = %self.layout.backups.display(), "Install root mirrored");
        Ok(())
    }

    /// Launch the backed-up entry executable as the updater
    pub fn relaunch(&self, pending: &PendingUpdate) -> Result<()> {
        self.launcher
            .launch(&self.layout.backup_entry(), &pending.to_args(), self.elevate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PendingUpdate {
        PendingUpdate::new(
            "/opt/demo/AutoUpdater/Downloads/pkg.tar.gz",
            "/opt/demo",
            UpdateRecord {
                version: "2.0.0.0".into(),
                address: "https://example.com/demo-2.0.tar.gz".into(),
                hash: "abc123".into(),
                force: true,
                changelog: "- fixed crash on start\n- new icon".into(),
                grayscale: "beta, canary".into(),
                extension: "{\"k\": \"v\"}".into(),
            },
        )
    }

    fn with_program(args: Vec<OsString>) -> Vec<OsString> {
        let mut full = vec![OsString::from("/opt/demo/AutoUpdater/Backups/demo")];
        full.extend(args);
        full
    }

    #[test]
    fn test_args_round_trip_is_field_identical() {
        let pending = sample();
        let parsed = PendingUpdate::from_args(with_program(pending.to_args()))
            .unwrap()
            .unwrap();
        assert_eq!(parsed, pending);
    }

    #[test]
    fn test_empty_fields_round_trip() {
        let pending = PendingUpdate::new("/p.tar.gz", "/root", UpdateRecord::new("1.0", ""));
        let parsed = PendingUpdate::from_args(with_program(pending.to_args()))
            .unwrap()
            .unwrap();
        assert_eq!(parsed, pending);
    }

    #[test]
    fn test_args_shape() {
        let args = sample().to_args();
        assert_eq!(args[0], "AutoUpdater");
        assert_eq!(args[1], "-m");
        assert_eq!(args[2], "Update");
        assert!(args.iter().any(|a| a == "-h"));
        assert_eq!(args.len(), 23);
    }

    #[test]
    fn test_non_updater_args_are_ignored() {
        assert!(PendingUpdate::from_args(["app"]).unwrap().is_none());
        assert!(PendingUpdate::from_args(["app", "--verbose", "serve"])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_mode_is_ignored() {
        let args = ["app", "AutoUpdater", "-m", "Inspect", "-p", "x", "-r", "y"];
        assert!(PendingUpdate::from_args(args).unwrap().is_none());
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut pending = sample();
        pending.schema = HANDOFF_SCHEMA + 1;
        assert!(matches!(
            PendingUpdate::from_args(with_program(pending.to_args())),
            Err(UpdateError::Handoff(_))
        ));
    }

    #[test]
    fn test_missing_required_flag_is_error() {
        let args = ["app", "AutoUpdater", "-m", "Update", "-p", "x"];
        assert!(PendingUpdate::from_args(args).is_err());
    }

    #[test]
    fn test_quote_windows_arg() {
        assert_eq!(quote_windows_arg("plain"), "plain");
        assert_eq!(quote_windows_arg(""), "\"\"");
        assert_eq!(quote_windows_arg("a b"), "\"a b\"");
        assert_eq!(quote_windows_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote_windows_arg("C:\\dir with space\\"), "\"C:\\dir with space\\\\\"");
    }

    #[test]
    fn test_elevated_command_escapes_quotes() {
        let cmd = elevated_command(
            Path::new("C:\\App's\\demo.exe"),
            &[OsString::from("AutoUpdater"), OsString::from("")],
        );
        assert!(cmd.starts_with("Start-Process -FilePath 'C:\\App''s\\demo.exe' -Verb RunAs"));
        assert!(cmd.ends_with("-ArgumentList 'AutoUpdater \"\"'"));
    }
}
