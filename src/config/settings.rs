//! Configuration settings for HoboMirror
//!
//! CLI arguments, the runtime configuration derived from them, and the
//! persisted settings store that schedules ACL refreshes across runs.

use crate::error::{MirrorError, Result};
use crate::sync::MirrorTask;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// HoboMirror - privileged point-in-time directory mirroring
#[derive(Parser, Debug, Clone)]
#[command(name = "hobomirror")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mirror directory trees byte-identically, reparse points and ACLs included")]
#[command(long_about = r#"
HoboMirror makes a target directory equal to a point-in-time snapshot of a
source directory: file contents, timestamps, attribute bits, security
descriptors, junctions, and symbolic links.

The target must opt in by containing a guard file named
__HoboMirrorTarget__.txt whose text includes the word "allow".

Examples:
  hobomirror C:\=D:\mirror\c                  # mirror one volume
  hobomirror C:\data=D:\m\data E:\=D:\m\e     # several pairs in one run
  hobomirror C:\data=D:\m --ignore-dir-name node_modules
  hobomirror C:\data=D:\m --dry-run           # report, change nothing
"#)]
pub struct CliArgs {
    /// Mirror pairs, each SOURCE=TARGET
    #[arg(value_name = "SOURCE=TARGET")]
    pub tasks: Vec<String>,

    /// Absolute source path to leave out of the mirror (repeatable)
    #[arg(long = "ignore-path", value_name = "PATH")]
    pub ignore_paths: Vec<PathBuf>,

    /// Directory leaf name to leave out of the mirror (repeatable)
    #[arg(long = "ignore-dir-name", value_name = "NAME")]
    pub ignore_dir_names: Vec<String>,

    /// Skip security-descriptor propagation this run
    #[arg(long)]
    pub skip_access_control: bool,

    /// Skip timestamp and attribute-bit propagation this run
    #[arg(long)]
    pub skip_metadata: bool,

    /// Detect and report differences without mutating the target
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Read the live source volume directly instead of a snapshot
    #[arg(long)]
    pub no_snapshot: bool,

    /// Directory for the per-channel log files
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Settings file path
    #[arg(long, value_name = "PATH")]
    pub settings_file: Option<PathBuf>,

    /// Show progress bars for file copies
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the effective persisted settings
    #[command(name = "settings")]
    Settings,
}

/// Runtime configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Mirror pairs to run, in order
    pub tasks: Vec<MirrorTask>,
    /// Ignore paths from the CLI (merged with the settings store)
    pub ignore_paths: Vec<PathBuf>,
    /// Ignore directory names from the CLI (merged with the settings store)
    pub ignore_dir_names: Vec<String>,
    /// Propagate security descriptors (still subject to the refresh schedule)
    pub refresh_access_control: bool,
    /// Propagate timestamps and attribute bits
    pub update_metadata: bool,
    /// Report without mutating
    pub dry_run: bool,
    /// Read source roots through the volume snapshotter
    pub use_snapshot: bool,
    /// Directory for the per-channel log files
    pub log_dir: Option<PathBuf>,
    /// Settings file location
    pub settings_file: PathBuf,
    /// Draw copy progress bars
    pub show_progress: bool,
}

impl MirrorConfig {
    /// Build the runtime configuration from parsed CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        if args.tasks.is_empty() {
            return Err(MirrorError::config(
                "at least one SOURCE=TARGET pair is required",
            ));
        }
        let tasks = args
            .tasks
            .iter()
            .map(|spec| MirrorTask::parse(spec))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tasks,
            ignore_paths: args.ignore_paths.clone(),
            ignore_dir_names: args.ignore_dir_names.clone(),
            refresh_access_control: !args.skip_access_control,
            update_metadata: !args.skip_metadata,
            dry_run: args.dry_run,
            use_snapshot: !args.no_snapshot,
            log_dir: args.log_dir.clone(),
            settings_file: args
                .settings_file
                .clone()
                .unwrap_or_else(default_settings_path),
            show_progress: args.progress && !args.quiet,
        })
    }
}

/// Default settings location under the user's home directory
pub fn default_settings_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".hobomirror").join("settings.json")
}

/// Persisted configuration surviving across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Days between full ACL refreshes
    pub skip_refresh_access_control_days: i64,
    /// When ACLs were last refreshed
    pub last_refresh_access_control: Option<DateTime<Utc>>,
    /// Persisted ignore paths
    pub ignore_paths: Vec<PathBuf>,
    /// Persisted ignore directory names
    pub ignore_dir_names: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            skip_refresh_access_control_days: 7,
            last_refresh_access_control: None,
            ignore_paths: Vec::new(),
            ignore_dir_names: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(MirrorError::Settings(format!(
                "could not read '{}': {e}",
                path.display()
            ))),
        }
    }

    /// Write settings, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MirrorError::Settings(format!("could not create '{}': {e}", parent.display()))
            })?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| {
            MirrorError::Settings(format!("could not write '{}': {e}", path.display()))
        })
    }

    /// Whether the ACL-refresh interval has elapsed
    pub fn should_refresh_access_control(&self, now: DateTime<Utc>) -> bool {
        match self.last_refresh_access_control {
            None => true,
            Some(last) => {
                now.signed_duration_since(last)
                    >= Duration::days(self.skip_refresh_access_control_days)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_cli_to_config() {
        let args = CliArgs::try_parse_from([
            "hobomirror",
            "/data=/mirror",
            "--ignore-dir-name",
            "node_modules",
            "--ignore-path",
            "/data/tmp",
            "--skip-metadata",
            "--dry-run",
        ])
        .unwrap();

        let config = MirrorConfig::from_cli(&args).unwrap();
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].source_root, PathBuf::from("/data"));
        assert_eq!(config.ignore_dir_names, vec!["node_modules"]);
        assert_eq!(config.ignore_paths, vec![PathBuf::from("/data/tmp")]);
        assert!(config.refresh_access_control);
        assert!(!config.update_metadata);
        assert!(config.dry_run);
    }

    #[test]
    fn test_config_requires_tasks() {
        let args = CliArgs::try_parse_from(["hobomirror"]).unwrap();
        assert!(MirrorConfig::from_cli(&args).is_err());

        let args = CliArgs::try_parse_from(["hobomirror", "broken-pair"]).unwrap();
        assert!(MirrorConfig::from_cli(&args).is_err());
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.ignore_dir_names.push("node_modules".to_string());
        settings.last_refresh_access_control =
            Some(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_settings_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn test_malformed_settings_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn test_refresh_schedule() {
        let mut settings = Settings::default();
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();

        // Never refreshed: due.
        assert!(settings.should_refresh_access_control(now));

        settings.last_refresh_access_control =
            Some(Utc.with_ymd_and_hms(2026, 7, 30, 0, 0, 0).unwrap());
        assert!(!settings.should_refresh_access_control(now));

        settings.last_refresh_access_control =
            Some(Utc.with_ymd_and_hms(2026, 7, 20, 0, 0, 0).unwrap());
        assert!(settings.should_refresh_access_control(now));
    }
}
