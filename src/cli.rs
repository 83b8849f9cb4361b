use std::path::{Path, PathBuf};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::ArchivistConfig;
use crate::core::filter::normalize_extension;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(author = "xicv")]
#[command(version = "0.1.0")]
#[command(about = "Watch folders, keep dated Markdown change logs and a project summary")]
#[command(long_about = "archivist watches a set of folders for changes to files with tracked extensions, appends every change to a per-day Markdown log and keeps a summary file with tracked-file counts up to date.")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Folders to watch; replaces the configured folders
    #[arg(long = "folder", value_name = "DIR", help = "Folder to watch (repeatable, first is primary)")]
    pub folders: Vec<PathBuf>,

    /// Tracked extensions
    #[arg(long, value_delimiter = ',', help = "Tracked extensions (e.g., .md,.txt)")]
    pub extensions: Option<Vec<String>>,

    #[arg(long, value_name = "DIR", help = "Directory for dated change logs")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Summary file to regenerate")]
    pub summary_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Disable colors in output
    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch folders until Ctrl+C, then write the summary (default)
    Watch,
    /// Count tracked files once
    Scan {
        /// List every tracked file per folder
        #[arg(long)]
        files: bool,
    },
    /// Regenerate the summary file
    Summary {
        /// Print the summary instead of writing it
        #[arg(long)]
        stdout: bool,
    },
    /// Inspect or maintain the change log
    Log {
        #[command(subcommand)]
        action: LogCommand,
    },
    /// Export current settings (or file statistics) to a timestamped file
    Export {
        /// Target directory (defaults to the primary folder)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Write JSON instead of TOML or plain text
        #[arg(long)]
        json: bool,
        /// Export tracked-file statistics instead of settings
        #[arg(long)]
        statistics: bool,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum LogCommand {
    /// Last lines of a day's log
    Tail {
        /// Day to read, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "20")]
        lines: usize,
    },
    /// Latest entry headings of today's log, newest first
    Recent {
        #[arg(long, default_value = "10")]
        count: usize,
    },
    /// Delete logs older than the retention period (0 deletes all)
    Prune {
        #[arg(long)]
        keep_days: Option<u32>,
    },
    /// Append a manual entry
    Note { message: String },
    /// List days that have a log
    Dates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output (default)
    Text,
    /// JSON output for scripting
    Json,
    /// Compact single-line format
    Compact,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Watch)
    }

    /// Defaults, then the config file, then environment, then flags.
    pub fn load_config(&self) -> Result<ArchivistConfig> {
        let mut config = ArchivistConfig::load_or_default(self.config.as_deref())?;
        config.apply_env();

        if !self.folders.is_empty() {
            config.monitor.folders = self.folders.clone();
        }
        if let Some(ref extensions) = self.extensions {
            config.monitor.extensions = extensions.clone();
        }
        if let Some(ref log_dir) = self.log_dir {
            config.log.log_dir = log_dir.clone();
        }
        if let Some(ref summary_file) = self.summary_file {
            config.summary.path = summary_file.clone();
        }
        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(!self.no_color)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for folder in &self.folders {
            check_directory(folder)?;
        }

        if let Some(ref extensions) = self.extensions {
            if extensions.is_empty() {
                return Err("At least one extension must be given".to_string());
            }
            for ext in extensions {
                normalize_extension(ext).map_err(|err| err.to_string())?;
            }
        }

        if let Some(ref config) = self.config {
            if !config.is_file() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        match &self.command {
            Some(Command::Log { action: LogCommand::Tail { lines: 0, .. } }) => {
                Err("Lines must be greater than 0".to_string())
            }
            Some(Command::Log { action: LogCommand::Recent { count: 0 } }) => {
                Err("Count must be greater than 0".to_string())
            }
            Some(Command::Log { action: LogCommand::Note { message } }) if message.trim().is_empty() => {
                Err("Note must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

fn check_directory(path: &Path) -> std::result::Result<(), String> {
    if !path.exists() {
        return Err(format!("Path does not exist: {}", path.display()));
    }

    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", path.display()));
    }

    Ok(())
}
