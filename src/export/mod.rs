//! Export of session settings and file statistics
//!
//! Writes timestamped snapshots: the folders, extensions and output paths of a
//! setup so it can be reused as a config file later, or the tracked-file
//! counts of a summary report.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use crate::core::{SessionSnapshot, SummaryReport};
use crate::error::{ArchivistError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Toml,
    Json,
}

impl ExportFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Toml => "toml",
            ExportFormat::Json => "json",
        }
    }
}

/// Settings as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedSettings {
    pub exported_at: String,
    pub monitoring: String,
    pub primary: PathBuf,
    pub folders: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub log_dir: PathBuf,
    pub summary_path: PathBuf,
}

impl ExportedSettings {
    pub fn from_snapshot(snapshot: &SessionSnapshot, exported_at: DateTime<Local>) -> Self {
        Self {
            exported_at: exported_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            monitoring: snapshot.state.label().to_string(),
            primary: snapshot.primary.clone(),
            folders: snapshot.folders.clone(),
            extensions: snapshot.extensions.clone(),
            log_dir: snapshot.log_dir.clone(),
            summary_path: snapshot.summary_path.clone(),
        }
    }
}

/// Writes settings snapshots
#[derive(Debug, Clone, Default)]
pub struct SettingsExporter {
    format: ExportFormat,
}

impl SettingsExporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// `archivist_settings_<YYYYMMDD_HHMMSS>.<ext>`
    pub fn file_name(&self, at: DateTime<Local>) -> String {
        format!(
            "archivist_settings_{}.{}",
            at.format("%Y%m%d_%H%M%S"),
            self.format.file_extension()
        )
    }

    pub fn render(&self, settings: &ExportedSettings) -> Result<String> {
        match self.format {
            ExportFormat::Toml => {
                toml::to_string_pretty(settings).map_err(|err| ArchivistError::Settings(err.to_string()))
            }
            ExportFormat::Json => {
                serde_json::to_string_pretty(settings).map_err(|err| ArchivistError::Settings(err.to_string()))
            }
        }
    }

    /// Export into `dir`, returning the path of the new file
    pub fn export_to_dir<P: AsRef<Path>>(&self, snapshot: &SessionSnapshot, dir: P) -> Result<PathBuf> {
        let now = Local::now();
        let settings = ExportedSettings::from_snapshot(snapshot, now);
        let content = self.render(&settings)?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name(now));
        fs::write(&path, content)?;

        tracing::info!("Settings exported to {}", path.display());
        Ok(path)
    }

    /// Export to a writer (stdout or a custom output)
    pub fn export_to_writer<W: Write>(&self, snapshot: &SessionSnapshot, writer: &mut W) -> Result<()> {
        let settings = ExportedSettings::from_snapshot(snapshot, Local::now());
        let content = self.render(&settings)?;
        writer.write_all(content.as_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatisticsFormat {
    #[default]
    Text,
    Json,
}

impl StatisticsFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            StatisticsFormat::Text => "txt",
            StatisticsFormat::Json => "json",
        }
    }
}

/// Writes tracked-file statistics from a summary report
#[derive(Debug, Clone, Default)]
pub struct StatisticsExporter {
    format: StatisticsFormat,
}

impl StatisticsExporter {
    pub fn new(format: StatisticsFormat) -> Self {
        Self { format }
    }

    /// `statistics_<YYYYMMDD_HHMMSS>.<ext>`
    pub fn file_name(&self, at: DateTime<Local>) -> String {
        format!(
            "statistics_{}.{}",
            at.format("%Y%m%d_%H%M%S"),
            self.format.file_extension()
        )
    }

    pub fn render(&self, report: &SummaryReport) -> Result<String> {
        match self.format {
            StatisticsFormat::Text => Ok(render_statistics(report)),
            StatisticsFormat::Json => {
                serde_json::to_string_pretty(report).map_err(|err| ArchivistError::Settings(err.to_string()))
            }
        }
    }

    /// Export into `dir`, named after the report's generation time
    pub fn export_to_dir<P: AsRef<Path>>(&self, report: &SummaryReport, dir: P) -> Result<PathBuf> {
        let content = self.render(report)?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name(report.generated_at));
        fs::write(&path, content)?;

        tracing::info!("Statistics exported to {}", path.display());
        Ok(path)
    }
}

fn render_statistics(report: &SummaryReport) -> String {
    let mut out = String::from("File statistics
");
    out.push_str(&format!("Date: {}

", report.generated_at.format("%Y-%m-%d %H:%M:%S")));
    out.push_str(&format!("Total files: {}
", report.total));
    out.push_str(&format!("Watched folders: {}
", report.folders.len()));
    out.push_str(&format!("Tracked extensions: {}
", report.extensions.len()));

    out.push_str("
By folder:
");
    for folder in &report.folders {
        let star = if folder.primary { " (primary)" } else { "" };
        out.push_str(&format!("  {}: {}{}
", folder.path.display(), folder.count, star));
    }

    out.push_str("
By extension:
");
    for share in &report.breakdown {
        out.push_str(&format!("  {}: {} ({}%)
", share.extension, share.count, share.percent));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use crate::core::{ExtensionShare, FolderSummaryEntry, MonitoringState, RunningCounters};

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            taken_at: Local::now(),
            state: MonitoringState::Running,
            folders: vec![PathBuf::from("/work/a"), PathBuf::from("/work/b")],
            primary: PathBuf::from("/work/a"),
            extensions: vec![".md".to_string(), ".txt".to_string()],
            counters: RunningCounters::default(),
            recent: Vec::new(),
            diagnostics: Vec::new(),
            log_dir: PathBuf::from("/work/a/docs/changelog"),
            summary_path: PathBuf::from("/work/a/docs/project_state.md"),
        }
    }

    #[test]
    fn test_file_name() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let exporter = SettingsExporter::default();

        assert_eq!(exporter.file_name(at), "archivist_settings_20240309_070501.toml");
        assert_eq!(
            SettingsExporter::new(ExportFormat::Json).file_name(at),
            "archivist_settings_20240309_070501.json"
        );
    }

    #[test]
    fn test_export_to_dir_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = SettingsExporter::default()
            .export_to_dir(&snapshot(), dir.path().join("exports"))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let settings: ExportedSettings = toml::from_str(&content).unwrap();

        assert_eq!(settings.monitoring, "Running");
        assert_eq!(settings.folders.len(), 2);
        assert_eq!(settings.extensions, vec![".md", ".txt"]);
    }

    fn report() -> SummaryReport {
        SummaryReport {
            generated_at: Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap(),
            state: MonitoringState::Stopped,
            folders: vec![
                FolderSummaryEntry { path: PathBuf::from("/work/a"), count: 7, primary: true },
                FolderSummaryEntry { path: PathBuf::from("/work/b"), count: 3, primary: false },
            ],
            extensions: vec![".md".to_string(), ".txt".to_string()],
            total: 10,
            live_total: 10,
            breakdown: vec![
                ExtensionShare { extension: ".md".to_string(), count: 7, percent: 70 },
                ExtensionShare { extension: ".txt".to_string(), count: 3, percent: 30 },
            ],
        }
    }

    #[test]
    fn test_statistics_text_export() {
        let dir = TempDir::new().unwrap();
        let path = StatisticsExporter::default().export_to_dir(&report(), dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "statistics_20240309_070501.txt");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Date: 2024-03-09 07:05:01"));
        assert!(content.contains("Total files: 10"));
        assert!(content.contains("Watched folders: 2"));
        assert!(content.contains("Tracked extensions: 2"));
        assert!(content.contains("  /work/a: 7 (primary)"));
        assert!(content.contains("  .md: 7 (70%)"));
        assert!(content.contains("  .txt: 3 (30%)"));
    }

    #[test]
    fn test_statistics_json_export() {
        let rendered = StatisticsExporter::new(StatisticsFormat::Json).render(&report()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["total"], 10);
        assert_eq!(value["breakdown"][1]["percent"], 30);
        assert_eq!(
            StatisticsExporter::new(StatisticsFormat::Json).file_name(report().generated_at),
            "statistics_20240309_070501.json"
        );
    }

    #[test]
    fn test_export_to_writer_json() {
        let mut out = Vec::new();
        SettingsExporter::new(ExportFormat::Json)
            .export_to_writer(&snapshot(), &mut out)
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["primary"], "/work/a");
    }
}
