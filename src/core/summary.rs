//! Project summary generation.
//!
//! The summary is always exact: every folder is re-counted at generation
//! time instead of trusting the running counters, which are only reported
//! alongside so drift is visible.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::counter::{FileCounter, ScanResult};
use super::events::{MonitoringState, RunningCounters};
use super::filter::{ExtensionSet, FolderSet};

/// Count for one watched folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummaryEntry {
    pub path: PathBuf,
    pub count: usize,
    pub primary: bool,
}

/// Share of the total held by one extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionShare {
    pub extension: String,
    pub count: usize,
    pub percent: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub generated_at: DateTime<Local>,
    pub state: MonitoringState,
    pub folders: Vec<FolderSummaryEntry>,
    pub extensions: Vec<String>,
    pub total: usize,
    pub live_total: usize,
    pub breakdown: Vec<ExtensionShare>,
}

/// Integer percentage, 0 when there is nothing to divide by.
pub fn percent_of(count: usize, total: usize) -> usize {
    if total == 0 {
        0
    } else {
        count * 100 / total
    }
}

impl SummaryReport {
    pub fn render(&self) -> String {
        let mut out = String::from("# Project State\n\n");
        out.push_str(&format!(
            "**Last updated:** {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("**Monitoring status:** {}\n\n", self.state.label()));

        out.push_str("## Watched Folders\n\n");
        for folder in &self.folders {
            let star = if folder.primary { " ★" } else { "" };
            out.push_str(&format!("- {} ({} files){}\n", folder.path.display(), folder.count, star));
        }

        out.push_str("\n## Tracked Extensions\n\n");
        out.push_str(&self.extensions.join(", "));
        out.push('\n');

        out.push_str("\n## Statistics\n\n");
        out.push_str(&format!("Total tracked files: **{}**\n", self.total));
        out.push_str(&format!("Live counter: {}\n", self.live_total));

        out.push_str("\n### By extension\n\n");
        for share in &self.breakdown {
            out.push_str(&format!("- {}: {} files ({}%)\n", share.extension, share.count, share.percent));
        }

        out
    }

    pub fn share_of(&self, extension: &str) -> Option<&ExtensionShare> {
        self.breakdown.iter().find(|s| s.extension == extension)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SummaryGenerator {
    counter: FileCounter,
}

impl SummaryGenerator {
    pub fn new(counter: FileCounter) -> Self {
        Self { counter }
    }

    pub fn generate(
        &self,
        folders: &FolderSet,
        extensions: &ExtensionSet,
        counters: &RunningCounters,
        state: MonitoringState,
    ) -> SummaryReport {
        self.generate_at(Local::now(), folders, extensions, counters, state)
    }

    pub fn generate_at(
        &self,
        generated_at: DateTime<Local>,
        folders: &FolderSet,
        extensions: &ExtensionSet,
        counters: &RunningCounters,
        state: MonitoringState,
    ) -> SummaryReport {
        let (per_folder, combined) = self.counter.scan_all(folders.iter(), extensions);
        build_report(generated_at, folders.primary(), &per_folder, &combined, extensions, counters, state)
    }

    /// Replace `path` with `text` so readers see either the old or the new
    /// file, never a partial one.
    pub fn write<P: AsRef<Path>>(path: P, text: &str) -> io::Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|err| err.error)?;

        tracing::debug!("Summary written to {}", path.display());
        Ok(())
    }
}

fn build_report(
    generated_at: DateTime<Local>,
    primary: &Path,
    per_folder: &[(PathBuf, ScanResult)],
    combined: &ScanResult,
    extensions: &ExtensionSet,
    counters: &RunningCounters,
    state: MonitoringState,
) -> SummaryReport {
    let folders = per_folder
        .iter()
        .map(|(path, result)| FolderSummaryEntry {
            path: path.clone(),
            count: result.total,
            primary: path == primary,
        })
        .collect();

    let breakdown = extensions
        .iter()
        .map(|ext| {
            let count = combined.count_for(ext);
            ExtensionShare {
                extension: ext.clone(),
                count,
                percent: percent_of(count, combined.total),
            }
        })
        .collect();

    SummaryReport {
        generated_at,
        state,
        folders,
        extensions: extensions.as_slice().to_vec(),
        total: combined.total,
        live_total: counters.total,
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Read `- .ext: N files (P%)` lines back out of a rendered summary.
    fn parse_breakdown(text: &str) -> Vec<(String, usize, usize)> {
        text.lines()
            .filter_map(|line| {
                let rest = line.strip_prefix("- .")?;
                let (ext, rest) = rest.split_once(": ")?;
                let (count, rest) = rest.split_once(" files (")?;
                let percent = rest.strip_suffix("%)")?;
                Some((format!(".{}", ext), count.parse().ok()?, percent.parse().ok()?))
            })
            .collect()
    }

    fn populate(dir: &Path, files: &[&str]) {
        for name in files {
            fs::write(dir.join(name), "x").unwrap();
        }
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(7, 10), 70);
        assert_eq!(percent_of(1, 3), 33);
        assert_eq!(percent_of(5, 0), 0);
    }

    #[test]
    fn test_three_folders_round_trip() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let c = TempDir::new().unwrap();
        populate(a.path(), &["1.md", "2.md", "3.md", "x.txt"]);
        populate(b.path(), &["4.md", "5.md", "y.txt", "skip.png"]);
        populate(c.path(), &["6.md", "7.md", "z.txt"]);

        let mut folders = FolderSet::new(a.path()).unwrap();
        folders.insert(b.path()).unwrap();
        folders.insert(c.path()).unwrap();
        let extensions = ExtensionSet::new([".md", ".txt"]).unwrap();

        let report = SummaryGenerator::default().generate(
            &folders,
            &extensions,
            &RunningCounters::default(),
            MonitoringState::Stopped,
        );
        assert_eq!(report.total, 10);

        let parsed = parse_breakdown(&report.render());
        assert_eq!(
            parsed,
            vec![(".md".to_string(), 7, 70), (".txt".to_string(), 3, 30)]
        );
    }

    #[test]
    fn test_render_layout() {
        let dir = TempDir::new().unwrap();
        populate(dir.path(), &["a.md"]);
        let folders = FolderSet::new(dir.path()).unwrap();
        let extensions = ExtensionSet::new([".md", ".txt"]).unwrap();
        let mut counters = RunningCounters::default();
        counters.total = 4;

        let report = SummaryGenerator::default().generate(&folders, &extensions, &counters, MonitoringState::Running);
        let text = report.render();

        assert!(text.starts_with("# Project State\n\n**Last updated:** "));
        assert!(text.contains("**Monitoring status:** Running\n"));
        assert!(text.contains(&format!("- {} (1 files) ★\n", folders.primary().display())));
        assert!(text.contains(".md, .txt\n"));
        assert!(text.contains("Total tracked files: **1**\n"));
        assert!(text.contains("Live counter: 4\n"));
        assert!(text.contains("- .txt: 0 files (0%)\n"));
    }

    #[test]
    fn test_empty_total_reports_zero_percent() {
        let dir = TempDir::new().unwrap();
        let folders = FolderSet::new(dir.path()).unwrap();
        let extensions = ExtensionSet::new([".md"]).unwrap();

        let report = SummaryGenerator::default().generate(
            &folders,
            &extensions,
            &RunningCounters::default(),
            MonitoringState::Stopped,
        );

        assert_eq!(report.share_of(".md").unwrap().percent, 0);
    }

    #[test]
    fn test_write_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("docs/project_state.md");

        SummaryGenerator::write(&target, "first version, quite long\n").unwrap();
        SummaryGenerator::write(&target, "second\n").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "second\n");
        let leftovers = fs::read_dir(dir.path().join("docs")).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
