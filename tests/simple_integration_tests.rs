use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use chrono::Local;
use tempfile::TempDir;
use archivist::export::{SettingsExporter, StatisticsExporter};
use archivist::{
    ArchivistConfig, ArchivistError, ChangeKind, ChangeLog, ChangeRecord, ExtensionSet, FileCounter,
    MonitorSession,
};

fn config_for(root: &Path, folders: Vec<PathBuf>) -> ArchivistConfig {
    let mut config = ArchivistConfig::default();
    config.monitor.folders = folders;
    config.monitor.extensions = vec![".md".to_string(), ".txt".to_string()];
    config.log.log_dir = root.join("changelog");
    config.summary.path = root.join("project_state.md");
    config
}

fn touch(dir: &Path, names: &[&str]) {
    for name in names {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, name).unwrap();
    }
}

#[test]
fn test_basic_scan_scenario() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    touch(temp_dir.path(), &["a.md", "b.txt", "c.png"]);

    let extensions = ExtensionSet::new([".md", ".txt"]).unwrap();
    let result = FileCounter::default().scan(temp_dir.path(), &extensions);

    assert_eq!(result.total, 2);
    assert_eq!(result.count_for(".md"), 1);
    assert_eq!(result.count_for(".txt"), 1);
}

#[tokio::test]
async fn test_quick_scan_matches_fresh_count() {
    let temp_dir = TempDir::new().unwrap();
    let a = temp_dir.path().join("a");
    let b = temp_dir.path().join("b");
    touch(&a, &["1.md", "nested/2.md", "node_modules/skip.md", "3.txt"]);
    touch(&b, &["4.md", "5.rs", ".git/6.md"]);

    let session = MonitorSession::new(&config_for(temp_dir.path(), vec![a.clone(), b.clone()])).unwrap();
    session.quick_scan().await.unwrap();
    let snapshot = session.snapshot();

    let extensions = ExtensionSet::new(&snapshot.extensions).unwrap();
    let (_, fresh) = FileCounter::default().scan_all(&snapshot.folders, &extensions);

    assert_eq!(snapshot.counters.total, 4);
    assert_eq!(snapshot.counters.total, snapshot.counters.extension_sum());
    assert_eq!(snapshot.counters.total, fresh.total);
    assert_eq!(snapshot.counters.per_extension, fresh.per_extension);
}

#[tokio::test]
async fn test_rejected_commands_leave_state_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    touch(&project, &["a.md"]);
    let session = MonitorSession::new(&config_for(temp_dir.path(), vec![project])).unwrap();
    let before = session.snapshot();

    let err = session.remove_folder(&before.primary).await.unwrap_err();
    assert!(matches!(err, ArchivistError::LastFolder(_)));
    assert!(err.is_validation());

    assert!(matches!(
        session.add_extension("txt").await,
        Err(ArchivistError::InvalidExtensionFormat(_))
    ));
    assert!(matches!(
        session.add_extension(".md").await,
        Err(ArchivistError::DuplicateExtension(_))
    ));

    let after = session.snapshot();
    assert_eq!(after.folders, before.folders);
    assert_eq!(after.extensions, before.extensions);
}

#[test]
fn test_concurrent_appends_keep_order_per_source() {
    let temp_dir = TempDir::new().unwrap();
    let log = Arc::new(ChangeLog::new(temp_dir.path().join("changelog")));
    let root = PathBuf::from("/w");

    let handles: Vec<_> = (0..2)
        .map(|source| {
            let log = log.clone();
            let root = root.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let path = root.join(format!("s{}_{:02}.md", source, i));
                    log.append(&ChangeRecord::new(path, &root, ChangeKind::Modified)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let content = fs::read_to_string(log.path_for(Local::now().date_naive())).unwrap();
    assert_eq!(content.matches("### ").count(), 100);
    assert_eq!(content.matches("# Changes for ").count(), 1);

    for source in 0..2 {
        let prefix = format!("Modified `s{}_", source);
        let order: Vec<usize> = content
            .lines()
            .filter_map(|line| line.split_once(&prefix))
            .map(|(_, rest)| rest[..2].parse().unwrap())
            .collect();
        assert_eq!(order, (0..50).collect::<Vec<_>>());
    }

    // Every entry is a complete block.
    for block in content.split("\n\n").skip(1).filter(|b| !b.is_empty()) {
        let lines: Vec<&str> = block.lines().collect();
        assert_eq!(lines.len(), 4, "Torn entry: {:?}", block);
        assert!(lines[0].starts_with("### "));
        assert!(lines[3].starts_with("- **Time:** "));
    }
}

#[test]
fn test_prune_everything_then_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let log_dir = temp_dir.path().join("changelog");
    fs::create_dir_all(&log_dir).unwrap();
    fs::write(log_dir.join("2024-01-01_changes.md"), "# old\n\n").unwrap();
    fs::write(log_dir.join("2024-01-02_changes.md"), "# old\n\n").unwrap();
    fs::write(log_dir.join("notes.md"), "not a log").unwrap();
    let log = ChangeLog::new(&log_dir);
    log.append_message("today").unwrap();

    assert_eq!(log.list_dates().unwrap().len(), 3);
    assert_eq!(log.prune(0).unwrap(), 3);
    assert_eq!(log.prune(0).unwrap(), 0);
    assert!(log_dir.join("notes.md").exists());
}

#[tokio::test]
async fn test_summary_percentages_over_three_folders() {
    let temp_dir = TempDir::new().unwrap();
    let folders: Vec<PathBuf> = ["one", "two", "three"]
        .iter()
        .map(|name| temp_dir.path().join(name))
        .collect();
    touch(&folders[0], &["a.md", "b.md", "c.md"]);
    touch(&folders[1], &["d.md", "e.md", "f.txt", "g.txt"]);
    touch(&folders[2], &["h.md", "i.md", "j.txt", "k.png"]);

    let session = MonitorSession::new(&config_for(temp_dir.path(), folders)).unwrap();
    session.write_summary().await.unwrap();
    let text = fs::read_to_string(session.summary_path()).unwrap();

    assert!(text.contains("Total tracked files: **10**"));
    assert!(text.contains("- .md: 7 files (70%)"));
    assert!(text.contains("- .txt: 3 files (30%)"));
    assert!(text.contains("(3 files) ★"));
}

#[test]
fn test_settings_export_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    touch(&project, &["a.md"]);
    let session = MonitorSession::new(&config_for(temp_dir.path(), vec![project.clone()])).unwrap();

    let path = SettingsExporter::default()
        .export_to_dir(&session.snapshot(), temp_dir.path())
        .unwrap();
    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("archivist_settings_") && name.ends_with(".toml"));

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("\".md\""));
    assert!(content.contains("Stopped"));
}

#[tokio::test]
async fn test_statistics_export_from_summary() {
    let temp_dir = TempDir::new().unwrap();
    let folders: Vec<PathBuf> = ["one", "two"].iter().map(|name| temp_dir.path().join(name)).collect();
    touch(&folders[0], &["a.md", "b.md", "c.txt"]);
    touch(&folders[1], &["d.md", "e.png"]);

    let session = MonitorSession::new(&config_for(temp_dir.path(), folders)).unwrap();
    session.quick_scan().await.unwrap();
    let report = session.generate_summary().await.unwrap();
    let path = StatisticsExporter::default()
        .export_to_dir(&report, temp_dir.path().join("exports"))
        .unwrap();

    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("statistics_") && name.ends_with(".txt"));
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("Total files: 4"));
    assert!(content.contains("Watched folders: 2"));
    assert!(content.contains("  .md: 3 (75%)"));
    assert!(content.contains("  .txt: 1 (25%)"));
}
