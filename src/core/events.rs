use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Created => "Created",
            ChangeKind::Modified => "Modified",
            ChangeKind::Removed => "Removed",
            ChangeKind::Renamed => "Renamed",
        }
    }

    /// Effect of one record of this kind on the tracked-file total.
    pub fn count_delta(&self) -> i64 {
        match self {
            ChangeKind::Created => 1,
            ChangeKind::Removed => -1,
            ChangeKind::Modified | ChangeKind::Renamed => 0,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single classified file system event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub timestamp: DateTime<Local>,
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub kind: ChangeKind,
    pub extension: String,
}

impl ChangeRecord {
    /// Build a record stamped now. `root` is the watched folder the event came from.
    pub fn new(path: PathBuf, root: &Path, kind: ChangeKind) -> Self {
        let relative_path = path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        let extension = super::filter::extension_of(&path);

        Self {
            timestamp: Local::now(),
            path,
            relative_path,
            kind,
            extension,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// One-line description used as the change log message.
    pub fn message(&self) -> String {
        format!("{} `{}`", self.kind, self.relative_path.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitoringState {
    #[default]
    Stopped,
    Running,
}

impl MonitoringState {
    pub fn is_running(&self) -> bool {
        matches!(self, MonitoringState::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MonitoringState::Running => "Running",
            MonitoringState::Stopped => "Stopped",
        }
    }
}

/// Online approximation of tracked-file counts.
///
/// Updated incrementally from change records and replaced wholesale by a
/// full rescan. `total` always equals the sum of `per_extension`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningCounters {
    pub total: usize,
    pub per_extension: BTreeMap<String, usize>,
}

impl RunningCounters {
    /// Apply one record. Returns true if the counts changed.
    pub fn apply(&mut self, record: &ChangeRecord) -> bool {
        match record.kind.count_delta() {
            1 => {
                *self.per_extension.entry(record.extension.clone()).or_insert(0) += 1;
                self.total += 1;
                true
            }
            -1 => match self.per_extension.get_mut(&record.extension) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    self.total -= 1;
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Add counts from a scan of one more folder.
    pub fn fold(&mut self, total: usize, per_extension: &BTreeMap<String, usize>) {
        for (ext, count) in per_extension {
            *self.per_extension.entry(ext.clone()).or_insert(0) += count;
        }
        self.total += total;
    }

    pub fn extension_sum(&self) -> usize {
        self.per_extension.values().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// A line in the in-memory diagnostic stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub timestamp: DateTime<Local>,
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }
}

/// Bounded newest-first buffer used for recent records and diagnostics.
#[derive(Debug, Clone)]
pub struct ActivityFeed<T> {
    items: VecDeque<T>,
    max_items: usize,
}

impl<T: Clone> ActivityFeed<T> {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_items: max_items.max(1),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        while self.items.len() > self.max_items {
            self.items.pop_back();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn latest(&self, count: usize) -> Vec<T> {
        self.items.iter().take(count).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
