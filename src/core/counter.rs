use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use super::events::RunningCounters;
use super::filter::{extension_of, ExtensionSet, NoiseDirs};
use super::walk::for_each_file;

/// Point-in-time count of tracked files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub total: usize,
    pub per_extension: BTreeMap<String, usize>,
}

impl ScanResult {
    pub fn merge(&mut self, other: &ScanResult) {
        self.total += other.total;
        for (ext, count) in &other.per_extension {
            *self.per_extension.entry(ext.clone()).or_insert(0) += count;
        }
    }

    pub fn count_for(&self, ext: &str) -> usize {
        self.per_extension.get(ext).copied().unwrap_or(0)
    }
}

impl From<ScanResult> for RunningCounters {
    fn from(result: ScanResult) -> Self {
        RunningCounters {
            total: result.total,
            per_extension: result.per_extension,
        }
    }
}

/// Counts tracked files by walking directory trees. Read-only on the
/// filesystem, so it is safe to run alongside a live watcher.
#[derive(Debug, Clone, Default)]
pub struct FileCounter {
    noise: NoiseDirs,
    /// Files and directories never counted, such as the session's own output.
    excluded: Vec<PathBuf>,
}

impl FileCounter {
    pub fn new(noise: NoiseDirs) -> Self {
        Self {
            noise,
            excluded: Vec::new(),
        }
    }

    pub fn with_excluded<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.excluded.extend(paths);
        self
    }

    /// Extension of `path` if it is a tracked, non-excluded file.
    fn tracked(&self, path: &Path, extensions: &ExtensionSet) -> Option<String> {
        if self.excluded.iter().any(|excluded| path.starts_with(excluded)) {
            return None;
        }
        let ext = extension_of(path);
        (!ext.is_empty() && extensions.contains(&ext)).then_some(ext)
    }

    pub fn scan(&self, root: &Path, extensions: &ExtensionSet) -> ScanResult {
        let mut result = ScanResult::default();

        let stats = for_each_file(root, &self.noise, |path| {
            if let Some(ext) = self.tracked(path, extensions) {
                result.total += 1;
                *result.per_extension.entry(ext).or_insert(0) += 1;
            }
        });

        if stats.errors > 0 {
            tracing::debug!("Scan of {} skipped {} unreadable entries", root.display(), stats.errors);
        }
        result
    }

    /// Scan every folder. Returns per-folder results in input order and the combined result.
    pub fn scan_all<'a, I>(&self, folders: I, extensions: &ExtensionSet) -> (Vec<(PathBuf, ScanResult)>, ScanResult)
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        let mut combined = ScanResult::default();
        let per_folder: Vec<(PathBuf, ScanResult)> = folders
            .into_iter()
            .map(|folder| {
                let result = self.scan(folder, extensions);
                combined.merge(&result);
                (folder.clone(), result)
            })
            .collect();
        (per_folder, combined)
    }

    /// Tracked files under `root`, relative to it and sorted.
    pub fn list(&self, root: &Path, extensions: &ExtensionSet) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for_each_file(root, &self.noise, |path| {
            if self.tracked(path, extensions).is_some() {
                let rel = path.strip_prefix(root).unwrap_or(path);
                files.push(rel.to_path_buf());
            }
        });
        files.sort();
        files
    }
}
