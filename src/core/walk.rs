//! Visitor-driven recursive directory walk.
//!
//! The visitor decides per entry whether it is included, skipped, or (for
//! directories) whether the whole subtree is pruned. Traversal errors such as
//! permission denied are counted and skipped; they never abort the walk.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};
use super::filter::NoiseDirs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Include,
    Skip,
    SkipSubtree,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub included: usize,
    pub skipped_subtrees: usize,
    pub errors: usize,
}

pub fn walk_tree<F>(root: &Path, mut visitor: F) -> WalkStats
where
    F: FnMut(&DirEntry) -> Visit,
{
    let mut stats = WalkStats::default();
    let mut entries = WalkDir::new(root).follow_links(false).into_iter();

    while let Some(result) = entries.next() {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("Skipping unreadable entry: {}", err);
                stats.errors += 1;
                continue;
            }
        };

        match visitor(&entry) {
            Visit::Include => stats.included += 1,
            Visit::Skip => {}
            Visit::SkipSubtree => {
                if entry.file_type().is_dir() {
                    entries.skip_current_dir();
                    stats.skipped_subtrees += 1;
                }
            }
        }
    }

    stats
}

/// Call `on_file` for every regular file under `root` outside noise directories.
pub fn for_each_file<F>(root: &Path, noise: &NoiseDirs, mut on_file: F) -> WalkStats
where
    F: FnMut(&Path),
{
    walk_tree(root, |entry| {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            if entry.depth() > 0 && noise.is_noise(entry.path()) {
                Visit::SkipSubtree
            } else {
                Visit::Skip
            }
        } else if file_type.is_file() {
            on_file(entry.path());
            Visit::Include
        } else {
            Visit::Skip
        }
    })
}

/// Every directory under `root` (inclusive) outside noise directories.
pub fn directories(root: &Path, noise: &NoiseDirs) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    walk_tree(root, |entry| {
        if !entry.file_type().is_dir() {
            return Visit::Skip;
        }
        if entry.depth() > 0 && noise.is_noise(entry.path()) {
            return Visit::SkipSubtree;
        }
        dirs.push(entry.path().to_path_buf());
        Visit::Include
    });
    dirs
}
