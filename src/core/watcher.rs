//! Filesystem watching.
//!
//! Every directory under each root gets its own non-recursive watch so noise
//! directories are never subscribed to. Directories created while watching
//! are registered on the fly and the files already inside them are reported
//! as created.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::Result;
use super::events::{ChangeKind, ChangeRecord, DiagnosticLevel};
use super::filter::NoiseDirs;
use super::walk::directories;

/// Receiver of classified changes. Called from the watcher task in the order
/// the OS delivered the events.
pub trait ChangeSink: Send + Sync {
    fn emit(&self, record: ChangeRecord);
    fn diagnostic(&self, level: DiagnosticLevel, message: String);
}

/// Map a raw notification kind onto a change kind. `None` means ignore.
///
/// Renames arrive as separate `From`/`To` halves followed by a combined
/// `Both` event; only the halves are reported.
pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => None,
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryWatcher {
    noise: NoiseDirs,
}

impl DirectoryWatcher {
    pub fn new(noise: NoiseDirs) -> Self {
        Self { noise }
    }

    /// Subscribe to every folder and spawn the event loop on the current
    /// tokio runtime. Fails without spawning anything if the OS watcher or a
    /// root watch cannot be created.
    pub fn start(&self, folders: &[PathBuf], sink: Arc<dyn ChangeSink>) -> Result<WatchHandle> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = raw_tx.send(res);
        })?;

        let mut watched = HashSet::new();
        for root in folders {
            watcher.watch(root, RecursiveMode::NonRecursive)?;
            watched.insert(root.clone());

            for dir in directories(root, &self.noise).into_iter().skip(1) {
                match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                    Ok(()) => {
                        watched.insert(dir);
                    }
                    Err(err) => sink.diagnostic(
                        DiagnosticLevel::Warning,
                        format!("Cannot watch {}: {}", dir.display(), err),
                    ),
                }
            }
            tracing::debug!("Watching {}", root.display());
        }
        tracing::info!("Registered {} directory watches", watched.len());

        let mut roots = folders.to_vec();
        // Longest first so nested roots claim their own events.
        roots.sort_by_key(|root| std::cmp::Reverse(root.components().count()));

        let event_loop = WatchLoop {
            watcher,
            roots,
            watched,
            announced: HashSet::new(),
            noise: self.noise.clone(),
            sink,
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(event_loop.run(stop_rx, raw_rx));

        Ok(WatchHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }
}

/// Handle to one running watch. Dropping it signals the loop to stop
/// without waiting for it.
#[derive(Debug)]
pub struct WatchHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop the loop and wait until it has exited and released every OS
    /// watch. Calling it again is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await?;
            tracing::debug!("Watcher loop joined");
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map(|task| !task.is_finished()).unwrap_or(false)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

struct WatchLoop {
    watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
    watched: HashSet<PathBuf>,
    /// Files reported by a new-directory walk whose own create event may
    /// still be queued.
    announced: HashSet<PathBuf>,
    noise: NoiseDirs,
    sink: Arc<dyn ChangeSink>,
}

impl WatchLoop {
    async fn run(
        mut self,
        mut stop_rx: oneshot::Receiver<()>,
        mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    ) {
        loop {
            let msg = tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                msg = raw_rx.recv() => msg,
            };

            match msg {
                // Handling walks directories and appends to the log file.
                Some(Ok(event)) => {
                    self = match tokio::task::spawn_blocking(move || {
                        self.handle(event);
                        self
                    })
                    .await
                    {
                        Ok(event_loop) => event_loop,
                        Err(err) => {
                            tracing::error!("Watcher event handler failed: {}", err);
                            return;
                        }
                    };
                }
                Some(Err(err)) => self.sink.diagnostic(
                    DiagnosticLevel::Error,
                    format!("File watcher error: {}", err),
                ),
                None => break,
            }
        }
        tracing::debug!("Watcher loop exiting, releasing {} watches", self.watched.len());
    }

    fn handle(&mut self, event: Event) {
        let Some(kind) = classify(&event.kind) else {
            return;
        };

        for path in event.paths {
            let Some(root) = self.root_of(&path) else {
                continue;
            };
            if self.noise.within_noise(&path, &root) {
                continue;
            }

            match kind {
                ChangeKind::Created if path.is_dir() => {
                    for dir in self.register_tree(&path, &root) {
                        self.announce_files(&dir, &root);
                    }
                    continue;
                }
                ChangeKind::Created if self.announced.remove(&path) => continue,
                ChangeKind::Modified if path.is_dir() => continue,
                ChangeKind::Removed | ChangeKind::Renamed if self.watched.remove(&path) => {
                    let prefix = path.clone();
                    self.watched.retain(|dir| !dir.starts_with(&prefix));
                    self.announced.retain(|file| !file.starts_with(&prefix));
                    continue;
                }
                ChangeKind::Renamed if path.is_dir() => {
                    self.register_tree(&path, &root);
                    continue;
                }
                ChangeKind::Removed | ChangeKind::Renamed => {
                    self.announced.remove(&path);
                }
                _ => {}
            }

            self.sink.emit(ChangeRecord::new(path, &root, kind));
        }
    }

    /// Watch every directory under `dir` not watched yet. Returns the newly
    /// watched ones.
    fn register_tree(&mut self, dir: &Path, root: &Path) -> Vec<PathBuf> {
        let mut added = Vec::new();
        for sub in directories(dir, &self.noise) {
            if self.watched.contains(&sub) {
                continue;
            }
            match self.watcher.watch(&sub, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    tracing::debug!("Watching new directory {}", sub.display());
                    self.watched.insert(sub.clone());
                    added.push(sub);
                }
                Err(err) => self.sink.diagnostic(
                    DiagnosticLevel::Warning,
                    format!("Cannot watch {} (under {}): {}", sub.display(), root.display(), err),
                ),
            }
        }
        added
    }

    /// Report files that landed in a directory before its watch existed.
    /// Only the directory's own files; subdirectories are announced when
    /// they are registered.
    fn announce_files(&mut self, dir: &Path, root: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!("Cannot list new directory {}: {}", dir.display(), err);
                return;
            }
        };

        for entry in entries.flatten() {
            let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let file = entry.path();
            if self.announced.insert(file.clone()) {
                self.sink.emit(ChangeRecord::new(file, root, ChangeKind::Created));
            }
        }
    }

    fn root_of(&self, path: &Path) -> Option<PathBuf> {
        self.roots.iter().find(|root| path.starts_with(root)).cloned()
    }
}
