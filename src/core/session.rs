//! Monitoring session: the single owner of folders, extensions, counters and
//! monitoring state.
//!
//! All state lives behind one mutex. The watcher task applies change records
//! through [`ChangeSink`] under that lock, so readers never see a
//! half-applied update. Log file writes happen after the lock is released. Start and stop are serialized by a separate async
//! mutex around the running watcher, which lets `stop()` await the watcher
//! loop without blocking state readers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::config::ArchivistConfig;
use crate::error::{ArchivistError, Result};
use super::changelog::ChangeLog;
use super::counter::{FileCounter, ScanResult};
use super::events::{
    ActivityFeed, ChangeRecord, Diagnostic, DiagnosticLevel, MonitoringState, RunningCounters,
};
use super::filter::{matches, normalize_extension, ExtensionSet, FolderSet, NoiseDirs};
use super::summary::{SummaryGenerator, SummaryReport};
use super::watcher::{ChangeSink, DirectoryWatcher, WatchHandle};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MAX_SCAN_ATTEMPTS: u32 = 3;

/// Read-only copy of session state for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub taken_at: DateTime<Local>,
    pub state: MonitoringState,
    pub folders: Vec<PathBuf>,
    pub primary: PathBuf,
    pub extensions: Vec<String>,
    pub counters: RunningCounters,
    pub recent: Vec<ChangeRecord>,
    pub diagnostics: Vec<Diagnostic>,
    pub log_dir: PathBuf,
    pub summary_path: PathBuf,
}

struct SessionState {
    folders: FolderSet,
    extensions: ExtensionSet,
    counters: RunningCounters,
    monitoring: MonitoringState,
    recent: ActivityFeed<ChangeRecord>,
    diagnostics: ActivityFeed<Diagnostic>,
    /// Bumped on every folder or extension change; scans started under an
    /// older generation are stale.
    generation: u64,
    /// Set when something happened since the summary was last written.
    dirty: bool,
}

impl SessionState {
    fn push_diagnostic(&mut self, level: DiagnosticLevel, message: String) {
        match level {
            DiagnosticLevel::Info => tracing::info!("{}", message),
            DiagnosticLevel::Warning => tracing::warn!("{}", message),
            DiagnosticLevel::Error => tracing::error!("{}", message),
        }
        self.diagnostics.push(Diagnostic::new(level, message));
    }
}

struct Shared {
    state: Mutex<SessionState>,
    changelog: ChangeLog,
    counter: FileCounter,
    summary: SummaryGenerator,
    watcher: DirectoryWatcher,
    summary_path: PathBuf,
    refresh_interval: Duration,
    record_session_events: bool,
    events_tx: broadcast::Sender<ChangeRecord>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn diagnostic(&self, level: DiagnosticLevel, message: String) {
        self.lock().push_diagnostic(level, message);
    }

    /// Our own log and summary writes must never feed back into the log.
    fn is_own_output(&self, path: &Path) -> bool {
        path.starts_with(self.changelog.dir()) || path == self.summary_path
    }

    fn record_change(&self, record: ChangeRecord) {
        if self.is_own_output(&record.path) {
            return;
        }

        let mut state = self.lock();
        if !matches(&record.path, &state.extensions) {
            return;
        }

        state.counters.apply(&record);
        state.dirty = true;
        state.recent.push(record.clone());
        drop(state);

        // The log has its own writer lock; records reach it in watcher order.
        if let Err(err) = self.changelog.append(&record) {
            self.diagnostic(
                DiagnosticLevel::Error,
                format!("Failed to write change log entry for {}: {}", record.path.display(), err),
            );
        }

        // No subscribers is fine.
        let _ = self.events_tx.send(record);
    }

    fn session_event(&self, message: &str) {
        tracing::info!("{}", message);
        if !self.record_session_events {
            return;
        }
        if let Err(err) = self.changelog.append_message(message) {
            self.diagnostic(DiagnosticLevel::Error, format!("Failed to write change log entry: {}", err));
        }
    }

    /// Recount every folder and replace the counters wholesale. Retries if
    /// folders or extensions changed while scanning.
    async fn recount(&self) -> Result<ScanResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (generation, folders, extensions) = {
                let state = self.lock();
                (state.generation, state.folders.to_vec(), state.extensions.clone())
            };

            let counter = self.counter.clone();
            let (_, combined) =
                tokio::task::spawn_blocking(move || counter.scan_all(&folders, &extensions)).await?;

            let mut state = self.lock();
            if state.generation == generation || attempt >= MAX_SCAN_ATTEMPTS {
                state.counters = RunningCounters::from(combined.clone());
                state.dirty = true;
                return Ok(combined);
            }
            tracing::debug!("Settings changed during scan, rescanning (attempt {})", attempt);
        }
    }

    async fn generate_summary(&self) -> Result<SummaryReport> {
        let (folders, extensions, counters, monitoring) = {
            let state = self.lock();
            (
                state.folders.clone(),
                state.extensions.clone(),
                state.counters.clone(),
                state.monitoring,
            )
        };

        let generator = self.summary.clone();
        let report = tokio::task::spawn_blocking(move || {
            generator.generate(&folders, &extensions, &counters, monitoring)
        })
        .await?;
        Ok(report)
    }

    async fn write_summary(&self) -> Result<SummaryReport> {
        self.lock().dirty = false;
        let report = self.generate_summary().await?;

        let text = report.render();
        let path = self.summary_path.clone();
        let written = tokio::task::spawn_blocking(move || SummaryGenerator::write(&path, &text)).await?;
        if let Err(err) = written {
            self.lock().dirty = true;
            self.diagnostic(
                DiagnosticLevel::Error,
                format!("Failed to write summary {}: {}", self.summary_path.display(), err),
            );
            return Err(err.into());
        }
        Ok(report)
    }
}

struct SessionSink {
    shared: Arc<Shared>,
}

impl ChangeSink for SessionSink {
    fn emit(&self, record: ChangeRecord) {
        self.shared.record_change(record);
    }

    fn diagnostic(&self, level: DiagnosticLevel, message: String) {
        self.shared.diagnostic(level, message);
    }
}

/// Watcher plus the periodic summary refresher for one Running period.
struct Running {
    watch: WatchHandle,
    refresher_stop: Option<oneshot::Sender<()>>,
    refresher: Option<JoinHandle<()>>,
}

impl Running {
    async fn shutdown(&mut self) -> Result<()> {
        let watch_result = self.watch.stop().await;
        if let Some(stop_tx) = self.refresher_stop.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.refresher.take() {
            task.await?;
        }
        watch_result
    }
}

async fn refresh_loop(shared: Arc<Shared>, mut stop_rx: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(shared.refresh_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let dirty = shared.lock().dirty;
                if dirty {
                    // Failures are already recorded as diagnostics.
                    let _ = shared.write_summary().await;
                }
            }
        }
    }
}

/// Resolve as much of `path` as exists, keeping the rest as given, so paths
/// compare equal to the canonical paths the watcher reports.
fn anchor_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    for ancestor in absolute.ancestors() {
        if let Ok(resolved) = std::fs::canonicalize(ancestor) {
            return match absolute.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => resolved.join(rest),
                _ => resolved,
            };
        }
    }
    absolute
}

/// Cheap handle to a monitoring session; clones share the same state.
#[derive(Clone)]
pub struct MonitorSession {
    shared: Arc<Shared>,
    control: Arc<tokio::sync::Mutex<Option<Running>>>,
}

impl MonitorSession {
    /// Build a stopped session from configuration. Counters start at zero
    /// until the first [`quick_scan`](Self::quick_scan).
    pub fn new(config: &ArchivistConfig) -> Result<Self> {
        config.validate().map_err(ArchivistError::Settings)?;

        let monitor = &config.monitor;
        let mut folder_paths = monitor.folders.iter();
        let first = folder_paths
            .next()
            .ok_or_else(|| ArchivistError::Settings("no folders configured".to_string()))?;
        let mut folders = FolderSet::new(first)?;
        for folder in folder_paths {
            folders.insert(folder)?;
        }

        let extensions = ExtensionSet::new(&monitor.extensions)?;
        let noise = NoiseDirs::new(monitor.noise_dirs.iter().cloned());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = SessionState {
            folders,
            extensions,
            counters: RunningCounters::default(),
            monitoring: MonitoringState::Stopped,
            recent: ActivityFeed::new(monitor.max_recent_records),
            diagnostics: ActivityFeed::new(monitor.max_diagnostics),
            generation: 0,
            dirty: true,
        };

        let log_dir = anchor_path(&config.log.log_dir);
        let summary_path = anchor_path(&config.summary.path);
        let counter = FileCounter::new(noise.clone())
            .with_excluded([log_dir.clone(), summary_path.clone()]);

        let shared = Shared {
            state: Mutex::new(state),
            changelog: ChangeLog::new(log_dir),
            counter: counter.clone(),
            summary: SummaryGenerator::new(counter),
            watcher: DirectoryWatcher::new(noise),
            summary_path,
            refresh_interval: config.summary.refresh_interval(),
            record_session_events: monitor.record_session_events,
            events_tx,
        };

        Ok(Self {
            shared: Arc::new(shared),
            control: Arc::new(tokio::sync::Mutex::new(None)),
        })
    }

    pub fn changelog(&self) -> &ChangeLog {
        &self.shared.changelog
    }

    pub fn summary_path(&self) -> &Path {
        &self.shared.summary_path
    }

    /// Receive every accepted change record as it is applied.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeRecord> {
        self.shared.events_tx.subscribe()
    }

    pub fn state(&self) -> MonitoringState {
        self.shared.lock().monitoring
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.lock();
        SessionSnapshot {
            taken_at: Local::now(),
            state: state.monitoring,
            folders: state.folders.to_vec(),
            primary: state.folders.primary().to_path_buf(),
            extensions: state.extensions.as_slice().to_vec(),
            counters: state.counters.clone(),
            recent: state.recent.to_vec(),
            diagnostics: state.diagnostics.to_vec(),
            log_dir: self.shared.changelog.dir().to_path_buf(),
            summary_path: self.shared.summary_path.clone(),
        }
    }

    /// Add a folder and fold a fresh scan of it into the counters.
    pub async fn add_folder<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let (resolved, generation, extensions) = {
            let mut state = self.shared.lock();
            let resolved = state.folders.insert(path)?;
            state.generation += 1;
            (resolved, state.generation, state.extensions.clone())
        };

        let counter = self.shared.counter.clone();
        let root = resolved.clone();
        let scan = tokio::task::spawn_blocking(move || counter.scan(&root, &extensions)).await?;

        let folded = {
            let mut state = self.shared.lock();
            if state.generation == generation {
                state.counters.fold(scan.total, &scan.per_extension);
                state.dirty = true;
                true
            } else {
                false
            }
        };
        if !folded {
            self.shared.recount().await?;
        }

        self.rewatch().await?;
        self.shared.session_event(&format!("Folder added: {}", resolved.display()));
        Ok(resolved)
    }

    pub async fn remove_folder<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let removed = {
            let mut state = self.shared.lock();
            let removed = state.folders.remove(path)?;
            state.generation += 1;
            removed
        };

        self.shared.recount().await?;
        self.rewatch().await?;
        self.shared.session_event(&format!("Folder removed: {}", removed.display()));
        Ok(removed)
    }

    pub fn set_primary<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let primary = {
            let mut state = self.shared.lock();
            let primary = state.folders.set_primary(path)?;
            state.dirty = true;
            primary
        };
        self.shared.session_event(&format!("Primary folder: {}", primary.display()));
        Ok(primary)
    }

    pub async fn add_extension(&self, ext: &str) -> Result<String> {
        let added = {
            let mut state = self.shared.lock();
            let added = state.extensions.insert(ext)?;
            state.generation += 1;
            added
        };

        self.shared.recount().await?;
        self.shared.session_event(&format!("Extension added: {}", added));
        Ok(added)
    }

    pub async fn remove_extension(&self, ext: &str) -> Result<String> {
        let removed = {
            let mut state = self.shared.lock();
            let removed = state.extensions.remove(ext)?;
            state.generation += 1;
            removed
        };

        self.shared.recount().await?;
        self.shared.session_event(&format!("Extension removed: {}", removed));
        Ok(removed)
    }

    /// Add several extensions at once, skipping ones already tracked.
    /// Nothing is added if any of them is malformed.
    pub async fn add_extensions<I, S>(&self, extensions: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let added = {
            let mut state = self.shared.lock();
            let mut added = 0;
            for ext in &normalized {
                if !state.extensions.contains(ext) && state.extensions.insert(ext).is_ok() {
                    added += 1;
                }
            }
            if added > 0 {
                state.generation += 1;
            }
            added
        };

        if added > 0 {
            self.shared.recount().await?;
            self.shared.session_event(&format!("Extensions added: {}", added));
        }
        Ok(added)
    }

    /// Restore the default extension list.
    pub async fn reset_extensions(&self) -> Result<()> {
        {
            let mut state = self.shared.lock();
            state.extensions = ExtensionSet::default();
            state.generation += 1;
        }

        self.shared.recount().await?;
        self.shared.session_event("Extensions reset to defaults");
        Ok(())
    }

    /// Start watching. A no-op while already running; the state only becomes
    /// Running once every watch is registered.
    pub async fn start(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        if control.is_some() {
            return Ok(());
        }

        let folders = self.shared.lock().folders.to_vec();
        let watch = self.start_watch(folders.clone()).await?;

        let (refresher_stop, stop_rx) = oneshot::channel();
        let refresher = tokio::spawn(refresh_loop(self.shared.clone(), stop_rx));

        *control = Some(Running {
            watch,
            refresher_stop: Some(refresher_stop),
            refresher: Some(refresher),
        });
        {
            let mut state = self.shared.lock();
            state.monitoring = MonitoringState::Running;
            state.dirty = true;
        }
        drop(control);

        self.shared
            .session_event(&format!("Monitoring started ({} folders)", folders.len()));
        Ok(())
    }

    /// Stop watching and wait for the watcher loop to exit. A no-op while
    /// stopped.
    pub async fn stop(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        let Some(mut running) = control.take() else {
            return Ok(());
        };

        let result = running.shutdown().await;
        {
            let mut state = self.shared.lock();
            state.monitoring = MonitoringState::Stopped;
            state.dirty = true;
        }
        drop(control);

        self.shared.session_event("Monitoring stopped");
        result
    }

    /// Full recount of every folder, replacing the counters.
    pub async fn quick_scan(&self) -> Result<ScanResult> {
        let result = self.shared.recount().await?;
        self.shared
            .session_event(&format!("Quick scan: {} tracked files", result.total));
        Ok(result)
    }

    pub async fn generate_summary(&self) -> Result<SummaryReport> {
        self.shared.generate_summary().await
    }

    /// Regenerate the summary and atomically replace the summary file.
    pub async fn write_summary(&self) -> Result<SummaryReport> {
        let report = self.shared.write_summary().await?;
        tracing::info!("Summary updated: {}", self.shared.summary_path.display());
        Ok(report)
    }

    pub fn log_message(&self, message: &str) -> Result<()> {
        self.shared.changelog.append_message(message)?;
        Ok(())
    }

    /// Delete log files older than `retain_days` (all of them for 0).
    pub fn prune_logs(&self, retain_days: u32) -> Result<usize> {
        let removed = self.shared.changelog.prune(retain_days)?;
        self.shared.diagnostic(
            DiagnosticLevel::Info,
            format!("Pruned {} change log files (keep {} days)", removed, retain_days),
        );
        // Recording a prune of everything would recreate today's file.
        if retain_days > 0 && removed > 0 {
            self.shared
                .session_event(&format!("Pruned {} change log files", removed));
        }
        Ok(removed)
    }

    /// Tracked files per folder, relative to that folder.
    pub async fn list_tracked_files(&self) -> Result<Vec<(PathBuf, Vec<PathBuf>)>> {
        let (folders, extensions) = {
            let state = self.shared.lock();
            (state.folders.to_vec(), state.extensions.clone())
        };

        let counter = self.shared.counter.clone();
        let listing = tokio::task::spawn_blocking(move || {
            folders
                .into_iter()
                .map(|folder| {
                    let files = counter.list(&folder, &extensions);
                    (folder, files)
                })
                .collect()
        })
        .await?;
        Ok(listing)
    }

    /// Registering watches walks every folder, so it runs off the async workers.
    async fn start_watch(&self, folders: Vec<PathBuf>) -> Result<WatchHandle> {
        let watcher = self.shared.watcher.clone();
        let sink = self.sink();
        tokio::task::spawn_blocking(move || watcher.start(&folders, sink)).await?
    }

    fn sink(&self) -> Arc<dyn ChangeSink> {
        Arc::new(SessionSink {
            shared: self.shared.clone(),
        })
    }

    /// Re-register watches after the folder set changed while running.
    async fn rewatch(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        let Some(running) = control.as_mut() else {
            return Ok(());
        };

        running.watch.stop().await?;
        let folders = self.shared.lock().folders.to_vec();
        match self.start_watch(folders).await {
            Ok(watch) => {
                running.watch = watch;
                Ok(())
            }
            Err(err) => {
                if let Some(mut running) = control.take() {
                    let _ = running.shutdown().await;
                }
                let mut state = self.shared.lock();
                state.monitoring = MonitoringState::Stopped;
                state.push_diagnostic(
                    DiagnosticLevel::Error,
                    format!("Monitoring stopped, cannot re-register watches: {}", err),
                );
                Err(err)
            }
        }
    }
}
