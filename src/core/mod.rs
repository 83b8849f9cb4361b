//! Core functionality module
//!
//! Contains filtering, counting, the change log, summary generation, file
//! watching and the session that ties them together

pub mod events;
pub mod filter;
pub mod walk;
pub mod counter;
pub mod changelog;
pub mod summary;
pub mod watcher;
pub mod session;

// Re-export main types
pub use events::{ActivityFeed, ChangeKind, ChangeRecord, Diagnostic, DiagnosticLevel, MonitoringState, RunningCounters};
pub use filter::{extension_of, matches, ExtensionSet, FolderSet, NoiseDirs};
pub use counter::{FileCounter, ScanResult};
pub use changelog::{ChangeLog, LogTail};
pub use summary::{ExtensionShare, FolderSummaryEntry, SummaryGenerator, SummaryReport};
pub use watcher::{ChangeSink, DirectoryWatcher, WatchHandle};
pub use session::{MonitorSession, SessionSnapshot};
