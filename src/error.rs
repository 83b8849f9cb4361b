//! Error types for archivist operations.

use std::path::PathBuf;

/// All errors that can occur while driving a monitoring session.
#[derive(Debug, thiserror::Error)]
pub enum ArchivistError {
    // Validation errors: the command is rejected and state is untouched.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Folder is already watched: {0}")]
    DuplicateFolder(PathBuf),

    #[error("Folder is not watched: {0}")]
    FolderNotFound(PathBuf),

    #[error("Cannot remove the last watched folder: {0}")]
    LastFolder(PathBuf),

    #[error("Invalid extension format: {0:?} (expected something like \".md\")")]
    InvalidExtensionFormat(String),

    #[error("Extension is already tracked: {0}")]
    DuplicateExtension(String),

    #[error("Extension is not tracked: {0}")]
    ExtensionNotFound(String),

    #[error("Cannot remove the last tracked extension: {0}")]
    LastExtension(String),

    // Resource errors
    #[error("Failed to create file system watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file malformed: {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl ArchivistError {
    /// True for errors that reject a command without touching session state.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ArchivistError::NotADirectory(_)
                | ArchivistError::DuplicateFolder(_)
                | ArchivistError::FolderNotFound(_)
                | ArchivistError::LastFolder(_)
                | ArchivistError::InvalidExtensionFormat(_)
                | ArchivistError::DuplicateExtension(_)
                | ArchivistError::ExtensionNotFound(_)
                | ArchivistError::LastExtension(_)
        )
    }
}

impl From<tokio::task::JoinError> for ArchivistError {
    fn from(err: tokio::task::JoinError) -> Self {
        ArchivistError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArchivistError>;
