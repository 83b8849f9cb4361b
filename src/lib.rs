pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod export;

pub use crate::core::*;
pub use config::ArchivistConfig;
pub use error::{ArchivistError, Result};
