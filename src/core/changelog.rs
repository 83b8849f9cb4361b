//! Append-only, date-partitioned Markdown change log.
//!
//! One file per calendar day at `<dir>/<YYYY-MM-DD>_changes.md`. The first
//! write of a day creates the file with an H1 header; every later write
//! appends a complete entry in a single `write_all` under the writer lock,
//! so concurrent callers never interleave partial entries. Files are only
//! ever deleted whole (by [`ChangeLog::prune`] or [`ChangeLog::clear`]).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use chrono::{DateTime, Local, NaiveDate};
use super::events::ChangeRecord;

const FILE_SUFFIX: &str = "_changes.md";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Result of reading a day's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTail {
    /// No log file exists for the requested date.
    Missing,
    Lines(Vec<String>),
}

impl LogTail {
    pub fn lines(&self) -> &[String] {
        match self {
            LogTail::Missing => &[],
            LogTail::Lines(lines) => lines.as_slice(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, LogTail::Missing)
    }
}

#[derive(Debug)]
pub struct ChangeLog {
    dir: PathBuf,
    /// Writer lock; holds the timestamp of the last entry written.
    writer: Mutex<Option<DateTime<Local>>>,
}

impl ChangeLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}{}", date.format(DATE_FORMAT), FILE_SUFFIX))
    }

    /// Append one change record to the file for its calendar date.
    ///
    /// Records are stamped when the event arrives, which can be before an
    /// entry written by another caller. Such a record is written with the
    /// later timestamp so times within a file never go backwards.
    pub fn append(&self, record: &ChangeRecord) -> io::Result<()> {
        let mut last = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let stamp = next_stamp(&mut last, record.timestamp);
        let entry = format_entry(stamp, &record.message(), Some(&record.path));
        self.write_entry(stamp.date_naive(), &entry)
    }

    /// Append a message-only entry stamped while holding the writer lock.
    pub fn append_message(&self, message: &str) -> io::Result<()> {
        let mut last = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let stamp = next_stamp(&mut last, Local::now());
        let entry = format_entry(stamp, message, None);
        self.write_entry(stamp.date_naive(), &entry)
    }

    fn write_entry(&self, date: NaiveDate, entry: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(date);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut buf = String::new();
        if file.metadata()?.len() == 0 {
            buf.push_str(&format!("# Changes for {}\n\n", date.format(DATE_FORMAT)));
        }
        buf.push_str(entry);
        file.write_all(buf.as_bytes())
    }

    /// Last `max_lines` lines of the given day's file.
    pub fn tail(&self, date: NaiveDate, max_lines: usize) -> io::Result<LogTail> {
        let content = match fs::read_to_string(self.path_for(date)) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LogTail::Missing),
            Err(err) => return Err(err),
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        Ok(LogTail::Lines(lines[start..].iter().map(|l| l.to_string()).collect()))
    }

    /// Headings of the last `count` entries of the day, newest first.
    pub fn recent_events(&self, date: NaiveDate, count: usize) -> io::Result<LogTail> {
        match self.tail(date, usize::MAX)? {
            LogTail::Missing => Ok(LogTail::Missing),
            LogTail::Lines(lines) => Ok(LogTail::Lines(
                lines
                    .into_iter()
                    .rev()
                    .filter(|l| l.starts_with("### "))
                    .take(count)
                    .collect(),
            )),
        }
    }

    /// Dates that currently have a log file, oldest first.
    pub fn list_dates(&self) -> io::Result<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self
            .log_files()?
            .into_iter()
            .filter_map(|path| parse_log_file_name(&path))
            .collect();
        dates.sort();
        Ok(dates)
    }

    /// Delete every date file last modified more than `retain_days` days ago,
    /// or all of them when `retain_days` is 0. Returns the number removed.
    pub fn prune(&self, retain_days: u32) -> io::Result<usize> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(u64::from(retain_days) * 86_400))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for path in self.log_files()? {
            if retain_days > 0 {
                let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(modified) => modified,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => return Err(err),
                };
                if modified >= cutoff {
                    continue;
                }
            }

            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }

        tracing::info!("Pruned {} change log file(s) from {}", removed, self.dir.display());
        Ok(removed)
    }

    /// Delete every date file.
    pub fn clear(&self) -> io::Result<usize> {
        self.prune(0)
    }

    fn log_files(&self) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && parse_log_file_name(path).is_some())
            .collect())
    }
}

/// Timestamp to write for an entry wanting `wanted`: never earlier than the
/// previous entry of the same day.
fn next_stamp(last: &mut Option<DateTime<Local>>, wanted: DateTime<Local>) -> DateTime<Local> {
    let stamp = match *last {
        Some(prev) if prev.date_naive() == wanted.date_naive() && prev > wanted => prev,
        _ => wanted,
    };
    *last = Some(stamp);
    stamp
}

/// Render one entry: heading, fields, trailing blank line.
pub fn format_entry(timestamp: DateTime<Local>, message: &str, file: Option<&Path>) -> String {
    let mut entry = format!("### {}\n", timestamp.format("%H:%M:%S"));
    entry.push_str(&format!("- **Event:** {}\n", message));
    if let Some(file) = file {
        entry.push_str(&format!("- **File:** `{}`\n", file.display()));
    }
    entry.push_str(&format!("- **Time:** {}\n\n", timestamp.format("%Y-%m-%d %H:%M:%S")));
    entry
}

/// Date encoded in a `<YYYY-MM-DD>_changes.md` file name.
pub fn parse_log_file_name(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}
