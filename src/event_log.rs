use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Maximum number of entries kept; the oldest are dropped first.
pub const LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Append-only diagnostic sink shared by delivery workers.
pub trait LogSink: Send + Sync {
    fn append(&self, level: LogLevel, message: &str, details: Option<&str>);
}

/// Bounded, newest-first event log.
///
/// Appends are serialized through a mutex so concurrent workers never lose
/// entries. When opened with a path every append rewrites the JSON file;
/// persistence failures are reported through `log` and otherwise ignored.
///
/// The rewrite is a blocking write of at most [`LOG_CAPACITY`] small entries,
/// made while the lock is held so the file never goes back to an older
/// snapshot. Appends only happen once per delivery outcome or attempt, so
/// the write stays off the hot path of the runtime.
pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    path: Option<PathBuf>,
}

impl EventLog {
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(LOG_CAPACITY)),
            path: None,
        }
    }

    /// Open a persisted log, loading any entries already on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not load event log {}: {e}", path.display());
                VecDeque::new()
            }
        };
        entries.truncate(LOG_CAPACITY);

        Self {
            entries: Mutex::new(entries),
            path: Some(path),
        }
    }

    fn load(path: &Path) -> anyhow::Result<VecDeque<LogEntry>> {
        if !path.exists() {
            return Ok(VecDeque::new());
        }
        let content = std::fs::read_to_string(path)?;
        let entries: VecDeque<LogEntry> = serde_json::from_str(&content)?;
        Ok(entries)
    }

    fn persist(&self, entries: &VecDeque<LogEntry>) {
        let Some(path) = &self.path else {
            return;
        };
        let result = (|| -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, serde_json::to_string(entries)?)?;
            Ok(())
        })();
        if let Err(e) = result {
            log::warn!("Failed to persist event log to {}: {e}", path.display());
        }
    }

    // A worker that panicked mid-append leaves a complete deque behind
    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Snapshot of all entries, newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.clear();
        self.persist(&entries);
    }

    pub fn count_level(&self, level: LogLevel) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.level == level)
            .count()
    }
}

impl LogSink for EventLog {
    fn append(&self, level: LogLevel, message: &str, details: Option<&str>) {
        match (level, details) {
            (LogLevel::Error, Some(d)) => log::error!("{message}: {d}"),
            (LogLevel::Error, None) => log::error!("{message}"),
            (LogLevel::Warning, Some(d)) => log::warn!("{message}: {d}"),
            (LogLevel::Warning, None) => log::warn!("{message}"),
            (LogLevel::Info, Some(d)) => log::info!("{message}: {d}"),
            (LogLevel::Info, None) => log::info!("{message}"),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            details: details.map(|d| d.to_string()),
        };

        let mut entries = self.lock();
        entries.push_front(entry);
        entries.truncate(LOG_CAPACITY);
        self.persist(&entries);
    }
}

/// Human-readable timestamp used by `--show-logs`.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%b %d, %Y %H:%M:%S").to_string()
}
