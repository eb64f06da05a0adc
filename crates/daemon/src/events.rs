//! Bounded event log shared between the processing pipeline and consumers.
//!
//! Every outcome the daemon produces (success, skip, failure) ends up here;
//! there is no separate error channel. The log is a fixed-capacity ring:
//! once full, the oldest entries are dropped. Consumers poll with
//! [`EventLog::entries_after`] using the last sequence number they saw.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default number of retained log entries.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Severity attached to a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// A single timestamped log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Monotonically increasing sequence number, unique within a process.
    pub seq: u64,
    /// Wall-clock time of the append, Unix milliseconds.
    pub timestamp_unix_ms: i64,
    pub level: LogLevel,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:5} {}",
            self.timestamp_unix_ms, self.level, self.message
        )
    }
}

struct LogInner {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

/// Thread-safe append-only log with bounded retention.
pub struct EventLog {
    capacity: usize,
    inner: Mutex<LogInner>,
}

impl EventLog {
    /// Create a log retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LogInner {
                entries: VecDeque::with_capacity(capacity.max(1)),
                next_seq: 0,
            }),
        }
    }

    /// Append an entry, evicting the oldest one if the log is full.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) {
        let mut inner = self.inner.lock().expect("event log lock poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(LogEntry {
            seq,
            timestamp_unix_ms: unix_timestamp_ms(),
            level,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.append(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.append(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.append(LogLevel::Error, message);
    }

    /// All currently retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let inner = self.inner.lock().expect("event log lock poisoned");
        inner.entries.iter().cloned().collect()
    }

    /// Entries with a sequence number strictly greater than `seq`.
    ///
    /// Pass `None` on the first poll to receive everything retained.
    pub fn entries_after(&self, seq: Option<u64>) -> Vec<LogEntry> {
        let inner = self.inner.lock().expect("event log lock poisoned");
        match seq {
            None => inner.entries.iter().cloned().collect(),
            Some(seq) => inner
                .entries
                .iter()
                .filter(|e| e.seq > seq)
                .cloned()
                .collect(),
        }
    }

    /// Retained entry count.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("event log lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Get current timestamp in milliseconds
fn unix_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
