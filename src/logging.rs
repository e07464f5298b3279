//! Structured iteration logging.
//!
//! Corresponds to the "Iteration Logger" leaf component (L9): a pluggable
//! writer strategy that appends [`LogEntry`] records in strict,
//! monotonically-increasing order. The default writer emits JSONL; an
//! alternative text writer is provided for human-readable console output.
//! Ordering is enforced by a per-run step counter, never by wall-clock time,
//! per the runtime's ordering invariants.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured log record.
///
/// `step_counter` is the monotonic per-run ordering key (starts at 1,
/// increments by 1); it is distinct from `timestamp`, which is advisory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub step_counter: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub step: Option<String>,
    pub correlation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Output layout for the iteration logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line (the default).
    Jsonl,
    /// Human-readable `[timestamp][LEVEL] message` lines.
    Text,
}

/// Writer strategy abstraction, so the logger can target a file, an
/// in-memory buffer (tests), or both.
pub trait LogWriter: Send + Sync {
    fn write_entry(&self, entry: &LogEntry, format: LogFormat);
}

/// Writes JSONL/text lines to a single append-only file.
pub struct FileWriter {
    file: Mutex<File>,
}

impl FileWriter {
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl LogWriter for FileWriter {
    fn write_entry(&self, entry: &LogEntry, format: LogFormat) {
        let line = match format {
            LogFormat::Jsonl => serde_json::to_string(entry).unwrap_or_default(),
            LogFormat::Text => format!(
                "[{}][{:?}] {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.level,
                entry.message
            ),
        };
        let mut f = self.file.lock();
        let _ = writeln!(f, "{line}");
    }
}

/// Collects entries in memory; used by tests and by callers who want to
/// inspect a run's log without touching disk.
#[derive(Default)]
pub struct MemoryWriter {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl LogWriter for MemoryWriter {
    fn write_entry(&self, entry: &LogEntry, _format: LogFormat) {
        self.entries.lock().push(entry.clone());
    }
}

/// Appends structured entries with a monotonic ordering counter.
///
/// A single `IterationLogger` is shared (read-mostly, append-only) for the
/// duration of one run; `log` is safe to call from multiple action handlers
/// running in parallel.
pub struct IterationLogger {
    correlation_id: Uuid,
    counter: AtomicU64,
    format: LogFormat,
    writer: Box<dyn LogWriter>,
    verbose: bool,
}

impl IterationLogger {
    pub fn new(writer: Box<dyn LogWriter>, format: LogFormat, verbose: bool) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            counter: AtomicU64::new(0),
            format,
            writer,
            verbose,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Append a log entry. Returns the assigned step counter.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, step: Option<&str>) -> u64 {
        self.log_with_metadata(level, message, step, None)
    }

    pub fn log_with_metadata(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        step: Option<&str>,
        metadata: Option<Value>,
    ) -> u64 {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = LogEntry {
            step_counter: n,
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step: step.map(str::to_string),
            correlation_id: self.correlation_id,
            metadata,
        };
        if self.verbose {
            match level {
                LogLevel::Debug => log::debug!("{}", entry.message),
                LogLevel::Info => log::info!("{}", entry.message),
                LogLevel::Warn => log::warn!("{}", entry.message),
                LogLevel::Error => log::error!("{}", entry.message),
            }
        }
        self.writer.write_entry(&entry, self.format);
        n
    }
}

/// Keeps only the `keep` most-recently-modified files matching `*.jsonl`
/// directly inside `dir`. Used to bound on-disk log growth per agent.
pub fn rotate_logs(dir: impl AsRef<Path>, keep: usize) -> std::io::Result<()> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "jsonl").unwrap_or(false))
        .collect();

    files.sort_by_key(|p| {
        fs::metadata(p)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    if files.len() > keep {
        let excess = files.len() - keep;
        for path in &files[..excess] {
            let _ = fs::remove_file(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Delegates to a shared `MemoryWriter` so a test can hold a handle to
    /// read entries after handing the logger its own `Box<dyn LogWriter>`.
    struct SharedWriter(std::sync::Arc<MemoryWriter>);

    impl LogWriter for SharedWriter {
        fn write_entry(&self, entry: &LogEntry, format: LogFormat) {
            self.0.write_entry(entry, format);
        }
    }

    #[test]
    fn step_counter_is_monotonic_starting_at_one() {
        let writer = std::sync::Arc::new(MemoryWriter::new());
        let logger = IterationLogger::new(Box::new(SharedWriter(writer.clone())), LogFormat::Jsonl, false);
        let a = logger.log(LogLevel::Info, "one", None);
        let b = logger.log(LogLevel::Info, "two", None);
        let c = logger.log(LogLevel::Info, "three", None);
        assert_eq!((a, b, c), (1, 2, 3));
        let entries = writer.entries();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn rotate_logs_keeps_only_n_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let p = dir.path().join(format!("{i}.jsonl"));
            std::fs::write(&p, "{}").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        rotate_logs(dir.path(), 2).unwrap();
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 2);
    }
}
