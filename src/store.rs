//! The bounded JSON array store.
//!
//! The output file always holds one JSON array. Appends run under the
//! sidecar [`FileLock`], keep only the newest `max_entries` elements, and are
//! written to a temporary sibling that is renamed over the target, so a
//! reader never observes a partially written array. A file that does not
//! parse as an array is moved aside to `<path>.backup.<unixtime>` before it
//! is replaced.

use crate::lock::{lock_path_for, FileLock, LockError, LockOptions};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;

/// Default cap on the number of entries: one day of one-minute samples.
pub const DEFAULT_MAX_ENTRIES: usize = 1440;

const CPU_USAGE_POINTER: &str = "/system/cpu/current_usage/usage_percent";
const MEMORY_USAGE_POINTER: &str = "/system/memory/usage_percent";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize entries: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StoreError {
    /// True if the operation was abandoned because shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Lock(LockError::Cancelled))
    }

    fn io(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result of [`BoundedArrayStore::initialize_or_validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// No file existed; an empty array was written.
    Created,
    /// The file already held a valid array and was left untouched.
    Valid { entries: usize },
    /// The file was corrupt; it was moved to `backup` and reset.
    Recovered { backup: PathBuf },
}

/// Summary of the stored entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Stats {
    Empty,
    Summary(StatsSummary),
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_entries: usize,
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub avg_cpu: f64,
    pub avg_memory: f64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stats::Empty => f.write_str("no data collected yet"),
            Stats::Summary(s) => write!(
                f,
                "{} entries from {} to {}, avg CPU {:.2}%, avg memory {:.2}%",
                s.total_entries, s.first_timestamp, s.last_timestamp, s.avg_cpu, s.avg_memory
            ),
            Stats::Unavailable { reason } => {
                write!(f, "unable to calculate statistics: {}", reason)
            }
        }
    }
}

enum ArrayState {
    Missing,
    Valid(Vec<Value>),
    Corrupt(String),
}

/// A capacity limited JSON array persisted at `path`.
#[derive(Debug, Clone)]
pub struct BoundedArrayStore {
    path: PathBuf,
    lock_path: PathBuf,
    max_entries: usize,
    lock_options: LockOptions,
}

impl BoundedArrayStore {
    /// Creates a store for `path`. A cap of zero is raised to one.
    pub fn new(path: impl Into<PathBuf>, max_entries: usize, lock_options: LockOptions) -> Self {
        let path = path.into();
        Self {
            lock_path: lock_path_for(&path),
            path,
            max_entries: max_entries.max(1),
            lock_options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Creates the file as `[]` if absent, or checks that it holds an array.
    ///
    /// A valid file is not rewritten. A corrupt one is renamed to a
    /// timestamped backup and reset to `[]`.
    pub fn initialize_or_validate(&self) -> Result<InitOutcome, StoreError> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(dir).map_err(StoreError::io(dir))?;

        match read_array(&self.path)? {
            ArrayState::Missing => {
                self.write_atomic(&[])?;
                info!("Initialized empty metrics file {}", self.path.display());
                Ok(InitOutcome::Created)
            }
            ArrayState::Valid(entries) => Ok(InitOutcome::Valid {
                entries: entries.len(),
            }),
            ArrayState::Corrupt(reason) => {
                let backup = backup_corrupt(&self.path)?;
                warn!(
                    "Metrics file {} is not a valid JSON array ({}); moved to {} and reinitialized",
                    self.path.display(),
                    reason,
                    backup.display()
                );
                self.write_atomic(&[])?;
                Ok(InitOutcome::Recovered { backup })
            }
        }
    }

    /// Appends one entry under the file lock and returns the new length.
    ///
    /// Only the newest `max_entries` elements are kept.
    pub async fn append<T: Serialize + ?Sized>(
        &self,
        entry: &T,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<usize, StoreError> {
        let value = serde_json::to_value(entry)?;
        let lock = FileLock::acquire(&self.lock_path, &self.lock_options, shutdown_rx).await?;

        let mut entries = self.read_for_update()?;
        entries.push(value);
        self.commit(lock, entries)
    }

    /// Replaces the whole array under the file lock and returns the stored length.
    ///
    /// The newest `max_entries` elements of `entries` are kept.
    pub async fn replace(
        &self,
        entries: Vec<Value>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<usize, StoreError> {
        let lock = FileLock::acquire(&self.lock_path, &self.lock_options, shutdown_rx).await?;
        self.commit(lock, entries)
    }

    /// Trims and atomically writes `entries` while `lock` is held, then
    /// releases it. On error the guard removes the lock when dropped.
    fn commit(&self, lock: FileLock, mut entries: Vec<Value>) -> Result<usize, StoreError> {
        trim_to_capacity(&mut entries, self.max_entries);
        self.write_atomic(&entries)?;
        debug!(
            "Wrote {} entries to {} under {}",
            entries.len(),
            self.path.display(),
            lock.path().display()
        );

        if let Err(e) = lock.release() {
            warn!("{}", e);
        }
        Ok(entries.len())
    }

    /// Reads the stored array. A missing file reads as empty.
    pub fn read_entries(&self) -> Result<Vec<Value>, StoreError> {
        match read_array(&self.path)? {
            ArrayState::Missing => Ok(Vec::new()),
            ArrayState::Valid(entries) => Ok(entries),
            ArrayState::Corrupt(reason) => Err(StoreError::Io {
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, reason),
            }),
        }
    }

    /// Summarizes the stored entries without modifying anything.
    pub fn stats(&self) -> Stats {
        match self.read_entries() {
            Ok(entries) => compute_stats(&entries),
            Err(e) => Stats::Unavailable {
                reason: e.to_string(),
            },
        }
    }

    /// Reads the array inside the critical section. A file that became
    /// corrupt since startup is backed up rather than overwritten.
    fn read_for_update(&self) -> Result<Vec<Value>, StoreError> {
        match read_array(&self.path)? {
            ArrayState::Missing => Ok(Vec::new()),
            ArrayState::Valid(entries) => Ok(entries),
            ArrayState::Corrupt(reason) => {
                let backup = backup_corrupt(&self.path)?;
                warn!(
                    "Metrics file {} became corrupt ({}); moved to {} and starting a new array",
                    self.path.display(),
                    reason,
                    backup.display()
                );
                Ok(Vec::new())
            }
        }
    }

    fn write_atomic(&self, entries: &[Value]) -> Result<(), StoreError> {
        let dir = parent_dir(&self.path);
        let mut tmp = tempfile::Builder::new()
            .prefix(".hostwatch-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(StoreError::io(dir))?;

        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, entries)?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(StoreError::io(&self.path))?;
        }
        tmp.as_file().sync_all().map_err(StoreError::io(&self.path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644))
                .map_err(StoreError::io(&self.path))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path)(e.error))?;
        Ok(())
    }
}

/// Drops the oldest elements so at most `max_entries` remain.
pub fn trim_to_capacity(entries: &mut Vec<Value>, max_entries: usize) {
    if entries.len() > max_entries {
        let excess = entries.len() - max_entries;
        entries.drain(..excess);
    }
}

/// Averages the minimal-mode CPU and memory percentages.
///
/// Every entry must carry both values; otherwise the statistics are
/// reported as unavailable.
pub fn compute_stats(entries: &[Value]) -> Stats {
    let (first, last) = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Stats::Empty,
    };

    let timestamp = |entry: &Value| entry.get("timestamp").and_then(Value::as_str).map(String::from);
    let (first_timestamp, last_timestamp) = match (timestamp(first), timestamp(last)) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Stats::Unavailable {
                reason: "entry without a timestamp".to_string(),
            }
        }
    };

    let mut cpu_total = 0.0;
    let mut memory_total = 0.0;
    for (index, entry) in entries.iter().enumerate() {
        let cpu = entry.pointer(CPU_USAGE_POINTER).and_then(Value::as_f64);
        let memory = entry.pointer(MEMORY_USAGE_POINTER).and_then(Value::as_f64);
        match (cpu, memory) {
            (Some(cpu), Some(memory)) => {
                cpu_total += cpu;
                memory_total += memory;
            }
            _ => {
                return Stats::Unavailable {
                    reason: format!("entry {} has no cpu/memory usage", index),
                }
            }
        }
    }

    let count = entries.len() as f64;
    Stats::Summary(StatsSummary {
        total_entries: entries.len(),
        first_timestamp,
        last_timestamp,
        avg_cpu: cpu_total / count,
        avg_memory: memory_total / count,
    })
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn read_array(path: &Path) -> Result<ArrayState, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ArrayState::Missing),
        Err(e) => return Err(StoreError::io(path)(e)),
    };

    Ok(match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(entries)) => ArrayState::Valid(entries),
        Ok(other) => ArrayState::Corrupt(format!("top-level value is {}", json_kind(&other))),
        Err(e) => ArrayState::Corrupt(e.to_string()),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Renames a corrupt file to `<path>.backup.<unixtime>`, never clobbering
/// an earlier backup.
fn backup_corrupt(path: &Path) -> Result<PathBuf, StoreError> {
    let stamp = chrono::Utc::now().timestamp();
    let base = format!("{}.backup.{}", path.display(), stamp);
    let mut backup = PathBuf::from(&base);
    let mut attempt = 1;
    while backup.exists() {
        backup = PathBuf::from(format!("{}.{}", base, attempt));
        attempt += 1;
    }
    fs::rename(path, &backup).map_err(StoreError::io(path))?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_entry(timestamp: &str, cpu: f64, memory: f64) -> Value {
        json!({
            "timestamp": timestamp,
            "github_context": {"user": "ci", "repositories": []},
            "system": {
                "cpu": {"current_usage": {"usage_percent": cpu}},
                "memory": {"usage_percent": memory},
                "disk": []
            }
        })
    }

    #[test]
    fn test_trim_keeps_newest_in_order() {
        let mut entries: Vec<Value> = (0..7).map(|i| json!(i)).collect();
        trim_to_capacity(&mut entries, 3);
        assert_eq!(entries, vec![json!(4), json!(5), json!(6)]);

        trim_to_capacity(&mut entries, 10);
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(compute_stats(&[]), Stats::Empty);
        assert_eq!(compute_stats(&[]).to_string(), "no data collected yet");
    }

    #[test]
    fn test_stats_averages() {
        let entries = vec![
            minimal_entry("2024-01-01 00:00:00", 10.0, 40.0),
            minimal_entry("2024-01-01 00:01:00", 20.0, 50.0),
            minimal_entry("2024-01-01 00:02:00", 30.0, 60.0),
        ];
        match compute_stats(&entries) {
            Stats::Summary(summary) => {
                assert_eq!(summary.total_entries, 3);
                assert_eq!(summary.avg_cpu, 20.0);
                assert_eq!(summary.avg_memory, 50.0);
                assert_eq!(summary.first_timestamp, "2024-01-01 00:00:00");
                assert_eq!(summary.last_timestamp, "2024-01-01 00:02:00");
            }
            other => panic!("unexpected stats: {:?}", other),
        }
    }

    #[test]
    fn test_stats_unavailable_for_foreign_shape() {
        let entries = vec![
            minimal_entry("2024-01-01 00:00:00", 10.0, 40.0),
            json!({"timestamp": "2024-01-01 00:01:00", "system": {"cpu": null}}),
        ];
        let stats = compute_stats(&entries);
        assert!(matches!(stats, Stats::Unavailable { .. }));
        assert!(stats.to_string().starts_with("unable to calculate"));
    }

    #[test]
    fn test_stats_unavailable_without_timestamp() {
        let stats = compute_stats(&[json!(1)]);
        assert!(matches!(stats, Stats::Unavailable { .. }));
    }
}
