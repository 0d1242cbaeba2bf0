//! Advisory file lock guarding the output file.
//!
//! The lock is a sidecar file (`<output>.lock`) whose existence signals
//! ownership. It is created atomically, holds the owner's pid for
//! diagnostics only, and is removed when the [`FileLock`] guard is released
//! or dropped. A lock that is still present after the timeout is treated as
//! stale and taken over, trading strict safety for liveness.

use crate::config::LockConfig;
use crate::shutdown;
use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("lock acquisition cancelled due to shutdown")]
    Cancelled,
}

/// Polling parameters for [`FileLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Delay between two existence checks.
    pub poll_interval: Duration,
    /// Number of polls before a held lock is considered stale.
    pub timeout_ticks: u32,
}

impl LockOptions {
    /// Total time waited before a lock is stolen.
    pub fn timeout(&self) -> Duration {
        self.poll_interval * self.timeout_ticks
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout_ticks: 10,
        }
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout_ticks: config.timeout_ticks,
        }
    }
}

/// Returns the sidecar lock path for an output file: `<output>.lock`.
pub fn lock_path_for(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// An acquired lock. Dropping it removes the lock file.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    held: bool,
}

impl FileLock {
    /// Acquires the lock at `path`.
    ///
    /// Polls every `options.poll_interval` for up to `options.timeout_ticks`
    /// polls. If the lock is still held afterwards it is forcibly removed and
    /// taken over. Returns `LockError::Cancelled` if shutdown is requested
    /// while waiting.
    pub async fn acquire(
        path: impl Into<PathBuf>,
        options: &LockOptions,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<Self, LockError> {
        let path = path.into();

        for tick in 0..options.timeout_ticks {
            if shutdown::is_requested(shutdown_rx) {
                return Err(LockError::Cancelled);
            }
            if try_create(&path)? {
                debug!("Acquired lock {} after {} polls", path.display(), tick);
                return Ok(Self { path, held: true });
            }
            tokio::select! {
                biased;
                _ = shutdown::requested(shutdown_rx) => return Err(LockError::Cancelled),
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
        }

        if shutdown::is_requested(shutdown_rx) {
            return Err(LockError::Cancelled);
        }
        if try_create(&path)? {
            return Ok(Self { path, held: true });
        }

        warn!(
            "Lock {} still held after {:?}, removing stale lock",
            path.display(),
            options.timeout()
        );
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(LockError::Io { path, source }),
        }
        write_owner(&path, OpenOptions::new().write(true).create(true).truncate(true))?;
        Ok(Self { path, held: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock, reporting a failure to remove the lock file.
    pub fn release(mut self) -> Result<(), LockError> {
        self.held = false;
        remove_lock_file(&self.path)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = remove_lock_file(&self.path) {
                warn!("Failed to release lock: {}", e);
            }
        }
    }
}

/// Atomically creates the lock file. Returns false if it already exists.
fn try_create(path: &Path) -> Result<bool, LockError> {
    match write_owner(path, OpenOptions::new().write(true).create_new(true)) {
        Ok(()) => Ok(true),
        Err(LockError::Io { source, .. }) if source.kind() == io::ErrorKind::AlreadyExists => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn write_owner(path: &Path, options: &OpenOptions) -> Result<(), LockError> {
    let file = options.open(path).map_err(|source| LockError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    record_owner(path, file)
}

/// Writes our pid into a freshly opened lock file. On failure the file is
/// removed so no ownerless lock is left behind.
fn record_owner(path: &Path, mut file: impl Write) -> Result<(), LockError> {
    match writeln!(file, "{}", std::process::id()).and_then(|_| file.flush()) {
        Ok(()) => Ok(()),
        Err(source) => {
            drop(file);
            if let Err(e) = fs::remove_file(path) {
                warn!("Failed to remove unwritten lock {}: {}", path.display(), e);
            }
            Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

fn remove_lock_file(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Someone stole and released it already.
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LockError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
