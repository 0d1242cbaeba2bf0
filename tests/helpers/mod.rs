#![allow(dead_code)]
pub mod fake_source;

use hostwatch::config::MonitorSettings;
use hostwatch::core::Mode;
use hostwatch::lock::LockOptions;
use std::path::Path;
use std::time::Duration;

/// Lock options with short polls so contention tests finish quickly.
pub fn fast_lock_options() -> LockOptions {
    LockOptions {
        poll_interval: Duration::from_millis(10),
        timeout_ticks: 10,
    }
}

/// Monitor settings writing to `output` with a short interval.
pub fn test_settings(output: &Path, mode: Mode, interval: Duration) -> MonitorSettings {
    MonitorSettings {
        mode,
        interval,
        output: output.to_path_buf(),
        user: "tester".to_string(),
        repos: "octo/one, octo/two".to_string(),
        max_entries: 1440,
        lock: fast_lock_options(),
    }
}
