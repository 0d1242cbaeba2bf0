mod helpers;

use helpers::{fake_source::FakeMetricsSource, test_settings};
use hostwatch::monitor::{CycleOutcome, Monitor};
use hostwatch::{shutdown, Mode};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn read_array(path: &Path) -> Vec<Value> {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_bounded_run_appends_one_entry_per_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    let settings = test_settings(&output, Mode::Minimal, Duration::from_millis(5));
    let monitor = Monitor::new(settings, Arc::new(FakeMetricsSource::new()));
    let (_tx, rx) = shutdown::channel();

    let cycles = monitor.run_cycles(Some(3), rx).await.unwrap();

    assert_eq!(cycles, 3);
    let entries = read_array(&output);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["github_context"]["user"], "tester");
    assert_eq!(
        entries[0]["github_context"]["repositories"][1]["url"],
        "https://github.com/octo/two"
    );
    assert!(entries[2]["system"].get("top_processes").is_none());
    assert!(!monitor.store().lock_path().exists());
}

#[tokio::test]
async fn test_extended_mode_entries() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    let settings = test_settings(&output, Mode::Extended, Duration::from_millis(5));
    let monitor = Monitor::new(settings, Arc::new(FakeMetricsSource::new()));
    let (_tx, rx) = shutdown::channel();

    monitor.run_cycles(Some(1), rx).await.unwrap();

    let entries = read_array(&output);
    assert_eq!(entries[0]["system"]["info"]["hostname"], "runner-1");
    assert_eq!(entries[0]["system"]["network"][0]["interface"], "eth0");
    assert_eq!(entries[0]["system"]["top_processes"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_run_respects_max_entries() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    let mut settings = test_settings(&output, Mode::Minimal, Duration::from_millis(1));
    settings.max_entries = 2;
    let monitor = Monitor::new(settings, Arc::new(FakeMetricsSource::new()));
    let (_tx, rx) = shutdown::channel();

    monitor.run_cycles(Some(5), rx).await.unwrap();
    assert_eq!(read_array(&output).len(), 2);
}

#[tokio::test]
async fn test_shutdown_interrupts_sleep() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    // An hour between cycles: only an interruptible sleep lets this finish.
    let settings = test_settings(&output, Mode::Minimal, Duration::from_secs(3600));
    let monitor = Arc::new(Monitor::new(settings, Arc::new(FakeMetricsSource::new())));
    let (tx, rx) = shutdown::channel();

    let handle = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.run(rx).await })
    };

    // Wait for the first entry to land.
    timeout(Duration::from_secs(5), async {
        while !output.exists() || read_array(&output).is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first cycle should complete");

    tx.send(true).unwrap();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("monitor must stop promptly")
        .unwrap()
        .unwrap();

    assert_eq!(read_array(&output).len(), 1);
    assert!(!monitor.store().lock_path().exists());
}

#[tokio::test]
async fn test_shutdown_before_start_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    let settings = test_settings(&output, Mode::Minimal, Duration::from_millis(1));
    let monitor = Monitor::new(settings, Arc::new(FakeMetricsSource::new()));
    let (tx, rx) = shutdown::channel();
    tx.send(true).unwrap();

    let cycles = monitor.run_cycles(None, rx).await.unwrap();
    assert_eq!(cycles, 0);
    assert!(read_array(&output).is_empty(), "store is still initialized");
}

#[tokio::test]
async fn test_cycle_cancelled_while_waiting_for_lock() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    let mut settings = test_settings(&output, Mode::Minimal, Duration::from_millis(1));
    settings.lock.timeout_ticks = 1_000;
    let monitor = Monitor::new(settings, Arc::new(FakeMetricsSource::new()));
    monitor.store().initialize_or_validate().unwrap();
    fs::write(monitor.store().lock_path(), "424242\n").unwrap();

    let (tx, mut rx) = shutdown::channel();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tx
    });

    let outcome = timeout(Duration::from_secs(2), monitor.collect_once(&mut rx))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert!(read_array(&output).is_empty());
    let _tx = stopper.await.unwrap();
}

#[tokio::test]
async fn test_resumes_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    fs::write(&output, r#"[{"timestamp": "2024-01-01 00:00:00"}]"#).unwrap();
    let settings = test_settings(&output, Mode::Minimal, Duration::from_millis(1));
    let monitor = Monitor::new(settings, Arc::new(FakeMetricsSource::new()));
    let (_tx, rx) = shutdown::channel();

    monitor.run_cycles(Some(1), rx).await.unwrap();

    let entries = read_array(&output);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["timestamp"], "2024-01-01 00:00:00");
}

#[tokio::test]
async fn test_store_io_failure_stops_the_loop_with_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("metrics.json");
    // A directory where the array file should be cannot be read or replaced.
    fs::create_dir(&output).unwrap();
    let settings = test_settings(&output, Mode::Minimal, Duration::from_millis(1));
    let monitor = Monitor::new(settings, Arc::new(FakeMetricsSource::new()));
    let (_tx, mut rx) = shutdown::channel();

    assert!(monitor.collect_once(&mut rx).await.is_err());
    assert!(!monitor.store().lock_path().exists());

    let result = timeout(Duration::from_secs(5), monitor.run_cycles(Some(3), rx))
        .await
        .expect("a fatal store error must end the run");
    assert!(result.is_err());
    assert!(output.is_dir());
}
