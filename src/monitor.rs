//! The monitor loop.
//!
//! Initializes the store, then repeatedly builds an entry, appends it and
//! sleeps for the configured interval until shutdown is requested. Shutdown
//! is observed while sleeping and while waiting for the file lock; an
//! append that already holds the lock always runs to completion.

use crate::config::MonitorSettings;
use crate::context::build_github_context;
use crate::core::{Entry, GithubContext, Mode, MetricsSource};
use crate::shutdown;
use crate::store::{BoundedArrayStore, InitOutcome};
use anyhow::Result;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// What happened during one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The entry was written; the array now holds `entries` elements.
    Appended { entries: usize },
    /// Shutdown was requested before the lock was acquired; nothing was written.
    Cancelled,
}

pub struct Monitor {
    settings: MonitorSettings,
    source: Arc<dyn MetricsSource>,
    store: BoundedArrayStore,
    github_context: GithubContext,
}

impl Monitor {
    pub fn new(settings: MonitorSettings, source: Arc<dyn MetricsSource>) -> Self {
        let store = BoundedArrayStore::new(&settings.output, settings.max_entries, settings.lock);
        let github_context = build_github_context(&settings.repos, &settings.user);
        Self {
            settings,
            source,
            store,
            github_context,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn store(&self) -> &BoundedArrayStore {
        &self.store
    }

    /// Runs until shutdown is requested.
    pub async fn run(&self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        self.run_cycles(None, shutdown_rx).await.map(|_| ())
    }

    /// Runs until shutdown is requested or `max_cycles` entries have been
    /// appended. Returns the number of appended entries.
    pub async fn run_cycles(
        &self,
        max_cycles: Option<u64>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<u64> {
        match self.store.initialize_or_validate()? {
            InitOutcome::Created => {}
            InitOutcome::Valid { entries } => info!(
                "Resuming {} with {} existing entries",
                self.store.path().display(),
                entries
            ),
            InitOutcome::Recovered { backup } => warn!(
                "Previous contents of {} preserved in {}",
                self.store.path().display(),
                backup.display()
            ),
        }
        info!("Current statistics: {}", self.store.stats());
        info!(
            "Collecting {} metrics every {:?} into {}",
            self.settings.mode,
            self.settings.interval,
            self.store.path().display()
        );

        let mut completed = 0u64;
        loop {
            if shutdown::is_requested(&shutdown_rx) {
                break;
            }

            match self.collect_once(&mut shutdown_rx).await? {
                CycleOutcome::Appended { .. } => completed += 1,
                CycleOutcome::Cancelled => break,
            }
            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown::requested(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        info!(
            "Monitor stopping after {} cycle(s). Final statistics: {}",
            completed,
            self.store.stats()
        );
        Ok(completed)
    }

    /// Runs one collection cycle: sample, then append under the lock.
    pub async fn collect_once(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome> {
        let entry = self.sample().await?;

        match self.store.append(&entry, shutdown_rx).await {
            Ok(entries) => {
                if self.settings.mode == Mode::Minimal {
                    info!("{}", progress_line(&entry, entries));
                } else {
                    debug!("Appended {} entry, {} stored", self.settings.mode, entries);
                }
                Ok(CycleOutcome::Appended { entries })
            }
            Err(e) if e.is_cancelled() => {
                info!("Shutdown requested while waiting for the lock, entry discarded");
                Ok(CycleOutcome::Cancelled)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Samplers block on OS reads, so they run off the async thread.
    async fn sample(&self) -> Result<Entry> {
        let source = Arc::clone(&self.source);
        let mode = self.settings.mode;
        let github_context = self.github_context.clone();
        let entry = tokio::task::spawn_blocking(move || {
            crate::build_entry(mode, source.as_ref(), &github_context)
        })
        .await?;
        Ok(entry)
    }
}

/// One-line summary of a minimal-mode entry.
pub fn progress_line(entry: &Entry, stored: usize) -> String {
    let cpu = entry
        .system
        .cpu
        .as_ref()
        .map(|cpu| format!("{:.2}%", cpu.current_usage.usage_percent))
        .unwrap_or_else(|| "n/a".to_string());
    let memory = entry
        .system
        .memory
        .as_ref()
        .map(|memory| format!("{:.2}%", memory.usage_percent))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "[{}] CPU: {}, Memory: {} ({} entries stored)",
        entry.timestamp, cpu, memory, stored
    )
}
