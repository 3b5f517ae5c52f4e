//! crates/mood_journal_core/src/store.rs
//!
//! The journal state store: the single writer for entries, moods, settings, eras
//! and reports.
//!
//! Mutations apply synchronously to the in-memory `JournalState` and bump a revision
//! counter. A single background writer task watches that counter and serializes the
//! *current* state to the device, so bursts coalesce into one write and a write never
//! carries an older snapshot than the one before it. Persist failures are logged and
//! surfaced as a dismissible `Notice`; the in-memory state stays authoritative.
//!
//! Nothing is written until the saved snapshot has been read. If the device fails
//! the startup read, every later persist retries it first and folds the restored
//! data under the changes made since. A snapshot this build cannot parse is copied
//! to `UNREADABLE_SNAPSHOT_KEY` before it is ever overwritten.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{
    Entry, EntryDraft, EntryId, Era, EraSpan, MonthKey, MonthlyReport, MoodSample, MoodScore,
    Settings, SettingsPatch,
};
use crate::ports::{DeviceStore, PortError, PortResult};
use crate::state::JournalState;

/// Device key holding the serialized snapshot.
pub const SNAPSHOT_KEY: &str = "journal/state";

/// Device key that keeps the last snapshot this build could not parse.
pub const UNREADABLE_SNAPSHOT_KEY: &str = "journal/state.unreadable";

/// A transient, dismissible message for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    PersistFailed { message: String },
    RestoreFailed { message: String },
    ClassificationUnavailable { message: String },
}

pub struct JournalStore {
    state: RwLock<JournalState>,
    device: Arc<dyn DeviceStore>,
    // False until the saved snapshot has been read or found absent.
    restored: AtomicBool,
    revision: watch::Sender<u64>,
    notices: watch::Sender<Option<Notice>>,
    // Serializes snapshot writes between the writer task and `flush`.
    write_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,
}

//=========================================================================================
// Lifecycle
//=========================================================================================

impl JournalStore {
    /// Rehydrates from the device and starts the background writer.
    ///
    /// Missing, unparseable or unreachable snapshots never prevent startup; the
    /// store starts empty instead.
    pub async fn create(device: Arc<dyn DeviceStore>) -> Arc<Self> {
        let (state, restored, failure) = match Self::restore(device.as_ref()).await {
            Ok(Some(state)) => {
                info!("Restored journal snapshot with {} entries.", state.entries().len());
                (state, true, None)
            }
            Ok(None) => (JournalState::default(), true, None),
            Err(e) => {
                warn!("Failed to read journal snapshot, deferring restore: {}", e);
                (JournalState::default(), false, Some(e))
            }
        };
        let (revision, revision_rx) = watch::channel(0u64);
        let (notices, _) = watch::channel(failure.map(|e| Notice::RestoreFailed {
            message: e.to_string(),
        }));

        let store = Arc::new(Self {
            state: RwLock::new(state),
            device,
            restored: AtomicBool::new(restored),
            revision,
            notices,
            write_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            writer: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::write_loop(
            Arc::downgrade(&store),
            revision_rx,
            store.shutdown.clone(),
        ));
        *store.writer.lock() = Some(handle);
        store
    }

    /// Stops the writer and performs a final flush.
    pub async fn dispose(&self) {
        self.shutdown.cancel();
        let handle = self.writer.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Journal writer task ended abnormally: {}", e);
            }
        }
        if self.persist().await.is_ok() {
            info!("Journal store disposed.");
        }
    }

    /// Persists the current state immediately.
    pub async fn flush(&self) -> PortResult<()> {
        self.persist().await
    }

    /// Reads the saved snapshot. `Ok(None)` means there is nothing to restore.
    async fn restore(device: &dyn DeviceStore) -> PortResult<Option<JournalState>> {
        let Some(bytes) = device.get(SNAPSHOT_KEY).await? else {
            debug!("No journal snapshot found, starting empty.");
            return Ok(None);
        };
        match JournalState::from_json(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(
                    "Setting aside unreadable journal snapshot under {}: {}",
                    UNREADABLE_SNAPSHOT_KEY, e
                );
                device.set(UNREADABLE_SNAPSHOT_KEY, &bytes).await?;
                Ok(None)
            }
        }
    }

    // Retries a restore that failed at startup. Writes stay blocked until it succeeds.
    async fn ensure_restored(&self) -> PortResult<()> {
        if self.restored.load(Ordering::Acquire) {
            return Ok(());
        }
        match Self::restore(self.device.as_ref()).await {
            Ok(saved) => {
                if let Some(saved) = saved {
                    info!(
                        "Restored {} saved entries after a failed startup read.",
                        saved.entries().len()
                    );
                    self.state.write().absorb_restored(saved);
                }
                self.restored.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                error!("Journal snapshot is still unreadable, not persisting: {}", e);
                self.notify(Notice::RestoreFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn write_loop(
        store: Weak<Self>,
        mut revision_rx: watch::Receiver<u64>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = revision_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let Some(store) = store.upgrade() else { break };
                    // Failures are logged and published by `persist`.
                    let _ = store.persist().await;
                }
            }
        }
        debug!("Journal writer task stopped.");
    }

    async fn persist(&self) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_restored().await?;
        let encoded = {
            let state = self.state.read();
            state.to_json()
        };
        let result = match encoded {
            Ok(bytes) => self.device.set(SNAPSHOT_KEY, &bytes).await,
            Err(e) => Err(PortError::Unexpected(e.to_string())),
        };
        if let Err(e) = &result {
            error!("Failed to persist journal snapshot: {}", e);
            self.notify(Notice::PersistFailed {
                message: e.to_string(),
            });
        }
        result
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut JournalState) -> R) -> R {
        let out = {
            let mut state = self.state.write();
            f(&mut *state)
        };
        self.revision.send_modify(|rev| *rev += 1);
        out
    }
}

//=========================================================================================
// Mutations
//=========================================================================================

impl JournalStore {
    pub fn add_entry(&self, draft: EntryDraft) -> Entry {
        self.mutate(|s| s.add_entry(draft, Utc::now()))
    }

    /// Removes an entry if present. Unknown ids are a no-op.
    pub fn remove_entry(&self, id: EntryId) -> bool {
        self.mutate(|s| s.remove_entry(id))
    }

    pub fn set_settings(&self, patch: SettingsPatch) -> Settings {
        self.mutate(|s| s.set_settings(patch))
    }

    pub fn set_mood(&self, date: NaiveDate, score: MoodScore) {
        self.mutate(|s| s.set_mood(date, score))
    }

    /// Replaces the eras. `generated_at` is the newest entry time they cover.
    pub fn set_eras(&self, spans: Vec<EraSpan>, generated_at: DateTime<Utc>) {
        self.mutate(|s| s.set_eras(spans, generated_at))
    }

    pub fn add_eras(&self, spans: Vec<EraSpan>, generated_at: DateTime<Utc>) {
        self.mutate(|s| s.add_eras(spans, generated_at))
    }

    pub fn toggle_era_expanded(&self, index: usize) -> Option<bool> {
        self.mutate(|s| s.toggle_era_expanded(index))
    }

    pub fn add_monthly_report(&self, month: MonthKey, report: MonthlyReport) {
        self.mutate(|s| s.add_monthly_report(month, report))
    }
}

//=========================================================================================
// Reads
//=========================================================================================

impl JournalStore {
    /// Runs `f` against the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&JournalState) -> R) -> R {
        f(&*self.state.read())
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.read(|s| s.entries().to_vec())
    }

    pub fn entry(&self, id: EntryId) -> Option<Entry> {
        self.read(|s| s.entry(id).cloned())
    }

    pub fn moods(&self) -> Vec<MoodSample> {
        self.read(|s| s.moods().to_vec())
    }

    pub fn settings(&self) -> Settings {
        self.read(|s| s.settings().clone())
    }

    pub fn eras(&self) -> Vec<Era> {
        self.read(|s| s.eras().to_vec())
    }

    pub fn eras_generated_at(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.eras_generated_at())
    }

    pub fn monthly_report(&self, month: MonthKey) -> Option<MonthlyReport> {
        self.read(|s| s.monthly_report(month).cloned())
    }
}

//=========================================================================================
// Notices
//=========================================================================================

impl JournalStore {
    pub fn notify(&self, notice: Notice) {
        self.notices.send_replace(Some(notice));
    }

    pub fn latest_notice(&self) -> Option<Notice> {
        self.notices.borrow().clone()
    }

    pub fn dismiss_notice(&self) {
        self.notices.send_replace(None);
    }

    pub fn subscribe_notices(&self) -> watch::Receiver<Option<Notice>> {
        self.notices.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Theme;
    use crate::ports::InMemoryDeviceStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct BrokenDeviceStore;

    #[async_trait]
    impl DeviceStore for BrokenDeviceStore {
        async fn get(&self, _key: &str) -> PortResult<Option<Vec<u8>>> {
            Err(PortError::Unexpected("disk unavailable".into()))
        }
        async fn set(&self, _key: &str, _value: &[u8]) -> PortResult<()> {
            Err(PortError::Unexpected("disk full".into()))
        }
        async fn remove(&self, _key: &str) -> PortResult<()> {
            Ok(())
        }
    }

    /// Fails the first `failing_reads` reads, then behaves like the wrapped store.
    struct FlakyDeviceStore {
        inner: Arc<InMemoryDeviceStore>,
        failing_reads: AtomicUsize,
    }

    impl FlakyDeviceStore {
        fn new(inner: Arc<InMemoryDeviceStore>, failing_reads: usize) -> Self {
            Self {
                inner,
                failing_reads: AtomicUsize::new(failing_reads),
            }
        }
    }

    #[async_trait]
    impl DeviceStore for FlakyDeviceStore {
        async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
            let left = self.failing_reads.load(Ordering::SeqCst);
            if left > 0 {
                self.failing_reads.store(left - 1, Ordering::SeqCst);
                return Err(PortError::Unexpected("I/O error (EIO)".into()));
            }
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &[u8]) -> PortResult<()> {
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> PortResult<()> {
            self.inner.remove(key).await
        }
    }

    async fn saved_entries(device: &InMemoryDeviceStore) -> usize {
        let bytes = device.get(SNAPSHOT_KEY).await.unwrap().expect("snapshot written");
        JournalState::from_json(&bytes).unwrap().entries().len()
    }

    #[tokio::test]
    async fn flushed_state_survives_a_restart() {
        let device = Arc::new(InMemoryDeviceStore::new());
        let store = JournalStore::create(device.clone()).await;
        let kept = store.add_entry(EntryDraft::text("kept"));
        let dropped = store.add_entry(EntryDraft::text("dropped"));
        store.remove_entry(dropped.id);
        store.set_settings(SettingsPatch {
            theme: Some(Theme::Light),
            ..Default::default()
        });
        store.dispose().await;

        let restored = JournalStore::create(device).await;
        assert_eq!(restored.entries(), vec![kept]);
        assert_eq!(restored.settings().theme, Theme::Light);
        restored.dispose().await;
    }

    #[tokio::test]
    async fn writer_task_persists_without_explicit_flush() {
        let device = Arc::new(InMemoryDeviceStore::new());
        let store = JournalStore::create(device.clone()).await;
        store.add_entry(EntryDraft::text("background"));

        let mut written = None;
        for _ in 0..100 {
            tokio::task::yield_now().await;
            written = device.get(SNAPSHOT_KEY).await.unwrap();
            if written.is_some() {
                break;
            }
        }
        let state = JournalState::from_json(&written.expect("snapshot written")).unwrap();
        assert_eq!(state.entries().len(), 1);
        store.dispose().await;
    }

    #[tokio::test]
    async fn corrupt_snapshot_starts_empty() {
        let device = Arc::new(InMemoryDeviceStore::new());
        device.set(SNAPSHOT_KEY, b"{ definitely not json").await.unwrap();
        let store = JournalStore::create(device).await;
        assert!(store.entries().is_empty());
        store.dispose().await;
    }

    #[tokio::test]
    async fn persist_failure_keeps_memory_and_raises_notice() {
        let store = JournalStore::create(Arc::new(BrokenDeviceStore)).await;
        let entry = store.add_entry(EntryDraft::text("still here"));

        assert!(store.flush().await.is_err());
        assert_eq!(store.entry(entry.id), Some(entry));
        assert!(matches!(
            store.latest_notice(),
            Some(Notice::PersistFailed { .. })
        ));

        store.dismiss_notice();
        assert_eq!(store.latest_notice(), None);
        store.dispose().await;
    }

    #[tokio::test]
    async fn removing_an_unknown_id_is_a_no_op() {
        let store = JournalStore::create(Arc::new(InMemoryDeviceStore::new())).await;
        let entry = store.add_entry(EntryDraft::text("one"));
        assert!(!store.remove_entry(uuid::Uuid::new_v4()));
        assert_eq!(store.entries(), vec![entry]);
        store.dispose().await;
    }

    #[tokio::test]
    async fn failed_startup_read_never_overwrites_saved_entries() {
        let device = Arc::new(InMemoryDeviceStore::new());
        let store = JournalStore::create(device.clone()).await;
        for i in 0..5 {
            store.add_entry(EntryDraft::text(format!("saved {i}")));
        }
        store.dispose().await;

        let flaky = Arc::new(FlakyDeviceStore::new(device.clone(), 1));
        let restarted = JournalStore::create(flaky).await;
        assert!(restarted.entries().is_empty());
        assert!(matches!(
            restarted.latest_notice(),
            Some(Notice::RestoreFailed { .. })
        ));

        let added = restarted.add_entry(EntryDraft::text("written after restart"));
        restarted.flush().await.unwrap();
        assert_eq!(saved_entries(&device).await, 6);
        assert_eq!(restarted.entries().len(), 6);
        assert_eq!(restarted.entries()[0], added);
        restarted.dispose().await;
    }

    #[tokio::test]
    async fn persisting_waits_while_the_snapshot_stays_unreadable() {
        let device = Arc::new(InMemoryDeviceStore::new());
        let store = JournalStore::create(device.clone()).await;
        store.add_entry(EntryDraft::text("precious"));
        store.dispose().await;

        let flaky = Arc::new(FlakyDeviceStore::new(device.clone(), usize::MAX));
        let restarted = JournalStore::create(flaky).await;
        restarted.add_entry(EntryDraft::text("in memory only"));
        restarted.dismiss_notice();

        assert!(restarted.flush().await.is_err());
        assert!(matches!(
            restarted.latest_notice(),
            Some(Notice::RestoreFailed { .. })
        ));
        assert_eq!(saved_entries(&device).await, 1);
        restarted.dispose().await;
    }

    #[tokio::test]
    async fn newer_snapshot_is_set_aside_before_overwrite() {
        let device = Arc::new(InMemoryDeviceStore::new());
        let future = br#"{"schema_version":2,"entries":[],"future":"data"}"#;
        device.set(SNAPSHOT_KEY, future).await.unwrap();

        let store = JournalStore::create(device.clone()).await;
        store.set_settings(SettingsPatch {
            theme: Some(Theme::Dark),
            ..Default::default()
        });
        store.flush().await.unwrap();

        assert_eq!(
            device.get(UNREADABLE_SNAPSHOT_KEY).await.unwrap().as_deref(),
            Some(&future[..])
        );
        let current = device.get(SNAPSHOT_KEY).await.unwrap().unwrap();
        assert_eq!(JournalState::from_json(&current).unwrap().settings().theme, Theme::Dark);
        store.dispose().await;
    }
}
