use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, watch},
    time::timeout,
};
use tracing::{info, warn};

use super::{identity::DeviceIdentity, local::LocalStore, remote::RemoteSync};
use crate::{error::StoreError, snapshot::ProgressSnapshot};

/// Events emitted by the background uploader.
#[derive(Debug)]
pub enum SyncEvent {
    /// A snapshot reached the remote store.
    Uploaded {
        /// Gold recorded in the uploaded snapshot.
        gold: f64,
    },
    /// An upload failed; local progress is unaffected.
    Failed(StoreError),
}

/// Which kind of save a gold change was served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    /// Nothing pending.
    Idle,
    /// The debounce window is still open: local write only.
    PendingLocalSave,
    /// The window elapsed: local write followed by a remote upload.
    PendingCloudSave,
}

/// Timing and size limits for the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSettings {
    /// Minimum interval between remote uploads.
    pub save_delay: Duration,
    /// Upper bound on the startup download.
    pub download_timeout: Duration,
    /// Largest remote object accepted at startup.
    pub max_download_bytes: u64,
}

impl Default for SaveSettings {
    fn default() -> Self {
        Self {
            save_delay: Duration::from_secs(5),
            download_timeout: Duration::from_secs(10),
            max_download_bytes: super::remote::MAX_DOWNLOAD_BYTES,
        }
    }
}

struct RemoteLink {
    remote: Arc<RemoteSync>,
    identity: DeviceIdentity,
    uploads: watch::Sender<Option<ProgressSnapshot>>,
}

/// Decides when progress goes to disk and when it also goes to the remote store.
pub struct SaveCoordinator {
    local: LocalStore,
    remote: Option<RemoteLink>,
    settings: SaveSettings,
    countdown: f64,
    state: SaveState,
}

impl SaveCoordinator {
    /// Coordinator that only ever writes locally.
    pub fn local_only(local: LocalStore, settings: SaveSettings) -> Self {
        Self {
            local,
            remote: None,
            settings,
            countdown: 0.0,
            state: SaveState::Idle,
        }
    }

    /// Coordinator with a remote tier.
    ///
    /// Spawns the uploader task on the current tokio runtime; upload outcomes
    /// are reported on `events`.
    pub fn with_remote(
        local: LocalStore,
        remote: RemoteSync,
        identity: DeviceIdentity,
        settings: SaveSettings,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        let remote = Arc::new(remote);
        let uploads = spawn_uploader(remote.clone(), identity.clone(), events);
        Self {
            local,
            remote: Some(RemoteLink {
                remote,
                identity,
                uploads,
            }),
            settings,
            countdown: 0.0,
            state: SaveState::Idle,
        }
    }

    /// Current state of the save state machine.
    pub fn state(&self) -> SaveState {
        self.state
    }

    /// Local progress store.
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// Let time pass on the debounce countdown.
    pub fn advance(&mut self, elapsed_seconds: f64) {
        if elapsed_seconds.is_finite() && elapsed_seconds > 0.0 {
            self.countdown -= elapsed_seconds;
        }
    }

    /// Persist after a gold change.
    ///
    /// The local write always happens first and synchronously. If the debounce
    /// window has elapsed the snapshot is then queued for upload and the window
    /// restarts. Returns the state the change was served in.
    pub fn record_change(&mut self, snapshot: &ProgressSnapshot) -> SaveState {
        let served = if self.countdown <= 0.0 {
            SaveState::PendingCloudSave
        } else {
            SaveState::PendingLocalSave
        };
        self.state = served;

        if let Err(err) = self.local.save(snapshot) {
            warn!(%err, "Local save failed");
        }
        if served == SaveState::PendingCloudSave {
            if let Some(link) = &self.remote {
                link.uploads.send_replace(Some(snapshot.clone()));
            }
            self.countdown = self.settings.save_delay.as_secs_f64();
        }

        self.state = SaveState::Idle;
        served
    }

    /// Write the snapshot locally right away, e.g. on shutdown.
    pub fn flush(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        self.local.save(snapshot)
    }

    /// Resolve the progress to start the session with.
    ///
    /// The remote copy wins when it can be fetched and decoded, and is written
    /// through to the local slot. Any remote failure falls back to the local
    /// slot; if that is missing or unreadable a fresh snapshot is created and
    /// persisted.
    pub async fn load_at_startup(&self) -> ProgressSnapshot {
        if let Some(link) = &self.remote {
            match self.download(link).await {
                Ok(snapshot) => {
                    info!(
                        backend = link.remote.name(),
                        gold = snapshot.gold,
                        "Loaded progress from remote store"
                    );
                    if let Err(err) = self.local.save(&snapshot) {
                        warn!(%err, "Failed to cache remote progress locally");
                    }
                    return snapshot;
                }
                Err(err) => {
                    warn!(%err, "Remote progress unavailable; using local save");
                }
            }
        }

        match self.local.load() {
            Ok(snapshot) => {
                info!(gold = snapshot.gold, "Loaded progress from local save");
                snapshot
            }
            Err(err) => {
                match err {
                    StoreError::NotFound => info!("No saved progress; starting fresh"),
                    other => warn!(err = %other, "Local save unreadable; starting fresh"),
                }
                let fresh = ProgressSnapshot::default();
                if let Err(err) = self.local.save(&fresh) {
                    warn!(%err, "Failed to persist fresh progress");
                }
                fresh
            }
        }
    }

    async fn download(&self, link: &RemoteLink) -> Result<ProgressSnapshot, StoreError> {
        let fetch = link
            .remote
            .download(&link.identity, self.settings.max_download_bytes);
        match timeout(self.settings.download_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Network(format!(
                "remote download timed out after {:?}",
                self.settings.download_timeout
            ))),
        }
    }
}

/// Run uploads one at a time. A newer snapshot replaces any queued one, so an
/// older snapshot can never land after a newer one.
fn spawn_uploader(
    remote: Arc<RemoteSync>,
    identity: DeviceIdentity,
    events: mpsc::Sender<SyncEvent>,
) -> watch::Sender<Option<ProgressSnapshot>> {
    let (sender, mut receiver) = watch::channel::<Option<ProgressSnapshot>>(None);
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let Some(snapshot) = receiver.borrow_and_update().clone() else {
                continue;
            };
            let event = match remote.upload(&snapshot, &identity).await {
                Ok(()) => SyncEvent::Uploaded {
                    gold: snapshot.gold,
                },
                Err(err) => {
                    warn!(%err, backend = remote.name(), "Remote upload failed");
                    SyncEvent::Failed(err)
                }
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    });
    sender
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::remote::MemoryBlobStore;
    use anyhow::Result;
    use tempfile::tempdir;

    fn snapshot(gold: f64) -> ProgressSnapshot {
        ProgressSnapshot {
            gold,
            resource_levels: vec![1],
        }
    }

    fn coordinator(
        root: &std::path::Path,
        memory: &MemoryBlobStore,
    ) -> (SaveCoordinator, mpsc::Receiver<SyncEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let coordinator = SaveCoordinator::with_remote(
            LocalStore::new(root),
            RemoteSync::Memory(memory.clone()),
            DeviceIdentity::new("device-test"),
            SaveSettings::default(),
            tx,
        );
        (coordinator, rx)
    }

    #[tokio::test]
    async fn remote_missing_falls_back_to_local() -> Result<()> {
        let dir = tempdir()?;
        let memory = MemoryBlobStore::new();
        LocalStore::new(dir.path()).save(&snapshot(40.0))?;

        let (coordinator, _rx) = coordinator(dir.path(), &memory);
        assert_eq!(coordinator.load_at_startup().await, snapshot(40.0));
        Ok(())
    }

    #[tokio::test]
    async fn nothing_anywhere_starts_fresh_and_persists() -> Result<()> {
        let dir = tempdir()?;
        let memory = MemoryBlobStore::new();
        let (coordinator, _rx) = coordinator(dir.path(), &memory);

        let loaded = coordinator.load_at_startup().await;
        assert_eq!(loaded, ProgressSnapshot::default());
        assert_eq!(coordinator.local().load()?, ProgressSnapshot::default());
        Ok(())
    }

    #[tokio::test]
    async fn remote_copy_wins_and_overwrites_local() -> Result<()> {
        let dir = tempdir()?;
        let memory = MemoryBlobStore::new();
        let identity = DeviceIdentity::new("device-test");
        RemoteSync::Memory(memory.clone())
            .upload(&snapshot(900.0), &identity)
            .await?;
        LocalStore::new(dir.path()).save(&snapshot(3.0))?;

        let (coordinator, _rx) = coordinator(dir.path(), &memory);
        assert_eq!(coordinator.load_at_startup().await, snapshot(900.0));
        assert_eq!(coordinator.local().load()?, snapshot(900.0));
        Ok(())
    }

    #[tokio::test]
    async fn offline_or_corrupt_remote_uses_local() -> Result<()> {
        let dir = tempdir()?;
        let memory = MemoryBlobStore::new();
        let identity = DeviceIdentity::new("device-test");
        LocalStore::new(dir.path()).save(&snapshot(7.0))?;

        memory.put_raw(&identity, b"{ truncated".to_vec());
        let (coordinator, _rx) = coordinator(dir.path(), &memory);
        assert_eq!(coordinator.load_at_startup().await, snapshot(7.0));

        memory.set_offline(true);
        assert_eq!(coordinator.load_at_startup().await, snapshot(7.0));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_local_without_remote_starts_fresh() -> Result<()> {
        let dir = tempdir()?;
        let local = LocalStore::new(dir.path());
        std::fs::write(local.slot_path(), b"not json")?;

        let coordinator = SaveCoordinator::local_only(local, SaveSettings::default());
        assert_eq!(
            coordinator.load_at_startup().await,
            ProgressSnapshot::default()
        );
        assert_eq!(coordinator.local().load()?, ProgressSnapshot::default());
        Ok(())
    }

    #[tokio::test]
    async fn uploads_are_debounced_but_local_saves_are_not() -> Result<()> {
        let dir = tempdir()?;
        let memory = MemoryBlobStore::new();
        let (mut coordinator, mut rx) = coordinator(dir.path(), &memory);

        assert_eq!(
            coordinator.record_change(&snapshot(1.0)),
            SaveState::PendingCloudSave
        );
        assert_eq!(coordinator.state(), SaveState::Idle);
        assert!(matches!(
            rx.recv().await,
            Some(SyncEvent::Uploaded { gold }) if gold == 1.0
        ));

        coordinator.advance(2.0);
        assert_eq!(
            coordinator.record_change(&snapshot(2.0)),
            SaveState::PendingLocalSave
        );
        assert_eq!(coordinator.local().load()?, snapshot(2.0));
        assert_eq!(memory.upload_count(), 1);

        coordinator.advance(3.0);
        assert_eq!(
            coordinator.record_change(&snapshot(3.0)),
            SaveState::PendingCloudSave
        );
        assert!(matches!(
            rx.recv().await,
            Some(SyncEvent::Uploaded { gold }) if gold == 3.0
        ));
        assert_eq!(memory.upload_count(), 2);
        assert_eq!(
            memory.get(&DeviceIdentity::new("device-test")),
            Some(snapshot(3.0))
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_upload_keeps_local_progress() -> Result<()> {
        let dir = tempdir()?;
        let memory = MemoryBlobStore::new();
        memory.set_offline(true);
        let (mut coordinator, mut rx) = coordinator(dir.path(), &memory);

        coordinator.record_change(&snapshot(11.0));
        assert!(matches!(
            rx.recv().await,
            Some(SyncEvent::Failed(StoreError::Network(_)))
        ));
        assert_eq!(coordinator.local().load()?, snapshot(11.0));
        Ok(())
    }

    #[tokio::test]
    async fn newest_snapshot_is_the_last_uploaded() -> Result<()> {
        let dir = tempdir()?;
        let memory = MemoryBlobStore::new();
        let settings = SaveSettings {
            save_delay: Duration::ZERO,
            ..SaveSettings::default()
        };
        let (tx, mut rx) = mpsc::channel(16);
        let mut coordinator = SaveCoordinator::with_remote(
            LocalStore::new(dir.path()),
            RemoteSync::Memory(memory.clone()),
            DeviceIdentity::new("device-test"),
            settings,
            tx,
        );

        for gold in 1..=5 {
            coordinator.record_change(&snapshot(f64::from(gold)));
        }
        loop {
            match rx.recv().await {
                Some(SyncEvent::Uploaded { gold }) if gold == 5.0 => break,
                Some(SyncEvent::Uploaded { .. }) => continue,
                other => panic!("unexpected sync event {other:?}"),
            }
        }
        assert_eq!(
            memory.get(&DeviceIdentity::new("device-test")),
            Some(snapshot(5.0))
        );
        Ok(())
    }
}
