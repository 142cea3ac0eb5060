//! Composition root tying the economy to persistence.
//!
//! [`Game`] is constructed once by whatever owns the tick loop and passed
//! around by reference; there is no process-wide instance.

use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{info, warn};

use crate::{
    catalog::ResourceCatalog,
    config::AppConfig,
    economy::{EconomyEngine, EngineEvent},
    error::EconomyError,
    save::{
        DeviceIdentity, HttpBlobStore, LocalStore, RemoteSync, SaveCoordinator, SaveState,
        SyncEvent,
    },
};

/// Receives the achievement/analytics trigger points.
pub trait ProgressObserver: Send {
    /// A gold milestone was reached for the first time this session.
    fn milestone_reached(&mut self, _threshold: f64, _gold: f64) {}

    /// Progress reached the remote store; `gold` is what was uploaded.
    fn cloud_saved(&mut self, _gold: f64) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

/// A running session: engine, save coordinator and collaborator hooks.
pub struct Game {
    engine: EconomyEngine,
    saves: SaveCoordinator,
    sync_rx: Option<mpsc::Receiver<SyncEvent>>,
    observer: Box<dyn ProgressObserver>,
}

impl Game {
    /// Build everything from configuration and load the starting progress
    /// (remote first, then local, then fresh).
    ///
    /// Fails only when the catalog or the device identity cannot be set up.
    pub async fn start(config: &AppConfig, observer: Box<dyn ProgressObserver>) -> Result<Self> {
        let catalog = match &config.catalog_path {
            Some(path) => ResourceCatalog::from_path(path).context("failed to load catalog")?,
            None => ResourceCatalog::builtin(),
        };
        let local = LocalStore::new(&config.data_dir);

        let (saves, sync_rx) = if config.remote.enabled {
            let identity = DeviceIdentity::load_or_create(&config.data_dir)?;
            let remote = RemoteSync::Http(
                HttpBlobStore::new(config.remote.root_url.clone(), config.remote_timeout())
                    .context("failed to build remote client")?,
            );
            info!(%identity, root = %config.remote.root_url, "Remote sync enabled");
            let (tx, rx) = mpsc::channel(16);
            let saves =
                SaveCoordinator::with_remote(local, remote, identity, config.save_settings(), tx);
            (saves, Some(rx))
        } else {
            (SaveCoordinator::local_only(local, config.save_settings()), None)
        };

        let snapshot = saves.load_at_startup().await;
        let engine = EconomyEngine::restore(&catalog, config.economy_settings(), &snapshot);
        Ok(Self::from_parts(engine, saves, sync_rx, observer))
    }

    /// Assemble a session from already-built parts.
    pub fn from_parts(
        engine: EconomyEngine,
        saves: SaveCoordinator,
        sync_rx: Option<mpsc::Receiver<SyncEvent>>,
        observer: Box<dyn ProgressObserver>,
    ) -> Self {
        Self {
            engine,
            saves,
            sync_rx,
            observer,
        }
    }

    /// Read access for presentation.
    pub fn engine(&self) -> &EconomyEngine {
        &self.engine
    }

    /// Save coordinator state, mostly for status displays.
    pub fn saves(&self) -> &SaveCoordinator {
        &self.saves
    }

    /// Advance time. Returns the auto-collected gold when a second boundary
    /// was crossed.
    pub fn tick(&mut self, delta_seconds: f64) -> Option<f64> {
        self.saves.advance(delta_seconds);
        let credited = self.engine.tick(delta_seconds);
        if credited.is_some_and(|amount| amount > 0.0) {
            self.persist();
        }
        self.pump_sync_events();
        credited
    }

    /// Manual collection.
    pub fn tap(&mut self) -> f64 {
        let credited = self.engine.collect_tap();
        self.persist();
        credited
    }

    /// Unlock a resource and persist the spend.
    pub fn unlock(&mut self, index: usize) -> Result<(), EconomyError> {
        self.engine.try_unlock(index)?;
        self.persist();
        Ok(())
    }

    /// Upgrade a resource and persist the spend.
    pub fn upgrade(&mut self, index: usize) -> Result<(), EconomyError> {
        self.engine.try_upgrade(index)?;
        self.persist();
        Ok(())
    }

    /// Unlock when locked, upgrade otherwise.
    pub fn purchase(&mut self, index: usize) -> Result<(), EconomyError> {
        match self.engine.resource(index) {
            Some(resource) if resource.is_unlocked() => self.upgrade(index),
            _ => self.unlock(index),
        }
    }

    /// Drain engine events, forwarding milestones to the observer.
    pub fn events(&mut self) -> Vec<EngineEvent> {
        let events = self.engine.drain_events();
        for event in &events {
            if let EngineEvent::MilestoneReached { threshold, gold } = event {
                self.observer.milestone_reached(*threshold, *gold);
            }
        }
        events
    }

    /// Final synchronous local save. Any in-flight upload is abandoned.
    pub fn shutdown(&mut self) -> Result<()> {
        self.pump_sync_events();
        self.saves
            .flush(&self.engine.snapshot())
            .context("failed to write final save")
    }

    fn persist(&mut self) -> SaveState {
        let snapshot = self.engine.snapshot();
        self.saves.record_change(&snapshot)
    }

    fn pump_sync_events(&mut self) {
        let Some(rx) = self.sync_rx.as_mut() else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(SyncEvent::Uploaded { gold }) => self.observer.cloud_saved(gold),
                Ok(SyncEvent::Failed(err)) => {
                    warn!(%err, "Cloud save failed; continuing with local progress")
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.sync_rx = None;
                    break;
                }
            }
        }
    }
}
