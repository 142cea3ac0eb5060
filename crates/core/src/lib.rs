#![warn(clippy::all, missing_docs)]

//! Core progression engine for Idle Tycoon.
//!
//! This crate hosts the resource catalog, the gold economy, and the
//! local/remote persistence layers used by the terminal UI and any
//! future frontends.

pub mod catalog;
pub mod config;
pub mod economy;
pub mod error;
pub mod game;
pub mod resource;
pub mod save;
pub mod snapshot;

pub use catalog::{ResourceCatalog, ResourceConfig};
pub use config::AppConfig;
pub use economy::{EconomyEngine, EconomySettings, EngineEvent};
pub use error::{CatalogError, EconomyError, StoreError};
pub use game::{Game, NullObserver, ProgressObserver};
pub use resource::ResourceState;
pub use snapshot::ProgressSnapshot;
