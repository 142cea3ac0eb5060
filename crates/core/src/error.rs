//! Typed failures surfaced by the engine and its persistence layers.

use thiserror::Error;

/// Business-rule rejections returned by purchase operations.
///
/// None of these change engine state; the caller decides how to present them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EconomyError {
    /// The player does not hold enough gold for the purchase.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Gold the purchase costs.
        required: f64,
        /// Gold currently held.
        available: f64,
    },
    /// The resource was unlocked earlier.
    #[error("resource {0} is already unlocked")]
    AlreadyUnlocked(usize),
    /// Upgrades require the resource to be unlocked first.
    #[error("resource {0} is not unlocked")]
    NotUnlocked(usize),
    /// An earlier tier is still locked.
    #[error("resource {index} cannot be unlocked before resource {blocking}")]
    OutOfOrder {
        /// Resource the player tried to unlock.
        index: usize,
        /// The earlier resource that is still locked.
        blocking: usize,
    },
    /// The index does not name a catalog entry.
    #[error("no resource at index {0}")]
    UnknownResource(usize),
}

/// Failures of the local and remote progress stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No saved progress exists in the slot.
    #[error("no saved progress found")]
    NotFound,
    /// Stored bytes could not be turned back into a snapshot.
    #[error("failed to decode saved progress: {0}")]
    Decode(String),
    /// The remote object exceeds the download cap.
    #[error("remote progress is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Observed size (or lower bound while streaming).
        size: u64,
        /// Configured cap.
        limit: u64,
    },
    /// Transport-level failure talking to the remote store.
    #[error("network error: {0}")]
    Network(String),
    /// The remote store refused the write for capacity or rate reasons.
    #[error("remote quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Local filesystem failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Fatal problems with the resource catalog. The engine cannot start without one.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog holds no resources.
    #[error("resource catalog is empty")]
    Empty,
    /// An entry carries a value the engine cannot work with.
    #[error("resource {index} ({name:?}) is invalid: {reason}")]
    InvalidEntry {
        /// Position in the catalog.
        index: usize,
        /// Name as written in the catalog.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Read {
        /// File that was being read.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The catalog file is not valid JSON of the expected shape.
    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: String,
        /// Underlying error.
        source: serde_json::Error,
    },
}
