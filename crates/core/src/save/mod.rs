//! Progress persistence: local slot, remote blob store and the coordinator
//! that sequences them.

/// Debounced local/remote save sequencing and startup loading.
pub mod coordinator;
/// Stable per-installation identity.
pub mod identity;
/// Atomic single-slot local store.
pub mod local;
/// Remote blob store backends.
pub mod remote;

pub use coordinator::{SaveCoordinator, SaveSettings, SaveState, SyncEvent};
pub use identity::DeviceIdentity;
pub use local::LocalStore;
pub use remote::{HttpBlobStore, MemoryBlobStore, RemoteSync};
