use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use tracing::info;
use uuid::Uuid;

const IDENTITY_FILE: &str = "device-id";

/// Stable per-installation identifier that names the remote progress object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Read the identity stored under `root`, generating and persisting a new
    /// one on first use.
    pub fn load_or_create(root: impl AsRef<Path>) -> Result<Self> {
        let path = identity_path(root.as_ref());
        match fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                return Ok(Self(content.trim().to_string()))
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        }

        let identity = Self(Uuid::new_v4().simple().to_string());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, &identity.0)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(identity = %identity, "Generated device identity");
        Ok(identity)
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn identity_path(root: &Path) -> PathBuf {
    root.join(IDENTITY_FILE)
}
