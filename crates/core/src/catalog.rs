//! Static resource definitions loaded once at startup.

use std::{fs, path::Path};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::CatalogError, resource::ResourceState};

/// Immutable definition of one resource tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Display name.
    pub name: String,
    /// One-off price to unlock the resource.
    pub unlock_cost: f64,
    /// Price of the first upgrade; later upgrades scale from it.
    pub upgrade_cost: f64,
    /// Gold produced per level.
    pub output: f64,
}

impl ResourceConfig {
    fn validate(&self, index: usize) -> Result<(), CatalogError> {
        let invalid = |reason: &str| CatalogError::InvalidEntry {
            index,
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        for (field, value) in [
            ("unlock_cost", self.unlock_cost),
            ("upgrade_cost", self.upgrade_cost),
            ("output", self.output),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(&format!(
                    "{field} must be a finite, non-negative number (got {value})"
                )));
            }
        }
        Ok(())
    }
}

static BUILTIN: Lazy<Vec<ResourceConfig>> = Lazy::new(|| {
    [
        ("Gold Pan", 0.0, 10.0, 1.0),
        ("Pickaxe", 50.0, 40.0, 4.0),
        ("Mine Cart", 300.0, 200.0, 15.0),
        ("Drill Rig", 2_000.0, 1_200.0, 60.0),
        ("Refinery", 15_000.0, 8_000.0, 250.0),
        ("Bank Vault", 120_000.0, 60_000.0, 1_100.0),
    ]
    .into_iter()
    .map(|(name, unlock_cost, upgrade_cost, output)| ResourceConfig {
        name: name.to_string(),
        unlock_cost,
        upgrade_cost,
        output,
    })
    .collect()
});

/// Ordered, validated set of resource definitions. Index is the unlock tier.
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
    entries: Vec<ResourceConfig>,
}

impl ResourceCatalog {
    /// Validate and wrap the given definitions.
    pub fn new(entries: Vec<ResourceConfig>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (index, entry) in entries.iter().enumerate() {
            entry.validate(index)?;
        }
        Ok(Self { entries })
    }

    /// Catalog shipped with the game, used when no catalog file is configured.
    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN.clone(),
        }
    }

    /// Read a JSON array of resource definitions.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let entries: Vec<ResourceConfig> =
            serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        let catalog = Self::new(entries)?;
        info!(path = %path.display(), resources = catalog.len(), "Catalog loaded");
        Ok(catalog)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Fresh, locked state for every tier.
    pub fn instantiate(&self) -> Vec<ResourceState> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, config)| ResourceState::new(index, config.clone()))
            .collect()
    }
}
