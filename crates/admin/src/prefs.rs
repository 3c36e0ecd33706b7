//! Admin UI preferences: theme, last open tab, sidebar state.

use inkcartridges_storefront::storage::{Storage, StorageExt, keys};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

/// Top-level admin sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdminTab {
    #[default]
    Dashboard,
    Orders,
    Products,
    Customers,
}

/// Everything the admin shell remembers between visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminPrefs {
    pub theme: Theme,
    pub tab: AdminTab,
    pub sidebar_collapsed: bool,
}

impl AdminPrefs {
    /// Read each preference, falling back to its default when missing.
    #[must_use]
    pub fn load(storage: &dyn Storage) -> Self {
        Self {
            theme: read(storage, keys::ADMIN_THEME),
            tab: read(storage, keys::ADMIN_TAB),
            sidebar_collapsed: read(storage, keys::ADMIN_SIDEBAR),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn save(&self, storage: &dyn Storage) -> Result<()> {
        storage.save_json(keys::ADMIN_THEME, &self.theme)?;
        storage.save_json(keys::ADMIN_TAB, &self.tab)?;
        storage.save_json(keys::ADMIN_SIDEBAR, &self.sidebar_collapsed)?;
        Ok(())
    }
}

fn read<T: serde::de::DeserializeOwned + Default>(storage: &dyn Storage, key: &str) -> T {
    match storage.load_json(key) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            warn!(key, error = %e, "Could not read admin preference");
            T::default()
        }
    }
}
