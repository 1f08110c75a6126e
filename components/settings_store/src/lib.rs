//! Key-value settings that survive restarts
//!
//! Holds the last opened solution path, the subscription id, and whether a
//! provisioning run was in progress. The provisioning flag is advisory: a
//! frontend reads it on startup to warn about a run that never finished.

mod error;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use error::{Result, SettingsError};

/// Whether a provisioning run is in progress (persisted as a bool)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "bool", into = "bool")]
pub enum ProvisioningState {
    Active,
    #[default]
    Inactive,
}

impl ProvisioningState {
    pub fn is_active(&self) -> bool {
        matches!(self, ProvisioningState::Active)
    }
}

impl From<bool> for ProvisioningState {
    fn from(active: bool) -> Self {
        if active {
            ProvisioningState::Active
        } else {
            ProvisioningState::Inactive
        }
    }
}

impl From<ProvisioningState> for bool {
    fn from(state: ProvisioningState) -> Self {
        state.is_active()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub last_configuration: Option<PathBuf>,
    pub subscription_id: Option<String>,
    pub provisioning_state: ProvisioningState,
}

/// Storage for [`Settings`]
///
/// Implementations are synchronous so the provisioning state can be reset
/// from a drop guard.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Settings;

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<()>;

    fn provisioning_state(&self) -> ProvisioningState {
        self.load().provisioning_state
    }

    fn set_provisioning_state(&self, state: ProvisioningState) -> Result<()> {
        self.update(&mut |settings| settings.provisioning_state = state)
    }

    fn subscription_id(&self) -> Option<String> {
        self.load().subscription_id
    }

    fn set_subscription_id(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.update(&mut |settings| settings.subscription_id = Some(id.clone()))
    }

    fn last_configuration(&self) -> Option<PathBuf> {
        self.load().last_configuration
    }

    fn set_last_configuration(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        self.update(&mut |settings| settings.last_configuration = Some(path.clone()))
    }
}

/// Settings kept in a JSON file, rewritten on every change
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    current: Mutex<Settings>,
}

impl JsonSettingsStore {
    /// Open the settings file, starting from defaults when it does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| SettingsError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file yet, using defaults");
                Settings::default()
            }
            Err(source) => return Err(SettingsError::Read { path, source }),
        };

        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, settings: &Settings) -> Result<()> {
        let write_err = |source| SettingsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_vec_pretty(settings).map_err(|source| SettingsError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(write_err)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Settings {
        self.current.lock().clone()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<()> {
        let mut current = self.current.lock();
        let mut next = current.clone();
        change(&mut next);
        self.persist(&next)?;
        *current = next;
        Ok(())
    }
}

/// Settings that live only as long as the process
#[derive(Default)]
pub struct MemorySettingsStore {
    current: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Settings {
        self.current.lock().clone()
    }

    fn update(&self, change: &mut dyn FnMut(&mut Settings)) -> Result<()> {
        change(&mut self.current.lock());
        Ok(())
    }
}
