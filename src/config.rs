//! Physical-inventory configuration
//!
//! Optional JSON file seeding per-EID location codes and form factors for
//! platforms that do not publish drive bays through inventory. The file is
//! advisory: a missing or unparseable file leaves the daemon running with an
//! empty table.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Default install location of the drive table.
pub const DEFAULT_CONFIG_PATH: &str = "/usr/share/nvme-device-manager/drive.json";

/// One configured drive bay.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DriveEntry {
    pub eid: u8,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub form_factor: Option<String>,
}

/// The drive table, keyed by EID.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct InventoryConfig {
    #[serde(default)]
    pub drive: Vec<DriveEntry>,
}

impl InventoryConfig {
    /// Load the table from `path`; any failure yields the empty table.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::read(path) {
            Ok(config) => {
                info!(path = %path.display(), drives = config.drive.len(), "drive configuration loaded");
                config
            }
            Err(err @ Error::Io(_)) => {
                info!(path = %path.display(), %err, "no drive configuration, continuing without");
                Self::default()
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "drive configuration unparseable, ignoring");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn entry(&self, eid: u8) -> Option<&DriveEntry> {
        self.drive.iter().find(|entry| entry.eid == eid)
    }
}
