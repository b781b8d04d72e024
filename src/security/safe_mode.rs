use crate::error::StoreError;
use crate::utils::fs::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct SafeModeFile {
    #[serde(default)]
    enabled: bool,
}

/// Persisted operator switch (`safe_mode.json`) that forces the most
/// conservative policy posture.
#[derive(Debug, Clone)]
pub struct SafeModeStore {
    path: PathBuf,
}

impl SafeModeStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("safe_mode.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An unreadable file counts as "off"; the config/env flag can still force it on.
    pub fn is_enabled(&self) -> bool {
        read_json::<SafeModeFile>(&self.path).is_some_and(|file| file.enabled)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &SafeModeFile { enabled })?;
        tracing::info!(enabled, "safe mode switch updated");
        Ok(())
    }
}
