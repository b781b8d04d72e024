use super::BreakerSnapshot;
use crate::error::StoreError;
use crate::utils::fs::{read_json, write_json_atomic};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const BREAKERS_FILE: &str = "breakers.json";

/// `breakers.json`: one object keyed by service name.
#[derive(Debug, Clone)]
pub struct BreakerStore {
    path: PathBuf,
}

impl BreakerStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(BREAKERS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> BTreeMap<String, BreakerSnapshot> {
        read_json(&self.path).unwrap_or_default()
    }

    /// Full-snapshot replace via temp file and rename.
    pub fn save(&self, snapshot: &BTreeMap<String, BreakerSnapshot>) -> Result<(), StoreError> {
        write_json_atomic(&self.path, snapshot)
    }
}
