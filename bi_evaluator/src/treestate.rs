//! Per-user expand/collapse state of rendered trees

use crate::assumptions::user_file;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeState {
    pub expand_level: Option<i64>,
    #[serde(default)]
    pub paths: BTreeMap<String, bool>,
}

impl TreeState {
    /// Record `path` as open or closed. A different expand level discards
    /// everything stored for the previous level.
    pub fn update(&mut self, level: i64, path: &str, open: bool) {
        if self.expand_level != Some(level) {
            self.paths.clear();
            self.expand_level = Some(level);
        }
        self.paths.insert(path.to_string(), open);
    }
}

/// Split a `<level>:<path>` id
pub fn parse_path_id(path_id: &str) -> Result<(i64, &str), StoreError> {
    let invalid = || StoreError::InvalidTreePath {
        path: path_id.to_string(),
    };
    let (level, path) = path_id.split_once(':').ok_or_else(invalid)?;
    let level = level.trim().parse::<i64>().map_err(|_| invalid())?;
    Ok((level, path))
}

pub trait TreeStateStore: Send + Sync {
    fn load(&self, user: &str) -> Result<TreeState, StoreError>;
    fn save(&self, user: &str, state: &TreeState) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryTreeStateStore {
    users: Mutex<HashMap<String, TreeState>>,
}

impl MemoryTreeStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TreeStateStore for MemoryTreeStateStore {
    fn load(&self, user: &str) -> Result<TreeState, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, user: &str, state: &TreeState) -> Result<(), StoreError> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_string(), state.clone());
        Ok(())
    }
}

/// `<base>/<user>/bi_treestate.json`
#[derive(Debug, Clone)]
pub struct JsonFileTreeStateStore {
    base_dir: PathBuf,
}

impl JsonFileTreeStateStore {
    pub const FILE_NAME: &'static str = "bi_treestate.json";

    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl TreeStateStore for JsonFileTreeStateStore {
    fn load(&self, user: &str) -> Result<TreeState, StoreError> {
        let path = user_file(&self.base_dir, user, Self::FILE_NAME)?;
        if !path.exists() {
            return Ok(TreeState::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(&path)?)?)
    }

    fn save(&self, user: &str, state: &TreeState) -> Result<(), StoreError> {
        let path = user_file(&self.base_dir, user, Self::FILE_NAME)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_path_id() {
        assert_eq!(parse_path_id("2:Hosts:web").unwrap(), (2, "Hosts:web"));
        assert_matches!(parse_path_id("Hosts"), Err(StoreError::InvalidTreePath { .. }));
        assert_matches!(parse_path_id("x:Hosts"), Err(StoreError::InvalidTreePath { .. }));
    }

    #[test]
    fn test_level_change_resets_paths() {
        let mut state = TreeState::default();
        state.update(1, "a", true);
        state.update(1, "b", false);
        assert_eq!(state.paths.len(), 2);

        state.update(2, "c", true);
        assert_eq!(state.expand_level, Some(2));
        assert_eq!(state.paths.len(), 1);
        assert_eq!(state.paths.get("c"), Some(&true));
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTreeStateStore::new(dir.path());
        assert_eq!(store.load("alice").unwrap(), TreeState::default());

        let mut state = TreeState::default();
        state.update(3, "Hosts/web", true);
        store.save("alice", &state).unwrap();
        assert_eq!(store.load("alice").unwrap(), state);
    }
}
