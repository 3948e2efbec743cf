//! Per-user "what-if" state overrides

use crate::error::StoreError;
use crate::state::State;
use bi_compiler::{CompiledLeaf, HostSpec, ServiceRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// `(site, host)` for the host state or `(site, host, service)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssumptionKey {
    pub site: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl AssumptionKey {
    pub fn host(site: &str, host: &str) -> Self {
        Self {
            site: site.to_string(),
            host: host.to_string(),
            service: None,
        }
    }

    pub fn service(site: &str, host: &str, service: &str) -> Self {
        Self {
            site: site.to_string(),
            host: host.to_string(),
            service: Some(service.to_string()),
        }
    }

    /// Key an override of `leaf` would be stored under
    pub fn for_leaf(leaf: &CompiledLeaf) -> Self {
        let HostSpec { site, host } = &leaf.host;
        match &leaf.service {
            ServiceRef::HostState => Self::host(site, host),
            ServiceRef::Service(service) => Self::service(site, host, service),
        }
    }
}

pub type AssumptionMap = BTreeMap<AssumptionKey, State>;

pub trait AssumptionStore: Send + Sync {
    fn load(&self, user: &str) -> Result<AssumptionMap, StoreError>;
    fn save(&self, user: &str, assumptions: &AssumptionMap) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryAssumptionStore {
    users: Mutex<HashMap<String, AssumptionMap>>,
}

impl MemoryAssumptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssumptionStore for MemoryAssumptionStore {
    fn load(&self, user: &str) -> Result<AssumptionMap, StoreError> {
        Ok(self
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, user: &str, assumptions: &AssumptionMap) -> Result<(), StoreError> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user.to_string(), assumptions.clone());
        Ok(())
    }
}

/// On-disk record; keys are structured so the map is stored as a list
#[derive(Serialize, Deserialize)]
struct AssumptionRecord {
    #[serde(flatten)]
    key: AssumptionKey,
    state: i32,
}

/// One JSON file per user: `<base>/<user>/bi_assumptions.json`
#[derive(Debug, Clone)]
pub struct JsonFileAssumptionStore {
    base_dir: PathBuf,
}

impl JsonFileAssumptionStore {
    pub const FILE_NAME: &'static str = "bi_assumptions.json";

    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path(&self, user: &str) -> Result<PathBuf, StoreError> {
        user_file(&self.base_dir, user, Self::FILE_NAME)
    }
}

/// Per-user file path; user names must not escape the base directory
pub(crate) fn user_file(base_dir: &Path, user: &str, file_name: &str) -> Result<PathBuf, StoreError> {
    if user.is_empty() || user == "." || user == ".." || user.contains(['/', '\\']) {
        return Err(StoreError::InvalidUser {
            user: user.to_string(),
        });
    }
    Ok(base_dir.join(user).join(file_name))
}

impl AssumptionStore for JsonFileAssumptionStore {
    fn load(&self, user: &str) -> Result<AssumptionMap, StoreError> {
        let path = self.path(user)?;
        if !path.exists() {
            return Ok(AssumptionMap::new());
        }

        let records: Vec<AssumptionRecord> = serde_json::from_str(&fs::read_to_string(&path)?)?;
        records
            .into_iter()
            .map(|record| {
                State::from_i32(record.state)
                    .map(|state| (record.key, state))
                    .ok_or_else(|| StoreError::InvalidState {
                        value: record.state.to_string(),
                    })
            })
            .collect()
    }

    fn save(&self, user: &str, assumptions: &AssumptionMap) -> Result<(), StoreError> {
        let path = self.path(user)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let records: Vec<AssumptionRecord> = assumptions
            .iter()
            .map(|(key, state)| AssumptionRecord {
                key: key.clone(),
                state: state.as_i32(),
            })
            .collect();
        fs::write(&path, serde_json::to_string_pretty(&records)?)?;
        Ok(())
    }
}
