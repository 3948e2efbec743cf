//! Status snapshots and the backend delivering them

use bi_compiler::{HostSpec, SourceError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    #[serde(default = "default_checked")]
    pub has_been_checked: bool,
    pub state: i32,
    #[serde(default)]
    pub plugin_output: String,
}

fn default_checked() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStatus {
    /// 0 up, 1 down, 2 unreachable
    pub state: i32,
    #[serde(default)]
    pub plugin_output: String,
    #[serde(default)]
    pub services: Vec<ServiceStatus>,
}

impl HostStatus {
    pub fn service(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.iter().find(|service| service.name == name)
    }
}

pub type StatusSnapshot = BTreeMap<HostSpec, HostStatus>;

/// Backend answering batched multi-site status queries
pub trait StatusSource: Send + Sync {
    /// Status of exactly the requested hosts; unknown hosts are left out
    fn fetch_host_status(&self, hosts: &BTreeSet<HostSpec>) -> Result<StatusSnapshot, SourceError>;
}

/// In-memory status data that remembers every request
#[derive(Debug, Default)]
pub struct StaticStatusSource {
    hosts: Mutex<StatusSnapshot>,
    requests: Mutex<Vec<BTreeSet<HostSpec>>>,
}

impl StaticStatusSource {
    pub fn new(hosts: StatusSnapshot) -> Self {
        Self {
            hosts: Mutex::new(hosts),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_host(&self, host: HostSpec, status: HostStatus) {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host, status);
    }

    /// Host sets requested so far, oldest first
    pub fn requests(&self) -> Vec<BTreeSet<HostSpec>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatusSource for StaticStatusSource {
    fn fetch_host_status(&self, hosts: &BTreeSet<HostSpec>) -> Result<StatusSnapshot, SourceError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hosts.clone());

        let known = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(hosts
            .iter()
            .filter_map(|host| known.get(host).map(|status| (host.clone(), status.clone())))
            .collect())
    }
}
