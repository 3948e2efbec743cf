//! File-backed config, topology and status sources
//!
//! Rules come from a TOML (or `.json`) file whose mtime is the single
//! configuration timestamp. Hosts, their states and the site start times come
//! from one JSON inventory file, re-read on every request.

use bi_compiler::{
    ConfigSource, HostSpec, RuleConfig, SourceError, Topology, TopologyEntry, TopologySource,
    VisibilityScope,
};
use bi_evaluator::{HostStatus, ServiceStatus, StatusSnapshot, StatusSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

const RULES_SOURCE: &str = "rules";
const INVENTORY_SOURCE: &str = "inventory";

/// Inventory file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    /// Program start per site; `null` for an unreachable site
    #[serde(default)]
    pub sites: BTreeMap<String, Option<i64>>,
    #[serde(default)]
    pub hosts: Vec<InventoryHost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryHost {
    pub site: String,
    pub name: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Users allowed to see the host without the see-all permission
    #[serde(default)]
    pub contacts: BTreeSet<String>,
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub plugin_output: String,
    #[serde(default)]
    pub services: Vec<ServiceStatus>,
}

impl InventoryHost {
    pub fn spec(&self) -> HostSpec {
        HostSpec::new(&self.site, &self.name)
    }

    fn status(&self) -> HostStatus {
        HostStatus {
            state: self.state,
            plugin_output: self.plugin_output.clone(),
            services: self.services.clone(),
        }
    }

    fn topology_entry(&self) -> TopologyEntry {
        TopologyEntry {
            tags: self.tags.clone(),
            services: self.services.iter().map(|s| s.name.clone()).collect(),
        }
    }
}

pub struct FileBackend {
    rules_path: PathBuf,
    inventory_path: PathBuf,
}

impl FileBackend {
    pub fn new(rules_path: impl Into<PathBuf>, inventory_path: impl Into<PathBuf>) -> Self {
        Self {
            rules_path: rules_path.into(),
            inventory_path: inventory_path.into(),
        }
    }

    pub fn inventory(&self) -> Result<Inventory, SourceError> {
        let text = read(&self.inventory_path, INVENTORY_SOURCE)?;
        serde_json::from_str(&text).map_err(|e| SourceError::invalid_data(INVENTORY_SOURCE, e))
    }
}

fn read(path: &Path, source_name: &str) -> Result<String, SourceError> {
    fs::read_to_string(path)
        .map_err(|e| SourceError::transport(source_name, format!("{}: {}", path.display(), e)))
}

impl ConfigSource for FileBackend {
    fn rule_config(&self) -> Result<RuleConfig, SourceError> {
        let text = read(&self.rules_path, RULES_SOURCE)?;
        match self.rules_path.extension().and_then(|e| e.to_str()) {
            Some("json") => RuleConfig::from_json_str(&text),
            _ => RuleConfig::from_toml_str(&text),
        }
    }

    fn modification_timestamps(&self) -> Result<Vec<i64>, SourceError> {
        let modified = fs::metadata(&self.rules_path)
            .and_then(|metadata| metadata.modified())
            .map_err(|e| SourceError::transport(RULES_SOURCE, e))?;
        Ok(vec![DateTime::<Utc>::from(modified).timestamp()])
    }

    fn site_program_starts(&self) -> Result<BTreeMap<String, Option<i64>>, SourceError> {
        Ok(self.inventory()?.sites)
    }
}

impl TopologySource for FileBackend {
    fn fetch_topology(&self, user: &str, scope: VisibilityScope) -> Result<Topology, SourceError> {
        Ok(self
            .inventory()?
            .hosts
            .iter()
            .filter(|host| scope == VisibilityScope::All || host.contacts.contains(user))
            .map(|host| (host.spec(), host.topology_entry()))
            .collect())
    }
}

impl StatusSource for FileBackend {
    fn fetch_host_status(&self, hosts: &BTreeSet<HostSpec>) -> Result<StatusSnapshot, SourceError> {
        Ok(self
            .inventory()?
            .hosts
            .iter()
            .map(|host| (host.spec(), host))
            .filter(|(spec, _)| hosts.contains(spec))
            .map(|(spec, host)| (spec, host.status()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const INVENTORY: &str = r#"{
        "sites": {"s1": 1700000000, "s2": null},
        "hosts": [
            {"site": "s1", "name": "web", "tags": ["prod"], "contacts": ["alice"],
             "state": 0, "plugin_output": "UP",
             "services": [{"name": "http", "state": 1, "plugin_output": "slow"}]},
            {"site": "s2", "name": "db", "state": 1}
        ]
    }"#;

    fn backend(dir: &Path) -> FileBackend {
        let rules = dir.join("rules.toml");
        let inventory = dir.join("inventory.json");
        fs::write(&rules, "aggregations = []\n").unwrap();
        fs::write(&inventory, INVENTORY).unwrap();
        FileBackend::new(rules, inventory)
    }

    #[test]
    fn test_topology_respects_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());

        let all = backend.fetch_topology("bob", VisibilityScope::All).unwrap();
        assert_eq!(all.len(), 2);
        let own = backend
            .fetch_topology("alice", VisibilityScope::OwnContacts)
            .unwrap();
        let web = own.get(&HostSpec::new("s1", "web")).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(web.services, vec!["http".to_string()]);
    }

    #[test]
    fn test_status_limited_to_requested_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let requested: BTreeSet<HostSpec> = [HostSpec::new("s2", "db")].into();
        let snapshot = backend.fetch_host_status(&requested).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&HostSpec::new("s2", "db")].state, 1);
    }

    #[test]
    fn test_fingerprint_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        assert_eq!(backend.modification_timestamps().unwrap().len(), 1);
        let sites = backend.site_program_starts().unwrap();
        assert_eq!(sites.get("s2"), Some(&None));
        assert!(backend.rule_config().unwrap().rules.is_empty());
    }

    #[test]
    fn test_missing_files_are_transport_errors() {
        let backend = FileBackend::new("/nonexistent/rules.toml", "/nonexistent/inventory.json");
        assert_matches!(backend.rule_config(), Err(SourceError::Transport { .. }));
        assert_matches!(backend.inventory(), Err(SourceError::Transport { .. }));
    }
}
