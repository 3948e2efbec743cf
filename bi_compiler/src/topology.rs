//! Topology Catalog: the host/service inventory visible to one identity

use crate::error::CompileResult;
use crate::{log_debug, log_error};
use crate::sources::SourceError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// A monitored host within a multi-site deployment
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostSpec {
    pub site: String,
    pub host: String,
}

impl HostSpec {
    pub fn new(site: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            host: host.into(),
        }
    }

    /// `site<SEP>host`, the form site-qualified patterns match against
    pub fn qualified(&self, separator: char) -> String {
        format!("{}{}{}", self.site, separator, self.host)
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.host)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEntry {
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

pub type Topology = BTreeMap<HostSpec, TopologyEntry>;

/// Requesting user plus whether they may see every host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub see_all: bool,
}

impl Identity {
    pub fn new(user: impl Into<String>, see_all: bool) -> Self {
        Self {
            user: user.into(),
            see_all,
        }
    }

    pub fn scope(&self) -> VisibilityScope {
        if self.see_all {
            VisibilityScope::All
        } else {
            VisibilityScope::OwnContacts
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityScope {
    All,
    OwnContacts,
}

/// Backend delivering the static inventory
pub trait TopologySource: Send + Sync {
    fn fetch_topology(&self, user: &str, scope: VisibilityScope) -> Result<Topology, SourceError>;
}

/// Loads the inventory once per compilation
pub struct TopologyCatalog<'a> {
    source: &'a dyn TopologySource,
}

impl<'a> TopologyCatalog<'a> {
    pub fn new(source: &'a dyn TopologySource) -> Self {
        Self { source }
    }

    pub fn load(&self, identity: &Identity) -> CompileResult<Topology> {
        let topology = self
            .source
            .fetch_topology(&identity.user, identity.scope())
            .map_err(|e| {
                log_error!(e.error_code(), "Topology fetch failed", "user" => &identity.user, "error" => &e);
                e
            })?;

        log_debug!("Topology loaded",
            "user" => &identity.user,
            "hosts" => topology.len()
        );
        Ok(topology)
    }
}

/// In-memory inventory with optional per-host contact lists
#[derive(Debug, Clone, Default)]
pub struct StaticTopologySource {
    topology: Topology,
    contacts: HashMap<HostSpec, BTreeSet<String>>,
}

impl StaticTopologySource {
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            contacts: HashMap::new(),
        }
    }

    /// Restrict `host` to the given contacts for `OwnContacts` requests
    pub fn with_contacts<I, S>(mut self, host: HostSpec, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contacts
            .insert(host, users.into_iter().map(Into::into).collect());
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}

impl TopologySource for StaticTopologySource {
    fn fetch_topology(&self, user: &str, scope: VisibilityScope) -> Result<Topology, SourceError> {
        Ok(match scope {
            VisibilityScope::All => self.topology.clone(),
            VisibilityScope::OwnContacts => self
                .topology
                .iter()
                .filter(|(host, _)| {
                    self.contacts
                        .get(*host)
                        .is_some_and(|users| users.contains(user))
                })
                .map(|(host, entry)| (host.clone(), entry.clone()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(services: &[&str]) -> TopologyEntry {
        TopologyEntry {
            tags: BTreeSet::new(),
            services: services.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_identity_scope() {
        assert_eq!(Identity::new("admin", true).scope(), VisibilityScope::All);
        assert_eq!(
            Identity::new("guest", false).scope(),
            VisibilityScope::OwnContacts
        );
    }

    #[test]
    fn test_host_spec_display_and_qualified() {
        let host = HostSpec::new("s1", "web");
        assert_eq!(host.to_string(), "s1/web");
        assert_eq!(host.qualified('#'), "s1#web");
    }

    #[test]
    fn test_own_contacts_filters_hosts() {
        let mut topology = Topology::new();
        topology.insert(HostSpec::new("s1", "web"), entry(&["http"]));
        topology.insert(HostSpec::new("s1", "db"), entry(&["mysql"]));
        let source = StaticTopologySource::new(topology)
            .with_contacts(HostSpec::new("s1", "web"), ["alice"]);

        let catalog = TopologyCatalog::new(&source);
        let own = catalog.load(&Identity::new("alice", false)).unwrap();
        assert_eq!(own.len(), 1);
        assert!(own.contains_key(&HostSpec::new("s1", "web")));

        let all = catalog.load(&Identity::new("alice", true)).unwrap();
        assert_eq!(all.len(), 2);
    }
}
