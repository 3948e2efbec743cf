//! Compiled, regex-free evaluation trees and the indices over them

use crate::config::constants::HOST_STATE;
use crate::topology::HostSpec;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// What a leaf reports on
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceRef {
    HostState,
    Service(String),
}

impl Serialize for ServiceRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl ServiceRef {
    pub fn as_str(&self) -> &str {
        match self {
            Self::HostState => HOST_STATE,
            Self::Service(name) => name,
        }
    }

    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::HostState => None,
            Self::Service(name) => Some(name),
        }
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledLeaf {
    pub host: HostSpec,
    pub service: ServiceRef,
}

impl CompiledLeaf {
    pub fn new(host: HostSpec, service: ServiceRef) -> Self {
        Self { host, service }
    }

    /// Always exactly the leaf's own host
    pub fn required_hosts(&self) -> BTreeSet<HostSpec> {
        BTreeSet::from([self.host.clone()])
    }

    pub fn key(&self) -> LeafKey {
        LeafKey::new(&self.host.site, &self.host.host, self.service.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledInterior {
    pub required_hosts: BTreeSet<HostSpec>,
    pub description: String,
    /// `name` or `name!arg1!arg2...`
    pub function_spec: String,
    pub children: Vec<CompiledNode>,
}

impl CompiledInterior {
    /// Every leaf below this node in tree order
    pub fn leaves(&self) -> Vec<&CompiledLeaf> {
        let mut leaves = Vec::new();
        collect_leaves(&self.children, &mut leaves);
        leaves
    }
}

fn collect_leaves<'a>(nodes: &'a [CompiledNode], into: &mut Vec<&'a CompiledLeaf>) {
    for node in nodes {
        match node {
            CompiledNode::Leaf(leaf) => into.push(leaf),
            CompiledNode::Interior(interior) => collect_leaves(&interior.children, into),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompiledNode {
    Leaf(CompiledLeaf),
    Interior(CompiledInterior),
}

impl CompiledNode {
    pub fn required_hosts(&self) -> BTreeSet<HostSpec> {
        match self {
            Self::Leaf(leaf) => leaf.required_hosts(),
            Self::Interior(interior) => interior.required_hosts.clone(),
        }
    }
}

/// `(site, host, service)` with `HOST_STATE` for host-state leaves
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LeafKey {
    pub site: String,
    pub host: String,
    pub service: String,
}

impl LeafKey {
    pub fn new(site: &str, host: &str, service: &str) -> Self {
        Self {
            site: site.to_string(),
            host: host.to_string(),
            service: service.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedAggregation {
    pub group: String,
    pub aggregation: Arc<CompiledInterior>,
}

/// Top-level aggregations by group, plus lookup indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Forest {
    groups: BTreeMap<String, Vec<Arc<CompiledInterior>>>,
    aggregations_by_host: BTreeMap<HostSpec, Vec<GroupedAggregation>>,
    affected_hosts: BTreeMap<HostSpec, Vec<GroupedAggregation>>,
    affected_services: BTreeMap<LeafKey, Vec<GroupedAggregation>>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a finalized aggregation and update every index
    pub fn insert(&mut self, group: &str, aggregation: CompiledInterior) {
        let aggregation = Arc::new(aggregation);
        let entry = GroupedAggregation {
            group: group.to_string(),
            aggregation: Arc::clone(&aggregation),
        };

        if aggregation.required_hosts.len() == 1 {
            if let Some(host) = aggregation.required_hosts.iter().next() {
                self.aggregations_by_host
                    .entry(host.clone())
                    .or_default()
                    .push(entry.clone());
            }
        }

        for host in &aggregation.required_hosts {
            self.affected_hosts
                .entry(host.clone())
                .or_default()
                .push(entry.clone());
        }

        let keys: BTreeSet<LeafKey> = aggregation.leaves().iter().map(|l| l.key()).collect();
        for key in keys {
            self.affected_services
                .entry(key)
                .or_default()
                .push(entry.clone());
        }

        self.groups
            .entry(group.to_string())
            .or_default()
            .push(aggregation);
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<Arc<CompiledInterior>>> {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&[Arc<CompiledInterior>]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    pub fn aggregation_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Single-host aggregations of `host`
    pub fn aggregations_by_host(&self, host: &HostSpec) -> &[GroupedAggregation] {
        self.aggregations_by_host
            .get(host)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Aggregations referencing `host` anywhere
    pub fn affected_hosts(&self, host: &HostSpec) -> &[GroupedAggregation] {
        self.affected_hosts
            .get(host)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Aggregations containing the leaf `key`
    pub fn affected_services(&self, key: &LeafKey) -> &[GroupedAggregation] {
        self.affected_services
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn hosts_with_single_host_aggregations(&self) -> impl Iterator<Item = &HostSpec> {
        self.aggregations_by_host.keys()
    }
}

/// Indented debug dump of every group
pub fn render_forest(forest: &Forest) -> String {
    let mut out = String::new();
    for (group, trees) in forest.groups() {
        out.push_str(&format!("Group: {}\n", group));
        for tree in trees {
            render_interior(tree, "", &mut out);
        }
    }
    out
}

/// Indented debug dump of one subtree
pub fn render_tree(node: &CompiledNode) -> String {
    let mut out = String::new();
    render_node(node, "", &mut out);
    out
}

fn render_node(node: &CompiledNode, indent: &str, out: &mut String) {
    match node {
        CompiledNode::Leaf(leaf) => out.push_str(&format!(
            "{}S/H/S: {}/{}/{}\n",
            indent, leaf.host.site, leaf.host.host, leaf.service
        )),
        CompiledNode::Interior(interior) => render_interior(interior, indent, out),
    }
}

fn render_interior(node: &CompiledInterior, indent: &str, out: &mut String) {
    out.push_str(&format!("{}Aggregation:\n", indent));
    let indent = format!("{}    ", indent);
    let hosts: Vec<String> = node.required_hosts.iter().map(ToString::to_string).collect();
    out.push_str(&format!("{}Description:  {}\n", indent, node.description));
    out.push_str(&format!("{}Needed Hosts: {}\n", indent, hosts.join(" ")));
    out.push_str(&format!("{}Aggregation:  {}\n", indent, node.function_spec));
    out.push_str(&format!("{}Nodes:\n", indent));
    let child_indent = format!("{}  ", indent);
    for child in &node.children {
        render_node(child, &child_indent, out);
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(host: &str, service: Option<&str>) -> CompiledNode {
        CompiledNode::Leaf(CompiledLeaf::new(
            HostSpec::new("s1", host),
            service.map_or(ServiceRef::HostState, |s| ServiceRef::Service(s.to_string())),
        ))
    }

    fn interior(hosts: &[&str], children: Vec<CompiledNode>) -> CompiledInterior {
        CompiledInterior {
            required_hosts: hosts.iter().map(|h| HostSpec::new("s1", *h)).collect(),
            description: "Test".to_string(),
            function_spec: "worst".to_string(),
            children,
        }
    }

    #[test]
    fn test_indices() {
        let mut forest = Forest::new();
        forest.insert("Hosts", interior(&["web"], vec![leaf("web", None), leaf("web", Some("http"))]));
        forest.insert(
            "Apps",
            interior(&["web", "db"], vec![leaf("web", Some("http")), leaf("db", Some("mysql"))]),
        );

        let web = HostSpec::new("s1", "web");
        assert_eq!(forest.aggregations_by_host(&web).len(), 1);
        assert_eq!(forest.affected_hosts(&web).len(), 2);
        assert_eq!(
            forest
                .affected_services(&LeafKey::new("s1", "web", "http"))
                .len(),
            2
        );
        assert_eq!(
            forest
                .affected_services(&LeafKey::new("s1", "web", HOST_STATE))
                .len(),
            1
        );
        assert!(forest
            .affected_services(&LeafKey::new("s1", "db", "nope"))
            .is_empty());
        assert_eq!(forest.aggregation_count(), 2);
    }

    #[test]
    fn test_render_tree() {
        let tree = CompiledNode::Interior(interior(&["web"], vec![leaf("web", Some("http"))]));
        let expected = "Aggregation:\n    Description:  Test\n    Needed Hosts: s1/web\n    Aggregation:  worst\n    Nodes:\n      S/H/S: s1/web/http\n\n";
        assert_eq!(render_tree(&tree), expected);
    }

    #[test]
    fn test_leaf_serializes_host_state_sentinel() {
        let json = serde_json::to_value(leaf("web", None)).unwrap();
        assert_eq!(json["service"], "HOST_STATE");
        assert_eq!(json["kind"], "leaf");
    }
}
