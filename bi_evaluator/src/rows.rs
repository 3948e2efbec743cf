//! Table rows produced from evaluated aggregations

use crate::evaluator::EvaluatedNode;
use crate::state::State;
use bi_compiler::{CompiledInterior, HostSpec, LeafKey};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One evaluated top-level aggregation
#[derive(Debug, Clone, Serialize)]
pub struct AggregationRow {
    pub group: String,
    #[serde(skip)]
    pub tree: Arc<CompiledInterior>,
    pub result: EvaluatedNode,
    pub state: State,
    pub assumed_state: Option<State>,
    pub effective_state: State,
    pub name: String,
    pub output: String,
    pub hosts: BTreeSet<HostSpec>,
    pub function: String,
    /// Filled for host-table rows only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<HostColumns>,
}

/// State of the single host behind a host-table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostColumns {
    pub site: String,
    pub name: String,
    pub state: Option<i32>,
    pub plugin_output: String,
}

impl AggregationRow {
    pub fn new(group: &str, tree: Arc<CompiledInterior>, result: EvaluatedNode) -> Self {
        Self {
            group: group.to_string(),
            state: result.state,
            assumed_state: result.assumed_state,
            effective_state: result.effective_state(),
            name: tree.description.clone(),
            output: result.output.clone(),
            hosts: tree.required_hosts.clone(),
            function: tree.function_spec.clone(),
            host: None,
            tree,
            result,
        }
    }

    pub fn with_host(mut self, host: HostColumns) -> Self {
        self.host = Some(host);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableQuery {
    /// Only aggregations of this group are evaluated
    pub group: Option<String>,
    /// Only aggregations containing this leaf are evaluated
    pub service: Option<LeafKey>,
    /// Overrides the configured row limit
    pub limit: Option<usize>,
}

impl TableQuery {
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn service(mut self, key: LeafKey) -> Self {
        self.service = Some(key);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostTableQuery {
    /// Restrict to these sites; empty means every site
    pub sites: Vec<String>,
    pub limit: Option<usize>,
}

impl HostTableQuery {
    pub fn accepts(&self, host: &HostSpec) -> bool {
        self.sites.is_empty() || self.sites.iter().any(|site| *site == host.site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bi_compiler::{CompiledLeaf, CompiledNode, ServiceRef};

    #[test]
    fn test_row_copies_tree_and_result() {
        let host = HostSpec::new("s1", "db");
        let tree = Arc::new(CompiledInterior {
            required_hosts: [host.clone()].into(),
            description: "Database".to_string(),
            function_spec: "worst".to_string(),
            children: vec![CompiledNode::Leaf(CompiledLeaf::new(
                host,
                ServiceRef::HostState,
            ))],
        });
        let result = EvaluatedNode {
            state: State::Ok,
            assumed_state: Some(State::Crit),
            name: Some("Database".to_string()),
            output: String::new(),
            required_hosts: tree.required_hosts.clone(),
            function_spec: Some("worst".to_string()),
            children: Some(Vec::new()),
        };

        let row = AggregationRow::new("Databases", Arc::clone(&tree), result);
        assert_eq!(row.effective_state, State::Crit);
        assert_eq!(row.function, "worst");
        assert_eq!(row.name, "Database");

        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("tree").is_none());
        assert!(json.get("host").is_none());
        assert_eq!(json["effective_state"], 2);
    }

    #[test]
    fn test_host_query_site_filter() {
        let query = HostTableQuery {
            sites: vec!["s2".to_string()],
            limit: None,
        };
        assert!(!query.accepts(&HostSpec::new("s1", "a")));
        assert!(query.accepts(&HostSpec::new("s2", "a")));
        assert!(HostTableQuery::default().accepts(&HostSpec::new("s1", "a")));
    }
}
