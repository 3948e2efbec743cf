//! Rule Compiler
//!
//! Expands the typed rule set against a topology snapshot into a [`Forest`].
//! Each top-level expansion is a two-phase build: phase one emits typed
//! placeholders for `REMAINING` leaves and records them in a deferred list;
//! phase two resolves them in registration order, splices the resulting
//! leaves in place, recomputes required hosts and prunes empty nodes.

use crate::config::constants::{ALL_HOSTS, ALL_HOSTS_SUFFIX, TAG_FILTER_SEPARATOR};
use crate::config::runtime::CompilerPreferences;
use crate::error::{CompileError, CompileResult};
use crate::forest::{CompiledInterior, CompiledLeaf, CompiledNode, Forest, ServiceRef};
use crate::{log_debug, log_error};
use crate::matching::{Captures, Matcher};
use crate::rules::{CallNode, Foreach, LeafSpec, Rule, RuleCall, RuleSet, ServiceSpec};
use crate::topology::{HostSpec, Topology};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Node of a tree still under construction
#[derive(Debug)]
enum BuildNode {
    Leaf(CompiledLeaf),
    Interior(BuildInterior),
    Remaining { slot: usize },
}

#[derive(Debug)]
struct BuildInterior {
    description: String,
    function_spec: String,
    children: Vec<BuildNode>,
}

/// A `REMAINING` placeholder waiting for phase two
#[derive(Debug)]
struct Deferred {
    host: HostSpec,
    slot: usize,
}

pub struct RuleCompiler<'a> {
    rules: &'a RuleSet,
    topology: &'a Topology,
    matcher: &'a Matcher,
    max_depth: usize,
    preferences: CompilerPreferences,
}

impl<'a> RuleCompiler<'a> {
    pub fn new(rules: &'a RuleSet, topology: &'a Topology, matcher: &'a Matcher) -> Self {
        Self {
            rules,
            topology,
            matcher,
            max_depth: crate::config::compile_time::rules::MAX_RULE_DEPTH,
            preferences: CompilerPreferences::default(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_preferences(mut self, preferences: CompilerPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Compile every aggregation definition into one forest
    pub fn compile(&self) -> CompileResult<Forest> {
        let mut forest = Forest::new();

        for definition in &self.rules.aggregations {
            for aggregation in self.expand_top_level(&definition.call).map_err(report)? {
                if self.preferences.log_aggregation_details {
                    log_debug!("Aggregation compiled",
                        "group" => &definition.group,
                        "description" => &aggregation.description,
                        "hosts" => aggregation.required_hosts.len()
                    );
                }
                forest.insert(&definition.group, aggregation);
            }
        }

        Ok(forest)
    }

    fn lookup(&self, name: &str) -> CompileResult<&'a Rule> {
        self.rules
            .rule(name)
            .ok_or_else(|| CompileError::unknown_rule(name, self.rules.rule_names()))
    }

    /// One argument list per instantiation of `call`
    fn argument_sets(&self, call: &RuleCall) -> CompileResult<Vec<Vec<String>>> {
        match &call.foreach {
            None => Ok(vec![call.args.clone()]),
            Some(foreach) => Ok(self
                .foreach_matches(foreach)?
                .iter()
                .map(|captures| {
                    call.args
                        .iter()
                        .map(|arg| Matcher::substitute(arg, captures))
                        .collect()
                })
                .collect()),
        }
    }

    fn expand_top_level(&self, call: &RuleCall) -> CompileResult<Vec<CompiledInterior>> {
        let rule = self.lookup(&call.rule)?;
        let mut aggregations = Vec::new();

        for args in self.argument_sets(call)? {
            let mut deferred = Vec::new();
            let root = self.expand_rule(rule, &args, 0, &mut deferred)?;
            if let Some(aggregation) = self.finalize(root, deferred) {
                aggregations.push(aggregation);
            }
        }

        Ok(aggregations)
    }

    fn expand_nested(
        &self,
        call: &RuleCall,
        depth: usize,
        deferred: &mut Vec<Deferred>,
    ) -> CompileResult<Vec<BuildNode>> {
        let rule = self.lookup(&call.rule)?;
        self.argument_sets(call)?
            .iter()
            .map(|args| {
                self.expand_rule(rule, args, depth, deferred)
                    .map(BuildNode::Interior)
            })
            .collect()
    }

    fn expand_rule(
        &self,
        rule: &Rule,
        args: &[String],
        depth: usize,
        deferred: &mut Vec<Deferred>,
    ) -> CompileResult<BuildInterior> {
        if depth >= self.max_depth {
            return Err(CompileError::DepthExceeded {
                rule: rule.name.clone(),
                max_depth: self.max_depth,
            });
        }

        if rule.arguments.len() != args.len() {
            return Err(CompileError::argument_count(
                &rule.name,
                &rule.arguments,
                args.len(),
            ));
        }

        let bindings: Vec<(String, String)> = rule
            .arguments
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();

        let mut children = Vec::new();
        for node in &rule.nodes {
            match node {
                CallNode::Leaf(leaf) => self.expand_leaf(leaf, &bindings, &mut children, deferred)?,
                CallNode::Call(call) => {
                    let call = call.substituted(&bindings);
                    children.extend(self.expand_nested(&call, depth + 1, deferred)?);
                }
            }
        }

        Ok(BuildInterior {
            description: Matcher::substitute_named(&rule.description, &bindings),
            function_spec: rule.function.clone(),
            children,
        })
    }

    fn expand_leaf(
        &self,
        leaf: &LeafSpec,
        bindings: &[(String, String)],
        children: &mut Vec<BuildNode>,
        deferred: &mut Vec<Deferred>,
    ) -> CompileResult<()> {
        let host_pattern = Matcher::substitute_named(&leaf.host, bindings);
        let hosts = self.leaf_hosts(&host_pattern)?;

        match &leaf.service {
            ServiceSpec::HostState => {
                children.extend(hosts.into_iter().map(|host| {
                    BuildNode::Leaf(CompiledLeaf::new(host.clone(), ServiceRef::HostState))
                }));
            }
            ServiceSpec::Remaining => {
                for host in hosts {
                    let slot = deferred.len();
                    deferred.push(Deferred {
                        host: host.clone(),
                        slot,
                    });
                    children.push(BuildNode::Remaining { slot });
                }
            }
            ServiceSpec::Pattern(pattern) => {
                let pattern = Matcher::substitute_named(pattern, bindings);
                let mut found = Vec::new();
                for host in hosts {
                    for service in &self.topology[host].services {
                        if self.matcher.match_service(&pattern, service)?.is_some() {
                            found.push((host, service));
                        }
                    }
                }
                found.sort();
                children.extend(found.into_iter().map(|(host, service)| {
                    BuildNode::Leaf(CompiledLeaf::new(
                        host.clone(),
                        ServiceRef::Service(service.clone()),
                    ))
                }));
            }
        }

        Ok(())
    }

    /// Hosts selected by a leaf host pattern, in host order
    fn leaf_hosts(&self, pattern: &str) -> CompileResult<Vec<&'a HostSpec>> {
        if pattern == ALL_HOSTS {
            return Ok(self.topology.keys().collect());
        }

        if let Some(tag_filter) = pattern.strip_suffix(ALL_HOSTS_SUFFIX) {
            let required: Vec<&str> = tag_filter
                .split(TAG_FILTER_SEPARATOR)
                .filter(|tag| !tag.is_empty())
                .collect();
            return Ok(self
                .topology
                .iter()
                .filter(|(_, entry)| Matcher::match_tags(&entry.tags, &required))
                .map(|(host, _)| host)
                .collect());
        }

        let mut hosts = Vec::new();
        for host in self.topology.keys() {
            if self.matcher.match_host(pattern, host)?.is_some() {
                hosts.push(host);
            }
        }
        Ok(hosts)
    }

    /// Distinct capture tuples of a FOREACH modifier, sorted
    fn foreach_matches(&self, foreach: &Foreach) -> CompileResult<BTreeSet<Captures>> {
        let mut matches = BTreeSet::new();

        for (host, entry) in self.topology {
            if !Matcher::match_tags(&entry.tags, foreach.tags()) {
                continue;
            }

            match foreach {
                Foreach::Host { host: pattern, .. } => {
                    if let Some(captures) = self.matcher.match_host(pattern, host)? {
                        matches.insert(captures);
                    }
                }
                Foreach::Service {
                    host: host_pattern,
                    service: service_pattern,
                    ..
                } => {
                    let Some(host_captures) = self.matcher.match_host(host_pattern, host)? else {
                        continue;
                    };
                    for service in &entry.services {
                        if let Some(service_captures) =
                            self.matcher.match_service(service_pattern, service)?
                        {
                            let mut captures = host_captures.clone();
                            captures.extend(service_captures);
                            matches.insert(captures);
                        }
                    }
                }
            }
        }

        Ok(matches)
    }

    /// Phase two: resolve placeholders, splice, recompute hosts, prune
    fn finalize(&self, root: BuildInterior, deferred: Vec<Deferred>) -> Option<CompiledInterior> {
        let mut claimed: HashMap<HostSpec, HashSet<String>> = HashMap::new();
        collect_claimed(&root.children, &mut claimed);

        let mut resolved: HashMap<usize, Vec<CompiledLeaf>> = HashMap::new();
        for Deferred { host, slot } in deferred {
            let taken = claimed.entry(host.clone()).or_default();
            let mut remaining: Vec<&String> = self
                .topology
                .get(&host)
                .map(|entry| entry.services.iter().filter(|s| !taken.contains(*s)).collect())
                .unwrap_or_default();
            remaining.sort();
            remaining.dedup();

            let leaves = remaining
                .into_iter()
                .map(|service| {
                    taken.insert(service.clone());
                    CompiledLeaf::new(host.clone(), ServiceRef::Service(service.clone()))
                })
                .collect();
            resolved.insert(slot, leaves);
        }

        seal_interior(root, &mut resolved)
    }
}

fn collect_claimed(nodes: &[BuildNode], claimed: &mut HashMap<HostSpec, HashSet<String>>) {
    for node in nodes {
        match node {
            BuildNode::Leaf(leaf) => {
                if let ServiceRef::Service(service) = &leaf.service {
                    claimed
                        .entry(leaf.host.clone())
                        .or_default()
                        .insert(service.clone());
                }
            }
            BuildNode::Interior(interior) => collect_claimed(&interior.children, claimed),
            BuildNode::Remaining { .. } => {}
        }
    }
}

/// Convert to the compiled form. Interior nodes left without children vanish.
fn seal_interior(
    node: BuildInterior,
    resolved: &mut HashMap<usize, Vec<CompiledLeaf>>,
) -> Option<CompiledInterior> {
    let mut children = Vec::new();
    for child in node.children {
        match child {
            BuildNode::Leaf(leaf) => children.push(CompiledNode::Leaf(leaf)),
            BuildNode::Remaining { slot } => children.extend(
                resolved
                    .remove(&slot)
                    .unwrap_or_default()
                    .into_iter()
                    .map(CompiledNode::Leaf),
            ),
            BuildNode::Interior(interior) => {
                if let Some(sealed) = seal_interior(interior, resolved) {
                    children.push(CompiledNode::Interior(sealed));
                }
            }
        }
    }

    if children.is_empty() {
        return None;
    }

    let required_hosts = children
        .iter()
        .flat_map(|child| child.required_hosts())
        .collect();

    Some(CompiledInterior {
        required_hosts,
        description: node.description,
        function_spec: node.function_spec,
        children,
    })
}

fn report(err: CompileError) -> CompileError {
    log_error!(err.error_code(), "Forest compilation failed", "error" => &err);
    err
}

/// Compile `rules` against `topology` with default limits
pub fn compile_forest(rules: &RuleSet, topology: &Topology, matcher: &Matcher) -> CompileResult<Forest> {
    RuleCompiler::new(rules, topology, matcher).compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{parse_rule_config, RuleConfig};
    use crate::topology::TopologyEntry;
    use assert_matches::assert_matches;

    fn topology(hosts: &[(&str, &[&str], &[&str])]) -> Topology {
        hosts
            .iter()
            .map(|(name, tags, services)| {
                (
                    HostSpec::new("s1", *name),
                    TopologyEntry {
                        tags: tags.iter().map(|t| t.to_string()).collect(),
                        services: services.iter().map(|s| s.to_string()).collect(),
                    },
                )
            })
            .collect()
    }

    fn rules(json: &str) -> RuleSet {
        parse_rule_config(&RuleConfig::from_json_str(json).unwrap()).unwrap()
    }

    fn leaf_names(node: &CompiledInterior) -> Vec<String> {
        node.leaves()
            .iter()
            .map(|leaf| format!("{}/{}", leaf.host.host, leaf.service))
            .collect()
    }

    #[test]
    fn test_foreach_host_in_sorted_order() {
        let topo = topology(&[("host-c", &[], &[]), ("host-a", &[], &[]), ("host-b", &[], &[])]);
        let rules = rules(
            r#"{
                "rules": {"host": {"description": "Host $H$", "arguments": ["H"], "nodes": [["host-$H$"]]}},
                "aggregations": [["Hosts", "FOREACH_HOST", "host-(.*)", "host", ["$1$"]]]
            }"#,
        );
        let forest = compile_forest(&rules, &topo, &Matcher::new()).unwrap();
        let descriptions: Vec<&str> = forest.group("Hosts").unwrap().iter().map(|a| a.description.as_str()).collect();
        assert_eq!(descriptions, vec!["Host a", "Host b", "Host c"]);
    }

    #[test]
    fn test_remaining_takes_unclaimed_services() {
        let topo = topology(&[("srv", &[], &["disk", "cpu", "mem"])]);
        let rules = rules(
            r#"{
                "rules": {"srv": {"description": "Server", "nodes": [["srv", "disk"], ["srv", "cpu"], ["srv", "REMAINING"]]}},
                "aggregations": [["Servers", "srv", []]]
            }"#,
        );
        let forest = compile_forest(&rules, &topo, &Matcher::new()).unwrap();
        let aggregation = &forest.group("Servers").unwrap()[0];
        assert_eq!(leaf_names(aggregation), vec!["srv/disk", "srv/cpu", "srv/mem"]);
        assert_eq!(aggregation.required_hosts.len(), 1);
    }

    #[test]
    fn test_first_remaining_wins() {
        let topo = topology(&[("srv", &[], &["a", "b"])]);
        let rules = rules(
            r#"{
                "rules": {
                    "first": {"description": "First", "nodes": [["srv", "REMAINING"]]},
                    "second": {"description": "Second", "nodes": [["srv", "REMAINING"]]},
                    "top": {"description": "Top", "nodes": [["first", []], ["second", []]]}
                },
                "aggregations": [["G", "top", []]]
            }"#,
        );
        let forest = compile_forest(&rules, &topo, &Matcher::new()).unwrap();
        let top = &forest.group("G").unwrap()[0];
        // the second subtree is left empty and pruned
        assert_eq!(top.children.len(), 1);
        assert_eq!(leaf_names(top), vec!["srv/a", "srv/b"]);
    }

    #[test]
    fn test_remaining_host_counts_as_required() {
        let topo = topology(&[("web", &[], &["http"]), ("db", &[], &["mysql"])]);
        let rules = rules(
            r#"{
                "rules": {"app": {"description": "App", "nodes": [["web"], ["db", "REMAINING"]]}},
                "aggregations": [["Apps", "app", []]]
            }"#,
        );
        let forest = compile_forest(&rules, &topo, &Matcher::new()).unwrap();
        let app = &forest.group("Apps").unwrap()[0];
        assert!(app.required_hosts.contains(&HostSpec::new("s1", "db")));
        assert!(forest.aggregations_by_host(&HostSpec::new("s1", "web")).is_empty());
    }

    #[test]
    fn test_self_recursion_hits_depth_limit() {
        let rules = rules(
            r#"{
                "rules": {"loop": {"description": "Loop", "nodes": [["loop", []]]}},
                "aggregations": [["G", "loop", []]]
            }"#,
        );
        assert_matches!(
            compile_forest(&rules, &Topology::new(), &Matcher::new()),
            Err(CompileError::DepthExceeded { rule, max_depth: 50 }) if rule == "loop"
        );
    }

    #[test]
    fn test_indirect_recursion_hits_depth_limit() {
        let rules = rules(
            r#"{
                "rules": {
                    "a": {"description": "A", "nodes": [["b", []]]},
                    "b": {"description": "B", "nodes": [["a", []]]}
                },
                "aggregations": [["G", "a", []]]
            }"#,
        );
        assert_matches!(
            compile_forest(&rules, &Topology::new(), &Matcher::new()),
            Err(CompileError::DepthExceeded { rule, max_depth: 50 }) if rule == "a"
        );
    }

    #[test]
    fn test_custom_depth_limit() {
        let topo = topology(&[("srv", &[], &[])]);
        let rules = rules(
            r#"{
                "rules": {
                    "top": {"description": "Top", "nodes": [["mid", []]]},
                    "mid": {"description": "Mid", "nodes": [["bottom", []]]},
                    "bottom": {"description": "Bottom", "nodes": [["srv"]]}
                },
                "aggregations": [["G", "top", []]]
            }"#,
        );
        let matcher = Matcher::new();

        assert_matches!(
            RuleCompiler::new(&rules, &topo, &matcher).with_max_depth(2).compile(),
            Err(CompileError::DepthExceeded { rule, max_depth: 2 }) if rule == "bottom"
        );
        let forest = RuleCompiler::new(&rules, &topo, &matcher)
            .with_max_depth(3)
            .compile()
            .unwrap();
        assert_eq!(leaf_names(&forest.group("G").unwrap()[0]), vec!["srv/HOST_STATE"]);
    }

    #[test]
    fn test_empty_nodes_are_pruned() {
        let topo = topology(&[("web", &[], &["http"])]);
        let rules = rules(
            r#"{
                "rules": {
                    "none": {"description": "None", "nodes": [["nomatch"]]},
                    "outer": {"description": "Outer", "nodes": [["none", []]]},
                    "mixed": {"description": "Mixed", "nodes": [["none", []], ["web", "http"]]}
                },
                "aggregations": [["Empty", "outer", []], ["Mixed", "mixed", []]]
            }"#,
        );
        let forest = compile_forest(&rules, &topo, &Matcher::new()).unwrap();
        assert!(forest.group("Empty").is_none());
        let mixed = &forest.group("Mixed").unwrap()[0];
        assert_eq!(mixed.children.len(), 1);
        assert_matches!(mixed.children[0], CompiledNode::Leaf(_));
    }

    #[test]
    fn test_unknown_rule_and_arity() {
        let unknown = rules(r#"{"rules": {}, "aggregations": [["G", "missing", []]]}"#);
        assert_matches!(
            compile_forest(&unknown, &Topology::new(), &Matcher::new()),
            Err(CompileError::UnknownRule { rule, .. }) if rule == "missing"
        );

        let arity = rules(
            r#"{
                "rules": {"r": {"description": "R", "arguments": ["A"], "nodes": []}},
                "aggregations": [["G", "r", []]]
            }"#,
        );
        assert_matches!(
            compile_forest(&arity, &Topology::new(), &Matcher::new()),
            Err(CompileError::ArgumentCount { expected: 1, actual: 0, .. })
        );
    }

    #[test]
    fn test_tag_filter_and_all_hosts() {
        let topo = topology(&[("a", &["prod"], &[]), ("b", &["prod", "standby"], &[]), ("c", &[], &[])]);
        let rules = rules(
            r#"{
                "rules": {
                    "active": {"description": "Active", "nodes": [["prod|!standby|@all"]]},
                    "all": {"description": "All", "nodes": [["@all"]]}
                },
                "aggregations": [["G", "active", []], ["G", "all", []]]
            }"#,
        );
        let forest = compile_forest(&rules, &topo, &Matcher::new()).unwrap();
        let group = forest.group("G").unwrap();
        assert_eq!(leaf_names(&group[0]), vec!["a/HOST_STATE"]);
        assert_eq!(group[1].children.len(), 3);
    }

    #[test]
    fn test_nested_foreach_service_with_argument_substitution() {
        let topo = topology(&[("web", &[], &["fs_/", "fs_/var", "cpu"])]);
        let rules = rules(
            r#"{
                "rules": {
                    "fs": {"description": "FS $P$", "arguments": ["HOST", "P"], "nodes": [["$HOST$", "fs_$P$$"]]},
                    "host": {"description": "Host $HOST$", "arguments": ["HOST"],
                             "nodes": [["FOREACH_SERVICE", "$HOST$", "fs_(.*)", "fs", ["$HOST$", "$1$"]]]}
                },
                "aggregations": [["Hosts", "host", ["web"]]]
            }"#,
        );
        let forest = compile_forest(&rules, &topo, &Matcher::new()).unwrap();
        let host = &forest.group("Hosts").unwrap()[0];
        assert_eq!(host.description, "Host web");
        assert_eq!(host.children.len(), 2);
        assert_eq!(leaf_names(host), vec!["web/fs_/", "web/fs_/var"]);
    }
}
