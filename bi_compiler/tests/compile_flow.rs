use assert_matches::assert_matches;
use bi_compiler::{
    render_forest, CacheOutcome, CompilationCache, CompileError, CompiledNode, HostSpec, Identity,
    RuleConfig, SourceError, StaticConfigSource, StaticTopologySource, Topology, TopologyEntry,
    TopologySource, VisibilityScope,
};

const RULES: &str = r#"
aggregations = [
    ["Web", "FOREACH_HOST", ["web"], "(web.*)", "webhost", ["$1$"]],
    ["Databases", "db", ["db1"]],
]

[rules.webhost]
description = "Webserver $HOST$"
arguments = ["HOST"]
nodes = [["$HOST$"], ["$HOST$", "http"], ["$HOST$", "REMAINING"]]

[rules.db]
description = "Database $DB$"
arguments = ["DB"]
function = "best"
nodes = [["$DB$", "mysql.*"]]
"#;

fn entry(tags: &[&str], services: &[&str]) -> TopologyEntry {
    TopologyEntry {
        tags: tags.iter().map(|t| t.to_string()).collect(),
        services: services.iter().map(|s| s.to_string()).collect(),
    }
}

fn topology_source() -> StaticTopologySource {
    let mut topology = Topology::new();
    topology.insert(HostSpec::new("s1", "web"), entry(&["web"], &["http", "cpu"]));
    topology.insert(
        HostSpec::new("s1", "webserver1"),
        entry(&["web"], &["http", "https"]),
    );
    topology.insert(HostSpec::new("s2", "db1"), entry(&[], &["mysql-io", "mysql-conn"]));
    StaticTopologySource::new(topology)
        .with_contacts(HostSpec::new("s1", "web"), ["alice"])
        .with_contacts(HostSpec::new("s2", "db1"), ["alice", "bob"])
}

fn config_source() -> StaticConfigSource {
    StaticConfigSource::new(RuleConfig::from_toml_str(RULES).unwrap())
        .with_site("s1", Some(100))
        .with_site("s2", None)
}

fn leaf_labels(node: &CompiledNode) -> Vec<String> {
    match node {
        CompiledNode::Leaf(leaf) => vec![format!("{}/{}", leaf.host.host, leaf.service)],
        CompiledNode::Interior(interior) => interior
            .children
            .iter()
            .flat_map(leaf_labels)
            .collect(),
    }
}

#[test]
fn test_toml_config_compiles_to_indexed_forest() {
    let cache = CompilationCache::new();
    let entry = cache
        .get_or_compile(&Identity::new("admin", true), &config_source(), &topology_source())
        .unwrap();
    let forest = &entry.forest;

    let web = forest.group("Web").unwrap();
    assert_eq!(web.len(), 2);
    assert_eq!(web[0].description, "Webserver web");
    assert_eq!(
        leaf_labels(&CompiledNode::Interior((*web[0]).clone())),
        vec!["web/HOST_STATE", "web/http", "web/cpu"]
    );
    assert_eq!(
        leaf_labels(&CompiledNode::Interior((*web[1]).clone())),
        vec!["webserver1/HOST_STATE", "webserver1/http", "webserver1/https"]
    );

    let databases = forest.group("Databases").unwrap();
    assert_eq!(databases[0].function_spec, "best");
    assert_eq!(databases[0].children.len(), 2);

    let db1 = HostSpec::new("s2", "db1");
    assert_eq!(forest.aggregations_by_host(&db1).len(), 1);
    assert_eq!(forest.affected_hosts(&db1)[0].group, "Databases");
    assert_eq!(forest.aggregation_count(), 3);

    let dump = render_forest(forest);
    assert!(dump.contains("Group: Web"));
    assert!(dump.contains("S/H/S: s2/db1/mysql-conn"));
}

#[test]
fn test_host_pattern_is_anchored() {
    let rules = RuleConfig::from_json_str(
        r#"{
            "rules": {"h": {"description": "H", "nodes": [["web"]]}},
            "aggregations": [["G", "h", []]]
        }"#,
    )
    .unwrap();
    let cache = CompilationCache::new();
    let entry = cache
        .get_or_compile(
            &Identity::new("admin", true),
            &StaticConfigSource::new(rules),
            &topology_source(),
        )
        .unwrap();
    let aggregation = &entry.forest.group("G").unwrap()[0];
    assert_eq!(
        aggregation.required_hosts.iter().collect::<Vec<_>>(),
        vec![&HostSpec::new("s1", "web")]
    );
}

#[test]
fn test_visibility_scope_limits_forest() {
    let cache = CompilationCache::new();
    let config = config_source();
    let topology = topology_source();

    let bob = cache
        .get_or_compile(&Identity::new("bob", false), &config, &topology)
        .unwrap();
    assert!(bob.forest.group("Web").is_none());
    assert_eq!(bob.scope, VisibilityScope::OwnContacts);

    // a scope change forces recompilation even with an unchanged fingerprint
    let bob = cache
        .get_or_compile(&Identity::new("bob", true), &config, &topology)
        .unwrap();
    assert_eq!(cache.last_outcome(), Some(CacheOutcome::Compiled));
    assert_eq!(bob.forest.group("Web").map(<[_]>::len), Some(2));
}

#[test]
fn test_timestamp_change_invalidates_every_identity() {
    let cache = CompilationCache::new();
    let config = config_source();
    let topology = topology_source();
    let alice = Identity::new("alice", false);
    let admin = Identity::new("admin", true);

    cache.get_or_compile(&alice, &config, &topology).unwrap();
    cache.get_or_compile(&admin, &config, &topology).unwrap();
    cache.get_or_compile(&alice, &config, &topology).unwrap();
    assert!(cache.reused_compilation());

    config.set_timestamps(vec![0, 1]);
    cache.get_or_compile(&alice, &config, &topology).unwrap();
    assert_eq!(cache.last_outcome(), Some(CacheOutcome::Compiled));
    cache.get_or_compile(&admin, &config, &topology).unwrap();
    assert_eq!(cache.last_outcome(), Some(CacheOutcome::Compiled));
}

struct Unreachable;

impl TopologySource for Unreachable {
    fn fetch_topology(&self, _user: &str, _scope: VisibilityScope) -> Result<Topology, SourceError> {
        Err(SourceError::transport("livestatus", "connection refused"))
    }
}

#[test]
fn test_backend_failure_is_not_cached() {
    let cache = CompilationCache::new();
    let admin = Identity::new("admin", true);

    assert_matches!(
        cache.get_or_compile(&admin, &config_source(), &Unreachable),
        Err(CompileError::Source(SourceError::Transport { .. }))
    );
    assert_eq!(cache.cached_users(), 0);
}

#[test]
fn test_configuration_errors_abort_compilation() {
    let cache = CompilationCache::new();
    let admin = Identity::new("admin", true);
    let config = StaticConfigSource::new(
        RuleConfig::from_json_str(
            r#"{
                "rules": {"h": {"description": "H", "arguments": ["A"], "nodes": [["web"]]}},
                "aggregations": [["G", "h", []]]
            }"#,
        )
        .unwrap(),
    );
    assert_matches!(
        cache.get_or_compile(&admin, &config, &topology_source()),
        Err(CompileError::ArgumentCount { expected: 1, actual: 0, .. })
    );

    config.replace_config(
        RuleConfig::from_json_str(r#"{"aggregations": [["G", "missing", []]]}"#).unwrap(),
    );
    assert_matches!(
        cache.get_or_compile(&admin, &config, &topology_source()),
        Err(CompileError::UnknownRule { rule, .. }) if rule == "missing"
    );

    config.replace_config(
        RuleConfig::from_json_str(
            r#"{
                "rules": {"h": {"description": "H", "nodes": [["web(", "cpu"]]}},
                "aggregations": [["G", "h", []]]
            }"#,
        )
        .unwrap(),
    );
    assert_matches!(
        cache.get_or_compile(&admin, &config, &topology_source()),
        Err(CompileError::InvalidPattern { pattern, .. }) if pattern.contains("web(")
    );
    assert_eq!(cache.cached_users(), 0);
}
