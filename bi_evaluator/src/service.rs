//! Request-level facade tying the cache, evaluator and per-user stores together

use crate::assumptions::{AssumptionKey, AssumptionMap, AssumptionStore, MemoryAssumptionStore};
use crate::error::EvaluationResult;
use crate::evaluator::Evaluator;
use crate::functions::FunctionRegistry;
use crate::rows::{AggregationRow, HostColumns, HostTableQuery, TableQuery};
use crate::state::State;
use crate::status::StatusSource;
use crate::treestate::{parse_path_id, MemoryTreeStateStore, TreeState, TreeStateStore};
use bi_compiler::config::{CompilerPreferences, EvaluatorPreferences};
use bi_compiler::{log_debug, log_info};
use bi_compiler::{
    render_forest, CacheEntry, CompilationCache, CompiledInterior, ConfigSource, HostSpec,
    Identity, LeafKey, TopologySource,
};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct BiService {
    config: Arc<dyn ConfigSource>,
    topology: Arc<dyn TopologySource>,
    status: Arc<dyn StatusSource>,
    assumptions: Arc<dyn AssumptionStore>,
    tree_states: Arc<dyn TreeStateStore>,
    cache: CompilationCache,
    registry: FunctionRegistry,
    preferences: EvaluatorPreferences,
}

impl BiService {
    /// Service with in-memory stores and the built-in functions
    pub fn new(
        config: Arc<dyn ConfigSource>,
        topology: Arc<dyn TopologySource>,
        status: Arc<dyn StatusSource>,
    ) -> Self {
        Self {
            config,
            topology,
            status,
            assumptions: Arc::new(MemoryAssumptionStore::new()),
            tree_states: Arc::new(MemoryTreeStateStore::new()),
            cache: CompilationCache::new(),
            registry: FunctionRegistry::new(),
            preferences: EvaluatorPreferences::default(),
        }
    }

    pub fn with_assumption_store(mut self, store: Arc<dyn AssumptionStore>) -> Self {
        self.assumptions = store;
        self
    }

    pub fn with_tree_state_store(mut self, store: Arc<dyn TreeStateStore>) -> Self {
        self.tree_states = store;
        self
    }

    pub fn with_registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_compiler_preferences(mut self, preferences: CompilerPreferences) -> Self {
        self.cache = CompilationCache::with_preferences(preferences);
        self
    }

    pub fn with_evaluator_preferences(mut self, preferences: EvaluatorPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn cache(&self) -> &CompilationCache {
        &self.cache
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Compiled forest visible to `identity`
    pub fn compiled(&self, identity: &Identity) -> EvaluationResult<Arc<CacheEntry>> {
        Ok(self
            .cache
            .get_or_compile(identity, self.config.as_ref(), self.topology.as_ref())?)
    }

    /// Debug dump of the forest visible to `identity`
    pub fn render(&self, identity: &Identity) -> EvaluationResult<String> {
        Ok(render_forest(&self.compiled(identity)?.forest))
    }

    /// Evaluate aggregations, optionally restricted to a group or to the
    /// aggregations containing one service
    pub fn table(
        &self,
        identity: &Identity,
        query: &TableQuery,
    ) -> EvaluationResult<Vec<AggregationRow>> {
        let entry = self.compiled(identity)?;
        let assumptions = self.assumptions.load(&identity.user)?;
        let limit = query.limit.unwrap_or(self.preferences.row_limit);

        let in_group = |group: &str| query.group.as_deref().map_or(true, |g| g == group);
        let candidates: Vec<(&str, &Arc<CompiledInterior>)> = match &query.service {
            Some(key) => entry
                .forest
                .affected_services(key)
                .iter()
                .filter(|grouped| in_group(&grouped.group))
                .map(|grouped| (grouped.group.as_str(), &grouped.aggregation))
                .collect(),
            None => entry
                .forest
                .groups()
                .iter()
                .filter(|(group, _)| in_group(group))
                .flat_map(|(group, trees)| trees.iter().map(move |tree| (group.as_str(), tree)))
                .collect(),
        };

        let evaluator = self.evaluator(&assumptions);
        let mut rows = Vec::new();
        for (group, tree) in candidates {
            if rows.len() >= limit {
                log_debug!("Row limit reached", "limit" => limit);
                break;
            }
            let result = evaluator.evaluate_with_source(tree, self.status.as_ref())?;
            rows.push(AggregationRow::new(group, Arc::clone(tree), result));
        }
        Ok(rows)
    }

    /// Evaluate every single-host aggregation, one row per aggregation
    /// carrying its host's own state
    pub fn host_table(
        &self,
        identity: &Identity,
        query: &HostTableQuery,
    ) -> EvaluationResult<Vec<AggregationRow>> {
        let entry = self.compiled(identity)?;
        let assumptions = self.assumptions.load(&identity.user)?;
        let limit = query.limit.unwrap_or(self.preferences.row_limit);

        let hosts: BTreeSet<HostSpec> = entry
            .forest
            .hosts_with_single_host_aggregations()
            .filter(|host| query.accepts(host))
            .cloned()
            .collect();
        let snapshot = self.status.fetch_host_status(&hosts)?;
        if self.preferences.log_status_fetches {
            log_debug!("Host status fetched",
                "requested" => hosts.len(),
                "received" => snapshot.len()
            );
        }

        let evaluator = self.evaluator(&assumptions);
        let mut rows = Vec::new();
        'hosts: for host in &hosts {
            let status = snapshot.get(host);
            for grouped in entry.forest.aggregations_by_host(host) {
                if rows.len() >= limit {
                    break 'hosts;
                }
                let result = evaluator.evaluate(&grouped.aggregation, &snapshot)?;
                let columns = HostColumns {
                    site: host.site.clone(),
                    name: host.host.clone(),
                    state: status.map(|s| s.state),
                    plugin_output: status.map(|s| s.plugin_output.clone()).unwrap_or_default(),
                };
                rows.push(
                    AggregationRow::new(&grouped.group, Arc::clone(&grouped.aggregation), result)
                        .with_host(columns),
                );
            }
        }
        Ok(rows)
    }

    /// Whether the host, or one of its services, is used by any aggregation
    pub fn is_part_of_aggregation(
        &self,
        identity: &Identity,
        host: &HostSpec,
        service: Option<&str>,
    ) -> EvaluationResult<bool> {
        let entry = self.compiled(identity)?;
        Ok(match service {
            None => !entry.forest.affected_hosts(host).is_empty(),
            Some(service) => !entry
                .forest
                .affected_services(&LeafKey::new(&host.site, &host.host, service))
                .is_empty(),
        })
    }

    pub fn assumptions(&self, identity: &Identity) -> EvaluationResult<AssumptionMap> {
        Ok(self.assumptions.load(&identity.user)?)
    }

    /// Store an override for `key`; `None` removes it
    pub fn set_assumption(
        &self,
        identity: &Identity,
        key: AssumptionKey,
        state: Option<State>,
    ) -> EvaluationResult<()> {
        let mut assumptions = self.assumptions.load(&identity.user)?;
        match state {
            Some(state) => {
                log_info!("Assumption set",
                    "user" => &identity.user,
                    "host" => &key.host,
                    "state" => state
                );
                assumptions.insert(key, state);
            }
            None => {
                log_info!("Assumption cleared", "user" => &identity.user, "host" => &key.host);
                assumptions.remove(&key);
            }
        }
        Ok(self.assumptions.save(&identity.user, &assumptions)?)
    }

    pub fn tree_state(&self, identity: &Identity) -> EvaluationResult<TreeState> {
        Ok(self.tree_states.load(&identity.user)?)
    }

    /// Record a tree node as open or closed; `path_id` is `<level>:<path>`
    pub fn save_tree_state(
        &self,
        identity: &Identity,
        path_id: &str,
        open: bool,
    ) -> EvaluationResult<TreeState> {
        let (level, path) = parse_path_id(path_id)?;
        let mut state = self.tree_states.load(&identity.user)?;
        state.update(level, path, open);
        self.tree_states.save(&identity.user, &state)?;
        Ok(state)
    }

    fn evaluator<'a>(&'a self, assumptions: &'a AssumptionMap) -> Evaluator<'a> {
        Evaluator::new(&self.registry, assumptions)
            .with_status_fetch_logging(self.preferences.log_status_fetches)
    }
}
