//! Compilation Cache
//!
//! One entry per user, all invalidated together when the fingerprint
//! (config modification times plus site program starts) changes. The lock
//! is never held while compiling; an entry compiled against a fingerprint
//! that went stale in the meantime is returned but not stored.

use crate::compiler::RuleCompiler;
use crate::config::runtime::CompilerPreferences;
use crate::error::CompileResult;
use crate::forest::Forest;
use crate::{log_debug, log_info, log_success};
use crate::logging::codes;
use crate::matching::Matcher;
use crate::rules::parse_rule_config;
use crate::sources::ConfigSource;
use crate::topology::{Identity, Topology, TopologyCatalog, TopologySource, VisibilityScope};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cache invalidation key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub config_timestamps: Vec<i64>,
    /// Program start per site, 0 for unreachable sites
    pub site_starts: Vec<(String, i64)>,
}

impl Fingerprint {
    pub fn current(config: &dyn ConfigSource) -> CompileResult<Self> {
        Ok(Self {
            config_timestamps: config.modification_timestamps()?,
            site_starts: config
                .site_program_starts()?
                .into_iter()
                .map(|(site, start)| (site, start.unwrap_or(0)))
                .collect(),
        })
    }
}

/// Everything compiled for one identity
#[derive(Debug)]
pub struct CacheEntry {
    pub forest: Forest,
    pub topology: Topology,
    pub scope: VisibilityScope,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Reused,
    Compiled,
}

#[derive(Debug, Default)]
struct CacheState {
    fingerprint: Option<Fingerprint>,
    entries: HashMap<String, Arc<CacheEntry>>,
    last_outcome: Option<CacheOutcome>,
}

pub struct CompilationCache {
    state: Mutex<CacheState>,
    matcher: Matcher,
    preferences: CompilerPreferences,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::with_preferences(CompilerPreferences::default())
    }

    pub fn with_preferences(preferences: CompilerPreferences) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            matcher: Matcher::new(),
            preferences,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Forest for `identity`, compiled only when no valid entry exists
    pub fn get_or_compile(
        &self,
        identity: &Identity,
        config: &dyn ConfigSource,
        topology: &dyn TopologySource,
    ) -> CompileResult<Arc<CacheEntry>> {
        self.lookup(identity, config, topology)
            .map(|(entry, _)| entry)
    }

    /// Like [`get_or_compile`](Self::get_or_compile), also reporting how the entry was obtained
    pub fn lookup(
        &self,
        identity: &Identity,
        config: &dyn ConfigSource,
        topology: &dyn TopologySource,
    ) -> CompileResult<(Arc<CacheEntry>, CacheOutcome)> {
        let fingerprint = Fingerprint::current(config)?;
        let scope = identity.scope();

        {
            let mut state = self.lock();
            if state.fingerprint.as_ref() != Some(&fingerprint) {
                if state.fingerprint.is_some() && self.preferences.log_cache_decisions {
                    log_info!("Configuration or site restart detected, dropping all compiled forests",
                        "entries" => state.entries.len()
                    );
                }
                state.entries.clear();
                state.fingerprint = Some(fingerprint.clone());
            }

            if let Some(entry) = state.entries.get(&identity.user) {
                if entry.scope == scope {
                    let entry = Arc::clone(entry);
                    state.last_outcome = Some(CacheOutcome::Reused);
                    if self.preferences.log_cache_decisions {
                        log_success!(codes::success::FOREST_REUSED, "Compiled forest reused",
                            "user" => &identity.user
                        );
                    }
                    return Ok((entry, CacheOutcome::Reused));
                }
            }
        }

        let entry = Arc::new(self.compile(identity, config, topology, fingerprint)?);

        let mut state = self.lock();
        if state.fingerprint.as_ref() == Some(&entry.fingerprint) {
            state
                .entries
                .insert(identity.user.clone(), Arc::clone(&entry));
        }
        state.last_outcome = Some(CacheOutcome::Compiled);
        Ok((entry, CacheOutcome::Compiled))
    }

    fn compile(
        &self,
        identity: &Identity,
        config: &dyn ConfigSource,
        topology: &dyn TopologySource,
        fingerprint: Fingerprint,
    ) -> CompileResult<CacheEntry> {
        log_debug!("Compiling forest", "user" => &identity.user);

        let rules = parse_rule_config(&config.rule_config()?)?;
        let topology = TopologyCatalog::new(topology).load(identity)?;
        let forest = RuleCompiler::new(&rules, &topology, &self.matcher)
            .with_preferences(self.preferences.clone())
            .compile()?;

        log_success!(codes::success::FOREST_COMPILED, "Forest compiled",
            "user" => &identity.user,
            "aggregations" => forest.aggregation_count(),
            "hosts" => topology.len()
        );

        Ok(CacheEntry {
            forest,
            topology,
            scope: identity.scope(),
            fingerprint,
        })
    }

    /// Outcome of the most recent successful lookup
    pub fn last_outcome(&self) -> Option<CacheOutcome> {
        self.lock().last_outcome
    }

    pub fn reused_compilation(&self) -> bool {
        self.last_outcome() == Some(CacheOutcome::Reused)
    }

    pub fn cached_users(&self) -> usize {
        self.lock().entries.len()
    }

    /// Drop every entry and the remembered fingerprint
    pub fn reset(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.fingerprint = None;
        state.last_outcome = None;
    }
}

impl Default for CompilationCache {
    fn default() -> Self {
        Self::new()
    }
}
