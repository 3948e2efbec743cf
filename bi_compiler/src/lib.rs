//! Rule compiler for business-intelligence health aggregations
//!
//! Turns a declarative rule configuration plus the live host/service
//! inventory into regex-free evaluation trees, cached per identity.

#[macro_use]
pub mod logging;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod forest;
pub mod matching;
pub mod rules;
pub mod sources;
pub mod topology;

pub use cache::{CacheEntry, CacheOutcome, CompilationCache, Fingerprint};
pub use compiler::{compile_forest, RuleCompiler};
pub use error::{CompileError, CompileResult};
pub use forest::{
    render_forest, render_tree, CompiledInterior, CompiledLeaf, CompiledNode, Forest,
    GroupedAggregation, LeafKey, ServiceRef,
};
pub use matching::Matcher;
pub use rules::{RuleConfig, RuleSet};
pub use sources::{ConfigSource, SourceError, StaticConfigSource};
pub use topology::{
    HostSpec, Identity, StaticTopologySource, Topology, TopologyEntry, TopologySource,
    VisibilityScope,
};
