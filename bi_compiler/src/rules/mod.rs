//! Rule configuration: the raw positional format and its typed form

pub mod parser;

use crate::config::constants::{FOREACH_HOST, FOREACH_SERVICE, HOST_STATE, REMAINING};
use crate::matching::Matcher;
use crate::sources::SourceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub use parser::parse_rule_config;

/// Rule configuration as authored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub rules: BTreeMap<String, RuleDefinition>,

    /// Positional entries `[group, <call...>]`
    #[serde(default)]
    pub aggregations: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default = "default_function")]
    pub function: String,
    #[serde(default)]
    pub nodes: Vec<Value>,
}

fn default_function() -> String {
    "worst".to_string()
}

impl RuleConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, SourceError> {
        toml::from_str(text).map_err(|e| SourceError::invalid_data("rule config", e))
    }

    pub fn from_json_str(text: &str) -> Result<Self, SourceError> {
        serde_json::from_str(text).map_err(|e| SourceError::invalid_data("rule config", e))
    }
}

/// Service part of a leaf node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSpec {
    HostState,
    Remaining,
    Pattern(String),
}

impl ServiceSpec {
    pub fn from_text(text: &str) -> Self {
        match text {
            HOST_STATE => Self::HostState,
            REMAINING => Self::Remaining,
            pattern => Self::Pattern(pattern.to_string()),
        }
    }
}

impl fmt::Display for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostState => f.write_str(HOST_STATE),
            Self::Remaining => f.write_str(REMAINING),
            Self::Pattern(pattern) => f.write_str(pattern),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpec {
    pub host: String,
    pub service: ServiceSpec,
}

/// Iteration modifier of a rule call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Foreach {
    Host {
        tags: Vec<String>,
        host: String,
    },
    Service {
        tags: Vec<String>,
        host: String,
        service: String,
    },
}

impl Foreach {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Host { .. } => FOREACH_HOST,
            Self::Service { .. } => FOREACH_SERVICE,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            Self::Host { tags, .. } | Self::Service { tags, .. } => tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCall {
    pub foreach: Option<Foreach>,
    pub rule: String,
    pub args: Vec<String>,
}

impl RuleCall {
    /// Bind a calling rule's arguments into this call. Tag filters stay literal.
    pub fn substituted(&self, bindings: &[(String, String)]) -> Self {
        let subst = |text: &str| Matcher::substitute_named(text, bindings);
        Self {
            foreach: self.foreach.as_ref().map(|foreach| match foreach {
                Foreach::Host { tags, host } => Foreach::Host {
                    tags: tags.clone(),
                    host: subst(host),
                },
                Foreach::Service {
                    tags,
                    host,
                    service,
                } => Foreach::Service {
                    tags: tags.clone(),
                    host: subst(host),
                    service: subst(service),
                },
            }),
            rule: subst(&self.rule),
            args: self.args.iter().map(|a| subst(a)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNode {
    Leaf(LeafSpec),
    Call(RuleCall),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub arguments: Vec<String>,
    pub function: String,
    pub nodes: Vec<CallNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationDef {
    pub group: String,
    pub call: RuleCall,
}

/// Typed, validated rule configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    pub rules: BTreeMap<String, Rule>,
    pub aggregations: Vec<AggregationDef>,
}

impl RuleSet {
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &String> {
        self.rules.keys()
    }
}
