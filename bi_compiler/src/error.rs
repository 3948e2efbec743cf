//! Configuration errors raised while compiling the aggregation forest
//!
//! Every variant aborts the compilation attempt for the requesting identity.
//! Nothing partial is cached or returned.

use crate::logging::codes::{self, Code};
use crate::sources::SourceError;
use thiserror::Error;

/// Result type for compiler operations
pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// Reference to a rule that is not defined
    #[error("Unknown rule '{rule}'. Known rules: {}", known.join(", "))]
    UnknownRule { rule: String, known: Vec<String> },

    /// Rule invoked with the wrong number of arguments
    #[error("Rule '{rule}' expects {expected} arguments ({}), got {actual}", arguments.join(", "))]
    ArgumentCount {
        rule: String,
        arguments: Vec<String>,
        expected: usize,
        actual: usize,
    },

    /// Top-level aggregation entry with too few elements or wrong element kinds
    #[error("Malformed aggregation definition {definition}: {reason}")]
    MalformedAggregation { definition: String, reason: String },

    /// Rule body entry that is neither a leaf nor a call
    #[error("Malformed node in rule '{rule}' {node}: {reason}")]
    MalformedNode {
        rule: String,
        node: String,
        reason: String,
    },

    /// Rule nesting reached the configured maximum
    #[error("Maximum rule depth of {max_depth} exceeded while expanding rule '{rule}'. Is there a cycle in the rule chain?")]
    DepthExceeded { rule: String, max_depth: usize },

    /// Pattern text that does not compile as a regular expression
    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Config or topology backend failed
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl CompileError {
    pub fn unknown_rule<'a>(rule: &str, known: impl IntoIterator<Item = &'a String>) -> Self {
        let mut known: Vec<String> = known.into_iter().cloned().collect();
        known.sort();
        Self::UnknownRule {
            rule: rule.to_string(),
            known,
        }
    }

    pub fn argument_count(rule: &str, arguments: &[String], actual: usize) -> Self {
        Self::ArgumentCount {
            rule: rule.to_string(),
            arguments: arguments.to_vec(),
            expected: arguments.len(),
            actual,
        }
    }

    pub fn malformed_aggregation(definition: impl ToString, reason: &str) -> Self {
        Self::MalformedAggregation {
            definition: definition.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed_node(rule: &str, node: impl ToString, reason: &str) -> Self {
        Self::MalformedNode {
            rule: rule.to_string(),
            node: node.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_pattern(pattern: &str, error: &regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            message: error.to_string(),
        }
    }

    /// Logging code for this error
    pub fn error_code(&self) -> Code {
        match self {
            Self::UnknownRule { .. } => codes::config::UNKNOWN_RULE,
            Self::ArgumentCount { .. } => codes::config::ARGUMENT_COUNT,
            Self::MalformedAggregation { .. } => codes::config::MALFORMED_AGGREGATION,
            Self::MalformedNode { .. } => codes::config::MALFORMED_NODE,
            Self::DepthExceeded { .. } => codes::config::DEPTH_EXCEEDED,
            Self::InvalidPattern { .. } => codes::config::INVALID_PATTERN,
            Self::Source(err) => err.error_code(),
        }
    }

    /// Whether the operator can fix this by editing the rule configuration
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, Self::Source(_))
    }
}
