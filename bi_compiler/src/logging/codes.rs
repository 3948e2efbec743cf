//! Consolidated log codes and their metadata
//!
//! Single source of truth for every code the compiler and evaluator emit.

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// CODE WRAPPER TYPE
// ============================================================================

/// Universal code wrapper for both error and success codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(&'static str);

impl Code {
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }
}

/// Metadata for a code
#[derive(Debug, Clone)]
pub struct CodeMetadata {
    pub code: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub recommended_action: &'static str,
}

impl CodeMetadata {
    const fn new(
        code: &'static str,
        category: &'static str,
        severity: Severity,
        description: &'static str,
        recommended_action: &'static str,
    ) -> Self {
        Self {
            code,
            category,
            severity,
            description,
            recommended_action,
        }
    }
}

// ============================================================================
// CODE CONSTANTS
// ============================================================================

/// System codes
pub mod system {
    use super::Code;

    pub const INTERNAL_ERROR: Code = Code::new("ERR001");
    pub const INITIALIZATION_FAILURE: Code = Code::new("ERR002");
}

/// Backend (config, topology, status source) codes
pub mod source {
    use super::Code;

    pub const TRANSPORT_FAILURE: Code = Code::new("E010");
    pub const INVALID_DATA: Code = Code::new("E011");
}

/// Rule configuration codes
pub mod config {
    use super::Code;

    pub const UNKNOWN_RULE: Code = Code::new("E020");
    pub const ARGUMENT_COUNT: Code = Code::new("E021");
    pub const MALFORMED_AGGREGATION: Code = Code::new("E022");
    pub const MALFORMED_NODE: Code = Code::new("E023");
    pub const DEPTH_EXCEEDED: Code = Code::new("E024");
    pub const INVALID_PATTERN: Code = Code::new("E025");
}

/// Evaluation codes
pub mod evaluation {
    use super::Code;

    pub const UNKNOWN_FUNCTION: Code = Code::new("E040");
    pub const INVALID_FUNCTION_ARGUMENT: Code = Code::new("E041");
    pub const STORE_FAILURE: Code = Code::new("E042");
}

/// Success codes
pub mod success {
    use super::Code;

    pub const SYSTEM_INITIALIZATION_COMPLETED: Code = Code::new("S001");
    pub const FOREST_COMPILED: Code = Code::new("S010");
    pub const FOREST_REUSED: Code = Code::new("S011");
    pub const TREE_EVALUATED: Code = Code::new("S020");
}

// ============================================================================
// METADATA REGISTRY
// ============================================================================

static CODE_REGISTRY: OnceLock<HashMap<&'static str, CodeMetadata>> = OnceLock::new();

fn get_code_registry() -> &'static HashMap<&'static str, CodeMetadata> {
    CODE_REGISTRY.get_or_init(|| {
        let entries = [
            CodeMetadata::new(
                "ERR001",
                "System",
                Severity::Critical,
                "Internal error",
                "Report the failure together with the log output",
            ),
            CodeMetadata::new(
                "ERR002",
                "System",
                Severity::Critical,
                "Initialization failure",
                "Check logging preferences and build configuration",
            ),
            CodeMetadata::new(
                "E010",
                "Source",
                Severity::High,
                "Monitoring backend unreachable",
                "Check connectivity to the status and topology backends",
            ),
            CodeMetadata::new(
                "E011",
                "Source",
                Severity::High,
                "Monitoring backend returned invalid data",
                "Check the backend's inventory or status export",
            ),
            CodeMetadata::new(
                "E020",
                "Configuration",
                Severity::High,
                "Reference to an unknown aggregation rule",
                "Define the rule or fix the rule name in the call",
            ),
            CodeMetadata::new(
                "E021",
                "Configuration",
                Severity::High,
                "Rule called with the wrong number of arguments",
                "Match the call's arguments to the rule's argument list",
            ),
            CodeMetadata::new(
                "E022",
                "Configuration",
                Severity::High,
                "Malformed aggregation definition",
                "Aggregations need a group, a rule name and an argument list",
            ),
            CodeMetadata::new(
                "E023",
                "Configuration",
                Severity::High,
                "Malformed rule node",
                "Check the node's host/service patterns or call syntax",
            ),
            CodeMetadata::new(
                "E024",
                "Configuration",
                Severity::High,
                "Rule nesting depth exceeded",
                "Look for rules that invoke themselves directly or transitively",
            ),
            CodeMetadata::new(
                "E025",
                "Configuration",
                Severity::High,
                "Invalid regular expression",
                "Fix the pattern text",
            ),
            CodeMetadata::new(
                "E040",
                "Evaluation",
                Severity::High,
                "Unknown aggregation function",
                "Use one of the registered aggregation functions",
            ),
            CodeMetadata::new(
                "E041",
                "Evaluation",
                Severity::Medium,
                "Invalid aggregation function argument",
                "Check the arguments after '!' in the function spec",
            ),
            CodeMetadata::new(
                "E042",
                "Evaluation",
                Severity::Medium,
                "Per-user store could not be read or written",
                "Check permissions of the user state directory",
            ),
            CodeMetadata::new(
                "S001",
                "Success",
                Severity::Low,
                "Logging initialized",
                "None",
            ),
            CodeMetadata::new(
                "S010",
                "Success",
                Severity::Low,
                "Forest compiled",
                "None",
            ),
            CodeMetadata::new(
                "S011",
                "Success",
                Severity::Low,
                "Forest served from cache",
                "None",
            ),
            CodeMetadata::new(
                "S020",
                "Success",
                Severity::Low,
                "Tree evaluated",
                "None",
            ),
        ];

        entries.into_iter().map(|m| (m.code, m)).collect()
    })
}

/// Get human-readable description for a code
pub fn get_description(code: &str) -> &'static str {
    get_code_registry()
        .get(code)
        .map(|metadata| metadata.description)
        .unwrap_or("Unknown error")
}

/// Get recommended action for a code
pub fn get_action(code: &str) -> &'static str {
    get_code_registry()
        .get(code)
        .map(|metadata| metadata.recommended_action)
        .unwrap_or("No specific action available")
}

/// Get category for a code
pub fn get_category(code: &str) -> &'static str {
    get_code_registry()
        .get(code)
        .map(|metadata| metadata.category)
        .unwrap_or("Unknown")
}

/// Get severity for a code
pub fn get_severity(code: &str) -> Severity {
    get_code_registry()
        .get(code)
        .map(|metadata| metadata.severity)
        .unwrap_or(Severity::Medium)
}
