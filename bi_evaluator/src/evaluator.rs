//! Tree Evaluator
//!
//! Walks a compiled tree bottom-up against one status snapshot. Every child
//! is evaluated; when any descendant carries an assumption the node's
//! function runs a second time over the assumed child states.

use crate::assumptions::{AssumptionKey, AssumptionMap};
use crate::error::EvaluationResult;
use crate::functions::{AggregationInput, FunctionRegistry};
use crate::state::State;
use crate::status::{StatusSnapshot, StatusSource};
use bi_compiler::logging::codes;
use bi_compiler::{log_debug, log_success};
use bi_compiler::{CompiledInterior, CompiledLeaf, CompiledNode, HostSpec, ServiceRef};
use serde::Serialize;
use std::collections::BTreeSet;

pub const PENDING_OUTPUT: &str = "This service has not been checked yet";
pub const MISSING_SERVICE_OUTPUT: &str = "This host has no such service";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedNode {
    pub state: State,
    /// Set only when an assumption applies somewhere in the subtree
    pub assumed_state: Option<State>,
    pub name: Option<String>,
    pub output: String,
    pub required_hosts: BTreeSet<HostSpec>,
    pub function_spec: Option<String>,
    /// `None` for leaves
    pub children: Option<Vec<EvaluatedNode>>,
}

impl EvaluatedNode {
    /// Assumed state if present, real state otherwise
    pub fn effective_state(&self) -> State {
        self.assumed_state.unwrap_or(self.state)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

/// Depth of an evaluated tree, leaves count as 1
pub fn status_tree_depth(node: &EvaluatedNode) -> usize {
    match &node.children {
        None => 1,
        Some(children) => children.iter().map(status_tree_depth).max().unwrap_or(0) + 1,
    }
}

pub struct Evaluator<'a> {
    registry: &'a FunctionRegistry,
    assumptions: &'a AssumptionMap,
    log_status_fetches: bool,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a FunctionRegistry, assumptions: &'a AssumptionMap) -> Self {
        Self {
            registry,
            assumptions,
            log_status_fetches: false,
        }
    }

    pub fn with_status_fetch_logging(mut self, enabled: bool) -> Self {
        self.log_status_fetches = enabled;
        self
    }

    /// Evaluate against status fetched for exactly the tree's required hosts
    pub fn evaluate_with_source(
        &self,
        tree: &CompiledInterior,
        source: &dyn StatusSource,
    ) -> EvaluationResult<EvaluatedNode> {
        let snapshot = source.fetch_host_status(&tree.required_hosts)?;
        if self.log_status_fetches {
            log_debug!("Status fetched",
                "requested" => tree.required_hosts.len(),
                "received" => snapshot.len()
            );
        }
        self.evaluate(tree, &snapshot)
    }

    /// Evaluate a top-level aggregation
    pub fn evaluate(
        &self,
        tree: &CompiledInterior,
        snapshot: &StatusSnapshot,
    ) -> EvaluationResult<EvaluatedNode> {
        let (node, _) = self.evaluate_interior(tree, snapshot)?;
        log_success!(codes::success::TREE_EVALUATED, "Tree evaluated",
            "description" => &tree.description,
            "state" => node.state
        );
        Ok(node)
    }

    /// Evaluate any node
    pub fn evaluate_node(
        &self,
        node: &CompiledNode,
        snapshot: &StatusSnapshot,
    ) -> EvaluationResult<EvaluatedNode> {
        self.evaluate_any(node, snapshot).map(|(node, _)| node)
    }

    /// Returns the node plus whether an assumption applied in its subtree
    fn evaluate_any(
        &self,
        node: &CompiledNode,
        snapshot: &StatusSnapshot,
    ) -> EvaluationResult<(EvaluatedNode, bool)> {
        match node {
            CompiledNode::Leaf(leaf) => Ok(self.evaluate_leaf(leaf, snapshot)),
            CompiledNode::Interior(interior) => self.evaluate_interior(interior, snapshot),
        }
    }

    fn evaluate_leaf(&self, leaf: &CompiledLeaf, snapshot: &StatusSnapshot) -> (EvaluatedNode, bool) {
        let assumed_state = self
            .assumptions
            .get(&AssumptionKey::for_leaf(leaf))
            .copied();

        let (state, name, output) = match snapshot.get(&leaf.host) {
            None => (
                State::Missing,
                None,
                format!("Host {} not found", leaf.host.host),
            ),
            Some(status) => match &leaf.service {
                ServiceRef::HostState => (
                    State::from_host_state(status.state),
                    None,
                    status.plugin_output.clone(),
                ),
                ServiceRef::Service(service) => match status.service(service) {
                    Some(entry) if !entry.has_been_checked => (
                        State::Pending,
                        Some(service.clone()),
                        PENDING_OUTPUT.to_string(),
                    ),
                    Some(entry) => (
                        State::from_i32(entry.state).unwrap_or(State::Unknown),
                        Some(service.clone()),
                        entry.plugin_output.clone(),
                    ),
                    None => (
                        State::Missing,
                        Some(service.clone()),
                        MISSING_SERVICE_OUTPUT.to_string(),
                    ),
                },
            },
        };

        let node = EvaluatedNode {
            state,
            assumed_state,
            name,
            output,
            required_hosts: leaf.required_hosts(),
            function_spec: None,
            children: None,
        };
        (node, assumed_state.is_some())
    }

    fn evaluate_interior(
        &self,
        interior: &CompiledInterior,
        snapshot: &StatusSnapshot,
    ) -> EvaluationResult<(EvaluatedNode, bool)> {
        let (function, args) = self.registry.resolve(&interior.function_spec)?;

        let mut children = Vec::with_capacity(interior.children.len());
        let mut any_assumption = false;
        for child in &interior.children {
            let (node, assumed) = self.evaluate_any(child, snapshot)?;
            any_assumption |= assumed;
            children.push(node);
        }

        let real: Vec<AggregationInput<'_>> = children
            .iter()
            .map(|child| AggregationInput {
                state: child.state,
                name: child.name.as_deref(),
                output: &child.output,
            })
            .collect();
        let (state, output) = function.aggregate(&real, &args)?;

        let assumed_state = if any_assumption {
            let assumed: Vec<AggregationInput<'_>> = children
                .iter()
                .zip(&real)
                .map(|(child, input)| AggregationInput {
                    state: child.effective_state(),
                    ..*input
                })
                .collect();
            Some(function.aggregate(&assumed, &args)?.0)
        } else {
            None
        };

        let node = EvaluatedNode {
            state,
            assumed_state,
            name: Some(interior.description.clone()),
            output,
            required_hosts: interior.required_hosts.clone(),
            function_spec: Some(interior.function_spec.clone()),
            children: Some(children),
        };
        Ok((node, any_assumption))
    }
}
