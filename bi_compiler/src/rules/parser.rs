//! Parser from the positional rule format into typed rules
//!
//! A call is `[rule, [args]]`, optionally prefixed with
//! `FOREACH_HOST, [tags]?, host_re` or `FOREACH_SERVICE, [tags]?, host_re, service_re`.
//! Anything whose last element is not a list is a leaf `[host_re, service?]`.

use super::{AggregationDef, CallNode, Foreach, LeafSpec, Rule, RuleCall, RuleConfig, RuleSet, ServiceSpec};
use crate::config::constants::{FOREACH_HOST, FOREACH_SERVICE};
use crate::error::{CompileError, CompileResult};
use crate::log_error;
use serde_json::Value;

/// Validate and type the whole configuration
pub fn parse_rule_config(config: &RuleConfig) -> CompileResult<RuleSet> {
    let mut rules = std::collections::BTreeMap::new();
    for (name, definition) in &config.rules {
        let nodes = definition
            .nodes
            .iter()
            .map(|node| parse_node(name, node))
            .collect::<CompileResult<Vec<_>>>()?;

        rules.insert(
            name.clone(),
            Rule {
                name: name.clone(),
                description: definition.description.clone(),
                arguments: definition.arguments.clone(),
                function: definition.function.clone(),
                nodes,
            },
        );
    }

    let aggregations = config
        .aggregations
        .iter()
        .map(parse_aggregation)
        .collect::<CompileResult<Vec<_>>>()?;

    Ok(RuleSet {
        rules,
        aggregations,
    })
}

fn report(err: CompileError) -> CompileError {
    log_error!(err.error_code(), "Invalid rule configuration", "error" => &err);
    err
}

/// Parse one top-level entry `[group, <call...>]`
pub fn parse_aggregation(entry: &Value) -> CompileResult<AggregationDef> {
    let items = entry.as_array().ok_or_else(|| {
        report(CompileError::malformed_aggregation(entry, "must be a list"))
    })?;

    if items.len() < 3 {
        return Err(report(CompileError::malformed_aggregation(
            entry,
            &format!("must have at least 3 entries (has {})", items.len()),
        )));
    }

    let group = items[0].as_str().ok_or_else(|| {
        report(CompileError::malformed_aggregation(entry, "group name must be a string"))
    })?;

    let call = parse_call(&items[1..])
        .map_err(|reason| report(CompileError::malformed_aggregation(entry, &reason)))?;

    Ok(AggregationDef {
        group: group.to_string(),
        call,
    })
}

/// Parse one entry of a rule body
pub fn parse_node(rule: &str, node: &Value) -> CompileResult<CallNode> {
    let malformed = |reason: &str| report(CompileError::malformed_node(rule, node, reason));

    let items = node
        .as_array()
        .ok_or_else(|| malformed("node must be a list"))?;

    match items.last() {
        None => Err(malformed("node is empty")),
        Some(Value::Array(_)) => parse_call(items)
            .map(CallNode::Call)
            .map_err(|reason| malformed(&reason)),
        Some(_) => {
            let host = string_at(items, 0).map_err(|reason| malformed(&reason))?;
            let service = match items.len() {
                1 => ServiceSpec::HostState,
                2 => ServiceSpec::from_text(
                    &string_at(items, 1).map_err(|reason| malformed(&reason))?,
                ),
                n => return Err(malformed(&format!("leaf must have 1 or 2 entries (has {})", n))),
            };
            Ok(CallNode::Leaf(LeafSpec { host, service }))
        }
    }
}

/// Parse `[modifier...]? rule [args]`
fn parse_call(items: &[Value]) -> Result<RuleCall, String> {
    if items.len() < 2 {
        return Err("call needs a rule name and an argument list".to_string());
    }

    let (prefix, tail) = items.split_at(items.len() - 2);
    let rule = tail[0]
        .as_str()
        .ok_or_else(|| format!("rule name must be a string, found {}", tail[0]))?
        .to_string();
    let args = tail[1]
        .as_array()
        .ok_or_else(|| "argument list must be a list".to_string())?
        .iter()
        .map(|arg| {
            arg.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("argument must be a string, found {}", arg))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let foreach = match prefix.split_first() {
        None => None,
        Some((keyword, rest)) => Some(parse_foreach(keyword, rest)?),
    };

    Ok(RuleCall {
        foreach,
        rule,
        args,
    })
}

fn parse_foreach(keyword: &Value, rest: &[Value]) -> Result<Foreach, String> {
    let (tags, patterns) = match rest.split_first() {
        Some((Value::Array(tags), patterns)) => {
            let tags = tags
                .iter()
                .map(|tag| {
                    tag.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| format!("tag must be a string, found {}", tag))
                })
                .collect::<Result<Vec<_>, _>>()?;
            (tags, patterns)
        }
        _ => (Vec::new(), rest),
    };

    match keyword.as_str() {
        Some(FOREACH_HOST) if patterns.len() == 1 => Ok(Foreach::Host {
            tags,
            host: string_at(patterns, 0)?,
        }),
        Some(FOREACH_SERVICE) if patterns.len() == 2 => Ok(Foreach::Service {
            tags,
            host: string_at(patterns, 0)?,
            service: string_at(patterns, 1)?,
        }),
        Some(FOREACH_HOST) => Err(format!(
            "{} takes exactly one host pattern (has {})",
            FOREACH_HOST,
            patterns.len()
        )),
        Some(FOREACH_SERVICE) => Err(format!(
            "{} takes a host and a service pattern (has {} patterns)",
            FOREACH_SERVICE,
            patterns.len()
        )),
        _ => Err(format!("unknown call modifier {}", keyword)),
    }
}

fn string_at(items: &[Value], index: usize) -> Result<String, String> {
    items[index]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("pattern must be a string, found {}", items[index]))
}
