//! Aggregation Function Registry
//!
//! Functions are looked up by the name part of a function spec
//! (`name!arg1!arg2`); the remaining parts are passed as string arguments.

use crate::error::{EvaluationError, EvaluationResult};
use crate::state::State;
use bi_compiler::Matcher;
use std::collections::HashMap;

/// What a function sees of one child
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationInput<'a> {
    pub state: State,
    pub name: Option<&'a str>,
    pub output: &'a str,
}

pub trait AggregationFunction: Send + Sync {
    fn name(&self) -> &str;

    fn aggregate(
        &self,
        nodes: &[AggregationInput<'_>],
        args: &[&str],
    ) -> EvaluationResult<(State, String)>;
}

pub struct FunctionRegistry {
    functions: HashMap<String, Box<dyn AggregationFunction>>,
}

impl FunctionRegistry {
    /// Create a registry without any functions
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Registry with `worst`, `best` and `running_on`
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.functions.insert("worst".to_string(), Box::new(Worst));
        registry.functions.insert("best".to_string(), Box::new(Best));
        registry
            .functions
            .insert("running_on".to_string(), Box::new(RunningOn::new()));
        registry
    }

    pub fn register(&mut self, function: Box<dyn AggregationFunction>) -> EvaluationResult<()> {
        let name = function.name().to_string();
        if self.functions.contains_key(&name) {
            return Err(EvaluationError::DuplicateFunction { name });
        }
        self.functions.insert(name, function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn AggregationFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    /// Sorted function names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check that `spec` names a registered function
    pub fn resolve<'s>(
        &self,
        spec: &'s str,
    ) -> EvaluationResult<(&dyn AggregationFunction, Vec<&'s str>)> {
        let mut parts = spec.split('!');
        let name = parts.next().unwrap_or_default();
        let function = self.get(name).ok_or_else(|| {
            let err = EvaluationError::UnknownFunction {
                name: name.to_string(),
                available: self.names(),
            };
            bi_compiler::log_error!(err.error_code(), "Unknown aggregation function", "function" => name);
            err
        })?;
        Ok((function, parts.collect()))
    }

    /// Run the function named by `spec` over `nodes`
    pub fn apply(
        &self,
        spec: &str,
        nodes: &[AggregationInput<'_>],
    ) -> EvaluationResult<(State, String)> {
        let (function, args) = self.resolve(spec)?;
        function.aggregate(nodes, &args)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_count(function: &str, arg: Option<&&str>) -> EvaluationResult<usize> {
    match arg {
        None => Ok(1),
        Some(text) => match text.trim().parse::<usize>() {
            Ok(0) => Err(EvaluationError::invalid_argument(function, text, "must be at least 1")),
            Ok(n) => Ok(n),
            Err(e) => Err(EvaluationError::invalid_argument(function, text, e)),
        },
    }
}

fn parse_worst_state(function: &str, arg: Option<&&str>) -> EvaluationResult<State> {
    match arg {
        None => Ok(State::Crit),
        Some(text) => text
            .trim()
            .parse::<i32>()
            .map_err(|e| EvaluationError::invalid_argument(function, text, e))
            .and_then(|value| {
                State::from_i32(value).ok_or_else(|| {
                    EvaluationError::invalid_argument(function, text, "not a state value")
                })
            }),
    }
}

/// The n-th best (`from_worst == false`) or n-th worst state, capped at `worst_state`
fn nth_state(
    nodes: &[AggregationInput<'_>],
    n: usize,
    from_worst: bool,
    worst_state: State,
) -> (State, String) {
    if nodes.is_empty() {
        return (State::Unknown, "no nodes to aggregate".to_string());
    }

    let mut states: Vec<State> = nodes.iter().map(|node| node.state).collect();
    states.sort_by(|a, b| a.weight().total_cmp(&b.weight()).then(a.cmp(b)));
    if from_worst {
        states.reverse();
    }
    let mut state = states[n.min(states.len()) - 1];
    if state.weight() > worst_state.weight() {
        state = worst_state;
    }

    let problems = nodes.iter().filter(|node| node.state != State::Ok).count();
    if problems > 0 {
        (state, format!("{} problems", problems))
    } else {
        (state, String::new())
    }
}

/// `worst!n!worst_state`
pub struct Worst;

impl AggregationFunction for Worst {
    fn name(&self) -> &str {
        "worst"
    }

    fn aggregate(
        &self,
        nodes: &[AggregationInput<'_>],
        args: &[&str],
    ) -> EvaluationResult<(State, String)> {
        let n = parse_count(self.name(), args.first())?;
        let worst_state = parse_worst_state(self.name(), args.get(1))?;
        Ok(nth_state(nodes, n, true, worst_state))
    }
}

/// `best!n!worst_state`
pub struct Best;

impl AggregationFunction for Best {
    fn name(&self) -> &str {
        "best"
    }

    fn aggregate(
        &self,
        nodes: &[AggregationInput<'_>],
        args: &[&str],
    ) -> EvaluationResult<(State, String)> {
        let n = parse_count(self.name(), args.first())?;
        let worst_state = parse_worst_state(self.name(), args.get(1))?;
        Ok(nth_state(nodes, n, false, worst_state))
    }
}

/// `running_on!pattern`: the first node's output names the host the
/// service currently runs on; the result is that sibling's state.
pub struct RunningOn {
    matcher: Matcher,
}

impl RunningOn {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(),
        }
    }
}

impl Default for RunningOn {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregationFunction for RunningOn {
    fn name(&self) -> &str {
        "running_on"
    }

    fn aggregate(
        &self,
        nodes: &[AggregationInput<'_>],
        args: &[&str],
    ) -> EvaluationResult<(State, String)> {
        let pattern = args.first().ok_or_else(|| {
            EvaluationError::invalid_argument(self.name(), "", "a pattern is required")
        })?;

        let Some((first, others)) = nodes.split_first() else {
            return Ok((State::Unknown, "no nodes to aggregate".to_string()));
        };

        let captures = self
            .matcher
            .match_text(pattern, first.output)
            .map_err(|e| EvaluationError::invalid_argument(self.name(), pattern, e))?;

        let Some(running_on) = captures.and_then(|groups| groups.into_iter().next()) else {
            let (state, output) = nth_state(others, 1, true, State::Crit);
            return Ok((state, format!("{}, running nowhere", output)));
        };

        match others
            .iter()
            .find(|node| node.name == Some(running_on.as_str()))
        {
            Some(node) => Ok((
                node.state,
                format!("{}, running on {}", node.output, running_on),
            )),
            None => Ok((
                State::Unknown,
                format!("running on unknown host '{}'", running_on),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn inputs(states: &[State]) -> Vec<AggregationInput<'static>> {
        states
            .iter()
            .map(|&state| AggregationInput {
                state,
                name: None,
                output: "",
            })
            .collect()
    }

    #[test]
    fn test_worst_and_best_ordering() {
        let registry = FunctionRegistry::new();
        let nodes = inputs(&[State::Ok, State::Warn, State::Crit, State::Pending]);

        assert_eq!(
            registry.apply("worst", &nodes).unwrap(),
            (State::Crit, "3 problems".to_string())
        );
        assert_eq!(registry.apply("worst!2", &nodes).unwrap().0, State::Warn);
        assert_eq!(registry.apply("worst!3", &nodes).unwrap().0, State::Pending);
        assert_eq!(registry.apply("best", &nodes).unwrap().0, State::Ok);
        assert_eq!(registry.apply("best!2", &nodes).unwrap().0, State::Pending);
    }

    #[test]
    fn test_count_is_clamped_and_state_capped() {
        let registry = FunctionRegistry::new();
        let nodes = inputs(&[State::Ok, State::Crit]);
        assert_eq!(registry.apply("worst!5", &nodes).unwrap().0, State::Ok);
        assert_eq!(registry.apply("worst!1!1", &nodes).unwrap().0, State::Warn);
    }

    #[test]
    fn test_all_ok_has_empty_output() {
        let registry = FunctionRegistry::new();
        let nodes = inputs(&[State::Ok, State::Ok]);
        assert_eq!(
            registry.apply("best", &nodes).unwrap(),
            (State::Ok, String::new())
        );
    }

    #[test]
    fn test_unknown_function_and_bad_arguments() {
        let registry = FunctionRegistry::new();
        let nodes = inputs(&[State::Ok]);
        assert_matches!(
            registry.apply("avg", &nodes),
            Err(EvaluationError::UnknownFunction { available, .. }) if available == vec!["best", "running_on", "worst"]
        );
        assert_matches!(
            registry.apply("worst!x", &nodes),
            Err(EvaluationError::InvalidFunctionArgument { .. })
        );
        assert_matches!(
            registry.apply("worst!1!9", &nodes),
            Err(EvaluationError::InvalidFunctionArgument { .. })
        );
    }

    #[test]
    fn test_running_on() {
        let registry = FunctionRegistry::new();
        let nodes = vec![
            AggregationInput {
                state: State::Ok,
                name: Some("Cluster"),
                output: "Service is running on node2",
            },
            AggregationInput {
                state: State::Crit,
                name: Some("node1"),
                output: "down",
            },
            AggregationInput {
                state: State::Warn,
                name: Some("node2"),
                output: "load high",
            },
        ];

        assert_eq!(
            registry.apply("running_on!.*running on (\\w+)", &nodes).unwrap(),
            (State::Warn, "load high, running on node2".to_string())
        );
        assert_eq!(
            registry.apply("running_on!stopped (\\w+)", &nodes).unwrap(),
            (State::Crit, "2 problems, running nowhere".to_string())
        );
        assert_eq!(
            registry.apply("running_on!.*running on (\\w+)", &nodes[..2]).unwrap(),
            (
                State::Unknown,
                "running on unknown host 'node2'".to_string()
            )
        );
    }

    #[test]
    fn test_register_custom_function() {
        struct AlwaysOk;
        impl AggregationFunction for AlwaysOk {
            fn name(&self) -> &str {
                "always_ok"
            }
            fn aggregate(
                &self,
                _nodes: &[AggregationInput<'_>],
                _args: &[&str],
            ) -> EvaluationResult<(State, String)> {
                Ok((State::Ok, "fine".to_string()))
            }
        }

        let mut registry = FunctionRegistry::new();
        registry.register(Box::new(AlwaysOk)).unwrap();
        assert_matches!(
            registry.register(Box::new(AlwaysOk)),
            Err(EvaluationError::DuplicateFunction { .. })
        );
        assert_eq!(registry.apply("always_ok", &inputs(&[State::Crit])).unwrap().0, State::Ok);
    }
}
