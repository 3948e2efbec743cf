//! Aggregation states and their ordering weight

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a node. Serialized as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum State {
    /// Referenced host or service is absent from the status data
    Missing = -2,
    /// Service exists but was never checked
    Pending = -1,
    Ok = 0,
    Warn = 1,
    Crit = 2,
    Unknown = 3,
    Unavail = 4,
}

impl State {
    pub const ALL: [State; 7] = [
        State::Missing,
        State::Pending,
        State::Ok,
        State::Warn,
        State::Crit,
        State::Unknown,
        State::Unavail,
    ];

    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_i32() == value)
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Raw host state of the status source: 0 up, 1 down, 2 unreachable
    pub fn from_host_state(value: i32) -> Self {
        match value {
            0 => State::Ok,
            1 => State::Crit,
            _ => State::Unknown,
        }
    }

    /// Ordering key for worst/best. CRIT outranks everything, PENDING sits just above OK.
    pub fn weight(self) -> f64 {
        match self {
            State::Crit => 10.0,
            State::Pending => 0.5,
            other => f64::from(other.as_i32()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Missing => "MISSING",
            State::Pending => "PENDING",
            State::Ok => "OK",
            State::Warn => "WARN",
            State::Crit => "CRIT",
            State::Unknown => "UNKNOWN",
            State::Unavail => "UNAVAIL",
        }
    }
}

/// Free-function form of [`State::weight`]
pub fn state_weight(state: State) -> f64 {
    state.weight()
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for State {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        State::from_i32(value).ok_or_else(|| format!("invalid state value {}", value))
    }
}

impl From<State> for i32 {
    fn from(state: State) -> Self {
        state.as_i32()
    }
}

impl FromStr for State {
    type Err = String;

    /// Accepts names (case-insensitive) or integer values
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = text.parse::<i32>() {
            return State::try_from(value);
        }
        State::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(text))
            .ok_or_else(|| format!("unknown state '{}'", text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights() {
        assert_eq!(State::Crit.weight(), 10.0);
        assert_eq!(State::Pending.weight(), 0.5);
        assert_eq!(State::Missing.weight(), -2.0);
        assert_eq!(state_weight(State::Unavail), 4.0);
        assert!(State::Pending.weight() > State::Ok.weight());
        assert!(State::Pending.weight() < State::Warn.weight());
    }

    #[test]
    fn test_host_state_mapping() {
        assert_eq!(State::from_host_state(0), State::Ok);
        assert_eq!(State::from_host_state(1), State::Crit);
        assert_eq!(State::from_host_state(2), State::Unknown);
        assert_eq!(State::from_host_state(9), State::Unknown);
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!("warn".parse::<State>(), Ok(State::Warn));
        assert_eq!("-1".parse::<State>(), Ok(State::Pending));
        assert!("7".parse::<State>().is_err());

        assert_eq!(serde_json::to_string(&State::Crit).unwrap(), "2");
        assert_eq!(serde_json::from_str::<State>("-2").unwrap(), State::Missing);
        assert!(serde_json::from_str::<State>("5").is_err());
    }
}
