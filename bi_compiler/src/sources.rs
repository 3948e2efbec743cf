//! External collaborators feeding the compiler

use crate::logging::codes::{self, Code};
use crate::rules::RuleConfig;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Backend failure of a config, topology or status source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("{source_name} unreachable: {message}")]
    Transport {
        source_name: String,
        message: String,
    },

    #[error("{source_name} returned invalid data: {message}")]
    InvalidData {
        source_name: String,
        message: String,
    },
}

impl SourceError {
    pub fn transport(source_name: &str, message: impl ToString) -> Self {
        Self::Transport {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_data(source_name: &str, message: impl ToString) -> Self {
        Self::InvalidData {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }

    pub fn error_code(&self) -> Code {
        match self {
            Self::Transport { .. } => codes::source::TRANSPORT_FAILURE,
            Self::InvalidData { .. } => codes::source::INVALID_DATA,
        }
    }
}

/// Rule definitions plus the inputs of the cache fingerprint
pub trait ConfigSource: Send + Sync {
    fn rule_config(&self) -> Result<RuleConfig, SourceError>;

    /// Modification timestamps of every configuration file
    fn modification_timestamps(&self) -> Result<Vec<i64>, SourceError>;

    /// Program start per site, `None` for unreachable sites
    fn site_program_starts(&self) -> Result<BTreeMap<String, Option<i64>>, SourceError>;
}

#[derive(Debug, Default)]
struct StaticConfigState {
    config: RuleConfig,
    timestamps: Vec<i64>,
    site_starts: BTreeMap<String, Option<i64>>,
}

/// In-memory config source whose fingerprint inputs can be changed in place
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    state: Mutex<StaticConfigState>,
}

impl StaticConfigSource {
    pub fn new(config: RuleConfig) -> Self {
        Self {
            state: Mutex::new(StaticConfigState {
                config,
                timestamps: vec![0],
                site_starts: BTreeMap::new(),
            }),
        }
    }

    pub fn with_site(self, site: &str, program_start: Option<i64>) -> Self {
        self.set_site_start(site, program_start);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StaticConfigState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the rules and bump the modification timestamp
    pub fn replace_config(&self, config: RuleConfig) {
        let mut state = self.state();
        state.config = config;
        if let Some(last) = state.timestamps.last_mut() {
            *last += 1;
        }
    }

    pub fn set_timestamps(&self, timestamps: Vec<i64>) {
        self.state().timestamps = timestamps;
    }

    pub fn set_site_start(&self, site: &str, program_start: Option<i64>) {
        self.state()
            .site_starts
            .insert(site.to_string(), program_start);
    }
}

impl ConfigSource for StaticConfigSource {
    fn rule_config(&self) -> Result<RuleConfig, SourceError> {
        Ok(self.state().config.clone())
    }

    fn modification_timestamps(&self) -> Result<Vec<i64>, SourceError> {
        Ok(self.state().timestamps.clone())
    }

    fn site_program_starts(&self) -> Result<BTreeMap<String, Option<i64>>, SourceError> {
        Ok(self.state().site_starts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_config_bumps_timestamp() {
        let source = StaticConfigSource::new(RuleConfig::default());
        let before = source.modification_timestamps().unwrap();
        source.replace_config(RuleConfig::default());
        assert_ne!(before, source.modification_timestamps().unwrap());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SourceError::invalid_data("inventory", "bad json").error_code(),
            codes::source::INVALID_DATA
        );
        assert_eq!(
            SourceError::transport("status", "refused").to_string(),
            "status unreachable: refused"
        );
    }
}
