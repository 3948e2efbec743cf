//! Error types of the evaluator and the per-user stores

use bi_compiler::logging::codes::{self, Code};
use bi_compiler::{CompileError, SourceError};
use thiserror::Error;

pub type EvaluationResult<T> = Result<T, EvaluationError>;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Undefined aggregation function '{name}'. Available are: {}", available.join(", "))]
    UnknownFunction { name: String, available: Vec<String> },

    #[error("Invalid argument '{argument}' for aggregation function '{function}': {reason}")]
    InvalidFunctionArgument {
        function: String,
        argument: String,
        reason: String,
    },

    #[error("Aggregation function '{name}' is already registered")]
    DuplicateFunction { name: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EvaluationError {
    pub fn invalid_argument(function: &str, argument: &str, reason: impl ToString) -> Self {
        Self::InvalidFunctionArgument {
            function: function.to_string(),
            argument: argument.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn error_code(&self) -> Code {
        match self {
            Self::UnknownFunction { .. } | Self::DuplicateFunction { .. } => {
                codes::evaluation::UNKNOWN_FUNCTION
            }
            Self::InvalidFunctionArgument { .. } => codes::evaluation::INVALID_FUNCTION_ARGUMENT,
            Self::Compile(err) => err.error_code(),
            Self::Source(err) => err.error_code(),
            Self::Store(_) => codes::evaluation::STORE_FAILURE,
        }
    }
}

/// Failures of the assumption and tree-state stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state value {value}")]
    InvalidState { value: String },

    #[error("Invalid tree path '{path}': expected '<level>:<path>'")]
    InvalidTreePath { path: String },

    #[error("Invalid user name '{user}'")]
    InvalidUser { user: String },
}
