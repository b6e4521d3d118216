// Error taxonomy for template parsing and expression evaluation

use thiserror::Error;

/// A malformed or invalid template. Always raised before any evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("template is not valid TOML: {0}")]
    Syntax(String),
    #[error("{path}: {reason}")]
    Invalid { path: String, reason: String },
}

impl ParseError {
    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ParseError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A template/data mismatch found while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown data source '{0}'")]
    UnknownSource(String),
    #[error("function '{function}' takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("row {0} is outside the data window")]
    RowOutOfRange(usize),
}

/// Failure of a whole graph evaluation.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("{path}: {source}")]
    Evaluation {
        path: String,
        source: EvaluationError,
    },
}
