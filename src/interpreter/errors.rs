use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::tokenizer::Position;
use thiserror::Error;

/// Message of the diagnostic produced for any runtime failure; the error
/// itself becomes the cause.
pub const EVALUATION_FAILED: &str = "Error evaluating script";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("Division by zero at {position}")]
    DivisionByZero { position: Position },
    #[error("Integer overflow at {position}")]
    IntegerOverflow { position: Position },
    #[error("Undefined variable '{name}' at {position}")]
    UndefinedVariable { name: String, position: Position },
    #[error("Value of type {found} is not callable (at {position})")]
    NotCallable { found: String, position: Position },
    #[error("Function '{name}' expects {expected} argument(s), found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Value of type {found} has no field '{field}' (at {position})")]
    UnknownField {
        found: String,
        field: String,
        position: Position,
    },
    #[error("Operator '{operator}' cannot be applied to {left} and {right} (at {position})")]
    InvalidOperands {
        operator: String,
        left: String,
        right: String,
        position: Position,
    },
    #[error("{builtin}: {message}")]
    Builtin {
        builtin: &'static str,
        message: String,
    },
    #[error("Script failed: {message}")]
    Failure { message: String },
    #[error("Maximum call depth of {limit} exceeded")]
    StackOverflow { limit: usize },
    #[error("Script '{script}' is not loaded")]
    MissingScript { script: String },
}

impl RuntimeError {
    pub fn code(&self) -> ErrorCode {
        runtime_error_code(self)
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code(), EVALUATION_FAILED).with_cause(self.to_string())
    }
}

pub fn runtime_error_code(error: &RuntimeError) -> ErrorCode {
    match error {
        RuntimeError::NotCallable { .. }
        | RuntimeError::UnknownField { .. }
        | RuntimeError::InvalidOperands { .. } => ErrorCode::TypeMismatch,
        RuntimeError::ArityMismatch { .. }
        | RuntimeError::Builtin { .. }
        | RuntimeError::DivisionByZero { .. }
        | RuntimeError::IntegerOverflow { .. }
        | RuntimeError::UndefinedVariable { .. } => ErrorCode::InvalidOperation,
        RuntimeError::StackOverflow { .. }
        | RuntimeError::MissingScript { .. }
        | RuntimeError::Failure { .. } => ErrorCode::RuntimePanic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_errors_become_evaluation_diagnostics() {
        let error = RuntimeError::DivisionByZero {
            position: Position::new(4, 9),
        };
        let diagnostic = error.to_diagnostic();
        assert_eq!(diagnostic.message, EVALUATION_FAILED);
        assert_eq!(diagnostic.cause.as_deref(), Some("Division by zero at 4:9"));
        assert_eq!(diagnostic.code, Some(ErrorCode::InvalidOperation));
    }

    #[test]
    fn script_failures_are_runtime_panics() {
        let error = RuntimeError::Failure {
            message: "boom".to_string(),
        };
        assert_eq!(error.code().as_str(), "E005");
    }
}
