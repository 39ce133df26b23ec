//! Diagnostics and the result-or-diagnostics union returned by the host.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    Syntax,
    ModuleResolution,
    TypeMismatch,
    InvalidOperation,
    RuntimePanic,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Syntax => "E001",
            ErrorCode::ModuleResolution => "E002",
            ErrorCode::TypeMismatch => "E003",
            ErrorCode::InvalidOperation => "E004",
            ErrorCode::RuntimePanic => "E005",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub script: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.script.display(), self.line, self.column)
    }
}

/// One report produced while compiling or evaluating a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
    /// Description of the underlying error, when there is one.
    pub cause: Option<String>,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            cause: None,
            location: None,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message).with_code(code)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn at(mut self, script: &Path, line: usize, column: usize) -> Self {
        self.location = Some(SourceLocation {
            script: script.to_path_buf(),
            line,
            column,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }

    /// `message` followed by `: cause` when a cause is attached.
    pub fn summary(&self) -> String {
        match &self.cause {
            Some(cause) => format!("{}: {}", self.message, cause),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{}[{}]", self.severity, code.as_str())?,
            None => write!(f, "{}", self.severity)?,
        }
        if let Some(location) = &self.location {
            write!(f, " {}", location)?;
        }
        write!(f, ": {}", self.summary())
    }
}

/// Result of a host operation: a value on success, and the diagnostics
/// collected along the way in both cases.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome<T> {
    Success { value: T, reports: Vec<Diagnostic> },
    Failure { reports: Vec<Diagnostic> },
}

impl<T> EvaluationOutcome<T> {
    pub fn success(value: T, reports: Vec<Diagnostic>) -> Self {
        EvaluationOutcome::Success { value, reports }
    }

    pub fn failure(reports: Vec<Diagnostic>) -> Self {
        EvaluationOutcome::Failure { reports }
    }

    pub fn reports(&self) -> &[Diagnostic] {
        match self {
            EvaluationOutcome::Success { reports, .. } | EvaluationOutcome::Failure { reports } => {
                reports
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationOutcome::Success { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            EvaluationOutcome::Success { value, .. } => Some(value),
            EvaluationOutcome::Failure { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            EvaluationOutcome::Success { value, .. } => Some(value),
            EvaluationOutcome::Failure { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EvaluationOutcome<U> {
        match self {
            EvaluationOutcome::Success { value, reports } => EvaluationOutcome::Success {
                value: f(value),
                reports,
            },
            EvaluationOutcome::Failure { reports } => EvaluationOutcome::Failure { reports },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_appends_cause() {
        let diagnostic = Diagnostic::error(ErrorCode::RuntimePanic, "Error evaluating script")
            .with_cause("Division by zero");
        assert_eq!(diagnostic.summary(), "Error evaluating script: Division by zero");
    }

    #[test]
    fn display_includes_code_and_location() {
        let diagnostic = Diagnostic::error(ErrorCode::TypeMismatch, "Unresolved type 'Model'")
            .at(Path::new("runner.smain.svs"), 3, 14);
        assert_eq!(
            diagnostic.to_string(),
            "error[E003] runner.smain.svs:3:14: Unresolved type 'Model'"
        );
    }

    #[test]
    fn success_keeps_warnings() {
        let outcome = EvaluationOutcome::success(1, vec![Diagnostic::warning("duplicate import")]);
        assert!(outcome.is_success());
        assert_eq!(outcome.reports().len(), 1);
        assert_eq!(outcome.map(|v| v + 1).into_value(), Some(2));
    }

    #[test]
    fn severity_orders_errors_above_warnings() {
        assert!(Diagnostic::new(Severity::Fatal, "x").is_error());
        assert!(!Diagnostic::warning("x").is_error());
    }
}
