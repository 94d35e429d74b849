//! Structured error and warning records shared by every stage.

use std::fmt;

use serde::Serialize;

use crate::lexer::{LexError, LexErrorKind};
use crate::token::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Which stage a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Lexical,
    Syntax,
    Semantic,
}

/// Machine-readable classification of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Code {
    Lexical { error: LexErrorKind },
    Syntax,
    DuplicatePassage { name: String },
    UnknownPassage { name: String },
    UnterminatedConditional,
    UnmatchedClose,
    UnmatchedElse,
    UnreachablePassage { name: String },
    MissingEntry { name: String },
    UnassignedVariable { name: String },
    EmptyChoiceText,
}

impl Code {
    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::Lexical { .. } => Category::Lexical,
            Self::Syntax => Category::Syntax,
            _ => Category::Semantic,
        }
    }
}

/// One error or warning with its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Code,
    pub message: String,
    pub line: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn error(code: Code, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, span, message)
    }

    #[must_use]
    pub fn warning(code: Code, span: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, span, message)
    }

    fn new(severity: Severity, code: Code, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            line: span.line,
            column: span.column,
            suggestion: None,
            snippet: None,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.code.category()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} at line {}, column {}",
            self.severity, self.message, self.line, self.column
        )
    }
}

impl From<&LexError> for Diagnostic {
    fn from(err: &LexError) -> Self {
        Self::error(
            Code::Lexical {
                error: err.kind.clone(),
            },
            err.span,
            err.kind.to_string(),
        )
    }
}

/// True when any diagnostic has error severity.
#[must_use]
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
