//! Error types for the Jack compiler.
//!
//! Every error is fatal for the compilation unit: the tokenizer and the
//! compilation engine abort on the first failure and propagate it with `?`.

use crate::token::Span;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during Jack compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Unrecognized character in the source text.
    #[error("invalid character '{ch}' at {span}")]
    InvalidCharacter { ch: char, span: Span },

    /// Integer literal outside the Hack word range.
    #[error("integer constant {value} exceeds maximum value 32767 at {span}")]
    IntegerOutOfRange { value: u32, span: Span },

    /// String literal with no closing quote on the same line.
    #[error("unterminated string constant at {span}")]
    UnterminatedString { span: Span },

    /// Token mismatch during parsing.
    #[error("syntax error at {span}: expected {expected}, got {got}")]
    Syntax {
        span: Span,
        expected: String,
        got: String,
    },

    /// Identifier used as a variable but defined in neither scope.
    #[error("undefined variable '{name}' at {span}")]
    UndefinedVariable { name: String, span: Span },

    /// Expression nesting beyond the recursion guard of the engine.
    #[error("expression nesting too deep at {span}")]
    NestingTooDeep { span: Span },

    /// Arithmetic command outside the VM vocabulary. A guard against engine
    /// bugs; never fires on a correct build.
    #[error("illegal arithmetic command '{0}'")]
    IllegalCommand(String),

    /// Memory segment outside the VM vocabulary. Same guard as above.
    #[error("illegal memory segment '{0}'")]
    IllegalSegment(String),

    /// File I/O error.
    #[error("IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Create a syntax error from an expected/actual pair.
    pub fn syntax(span: Span, expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::Syntax {
            span,
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create an undefined variable error.
    pub fn undefined_variable(name: impl Into<String>, span: Span) -> Self {
        Self::UndefinedVariable {
            name: name.into(),
            span,
        }
    }

    /// Create an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for compiler operations.
pub type Result<T> = std::result::Result<T, CompileError>;
