//! Error handling utilities for the Rill compiler

use thiserror::Error;

/// The main error type for the Rill compiler
#[derive(Error, Debug, Clone)]
pub enum RillError {
    #[error("lexical error: {message} on line {line}")]
    Lex { message: String, line: u32 },

    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("semantic analysis failed with {count} error(s)")]
    Semantic { count: usize },

    #[error("code generation error: {message}")]
    Codegen { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

/// Result type alias for Rill compiler operations
pub type RillResult<T> = Result<T, RillError>;

impl RillError {
    pub fn lex_error(message: impl Into<String>, line: u32) -> Self {
        Self::Lex { message: message.into(), line }
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::Syntax { message: message.into() }
    }

    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::Codegen { message: message.into() }
    }

    pub fn io_error(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    /// An invariant violation inside the compiler. Never caused by user input.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// True for errors caused by the source program rather than the compiler.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Internal { .. } | Self::Io { .. })
    }
}
