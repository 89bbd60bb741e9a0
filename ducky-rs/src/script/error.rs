//! Error types for the tokenizer, loader and interpreter.

use thiserror::Error;

/// A single line failed to tokenize.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Failure while turning script text into a [`Program`](super::Program).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{message}")]
    Syntax { line: usize, message: String },

    #[error("Too many commands (max {max})")]
    TooManyCommands { line: usize, max: usize },

    #[error("Line too long (max {max} characters)")]
    LineTooLong { line: usize, max: usize },

    #[error("Unmatched FUNCTION '{name}' at line {line}")]
    UnmatchedFunction { name: String, line: usize },

    #[error("Too many functions (max {max})")]
    TooManyFunctions { line: usize, max: usize },

    #[error("Function name too long (max {max} characters)")]
    FunctionNameTooLong { line: usize, max: usize },

    #[error("Cannot read script: {0}")]
    Io(#[from] std::io::Error),
}

impl Clone for LoadError {
    fn clone(&self) -> Self {
        match self {
            LoadError::Syntax { line, message } => {
                LoadError::Syntax { line: *line, message: message.clone() }
            }
            LoadError::TooManyCommands { line, max } => {
                LoadError::TooManyCommands { line: *line, max: *max }
            }
            LoadError::LineTooLong { line, max } => LoadError::LineTooLong { line: *line, max: *max },
            LoadError::UnmatchedFunction { name, line } => {
                LoadError::UnmatchedFunction { name: name.clone(), line: *line }
            }
            LoadError::TooManyFunctions { line, max } => {
                LoadError::TooManyFunctions { line: *line, max: *max }
            }
            LoadError::FunctionNameTooLong { line, max } => {
                LoadError::FunctionNameTooLong { line: *line, max: *max }
            }
            // io::Error is not Clone; keep its kind and message.
            LoadError::Io(e) => LoadError::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

impl LoadError {
    /// 1-based source line of the failure, when one applies.
    pub fn line(&self) -> Option<usize> {
        match self {
            LoadError::Syntax { line, .. }
            | LoadError::TooManyCommands { line, .. }
            | LoadError::LineTooLong { line, .. }
            | LoadError::UnmatchedFunction { line, .. }
            | LoadError::TooManyFunctions { line, .. }
            | LoadError::FunctionNameTooLong { line, .. } => Some(*line),
            LoadError::Io(_) => None,
        }
    }
}

/// A bound on the variable table was exceeded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
    #[error("Too many variables (max {max})")]
    TooMany { max: usize },

    #[error("Variable name too long (max {max} characters)")]
    NameTooLong { max: usize },

    #[error("Variable value too long (max {max} characters)")]
    ValueTooLong { max: usize },

    #[error("Empty variable name")]
    EmptyName,
}

/// Fatal fault raised while a program runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Unmatched IF at line {line}")]
    UnmatchedIf { line: usize },

    #[error("Unmatched ELSE at line {line}")]
    UnmatchedElse { line: usize },

    #[error("Unmatched WHILE at line {line}")]
    UnmatchedWhile { line: usize },

    #[error("Unmatched END_WHILE at line {line}")]
    UnmatchedEndWhile { line: usize },

    #[error("Unknown function: {name}")]
    UnknownFunction { name: String, line: usize },

    #[error("Call stack overflow at line {line}")]
    StackOverflow { line: usize },

    #[error("VAR syntax error at line {line}")]
    VarSyntax { line: usize },

    #[error("{source} at line {line}")]
    Variable { source: VarError, line: usize },
}

impl RuntimeError {
    /// 1-based source line of the token that faulted.
    pub fn line(&self) -> usize {
        match self {
            RuntimeError::UnmatchedIf { line }
            | RuntimeError::UnmatchedElse { line }
            | RuntimeError::UnmatchedWhile { line }
            | RuntimeError::UnmatchedEndWhile { line }
            | RuntimeError::UnknownFunction { line, .. }
            | RuntimeError::StackOverflow { line }
            | RuntimeError::VarSyntax { line }
            | RuntimeError::Variable { line, .. } => *line,
        }
    }
}

/// Any fault the engine can record.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Load(e) => e.line(),
            Error::Runtime(e) => Some(e.line()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
