//! Error handling for FLM parsing and rendering
//!
//! Lexing and parsing errors abort the whole parse; resolution errors abort
//! the render pass that hit them. Every error carries the construct name and
//! the most specific source position available.

use flm_ir::Position;
use thiserror::Error;

/// Errors raised while splitting the source into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated group: '{{' opened at {pos} is never closed")]
    UnterminatedGroup { pos: Position },

    #[error("unterminated math: '{delimiter}' opened at {pos} is never closed")]
    UnterminatedMath { delimiter: String, pos: Position },

    #[error("unterminated environment '{name}' opened at {pos}")]
    UnterminatedEnvironment { name: String, pos: Position },

    #[error("unterminated verbatim environment '{name}' opened at {pos}")]
    UnterminatedVerbatim { name: String, pos: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedGroup { pos }
            | LexError::UnterminatedMath { pos, .. }
            | LexError::UnterminatedEnvironment { pos, .. }
            | LexError::UnterminatedVerbatim { pos, .. } => *pos,
        }
    }
}

/// Errors raised while building the node tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unknown macro '\\{name}' at {pos}")]
    UnknownMacro { name: String, pos: Position },

    #[error("unknown environment '{name}' at {pos}")]
    UnknownEnvironment { name: String, pos: Position },

    #[error("environment '{expected}' opened at {opened} is closed by '\\end{{{found}}}' at {pos}")]
    MismatchedEnvironment {
        expected: String,
        found: String,
        opened: Position,
        pos: Position,
    },

    #[error("malformed arguments for '{name}' at {pos}: {message}")]
    MalformedArguments {
        name: String,
        message: String,
        pos: Position,
    },

    #[error("nesting deeper than {limit} levels at {pos}")]
    NestingTooDeep { limit: usize, pos: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Lex(e) => e.position(),
            ParseError::UnknownMacro { pos, .. }
            | ParseError::UnknownEnvironment { pos, .. }
            | ParseError::MismatchedEnvironment { pos, .. }
            | ParseError::MalformedArguments { pos, .. }
            | ParseError::NestingTooDeep { pos, .. } => *pos,
        }
    }

    pub(crate) fn malformed(name: &str, message: impl Into<String>, pos: Position) -> Self {
        ParseError::MalformedArguments {
            name: name.to_string(),
            message: message.into(),
            pos,
        }
    }
}

/// Errors raised while registering or resolving labels, terms and notes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unresolved reference to label '{name}' at {pos}")]
    UnresolvedLabel { name: String, pos: Position },

    #[error("unresolved term '{term}' at {pos}")]
    UnresolvedTerm { term: String, pos: Position },

    #[error("citation '{key}' at {pos} is not in the bibliography")]
    UnresolvedCitation { key: String, pos: Position },

    #[error("duplicate label '{name}' at {pos}")]
    DuplicateLabel { name: String, pos: Position },

    #[error("label '{name}' at {pos} is not attached to any section, equation, figure or term")]
    UnattachedLabel { name: String, pos: Position },
}

impl ResolutionError {
    pub fn position(&self) -> Position {
        match self {
            ResolutionError::UnresolvedLabel { pos, .. }
            | ResolutionError::UnresolvedTerm { pos, .. }
            | ResolutionError::UnresolvedCitation { pos, .. }
            | ResolutionError::DuplicateLabel { pos, .. }
            | ResolutionError::UnattachedLabel { pos, .. } => *pos,
        }
    }
}

/// Umbrella error for the public API.
#[derive(Debug, Error)]
pub enum FlmError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("document lifecycle error: {0}")]
    State(String),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FlmError {
    /// Source position of the error, when it comes from the markup.
    pub fn position(&self) -> Option<Position> {
        match self {
            FlmError::Lex(e) => Some(e.position()),
            FlmError::Parse(e) => Some(e.position()),
            FlmError::Resolution(e) => Some(e.position()),
            FlmError::Config(_) | FlmError::State(_) | FlmError::Io { .. } => None,
        }
    }
}

impl From<serde_json::Error> for FlmError {
    fn from(err: serde_json::Error) -> Self {
        FlmError::Config(err.to_string())
    }
}

/// Result type for FLM operations
pub type FlmResult<T> = Result<T, FlmError>;
