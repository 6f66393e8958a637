//! Utility modules
//!
//! - Error types and result types

pub mod error;

pub use error::{FlmError, FlmResult, LexError, ParseError, ResolutionError};
