//! Core parsing pipeline
//!
//! - `engine`: the mode-aware lexer and its tokens
//! - `catalogue`: known macros and environments with their argument shapes
//! - `parser`: recursive-descent parser producing [`flm_ir::Fragment`]s
//! - `counter`: counter formatting for footnote markers and list tags

pub mod catalogue;
pub mod counter;
pub mod engine;
pub mod parser;

pub use catalogue::{Catalogue, EnvironmentSpec, MacroSpec};
pub use counter::CounterFormatter;
pub use parser::{parse_fragment, Parser, DEFAULT_MAX_NESTING_DEPTH};
