//! Lexing engine
//!
//! ```text
//! Source text
//!        │
//!        ▼
//!    ┌───────────────┐
//!    │    Lexer      │  (text / math / verbatim modes)
//!    └───────────────┘
//!        │  tokens
//!        ▼
//!    ┌───────────────┐
//!    │    Parser     │  (catalogue-driven arguments)
//!    └───────────────┘
//!        │
//!        ▼
//!    Fragment (node tree)
//! ```

pub mod lexer;
pub mod token;

pub use lexer::{tokenize, Lexer};
pub use token::{Token, TokenKind};
