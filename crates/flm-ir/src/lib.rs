//! Node tree produced by the FLM parser.
//!
//! The tree is plain data: nodes never point at each other, cross-references
//! are carried as label names and resolved later by the feature managers.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// =============================================================================
// Source positions
// =============================================================================

/// A location in the source text. `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(offset: usize, line: usize, column: usize) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }

    /// The position of the first character of a source text.
    pub fn start() -> Self {
        Self::new(0, 1, 1)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Node {
    Text(String),
    Group(Vec<Node>),
    Macro(MacroNode),
    Environment(EnvironmentNode),
    MathInline(MathNode),
    MathDisplay(MathNode),
    ParagraphBreak,
}

impl Node {
    /// Source position of the node, when it has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            Node::Macro(m) => Some(m.pos),
            Node::Environment(e) => Some(e.pos),
            Node::MathInline(m) | Node::MathDisplay(m) => Some(m.pos),
            _ => None,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        match self {
            Node::Text(t) => t.trim().is_empty(),
            _ => false,
        }
    }

    /// Reconstructs LaTeX-like source for the node.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write_source(&mut out);
        out
    }

    fn write_source(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(t),
            Node::Group(nodes) => {
                out.push('{');
                write_nodes_source(nodes, out);
                out.push('}');
            }
            Node::Macro(m) => {
                out.push('\\');
                out.push_str(&m.name);
                write_args_source(&m.args, out);
            }
            Node::Environment(e) => {
                out.push_str("\\begin{");
                out.push_str(&e.name);
                out.push('}');
                write_args_source(&e.args, out);
                match &e.body {
                    Body::Nodes(nodes) => write_nodes_source(nodes, out),
                    Body::Items(items) => {
                        for item in items {
                            out.push_str("\\item");
                            if let Some(tag) = &item.tag {
                                tag.write_source(out);
                            }
                            out.push(' ');
                            write_nodes_source(&item.content, out);
                        }
                    }
                    Body::Verbatim(text) => out.push_str(text),
                }
                out.push_str("\\end{");
                out.push_str(&e.name);
                out.push('}');
            }
            Node::MathInline(m) => {
                out.push_str("\\(");
                out.push_str(&m.latex());
                out.push_str("\\)");
            }
            Node::MathDisplay(m) => match &m.env {
                Some(env) => {
                    out.push_str(&format!("\\begin{{{}}}", env));
                    out.push_str(&m.latex());
                    out.push_str(&format!("\\end{{{}}}", env));
                }
                None => {
                    out.push_str("\\[");
                    out.push_str(&m.latex());
                    out.push_str("\\]");
                }
            },
            Node::ParagraphBreak => out.push_str("\n\n"),
        }
    }

    /// Collects the visible text of the node, dropping markup.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.write_plain_text(&mut out);
        out
    }

    fn write_plain_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(t),
            Node::Group(nodes) => nodes.iter().for_each(|n| n.write_plain_text(out)),
            Node::Macro(m) => {
                // The last mandatory argument carries the visible text of
                // formatting and linking macros.
                if let Some(arg) = m.args.iter().rev().flatten().next() {
                    arg.nodes.iter().for_each(|n| n.write_plain_text(out));
                }
            }
            Node::Environment(e) => {
                if let Body::Nodes(nodes) = &e.body {
                    nodes.iter().for_each(|n| n.write_plain_text(out));
                }
            }
            Node::MathInline(m) | Node::MathDisplay(m) => out.push_str(&m.latex()),
            Node::ParagraphBreak => out.push(' '),
        }
    }
}

/// Source of a node sequence, see [`Node::to_source`].
pub fn nodes_to_source(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes_source(nodes, &mut out);
    out
}

/// Visible text of a node sequence, see [`Node::plain_text`].
pub fn nodes_plain_text(nodes: &[Node]) -> String {
    nodes.iter().map(Node::plain_text).collect()
}

fn write_nodes_source(nodes: &[Node], out: &mut String) {
    for node in nodes {
        node.write_source(out);
    }
}

fn write_args_source(args: &[Option<Argument>], out: &mut String) {
    for arg in args.iter().flatten() {
        arg.write_source(out);
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// How an argument was delimited in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Delimiter {
    /// `{...}`
    Brace,
    /// `[...]`
    Bracket,
    /// A single token without braces, e.g. `\textbf x`
    Bare,
    /// A star marker such as `\section*`
    Star,
}

/// One parsed macro or environment argument.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Argument {
    /// Parsed content; empty for raw arguments and star markers.
    pub nodes: Vec<Node>,
    /// The argument's source text between its delimiters.
    pub verbatim: String,
    pub delimiter: Delimiter,
}

impl Argument {
    pub fn parsed(nodes: Vec<Node>, verbatim: impl Into<String>, delimiter: Delimiter) -> Self {
        Self {
            nodes,
            verbatim: verbatim.into(),
            delimiter,
        }
    }

    pub fn raw(verbatim: impl Into<String>, delimiter: Delimiter) -> Self {
        let verbatim = verbatim.into();
        Self {
            nodes: vec![Node::Text(verbatim.clone())],
            verbatim,
            delimiter,
        }
    }

    pub fn star() -> Self {
        Self {
            nodes: Vec::new(),
            verbatim: "*".to_string(),
            delimiter: Delimiter::Star,
        }
    }

    fn write_source(&self, out: &mut String) {
        match self.delimiter {
            Delimiter::Brace => {
                out.push('{');
                out.push_str(&self.verbatim);
                out.push('}');
            }
            Delimiter::Bracket => {
                out.push('[');
                out.push_str(&self.verbatim);
                out.push(']');
            }
            Delimiter::Bare => {
                out.push(' ');
                out.push_str(&self.verbatim);
            }
            Delimiter::Star => out.push('*'),
        }
    }
}

// =============================================================================
// Macros and environments
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MacroNode {
    pub name: String,
    /// One slot per declared argument; `None` when an optional argument
    /// was not given.
    pub args: Vec<Option<Argument>>,
    pub pos: Position,
}

impl MacroNode {
    pub fn arg(&self, index: usize) -> Option<&Argument> {
        self.args.get(index).and_then(Option::as_ref)
    }

    /// Whether the optional argument (or star) at `index` was given.
    pub fn has_arg(&self, index: usize) -> bool {
        self.arg(index).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnvironmentNode {
    pub name: String,
    pub args: Vec<Option<Argument>>,
    pub body: Body,
    pub pos: Position,
}

impl EnvironmentNode {
    pub fn arg(&self, index: usize) -> Option<&Argument> {
        self.args.get(index).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Body {
    Nodes(Vec<Node>),
    /// Entries of a list environment, split at `\item`.
    Items(Vec<ListItem>),
    /// Body of a verbatim environment, byte for byte.
    Verbatim(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ListItem {
    /// Custom tag from `\item[...]`.
    pub tag: Option<Argument>,
    pub content: Vec<Node>,
    pub pos: Position,
}

// =============================================================================
// Math
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MathNode {
    /// Environment name for `\begin{align}`-style math, `None` for
    /// `\( \)`, `$ $` and `\[ \]`.
    pub env: Option<String>,
    /// Equation lines split at `\\`. Inline math always has one line.
    pub lines: Vec<EquationLine>,
    pub pos: Position,
}

impl MathNode {
    /// First `\label` found in the math content.
    pub fn label(&self) -> Option<&str> {
        self.lines
            .iter()
            .flat_map(|l| l.labels.iter())
            .map(String::as_str)
            .next()
    }

    /// Whether lines are numbered without an explicit label.
    pub fn is_numbered_env(&self) -> bool {
        matches!(&self.env, Some(env) if !env.ends_with('*'))
    }

    /// Math source with `\label`, `\tag` and `\nonumber` removed.
    pub fn latex(&self) -> String {
        self.lines
            .iter()
            .map(|l| nodes_to_source(&l.nodes))
            .collect::<Vec<_>>()
            .join("\\\\")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EquationLine {
    pub nodes: Vec<Node>,
    pub labels: Vec<String>,
    /// Display form of a `\tag{x}` (`(x)`) or `\tag*{x}` (`x`).
    pub tag: Option<String>,
    pub nonumber: bool,
}

// =============================================================================
// Fragments
// =============================================================================

/// The parse result for one unit of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Fragment {
    pub name: String,
    pub nodes: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Fragment {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            nodes,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(
        name: impl Into<String>,
        nodes: Vec<Node>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            name: name.into(),
            nodes,
            diagnostics,
        }
    }

    /// True when the fragment holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.is_whitespace() || matches!(n, Node::ParagraphBreak))
    }
}

/// A non-fatal remark collected while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Diagnostic {
    pub kind: String,
    pub message: String,
    pub pos: Position,
}

impl Diagnostic {
    pub fn new(kind: impl Into<String>, message: impl Into<String>, pos: Position) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            pos,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.pos, self.message)
    }
}
