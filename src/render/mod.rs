//! Renderer framework
//!
//! A [`Renderer`] backend supplies output primitives (text, paragraphs,
//! headings, lists, links, math...). The generic [`walker`] turns the node
//! tree into calls to those primitives, resolving labels, terms and
//! footnotes through the feature managers populated during registration.
//!
//! Backends:
//! - [`HtmlRenderer`]: HTML fragments with math left for client-side
//!   typesetting
//! - [`TextRenderer`]: a plain-text approximation

pub mod html;
pub mod text;
pub mod walker;

use std::cell::Cell;

use crate::config::Config;
use crate::core::catalogue::{Catalogue, FloatKind, ListKind, TextFormat};
use crate::features::{Footnote, FeatureRegistry};

pub use html::HtmlRenderer;
pub use text::TextRenderer;

// =============================================================================
// Primitive descriptors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingInfo<'a> {
    pub level: u8,
    /// Visible section number, when headings are numbered
    pub number: Option<&'a str>,
    pub target_id: Option<&'a str>,
    /// Run-in heading at the start of a paragraph
    pub inline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListInfo {
    pub kind: ListKind,
    /// 0 for a top-level list
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItem<O> {
    pub tag: O,
    pub content: O,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `\ref`, `\eqref`, `\hyperref`
    Ref,
    /// `\term`
    Term,
    /// `\href`, `\url`
    External,
    /// `\cite`
    Citation,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::Ref => "ref",
            LinkKind::Term => "term",
            LinkKind::External => "href",
            LinkKind::Citation => "citation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathLine {
    pub latex: String,
    /// Equation number or custom tag, e.g. `(2)`
    pub tag: Option<String>,
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathInfo<'a> {
    pub display: bool,
    pub env: Option<&'a str>,
    pub lines: Vec<MathLine>,
}

impl MathInfo<'_> {
    /// Math source with a `\tag*{...}` after every numbered line.
    pub fn tagged_latex(&self) -> String {
        self.lines
            .iter()
            .map(|line| match &line.tag {
                Some(tag) => format!("{} \\tag*{{{}}}", line.latex, tag),
                None => line.latex.clone(),
            })
            .collect::<Vec<_>>()
            .join(" \\\\\n")
    }

    /// Environment name with numbering turned off, since numbers are
    /// injected as tags.
    pub fn starred_env(&self) -> Option<String> {
        self.env.map(|env| {
            if env.ends_with('*') {
                env.to_string()
            } else {
                format!("{}*", env)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatInfo<'a> {
    pub kind: FloatKind,
    /// e.g. `Figure 2`
    pub display: &'a str,
    pub target_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEndnote<O> {
    pub marker: String,
    pub target_id: String,
    pub body: O,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEndnoteGroup<O> {
    /// Heading content and its level
    pub heading: Option<(O, u8)>,
    pub notes: Vec<RenderedEndnote<O>>,
}

// =============================================================================
// Renderer
// =============================================================================

/// An output backend.
pub trait Renderer {
    type Output: Clone;

    fn name(&self) -> &'static str;

    /// Literal text, escaped as the format requires
    fn render_value(&self, text: &str) -> Self::Output;

    fn render_nothing(&self) -> Self::Output;

    fn is_empty(&self, output: &Self::Output) -> bool;

    /// Concatenate inline content
    fn join(&self, parts: Vec<Self::Output>) -> Self::Output;

    /// Concatenate block content
    fn join_blocks(&self, blocks: Vec<Self::Output>) -> Self::Output;

    fn render_paragraph(&self, content: Self::Output) -> Self::Output;

    fn render_text_format(&self, format: TextFormat, content: Self::Output) -> Self::Output;

    fn render_heading(&self, heading: &HeadingInfo<'_>, title: Self::Output) -> Self::Output;

    fn render_list(&self, list: &ListInfo, items: Vec<RenderedItem<Self::Output>>)
        -> Self::Output;

    fn render_link(&self, kind: LinkKind, href: &str, display: Self::Output) -> Self::Output;

    fn render_math(&self, math: &MathInfo<'_>) -> Self::Output;

    fn render_verbatim(&self, text: &str, code: bool, block: bool) -> Self::Output;

    fn render_float(
        &self,
        float: &FloatInfo<'_>,
        content: Self::Output,
        caption: Option<Self::Output>,
    ) -> Self::Output;

    fn render_graphics(&self, src: &str, options: Option<&str>) -> Self::Output;

    fn render_defterm(&self, term: Self::Output, target_id: &str, body: Self::Output)
        -> Self::Output;

    /// A generic block carrying a role name, e.g. a user environment
    fn render_semantic_block(&self, role: &str, content: Self::Output) -> Self::Output;

    fn render_footnote_mark(&self, note: &Footnote) -> Self::Output;

    fn render_footnote_inline(&self, note: &Footnote, body: Self::Output) -> Self::Output;

    /// One endnote category, `footnote` or `citation`
    fn render_endnotes_list(
        &self,
        category: &str,
        title: Option<(&str, u8)>,
        groups: Vec<RenderedEndnoteGroup<Self::Output>>,
    ) -> Self::Output;
}

// =============================================================================
// Render context
// =============================================================================

/// Read-only view of a registered document, handed to the walker.
#[derive(Debug)]
pub struct RenderContext<'d> {
    pub catalogue: &'d Catalogue,
    pub config: &'d Config,
    pub features: &'d FeatureRegistry,
    fragment: Cell<usize>,
    list_depth: Cell<usize>,
}

impl<'d> RenderContext<'d> {
    pub fn new(catalogue: &'d Catalogue, config: &'d Config, features: &'d FeatureRegistry) -> Self {
        Self {
            catalogue,
            config,
            features,
            fragment: Cell::new(0),
            list_depth: Cell::new(0),
        }
    }

    /// Index of the fragment being rendered
    pub fn fragment(&self) -> usize {
        self.fragment.get()
    }

    pub fn set_fragment(&self, index: usize) {
        self.fragment.set(index);
    }

    /// Nesting depth of the list being rendered
    pub fn list_depth(&self) -> usize {
        self.list_depth.get()
    }

    /// Run `f` one list level deeper.
    pub fn in_list<T>(&self, f: impl FnOnce() -> T) -> T {
        let depth = self.list_depth.get();
        self.list_depth.set(depth + 1);
        let result = f();
        self.list_depth.set(depth);
        result
    }
}

// =============================================================================
// Escaping
// =============================================================================

/// Escape `& < > "` for HTML text and attributes.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape(r#"a<b & "c">"#), "a&lt;b &amp; &quot;c&quot;&gt;");
    }

    #[test]
    fn test_tagged_latex() {
        let math = MathInfo {
            display: true,
            env: Some("align"),
            lines: vec![
                MathLine {
                    latex: "a &= b".to_string(),
                    tag: Some("(1)".to_string()),
                    target_id: Some("equation-1".to_string()),
                },
                MathLine {
                    latex: "c &= d".to_string(),
                    tag: None,
                    target_id: None,
                },
            ],
        };
        assert_eq!(math.tagged_latex(), "a &= b \\tag*{(1)} \\\\\nc &= d");
        assert_eq!(math.starred_env().as_deref(), Some("align*"));
    }
}
