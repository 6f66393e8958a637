//! FLM - a LaTeX-like markup language rendered to HTML and plain text
//!
//! Source text is parsed against a catalogue of known macros and
//! environments into a typed node tree ([`flm_ir`]). A [`Document`] then
//! walks its fragments twice: pass 1 numbers sections, equations, figures
//! and footnotes and collects labels and defined terms; pass 2 renders with
//! any [`Renderer`] backend, so references may point forward.
//!
//! # Example
//!
//! ```
//! use flm::{Environment, HtmlRenderer};
//!
//! let env = Environment::standard();
//! let fragment = env.make_fragment(r"a \textbf{b} c", "intro").unwrap();
//! let mut doc = env.make_document(vec![fragment]);
//! let html = doc.render(&HtmlRenderer::default()).unwrap().output;
//! assert_eq!(html, "a <strong>b</strong> c");
//! ```

pub mod config;
pub mod core;
pub mod document;
pub mod environment;
pub mod features;
pub mod render;
pub mod utils;

pub use flm_ir as ir;

pub use config::Config;
pub use crate::core::catalogue::{
    ArgSpec, Catalogue, EnvironmentAction, EnvironmentSpec, FloatKind, MacroAction, MacroSpec,
};
pub use crate::core::counter::CounterFormatter;
pub use document::{Document, DocumentState, Rendered};
pub use environment::Environment;
pub use features::endnotes::EndnotesOptions;
pub use features::{FeatureManager, FeatureRegistry, FootnotePlacement};
pub use render::{HtmlRenderer, Renderer, TextRenderer};
pub use utils::error::{FlmError, FlmResult, LexError, ParseError, ResolutionError};

/// Render a single source string to HTML, followed by its endnotes.
pub fn render_html(source: &str) -> FlmResult<String> {
    render_with(&Environment::standard(), source, |env| env.html_renderer())
}

/// Render a single source string to plain text, followed by its endnotes.
pub fn render_text(source: &str) -> FlmResult<String> {
    render_with(&Environment::standard(), source, |env| env.text_renderer())
}

/// Render a single source string with the renderer built by `make`.
pub fn render_with<R, F>(env: &Environment, source: &str, make: F) -> FlmResult<String>
where
    R: Renderer<Output = String>,
    F: FnOnce(&Environment) -> R,
{
    let renderer = make(env);
    let fragment = env.make_fragment(source, "main")?;
    let mut doc = env.make_document(vec![fragment]);
    let rendered = doc.render(&renderer)?;
    let endnotes = rendered.render_default_endnotes(&renderer)?;
    Ok(renderer.join_blocks(vec![rendered.output, endnotes]))
}
