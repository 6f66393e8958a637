//! Configuration
//!
//! Options recognised when an [`Environment`](crate::Environment) is built.
//! Every field has a default, so a configuration file only lists what it
//! changes.

use fxhash::FxHashMap;
use serde::Deserialize;

use crate::core::catalogue::{EnvironmentSpec, FloatKind, MacroSpec};
use crate::core::counter::CounterFormatter;
use crate::core::parser::DEFAULT_MAX_NESTING_DEPTH;
use crate::features::endnotes::{EndnotesOptions, FootnotePlacement};
use crate::features::refs::HeadingNumbering;
use crate::utils::error::{FlmError, FlmResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Formats footnote markers
    pub footnote_counter: CounterFormatter,
    pub footnote_placement: FootnotePlacement,
    pub heading_numbering: HeadingNumbering,
    pub lists: ListOptions,
    /// Name shown before figure numbers
    pub figure_name: String,
    /// Name shown before table numbers
    pub table_name: String,
    /// Formats citation numbers
    pub citation_counter: CounterFormatter,
    /// Citation key to reference text, in FLM inline markup
    pub bibliography: FxHashMap<String, String>,
    pub max_nesting_depth: usize,
    pub html: HtmlOptions,
    pub text: TextOptions,
    pub endnotes: EndnotesOptions,
    /// Extra or replacement macros
    pub macros: Vec<MacroSpec>,
    /// Extra or replacement environments
    pub environments: Vec<EnvironmentSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            footnote_counter: CounterFormatter::Arabic,
            footnote_placement: FootnotePlacement::Endnote,
            heading_numbering: HeadingNumbering::Unnumbered,
            lists: ListOptions::default(),
            figure_name: "Figure".to_string(),
            table_name: "Table".to_string(),
            citation_counter: CounterFormatter::Arabic,
            bibliography: FxHashMap::default(),
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            html: HtmlOptions::default(),
            text: TextOptions::default(),
            endnotes: EndnotesOptions::default(),
            macros: Vec::new(),
            environments: Vec::new(),
        }
    }
}

impl Config {
    /// Create new options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Superscript footnote markers and numbered headings
    pub fn numbered() -> Self {
        Self {
            footnote_counter: CounterFormatter::UnicodeSuperscript,
            heading_numbering: HeadingNumbering::Hierarchical { max_level: 3 },
            ..Self::default()
        }
    }

    /// Name shown before the number of a float of `kind`.
    pub fn float_name(&self, kind: FloatKind) -> &str {
        match kind {
            FloatKind::Figure => &self.figure_name,
            FloatKind::Table => &self.table_name,
        }
    }

    pub fn from_json_str(s: &str) -> FlmResult<Self> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()
    }

    #[cfg(feature = "config-formats")]
    pub fn from_yaml_str(s: &str) -> FlmResult<Self> {
        let config: Config =
            serde_yaml::from_str(s).map_err(|e| FlmError::Config(e.to_string()))?;
        config.validate()
    }

    #[cfg(feature = "config-formats")]
    pub fn from_toml_str(s: &str) -> FlmResult<Self> {
        let config: Config = toml::from_str(s).map_err(|e| FlmError::Config(e.to_string()))?;
        config.validate()
    }

    fn validate(self) -> FlmResult<Self> {
        if self.max_nesting_depth == 0 {
            return Err(FlmError::Config(
                "max_nesting_depth must be at least 1".to_string(),
            ));
        }
        if self.lists.itemize_bullets.is_empty() || self.lists.enumerate_templates.is_empty() {
            return Err(FlmError::Config(
                "list schemes need at least one entry".to_string(),
            ));
        }
        if let Some(level) = self.endnotes.group_by_heading_level {
            if !(1..=6).contains(&level) {
                return Err(FlmError::Config(format!(
                    "endnote heading level {} is out of range 1..=6",
                    level
                )));
            }
        }
        Ok(self)
    }
}

/// Default list tags, indexed by nesting depth (the last entry repeats).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    pub itemize_bullets: Vec<String>,
    /// Tag templates, see [`CounterFormatter::TagTemplate`]
    pub enumerate_templates: Vec<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            itemize_bullets: vec!["•".to_string(), "-".to_string(), "▸".to_string()],
            enumerate_templates: vec!["1.".to_string(), "(a)".to_string(), "i.".to_string()],
        }
    }
}

impl ListOptions {
    pub fn bullet(&self, depth: usize) -> &str {
        pick(&self.itemize_bullets, depth)
    }

    pub fn enumerate_template(&self, depth: usize) -> &str {
        pick(&self.enumerate_templates, depth)
    }
}

fn pick(entries: &[String], depth: usize) -> &str {
    entries
        .get(depth)
        .or_else(|| entries.last())
        .map(String::as_str)
        .unwrap_or("")
}

/// Options of the HTML backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HtmlOptions {
    /// Inserted between block-level elements
    pub block_separator: String,
    /// Render figure numbers as `Figure&nbsp;1`
    pub nbsp_in_figure_numbers: bool,
    /// Element names for heading levels 1-6
    pub heading_tags: Vec<String>,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self {
            block_separator: "\n".to_string(),
            nbsp_in_figure_numbers: true,
            // run-in headings sit inside <p>, where <h4> is not allowed
            heading_tags: ["h1", "h2", "h3", "span", "span", "span"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl HtmlOptions {
    pub fn heading_tag(&self, level: u8) -> &str {
        (level as usize)
            .checked_sub(1)
            .and_then(|i| self.heading_tags.get(i))
            .map(String::as_str)
            .unwrap_or("span")
    }
}

/// Options of the plain-text backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Inserted between blocks
    pub block_separator: String,
    /// Width of the rule drawn around figures
    pub float_rule_width: usize,
    /// Spaces per list nesting level
    pub list_indent: usize,
    /// Show URLs after external link text
    pub show_urls: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            block_separator: "\n\n".to_string(),
            float_rule_width: 80,
            list_indent: 4,
            show_urls: true,
        }
    }
}
