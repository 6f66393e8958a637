//! Macro and environment catalogue
//!
//! Maps macro and environment names to their argument specifications and
//! the semantic action the renderer dispatches on. The built-in set is
//! created once; user overrides are merged into a copy and may shadow
//! built-in entries. Lookup is by exact name.

use fxhash::FxHashMap;
use lazy_static::lazy_static;
use phf::phf_map;
use serde::{Deserialize, Serialize};

// =============================================================================
// Argument and action descriptors
// =============================================================================

/// Shape of one declared argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSpec {
    /// `{...}` or a single token, parsed
    Mandatory,
    /// `[...]`, parsed, only when the next character is `[`
    Optional,
    /// `{...}`, kept as raw text
    Raw,
    /// `[...]`, kept as raw text
    RawOptional,
    /// An optional `*` right after the name
    Star,
}

impl ArgSpec {
    pub fn is_optional(self) -> bool {
        matches!(self, ArgSpec::Optional | ArgSpec::RawOptional | ArgSpec::Star)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    Emph,
    Italic,
    Bold,
}

/// What a macro does when rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroAction {
    TextFormat(TextFormat),
    /// Sectioning command; levels 4 and up are run-in headings.
    Heading { level: u8 },
    /// List entry separator, only valid inside a list environment
    Item,
    Label,
    Ref,
    EqRef,
    HyperRef,
    Footnote,
    Caption,
    IncludeGraphics,
    Term,
    /// `\cite[extra]{key1,key2}`
    Cite,
    Href,
    Url,
    /// `\verbcode{...}` and `\verbtext{...}`
    InlineVerbatim { code: bool },
    /// Expands to fixed text.
    Constant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Itemize,
    Enumerate,
}

/// Kinds of numbered floats; each has its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatKind {
    Figure,
    Table,
}

impl FloatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FloatKind::Figure => "figure",
            FloatKind::Table => "table",
        }
    }
}

/// What an environment does when rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentAction {
    List(ListKind),
    /// Display math; the body is math source.
    Math,
    /// Numbered float with an optional `\caption` and `\label`
    Float(FloatKind),
    DefTerm,
    Verbatim { code: bool },
    /// Generic block rendered with the environment name as its role.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroSpec {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<ArgSpec>,
    pub action: MacroAction,
}

impl MacroSpec {
    pub fn new(name: &str, arguments: &[ArgSpec], action: MacroAction) -> Self {
        Self {
            name: name.to_string(),
            arguments: arguments.to_vec(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<ArgSpec>,
    /// Body is copied byte for byte up to the matching `\end`.
    #[serde(default)]
    pub verbatim: bool,
    pub action: EnvironmentAction,
}

impl EnvironmentSpec {
    pub fn new(name: &str, arguments: &[ArgSpec], action: EnvironmentAction) -> Self {
        Self {
            name: name.to_string(),
            arguments: arguments.to_vec(),
            verbatim: matches!(action, EnvironmentAction::Verbatim { .. }),
            action,
        }
    }

    pub fn is_math(&self) -> bool {
        matches!(self.action, EnvironmentAction::Math)
    }

    pub fn is_list(&self) -> bool {
        matches!(self.action, EnvironmentAction::List(_))
    }
}

// =============================================================================
// Catalogue
// =============================================================================

/// Registry of known macros and environments.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    macros: FxHashMap<String, MacroSpec>,
    environments: FxHashMap<String, EnvironmentSpec>,
}

/// Control symbols and words that expand to fixed text.
static CONSTANTS: phf::Map<&'static str, &'static str> = phf_map! {
    "textbackslash" => "\\",
    "%" => "%",
    "#" => "#",
    "&" => "&",
    "$" => "$",
    "{" => "{",
    "}" => "}",
    " " => " ",
    "_" => "_",
    "ldots" => "…",
    "LaTeX" => "LaTeX",
    "TeX" => "TeX",
};

lazy_static! {
    /// The built-in catalogue.
    pub static ref DEFAULT_CATALOGUE: Catalogue = Catalogue::builtin();
}

impl Catalogue {
    /// An empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    fn builtin() -> Self {
        use ArgSpec::*;
        let mut cat = Catalogue::new();

        for (name, format) in [
            ("emph", TextFormat::Emph),
            ("textit", TextFormat::Italic),
            ("textbf", TextFormat::Bold),
        ] {
            cat.insert_macro(MacroSpec::new(name, &[Mandatory], MacroAction::TextFormat(format)));
        }

        for (level, name) in [
            "section",
            "subsection",
            "subsubsection",
            "paragraph",
            "subparagraph",
            "subsubparagraph",
        ]
        .into_iter()
        .enumerate()
        {
            cat.insert_macro(MacroSpec::new(
                name,
                &[Star, Optional, Mandatory],
                MacroAction::Heading {
                    level: level as u8 + 1,
                },
            ));
        }

        cat.insert_macro(MacroSpec::new("item", &[Optional], MacroAction::Item));
        cat.insert_macro(MacroSpec::new("label", &[Raw], MacroAction::Label));
        cat.insert_macro(MacroSpec::new("ref", &[Raw], MacroAction::Ref));
        cat.insert_macro(MacroSpec::new("eqref", &[Raw], MacroAction::EqRef));
        cat.insert_macro(MacroSpec::new(
            "hyperref",
            &[RawOptional, Mandatory],
            MacroAction::HyperRef,
        ));
        cat.insert_macro(MacroSpec::new("footnote", &[Mandatory], MacroAction::Footnote));
        cat.insert_macro(MacroSpec::new("caption", &[Mandatory], MacroAction::Caption));
        cat.insert_macro(MacroSpec::new(
            "includegraphics",
            &[RawOptional, Raw],
            MacroAction::IncludeGraphics,
        ));
        cat.insert_macro(MacroSpec::new("term", &[Optional, Mandatory], MacroAction::Term));
        cat.insert_macro(MacroSpec::new("cite", &[Optional, Raw], MacroAction::Cite));
        cat.insert_macro(MacroSpec::new("href", &[Raw, Mandatory], MacroAction::Href));
        cat.insert_macro(MacroSpec::new("url", &[Raw], MacroAction::Url));
        cat.insert_macro(MacroSpec::new(
            "verbcode",
            &[Raw],
            MacroAction::InlineVerbatim { code: true },
        ));
        cat.insert_macro(MacroSpec::new(
            "verbtext",
            &[Raw],
            MacroAction::InlineVerbatim { code: false },
        ));
        for (name, text) in CONSTANTS.entries() {
            cat.insert_macro(MacroSpec::new(
                name,
                &[],
                MacroAction::Constant((*text).to_string()),
            ));
        }

        cat.insert_environment(EnvironmentSpec::new(
            "itemize",
            &[RawOptional],
            EnvironmentAction::List(ListKind::Itemize),
        ));
        cat.insert_environment(EnvironmentSpec::new(
            "enumerate",
            &[RawOptional],
            EnvironmentAction::List(ListKind::Enumerate),
        ));
        for name in ["equation", "align", "gather"] {
            cat.insert_environment(EnvironmentSpec::new(name, &[], EnvironmentAction::Math));
            let starred = format!("{}*", name);
            cat.insert_environment(EnvironmentSpec::new(&starred, &[], EnvironmentAction::Math));
        }
        for kind in [FloatKind::Figure, FloatKind::Table] {
            cat.insert_environment(EnvironmentSpec::new(
                kind.as_str(),
                &[RawOptional],
                EnvironmentAction::Float(kind),
            ));
        }
        for name in ["quote", "blockquote"] {
            cat.insert_environment(EnvironmentSpec::new(name, &[], EnvironmentAction::Block));
        }
        cat.insert_environment(EnvironmentSpec::new(
            "defterm",
            &[Mandatory],
            EnvironmentAction::DefTerm,
        ));
        cat.insert_environment(EnvironmentSpec::new(
            "verbatimcode",
            &[],
            EnvironmentAction::Verbatim { code: true },
        ));
        cat.insert_environment(EnvironmentSpec::new(
            "verbatimtext",
            &[],
            EnvironmentAction::Verbatim { code: false },
        ));

        cat
    }

    /// A copy of the built-in catalogue with `macros` and `environments`
    /// merged in. Later entries shadow earlier ones with the same name.
    pub fn with_overrides(macros: &[MacroSpec], environments: &[EnvironmentSpec]) -> Self {
        let mut cat = DEFAULT_CATALOGUE.clone();
        for spec in macros {
            log::debug!("catalogue: overriding macro \\{}", spec.name);
            cat.insert_macro(spec.clone());
        }
        for spec in environments {
            log::debug!("catalogue: overriding environment {}", spec.name);
            cat.insert_environment(spec.clone());
        }
        cat
    }

    pub fn insert_macro(&mut self, spec: MacroSpec) {
        self.macros.insert(spec.name.clone(), spec);
    }

    pub fn insert_environment(&mut self, spec: EnvironmentSpec) {
        self.environments.insert(spec.name.clone(), spec);
    }

    pub fn lookup_macro(&self, name: &str) -> Option<&MacroSpec> {
        self.macros.get(name)
    }

    pub fn lookup_environment(&self, name: &str) -> Option<&EnvironmentSpec> {
        self.environments.get(name)
    }

    pub fn is_math_environment(&self, name: &str) -> bool {
        self.lookup_environment(name).is_some_and(EnvironmentSpec::is_math)
    }

    pub fn is_verbatim_environment(&self, name: &str) -> bool {
        self.lookup_environment(name).is_some_and(|e| e.verbatim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let cat = &*DEFAULT_CATALOGUE;
        assert_eq!(
            cat.lookup_macro("textbf").map(|m| &m.action),
            Some(&MacroAction::TextFormat(TextFormat::Bold))
        );
        assert!(cat.lookup_macro("notarealmacro").is_none());
        assert!(cat.is_math_environment("align*"));
        assert!(cat.is_verbatim_environment("verbatimcode"));
        assert!(!cat.is_math_environment("itemize"));
    }

    #[test]
    fn test_heading_levels() {
        let cat = &*DEFAULT_CATALOGUE;
        let level = |name: &str| match cat.lookup_macro(name).map(|m| &m.action) {
            Some(MacroAction::Heading { level }) => *level,
            _ => 0,
        };
        assert_eq!(level("section"), 1);
        assert_eq!(level("subsubsection"), 3);
        assert_eq!(level("subsubparagraph"), 6);
    }

    #[test]
    fn test_float_environments() {
        let cat = &*DEFAULT_CATALOGUE;
        assert_eq!(
            cat.lookup_environment("table").map(|e| &e.action),
            Some(&EnvironmentAction::Float(FloatKind::Table))
        );
        assert_eq!(
            cat.lookup_environment("quote").map(|e| &e.action),
            Some(&EnvironmentAction::Block)
        );
        let spec: EnvironmentSpec =
            serde_json::from_str(r#"{"name": "listing", "action": {"float": "figure"}}"#)
                .expect("spec");
        assert_eq!(spec.action, EnvironmentAction::Float(FloatKind::Figure));
    }

    #[test]
    fn test_overrides_shadow_defaults() {
        let cat = Catalogue::with_overrides(
            &[
                MacroSpec::new("R", &[], MacroAction::Constant("ℝ".to_string())),
                MacroSpec::new("emph", &[ArgSpec::Mandatory], MacroAction::TextFormat(TextFormat::Bold)),
            ],
            &[],
        );
        assert!(cat.lookup_macro("R").is_some());
        assert_eq!(
            cat.lookup_macro("emph").map(|m| &m.action),
            Some(&MacroAction::TextFormat(TextFormat::Bold))
        );
        // The shared default is untouched.
        assert_eq!(
            DEFAULT_CATALOGUE.lookup_macro("emph").map(|m| &m.action),
            Some(&MacroAction::TextFormat(TextFormat::Emph))
        );
    }
}
