//! Environment
//!
//! Wires the macro/environment catalogue, the configuration and the feature
//! managers together. One environment can parse and render any number of
//! documents.

use flm_ir::Fragment;

use crate::config::Config;
use crate::core::catalogue::Catalogue;
use crate::core::parser::parse_fragment;
use crate::document::Document;
use crate::features::{DefTermManager, EndnotesManager, FeatureRegistry, RefsManager};
use crate::render::{HtmlRenderer, TextRenderer};
use crate::utils::error::FlmResult;

#[derive(Debug, Clone)]
pub struct Environment {
    catalogue: Catalogue,
    config: Config,
}

impl Default for Environment {
    fn default() -> Self {
        Self::standard()
    }
}

impl Environment {
    /// Built-in catalogue merged with the macros and environments of
    /// `config`.
    pub fn new(config: Config) -> Self {
        let catalogue = Catalogue::with_overrides(&config.macros, &config.environments);
        log::debug!(
            "environment: {} macro override(s), {} environment override(s)",
            config.macros.len(),
            config.environments.len()
        );
        Self { catalogue, config }
    }

    /// Default configuration
    pub fn standard() -> Self {
        Self::new(Config::default())
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse `source` into a fragment named `name`.
    pub fn make_fragment(&self, source: &str, name: &str) -> FlmResult<Fragment> {
        let fragment = parse_fragment(source, name, &self.catalogue, self.config.max_nesting_depth)?;
        Ok(fragment)
    }

    pub fn make_document(&self, fragments: Vec<Fragment>) -> Document<'_> {
        Document::new(self, fragments)
    }

    /// Fresh feature managers for one document.
    pub fn feature_registry(&self) -> FeatureRegistry {
        let mut registry = FeatureRegistry::new();
        registry.insert(Box::new(RefsManager::new()));
        registry.insert(Box::new(
            EndnotesManager::new(
                self.config.footnote_counter.clone(),
                self.config.footnote_placement,
            )
            .with_citation_counter(self.config.citation_counter.clone()),
        ));
        registry.insert(Box::new(DefTermManager::new()));
        registry
    }

    pub fn html_renderer(&self) -> HtmlRenderer {
        HtmlRenderer::new(self.config.html.clone())
    }

    pub fn text_renderer(&self) -> TextRenderer {
        TextRenderer::new(self.config.text.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::{MacroAction, MacroSpec};

    #[test]
    fn test_feature_registry_has_all_managers() {
        let env = Environment::standard();
        let registry = env.feature_registry();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["refs", "endnotes", "defterm"]
        );
    }

    #[test]
    fn test_config_macros_extend_catalogue() {
        let config = Config {
            macros: vec![MacroSpec::new("R", &[], MacroAction::Constant("ℝ".to_string()))],
            ..Config::default()
        };
        let env = Environment::new(config);
        assert!(env.catalogue().lookup_macro("R").is_some());
        assert!(env.catalogue().lookup_macro("emph").is_some());
        let fragment = env.make_fragment(r"x = \R", "t").expect("parse");
        assert!(flm_ir::nodes_plain_text(&fragment.nodes).contains('ℝ'));
    }
}
