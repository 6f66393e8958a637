//! Feature managers
//!
//! Cross-cutting services filled during document registration (pass 1)
//! and only read while rendering (pass 2):
//! - `refs`: numbered sections, equations and floats, and their labels
//! - `endnotes`: footnotes, citations, their markers and the endnote lists
//! - `defterm`: defined terms and their index
//!
//! Managers live in a [`FeatureRegistry`] keyed by name.

pub mod defterm;
pub mod endnotes;
pub mod refs;

use std::any::Any;
use std::fmt;

use indexmap::IndexMap;

pub use defterm::DefTermManager;
pub use endnotes::{Citation, EndnotesManager, Footnote, FootnotePlacement};
pub use refs::{Anchor, Label, LabelKind, RefsManager};

/// Identifies a node across both passes: the fragment it belongs to and
/// its source offset in that fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub fragment: usize,
    pub offset: usize,
}

impl NodeKey {
    pub fn new(fragment: usize, offset: usize) -> Self {
        Self { fragment, offset }
    }
}

/// Common interface of all feature managers.
pub trait FeatureManager: fmt::Debug {
    /// Registry key, e.g. `"endnotes"`.
    fn name(&self) -> &'static str;

    /// Forget everything registered so far.
    fn reset(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Name-keyed set of feature managers for one document.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    managers: IndexMap<&'static str, Box<dyn FeatureManager>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manager, replacing any manager with the same name.
    pub fn insert(&mut self, manager: Box<dyn FeatureManager>) {
        self.managers.insert(manager.name(), manager);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.managers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.managers.keys().copied()
    }

    /// Typed access to the manager registered under `name`.
    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        self.managers.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self, name: &str) -> Option<&mut T> {
        self.managers.get_mut(name)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn reset(&mut self) {
        for manager in self.managers.values_mut() {
            manager.reset();
        }
    }

    pub fn refs(&self) -> Option<&RefsManager> {
        self.get(refs::NAME)
    }

    pub fn refs_mut(&mut self) -> Option<&mut RefsManager> {
        self.get_mut(refs::NAME)
    }

    pub fn endnotes(&self) -> Option<&EndnotesManager> {
        self.get(endnotes::NAME)
    }

    pub fn endnotes_mut(&mut self) -> Option<&mut EndnotesManager> {
        self.get_mut(endnotes::NAME)
    }

    pub fn defterms(&self) -> Option<&DefTermManager> {
        self.get(defterm::NAME)
    }

    pub fn defterms_mut(&mut self) -> Option<&mut DefTermManager> {
        self.get_mut(defterm::NAME)
    }
}

/// Make an identifier usable as an HTML id: every character outside
/// `[A-Za-z0-9-]` becomes `_<hex code>X`.
pub fn safe_id(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
        } else {
            out.push_str(&format!("_{:x}X", c as u32));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::counter::CounterFormatter;

    #[test]
    fn test_registry_typed_access() {
        let mut registry = FeatureRegistry::new();
        registry.insert(Box::new(RefsManager::default()));
        registry.insert(Box::new(EndnotesManager::new(
            CounterFormatter::Arabic,
            FootnotePlacement::Endnote,
        )));
        assert!(registry.contains("refs"));
        assert!(registry.refs().is_some());
        assert!(registry.endnotes().is_some());
        assert!(registry.defterms().is_none());
        assert!(registry.get::<DefTermManager>("refs").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["refs", "endnotes"]);
    }

    #[test]
    fn test_safe_id() {
        assert_eq!(safe_id("eq-1"), "eq-1");
        assert_eq!(safe_id("a:b c"), "a_3aXb_20Xc");
    }
}
