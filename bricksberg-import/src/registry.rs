//! Registration table mapping CSV type keys to row handlers.

use std::collections::HashMap;

use crate::handlers::{
    ColorsHandler, ElementsHandler, HandlerOptions, InventoriesHandler, InventoryHandler,
    InventoryMinifigsHandler, InventoryPartsHandler, InventorySetsHandler, MinifigsHandler,
    PartCategoriesHandler, PartRelationshipsHandler, PartsHandler, RowHandler, SetsHandler,
    ThemesHandler,
};

/// Builds a fresh handler for one job run.
pub type HandlerFactory = fn(&HandlerOptions) -> Box<dyn RowHandler>;

/// Maps a task's type key to the factory for its handler.
///
/// Create a registry with [`HandlerRegistry::with_defaults`], or start empty
/// and [`register`](HandlerRegistry::register) factories explicitly.
pub struct HandlerRegistry {
    factories: HashMap<&'static str, HandlerFactory>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in Rebrickable and BrickOwl handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("colors", |_| Box::new(ColorsHandler))
            .register("themes", |_| Box::new(ThemesHandler))
            .register("part_categories", |_| Box::new(PartCategoriesHandler))
            .register("parts", |_| Box::new(PartsHandler))
            .register("sets", |_| Box::new(SetsHandler))
            .register("minifigs", |_| Box::new(MinifigsHandler))
            .register("part_relationships", |o| {
                Box::new(PartRelationshipsHandler::new(o))
            })
            .register("elements", |o| Box::new(ElementsHandler::new(o)))
            .register("inventories", |_| Box::<InventoriesHandler>::default())
            .register("inventory_parts", |o| Box::new(InventoryPartsHandler::new(o)))
            .register("inventory_sets", |o| Box::new(InventorySetsHandler::new(o)))
            .register("inventory_minifigs", |o| {
                Box::new(InventoryMinifigsHandler::new(o))
            })
            .register("inventory", |_| Box::new(InventoryHandler));
        registry
    }

    /// Register a factory, replacing any previous one for the key.
    pub fn register(&mut self, type_key: &'static str, factory: HandlerFactory) -> &mut Self {
        self.factories.insert(type_key, factory);
        self
    }

    /// Build a handler for `type_key`, or `None` when nothing is registered.
    pub fn build(&self, type_key: &str, options: &HandlerOptions) -> Option<Box<dyn RowHandler>> {
        self.factories.get(type_key).map(|factory| factory(options))
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.factories.contains_key(type_key)
    }

    /// All registered keys, sorted.
    pub fn type_keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.factories.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{CATALOG_ORDER, INVENTORY_KEY};

    #[test]
    fn defaults_cover_every_queued_key() {
        let registry = HandlerRegistry::with_defaults();
        for key in CATALOG_ORDER.iter().chain([&INVENTORY_KEY]) {
            let handler = registry
                .build(key, &HandlerOptions::default())
                .unwrap_or_else(|| panic!("no handler for {key}"));
            assert_eq!(handler.type_key(), *key);
            assert!(!handler.required_columns().is_empty());
        }
        assert_eq!(registry.type_keys().len(), CATALOG_ORDER.len() + 1);
    }

    #[test]
    fn unknown_key_is_a_miss() {
        let registry = HandlerRegistry::new();
        assert!(!registry.contains("colors"));
        assert!(registry.build("colors", &HandlerOptions::default()).is_none());
    }
}
