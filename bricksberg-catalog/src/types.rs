//! Data model types for the brick catalog.
//!
//! Entity records are schemaless at this layer: each carries a kind, an
//! optional title, and a bag of string attributes. External identifiers
//! (Rebrickable ids, part numbers, BrickOwl ids) are stored as attributes and
//! double as lookup keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Internal identifier of a stored entity record.
pub type EntityId = i64;

// ── Entity Kind ─────────────────────────────────────────────────────────────

/// The fixed set of record types the importer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Color,
    Theme,
    PartCategory,
    Part,
    Set,
    Minifigure,
    InventoryItem,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        Self::Color,
        Self::Theme,
        Self::PartCategory,
        Self::Part,
        Self::Set,
        Self::Minifigure,
        Self::InventoryItem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Theme => "theme",
            Self::PartCategory => "part_category",
            Self::Part => "part",
            Self::Set => "set",
            Self::Minifigure => "minifigure",
            Self::InventoryItem => "inventory_item",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "color" | "colour" => Some(Self::Color),
            "theme" => Some(Self::Theme),
            "part_category" | "category" => Some(Self::PartCategory),
            "part" => Some(Self::Part),
            "set" => Some(Self::Set),
            "minifigure" | "minifig" => Some(Self::Minifigure),
            "inventory_item" | "inventory" => Some(Self::InventoryItem),
            _ => None,
        }
    }

    /// Human-readable plural label, used in stats output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Color => "Colors",
            Self::Theme => "Themes",
            Self::PartCategory => "Part categories",
            Self::Part => "Parts",
            Self::Set => "Sets",
            Self::Minifigure => "Minifigures",
            Self::InventoryItem => "Inventory items",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Lookup Keys ─────────────────────────────────────────────────────────────

/// Attribute names that are indexed as lookup keys.
pub mod keys {
    /// Pseudo key matching the record title instead of an attribute.
    pub const TITLE: &str = "title";
    pub const REBRICKABLE_ID: &str = "rebrickable_id";
    pub const COLOR_NAME: &str = "color_name";
    pub const THEME_ID: &str = "theme_id";
    pub const CATEGORY_ID: &str = "category_id";
    pub const PART_NUM: &str = "part_num";
    pub const BRICKOWL_ID: &str = "brickowl_id";
    pub const BRICKLINK_ID: &str = "bricklink_id";
    pub const SET_NUM: &str = "set_num";
    pub const FIG_NUM: &str = "fig_num";
    pub const INVENTORY_ID: &str = "inventory_id";
    pub const UID: &str = "uid";

    /// Every attribute that participates in key lookups.
    pub const INDEXED: &[&str] = &[
        REBRICKABLE_ID,
        COLOR_NAME,
        THEME_ID,
        CATEGORY_ID,
        PART_NUM,
        BRICKOWL_ID,
        BRICKLINK_ID,
        SET_NUM,
        FIG_NUM,
        INVENTORY_ID,
        UID,
    ];

    /// Part identifier fields in resolution priority order.
    pub const PART_ANY: &[&str] = &[PART_NUM, REBRICKABLE_ID, BRICKOWL_ID, BRICKLINK_ID];

    pub fn is_indexed(field: &str) -> bool {
        INDEXED.contains(&field)
    }
}

/// Relation keys for relationship lines attached to a parent record.
pub mod relations {
    pub const PART_RELATIONSHIPS: &str = "part_relationships";
    pub const ELEMENTS: &str = "elements";
    pub const INVENTORY_PARTS: &str = "inventory_parts";
    pub const INVENTORY_SETS: &str = "inventory_sets";
    pub const INVENTORY_MINIFIGS: &str = "inventory_minifigs";
}

// ── Entity Record ───────────────────────────────────────────────────────────

/// A record to be written to the entity store.
///
/// A `None` title leaves an existing record's title untouched. Attributes are
/// merged: keys present here overwrite, keys absent are left as stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityRecord {
    pub title: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl EntityRecord {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            attributes: BTreeMap::new(),
        }
    }

    /// A record that only patches attributes.
    pub fn patch() -> Self {
        Self::default()
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Set an attribute only when a value is present and non-empty.
    pub fn attr_opt<S: Into<String>>(mut self, key: &str, value: Option<S>) -> Self {
        if let Some(v) = value {
            let v = v.into();
            if !v.is_empty() {
                self.attributes.insert(key.to_string(), v);
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

// ── Relationship Line ───────────────────────────────────────────────────────

/// One child reference attached to a parent record under a relation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipLine {
    pub child_id: EntityId,
    pub quantity: u32,
    #[serde(default)]
    pub color_id: Option<EntityId>,
    #[serde(default)]
    pub flag: Option<String>,
}

impl RelationshipLine {
    pub fn new(child_id: EntityId, quantity: u32) -> Self {
        Self {
            child_id,
            quantity,
            color_id: None,
            flag: None,
        }
    }

    pub fn with_color(mut self, color_id: EntityId) -> Self {
        self.color_id = Some(color_id);
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flag = Some(flag.into());
        self
    }
}

/// Convert a string to a URL-safe slug.
pub fn slugify(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator && !result.is_empty() {
            result.push('-');
            last_was_separator = true;
        }
    }

    if result.ends_with('-') {
        result.pop();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str_loose(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::from_str_loose("Minifig"), Some(EntityKind::Minifigure));
        assert_eq!(EntityKind::from_str_loose("brick"), None);
    }

    #[test]
    fn attr_opt_skips_empty_values() {
        let record = EntityRecord::titled("Red")
            .attr_opt("rgb_hex", Some(""))
            .attr_opt("color_name", Some("Red"))
            .attr_opt::<String>("missing", None);
        assert_eq!(record.get("color_name"), Some("Red"));
        assert!(record.get("rgb_hex").is_none());
        assert!(record.get("missing").is_none());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Star Wars: Episode IV"), "star-wars-episode-iv");
        assert_eq!(slugify("  Technic  "), "technic");
        assert_eq!(slugify("Bricks & More-42"), "bricks-more-42");
    }
}
