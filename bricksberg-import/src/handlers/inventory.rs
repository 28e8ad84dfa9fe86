//! BrickOwl inventory export handler.

use bricksberg_catalog::{EntityKind, EntityRecord, keys};

use super::catalog::upsert_keyed;
use super::{HandlerContext, Row, RowHandler, RowOutcome};
use crate::error::RowError;

/// Color lookup fields in priority order.
const COLOR_ANY: &[&str] = &[keys::TITLE, keys::COLOR_NAME];

/// Columns copied to the item verbatim when present.
const OPTIONAL_COLUMNS: &[&str] = &[
    "name",
    "bulk",
    "sale_price",
    "remarks",
    "external_id",
    "location",
    "tier_qty_1",
    "tier_qty_2",
    "tier_qty_3",
    "tier_price_1",
    "tier_price_2",
    "tier_price_3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    New,
    Used,
}

impl Condition {
    /// Anything starting with "u" is used; everything else is new.
    pub fn normalize(raw: &str) -> Self {
        if raw.trim().to_lowercase().starts_with('u') {
            Self::Used
        } else {
            Self::New
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Used => "used",
        }
    }
}

/// Imports a seller inventory keyed by `boid|color|condition`.
#[derive(Debug, Default)]
pub struct InventoryHandler;

impl RowHandler for InventoryHandler {
    fn type_key(&self) -> &'static str {
        "inventory"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["boid", "color_name", "condition", "quantity", "price"]
    }

    fn column_aliases(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("item_name", "name"),
            ("color", "color_name"),
            ("qty", "quantity"),
            ("unit_price", "price"),
            ("external_id_1", "external_id"),
        ]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let boid = row.require("boid")?;
        let color_name = row.require("color_name")?;
        let condition = Condition::normalize(row.require("condition")?);
        let quantity = row.quantity("quantity")?;
        let price = row.require("price")?;
        if price.parse::<f64>().map_or(true, |p| p < 0.0) {
            return Err(RowError::invalid("price", price));
        }

        let part = ctx
            .cache
            .resolve_any(ctx.store, EntityKind::Part, keys::PART_ANY, boid)?
            .ok_or_else(|| RowError::unresolved("part", boid))?;
        let color = ctx
            .cache
            .resolve_any(ctx.store, EntityKind::Color, COLOR_ANY, color_name)?
            .ok_or_else(|| RowError::unresolved("color", color_name))?;

        let uid = format!("{boid}|{color}|{}", condition.as_str());
        let title = format!("{boid} - {color_name} ({})", condition.as_str());
        let mut record = EntityRecord::titled(title)
            .attr("boid", boid)
            .attr("part", part.to_string())
            .attr("color", color.to_string())
            .attr("condition", condition.as_str())
            .attr("quantity", quantity.to_string())
            .attr("price", price);
        for &column in OPTIONAL_COLUMNS {
            record = record.attr_opt(column, row.get(column));
        }

        let id = upsert_keyed(ctx, EntityKind::InventoryItem, keys::UID, &uid, record)?;
        Ok(RowOutcome::Upserted(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_normalization() {
        assert_eq!(Condition::normalize("Used"), Condition::Used);
        assert_eq!(Condition::normalize(" u"), Condition::Used);
        assert_eq!(Condition::normalize("usedc"), Condition::Used);
        assert_eq!(Condition::normalize("New"), Condition::New);
        assert_eq!(Condition::normalize("news"), Condition::New);
        assert_eq!(Condition::normalize("mint"), Condition::New);
    }
}
