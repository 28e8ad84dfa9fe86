//! Handlers for Rebrickable base tables: colors, themes, part categories,
//! parts, sets and minifigures.

use bricksberg_catalog::{EntityId, EntityKind, EntityRecord, keys, slugify};

use super::{HandlerContext, Row, RowHandler, RowOutcome};
use crate::error::RowError;

/// Upsert a record identified by one external key, keeping the cache current.
pub(super) fn upsert_keyed(
    ctx: &mut HandlerContext<'_>,
    kind: EntityKind,
    key_field: &'static str,
    key_value: &str,
    record: EntityRecord,
) -> Result<EntityId, RowError> {
    let existing = ctx.cache.resolve(ctx.store, kind, key_field, key_value)?;
    let record = record.attr(key_field, key_value);
    let id = ctx.store.upsert(kind, existing, &record)?;
    ctx.cache.remember(kind, key_field, key_value, id);
    Ok(id)
}

/// Resolve an optional reference, logging a warning when it does not resolve.
fn resolve_optional(
    ctx: &mut HandlerContext<'_>,
    row: &Row<'_>,
    kind: EntityKind,
    key_field: &'static str,
    value: Option<&str>,
) -> Result<Option<EntityId>, RowError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let found = ctx.cache.resolve(ctx.store, kind, key_field, value)?;
    if found.is_none() {
        ctx.log.warn(format!(
            "line {}: {} '{}' not found, stored without it",
            row.line(),
            kind,
            value
        ));
    }
    Ok(found)
}

// ── Colors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ColorsHandler;

impl RowHandler for ColorsHandler {
    fn type_key(&self) -> &'static str {
        "colors"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["id", "name"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        // Rebrickable uses -1 for "[Unknown]" and 0 for Black.
        let id: i64 = row.require_parsed("id")?;
        let name = row.require("name")?;
        let rgb = row
            .get("rgb")
            .filter(|v| v.len() == 6 && v.chars().all(|c| c.is_ascii_hexdigit()))
            .map(str::to_uppercase)
            .unwrap_or_default();

        let record = EntityRecord::titled(name)
            .attr(keys::COLOR_NAME, name)
            .attr("rgb_hex", rgb)
            .attr("is_transparent", row.flag("is_trans").to_string());
        let id = upsert_keyed(
            ctx,
            EntityKind::Color,
            keys::REBRICKABLE_ID,
            &id.to_string(),
            record,
        )?;
        Ok(RowOutcome::Upserted(id))
    }
}

// ── Themes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ThemesHandler;

impl RowHandler for ThemesHandler {
    fn type_key(&self) -> &'static str {
        "themes"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["id", "name"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let id: i64 = row.require_parsed("id")?;
        if id <= 0 {
            return Err(RowError::invalid("id", id.to_string()));
        }
        let id = id.to_string();
        let name = row.require("name")?;

        let parent_ref = row.get("parent_id").filter(|p| *p != id);
        let parent = resolve_optional(ctx, row, EntityKind::Theme, keys::THEME_ID, parent_ref)?;

        let record = EntityRecord::titled(name)
            .attr("slug", slugify(&format!("{name}-{id}")))
            .attr_opt("parent", parent.map(|p| p.to_string()));
        let id = upsert_keyed(ctx, EntityKind::Theme, keys::THEME_ID, &id, record)?;
        Ok(RowOutcome::Upserted(id))
    }
}

// ── Part Categories ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PartCategoriesHandler;

impl RowHandler for PartCategoriesHandler {
    fn type_key(&self) -> &'static str {
        "part_categories"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["id", "name"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let id: i64 = row.require_parsed("id")?;
        if id <= 0 {
            return Err(RowError::invalid("id", id.to_string()));
        }
        let name = row.require("name")?;

        let record = EntityRecord::titled(name).attr("slug", slugify(name));
        let id = upsert_keyed(
            ctx,
            EntityKind::PartCategory,
            keys::CATEGORY_ID,
            &id.to_string(),
            record,
        )?;
        Ok(RowOutcome::Upserted(id))
    }
}

// ── Parts ───────────────────────────────────────────────────────────────────

/// First id of a possibly comma-separated cross-reference list.
fn first_of_list(value: Option<&str>) -> Option<&str> {
    value
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Default)]
pub struct PartsHandler;

impl RowHandler for PartsHandler {
    fn type_key(&self) -> &'static str {
        "parts"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["part_num", "name"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let part_num = row.require("part_num")?;
        let name = row.require("name")?;
        let category = resolve_optional(
            ctx,
            row,
            EntityKind::PartCategory,
            keys::CATEGORY_ID,
            row.get("part_cat_id"),
        )?;

        let brickowl = first_of_list(row.get("brickowl_ids"));
        let bricklink = first_of_list(row.get("bricklink_ids"));

        let record = EntityRecord::titled(name)
            .attr(keys::REBRICKABLE_ID, part_num)
            .attr_opt(keys::BRICKOWL_ID, brickowl)
            .attr_opt(keys::BRICKLINK_ID, bricklink)
            .attr_opt("category", category.map(|c| c.to_string()))
            .attr_opt("material", row.get("part_material"))
            .attr_opt("image_url", row.get("part_img_url"));
        let id = upsert_keyed(ctx, EntityKind::Part, keys::PART_NUM, part_num, record)?;

        let aliases = [
            (keys::REBRICKABLE_ID, Some(part_num)),
            (keys::BRICKOWL_ID, brickowl),
            (keys::BRICKLINK_ID, bricklink),
        ];
        for (field, value) in aliases {
            if let Some(value) = value {
                ctx.cache.remember(EntityKind::Part, field, value, id);
            }
        }
        Ok(RowOutcome::Upserted(id))
    }
}

// ── Sets ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SetsHandler;

impl RowHandler for SetsHandler {
    fn type_key(&self) -> &'static str {
        "sets"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["set_num", "name"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let set_num = row.require("set_num")?;
        let name = row.require("name")?;
        let year: Option<u16> = row.parse("year")?;
        let num_parts: Option<u32> = row.parse("num_parts")?;
        let theme = resolve_optional(
            ctx,
            row,
            EntityKind::Theme,
            keys::THEME_ID,
            row.get("theme_id"),
        )?;

        let record = EntityRecord::titled(name)
            .attr_opt("year", year.map(|y| y.to_string()))
            .attr_opt("num_parts", num_parts.map(|n| n.to_string()))
            .attr_opt("theme", theme.map(|t| t.to_string()))
            .attr_opt("image_url", row.get("img_url"));
        let id = upsert_keyed(ctx, EntityKind::Set, keys::SET_NUM, set_num, record)?;
        Ok(RowOutcome::Upserted(id))
    }
}

// ── Minifigures ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MinifigsHandler;

impl RowHandler for MinifigsHandler {
    fn type_key(&self) -> &'static str {
        "minifigs"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["fig_num", "name"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let fig_num = row.require("fig_num")?;
        let name = row.require("name")?;
        let num_parts: Option<u32> = row.parse("num_parts")?;

        let record = EntityRecord::titled(name)
            .attr_opt("num_parts", num_parts.map(|n| n.to_string()))
            .attr_opt("image_url", row.get("img_url"));
        let id = upsert_keyed(ctx, EntityKind::Minifigure, keys::FIG_NUM, fig_num, record)?;
        Ok(RowOutcome::Upserted(id))
    }
}
