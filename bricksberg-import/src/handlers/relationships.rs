//! Handlers for Rebrickable relationship tables and inventory headers.

use std::collections::HashMap;

use bricksberg_catalog::{EntityId, EntityKind, EntityRecord, RelationshipLine, keys, relations};

use super::{HandlerContext, HandlerOptions, RelationWriter, Row, RowHandler, RowOutcome};
use crate::error::{PipelineError, RowError};

/// Kinds that own an inventory, in resolution order.
const INVENTORY_OWNERS: [EntityKind; 2] = [EntityKind::Set, EntityKind::Minifigure];

fn resolve_part(
    ctx: &mut HandlerContext<'_>,
    role: &'static str,
    value: &str,
) -> Result<EntityId, RowError> {
    ctx.cache
        .resolve_any(ctx.store, EntityKind::Part, keys::PART_ANY, value)?
        .ok_or_else(|| RowError::unresolved(role, value))
}

fn resolve_color(ctx: &mut HandlerContext<'_>, value: &str) -> Result<EntityId, RowError> {
    ctx.cache
        .resolve(ctx.store, EntityKind::Color, keys::REBRICKABLE_ID, value)?
        .ok_or_else(|| RowError::unresolved("color", value))
}

fn resolve_inventory_owner(
    ctx: &mut HandlerContext<'_>,
    inventory_id: &str,
) -> Result<EntityId, RowError> {
    ctx.cache
        .resolve_in_kinds(ctx.store, &INVENTORY_OWNERS, keys::INVENTORY_ID, inventory_id)?
        .map(|(_, id)| id)
        .ok_or_else(|| RowError::unresolved("parent", inventory_id))
}

/// Quantity column that defaults to 1 when absent.
fn quantity_or_one(row: &Row<'_>) -> Result<u32, RowError> {
    match row.get("quantity") {
        Some(_) => row.quantity("quantity"),
        None => Ok(1),
    }
}

// ── Part Relationships ──────────────────────────────────────────────────────

pub struct PartRelationshipsHandler {
    writer: RelationWriter,
}

impl PartRelationshipsHandler {
    pub fn new(options: &HandlerOptions) -> Self {
        Self {
            writer: RelationWriter::new(relations::PART_RELATIONSHIPS, options.relation_strategy),
        }
    }
}

impl RowHandler for PartRelationshipsHandler {
    fn type_key(&self) -> &'static str {
        "part_relationships"
    }

    fn relation(&self) -> Option<&'static str> {
        Some(self.writer.relation())
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["rel_type", "child_part_num", "parent_part_num"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let rel_type = row.require("rel_type")?;
        let child = resolve_part(ctx, "child part", row.require("child_part_num")?)?;
        let parent = resolve_part(ctx, "parent part", row.require("parent_part_num")?)?;

        let line = RelationshipLine::new(parent, 1).with_flag(rel_type);
        self.writer.write(ctx, child, &line)
    }

    fn finish_job(&mut self, ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        self.writer.flush(ctx)
    }
}

// ── Elements ────────────────────────────────────────────────────────────────

pub struct ElementsHandler {
    writer: RelationWriter,
}

impl ElementsHandler {
    pub fn new(options: &HandlerOptions) -> Self {
        Self {
            writer: RelationWriter::new(relations::ELEMENTS, options.relation_strategy),
        }
    }
}

impl RowHandler for ElementsHandler {
    fn type_key(&self) -> &'static str {
        "elements"
    }

    fn relation(&self) -> Option<&'static str> {
        Some(self.writer.relation())
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["element_id", "part_num", "color_id"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let element_id = row.require("element_id")?;
        let part = resolve_part(ctx, "part", row.require("part_num")?)?;
        let color = resolve_color(ctx, row.require("color_id")?)?;

        let line = RelationshipLine::new(color, 1).with_flag(element_id);
        self.writer.write(ctx, part, &line)
    }

    fn finish_job(&mut self, ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        self.writer.flush(ctx)
    }
}

// ── Inventories ─────────────────────────────────────────────────────────────

/// Links inventory ids to their set or minifigure, keeping the newest version.
#[derive(Debug, Default)]
pub struct InventoriesHandler {
    /// Stored inventory per owner, loaded lazily during a run.
    current: HashMap<EntityId, CurrentInventory>,
}

#[derive(Debug, Clone, Default)]
struct CurrentInventory {
    id: Option<String>,
    version: Option<u32>,
}

impl InventoriesHandler {
    fn current(
        &mut self,
        ctx: &HandlerContext<'_>,
        owner: EntityId,
    ) -> Result<CurrentInventory, RowError> {
        if let Some(current) = self.current.get(&owner) {
            return Ok(current.clone());
        }
        let entity = ctx.store.get(owner)?;
        let current = CurrentInventory {
            id: entity
                .as_ref()
                .and_then(|e| e.attr(keys::INVENTORY_ID))
                .map(String::from),
            version: entity
                .as_ref()
                .and_then(|e| e.attr("inventory_version"))
                .and_then(|v| v.parse().ok()),
        };
        self.current.insert(owner, current.clone());
        Ok(current)
    }
}

impl RowHandler for InventoriesHandler {
    fn type_key(&self) -> &'static str {
        "inventories"
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["id", "set_num"]
    }

    fn start_job(&mut self, _ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        self.current.clear();
        Ok(())
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let inventory_id = row.require("id")?;
        let owner_num = row.require("set_num")?;
        let version: u32 = row.parse("version")?.unwrap_or(1);

        // Minifigure inventories list the fig_num in the set_num column.
        let owner = match ctx
            .cache
            .resolve(ctx.store, EntityKind::Set, keys::SET_NUM, owner_num)?
        {
            Some(id) => (EntityKind::Set, id),
            None => ctx
                .cache
                .resolve(ctx.store, EntityKind::Minifigure, keys::FIG_NUM, owner_num)?
                .map(|id| (EntityKind::Minifigure, id))
                .ok_or_else(|| RowError::unresolved("parent", owner_num))?,
        };
        let (kind, owner_id) = owner;

        let current = self.current(ctx, owner_id)?;
        if current.version.is_some_and(|stored| version < stored) {
            return Ok(RowOutcome::Unchanged);
        }
        // The replaced inventory id no longer names the owner.
        if let Some(previous) = current.id.as_deref().filter(|p| *p != inventory_id) {
            ctx.cache.forget(kind, keys::INVENTORY_ID, previous);
        }

        let record = EntityRecord::patch()
            .attr(keys::INVENTORY_ID, inventory_id)
            .attr("inventory_version", version.to_string());
        let id = ctx.store.upsert(kind, Some(owner_id), &record)?;
        ctx.cache.remember(kind, keys::INVENTORY_ID, inventory_id, id);
        self.current.insert(
            owner_id,
            CurrentInventory {
                id: Some(inventory_id.to_string()),
                version: Some(version),
            },
        );
        Ok(RowOutcome::Upserted(id))
    }
}

// ── Inventory Line Items ────────────────────────────────────────────────────

pub struct InventoryPartsHandler {
    writer: RelationWriter,
}

impl InventoryPartsHandler {
    pub fn new(options: &HandlerOptions) -> Self {
        Self {
            writer: RelationWriter::new(relations::INVENTORY_PARTS, options.relation_strategy),
        }
    }
}

impl RowHandler for InventoryPartsHandler {
    fn type_key(&self) -> &'static str {
        "inventory_parts"
    }

    fn relation(&self) -> Option<&'static str> {
        Some(self.writer.relation())
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["inventory_id", "part_num", "color_id"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        let quantity = quantity_or_one(row)?;
        let parent = resolve_inventory_owner(ctx, row.require("inventory_id")?)?;
        let part = resolve_part(ctx, "part", row.require("part_num")?)?;
        let color = resolve_color(ctx, row.require("color_id")?)?;

        let mut line = RelationshipLine::new(part, quantity).with_color(color);
        if row.flag("is_spare") {
            line = line.with_flag("spare");
        }
        self.writer.write(ctx, parent, &line)
    }

    fn finish_job(&mut self, ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        self.writer.flush(ctx)
    }
}

/// Shared row logic for inventory tables whose child is a keyed entity.
fn link_inventory_child(
    writer: &RelationWriter,
    ctx: &mut HandlerContext<'_>,
    row: &Row<'_>,
    child_kind: EntityKind,
    child_column: &'static str,
) -> Result<RowOutcome, RowError> {
    let quantity = row.quantity("quantity")?;
    let parent = resolve_inventory_owner(ctx, row.require("inventory_id")?)?;
    let child_num = row.require(child_column)?;
    let child = ctx
        .cache
        .resolve(ctx.store, child_kind, child_column, child_num)?
        .ok_or_else(|| RowError::unresolved(child_kind.as_str(), child_num))?;

    writer.write(ctx, parent, &RelationshipLine::new(child, quantity))
}

pub struct InventorySetsHandler {
    writer: RelationWriter,
}

impl InventorySetsHandler {
    pub fn new(options: &HandlerOptions) -> Self {
        Self {
            writer: RelationWriter::new(relations::INVENTORY_SETS, options.relation_strategy),
        }
    }
}

impl RowHandler for InventorySetsHandler {
    fn type_key(&self) -> &'static str {
        "inventory_sets"
    }

    fn relation(&self) -> Option<&'static str> {
        Some(self.writer.relation())
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["inventory_id", "set_num", "quantity"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        link_inventory_child(&self.writer, ctx, row, EntityKind::Set, keys::SET_NUM)
    }

    fn finish_job(&mut self, ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        self.writer.flush(ctx)
    }
}

pub struct InventoryMinifigsHandler {
    writer: RelationWriter,
}

impl InventoryMinifigsHandler {
    pub fn new(options: &HandlerOptions) -> Self {
        Self {
            writer: RelationWriter::new(relations::INVENTORY_MINIFIGS, options.relation_strategy),
        }
    }
}

impl RowHandler for InventoryMinifigsHandler {
    fn type_key(&self) -> &'static str {
        "inventory_minifigs"
    }

    fn relation(&self) -> Option<&'static str> {
        Some(self.writer.relation())
    }

    fn required_columns(&self) -> &'static [&'static str] {
        &["inventory_id", "fig_num", "quantity"]
    }

    fn process_row(
        &mut self,
        ctx: &mut HandlerContext<'_>,
        row: &Row<'_>,
    ) -> Result<RowOutcome, RowError> {
        link_inventory_child(&self.writer, ctx, row, EntityKind::Minifigure, keys::FIG_NUM)
    }

    fn finish_job(&mut self, ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        self.writer.flush(ctx)
    }
}
