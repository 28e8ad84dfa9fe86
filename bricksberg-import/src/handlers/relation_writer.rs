//! Relationship line writes under the configured strategy.

use std::collections::HashSet;

use bricksberg_catalog::{EntityId, RelationshipLine};

use super::{HandlerContext, RowOutcome};
use crate::error::{PipelineError, RowError};
use crate::settings::RelationStrategy;

/// Writes the lines of one relation key for a relationship task.
///
/// With [`RelationStrategy::ClearThenAppend`] the first row touching a parent
/// in a job clears that parent's lines, later rows append. With
/// [`RelationStrategy::Buffered`] lines are staged and each parent is written
/// once in [`RelationWriter::flush`]; parents the file no longer mentions lose
/// their lines.
#[derive(Debug, Clone, Copy)]
pub struct RelationWriter {
    relation: &'static str,
    strategy: RelationStrategy,
}

impl RelationWriter {
    pub fn new(relation: &'static str, strategy: RelationStrategy) -> Self {
        Self { relation, strategy }
    }

    pub fn relation(&self) -> &'static str {
        self.relation
    }

    pub fn write(
        &self,
        ctx: &mut HandlerContext<'_>,
        parent: EntityId,
        line: &RelationshipLine,
    ) -> Result<RowOutcome, RowError> {
        match self.strategy {
            RelationStrategy::ClearThenAppend => {
                if bricksberg_db::mark_parent_cleared(ctx.conn, ctx.job_id, self.relation, parent)?
                {
                    ctx.store.clear_relationship_lines(parent, self.relation)?;
                }
                ctx.store
                    .append_relationship_line(parent, self.relation, line)?;
            }
            RelationStrategy::Buffered => {
                bricksberg_db::stage_relationship_line(
                    ctx.conn,
                    ctx.job_id,
                    self.relation,
                    parent,
                    line,
                )?;
            }
        }
        Ok(RowOutcome::Linked)
    }

    /// Write staged lines and drop this job's bookkeeping for the relation.
    pub fn flush(&self, ctx: &mut HandlerContext<'_>) -> Result<(), PipelineError> {
        if self.strategy == RelationStrategy::Buffered {
            let parents =
                bricksberg_db::staged_parents(ctx.conn, ctx.job_id, self.relation)?;
            for &parent in &parents {
                let lines =
                    bricksberg_db::staged_lines(ctx.conn, ctx.job_id, self.relation, parent)?;
                ctx.store
                    .set_relationship_lines(parent, self.relation, &lines)?;
            }

            // An empty staging set usually means nothing resolved; keep what is stored.
            let mut cleared = 0;
            if !parents.is_empty() {
                let touched: HashSet<EntityId> = parents.iter().copied().collect();
                for parent in ctx.store.parents_with_relation(self.relation)? {
                    if !touched.contains(&parent) {
                        ctx.store.clear_relationship_lines(parent, self.relation)?;
                        cleared += 1;
                    }
                }
            }

            ctx.log.info(format!(
                "Wrote {} lines for {} parent(s), cleared {} stale parent(s)",
                self.relation,
                parents.len(),
                cleared
            ));
        }

        bricksberg_db::discard_staging(ctx.conn, ctx.job_id, self.relation)?;
        Ok(())
    }
}
