//! Chunk-materializer insertion.
//!
//! A tile-mode producer feeding a scalar-mode consumer (or the reverse)
//! gets an explicit materializer spliced onto the edge so the consumer
//! always reads fully materialized chunks. Scatter/gather nodes
//! materialize as a side effect and never need one; leaves produce their
//! chunks directly and are skipped too.

use latticedb_core::{DataType, Value};
use tracing::trace;

use crate::operator::OperatorParam;
use crate::operators::RLE_FORMAT;
use crate::plan::physical::{NodeId, PhysicalPlan};

use super::{OptimizerError, PlanningContext};

/// Inserts materializers on every tile-mode boundary under `node`.
pub(super) fn insert_chunk_materializers(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    node: NodeId,
) -> Result<(), OptimizerError> {
    if let Some(parent) = plan.parent(node) {
        if !plan.children(node).is_empty()
            && !plan.is_sg_node(node)
            && plan.node_tile_mode(node) != plan.node_tile_mode(parent)
        {
            trace!(%node, "inserting chunk materializer");
            let schema = plan.operator(node).schema().clone();
            let params = vec![OperatorParam::constant(
                DataType::Int64,
                Value::Int64(RLE_FORMAT),
            )];
            let op =
                ctx.operators.create_physical("materialize", "impl_materialize", params, schema)?;
            let materializer = plan.add_node(op, false, false, false);
            plan.add_parent(node, materializer);
            plan.infer_boundaries(materializer);
            plan.infer_distribution(materializer);
        }
    }

    for child in plan.children(node).to_vec() {
        insert_chunk_materializers(ctx, plan, child)?;
    }
    Ok(())
}
