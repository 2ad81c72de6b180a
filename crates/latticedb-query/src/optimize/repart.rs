//! Repartition insertion.
//!
//! When an operator declares that a child's chunk sizes or overlaps do
//! not match what it needs, a repart node is spliced in with the
//! operator-requested target schema. A repart the user placed by hand
//! always takes precedence: no automatic node is added on top of it.

use tracing::trace;

use crate::operator::OperatorParam;
use crate::plan::physical::{NodeId, PhysicalPlan};

use super::{OptimizerError, PlanningContext};

/// Inserts repart nodes bottom-up under `node`.
pub(super) fn insert_repart_nodes(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    node: NodeId,
) -> Result<(), OptimizerError> {
    for child in plan.children(node).to_vec() {
        insert_repart_nodes(ctx, plan, child)?;
    }

    let child_schemas = plan.child_schemas(node);
    let targets = plan.operator(node).requires_repart(&child_schemas);
    if targets.is_empty() {
        return Ok(());
    }
    debug_assert_eq!(targets.len(), child_schemas.len());

    for (i, target) in targets.into_iter().enumerate() {
        let Some(target_schema) = target else { continue };
        let child = plan.children(node)[i];
        if plan.is_repart_node(child) {
            // Manual repartitioning wins over automatic.
            continue;
        }
        trace!(%node, %child, "inserting repart node");
        let params = vec![OperatorParam::Schema(target_schema.clone())];
        let op =
            ctx.operators.create_physical("repart", "physical_repart", params, target_schema)?;
        let repart = plan.add_node(op, false, false, false);
        plan.add_parent(child, repart);
        plan.infer_boundaries(repart);
        plan.infer_distribution(repart);
    }

    plan.infer_boundaries(node);
    plan.infer_distribution(node);
    Ok(())
}
