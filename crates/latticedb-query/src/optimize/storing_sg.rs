//! Storing-sg rewrite.
//!
//! A plan shaped `store(sg(X))` runs a network shuffle and then a
//! separate persisting scan. The two fuse into a single storing sg that
//! redistributes and persists in one step, provided everything below the
//! sg produces full chunks and the data is hash partitioned; persisting
//! any other distribution is not implemented.

use tracing::trace;

use crate::plan::distribution::{ArrayDistribution, PartitioningSchema};
use crate::plan::physical::{NodeId, PhysicalPlan};

use super::distribution::build_sg_node;
use super::{OptimizerError, PlanningContext};

/// Rewrites every `store(sg(X))` under `node` into a storing sg.
pub(super) fn rewrite_storing_sg(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    node: NodeId,
) -> Result<(), OptimizerError> {
    let mut node = node;
    if plan.is_store_node(node) && plan.children(node).len() == 1 {
        let child = plan.children(node)[0];
        if plan.is_sg_node(child)
            && !plan.is_storing_sg(child)
            && plan.children(child).len() == 1
            && plan.subtree_output_full_chunks(plan.children(child)[0])
        {
            let store_schema = plan.operator(node).schema().clone();
            let distro = plan.distribution(child);
            if distro != ArrayDistribution::hash_partitioned() {
                return Err(OptimizerError::NotImplemented(
                    "storing arrays in a non-hash distribution".to_string(),
                ));
            }

            trace!(%node, %child, "fusing store over sg into storing sg");
            let target = store_schema.name.clone();
            let grandchild = plan.children(child)[0];
            let new_sg = build_sg_node(
                ctx,
                plan,
                store_schema,
                PartitioningSchema::HashPartitioned,
                Some(target),
            )?;
            plan.cut_out(node);
            plan.cut_out(child);
            plan.add_parent(grandchild, new_sg);
            plan.infer_boundaries(new_sg);
            plan.infer_distribution(new_sg);
            node = new_sg;
        }
    }

    for child in plan.children(node).to_vec() {
        rewrite_storing_sg(ctx, plan, child)?;
    }
    Ok(())
}
