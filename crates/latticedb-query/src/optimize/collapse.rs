//! Collapse and join-pushup passes.
//!
//! Collapse works one chain at a time - a maximal run of single-child
//! nodes bounded by leaves or multi-child nodes. Walking bottom to top it
//! tracks the cheapest point to place an sg, removes movable sg nodes the
//! chain turns out not to need, retargets an existing sg in place when the
//! consumer above demands a specific distribution, and finally restores
//! the distribution a downstream multi-child consumer expected from the
//! chain.
//!
//! Join pushup trades two sg nodes below a collocated join for one above
//! it when the estimated data movement is cheaper; each successful pushup
//! can enable further collapses, so the two passes iterate to a fixpoint.

use tracing::trace;

use crate::plan::distribution::{
    ArrayDistribution, DistributionRequirement, PartitioningSchema,
};
use crate::plan::physical::{NodeId, PhysicalPlan};

use super::distribution::{
    build_sg_node, find_thin_point, propagate_distribution, set_sg_distribution,
};
use super::{OptimizerError, PlanningContext};

/// Walks down single-child links to the bottom node of `root`'s chain.
fn chain_bottom(plan: &PhysicalPlan, root: NodeId) -> NodeId {
    let mut node = root;
    while plan.children(node).len() == 1 {
        node = plan.children(node)[0];
    }
    node
}

/// Finds an offsetable sg at or below `root` reachable through
/// distribution-preserving, full-chunk, requirement-free nodes.
fn first_offsetable_sg(plan: &PhysicalPlan, root: NodeId) -> Option<NodeId> {
    if plan.is_sg_node(root) && plan.is_sg_offsetable(root) {
        return Some(root);
    }
    if plan.children(root).len() != 1
        || plan.changes_distribution(root)
        || !plan.output_full_chunks(root)
        || plan.needs_specific_distribution(root)
    {
        return None;
    }
    first_offsetable_sg(plan, plan.children(root)[0])
}

/// Finds the sg closest to the top of `root`'s chain, provided everything
/// above it preserves distribution and full chunks.
fn top_sg_from_chain(plan: &PhysicalPlan, chain_root: NodeId) -> Option<NodeId> {
    let mut node = chain_root;
    while plan.children(node).len() == 1 {
        if plan.is_sg_node(node) {
            return Some(node);
        }
        if plan.changes_distribution(node) || !plan.output_full_chunks(node) {
            // Reopening this would need subtraction of offset vectors.
            return None;
        }
        node = plan.children(node)[0];
    }
    None
}

/// Collapses the chain rooted at `root`, then recurses into the chains
/// hanging off the chain bottom.
pub(super) fn collapse_sg_nodes(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
) -> Result<(), OptimizerError> {
    trace!(%root, "collapse sg nodes");
    let top_chain = plan.root() == Some(root);
    let bottom = chain_bottom(plan, root);
    let mut cur = bottom;
    let mut sg_candidate = bottom;
    let chain_output_distribution = plan.distribution(root);

    let chain_top = loop {
        let running = plan.infer_distribution(cur);

        if !plan.is_sg_node(cur)
            && (plan.changes_distribution(cur)
                || !plan.output_full_chunks(cur)
                || plan.data_width(cur) < plan.data_width(sg_candidate))
        {
            sg_candidate = cur;
        }

        let parent_demands = plan.parent(cur).filter(|&p| {
            plan.children(p).len() == 1 && plan.needs_specific_distribution(p)
        });
        if let Some(parent) = parent_demands {
            let needed = plan
                .distribution_requirement(parent)
                .specific_requirements()
                .first()
                .cloned()
                .ok_or_else(|| {
                    OptimizerError::DistributionSpecification(
                        "specific requirement without distributions".to_string(),
                    )
                })?;
            if running != needed {
                if plan.is_sg_node(cur) && plan.is_sg_offsetable(cur) {
                    // An sg already sits here; retarget it in place.
                    set_sg_distribution(plan, cur, &needed)?;
                    plan.set_sg_movable(cur, false);
                    plan.set_sg_offsetable(cur, false);
                    plan.infer_distribution(cur);
                } else {
                    let schema = plan.operator(cur).schema().clone();
                    let new_sg =
                        build_sg_node(ctx, plan, schema, needed.scheme(), None)?;
                    plan.add_parent(sg_candidate, new_sg);
                    set_sg_distribution(plan, new_sg, &needed)?;
                    plan.infer_boundaries(new_sg);
                    propagate_distribution(plan, new_sg, parent);
                    plan.set_sg_movable(new_sg, false);
                    plan.set_sg_offsetable(new_sg, false);
                    if cur == sg_candidate {
                        cur = new_sg;
                    }
                }
            }
        } else if plan.is_sg_node(cur) && plan.is_sg_movable(cur) {
            // A defensively inserted sg nothing above depends on.
            let new_cur = plan.children(cur)[0];
            plan.cut_out(cur);
            if cur == sg_candidate {
                sg_candidate = new_cur;
            }
            cur = new_cur;
        }

        let Some(parent) = plan.parent(cur) else { break cur };
        if plan.children(parent).len() > 1 {
            break cur;
        }
        cur = parent;
    };

    if !top_chain {
        if let Some(parent) = plan.parent(chain_top) {
            if plan.distribution_requirement(parent) != DistributionRequirement::Any {
                // The multi-child consumer above planned around the chain's
                // original output distribution; restore it.
                rectify_chain_distro(
                    ctx,
                    plan,
                    chain_top,
                    sg_candidate,
                    &chain_output_distribution,
                )?;
            }
        }
    }

    for child in plan.children(bottom).to_vec() {
        collapse_sg_nodes(ctx, plan, child)?;
    }
    Ok(())
}

/// Restores `required` at the top of a chain, retargeting an offsetable sg
/// already in the chain when one is reachable, otherwise inserting a fresh
/// sg at the chain's best candidate point.
fn rectify_chain_distro(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    chain_top: NodeId,
    sg_candidate: NodeId,
    required: &ArrayDistribution,
) -> Result<(), OptimizerError> {
    let current = plan.distribution(chain_top);
    let chain_parent = plan.parent(chain_top);

    if *required != current {
        let sg = match first_offsetable_sg(plan, chain_top) {
            Some(sg) => sg,
            None => {
                let schema = plan.operator(sg_candidate).schema().clone();
                let sg = build_sg_node(ctx, plan, schema, required.scheme(), None)?;
                plan.add_parent(sg_candidate, sg);
                plan.infer_boundaries(sg);
                sg
            }
        };
        set_sg_distribution(plan, sg, required)?;
        if let Some(parent) = chain_parent {
            propagate_distribution(plan, sg, parent);
        }
    }
    Ok(())
}

/// One round of join-sg pushup over the whole tree. Returns true when any
/// transformation was performed.
pub(super) fn pushup_join_sgs(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
) -> Result<bool, OptimizerError> {
    // Whether an sg placed on top of the join would later collapse away,
    // and the thinnest point of the chain above the join.
    let mut parent_chain_will_collapse =
        plan.root() == Some(root) || plan.distribution(root).has_mapper();
    let mut parent_chain_thin_point = plan.data_width(root);

    let mut node = root;
    while plan.children(node).len() == 1 {
        let child = plan.children(node)[0];
        let current_thickness = plan.data_width(child);
        if current_thickness < parent_chain_thin_point {
            parent_chain_thin_point = current_thickness;
        }
        if plan.is_sg_node(node) {
            parent_chain_will_collapse = true;
        } else if plan.needs_specific_distribution(node) {
            parent_chain_will_collapse = false;
            parent_chain_thin_point = current_thickness;
        }
        node = child;
    }

    let mut transformed = false;
    if plan.children(node).len() == 2
        && plan.distribution_requirement(node) == DistributionRequirement::Collocated
    {
        let left_root = plan.children(node)[0];
        let right_root = plan.children(node)[1];
        let dims_match = plan.operator(left_root).schema().dimensions().len()
            == plan.operator(right_root).schema().dimensions().len();

        if dims_match {
            let left_sg = top_sg_from_chain(plan, left_root);
            let right_sg = top_sg_from_chain(plan, right_root);

            match (left_sg, right_sg) {
                (Some(left_sg), Some(right_sg)) => {
                    let left_width = plan.data_width(left_sg);
                    let right_width = plan.data_width(right_sg);

                    let current_cost = left_width + right_width;
                    let mut move_left_cost = right_width;
                    let mut move_right_cost = left_width;
                    if !parent_chain_will_collapse {
                        move_left_cost += parent_chain_thin_point;
                        move_right_cost += parent_chain_thin_point;
                    }

                    let can_move_left = plan.is_sg_movable(left_sg)
                        && plan.distribution(plan.children(left_sg)[0]).has_mapper()
                        && plan.is_sg_offsetable(right_sg);
                    let can_move_right = plan.is_sg_movable(right_sg)
                        && plan.distribution(plan.children(right_sg)[0]).has_mapper()
                        && plan.is_sg_offsetable(left_sg);

                    if can_move_left
                        && move_left_cost <= move_right_cost
                        && move_left_cost <= current_cost
                    {
                        pushup_sg(ctx, plan, node, left_sg, right_sg)?;
                        transformed = true;
                    } else if can_move_right && move_right_cost <= current_cost {
                        pushup_sg(ctx, plan, node, right_sg, left_sg)?;
                        transformed = true;
                    }
                }
                (Some(sg), None) | (None, Some(sg)) => {
                    let opposite_root =
                        if left_sg.is_some() { right_root } else { left_root };
                    let opposite = find_thin_point(plan, opposite_root);

                    let can_move = plan.is_sg_movable(sg)
                        && plan.distribution(plan.children(sg)[0]).has_mapper();
                    let current_cost = plan.data_width(sg);
                    let mut move_cost = plan.data_width(opposite);
                    if !parent_chain_will_collapse {
                        move_cost += parent_chain_thin_point;
                    }

                    if can_move && move_cost < current_cost {
                        swap_sg(ctx, plan, node, sg, opposite)?;
                        transformed = true;
                    }
                }
                (None, None) => {}
            }
        }
    }

    let mut result = transformed;
    for child in plan.children(node).to_vec() {
        result |= pushup_join_sgs(ctx, plan, child)?;
    }
    Ok(result)
}

/// Re-infers distributions from `node` (exclusive) up to `stop`
/// (exclusive), returning the last inferred distribution.
fn infer_up_to(plan: &mut PhysicalPlan, node: NodeId, stop: NodeId) -> ArrayDistribution {
    let mut dist = plan.distribution(node);
    let mut cur = plan.parent(node);
    while let Some(id) = cur {
        if id == stop {
            break;
        }
        dist = plan.infer_distribution(id);
        cur = plan.parent(id);
    }
    dist
}

/// Removes `sg_to_remove` below a collocated join and retargets
/// `sg_to_offset` to the removed side's resulting distribution, placing a
/// fresh movable sg above the join instead.
fn pushup_sg(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    join: NodeId,
    sg_to_remove: NodeId,
    sg_to_offset: NodeId,
) -> Result<(), OptimizerError> {
    trace!(%join, %sg_to_remove, %sg_to_offset, "pushup join sg");
    let removed_child = plan.children(sg_to_remove)[0];
    plan.cut_out(sg_to_remove);

    let removed_dist = infer_up_to(plan, removed_child, join);
    debug_assert!(removed_dist.has_mapper());

    let target = ArrayDistribution::new(removed_dist.scheme())
        .with_mapper(removed_dist.mapper().cloned());
    set_sg_distribution(plan, sg_to_offset, &target)?;
    plan.infer_distribution(sg_to_offset);
    infer_up_to(plan, sg_to_offset, join);
    plan.infer_distribution(join);

    let schema = plan.operator(join).schema().clone();
    let new_sg = build_sg_node(ctx, plan, schema, PartitioningSchema::HashPartitioned, None)?;
    plan.set_sg_movable(new_sg, true);
    plan.set_sg_offsetable(new_sg, true);
    plan.add_parent(join, new_sg);
    plan.infer_distribution(new_sg);
    plan.infer_boundaries(new_sg);
    Ok(())
}

/// Removes the only sg below a collocated join and plants a new one at the
/// opposite child's thin point, targeting the removed side's resulting
/// distribution.
fn swap_sg(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    join: NodeId,
    sg_to_remove: NodeId,
    opposite_thin_point: NodeId,
) -> Result<(), OptimizerError> {
    trace!(%join, %sg_to_remove, %opposite_thin_point, "swap join sg");
    let removed_child = plan.children(sg_to_remove)[0];
    plan.cut_out(sg_to_remove);

    let removed_dist = infer_up_to(plan, removed_child, join);
    debug_assert!(removed_dist.has_mapper());

    let target = ArrayDistribution::new(removed_dist.scheme())
        .with_mapper(removed_dist.mapper().cloned());

    let schema = plan.operator(opposite_thin_point).schema().clone();
    let new_opposite_sg =
        build_sg_node(ctx, plan, schema, PartitioningSchema::HashPartitioned, None)?;
    plan.add_parent(opposite_thin_point, new_opposite_sg);
    set_sg_distribution(plan, new_opposite_sg, &target)?;
    plan.infer_boundaries(new_opposite_sg);
    plan.infer_distribution(new_opposite_sg);
    infer_up_to(plan, new_opposite_sg, join);
    plan.infer_distribution(join);

    let schema = plan.operator(join).schema().clone();
    let new_root_sg =
        build_sg_node(ctx, plan, schema, PartitioningSchema::HashPartitioned, None)?;
    plan.set_sg_movable(new_root_sg, true);
    plan.set_sg_offsetable(new_root_sg, true);
    plan.add_parent(join, new_root_sg);
    plan.infer_distribution(new_root_sg);
    plan.infer_boundaries(new_root_sg);
    Ok(())
}
