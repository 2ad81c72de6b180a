//! The distribution-insertion pass.
//!
//! Walks the physical tree bottom-up and inserts scatter/gather (or, for
//! replicated inputs, reduce-distribution) nodes wherever a consumer's
//! required distribution does not match its producer's actual one. Inserted
//! nodes default to hash partitioning; a specific requirement pins the sg
//! (not movable, not offsetable) since it satisfies a hard constraint.
//!
//! When a specific requirement can be satisfied anywhere along a chain of
//! distribution-preserving operators, the sg goes to the chain's thin
//! point: the node with the smallest estimated data width.

use latticedb_core::ArrayDesc;
use tracing::trace;

use crate::operators::{scheme_code, sg_params};
use crate::operator::OperatorParam;
use crate::plan::distribution::{
    ArrayDistribution, DistributionRequirement, PartitioningSchema,
};
use crate::plan::physical::{NodeId, PhysicalPlan};

use super::{OptimizerError, PlanningContext};

/// Builds a detached sg node targeting `scheme`, optionally storing into
/// `store_target`.
pub(super) fn build_sg_node(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    schema: ArrayDesc,
    scheme: PartitioningSchema,
    store_target: Option<String>,
) -> Result<NodeId, OptimizerError> {
    let store = store_target.is_some();
    let target = store_target.unwrap_or_else(|| schema.name.clone());
    let params = sg_params(scheme, -1, &target, store, &[]);
    let op = ctx.operators.create_physical("sg", "impl_sg", params, schema)?;
    Ok(plan.add_node(op, false, false, false))
}

/// Builds a detached reduce-distribution node over `child`'s schema.
pub(super) fn build_reducer_node(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    child: NodeId,
    scheme: PartitioningSchema,
) -> Result<NodeId, OptimizerError> {
    let schema = plan.operator(child).schema().clone();
    let params = vec![OperatorParam::constant(
        latticedb_core::DataType::Int32,
        latticedb_core::Value::Int32(scheme_code(scheme)),
    )];
    let op =
        ctx.operators.create_physical("reduce_distro", "physical_reduce_distro", params, schema)?;
    let tile = plan.node_tile_mode(child);
    let id = plan.add_node(op, false, false, tile);
    plan.operator_mut(id).set_tile_mode(tile);
    Ok(id)
}

/// Rewrites an sg node's parameters to target `dist`, preserving its
/// store target and flag.
pub(super) fn set_sg_distribution(
    plan: &mut PhysicalPlan,
    sg: NodeId,
    dist: &ArrayDistribution,
) -> Result<(), OptimizerError> {
    if dist.is_undefined() {
        return Err(OptimizerError::UndefinedSgDistribution);
    }
    let old = plan.operator(sg).parameters();
    let target = old
        .get(2)
        .and_then(OperatorParam::array_name)
        .map(str::to_string)
        .unwrap_or_else(|| plan.operator(sg).schema().name.clone());
    let store = old
        .get(3)
        .and_then(OperatorParam::constant_value)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let offsets: Vec<i64> =
        dist.mapper().map(|m| m.offset_vector().to_vec()).unwrap_or_default();
    let instance = match dist.scheme() {
        PartitioningSchema::LocalInstance => dist.instance_id(),
        _ => -1,
    };
    let params = sg_params(dist.scheme(), instance, &target, store, &offsets);
    plan.operator_mut(sg).set_parameters(params);
    Ok(())
}

/// Finds the cheapest place to cut a chain: walking down from `root`
/// through distribution-preserving, full-chunk, single-child nodes, the
/// node with the smallest data width.
pub(super) fn find_thin_point(plan: &PhysicalPlan, root: NodeId) -> NodeId {
    let mut data_width = plan.data_width(root);
    let mut candidate = root;
    let mut node = root;
    while !plan.is_sg_node(node)
        && !plan.needs_specific_distribution(node)
        && !plan.changes_distribution(node)
        && plan.output_full_chunks(node)
        && plan.children(node).len() == 1
    {
        node = plan.children(node)[0];
        let width = plan.data_width(node);
        if width < data_width {
            data_width = width;
            candidate = node;
        }
    }
    candidate
}

/// Re-infers cached distributions from `node` up to `end` (inclusive),
/// stopping early at a multi-child ancestor. Keeps cached stats correct
/// after splicing in a new node.
pub(super) fn propagate_distribution(
    plan: &mut PhysicalPlan,
    node: NodeId,
    end: NodeId,
) -> ArrayDistribution {
    let mut node = node;
    let mut dist = plan.infer_distribution(node);
    while node != end {
        let Some(parent) = plan.parent(node) else { break };
        if plan.children(parent).len() > 1 {
            break;
        }
        node = parent;
        dist = plan.infer_distribution(node);
    }
    dist
}

fn specific_requirement(
    plan: &PhysicalPlan,
    node: NodeId,
) -> Result<ArrayDistribution, OptimizerError> {
    let req = plan.distribution_requirement(node);
    let dist = req
        .specific_requirements()
        .first()
        .cloned()
        .ok_or_else(|| {
            OptimizerError::DistributionSpecification(
                "specific requirement without distributions".to_string(),
            )
        })?;
    if dist.is_violated() {
        return Err(OptimizerError::NotImplemented(
            "requiring violated distributions".to_string(),
        ));
    }
    Ok(dist)
}

/// The distribution-insertion pass. Recurses bottom-up from `root`.
pub(super) fn insert_sg_nodes(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
) -> Result<(), OptimizerError> {
    trace!(%root, "insert sg nodes");
    for child in plan.children(root).to_vec() {
        insert_sg_nodes(ctx, plan, child)?;
    }

    if !plan.is_sg_node(root) {
        match plan.children(root).len() {
            1 => insert_for_single_child(ctx, plan, root)?,
            2 => insert_for_two_children(ctx, plan, root)?,
            n if n > 2 => insert_for_many_children(ctx, plan, root)?,
            _ => {}
        }
    }

    plan.infer_distribution(root);
    Ok(())
}

fn insert_for_single_child(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
) -> Result<(), OptimizerError> {
    let child = plan.children(root)[0];
    let child_dist = plan.distribution(child);
    let mut sg_candidate = child;

    let mut sg_needed = false;
    let mut new_dist = ArrayDistribution::hash_partitioned();
    let mut sg_movable = true;
    let mut sg_offsetable = true;

    if !plan.output_full_chunks(child)
        || child_dist.scheme() == PartitioningSchema::LocalInstance
    {
        if plan.needs_specific_distribution(root) {
            let required = specific_requirement(plan, root)?;
            if required == child_dist && plan.output_full_chunks(child) {
                // Producer already yields exactly what the consumer needs.
            } else {
                sg_needed = true;
                new_dist = required;
                sg_offsetable = false;
            }
        } else if plan.is_sg_node(child) && plan.output_full_chunks(child) {
            // A user-inserted sg to a single instance; leave it alone.
        } else {
            sg_needed = true;
            new_dist = ArrayDistribution::hash_partitioned();
        }
        sg_movable = false;
    } else if child_dist == ArrayDistribution::replicated() {
        // Replicated data reduces locally instead of being shuffled.
        let mut required = ArrayDistribution::hash_partitioned();
        if plan.needs_specific_distribution(root) {
            required = specific_requirement(plan, root)?;
        }
        if required != child_dist {
            let reducer = build_reducer_node(ctx, plan, child, required.scheme())?;
            plan.add_parent(child, reducer);
            plan.infer_boundaries(reducer);
            propagate_distribution(plan, reducer, root);
        }
    } else if plan.needs_specific_distribution(root) {
        let required = specific_requirement(plan, root)?;
        if required != child_dist {
            sg_needed = true;
            new_dist = required;
            sg_offsetable = false;
            sg_candidate = find_thin_point(plan, child);
        }
    }

    if sg_needed {
        let schema = plan.operator(sg_candidate).schema().clone();
        let sg = build_sg_node(ctx, plan, schema, new_dist.scheme(), None)?;
        plan.add_parent(sg_candidate, sg);
        set_sg_distribution(plan, sg, &new_dist)?;
        plan.infer_boundaries(sg);
        plan.set_sg_movable(sg, sg_movable);
        plan.set_sg_offsetable(sg, sg_offsetable);
        propagate_distribution(plan, sg, root);
    }
    Ok(())
}

fn ensure_side_usable(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
    side: usize,
) -> Result<ArrayDistribution, OptimizerError> {
    let child = plan.children(root)[side];
    let dist = plan.distribution(child);
    if !plan.output_full_chunks(child) || dist.scheme() == PartitioningSchema::LocalInstance {
        let schema = plan.operator(child).schema().clone();
        let sg =
            build_sg_node(ctx, plan, schema, PartitioningSchema::HashPartitioned, None)?;
        plan.add_parent(child, sg);
        plan.infer_boundaries(sg);
        plan.set_sg_movable(sg, false);
        return Ok(propagate_distribution(plan, sg, root));
    }
    Ok(dist)
}

fn insert_for_two_children(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
) -> Result<(), OptimizerError> {
    let lhs = ensure_side_usable(ctx, plan, root, 0)?;
    let rhs = ensure_side_usable(ctx, plan, root, 1)?;

    let requirement = plan.distribution_requirement(root);
    match requirement {
        DistributionRequirement::Collocated => {
            if lhs != rhs || lhs.scheme() != PartitioningSchema::HashPartitioned {
                collocate_two_children(ctx, plan, root, &lhs, &rhs)?;
            }
            Ok(())
        }
        DistributionRequirement::Specific(_) => Err(OptimizerError::DistributionSpecification(
            "a binary operator cannot require a specific distribution".to_string(),
        )),
        DistributionRequirement::Any => Ok(()),
    }
}

fn collocate_two_children(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
    lhs: &ArrayDistribution,
    rhs: &ArrayDistribution,
) -> Result<(), OptimizerError> {
    let can_move_left_to_right =
        !rhs.is_violated() && rhs.scheme() == PartitioningSchema::HashPartitioned;
    let can_move_right_to_left =
        !lhs.is_violated() && lhs.scheme() == PartitioningSchema::HashPartitioned;

    let left_candidate = find_thin_point(plan, plan.children(root)[0]);
    let right_candidate = find_thin_point(plan, plan.children(root)[1]);
    let left_width = plan.data_width(left_candidate);
    let right_width = plan.data_width(right_candidate);

    if left_width < right_width && can_move_left_to_right {
        move_side_to(ctx, plan, root, 0, left_candidate, rhs.scheme(), lhs)?;
    } else if can_move_right_to_left {
        move_side_to(ctx, plan, root, 1, right_candidate, lhs.scheme(), rhs)?;
    } else {
        // Neither side's distribution is a usable target: hash both.
        for (side, dist, candidate) in
            [(0, lhs.clone(), left_candidate), (1, rhs.clone(), right_candidate)]
        {
            move_side_to(
                ctx,
                plan,
                root,
                side,
                candidate,
                PartitioningSchema::HashPartitioned,
                &dist,
            )?;
        }
    }
    Ok(())
}

/// Moves one join input to `target_scheme`: a local reduction when the
/// side is replicated, an sg at its thin point otherwise.
fn move_side_to(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
    side: usize,
    candidate: NodeId,
    target_scheme: PartitioningSchema,
    side_dist: &ArrayDistribution,
) -> Result<(), OptimizerError> {
    if side_dist.scheme() == PartitioningSchema::Replicated {
        let child = plan.children(root)[side];
        let reducer = build_reducer_node(ctx, plan, child, target_scheme)?;
        plan.add_parent(child, reducer);
        plan.infer_boundaries(reducer);
        propagate_distribution(plan, reducer, root);
    } else {
        let schema = plan.operator(candidate).schema().clone();
        let sg = build_sg_node(ctx, plan, schema, target_scheme, None)?;
        plan.add_parent(candidate, sg);
        plan.infer_boundaries(sg);
        propagate_distribution(plan, sg, root);
    }
    Ok(())
}

fn insert_for_many_children(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    root: NodeId,
) -> Result<(), OptimizerError> {
    let requirement = plan.distribution_requirement(root);
    let need_collocation = match requirement {
        DistributionRequirement::Any => false,
        DistributionRequirement::Collocated => true,
        DistributionRequirement::Specific(_) => {
            return Err(OptimizerError::DistributionSpecification(
                "an n-ary operator cannot require specific distributions".to_string(),
            ))
        }
    };

    // N-ary collocation is hard to place well; forcing every child to
    // hash partitioning is the documented baseline.
    for side in 0..plan.children(root).len() {
        let child = plan.children(root)[side];
        let dist = plan.distribution(child);
        let full_chunks = plan.output_full_chunks(child);
        if full_chunks
            && (!need_collocation || dist == ArrayDistribution::hash_partitioned())
        {
            continue;
        }
        if full_chunks && dist.scheme() == PartitioningSchema::Replicated {
            // Every instance already holds the replicas; filter locally.
            let reducer =
                build_reducer_node(ctx, plan, child, PartitioningSchema::HashPartitioned)?;
            plan.add_parent(child, reducer);
            plan.infer_boundaries(reducer);
            propagate_distribution(plan, reducer, root);
        } else {
            let candidate = find_thin_point(plan, child);
            let schema = plan.operator(candidate).schema().clone();
            let sg =
                build_sg_node(ctx, plan, schema, PartitioningSchema::HashPartitioned, None)?;
            plan.set_sg_movable(sg, false);
            plan.set_sg_offsetable(sg, false);
            plan.add_parent(candidate, sg);
            plan.infer_boundaries(sg);
            propagate_distribution(plan, sg, root);
        }
    }
    Ok(())
}
