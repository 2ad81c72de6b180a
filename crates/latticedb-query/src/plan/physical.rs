//! The physical plan: an arena of operator nodes the optimizer rewrites in
//! place.
//!
//! Nodes live in an arena addressed by stable [`NodeId`]s; the tree
//! structure is expressed as child id lists plus non-owning parent ids, so
//! splicing a node in (`add_parent`) or out (`cut_out`) is id reassignment
//! and never invalidates other references. A node cut out of the tree stays
//! in the arena but is unreachable from the root.
//!
//! Cached per-node distribution and boundary annotations are valid only
//! after `infer_distribution` / `infer_boundaries` ran bottom-up; every
//! pass that rewires children must re-infer the affected nodes.

use std::fmt;

use latticedb_core::ArrayDesc;

use crate::operator::PhysicalOperator;
use crate::plan::boundaries::PhysicalBoundaries;
use crate::plan::distribution::{ArrayDistribution, DistributionRequirement};

/// Stable handle to a node in a [`PhysicalPlan`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug)]
struct PhysicalNode {
    operator: Box<dyn PhysicalOperator>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    is_agg: bool,
    is_ddl: bool,
    tile: bool,
    sg_movable: bool,
    sg_offsetable: bool,
    distribution: ArrayDistribution,
    boundaries: PhysicalBoundaries,
}

/// A physical query plan: node arena plus root.
#[derive(Debug, Default)]
pub struct PhysicalPlan {
    nodes: Vec<PhysicalNode>,
    root: Option<NodeId>,
}

impl PhysicalPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the plan has no root.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The plan root.
    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Sets the plan root and clears its parent link.
    pub fn set_root(&mut self, id: NodeId) {
        self.nodes[id.0].parent = None;
        self.root = Some(id);
    }

    /// True when the root node performs DDL.
    #[must_use]
    pub fn is_ddl(&self) -> bool {
        self.root.is_some_and(|r| self.nodes[r.0].is_ddl)
    }

    /// True when the root node runs in tile mode.
    #[must_use]
    pub fn supports_tile_mode(&self) -> bool {
        self.root.is_some_and(|r| self.nodes[r.0].tile)
    }

    /// Adds a detached node to the arena.
    pub fn add_node(
        &mut self,
        operator: Box<dyn PhysicalOperator>,
        is_agg: bool,
        is_ddl: bool,
        tile: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(PhysicalNode {
            operator,
            children: Vec::new(),
            parent: None,
            is_agg,
            is_ddl,
            tile,
            sg_movable: true,
            sg_offsetable: true,
            distribution: ArrayDistribution::hash_partitioned(),
            boundaries: PhysicalBoundaries::default(),
        });
        id
    }

    /// Appends `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// The node's children, in input order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// The node's parent, if it has one.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// The node's operator.
    #[must_use]
    pub fn operator(&self, id: NodeId) -> &dyn PhysicalOperator {
        self.nodes[id.0].operator.as_ref()
    }

    /// Mutable access to the node's operator.
    pub fn operator_mut(&mut self, id: NodeId) -> &mut dyn PhysicalOperator {
        self.nodes[id.0].operator.as_mut()
    }

    /// Replaces `old` with `new` in `parent`'s child list.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        let replaced = self.nodes[parent.0].children.iter_mut().any(|c| {
            if *c == old {
                *c = new;
                true
            } else {
                false
            }
        });
        debug_assert!(replaced, "old child not present");
        self.nodes[new.0].parent = Some(parent);
    }

    /// Removes `child` from `parent`'s child list, detaching it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].children.retain(|c| *c != child);
        self.nodes[child.0].parent = None;
    }

    /// Splices `node` in directly above `target`: `target`'s parent (or the
    /// plan root) now points at `node`, and `target` becomes `node`'s only
    /// child.
    pub fn add_parent(&mut self, target: NodeId, node: NodeId) {
        match self.nodes[target.0].parent {
            Some(parent) => self.replace_child(parent, target, node),
            None => {
                debug_assert_eq!(self.root, Some(target));
                self.root = Some(node);
                self.nodes[node.0].parent = None;
            }
        }
        self.add_child(node, target);
    }

    /// Cuts a node with at most one child out of the tree, reconnecting its
    /// child (if any) to its parent. The node stays in the arena,
    /// unreachable.
    pub fn cut_out(&mut self, id: NodeId) {
        let children = self.nodes[id.0].children.clone();
        debug_assert!(children.len() <= 1);
        match self.nodes[id.0].parent {
            Some(parent) => {
                if let Some(&child) = children.first() {
                    self.replace_child(parent, id, child);
                } else {
                    self.remove_child(parent, id);
                }
                self.nodes[id.0].parent = None;
            }
            None => {
                debug_assert_eq!(self.root, Some(id));
                match children.first() {
                    Some(&child) => {
                        self.nodes[child.0].parent = None;
                        self.root = Some(child);
                    }
                    None => self.root = None,
                }
            }
        }
        self.nodes[id.0].children.clear();
    }

    /// Schemas of the node's inputs, in input order.
    #[must_use]
    pub fn child_schemas(&self, id: NodeId) -> Vec<ArrayDesc> {
        self.nodes[id.0]
            .children
            .iter()
            .map(|c| self.nodes[c.0].operator.schema().clone())
            .collect()
    }

    /// The node's cached output distribution.
    #[must_use]
    pub fn distribution(&self, id: NodeId) -> ArrayDistribution {
        self.nodes[id.0].distribution.clone()
    }

    /// Recomputes and caches the node's output distribution from its
    /// children's cached distributions.
    pub fn infer_distribution(&mut self, id: NodeId) -> ArrayDistribution {
        let child_distributions: Vec<ArrayDistribution> = self.nodes[id.0]
            .children
            .iter()
            .map(|c| self.nodes[c.0].distribution.clone())
            .collect();
        let child_schemas = self.child_schemas(id);
        let dist =
            self.nodes[id.0].operator.output_distribution(&child_distributions, &child_schemas);
        self.nodes[id.0].distribution = dist.clone();
        dist
    }

    /// The node's cached boundary estimate.
    #[must_use]
    pub fn boundaries(&self, id: NodeId) -> PhysicalBoundaries {
        self.nodes[id.0].boundaries.clone()
    }

    /// Recomputes and caches the node's boundary estimate from its
    /// children's cached boundaries.
    pub fn infer_boundaries(&mut self, id: NodeId) -> PhysicalBoundaries {
        let child_boundaries: Vec<PhysicalBoundaries> = self.nodes[id.0]
            .children
            .iter()
            .map(|c| self.nodes[c.0].boundaries.clone())
            .collect();
        let child_schemas = self.child_schemas(id);
        let bounds =
            self.nodes[id.0].operator.output_boundaries(&child_boundaries, &child_schemas);
        self.nodes[id.0].boundaries = bounds.clone();
        bounds
    }

    /// Estimated bytes emitted by the node; the optimizer's cost heuristic.
    #[must_use]
    pub fn data_width(&self, id: NodeId) -> f64 {
        self.nodes[id.0].boundaries.size_estimate_bytes(self.nodes[id.0].operator.schema())
    }

    /// The node's distribution requirement.
    #[must_use]
    pub fn distribution_requirement(&self, id: NodeId) -> DistributionRequirement {
        let schemas = self.child_schemas(id);
        self.nodes[id.0].operator.distribution_requirement(&schemas)
    }

    /// True when the node demands a specific input distribution.
    #[must_use]
    pub fn needs_specific_distribution(&self, id: NodeId) -> bool {
        self.distribution_requirement(id).is_specific()
    }

    /// Delegates to the operator contract.
    #[must_use]
    pub fn changes_distribution(&self, id: NodeId) -> bool {
        let schemas = self.child_schemas(id);
        self.nodes[id.0].operator.changes_distribution(&schemas)
    }

    /// Delegates to the operator contract.
    #[must_use]
    pub fn output_full_chunks(&self, id: NodeId) -> bool {
        let schemas = self.child_schemas(id);
        self.nodes[id.0].operator.output_full_chunks(&schemas)
    }

    /// True when every chunk produced by the subtree is completely filled.
    /// A scatter/gather node re-establishes full chunks for everything
    /// below it.
    #[must_use]
    pub fn subtree_output_full_chunks(&self, id: NodeId) -> bool {
        if self.is_sg_node(id) {
            return true;
        }
        for &child in &self.nodes[id.0].children {
            if !self.subtree_output_full_chunks(child) {
                return false;
            }
        }
        self.output_full_chunks(id)
    }

    /// True for a scatter/gather node.
    #[must_use]
    pub fn is_sg_node(&self, id: NodeId) -> bool {
        self.nodes[id.0].operator.is_sg()
    }

    /// True for a scatter/gather node that persists its output.
    #[must_use]
    pub fn is_storing_sg(&self, id: NodeId) -> bool {
        self.nodes[id.0].operator.is_storing_sg()
    }

    /// True for a repartition node.
    #[must_use]
    pub fn is_repart_node(&self, id: NodeId) -> bool {
        self.nodes[id.0].operator.is_repart()
    }

    /// True for a store node.
    #[must_use]
    pub fn is_store_node(&self, id: NodeId) -> bool {
        self.nodes[id.0].operator.is_store()
    }

    /// Whether later passes may relocate this scatter/gather node.
    #[must_use]
    pub fn is_sg_movable(&self, id: NodeId) -> bool {
        self.nodes[id.0].sg_movable
    }

    /// Marks whether later passes may relocate this scatter/gather node.
    pub fn set_sg_movable(&mut self, id: NodeId, value: bool) {
        self.nodes[id.0].sg_movable = value;
    }

    /// Whether later passes may retarget this scatter/gather node.
    #[must_use]
    pub fn is_sg_offsetable(&self, id: NodeId) -> bool {
        self.nodes[id.0].sg_offsetable
    }

    /// Marks whether later passes may retarget this scatter/gather node.
    pub fn set_sg_offsetable(&mut self, id: NodeId, value: bool) {
        self.nodes[id.0].sg_offsetable = value;
    }

    /// True for a two-phase aggregation wrapper node.
    #[must_use]
    pub fn is_agg(&self, id: NodeId) -> bool {
        self.nodes[id.0].is_agg
    }

    /// Whether the node runs in tile mode.
    #[must_use]
    pub fn node_tile_mode(&self, id: NodeId) -> bool {
        self.nodes[id.0].operator.tile_mode()
    }

    /// Number of scatter/gather nodes reachable from the root.
    #[must_use]
    pub fn count_sg_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            if self.is_sg_node(id) {
                count += 1;
            }
            stack.extend_from_slice(self.children(id));
        }
        count
    }

    /// Number of nodes reachable from the root.
    #[must_use]
    pub fn count_nodes(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            count += 1;
            stack.extend_from_slice(self.children(id));
        }
        count
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, indent: usize) -> fmt::Result {
        let node = &self.nodes[id.0];
        writeln!(
            f,
            "{:indent$}[{}] {} ({}) dist {} agg {} ddl {} tile {}",
            "",
            id,
            node.operator.logical_name(),
            node.operator.physical_name(),
            node.distribution,
            node.is_agg,
            node.is_ddl,
            node.tile,
            indent = indent
        )?;
        for &child in &node.children {
            self.fmt_node(f, child, indent + 2)?;
        }
        Ok(())
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_node(f, root, 0),
            None => writeln!(f, "(empty plan)"),
        }
    }
}
