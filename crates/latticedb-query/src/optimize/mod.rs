//! The physical plan optimizer.
//!
//! Rewrites a logical plan into a physical plan annotated with correct,
//! minimal data-redistribution operators:
//!
//! 1. [`builder`] translates the logical tree into physical nodes,
//!    compiling expression parameters.
//! 2. [`repart`] splices repartition nodes where chunk layouts disagree.
//! 3. [`distribution`] inserts scatter/gather and reduce-distribution
//!    nodes so every consumer sees an acceptable input distribution.
//! 4. [`collapse`] removes redundant sg nodes and retargets movable ones,
//!    interleaved with [`collapse::pushup_join_sgs`] to a fixpoint.
//! 5. [`materialize`] inserts chunk materializers at tile-mode boundaries.
//! 6. [`storing_sg`] fuses `store(sg(X))` into a single storing sg.
//!
//! Passes mutate the plan in place; a failing pass aborts the whole
//! `optimize` call. DDL plans skip every pass.

mod builder;
mod collapse;
mod distribution;
mod materialize;
mod repart;
mod storing_sg;

use std::sync::Arc;

use latticedb_core::{CoreError, DataType};
use thiserror::Error;
use tracing::debug;

use crate::catalog::{Catalog, CatalogError, LockMode};
use crate::expr::{ExpressionError, FunctionLibrary};
use crate::operator::{OperatorError, OperatorLibrary, OperatorParam};
use crate::plan::logical::LogicalPlan;
use crate::plan::physical::PhysicalPlan;

pub use builder::build_physical_tree;

/// Errors raised during plan optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// An expression parameter failed to compile or evaluate.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// A parameter compiled to a type the operator cannot accept.
    #[error("parameter type error: expected {expected}, got {actual}")]
    ParameterType {
        /// Type the operator declared.
        expected: DataType,
        /// Type the parameter compiled to.
        actual: DataType,
    },

    /// A schema parameter failed validation.
    #[error("invalid schema parameter: {0}")]
    Schema(#[from] CoreError),

    /// Array lookup or lock acquisition failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Operator lookup or construction failed.
    #[error(transparent)]
    Operator(#[from] OperatorError),

    /// An operator's distribution requirement is internally inconsistent.
    #[error("distribution specification error: {0}")]
    DistributionSpecification(String),

    /// A plan shape the rule-based optimizer deliberately does not handle.
    #[error("feature not implemented: {0}")]
    NotImplemented(String),

    /// An sg target distribution resolved to undefined.
    #[error("cannot create sg with undefined distribution")]
    UndefinedSgDistribution,
}

/// Everything the optimizer needs from its environment, injected
/// explicitly: operator and function registries, the catalog, and cluster
/// shape.
#[derive(Clone)]
pub struct PlanningContext {
    /// Operator registry.
    pub operators: Arc<OperatorLibrary>,
    /// Function/converter registry for expression compilation.
    pub functions: Arc<FunctionLibrary>,
    /// Catalog for array lookup and locking.
    pub catalog: Arc<dyn Catalog>,
    /// Number of worker instances in the cluster.
    pub instance_count: usize,
    /// Configured tile size; tile-mode compilation is attempted when
    /// greater than one.
    pub tile_size: usize,
    /// Id of the query being planned, used as the lock owner.
    pub query_id: u64,
}

impl PlanningContext {
    /// Creates a context over the given registries and catalog.
    #[must_use]
    pub fn new(
        operators: Arc<OperatorLibrary>,
        functions: Arc<FunctionLibrary>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self { operators, functions, catalog, instance_count: 1, tile_size: 1, query_id: 0 }
    }

    /// Sets the cluster size.
    #[must_use]
    pub const fn with_instance_count(mut self, count: usize) -> Self {
        self.instance_count = count;
        self
    }

    /// Sets the tile size.
    #[must_use]
    pub const fn with_tile_size(mut self, size: usize) -> Self {
        self.tile_size = size;
        self
    }

    /// Sets the planning query id.
    #[must_use]
    pub const fn with_query_id(mut self, query_id: u64) -> Self {
        self.query_id = query_id;
        self
    }

    /// True when expression parameters should try tile-mode compilation.
    #[must_use]
    pub const fn tile_mode_enabled(&self) -> bool {
        self.tile_size > 1
    }
}

/// The rule-based physical optimizer.
///
/// Each feature toggle maps to one pass; all are on by default.
#[derive(Debug, Clone)]
pub struct Optimizer {
    condense_sg: bool,
    insert_repart: bool,
    rewrite_storing_sg: bool,
    insert_materialization: bool,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    /// Creates an optimizer with every pass enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            condense_sg: true,
            insert_repart: true,
            rewrite_storing_sg: true,
            insert_materialization: true,
        }
    }

    /// Disables the collapse/pushup passes.
    #[must_use]
    pub const fn without_condense_sg(mut self) -> Self {
        self.condense_sg = false;
        self
    }

    /// Disables repartition insertion.
    #[must_use]
    pub const fn without_insert_repart(mut self) -> Self {
        self.insert_repart = false;
        self
    }

    /// Disables the storing-sg rewrite.
    #[must_use]
    pub const fn without_rewrite_storing_sg(mut self) -> Self {
        self.rewrite_storing_sg = false;
        self
    }

    /// Disables chunk-materializer insertion.
    #[must_use]
    pub const fn without_insert_materialization(mut self) -> Self {
        self.insert_materialization = false;
        self
    }

    /// Optimizes a logical plan into an executable physical plan.
    pub fn optimize(
        &self,
        ctx: &PlanningContext,
        logical: &LogicalPlan,
    ) -> Result<PhysicalPlan, OptimizerError> {
        let tile_hint = ctx.tile_mode_enabled();
        let mut plan = PhysicalPlan::new();
        let root = builder::build_physical_tree(ctx, &mut plan, logical.root(), tile_hint)?;
        plan.set_root(root);

        if plan.is_ddl() {
            return Ok(plan);
        }

        acquire_array_locks(ctx, &plan)?;

        if self.insert_repart {
            if let Some(root) = plan.root() {
                repart::insert_repart_nodes(ctx, &mut plan, root)?;
            }
        }

        if let Some(root) = plan.root() {
            distribution::insert_sg_nodes(ctx, &mut plan, root)?;
        }

        if self.condense_sg {
            debug!("condense sg: begin");
            if let Some(root) = plan.root() {
                collapse::collapse_sg_nodes(ctx, &mut plan, root)?;
            }
            loop {
                let Some(root) = plan.root() else { break };
                if !collapse::pushup_join_sgs(ctx, &mut plan, root)? {
                    break;
                }
                if let Some(root) = plan.root() {
                    collapse::collapse_sg_nodes(ctx, &mut plan, root)?;
                }
            }
            debug!("condense sg: end");
        }

        if self.insert_materialization {
            if let Some(root) = plan.root() {
                materialize::insert_chunk_materializers(ctx, &mut plan, root)?;
            }
        }

        if self.rewrite_storing_sg && ctx.instance_count > 1 {
            if let Some(root) = plan.root() {
                storing_sg::rewrite_storing_sg(ctx, &mut plan, root)?;
            }
        }

        Ok(plan)
    }
}

/// Locks every array the plan touches for the planning query: leaves are
/// read-locked on their source array, store nodes write-locked on their
/// target. A conflicting holder aborts planning with a distinguishable
/// already-locked error.
fn acquire_array_locks(
    ctx: &PlanningContext,
    plan: &PhysicalPlan,
) -> Result<(), OptimizerError> {
    let Some(root) = plan.root() else { return Ok(()) };
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        let op = plan.operator(id);
        if op.is_store() {
            let target = op
                .parameters()
                .iter()
                .find_map(OperatorParam::array_name)
                .map_or_else(|| op.schema().name.clone(), str::to_string);
            ctx.catalog.lock_array(&target, ctx.query_id, LockMode::Write)?;
        } else if plan.children(id).is_empty() {
            ctx.catalog.lock_array(&op.schema().name, ctx.query_id, LockMode::Read)?;
        }
        stack.extend_from_slice(plan.children(id));
    }
    Ok(())
}
