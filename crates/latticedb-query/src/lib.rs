//! `LatticeDB` Query
//!
//! The query-optimization and distributed-execution core of `LatticeDB`:
//! translates logical query plans into physical plans, inserts the minimal
//! data-redistribution (scatter/gather) operations needed for correct
//! distributed execution, and compiles scalar expressions into a flat,
//! reusable evaluation form.
//!
//! # Modules
//!
//! - [`expr`] - Scalar expression AST, compiler, and evaluator
//! - [`plan`] - Logical and physical plan trees, distributions, boundaries
//! - [`operator`] - The operator contract consumed by the optimizer
//! - [`operators`] - Optimizer-owned physical operators (sg, reduce, ...)
//! - [`optimize`] - The optimization pass pipeline
//! - [`catalog`] - Catalog collaborator interface and in-memory implementation
//!
//! # Example
//!
//! ```
//! use latticedb_core::DataType;
//! use latticedb_query::expr::{Expression, FunctionLibrary, ScalarExpr};
//!
//! let lib = FunctionLibrary::with_builtins();
//! let ast = ScalarExpr::integer(2).mul(ScalarExpr::integer(21));
//! let expr = Expression::compile(&lib, &ast, false, None, &[], None).unwrap();
//! assert_eq!(expr.result_type(), DataType::Int64);
//! assert_eq!(expr.evaluate_constant().unwrap().as_int64(), Some(42));
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod catalog;
pub mod expr;
pub mod operator;
pub mod operators;
pub mod optimize;
pub mod plan;

pub use catalog::{Catalog, CatalogError, LockMode, MemoryCatalog};
pub use expr::{Expression, ExpressionContext, ExpressionError, FunctionLibrary, ScalarExpr};
pub use operator::{OperatorLibrary, OperatorParam, PhysicalOperator};
pub use optimize::{Optimizer, OptimizerError, PlanningContext};
pub use plan::{
    ArrayDistribution, DistributionRequirement, LogicalPlan, LogicalQueryPlanNode, NodeId,
    PartitioningSchema, PhysicalBoundaries, PhysicalPlan,
};
