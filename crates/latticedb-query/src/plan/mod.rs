//! Logical and physical query plans.
//!
//! - [`logical`] - the parser-produced operator tree consumed by the builder
//! - [`physical`] - the arena-based physical plan the optimizer rewrites
//! - [`distribution`] - how array cells are partitioned across instances
//! - [`boundaries`] - coordinate-box size estimates used as a cost heuristic

pub mod boundaries;
pub mod distribution;
pub mod logical;
pub mod physical;


pub use boundaries::PhysicalBoundaries;
pub use distribution::{
    ArrayDistribution, DistributionMapper, DistributionRequirement, PartitioningSchema,
};
pub use logical::{
    LogicalOperator, LogicalParam, LogicalPlan, LogicalQueryPlanNode, OperatorProperties,
};
pub use physical::{NodeId, PhysicalPlan};
