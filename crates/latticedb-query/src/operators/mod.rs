//! Physical operators the optimizer builds itself.
//!
//! The optimization passes splice four operators into plans: the
//! scatter/gather primitive (plain and storing variants), the
//! reduce-distribution filter for replicated inputs, the chunk
//! materializer at tile-mode boundaries, and the repartitioner. Everything
//! else reaches the optimizer from the outside through [`crate::operator`].

mod materialize;
mod reduce;
mod repart;
mod sg;

pub use materialize::{MaterializeOperator, RLE_FORMAT};
pub use reduce::ReduceDistroOperator;
pub use repart::RepartOperator;
pub use sg::{sg_params, SgOperator};

use std::sync::Arc;

use crate::operator::OperatorLibrary;
use crate::plan::distribution::PartitioningSchema;

/// Registers the optimizer-owned operators into a library.
pub fn register_builtins(lib: &mut OperatorLibrary) {
    lib.register_physical(
        "sg",
        "impl_sg",
        Arc::new(|params, schema| Box::new(SgOperator::new(params, schema))),
    );
    lib.register_physical(
        "reduce_distro",
        "physical_reduce_distro",
        Arc::new(|params, schema| Box::new(ReduceDistroOperator::new(params, schema))),
    );
    lib.register_physical(
        "materialize",
        "impl_materialize",
        Arc::new(|params, schema| Box::new(MaterializeOperator::new(params, schema))),
    );
    lib.register_physical(
        "repart",
        "physical_repart",
        Arc::new(|params, schema| Box::new(RepartOperator::new(params, schema))),
    );
}

/// Wire code for a partitioning scheme in operator parameters.
pub(crate) fn scheme_code(scheme: PartitioningSchema) -> i32 {
    match scheme {
        PartitioningSchema::Replicated => 0,
        PartitioningSchema::HashPartitioned => 1,
        PartitioningSchema::LocalInstance => 2,
        PartitioningSchema::Undefined => 5,
    }
}

/// Decodes a wire partitioning-scheme code.
pub(crate) fn scheme_from_code(code: i32) -> PartitioningSchema {
    match code {
        0 => PartitioningSchema::Replicated,
        1 => PartitioningSchema::HashPartitioned,
        2 => PartitioningSchema::LocalInstance,
        _ => PartitioningSchema::Undefined,
    }
}
