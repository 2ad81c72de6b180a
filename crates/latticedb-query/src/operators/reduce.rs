//! The reduce-distribution operator.
//!
//! When a replicated input feeds a consumer that needs a partitioned
//! distribution, a full scatter/gather is wasteful: every instance already
//! holds all the data. A reduce-distro node locally filters the replicas
//! down to the target partition with no network shuffle. Parameter 0 is the
//! target partitioning-scheme code.

use latticedb_core::ArrayDesc;

use super::scheme_from_code;
use crate::operator::{OperatorParam, PhysicalOperator};
use crate::plan::distribution::{ArrayDistribution, PartitioningSchema};

/// The reduce-distribution operator node.
#[derive(Debug)]
pub struct ReduceDistroOperator {
    params: Vec<OperatorParam>,
    schema: ArrayDesc,
    tile: bool,
}

impl ReduceDistroOperator {
    /// Creates a reduce-distro node; parameter 0 holds the target scheme.
    #[must_use]
    pub fn new(params: Vec<OperatorParam>, schema: ArrayDesc) -> Self {
        Self { params, schema, tile: false }
    }

    fn target_scheme(&self) -> PartitioningSchema {
        self.params
            .first()
            .and_then(OperatorParam::constant_value)
            .and_then(|v| v.as_int64())
            .map_or(PartitioningSchema::Undefined, |code| scheme_from_code(code as i32))
    }
}

impl PhysicalOperator for ReduceDistroOperator {
    fn logical_name(&self) -> &str {
        "reduce_distro"
    }

    fn physical_name(&self) -> &str {
        "physical_reduce_distro"
    }

    fn schema(&self) -> &ArrayDesc {
        &self.schema
    }

    fn set_schema(&mut self, schema: ArrayDesc) {
        self.schema = schema;
    }

    fn parameters(&self) -> &[OperatorParam] {
        &self.params
    }

    fn set_parameters(&mut self, params: Vec<OperatorParam>) {
        self.params = params;
    }

    fn tile_mode(&self) -> bool {
        self.tile
    }

    fn set_tile_mode(&mut self, tile: bool) {
        self.tile = tile;
    }

    fn output_distribution(
        &self,
        _child_distributions: &[ArrayDistribution],
        _child_schemas: &[ArrayDesc],
    ) -> ArrayDistribution {
        ArrayDistribution::new(self.target_scheme())
    }

    fn changes_distribution(&self, _child_schemas: &[ArrayDesc]) -> bool {
        true
    }
}
