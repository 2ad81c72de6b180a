//! The repartition operator.
//!
//! Rewrites its input into a schema with different chunk sizes or overlaps
//! without changing cell values or distribution. Parameter 0 is the target
//! schema.

use latticedb_core::ArrayDesc;

use crate::operator::{OperatorParam, PhysicalOperator};
use crate::plan::boundaries::PhysicalBoundaries;

/// The repartition operator node.
#[derive(Debug)]
pub struct RepartOperator {
    params: Vec<OperatorParam>,
    schema: ArrayDesc,
    tile: bool,
}

impl RepartOperator {
    /// Creates a repart node; parameter 0 holds the target schema.
    #[must_use]
    pub fn new(params: Vec<OperatorParam>, schema: ArrayDesc) -> Self {
        Self { params, schema, tile: false }
    }
}

impl PhysicalOperator for RepartOperator {
    fn logical_name(&self) -> &str {
        "repart"
    }

    fn physical_name(&self) -> &str {
        "physical_repart"
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

    fn output_boundaries(
        &self,
        child_boundaries: &[PhysicalBoundaries],
        _child_schemas: &[ArrayDesc],
    ) -> PhysicalBoundaries {
        child_boundaries
            .first()
            .cloned()
            .unwrap_or_else(|| PhysicalBoundaries::from_full_schema(&self.schema))
    }

    fn is_repart(&self) -> bool {
        true
    }
}
