//! The chunk materializer.
//!
//! Inserted between a tile-mode producer and a scalar-mode consumer (or
//! the reverse) so the consumer always sees fully materialized chunks.
//! Scatter/gather nodes materialize as a side effect and never need one.
//! Parameter 0 is the materialization format code.

use latticedb_core::ArrayDesc;

use crate::operator::{OperatorParam, PhysicalOperator};

/// Run-length-encoded chunk format code.
pub const RLE_FORMAT: i64 = 1;

/// The chunk-materializer operator node.
#[derive(Debug)]
pub struct MaterializeOperator {
    params: Vec<OperatorParam>,
    schema: ArrayDesc,
    tile: bool,
}

impl MaterializeOperator {
    /// Creates a materializer node; parameter 0 holds the format code.
    #[must_use]
    pub fn new(params: Vec<OperatorParam>, schema: ArrayDesc) -> Self {
        Self { params, schema, tile: false }
    }
}

impl PhysicalOperator for MaterializeOperator {
    fn logical_name(&self) -> &str {
        "materialize"
    }

    fn physical_name(&self) -> &str {
        "impl_materialize"
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
}
