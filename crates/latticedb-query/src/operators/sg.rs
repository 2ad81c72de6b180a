//! The scatter/gather primitive.
//!
//! An sg node redistributes its input's chunks across instances according
//! to a target partitioning scheme. Its parameter shape is consumed by the
//! external executor:
//!
//! 0. partitioning-scheme code (`int32` constant)
//! 1. target instance id, `-1` unless pinning to one instance (`int64`)
//! 2. target array name (array reference; the node's own schema name when
//!    not persisting)
//! 3. store flag (`bool` constant) - a storing sg both redistributes and
//!    persists
//! 4. one `int64` constant per dimension of coordinate offset, present only
//!    when the target distribution carries a mapper

use latticedb_core::{ArrayDesc, DataType, Value};

use super::{scheme_code, scheme_from_code};
use crate::operator::{OperatorParam, PhysicalOperator};
use crate::plan::distribution::{
    ArrayDistribution, DistributionMapper, PartitioningSchema,
};

/// Builds the canonical sg parameter vector.
#[must_use]
pub fn sg_params(
    scheme: PartitioningSchema,
    instance_id: i64,
    target_array: &str,
    store: bool,
    offsets: &[i64],
) -> Vec<OperatorParam> {
    let mut params = vec![
        OperatorParam::constant(DataType::Int32, Value::Int32(scheme_code(scheme))),
        OperatorParam::constant(DataType::Int64, Value::Int64(instance_id)),
        OperatorParam::ArrayRef(target_array.to_string()),
        OperatorParam::constant(DataType::Bool, Value::Bool(store)),
    ];
    for &o in offsets {
        params.push(OperatorParam::constant(DataType::Int64, Value::Int64(o)));
    }
    params
}

/// The scatter/gather operator node.
#[derive(Debug)]
pub struct SgOperator {
    params: Vec<OperatorParam>,
    schema: ArrayDesc,
    tile: bool,
}

impl SgOperator {
    /// Creates an sg node from executor-shaped parameters.
    #[must_use]
    pub fn new(params: Vec<OperatorParam>, schema: ArrayDesc) -> Self {
        Self { params, schema, tile: false }
    }

    fn param_i64(&self, index: usize) -> Option<i64> {
        self.params.get(index).and_then(OperatorParam::constant_value)?.as_int64()
    }

    fn scheme(&self) -> PartitioningSchema {
        self.param_i64(0)
            .map_or(PartitioningSchema::Undefined, |code| scheme_from_code(code as i32))
    }

    fn offsets(&self) -> Vec<i64> {
        self.params
            .iter()
            .skip(4)
            .filter_map(|p| p.constant_value()?.as_int64())
            .collect()
    }
}

impl PhysicalOperator for SgOperator {
    fn logical_name(&self) -> &str {
        "sg"
    }

    fn physical_name(&self) -> &str {
        "impl_sg"
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
        let scheme = self.scheme();
        let offsets = self.offsets();
        let mapper =
            if offsets.is_empty() { None } else { Some(DistributionMapper::offset(offsets)) };
        let mut dist = match scheme {
            PartitioningSchema::LocalInstance => {
                ArrayDistribution::local_instance(self.param_i64(1).unwrap_or(-1))
            }
            other => ArrayDistribution::new(other),
        };
        if scheme != PartitioningSchema::Undefined {
            dist = dist.with_mapper(mapper);
        }
        dist
    }

    fn changes_distribution(&self, _child_schemas: &[ArrayDesc]) -> bool {
        true
    }

    fn output_full_chunks(&self, _child_schemas: &[ArrayDesc]) -> bool {
        true
    }

    fn is_sg(&self) -> bool {
        true
    }

    fn is_storing_sg(&self) -> bool {
        self.params
            .get(3)
            .and_then(OperatorParam::constant_value)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use latticedb_core::{AttributeDesc, DimensionDesc};

    use super::*;

    fn schema() -> ArrayDesc {
        ArrayDesc::new("a")
            .with_attribute(AttributeDesc::new("v", DataType::Int64))
            .with_dimension(DimensionDesc::new("x", 0, 99, 10))
    }

    #[test]
    fn output_distribution_reflects_parameters() {
        let op = SgOperator::new(
            sg_params(PartitioningSchema::HashPartitioned, -1, "a", false, &[]),
            schema(),
        );
        assert_eq!(op.output_distribution(&[], &[]), ArrayDistribution::hash_partitioned());
        assert!(!op.is_storing_sg());

        let op = SgOperator::new(
            sg_params(PartitioningSchema::LocalInstance, 3, "a", false, &[]),
            schema(),
        );
        assert_eq!(op.output_distribution(&[], &[]), ArrayDistribution::local_instance(3));
    }

    #[test]
    fn offsets_become_a_mapper() {
        let op = SgOperator::new(
            sg_params(PartitioningSchema::HashPartitioned, -1, "a", false, &[5]),
            schema(),
        );
        let dist = op.output_distribution(&[], &[]);
        assert!(dist.has_mapper());
        assert_eq!(dist.mapper().map(DistributionMapper::offset_vector), Some(&[5][..]));
    }

    #[test]
    fn storing_flag_marks_storing_sg() {
        let op = SgOperator::new(
            sg_params(PartitioningSchema::HashPartitioned, -1, "target", true, &[]),
            schema(),
        );
        assert!(op.is_storing_sg());
        assert_eq!(op.parameters()[2].array_name(), Some("target"));
    }
}
