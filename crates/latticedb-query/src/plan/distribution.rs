//! Array distributions: how one logical array's cells are spread across
//! worker instances.

use std::fmt;

use latticedb_core::{Coordinate, Coordinates};
use serde::{Deserialize, Serialize};

/// The partitioning scheme of a distributed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitioningSchema {
    /// A full copy of the array lives on every instance.
    Replicated,
    /// Chunks are spread by a hash of their coordinates.
    HashPartitioned,
    /// The whole array lives on a single instance.
    LocalInstance,
    /// No scheme the system can reconstruct without redistribution.
    Undefined,
}

impl fmt::Display for PartitioningSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Replicated => "replicated",
            Self::HashPartitioned => "hash",
            Self::LocalInstance => "local",
            Self::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

/// An additive per-dimension coordinate offset recorded on a distribution
/// when relative cell positions have shifted (for example after a slice),
/// without forcing an actual redistribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionMapper {
    offset: Coordinates,
}

impl DistributionMapper {
    /// Creates a mapper from an offset vector.
    #[must_use]
    pub fn offset(offset: Coordinates) -> Self {
        Self { offset }
    }

    /// The offset vector, one entry per dimension.
    #[must_use]
    pub fn offset_vector(&self) -> &[Coordinate] {
        &self.offset
    }

    /// Shifts `input` by the offset vector.
    #[must_use]
    pub fn translate(&self, input: &[Coordinate]) -> Coordinates {
        debug_assert_eq!(input.len(), self.offset.len());
        input.iter().zip(&self.offset).map(|(c, o)| c + o).collect()
    }

    /// Composes this mapper on top of a previous one. Not commutative.
    #[must_use]
    pub fn combine(&self, previous: Option<&Self>) -> Self {
        match previous {
            None => self.clone(),
            Some(prev) => {
                debug_assert_eq!(self.offset.len(), prev.offset.len());
                Self::offset(
                    self.offset.iter().zip(&prev.offset).map(|(a, b)| a + b).collect(),
                )
            }
        }
    }
}

impl fmt::Display for DistributionMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("offset [")?;
        for o in &self.offset {
            write!(f, "{o} ")?;
        }
        f.write_str("]")
    }
}

/// A description of how one array's cells are partitioned.
///
/// Equality is structural: schemes and mappers must match, and the
/// instance id must match when the scheme pins data to one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayDistribution {
    scheme: PartitioningSchema,
    mapper: Option<DistributionMapper>,
    instance_id: i64,
}

impl PartialEq for ArrayDistribution {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && (self.scheme != PartitioningSchema::LocalInstance
                || self.instance_id == other.instance_id)
            && self.mapper == other.mapper
    }
}

impl Default for ArrayDistribution {
    fn default() -> Self {
        Self::hash_partitioned()
    }
}

impl ArrayDistribution {
    /// Creates a distribution with no mapper.
    ///
    /// An undefined distribution can never carry a mapper; use
    /// [`Self::with_mapper`] only on defined schemes.
    #[must_use]
    pub const fn new(scheme: PartitioningSchema) -> Self {
        Self { scheme, mapper: None, instance_id: 0 }
    }

    /// Hash-partitioned with no mapper.
    #[must_use]
    pub const fn hash_partitioned() -> Self {
        Self::new(PartitioningSchema::HashPartitioned)
    }

    /// Replicated to every instance.
    #[must_use]
    pub const fn replicated() -> Self {
        Self::new(PartitioningSchema::Replicated)
    }

    /// Pinned to one instance.
    #[must_use]
    pub const fn local_instance(instance_id: i64) -> Self {
        Self { scheme: PartitioningSchema::LocalInstance, mapper: None, instance_id }
    }

    /// No reconstructible scheme.
    #[must_use]
    pub const fn undefined() -> Self {
        Self::new(PartitioningSchema::Undefined)
    }

    /// Attaches a coordinate-offset mapper.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Option<DistributionMapper>) -> Self {
        debug_assert!(
            mapper.is_none() || self.scheme != PartitioningSchema::Undefined,
            "an undefined distribution cannot carry a mapper"
        );
        self.mapper = mapper;
        self
    }

    /// The partitioning scheme.
    #[must_use]
    pub const fn scheme(&self) -> PartitioningSchema {
        self.scheme
    }

    /// The coordinate-offset mapper, if any.
    #[must_use]
    pub const fn mapper(&self) -> Option<&DistributionMapper> {
        self.mapper.as_ref()
    }

    /// True when a mapper is present.
    #[must_use]
    pub const fn has_mapper(&self) -> bool {
        self.mapper.is_some()
    }

    /// The pinned instance; meaningful only for [`PartitioningSchema::LocalInstance`].
    #[must_use]
    pub const fn instance_id(&self) -> i64 {
        self.instance_id
    }

    /// True when no scheme is defined.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        self.scheme == PartitioningSchema::Undefined
    }

    /// True when the distribution no longer corresponds to a scheme the
    /// system can reconstruct: undefined, or shifted by a mapper. Violated
    /// data must be redistributed before a consumer that needs full,
    /// defined chunks.
    #[must_use]
    pub fn is_violated(&self) -> bool {
        self.is_undefined() || self.has_mapper()
    }
}

impl fmt::Display for ArrayDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme)?;
        if self.scheme == PartitioningSchema::LocalInstance {
            write!(f, "({})", self.instance_id)?;
        }
        if let Some(m) = &self.mapper {
            write!(f, " {m}")?;
        }
        Ok(())
    }
}

/// What an operator demands of its input distributions.
#[derive(Debug, Clone, PartialEq)]
pub enum DistributionRequirement {
    /// Any distribution is acceptable.
    Any,
    /// All inputs must share one identical distribution.
    Collocated,
    /// Each input must match the given distribution, in any input order.
    Specific(Vec<ArrayDistribution>),
}

impl DistributionRequirement {
    /// The specific requirements, empty unless [`Self::Specific`].
    #[must_use]
    pub fn specific_requirements(&self) -> &[ArrayDistribution] {
        match self {
            Self::Specific(reqs) => reqs,
            _ => &[],
        }
    }

    /// True for a [`Self::Specific`] requirement.
    #[must_use]
    pub const fn is_specific(&self) -> bool {
        matches!(self, Self::Specific(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        let plain = ArrayDistribution::hash_partitioned();
        let mapped = ArrayDistribution::hash_partitioned()
            .with_mapper(Some(DistributionMapper::offset(vec![4, 6])));
        assert_ne!(plain, mapped);
        assert_eq!(plain, ArrayDistribution::hash_partitioned());
        assert_ne!(
            ArrayDistribution::local_instance(0),
            ArrayDistribution::local_instance(1)
        );
    }

    #[test]
    fn violated_means_undefined_or_mapped() {
        assert!(ArrayDistribution::undefined().is_violated());
        let mapped = ArrayDistribution::hash_partitioned()
            .with_mapper(Some(DistributionMapper::offset(vec![1])));
        assert!(mapped.is_violated());
        assert!(!ArrayDistribution::replicated().is_violated());
    }

    #[test]
    fn mapper_translates_and_combines() {
        let m = DistributionMapper::offset(vec![4, 6]);
        assert_eq!(m.translate(&[1, 1]), vec![5, 7]);
        let prev = DistributionMapper::offset(vec![1, -1]);
        assert_eq!(m.combine(Some(&prev)), DistributionMapper::offset(vec![5, 5]));
        assert_eq!(m.combine(None), m);
    }
}
