//! Array schemas: attributes, dimensions, and chunk layout.
//!
//! An array is a rectilinear grid of cells addressed by integer
//! [`Coordinates`]. Each cell holds one value per attribute. Dimensions are
//! split into chunks (the unit of storage and transfer) of a fixed interval,
//! optionally with overlap into neighboring chunks.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DataType;

/// A single position along one dimension.
pub type Coordinate = i64;

/// A cell position: one coordinate per dimension.
pub type Coordinates = Vec<Coordinate>;

/// Largest representable coordinate; values at or beyond this are treated as
/// unbounded.
pub const MAX_COORDINATE: Coordinate = i64::MAX >> 2;

/// Smallest representable coordinate.
pub const MIN_COORDINATE: Coordinate = -MAX_COORDINATE;

/// Sentinel cell count for unbounded or overflowing regions.
pub const INFINITE_LENGTH: u64 = u64::MAX;

/// One attribute of an array: a named, typed, optionally nullable cell field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDesc {
    /// Attribute name, unique within the array.
    pub name: String,
    /// Scalar type of the attribute.
    pub data_type: DataType,
    /// Whether cells may hold null.
    pub nullable: bool,
}

impl AttributeDesc {
    /// Creates a non-nullable attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type, nullable: false }
    }

    /// Marks the attribute nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// One dimension of an array with its chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionDesc {
    /// Dimension name, unique within the array.
    pub name: String,
    /// Smallest coordinate of the dimension.
    pub start_min: Coordinate,
    /// Largest coordinate of the dimension.
    pub end_max: Coordinate,
    /// Number of cells per chunk along this dimension.
    pub chunk_interval: i64,
    /// Number of overlapping cells replicated into adjacent chunks.
    pub chunk_overlap: i64,
}

impl DimensionDesc {
    /// Creates a dimension with no chunk overlap.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        start_min: Coordinate,
        end_max: Coordinate,
        chunk_interval: i64,
    ) -> Self {
        Self { name: name.into(), start_min, end_max, chunk_interval, chunk_overlap: 0 }
    }

    /// Sets the chunk overlap.
    #[must_use]
    pub const fn with_overlap(mut self, overlap: i64) -> Self {
        self.chunk_overlap = overlap;
        self
    }

    /// Number of cells along this dimension, or [`INFINITE_LENGTH`] when
    /// unbounded.
    #[must_use]
    pub fn length(&self) -> u64 {
        if self.start_min <= MIN_COORDINATE || self.end_max >= MAX_COORDINATE {
            return INFINITE_LENGTH;
        }
        if self.end_max < self.start_min {
            return 0;
        }
        (self.end_max - self.start_min + 1) as u64
    }
}

/// An array schema: name, attributes, and dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDesc {
    /// Array name as registered in the catalog.
    pub name: String,
    /// Cell attributes, in declaration order.
    attributes: Vec<AttributeDesc>,
    /// Dimensions, in declaration order.
    dimensions: Vec<DimensionDesc>,
}

impl ArrayDesc {
    /// Creates an empty schema with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), dimensions: Vec::new() }
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attr: AttributeDesc) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Appends a dimension.
    #[must_use]
    pub fn with_dimension(mut self, dim: DimensionDesc) -> Self {
        self.dimensions.push(dim);
        self
    }

    /// Returns the attributes in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeDesc] {
        &self.attributes
    }

    /// Returns the dimensions in declaration order.
    #[must_use]
    pub fn dimensions(&self) -> &[DimensionDesc] {
        &self.dimensions
    }

    /// Looks up an attribute index by name.
    #[must_use]
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Looks up a dimension index by name.
    #[must_use]
    pub fn dimension_index(&self, name: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d.name == name)
    }

    /// Replaces the schema name, keeping attributes and dimensions.
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Checks the schema for internal consistency: at least one dimension,
    /// unique attribute and dimension names, positive chunk intervals,
    /// overlaps no larger than the interval, and ordered bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.dimensions.is_empty() {
            return Err(CoreError::Validation(format!(
                "array '{}' has no dimensions",
                self.name
            )));
        }
        for (i, attr) in self.attributes.iter().enumerate() {
            if self.attributes[..i].iter().any(|a| a.name == attr.name) {
                return Err(CoreError::Validation(format!(
                    "duplicate attribute '{}'",
                    attr.name
                )));
            }
        }
        for (i, dim) in self.dimensions.iter().enumerate() {
            if self.dimensions[..i].iter().any(|d| d.name == dim.name) {
                return Err(CoreError::Validation(format!(
                    "duplicate dimension '{}'",
                    dim.name
                )));
            }
            if dim.chunk_interval <= 0 {
                return Err(CoreError::Validation(format!(
                    "dimension '{}' has a non-positive chunk interval",
                    dim.name
                )));
            }
            if dim.chunk_overlap < 0 || dim.chunk_overlap > dim.chunk_interval {
                return Err(CoreError::Validation(format!(
                    "dimension '{}' overlap exceeds its chunk interval",
                    dim.name
                )));
            }
            if dim.end_max < dim.start_min {
                return Err(CoreError::Validation(format!(
                    "dimension '{}' ends before it starts",
                    dim.name
                )));
            }
        }
        Ok(())
    }

    /// True when both schemas have the same chunk intervals and overlaps on
    /// every dimension.
    #[must_use]
    pub fn same_partitioning(&self, other: &Self) -> bool {
        self.dimensions.len() == other.dimensions.len()
            && self
                .dimensions
                .iter()
                .zip(&other.dimensions)
                .all(|(a, b)| {
                    a.chunk_interval == b.chunk_interval && a.chunk_overlap == b.chunk_overlap
                })
    }
}
