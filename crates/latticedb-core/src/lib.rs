//! `LatticeDB` Core
//!
//! Shared primitives for the array-database engine: typed scalar values,
//! array schemas (attributes, dimensions, chunking), and coordinate math.
//!
//! # Overview
//!
//! - **Values**: [`Value`] enum holding typed scalars, nulls, and tiles
//!   (batches of scalars used by vectorized evaluation)
//! - **Types**: [`DataType`] closed enum of storable scalar types
//! - **Schemas**: [`ArrayDesc`], [`AttributeDesc`], [`DimensionDesc`]
//!   describing an array's attributes, dimensions, and chunk layout
//!
//! # Example
//!
//! ```
//! use latticedb_core::{ArrayDesc, AttributeDesc, DataType, DimensionDesc, Value};
//!
//! let schema = ArrayDesc::new("temps")
//!     .with_attribute(AttributeDesc::new("celsius", DataType::Double))
//!     .with_dimension(DimensionDesc::new("t", 0, 999, 100));
//!
//! assert_eq!(schema.attributes().len(), 1);
//! assert_eq!(Value::from(3i64).data_type(), DataType::Int64);
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod array;
pub mod error;
pub mod types;

pub use array::{
    ArrayDesc, AttributeDesc, Coordinate, Coordinates, DimensionDesc, INFINITE_LENGTH,
    MAX_COORDINATE, MIN_COORDINATE,
};
pub use error::CoreError;
pub use types::{DataType, Value};
