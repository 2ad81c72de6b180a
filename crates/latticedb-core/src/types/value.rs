//! Runtime values held in expression slots and operator parameters.
//!
//! # Example
//!
//! ```
//! use latticedb_core::{DataType, Value};
//!
//! let v: Value = 42i64.into();
//! assert_eq!(v.data_type(), DataType::Int64);
//! assert_eq!(v.as_int64(), Some(42));
//! assert!(Value::Null.is_null());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::DataType;

/// A runtime scalar value, or a tile of scalars in vectorized evaluation.
///
/// A `Tile` holds one value per cell of a batch; vectorized function
/// implementations consume and produce whole tiles. Tiles never nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null/missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 8-bit signed integer.
    Int8(i8),
    /// 16-bit signed integer.
    Int16(i16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit floating point number.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// A batch of scalar values for tile-mode evaluation.
    Tile(Vec<Value>),
}

impl Value {
    /// The static type of this value.
    ///
    /// Nulls report [`DataType::Void`]; a tile reports the type of its first
    /// non-null element, or `Void` when empty or all null.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Void,
            Self::Bool(_) => DataType::Bool,
            Self::Int8(_) => DataType::Int8,
            Self::Int16(_) => DataType::Int16,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::Tile(cells) => cells
                .iter()
                .find(|c| !c.is_null())
                .map_or(DataType::Void, Value::data_type),
        }
    }

    /// True if this is a null scalar.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True if this is a tile of scalars.
    #[must_use]
    pub const fn is_tile(&self) -> bool {
        matches!(self, Self::Tile(_))
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value widened to `i64`, if it is any integer type.
    #[must_use]
    pub const fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int8(v) => Some(*v as i64),
            Self::Int16(v) => Some(*v as i64),
            Self::Int32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value widened to `f64`, if it is numeric.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int8(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the tile cells, if this is a tile.
    #[must_use]
    pub fn as_tile(&self) -> Option<&[Value]> {
        match self {
            Self::Tile(cells) => Some(cells),
            _ => None,
        }
    }

    /// A default (zero-like) scalar of the given type, used to pre-size
    /// evaluation slots.
    #[must_use]
    pub fn zero_of(ty: DataType) -> Self {
        match ty {
            DataType::Void => Self::Null,
            DataType::Bool => Self::Bool(false),
            DataType::Int8 => Self::Int8(0),
            DataType::Int16 => Self::Int16(0),
            DataType::Int32 => Self::Int32(0),
            DataType::Int64 => Self::Int64(0),
            DataType::Double => Self::Double(0.0),
            DataType::String => Self::String(String::new()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Tile(cells) => {
                f.write_str("[")?;
                for (i, c) in cells.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::Int8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_of_scalars() {
        assert_eq!(Value::from(1i8).data_type(), DataType::Int8);
        assert_eq!(Value::from(1i64).data_type(), DataType::Int64);
        assert_eq!(Value::from("x").data_type(), DataType::String);
        assert_eq!(Value::Null.data_type(), DataType::Void);
    }

    #[test]
    fn tile_type_skips_nulls() {
        let t = Value::Tile(vec![Value::Null, Value::from(2.5f64)]);
        assert_eq!(t.data_type(), DataType::Double);
        let empty = Value::Tile(vec![]);
        assert_eq!(empty.data_type(), DataType::Void);
    }

    #[test]
    fn widening_accessors() {
        assert_eq!(Value::from(7i16).as_int64(), Some(7));
        assert_eq!(Value::from(7i16).as_double(), Some(7.0));
        assert_eq!(Value::from("s").as_int64(), None);
    }

    #[test]
    fn serde_round_trip() {
        let v = Value::Tile(vec![Value::from(1i32), Value::Null, Value::from("a")]);
        let json = serde_json::to_string(&v).expect("serialize");
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(v, back);
    }
}
