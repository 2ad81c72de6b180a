//! The closed set of scalar types storable in array cells.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar data type.
///
/// `Void` is the type of an untyped null literal before any conversion has
/// been applied; it never appears in a stored array schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of a bare `null` literal; convertible to any other type.
    Void,
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Double,
    /// UTF-8 string.
    String,
}

impl DataType {
    /// Returns the type name as used in rendered function signatures.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::String => "string",
        }
    }

    /// Fixed storage size of one cell of this type, in bits.
    ///
    /// Returns 0 for variable-length types; callers substitute an estimate.
    #[must_use]
    pub const fn fixed_bit_size(self) -> u32 {
        match self {
            Self::Void => 0,
            Self::Bool | Self::Int8 => 8,
            Self::Int16 => 16,
            Self::Int32 => 32,
            Self::Int64 | Self::Double => 64,
            Self::String => 0,
        }
    }

    /// True for the signed integer types.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// True for any numeric type (integers and floating point).
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, Self::Double)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
