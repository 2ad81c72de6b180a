//! The scalar expression AST.
//!
//! Exactly three variants exist: a reference to an attribute, dimension, or
//! free variable; a constant literal; and a named function call. The
//! compiler dispatches exhaustively over this closed set.

use std::fmt;

use latticedb_core::{DataType, Value};
use serde::{Deserialize, Serialize};

/// A position in the source text an expression was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A reference to an attribute, dimension coordinate, or free variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRef {
    /// Optional array qualifier (`array.name`).
    pub array: Option<String>,
    /// Attribute, dimension, or variable name.
    pub name: String,
    /// Source position, if parsed from text.
    pub location: Option<SourceLocation>,
}

impl AttributeRef {
    /// The qualified name as it appears in error messages.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.array {
            Some(array) => format!("{array}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A constant literal with its static type.
///
/// A bare `null` carries type [`DataType::Void`] until a conversion fixes
/// its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantExpr {
    /// The literal value.
    pub value: Value,
    /// The literal's static type.
    pub data_type: DataType,
    /// Source position, if parsed from text.
    pub location: Option<SourceLocation>,
}

/// A call to a named function with ordered arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallExpr {
    /// Function name, lower-cased.
    pub name: String,
    /// Ordered arguments.
    pub args: Vec<ScalarExpr>,
    /// Source position, if parsed from text.
    pub location: Option<SourceLocation>,
}

/// A scalar expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpr {
    /// Attribute, dimension, or variable reference.
    Reference(AttributeRef),
    /// Constant literal.
    Constant(ConstantExpr),
    /// Named function call.
    Call(FunctionCallExpr),
}

impl ScalarExpr {
    /// An unqualified reference.
    #[must_use]
    pub fn attribute(name: impl Into<String>) -> Self {
        Self::Reference(AttributeRef { array: None, name: name.into(), location: None })
    }

    /// A qualified reference (`array.name`).
    #[must_use]
    pub fn qualified(array: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Reference(AttributeRef {
            array: Some(array.into()),
            name: name.into(),
            location: None,
        })
    }

    /// A constant with type inferred from the value.
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let data_type = value.data_type();
        Self::Constant(ConstantExpr { value, data_type, location: None })
    }

    /// A constant with an explicit type, for typed nulls and narrow ints.
    #[must_use]
    pub fn typed_constant(value: Value, data_type: DataType) -> Self {
        Self::Constant(ConstantExpr { value, data_type, location: None })
    }

    /// An `Int64` literal.
    #[must_use]
    pub fn integer(v: i64) -> Self {
        Self::constant(v)
    }

    /// A `Double` literal.
    #[must_use]
    pub fn double(v: f64) -> Self {
        Self::constant(v)
    }

    /// A `String` literal.
    #[must_use]
    pub fn string(v: impl Into<String>) -> Self {
        Self::constant(v.into())
    }

    /// An untyped `null` literal.
    #[must_use]
    pub fn null() -> Self {
        Self::Constant(ConstantExpr { value: Value::Null, data_type: DataType::Void, location: None })
    }

    /// A call to `name` with the given arguments.
    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<ScalarExpr>) -> Self {
        Self::Call(FunctionCallExpr { name: name.into().to_lowercase(), args, location: None })
    }

    /// `self + rhs`
    #[must_use]
    pub fn add(self, rhs: Self) -> Self {
        Self::call("+", vec![self, rhs])
    }

    /// `self - rhs`
    #[must_use]
    pub fn sub(self, rhs: Self) -> Self {
        Self::call("-", vec![self, rhs])
    }

    /// `self * rhs`
    #[must_use]
    pub fn mul(self, rhs: Self) -> Self {
        Self::call("*", vec![self, rhs])
    }

    /// `self / rhs`
    #[must_use]
    pub fn div(self, rhs: Self) -> Self {
        Self::call("/", vec![self, rhs])
    }

    /// `self = rhs`
    #[must_use]
    pub fn eq(self, rhs: Self) -> Self {
        Self::call("=", vec![self, rhs])
    }

    /// `self > rhs`
    #[must_use]
    pub fn gt(self, rhs: Self) -> Self {
        Self::call(">", vec![self, rhs])
    }

    /// `self < rhs`
    #[must_use]
    pub fn lt(self, rhs: Self) -> Self {
        Self::call("<", vec![self, rhs])
    }

    /// `self and rhs`
    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        Self::call("and", vec![self, rhs])
    }

    /// `self or rhs`
    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        Self::call("or", vec![self, rhs])
    }

    /// Attaches a source location to this node.
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        match &mut self {
            Self::Reference(r) => r.location = Some(location),
            Self::Constant(c) => c.location = Some(location),
            Self::Call(c) => c.location = Some(location),
        }
        self
    }

    /// The source location of this node, if known.
    #[must_use]
    pub const fn location(&self) -> Option<SourceLocation> {
        match self {
            Self::Reference(r) => r.location,
            Self::Constant(c) => c.location,
            Self::Call(c) => c.location,
        }
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference(r) => f.write_str(&r.qualified_name()),
            Self::Constant(c) => write!(f, "{}", c.value),
            Self::Call(c) => {
                write!(f, "{}(", c.name)?;
                for (i, a) in c.args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
        }
    }
}
