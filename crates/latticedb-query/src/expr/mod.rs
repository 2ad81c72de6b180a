//! Scalar expression compilation and evaluation.
//!
//! An expression AST (attribute/dimension references, constants, function
//! calls) compiles into an [`Expression`]: a flat array of typed value slots
//! plus an ordered list of compiled function calls over slot ranges. The
//! compiled form is immutable and may be evaluated concurrently, each caller
//! supplying its own [`ExpressionContext`] with current binding values.
//!
//! # Example
//!
//! ```
//! use latticedb_query::expr::{Expression, FunctionLibrary, ScalarExpr};
//!
//! let lib = FunctionLibrary::with_builtins();
//! let ast = ScalarExpr::integer(1).add(ScalarExpr::integer(2));
//! let expr = Expression::compile(&lib, &ast, false, None, &[], None).unwrap();
//! assert_eq!(expr.evaluate_constant().unwrap().as_int64(), Some(3));
//! ```

mod ast;
mod compile;
mod context;
mod error;
mod functions;
mod parse;

pub use ast::{AttributeRef, ConstantExpr, FunctionCallExpr, ScalarExpr, SourceLocation};
pub use compile::{evaluate_ast, expression_type, BindInfo, BindKind, Expression, OUTPUT_SCHEMA};
pub use context::ExpressionContext;
pub use error::{ExpressionError, FunctionError};
pub use functions::{
    Conversion, FunctionDescription, FunctionImpl, FunctionLibrary, FunctionMatch,
};
pub use parse::parse_scalar_expression;
