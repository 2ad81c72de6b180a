//! Expression compilation and evaluation errors.

use latticedb_core::DataType;
use thiserror::Error;

use super::ast::SourceLocation;

/// Errors raised while compiling or evaluating an expression.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// An attribute, dimension, or variable name could not be resolved.
    #[error("reference '{reference}' not found{}", fmt_location(.location))]
    ReferenceNotFound {
        /// The unresolved name, qualified if a qualifier was given.
        reference: String,
        /// Where the reference appeared in the source, if known.
        location: Option<SourceLocation>,
    },

    /// No function overload matches the call's argument types.
    #[error("function '{signature}' not found{}", fmt_location(.location))]
    FunctionNotFound {
        /// Rendered signature: name plus ordered argument type names.
        signature: String,
        /// Where the call appeared in the source, if known.
        location: Option<SourceLocation>,
    },

    /// The compiled result type cannot be converted to the expected type.
    #[error("cannot convert expression result from {from} to {to}")]
    TypeConversion {
        /// Type the expression compiled to.
        from: DataType,
        /// Type the caller expected.
        to: DataType,
    },

    /// A function raised a recognized error during evaluation.
    #[error("error in user-defined function '{function}': {message}")]
    FunctionFailed {
        /// Name of the failing function.
        function: String,
        /// The function's own error message.
        message: String,
    },

    /// A function failed during evaluation without a recognized error.
    #[error("unknown error in user-defined function '{function}'")]
    FunctionFailedUnknown {
        /// Name of the failing function.
        function: String,
    },

    /// The expression text could not be parsed.
    #[error("failed to parse expression: {0}")]
    Parse(String),

    /// The expression was deserialized but not yet resolved against a
    /// function library, or was never compiled.
    #[error("expression is not resolved against a function library")]
    Unresolved,
}

impl ExpressionError {
    /// True for the two error kinds that trigger the tile-mode compile
    /// fallback: a failed overload lookup or a failed type conversion.
    /// No other failure is retried.
    #[must_use]
    pub const fn is_tile_retryable(&self) -> bool {
        matches!(self, Self::FunctionNotFound { .. } | Self::TypeConversion { .. })
    }
}

/// Error returned by a scalar or tile function implementation.
#[derive(Debug, Clone)]
pub enum FunctionError {
    /// A recognized failure with a message (division by zero, domain error).
    Message(String),
    /// An unrecognized failure.
    Unknown,
}

impl FunctionError {
    /// Creates a recognized failure.
    #[must_use]
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

fn fmt_location(location: &Option<SourceLocation>) -> String {
    location.map_or_else(String::new, |loc| format!(" at {loc}"))
}
