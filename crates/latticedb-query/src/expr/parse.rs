//! Textual front end for scalar expressions.
//!
//! Parses a standalone scalar expression (`w * 2 + iif(x > 0, 1, 0)`) into
//! the three-variant AST. Built on `sqlparser`'s generic dialect; only the
//! scalar subset the compiler understands is accepted.

use latticedb_core::{DataType, Value};
use sqlparser::ast as sql;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::ast::ScalarExpr;
use super::error::ExpressionError;

/// Parses a scalar expression from source text.
pub fn parse_scalar_expression(source: &str) -> Result<ScalarExpr, ExpressionError> {
    let dialect = GenericDialect {};
    let mut parser = Parser::new(&dialect)
        .try_with_sql(source)
        .map_err(|e| ExpressionError::Parse(e.to_string()))?;
    let expr = parser.parse_expr().map_err(|e| ExpressionError::Parse(e.to_string()))?;
    lower(&expr)
}

fn lower(expr: &sql::Expr) -> Result<ScalarExpr, ExpressionError> {
    match expr {
        sql::Expr::Value(value) => lower_value(value),

        sql::Expr::Identifier(ident) => Ok(ScalarExpr::attribute(ident.value.clone())),

        sql::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [array, name] => Ok(ScalarExpr::qualified(array.value.clone(), name.value.clone())),
            _ => Err(ExpressionError::Parse(format!(
                "unsupported compound identifier with {} parts",
                parts.len()
            ))),
        },

        sql::Expr::BinaryOp { left, op, right } => {
            let name = binary_op_name(op)?;
            Ok(ScalarExpr::call(name, vec![lower(left)?, lower(right)?]))
        }

        sql::Expr::UnaryOp { op, expr } => match op {
            sql::UnaryOperator::Minus => Ok(ScalarExpr::call("-", vec![lower(expr)?])),
            sql::UnaryOperator::Plus => lower(expr),
            sql::UnaryOperator::Not => Ok(ScalarExpr::call("not", vec![lower(expr)?])),
            other => Err(ExpressionError::Parse(format!("unsupported unary operator {other}"))),
        },

        sql::Expr::Nested(inner) => lower(inner),

        sql::Expr::IsNull(inner) => Ok(ScalarExpr::call("is_null", vec![lower(inner)?])),

        sql::Expr::IsNotNull(inner) => Ok(ScalarExpr::call(
            "not",
            vec![ScalarExpr::call("is_null", vec![lower(inner)?])],
        )),

        sql::Expr::Function(function) => lower_function(function),

        other => Err(ExpressionError::Parse(format!("unsupported expression: {other}"))),
    }
}

fn lower_value(value: &sql::Value) -> Result<ScalarExpr, ExpressionError> {
    match value {
        sql::Value::Number(text, _) => {
            if text.contains('.') || text.contains('e') || text.contains('E') {
                text.parse::<f64>()
                    .map(ScalarExpr::double)
                    .map_err(|e| ExpressionError::Parse(e.to_string()))
            } else {
                text.parse::<i64>()
                    .map(ScalarExpr::integer)
                    .map_err(|e| ExpressionError::Parse(e.to_string()))
            }
        }
        sql::Value::SingleQuotedString(s) => Ok(ScalarExpr::string(s.clone())),
        sql::Value::Boolean(b) => Ok(ScalarExpr::constant(*b)),
        sql::Value::Null => Ok(ScalarExpr::null()),
        other => Err(ExpressionError::Parse(format!("unsupported literal: {other}"))),
    }
}

fn lower_function(function: &sql::Function) -> Result<ScalarExpr, ExpressionError> {
    let name = function.name.to_string().to_lowercase();
    let mut args = Vec::new();
    match &function.args {
        sql::FunctionArguments::None => {}
        sql::FunctionArguments::List(list) => {
            for arg in &list.args {
                match arg {
                    sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(e)) => {
                        args.push(lower(e)?);
                    }
                    other => {
                        return Err(ExpressionError::Parse(format!(
                            "unsupported function argument: {other}"
                        )))
                    }
                }
            }
        }
        sql::FunctionArguments::Subquery(_) => {
            return Err(ExpressionError::Parse("subqueries are not supported".to_string()))
        }
    }
    Ok(ScalarExpr::call(name, args))
}

fn binary_op_name(op: &sql::BinaryOperator) -> Result<&'static str, ExpressionError> {
    use sql::BinaryOperator as Op;
    Ok(match op {
        Op::Plus => "+",
        Op::Minus => "-",
        Op::Multiply => "*",
        Op::Divide => "/",
        Op::Modulo => "%",
        Op::Eq => "=",
        Op::NotEq => "<>",
        Op::Lt => "<",
        Op::LtEq => "<=",
        Op::Gt => ">",
        Op::GtEq => ">=",
        Op::And => "and",
        Op::Or => "or",
        other => {
            return Err(ExpressionError::Parse(format!("unsupported binary operator {other}")))
        }
    })
}
