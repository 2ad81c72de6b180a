//! Logical-to-physical plan translation.
//!
//! Walks the logical tree bottom-up, instantiating one physical node per
//! logical node and compiling logical expression parameters against the
//! child schemas. Before descending, a node may be rewritten by a fixed,
//! name-triggered substitution: `load` expands into `store(input(...))` on
//! a single-instance cluster or `sg(input(...))` otherwise, and an
//! aggregate-shorthand call (`sum`, `count`, ...) expands into a generic
//! `aggregate` invocation. The rewrite is not recursive.

use std::borrow::Cow;

use latticedb_core::{ArrayDesc, DataType, Value};
use tracing::trace;

use crate::expr::{Expression, ExpressionError, ScalarExpr};
use crate::operator::OperatorParam;
use crate::operators::scheme_code;
use crate::plan::distribution::PartitioningSchema;
use crate::plan::logical::{LogicalOperator, LogicalParam, LogicalQueryPlanNode};
use crate::plan::physical::{NodeId, PhysicalPlan};

use super::{OptimizerError, PlanningContext};

/// Builds the physical subtree for a logical node, returning its root id.
///
/// The returned node has boundaries inferred for itself and its whole
/// subtree; distributions are left for the insertion pass.
pub fn build_physical_tree(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    logical: &LogicalQueryPlanNode,
    tile_mode: bool,
) -> Result<NodeId, OptimizerError> {
    let logical = rewrite_if_needed(ctx, logical);

    let mut root_tile = tile_mode;
    let mut children = Vec::with_capacity(logical.children.len());
    for child in &logical.children {
        let child_id = build_physical_tree(ctx, plan, child, tile_mode)?;
        root_tile &= plan.node_tile_mode(child_id);
        children.push(child_id);
    }

    let root_id = create_physical_node(ctx, plan, &logical, root_tile)?;
    if plan.is_sg_node(root_id) {
        // A user-inserted explicit sg; later passes must not move it.
        plan.set_sg_movable(root_id, false);
        plan.set_sg_offsetable(root_id, false);
    }
    for child_id in children {
        plan.add_child(root_id, child_id);
    }

    let mut root_id = root_id;
    if let Some((global_logical, global_physical)) = logical.operator.global_operator() {
        trace!(operator = global_logical, "wrapping two-phase global operator");
        let global_op = ctx.operators.create_physical(
            global_logical,
            global_physical,
            Vec::new(),
            logical.operator.schema().clone(),
        )?;
        plan.infer_boundaries(root_id);
        let global_id = plan.add_node(global_op, true, false, false);
        plan.add_child(global_id, root_id);
        root_id = global_id;
    }

    plan.infer_boundaries(root_id);
    Ok(root_id)
}

fn create_physical_node(
    ctx: &PlanningContext,
    plan: &mut PhysicalPlan,
    logical: &LogicalQueryPlanNode,
    tile_mode: bool,
) -> Result<NodeId, OptimizerError> {
    let op = &logical.operator;
    let physical_names = ctx.operators.physical_names(op.name())?;
    let physical_name = &physical_names[0];

    let input_schemas: Vec<_> =
        logical.children.iter().map(|c| c.operator.schema().clone()).collect();
    let output_schema = op.schema();
    let mut tile = tile_mode && op.properties().tile;

    // A parameter that lands in scalar mode forces the whole parameter
    // list to recompile with tile mode off, not just that one parameter.
    let params = 'retry: loop {
        let mut params = Vec::with_capacity(op.params().len());
        for (i, param) in op.params().iter().enumerate() {
            let param_tile = tile && op.compile_param_in_tile_mode(i);
            match create_physical_parameter(ctx, param, &input_schemas, output_schema, param_tile)?
            {
                Some(p) => params.push(p),
                None => {
                    debug_assert!(param_tile);
                    tile = false;
                    continue 'retry;
                }
            }
        }
        break params;
    };

    let mut physical =
        ctx.operators.create_physical(op.name(), physical_name, params, output_schema.clone())?;
    physical.set_tile_mode(tile);
    Ok(plan.add_node(physical, false, logical.is_ddl(), tile))
}

/// Compiles one logical parameter to its physical form.
///
/// Returns `Ok(None)` when a tile-mode compile succeeded only by falling
/// back to scalar mode, signalling the caller to retry the node without
/// tile mode.
fn create_physical_parameter(
    ctx: &PlanningContext,
    param: &LogicalParam,
    input_schemas: &[ArrayDesc],
    output_schema: &ArrayDesc,
    tile: bool,
) -> Result<Option<OperatorParam>, OptimizerError> {
    match param {
        LogicalParam::Expression { expr, expected_type, constant } => {
            let result = if *constant {
                Expression::compile(&ctx.functions, expr, tile, Some(*expected_type), &[], None)
            } else {
                Expression::compile(
                    &ctx.functions,
                    expr,
                    tile,
                    Some(*expected_type),
                    input_schemas,
                    Some(output_schema),
                )
            };
            match result {
                Ok(expression) => {
                    if tile && !expression.supports_tile_mode() {
                        return Ok(None);
                    }
                    Ok(Some(OperatorParam::Expression { expression, constant: *constant }))
                }
                Err(ExpressionError::TypeConversion { from, to }) => {
                    Err(OptimizerError::ParameterType { expected: to, actual: from })
                }
                Err(err) => Err(err.into()),
            }
        }
        LogicalParam::ArrayRef(name) => Ok(Some(OperatorParam::ArrayRef(name.clone()))),
        LogicalParam::Schema(schema) => {
            schema.validate()?;
            Ok(Some(OperatorParam::Schema(schema.clone())))
        }
        LogicalParam::AggregateCall { function, input } => Ok(Some(
            OperatorParam::AggregateCall { function: function.clone(), input: input.clone() },
        )),
        LogicalParam::AttributeRef { input, name } => {
            Ok(Some(OperatorParam::AttributeRef { input: *input, name: name.clone() }))
        }
        LogicalParam::DimensionRef(name) => Ok(Some(OperatorParam::DimensionRef(name.clone()))),
    }
}

/// The fixed, non-recursive, name-triggered logical rewrites.
fn rewrite_if_needed<'a>(
    ctx: &PlanningContext,
    node: &'a LogicalQueryPlanNode,
) -> Cow<'a, LogicalQueryPlanNode> {
    if node.operator.name() == "load" {
        return Cow::Owned(rewrite_load(ctx, node));
    }
    if ctx.operators.has_aggregate(node.operator.name()) {
        return Cow::Owned(rewrite_aggregate_shorthand(node));
    }
    Cow::Borrowed(node)
}

/// `load(A, 'file')` becomes `store(input(A, 'file'), A)` on one instance,
/// or `sg(input(A, 'file'), hash, A)` on a cluster.
fn rewrite_load(ctx: &PlanningContext, node: &LogicalQueryPlanNode) -> LogicalQueryPlanNode {
    let load_op = &node.operator;
    let schema = load_op.schema().clone();
    let array_name = load_op
        .params()
        .first()
        .and_then(|p| match p {
            LogicalParam::Schema(s) => Some(s.name.clone()),
            LogicalParam::ArrayRef(n) => Some(n.clone()),
            _ => None,
        })
        .unwrap_or_else(|| schema.name.clone());

    let input_op = LogicalOperator::new("input", schema.clone())
        .with_params(load_op.params().to_vec())
        .with_properties(load_op.properties());
    let input_node = LogicalQueryPlanNode {
        operator: input_op,
        children: Vec::new(),
        location: node.location,
    };

    if ctx.instance_count == 1 {
        let store_op = LogicalOperator::new("store", schema)
            .with_param(LogicalParam::ArrayRef(array_name));
        return LogicalQueryPlanNode {
            operator: store_op,
            children: vec![input_node],
            location: node.location,
        };
    }

    let mut sg_params = vec![
        LogicalParam::Expression {
            expr: ScalarExpr::typed_constant(
                Value::Int32(scheme_code(PartitioningSchema::HashPartitioned)),
                DataType::Int32,
            ),
            expected_type: DataType::Int32,
            constant: true,
        },
        LogicalParam::Expression {
            expr: ScalarExpr::typed_constant(Value::Int64(-1), DataType::Int64),
            expected_type: DataType::Int64,
            constant: true,
        },
        LogicalParam::ArrayRef(array_name),
    ];
    // The input operator's strictness flag rides along on the sg.
    let input_params = node.operator.params();
    let strict_index = if input_params.len() >= 6
        && matches!(input_params[5], LogicalParam::Expression { .. })
    {
        Some(5)
    } else if input_params.len() >= 7 {
        Some(6)
    } else {
        None
    };
    if let Some(i) = strict_index {
        sg_params.push(input_params[i].clone());
    }

    let sg_op = LogicalOperator::new("sg", schema).with_params(sg_params);
    LogicalQueryPlanNode {
        operator: sg_op,
        children: vec![input_node],
        location: node.location,
    }
}

/// `sum(A, attr)` and friends become `aggregate(A, sum(attr))`.
fn rewrite_aggregate_shorthand(node: &LogicalQueryPlanNode) -> LogicalQueryPlanNode {
    let old_op = &node.operator;
    let name = old_op.name().to_string();
    let mut agg_op = LogicalOperator::new("aggregate", old_op.schema().clone());
    let old_params = old_op.params();

    if name == "count" {
        agg_op = agg_op
            .with_param(LogicalParam::AggregateCall { function: name.clone(), input: None });
    } else if old_params.is_empty() {
        let input_attr = node
            .children
            .first()
            .and_then(|c| c.operator.schema().attributes().first())
            .map(|a| a.name.clone());
        agg_op = agg_op.with_param(LogicalParam::AggregateCall {
            function: name.clone(),
            input: input_attr,
        });
    }

    let mut properties = old_op.properties();
    if !old_params.is_empty() {
        properties.tile = false;
    }
    agg_op = agg_op.with_properties(properties);

    for param in old_params {
        match param {
            LogicalParam::AttributeRef { name: attr, .. } => {
                agg_op = agg_op.with_param(LogicalParam::AggregateCall {
                    function: name.clone(),
                    input: Some(attr.clone()),
                });
            }
            LogicalParam::DimensionRef(_) => {
                agg_op = agg_op.with_param(param.clone());
            }
            _ => {}
        }
    }

    LogicalQueryPlanNode {
        operator: agg_op,
        children: node.children.clone(),
        location: node.location,
    }
}
