//! The logical plan: the parser's operator tree, annotated with schemas.
//!
//! Logical nodes are immutable inputs to the plan builder. Each node wraps a
//! [`LogicalOperator`] descriptor: the operator name, its parameters, the
//! inferred output schema, and the properties the optimizer consults (DDL,
//! tile support, an optional second-phase "global" operator for two-phase
//! aggregation).

use latticedb_core::{ArrayDesc, DataType};

use crate::expr::{ScalarExpr, SourceLocation};

/// Operator properties fixed by the operator definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorProperties {
    /// The operator performs DDL; its plan skips optimization passes.
    pub ddl: bool,
    /// The operator's implementation can evaluate in tile mode.
    pub tile: bool,
}

/// One parameter of a logical operator invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalParam {
    /// A scalar expression, compiled during plan building.
    Expression {
        /// The uncompiled expression tree.
        expr: ScalarExpr,
        /// Type the operator expects the expression to produce.
        expected_type: DataType,
        /// True when the expression must not reference input data.
        constant: bool,
    },
    /// A reference to a stored array by name.
    ArrayRef(String),
    /// An inline schema.
    Schema(ArrayDesc),
    /// An aggregate call; `input` of `None` means `count(*)`-style.
    AggregateCall {
        /// Aggregate function name.
        function: String,
        /// Input attribute, or `None` for the whole cell.
        input: Option<String>,
    },
    /// An attribute of one of the operator's inputs.
    AttributeRef {
        /// Which input the attribute belongs to.
        input: usize,
        /// Attribute name.
        name: String,
    },
    /// A dimension of the operator's input.
    DimensionRef(String),
}

/// A logical operator invocation: name, parameters, schema, properties.
#[derive(Debug, Clone)]
pub struct LogicalOperator {
    name: String,
    params: Vec<LogicalParam>,
    schema: ArrayDesc,
    properties: OperatorProperties,
    global_operator: Option<(String, String)>,
    tile_params: Vec<usize>,
}

impl LogicalOperator {
    /// Creates an operator descriptor with its inferred output schema.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: ArrayDesc) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            schema,
            properties: OperatorProperties::default(),
            global_operator: None,
            tile_params: Vec::new(),
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn with_param(mut self, param: LogicalParam) -> Self {
        self.params.push(param);
        self
    }

    /// Replaces the whole parameter list.
    #[must_use]
    pub fn with_params(mut self, params: Vec<LogicalParam>) -> Self {
        self.params = params;
        self
    }

    /// Sets operator properties.
    #[must_use]
    pub const fn with_properties(mut self, properties: OperatorProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Declares the two-phase "global" operator (logical, physical names)
    /// wrapped around this operator during plan building.
    #[must_use]
    pub fn with_global_operator(
        mut self,
        logical: impl Into<String>,
        physical: impl Into<String>,
    ) -> Self {
        self.global_operator = Some((logical.into(), physical.into()));
        self
    }

    /// Declares which parameters compile in tile mode when tile mode is on.
    #[must_use]
    pub fn with_tile_params(mut self, indexes: Vec<usize>) -> Self {
        self.tile_params = indexes;
        self
    }

    /// Operator name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[LogicalParam] {
        &self.params
    }

    /// The inferred output schema.
    #[must_use]
    pub const fn schema(&self) -> &ArrayDesc {
        &self.schema
    }

    /// Operator properties.
    #[must_use]
    pub const fn properties(&self) -> OperatorProperties {
        self.properties
    }

    /// The declared global operator, if any.
    #[must_use]
    pub fn global_operator(&self) -> Option<(&str, &str)> {
        self.global_operator.as_ref().map(|(l, p)| (l.as_str(), p.as_str()))
    }

    /// Whether parameter `index` compiles in tile mode.
    #[must_use]
    pub fn compile_param_in_tile_mode(&self, index: usize) -> bool {
        self.tile_params.contains(&index)
    }
}

/// One node of the logical plan tree.
#[derive(Debug, Clone)]
pub struct LogicalQueryPlanNode {
    /// The operator invocation.
    pub operator: LogicalOperator,
    /// Ordered children.
    pub children: Vec<LogicalQueryPlanNode>,
    /// Where the invocation appeared in the query text.
    pub location: Option<SourceLocation>,
}

impl LogicalQueryPlanNode {
    /// Creates a leaf node.
    #[must_use]
    pub fn new(operator: LogicalOperator) -> Self {
        Self { operator, children: Vec::new(), location: None }
    }

    /// Appends a child.
    #[must_use]
    pub fn with_child(mut self, child: LogicalQueryPlanNode) -> Self {
        self.children.push(child);
        self
    }

    /// True when the operator performs DDL.
    #[must_use]
    pub const fn is_ddl(&self) -> bool {
        self.operator.properties().ddl
    }

    /// True when the operator's implementation supports tile mode.
    #[must_use]
    pub const fn supports_tile_mode(&self) -> bool {
        self.operator.properties().tile
    }
}

/// The parsed, schema-annotated plan handed to the optimizer.
#[derive(Debug, Clone)]
pub struct LogicalPlan {
    root: LogicalQueryPlanNode,
}

impl LogicalPlan {
    /// Wraps a root node.
    #[must_use]
    pub fn new(root: LogicalQueryPlanNode) -> Self {
        Self { root }
    }

    /// The plan root.
    #[must_use]
    pub const fn root(&self) -> &LogicalQueryPlanNode {
        &self.root
    }
}
