//! The operator contract consumed by the optimizer.
//!
//! Concrete operator implementations live outside this core; the optimizer
//! sees each one only through [`PhysicalOperator`]: schema inference,
//! distribution requirements and outputs, boundary estimates, repartition
//! needs, and tile-mode flags. [`OperatorLibrary`] is the injected registry
//! that maps operator names to physical factories; there are no process
//! globals.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use latticedb_core::{ArrayDesc, DataType, Value};
use thiserror::Error;

use crate::expr::Expression;
use crate::plan::boundaries::PhysicalBoundaries;
use crate::plan::distribution::{ArrayDistribution, DistributionRequirement};

/// A parameter of a physical operator, in the shape the executor consumes.
#[derive(Debug, Clone)]
pub enum OperatorParam {
    /// A compiled expression; `constant` marks it free of data bindings.
    Expression {
        /// The compiled expression.
        expression: Expression,
        /// True when the expression needs no runtime bindings.
        constant: bool,
    },
    /// A stored array referenced by name.
    ArrayRef(String),
    /// An inline schema.
    Schema(ArrayDesc),
    /// An aggregate call; `input` of `None` means the whole cell.
    AggregateCall {
        /// Aggregate function name.
        function: String,
        /// Input attribute, or `None`.
        input: Option<String>,
    },
    /// An attribute of one of the operator's inputs.
    AttributeRef {
        /// Which input the attribute belongs to.
        input: usize,
        /// Attribute name.
        name: String,
    },
    /// A dimension reference.
    DimensionRef(String),
}

impl OperatorParam {
    /// Wraps a constant value as a compiled-expression parameter.
    #[must_use]
    pub fn constant(data_type: DataType, value: Value) -> Self {
        Self::Expression {
            expression: Expression::constant(false, data_type, value),
            constant: true,
        }
    }

    /// Evaluates a constant expression parameter to its value.
    #[must_use]
    pub fn constant_value(&self) -> Option<Value> {
        match self {
            Self::Expression { expression, constant: true } => {
                expression.evaluate_constant().ok()
            }
            _ => None,
        }
    }

    /// The referenced array name, if this is an array reference.
    #[must_use]
    pub fn array_name(&self) -> Option<&str> {
        match self {
            Self::ArrayRef(name) => Some(name),
            _ => None,
        }
    }
}

/// The contract every physical operator exposes to the optimizer.
pub trait PhysicalOperator: fmt::Debug + Send {
    /// The operator's logical name (`filter`, `join`, `sg`, ...).
    fn logical_name(&self) -> &str;

    /// The implementation-variant name (`impl_sg`, `physical_join`, ...).
    fn physical_name(&self) -> &str;

    /// The operator's output schema.
    fn schema(&self) -> &ArrayDesc;

    /// Replaces the output schema.
    fn set_schema(&mut self, schema: ArrayDesc);

    /// The operator's parameters.
    fn parameters(&self) -> &[OperatorParam];

    /// Replaces the parameter list.
    fn set_parameters(&mut self, params: Vec<OperatorParam>);

    /// Whether the operator evaluates in tile mode.
    fn tile_mode(&self) -> bool {
        false
    }

    /// Sets tile mode; fixed once at construction by the plan builder.
    fn set_tile_mode(&mut self, _tile: bool) {}

    /// What the operator demands of its input distributions.
    fn distribution_requirement(&self, _child_schemas: &[ArrayDesc]) -> DistributionRequirement {
        DistributionRequirement::Any
    }

    /// The distribution of the operator's output given its inputs.
    fn output_distribution(
        &self,
        child_distributions: &[ArrayDistribution],
        _child_schemas: &[ArrayDesc],
    ) -> ArrayDistribution {
        child_distributions
            .first()
            .cloned()
            .unwrap_or_else(ArrayDistribution::hash_partitioned)
    }

    /// True when the output distribution differs from the input's.
    fn changes_distribution(&self, _child_schemas: &[ArrayDesc]) -> bool {
        false
    }

    /// True when every output chunk is completely filled.
    fn output_full_chunks(&self, _child_schemas: &[ArrayDesc]) -> bool {
        true
    }

    /// Boundary estimate for the operator's output.
    fn output_boundaries(
        &self,
        child_boundaries: &[PhysicalBoundaries],
        _child_schemas: &[ArrayDesc],
    ) -> PhysicalBoundaries {
        child_boundaries
            .first()
            .cloned()
            .unwrap_or_else(|| PhysicalBoundaries::from_full_schema(self.schema()))
    }

    /// Per-child repartition targets; `None` entries need no repartition.
    /// An empty vector means no child does.
    fn requires_repart(&self, _child_schemas: &[ArrayDesc]) -> Vec<Option<ArrayDesc>> {
        Vec::new()
    }

    /// True for the scatter/gather primitive.
    fn is_sg(&self) -> bool {
        false
    }

    /// True for a scatter/gather that also persists its output.
    fn is_storing_sg(&self) -> bool {
        false
    }

    /// True for the store primitive.
    fn is_store(&self) -> bool {
        false
    }

    /// True for the repartition primitive.
    fn is_repart(&self) -> bool {
        false
    }
}

/// Errors raised by operator lookup and construction.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// No physical implementation is registered for a logical operator.
    #[error("no physical operator registered for '{logical}'")]
    UnknownLogicalOperator {
        /// The logical operator name.
        logical: String,
    },

    /// The named implementation variant is not registered.
    #[error("physical operator '{physical}' not registered for '{logical}'")]
    UnknownPhysicalOperator {
        /// The logical operator name.
        logical: String,
        /// The requested implementation variant.
        physical: String,
    },
}

/// Factory building a physical operator from parameters and an output
/// schema.
pub type PhysicalFactory =
    Arc<dyn Fn(Vec<OperatorParam>, ArrayDesc) -> Box<dyn PhysicalOperator> + Send + Sync>;

/// Registry mapping logical operator names to physical implementations,
/// plus the set of aggregate names recognized by the shorthand rewrite.
pub struct OperatorLibrary {
    physical: HashMap<String, Vec<(String, PhysicalFactory)>>,
    aggregates: HashSet<String>,
}

impl fmt::Debug for OperatorLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorLibrary")
            .field("operators", &self.physical.len())
            .field("aggregates", &self.aggregates.len())
            .finish()
    }
}

impl Default for OperatorLibrary {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl OperatorLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self { physical: HashMap::new(), aggregates: HashSet::new() }
    }

    /// Creates a library with the optimizer-owned operators (sg,
    /// reduce_distro, materialize, repart) and the standard aggregate
    /// names registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut lib = Self::new();
        crate::operators::register_builtins(&mut lib);
        for agg in ["sum", "count", "avg", "min", "max"] {
            lib.register_aggregate(agg);
        }
        lib
    }

    /// Registers a physical implementation for a logical operator.
    pub fn register_physical(
        &mut self,
        logical: impl Into<String>,
        physical: impl Into<String>,
        factory: PhysicalFactory,
    ) {
        self.physical
            .entry(logical.into())
            .or_default()
            .push((physical.into(), factory));
    }

    /// Registers an aggregate name for the shorthand rewrite.
    pub fn register_aggregate(&mut self, name: impl Into<String>) {
        self.aggregates.insert(name.into());
    }

    /// True when `name` is a registered aggregate.
    #[must_use]
    pub fn has_aggregate(&self, name: &str) -> bool {
        self.aggregates.contains(name)
    }

    /// The physical implementation names registered for a logical operator,
    /// preferred variant first.
    pub fn physical_names(&self, logical: &str) -> Result<Vec<String>, OperatorError> {
        self.physical
            .get(logical)
            .map(|v| v.iter().map(|(name, _)| name.clone()).collect())
            .ok_or_else(|| OperatorError::UnknownLogicalOperator { logical: logical.to_string() })
    }

    /// Builds a physical operator.
    pub fn create_physical(
        &self,
        logical: &str,
        physical: &str,
        params: Vec<OperatorParam>,
        schema: ArrayDesc,
    ) -> Result<Box<dyn PhysicalOperator>, OperatorError> {
        let variants = self.physical.get(logical).ok_or_else(|| {
            OperatorError::UnknownLogicalOperator { logical: logical.to_string() }
        })?;
        let factory = variants
            .iter()
            .find(|(name, _)| name == physical)
            .map(|(_, f)| f)
            .ok_or_else(|| OperatorError::UnknownPhysicalOperator {
                logical: logical.to_string(),
                physical: physical.to_string(),
            })?;
        Ok(factory(params, schema))
    }
}
