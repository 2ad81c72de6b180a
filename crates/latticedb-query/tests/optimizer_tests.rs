//! End-to-end optimizer tests over fixture operators.
//!
//! The fixtures implement just enough of the operator contract to drive
//! the passes: a scan (hash-partitioned leaf), a subarray (shifts
//! coordinates, recording the shift as a distribution mapper), a
//! collocated join, a store (requires hash partitioning), a windowed
//! operator that needs overlap repartitioning, and a file input that does
//! not produce full chunks.

use std::sync::Arc;

use latticedb_core::{ArrayDesc, AttributeDesc, DataType, DimensionDesc};
use latticedb_query::catalog::{Catalog, CatalogError, LockMode, MemoryCatalog};
use latticedb_query::expr::{FunctionLibrary, ScalarExpr};
use latticedb_query::operator::{OperatorLibrary, OperatorParam, PhysicalOperator};
use latticedb_query::plan::boundaries::PhysicalBoundaries;
use latticedb_query::plan::distribution::{
    ArrayDistribution, DistributionMapper, DistributionRequirement, PartitioningSchema,
};
use latticedb_query::plan::logical::{
    LogicalOperator, LogicalParam, LogicalPlan, LogicalQueryPlanNode, OperatorProperties,
};
use latticedb_query::plan::physical::{NodeId, PhysicalPlan};
use latticedb_query::{Optimizer, OptimizerError, PlanningContext};

// ---------------------------------------------------------------------------
// Fixture operator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum DistBehavior {
    /// Output distribution equals the first child's (hash for leaves).
    Passthrough,
    /// Output distribution is fixed.
    Fixed(ArrayDistribution),
    /// Child distribution with an extra mapper offset combined in.
    OffsetMapper(Vec<i64>),
}

#[derive(Debug, Clone)]
struct FixtureConfig {
    requirement: DistributionRequirement,
    dist: DistBehavior,
    changes_distribution: bool,
    full_chunks: bool,
    store: bool,
    repart_targets: Vec<Option<ArrayDesc>>,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            requirement: DistributionRequirement::Any,
            dist: DistBehavior::Passthrough,
            changes_distribution: false,
            full_chunks: true,
            store: false,
            repart_targets: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct FixtureOperator {
    logical: String,
    physical: String,
    schema: ArrayDesc,
    params: Vec<OperatorParam>,
    tile: bool,
    cfg: FixtureConfig,
}

impl PhysicalOperator for FixtureOperator {
    fn logical_name(&self) -> &str {
        &self.logical
    }

    fn physical_name(&self) -> &str {
        &self.physical
    }

    fn schema(&self) -> &ArrayDesc {
        &self.schema
    }

    fn set_schema(&mut self, schema: ArrayDesc) {
        self.schema = schema;
    }

    fn parameters(&self) -> &[OperatorParam] {
        &self.params
    }

    fn set_parameters(&mut self, params: Vec<OperatorParam>) {
        self.params = params;
    }

    fn tile_mode(&self) -> bool {
        self.tile
    }

    fn set_tile_mode(&mut self, tile: bool) {
        self.tile = tile;
    }

    fn distribution_requirement(&self, _child_schemas: &[ArrayDesc]) -> DistributionRequirement {
        self.cfg.requirement.clone()
    }

    fn output_distribution(
        &self,
        child_distributions: &[ArrayDistribution],
        _child_schemas: &[ArrayDesc],
    ) -> ArrayDistribution {
        match &self.cfg.dist {
            DistBehavior::Passthrough => child_distributions
                .first()
                .cloned()
                .unwrap_or_else(ArrayDistribution::hash_partitioned),
            DistBehavior::Fixed(dist) => dist.clone(),
            DistBehavior::OffsetMapper(offset) => {
                let child = child_distributions
                    .first()
                    .cloned()
                    .unwrap_or_else(ArrayDistribution::hash_partitioned);
                let mapper =
                    DistributionMapper::offset(offset.clone()).combine(child.mapper());
                ArrayDistribution::new(child.scheme()).with_mapper(Some(mapper))
            }
        }
    }

    fn changes_distribution(&self, _child_schemas: &[ArrayDesc]) -> bool {
        self.cfg.changes_distribution
    }

    fn output_full_chunks(&self, _child_schemas: &[ArrayDesc]) -> bool {
        self.cfg.full_chunks
    }

    fn output_boundaries(
        &self,
        child_boundaries: &[PhysicalBoundaries],
        _child_schemas: &[ArrayDesc],
    ) -> PhysicalBoundaries {
        child_boundaries
            .first()
            .cloned()
            .unwrap_or_else(|| PhysicalBoundaries::from_full_schema(&self.schema))
    }

    fn requires_repart(&self, _child_schemas: &[ArrayDesc]) -> Vec<Option<ArrayDesc>> {
        self.cfg.repart_targets.clone()
    }

    fn is_store(&self) -> bool {
        self.cfg.store
    }
}

fn register_fixture(lib: &mut OperatorLibrary, logical: &str, cfg: FixtureConfig) {
    let logical_name = logical.to_string();
    let physical_name = format!("physical_{logical}");
    lib.register_physical(
        logical,
        physical_name.clone(),
        Arc::new(move |params, schema| {
            Box::new(FixtureOperator {
                logical: logical_name.clone(),
                physical: physical_name.clone(),
                schema,
                params,
                tile: false,
                cfg: cfg.clone(),
            })
        }),
    );
}

// ---------------------------------------------------------------------------
// Test environment
// ---------------------------------------------------------------------------

fn array_schema(name: &str) -> ArrayDesc {
    ArrayDesc::new(name)
        .with_attribute(AttributeDesc::new("v", DataType::Double))
        .with_dimension(DimensionDesc::new("x", 0, 99, 10))
        .with_dimension(DimensionDesc::new("y", 0, 99, 10))
}

fn operator_library() -> OperatorLibrary {
    let mut lib = OperatorLibrary::with_builtins();
    register_fixture(
        &mut lib,
        "scan",
        FixtureConfig {
            dist: DistBehavior::Fixed(ArrayDistribution::hash_partitioned()),
            ..FixtureConfig::default()
        },
    );
    register_fixture(
        &mut lib,
        "scan_replicated",
        FixtureConfig {
            dist: DistBehavior::Fixed(ArrayDistribution::replicated()),
            ..FixtureConfig::default()
        },
    );
    register_fixture(
        &mut lib,
        "subarray",
        FixtureConfig {
            dist: DistBehavior::OffsetMapper(vec![5, 5]),
            changes_distribution: true,
            ..FixtureConfig::default()
        },
    );
    register_fixture(
        &mut lib,
        "shift",
        FixtureConfig {
            dist: DistBehavior::OffsetMapper(vec![2, 2]),
            changes_distribution: true,
            ..FixtureConfig::default()
        },
    );
    register_fixture(&mut lib, "filter", FixtureConfig::default());
    register_fixture(
        &mut lib,
        "join",
        FixtureConfig {
            requirement: DistributionRequirement::Collocated,
            ..FixtureConfig::default()
        },
    );
    register_fixture(
        &mut lib,
        "store",
        FixtureConfig {
            requirement: DistributionRequirement::Specific(vec![
                ArrayDistribution::hash_partitioned(),
            ]),
            store: true,
            ..FixtureConfig::default()
        },
    );
    register_fixture(
        &mut lib,
        "input",
        FixtureConfig {
            dist: DistBehavior::Fixed(ArrayDistribution::local_instance(0)),
            full_chunks: false,
            ..FixtureConfig::default()
        },
    );
    register_fixture(&mut lib, "aggregate", FixtureConfig::default());
    lib
}

fn planning_context(instances: usize) -> PlanningContext {
    let catalog = MemoryCatalog::new()
        .with_array(array_schema("a"))
        .with_array(array_schema("b"));
    PlanningContext::new(
        Arc::new(operator_library()),
        Arc::new(FunctionLibrary::with_builtins()),
        Arc::new(catalog),
    )
    .with_instance_count(instances)
}

fn leaf(name: &str, schema: ArrayDesc) -> LogicalQueryPlanNode {
    LogicalQueryPlanNode::new(LogicalOperator::new(name, schema))
}

fn unary(name: &str, schema: ArrayDesc, child: LogicalQueryPlanNode) -> LogicalQueryPlanNode {
    LogicalQueryPlanNode::new(LogicalOperator::new(name, schema)).with_child(child)
}

fn find_nodes(plan: &PhysicalPlan, logical_name: &str) -> Vec<NodeId> {
    let mut found = Vec::new();
    let mut stack: Vec<NodeId> = plan.root().into_iter().collect();
    while let Some(id) = stack.pop() {
        if plan.operator(id).logical_name() == logical_name {
            found.push(id);
        }
        stack.extend_from_slice(plan.children(id));
    }
    found
}

// ---------------------------------------------------------------------------
// Distribution insertion and collapse
// ---------------------------------------------------------------------------

#[test]
fn correct_plan_gains_no_sg_nodes() {
    let ctx = planning_context(4);
    let plan = LogicalPlan::new(unary("filter", array_schema("a"), leaf("scan", array_schema("a"))));
    let physical = Optimizer::new().optimize(&ctx, &plan).expect("optimize");
    assert_eq!(physical.count_sg_nodes(), 0);
    assert_eq!(physical.count_nodes(), 2);
}

#[test]
fn chain_of_subarrays_needs_no_redistribution() {
    let ctx = planning_context(4);
    let scan = leaf("scan", array_schema("a"));
    let inner = unary("subarray", array_schema("a"), scan);
    let outer = unary("subarray", array_schema("a"), inner);
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(outer)).expect("optimize");

    assert_eq!(physical.count_sg_nodes(), 0);
    assert_eq!(physical.count_nodes(), 3);
    let root = physical.root().expect("root");
    assert_eq!(physical.operator(root).logical_name(), "subarray");
    // The accumulated coordinate shift survives as a mapper.
    let dist = physical.distribution(root);
    assert_eq!(
        dist.mapper().map(DistributionMapper::offset_vector),
        Some(&[10, 10][..])
    );
}

#[test]
fn collocated_join_children_end_up_equal() {
    let ctx = planning_context(4);
    let join = LogicalQueryPlanNode::new(LogicalOperator::new("join", array_schema("a")))
        .with_child(leaf("scan", array_schema("a")))
        .with_child(leaf("scan", array_schema("b")));
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(join)).expect("optimize");

    let root = physical.root().expect("root");
    let children = physical.children(root).to_vec();
    assert_eq!(children.len(), 2);
    assert_eq!(physical.distribution(children[0]), physical.distribution(children[1]));
    assert_eq!(physical.count_sg_nodes(), 0);
}

#[test]
fn replicated_input_is_reduced_not_shuffled() {
    let ctx = planning_context(4);
    let join = LogicalQueryPlanNode::new(LogicalOperator::new("join", array_schema("a")))
        .with_child(leaf("scan", array_schema("a")))
        .with_child(leaf("scan_replicated", array_schema("b")));
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(join)).expect("optimize");

    assert_eq!(physical.count_sg_nodes(), 0, "replication must not be sg-ed:\n{physical}");
    let reducers = find_nodes(&physical, "reduce_distro");
    assert_eq!(reducers.len(), 1);

    let root = physical.root().expect("root");
    let children = physical.children(root).to_vec();
    assert_eq!(physical.distribution(children[0]), physical.distribution(children[1]));
    assert_eq!(
        physical.distribution(children[1]).scheme(),
        PartitioningSchema::HashPartitioned
    );
}

#[test]
fn nary_collocation_forces_hash_on_every_child() {
    let mut lib = operator_library();
    register_fixture(
        &mut lib,
        "merge",
        FixtureConfig {
            requirement: DistributionRequirement::Collocated,
            ..FixtureConfig::default()
        },
    );
    let catalog = MemoryCatalog::new().with_array(array_schema("a"));
    let ctx = PlanningContext::new(
        Arc::new(lib),
        Arc::new(FunctionLibrary::with_builtins()),
        Arc::new(catalog),
    )
    .with_instance_count(4);

    // Three-way merge over a hash-partitioned scan, a replicated scan, and
    // a coordinate-shifted subtree. The hash side stays put, the replicated
    // side reduces locally, and only the shifted side pays for a shuffle.
    let merge = LogicalQueryPlanNode::new(LogicalOperator::new("merge", array_schema("a")))
        .with_child(leaf("scan", array_schema("a")))
        .with_child(leaf("scan_replicated", array_schema("b")))
        .with_child(unary("subarray", array_schema("a"), leaf("scan", array_schema("a"))));
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(merge)).expect("optimize");

    assert_eq!(physical.count_sg_nodes(), 1, "only the shifted child scatters:\n{physical}");
    assert_eq!(find_nodes(&physical, "reduce_distro").len(), 1);

    let root = physical.root().expect("root");
    for child in physical.children(root) {
        assert_eq!(
            physical.distribution(*child),
            ArrayDistribution::hash_partitioned()
        );
    }
}

#[test]
fn local_instance_input_is_scattered() {
    let ctx = planning_context(4);
    let plan = LogicalPlan::new(unary(
        "filter",
        array_schema("a"),
        leaf("input", array_schema("a")),
    ));
    let physical = Optimizer::new().optimize(&ctx, &plan).expect("optimize");

    // The non-full-chunk pinned input must be redistributed before use.
    assert_eq!(physical.count_sg_nodes(), 1);
    let sg = find_nodes(&physical, "sg")[0];
    assert_eq!(
        physical.distribution(sg).scheme(),
        PartitioningSchema::HashPartitioned
    );
}

#[test]
fn join_over_shifted_inputs_keeps_one_sg() {
    let ctx = planning_context(4);
    // Both join inputs carry different coordinate shifts; instead of
    // scattering both sides, one side's sg is retargeted to the other's
    // offset and the second sg disappears.
    let left = unary("subarray", array_schema("a"), leaf("scan", array_schema("a")));
    let right = unary("shift", array_schema("b"), leaf("scan", array_schema("b")));
    let join = LogicalQueryPlanNode::new(LogicalOperator::new("join", array_schema("a")))
        .with_child(left)
        .with_child(right);
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(join)).expect("optimize");

    assert_eq!(physical.count_sg_nodes(), 1, "expected one sg after pushup:\n{physical}");
    let root = physical.root().expect("root");
    let join_node = find_nodes(&physical, "join")[0];
    assert_eq!(root, join_node, "the sg above the join must have collapsed");
    let children = physical.children(join_node).to_vec();
    assert_eq!(physical.distribution(children[0]), physical.distribution(children[1]));
}

// ---------------------------------------------------------------------------
// Storing sg
// ---------------------------------------------------------------------------

#[test]
fn store_over_sg_fuses_into_storing_sg() {
    let ctx = planning_context(4);
    let target = array_schema("out");
    let plan = LogicalPlan::new(unary(
        "store",
        target,
        unary("subarray", array_schema("a"), leaf("scan", array_schema("a"))),
    ));
    let physical = Optimizer::new().optimize(&ctx, &plan).expect("optimize");

    assert_eq!(physical.count_sg_nodes(), 1, "one fused sg expected:\n{physical}");
    let root = physical.root().expect("root");
    assert!(physical.is_sg_node(root));
    assert!(physical.is_storing_sg(root));
    assert!(find_nodes(&physical, "store").is_empty());
    assert_eq!(physical.operator(root).parameters()[2].array_name(), Some("out"));
    assert_eq!(
        physical.operator(physical.children(root)[0]).logical_name(),
        "subarray"
    );
}

#[test]
fn storing_sg_rewrite_skipped_on_single_instance() {
    let ctx = planning_context(1);
    let plan = LogicalPlan::new(unary(
        "store",
        array_schema("out"),
        unary("subarray", array_schema("a"), leaf("scan", array_schema("a"))),
    ));
    let physical = Optimizer::new().optimize(&ctx, &plan).expect("optimize");
    assert_eq!(find_nodes(&physical, "store").len(), 1);
}

#[test]
fn planning_locks_source_and_target_arrays() {
    let catalog = Arc::new(MemoryCatalog::new().with_array(array_schema("a")));
    let operators = Arc::new(operator_library());
    let functions = Arc::new(FunctionLibrary::with_builtins());
    let ctx = PlanningContext::new(
        Arc::clone(&operators),
        Arc::clone(&functions),
        catalog.clone(),
    )
    .with_instance_count(1)
    .with_query_id(7);

    let plan = LogicalPlan::new(unary(
        "store",
        array_schema("out"),
        leaf("scan", array_schema("a")),
    ));
    Optimizer::new().optimize(&ctx, &plan).expect("optimize");

    // The store target is write-locked for query 7; readers still share "a".
    catalog.lock_array("a", 8, LockMode::Read).expect("reads are shared");
    let err = catalog.lock_array("out", 8, LockMode::Write).expect_err("conflict");
    assert!(matches!(err, CatalogError::AlreadyLocked { holder: 7, .. }));

    // A second query colliding on the same store target fails to plan.
    let ctx2 = PlanningContext::new(operators, functions, catalog)
        .with_instance_count(1)
        .with_query_id(8);
    let err = Optimizer::new().optimize(&ctx2, &plan).expect_err("target is locked");
    assert!(matches!(
        err,
        OptimizerError::Catalog(CatalogError::AlreadyLocked { holder: 7, .. })
    ));
}

// ---------------------------------------------------------------------------
// Logical rewrites
// ---------------------------------------------------------------------------

#[test]
fn load_becomes_scatter_on_a_cluster() {
    let ctx = planning_context(4);
    let load = LogicalQueryPlanNode::new(
        LogicalOperator::new("load", array_schema("a"))
            .with_param(LogicalParam::Schema(array_schema("a"))),
    );
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(load)).expect("optimize");

    let root = physical.root().expect("root");
    assert!(physical.is_sg_node(root));
    assert_eq!(
        physical.operator(physical.children(root)[0]).logical_name(),
        "input"
    );
    assert_eq!(physical.operator(root).parameters()[2].array_name(), Some("a"));
}

#[test]
fn load_becomes_store_on_one_instance() {
    let ctx = planning_context(1);
    let load = LogicalQueryPlanNode::new(
        LogicalOperator::new("load", array_schema("a"))
            .with_param(LogicalParam::Schema(array_schema("a"))),
    );
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(load)).expect("optimize");

    // The file input does not produce full chunks, so a scatter still sits
    // between it and the store.
    let root = physical.root().expect("root");
    assert!(physical.is_store_node(root));
    let sg = physical.children(root)[0];
    assert!(physical.is_sg_node(sg));
    assert_eq!(
        physical.operator(physical.children(sg)[0]).logical_name(),
        "input"
    );
}

#[test]
fn aggregate_shorthand_expands() {
    let ctx = planning_context(4);
    let sum = LogicalQueryPlanNode::new(LogicalOperator::new("sum", array_schema("a")))
        .with_child(leaf("scan", array_schema("a")));
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(sum)).expect("optimize");

    let root = physical.root().expect("root");
    assert_eq!(physical.operator(root).logical_name(), "aggregate");
    assert!(matches!(
        &physical.operator(root).parameters()[0],
        OperatorParam::AggregateCall { function, input: Some(attr) }
            if function == "sum" && attr == "v"
    ));
}

#[test]
fn global_operator_wraps_two_phase_aggregation() {
    let mut lib = operator_library();
    register_fixture(&mut lib, "sum2", FixtureConfig::default());
    let catalog = MemoryCatalog::new().with_array(array_schema("a"));
    let ctx = PlanningContext::new(
        Arc::new(lib),
        Arc::new(FunctionLibrary::with_builtins()),
        Arc::new(catalog),
    )
    .with_instance_count(4);

    let agg = LogicalQueryPlanNode::new(
        LogicalOperator::new("aggregate", array_schema("a"))
            .with_global_operator("sum2", "physical_sum2"),
    )
    .with_child(leaf("scan", array_schema("a")));
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(agg)).expect("optimize");

    let root = physical.root().expect("root");
    assert_eq!(physical.operator(root).logical_name(), "sum2");
    assert!(physical.is_agg(root));
    assert_eq!(
        physical.operator(physical.children(root)[0]).logical_name(),
        "aggregate"
    );
}

// ---------------------------------------------------------------------------
// Repartitioning
// ---------------------------------------------------------------------------

fn overlap_schema(name: &str) -> ArrayDesc {
    ArrayDesc::new(name)
        .with_attribute(AttributeDesc::new("v", DataType::Double))
        .with_dimension(DimensionDesc::new("x", 0, 99, 10).with_overlap(1))
        .with_dimension(DimensionDesc::new("y", 0, 99, 10).with_overlap(1))
}

#[test]
fn window_operator_gets_repartitioned_input() {
    let mut lib = operator_library();
    register_fixture(
        &mut lib,
        "window",
        FixtureConfig {
            repart_targets: vec![Some(overlap_schema("a"))],
            ..FixtureConfig::default()
        },
    );
    let catalog = MemoryCatalog::new().with_array(array_schema("a"));
    let ctx = PlanningContext::new(
        Arc::new(lib),
        Arc::new(FunctionLibrary::with_builtins()),
        Arc::new(catalog),
    )
    .with_instance_count(4);

    let window = unary("window", array_schema("a"), leaf("scan", array_schema("a")));
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(window)).expect("optimize");

    let root = physical.root().expect("root");
    let child = physical.children(root)[0];
    assert!(physical.is_repart_node(child));
    assert!(physical
        .operator(child)
        .schema()
        .same_partitioning(&overlap_schema("a")));
}

#[test]
fn invalid_schema_parameter_is_rejected() {
    let ctx = planning_context(1);
    let bad = ArrayDesc::new("a")
        .with_attribute(AttributeDesc::new("v", DataType::Double))
        .with_dimension(DimensionDesc::new("x", 0, 99, 0));
    let node = LogicalQueryPlanNode::new(
        LogicalOperator::new("repart", bad.clone()).with_param(LogicalParam::Schema(bad)),
    )
    .with_child(leaf("scan", array_schema("a")));
    let err = Optimizer::new()
        .optimize(&ctx, &LogicalPlan::new(node))
        .expect_err("a zero chunk interval must not plan");
    assert!(matches!(err, OptimizerError::Schema(_)));
}

#[test]
fn manual_repart_takes_precedence() {
    let mut lib = operator_library();
    register_fixture(
        &mut lib,
        "window",
        FixtureConfig {
            repart_targets: vec![Some(overlap_schema("a"))],
            ..FixtureConfig::default()
        },
    );
    let catalog = MemoryCatalog::new().with_array(array_schema("a"));
    let ctx = PlanningContext::new(
        Arc::new(lib),
        Arc::new(FunctionLibrary::with_builtins()),
        Arc::new(catalog),
    )
    .with_instance_count(4);

    let manual_repart = LogicalQueryPlanNode::new(
        LogicalOperator::new("repart", overlap_schema("a"))
            .with_param(LogicalParam::Schema(overlap_schema("a"))),
    )
    .with_child(leaf("scan", array_schema("a")));
    let window = LogicalQueryPlanNode::new(LogicalOperator::new("window", overlap_schema("a")))
        .with_child(manual_repart);
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(window)).expect("optimize");

    assert_eq!(find_nodes(&physical, "repart").len(), 1);
}

// ---------------------------------------------------------------------------
// Tile mode and materialization
// ---------------------------------------------------------------------------

fn tile_context() -> PlanningContext {
    let catalog = MemoryCatalog::new().with_array(array_schema("a"));
    PlanningContext::new(
        Arc::new(operator_library()),
        Arc::new(FunctionLibrary::with_builtins()),
        Arc::new(catalog),
    )
    .with_instance_count(1)
    .with_tile_size(64)
}

fn tile_op(name: &str, schema: ArrayDesc) -> LogicalOperator {
    LogicalOperator::new(name, schema)
        .with_properties(OperatorProperties { ddl: false, tile: true })
}

#[test]
fn tile_filter_compiles_parameter_in_tile_mode() {
    let ctx = tile_context();
    let filter_op = tile_op("filter", array_schema("a"))
        .with_param(LogicalParam::Expression {
            expr: ScalarExpr::attribute("v").gt(ScalarExpr::double(1.0)),
            expected_type: DataType::Bool,
            constant: false,
        })
        .with_tile_params(vec![0]);
    let scan = LogicalQueryPlanNode::new(tile_op("scan", array_schema("a")));
    let plan =
        LogicalPlan::new(LogicalQueryPlanNode::new(filter_op).with_child(scan));
    let physical = Optimizer::new().optimize(&ctx, &plan).expect("optimize");

    let root = physical.root().expect("root");
    assert!(physical.node_tile_mode(root));
    match &physical.operator(root).parameters()[0] {
        OperatorParam::Expression { expression, .. } => {
            assert!(expression.supports_tile_mode());
        }
        other => panic!("unexpected parameter: {other:?}"),
    }
}

#[test]
fn tile_incapable_parameter_forces_scalar_node() {
    let ctx = tile_context();
    // strlen has no tile implementation, so the whole parameter list
    // recompiles with tile mode off.
    let filter_op = tile_op("filter", array_schema("a"))
        .with_param(LogicalParam::Expression {
            expr: ScalarExpr::call("strlen", vec![ScalarExpr::string("abc")])
                .gt(ScalarExpr::integer(0)),
            expected_type: DataType::Bool,
            constant: true,
        })
        .with_tile_params(vec![0]);
    let scan = LogicalQueryPlanNode::new(tile_op("scan", array_schema("a")));
    let plan =
        LogicalPlan::new(LogicalQueryPlanNode::new(filter_op).with_child(scan));
    let physical = Optimizer::new().optimize(&ctx, &plan).expect("optimize");

    let root = physical.root().expect("root");
    assert!(!physical.node_tile_mode(root));
}

#[test]
fn materializer_inserted_at_tile_boundary() {
    let ctx = tile_context();
    // scan and filter run tiled; store does not, so the filter-store edge
    // crosses a tile boundary.
    let scan = LogicalQueryPlanNode::new(tile_op("scan", array_schema("a")));
    let filter = LogicalQueryPlanNode::new(tile_op("filter", array_schema("a"))).with_child(scan);
    let store = LogicalQueryPlanNode::new(
        LogicalOperator::new("store", array_schema("out")),
    )
    .with_child(filter);
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(store)).expect("optimize");

    let materializers = find_nodes(&physical, "materialize");
    assert_eq!(materializers.len(), 1, "one materializer expected:\n{physical}");
    let m = materializers[0];
    assert_eq!(physical.operator(physical.children(m)[0]).logical_name(), "filter");
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

#[test]
fn ddl_plans_skip_all_passes() {
    let mut lib = operator_library();
    register_fixture(
        &mut lib,
        "create_array",
        FixtureConfig {
            dist: DistBehavior::Fixed(ArrayDistribution::local_instance(0)),
            full_chunks: false,
            ..FixtureConfig::default()
        },
    );
    let catalog = MemoryCatalog::new().with_array(array_schema("a"));
    let ctx = PlanningContext::new(
        Arc::new(lib),
        Arc::new(FunctionLibrary::with_builtins()),
        Arc::new(catalog),
    )
    .with_instance_count(4);

    let ddl = LogicalQueryPlanNode::new(
        LogicalOperator::new("create_array", array_schema("a"))
            .with_properties(OperatorProperties { ddl: true, tile: false }),
    );
    let physical = Optimizer::new().optimize(&ctx, &LogicalPlan::new(ddl)).expect("optimize");
    assert!(physical.is_ddl());
    assert_eq!(physical.count_nodes(), 1);
    assert_eq!(physical.count_sg_nodes(), 0);
}
