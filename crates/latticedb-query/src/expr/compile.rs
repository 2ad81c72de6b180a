//! One-pass compilation of a scalar AST into a flat slot/function program.
//!
//! Compilation assigns every sub-expression a value slot and appends one
//! [`CompiledFunction`] per call. Arguments compile right-to-left so that
//! walking the function list in reverse append order evaluates left-to-right
//! while respecting data dependencies. Slot 0 always receives the final
//! result.
//!
//! Short-circuit markers are recorded for `iif`, `and`, and `or` in scalar
//! mode only; tile-mode evaluation always runs every operand because the
//! vectorized implementations branch per cell internally.

use std::fmt;

use latticedb_core::{ArrayDesc, DataType, Value};
use serde::{Deserialize, Serialize};

use super::ast::{AttributeRef, FunctionCallExpr, ScalarExpr};
use super::context::ExpressionContext;
use super::error::{ExpressionError, FunctionError};
use super::functions::{render_signature, FunctionImpl, FunctionLibrary};
use super::parse::parse_scalar_expression;

/// What kind of runtime value a binding supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindKind {
    /// An attribute value of an input array cell.
    Attribute,
    /// A dimension coordinate of an input array cell.
    Coordinate,
    /// An externally supplied named variable.
    Variable,
}

/// Marker for a binding resolved against the output schema rather than an
/// input schema.
pub const OUTPUT_SCHEMA: usize = usize::MAX;

/// A runtime value the caller must supply before evaluation.
///
/// Equality ignores the seed value: two bindings are the same if they name
/// the same attribute/coordinate/variable of the same input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindInfo {
    /// What the binding refers to.
    pub kind: BindKind,
    /// Input schema index, variable index, or [`OUTPUT_SCHEMA`].
    pub input_no: usize,
    /// Attribute or dimension index within the schema.
    pub resolved_id: usize,
    /// Static type of the bound value.
    pub data_type: DataType,
    /// Seed value used to initialize fresh contexts.
    pub value: Value,
}

impl PartialEq for BindInfo {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.input_no == other.input_no
            && self.resolved_id == other.resolved_id
            && self.data_type == other.data_type
    }
}

/// A registered free variable for the textual compile path.
#[derive(Debug, Clone)]
struct VarInfo {
    name: String,
    data_type: DataType,
}

/// Static properties of one value slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ArgProp {
    pub data_type: DataType,
    /// The slot holds a compile-time constant.
    pub is_const: bool,
    /// The slot is produced by a deterministic function of constants.
    pub is_constant_function: bool,
}

impl Default for ArgProp {
    fn default() -> Self {
        Self { data_type: DataType::Void, is_const: false, is_constant_function: false }
    }
}

/// One compiled call: a function (or converter) over a contiguous argument
/// slot range, writing into a result slot.
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct CompiledFunction {
    /// Resolved implementation; absent after deserialization until
    /// [`Expression::resolve_functions`] runs.
    #[serde(skip)]
    pub implementation: Option<FunctionImpl>,
    /// Function name; empty for a type converter.
    pub name: String,
    /// Declared input types. For a converter: `[from, to]`.
    pub input_types: Vec<DataType>,
    /// Number of argument slots consumed.
    pub arg_count: usize,
    /// First argument slot index.
    pub arg_index: usize,
    /// Result slot index; always less than `arg_index`.
    pub result_index: usize,
    /// Short-circuit condition slot, if any.
    pub skip_index: Option<usize>,
    /// Skip the call when the condition slot equals this value.
    pub skip_value: bool,
    /// Per-call scratch size in bytes.
    pub state_size: usize,
}

impl CompiledFunction {
    fn display_name(&self) -> String {
        if self.name.is_empty() {
            "convert".to_string()
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("name", &self.display_name())
            .field("arg_index", &self.arg_index)
            .field("arg_count", &self.arg_count)
            .field("result_index", &self.result_index)
            .field("skip_index", &self.skip_index)
            .field("skip_value", &self.skip_value)
            .finish_non_exhaustive()
    }
}

/// A compiled scalar expression.
///
/// Immutable once compiled; concurrent evaluation is safe as long as each
/// thread uses its own [`ExpressionContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    result_type: DataType,
    #[serde(skip)]
    input_schemas: Vec<ArrayDesc>,
    #[serde(skip)]
    output_schema: Option<ArrayDesc>,
    #[serde(skip)]
    variables: Vec<VarInfo>,
    bindings: Vec<BindInfo>,
    /// Per binding: every slot index the binding feeds.
    consumers: Vec<Vec<usize>>,
    nullable: bool,
    tile_mode: bool,
    compiled: bool,
    functions: Vec<CompiledFunction>,
    slots: Vec<Value>,
    props: Vec<ArgProp>,
}

impl Expression {
    fn empty(tile: bool) -> Self {
        Self {
            result_type: DataType::Void,
            input_schemas: Vec::new(),
            output_schema: None,
            variables: Vec::new(),
            bindings: Vec::new(),
            consumers: Vec::new(),
            nullable: false,
            tile_mode: tile,
            compiled: false,
            functions: Vec::new(),
            slots: vec![Value::Null],
            props: vec![ArgProp::default()],
        }
    }

    /// Compiles an AST against the given input schemas.
    ///
    /// `expected` forces a final result type, inserting a conversion (or
    /// failing with [`ExpressionError::TypeConversion`]) when the compiled
    /// type differs. When `tile` is requested and compilation fails with a
    /// missing overload or a type-conversion error, compilation silently
    /// retries in scalar mode; any other failure propagates.
    pub fn compile(
        library: &FunctionLibrary,
        expr: &ScalarExpr,
        tile: bool,
        expected: Option<DataType>,
        input_schemas: &[ArrayDesc],
        output_schema: Option<&ArrayDesc>,
    ) -> Result<Self, ExpressionError> {
        match Self::compile_impl(library, expr, tile, expected, input_schemas, output_schema, &[]) {
            Err(err) if tile && err.is_tile_retryable() => Self::compile_impl(
                library,
                expr,
                false,
                expected,
                input_schemas,
                output_schema,
                &[],
            ),
            result => result,
        }
    }

    /// Compiles an AST whose references resolve against named free
    /// variables instead of array schemas.
    pub fn compile_with_variables(
        library: &FunctionLibrary,
        expr: &ScalarExpr,
        tile: bool,
        expected: Option<DataType>,
        variables: &[(String, DataType)],
    ) -> Result<Self, ExpressionError> {
        match Self::compile_impl(library, expr, tile, expected, &[], None, variables) {
            Err(err) if tile && err.is_tile_retryable() => {
                Self::compile_impl(library, expr, false, expected, &[], None, variables)
            }
            result => result,
        }
    }

    /// Compiles a textual expression with named free variables.
    pub fn parse(
        library: &FunctionLibrary,
        source: &str,
        variables: &[(String, DataType)],
        expected: Option<DataType>,
    ) -> Result<Self, ExpressionError> {
        let ast = parse_scalar_expression(source)?;
        Self::compile_with_variables(library, &ast, false, expected, variables)
    }

    /// Compiles a standalone binary function over two bound operands.
    ///
    /// Bindings 0 and 1 feed the left and right operand; useful for
    /// operators that need `a <op> b` without building an AST.
    pub fn compile_binary(
        library: &FunctionLibrary,
        name: &str,
        tile: bool,
        left: DataType,
        right: DataType,
        expected: Option<DataType>,
    ) -> Result<Self, ExpressionError> {
        let mut e = Self::empty(tile);
        let function_index = 0;
        e.functions.push(CompiledFunction {
            implementation: None,
            name: name.to_lowercase(),
            input_types: Vec::new(),
            arg_count: 2,
            arg_index: 1,
            result_index: 0,
            skip_index: None,
            skip_value: false,
            state_size: 0,
        });
        e.props.resize(3, ArgProp::default());
        e.props[1].data_type = left;
        e.props[2].data_type = right;
        for (i, ty) in [(1usize, left), (2usize, right)] {
            e.bindings.push(BindInfo {
                kind: BindKind::Variable,
                input_no: i - 1,
                resolved_id: 0,
                data_type: ty,
                value: Value::zero_of(ty),
            });
            e.consumers.push(vec![i]);
        }

        let arg_types = [left, right];
        let m = library.find_function(&e.functions[0].name, &arg_types, tile).ok_or_else(
            || ExpressionError::FunctionNotFound {
                signature: render_signature(name, &arg_types),
                location: None,
            },
        )?;
        {
            let f = &mut e.functions[function_index];
            f.implementation = Some(m.implementation.clone());
            f.input_types = m.description.input_types().to_vec();
            f.state_size = m.description.state_size();
        }
        if m.swap_inputs {
            e.swap_arguments(1);
        }
        for (i, conv) in m.converters.iter().enumerate() {
            if let Some(c) = conv {
                e.insert_converter(
                    m.description.input_types()[i],
                    c.implementation.clone(),
                    1 + i,
                    Some(function_index),
                )?;
            }
        }
        e.props[0].data_type = m.description.output_type();
        e.result_type = m.description.output_type();

        if let Some(want) = expected {
            if want != e.result_type {
                let conv = library.find_converter(e.result_type, want, true).ok_or(
                    ExpressionError::TypeConversion { from: e.result_type, to: want },
                )?;
                e.insert_converter(want, conv.implementation, 0, None)?;
                e.result_type = want;
            }
        }
        e.finalize_slots();
        e.compiled = true;
        Ok(e)
    }

    /// Wraps a single constant value as a compiled expression.
    #[must_use]
    pub fn constant(tile: bool, data_type: DataType, value: Value) -> Self {
        let mut e = Self::empty(tile);
        e.nullable = value.is_null();
        e.slots[0] = value;
        e.props[0] =
            ArgProp { data_type, is_const: true, is_constant_function: false };
        e.result_type = data_type;
        e.compiled = true;
        e
    }

    fn compile_impl(
        library: &FunctionLibrary,
        expr: &ScalarExpr,
        tile: bool,
        expected: Option<DataType>,
        input_schemas: &[ArrayDesc],
        output_schema: Option<&ArrayDesc>,
        variables: &[(String, DataType)],
    ) -> Result<Self, ExpressionError> {
        let mut e = Self::empty(tile);
        e.input_schemas = input_schemas.to_vec();
        e.output_schema = output_schema.cloned();
        for (i, (name, ty)) in variables.iter().enumerate() {
            e.variables.push(VarInfo { name: name.clone(), data_type: *ty });
            e.bindings.push(BindInfo {
                kind: BindKind::Variable,
                input_no: i,
                resolved_id: 0,
                data_type: *ty,
                value: Value::zero_of(*ty),
            });
            e.consumers.push(Vec::new());
        }

        let root = e.internal_compile(library, expr, tile, 0, None)?;
        e.result_type = root.data_type;

        if let Some(want) = expected {
            if want != e.result_type {
                let conv = library.find_converter(e.result_type, want, true).ok_or(
                    ExpressionError::TypeConversion { from: e.result_type, to: want },
                )?;
                e.insert_converter(want, conv.implementation, 0, None)?;
                e.result_type = want;
            }
        }

        e.finalize_slots();
        e.compiled = true;
        Ok(e)
    }

    fn internal_compile(
        &mut self,
        library: &FunctionLibrary,
        expr: &ScalarExpr,
        tile: bool,
        result_index: usize,
        skip: Option<(usize, bool)>,
    ) -> Result<ArgProp, ExpressionError> {
        match expr {
            ScalarExpr::Reference(r) => {
                let bind = self.resolve_reference(r)?;
                match self.bindings.iter().position(|b| *b == bind) {
                    Some(i) => self.consumers[i].push(result_index),
                    None => {
                        self.bindings.push(bind.clone());
                        self.consumers.push(vec![result_index]);
                    }
                }
                self.props[result_index].data_type = bind.data_type;
            }
            ScalarExpr::Constant(c) => {
                self.props[result_index].data_type = c.data_type;
                self.props[result_index].is_const = true;
                if self.slots.len() < self.props.len() {
                    self.slots.resize(self.props.len(), Value::Null);
                }
                self.slots[result_index] = c.value.clone();
                self.nullable |= c.value.is_null();
            }
            ScalarExpr::Call(call) => {
                self.compile_call(library, call, tile, result_index, skip)?;
            }
        }
        Ok(self.props[result_index].clone())
    }

    fn compile_call(
        &mut self,
        library: &FunctionLibrary,
        call: &FunctionCallExpr,
        tile: bool,
        result_index: usize,
        skip: Option<(usize, bool)>,
    ) -> Result<(), ExpressionError> {
        let nargs = call.args.len();
        let arg_index = self.props.len();
        let function_index = self.functions.len();
        self.functions.push(CompiledFunction {
            implementation: None,
            name: call.name.clone(),
            input_types: Vec::new(),
            arg_count: nargs,
            arg_index,
            result_index,
            skip_index: skip.map(|s| s.0),
            skip_value: skip.is_some_and(|s| s.1),
            state_size: 0,
        });
        self.props.resize(arg_index + nargs, ArgProp::default());

        // Arguments compile right-to-left so reverse-order evaluation runs
        // them left-to-right, which the short-circuit slots depend on.
        let mut arg_types = vec![DataType::Void; nargs];
        let mut args_const = true;
        for i in (0..nargs).rev() {
            let child_skip = if tile {
                skip
            } else {
                match (call.name.as_str(), i) {
                    ("iif", 2) => Some((arg_index, true)),
                    ("iif", 1) => Some((arg_index, false)),
                    ("or", 1) => Some((arg_index, true)),
                    ("and", 1) => Some((arg_index, false)),
                    _ => skip,
                }
            };
            let prop =
                self.internal_compile(library, &call.args[i], tile, arg_index + i, child_skip)?;
            arg_types[i] = prop.data_type;
            args_const &= prop.is_const || prop.is_constant_function;
        }

        let m = library.find_function(&call.name, &arg_types, tile).ok_or_else(|| {
            ExpressionError::FunctionNotFound {
                signature: render_signature(&call.name, &arg_types),
                location: call.location,
            }
        })?;
        {
            let f = &mut self.functions[function_index];
            f.implementation = Some(m.implementation.clone());
            f.input_types = m.description.input_types().to_vec();
            f.state_size = m.description.state_size();
        }
        if m.swap_inputs {
            self.swap_arguments(arg_index);
        }
        for (i, conv) in m.converters.iter().enumerate() {
            if let Some(c) = conv {
                self.insert_converter(
                    m.description.input_types()[i],
                    c.implementation.clone(),
                    arg_index + i,
                    Some(function_index),
                )?;
            }
        }
        self.props[result_index].data_type = m.description.output_type();
        self.props[result_index].is_constant_function =
            m.description.is_deterministic() && args_const;
        Ok(())
    }

    fn resolve_reference(&mut self, r: &AttributeRef) -> Result<BindInfo, ExpressionError> {
        if r.array.is_none() {
            if let Some(i) = self.variables.iter().position(|v| v.name == r.name) {
                return Ok(self.bindings[i].clone());
            }
        }

        let mut found: Option<(BindInfo, bool)> = None;
        for (input_no, schema) in self.input_schemas.iter().enumerate() {
            if let Some((bind, nullable)) = resolve_in_schema(schema, r, input_no) {
                found = Some((bind, nullable));
                break;
            }
        }
        if found.is_none() {
            if let Some(schema) = &self.output_schema {
                found = resolve_in_schema(schema, r, OUTPUT_SCHEMA);
            }
        }

        match found {
            Some((bind, nullable)) => {
                self.nullable |= nullable;
                Ok(bind)
            }
            None => Err(ExpressionError::ReferenceNotFound {
                reference: r.qualified_name(),
                location: r.location,
            }),
        }
    }

    /// Exchanges the contents of slots `first` and `first + 1`, retargeting
    /// whatever produces into them (a compiled function or a binding).
    fn swap_arguments(&mut self, first: usize) {
        let second = first + 1;
        if self.slots.len() < self.props.len() {
            self.slots.resize(self.props.len(), Value::Null);
        }

        let producer1 = self.functions.iter().position(|f| f.result_index == first);
        let producer2 = self.functions.iter().position(|f| f.result_index == second);
        let binding1 = if producer1.is_none() { self.find_consumer(first) } else { None };
        let binding2 = if producer2.is_none() { self.find_consumer(second) } else { None };

        if let Some(i) = producer1 {
            self.functions[i].result_index = second;
        }
        if let Some(i) = producer2 {
            self.functions[i].result_index = first;
        }
        if let Some((b, c)) = binding1 {
            self.consumers[b][c] = second;
        }
        if let Some((b, c)) = binding2 {
            self.consumers[b][c] = first;
        }

        self.props.swap(first, second);
        self.slots.swap(first, second);
    }

    fn find_consumer(&self, slot: usize) -> Option<(usize, usize)> {
        for (b, list) in self.consumers.iter().enumerate() {
            if let Some(c) = list.iter().position(|&x| x == slot) {
                return Some((b, c));
            }
        }
        None
    }

    /// Splices a converter so that whatever produced into `result_index`
    /// now produces into a fresh slot the converter reads from. Constants
    /// convert eagerly in place.
    fn insert_converter(
        &mut self,
        new_type: DataType,
        converter: FunctionImpl,
        result_index: usize,
        after_function: Option<usize>,
    ) -> Result<(), ExpressionError> {
        let search_start = after_function.unwrap_or(0);
        let insert_pos = after_function.map_or(0, |i| i + 1);

        // A compiled function produces into the slot: redirect its output.
        if let Some(p) = (search_start..self.functions.len())
            .find(|&i| self.functions[i].result_index == result_index)
        {
            let old_prop = self.props[result_index].clone();
            let new_arg_index = self.props.len();
            let cf = CompiledFunction {
                implementation: Some(converter),
                name: String::new(),
                input_types: vec![old_prop.data_type, new_type],
                arg_count: 1,
                arg_index: new_arg_index,
                result_index,
                skip_index: self.functions[p].skip_index,
                skip_value: self.functions[p].skip_value,
                state_size: 0,
            };
            self.props.push(old_prop);
            self.props[result_index].data_type = new_type;
            self.functions[p].result_index = new_arg_index;
            self.functions.insert(insert_pos, cf);
            return Ok(());
        }

        // A binding feeds the slot: repoint that consumer entry.
        if let Some((b, c)) = self.find_consumer(result_index) {
            let old_prop = self.props[result_index].clone();
            let new_arg_index = self.props.len();
            let cf = CompiledFunction {
                implementation: Some(converter),
                name: String::new(),
                input_types: vec![old_prop.data_type, new_type],
                arg_count: 1,
                arg_index: new_arg_index,
                result_index,
                skip_index: None,
                skip_value: false,
                state_size: 0,
            };
            self.props.push(old_prop);
            self.props[result_index].data_type = new_type;
            self.consumers[b][c] = new_arg_index;
            self.functions.insert(insert_pos, cf);
            return Ok(());
        }

        // A literal constant: convert once, now.
        if self.slots.len() < self.props.len() {
            self.slots.resize(self.props.len(), Value::Null);
        }
        let from = self.props[result_index].data_type;
        let input = [self.slots[result_index].clone()];
        let mut no_state: [u8; 0] = [];
        let value = converter(&input, &mut no_state)
            .map_err(|_| ExpressionError::TypeConversion { from, to: new_type })?;
        self.slots[result_index] = value;
        self.props[result_index].data_type = new_type;
        Ok(())
    }

    fn finalize_slots(&mut self) {
        self.slots.resize(self.props.len(), Value::Null);
        for i in 0..self.props.len() {
            if !self.props[i].is_const {
                self.slots[i] = Value::zero_of(self.props[i].data_type);
            }
        }
    }

    /// Creates a fresh evaluation context for this expression.
    #[must_use]
    pub fn create_context(&self) -> ExpressionContext {
        ExpressionContext::new(self)
    }

    /// Evaluates the compiled program against the context's current
    /// bindings, returning a reference to the slot-0 result.
    ///
    /// Functions carrying a short-circuit marker are skipped when the
    /// condition slot matches the marker; a null condition reads as false.
    pub fn evaluate<'a>(
        &self,
        ctx: &'a mut ExpressionContext,
    ) -> Result<&'a Value, ExpressionError> {
        if !self.compiled {
            return Err(ExpressionError::Unresolved);
        }
        ctx.sync_bindings(self);

        for i in (0..self.functions.len()).rev() {
            let f = &self.functions[i];
            if let Some(skip_idx) = f.skip_index {
                if ctx.slots[skip_idx].as_bool().unwrap_or(false) == f.skip_value {
                    continue;
                }
            }
            let implementation =
                f.implementation.as_ref().ok_or(ExpressionError::Unresolved)?;
            debug_assert!(f.result_index < f.arg_index);
            let (head, tail) = ctx.slots.split_at_mut(f.arg_index);
            let args = &tail[..f.arg_count];
            let out = implementation(args, &mut ctx.state[i]).map_err(|err| match err {
                FunctionError::Message(message) => ExpressionError::FunctionFailed {
                    function: f.display_name(),
                    message,
                },
                FunctionError::Unknown => {
                    ExpressionError::FunctionFailedUnknown { function: f.display_name() }
                }
            })?;
            head[f.result_index] = out;
        }
        Ok(&ctx.slots[0])
    }

    /// Evaluates an expression with no runtime bindings.
    pub fn evaluate_constant(&self) -> Result<Value, ExpressionError> {
        let mut ctx = self.create_context();
        self.evaluate(&mut ctx).cloned()
    }

    /// The expression's result type.
    #[must_use]
    pub const fn result_type(&self) -> DataType {
        self.result_type
    }

    /// True when the result is a compile-time constant or a deterministic
    /// function of constants.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.props
            .first()
            .map_or(false, |p| p.is_const || p.is_constant_function)
    }

    /// True when the result may be null.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// True when the expression compiled for tile-mode evaluation.
    #[must_use]
    pub const fn supports_tile_mode(&self) -> bool {
        self.tile_mode
    }

    /// The runtime bindings the caller must supply, in context order.
    #[must_use]
    pub fn bindings(&self) -> &[BindInfo] {
        &self.bindings
    }

    /// Re-resolves function implementations against a library after
    /// deserialization.
    pub fn resolve_functions(&mut self, library: &FunctionLibrary) -> Result<(), ExpressionError> {
        for f in &mut self.functions {
            if f.name.is_empty() {
                let conv = library
                    .find_converter(f.input_types[0], f.input_types[1], true)
                    .ok_or(ExpressionError::TypeConversion {
                        from: f.input_types[0],
                        to: f.input_types[1],
                    })?;
                f.implementation = Some(conv.implementation);
            } else {
                let m = library
                    .find_function(&f.name, &f.input_types, self.tile_mode)
                    .ok_or_else(|| ExpressionError::FunctionNotFound {
                        signature: render_signature(&f.name, &f.input_types),
                        location: None,
                    })?;
                f.implementation = Some(m.implementation);
                f.state_size = m.description.state_size();
            }
        }
        Ok(())
    }

    pub(crate) fn slot_values(&self) -> &[Value] {
        &self.slots
    }

    pub(crate) fn slot_props(&self) -> &[ArgProp] {
        &self.props
    }

    pub(crate) fn consumer_lists(&self) -> &[Vec<usize>] {
        &self.consumers
    }

    pub(crate) fn compiled_functions(&self) -> &[CompiledFunction] {
        &self.functions
    }

    pub(crate) fn binding_seed(&self, i: usize) -> Value {
        self.consumers[i]
            .first()
            .map_or_else(|| self.bindings[i].value.clone(), |&s| self.slots[s].clone())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[expression] result {} bindings {} functions {}",
            self.result_type,
            self.bindings.len(),
            self.functions.len()
        )
    }
}

fn resolve_in_schema(
    schema: &ArrayDesc,
    r: &AttributeRef,
    input_no: usize,
) -> Option<(BindInfo, bool)> {
    if let Some(qualifier) = &r.array {
        if qualifier != &schema.name {
            return None;
        }
    }
    if let Some(i) = schema.attribute_index(&r.name) {
        let attr = &schema.attributes()[i];
        return Some((
            BindInfo {
                kind: BindKind::Attribute,
                input_no,
                resolved_id: i,
                data_type: attr.data_type,
                value: Value::zero_of(attr.data_type),
            },
            attr.nullable,
        ));
    }
    if let Some(i) = schema.dimension_index(&r.name) {
        return Some((
            BindInfo {
                kind: BindKind::Coordinate,
                input_no,
                resolved_id: i,
                data_type: DataType::Int64,
                value: Value::Int64(0),
            },
            false,
        ));
    }
    None
}

/// Compiles and evaluates an AST that needs no runtime bindings.
pub fn evaluate_ast(
    library: &FunctionLibrary,
    expr: &ScalarExpr,
    expected: Option<DataType>,
) -> Result<Value, ExpressionError> {
    Expression::compile(library, expr, false, expected, &[], None)?.evaluate_constant()
}

/// Infers the result type of an AST against input schemas.
pub fn expression_type(
    library: &FunctionLibrary,
    expr: &ScalarExpr,
    input_schemas: &[ArrayDesc],
) -> Result<DataType, ExpressionError> {
    Expression::compile(library, expr, false, None, input_schemas, None)
        .map(|e| e.result_type())
}

#[cfg(test)]
mod tests {
    use latticedb_core::{AttributeDesc, DimensionDesc};

    use super::*;
    use crate::expr::FunctionDescription;
    use std::sync::Arc;

    fn lib() -> FunctionLibrary {
        FunctionLibrary::with_builtins()
    }

    fn schema() -> ArrayDesc {
        ArrayDesc::new("a")
            .with_attribute(AttributeDesc::new("v", DataType::Int64))
            .with_attribute(AttributeDesc::new("w", DataType::Double).nullable())
            .with_dimension(DimensionDesc::new("x", 0, 99, 10))
    }

    #[test]
    fn result_is_slot_zero_with_declared_type() {
        let lib = lib();
        let ast = ScalarExpr::integer(1).add(ScalarExpr::integer(2)).mul(ScalarExpr::integer(10));
        let e = Expression::compile(&lib, &ast, false, None, &[], None).expect("compile");
        assert_eq!(e.result_type(), DataType::Int64);
        let v = e.evaluate_constant().expect("evaluate");
        assert_eq!(v.data_type(), e.result_type());
        assert_eq!(v.as_int64(), Some(30));
    }

    #[test]
    fn int64_addition_promotes_literals() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::integer(1).add(ScalarExpr::integer(1)),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        assert_eq!(e.result_type(), DataType::Int64);
        assert_eq!(e.evaluate_constant().expect("evaluate").as_int64(), Some(2));
    }

    #[test]
    fn mixed_width_integers_promote_to_wider() {
        let lib = lib();
        let ast = ScalarExpr::typed_constant(Value::Int8(8), DataType::Int8)
            .add(ScalarExpr::typed_constant(Value::Int16(-8), DataType::Int16));
        let e = Expression::compile(&lib, &ast, false, None, &[], None).expect("compile");
        assert_eq!(e.result_type(), DataType::Int16);
        assert_eq!(e.evaluate_constant().expect("evaluate"), Value::Int16(0));
    }

    #[test]
    fn null_propagates_through_arithmetic() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::integer(5).add(ScalarExpr::null()),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        assert_eq!(e.result_type(), DataType::Int64);
        assert!(e.is_nullable());
        assert!(e.evaluate_constant().expect("evaluate").is_null());
    }

    #[test]
    fn null_plus_string_is_null_string() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::null().add(ScalarExpr::string("xyz")),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        assert_eq!(e.result_type(), DataType::String);
        assert!(e.evaluate_constant().expect("evaluate").is_null());
    }

    #[test]
    fn is_null_of_null_literal() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::call("is_null", vec![ScalarExpr::null()]),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        assert_eq!(e.evaluate_constant().expect("evaluate"), Value::Bool(true));
    }

    #[test]
    fn iif_skips_untaken_branch_in_scalar_mode() {
        let lib = lib();
        // iif(1 > 0, 5, 1 / 0) must not evaluate the division.
        let ast = ScalarExpr::call(
            "iif",
            vec![
                ScalarExpr::integer(1).gt(ScalarExpr::integer(0)),
                ScalarExpr::integer(5),
                ScalarExpr::integer(1).div(ScalarExpr::integer(0)),
            ],
        );
        let e = Expression::compile(&lib, &ast, false, None, &[], None).expect("compile");
        assert_eq!(e.evaluate_constant().expect("evaluate").as_int64(), Some(5));
    }

    #[test]
    fn or_short_circuits_left_true() {
        let lib = lib();
        let ast = ScalarExpr::constant(true)
            .or(ScalarExpr::integer(1).div(ScalarExpr::integer(0)).gt(ScalarExpr::integer(0)));
        let e = Expression::compile(&lib, &ast, false, None, &[], None).expect("compile");
        assert_eq!(e.evaluate_constant().expect("evaluate"), Value::Bool(true));
    }

    #[test]
    fn and_short_circuits_left_false() {
        let lib = lib();
        let ast = ScalarExpr::constant(false)
            .and(ScalarExpr::integer(1).div(ScalarExpr::integer(0)).gt(ScalarExpr::integer(0)));
        let e = Expression::compile(&lib, &ast, false, None, &[], None).expect("compile");
        assert_eq!(e.evaluate_constant().expect("evaluate"), Value::Bool(false));
    }

    #[test]
    fn tile_mode_evaluates_both_branches() {
        let lib = lib();
        let schema = schema();
        // iif(v > 0, v, v / 0): scalar mode short-circuits per row; tile
        // mode computes the whole division tile and must fail.
        let ast = ScalarExpr::call(
            "iif",
            vec![
                ScalarExpr::attribute("v").gt(ScalarExpr::integer(0)),
                ScalarExpr::attribute("v"),
                ScalarExpr::attribute("v").div(ScalarExpr::integer(0)),
            ],
        );

        let scalar = Expression::compile(&lib, &ast, false, None, &[schema.clone()], None)
            .expect("scalar compile");
        let mut ctx = scalar.create_context();
        ctx.set(0, Value::Int64(7));
        assert_eq!(scalar.evaluate(&mut ctx).expect("scalar eval").as_int64(), Some(7));

        let tiled =
            Expression::compile(&lib, &ast, true, None, &[schema], None).expect("tile compile");
        assert!(tiled.supports_tile_mode());
        let mut ctx = tiled.create_context();
        ctx.set(0, Value::Tile(vec![Value::Int64(7), Value::Int64(9)]));
        let err = tiled.evaluate(&mut ctx).expect_err("tile division must run");
        assert!(matches!(err, ExpressionError::FunctionFailed { .. }));
    }

    #[test]
    fn tile_fallback_only_for_missing_overloads() {
        let lib = lib();
        // strlen has no tile implementation: a tile-mode request silently
        // falls back to scalar compilation.
        let ast = ScalarExpr::call("strlen", vec![ScalarExpr::string("abc")]);
        let e = Expression::compile(&lib, &ast, true, None, &[], None).expect("compile");
        assert!(!e.supports_tile_mode());
        assert_eq!(e.evaluate_constant().expect("evaluate").as_int64(), Some(3));

        // An unknown function is not retried.
        let ast = ScalarExpr::call("no_such_fn", vec![ScalarExpr::integer(1)]);
        let err = Expression::compile(&lib, &ast, true, None, &[], None).expect_err("fail");
        assert!(matches!(err, ExpressionError::FunctionNotFound { .. }));
    }

    #[test]
    fn attribute_bindings_shared_across_uses() {
        let lib = lib();
        let schema = schema();
        // v + v: one binding feeding two slots.
        let ast = ScalarExpr::attribute("v").add(ScalarExpr::attribute("v"));
        let e = Expression::compile(&lib, &ast, false, None, &[schema], None).expect("compile");
        assert_eq!(e.bindings().len(), 1);
        let mut ctx = e.create_context();
        ctx.set(0, Value::Int64(21));
        assert_eq!(e.evaluate(&mut ctx).expect("eval").as_int64(), Some(42));
        ctx.set(0, Value::Int64(-3));
        assert_eq!(e.evaluate(&mut ctx).expect("eval").as_int64(), Some(-6));
    }

    #[test]
    fn dimension_reference_binds_coordinate() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::attribute("x").add(ScalarExpr::integer(1)),
            false,
            None,
            &[schema()],
            None,
        )
        .expect("compile");
        assert_eq!(e.bindings().len(), 1);
        assert_eq!(e.bindings()[0].kind, BindKind::Coordinate);
        let mut ctx = e.create_context();
        ctx.set(0, Value::Int64(41));
        assert_eq!(e.evaluate(&mut ctx).expect("eval").as_int64(), Some(42));
    }

    #[test]
    fn unresolved_reference_reports_location() {
        let lib = lib();
        let loc = crate::expr::SourceLocation { line: 3, column: 14 };
        let ast = ScalarExpr::attribute("missing").at(loc).add(ScalarExpr::integer(1));
        let err = Expression::compile(&lib, &ast, false, None, &[schema()], None)
            .expect_err("must fail");
        match err {
            ExpressionError::ReferenceNotFound { reference, location } => {
                assert_eq!(reference, "missing");
                assert_eq!(location, Some(loc));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn expected_type_conversion_applies() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::integer(1).add(ScalarExpr::integer(2)),
            false,
            Some(DataType::Double),
            &[],
            None,
        )
        .expect("compile");
        assert_eq!(e.result_type(), DataType::Double);
        assert_eq!(e.evaluate_constant().expect("evaluate"), Value::Double(3.0));
    }

    #[test]
    fn expected_type_conversion_failure() {
        let lib = lib();
        let err = Expression::compile(
            &lib,
            &ScalarExpr::string("xyz"),
            false,
            Some(DataType::Int64),
            &[],
            None,
        )
        .expect_err("no string to int64 conversion");
        assert!(matches!(err, ExpressionError::TypeConversion { .. }));
    }

    #[test]
    fn commutative_swap_compiles_and_evaluates() {
        let mut lib = lib();
        let repeat: crate::expr::FunctionImpl = Arc::new(|args, _| {
            match (args[0].as_str(), args[1].as_int64()) {
                (Some(s), Some(n)) => {
                    Ok(Value::String(s.repeat(usize::try_from(n.max(0)).unwrap_or(0))))
                }
                _ => Err(crate::expr::FunctionError::message("argument type mismatch")),
            }
        });
        lib.register(
            FunctionDescription::new(
                "repeat",
                vec![DataType::String, DataType::Int64],
                DataType::String,
                repeat,
            )
            .commutative(),
        );
        let ast = ScalarExpr::call(
            "repeat",
            vec![ScalarExpr::integer(3), ScalarExpr::string("ab")],
        );
        let e = Expression::compile(&lib, &ast, false, None, &[], None).expect("compile");
        assert_eq!(e.evaluate_constant().expect("evaluate"), Value::String("ababab".into()));
    }

    #[test]
    fn standalone_binary_compile() {
        let lib = lib();
        let e = Expression::compile_binary(&lib, "+", false, DataType::Int64, DataType::Int64, None)
            .expect("compile");
        assert_eq!(e.result_type(), DataType::Int64);
        assert_eq!(e.bindings().len(), 2);
        let mut ctx = e.create_context();
        ctx.set(0, Value::Int64(40));
        ctx.set(1, Value::Int64(2));
        assert_eq!(e.evaluate(&mut ctx).expect("eval").as_int64(), Some(42));
    }

    #[test]
    fn standalone_binary_compile_with_conversion() {
        let lib = lib();
        // Mixed operand widths resolve through converters, and the result
        // coerces to the caller's expected type.
        let e = Expression::compile_binary(
            &lib,
            "*",
            false,
            DataType::Int32,
            DataType::Int64,
            Some(DataType::Double),
        )
        .expect("compile");
        assert_eq!(e.result_type(), DataType::Double);
        let mut ctx = e.create_context();
        ctx.set(0, Value::Int32(6));
        ctx.set(1, Value::Int64(7));
        assert_eq!(e.evaluate(&mut ctx).expect("eval"), &Value::Double(42.0));
    }

    #[test]
    fn constant_expression_wrapping() {
        let e = Expression::constant(false, DataType::Int32, Value::Int32(7));
        assert!(e.is_constant());
        assert_eq!(e.result_type(), DataType::Int32);
        assert_eq!(e.evaluate_constant().expect("evaluate"), Value::Int32(7));
    }

    #[test]
    fn deterministic_constant_function_detected() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::integer(2).mul(ScalarExpr::integer(3)),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        assert!(e.is_constant());

        // counter is non-deterministic, so it is never constant.
        let e = Expression::compile(
            &lib,
            &ScalarExpr::call("counter", vec![]),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        assert!(!e.is_constant());
    }

    #[test]
    fn stateful_function_uses_context_scratch() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::call("counter", vec![]),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        let mut ctx = e.create_context();
        assert_eq!(e.evaluate(&mut ctx).expect("eval").as_int64(), Some(1));
        assert_eq!(e.evaluate(&mut ctx).expect("eval").as_int64(), Some(2));
        // A fresh context starts from zeroed scratch.
        let mut ctx2 = e.create_context();
        assert_eq!(e.evaluate(&mut ctx2).expect("eval").as_int64(), Some(1));
    }

    #[test]
    fn division_by_zero_is_a_function_error() {
        let lib = lib();
        let e = Expression::compile(
            &lib,
            &ScalarExpr::integer(1).div(ScalarExpr::integer(0)),
            false,
            None,
            &[],
            None,
        )
        .expect("compile");
        let err = e.evaluate_constant().expect_err("division by zero");
        match err {
            ExpressionError::FunctionFailed { function, message } => {
                assert_eq!(function, "/");
                assert!(message.contains("division by zero"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn binding_feeds_through_converter() {
        let lib = lib();
        let schema = schema();
        // v is int64; adding 1.5 widens the binding through a converter
        // slot rather than converting in place.
        let ast = ScalarExpr::attribute("v").add(ScalarExpr::double(1.5));
        let e = Expression::compile(&lib, &ast, false, None, &[schema], None).expect("compile");
        assert_eq!(e.result_type(), DataType::Double);
        let mut ctx = e.create_context();
        ctx.set(0, Value::Int64(10));
        assert_eq!(e.evaluate(&mut ctx).expect("eval"), &Value::Double(11.5));
        ctx.set(0, Value::Int64(-2));
        assert_eq!(e.evaluate(&mut ctx).expect("eval"), &Value::Double(-0.5));
    }

    #[test]
    fn serialization_round_trip_preserves_behavior() {
        let lib = lib();
        let schema = schema();
        // Includes a widening converter so the empty-name converter entry
        // also round-trips and re-resolves.
        let ast = ScalarExpr::attribute("v")
            .add(ScalarExpr::double(10.5))
            .mul(ScalarExpr::double(2.0));
        let e = Expression::compile(&lib, &ast, false, None, &[schema], None).expect("compile");

        let json = serde_json::to_string(&e).expect("serialize");
        let mut back: Expression = serde_json::from_str(&json).expect("deserialize");
        assert!(matches!(back.evaluate_constant(), Err(ExpressionError::Unresolved)));
        back.resolve_functions(&lib).expect("resolve");

        assert_eq!(back.result_type(), e.result_type());
        let mut c1 = e.create_context();
        let mut c2 = back.create_context();
        c1.set(0, Value::Int64(11));
        c2.set(0, Value::Int64(11));
        assert_eq!(
            e.evaluate(&mut c1).expect("eval"),
            back.evaluate(&mut c2).expect("eval")
        );
    }

    #[test]
    fn evaluate_ast_and_type_inference_helpers() {
        let lib = lib();
        let ast = ScalarExpr::double(2.0).mul(ScalarExpr::double(3.5));
        assert_eq!(evaluate_ast(&lib, &ast, None).expect("eval"), Value::Double(7.0));
        assert_eq!(
            expression_type(&lib, &ScalarExpr::attribute("w"), &[schema()]).expect("type"),
            DataType::Double
        );
    }
}
