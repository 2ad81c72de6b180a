//! Function and converter registry used by the expression compiler.
//!
//! [`FunctionLibrary`] resolves a call by name and argument types to a
//! concrete implementation, reporting per-argument implicit converters and
//! whether a commutative overload requires the arguments swapped. Implicit
//! conversions are widening only; explicit conversions (narrowing, string
//! casts) are used solely for the caller-requested result type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use latticedb_core::{DataType, Value};

use super::error::FunctionError;

/// A scalar or tile function implementation.
///
/// Receives the argument slot values and a per-call scratch buffer sized per
/// the function's declared state size, zeroed once per evaluation context.
pub type FunctionImpl =
    Arc<dyn Fn(&[Value], &mut [u8]) -> Result<Value, FunctionError> + Send + Sync>;

/// One registered function overload.
#[derive(Clone)]
pub struct FunctionDescription {
    name: String,
    input_types: Vec<DataType>,
    output_type: DataType,
    implementation: FunctionImpl,
    tile_implementation: Option<FunctionImpl>,
    commutative: bool,
    deterministic: bool,
    state_size: usize,
}

impl fmt::Debug for FunctionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescription")
            .field("name", &self.name)
            .field("input_types", &self.input_types)
            .field("output_type", &self.output_type)
            .field("commutative", &self.commutative)
            .field("tile", &self.tile_implementation.is_some())
            .finish_non_exhaustive()
    }
}

impl FunctionDescription {
    /// Creates a deterministic, non-commutative overload with no tile
    /// implementation.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        input_types: Vec<DataType>,
        output_type: DataType,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            name: name.into().to_lowercase(),
            input_types,
            output_type,
            implementation,
            tile_implementation: None,
            commutative: false,
            deterministic: true,
            state_size: 0,
        }
    }

    /// Marks the overload commutative, allowing the compiler to swap its two
    /// arguments when only the swapped signature matches.
    #[must_use]
    pub const fn commutative(mut self) -> Self {
        self.commutative = true;
        self
    }

    /// Marks the overload non-deterministic, excluding it from
    /// constant-function detection.
    #[must_use]
    pub const fn non_deterministic(mut self) -> Self {
        self.deterministic = false;
        self
    }

    /// Declares a per-call scratch state of `size` bytes.
    #[must_use]
    pub const fn with_state(mut self, size: usize) -> Self {
        self.state_size = size;
        self
    }

    /// Registers an explicit tile implementation.
    #[must_use]
    pub fn with_tile(mut self, implementation: FunctionImpl) -> Self {
        self.tile_implementation = Some(implementation);
        self
    }

    /// Derives the tile implementation by applying the scalar implementation
    /// element-wise over tile arguments, broadcasting scalar arguments.
    ///
    /// Every operand tile is fully materialized before the call, so derived
    /// tile functions never short-circuit.
    #[must_use]
    pub fn with_tile_default(mut self) -> Self {
        self.tile_implementation = Some(tile_lift(Arc::clone(&self.implementation)));
        self
    }

    /// Overload name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter types.
    #[must_use]
    pub fn input_types(&self) -> &[DataType] {
        &self.input_types
    }

    /// Declared result type.
    #[must_use]
    pub const fn output_type(&self) -> DataType {
        self.output_type
    }

    /// Whether the overload is deterministic.
    #[must_use]
    pub const fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Declared per-call scratch size in bytes.
    #[must_use]
    pub const fn state_size(&self) -> usize {
        self.state_size
    }

    /// The implementation for the requested mode, if available.
    #[must_use]
    pub fn implementation_for(&self, tile: bool) -> Option<FunctionImpl> {
        if tile {
            self.tile_implementation.clone()
        } else {
            Some(Arc::clone(&self.implementation))
        }
    }
}

/// A type conversion selected by the registry.
#[derive(Clone)]
pub struct Conversion {
    /// The converter implementation (tile-capable).
    pub implementation: FunctionImpl,
    /// Relative cost used to rank candidate overloads.
    pub cost: u32,
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion").field("cost", &self.cost).finish_non_exhaustive()
    }
}

/// A successful overload resolution.
#[derive(Clone)]
pub struct FunctionMatch {
    /// The matched overload.
    pub description: FunctionDescription,
    /// Implementation for the requested evaluation mode.
    pub implementation: FunctionImpl,
    /// Per-argument converters (post-swap argument order), `None` where the
    /// static type already matches.
    pub converters: Vec<Option<Conversion>>,
    /// True when the match used a commutative overload with the two
    /// arguments exchanged.
    pub swap_inputs: bool,
}

impl fmt::Debug for FunctionMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionMatch")
            .field("description", &self.description)
            .field("swap_inputs", &self.swap_inputs)
            .finish_non_exhaustive()
    }
}

struct ConverterEntry {
    implementation: FunctionImpl,
    cost: u32,
    implicit: bool,
}

/// Registry of function overloads and type converters.
///
/// Injected into every compile call; there is no process-global registry.
pub struct FunctionLibrary {
    functions: HashMap<String, Vec<FunctionDescription>>,
    converters: HashMap<(DataType, DataType), ConverterEntry>,
}

impl fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionLibrary")
            .field("functions", &self.functions.len())
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl Default for FunctionLibrary {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionLibrary {
    /// Creates an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self { functions: HashMap::new(), converters: HashMap::new() }
    }

    /// Creates a library populated with the built-in functions and
    /// converters.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut lib = Self::new();
        register_builtin_converters(&mut lib);
        register_builtin_functions(&mut lib);
        lib
    }

    /// Registers a function overload.
    pub fn register(&mut self, description: FunctionDescription) {
        self.functions.entry(description.name.clone()).or_default().push(description);
    }

    /// Registers a converter between two types.
    ///
    /// Implicit converters participate in overload resolution; explicit ones
    /// are only used to coerce a compiled expression to the caller's
    /// expected result type. The implementation is lifted to map over tiles
    /// element-wise, so converters work in both evaluation modes.
    pub fn register_converter(
        &mut self,
        from: DataType,
        to: DataType,
        cost: u32,
        implicit: bool,
        implementation: FunctionImpl,
    ) {
        self.converters.insert(
            (from, to),
            ConverterEntry { implementation: tile_lift(implementation), cost, implicit },
        );
    }

    /// Finds a converter from `from` to `to`.
    ///
    /// All registered converters are tile-capable, so the same lookup serves
    /// both evaluation modes. Implicit-only lookups exclude narrowing and
    /// formatting conversions.
    #[must_use]
    pub fn find_converter(
        &self,
        from: DataType,
        to: DataType,
        allow_explicit: bool,
    ) -> Option<Conversion> {
        if from == to {
            return Some(Conversion { implementation: identity_converter(), cost: 0 });
        }
        let entry = self.converters.get(&(from, to))?;
        if !entry.implicit && !allow_explicit {
            return None;
        }
        Some(Conversion { implementation: Arc::clone(&entry.implementation), cost: entry.cost })
    }

    /// Resolves a call by name and argument types.
    ///
    /// Resolution order: exact match, then the candidate reachable with the
    /// cheapest total implicit widening, then (for two-argument calls) the
    /// same two passes against commutative overloads with the arguments
    /// swapped. In tile mode only overloads carrying a tile implementation
    /// are considered.
    #[must_use]
    pub fn find_function(
        &self,
        name: &str,
        arg_types: &[DataType],
        tile: bool,
    ) -> Option<FunctionMatch> {
        let overloads = self.functions.get(&name.to_lowercase())?;
        let candidates: Vec<&FunctionDescription> = overloads
            .iter()
            .filter(|d| {
                d.input_types.len() == arg_types.len()
                    && (!tile || d.tile_implementation.is_some())
            })
            .collect();

        if let Some(m) = self.match_candidates(&candidates, arg_types, tile, false) {
            return Some(m);
        }
        if arg_types.len() == 2 {
            let swapped = [arg_types[1], arg_types[0]];
            let commutative: Vec<&FunctionDescription> =
                candidates.into_iter().filter(|d| d.commutative).collect();
            if let Some(m) = self.match_candidates(&commutative, &swapped, tile, true) {
                return Some(m);
            }
        }
        None
    }

    fn match_candidates(
        &self,
        candidates: &[&FunctionDescription],
        arg_types: &[DataType],
        tile: bool,
        swap_inputs: bool,
    ) -> Option<FunctionMatch> {
        // Exact match wins outright.
        for d in candidates {
            if d.input_types == arg_types {
                let implementation = d.implementation_for(tile)?;
                return Some(FunctionMatch {
                    description: (*d).clone(),
                    implementation,
                    converters: vec![None; arg_types.len()],
                    swap_inputs,
                });
            }
        }

        let mut best: Option<(u32, &FunctionDescription, Vec<Option<Conversion>>)> = None;
        'candidates: for d in candidates {
            let mut total = 0;
            let mut converters = Vec::with_capacity(arg_types.len());
            for (have, want) in arg_types.iter().zip(&d.input_types) {
                if have == want {
                    converters.push(None);
                } else if let Some(c) = self.find_converter(*have, *want, false) {
                    total += c.cost;
                    converters.push(Some(c));
                } else {
                    continue 'candidates;
                }
            }
            if best.as_ref().map_or(true, |(cost, _, _)| total < *cost) {
                best = Some((total, d, converters));
            }
        }

        best.and_then(|(_, d, converters)| {
            let implementation = d.implementation_for(tile)?;
            Some(FunctionMatch {
                description: d.clone(),
                implementation,
                converters,
                swap_inputs,
            })
        })
    }
}

/// Renders `name(type, type, ...)` for error messages.
#[must_use]
pub fn render_signature(name: &str, types: &[DataType]) -> String {
    let mut out = String::from(name);
    out.push('(');
    for (i, t) in types.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(t.name());
    }
    out.push(')');
    out
}

/// Lifts a scalar implementation to operate element-wise over tiles,
/// broadcasting non-tile arguments. With no tile argument the scalar
/// implementation runs once unchanged.
fn tile_lift(scalar: FunctionImpl) -> FunctionImpl {
    Arc::new(move |args: &[Value], state: &mut [u8]| {
        let len = args.iter().filter_map(|a| a.as_tile().map(<[Value]>::len)).max();
        let Some(n) = len else {
            return scalar(args, state);
        };
        for a in args {
            if let Some(t) = a.as_tile() {
                if t.len() != n {
                    return Err(FunctionError::message("tile length mismatch"));
                }
            }
        }
        let mut out = Vec::with_capacity(n);
        let mut cell_args = Vec::with_capacity(args.len());
        for i in 0..n {
            cell_args.clear();
            for a in args {
                cell_args.push(match a {
                    Value::Tile(t) => t[i].clone(),
                    v => v.clone(),
                });
            }
            out.push(scalar(&cell_args, state)?);
        }
        Ok(Value::Tile(out))
    })
}

fn identity_converter() -> FunctionImpl {
    Arc::new(|args, _| Ok(args[0].clone()))
}

fn null_guard(args: &[Value]) -> bool {
    args.iter().any(Value::is_null)
}

// ---------------------------------------------------------------------------
// Built-in converters
// ---------------------------------------------------------------------------

fn register_builtin_converters(lib: &mut FunctionLibrary) {
    use DataType as T;

    // A bare null converts to any type at no cost.
    for to in [T::Bool, T::Int8, T::Int16, T::Int32, T::Int64, T::Double, T::String] {
        lib.register_converter(T::Void, to, 0, true, Arc::new(|_, _| Ok(Value::Null)));
    }

    // Implicit integer widening; cost grows with distance.
    let widenings: [(T, T, u32); 10] = [
        (T::Int8, T::Int16, 1),
        (T::Int8, T::Int32, 2),
        (T::Int8, T::Int64, 3),
        (T::Int8, T::Double, 4),
        (T::Int16, T::Int32, 1),
        (T::Int16, T::Int64, 2),
        (T::Int16, T::Double, 3),
        (T::Int32, T::Int64, 1),
        (T::Int32, T::Double, 2),
        (T::Int64, T::Double, 1),
    ];
    for (from, to, cost) in widenings {
        lib.register_converter(from, to, cost, true, widen_converter(to));
    }

    // Explicit narrowing and casts, used only for the expected result type.
    let narrowings: [(T, T); 7] = [
        (T::Double, T::Int64),
        (T::Double, T::Int32),
        (T::Int64, T::Int32),
        (T::Int64, T::Int16),
        (T::Int64, T::Int8),
        (T::Int32, T::Int16),
        (T::Int32, T::Int8),
    ];
    for (from, to) in narrowings {
        lib.register_converter(from, to, 8, false, narrow_converter(to));
    }
    for from in [T::Bool, T::Int8, T::Int16, T::Int32, T::Int64, T::Double] {
        lib.register_converter(
            from,
            T::String,
            8,
            false,
            Arc::new(|args, _| {
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::String(args[0].to_string()))
            }),
        );
    }
}

fn widen_converter(to: DataType) -> FunctionImpl {
    Arc::new(move |args, _| {
        let v = &args[0];
        if v.is_null() {
            return Ok(Value::Null);
        }
        match to {
            DataType::Int16 => v
                .as_int64()
                .map(|x| Value::Int16(x as i16))
                .ok_or_else(|| FunctionError::message("not an integer")),
            DataType::Int32 => v
                .as_int64()
                .map(|x| Value::Int32(x as i32))
                .ok_or_else(|| FunctionError::message("not an integer")),
            DataType::Int64 => v
                .as_int64()
                .map(Value::Int64)
                .ok_or_else(|| FunctionError::message("not an integer")),
            DataType::Double => v
                .as_double()
                .map(Value::Double)
                .ok_or_else(|| FunctionError::message("not numeric")),
            _ => Err(FunctionError::message("unsupported widening")),
        }
    })
}

fn narrow_converter(to: DataType) -> FunctionImpl {
    Arc::new(move |args, _| {
        let v = &args[0];
        if v.is_null() {
            return Ok(Value::Null);
        }
        let wide = v
            .as_double()
            .ok_or_else(|| FunctionError::message("not numeric"))?;
        Ok(match to {
            DataType::Int8 => Value::Int8(wide as i8),
            DataType::Int16 => Value::Int16(wide as i16),
            DataType::Int32 => Value::Int32(wide as i32),
            DataType::Int64 => Value::Int64(wide as i64),
            _ => return Err(FunctionError::message("unsupported narrowing")),
        })
    })
}

// ---------------------------------------------------------------------------
// Built-in functions
// ---------------------------------------------------------------------------

macro_rules! int_arith {
    ($lib:expr, $dt:expr, $variant:ident, $ty:ty) => {{
        let ops: [(&str, bool, fn($ty, $ty) -> Result<$ty, FunctionError>); 5] = [
            ("+", true, |a, b| Ok(a.wrapping_add(b))),
            ("-", false, |a, b| Ok(a.wrapping_sub(b))),
            ("*", true, |a, b| Ok(a.wrapping_mul(b))),
            ("/", false, |a, b| {
                if b == 0 {
                    Err(FunctionError::message("division by zero"))
                } else {
                    Ok(a.wrapping_div(b))
                }
            }),
            ("%", false, |a, b| {
                if b == 0 {
                    Err(FunctionError::message("modulo by zero"))
                } else {
                    Ok(a.wrapping_rem(b))
                }
            }),
        ];
        for (name, commutative, f) in ops {
            let implementation: FunctionImpl = Arc::new(move |args, _| {
                if null_guard(args) {
                    return Ok(Value::Null);
                }
                match (&args[0], &args[1]) {
                    (Value::$variant(a), Value::$variant(b)) => Ok(Value::$variant(f(*a, *b)?)),
                    _ => Err(FunctionError::message("argument type mismatch")),
                }
            });
            let mut desc = FunctionDescription::new(name, vec![$dt, $dt], $dt, implementation)
                .with_tile_default();
            if commutative {
                desc = desc.commutative();
            }
            $lib.register(desc);
        }
        // Unary negation.
        let neg: FunctionImpl = Arc::new(|args, _| {
            if null_guard(args) {
                return Ok(Value::Null);
            }
            match &args[0] {
                Value::$variant(a) => Ok(Value::$variant(a.wrapping_neg())),
                _ => Err(FunctionError::message("argument type mismatch")),
            }
        });
        $lib.register(
            FunctionDescription::new("-", vec![$dt], $dt, neg).with_tile_default(),
        );
    }};
}

#[allow(clippy::too_many_lines)]
fn register_builtin_functions(lib: &mut FunctionLibrary) {
    use DataType as T;

    int_arith!(lib, T::Int8, Int8, i8);
    int_arith!(lib, T::Int16, Int16, i16);
    int_arith!(lib, T::Int32, Int32, i32);
    int_arith!(lib, T::Int64, Int64, i64);

    // Double arithmetic follows IEEE semantics; division by zero yields inf.
    let double_ops: [(&str, bool, fn(f64, f64) -> f64); 4] = [
        ("+", true, |a, b| a + b),
        ("-", false, |a, b| a - b),
        ("*", true, |a, b| a * b),
        ("/", false, |a, b| a / b),
    ];
    for (name, commutative, f) in double_ops {
        let implementation: FunctionImpl = Arc::new(move |args, _| {
            if null_guard(args) {
                return Ok(Value::Null);
            }
            match (args[0].as_double(), args[1].as_double()) {
                (Some(a), Some(b)) => Ok(Value::Double(f(a, b))),
                _ => Err(FunctionError::message("argument type mismatch")),
            }
        });
        let mut desc =
            FunctionDescription::new(name, vec![T::Double, T::Double], T::Double, implementation)
                .with_tile_default();
        if commutative {
            desc = desc.commutative();
        }
        lib.register(desc);
    }
    let dneg: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        args[0]
            .as_double()
            .map(|a| Value::Double(-a))
            .ok_or_else(|| FunctionError::message("argument type mismatch"))
    });
    lib.register(FunctionDescription::new("-", vec![T::Double], T::Double, dneg).with_tile_default());

    // String concatenation via "+".
    let concat: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        match (args[0].as_str(), args[1].as_str()) {
            (Some(a), Some(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => Err(FunctionError::message("argument type mismatch")),
        }
    });
    lib.register(
        FunctionDescription::new("+", vec![T::String, T::String], T::String, concat)
            .with_tile_default(),
    );

    // Comparisons over int64, double, and string; narrower integers widen.
    register_comparisons(lib);

    // Boolean connectives. Short-circuiting is a compiler concern; the
    // functions themselves evaluate strictly.
    let and_impl: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        match (args[0].as_bool(), args[1].as_bool()) {
            (Some(a), Some(b)) => Ok(Value::Bool(a && b)),
            _ => Err(FunctionError::message("argument type mismatch")),
        }
    });
    lib.register(
        FunctionDescription::new("and", vec![T::Bool, T::Bool], T::Bool, and_impl)
            .commutative()
            .with_tile_default(),
    );
    let or_impl: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        match (args[0].as_bool(), args[1].as_bool()) {
            (Some(a), Some(b)) => Ok(Value::Bool(a || b)),
            _ => Err(FunctionError::message("argument type mismatch")),
        }
    });
    lib.register(
        FunctionDescription::new("or", vec![T::Bool, T::Bool], T::Bool, or_impl)
            .commutative()
            .with_tile_default(),
    );
    let not_impl: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        args[0]
            .as_bool()
            .map(|b| Value::Bool(!b))
            .ok_or_else(|| FunctionError::message("argument type mismatch"))
    });
    lib.register(
        FunctionDescription::new("not", vec![T::Bool], T::Bool, not_impl).with_tile_default(),
    );

    // Conditional: iif(cond, then, else). A null condition selects the else
    // branch. The tile form selects per cell over fully evaluated operands.
    for ty in [T::Bool, T::Int64, T::Double, T::String] {
        let iif_impl: FunctionImpl = Arc::new(|args, _| {
            if args[0].as_bool().unwrap_or(false) {
                Ok(args[1].clone())
            } else {
                Ok(args[2].clone())
            }
        });
        lib.register(
            FunctionDescription::new("iif", vec![T::Bool, ty, ty], ty, iif_impl)
                .with_tile_default(),
        );
    }

    // is_null works for every type, including a bare null literal.
    for ty in [T::Void, T::Bool, T::Int8, T::Int16, T::Int32, T::Int64, T::Double, T::String] {
        let impl_: FunctionImpl = Arc::new(|args, _| Ok(Value::Bool(args[0].is_null())));
        lib.register(
            FunctionDescription::new("is_null", vec![ty], T::Bool, impl_).with_tile_default(),
        );
    }

    // Math.
    let unary_math: [(&str, fn(f64) -> Result<f64, FunctionError>); 6] = [
        ("sqrt", |x| {
            if x < 0.0 {
                Err(FunctionError::message("sqrt of negative value"))
            } else {
                Ok(x.sqrt())
            }
        }),
        ("sin", |x| Ok(x.sin())),
        ("cos", |x| Ok(x.cos())),
        ("floor", |x| Ok(x.floor())),
        ("ceil", |x| Ok(x.ceil())),
        ("abs", |x| Ok(x.abs())),
    ];
    for (name, f) in unary_math {
        let implementation: FunctionImpl = Arc::new(move |args, _| {
            if null_guard(args) {
                return Ok(Value::Null);
            }
            args[0]
                .as_double()
                .map(|x| f(x).map(Value::Double))
                .ok_or_else(|| FunctionError::message("argument type mismatch"))?
        });
        lib.register(
            FunctionDescription::new(name, vec![T::Double], T::Double, implementation)
                .with_tile_default(),
        );
    }
    let pow_impl: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        match (args[0].as_double(), args[1].as_double()) {
            (Some(a), Some(b)) => Ok(Value::Double(a.powf(b))),
            _ => Err(FunctionError::message("argument type mismatch")),
        }
    });
    lib.register(
        FunctionDescription::new("pow", vec![T::Double, T::Double], T::Double, pow_impl)
            .with_tile_default(),
    );
    let abs_int: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        args[0]
            .as_int64()
            .map(|x| Value::Int64(x.wrapping_abs()))
            .ok_or_else(|| FunctionError::message("argument type mismatch"))
    });
    lib.register(
        FunctionDescription::new("abs", vec![T::Int64], T::Int64, abs_int).with_tile_default(),
    );

    // String functions; strlen deliberately has no tile form, exercising the
    // compiler's tile fallback.
    let strlen: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        args[0]
            .as_str()
            .map(|s| Value::Int64(s.chars().count() as i64))
            .ok_or_else(|| FunctionError::message("argument type mismatch"))
    });
    lib.register(FunctionDescription::new("strlen", vec![T::String], T::Int64, strlen));

    let substr: FunctionImpl = Arc::new(|args, _| {
        if null_guard(args) {
            return Ok(Value::Null);
        }
        let (Some(s), Some(start), Some(len)) =
            (args[0].as_str(), args[1].as_int64(), args[2].as_int64())
        else {
            return Err(FunctionError::message("argument type mismatch"));
        };
        let start = usize::try_from(start.max(0)).unwrap_or(0);
        let len = usize::try_from(len.max(0)).unwrap_or(0);
        Ok(Value::String(s.chars().skip(start).take(len).collect()))
    });
    lib.register(
        FunctionDescription::new("substr", vec![T::String, T::Int64, T::Int64], T::String, substr)
            .with_tile_default(),
    );

    // A stateful counter: returns how many times it has run within one
    // evaluation context. Exercises per-call scratch buffers.
    let counter: FunctionImpl = Arc::new(|_args, state| {
        let bytes: [u8; 8] =
            (&*state).try_into().map_err(|_| FunctionError::message("bad state size"))?;
        let n = u64::from_le_bytes(bytes) + 1;
        state.copy_from_slice(&n.to_le_bytes());
        Ok(Value::Int64(n as i64))
    });
    lib.register(
        FunctionDescription::new("counter", vec![], T::Int64, counter)
            .non_deterministic()
            .with_state(8),
    );
}

fn register_comparisons(lib: &mut FunctionLibrary) {
    use DataType as T;
    use std::cmp::Ordering;

    let cmp_ops: [(&str, fn(Ordering) -> bool); 6] = [
        ("=", Ordering::is_eq),
        ("<>", Ordering::is_ne),
        ("<", Ordering::is_lt),
        ("<=", Ordering::is_le),
        (">", Ordering::is_gt),
        (">=", Ordering::is_ge),
    ];

    for (name, test) in cmp_ops {
        let int_impl: FunctionImpl = Arc::new(move |args, _| {
            if null_guard(args) {
                return Ok(Value::Null);
            }
            match (args[0].as_int64(), args[1].as_int64()) {
                (Some(a), Some(b)) => Ok(Value::Bool(test(a.cmp(&b)))),
                _ => Err(FunctionError::message("argument type mismatch")),
            }
        });
        lib.register(
            FunctionDescription::new(name, vec![T::Int64, T::Int64], T::Bool, int_impl)
                .with_tile_default(),
        );

        let dbl_impl: FunctionImpl = Arc::new(move |args, _| {
            if null_guard(args) {
                return Ok(Value::Null);
            }
            match (args[0].as_double(), args[1].as_double()) {
                (Some(a), Some(b)) => {
                    let ord = a.partial_cmp(&b).unwrap_or(Ordering::Greater);
                    Ok(Value::Bool(test(ord)))
                }
                _ => Err(FunctionError::message("argument type mismatch")),
            }
        });
        lib.register(
            FunctionDescription::new(name, vec![T::Double, T::Double], T::Bool, dbl_impl)
                .with_tile_default(),
        );

        let str_impl: FunctionImpl = Arc::new(move |args, _| {
            if null_guard(args) {
                return Ok(Value::Null);
            }
            match (args[0].as_str(), args[1].as_str()) {
                (Some(a), Some(b)) => Ok(Value::Bool(test(a.cmp(b)))),
                _ => Err(FunctionError::message("argument type mismatch")),
            }
        });
        lib.register(
            FunctionDescription::new(name, vec![T::String, T::String], T::Bool, str_impl)
                .with_tile_default(),
        );
    }
}
