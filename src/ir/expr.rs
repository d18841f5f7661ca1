//! Scalar expression vocabulary: element types, variables, expressions,
//! iteration ranges and iterators.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::Error;

// ─── Element types ────────────────────────────────────────────────

/// Element data type of a scalar or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float16,
    Float32,
    Float64,
}

impl DType {
    pub fn is_int(self) -> bool {
        matches!(
            self,
            DType::Int8
                | DType::Int16
                | DType::Int32
                | DType::Int64
                | DType::UInt8
                | DType::UInt16
                | DType::UInt32
                | DType::UInt64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float16 | DType::Float32 | DType::Float64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(DType::Bool),
            "int8" => Ok(DType::Int8),
            "int16" => Ok(DType::Int16),
            "int32" => Ok(DType::Int32),
            "int64" => Ok(DType::Int64),
            "uint8" => Ok(DType::UInt8),
            "uint16" => Ok(DType::UInt16),
            "uint32" => Ok(DType::UInt32),
            "uint64" => Ok(DType::UInt64),
            "float16" => Ok(DType::Float16),
            "float32" => Ok(DType::Float32),
            "float64" => Ok(DType::Float64),
            other => Err(Error::config(format!("unknown dtype '{}'", other))),
        }
    }
}

// ─── Variables ────────────────────────────────────────────────────

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(0);

/// A typed scalar handle.
///
/// Identity is the `id`, never the display name: two variables created
/// with the same name are distinct, and equality/hashing only look at `id`.
#[derive(Debug, Clone, Serialize)]
pub struct Var {
    id: u64,
    name: String,
    dtype: DType,
}

impl Var {
    /// Create a fresh variable with a new unique id.
    pub fn new(dtype: DType, name: impl Into<String>) -> Self {
        Self {
            id: NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            dtype,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "v{}", self.id)
        } else {
            f.write_str(&self.name)
        }
    }
}

// ─── Expressions ──────────────────────────────────────────────────

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Division rounding toward negative infinity.
    FloorDiv,
    /// Remainder with the sign of the divisor (pairs with `FloorDiv`).
    Mod,
    Min,
    Max,
    Lt,
    Le,
    Eq,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Eq)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Min => "min",
            BinOp::Max => "max",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Eq => "==",
        }
    }
}

/// Immutable scalar expression tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Var(Var),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cast {
        dtype: DType,
        value: Box<Expr>,
    },
    /// Element read from a buffer's backing storage.
    Load { var: Var, indices: Vec<Expr> },
    /// Opaque call to an external (backend-provided) function.
    Call {
        dtype: DType,
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinOp, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs.into()),
            rhs: Box::new(rhs.into()),
        }
    }

    pub fn floor_div(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::FloorDiv, self, rhs)
    }

    pub fn modulo(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::Mod, self, rhs)
    }

    pub fn min(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::Min, self, rhs)
    }

    pub fn max(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::Max, self, rhs)
    }

    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinOp::Lt, self, rhs)
    }

    pub fn cast(self, dtype: DType) -> Self {
        Expr::Cast {
            dtype,
            value: Box::new(self),
        }
    }

    pub fn call(dtype: DType, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            dtype,
            name: name.into(),
            args,
        }
    }

    /// The literal integer value, if this is an integer literal.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expr::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Expr::Int(_) | Expr::Float(_) | Expr::Str(_))
    }

    /// Element type of the value this expression produces.
    pub fn dtype(&self) -> DType {
        match self {
            Expr::Int(_) => DType::Int32,
            Expr::Float(_) => DType::Float32,
            Expr::Str(_) => DType::UInt8,
            Expr::Var(v) => v.dtype(),
            Expr::Binary { op, lhs, .. } => {
                if op.is_comparison() {
                    DType::Bool
                } else {
                    lhs.dtype()
                }
            }
            Expr::Cast { dtype, .. } => *dtype,
            Expr::Load { var, .. } => var.dtype(),
            Expr::Call { dtype, .. } => *dtype,
        }
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Int(v)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Int(v as i64)
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Float(v)
    }
}

impl From<f32> for Expr {
    fn from(v: f32) -> Self {
        Expr::Float(v as f64)
    }
}

impl From<Var> for Expr {
    fn from(v: Var) -> Self {
        Expr::Var(v)
    }
}

impl From<&Var> for Expr {
    fn from(v: &Var) -> Self {
        Expr::Var(v.clone())
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

impl<T: Into<Expr>> ops::Add<T> for Expr {
    type Output = Expr;
    fn add(self, rhs: T) -> Expr {
        Expr::binary(BinOp::Add, self, rhs)
    }
}

impl<T: Into<Expr>> ops::Sub<T> for Expr {
    type Output = Expr;
    fn sub(self, rhs: T) -> Expr {
        Expr::binary(BinOp::Sub, self, rhs)
    }
}

impl<T: Into<Expr>> ops::Mul<T> for Expr {
    type Output = Expr;
    fn mul(self, rhs: T) -> Expr {
        Expr::binary(BinOp::Mul, self, rhs)
    }
}

impl<T: Into<Expr>> ops::Add<T> for &Var {
    type Output = Expr;
    fn add(self, rhs: T) -> Expr {
        Expr::binary(BinOp::Add, self, rhs)
    }
}

impl<T: Into<Expr>> ops::Mul<T> for &Var {
    type Output = Expr;
    fn mul(self, rhs: T) -> Expr {
        Expr::binary(BinOp::Mul, self, rhs)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Float(v) => write!(f, "{:?}", v),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::Min | BinOp::Max => write!(f, "{}({}, {})", op.symbol(), lhs, rhs),
                _ => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            },
            Expr::Cast { dtype, value } => write!(f, "cast<{}>({})", dtype, value),
            Expr::Load { var, indices } => {
                write!(f, "{}[{}]", var, join(indices))
            }
            Expr::Call { name, args, .. } => write!(f, "{}({})", name, join(args)),
        }
    }
}

pub(crate) fn join(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── Iteration domains ────────────────────────────────────────────

/// Integer iteration domain `begin, begin + step, ...` with `extent` points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Range {
    pub begin: Expr,
    pub extent: Expr,
    pub step: Expr,
}

impl Range {
    pub fn new(begin: impl Into<Expr>, extent: impl Into<Expr>, step: impl Into<Expr>) -> Self {
        Self {
            begin: begin.into(),
            extent: extent.into(),
            step: step.into(),
        }
    }

    /// `start..stop` stepped by `step`; the extent is the number of points.
    pub fn stepped(start: i64, stop: i64, step: i64) -> Self {
        let extent = if step > 0 && stop > start {
            (stop - start + step - 1) / step
        } else {
            0
        };
        Self::new(start, extent, step)
    }

    /// Constant `(extent, step)` pair, when both are integer literals.
    pub fn const_extent_step(&self) -> Option<(i64, i64)> {
        Some((self.extent.as_int()?, self.step.as_int()?))
    }
}

impl From<ops::Range<i64>> for Range {
    fn from(r: ops::Range<i64>) -> Self {
        Range::new(r.start, (r.end - r.start).max(0), 1)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "range({}, {}, {})", self.begin, self.extent, self.step)
    }
}

/// Loop kind carried by an iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IterKind {
    /// Ordinary, parallel-mappable loop.
    Spatial,
    /// Accumulation loop.
    Reduce,
    /// Fully constant loop, expanded away during lowering.
    Unroll,
    /// Alternating-direction loop; the backend interprets the tag.
    Zigzag,
}

impl fmt::Display for IterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IterKind::Spatial => "spatial",
            IterKind::Reduce => "reduce",
            IterKind::Unroll => "unroll",
            IterKind::Zigzag => "zigzag",
        };
        f.write_str(s)
    }
}

/// A loop variable bound to its range and kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterVar {
    pub var: Var,
    pub range: Range,
    pub kind: IterKind,
}

impl IterVar {
    pub fn new(var: Var, range: Range, kind: IterKind) -> Self {
        Self { var, range, kind }
    }
}

/// A variable bound to an expression for the extent of a remap block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapVar {
    pub var: Var,
    pub expr: Expr,
}

impl MapVar {
    pub fn new(var: Var, expr: Expr) -> Self {
        Self { var, expr }
    }
}
