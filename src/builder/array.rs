//! Buffer views.
//!
//! An `Array` is a logical multi-dimensional window over a backing
//! variable. A root view sits directly on the storage; a derived view is
//! produced by slicing another view and remembers, per parent dimension,
//! whether that dimension was fixed to an offset or kept as a strided
//! slice. Element access walks the parent chain to express indices in the
//! root's coordinate system.

use std::ops;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ir::simplify::fold_expr;
use crate::ir::{DType, Expr, Var};

/// One index key: a scalar position or a `start:stop:step` slice.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Index(Expr),
    /// Missing parts default to `0`, the current extent and `1`.
    Slice {
        start: Option<Expr>,
        stop: Option<Expr>,
        step: Option<Expr>,
    },
}

impl Key {
    /// The whole dimension (`:`).
    pub fn full() -> Self {
        Key::Slice {
            start: None,
            stop: None,
            step: None,
        }
    }

    pub fn slice(start: impl Into<Expr>, stop: impl Into<Expr>) -> Self {
        Key::Slice {
            start: Some(start.into()),
            stop: Some(stop.into()),
            step: None,
        }
    }

    pub fn stepped(
        start: Option<Expr>,
        stop: Option<Expr>,
        step: impl Into<Expr>,
    ) -> Self {
        Key::Slice {
            start,
            stop,
            step: Some(step.into()),
        }
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, Key::Slice { .. })
    }
}

impl From<Expr> for Key {
    fn from(e: Expr) -> Self {
        Key::Index(e)
    }
}

impl From<&Var> for Key {
    fn from(v: &Var) -> Self {
        Key::Index(Expr::from(v))
    }
}

impl From<Var> for Key {
    fn from(v: Var) -> Self {
        Key::Index(Expr::Var(v))
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Index(Expr::Int(v))
    }
}

impl From<ops::Range<i64>> for Key {
    fn from(r: ops::Range<i64>) -> Self {
        Key::slice(r.start, r.end)
    }
}

impl From<ops::RangeFrom<i64>> for Key {
    fn from(r: ops::RangeFrom<i64>) -> Self {
        Key::Slice {
            start: Some(Expr::Int(r.start)),
            stop: None,
            step: None,
        }
    }
}

impl From<ops::RangeTo<i64>> for Key {
    fn from(r: ops::RangeTo<i64>) -> Self {
        Key::Slice {
            start: None,
            stop: Some(Expr::Int(r.end)),
            step: None,
        }
    }
}

impl From<ops::RangeFull> for Key {
    fn from(_: ops::RangeFull) -> Self {
        Key::full()
    }
}

/// How a derived view maps one dimension of its parent.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceDesc {
    /// Dimension consumed at a fixed offset.
    Fixed(Expr),
    /// Dimension kept; element `k` sits at `start + k * step` in the parent.
    Strided { start: Expr, step: Expr },
}

/// Result of indexing a view.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    /// At least one key was a slice.
    View(Array),
    /// Every key was scalar: a load of one element, in root coordinates.
    Element(Expr),
}

/// Logical multi-dimensional view over a backing variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    var: Var,
    shape: Vec<Expr>,
    scope: String,
    parent: Option<(Arc<Array>, Vec<SliceDesc>)>,
}

impl Array {
    /// A root view directly over `var`.
    pub fn new(var: Var, shape: Vec<Expr>, scope: impl Into<String>) -> Self {
        Self {
            var,
            shape,
            scope: scope.into(),
            parent: None,
        }
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    pub fn shape(&self) -> &[Expr] {
        &self.shape
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn dtype(&self) -> DType {
        self.var.dtype()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<&Array> {
        self.parent.as_ref().map(|(p, _)| p.as_ref())
    }

    /// Per-parent-dimension descriptors; empty for a root view.
    pub fn slices(&self) -> &[SliceDesc] {
        self.parent.as_ref().map(|(_, s)| s.as_slice()).unwrap_or(&[])
    }

    pub fn root(&self) -> &Array {
        let mut cur = self;
        while let Some(p) = cur.parent() {
            cur = p;
        }
        cur
    }

    /// Index the view with one key per dimension.
    pub fn index(&self, keys: &[Key]) -> Result<Access> {
        if keys.len() != self.rank() {
            return Err(Error::ShapeMismatch {
                expected: self.rank(),
                found: keys.len(),
            });
        }

        let mut new_shape = Vec::new();
        let mut descs = Vec::with_capacity(keys.len());
        let mut indices = Vec::new();

        for (dim, (key, extent)) in keys.iter().zip(&self.shape).enumerate() {
            match key {
                Key::Slice { start, stop, step } => {
                    let start = start.clone().unwrap_or(Expr::Int(0));
                    let stop = stop.clone().unwrap_or_else(|| extent.clone());
                    let step = step.clone().unwrap_or(Expr::Int(1));
                    check_slice(dim, &start, &stop, &step, extent)?;
                    new_shape.push(slice_extent(dim, &start, &stop, &step)?);
                    descs.push(SliceDesc::Strided { start, step });
                }
                Key::Index(e) => {
                    check_index(dim, e, extent)?;
                    descs.push(SliceDesc::Fixed(e.clone()));
                    indices.push(e.clone());
                }
            }
        }

        if !new_shape.is_empty() {
            return Ok(Access::View(Array {
                var: self.var.clone(),
                shape: new_shape,
                scope: self.scope.clone(),
                parent: Some((Arc::new(self.clone()), descs)),
            }));
        }

        Ok(Access::Element(Expr::Load {
            var: self.var.clone(),
            indices: self.resolve(&indices)?,
        }))
    }

    /// Slice the view; fails if every key is scalar.
    pub fn slice(&self, keys: &[Key]) -> Result<Array> {
        match self.index(keys)? {
            Access::View(view) => Ok(view),
            Access::Element(_) => Err(Error::unsupported(
                "every key is scalar: the result is an element, not a view",
            )),
        }
    }

    /// Read one element. Every key must be scalar.
    pub fn get(&self, keys: &[Key]) -> Result<Expr> {
        match self.index(keys)? {
            Access::Element(load) => Ok(load),
            Access::View(_) => Err(Error::unsupported(
                "load through a partially indexed view",
            )),
        }
    }

    /// Map indices over this view's free dimensions to root coordinates.
    pub fn resolve(&self, indices: &[Expr]) -> Result<Vec<Expr>> {
        if indices.len() != self.rank() {
            return Err(Error::ShapeMismatch {
                expected: self.rank(),
                found: indices.len(),
            });
        }
        let Some((parent, descs)) = &self.parent else {
            return Ok(indices.iter().map(fold_expr).collect());
        };

        let mut free = indices.iter();
        let mut origin = Vec::with_capacity(descs.len());
        for desc in descs {
            match desc {
                SliceDesc::Fixed(offset) => origin.push(offset.clone()),
                SliceDesc::Strided { start, step } => {
                    let idx = free.next().ok_or(Error::ShapeMismatch {
                        expected: self.rank(),
                        found: indices.len(),
                    })?;
                    origin.push(fold_expr(&(start.clone() + idx.clone() * step.clone())));
                }
            }
        }
        parent.resolve(&origin)
    }
}

fn check_index(dim: usize, index: &Expr, extent: &Expr) -> Result<()> {
    if let (Some(i), Some(n)) = (index.as_int(), extent.as_int()) {
        if i < 0 || i >= n {
            return Err(Error::OutOfBounds {
                dim,
                detail: format!("index {} not in [0, {})", i, n),
            });
        }
    }
    Ok(())
}

fn check_slice(dim: usize, start: &Expr, stop: &Expr, step: &Expr, extent: &Expr) -> Result<()> {
    if let Some(s) = step.as_int() {
        if s <= 0 {
            return Err(Error::config(format!(
                "slice step must be positive, got {} in dimension {}",
                s, dim
            )));
        }
    }
    if let (Some(b), Some(e), Some(n)) = (start.as_int(), stop.as_int(), extent.as_int()) {
        if !(0 <= b && b < e && e <= n) {
            return Err(Error::OutOfBounds {
                dim,
                detail: format!("slice {}:{} not within [0, {}]", b, e, n),
            });
        }
    }
    Ok(())
}

/// `ceil((stop - start) / step)`, folded when possible.
fn slice_extent(dim: usize, start: &Expr, stop: &Expr, step: &Expr) -> Result<Expr> {
    if let (Some(b), Some(e), Some(s)) = (start.as_int(), stop.as_int(), step.as_int()) {
        let span = e.checked_sub(b).ok_or_else(|| {
            Error::config(format!(
                "slice {}:{} in dimension {} overflows",
                b, e, dim
            ))
        })?;
        if span <= 0 {
            return Err(Error::OutOfBounds {
                dim,
                detail: format!("slice {}:{} is empty", b, e),
            });
        }
        // span > 0 and s > 0 here.
        return Ok(Expr::Int((span - 1) / s + 1));
    }
    let span = stop.clone() - start.clone();
    if step.as_int() == Some(1) {
        Ok(fold_expr(&span))
    } else {
        Ok(fold_expr(&(span + (step.clone() - 1)).floor_div(step.clone())))
    }
}
