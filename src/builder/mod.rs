//! IRBuilder: records a kernel trace as a staging tree.
//!
//! Client code calls builder operations while the kernel function runs.
//! Nesting scopes (allocations, loops, remaps) are pushed onto a LIFO
//! stack so later calls land inside them; leaf statements (stores, calls)
//! are recorded as closed children of the innermost open scope.
//!
//! Scope lifetimes are explicit: `begin_*` returns a `ScopeHandle` that
//! must be passed to `end_scope`, and the stack top is validated on close.
//! The closure helpers (`spatial_for`, `unroll_for`, ...) pair the calls.
//! Allocations made with `alloc` and remaps made with `map_var` are scoped
//! to the rest of their enclosing scope and close together with it.

pub mod array;
pub mod staging;
#[cfg(test)]
mod tests;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::ir::{Block, DType, Expr, IterKind, MapVar, Range, Var};
use crate::lower::lower_tree;

pub use self::array::{Access, Array, Key, SliceDesc};
pub use self::staging::{ScopeHandle, ScopeKind, StagingTree};

/// Build a `Vec<Key>` from mixed scalar indices and ranges.
///
/// ```ignore
/// let view = a.slice(&keys![2..4, ..])?;
/// let x = view.get(&keys![0, &i])?;
/// ```
#[macro_export]
macro_rules! keys {
    ($($k:expr),* $(,)?) => {
        vec![$($crate::builder::Key::from($k)),*]
    };
}

// ─── Loop specification ───────────────────────────────────────────

/// Names, ranges and optional binding tags for one loop scope.
///
/// Declared indices run outermost first: `["i", "j"]` nests `j` inside
/// `i`, and an unrolled spec yields its copies in row-major order. This
/// is the reverse of wrapping the first name innermost.
#[derive(Debug, Clone, Default)]
pub struct LoopSpec {
    pub names: Option<Vec<String>>,
    pub ranges: Option<Vec<Range>>,
    pub bindings: Option<Vec<String>>,
}

impl LoopSpec {
    pub fn new<N, R>(names: impl IntoIterator<Item = N>, ranges: impl IntoIterator<Item = R>) -> Self
    where
        N: Into<String>,
        R: Into<Range>,
    {
        Self {
            names: Some(names.into_iter().map(Into::into).collect()),
            ranges: Some(ranges.into_iter().map(Into::into).collect()),
            bindings: None,
        }
    }

    pub fn single(name: impl Into<String>, range: impl Into<Range>) -> Self {
        Self::new([name.into()], [range.into()])
    }

    pub fn with_bindings<B: Into<String>>(mut self, bindings: impl IntoIterator<Item = B>) -> Self {
        self.bindings = Some(bindings.into_iter().map(Into::into).collect());
        self
    }

    fn validate(self) -> Result<(Vec<String>, Vec<Range>, Vec<String>)> {
        let names = self
            .names
            .ok_or_else(|| Error::config("loops must be declared with names"))?;
        let ranges = self
            .ranges
            .ok_or_else(|| Error::config("loops must be declared with ranges"))?;
        if names.len() != ranges.len() {
            return Err(Error::config(format!(
                "{} loop names but {} ranges",
                names.len(),
                ranges.len()
            )));
        }
        if names.is_empty() {
            return Err(Error::config("loop scope declares no indices"));
        }
        let bindings = match self.bindings {
            None => vec![String::new(); names.len()],
            Some(b) if b.len() == names.len() => b,
            Some(b) => {
                return Err(Error::config(format!(
                    "{} loop names but {} bindings",
                    names.len(),
                    b.len()
                )))
            }
        };
        Ok((names, ranges, bindings))
    }
}

// ─── IRBuilder ────────────────────────────────────────────────────

/// Trace-time builder context. One per kernel; not shared across threads.
#[derive(Debug, Default)]
pub struct IRBuilder {
    tree: StagingTree,
    arrays: HashMap<Var, Array>,
}

impl IRBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &StagingTree {
        &self.tree
    }

    /// Register `array` as the root view over its backing variable.
    pub fn bind_array(&mut self, array: &Array) {
        debug_assert!(array.is_root());
        self.arrays.insert(array.var().clone(), array.clone());
    }

    /// The root view bound to `var`, if any.
    pub fn array_for(&self, var: &Var) -> Option<&Array> {
        self.arrays.get(var)
    }

    // ── Nesting scopes ────────────────────────────────────────────

    /// Allocate a buffer for the rest of the enclosing scope.
    pub fn alloc<S: Into<Expr>>(
        &mut self,
        shape: impl IntoIterator<Item = S>,
        scope: &str,
        dtype: DType,
        name: &str,
    ) -> Array {
        self.open_alloc(shape, scope, dtype, name, true).0
    }

    /// Allocate a buffer whose scope ends at the matching `end_scope`.
    pub fn begin_alloc<S: Into<Expr>>(
        &mut self,
        shape: impl IntoIterator<Item = S>,
        scope: &str,
        dtype: DType,
        name: &str,
    ) -> (Array, ScopeHandle) {
        let (array, id) = self.open_alloc(shape, scope, dtype, name, false);
        (array, ScopeHandle { id })
    }

    fn open_alloc<S: Into<Expr>>(
        &mut self,
        shape: impl IntoIterator<Item = S>,
        scope: &str,
        dtype: DType,
        name: &str,
        implicit: bool,
    ) -> (Array, staging::ScopeId) {
        let var = Var::new(dtype, name);
        let shape: Vec<Expr> = shape.into_iter().map(Into::into).collect();
        let array = Array::new(var.clone(), shape.clone(), scope);
        self.bind_array(&array);
        let id = self.tree.open(
            ScopeKind::Alloc {
                var,
                shape,
                scope: scope.to_string(),
            },
            implicit,
        );
        (array, id)
    }

    /// Open a loop scope; returns the handle and one index variable per
    /// declared name.
    pub fn begin_loop(&mut self, kind: IterKind, spec: LoopSpec) -> Result<(ScopeHandle, Vec<Var>)> {
        let (names, ranges, bindings) = spec.validate()?;
        let vars: Vec<Var> = names.iter().map(|n| Var::new(DType::Int32, n.as_str())).collect();
        let id = self.tree.open(
            ScopeKind::Loop {
                kind,
                vars: vars.clone(),
                ranges,
                bindings,
            },
            false,
        );
        Ok((ScopeHandle { id }, vars))
    }

    /// Close a scope. It must be the innermost explicitly opened scope;
    /// implicit scopes opened inside it close with it.
    pub fn end_scope(&mut self, handle: ScopeHandle) -> Result<()> {
        self.tree.close(handle.id)
    }

    fn with_loop<F>(&mut self, kind: IterKind, spec: LoopSpec, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &[Var]) -> Result<()>,
    {
        let (handle, vars) = self.begin_loop(kind, spec)?;
        body(self, &vars)?;
        self.end_scope(handle)
    }

    pub fn spatial_for<F>(&mut self, spec: LoopSpec, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &[Var]) -> Result<()>,
    {
        self.with_loop(IterKind::Spatial, spec, body)
    }

    pub fn reduce_for<F>(&mut self, spec: LoopSpec, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &[Var]) -> Result<()>,
    {
        self.with_loop(IterKind::Reduce, spec, body)
    }

    /// Every range must have a constant extent and step by lowering time.
    pub fn unroll_for<F>(&mut self, spec: LoopSpec, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &[Var]) -> Result<()>,
    {
        self.with_loop(IterKind::Unroll, spec, body)
    }

    pub fn zigzag_for<F>(&mut self, spec: LoopSpec, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self, &[Var]) -> Result<()>,
    {
        self.with_loop(IterKind::Zigzag, spec, body)
    }

    /// Bind a fresh variable to `expr` for the rest of the enclosing scope.
    pub fn map_var(&mut self, name: &str, expr: impl Into<Expr>) -> Var {
        let expr = expr.into();
        let var = Var::new(expr.dtype(), name);
        self.tree.open(
            ScopeKind::Remap {
                bindings: vec![MapVar::new(var.clone(), expr)],
            },
            true,
        );
        var
    }

    // ── Leaf statements ───────────────────────────────────────────

    /// Write `value` to one element of `target`. Every key must be scalar.
    pub fn store(&mut self, target: &Array, keys: &[Key], value: impl Into<Expr>) -> Result<()> {
        let (var, indices) = match target.index(keys)? {
            Access::Element(Expr::Load { var, indices }) => (var, indices),
            Access::Element(other) => {
                return Err(Error::unsupported(format!("store through {}", other)))
            }
            Access::View(_) => {
                return Err(Error::unsupported("store into a partially indexed view"))
            }
        };
        self.tree.record(Block::Store {
            var,
            indices,
            value: value.into(),
        });
        Ok(())
    }

    /// Record an opaque call evaluated for its side effects.
    pub fn call(&mut self, dtype: DType, func_name: &str, args: Vec<Expr>) {
        self.tree
            .record(Block::Evaluate(Expr::call(dtype, func_name, args)));
    }

    pub fn evaluate(&mut self, expr: impl Into<Expr>) {
        self.tree.record(Block::Evaluate(expr.into()));
    }

    /// Filling a whole buffer with a constant is not supported.
    pub fn fill(&mut self, target: &Array, _value: impl Into<Expr>) -> Result<()> {
        Err(Error::unsupported(format!(
            "fill of buffer {} with a constant",
            target.var()
        )))
    }

    /// Loading a whole view at once is not supported; index it with `get`.
    pub fn load(&mut self, source: &Array) -> Result<Expr> {
        Err(Error::unsupported(format!(
            "whole-view load of buffer {} (rank {})",
            source.var(),
            source.rank()
        )))
    }

    // ── Build ─────────────────────────────────────────────────────

    /// Finish the trace and lower it to Block IR.
    pub fn build(self) -> Result<Block> {
        self.tree.finish()?;
        lower_tree(&self.tree)
    }
}
