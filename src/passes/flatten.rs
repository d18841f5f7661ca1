//! Flatten pass: multi-dimensional buffer accesses to linear offsets.
//!
//! Every `Load` / `Store` whose buffer has a registered rank-k shape (k > 1)
//! and which carries k indices is rewritten to a single row-major offset:
//!
//! ```text
//! A[i0, .., ik-1]  →  A[i0*s0 + .. + ik-1*sk-1]    s_last = 1, s_j = s_j+1 * d_j+1
//! ```
//!
//! Shapes come from the kernel's buffer parameters and from every `Alloc`
//! the pass walks through; allocations also get their shape collapsed to
//! the single element count. Accesses that are already 1-D are left alone,
//! so running the pass twice changes nothing.

use std::collections::HashMap;

use crate::builder::Array;
use crate::ir::rewrite::Mutator;
use crate::ir::simplify::fold_expr;
use crate::ir::{Block, Expr, Var};

/// Flatten accesses to the root buffers behind `arrays`.
///
/// Derived views are traced back to their root, so slicing inside the
/// kernel never changes the strides used here.
pub fn flatten_arrays(body: &Block, arrays: &[Array]) -> Block {
    let shapes = arrays
        .iter()
        .map(|a| {
            let root = a.root();
            (root.var().clone(), root.shape().to_vec())
        })
        .collect();
    flatten_shapes(body, shapes)
}

/// Flatten against an explicit var → shape table.
pub fn flatten_shapes(body: &Block, shapes: HashMap<Var, Vec<Expr>>) -> Block {
    let mut pass = Flattener {
        shapes,
        rewritten: 0,
    };
    let out = pass.mutate_block(body);
    log::debug!("flatten: rewrote {} accesses", pass.rewritten);
    out
}

/// Row-major linear offset of `indices` into a buffer of `shape`.
///
/// Panics in debug builds if the lengths differ.
pub fn linear_offset(indices: &[Expr], shape: &[Expr]) -> Expr {
    debug_assert_eq!(indices.len(), shape.len());
    let strides = row_major_strides(shape);
    let mut terms = indices
        .iter()
        .zip(&strides)
        .map(|(idx, stride)| idx.clone() * stride.clone());
    let Some(first) = terms.next() else {
        return Expr::Int(0);
    };
    fold_expr(&terms.fold(first, |acc, term| acc + term))
}

fn row_major_strides(shape: &[Expr]) -> Vec<Expr> {
    let mut strides = vec![Expr::Int(1); shape.len()];
    for j in (0..shape.len().saturating_sub(1)).rev() {
        strides[j] = fold_expr(&(strides[j + 1].clone() * shape[j + 1].clone()));
    }
    strides
}

fn element_count(shape: &[Expr]) -> Expr {
    let mut dims = shape.iter().cloned();
    let Some(first) = dims.next() else {
        return Expr::Int(1);
    };
    fold_expr(&dims.fold(first, |acc, d| acc * d))
}

struct Flattener {
    shapes: HashMap<Var, Vec<Expr>>,
    rewritten: usize,
}

impl Flattener {
    fn flatten_indices(&mut self, var: &Var, indices: Vec<Expr>) -> Vec<Expr> {
        if indices.len() < 2 {
            return indices;
        }
        let Some(shape) = self.shapes.get(var) else {
            return indices;
        };
        if shape.len() != indices.len() {
            log::warn!(
                "flatten: {} has rank {} but is accessed with {} indices; left as is",
                var,
                shape.len(),
                indices.len()
            );
            return indices;
        }
        let offset = linear_offset(&indices, shape);
        log::debug!("flatten: {}[{}] -> {}[{}]", var, crate::ir::expr::join(&indices), var, offset);
        self.rewritten += 1;
        vec![offset]
    }
}

impl Mutator for Flattener {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Load { var, indices } => {
                let indices = self.mutate_exprs(indices);
                Expr::Load {
                    var: var.clone(),
                    indices: self.flatten_indices(var, indices),
                }
            }
            _ => self.walk_expr(expr),
        }
    }

    fn mutate_block(&mut self, block: &Block) -> Block {
        match block {
            Block::Store {
                var,
                indices,
                value,
            } => {
                let indices = self.mutate_exprs(indices);
                Block::Store {
                    var: var.clone(),
                    indices: self.flatten_indices(var, indices),
                    value: self.mutate_expr(value),
                }
            }
            Block::Alloc {
                var,
                shape,
                scope,
                body,
            } if shape.len() > 1 => {
                self.shapes.insert(var.clone(), shape.clone());
                Block::Alloc {
                    var: var.clone(),
                    shape: vec![element_count(shape)],
                    scope: scope.clone(),
                    body: Box::new(self.mutate_block(body)),
                }
            }
            _ => self.walk_block(block),
        }
    }
}
