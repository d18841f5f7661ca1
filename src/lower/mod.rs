//! Lowering: turns a finished staging tree into Block IR.
//!
//! One bottom-up walk. Each node lowers its children first, folds them
//! right-to-left into a single body (`A; B; C` → `Seq(A, Seq(B, C))`) and
//! then wraps that body according to its scope kind:
//!
//! - `Root`: exactly one child, returned as is.
//! - `Alloc` / `Remap`: wrapped in `Block::Alloc` / `Block::Remap`.
//! - `Stmt`: the recorded statement.
//! - `Loop`: one `Block::For` per index, innermost first; `Unroll` loops
//!   are instead expanded into substituted copies of the body.


use std::collections::HashMap;

use crate::builder::staging::{ScopeId, ScopeKind, StagingTree};
use crate::error::{Error, Result};
use crate::ir::{substitute_block, Block, Expr, IterKind, IterVar, Range, Var};

/// Lower the whole tree, starting at its root.
pub fn lower_tree(tree: &StagingTree) -> Result<Block> {
    log::debug!("lowering staging tree with {} scopes", tree.len());
    lower_node(tree, tree.root())
}

fn lower_node(tree: &StagingTree, id: ScopeId) -> Result<Block> {
    let node = tree.node(id);
    let children = node
        .children
        .iter()
        .map(|&child| lower_node(tree, child))
        .collect::<Result<Vec<_>>>()?;

    match &node.kind {
        ScopeKind::Root => {
            if children.len() != 1 {
                return Err(Error::config(format!(
                    "kernel trace must have exactly one top-level scope, found {}",
                    children.len()
                )));
            }
            Ok(children.into_iter().next().unwrap_or_else(Block::noop))
        }
        ScopeKind::Stmt(stmt) => {
            debug_assert!(children.is_empty(), "leaf scopes never have children");
            Ok(stmt.clone())
        }
        ScopeKind::Alloc { var, shape, scope } => Ok(Block::Alloc {
            var: var.clone(),
            shape: shape.clone(),
            scope: scope.clone(),
            body: Box::new(Block::sequence(children)),
        }),
        ScopeKind::Remap { bindings } => Ok(Block::Remap {
            bindings: bindings.clone(),
            body: Box::new(Block::sequence(children)),
        }),
        ScopeKind::Loop {
            kind,
            vars,
            ranges,
            bindings,
        } => {
            let body = Block::sequence(children);
            match kind {
                IterKind::Spatial | IterKind::Reduce | IterKind::Zigzag => {
                    Ok(wrap_loops(*kind, vars, ranges, bindings, body))
                }
                IterKind::Unroll => unroll(vars, ranges, body),
            }
        }
    }
}

/// Wrap `body` in one loop per index, the last declared index innermost.
fn wrap_loops(
    kind: IterKind,
    vars: &[Var],
    ranges: &[Range],
    bindings: &[String],
    mut body: Block,
) -> Block {
    for ((var, range), binding) in vars.iter().zip(ranges).zip(bindings).rev() {
        log::debug!("lower {} loop {} over {}", kind, var, range);
        body = Block::For {
            iter: IterVar::new(var.clone(), range.clone(), kind),
            body: Box::new(body),
            binding: binding.clone(),
        };
    }
    body
}

/// Expand constant loops into sequenced copies of `body`.
///
/// Indices expand innermost first, so the outermost index's copies end up
/// as the outer sequence and instances appear in row-major order.
fn unroll(vars: &[Var], ranges: &[Range], mut body: Block) -> Result<Block> {
    // Check every range before expanding anything.
    let mut plan = Vec::with_capacity(vars.len());
    for (var, range) in vars.iter().zip(ranges) {
        let (extent, step) = range.const_extent_step().ok_or_else(|| {
            Error::unsupported(format!(
                "cannot unroll loop {} over dynamic {}",
                var, range
            ))
        })?;
        if extent < 0 {
            return Err(Error::config(format!(
                "unroll loop {} has negative extent {}",
                var, extent
            )));
        }
        if extent > 0 {
            // Offsets are monotonic in k, so the last copy bounds them all.
            unroll_offset(var, &range.begin, extent - 1, step)?;
        }
        plan.push((var, &range.begin, extent, step));
    }

    for (var, begin, extent, step) in plan.into_iter().rev() {
        log::debug!("unroll {} into {} copies", var, extent);
        let copies = (0..extent)
            .map(|k| -> Result<Block> {
                let offset = unroll_offset(var, begin, k, step)?;
                let map = HashMap::from([(var.clone(), offset)]);
                Ok(substitute_block(&body, &map))
            })
            .collect::<Result<Vec<_>>>()?;
        body = Block::sequence(copies);
    }
    Ok(body)
}

/// `begin + k * step`, as a literal when `begin` is one.
fn unroll_offset(var: &Var, begin: &Expr, k: i64, step: i64) -> Result<Expr> {
    let overflow = || {
        Error::config(format!(
            "unroll loop {} overflows i64 at copy {} (step {})",
            var, k, step
        ))
    };
    let delta = k.checked_mul(step).ok_or_else(overflow)?;
    match begin.as_int() {
        Some(b) => b.checked_add(delta).map(Expr::Int).ok_or_else(overflow),
        None => Ok(begin.clone() + delta),
    }
}
