//! Integer constant folding.
//!
//! Folds literal integer arithmetic and the `x + 0`, `x - 0`, `x * 1`,
//! `x * 0` identities on integer-typed operands. `x * 0` is kept when `x`
//! contains a call. Float arithmetic, comparisons and calls are never
//! folded.

use super::block::Block;
use super::expr::{BinOp, Expr};
use super::rewrite::Mutator;

struct Folder;

impl Mutator for Folder {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.mutate_expr(lhs);
                let rhs = self.mutate_expr(rhs);
                fold_binary(*op, lhs, rhs)
            }
            _ => self.walk_expr(expr),
        }
    }
}

/// Floor division; `None` on division by zero or overflow.
pub fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

pub fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let q = floor_div(a, b)?;
    a.checked_sub(q.checked_mul(b)?)
}

fn fold_binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
        let folded = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::FloorDiv => floor_div(a, b),
            BinOp::Mod => floor_mod(a, b),
            BinOp::Min => Some(a.min(b)),
            BinOp::Max => Some(a.max(b)),
            BinOp::Lt | BinOp::Le | BinOp::Eq => None,
        };
        if let Some(v) = folded {
            return Expr::Int(v);
        }
        return Expr::binary(op, lhs, rhs);
    }

    let int_operands = lhs.dtype().is_int() && rhs.dtype().is_int();
    match (op, lhs.as_int(), rhs.as_int()) {
        (BinOp::Add, Some(0), _) if int_operands => rhs,
        (BinOp::Add, _, Some(0)) | (BinOp::Sub, _, Some(0)) if int_operands => lhs,
        (BinOp::Mul, Some(1), _) if int_operands => rhs,
        (BinOp::Mul, _, Some(1)) | (BinOp::FloorDiv, _, Some(1)) if int_operands => lhs,
        (BinOp::Mul, Some(0), _) | (BinOp::Mul, _, Some(0))
            if int_operands && !has_call(&lhs) && !has_call(&rhs) =>
        {
            Expr::Int(0)
        }
        _ => Expr::binary(op, lhs, rhs),
    }
}

/// Calls are opaque and may have side effects; never fold them away.
fn has_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } => true,
        Expr::Binary { lhs, rhs, .. } => has_call(lhs) || has_call(rhs),
        Expr::Cast { value, .. } => has_call(value),
        Expr::Load { indices, .. } => indices.iter().any(has_call),
        Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Var(_) => false,
    }
}

pub fn fold_expr(expr: &Expr) -> Expr {
    Folder.mutate_expr(expr)
}

pub fn fold_block(block: &Block) -> Block {
    Folder.mutate_block(block)
}
