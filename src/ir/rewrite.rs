//! Structural tree rewriting.
//!
//! A `Mutator` walks a block and returns a freshly built tree. The default
//! methods rebuild every node unchanged; implementors override the hooks
//! they care about and call `walk_expr` / `walk_block` to recurse.

use std::collections::HashMap;

use super::block::Block;
use super::expr::{Expr, IterVar, MapVar, Range, Var};

pub trait Mutator {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        self.walk_expr(expr)
    }

    fn mutate_block(&mut self, block: &Block) -> Block {
        self.walk_block(block)
    }

    fn mutate_exprs(&mut self, exprs: &[Expr]) -> Vec<Expr> {
        exprs.iter().map(|e| self.mutate_expr(e)).collect()
    }

    fn mutate_range(&mut self, range: &Range) -> Range {
        Range {
            begin: self.mutate_expr(&range.begin),
            extent: self.mutate_expr(&range.extent),
            step: self.mutate_expr(&range.step),
        }
    }

    fn walk_expr(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Var(_) => expr.clone(),
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(self.mutate_expr(lhs)),
                rhs: Box::new(self.mutate_expr(rhs)),
            },
            Expr::Cast { dtype, value } => Expr::Cast {
                dtype: *dtype,
                value: Box::new(self.mutate_expr(value)),
            },
            Expr::Load { var, indices } => Expr::Load {
                var: var.clone(),
                indices: self.mutate_exprs(indices),
            },
            Expr::Call { dtype, name, args } => Expr::Call {
                dtype: *dtype,
                name: name.clone(),
                args: self.mutate_exprs(args),
            },
        }
    }

    fn walk_block(&mut self, block: &Block) -> Block {
        match block {
            Block::Seq(a, b) => Block::seq(self.mutate_block(a), self.mutate_block(b)),
            Block::For {
                iter,
                body,
                binding,
            } => Block::For {
                iter: IterVar {
                    var: iter.var.clone(),
                    range: self.mutate_range(&iter.range),
                    kind: iter.kind,
                },
                body: Box::new(self.mutate_block(body)),
                binding: binding.clone(),
            },
            Block::Alloc {
                var,
                shape,
                scope,
                body,
            } => Block::Alloc {
                var: var.clone(),
                shape: self.mutate_exprs(shape),
                scope: scope.clone(),
                body: Box::new(self.mutate_block(body)),
            },
            Block::Remap { bindings, body } => Block::Remap {
                bindings: bindings
                    .iter()
                    .map(|m| MapVar::new(m.var.clone(), self.mutate_expr(&m.expr)))
                    .collect(),
                body: Box::new(self.mutate_block(body)),
            },
            Block::Evaluate(e) => Block::Evaluate(self.mutate_expr(e)),
            Block::Store {
                var,
                indices,
                value,
            } => Block::Store {
                var: var.clone(),
                indices: self.mutate_exprs(indices),
                value: self.mutate_expr(value),
            },
        }
    }
}

/// Replaces variable occurrences according to a var → expr map.
pub struct Substitute<'a> {
    map: &'a HashMap<Var, Expr>,
}

impl<'a> Substitute<'a> {
    pub fn new(map: &'a HashMap<Var, Expr>) -> Self {
        Self { map }
    }
}

impl Mutator for Substitute<'_> {
    fn mutate_expr(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Var(v) => match self.map.get(v) {
                Some(replacement) => replacement.clone(),
                None => expr.clone(),
            },
            _ => self.walk_expr(expr),
        }
    }
}

/// Substitute variables throughout a block. The input is left untouched.
pub fn substitute_block(block: &Block, map: &HashMap<Var, Expr>) -> Block {
    Substitute::new(map).mutate_block(block)
}

pub fn substitute_expr(expr: &Expr, map: &HashMap<Var, Expr>) -> Expr {
    Substitute::new(map).mutate_expr(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DType, IterKind};

    #[test]
    fn test_substitute_expr() {
        let i = Var::new(DType::Int32, "i");
        let j = Var::new(DType::Int32, "i");
        let e = &i * 4 + &j;
        let map = HashMap::from([(i.clone(), Expr::Int(3))]);
        // Same display name, different variable: `j` survives.
        assert_eq!(substitute_expr(&e, &map).to_string(), "((3 * 4) + i)");
    }

    #[test]
    fn test_substitute_block_reaches_ranges_and_loads() {
        let a = Var::new(DType::Float32, "a");
        let i = Var::new(DType::Int32, "i");
        let k = Var::new(DType::Int32, "k");
        let body = Block::For {
            iter: IterVar::new(k.clone(), Range::new(&i, 2, 1), IterKind::Reduce),
            body: Box::new(Block::Store {
                var: a.clone(),
                indices: vec![Expr::from(&i)],
                value: Expr::Load {
                    var: a.clone(),
                    indices: vec![Expr::from(&k)],
                },
            }),
            binding: String::new(),
        };
        let map = HashMap::from([(i.clone(), Expr::Int(7))]);
        let out = substitute_block(&body, &map);
        let Block::For { iter, body: inner, .. } = &out else {
            panic!("expected loop");
        };
        assert_eq!(iter.range.begin, Expr::Int(7));
        assert_eq!(iter.var, k);
        let Block::Store { indices, value, .. } = inner.as_ref() else {
            panic!("expected store");
        };
        assert_eq!(indices, &vec![Expr::Int(7)]);
        assert_eq!(
            value,
            &Expr::Load {
                var: a,
                indices: vec![Expr::from(&k)]
            }
        );

        // Original tree is unchanged.
        let Block::For { iter, .. } = &body else {
            unreachable!()
        };
        assert_eq!(iter.range.begin, Expr::from(&i));
    }
}
