//! Block IR: the lowered, immutable statement tree.

use std::fmt;

use serde::Serialize;

use super::expr::{join, Expr, IterVar, MapVar, Var};

/// A lowered statement.
///
/// `Seq` chains are right-nested: `A; B; C` is `Seq(A, Seq(B, C))`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    Seq(Box<Block>, Box<Block>),
    /// Counted loop. A `Zigzag` iterator is kept as a direction-reversal
    /// tag for the backend; no pass here reverses iteration.
    For {
        iter: IterVar,
        body: Box<Block>,
        binding: String,
    },
    Alloc {
        var: Var,
        shape: Vec<Expr>,
        scope: String,
        body: Box<Block>,
    },
    Remap {
        bindings: Vec<MapVar>,
        body: Box<Block>,
    },
    Evaluate(Expr),
    Store {
        var: Var,
        indices: Vec<Expr>,
        value: Expr,
    },
}

impl Block {
    /// The no-op statement (evaluates the literal 0).
    pub fn noop() -> Self {
        Block::Evaluate(Expr::Int(0))
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Block::Evaluate(Expr::Int(0)))
    }

    pub fn seq(first: Block, second: Block) -> Self {
        Block::Seq(Box::new(first), Box::new(second))
    }

    /// Right-fold blocks into one body, preserving order.
    ///
    /// The last block is the base and each preceding block is prepended
    /// with `Seq`. An empty list yields `noop()`.
    pub fn sequence(blocks: Vec<Block>) -> Self {
        let mut iter = blocks.into_iter().rev();
        let Some(mut body) = iter.next() else {
            return Block::noop();
        };
        for prev in iter {
            body = Block::seq(prev, body);
        }
        body
    }

    /// Statements in program order, looking through `Seq` nodes.
    pub fn statements(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        self.collect_statements(&mut out);
        out
    }

    fn collect_statements<'a>(&'a self, out: &mut Vec<&'a Block>) {
        match self {
            Block::Seq(a, b) => {
                a.collect_statements(out);
                b.collect_statements(out);
            }
            other => out.push(other),
        }
    }

    /// Every `Store` reachable from this block, in program order.
    pub fn stores(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        self.collect_stores(&mut out);
        out
    }

    fn collect_stores<'a>(&'a self, out: &mut Vec<&'a Block>) {
        match self {
            Block::Seq(a, b) => {
                a.collect_stores(out);
                b.collect_stores(out);
            }
            Block::For { body, .. } | Block::Alloc { body, .. } | Block::Remap { body, .. } => {
                body.collect_stores(out)
            }
            Block::Store { .. } => out.push(self),
            Block::Evaluate(_) => {}
        }
    }
}

// ─── Printing ─────────────────────────────────────────────────────

/// Render a block as indented IR text.
pub fn print_ir(block: &Block) -> String {
    let mut out = String::new();
    write_block(&mut out, block, 0);
    out
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    let pad = "  ".repeat(depth);
    match block {
        Block::Seq(a, b) => {
            write_block(out, a, depth);
            write_block(out, b, depth);
        }
        Block::For {
            iter,
            body,
            binding,
        } => {
            out.push_str(&format!(
                "{}for {} in {} {}",
                pad, iter.var, iter.range, iter.kind
            ));
            if !binding.is_empty() {
                out.push_str(&format!(" @{:?}", binding));
            }
            out.push_str(" {\n");
            write_block(out, body, depth + 1);
            out.push_str(&format!("{}}}\n", pad));
        }
        Block::Alloc {
            var,
            shape,
            scope,
            body,
        } => {
            out.push_str(&format!(
                "{}alloc {}[{}] {} {} {{\n",
                pad,
                var,
                join(shape),
                var.dtype(),
                scope
            ));
            write_block(out, body, depth + 1);
            out.push_str(&format!("{}}}\n", pad));
        }
        Block::Remap { bindings, body } => {
            let binds = bindings
                .iter()
                .map(|m| format!("{} = {}", m.var, m.expr))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{}remap {} {{\n", pad, binds));
            write_block(out, body, depth + 1);
            out.push_str(&format!("{}}}\n", pad));
        }
        Block::Evaluate(e) => {
            if block.is_noop() {
                out.push_str(&format!("{}nop\n", pad));
            } else {
                out.push_str(&format!("{}eval {}\n", pad, e));
            }
        }
        Block::Store {
            var,
            indices,
            value,
        } => {
            out.push_str(&format!(
                "{}store {}[{}] = {}\n",
                pad,
                var,
                join(indices),
                value
            ));
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print_ir(self))
    }
}
