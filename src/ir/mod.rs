//! Intermediate representation produced by lowering a kernel trace.
//!
//! Two layers:
//! - `expr`: scalar vocabulary (types, variables, expressions, ranges).
//! - `block`: the lowered statement tree handed to passes and codegen.
//!
//! ```text
//! IRBuilder trace → StagingTree → lower → Block → flatten → codegen
//! ```
//!
//! Both layers are immutable; passes (`rewrite`, `simplify`) build new
//! trees rather than editing in place.

pub mod block;
pub mod expr;
pub mod rewrite;
pub mod simplify;

pub use block::{print_ir, Block};
pub use expr::{BinOp, DType, Expr, IterKind, IterVar, MapVar, Range, Var};
pub use rewrite::{substitute_block, substitute_expr, Mutator};
