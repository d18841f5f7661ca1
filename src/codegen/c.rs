//! C lowering: Block IR to a C99 kernel function.
//!
//! Variable names are assigned on first use from the display name, with a
//! numeric suffix on clashes, so output is stable across runs no matter
//! which ids the variables were given. Buffer parameters become restrict
//! pointers; allocations become stack arrays inside their own block.
//!
//! Loops need a literal non-zero step; the comparison follows its sign.
//! A zigzag tag is advisory here: the loop is emitted in its declared
//! direction with the tag kept in the header comment.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::SourceLowering;
use crate::config::TargetConfig;
use crate::error::{Error, Result};
use crate::ir::simplify::fold_expr;
use crate::ir::{BinOp, Block, Expr, IterKind, IterVar, Var};
use crate::kernel::KernelSignature;

pub struct CLowering {
    config: TargetConfig,
}

impl CLowering {
    pub fn new() -> Self {
        Self::with_config(TargetConfig::c())
    }

    pub fn with_config(config: TargetConfig) -> Self {
        Self { config }
    }
}

impl Default for CLowering {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLowering for CLowering {
    fn target_name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &TargetConfig {
        &self.config
    }

    fn emit(&self, body: &Block) -> Result<String> {
        let mut emitter = CEmitter::new(&self.config);
        emitter.block(body, 0)?;
        Ok(emitter.finish())
    }

    fn emit_kernel(&self, signature: &KernelSignature, body: &Block) -> Result<String> {
        CEmitter::new(&self.config).kernel(signature, body)
    }
}

/// Integer helpers emitted ahead of the kernel when the body needs them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Helper {
    FloorDiv,
    FloorMod,
}

impl Helper {
    fn name(self) -> &'static str {
        match self {
            Helper::FloorDiv => "stagir_floordiv",
            Helper::FloorMod => "stagir_floormod",
        }
    }

    fn source(self) -> &'static str {
        match self {
            Helper::FloorDiv => {
                "static inline int64_t stagir_floordiv(int64_t a, int64_t b) {\n\
                 \x20 int64_t q = a / b;\n\
                 \x20 return (a % b != 0 && ((a < 0) != (b < 0))) ? q - 1 : q;\n\
                 }\n"
            }
            Helper::FloorMod => {
                "static inline int64_t stagir_floormod(int64_t a, int64_t b) {\n\
                 \x20 int64_t r = a % b;\n\
                 \x20 return (r != 0 && ((r < 0) != (b < 0))) ? r + b : r;\n\
                 }\n"
            }
        }
    }
}

/// One emission run. Names and helper usage are per kernel.
pub(super) struct CEmitter<'a> {
    config: &'a TargetConfig,
    names: HashMap<Var, String>,
    taken: HashSet<String>,
    /// Rank of every stack array declared so far.
    local_ranks: HashMap<Var, usize>,
    helpers: BTreeSet<Helper>,
    out: String,
}

impl<'a> CEmitter<'a> {
    pub(super) fn new(config: &'a TargetConfig) -> Self {
        Self {
            config,
            names: HashMap::new(),
            taken: HashSet::new(),
            local_ranks: HashMap::new(),
            helpers: BTreeSet::new(),
            out: String::new(),
        }
    }

    pub(super) fn kernel(mut self, signature: &KernelSignature, body: &Block) -> Result<String> {
        let func_name = self.name_for(&signature.name);
        let mut params = Vec::new();
        for tensor in &signature.buffer_params {
            let name = self.name_of(&tensor.var);
            let qualifier = match self.config.restrict_keyword.as_str() {
                "" => String::new(),
                kw => format!("{} ", kw),
            };
            params.push(format!(
                "{} *{}{}",
                self.config.type_name(tensor.var.dtype()),
                qualifier,
                name
            ));
        }
        for scalar in &signature.scalar_params {
            let name = self.name_of(scalar);
            params.push(format!("{} {}", self.scalar_type(scalar), name));
        }

        self.block(body, 1)?;

        let mut src = String::new();
        for include in &self.config.includes {
            src.push_str(&format!("#include <{}>\n", include));
        }
        if !self.config.includes.is_empty() {
            src.push('\n');
        }
        for helper in &self.helpers {
            src.push_str(helper.source());
            src.push('\n');
        }
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        src.push_str(&format!("void {}({}) {{\n", func_name, params));
        src.push_str(&self.out);
        src.push_str("}\n");
        Ok(src)
    }

    /// Statements emitted so far.
    pub(super) fn finish(self) -> String {
        self.out
    }

    // ── Names ─────────────────────────────────────────────────────

    fn name_of(&mut self, var: &Var) -> String {
        if let Some(name) = self.names.get(var) {
            return name.clone();
        }
        let name = self.name_for(var.name());
        self.names.insert(var.clone(), name.clone());
        name
    }

    /// Reserve a fresh C identifier derived from `hint`.
    fn name_for(&mut self, hint: &str) -> String {
        let mut base: String = hint
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        if base.is_empty() {
            base.push('v');
        }
        if base.starts_with(|c: char| c.is_ascii_digit()) {
            base.insert(0, '_');
        }
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    fn scalar_type(&self, var: &Var) -> String {
        self.config.type_name(var.dtype()).to_string()
    }

    fn unsupported(&self, construct: impl Into<String>) -> Error {
        Error::UnsupportedConstruct {
            target: self.config.name.clone(),
            construct: construct.into(),
        }
    }

    // ── Statements ────────────────────────────────────────────────

    fn line(&mut self, depth: usize, text: &str) {
        let pad = " ".repeat(depth * self.config.indent_width);
        self.out.push_str(&pad);
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub(super) fn block(&mut self, block: &Block, depth: usize) -> Result<()> {
        match block {
            Block::Seq(first, second) => {
                self.block(first, depth)?;
                self.block(second, depth)
            }
            Block::For {
                iter,
                body,
                binding,
            } => self.for_loop(iter, body, binding, depth),
            Block::Alloc {
                var,
                shape,
                scope,
                body,
            } => {
                let name = self.name_of(var);
                let mut dims = String::new();
                for dim in shape {
                    dims.push_str(&format!("[{}]", self.expr(dim)?));
                }
                let comment = if scope == "local" {
                    String::new()
                } else {
                    format!(" /* {} */", scope)
                };
                let decl = format!(
                    "{} {}{};{}",
                    self.config.type_name(var.dtype()),
                    name,
                    dims,
                    comment
                );
                self.local_ranks.insert(var.clone(), shape.len());
                self.line(depth, "{");
                self.line(depth + 1, &decl);
                self.block(body, depth + 1)?;
                self.line(depth, "}");
                Ok(())
            }
            Block::Remap { bindings, body } => {
                self.line(depth, "{");
                for binding in bindings {
                    let value = self.expr(&binding.expr)?;
                    let name = self.name_of(&binding.var);
                    let decl = format!(
                        "const {} {} = {};",
                        self.scalar_type(&binding.var),
                        name,
                        value
                    );
                    self.line(depth + 1, &decl);
                }
                self.block(body, depth + 1)?;
                self.line(depth, "}");
                Ok(())
            }
            Block::Evaluate(expr) => {
                if !block.is_noop() {
                    let text = format!("{};", self.expr(expr)?);
                    self.line(depth, &text);
                }
                Ok(())
            }
            Block::Store {
                var,
                indices,
                value,
            } => {
                let target = self.access(var, indices)?;
                let value = self.expr(value)?;
                self.line(depth, &format!("{} = {};", target, value));
                Ok(())
            }
        }
    }

    fn for_loop(&mut self, iter: &IterVar, body: &Block, binding: &str, depth: usize) -> Result<()> {
        if iter.kind == IterKind::Zigzag && !self.config.supports_zigzag {
            return Err(self.unsupported(format!("zigzag loop over {}", iter.var)));
        }
        let range = &iter.range;
        let step = match range.step.as_int() {
            Some(0) => return Err(self.unsupported(format!("zero-step loop over {}", iter.var))),
            Some(step) => step,
            None => {
                return Err(self.unsupported(format!(
                    "loop over {} with symbolic step {}",
                    iter.var, range.step
                )))
            }
        };
        let name = self.name_of(&iter.var);
        let begin = self.expr(&range.begin)?;
        let end = fold_expr(&(range.begin.clone() + range.extent.clone() * step));
        let end = self.expr(&end)?;
        let (cmp, advance) = match step {
            1 => ("<", format!("++{}", name)),
            -1 => (">", format!("--{}", name)),
            s if s > 0 => ("<", format!("{} += {}", name, s)),
            s => (">", format!("{} -= {}", name, s.unsigned_abs())),
        };
        let tag = if binding.is_empty() {
            iter.kind.to_string()
        } else {
            format!("{} {}", iter.kind, binding)
        };
        if iter.kind == IterKind::Unroll {
            self.line(depth, "#pragma unroll");
        }
        let header = format!(
            "for ({} {} = {}; {} {} {}; {}) {{ /* {} */",
            self.config.index_type, name, begin, name, cmp, end, advance, tag
        );
        self.line(depth, &header);
        self.block(body, depth + 1)?;
        self.line(depth, "}");
        Ok(())
    }

    // ── Expressions ───────────────────────────────────────────────

    fn access(&mut self, var: &Var, indices: &[Expr]) -> Result<String> {
        let multi_ok = self.local_ranks.get(var) == Some(&indices.len());
        if indices.is_empty() || (indices.len() > 1 && !multi_ok) {
            return Err(self.unsupported(format!(
                "{}-index access to buffer {} (flatten the kernel first)",
                indices.len(),
                var
            )));
        }
        let mut text = self.name_of(var);
        for idx in indices {
            text.push_str(&format!("[{}]", self.expr(idx)?));
        }
        Ok(text)
    }

    fn expr(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Int(v) => Ok(v.to_string()),
            Expr::Float(v) => Ok(float_literal(*v)),
            Expr::Str(s) => Ok(format!("{:?}", s)),
            Expr::Var(v) => Ok(self.name_of(v)),
            Expr::Binary { op, lhs, rhs } => {
                let float = lhs.dtype().is_float() || rhs.dtype().is_float();
                let a = self.expr(lhs)?;
                let b = self.expr(rhs)?;
                match op {
                    BinOp::FloorDiv | BinOp::Mod if float => Err(self.unsupported(format!(
                        "{} on floating-point operands",
                        op.symbol()
                    ))),
                    BinOp::FloorDiv => Ok(self.helper_call(Helper::FloorDiv, &a, &b)),
                    BinOp::Mod => Ok(self.helper_call(Helper::FloorMod, &a, &b)),
                    BinOp::Min => Ok(format!("(({a}) < ({b}) ? ({a}) : ({b}))")),
                    BinOp::Max => Ok(format!("(({a}) > ({b}) ? ({a}) : ({b}))")),
                    _ => Ok(format!("({} {} {})", a, op.symbol(), b)),
                }
            }
            Expr::Cast { dtype, value } => {
                let value = self.expr(value)?;
                Ok(format!("(({}){})", self.config.type_name(*dtype), value))
            }
            Expr::Load { var, indices } => self.access(var, indices),
            Expr::Call { name, args, .. } => {
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{}({})", name, args.join(", ")))
            }
        }
    }

    fn helper_call(&mut self, helper: Helper, a: &str, b: &str) -> String {
        self.helpers.insert(helper);
        format!("{}({}, {})", helper.name(), a, b)
    }
}

fn float_literal(v: f64) -> String {
    if v.is_nan() {
        "NAN".to_string()
    } else if v == f64::INFINITY {
        "INFINITY".to_string()
    } else if v == f64::NEG_INFINITY {
        "-INFINITY".to_string()
    } else {
        format!("{:?}f", v)
    }
}
