//! Staging tree: the trace-time record of scopes opened by builder calls.
//!
//! Nodes live in an arena and refer to their children by `ScopeId`. A
//! LIFO stack tracks which nodes are currently open; new nodes are appended
//! as the last child of the top of the stack.

use std::fmt;

use crate::error::{Error, Result};
use crate::ir::{Block, Expr, IterKind, MapVar, Range, Var};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) usize);

/// What a scope node lowers to.
#[derive(Debug, Clone)]
pub enum ScopeKind {
    Root,
    Alloc {
        var: Var,
        shape: Vec<Expr>,
        scope: String,
    },
    Loop {
        kind: IterKind,
        vars: Vec<Var>,
        ranges: Vec<Range>,
        bindings: Vec<String>,
    },
    Remap {
        bindings: Vec<MapVar>,
    },
    /// A leaf statement; never pushed onto the stack.
    Stmt(Block),
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Root => write!(f, "root"),
            ScopeKind::Alloc { var, .. } => write!(f, "alloc {}", var),
            ScopeKind::Loop { kind, vars, .. } => {
                let names: Vec<String> = vars.iter().map(|v| v.to_string()).collect();
                write!(f, "{} loop ({})", kind, names.join(", "))
            }
            ScopeKind::Remap { bindings } => {
                let names: Vec<String> = bindings.iter().map(|m| m.var.to_string()).collect();
                write!(f, "remap ({})", names.join(", "))
            }
            ScopeKind::Stmt(_) => write!(f, "statement"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub kind: ScopeKind,
    pub children: Vec<ScopeId>,
    /// Closed together with the enclosing scope rather than explicitly.
    pub(crate) implicit: bool,
}

/// Proof that a scope is open. Consumed by `IRBuilder::end_scope`.
#[must_use = "an opened scope must be closed with `end_scope`"]
#[derive(Debug, PartialEq, Eq)]
pub struct ScopeHandle {
    pub(crate) id: ScopeId,
}

#[derive(Debug)]
pub struct StagingTree {
    nodes: Vec<ScopeNode>,
    stack: Vec<ScopeId>,
}

impl Default for StagingTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StagingTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![ScopeNode {
                kind: ScopeKind::Root,
                children: Vec::new(),
                implicit: false,
            }],
            stack: vec![ScopeId(0)],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Number of currently open scopes, the root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn top(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId(0))
    }

    fn append(&mut self, kind: ScopeKind, implicit: bool) -> ScopeId {
        let id = ScopeId(self.nodes.len());
        let parent = self.top();
        self.nodes.push(ScopeNode {
            kind,
            children: Vec::new(),
            implicit,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Append a nesting scope and make it the innermost open scope.
    pub(crate) fn open(&mut self, kind: ScopeKind, implicit: bool) -> ScopeId {
        debug_assert!(!matches!(kind, ScopeKind::Stmt(_) | ScopeKind::Root));
        let id = self.append(kind, implicit);
        self.stack.push(id);
        log::trace!("open scope #{} ({}), depth {}", id.0, self.nodes[id.0].kind, self.stack.len());
        id
    }

    /// Record a leaf statement in the innermost open scope.
    pub(crate) fn record(&mut self, stmt: Block) -> ScopeId {
        self.append(ScopeKind::Stmt(stmt), false)
    }

    /// Close `id`, along with any implicit scopes opened inside it.
    ///
    /// Fails without touching the stack if `id` is not open or an explicit
    /// scope opened after it is still open.
    pub(crate) fn close(&mut self, id: ScopeId) -> Result<()> {
        let Some(pos) = self.stack.iter().rposition(|&s| s == id) else {
            return Err(Error::StackDiscipline(match self.nodes.get(id.0) {
                Some(node) => format!("scope #{} ({}) is not open", id.0, node.kind),
                None => format!("scope #{} does not belong to this builder", id.0),
            }));
        };
        if pos == 0 {
            return Err(Error::StackDiscipline("the root scope cannot be closed".into()));
        }
        if let Some(&inner) = self.stack[pos + 1..]
            .iter()
            .find(|s| !self.nodes[s.0].implicit)
        {
            return Err(Error::StackDiscipline(format!(
                "cannot close {} while {} is still open",
                self.nodes[id.0].kind, self.nodes[inner.0].kind
            )));
        }
        self.stack.truncate(pos);
        log::trace!("close scope #{}, depth {}", id.0, self.stack.len());
        Ok(())
    }

    /// Check that only implicit scopes remain open above the root.
    pub(crate) fn finish(&self) -> Result<()> {
        match self.stack[1..].iter().find(|s| !self.nodes[s.0].implicit) {
            Some(open) => Err(Error::StackDiscipline(format!(
                "{} was never closed",
                self.nodes[open.0].kind
            ))),
            None => Ok(()),
        }
    }
}
