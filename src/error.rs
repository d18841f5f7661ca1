//! Error taxonomy for tracing, lowering and code generation.
//!
//! Every failure is local and synchronous: it is raised at the offending
//! builder call (or pass) and aborts the current trace. Nothing is retried,
//! since tracing is deterministic.

use thiserror::Error;

/// Errors raised while building, lowering or emitting a kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed loop specification, kernel trace or target configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Number of index keys differs from the rank of the indexed view.
    #[error("shape mismatch: expected {expected} index keys, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// A statically known index or slice falls outside its dimension.
    #[error("index out of bounds in dimension {dim}: {detail}")]
    OutOfBounds { dim: usize, detail: String },

    /// The operation is deliberately unsupported (e.g. unrolling a loop
    /// with a symbolic extent, loading through a partially indexed view).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// No code generation backend is registered under this name.
    #[error("unsupported target '{0}'")]
    UnsupportedTarget(String),

    /// A backend met an IR node it cannot emit.
    #[error("target '{target}' cannot emit {construct}")]
    UnsupportedConstruct { target: String, construct: String },

    /// Scopes were closed out of LIFO order, or left open at build time.
    #[error("scope stack discipline violated: {0}")]
    StackDiscipline(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedOperation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = Error::ShapeMismatch {
            expected: 2,
            found: 3,
        };
        assert_eq!(
            e.to_string(),
            "shape mismatch: expected 2 index keys, found 3"
        );

        let e = Error::UnsupportedTarget("wasm".into());
        assert_eq!(e.to_string(), "unsupported target 'wasm'");

        let e = Error::OutOfBounds {
            dim: 1,
            detail: "index 8 not in [0, 8)".into(),
        };
        assert_eq!(
            e.to_string(),
            "index out of bounds in dimension 1: index 8 not in [0, 8)"
        );
    }

    #[test]
    fn test_helpers() {
        assert_eq!(
            Error::config("bad"),
            Error::Configuration("bad".to_string())
        );
        assert_eq!(
            Error::unsupported("fill"),
            Error::UnsupportedOperation("fill".to_string())
        );
    }
}
