pub mod builder;
pub mod codegen;
pub mod config;
pub mod demos;
pub mod error;
pub mod ir;
pub mod kernel;
pub mod lower;
pub mod passes;

// Re-exports for client code
pub use builder::{Access, Array, IRBuilder, Key, LoopSpec, ScopeHandle};
pub use codegen::{create_source_lowering, SourceLowering};
pub use config::TargetConfig;
pub use error::{Error, Result};
pub use ir::{print_ir, Block, DType, Expr, IterKind, Range, Var};
pub use kernel::{
    program_build, program_build_all, program_lower, program_lower_with_options, IntoKernel,
    Kernel, KernelDef, KernelOptions, KernelSignature, TensorDesc,
};
