//! Kernel assembly: trace a kernel function, lower it, run the passes and
//! hand the body to a codegen backend.
//!
//! ```text
//! program_lower:  trace (client closure) → lower → flatten → simplify → Kernel
//! program_build:  Kernel (or KernelDef) → SourceLowering → Kernel { source }
//! ```


use rayon::prelude::*;
use serde::Serialize;

use crate::builder::{Array, IRBuilder};
use crate::codegen::{create_source_lowering, create_source_lowering_for, SourceLowering};
use crate::config::TargetConfig;
use crate::error::{Error, Result};
use crate::ir::simplify::fold_block;
use crate::ir::{print_ir, Block, DType, Expr, Var};
use crate::passes::flatten_arrays;

/// Storage class given to the root view of every buffer parameter.
pub const PARAM_SCOPE: &str = "global";

/// A buffer parameter: backing variable plus its logical shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TensorDesc {
    pub var: Var,
    pub shape: Vec<Expr>,
}

impl TensorDesc {
    pub fn new(var: Var, shape: Vec<Expr>) -> Self {
        Self { var, shape }
    }

    /// Describe a fresh input buffer.
    pub fn input<S: Into<Expr>>(
        name: &str,
        dtype: DType,
        shape: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            Var::new(dtype, name),
            shape.into_iter().map(Into::into).collect(),
        )
    }
}

/// Name and ordered parameters of a kernel.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelSignature {
    pub name: String,
    pub buffer_params: Vec<TensorDesc>,
    pub scalar_params: Vec<Var>,
}

/// A lowered kernel, optionally with generated source attached.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kernel {
    #[serde(flatten)]
    pub signature: KernelSignature,
    pub body: Block,
    pub source: Option<String>,
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Emit this kernel with `backend` without attaching the result.
    pub fn emit(&self, backend: &dyn SourceLowering) -> Result<String> {
        backend.emit_kernel(&self.signature, &self.body)
    }

    /// Content hash of the signature and printed IR (hex blake3).
    ///
    /// Built from display names rather than variable ids, so two traces
    /// of the same kernel hash the same.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.signature.name.as_bytes());
        for tensor in &self.signature.buffer_params {
            let shape: Vec<String> = tensor.shape.iter().map(|d| d.to_string()).collect();
            hasher.update(
                format!("|{}:{}[{}]", tensor.var, tensor.var.dtype(), shape.join(",")).as_bytes(),
            );
        }
        for scalar in &self.signature.scalar_params {
            hasher.update(format!("|{}:{}", scalar, scalar.dtype()).as_bytes());
        }
        hasher.update(b"\n");
        hasher.update(print_ir(&self.body).as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Serialize the kernel artifact as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("cannot serialize kernel '{}': {}", self.name(), e)))
    }
}

/// Post-lowering passes run by `program_lower_with_options`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelOptions {
    /// Rewrite multi-dimensional accesses to linear offsets.
    pub flatten: bool,
    /// Fold integer constants in the lowered body.
    pub simplify: bool,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            flatten: true,
            simplify: true,
        }
    }
}

/// Trace `func` over root views of `buffers` and lower the result.
pub fn program_lower<F>(name: &str, buffers: &[TensorDesc], scalars: &[Var], func: F) -> Result<Kernel>
where
    F: FnOnce(&mut IRBuilder, &[Array], &[Var]) -> Result<()>,
{
    program_lower_with_options(name, buffers, scalars, func, &KernelOptions::default())
}

/// Trace and lower with explicit pass options.
pub fn program_lower_with_options<F>(
    name: &str,
    buffers: &[TensorDesc],
    scalars: &[Var],
    func: F,
    options: &KernelOptions,
) -> Result<Kernel>
where
    F: FnOnce(&mut IRBuilder, &[Array], &[Var]) -> Result<()>,
{
    let mut builder = IRBuilder::new();
    let arrays: Vec<Array> = buffers
        .iter()
        .map(|t| {
            let array = Array::new(t.var.clone(), t.shape.clone(), PARAM_SCOPE);
            builder.bind_array(&array);
            array
        })
        .collect();

    func(&mut builder, &arrays, scalars)?;
    let mut body = builder.build()?;

    if options.flatten {
        body = flatten_arrays(&body, &arrays);
    }
    if options.simplify {
        body = fold_block(&body);
    }
    log::info!(
        "lowered kernel '{}' ({} buffers, {} scalars, {} stores)",
        name,
        buffers.len(),
        scalars.len(),
        body.stores().len()
    );

    Ok(Kernel {
        signature: KernelSignature {
            name: name.to_string(),
            buffer_params: buffers.to_vec(),
            scalar_params: scalars.to_vec(),
        },
        body,
        source: None,
    })
}

/// Anything `program_build` can turn into a lowered kernel.
pub trait IntoKernel {
    fn into_kernel(self) -> Result<Kernel>;
}

impl IntoKernel for Kernel {
    fn into_kernel(self) -> Result<Kernel> {
        Ok(self)
    }
}

/// A kernel function with its parameters, lowered on demand.
pub struct KernelDef<F> {
    pub name: String,
    pub buffers: Vec<TensorDesc>,
    pub scalars: Vec<Var>,
    pub options: KernelOptions,
    pub func: F,
}

impl<F> KernelDef<F>
where
    F: FnOnce(&mut IRBuilder, &[Array], &[Var]) -> Result<()>,
{
    pub fn new(name: &str, buffers: Vec<TensorDesc>, scalars: Vec<Var>, func: F) -> Self {
        Self {
            name: name.to_string(),
            buffers,
            scalars,
            options: KernelOptions::default(),
            func,
        }
    }

    pub fn with_options(mut self, options: KernelOptions) -> Self {
        self.options = options;
        self
    }
}

impl<F> IntoKernel for KernelDef<F>
where
    F: FnOnce(&mut IRBuilder, &[Array], &[Var]) -> Result<()>,
{
    fn into_kernel(self) -> Result<Kernel> {
        program_lower_with_options(
            &self.name,
            &self.buffers,
            &self.scalars,
            self.func,
            &self.options,
        )
    }
}

/// Lower (if needed) and emit for a built-in target.
pub fn program_build(kernel: impl IntoKernel, target: &str) -> Result<Kernel> {
    let backend = create_source_lowering(target)
        .ok_or_else(|| Error::UnsupportedTarget(target.to_string()))?;
    build_with(kernel, backend.as_ref())
}

/// Lower (if needed) and emit for an explicit target configuration.
pub fn program_build_for(kernel: impl IntoKernel, config: TargetConfig) -> Result<Kernel> {
    let backend = create_source_lowering_for(config);
    build_with(kernel, backend.as_ref())
}

fn build_with(kernel: impl IntoKernel, backend: &dyn SourceLowering) -> Result<Kernel> {
    let mut kernel = kernel.into_kernel()?;
    let source = kernel.emit(backend)?;
    log::info!(
        "built kernel '{}' for {} ({} bytes)",
        kernel.name(),
        backend.target_name(),
        source.len()
    );
    kernel.source = Some(source);
    Ok(kernel)
}

/// Build independent kernels in parallel, one builder context each.
///
/// Results come back in input order.
pub fn program_build_all<K>(kernels: Vec<K>, target: &str) -> Vec<Result<Kernel>>
where
    K: IntoKernel + Send,
{
    kernels
        .into_par_iter()
        .map(|kernel| program_build(kernel, target))
        .collect()
}
