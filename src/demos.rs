//! Reference kernels used by the CLI, the integration tests and the benches.

use crate::builder::{Array, IRBuilder, LoopSpec};
use crate::error::{Error, Result};
use crate::ir::{DType, Range, Var};
use crate::kernel::{KernelDef, TensorDesc};
use crate::keys;

/// Boxed kernel function, so every demo has the same type.
pub type DemoFn = Box<dyn FnOnce(&mut IRBuilder, &[Array], &[Var]) -> Result<()> + Send>;

pub type Demo = KernelDef<DemoFn>;

/// Names accepted by `demo`.
pub const DEMOS: &[&str] = &["fill", "relu", "gemm", "zigzag"];

/// Look up a demo kernel by name. `size` sets the problem size of the
/// fixed-shape demos; `fill` and `relu` ignore it.
pub fn demo(name: &str, size: i64) -> Result<Demo> {
    if size <= 0 {
        return Err(Error::config(format!("demo size must be positive, got {}", size)));
    }
    match name {
        "fill" => Ok(fill()),
        "relu" => Ok(relu()),
        "gemm" => Ok(gemm(size, size, size)),
        "zigzag" => Ok(zigzag(size)),
        other => Err(Error::config(format!(
            "unknown demo '{}' (available: {})",
            other,
            DEMOS.join(", ")
        ))),
    }
}

/// Fill a 2x2 local buffer with ones through a fully unrolled double loop,
/// then copy its first element to `out[0]`.
pub fn fill() -> Demo {
    let out = TensorDesc::input("out", DType::Float32, [1]);
    let func: DemoFn = Box::new(|b: &mut IRBuilder, bufs: &[Array], _: &[Var]| {
        let buf = b.alloc([2, 2], "local", DType::Float32, "buf");
        b.unroll_for(LoopSpec::new(["i", "j"], [0..2, 0..2]), |b, v| {
            b.store(&buf, &keys![&v[0], &v[1]], 1.0)
        })?;
        let first = buf.get(&keys![0, 0])?;
        b.store(&bufs[0], &keys![0], first)
    });
    KernelDef::new("fill", vec![out], vec![], func)
}

/// `out[i] = max(x[i], 0)` over a length known only at run time.
pub fn relu() -> Demo {
    let len = Var::new(DType::Int32, "len");
    let x = TensorDesc::input("x", DType::Float32, [&len]);
    let out = TensorDesc::input("out", DType::Float32, [&len]);
    let func: DemoFn = Box::new(|b: &mut IRBuilder, bufs: &[Array], scalars: &[Var]| {
        let (x, out) = (&bufs[0], &bufs[1]);
        b.spatial_for(
            LoopSpec::single("i", Range::new(0, &scalars[0], 1)).with_bindings(["x"]),
            |b, v| {
                let value = x.get(&keys![&v[0]])?.max(0.0);
                b.store(out, &keys![&v[0]], value)
            },
        )
    });
    KernelDef::new("relu", vec![x, out], vec![len], func)
}

/// `C = A @ B` with a per-element local accumulator.
pub fn gemm(m: i64, n: i64, k: i64) -> Demo {
    let a = TensorDesc::input("A", DType::Float32, [m, k]);
    let bm = TensorDesc::input("B", DType::Float32, [k, n]);
    let c = TensorDesc::input("C", DType::Float32, [m, n]);
    let func: DemoFn = Box::new(move |b: &mut IRBuilder, bufs: &[Array], _: &[Var]| {
        let (a, bm, c) = (&bufs[0], &bufs[1], &bufs[2]);
        let spec = LoopSpec::new(["i", "j"], [0..m, 0..n]).with_bindings(["y", "x"]);
        b.spatial_for(spec, |b, v| {
            let (i, j) = (&v[0], &v[1]);
            let acc = b.alloc([1], "local", DType::Float32, "acc");
            b.store(&acc, &keys![0], 0.0)?;
            b.reduce_for(LoopSpec::single("k", 0..k), |b, r| {
                let kk = &r[0];
                let prod = a.get(&keys![i, kk])? * bm.get(&keys![kk, j])?;
                b.store(&acc, &keys![0], acc.get(&keys![0])? + prod)
            })?;
            b.store(c, &keys![i, j], acc.get(&keys![0])?)
        })
    });
    KernelDef::new("gemm", vec![a, bm, c], vec![], func)
}

/// Copy `n` elements with a zigzag loop.
pub fn zigzag(n: i64) -> Demo {
    let src = TensorDesc::input("src", DType::Float32, [n]);
    let dst = TensorDesc::input("dst", DType::Float32, [n]);
    let func: DemoFn = Box::new(move |b: &mut IRBuilder, bufs: &[Array], _: &[Var]| {
        let (src, dst) = (&bufs[0], &bufs[1]);
        b.zigzag_for(LoopSpec::single("i", 0..n), |b, v| {
            b.store(dst, &keys![&v[0]], src.get(&keys![&v[0]])?)
        })
    });
    KernelDef::new("zigzag", vec![src, dst], vec![], func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Block;
    use crate::kernel::IntoKernel;

    #[test]
    fn test_demo_lookup() {
        for name in DEMOS {
            assert!(demo(name, 4).is_ok(), "demo {} should exist", name);
        }
        assert!(matches!(demo("conv", 4), Err(Error::Configuration(_))));
        assert!(matches!(demo("gemm", 0), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_every_demo_lowers() {
        for name in DEMOS {
            let kernel = demo(name, 3).unwrap().into_kernel().unwrap();
            assert_eq!(kernel.name(), *name);
            assert!(!kernel.body.stores().is_empty());
        }
    }

    #[test]
    fn test_gemm_structure() {
        let kernel = gemm(2, 3, 4).into_kernel().unwrap();
        let Block::For { iter, binding, .. } = &kernel.body else {
            panic!("expected outer loop");
        };
        assert_eq!(iter.var.name(), "i");
        assert_eq!(binding, "y");
        let text = kernel.body.to_string();
        assert!(text.contains("for k in range(0, 4, 1) reduce {"));
        assert!(text.contains("store acc[0] = (acc[0] + (A[((i * 4) + k)] * B[((k * 3) + j)]))"));
        assert!(text.contains("store C[((i * 3) + j)] = acc[0]"));
    }

    #[test]
    fn test_relu_keeps_symbolic_extent() {
        let kernel = relu().into_kernel().unwrap();
        assert_eq!(kernel.signature.scalar_params[0].name(), "len");
        assert!(kernel
            .body
            .to_string()
            .starts_with("for i in range(0, len, 1) spatial @\"x\" {"));
    }
}
