//! Arm Cortex-M lowering: C with CMSIS headers.
//!
//! Shares the C emitter. Kernels get a banner naming the target, use
//! `float16_t` for half-precision elements, and reject zigzag loops since
//! the target has no direction-reversal support.

use super::c::CEmitter;
use super::SourceLowering;
use crate::config::TargetConfig;
use crate::error::Result;
use crate::ir::Block;
use crate::kernel::KernelSignature;

pub struct ArmMLowering {
    config: TargetConfig,
}

impl ArmMLowering {
    pub fn new() -> Self {
        Self::with_config(TargetConfig::arm_m())
    }

    pub fn with_config(config: TargetConfig) -> Self {
        Self { config }
    }
}

impl Default for ArmMLowering {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLowering for ArmMLowering {
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
        let kernel = CEmitter::new(&self.config).kernel(signature, body)?;
        Ok(format!(
            "/* {} kernel `{}` */\n{}",
            self.config.display_name, signature.name, kernel
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ir::{DType, Expr, IterKind, IterVar, Range, Var};
    use crate::kernel::TensorDesc;

    fn half_copy() -> (KernelSignature, Block) {
        let src = Var::new(DType::Float16, "src");
        let dst = Var::new(DType::Float16, "dst");
        let i = Var::new(DType::Int32, "i");
        let sig = KernelSignature {
            name: "copy".to_string(),
            buffer_params: vec![
                TensorDesc::new(src.clone(), vec![Expr::Int(8)]),
                TensorDesc::new(dst.clone(), vec![Expr::Int(8)]),
            ],
            scalar_params: vec![],
        };
        let body = Block::For {
            iter: IterVar::new(i.clone(), Range::from(0..8), IterKind::Spatial),
            body: Box::new(Block::Store {
                var: dst,
                indices: vec![Expr::from(&i)],
                value: Expr::Load {
                    var: src,
                    indices: vec![Expr::from(&i)],
                },
            }),
            binding: String::new(),
        };
        (sig, body)
    }

    #[test]
    fn test_arm_kernel_header_and_types() {
        let (sig, body) = half_copy();
        let src = ArmMLowering::new().emit_kernel(&sig, &body).unwrap();
        assert!(src.starts_with("/* Arm Cortex-M kernel `copy` */\n"));
        assert!(src.contains("#include <arm_math.h>\n"));
        assert!(src.contains("void copy(float16_t *__restrict src, float16_t *__restrict dst) {\n"));
        assert!(src.contains("        dst[i] = src[i];\n"));
    }

    #[test]
    fn test_zigzag_rejected() {
        let (sig, body) = half_copy();
        let Block::For { iter, body, binding } = body else {
            unreachable!()
        };
        let zigzag = Block::For {
            iter: IterVar::new(iter.var, iter.range, IterKind::Zigzag),
            body,
            binding,
        };
        let err = ArmMLowering::new().emit_kernel(&sig, &zigzag).unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedConstruct {
                target: "arm_m".to_string(),
                construct: "zigzag loop over i".to_string(),
            }
        );
    }
}
