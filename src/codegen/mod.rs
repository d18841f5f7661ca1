//! SourceLowering: emits target source text from finished Block IR.
//!
//! Each target implements `SourceLowering`. Backends receive a body that
//! has already been lowered (and normally flattened) and either return the
//! complete source text or fail with `UnsupportedConstruct` when they meet
//! a node they cannot express.

mod arm_m;
mod c;

use crate::config::{Dialect, TargetConfig};
use crate::error::Result;
use crate::ir::Block;
use crate::kernel::KernelSignature;

pub use arm_m::ArmMLowering;
pub use c::CLowering;

/// Lowers Block IR into source code for one target.
pub trait SourceLowering: Send + Sync {
    /// The target name (e.g. "c", "arm_m").
    fn target_name(&self) -> &str;

    fn config(&self) -> &TargetConfig;

    /// Emit the statements of `body` alone, without a function wrapper.
    fn emit(&self, body: &Block) -> Result<String>;

    /// Emit a complete, compilable kernel function.
    fn emit_kernel(&self, signature: &KernelSignature, body: &Block) -> Result<String>;
}

/// Create a source-lowering backend for a built-in target name.
pub fn create_source_lowering(target: &str) -> Option<Box<dyn SourceLowering>> {
    let config = TargetConfig::resolve(target).ok()?;
    Some(create_source_lowering_for(config))
}

/// Create a backend for an explicit target configuration.
pub fn create_source_lowering_for(config: TargetConfig) -> Box<dyn SourceLowering> {
    match config.dialect {
        Dialect::C => Box::new(CLowering::with_config(config)),
        Dialect::ArmM => Box::new(ArmMLowering::with_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_source_lowering() {
        assert!(create_source_lowering("c").is_some());
        assert!(create_source_lowering("arm_m").is_some());
        assert!(create_source_lowering("arm-m").is_some());
        assert!(create_source_lowering("cortex-m").is_some());
        assert!(create_source_lowering("cuda").is_none());
        assert!(create_source_lowering("").is_none());
    }

    #[test]
    fn test_target_names() {
        let c = create_source_lowering("c").unwrap();
        assert_eq!(c.target_name(), "c");

        let arm = create_source_lowering("cortex-m").unwrap();
        assert_eq!(arm.target_name(), "arm_m");
        assert_eq!(arm.config().dialect, Dialect::ArmM);
    }

    #[test]
    fn test_custom_config_dispatch() {
        let config = TargetConfig {
            name: "m7".to_string(),
            dialect: Dialect::ArmM,
            ..TargetConfig::c()
        };
        let backend = create_source_lowering_for(config);
        assert_eq!(backend.target_name(), "m7");
    }
}
