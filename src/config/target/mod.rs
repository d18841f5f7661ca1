use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ir::DType;


/// Source dialect a target is emitted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Portable C99.
    C,
    /// C for Arm Cortex-M with CMSIS headers.
    ArmM,
}

/// Codegen target configuration.
///
/// Built-in targets are `c` and `arm_m`; other targets are described by a
/// JSON file whose missing fields take the portable C defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Short identifier used on the command line (e.g. "c").
    pub name: String,
    /// Human-readable name (e.g. "Arm Cortex-M").
    pub display_name: String,
    pub dialect: Dialect,
    /// Headers included at the top of every emitted file.
    pub includes: Vec<String>,
    /// C type of loop indices and scalar integer parameters.
    pub index_type: String,
    /// C type used for `float16` elements.
    pub float16_type: String,
    /// Qualifier on buffer parameters; empty to omit.
    pub restrict_keyword: String,
    /// Whether zigzag-tagged loops can be emitted. The tag is advisory: the
    /// loop runs in its declared direction.
    pub supports_zigzag: bool,
    /// Spaces per indentation level.
    pub indent_width: usize,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::c()
    }
}

impl TargetConfig {
    /// Built-in portable C target.
    pub fn c() -> Self {
        Self {
            name: "c".to_string(),
            display_name: "Portable C".to_string(),
            dialect: Dialect::C,
            includes: vec!["stdint.h".to_string(), "stdbool.h".to_string()],
            index_type: "int32_t".to_string(),
            float16_type: "_Float16".to_string(),
            restrict_keyword: "restrict".to_string(),
            supports_zigzag: true,
            indent_width: 2,
        }
    }

    /// Built-in Arm Cortex-M target.
    pub fn arm_m() -> Self {
        Self {
            name: "arm_m".to_string(),
            display_name: "Arm Cortex-M".to_string(),
            dialect: Dialect::ArmM,
            includes: vec![
                "stdint.h".to_string(),
                "stdbool.h".to_string(),
                "arm_math.h".to_string(),
            ],
            index_type: "int32_t".to_string(),
            float16_type: "float16_t".to_string(),
            restrict_keyword: "__restrict".to_string(),
            supports_zigzag: false,
            indent_width: 4,
        }
    }

    /// Names accepted by `resolve`, aliases excluded.
    pub fn builtin_names() -> &'static [&'static str] {
        &["c", "arm_m"]
    }

    /// Resolve a built-in target by name or alias.
    pub fn resolve(name: &str) -> Result<Self> {
        match name {
            "c" => Ok(Self::c()),
            "arm_m" | "arm-m" | "cortex-m" => Ok(Self::arm_m()),
            other => Err(Error::UnsupportedTarget(other.to_string())),
        }
    }

    /// Load a target configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "cannot read target config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse_json(&content, path)
    }

    fn parse_json(content: &str, path: &Path) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        if config.name.trim().is_empty() {
            return Err(Error::config(format!(
                "{}: target name must not be empty",
                path.display()
            )));
        }
        if config.indent_width == 0 {
            return Err(Error::config(format!(
                "{}: indent_width must be at least 1",
                path.display()
            )));
        }
        Ok(config)
    }

    /// C spelling of an element type on this target.
    pub fn type_name(&self, dtype: DType) -> &str {
        match dtype {
            DType::Bool => "bool",
            DType::Int8 => "int8_t",
            DType::Int16 => "int16_t",
            DType::Int32 => "int32_t",
            DType::Int64 => "int64_t",
            DType::UInt8 => "uint8_t",
            DType::UInt16 => "uint16_t",
            DType::UInt32 => "uint32_t",
            DType::UInt64 => "uint64_t",
            DType::Float16 => self.float16_type.as_str(),
            DType::Float32 => "float",
            DType::Float64 => "double",
        }
    }
}
