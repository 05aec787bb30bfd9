//! Variant Compiler Settings
//!
//! Configuration consumed once when the [`VariantCompiler`] is created.
//!
//! ```rust,ignore
//! use myth_variants::renderer::{CompilerSettings, VariantCompiler};
//!
//! // Iterate on shader templates straight from disk
//! let settings = CompilerSettings {
//!     shader_dir: Some("src/shaders".into()),
//!     debug_print_shaders: true,
//!     ..Default::default()
//! };
//! let compiler = VariantCompiler::new(settings)?;
//! ```
//!
//! [`VariantCompiler`]: super::pipeline::VariantCompiler

use std::path::PathBuf;

/// Global configuration for shader variant compilation.
///
/// | Field                    | Description                                     | Default |
/// |--------------------------|-------------------------------------------------|---------|
/// | `max_fallback_attempts`  | Fallback reductions tried per variant           | `8`     |
/// | `debug_print_shaders`    | Log every expanded shader at `debug` level      | `false` |
/// | `shader_dir`             | Directory checked before embedded templates     | `None`  |
/// | `preload_common_defines` | Intern built-in define names up front           | `true`  |
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub max_fallback_attempts: u32,
    pub debug_print_shaders: bool,
    pub shader_dir: Option<PathBuf>,
    pub preload_common_defines: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            max_fallback_attempts: 8,
            debug_print_shaders: false,
            shader_dir: None,
            preload_common_defines: true,
        }
    }
}
