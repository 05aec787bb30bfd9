//! Shader Code Generator
//!
//! Expands a WGSL template for one define set. Templates use the Myth
//! minijinja dialect:
//!
//! | Syntax        | Meaning                          |
//! |---------------|----------------------------------|
//! | `{$ ... $}`   | block statement                  |
//! | `{{ ... }}`   | expression                       |
//! | `$$ ...`      | line statement                   |
//!
//! Every active define is a template variable (`true` for booleans, the
//! integer otherwise). Inactive defines are undefined, which the
//! semi-strict mode treats as falsy in conditions. The material uniform
//! block declaration is available as `binding_code`.

use std::collections::BTreeMap;

use minijinja::value::Value;
use minijinja::{Environment, UndefinedBehavior, syntax::SyntaxConfig};
use serde::Serialize;

use super::shader_library::embedded_include_loader;
use super::variant_key::ShaderId;
use crate::errors::{CompileError, CompileErrorKind};
use crate::resources::shader_defines::{DefineValue, ShaderDefines};

#[derive(Serialize)]
struct ShaderContext<'a> {
    #[serde(flatten)]
    defines: BTreeMap<&'static str, Value>,
    binding_code: &'a str,
}

pub struct ShaderGenerator {
    env: Environment<'static>,
    debug_print: bool,
}

impl ShaderGenerator {
    pub fn new(debug_print: bool) -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);
        env.set_loader(embedded_include_loader);
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        Ok(Self { env, debug_print })
    }

    fn template_context(defines: &ShaderDefines) -> BTreeMap<&'static str, Value> {
        defines
            .iter_named()
            .map(|(name, value)| {
                let value = match value {
                    DefineValue::Bool(b) => Value::from(b),
                    DefineValue::Int(i) => Value::from(i),
                };
                (name, value)
            })
            .collect()
    }

    /// Renders `template` for `defines`.
    pub fn generate(
        &self,
        shader: ShaderId,
        template: &str,
        defines: &ShaderDefines,
        binding_code: &str,
    ) -> Result<String, CompileError> {
        let ctx = ShaderContext {
            defines: Self::template_context(defines),
            binding_code,
        };

        let source = self
            .env
            .render_named_str(shader.name(), template, ctx)
            .map_err(|e| {
                CompileError::new(CompileErrorKind::Template, shader.name(), format!("{e:#}"))
            })?;

        let source = format!("// === Auto-generated Variant Shader: {shader} ===\n{source}");

        if self.debug_print {
            Self::debug_print_shader(shader, &source);
        }

        Ok(source)
    }

    fn debug_print_shader(shader: ShaderId, source: &str) {
        let mut compact = String::with_capacity(source.len());
        let mut last_was_newline = false;
        for c in source.chars() {
            if c == '\n' {
                if !last_was_newline {
                    compact.push('\n');
                }
                last_was_newline = true;
            } else {
                compact.push(c);
                last_was_newline = false;
            }
        }
        log::debug!("================= Generated Shader Code {shader} ==================\n{compact}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_select_code_paths() {
        let generator = ShaderGenerator::new(false).unwrap();
        let template = "$$ if REFLECTION\nreflection\n$$ endif\n$$ if DIFFUSE\ndiffuse\n$$ endif\nlights={{ NUM_LIGHTS }}\n{{ binding_code }}";

        let mut defines = ShaderDefines::new();
        defines.set_bool("REFLECTION", true);
        defines.set_int("NUM_LIGHTS", 2);

        let source = generator
            .generate(ShaderId::new("gen_test"), template, &defines, "struct Material {};")
            .unwrap();
        assert!(source.contains("reflection"));
        assert!(!source.contains("diffuse"));
        assert!(source.contains("lights=2"));
        assert!(source.contains("struct Material {};"));
    }

    #[test]
    fn broken_template_is_a_template_error() {
        let generator = ShaderGenerator::new(false).unwrap();
        let err = generator
            .generate(ShaderId::new("broken"), "{$ if $}", &ShaderDefines::new(), "")
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::Template);
    }
}
