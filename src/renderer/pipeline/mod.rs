//! Shader variant pipeline.
//!
//! - [`VariantCompiler`]: variant cache keyed by `(ShaderId, DefineKey)`
//! - [`FallbackList`]: ordered feature reduction under platform limits
//! - [`ShaderLibrary`]: embedded, registered and deferred template sources
//! - [`ShaderGenerator`]: minijinja template expansion

pub mod cache;
pub mod fallbacks;
pub mod shader_gen;
pub mod shader_library;
pub mod variant_key;

pub use cache::{CompiledVariant, VariantCompiler, VariantRequest, VariantStatus};
pub use fallbacks::{FallbackList, FallbackReduction};
pub use shader_gen::ShaderGenerator;
pub use shader_library::{ShaderLibrary, SourceFuture, SourceStatus};
pub use variant_key::{ShaderId, VariantKey};
