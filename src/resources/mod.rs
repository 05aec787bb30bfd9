//! Core resource definitions.
//!
//! CPU-side data consumed by the variant pipeline, independent of any GPU
//! implementation:
//! - [`ShaderDefines`] / [`DefineKey`]: canonical define sets and cache keys
//! - [`DefineSet`]: per-drawable defines with partitioned dirty tracking
//! - [`DirtyTracker`]: per-material partition generations
//! - [`UniformLayout`]: layout of the material uniform block
//! - [`TextureSource`]: texture collaborator interface
//! - [`ImageProcessingConfiguration`]: shared color pipeline settings

pub mod define_set;
pub mod dirty;
pub mod image_processing;
pub mod shader_defines;
pub mod texture;
pub mod uniforms;

pub use define_set::DefineSet;
pub use dirty::{DirtyFlags, DirtyTracker, Partition};
pub use image_processing::{
    ImageProcessingConfiguration, ObserverKey, SharedImageProcessing, ToneMappingType,
    VignetteBlendMode,
};
pub use shader_defines::{DefineKey, DefineValue, ShaderDefines};
pub use texture::{
    CoordinatesMode, LodTextures, TextureId, TextureRef, TextureSize, TextureSource,
};
pub use uniforms::{UniformEntry, UniformKind, UniformLayout, UniformLayoutBuilder};
