//! Rendering side of the variant pipeline.
//!
//! - [`GraphicsBackend`]: backend seam ([`WgpuBackend`] for `wgpu`)
//! - [`VariantCompiler`]: shader variant cache
//! - [`ReadinessGate`]: per-drawable readiness state machine
//! - [`UniformBindingSession`] / [`UniformBuffer`]: binding discipline
//! - [`CompilerSettings`]: compiler configuration

pub mod backend;
pub mod binding;
pub mod drawable;
pub mod pipeline;
pub mod readiness;
pub mod settings;
pub mod uniform_buffer;
pub mod wgpu_backend;

pub use backend::{
    BackendCaps, GraphicsBackend, ProgramHandle, ProgramRequest, ProgramStatus,
    UniformBufferHandle,
};
pub use binding::{BindState, BindingStats, UniformBindingSession};
pub use drawable::{Drawable, DrawableId, MeshInfo};
pub use pipeline::{
    CompiledVariant, FallbackList, ShaderId, VariantCompiler, VariantKey, VariantRequest,
    VariantStatus,
};
pub use readiness::{
    DefineContext, FrameContext, ReadinessGate, ReadinessState, ReadinessStats, ShaderMaterial,
    VariantInputs,
};
pub use settings::CompilerSettings;
pub use uniform_buffer::UniformBuffer;
pub use wgpu_backend::WgpuBackend;
