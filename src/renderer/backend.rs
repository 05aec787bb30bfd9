//! Graphics backend seam.
//!
//! The variant pipeline never talks to a GPU API directly. Everything it
//! needs (program creation, link status, uniform buffer upload, sampler
//! binding) goes through [`GraphicsBackend`]. [`WgpuBackend`] implements it
//! on top of `wgpu`; tests use a recording mock.
//!
//! [`WgpuBackend`]: super::wgpu_backend::WgpuBackend

use crate::errors::CompileError;
use crate::renderer::pipeline::fallbacks::FallbackList;
use crate::resources::shader_defines::{DefineKey, ShaderDefines};
use crate::resources::texture::TextureId;

/// Handle to a program created by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// Handle to a uniform buffer created by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformBufferHandle(pub u64);

/// Platform capabilities that influence defines and binding strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCaps {
    /// Shaders can sample an explicit LOD (`textureSampleLevel`).
    pub texture_lod: bool,
    /// Persistent uniform buffer objects are available.
    pub uniform_buffers: bool,
    /// Uniform buffers must be re-bound on every draw even when unchanged.
    pub always_bind_uniform_buffers: bool,
    /// Maximum number of sampled textures per shader stage.
    pub max_samplers: u32,
}

impl Default for BackendCaps {
    fn default() -> Self {
        Self {
            texture_lod: true,
            uniform_buffers: true,
            always_bind_uniform_buffers: false,
            max_samplers: 16,
        }
    }
}

/// Link state of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    /// Still compiling or linking; poll again next frame.
    Linking,
    Ready,
    Failed(CompileError),
}

/// Everything the backend needs to build one program.
#[derive(Debug, Clone, Copy)]
pub struct ProgramRequest<'a> {
    pub shader: &'a str,
    pub define_key: &'a DefineKey,
    pub defines: &'a ShaderDefines,
    /// Fully expanded shader source.
    pub source: &'a str,
    pub attributes: &'a [&'static str],
    pub uniforms: &'a [&'static str],
    pub samplers: &'a [&'static str],
    pub fallbacks: &'a FallbackList,
}

/// Opaque graphics collaborator.
pub trait GraphicsBackend {
    fn caps(&self) -> BackendCaps;

    /// Requests a program. Synchronous rejections are returned as errors,
    /// asynchronous ones surface later through [`program_status`](Self::program_status).
    fn create_program(&mut self, request: &ProgramRequest<'_>) -> Result<ProgramHandle, CompileError>;

    fn program_status(&mut self, program: ProgramHandle) -> ProgramStatus;

    fn release_program(&mut self, program: ProgramHandle);

    fn create_uniform_buffer(&mut self, label: &str, size_bytes: u64) -> UniformBufferHandle;

    fn upload_uniform_buffer(&mut self, buffer: UniformBufferHandle, data: &[u8]);

    fn release_uniform_buffer(&mut self, buffer: UniformBufferHandle);

    fn bind_uniform_buffer(&mut self, program: ProgramHandle, block: &str, buffer: UniformBufferHandle);

    fn bind_texture(&mut self, program: ProgramHandle, sampler: &str, texture: TextureId);
}
