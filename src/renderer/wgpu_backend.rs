//! `wgpu` implementation of [`GraphicsBackend`].
//!
//! Programs are WGSL shader modules; link status comes from the module's
//! compilation info, polled without blocking. Uniform buffers are
//! `UNIFORM | COPY_DST` buffers written through the queue. Texture and
//! uniform-buffer bindings are recorded per program so the caller can
//! assemble bind groups when it encodes the draw.
//!
//! Embedders should install an uncaptured-error handler on the device:
//! invalid WGSL is reported through compilation info *and* the device
//! error sink.

use std::task::{Context, Poll};

use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::backend::{
    BackendCaps, GraphicsBackend, ProgramHandle, ProgramRequest, ProgramStatus,
    UniformBufferHandle,
};
use crate::errors::{CompileError, CompileErrorKind};
use crate::resources::texture::TextureId;

struct WgpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    compilation: Option<LocalBoxFuture<'static, wgpu::CompilationInfo>>,
    status: ProgramStatus,
}

/// Resources bound to a program since its last draw.
#[derive(Debug, Default, Clone)]
pub struct ProgramBindings {
    pub uniform_buffers: SmallVec<[(String, UniformBufferHandle); 2]>,
    pub textures: SmallVec<[(String, TextureId); 4]>,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: u64,
    programs: FxHashMap<ProgramHandle, WgpuProgram>,
    buffers: FxHashMap<UniformBufferHandle, wgpu::Buffer>,
    bindings: FxHashMap<ProgramHandle, ProgramBindings>,
}

impl WgpuBackend {
    #[must_use]
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            next_id: 1,
            programs: FxHashMap::default(),
            buffers: FxHashMap::default(),
            bindings: FxHashMap::default(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Shader module of a linked program.
    #[must_use]
    pub fn shader_module(&self, program: ProgramHandle) -> Option<&wgpu::ShaderModule> {
        self.programs
            .get(&program)
            .filter(|p| p.status == ProgramStatus::Ready)
            .map(|p| &p.module)
    }

    #[must_use]
    pub fn uniform_buffer(&self, buffer: UniformBufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(&buffer)
    }

    /// Takes the bindings recorded for a program, leaving them empty.
    pub fn take_bindings(&mut self, program: ProgramHandle) -> ProgramBindings {
        self.bindings.remove(&program).unwrap_or_default()
    }
}

impl GraphicsBackend for WgpuBackend {
    fn caps(&self) -> BackendCaps {
        let limits = self.device.limits();
        BackendCaps {
            texture_lod: true,
            uniform_buffers: true,
            always_bind_uniform_buffers: false,
            max_samplers: limits.max_sampled_textures_per_shader_stage,
        }
    }

    fn create_program(&mut self, request: &ProgramRequest<'_>) -> Result<ProgramHandle, CompileError> {
        let max_samplers = self.device.limits().max_sampled_textures_per_shader_stage;
        if request.samplers.len() as u32 > max_samplers {
            return Err(CompileError::new(
                CompileErrorKind::LimitExceeded,
                request.shader,
                format!(
                    "{} samplers requested, device supports {max_samplers}",
                    request.samplers.len()
                ),
            ));
        }

        let label = format!("Shader Module {}", request.shader);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(request.source.to_owned().into()),
        });
        let compilation: LocalBoxFuture<'static, wgpu::CompilationInfo> =
            Box::pin(module.get_compilation_info());

        let handle = ProgramHandle(self.next_id());
        self.programs.insert(
            handle,
            WgpuProgram {
                label,
                module,
                compilation: Some(compilation),
                status: ProgramStatus::Linking,
            },
        );
        log::debug!("Created shader module for `{}` ({handle:?})", request.shader);
        Ok(handle)
    }

    fn program_status(&mut self, program: ProgramHandle) -> ProgramStatus {
        let Some(entry) = self.programs.get_mut(&program) else {
            return ProgramStatus::Failed(CompileError::new(
                CompileErrorKind::Validation,
                "<released>",
                format!("program {program:?} does not exist"),
            ));
        };

        if let Some(future) = entry.compilation.as_mut() {
            let mut cx = Context::from_waker(futures::task::noop_waker_ref());
            if let Poll::Ready(info) = future.as_mut().poll(&mut cx) {
                entry.compilation = None;
                let errors: Vec<_> = info
                    .messages
                    .iter()
                    .filter(|m| matches!(m.message_type, wgpu::CompilationMessageType::Error))
                    .map(|m| m.message.clone())
                    .collect();
                entry.status = if errors.is_empty() {
                    ProgramStatus::Ready
                } else {
                    ProgramStatus::Failed(CompileError::new(
                        CompileErrorKind::Validation,
                        entry.label.clone(),
                        errors.join("\n"),
                    ))
                };
            }
        }
        entry.status.clone()
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.bindings.remove(&program);
    }

    fn create_uniform_buffer(&mut self, label: &str, size_bytes: u64) -> UniformBufferHandle {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size_bytes.max(16),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let handle = UniformBufferHandle(self.next_id());
        self.buffers.insert(handle, buffer);
        handle
    }

    fn upload_uniform_buffer(&mut self, buffer: UniformBufferHandle, data: &[u8]) {
        if let Some(gpu) = self.buffers.get(&buffer) {
            self.queue.write_buffer(gpu, 0, data);
        } else {
            log::warn!("Upload to unknown uniform buffer {buffer:?}");
        }
    }

    fn release_uniform_buffer(&mut self, buffer: UniformBufferHandle) {
        if let Some(gpu) = self.buffers.remove(&buffer) {
            gpu.destroy();
        }
    }

    fn bind_uniform_buffer(&mut self, program: ProgramHandle, block: &str, buffer: UniformBufferHandle) {
        let bindings = self.bindings.entry(program).or_default();
        if let Some(slot) = bindings.uniform_buffers.iter_mut().find(|(name, _)| name.as_str() == block) {
            slot.1 = buffer;
        } else {
            bindings.uniform_buffers.push((block.to_owned(), buffer));
        }
    }

    fn bind_texture(&mut self, program: ProgramHandle, sampler: &str, texture: TextureId) {
        let bindings = self.bindings.entry(program).or_default();
        if let Some(slot) = bindings.textures.iter_mut().find(|(name, _)| name.as_str() == sampler) {
            slot.1 = texture;
        } else {
            bindings.textures.push((sampler.to_owned(), texture));
        }
    }
}
