//! Shared test fixtures: a recording graphics backend, controllable
//! textures and a frame harness driving readiness and binding.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Mat4;

use myth_variants::errors::{CompileError, CompileErrorKind};
use myth_variants::material::BackgroundMaterial;
use myth_variants::renderer::{
    BackendCaps, CompilerSettings, Drawable, FrameContext, GraphicsBackend, MeshInfo,
    ProgramHandle, ProgramRequest, ProgramStatus, UniformBindingSession, UniformBufferHandle,
    VariantCompiler,
};
use myth_variants::resources::{
    CoordinatesMode, LodTextures, TextureId, TextureRef, TextureSize, TextureSource,
};
use myth_variants::scene::SceneContext;

// ============================================================================
// Mock backend
// ============================================================================

/// One `create_program` call as seen by the backend.
#[derive(Debug, Clone)]
pub struct ProgramRecord {
    pub handle: ProgramHandle,
    pub shader: String,
    pub define_key: String,
    pub source: String,
    pub uniforms: Vec<&'static str>,
    pub samplers: Vec<&'static str>,
}

#[derive(Debug, Default)]
pub struct MockBackend {
    pub caps: BackendCaps,
    next_handle: u64,

    pub programs: Vec<ProgramRecord>,
    pub released_programs: Vec<ProgramHandle>,
    /// Status polls a new program reports `Linking` before it is ready.
    pub link_delay: u32,
    linking: HashMap<ProgramHandle, u32>,
    /// Requests with any of these defines enabled are rejected as exceeding
    /// platform limits.
    pub limit_defines: Vec<&'static str>,
    /// Every request is rejected as invalid.
    pub reject_all: bool,

    pub buffers_created: u64,
    pub buffers_released: u64,
    pub uploads: u64,
    pub last_upload: Vec<u8>,
    pub buffer_binds: u64,
    pub texture_binds: Vec<(String, TextureId)>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caps(caps: BackendCaps) -> Self {
        Self {
            caps,
            ..Self::default()
        }
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    pub fn create_count(&self) -> usize {
        self.programs.len()
    }

    pub fn last_program(&self) -> &ProgramRecord {
        self.programs.last().expect("no program created")
    }

    pub fn texture_binds_for(&self, sampler: &str) -> usize {
        self.texture_binds.iter().filter(|(s, _)| s == sampler).count()
    }
}

impl GraphicsBackend for MockBackend {
    fn caps(&self) -> BackendCaps {
        self.caps
    }

    fn create_program(&mut self, request: &ProgramRequest<'_>) -> Result<ProgramHandle, CompileError> {
        let handle = ProgramHandle(self.next_handle());
        self.programs.push(ProgramRecord {
            handle,
            shader: request.shader.to_owned(),
            define_key: request.define_key.as_str().to_owned(),
            source: request.source.to_owned(),
            uniforms: request.uniforms.to_vec(),
            samplers: request.samplers.to_vec(),
        });

        if self.reject_all {
            return Err(CompileError::new(
                CompileErrorKind::Validation,
                request.shader,
                "rejected by mock backend",
            ));
        }
        if let Some(name) = self
            .limit_defines
            .iter()
            .find(|name| request.defines.is_enabled(name))
        {
            return Err(CompileError::new(
                CompileErrorKind::LimitExceeded,
                request.shader,
                format!("{name} exceeds platform limits"),
            ));
        }

        self.linking.insert(handle, self.link_delay);
        Ok(handle)
    }

    fn program_status(&mut self, program: ProgramHandle) -> ProgramStatus {
        match self.linking.get_mut(&program) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                ProgramStatus::Linking
            }
            _ => ProgramStatus::Ready,
        }
    }

    fn release_program(&mut self, program: ProgramHandle) {
        self.linking.remove(&program);
        self.released_programs.push(program);
    }

    fn create_uniform_buffer(&mut self, _label: &str, _size_bytes: u64) -> UniformBufferHandle {
        self.buffers_created += 1;
        UniformBufferHandle(self.next_handle())
    }

    fn upload_uniform_buffer(&mut self, _buffer: UniformBufferHandle, data: &[u8]) {
        self.uploads += 1;
        self.last_upload = data.to_vec();
    }

    fn release_uniform_buffer(&mut self, _buffer: UniformBufferHandle) {
        self.buffers_released += 1;
    }

    fn bind_uniform_buffer(&mut self, _program: ProgramHandle, _block: &str, _buffer: UniformBufferHandle) {
        self.buffer_binds += 1;
    }

    fn bind_texture(&mut self, _program: ProgramHandle, sampler: &str, texture: TextureId) {
        self.texture_binds.push((sampler.to_owned(), texture));
    }
}

// ============================================================================
// Mock texture
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    id: TextureId,
    ready: AtomicBool,
    pub mode: CoordinatesMode,
    pub cube: bool,
    pub has_alpha: bool,
    pub invert_z: bool,
    pub matrix: Mat4,
    pub lod: LodTextures,
}

impl MockTexture {
    pub fn new() -> Self {
        Self {
            id: TextureId::next(),
            ready: AtomicBool::new(true),
            mode: CoordinatesMode::Explicit,
            cube: false,
            has_alpha: false,
            invert_z: false,
            matrix: Mat4::IDENTITY,
            lod: LodTextures::default(),
        }
    }

    /// A ready cube map in cubic mode.
    pub fn cube() -> Self {
        Self {
            mode: CoordinatesMode::Cubic,
            cube: true,
            ..Self::new()
        }
    }

    pub fn loading(self) -> Self {
        self.ready.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl TextureSource for MockTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn is_ready_or_not_blocking(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn size(&self) -> TextureSize {
        TextureSize {
            width: 256,
            height: 256,
        }
    }

    fn coordinates_mode(&self) -> CoordinatesMode {
        self.mode
    }

    fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    fn is_cube(&self) -> bool {
        self.cube
    }

    fn invert_z(&self) -> bool {
        self.invert_z
    }

    fn lod_textures(&self) -> LodTextures {
        self.lod.clone()
    }

    fn texture_matrix(&self) -> Mat4 {
        self.matrix
    }
}

pub fn texture_ref(texture: &Arc<MockTexture>) -> TextureRef {
    texture.clone()
}

// ============================================================================
// Frame harness
// ============================================================================

pub struct Harness {
    pub scene: SceneContext,
    pub backend: MockBackend,
    pub compiler: VariantCompiler,
    pub session: UniformBindingSession,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(MockBackend::new())
    }

    pub fn with_backend(backend: MockBackend) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            scene: SceneContext::new(),
            backend,
            compiler: VariantCompiler::new(CompilerSettings::default())
                .expect("compiler settings are valid"),
            session: UniformBindingSession::new(),
        }
    }

    pub fn material(&self) -> BackgroundMaterial {
        BackgroundMaterial::new("background", &self.scene)
    }

    pub fn drawable(&self) -> Drawable {
        Drawable::new(MeshInfo::new(1))
    }

    pub fn is_ready(&mut self, material: &mut BackgroundMaterial, drawable: &mut Drawable) -> bool {
        self.is_ready_with(material, drawable, false)
    }

    pub fn is_ready_with(
        &mut self,
        material: &mut BackgroundMaterial,
        drawable: &mut Drawable,
        use_instances: bool,
    ) -> bool {
        let mut frame = FrameContext {
            scene: &self.scene,
            backend: &mut self.backend,
            compiler: &mut self.compiler,
        };
        material.is_ready_for_drawable(drawable, &mut frame, use_instances)
    }

    pub fn bind(&mut self, material: &mut BackgroundMaterial, drawable: &mut Drawable) {
        material
            .bind_for_drawable(drawable, &self.scene, &mut self.backend, &mut self.session)
            .expect("bind succeeds");
    }

    /// Readiness check followed by a bind when ready.
    pub fn frame(&mut self, material: &mut BackgroundMaterial, drawable: &mut Drawable) -> bool {
        let ready = self.is_ready(material, drawable);
        if ready {
            self.bind(material, drawable);
        }
        ready
    }

    /// Runs frames until the drawable is ready, at most `max` frames.
    pub fn until_ready(
        &mut self,
        material: &mut BackgroundMaterial,
        drawable: &mut Drawable,
        max: usize,
    ) -> Option<usize> {
        (1..=max).find(|_| self.is_ready(material, drawable))
    }
}

/// Enabled defines of a drawable's current define set, in key order.
pub fn enabled_defines(drawable: &Drawable) -> Vec<String> {
    drawable
        .defines()
        .map(|d| {
            d.values()
                .iter_named()
                .map(|(name, _)| name.to_owned())
                .collect()
        })
        .unwrap_or_default()
}
