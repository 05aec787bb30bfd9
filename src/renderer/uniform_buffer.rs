//! Material Uniform Buffer
//!
//! CPU mirror of a material uniform block plus its backend buffer.
//!
//! Writes go through named slots of the current [`UniformLayout`]. Each
//! write covers a whole slot, and a slot accepts at most one write per
//! binding pass ([`UniformBuffer::begin_pass`]), so a pass can never leave
//! half-updated data behind or overwrite a value it already produced.
//! Only writes that change data mark the buffer for upload, and
//! [`UniformBuffer::update`] uploads once per pass at most.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::errors::{Result, VariantError};
use crate::renderer::backend::{GraphicsBackend, ProgramHandle, UniformBufferHandle};
use crate::resources::uniforms::UniformLayout;

static NEXT_UNIFORM_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub struct UniformBuffer {
    id: u64,
    label: String,
    layout: UniformLayout,
    /// Bumped on every layout change.
    layout_generation: u64,
    data: Vec<f32>,
    /// Pass in which each slot was last written.
    slot_pass: Vec<u64>,
    pass: u64,

    handle: Option<UniformBufferHandle>,
    allocated_bytes: u64,
    needs_upload: bool,

    write_count: u64,
    upload_count: u64,
}

impl UniformBuffer {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            id: NEXT_UNIFORM_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            label: label.to_owned(),
            layout: UniformLayout::default(),
            layout_generation: 0,
            data: Vec::new(),
            slot_pass: Vec::new(),
            pass: 0,
            handle: None,
            allocated_bytes: 0,
            needs_upload: true,
            write_count: 0,
            upload_count: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    #[inline]
    #[must_use]
    pub fn layout_generation(&self) -> u64 {
        self.layout_generation
    }

    /// Replaces the layout. Data is reset and the buffer must be re-uploaded.
    ///
    /// Returns `false` when `layout` equals the current one.
    pub fn rebuild(&mut self, layout: UniformLayout) -> bool {
        if layout == self.layout && self.layout_generation > 0 {
            return false;
        }
        self.data = vec![0.0; layout.size_floats()];
        self.slot_pass = vec![0; layout.len()];
        self.layout = layout;
        self.layout_generation += 1;
        self.needs_upload = true;
        log::debug!(
            "Uniform buffer `{}` layout rebuilt ({} slots, {} bytes)",
            self.label,
            self.layout.len(),
            self.layout.size_bytes()
        );
        true
    }

    /// Starts a binding pass; every slot may be written once again.
    pub fn begin_pass(&mut self) {
        self.pass += 1;
    }

    /// Writes a whole slot.
    ///
    /// Returns `Ok(false)` when the slot was already written in this pass.
    pub fn write(&mut self, name: &str, values: &[f32]) -> Result<bool> {
        let Some((index, entry)) = self.layout.get(name) else {
            return Err(VariantError::UnknownUniform(name.to_owned()));
        };
        let size = entry.kind.size();
        if values.len() != size {
            return Err(VariantError::UniformMismatch {
                name: name.to_owned(),
                expected: size,
                actual: values.len(),
            });
        }
        if self.slot_pass[index] == self.pass {
            log::trace!("Uniform `{name}` already written in this pass");
            return Ok(false);
        }
        self.slot_pass[index] = self.pass;
        self.write_count += 1;

        let slot = &mut self.data[entry.offset..entry.offset + size];
        if slot != values {
            slot.copy_from_slice(values);
            self.needs_upload = true;
        }
        Ok(true)
    }

    pub fn update_float(&mut self, name: &str, x: f32) -> Result<bool> {
        self.write(name, &[x])
    }

    pub fn update_float2(&mut self, name: &str, x: f32, y: f32) -> Result<bool> {
        self.write(name, &[x, y])
    }

    pub fn update_float3(&mut self, name: &str, x: f32, y: f32, z: f32) -> Result<bool> {
        self.write(name, &[x, y, z])
    }

    pub fn update_vec2(&mut self, name: &str, v: Vec2) -> Result<bool> {
        self.write(name, &v.to_array())
    }

    pub fn update_vec3(&mut self, name: &str, v: Vec3) -> Result<bool> {
        self.write(name, &v.to_array())
    }

    pub fn update_vec4(&mut self, name: &str, v: Vec4) -> Result<bool> {
        self.write(name, &v.to_array())
    }

    /// Writes an RGB color with an explicit alpha into a `vec4` slot.
    pub fn update_color4(&mut self, name: &str, rgb: Vec3, alpha: f32) -> Result<bool> {
        self.write(name, &rgb.extend(alpha).to_array())
    }

    pub fn update_mat4(&mut self, name: &str, m: &Mat4) -> Result<bool> {
        self.write(name, &m.to_cols_array())
    }

    /// Current CPU value of a slot.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&[f32]> {
        let (_, entry) = self.layout.get(name)?;
        self.data.get(entry.offset..entry.offset + entry.kind.size())
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    // ── Backend ──────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.handle.is_some()
    }

    /// `true` when the backend buffer holds the current CPU data.
    #[inline]
    #[must_use]
    pub fn is_sync(&self) -> bool {
        self.handle.is_some() && !self.needs_upload
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> Option<UniformBufferHandle> {
        self.handle
    }

    /// Creates (or re-creates after a resize) the backend buffer.
    ///
    /// Returns `true` if a new backend buffer was created.
    pub fn ensure_created(&mut self, backend: &mut dyn GraphicsBackend) -> bool {
        let size = self.layout.size_bytes();
        if self.handle.is_some() && self.allocated_bytes == size {
            return false;
        }
        if let Some(old) = self.handle.take() {
            backend.release_uniform_buffer(old);
        }
        self.handle = Some(backend.create_uniform_buffer(&self.label, size));
        self.allocated_bytes = size;
        self.needs_upload = true;
        true
    }

    /// Binds the backend buffer to a program's uniform block.
    pub fn bind(&mut self, backend: &mut dyn GraphicsBackend, program: ProgramHandle, block: &str) {
        self.ensure_created(backend);
        if let Some(handle) = self.handle {
            backend.bind_uniform_buffer(program, block, handle);
        }
    }

    /// Uploads pending changes. No-op when already synchronized.
    pub fn update(&mut self, backend: &mut dyn GraphicsBackend) -> Result<()> {
        if self.layout.is_empty() {
            return Err(VariantError::UniformBufferNotCreated(self.label.clone()));
        }
        self.ensure_created(backend);
        if !self.needs_upload {
            return Ok(());
        }
        if let Some(handle) = self.handle {
            backend.upload_uniform_buffer(handle, bytemuck::cast_slice(&self.data));
            self.upload_count += 1;
            self.needs_upload = false;
        }
        Ok(())
    }

    /// Releases the backend buffer. The CPU data is kept.
    pub fn release(&mut self, backend: &mut dyn GraphicsBackend) {
        if let Some(handle) = self.handle.take() {
            backend.release_uniform_buffer(handle);
        }
        self.allocated_bytes = 0;
        self.needs_upload = true;
    }

    // ── Statistics ───────────────────────────────────────────────────────────

    /// Slot writes accepted since creation.
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Backend uploads issued since creation.
    #[inline]
    #[must_use]
    pub fn upload_count(&self) -> u64 {
        self.upload_count
    }
}
