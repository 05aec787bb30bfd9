//! Drawables
//!
//! A [`Drawable`] is one mesh (or sub-mesh) rendered with a material. It owns
//! the per-drawable define state and the variant it currently resolves to,
//! plus the bookkeeping the readiness fast path relies on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::CompileError;
use crate::renderer::pipeline::CompiledVariant;
use crate::renderer::readiness::ReadinessState;
use crate::resources::define_set::DefineSet;

static NEXT_DRAWABLE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(pub u64);

/// Geometry and per-mesh flags read by the define pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInfo {
    pub id: u64,
    pub has_normals: bool,
    pub has_uvs: bool,
    pub has_uv2: bool,
    /// Bone influences per vertex (0 without skinning).
    pub bone_influencers: u32,
    pub bones_count: u32,
    pub compute_bones_using_shaders: bool,
    pub receive_shadows: bool,
    pub apply_fog: bool,
    pub has_thin_instances: bool,
    pub visibility: f32,
}

impl Default for MeshInfo {
    fn default() -> Self {
        Self {
            id: 0,
            has_normals: true,
            has_uvs: true,
            has_uv2: false,
            bone_influencers: 0,
            bones_count: 0,
            compute_bones_using_shaders: true,
            receive_shadows: false,
            apply_fog: true,
            has_thin_instances: false,
            visibility: 1.0,
        }
    }
}

impl MeshInfo {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// `true` when skinning runs in the vertex shader.
    #[inline]
    #[must_use]
    pub fn uses_gpu_skinning(&self) -> bool {
        self.bone_influencers > 0 && self.compute_bones_using_shaders
    }
}

#[derive(Debug)]
pub struct Drawable {
    id: DrawableId,
    pub(crate) mesh: MeshInfo,
    pub(crate) defines: Option<DefineSet>,
    pub(crate) variant: Option<Arc<CompiledVariant>>,
    pub(crate) state: ReadinessState,
    pub(crate) was_previously_ready: bool,
    pub(crate) was_previously_using_instances: Option<bool>,
    pub(crate) force_rebind: bool,
    pub(crate) last_error: Option<CompileError>,
}

impl Drawable {
    #[must_use]
    pub fn new(mesh: MeshInfo) -> Self {
        Self {
            id: DrawableId(NEXT_DRAWABLE_ID.fetch_add(1, Ordering::Relaxed)),
            mesh,
            defines: None,
            variant: None,
            state: ReadinessState::NotReady,
            was_previously_ready: false,
            was_previously_using_instances: None,
            force_rebind: false,
            last_error: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> DrawableId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn mesh(&self) -> &MeshInfo {
        &self.mesh
    }

    /// Mutable mesh access. Attribute-derived defines are recomputed on the
    /// next readiness check.
    pub fn mesh_mut(&mut self) -> &mut MeshInfo {
        if let Some(defines) = self.defines.as_mut() {
            defines.mark_all_dirty();
        }
        &mut self.mesh
    }

    /// Visibility is a binding input only; it never changes the variant.
    pub fn set_visibility(&mut self, visibility: f32) {
        self.mesh.visibility = visibility;
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ReadinessState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ReadinessState::Ready
    }

    #[inline]
    #[must_use]
    pub fn defines(&self) -> Option<&DefineSet> {
        self.defines.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn variant(&self) -> Option<&Arc<CompiledVariant>> {
        self.variant.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn last_error(&self) -> Option<&CompileError> {
        self.last_error.as_ref()
    }

    /// Forces the next bind to re-upload everything (backend resources were
    /// recreated, layout rebuilt, ...).
    pub fn mark_for_rebind(&mut self) {
        self.force_rebind = true;
    }

    #[inline]
    #[must_use]
    pub fn needs_rebind(&self) -> bool {
        self.force_rebind
    }

    /// Drops the resolved variant and define state; the next readiness check
    /// starts from scratch.
    pub fn reset(&mut self) {
        self.defines = None;
        self.variant = None;
        self.state = ReadinessState::NotReady;
        self.was_previously_ready = false;
        self.was_previously_using_instances = None;
        self.force_rebind = false;
        self.last_error = None;
    }
}
