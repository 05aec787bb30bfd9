//! Texture collaborator interface.
//!
//! Textures are loaded and owned elsewhere; the define pipeline only reads
//! their readiness and a handful of descriptive flags. Everything here is
//! read-only from the material's point of view.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Mat4;
use serde::{Deserialize, Serialize};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a texture as seen by the graphics backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

impl TextureId {
    /// Allocates a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// How texture coordinates are derived for a reflection/environment texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CoordinatesMode {
    Explicit,
    Spherical,
    Planar,
    #[default]
    Cubic,
    Projection,
    Skybox,
    InvCubic,
    Equirectangular,
    FixedEquirectangular,
    FixedEquirectangularMirrored,
}

/// Pixel dimensions of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureSize {
    pub width: u32,
    pub height: u32,
}

/// Pre-filtered LOD textures used when the platform cannot sample by LOD.
#[derive(Debug, Clone, Default)]
pub struct LodTextures {
    pub low: Option<TextureId>,
    pub mid: Option<TextureId>,
    pub high: Option<TextureId>,
}

/// Read-only view of a texture resource.
pub trait TextureSource: Send + Sync + Debug {
    fn id(&self) -> TextureId;

    /// `true` once the texture can be sampled, or if it is allowed to be
    /// sampled while still streaming. Never blocks.
    fn is_ready_or_not_blocking(&self) -> bool;

    fn size(&self) -> TextureSize;

    fn coordinates_mode(&self) -> CoordinatesMode {
        CoordinatesMode::Explicit
    }

    /// UV channel used by explicit-mode textures (0 = first UV set).
    fn coordinates_index(&self) -> u32 {
        0
    }

    fn gamma_space(&self) -> bool {
        true
    }

    fn is_rgbd(&self) -> bool {
        false
    }

    fn has_alpha(&self) -> bool {
        false
    }

    fn is_cube(&self) -> bool {
        false
    }

    fn is_3d(&self) -> bool {
        false
    }

    fn invert_z(&self) -> bool {
        false
    }

    fn level(&self) -> f32 {
        1.0
    }

    fn lod_generation_scale(&self) -> f32 {
        1.0
    }

    fn lod_generation_offset(&self) -> f32 {
        0.0
    }

    fn lod_level_in_alpha(&self) -> bool {
        false
    }

    fn lod_textures(&self) -> LodTextures {
        LodTextures::default()
    }

    /// UV transform for explicit-mode sampling.
    fn texture_matrix(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    /// Transform applied to reflection lookups.
    fn reflection_matrix(&self) -> Mat4 {
        Mat4::IDENTITY
    }
}

/// Shared handle to a texture resource.
pub type TextureRef = Arc<dyn TextureSource>;
