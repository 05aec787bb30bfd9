//! Materials built from feature blocks.
//!
//! A material is composed from a small set of [`FeatureBlock`] strategy
//! objects (diffuse, reflection, image processing...). Each block owns one
//! capability end to end: the defines it writes, the uniform slots and
//! samplers it adds to a variant, and how it binds them per draw.

pub mod background;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::Result;
use crate::renderer::backend::{GraphicsBackend, ProgramHandle};
use crate::renderer::readiness::DefineContext;
use crate::renderer::uniform_buffer::UniformBuffer;
use crate::resources::dirty::Partition;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::uniforms::UniformLayoutBuilder;
use crate::scene::{LightKind, MAX_CLIP_PLANES, ShadowFilter};

pub use background::{BackgroundMaterial, BackgroundMaterialDescriptor};

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique material identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

impl MaterialId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-draw inputs handed to [`FeatureBlock::bind`].
pub struct BindContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub ubo: &'a mut UniformBuffer,
    pub program: ProgramHandle,
    /// Defines of the bound variant.
    pub defines: &'a ShaderDefines,
    /// Uniforms must be re-uploaded this draw.
    pub must_rebind: bool,
    /// Values that rarely change (texture infos, colors) must be re-uploaded.
    pub update_static: bool,
    pub frozen: bool,
}

/// One optional capability of a material.
pub trait FeatureBlock<P>: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Partition whose recompute runs [`prepare_defines`](Self::prepare_defines).
    fn partition(&self) -> Partition;

    /// Writes (or resets) the block's defines. `false` if an input is not
    /// ready yet.
    fn prepare_defines(&self, props: &P, ctx: &DefineContext<'_>, defines: &mut ShaderDefines) -> bool;

    fn add_uniforms(&self, defines: &ShaderDefines, layout: &mut UniformLayoutBuilder);

    fn add_samplers(&self, _defines: &ShaderDefines, _samplers: &mut Vec<&'static str>) {}

    /// Writes the block's uniforms (as allowed by the context flags) and
    /// binds its textures.
    fn bind(&self, props: &P, ctx: &mut BindContext<'_>) -> Result<()>;
}

// ─── Shared define helpers ───────────────────────────────────────────────────

const LIGHT_DEFINE_PREFIXES: [&str; 6] =
    ["LIGHT", "DIRLIGHT", "POINTLIGHT", "SPOTLIGHT", "HEMILIGHT", "SHADOW"];

/// Writes the per-light defines (`LIGHT{i}`, `{TYPE}LIGHT{i}`, `SHADOW{i}`,
/// filter variants and `SHADOWS`) for up to `max_lights` active lights.
///
/// Returns the number of lights written.
pub fn prepare_light_defines(
    ctx: &DefineContext<'_>,
    defines: &mut ShaderDefines,
    max_lights: u32,
) -> u32 {
    for prefix in LIGHT_DEFINE_PREFIXES {
        defines.remove_prefixed(prefix);
    }

    let mut count = 0;
    let mut shadows = false;
    for light in ctx.scene.active_lights().take(max_lights as usize) {
        defines.set_bool(&format!("LIGHT{count}"), true);
        defines.set_bool(&format!("{}{count}", light.kind.define_prefix()), true);

        let receives = ctx.scene.shadows_enabled() && ctx.mesh.receive_shadows;
        if receives && light.casts_shadows() && light.kind != LightKind::Hemispheric {
            defines.set_bool(&format!("SHADOW{count}"), true);
            match light.shadow.as_ref().map(|s| s.filter) {
                Some(ShadowFilter::Pcf) => {
                    defines.set_bool(&format!("SHADOWPCF{count}"), true);
                }
                Some(ShadowFilter::Pcss) => {
                    defines.set_bool(&format!("SHADOWPCSS{count}"), true);
                }
                _ => {}
            }
            shadows = true;
        }
        count += 1;
    }
    defines.set_bool("SHADOWS", shadows);
    count
}

/// Clip-plane define per scene clip plane; the first one carries no index.
const CLIP_PLANE_DEFINES: [&str; MAX_CLIP_PLANES] = [
    "CLIPPLANE",
    "CLIPPLANE2",
    "CLIPPLANE3",
    "CLIPPLANE4",
    "CLIPPLANE5",
    "CLIPPLANE6",
];

/// Writes clip-plane and instancing defines. These are re-evaluated on
/// every readiness check.
pub fn prepare_frame_bound_defines(ctx: &DefineContext<'_>, defines: &mut ShaderDefines) {
    for (i, name) in CLIP_PLANE_DEFINES.iter().enumerate() {
        defines.set_bool(name, ctx.scene.clip_plane(i));
    }
    defines.set_bool("INSTANCES", ctx.use_instances);
    defines.set_bool("THIN_INSTANCES", ctx.mesh.has_thin_instances);
}

/// Writes skinning defines. Influencer counts are integer defines.
pub fn prepare_skinning_defines(ctx: &DefineContext<'_>, defines: &mut ShaderDefines) {
    if ctx.mesh.uses_gpu_skinning() {
        defines.set_int("NUM_BONE_INFLUENCERS", ctx.mesh.bone_influencers as i32);
        defines.set_int("BonesPerMesh", ctx.mesh.bones_count as i32 + 1);
    } else {
        defines.remove("NUM_BONE_INFLUENCERS");
        defines.remove("BonesPerMesh");
    }
}
