//! Background Material
//!
//! Ground and skybox material: a primary color tint with optional shadow and
//! highlight colors, an optional diffuse texture, an environment reflection
//! with fresnel and blur, ground projection and image processing.
//!
//! # Property → partition
//!
//! Every setter bumps the material version (forcing the next bind to
//! re-upload uniforms) and marks the partitions holding the defines it
//! influences. Binding-only properties mark nothing.
//!
//! | Property                                   | Partitions        |
//! |--------------------------------------------|-------------------|
//! | primary color, perceptual color            | Lights            |
//! | primary shadow / highlight level           | Lights            |
//! | shadow level, max simultaneous lights      | Lights            |
//! | shadow only                                | Lights, Misc      |
//! | diffuse texture                            | Textures, Misc    |
//! | reflection texture, blur, fresnel controls | Textures          |
//! | opacity fresnel, RGB color, noise, BGR     | Textures          |
//! | equirectangular fov, premultiply alpha     | Textures          |
//! | ground projection                          | Textures, Misc    |
//! | alpha, point cloud, fog, log depth         | Misc              |
//! | image-processing configuration             | ImageProcessing   |
//! | scene center, fov multiplier, point size   | (binding only)    |
//! | ground radius / height                     | (binding only)    |
//!
//! A textures recompute also recomputes lights and misc, which read the
//! reflection and color defines it writes.

mod blocks;
mod descriptor;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Vec3, Vec4};

pub use blocks::{DiffuseBlock, ImageProcessingBlock, ReflectionBlock};
use blocks::REFLECTION_MODE_DEFINES;
pub use descriptor::BackgroundMaterialDescriptor;

use super::{
    BindContext, FeatureBlock, MaterialId, prepare_frame_bound_defines, prepare_light_defines,
    prepare_skinning_defines,
};
use crate::errors::{CompileError, Result, VariantError};
use crate::renderer::backend::{GraphicsBackend, ProgramHandle};
use crate::renderer::binding::{BindState, UniformBindingSession};
use crate::renderer::drawable::Drawable;
use crate::renderer::pipeline::{CompiledVariant, FallbackList, ShaderId};
use crate::renderer::readiness::{
    DefineContext, FrameContext, ReadinessGate, ReadinessStats, ShaderMaterial, VariantInputs,
};
use crate::renderer::uniform_buffer::UniformBuffer;
use crate::resources::dirty::{DirtyFlags, DirtyTracker, Partition};
use crate::resources::image_processing::{ObserverKey, SharedImageProcessing};
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::texture::{TextureId, TextureRef};
use crate::resources::uniforms::{UniformKind, UniformLayout};
use crate::scene::SceneContext;

/// Template name of the background shader.
pub const BACKGROUND_SHADER: &str = "background";

/// Name of the material uniform block.
pub const MATERIAL_BLOCK: &str = "Material";

/// Reflectance at normal incidence of a standard dielectric.
pub const STANDARD_REFLECTANCE0: f32 = 0.05;

/// Reflectance at grazing angles of a standard dielectric.
pub const STANDARD_REFLECTANCE90: f32 = 0.5;

/// Scene uniforms every variant declares besides the material block.
const SCENE_UNIFORMS: [&str; 6] = [
    "world",
    "viewProjection",
    "vEyePosition",
    "vFogInfos",
    "vFogColor",
    "mBones",
];

// ─── Properties ──────────────────────────────────────────────────────────────

/// Material inputs read by the feature blocks.
#[derive(Debug, Clone)]
pub struct BackgroundProperties {
    pub(crate) primary_color: Vec3,
    pub(crate) perceptual_color: Option<Vec3>,
    pub(crate) primary_color_shadow_level: f32,
    pub(crate) primary_color_highlight_level: f32,
    pub(crate) primary_shadow_color: Vec3,
    pub(crate) primary_highlight_color: Vec3,

    pub(crate) shadow_level: f32,
    pub(crate) shadow_only: bool,
    pub(crate) max_simultaneous_lights: u32,

    pub(crate) diffuse_texture: Option<TextureRef>,
    pub(crate) opacity_fresnel: bool,

    pub(crate) reflection_texture: Option<TextureRef>,
    pub(crate) reflection_blur: f32,
    pub(crate) reflection_fresnel: bool,
    pub(crate) reflection_falloff_distance: f32,
    pub(crate) reflection_amount: f32,
    pub(crate) reflection_reflectance0: f32,
    pub(crate) reflection_reflectance90: f32,
    pub(crate) scene_center: Vec3,
    pub(crate) use_equirectangular_fov: bool,
    pub(crate) switch_to_bgr: bool,
    pub(crate) fov_multiplier: f32,

    pub(crate) enable_ground_projection: bool,
    pub(crate) projected_ground_radius: f32,
    pub(crate) projected_ground_height: f32,

    pub(crate) use_rgb_color: bool,
    pub(crate) enable_noise: bool,
    pub(crate) alpha: f32,
    pub(crate) premultiply_alpha: bool,
    pub(crate) point_size: f32,
    pub(crate) points_cloud: bool,
    pub(crate) fog_enabled: bool,
    pub(crate) use_logarithmic_depth: bool,

    pub(crate) image_processing: SharedImageProcessing,
}

impl BackgroundProperties {
    fn from_descriptor(desc: &BackgroundMaterialDescriptor, image_processing: SharedImageProcessing) -> Self {
        let mut props = Self {
            primary_color: desc.primary_color,
            perceptual_color: desc.perceptual_color,
            primary_color_shadow_level: desc.primary_color_shadow_level,
            primary_color_highlight_level: desc.primary_color_highlight_level,
            primary_shadow_color: Vec3::ZERO,
            primary_highlight_color: Vec3::ZERO,
            shadow_level: desc.shadow_level,
            shadow_only: desc.shadow_only,
            max_simultaneous_lights: desc.max_simultaneous_lights,
            diffuse_texture: None,
            opacity_fresnel: desc.opacity_fresnel,
            reflection_texture: None,
            reflection_blur: desc.reflection_blur,
            reflection_fresnel: desc.reflection_fresnel,
            reflection_falloff_distance: desc.reflection_falloff_distance,
            reflection_amount: desc.reflection_amount,
            reflection_reflectance0: desc.reflection_reflectance0,
            reflection_reflectance90: desc.reflection_reflectance90,
            scene_center: desc.scene_center,
            use_equirectangular_fov: desc.use_equirectangular_fov,
            switch_to_bgr: desc.switch_to_bgr,
            fov_multiplier: clamp_fov_multiplier(desc.fov_multiplier),
            enable_ground_projection: desc.enable_ground_projection,
            projected_ground_radius: desc.projected_ground_radius,
            projected_ground_height: desc.projected_ground_height,
            use_rgb_color: desc.use_rgb_color,
            enable_noise: desc.enable_noise,
            alpha: desc.alpha,
            premultiply_alpha: desc.premultiply_alpha,
            point_size: desc.point_size,
            points_cloud: desc.points_cloud,
            fog_enabled: desc.fog_enabled,
            use_logarithmic_depth: desc.use_logarithmic_depth,
            image_processing,
        };
        if props.perceptual_color.is_some() {
            props.compute_primary_color_from_perceptual();
        } else {
            props.compute_primary_colors();
        }
        props
    }

    /// `(amount, reflectance0, reflectance90, 1 / falloff)`.
    #[must_use]
    pub fn reflection_controls(&self) -> Vec4 {
        let inverse_falloff = if self.reflection_falloff_distance > 0.0 {
            1.0 / self.reflection_falloff_distance
        } else {
            0.0
        };
        Vec4::new(
            self.reflection_amount,
            self.reflection_reflectance0,
            self.reflection_reflectance90,
            inverse_falloff,
        )
    }

    fn use_highlight_and_shadow_colors(&self) -> bool {
        !self.use_rgb_color
            && (self.primary_color_shadow_level != 0.0 || self.primary_color_highlight_level != 0.0)
    }

    fn need_alpha_blending(&self) -> bool {
        self.alpha < 1.0
            || self.diffuse_texture.as_ref().is_some_and(|t| t.has_alpha())
            || self.shadow_only
    }

    /// `shadow = primary - primary * shadow_level`,
    /// `highlight = primary + (1 - primary) * highlight_level`.
    fn compute_primary_colors(&mut self) {
        let primary = self.primary_color;
        self.primary_shadow_color = primary - primary * self.primary_color_shadow_level;
        self.primary_highlight_color =
            primary + (Vec3::ONE - primary) * self.primary_color_highlight_level;
    }

    /// Linearizes the perceptual color and compensates the exposure so the
    /// displayed color matches what was picked.
    fn compute_primary_color_from_perceptual(&mut self) {
        let Some(perceptual) = self.perceptual_color else {
            return;
        };
        let exposure = self.image_processing.read().exposure();
        self.primary_color = perceptual.powf(2.2) / exposure;
        self.compute_primary_colors();
    }
}

fn clamp_fov_multiplier(value: f32) -> f32 {
    if value.is_nan() {
        log::warn!("Background fov multiplier is NaN, using 1.0");
        1.0
    } else {
        value.clamp(0.0, 2.0)
    }
}

fn same_texture(a: Option<&TextureRef>, b: Option<&TextureRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.id() == b.id(),
        (None, None) => true,
        _ => false,
    }
}

// ─── Material ────────────────────────────────────────────────────────────────

type CompiledCallback = Box<dyn FnMut(&CompiledVariant) + Send>;
type ErrorCallback = Box<dyn FnMut(&CompileError) + Send>;

pub struct BackgroundMaterial {
    id: MaterialId,
    name: String,
    props: BackgroundProperties,
    blocks: Vec<Box<dyn FeatureBlock<BackgroundProperties>>>,

    tracker: DirtyTracker,
    version: u64,
    gate: ReadinessGate,

    ubo: UniformBuffer,
    /// Program whose defines produced the current uniform layout.
    layout_program: Option<ProgramHandle>,

    frozen: bool,
    disposed: bool,

    image_processing_signal: Arc<AtomicBool>,
    image_processing_observer: Option<ObserverKey>,

    on_compiled: Option<CompiledCallback>,
    on_error: Option<ErrorCallback>,
}

impl fmt::Debug for BackgroundMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundMaterial")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("frozen", &self.frozen)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

/// Generates a getter and a setter for a `Copy` property. The setter only
/// acts on a change; it bumps the version and marks the listed partitions.
macro_rules! impl_properties {
    ($( $(#[$doc:meta])* $field:ident: $ty:ty => [$($partition:ident),*] ),* $(,)?) => {
        impl BackgroundMaterial {
            $(
                $(#[$doc])*
                #[inline]
                #[must_use]
                pub fn $field(&self) -> $ty {
                    self.props.$field
                }

                paste::paste! {
                    $(#[$doc])*
                    pub fn [<set_ $field>](&mut self, value: $ty) {
                        if self.props.$field != value {
                            self.props.$field = value;
                            self.version += 1;
                            $( self.tracker.mark_dirty(Partition::$partition); )*
                        }
                    }
                }
            )*
        }
    };
}

impl_properties! {
    /// Ground shadow darkness.
    shadow_level: f32 => [Lights],
    /// Renders shadows only; everything else is transparent.
    shadow_only: bool => [Lights, Misc],
    max_simultaneous_lights: u32 => [Lights],
    /// Fades the diffuse texture at grazing angles.
    opacity_fresnel: bool => [Textures],
    /// Reflection blur amount; `0` disables blurring.
    reflection_blur: f32 => [Textures],
    reflection_fresnel: bool => [Textures],
    /// Distance from the scene center at which the reflection fades out.
    reflection_falloff_distance: f32 => [Textures],
    reflection_amount: f32 => [Textures],
    reflection_reflectance0: f32 => [Textures],
    reflection_reflectance90: f32 => [Textures],
    /// Center used by the reflection falloff.
    scene_center: Vec3 => [],
    use_equirectangular_fov: bool => [Textures],
    /// Samples the reflection as BGR.
    switch_to_bgr: bool => [Textures],
    /// Projects the environment onto a ground dome (3D reflections only).
    enable_ground_projection: bool => [Textures, Misc],
    projected_ground_radius: f32 => [],
    projected_ground_height: f32 => [],
    /// Uses the texture colors as-is instead of tinting by the primary color.
    use_rgb_color: bool => [Textures],
    /// Adds dithering noise against banding.
    enable_noise: bool => [Textures],
    alpha: f32 => [Misc],
    premultiply_alpha: bool => [Textures],
    point_size: f32 => [],
    points_cloud: bool => [Misc],
    fog_enabled: bool => [Misc],
    use_logarithmic_depth: bool => [Misc],
}

impl BackgroundMaterial {
    /// Creates a material with default properties using the scene's
    /// image-processing configuration.
    #[must_use]
    pub fn new(name: &str, scene: &SceneContext) -> Self {
        Self::from_descriptor(name, scene, &BackgroundMaterialDescriptor::default())
    }

    #[must_use]
    pub fn from_descriptor(
        name: &str,
        scene: &SceneContext,
        desc: &BackgroundMaterialDescriptor,
    ) -> Self {
        let image_processing = scene.image_processing.clone();
        let signal = Arc::new(AtomicBool::new(false));
        let observer = image_processing.write().subscribe(&signal);

        Self {
            id: MaterialId::next(),
            name: name.to_owned(),
            props: BackgroundProperties::from_descriptor(desc, image_processing),
            blocks: vec![
                Box::new(DiffuseBlock),
                Box::new(ReflectionBlock),
                Box::new(ImageProcessingBlock),
            ],
            tracker: DirtyTracker::new(),
            version: 0,
            gate: ReadinessGate::new(),
            ubo: UniformBuffer::new(name),
            layout_program: None,
            frozen: false,
            disposed: false,
            image_processing_signal: signal,
            image_processing_observer: Some(observer),
            on_compiled: None,
            on_error: None,
        }
    }

    /// Snapshot of the serializable properties.
    #[must_use]
    pub fn to_descriptor(&self) -> BackgroundMaterialDescriptor {
        BackgroundMaterialDescriptor::from_properties(&self.props)
    }

    /// Applies every property of `desc` through the regular setters.
    pub fn apply_descriptor(&mut self, desc: &BackgroundMaterialDescriptor) {
        desc.apply(self);
    }

    // ── Identity & lifecycle ─────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn id(&self) -> MaterialId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &BackgroundProperties {
        &self.props
    }

    #[inline]
    #[must_use]
    pub fn uniform_buffer(&self) -> &UniformBuffer {
        &self.ubo
    }

    /// Frozen materials skip define recomputation once a drawable is ready
    /// and skip static uniform uploads while their buffer is synchronized.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn mark_dirty(&mut self, partition: Partition) {
        self.tracker.mark_dirty(partition);
    }

    pub fn mark_all_dirty(&mut self) {
        self.tracker.mark_all_dirty();
    }

    /// Releases GPU resources and stops listening to image processing.
    /// Later calls are no-ops.
    pub fn dispose(&mut self, backend: &mut dyn GraphicsBackend) {
        if self.disposed {
            return;
        }
        self.detach_image_processing();
        self.ubo.release(backend);
        self.layout_program = None;
        self.disposed = true;
        log::debug!("Background material `{}` disposed", self.name);
    }

    pub fn set_on_compiled(&mut self, callback: impl FnMut(&CompiledVariant) + Send + 'static) {
        self.on_compiled = Some(Box::new(callback));
    }

    pub fn set_on_error(&mut self, callback: impl FnMut(&CompileError) + Send + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    // ── Colors ───────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn primary_color(&self) -> Vec3 {
        self.props.primary_color
    }

    /// Sets the linear primary color and drops any perceptual color.
    pub fn set_primary_color(&mut self, color: Vec3) {
        if self.props.primary_color == color && self.props.perceptual_color.is_none() {
            return;
        }
        self.props.primary_color = color;
        self.props.perceptual_color = None;
        self.props.compute_primary_colors();
        self.touch(DirtyFlags::LIGHTS);
    }

    #[inline]
    #[must_use]
    pub fn perceptual_color(&self) -> Option<Vec3> {
        self.props.perceptual_color
    }

    /// Sets the primary color as picked on screen (gamma space, after
    /// exposure). `None` keeps the current linear primary color.
    pub fn set_perceptual_color(&mut self, color: Option<Vec3>) {
        if self.props.perceptual_color == color {
            return;
        }
        self.props.perceptual_color = color;
        self.props.compute_primary_color_from_perceptual();
        self.touch(DirtyFlags::LIGHTS);
    }

    #[inline]
    #[must_use]
    pub fn primary_color_shadow_level(&self) -> f32 {
        self.props.primary_color_shadow_level
    }

    pub fn set_primary_color_shadow_level(&mut self, level: f32) {
        if self.props.primary_color_shadow_level != level {
            self.props.primary_color_shadow_level = level;
            self.props.compute_primary_colors();
            self.touch(DirtyFlags::LIGHTS);
        }
    }

    #[inline]
    #[must_use]
    pub fn primary_color_highlight_level(&self) -> f32 {
        self.props.primary_color_highlight_level
    }

    pub fn set_primary_color_highlight_level(&mut self, level: f32) {
        if self.props.primary_color_highlight_level != level {
            self.props.primary_color_highlight_level = level;
            self.props.compute_primary_colors();
            self.touch(DirtyFlags::LIGHTS);
        }
    }

    #[inline]
    #[must_use]
    pub fn primary_shadow_color(&self) -> Vec3 {
        self.props.primary_shadow_color
    }

    #[inline]
    #[must_use]
    pub fn primary_highlight_color(&self) -> Vec3 {
        self.props.primary_highlight_color
    }

    // ── Textures ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn diffuse_texture(&self) -> Option<&TextureRef> {
        self.props.diffuse_texture.as_ref()
    }

    pub fn set_diffuse_texture(&mut self, texture: Option<TextureRef>) {
        if same_texture(self.props.diffuse_texture.as_ref(), texture.as_ref()) {
            return;
        }
        self.props.diffuse_texture = texture;
        self.touch(DirtyFlags::TEXTURES | DirtyFlags::MISC);
    }

    #[must_use]
    pub fn reflection_texture(&self) -> Option<&TextureRef> {
        self.props.reflection_texture.as_ref()
    }

    pub fn set_reflection_texture(&mut self, texture: Option<TextureRef>) {
        if same_texture(self.props.reflection_texture.as_ref(), texture.as_ref()) {
            return;
        }
        self.props.reflection_texture = texture;
        self.touch(DirtyFlags::TEXTURES);
    }

    #[must_use]
    pub fn has_texture(&self, id: TextureId) -> bool {
        self.active_textures().iter().any(|t| t.id() == id)
    }

    #[must_use]
    pub fn active_textures(&self) -> Vec<TextureRef> {
        self.props
            .diffuse_texture
            .iter()
            .chain(self.props.reflection_texture.iter())
            .cloned()
            .collect()
    }

    // ── Reflection ───────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn fov_multiplier(&self) -> f32 {
        self.props.fov_multiplier
    }

    /// Field-of-view multiplier of equirectangular reflections, clamped to
    /// `[0, 2]`. NaN falls back to `1`.
    pub fn set_fov_multiplier(&mut self, value: f32) {
        let value = clamp_fov_multiplier(value);
        if self.props.fov_multiplier != value {
            self.props.fov_multiplier = value;
            self.version += 1;
        }
    }

    /// Maps a `[0, 1]` weight onto the fresnel reflectance of a standard
    /// dielectric.
    pub fn set_reflection_standard_fresnel_weight(&mut self, weight: f32) {
        let weight = weight.clamp(0.0, 1.0);
        let reflectance0 = STANDARD_REFLECTANCE0 + (1.0 - STANDARD_REFLECTANCE0) * (1.0 - weight);
        let reflectance90 =
            STANDARD_REFLECTANCE90 + (1.0 - STANDARD_REFLECTANCE90) * (1.0 - weight);
        self.set_reflection_reflectance0(reflectance0);
        self.set_reflection_reflectance90(reflectance90);
    }

    #[must_use]
    pub fn reflection_controls(&self) -> Vec4 {
        self.props.reflection_controls()
    }

    // ── Alpha ────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn need_alpha_blending(&self) -> bool {
        self.props.need_alpha_blending()
    }

    /// The shader discards below the alpha cutoff whenever it does not blend.
    #[must_use]
    pub fn need_alpha_testing(&self) -> bool {
        true
    }

    // ── Image processing ─────────────────────────────────────────────────────

    #[must_use]
    pub fn image_processing(&self) -> &SharedImageProcessing {
        &self.props.image_processing
    }

    /// Switches to another image-processing configuration. The previous one
    /// is unsubscribed first, so the material listens to exactly one.
    pub fn set_image_processing(&mut self, config: SharedImageProcessing) {
        if Arc::ptr_eq(&self.props.image_processing, &config) && self.image_processing_observer.is_some() {
            return;
        }
        self.detach_image_processing();
        self.image_processing_observer = Some(config.write().subscribe(&self.image_processing_signal));
        self.props.image_processing = config;
        self.props.compute_primary_color_from_perceptual();
        self.touch(DirtyFlags::IMAGE_PROCESSING);
    }

    fn detach_image_processing(&mut self) {
        if let Some(key) = self.image_processing_observer.take() {
            self.props.image_processing.write().unsubscribe(key);
        }
    }

    fn touch(&mut self, partitions: DirtyFlags) {
        self.version += 1;
        for partition in partitions.partitions() {
            self.tracker.mark_dirty(partition);
        }
    }

    // ── Readiness & binding ──────────────────────────────────────────────────

    /// Readiness counters accumulated by [`is_ready_for_drawable`](Self::is_ready_for_drawable).
    #[must_use]
    pub fn readiness_stats(&self) -> ReadinessStats {
        self.gate.stats()
    }

    /// Returns `true` when `drawable` can be drawn this frame.
    pub fn is_ready_for_drawable(
        &mut self,
        drawable: &mut Drawable,
        frame: &mut FrameContext<'_>,
        use_instances: bool,
    ) -> bool {
        let mut gate = std::mem::take(&mut self.gate);
        let ready = gate.check(self, drawable, frame, use_instances);
        self.gate = gate;
        ready
    }

    /// Uniform block layout for a define set. Slots only exist for the
    /// features the defines enable.
    #[must_use]
    pub fn build_uniform_layout(&self, defines: &ShaderDefines) -> UniformLayout {
        let mut builder = UniformLayout::builder();
        builder.add("vPrimaryColor", UniformKind::Vec4);
        if defines.is_enabled("USEHIGHLIGHTANDSHADOWCOLORS") {
            builder.add("vPrimaryColorShadow", UniformKind::Vec4);
        }
        builder
            .add("shadowLevel", UniformKind::Float)
            .add("alpha", UniformKind::Float)
            .add("fFovMultiplier", UniformKind::Float);
        if defines.is_enabled("POINTSIZE") {
            builder.add("pointSize", UniformKind::Float);
        }
        for block in &self.blocks {
            block.add_uniforms(defines, &mut builder);
        }
        builder.build()
    }

    /// Binds uniforms and textures for a drawable that passed readiness.
    ///
    /// Uniforms are only rewritten when the binding session reports a
    /// rebind; textures are bound every time.
    pub fn bind_for_drawable(
        &mut self,
        drawable: &mut Drawable,
        scene: &SceneContext,
        backend: &mut dyn GraphicsBackend,
        session: &mut UniformBindingSession,
    ) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let Some(variant) = drawable.variant.clone() else {
            return Err(VariantError::NoVariant(drawable.id().0));
        };

        // Drawables sharing this material may use different variants.
        if self.layout_program != Some(variant.program) {
            let layout = self.build_uniform_layout(&variant.defines);
            self.ubo.rebuild(layout);
            self.layout_program = Some(variant.program);
        }

        let force = std::mem::take(&mut drawable.force_rebind);
        let state = BindState {
            render_id: scene.render_id(),
            material: self.id,
            mesh: drawable.mesh.id,
            program: variant.program,
            visibility_bits: drawable.mesh.visibility.to_bits(),
            material_version: self.version,
            layout_generation: self.ubo.layout_generation(),
        };
        let must_rebind = session.begin_bind(state, force);
        let caps = backend.caps();

        self.ubo.begin_pass();
        if must_rebind || caps.always_bind_uniform_buffers {
            self.ubo.bind(backend, variant.program, MATERIAL_BLOCK);
        }
        let update_static =
            must_rebind && (!caps.uniform_buffers || !self.frozen || !self.ubo.is_sync() || force);

        {
            let mut ctx = BindContext {
                backend: &mut *backend,
                ubo: &mut self.ubo,
                program: variant.program,
                defines: &variant.defines,
                must_rebind,
                update_static,
                frozen: self.frozen,
            };
            if update_static {
                Self::bind_static_uniforms(&self.props, &mut ctx)?;
            }
            if must_rebind {
                ctx.ubo.update_float("fFovMultiplier", self.props.fov_multiplier)?;
            }
            for block in &self.blocks {
                block.bind(&self.props, &mut ctx)?;
            }
        }

        self.ubo.update(backend)
    }

    fn bind_static_uniforms(props: &BackgroundProperties, ctx: &mut BindContext<'_>) -> Result<()> {
        ctx.ubo.update_float("shadowLevel", props.shadow_level)?;
        ctx.ubo.update_float("alpha", props.alpha)?;
        if ctx.defines.is_enabled("POINTSIZE") {
            ctx.ubo.update_float("pointSize", props.point_size)?;
        }
        if ctx.defines.is_enabled("USEHIGHLIGHTANDSHADOWCOLORS") {
            ctx.ubo.update_color4("vPrimaryColor", props.primary_highlight_color, 1.0)?;
            ctx.ubo.update_color4("vPrimaryColorShadow", props.primary_shadow_color, 1.0)?;
        } else {
            ctx.ubo.update_color4("vPrimaryColor", props.primary_color, 1.0)?;
        }
        Ok(())
    }

    // ── Partition recompute ──────────────────────────────────────────────────

    fn prepare_texture_defines(&self, ctx: &DefineContext<'_>, defines: &mut ShaderDefines) {
        let mesh = ctx.mesh;
        let needs_uvs = defines.is_enabled("DIFFUSE");
        defines.set_bool("UV1", needs_uvs && mesh.has_uvs);
        defines.set_bool("UV2", needs_uvs && mesh.has_uv2 && defines.is_enabled("MAINUV2"));
        defines.set_bool("PREMULTIPLYALPHA", self.props.premultiply_alpha);
        defines.set_bool("USERGBCOLOR", self.props.use_rgb_color);
        defines.set_bool("NOISE", self.props.enable_noise);
    }

    fn prepare_lights_defines(&self, ctx: &DefineContext<'_>, defines: &mut ShaderDefines) {
        let lights = prepare_light_defines(ctx, defines, self.props.max_simultaneous_lights);
        defines.set_bool("NORMAL", lights > 0 && ctx.mesh.has_normals);
        defines.set_bool(
            "USEHIGHLIGHTANDSHADOWCOLORS",
            self.props.use_highlight_and_shadow_colors(),
        );
        defines.set_bool("BACKMAT_SHADOWONLY", self.props.shadow_only);
    }

    fn prepare_misc_defines(&self, ctx: &DefineContext<'_>, defines: &mut ShaderDefines) {
        let scene = ctx.scene;
        defines.set_bool(
            "FOG",
            scene.fog_enabled() && ctx.mesh.apply_fog && self.props.fog_enabled,
        );
        defines.set_bool("POINTSIZE", self.props.points_cloud);
        defines.set_bool("LOGARITHMICDEPTH", self.props.use_logarithmic_depth);
        defines.set_bool(
            "ALPHATEST",
            self.need_alpha_testing() && !self.props.need_alpha_blending(),
        );
        defines.set_bool("MULTIVIEW", scene.multiview());
        prepare_skinning_defines(ctx, defines);

        let ground =
            self.props.enable_ground_projection && defines.is_enabled("REFLECTIONMAP_3D");
        defines.set_bool("PROJECTED_GROUND", ground);
        if ground {
            // The dome is sampled as a skybox; it replaces the texture's own mode.
            for name in REFLECTION_MODE_DEFINES {
                defines.remove(name);
            }
            defines.set_bool("REFLECTIONMAP_SKYBOX", true);
        }
    }
}

impl Drop for BackgroundMaterial {
    fn drop(&mut self) {
        self.detach_image_processing();
    }
}

impl ShaderMaterial for BackgroundMaterial {
    fn shader_id(&self) -> ShaderId {
        ShaderId::new(BACKGROUND_SHADER)
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn dirty_tracker(&self) -> &DirtyTracker {
        &self.tracker
    }

    fn sync_external_state(&mut self) {
        if self.image_processing_signal.swap(false, Ordering::AcqRel) {
            self.props.compute_primary_color_from_perceptual();
            self.touch(DirtyFlags::IMAGE_PROCESSING);
        }
    }

    fn expand_dirty(&self, pending: DirtyFlags) -> DirtyFlags {
        if pending.contains(DirtyFlags::TEXTURES) {
            pending | DirtyFlags::LIGHTS | DirtyFlags::MISC
        } else {
            pending
        }
    }

    fn prepare_frame_defines(&self, ctx: &DefineContext<'_>, defines: &mut ShaderDefines) {
        prepare_frame_bound_defines(ctx, defines);
    }

    fn prepare_partition(
        &self,
        partition: Partition,
        ctx: &DefineContext<'_>,
        defines: &mut ShaderDefines,
    ) -> bool {
        if partition == Partition::Textures {
            defines.set_bool(
                "TEXTURELODSUPPORT",
                ctx.scene.textures_enabled() && ctx.caps.texture_lod,
            );
        }
        for block in self.blocks.iter().filter(|b| b.partition() == partition) {
            if !block.prepare_defines(&self.props, ctx, defines) {
                log::trace!("`{}`: {} block not ready", self.name, block.name());
                return false;
            }
        }
        match partition {
            Partition::Textures => self.prepare_texture_defines(ctx, defines),
            Partition::Lights => self.prepare_lights_defines(ctx, defines),
            Partition::Misc => self.prepare_misc_defines(ctx, defines),
            Partition::ImageProcessing => {}
        }
        true
    }

    fn variant_inputs(&self, defines: &ShaderDefines, _ctx: &DefineContext<'_>) -> VariantInputs {
        let layout = self.build_uniform_layout(defines);

        let mut attributes = vec!["position"];
        if defines.is_enabled("NORMAL") {
            attributes.push("normal");
        }
        if defines.is_enabled("UV1") {
            attributes.push("uv");
        }
        if defines.is_enabled("UV2") {
            attributes.push("uv2");
        }
        let influencers = defines.get_int("NUM_BONE_INFLUENCERS").unwrap_or(0);
        if influencers > 0 {
            attributes.extend(["matricesIndices", "matricesWeights"]);
            if influencers > 4 {
                attributes.extend(["matricesIndicesExtra", "matricesWeightsExtra"]);
            }
        }
        if defines.is_enabled("INSTANCES") || defines.is_enabled("THIN_INSTANCES") {
            attributes.extend(["world0", "world1", "world2", "world3"]);
        }

        let mut uniforms = SCENE_UNIFORMS.to_vec();
        if defines.is_enabled("CLIPPLANE") {
            uniforms.push("vClipPlane");
        }
        uniforms.extend(layout.names());

        let mut samplers = Vec::new();
        for block in &self.blocks {
            block.add_samplers(defines, &mut samplers);
        }

        VariantInputs {
            attributes,
            uniforms,
            samplers,
            fallbacks: FallbackList::standard(defines, self.props.max_simultaneous_lights),
            binding_code: layout.wgsl_struct_def(MATERIAL_BLOCK),
        }
    }

    fn on_variant_ready(&mut self, variant: &CompiledVariant) {
        let layout = self.build_uniform_layout(&variant.defines);
        self.ubo.rebuild(layout);
        self.layout_program = Some(variant.program);
        log::debug!(
            "`{}` variant ready ({} fallbacks applied)",
            self.name,
            variant.fallbacks_applied.len()
        );
        if let Some(callback) = self.on_compiled.as_mut() {
            callback(variant);
        }
    }

    fn on_compile_error(&mut self, error: &CompileError) {
        if let Some(callback) = self.on_error.as_mut() {
            callback(error);
        }
    }
}
