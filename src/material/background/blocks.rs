//! Feature blocks of the background material.

use glam::{Mat4, Vec4};

use super::BackgroundProperties;
use crate::errors::Result;
use crate::material::{BindContext, FeatureBlock};
use crate::renderer::readiness::DefineContext;
use crate::resources::dirty::Partition;
use crate::resources::shader_defines::ShaderDefines;
use crate::resources::texture::CoordinatesMode;
use crate::resources::uniforms::{UniformKind, UniformLayoutBuilder};

// ─── Diffuse ─────────────────────────────────────────────────────────────────

const DIFFUSE_DEFINES: [&str; 7] = [
    "DIFFUSE",
    "DIFFUSEDIRECTUV",
    "DIFFUSEHASALPHA",
    "GAMMADIFFUSE",
    "OPACITYFRESNEL",
    "MAINUV1",
    "MAINUV2",
];

/// Diffuse texture sampled with explicit UVs.
#[derive(Debug, Default)]
pub struct DiffuseBlock;

impl FeatureBlock<BackgroundProperties> for DiffuseBlock {
    fn name(&self) -> &'static str {
        "diffuse"
    }

    fn partition(&self) -> Partition {
        Partition::Textures
    }

    fn prepare_defines(
        &self,
        props: &BackgroundProperties,
        ctx: &DefineContext<'_>,
        defines: &mut ShaderDefines,
    ) -> bool {
        for name in DIFFUSE_DEFINES {
            defines.remove(name);
        }

        let texture = match &props.diffuse_texture {
            Some(texture) if ctx.scene.textures_enabled() => texture,
            _ => return true,
        };
        if !texture.is_ready_or_not_blocking() {
            return false;
        }

        defines.set_bool("DIFFUSE", true);
        // Direct UV only without a UV transform; 0 means "use the matrix".
        let channel = texture.coordinates_index().min(1) + 1;
        let direct = if texture.texture_matrix() == Mat4::IDENTITY { channel } else { 0 };
        defines.set_int("DIFFUSEDIRECTUV", direct as i32);
        defines.set_bool(&format!("MAINUV{channel}"), true);
        defines.set_bool("DIFFUSEHASALPHA", texture.has_alpha());
        defines.set_bool("GAMMADIFFUSE", texture.gamma_space());
        defines.set_bool("OPACITYFRESNEL", props.opacity_fresnel);
        true
    }

    fn add_uniforms(&self, defines: &ShaderDefines, layout: &mut UniformLayoutBuilder) {
        if defines.is_enabled("DIFFUSE") {
            layout
                .add("vDiffuseInfos", UniformKind::Vec2)
                .add("diffuseMatrix", UniformKind::Mat4);
        }
    }

    fn add_samplers(&self, defines: &ShaderDefines, samplers: &mut Vec<&'static str>) {
        if defines.is_enabled("DIFFUSE") {
            samplers.push("diffuseSampler");
        }
    }

    fn bind(&self, props: &BackgroundProperties, ctx: &mut BindContext<'_>) -> Result<()> {
        if !ctx.defines.is_enabled("DIFFUSE") {
            return Ok(());
        }
        let Some(texture) = &props.diffuse_texture else {
            return Ok(());
        };

        if ctx.update_static {
            ctx.ubo.update_float2(
                "vDiffuseInfos",
                texture.coordinates_index() as f32,
                texture.level(),
            )?;
            ctx.ubo.update_mat4("diffuseMatrix", &texture.texture_matrix())?;
        }
        ctx.backend.bind_texture(ctx.program, "diffuseSampler", texture.id());
        Ok(())
    }
}

// ─── Reflection ──────────────────────────────────────────────────────────────

/// Every coordinate-mode define; exactly one is set while a reflection
/// texture is active.
pub(crate) const REFLECTION_MODE_DEFINES: [&str; 9] = [
    "REFLECTIONMAP_EXPLICIT",
    "REFLECTIONMAP_PLANAR",
    "REFLECTIONMAP_PROJECTION",
    "REFLECTIONMAP_SKYBOX",
    "REFLECTIONMAP_SPHERICAL",
    "REFLECTIONMAP_EQUIRECTANGULAR",
    "REFLECTIONMAP_EQUIRECTANGULAR_FIXED",
    "REFLECTIONMAP_MIRROREDEQUIRECTANGULAR_FIXED",
    "REFLECTIONMAP_CUBIC",
];

const REFLECTION_DEFINES: [&str; 12] = [
    "REFLECTION",
    "GAMMAREFLECTION",
    "RGBDREFLECTION",
    "REFLECTIONBLUR",
    "LODINREFLECTIONALPHA",
    "EQUIRECTANGULAR_RELFECTION_FOV",
    "REFLECTIONBGR",
    "INVERTCUBICMAP",
    "REFLECTIONMAP_3D",
    "REFLECTIONMAP_OPPOSITEZ",
    "REFLECTIONFRESNEL",
    "REFLECTIONFALLOFF",
];

const fn mode_define(mode: CoordinatesMode) -> &'static str {
    match mode {
        CoordinatesMode::Explicit => "REFLECTIONMAP_EXPLICIT",
        CoordinatesMode::Planar => "REFLECTIONMAP_PLANAR",
        CoordinatesMode::Projection => "REFLECTIONMAP_PROJECTION",
        CoordinatesMode::Skybox => "REFLECTIONMAP_SKYBOX",
        CoordinatesMode::Spherical => "REFLECTIONMAP_SPHERICAL",
        CoordinatesMode::Equirectangular => "REFLECTIONMAP_EQUIRECTANGULAR",
        CoordinatesMode::FixedEquirectangular => "REFLECTIONMAP_EQUIRECTANGULAR_FIXED",
        CoordinatesMode::FixedEquirectangularMirrored => {
            "REFLECTIONMAP_MIRROREDEQUIRECTANGULAR_FIXED"
        }
        CoordinatesMode::Cubic | CoordinatesMode::InvCubic => "REFLECTIONMAP_CUBIC",
    }
}

/// Environment reflection with optional fresnel and blur.
#[derive(Debug, Default)]
pub struct ReflectionBlock;

impl FeatureBlock<BackgroundProperties> for ReflectionBlock {
    fn name(&self) -> &'static str {
        "reflection"
    }

    fn partition(&self) -> Partition {
        Partition::Textures
    }

    fn prepare_defines(
        &self,
        props: &BackgroundProperties,
        ctx: &DefineContext<'_>,
        defines: &mut ShaderDefines,
    ) -> bool {
        for name in REFLECTION_DEFINES.into_iter().chain(REFLECTION_MODE_DEFINES) {
            defines.remove(name);
        }

        let texture = match &props.reflection_texture {
            Some(texture) if ctx.scene.textures_enabled() => texture,
            _ => return true,
        };
        if !texture.is_ready_or_not_blocking() {
            return false;
        }

        let mode = texture.coordinates_mode();
        let is_3d = texture.is_cube();

        defines.set_bool("REFLECTION", true);
        defines.set_bool("GAMMAREFLECTION", texture.gamma_space());
        defines.set_bool("RGBDREFLECTION", texture.is_rgbd());
        defines.set_bool("REFLECTIONBLUR", props.reflection_blur > 0.0);
        defines.set_bool("LODINREFLECTIONALPHA", texture.lod_level_in_alpha());
        defines.set_bool("EQUIRECTANGULAR_RELFECTION_FOV", props.use_equirectangular_fov);
        defines.set_bool("REFLECTIONBGR", props.switch_to_bgr);
        defines.set_bool("INVERTCUBICMAP", mode == CoordinatesMode::InvCubic);
        defines.set_bool("REFLECTIONMAP_3D", is_3d);

        let opposite_z = if is_3d && ctx.scene.use_right_handed_system() {
            !texture.invert_z()
        } else {
            texture.invert_z()
        };
        defines.set_bool("REFLECTIONMAP_OPPOSITEZ", opposite_z);
        defines.set_bool(mode_define(mode), true);

        if props.reflection_fresnel {
            defines.set_bool("REFLECTIONFRESNEL", true);
            defines.set_bool("REFLECTIONFALLOFF", props.reflection_falloff_distance > 0.0);
        }
        true
    }

    fn add_uniforms(&self, defines: &ShaderDefines, layout: &mut UniformLayoutBuilder) {
        if !defines.is_enabled("REFLECTION") {
            return;
        }
        layout
            .add("vReflectionInfos", UniformKind::Vec2)
            .add("reflectionMatrix", UniformKind::Mat4)
            .add("vReflectionMicrosurfaceInfos", UniformKind::Vec3);
        if defines.is_enabled("REFLECTIONFRESNEL") {
            layout
                .add("vBackgroundCenter", UniformKind::Vec3)
                .add("vReflectionControl", UniformKind::Vec4);
        }
        if defines.is_enabled("PROJECTED_GROUND") {
            layout.add("projectedGroundInfos", UniformKind::Vec2);
        }
    }

    fn add_samplers(&self, defines: &ShaderDefines, samplers: &mut Vec<&'static str>) {
        if !defines.is_enabled("REFLECTION") {
            return;
        }
        samplers.push("reflectionSampler");
        if defines.is_enabled("REFLECTIONBLUR") && !defines.is_enabled("TEXTURELODSUPPORT") {
            samplers.push("reflectionSamplerLow");
            samplers.push("reflectionSamplerHigh");
        }
    }

    fn bind(&self, props: &BackgroundProperties, ctx: &mut BindContext<'_>) -> Result<()> {
        if !ctx.defines.is_enabled("REFLECTION") {
            return Ok(());
        }
        let Some(texture) = &props.reflection_texture else {
            return Ok(());
        };

        if ctx.update_static {
            ctx.ubo.update_mat4("reflectionMatrix", &texture.reflection_matrix())?;
            ctx.ubo.update_float2("vReflectionInfos", texture.level(), props.reflection_blur)?;
            ctx.ubo.update_float3(
                "vReflectionMicrosurfaceInfos",
                texture.size().width as f32,
                texture.lod_generation_scale(),
                texture.lod_generation_offset(),
            )?;
        }
        if ctx.must_rebind {
            if ctx.defines.is_enabled("REFLECTIONFRESNEL") {
                ctx.ubo.update_vec3("vBackgroundCenter", props.scene_center)?;
                ctx.ubo.update_vec4("vReflectionControl", props.reflection_controls())?;
            }
            if ctx.defines.is_enabled("PROJECTED_GROUND") {
                ctx.ubo.update_float2(
                    "projectedGroundInfos",
                    props.projected_ground_radius,
                    props.projected_ground_height,
                )?;
            }
        }

        let blur_without_lod = ctx.defines.is_enabled("REFLECTIONBLUR")
            && !ctx.defines.is_enabled("TEXTURELODSUPPORT");
        if blur_without_lod {
            let lod = texture.lod_textures();
            let id = texture.id();
            ctx.backend
                .bind_texture(ctx.program, "reflectionSampler", lod.mid.unwrap_or(id));
            ctx.backend
                .bind_texture(ctx.program, "reflectionSamplerLow", lod.low.unwrap_or(id));
            ctx.backend
                .bind_texture(ctx.program, "reflectionSamplerHigh", lod.high.unwrap_or(id));
        } else {
            ctx.backend.bind_texture(ctx.program, "reflectionSampler", texture.id());
        }
        Ok(())
    }
}

// ─── Image processing ────────────────────────────────────────────────────────

/// Exposure, contrast, vignette, dithering and color grading applied in the
/// material shader.
#[derive(Debug, Default)]
pub struct ImageProcessingBlock;

impl FeatureBlock<BackgroundProperties> for ImageProcessingBlock {
    fn name(&self) -> &'static str {
        "image_processing"
    }

    fn partition(&self) -> Partition {
        Partition::ImageProcessing
    }

    fn prepare_defines(
        &self,
        props: &BackgroundProperties,
        _ctx: &DefineContext<'_>,
        defines: &mut ShaderDefines,
    ) -> bool {
        let config = props.image_processing.read();
        if !config.is_ready() {
            return false;
        }
        config.prepare_defines(defines);
        true
    }

    fn add_uniforms(&self, defines: &ShaderDefines, layout: &mut UniformLayoutBuilder) {
        if !defines.is_enabled("IMAGEPROCESSING") {
            return;
        }
        layout
            .add("exposureLinear", UniformKind::Float)
            .add("contrast", UniformKind::Float);
        if defines.is_enabled("VIGNETTE") {
            layout
                .add("vignetteSettings1", UniformKind::Vec4)
                .add("vignetteSettings2", UniformKind::Vec4);
        }
        if defines.is_enabled("DITHER") {
            layout.add("ditherIntensity", UniformKind::Float);
        }
    }

    fn add_samplers(&self, defines: &ShaderDefines, samplers: &mut Vec<&'static str>) {
        if defines.is_enabled("COLORGRADING") {
            samplers.push("txColorTransform");
        }
    }

    fn bind(&self, props: &BackgroundProperties, ctx: &mut BindContext<'_>) -> Result<()> {
        let defines = ctx.defines;
        if !defines.is_enabled("IMAGEPROCESSING") {
            return Ok(());
        }
        let config = props.image_processing.read();

        if ctx.must_rebind || !ctx.frozen {
            ctx.ubo.update_float("exposureLinear", config.exposure())?;
            ctx.ubo.update_float("contrast", config.contrast())?;
            if defines.is_enabled("VIGNETTE") {
                // Unit scale, centred on the viewport.
                ctx.ubo.update_vec4("vignetteSettings1", Vec4::new(1.0, 1.0, 0.0, 0.0))?;
                let color = config.vignette_color();
                let power = -2.0 * config.vignette_weight();
                ctx.ubo.update_vec4(
                    "vignetteSettings2",
                    Vec4::new(color.x, color.y, color.z, power),
                )?;
            }
            if defines.is_enabled("DITHER") {
                ctx.ubo.update_float("ditherIntensity", config.dithering_intensity())?;
            }
        }

        if defines.is_enabled("COLORGRADING")
            && let Some(texture) = config.color_grading_texture()
        {
            ctx.backend.bind_texture(ctx.program, "txColorTransform", texture.id());
        }
        Ok(())
    }
}
