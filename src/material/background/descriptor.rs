use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BackgroundMaterial, BackgroundProperties, STANDARD_REFLECTANCE0, STANDARD_REFLECTANCE90};

/// Serializable scalar properties of a [`BackgroundMaterial`].
///
/// Textures and the image-processing link are runtime references and are
/// not part of the descriptor. Missing fields take their default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundMaterialDescriptor {
    pub primary_color: Vec3,
    pub perceptual_color: Option<Vec3>,
    pub primary_color_shadow_level: f32,
    pub primary_color_highlight_level: f32,
    pub shadow_level: f32,
    pub shadow_only: bool,
    pub max_simultaneous_lights: u32,
    pub opacity_fresnel: bool,
    pub reflection_blur: f32,
    pub reflection_fresnel: bool,
    pub reflection_falloff_distance: f32,
    pub reflection_amount: f32,
    pub reflection_reflectance0: f32,
    pub reflection_reflectance90: f32,
    pub scene_center: Vec3,
    pub use_equirectangular_fov: bool,
    pub switch_to_bgr: bool,
    pub fov_multiplier: f32,
    pub enable_ground_projection: bool,
    pub projected_ground_radius: f32,
    pub projected_ground_height: f32,
    pub use_rgb_color: bool,
    pub enable_noise: bool,
    pub alpha: f32,
    pub premultiply_alpha: bool,
    pub point_size: f32,
    pub points_cloud: bool,
    pub fog_enabled: bool,
    pub use_logarithmic_depth: bool,
}

impl Default for BackgroundMaterialDescriptor {
    fn default() -> Self {
        Self {
            primary_color: Vec3::ONE,
            perceptual_color: None,
            primary_color_shadow_level: 0.0,
            primary_color_highlight_level: 0.0,
            shadow_level: 0.0,
            shadow_only: false,
            max_simultaneous_lights: 4,
            opacity_fresnel: true,
            reflection_blur: 0.0,
            reflection_fresnel: false,
            reflection_falloff_distance: 0.0,
            reflection_amount: 1.0,
            reflection_reflectance0: STANDARD_REFLECTANCE0,
            reflection_reflectance90: STANDARD_REFLECTANCE90,
            scene_center: Vec3::ZERO,
            use_equirectangular_fov: false,
            switch_to_bgr: false,
            fov_multiplier: 1.0,
            enable_ground_projection: false,
            projected_ground_radius: 1000.0,
            projected_ground_height: 10.0,
            use_rgb_color: true,
            enable_noise: false,
            alpha: 1.0,
            premultiply_alpha: false,
            point_size: 1.0,
            points_cloud: false,
            fog_enabled: true,
            use_logarithmic_depth: false,
        }
    }
}

impl BackgroundMaterialDescriptor {
    pub(super) fn from_properties(props: &BackgroundProperties) -> Self {
        Self {
            primary_color: props.primary_color,
            perceptual_color: props.perceptual_color,
            primary_color_shadow_level: props.primary_color_shadow_level,
            primary_color_highlight_level: props.primary_color_highlight_level,
            shadow_level: props.shadow_level,
            shadow_only: props.shadow_only,
            max_simultaneous_lights: props.max_simultaneous_lights,
            opacity_fresnel: props.opacity_fresnel,
            reflection_blur: props.reflection_blur,
            reflection_fresnel: props.reflection_fresnel,
            reflection_falloff_distance: props.reflection_falloff_distance,
            reflection_amount: props.reflection_amount,
            reflection_reflectance0: props.reflection_reflectance0,
            reflection_reflectance90: props.reflection_reflectance90,
            scene_center: props.scene_center,
            use_equirectangular_fov: props.use_equirectangular_fov,
            switch_to_bgr: props.switch_to_bgr,
            fov_multiplier: props.fov_multiplier,
            enable_ground_projection: props.enable_ground_projection,
            projected_ground_radius: props.projected_ground_radius,
            projected_ground_height: props.projected_ground_height,
            use_rgb_color: props.use_rgb_color,
            enable_noise: props.enable_noise,
            alpha: props.alpha,
            premultiply_alpha: props.premultiply_alpha,
            point_size: props.point_size,
            points_cloud: props.points_cloud,
            fog_enabled: props.fog_enabled,
            use_logarithmic_depth: props.use_logarithmic_depth,
        }
    }

    pub(super) fn apply(&self, material: &mut BackgroundMaterial) {
        match self.perceptual_color {
            Some(color) => material.set_perceptual_color(Some(color)),
            None => material.set_primary_color(self.primary_color),
        }
        material.set_primary_color_shadow_level(self.primary_color_shadow_level);
        material.set_primary_color_highlight_level(self.primary_color_highlight_level);
        material.set_shadow_level(self.shadow_level);
        material.set_shadow_only(self.shadow_only);
        material.set_max_simultaneous_lights(self.max_simultaneous_lights);
        material.set_opacity_fresnel(self.opacity_fresnel);
        material.set_reflection_blur(self.reflection_blur);
        material.set_reflection_fresnel(self.reflection_fresnel);
        material.set_reflection_falloff_distance(self.reflection_falloff_distance);
        material.set_reflection_amount(self.reflection_amount);
        material.set_reflection_reflectance0(self.reflection_reflectance0);
        material.set_reflection_reflectance90(self.reflection_reflectance90);
        material.set_scene_center(self.scene_center);
        material.set_use_equirectangular_fov(self.use_equirectangular_fov);
        material.set_switch_to_bgr(self.switch_to_bgr);
        material.set_fov_multiplier(self.fov_multiplier);
        material.set_enable_ground_projection(self.enable_ground_projection);
        material.set_projected_ground_radius(self.projected_ground_radius);
        material.set_projected_ground_height(self.projected_ground_height);
        material.set_use_rgb_color(self.use_rgb_color);
        material.set_enable_noise(self.enable_noise);
        material.set_alpha(self.alpha);
        material.set_premultiply_alpha(self.premultiply_alpha);
        material.set_point_size(self.point_size);
        material.set_points_cloud(self.points_cloud);
        material.set_fog_enabled(self.fog_enabled);
        material.set_use_logarithmic_depth(self.use_logarithmic_depth);
    }
}
