//! Uniform binding discipline: redundant binds are skipped, frozen
//! materials do not re-upload, and textures are bound on every draw.

mod common;

use glam::Vec3;

use common::{Harness, MockBackend, MockTexture, texture_ref};
use myth_variants::errors::VariantError;
use myth_variants::renderer::BackendCaps;
use myth_variants::resources::{LodTextures, TextureId};

fn slot(material: &myth_variants::BackgroundMaterial, name: &str) -> Vec<f32> {
    material
        .uniform_buffer()
        .slot(name)
        .unwrap_or_else(|| panic!("no uniform slot `{name}`"))
        .to_vec()
}

// ============================================================================
// Rebind decisions
// ============================================================================

#[test]
fn first_bind_uploads_and_repeats_are_skipped() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();

    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(h.backend.buffers_created, 1);
    assert_eq!(h.backend.buffer_binds, 1);
    assert_eq!(h.backend.uploads, 1);
    assert_eq!(
        h.backend.last_upload.len() as u64,
        material.uniform_buffer().layout().size_bytes()
    );

    for _ in 0..3 {
        assert!(h.frame(&mut material, &mut drawable));
    }
    assert_eq!(h.backend.buffer_binds, 1);
    assert_eq!(h.backend.uploads, 1);

    let stats = h.session.stats();
    assert_eq!(stats.binds, 4);
    assert_eq!(stats.rebinds, 1);
}

#[test]
fn render_id_change_rebinds_without_reuploading_equal_data() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));

    h.scene.bump_render_id();
    assert!(h.frame(&mut material, &mut drawable));

    assert_eq!(h.session.stats().rebinds, 2);
    assert_eq!(h.backend.buffer_binds, 2);
    // Values were rewritten but did not change
    assert_eq!(h.backend.uploads, 1);
}

#[test]
fn binding_only_setters_force_a_rebind() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(slot(&material, "fFovMultiplier"), vec![1.0]);

    material.set_fov_multiplier(1.5);
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(slot(&material, "fFovMultiplier"), vec![1.5]);
    assert_eq!(h.backend.uploads, 2);

    material.set_shadow_level(0.25);
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(slot(&material, "shadowLevel"), vec![0.25]);
    assert_eq!(h.backend.uploads, 3);
    assert_eq!(h.backend.create_count(), 1);
}

#[test]
fn visibility_and_session_reset_trigger_rebinds() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));

    drawable.set_visibility(0.5);
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(h.session.stats().rebinds, 2);

    h.session.reset();
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(h.session.stats().rebinds, 3);

    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(h.session.stats().rebinds, 3);
}

#[test]
fn always_bind_backends_rebind_the_buffer_every_draw() {
    let caps = BackendCaps {
        always_bind_uniform_buffers: true,
        ..BackendCaps::default()
    };
    let mut h = Harness::with_backend(MockBackend::with_caps(caps));
    let mut material = h.material();
    let mut drawable = h.drawable();

    for _ in 0..3 {
        assert!(h.frame(&mut material, &mut drawable));
    }
    assert_eq!(h.backend.buffer_binds, 3);
    assert_eq!(h.backend.uploads, 1);
}

// ============================================================================
// Frozen materials
// ============================================================================

#[test]
fn frozen_material_skips_uploads_but_binds_textures() {
    let mut h = Harness::new();
    let texture = MockTexture::new().shared();
    let mut material = h.material();
    material.set_diffuse_texture(Some(texture_ref(&texture)));
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));
    material.freeze();

    let uploads = h.backend.uploads;
    let writes = material.uniform_buffer().write_count();
    for _ in 0..3 {
        assert!(h.frame(&mut material, &mut drawable));
    }
    assert_eq!(h.backend.uploads, uploads);
    assert_eq!(material.uniform_buffer().write_count(), writes);
    assert_eq!(h.backend.texture_binds_for("diffuseSampler"), 4);

    // A new render id rebinds, but static uniforms stay as uploaded
    h.scene.bump_render_id();
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(h.backend.uploads, uploads);
    assert_eq!(h.backend.texture_binds_for("diffuseSampler"), 5);
    assert!(material.uniform_buffer().write_count() > writes);
}

#[test]
fn forced_rebind_rewrites_static_uniforms_of_frozen_material() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));
    material.freeze();

    let writes = material.uniform_buffer().write_count();
    drawable.mark_for_rebind();
    assert!(drawable.needs_rebind());
    assert!(h.frame(&mut material, &mut drawable));

    assert!(!drawable.needs_rebind());
    // vPrimaryColor, shadowLevel, alpha and fFovMultiplier
    assert_eq!(material.uniform_buffer().write_count(), writes + 4);
}

// ============================================================================
// Uniform layout
// ============================================================================

#[test]
fn layout_follows_the_bound_variant() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));
    let generation = material.uniform_buffer().layout_generation();
    assert!(material.uniform_buffer().slot("pointSize").is_none());

    material.set_points_cloud(true);
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(material.uniform_buffer().layout_generation(), generation + 1);
    assert_eq!(slot(&material, "pointSize"), vec![1.0]);

    material.set_point_size(3.0);
    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(slot(&material, "pointSize"), vec![3.0]);
}

#[test]
fn drawables_on_different_variants_share_one_layout() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut plain = h.drawable();
    let mut instanced = h.drawable();

    assert!(h.is_ready_with(&mut material, &mut plain, false));
    assert!(h.is_ready_with(&mut material, &mut instanced, true));
    assert_ne!(
        plain.variant().expect("variant").program,
        instanced.variant().expect("variant").program
    );
    let generation = material.uniform_buffer().layout_generation();

    for _ in 0..2 {
        h.bind(&mut material, &mut plain);
        h.bind(&mut material, &mut instanced);
    }
    assert_eq!(material.uniform_buffer().layout_generation(), generation);
    assert_eq!(h.session.stats().rebinds, 4);
}

#[test]
fn highlight_and_shadow_colors_are_uploaded() {
    let mut h = Harness::new();
    let mut material = h.material();
    material.set_primary_color(Vec3::splat(0.5));
    material.set_primary_color_shadow_level(0.5);
    material.set_primary_color_highlight_level(0.5);
    material.set_use_rgb_color(false);
    let mut drawable = h.drawable();

    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(slot(&material, "vPrimaryColor"), vec![0.75, 0.75, 0.75, 1.0]);
    assert_eq!(slot(&material, "vPrimaryColorShadow"), vec![0.25, 0.25, 0.25, 1.0]);
}

#[test]
fn fresnel_controls_are_uploaded_with_the_reflection() {
    let mut h = Harness::new();
    let reflection = MockTexture::cube().shared();
    let mut material = h.material();
    material.set_reflection_texture(Some(texture_ref(&reflection)));
    material.set_reflection_fresnel(true);
    material.set_reflection_falloff_distance(4.0);
    material.set_scene_center(Vec3::new(0.0, 1.0, 0.0));
    let mut drawable = h.drawable();

    assert!(h.frame(&mut material, &mut drawable));
    assert_eq!(slot(&material, "vReflectionControl"), vec![1.0, 0.05, 0.5, 0.25]);
    assert_eq!(slot(&material, "vBackgroundCenter"), vec![0.0, 1.0, 0.0]);
    assert_eq!(h.backend.texture_binds_for("reflectionSampler"), 1);
}

#[test]
fn image_processing_uniforms_follow_the_configuration() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));
    assert!(material.uniform_buffer().slot("exposureLinear").is_none());

    h.scene.image_processing.write().set_exposure(2.0);
    assert!(h.frame(&mut material, &mut drawable));

    let defines = drawable.defines().expect("defines");
    assert!(defines.is_enabled("IMAGEPROCESSING"));
    assert!(defines.is_enabled("EXPOSURE"));
    assert_eq!(slot(&material, "exposureLinear"), vec![2.0]);
    assert_eq!(slot(&material, "contrast"), vec![1.0]);
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn blur_without_lod_support_binds_prefiltered_levels() {
    let caps = BackendCaps {
        texture_lod: false,
        ..BackendCaps::default()
    };
    let mut h = Harness::with_backend(MockBackend::with_caps(caps));
    let low = TextureId::next();
    let high = TextureId::next();
    let mut texture = MockTexture::cube();
    texture.lod = LodTextures {
        low: Some(low),
        mid: None,
        high: Some(high),
    };
    let texture = texture.shared();

    let mut material = h.material();
    material.set_reflection_texture(Some(texture_ref(&texture)));
    material.set_reflection_blur(0.5);
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));

    let variant = drawable.variant().expect("variant");
    assert!(variant.defines.is_enabled("REFLECTIONBLUR"));
    assert!(!variant.defines.is_enabled("TEXTURELODSUPPORT"));
    assert!(variant.samplers.contains(&"reflectionSamplerLow"));

    let bound: Vec<_> = h.backend.texture_binds.iter().map(|(s, id)| (s.as_str(), *id)).collect();
    assert!(bound.contains(&("reflectionSampler", texture_ref(&texture).id())));
    assert!(bound.contains(&("reflectionSamplerLow", low)));
    assert!(bound.contains(&("reflectionSamplerHigh", high)));
}

#[test]
fn lod_support_binds_a_single_reflection_texture() {
    let mut h = Harness::new();
    let texture = MockTexture::cube().shared();
    let mut material = h.material();
    material.set_reflection_texture(Some(texture_ref(&texture)));
    material.set_reflection_blur(0.5);
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));

    assert_eq!(h.backend.texture_binds_for("reflectionSampler"), 1);
    assert_eq!(h.backend.texture_binds_for("reflectionSamplerLow"), 0);
}

// ============================================================================
// Errors & lifecycle
// ============================================================================

#[test]
fn binding_without_a_variant_is_an_error() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();

    let result = material.bind_for_drawable(&mut drawable, &h.scene, &mut h.backend, &mut h.session);
    assert!(matches!(result, Err(VariantError::NoVariant(_))));
    assert_eq!(h.backend.uploads, 0);
}

#[test]
fn disposed_material_binds_nothing() {
    let mut h = Harness::new();
    let mut material = h.material();
    let mut drawable = h.drawable();
    assert!(h.frame(&mut material, &mut drawable));

    material.dispose(&mut h.backend);
    assert_eq!(h.backend.buffers_released, 1);

    let uploads = h.backend.uploads;
    h.scene.bump_render_id();
    h.bind(&mut material, &mut drawable);
    assert_eq!(h.backend.uploads, uploads);

    // Disposing twice is a no-op
    material.dispose(&mut h.backend);
    assert_eq!(h.backend.buffers_released, 1);
}
