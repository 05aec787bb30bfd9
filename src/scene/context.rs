//! Per-frame scene inputs.
//!
//! [`SceneContext`] is the read-only view of the scene the variant pipeline
//! needs: active lights, fog, clip planes, global feature toggles and a
//! render id that changes whenever something a bound draw depends on changes.
//!
//! Scene-wide toggles that alter defines bump the scene's own
//! [`DirtyTracker`]; readiness checks combine it with each material's tracker,
//! so one scene change invalidates the matching partition of every material.

use super::light::Light;
use crate::resources::dirty::{DirtyTracker, Partition};
use crate::resources::image_processing::{ImageProcessingConfiguration, SharedImageProcessing};

/// Maximum number of user clip planes.
pub const MAX_CLIP_PLANES: usize = 6;

#[derive(Debug)]
pub struct SceneContext {
    render_id: u64,
    dirty: DirtyTracker,
    lights: Vec<Light>,
    lights_enabled: bool,
    shadows_enabled: bool,
    textures_enabled: bool,
    fog_enabled: bool,
    multiview: bool,
    use_right_handed_system: bool,
    clip_planes: [bool; MAX_CLIP_PLANES],
    /// Default image-processing configuration for materials without their own.
    pub image_processing: SharedImageProcessing,
}

impl Default for SceneContext {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! scene_toggle {
    ($getter:ident, $setter:ident, $field:ident, $partition:expr) => {
        #[inline]
        #[must_use]
        pub fn $getter(&self) -> bool {
            self.$field
        }

        pub fn $setter(&mut self, value: bool) {
            if self.$field != value {
                self.$field = value;
                self.mark_materials_dirty($partition);
            }
        }
    };
}

impl SceneContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            render_id: 1,
            dirty: DirtyTracker::new(),
            lights: Vec::new(),
            lights_enabled: true,
            shadows_enabled: true,
            textures_enabled: true,
            fog_enabled: false,
            multiview: false,
            use_right_handed_system: false,
            clip_planes: [false; MAX_CLIP_PLANES],
            image_processing: ImageProcessingConfiguration::new().shared(),
        }
    }

    // ── Render id ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn render_id(&self) -> u64 {
        self.render_id
    }

    /// Signals that bound uniforms may be stale (camera moved, new frame
    /// target, cached material reset).
    pub fn bump_render_id(&mut self) {
        self.render_id = self.render_id.wrapping_add(1);
    }

    // ── Dirty tracking ───────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn dirty_tracker(&self) -> &DirtyTracker {
        &self.dirty
    }

    /// Marks `partition` dirty for every material rendered in this scene.
    pub fn mark_materials_dirty(&mut self, partition: Partition) {
        self.dirty.mark_dirty(partition);
        self.bump_render_id();
    }

    // ── Toggles ──────────────────────────────────────────────────────────────

    scene_toggle!(lights_enabled, set_lights_enabled, lights_enabled, Partition::Lights);
    scene_toggle!(shadows_enabled, set_shadows_enabled, shadows_enabled, Partition::Lights);
    scene_toggle!(textures_enabled, set_textures_enabled, textures_enabled, Partition::Textures);
    scene_toggle!(fog_enabled, set_fog_enabled, fog_enabled, Partition::Misc);
    scene_toggle!(multiview, set_multiview, multiview, Partition::Misc);
    scene_toggle!(
        use_right_handed_system,
        set_use_right_handed_system,
        use_right_handed_system,
        Partition::Textures
    );

    // ── Lights ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn add_light(&mut self, light: Light) -> u64 {
        let id = light.id;
        self.lights.push(light);
        self.mark_materials_dirty(Partition::Lights);
        id
    }

    pub fn remove_light(&mut self, id: u64) -> Option<Light> {
        let index = self.lights.iter().position(|l| l.id == id)?;
        let light = self.lights.remove(index);
        self.mark_materials_dirty(Partition::Lights);
        Some(light)
    }

    /// Mutates a light. Its define-relevant state is re-read on the next
    /// readiness check.
    pub fn update_light(&mut self, id: u64, f: impl FnOnce(&mut Light)) -> bool {
        let Some(light) = self.lights.iter_mut().find(|l| l.id == id) else {
            return false;
        };
        f(light);
        self.mark_materials_dirty(Partition::Lights);
        true
    }

    /// Enabled lights, in declaration order.
    pub fn active_lights(&self) -> impl Iterator<Item = &Light> {
        self.lights
            .iter()
            .filter(move |l| self.lights_enabled && l.enabled)
    }

    // ── Clip planes ──────────────────────────────────────────────────────────

    /// Clip planes are frame-bound: they are re-read on every readiness check
    /// and only bump the render id.
    pub fn set_clip_plane(&mut self, index: usize, enabled: bool) {
        if let Some(slot) = self.clip_planes.get_mut(index)
            && *slot != enabled
        {
            *slot = enabled;
            self.bump_render_id();
        }
    }

    #[must_use]
    pub fn clip_plane(&self, index: usize) -> bool {
        self.clip_planes.get(index).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn clip_plane_count(&self) -> usize {
        self.clip_planes.iter().filter(|&&c| c).count()
    }
}
