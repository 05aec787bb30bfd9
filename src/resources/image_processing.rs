//! Image Processing Configuration
//!
//! Scene-wide color pipeline settings (exposure, contrast, tone mapping,
//! vignette, color curves, color grading, dithering) shared by many
//! materials. Materials read it in two ways:
//!
//! - [`ImageProcessingConfiguration::prepare_defines`] writes the
//!   image-processing defines of a variant,
//! - change notifications: a material subscribes an `Arc<AtomicBool>` signal
//!   and marks its image-processing partition dirty when it flips.
//!
//! The configuration is shared as [`SharedImageProcessing`]. Subscribers are
//! held weakly, a dropped material never keeps receiving notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use glam::Vec4;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use super::shader_defines::ShaderDefines;
use super::texture::TextureRef;

new_key_type! {
    /// Subscription handle returned by [`ImageProcessingConfiguration::subscribe`].
    pub struct ObserverKey;
}

/// Shared, lockable configuration.
pub type SharedImageProcessing = Arc<RwLock<ImageProcessingConfiguration>>;

/// Tone mapping operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMappingType {
    #[default]
    Standard,
    Aces,
    Neutral,
}

impl ToneMappingType {
    /// Ordinal written to the `TONEMAPPING` define (0 means disabled).
    #[must_use]
    pub const fn define_ordinal(self) -> i32 {
        match self {
            Self::Standard => 1,
            Self::Aces => 2,
            Self::Neutral => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VignetteBlendMode {
    #[default]
    Multiply,
    Opaque,
}

/// Image-processing defines, all reset when processing is disabled.
const IMAGE_PROCESSING_DEFINES: [&str; 12] = [
    "IMAGEPROCESSING",
    "VIGNETTE",
    "VIGNETTEBLENDMODEMULTIPLY",
    "VIGNETTEBLENDMODEOPAQUE",
    "CONTRAST",
    "EXPOSURE",
    "COLORCURVES",
    "COLORGRADING",
    "COLORGRADING3D",
    "SAMPLER3DGREENDEPTH",
    "SAMPLER3DBGRMAP",
    "DITHER",
];

#[derive(Debug)]
pub struct ImageProcessingConfiguration {
    enabled: bool,
    exposure: f32,
    contrast: f32,
    tone_mapping_enabled: bool,
    tone_mapping_type: ToneMappingType,
    vignette_enabled: bool,
    vignette_blend_mode: VignetteBlendMode,
    vignette_weight: f32,
    vignette_color: Vec4,
    color_curves_enabled: bool,
    color_grading_enabled: bool,
    color_grading_texture: Option<TextureRef>,
    color_grading_with_green_depth: bool,
    color_grading_bgr: bool,
    dithering_enabled: bool,
    dithering_intensity: f32,
    apply_by_post_process: bool,
    observers: SlotMap<ObserverKey, Weak<AtomicBool>>,
}

impl Default for ImageProcessingConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! notifying_setter {
    ($setter:ident, $field:ident, $ty:ty) => {
        pub fn $setter(&mut self, value: $ty) {
            if self.$field != value {
                self.$field = value;
                self.notify();
            }
        }
    };
}

impl ImageProcessingConfiguration {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            exposure: 1.0,
            contrast: 1.0,
            tone_mapping_enabled: false,
            tone_mapping_type: ToneMappingType::Standard,
            vignette_enabled: false,
            vignette_blend_mode: VignetteBlendMode::Multiply,
            vignette_weight: 1.5,
            vignette_color: Vec4::new(0.0, 0.0, 0.0, 0.0),
            color_curves_enabled: false,
            color_grading_enabled: false,
            color_grading_texture: None,
            color_grading_with_green_depth: true,
            color_grading_bgr: true,
            dithering_enabled: false,
            dithering_intensity: 1.0 / 255.0,
            apply_by_post_process: false,
            observers: SlotMap::with_key(),
        }
    }

    /// Wraps the configuration for sharing between materials.
    #[must_use]
    pub fn shared(self) -> SharedImageProcessing {
        Arc::new(RwLock::new(self))
    }

    // ── Notifications ────────────────────────────────────────────────────────

    /// Registers a change signal. The signal is set on every parameter change.
    pub fn subscribe(&mut self, signal: &Arc<AtomicBool>) -> ObserverKey {
        self.observers.insert(Arc::downgrade(signal))
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, key: ObserverKey) -> bool {
        self.observers.remove(key).is_some()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn notify(&mut self) {
        self.observers.retain(|_, weak| match weak.upgrade() {
            Some(signal) => {
                signal.store(true, Ordering::Release);
                true
            }
            None => false,
        });
    }

    // ── Parameters ───────────────────────────────────────────────────────────

    notifying_setter!(set_enabled, enabled, bool);
    notifying_setter!(set_tone_mapping_enabled, tone_mapping_enabled, bool);
    notifying_setter!(set_tone_mapping_type, tone_mapping_type, ToneMappingType);
    notifying_setter!(set_vignette_enabled, vignette_enabled, bool);
    notifying_setter!(set_vignette_blend_mode, vignette_blend_mode, VignetteBlendMode);
    notifying_setter!(set_vignette_weight, vignette_weight, f32);
    notifying_setter!(set_vignette_color, vignette_color, Vec4);
    notifying_setter!(set_color_curves_enabled, color_curves_enabled, bool);
    notifying_setter!(set_color_grading_enabled, color_grading_enabled, bool);
    notifying_setter!(set_color_grading_with_green_depth, color_grading_with_green_depth, bool);
    notifying_setter!(set_color_grading_bgr, color_grading_bgr, bool);
    notifying_setter!(set_dithering_enabled, dithering_enabled, bool);
    notifying_setter!(set_apply_by_post_process, apply_by_post_process, bool);

    /// Sets the exposure. Non-finite or non-positive values fall back to `1.0`.
    pub fn set_exposure(&mut self, value: f32) {
        let value = if value.is_finite() && value > 0.0 {
            value
        } else {
            log::warn!("Invalid image processing exposure {value}, using 1.0");
            1.0
        };
        if self.exposure != value {
            self.exposure = value;
            self.notify();
        }
    }

    /// Sets the contrast. Non-finite values fall back to `1.0`.
    pub fn set_contrast(&mut self, value: f32) {
        let value = if value.is_finite() {
            value.max(0.0)
        } else {
            log::warn!("Invalid image processing contrast {value}, using 1.0");
            1.0
        };
        if self.contrast != value {
            self.contrast = value;
            self.notify();
        }
    }

    pub fn set_dithering_intensity(&mut self, value: f32) {
        let value = if value.is_finite() { value.max(0.0) } else { 1.0 / 255.0 };
        if self.dithering_intensity != value {
            self.dithering_intensity = value;
            self.notify();
        }
    }

    pub fn set_color_grading_texture(&mut self, texture: Option<TextureRef>) {
        let same = match (&self.color_grading_texture, &texture) {
            (Some(a), Some(b)) => a.id() == b.id(),
            (None, None) => true,
            _ => false,
        };
        if !same {
            self.color_grading_texture = texture;
            self.notify();
        }
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    #[must_use]
    pub fn exposure(&self) -> f32 {
        self.exposure
    }

    #[inline]
    #[must_use]
    pub fn contrast(&self) -> f32 {
        self.contrast
    }

    #[inline]
    #[must_use]
    pub fn vignette_weight(&self) -> f32 {
        self.vignette_weight
    }

    #[inline]
    #[must_use]
    pub fn vignette_color(&self) -> Vec4 {
        self.vignette_color
    }

    #[inline]
    #[must_use]
    pub fn dithering_intensity(&self) -> f32 {
        self.dithering_intensity
    }

    #[inline]
    #[must_use]
    pub fn apply_by_post_process(&self) -> bool {
        self.apply_by_post_process
    }

    #[must_use]
    pub fn color_grading_texture(&self) -> Option<&TextureRef> {
        self.color_grading_texture.as_ref()
    }

    fn color_grading_active(&self) -> bool {
        self.color_grading_enabled && self.color_grading_texture.is_some()
    }

    // ── Define pipeline ──────────────────────────────────────────────────────

    /// `false` while an enabled color grading texture is still loading.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match &self.color_grading_texture {
            Some(texture) if self.color_grading_enabled => texture.is_ready_or_not_blocking(),
            _ => true,
        }
    }

    /// Writes the image-processing defines for a material variant.
    ///
    /// When processing is disabled, or applied by a post process instead of
    /// in the material, every flag is reset so stale values cannot leak into
    /// the variant key.
    pub fn prepare_defines(&self, defines: &mut ShaderDefines) {
        if self.apply_by_post_process || !self.enabled {
            for name in IMAGE_PROCESSING_DEFINES {
                defines.set_bool(name, false);
            }
            defines.set_int("TONEMAPPING", 0);
            defines.set_bool(
                "IMAGEPROCESSINGPOSTPROCESS",
                self.apply_by_post_process && self.enabled,
            );
            return;
        }

        let multiply = self.vignette_blend_mode == VignetteBlendMode::Multiply;
        defines.set_bool("VIGNETTE", self.vignette_enabled);
        defines.set_bool("VIGNETTEBLENDMODEMULTIPLY", self.vignette_enabled && multiply);
        defines.set_bool("VIGNETTEBLENDMODEOPAQUE", self.vignette_enabled && !multiply);

        let tone_mapping = if self.tone_mapping_enabled {
            self.tone_mapping_type.define_ordinal()
        } else {
            0
        };
        defines.set_int("TONEMAPPING", tone_mapping);

        let contrast = self.contrast != 1.0;
        let exposure = self.exposure != 1.0;
        defines.set_bool("CONTRAST", contrast);
        defines.set_bool("EXPOSURE", exposure);
        defines.set_bool("COLORCURVES", self.color_curves_enabled);

        let grading = self.color_grading_active();
        defines.set_bool("COLORGRADING", grading);
        defines.set_bool(
            "COLORGRADING3D",
            grading && self.color_grading_texture.as_ref().is_some_and(|t| t.is_3d()),
        );
        defines.set_bool("SAMPLER3DGREENDEPTH", grading && self.color_grading_with_green_depth);
        defines.set_bool("SAMPLER3DBGRMAP", grading && self.color_grading_bgr);
        defines.set_bool("DITHER", self.dithering_enabled);
        defines.set_bool("IMAGEPROCESSINGPOSTPROCESS", false);

        let any = self.vignette_enabled
            || tone_mapping != 0
            || contrast
            || exposure
            || self.color_curves_enabled
            || grading
            || self.dithering_enabled;
        defines.set_bool("IMAGEPROCESSING", any);
    }
}
