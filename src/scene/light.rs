use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

static NEXT_LIGHT_ID: AtomicU64 = AtomicU64::new(1);

/// Shadow map filtering; selects the per-light shadow code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowFilter {
    #[default]
    Hard,
    Pcf,
    Pcss,
}

/// Shadow settings that select shader code. Map size and biases are
/// uniforms and never reach the define key.
#[derive(Debug, Clone, Default)]
pub struct ShadowConfig {
    pub filter: ShadowFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
    Hemispheric,
}

impl LightKind {
    /// Prefix of the per-light type define (`DIRLIGHT0`, `POINTLIGHT1`, …).
    #[must_use]
    pub const fn define_prefix(self) -> &'static str {
        match self {
            Self::Directional => "DIRLIGHT",
            Self::Point => "POINTLIGHT",
            Self::Spot => "SPOTLIGHT",
            Self::Hemispheric => "HEMILIGHT",
        }
    }
}

/// A light as seen by the define pipeline: its type and shadow status.
#[derive(Debug, Clone)]
pub struct Light {
    pub id: u64,
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub enabled: bool,

    pub cast_shadows: bool,
    pub shadow: Option<ShadowConfig>,
}

impl Light {
    #[must_use]
    pub fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        Self {
            id: NEXT_LIGHT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            color,
            intensity,
            enabled: true,
            cast_shadows: false,
            shadow: Some(ShadowConfig::default()),
        }
    }

    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Directional, color, intensity)
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Point, color, intensity)
    }

    #[must_use]
    pub fn new_spot(color: Vec3, intensity: f32) -> Self {
        Self::new(LightKind::Spot, color, intensity)
    }

    #[must_use]
    pub fn with_shadows(mut self) -> Self {
        self.cast_shadows = true;
        self
    }

    /// `true` if this light renders a shadow map.
    #[inline]
    #[must_use]
    pub fn casts_shadows(&self) -> bool {
        self.cast_shadows && self.shadow.is_some()
    }
}
