//! Scene inputs consumed by the define pipeline.
//!
//! - [`SceneContext`]: lights, fog, clip planes, feature toggles, render id
//! - [`Light`]: light type and shadow status

pub mod context;
pub mod light;

pub use context::{MAX_CLIP_PLANES, SceneContext};
pub use light::{Light, LightKind, ShadowConfig, ShadowFilter};
