//! Global String Interner
//!
//! Converts define names and shader ids into integer [`Symbol`]s so they can
//! be compared and hashed cheaply. This is the backbone of the define system.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact integer identifier for an interned string.
pub type Symbol = Spur;

/// Interns a string, returning its [`Symbol`].
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up an already interned string without allocating.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a [`Symbol`] back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// Pre-interns the define names used by the built-in background material so
/// the first readiness pass does not allocate on the hot path.
pub fn preload_common_defines() {
    let common = [
        // Textures
        "DIFFUSE",
        "DIFFUSEDIRECTUV",
        "GAMMADIFFUSE",
        "DIFFUSEHASALPHA",
        "OPACITYFRESNEL",
        "REFLECTION",
        "REFLECTIONBLUR",
        "REFLECTIONFRESNEL",
        "REFLECTIONFALLOFF",
        "REFLECTIONMAP_3D",
        "REFLECTIONMAP_CUBIC",
        "TEXTURELODSUPPORT",
        // Lights
        "USEHIGHLIGHTANDSHADOWCOLORS",
        "BACKMAT_SHADOWONLY",
        // Misc
        "FOG",
        "POINTSIZE",
        "NORMAL",
        "UV1",
        "UV2",
        "NUM_BONE_INFLUENCERS",
        "INSTANCES",
        // Image processing
        "IMAGEPROCESSING",
        "TONEMAPPING",
        "EXPOSURE",
        "CONTRAST",
    ];

    for name in common {
        intern(name);
    }
}
