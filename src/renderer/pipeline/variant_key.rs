//! Structured variant cache keys.
//!
//! A variant is identified by its base shader and the canonical key of its
//! defines. Both parts are kept separate, so two shaders can never collide
//! through string concatenation.

use std::fmt;

use crate::resources::shader_defines::DefineKey;
use crate::utils::interner::{self, Symbol};

/// Interned name of a base shader template (e.g. `"background"`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(Symbol);

impl ShaderId {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(interner::intern(name))
    }

    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        interner::resolve(self.0)
    }
}

impl fmt::Debug for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShaderId({})", self.name())
    }
}

impl fmt::Display for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub shader: ShaderId,
    pub defines: DefineKey,
}

impl VariantKey {
    #[must_use]
    pub fn new(shader: ShaderId, defines: DefineKey) -> Self {
        Self { shader, defines }
    }
}
