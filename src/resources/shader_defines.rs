//! Shader Define System
//!
//! A [`ShaderDefines`] is the set of capability flags that selects one shader
//! variant out of a template. Names are interned [`Symbol`]s, values are
//! either booleans or small integers (enum ordinals are stored as integers).
//!
//! # Canonical form
//!
//! - Entries are kept sorted by name (lexicographically), so insertion order
//!   never leaks into hashes or keys.
//! - A boolean set to `false` is **inactive** and is removed: it is
//!   indistinguishable from a define that was never set.
//! - Integer defines always participate, including `0`.
//!
//! Two sets with the same active values therefore produce the same
//! [`DefineKey`], which is what the variant cache relies on.
//!
//! ```rust,ignore
//! use myth_variants::resources::ShaderDefines;
//!
//! let mut defines = ShaderDefines::new();
//! defines.set_bool("REFLECTION", true);
//! defines.set_int("NUM_BONE_INFLUENCERS", 4);
//!
//! let key = defines.to_key();
//! assert_eq!(key.as_str(), "#define NUM_BONE_INFLUENCERS 4\n#define REFLECTION\n");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::utils::interner::{self, Symbol};

/// Value of a single define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefineValue {
    Bool(bool),
    Int(i32),
}

impl DefineValue {
    /// Boolean view: `Int` values are enabled when non-zero.
    #[inline]
    #[must_use]
    pub fn is_enabled(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_int(self) -> i32 {
        match self {
            Self::Bool(b) => i32::from(b),
            Self::Int(i) => i,
        }
    }
}

impl From<bool> for DefineValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for DefineValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for DefineValue {
    fn from(value: u32) -> Self {
        Self::Int(i32::try_from(value).unwrap_or(i32::MAX))
    }
}

/// Canonical serialized form of a [`ShaderDefines`].
///
/// Equality compares the text, hashing uses the precomputed xxh3 digest.
#[derive(Clone, PartialEq, Eq)]
pub struct DefineKey {
    text: Arc<str>,
    hash: u64,
}

impl DefineKey {
    fn from_text(text: String) -> Self {
        let hash = xxh3_64(text.as_bytes());
        Self {
            text: text.into(),
            hash,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    #[must_use]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl Hash for DefineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for DefineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DefineKey")
            .field(&format_args!("{:016x}", self.hash))
            .finish()
    }
}

impl fmt::Display for DefineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A collection of shader define values in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderDefines {
    defines: Vec<(Symbol, DefineValue)>,
}

impl ShaderDefines {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defines: Vec::with_capacity(capacity),
        }
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.defines
            .binary_search_by(|&(k, _)| interner::resolve(k).cmp(name))
    }

    /// Sets a define. Returns `true` when the active value changed.
    ///
    /// `Bool(false)` removes the define.
    pub fn set(&mut self, name: &str, value: impl Into<DefineValue>) -> bool {
        let value = value.into();
        if value == DefineValue::Bool(false) {
            return self.remove(name);
        }
        match self.position(name) {
            Ok(idx) => {
                if self.defines[idx].1 == value {
                    false
                } else {
                    self.defines[idx].1 = value;
                    true
                }
            }
            Err(idx) => {
                self.defines.insert(idx, (interner::intern(name), value));
                true
            }
        }
    }

    #[inline]
    pub fn set_bool(&mut self, name: &str, value: bool) -> bool {
        self.set(name, value)
    }

    #[inline]
    pub fn set_int(&mut self, name: &str, value: i32) -> bool {
        self.set(name, value)
    }

    /// Removes a define. Returns `true` if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        if let Ok(idx) = self.position(name) {
            self.defines.remove(idx);
            true
        } else {
            false
        }
    }

    /// Removes every define whose name starts with `prefix`.
    pub fn remove_prefixed(&mut self, prefix: &str) -> bool {
        let before = self.defines.len();
        self.defines
            .retain(|&(k, _)| !interner::resolve(k).starts_with(prefix));
        before != self.defines.len()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<DefineValue> {
        self.position(name).ok().map(|idx| self.defines[idx].1)
    }

    /// `true` when the define is present and enabled.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(DefineValue::is_enabled)
    }

    #[inline]
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).map(DefineValue::as_int)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.defines.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterates all active defines (as Symbols) in canonical order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(Symbol, DefineValue)> {
        self.defines.iter()
    }

    /// Iterates all active defines as `(name, value)` in canonical order.
    pub fn iter_named(&self) -> impl Iterator<Item = (&'static str, DefineValue)> + '_ {
        self.defines
            .iter()
            .map(|&(k, v)| (interner::resolve(k), v))
    }

    /// Merges another set into this one; values from `other` win.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for (name, value) in other.iter_named() {
            self.set(name, value);
        }
    }

    /// Serializes the set into its canonical key.
    #[must_use]
    pub fn to_key(&self) -> DefineKey {
        let mut text = String::with_capacity(self.defines.len() * 24);
        for (name, value) in self.iter_named() {
            match value {
                DefineValue::Bool(_) => {
                    text.push_str("#define ");
                    text.push_str(name);
                    text.push('\n');
                }
                DefineValue::Int(i) => {
                    text.push_str("#define ");
                    text.push_str(name);
                    text.push(' ');
                    text.push_str(&i.to_string());
                    text.push('\n');
                }
            }
        }
        DefineKey::from_text(text)
    }

    /// Content hash (for fast comparisons outside the cache).
    #[must_use]
    pub fn compute_hash(&self) -> u64 {
        use std::hash::BuildHasher;

        rustc_hash::FxBuildHasher.hash_one(self)
    }
}

impl Hash for ShaderDefines {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.defines.hash(state);
    }
}

impl From<&[(&str, DefineValue)]> for ShaderDefines {
    fn from(defines: &[(&str, DefineValue)]) -> Self {
        let mut result = Self::with_capacity(defines.len());
        for &(k, v) in defines {
            result.set(k, v);
        }
        result
    }
}
