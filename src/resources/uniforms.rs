//! Uniform block layout.
//!
//! A [`UniformLayout`] describes the `Material` uniform block of a variant:
//! an ordered list of named slots with float offsets. Offsets follow the
//! WGSL uniform address-space alignment rules for the supported kinds
//! (`vec2` aligns to 2 floats, `vec3`/`vec4`/`mat4x4` to 4), and the block
//! is padded to a whole number of 16-byte rows.
//!
//! Which slots exist depends on the active defines, so the layout is rebuilt
//! whenever a drawable switches to a variant with a different block set.

use std::fmt::Write as _;

use crate::utils::interner::{self, Symbol};

/// Shape of a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    /// Size in floats.
    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Mat4 => 16,
        }
    }

    /// Alignment in floats.
    #[inline]
    #[must_use]
    pub const fn alignment(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 | Self::Vec4 | Self::Mat4 => 4,
        }
    }

    #[must_use]
    pub const fn wgsl_type_name(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
            Self::Mat4 => "mat4x4<f32>",
        }
    }
}

/// One slot of the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformEntry {
    pub name: Symbol,
    pub kind: UniformKind,
    /// Offset in floats from the start of the block.
    pub offset: usize,
}

impl UniformEntry {
    #[inline]
    #[must_use]
    pub fn name_str(&self) -> &'static str {
        interner::resolve(self.name)
    }
}

/// Immutable uniform block description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UniformLayout {
    entries: Vec<UniformEntry>,
    size_floats: usize,
}

impl UniformLayout {
    #[must_use]
    pub fn builder() -> UniformLayoutBuilder {
        UniformLayoutBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<(usize, &UniformEntry)> {
        let sym = interner::get(name)?;
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.name == sym)
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[UniformEntry] {
        &self.entries
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Block size in floats (multiple of 4).
    #[inline]
    #[must_use]
    pub fn size_floats(&self) -> usize {
        self.size_floats
    }

    #[inline]
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        (self.size_floats * std::mem::size_of::<f32>()) as u64
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(UniformEntry::name_str)
    }

    /// Generates the WGSL struct declaration for this block.
    #[must_use]
    pub fn wgsl_struct_def(&self, struct_name: &str) -> String {
        let mut code = format!("struct {struct_name} {{\n");
        for entry in &self.entries {
            let _ = writeln!(
                code,
                "    {}: {},",
                entry.name_str(),
                entry.kind.wgsl_type_name()
            );
        }
        code.push_str("};\n");
        code
    }
}

/// Incrementally lays out slots with alignment padding.
#[derive(Debug, Default)]
pub struct UniformLayoutBuilder {
    entries: Vec<UniformEntry>,
    pointer: usize,
}

impl UniformLayoutBuilder {
    /// Appends a slot. Adding the same name twice keeps the first slot.
    pub fn add(&mut self, name: &str, kind: UniformKind) -> &mut Self {
        let sym = interner::intern(name);
        if self.entries.iter().any(|e| e.name == sym) {
            return self;
        }
        let alignment = kind.alignment();
        if self.pointer % alignment != 0 {
            self.pointer += alignment - self.pointer % alignment;
        }
        self.entries.push(UniformEntry {
            name: sym,
            kind,
            offset: self.pointer,
        });
        self.pointer += kind.size();
        self
    }

    #[must_use]
    pub fn build(&self) -> UniformLayout {
        UniformLayout {
            entries: self.entries.clone(),
            size_floats: self.pointer.div_ceil(4) * 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_alignment() {
        let layout = UniformLayout::builder()
            .add("a_scalar", UniformKind::Float)
            .add("b_vec2", UniformKind::Vec2)
            .add("c_vec3", UniformKind::Vec3)
            .add("d_scalar", UniformKind::Float)
            .add("e_mat", UniformKind::Mat4)
            .build();

        let offsets: Vec<_> = layout.entries().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 2, 4, 7, 8]);
        assert_eq!(layout.size_floats(), 24);
        assert_eq!(layout.size_bytes(), 96);
    }

    #[test]
    fn duplicate_names_are_ignored() {
        let layout = UniformLayout::builder()
            .add("alpha", UniformKind::Float)
            .add("alpha", UniformKind::Vec4)
            .build();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.size_floats(), 4);
    }

    #[test]
    fn wgsl_struct_lists_fields() {
        let layout = UniformLayout::builder()
            .add("vPrimaryColor", UniformKind::Vec4)
            .add("alpha", UniformKind::Float)
            .build();
        let code = layout.wgsl_struct_def("Material");
        assert!(code.starts_with("struct Material {"));
        assert!(code.contains("vPrimaryColor: vec4<f32>,"));
        assert!(code.contains("alpha: f32,"));
    }
}
