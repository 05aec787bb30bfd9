//! Partitioned Dirty Tracking
//!
//! Material property mutators bump a per-partition generation counter on the
//! material's [`DirtyTracker`]. Every drawable remembers which generation it
//! last processed, so one mutation marks the partition dirty for *all*
//! drawables using the material without the material knowing about them.

use bitflags::bitflags;

/// Independent dirty-tracking category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    Textures,
    Lights,
    Misc,
    ImageProcessing,
}

impl Partition {
    /// All partitions in recompute order.
    pub const ALL: [Partition; 4] = [
        Partition::Textures,
        Partition::Lights,
        Partition::Misc,
        Partition::ImageProcessing,
    ];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    #[must_use]
    pub const fn flag(self) -> DirtyFlags {
        match self {
            Partition::Textures => DirtyFlags::TEXTURES,
            Partition::Lights => DirtyFlags::LIGHTS,
            Partition::Misc => DirtyFlags::MISC,
            Partition::ImageProcessing => DirtyFlags::IMAGE_PROCESSING,
        }
    }
}

bitflags! {
    /// Bit mask over [`Partition`]s.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        const TEXTURES         = 1 << 0;
        const LIGHTS           = 1 << 1;
        const MISC             = 1 << 2;
        const IMAGE_PROCESSING = 1 << 3;
    }
}

impl DirtyFlags {
    /// Iterates the partitions contained in the mask, in recompute order.
    pub fn partitions(self) -> impl Iterator<Item = Partition> {
        Partition::ALL
            .into_iter()
            .filter(move |p| self.contains(p.flag()))
    }
}

/// Per-material generation counters, one per partition.
///
/// Generations start at 1 so a freshly created drawable (which has seen
/// generation 0) treats every partition as dirty.
#[derive(Debug, Clone, Copy)]
pub struct DirtyTracker {
    generations: [u64; 4],
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generations: [1; 4],
        }
    }

    /// Marks a partition as modified.
    #[inline]
    pub fn mark_dirty(&mut self, partition: Partition) {
        let generation = &mut self.generations[partition.index()];
        *generation = generation.wrapping_add(1);
    }

    pub fn mark_all_dirty(&mut self) {
        for partition in Partition::ALL {
            self.mark_dirty(partition);
        }
    }

    #[inline]
    #[must_use]
    pub fn generation(&self, partition: Partition) -> u64 {
        self.generations[partition.index()]
    }

    #[inline]
    #[must_use]
    pub fn generations(&self) -> [u64; 4] {
        self.generations
    }

    /// Sums two trackers (material + scene). Both only ever grow, so the
    /// sum changes whenever either side does.
    #[must_use]
    pub fn combined(&self, other: &DirtyTracker) -> DirtyTracker {
        let mut generations = self.generations;
        for (g, o) in generations.iter_mut().zip(other.generations) {
            *g = g.wrapping_add(o);
        }
        DirtyTracker { generations }
    }
}
