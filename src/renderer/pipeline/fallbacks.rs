//! Fallback Lists
//!
//! When a backend rejects a variant because a platform limit was exceeded,
//! the compiler strips optional features and retries. A [`FallbackList`]
//! records which defines may be dropped and in which order: entries with the
//! lowest rank go first, and every entry sharing that rank is dropped in the
//! same reduction step.
//!
//! | Rank        | Dropped                                                 |
//! |-------------|---------------------------------------------------------|
//! | `0`         | `FOG`                                                   |
//! | `1`         | `POINTSIZE`                                             |
//! | `2`         | `MULTIVIEW`                                             |
//! | `3..`       | per-light shadows, highest light index first            |
//! | after those | extra lights (never light 0), highest light index first |
//! | last        | GPU skinning (`NUM_BONE_INFLUENCERS` reset to `0`)      |

use smallvec::SmallVec;

use crate::resources::shader_defines::ShaderDefines;
use crate::utils::interner::{self, Symbol};

pub const FOG_RANK: u32 = 0;
pub const POINT_SIZE_RANK: u32 = 1;
pub const MULTIVIEW_RANK: u32 = 2;
pub const SHADOW_BASE_RANK: u32 = 3;

const LIGHT_TYPE_PREFIXES: [&str; 4] = ["DIRLIGHT", "POINTLIGHT", "SPOTLIGHT", "HEMILIGHT"];
const SHADOW_PREFIXES: [&str; 3] = ["SHADOW", "SHADOWPCF", "SHADOWPCSS"];

/// Outcome of one [`FallbackList::reduce`] step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackReduction {
    pub rank: u32,
    /// Defines removed by this step.
    pub removed: Vec<&'static str>,
    /// Skinning moved off the GPU in this step.
    pub cpu_skinning: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackList {
    entries: SmallVec<[(u32, Symbol); 8]>,
    cpu_skinning_rank: Option<u32>,
}

impl FallbackList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a define that may be dropped at `rank`.
    pub fn add(&mut self, rank: u32, define: &str) -> &mut Self {
        let sym = interner::intern(define);
        if !self.entries.contains(&(rank, sym)) {
            self.entries.push((rank, sym));
        }
        self
    }

    /// Registers the CPU-skinning fallback.
    pub fn add_cpu_skinning(&mut self, rank: u32) -> &mut Self {
        self.cpu_skinning_rank = Some(rank);
        self
    }

    #[must_use]
    pub fn is_more_reducible(&self) -> bool {
        !self.entries.is_empty() || self.cpu_skinning_rank.is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.cpu_skinning_rank.is_some())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.is_more_reducible()
    }

    fn lowest_rank(&self) -> Option<u32> {
        let define_rank = self.entries.iter().map(|&(rank, _)| rank).min();
        match (define_rank, self.cpu_skinning_rank) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Drops every entry of the lowest remaining rank from `defines`.
    ///
    /// Returns `None` once nothing is left to reduce.
    pub fn reduce(&mut self, defines: &mut ShaderDefines) -> Option<FallbackReduction> {
        let rank = self.lowest_rank()?;
        let mut reduction = FallbackReduction {
            rank,
            ..FallbackReduction::default()
        };

        self.entries.retain(|&mut (entry_rank, sym)| {
            if entry_rank != rank {
                return true;
            }
            let name = interner::resolve(sym);
            if defines.remove(name) {
                reduction.removed.push(name);
            }
            false
        });

        if self.cpu_skinning_rank == Some(rank) {
            self.cpu_skinning_rank = None;
            if defines.get_int("NUM_BONE_INFLUENCERS").is_some_and(|n| n > 0) {
                defines.set_int("NUM_BONE_INFLUENCERS", 0);
                defines.remove("BonesPerMesh");
                reduction.cpu_skinning = true;
            }
        }

        Some(reduction)
    }

    /// Builds the standard list for a define set produced by the scene-aware
    /// materials (fog, point size, multiview, lights, shadows, skinning).
    #[must_use]
    pub fn standard(defines: &ShaderDefines, max_lights: u32) -> Self {
        let mut list = Self::new();

        if defines.is_enabled("FOG") {
            list.add(FOG_RANK, "FOG");
        }
        if defines.is_enabled("POINTSIZE") {
            list.add(POINT_SIZE_RANK, "POINTSIZE");
        }
        if defines.is_enabled("MULTIVIEW") {
            list.add(MULTIVIEW_RANK, "MULTIVIEW");
        }

        let light_count = (0..max_lights)
            .take_while(|i| defines.is_enabled(&format!("LIGHT{i}")))
            .count() as u32;

        let mut rank = SHADOW_BASE_RANK;
        for i in (0..light_count).rev() {
            let mut any = false;
            for prefix in SHADOW_PREFIXES {
                let name = format!("{prefix}{i}");
                if defines.contains(&name) {
                    list.add(rank, &name);
                    any = true;
                }
            }
            if any {
                rank += 1;
            }
        }
        if defines.is_enabled("SHADOWS") {
            // Dropped together with the last shadowed light.
            list.add(rank.saturating_sub(1).max(SHADOW_BASE_RANK), "SHADOWS");
        }

        for i in (1..light_count).rev() {
            list.add(rank, &format!("LIGHT{i}"));
            for prefix in LIGHT_TYPE_PREFIXES {
                let name = format!("{prefix}{i}");
                if defines.contains(&name) {
                    list.add(rank, &name);
                }
            }
            rank += 1;
        }

        if defines.get_int("NUM_BONE_INFLUENCERS").is_some_and(|n| n > 0) {
            list.add_cpu_skinning(rank);
        }

        list
    }
}
