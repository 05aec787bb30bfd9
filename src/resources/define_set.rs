//! Per-drawable define state.
//!
//! A [`DefineSet`] wraps the [`ShaderDefines`] of one drawable together with
//! the dirty bookkeeping needed to recompute only what changed:
//!
//! - the material generations it has already processed (see [`DirtyTracker`]),
//! - explicit dirty bits set directly on the drawable,
//! - a lazily cached canonical [`DefineKey`],
//! - an `is_processed` flag that drops whenever a value changes.
//!
//! Partition recomputation is *staged*: callers take a scratch copy with
//! [`DefineSet::stage`], write into it and only [`commit`](DefineSet::commit)
//! when every pending partition resolved. An aborted pass leaves the set, and
//! therefore its key, untouched.

use super::dirty::{DirtyFlags, DirtyTracker, Partition};
use super::shader_defines::{DefineKey, DefineValue, ShaderDefines};

#[derive(Debug, Clone)]
pub struct DefineSet {
    values: ShaderDefines,
    seen: [u64; 4],
    dirty: DirtyFlags,
    key: Option<DefineKey>,
    processed: bool,
}

impl Default for DefineSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DefineSet {
    /// A fresh set: every partition pending, nothing processed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: ShaderDefines::new(),
            seen: [0; 4],
            dirty: DirtyFlags::all(),
            key: None,
            processed: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &ShaderDefines {
        &self.values
    }

    #[inline]
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.values.is_enabled(name)
    }

    #[inline]
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.values.get_int(name)
    }

    /// Explicitly marks a partition dirty on this drawable only.
    #[inline]
    pub fn mark_dirty(&mut self, partition: Partition) {
        self.dirty |= partition.flag();
    }

    #[inline]
    pub fn mark_all_dirty(&mut self) {
        self.dirty = DirtyFlags::all();
    }

    /// Partitions that need recomputation against the material's tracker.
    #[must_use]
    pub fn pending(&self, tracker: &DirtyTracker) -> DirtyFlags {
        let mut pending = self.dirty;
        for partition in Partition::ALL {
            if tracker.generation(partition) != self.seen[partition.index()] {
                pending |= partition.flag();
            }
        }
        pending
    }

    #[inline]
    #[must_use]
    pub fn is_partition_dirty(&self, partition: Partition, tracker: &DirtyTracker) -> bool {
        self.pending(tracker).contains(partition.flag())
    }

    /// Scratch copy of the current values for a staged recompute.
    #[inline]
    #[must_use]
    pub fn stage(&self) -> ShaderDefines {
        self.values.clone()
    }

    /// Commits a staged recompute and clears the resolved partitions.
    ///
    /// Returns `true` if any define value changed.
    pub fn commit(
        &mut self,
        staged: ShaderDefines,
        resolved: DirtyFlags,
        tracker: &DirtyTracker,
    ) -> bool {
        for partition in resolved.partitions() {
            self.seen[partition.index()] = tracker.generation(partition);
        }
        self.dirty.remove(resolved);

        if staged == self.values {
            return false;
        }
        self.values = staged;
        self.invalidate_key();
        true
    }

    /// Writes a single value directly (frame-bound defines).
    pub fn set(&mut self, name: &str, value: impl Into<DefineValue>) -> bool {
        let changed = self.values.set(name, value);
        if changed {
            self.invalidate_key();
        }
        changed
    }

    fn invalidate_key(&mut self) {
        self.key = None;
        self.processed = false;
    }

    /// Canonical key of the current values (cached until the next change).
    pub fn key(&mut self) -> &DefineKey {
        self.key.get_or_insert_with(|| self.values.to_key())
    }

    /// `true` if values changed since the last [`mark_as_processed`](Self::mark_as_processed).
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.processed
    }

    #[inline]
    pub fn mark_as_processed(&mut self) {
        self.processed = true;
    }

    #[inline]
    pub fn mark_as_unprocessed(&mut self) {
        self.processed = false;
    }
}
