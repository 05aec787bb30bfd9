//! Readiness Gate
//!
//! Decides, once per frame and drawable, whether a drawable can be drawn.
//!
//! ```text
//!   NotReady ──► Compiling ──► Ready
//!                    ▲            │ defines changed
//!                    └── Stale ◄──┘
//! ```
//!
//! A check walks these steps, stopping at the first one that cannot finish:
//!
//! 1. **Fast path**: a frozen material whose drawable was ready last time,
//!    with the same instancing mode, is ready immediately.
//! 2. **Defines**: frame-bound values (instancing, clip planes) are always
//!    re-evaluated; material partitions only when dirty. Everything is
//!    written into a staged copy. A partition that is not ready (a texture
//!    still loading) aborts the check and the staged copy is dropped, so
//!    the define key never reflects a half-finished recompute.
//! 3. **Variant**: an unprocessed define set is sent to the
//!    [`VariantCompiler`]; pending compiles keep the drawable in
//!    [`ReadinessState::Compiling`].
//! 4. **Ready**: the fast-path flags are cached for the next frame.

use crate::errors::CompileError;
use crate::renderer::backend::{BackendCaps, GraphicsBackend};
use crate::renderer::drawable::{Drawable, MeshInfo};
use crate::renderer::pipeline::{
    CompiledVariant, FallbackList, ShaderId, VariantCompiler, VariantRequest, VariantStatus,
};
use crate::resources::define_set::DefineSet;
use crate::resources::dirty::{DirtyFlags, DirtyTracker, Partition};
use crate::resources::shader_defines::ShaderDefines;
use crate::scene::SceneContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReadinessState {
    #[default]
    NotReady,
    /// Waiting for the shader source or program link.
    Compiling,
    Ready,
    /// Defines changed since the last ready variant.
    Stale,
}

/// Read-only inputs of a define recompute.
#[derive(Debug, Clone, Copy)]
pub struct DefineContext<'a> {
    pub scene: &'a SceneContext,
    pub mesh: &'a MeshInfo,
    pub caps: BackendCaps,
    pub use_instances: bool,
}

/// Everything besides the defines a material contributes to a variant.
#[derive(Debug, Clone, Default)]
pub struct VariantInputs {
    pub attributes: Vec<&'static str>,
    pub uniforms: Vec<&'static str>,
    pub samplers: Vec<&'static str>,
    pub fallbacks: FallbackList,
    pub binding_code: String,
}

/// Material side of the readiness gate.
pub trait ShaderMaterial {
    fn shader_id(&self) -> ShaderId;

    fn is_frozen(&self) -> bool;

    fn is_disposed(&self) -> bool {
        false
    }

    fn dirty_tracker(&self) -> &DirtyTracker;

    /// Pulls pending external notifications into the dirty tracker.
    fn sync_external_state(&mut self) {}

    /// Partitions recomputed when `pending` are dirty. Lets a partition
    /// depend on defines written by another one.
    fn expand_dirty(&self, pending: DirtyFlags) -> DirtyFlags {
        pending
    }

    /// Writes defines evaluated on every check (not cached by partition).
    fn prepare_frame_defines(&self, _ctx: &DefineContext<'_>, _defines: &mut ShaderDefines) {}

    /// Recomputes one partition. `false` means an input is not ready yet.
    fn prepare_partition(
        &self,
        partition: Partition,
        ctx: &DefineContext<'_>,
        defines: &mut ShaderDefines,
    ) -> bool;

    fn variant_inputs(&self, defines: &ShaderDefines, ctx: &DefineContext<'_>) -> VariantInputs;

    /// A drawable switched to a variant it was not using before.
    fn on_variant_ready(&mut self, _variant: &CompiledVariant) {}

    fn on_compile_error(&mut self, _error: &CompileError) {}
}

/// Per-frame collaborators of a readiness check.
pub struct FrameContext<'a> {
    pub scene: &'a SceneContext,
    pub backend: &'a mut dyn GraphicsBackend,
    pub compiler: &'a mut VariantCompiler,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessStats {
    pub checks: u64,
    pub fast_path_hits: u64,
    pub partition_recomputes: u64,
    pub compile_requests: u64,
}

#[derive(Debug, Default)]
pub struct ReadinessGate {
    stats: ReadinessStats,
}

impl ReadinessGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> ReadinessStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ReadinessStats::default();
    }

    /// Returns `true` when `drawable` can be drawn with `material` this frame.
    pub fn check<M: ShaderMaterial + ?Sized>(
        &mut self,
        material: &mut M,
        drawable: &mut Drawable,
        frame: &mut FrameContext<'_>,
        use_instances: bool,
    ) -> bool {
        self.stats.checks += 1;

        if material.is_disposed() {
            Self::not_ready(drawable, ReadinessState::NotReady);
            return false;
        }
        material.sync_external_state();

        if material.is_frozen()
            && drawable.variant.is_some()
            && drawable.was_previously_ready
            && drawable.was_previously_using_instances == Some(use_instances)
        {
            self.stats.fast_path_hits += 1;
            drawable.state = ReadinessState::Ready;
            return true;
        }

        let tracker = material.dirty_tracker().combined(frame.scene.dirty_tracker());
        let ctx = DefineContext {
            scene: frame.scene,
            mesh: &drawable.mesh,
            caps: frame.backend.caps(),
            use_instances,
        };
        let defines = drawable.defines.get_or_insert_with(DefineSet::new);

        // ── Defines ──────────────────────────────────────────────────────────
        let pending = material.expand_dirty(defines.pending(&tracker));
        let mut staged = defines.stage();
        material.prepare_frame_defines(&ctx, &mut staged);

        for partition in pending.partitions() {
            self.stats.partition_recomputes += 1;
            if !material.prepare_partition(partition, &ctx, &mut staged) {
                log::trace!("Drawable {:?}: {partition:?} not ready", drawable.id());
                let state = if drawable.variant.is_some() {
                    ReadinessState::Stale
                } else {
                    ReadinessState::NotReady
                };
                Self::not_ready(drawable, state);
                return false;
            }
        }

        if defines.commit(staged, pending, &tracker) && drawable.variant.is_some() {
            drawable.state = ReadinessState::Stale;
        }

        // ── Variant ──────────────────────────────────────────────────────────
        if defines.is_dirty() {
            let key = defines.key().clone();
            let inputs = material.variant_inputs(defines.values(), &ctx);
            let request = VariantRequest {
                shader: material.shader_id(),
                define_key: &key,
                defines: defines.values(),
                attributes: &inputs.attributes,
                uniforms: &inputs.uniforms,
                samplers: &inputs.samplers,
                fallbacks: &inputs.fallbacks,
                binding_code: &inputs.binding_code,
            };

            self.stats.compile_requests += 1;
            match frame.compiler.get_or_compile(&mut *frame.backend, &request) {
                VariantStatus::Ready(variant) => {
                    defines.mark_as_processed();
                    let switched = drawable
                        .variant
                        .as_ref()
                        .is_none_or(|current| current.program != variant.program);
                    if switched {
                        material.on_variant_ready(&variant);
                        drawable.force_rebind = true;
                    }
                    drawable.variant = Some(variant);
                    drawable.last_error = None;
                }
                VariantStatus::Pending => {
                    Self::not_ready(drawable, ReadinessState::Compiling);
                    return false;
                }
                VariantStatus::Failed(error) => {
                    defines.mark_as_processed();
                    material.on_compile_error(&error);
                    drawable.last_error = Some(error);
                    drawable.variant = None;
                    Self::not_ready(drawable, ReadinessState::NotReady);
                    return false;
                }
            }
        }

        // A failed key stays processed; only a define change retries it.
        let current = defines.key().clone();
        if !drawable.variant.as_ref().is_some_and(|v| v.key == current) {
            Self::not_ready(drawable, ReadinessState::NotReady);
            return false;
        }

        drawable.state = ReadinessState::Ready;
        drawable.was_previously_ready = true;
        drawable.was_previously_using_instances = Some(use_instances);
        true
    }

    fn not_ready(drawable: &mut Drawable, state: ReadinessState) {
        drawable.state = state;
        drawable.was_previously_ready = false;
    }
}
